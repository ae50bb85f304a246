//! OpenAPI documentation for the HTTP API.
//!
//! Paths are relative to the `/api` prefix the router nests them under. The generated document is
//! served at `/api/openapi.json` and rendered at `/api/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api::{
    handlers::{admin_users, auth},
    models::{
        auth::{LoginPayload, LoginRequest},
        responses::{ErrorBody, LoginBody, MessageBody, MessagePayload, UserDetailsBody, UserListBody},
        users::{BasicInfo, ProfileInfo, UserDetailsPayload, UserListPayload},
    },
};

/// Session token in the `Authorization` header or in the session cookie.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Session token returned by `POST /login`:\n\n\
                            ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
            components.security_schemes.insert(
                "CookieAuth".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    "bello_session",
                    "Session cookie set by `POST /login` (name configurable via `auth.cookie_name`)",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bello API",
        description = "Login and admin user management for the Bello backend. Every response is wrapped in a \
                       `status` envelope: `\"success\"` with the payload fields inline, or `\"error\"` with a `message`."
    ),
    servers((url = "/api")),
    paths(
        auth::login,
        auth::logout,
        admin_users::list_users,
        admin_users::get_user_details,
        admin_users::delete_user,
    ),
    components(schemas(
        LoginRequest,
        LoginPayload,
        BasicInfo,
        ProfileInfo,
        UserListPayload,
        UserDetailsPayload,
        MessagePayload,
        UserListBody,
        UserDetailsBody,
        MessageBody,
        LoginBody,
        ErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "authentication", description = "Session login and logout"),
        (name = "admin", description = "User management, admin only"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    /// Whether `schema` declares `name`, following `$ref`s and `allOf` branches.
    fn has_property(doc: &Value, schema: &Value, name: &str) -> bool {
        if let Some(reference) = schema["$ref"].as_str() {
            let key = reference.trim_start_matches("#/components/schemas/");
            return has_property(doc, &doc["components"]["schemas"][key], name);
        }
        schema["properties"].get(name).is_some()
            || schema["allOf"]
                .as_array()
                .is_some_and(|parts| parts.iter().any(|part| has_property(doc, part, name)))
    }

    #[test]
    fn test_document_lists_routes_and_schemes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/admin/users"));
        assert!(paths.contains(&"/admin/users/{user_id}"));
        assert!(paths.contains(&"/login"));

        let schemes = &doc.components.as_ref().unwrap().security_schemes;
        assert!(schemes.contains_key("BearerAuth"));
        assert!(schemes.contains_key("CookieAuth"));
    }

    #[test]
    fn test_success_responses_document_status_field() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let cases = [
            ("/admin/users", "get", "users"),
            ("/admin/users/{user_id}", "get", "basic_info"),
            ("/admin/users/{user_id}", "delete", "message"),
            ("/login", "post", "token"),
            ("/logout", "post", "message"),
        ];

        for (path, method, payload_field) in cases {
            let schema = &doc["paths"][path][method]["responses"]["200"]["content"]["application/json"]["schema"];
            assert!(has_property(&doc, schema, "status"), "{method} {path} lacks status");
            assert!(has_property(&doc, schema, payload_field), "{method} {path} lacks {payload_field}");
        }
    }
}
