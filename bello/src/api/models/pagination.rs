//! Page-number pagination for the admin user listing.
//!
//! Query values are parsed leniently: a value that is not an integer falls back to its default
//! instead of rejecting the request, values below 1 are raised to 1, and a repeated key keeps
//! its first value.

use crate::errors::Error;
use axum::{
    extract::{FromRequestParts, Query},
    http::{Uri, request::Parts},
};
use serde::Deserialize;
use serde_with::{DefaultOnError, DisplayFromStr, serde_as};
use std::collections::HashSet;
use url::form_urlencoded;
use utoipa::IntoParams;

/// Page served when `page` is absent or unparseable.
pub const DEFAULT_PAGE: i64 = 1;

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for `GET /admin/users`.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListUsersQuery {
    /// 1-based page number (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "DefaultOnError<Option<DisplayFromStr>>")]
    #[serde(default)]
    pub page: Option<i64>,

    /// Maximum users per page (default: 100)
    #[param(default = 100, minimum = 1)]
    #[serde_as(as = "DefaultOnError<Option<DisplayFromStr>>")]
    #[serde(default)]
    pub limit: Option<i64>,

    /// Case-insensitive match on username, email or display name. Empty means no filter.
    #[serde(default)]
    pub search: Option<String>,
}

impl ListUsersQuery {
    /// Page number, never below 1.
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    /// Page size, never below 1. There is no upper bound.
    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    /// Rows to skip before the requested page.
    #[inline]
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Search term, with an empty string meaning "no filter".
    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }
}

/// Re-encode a raw query string keeping only the first occurrence of each key.
fn first_values(raw: &str) -> String {
    let mut seen = HashSet::new();
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(form_urlencoded::parse(raw.as_bytes()).filter(|(key, _)| seen.insert(key.clone())))
        .finish()
}

/// `Query` would reject `?page=1&page=2` as a duplicate field, so repeated keys are collapsed
/// first and whatever still fails is answered in the error envelope.
impl<S> FromRequestParts<S> for ListUsersQuery
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let deduped = first_values(parts.uri.query().unwrap_or_default());
        let uri = Uri::builder()
            .path_and_query(format!("/?{deduped}"))
            .build()
            .map_err(|_| Error::BadRequest {
                message: "Invalid query parameters".to_string(),
            })?;
        let Query(query) = Query::<Self>::try_from_uri(&uri)?;
        Ok(query)
    }
}
