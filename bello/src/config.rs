//! Application configuration management.
//!
//! Configuration is loaded from an optional YAML file with environment variable overrides. The
//! configuration file path defaults to `config.yaml` but can be specified via `-f` flag or the
//! `BELLO_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **Defaults** - every field has a default, so an empty environment is a valid starting point
//! 2. **YAML config file** - Base configuration (default: `config.yaml`, skipped when missing)
//! 3. **Plain variables** - `DB_NAME`, `DB_USER`, `DB_PASSWORD`, `DB_HOST`, `DB_PORT`,
//!    `SERVER_HOST`, `SERVER_PORT` and `SECRET_KEY`, as used by existing deployments
//! 4. **Prefixed variables** - Variables prefixed with `BELLO_` override anything above
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `BELLO_AUTH__JWT_EXPIRY=2h` sets the `auth.jwt_expiry` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use bello::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Point at a different database
//! DB_HOST=db.internal DB_PORT=6543 DB_PASSWORD=hunter2
//!
//! # Required: JWT signing secret
//! SECRET_KEY=change-me
//!
//! # Override nested values
//! BELLO_DATABASE__MAX_CONNECTIONS=20
//! BELLO_AUTH__COOKIE_SECURE=true
//! BELLO_ADMIN__USERNAME=admin BELLO_ADMIN__EMAIL=admin@example.com BELLO_ADMIN__PASSWORD=secret
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize, Serializer};
use sqlx::postgres::PgConnectOptions;
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Origin of the development frontend (Vite)
pub const DEV_FRONTEND_ORIGIN: &str = "http://localhost:5173";

/// Plain string variables and the config key each one sets. Read verbatim so values such as
/// `DB_PASSWORD=0000` are not reinterpreted as numbers.
const PLAIN_STRING_VARS: &[(&str, &str)] = &[
    ("DB_NAME", "database.name"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_HOST", "database.host"),
    ("SERVER_HOST", "host"),
    ("SECRET_KEY", "secret_key"),
];

const PLAIN_PORT_VARS: &[&str] = &["DB_PORT", "SERVER_PORT"];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "BELLO_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    pub database: DatabaseConfig,
    /// Secret key for JWT signing (required)
    pub secret_key: Option<String>,
    pub auth: AuthConfig,
    pub cors: CorsConfig,
    /// Initial admin account, created or refreshed on startup when a username is set
    pub admin: AdminConfig,
    /// Export traces over OTLP (configured through the standard `OTEL_*` variables)
    pub enable_otel_export: bool,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

/// Session token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// How long issued tokens (and the session cookie) stay valid
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// Name of the session cookie carrying the token
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (HTTPS only)
    pub cookie_secure: bool,
}

/// CORS (Cross-Origin Resource Sharing) configuration for the `/api` routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Request headers browsers may send
    pub allowed_headers: Vec<String>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdminConfig {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

impl CorsOrigin {
    /// The value as it appears in an `Origin` header (no trailing slash).
    pub fn as_header_value(&self) -> String {
        match self {
            CorsOrigin::Wildcard => "*".to_string(),
            CorsOrigin::Url(url) => url.origin().ascii_serialization(),
        }
    }
}

impl Serialize for CorsOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_header_value())
    }
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8800,
            database: DatabaseConfig::default(),
            secret_key: None,
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            admin: AdminConfig::default(),
            enable_otel_export: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "bello".to_string(),
            user: "postgres".to_string(),
            password: "0000".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            max_connections: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60),
            cookie_name: "bello_session".to_string(),
            cookie_secure: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Url::parse(DEV_FRONTEND_ORIGIN).into_iter().map(CorsOrigin::Url).collect(),
            allowed_headers: vec!["content-type".to_string()],
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "validate config: secret_key is required to sign session tokens. \
                     Set the SECRET_KEY environment variable or add secret_key to the config file"
                    .to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(Error::Internal {
                operation: "validate config: database.max_connections must be at least 1".to_string(),
            });
        }

        if self.admin.password.is_some() && (self.admin.username.is_none() || self.admin.email.is_none()) {
            return Err(Error::Internal {
                operation: "validate config: admin.password is set but admin.username or admin.email is missing".to_string(),
            });
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "validate config: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        let mut figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            .merge(Env::raw().only(PLAIN_PORT_VARS).map(|key| {
                if key.as_str().eq_ignore_ascii_case("DB_PORT") {
                    "database.port".into()
                } else {
                    "port".into()
                }
            }));

        for (var, key) in PLAIN_STRING_VARS {
            if let Ok(value) = std::env::var(var) {
                figment = figment.merge(Serialized::default(key, value));
            }
        }

        // BELLO_CONFIG names the file itself and is not a config key
        figment.merge(Env::prefixed("BELLO_").ignore(&["config"]).split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
