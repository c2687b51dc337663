//! Environment-driven configuration
//!
//! Connection settings for the ERP backend plus the HTTP server knobs.
//! Everything comes from the environment (optionally via a .env file loaded
//! by the binaries); required-field validation happens at startup, not in
//! the query path.

use std::env;
use std::time::Duration;

/// Connection settings for the remote ERP backend.
#[derive(Clone)]
pub struct BackendSettings {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl BackendSettings {
    /// Build settings from `ERP_URL`, `ERP_DB`, `ERP_USERNAME` and
    /// `ERP_PASSWORD`. Missing variables become empty strings so that
    /// `validate` can report them all at once.
    pub fn from_env() -> Self {
        Self::new(
            env::var("ERP_URL").unwrap_or_default(),
            env::var("ERP_DB").unwrap_or_default(),
            env::var("ERP_USERNAME").unwrap_or_default(),
            env::var("ERP_PASSWORD").unwrap_or_default(),
        )
    }

    pub fn new(
        url: impl Into<String>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: normalize_url(&url.into()),
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check that every required field is present. Returns the list of
    /// missing variable names on failure.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut missing = Vec::new();
        if self.url.is_empty() {
            missing.push("ERP_URL");
        }
        if self.database.is_empty() {
            missing.push("ERP_DB");
        }
        if self.username.is_empty() {
            missing.push("ERP_USERNAME");
        }
        if self.password.is_empty() {
            missing.push("ERP_PASSWORD");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "Missing required backend configuration: {}",
                missing.join(", ")
            ))
        }
    }
}

/// HTTP server settings for the tool API.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Caller-imposed deadline for individual backend operations.
    pub request_timeout: Duration,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        let host = env::var("GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .or_else(|_| env::var("GATEWAY_PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        let timeout_secs = env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self {
            host,
            port,
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Ensure the endpoint URL carries a scheme and no trailing slash.
/// Bare hostnames default to https.
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    with_scheme.trim_end_matches('/').to_string()
}
