use std::fmt;

use thiserror::Error;

/// Lifetime of an issued bearer token.
pub const TOKEN_LIFETIME_HOURS: i64 = 6;

/// Longest password the hasher accepts, in bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const DEFAULT_API_PORT: u16 = 8000;
pub const DEFAULT_API_HOST: &str = "0.0.0.0";

pub const USERS_LIST_KEY: &str = "users_list";
pub const FEED_KEY: &str = "feed";

pub fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

pub fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

pub fn nick_key(nick: &str) -> String {
    format!("nick:{}", nick)
}

pub fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

pub fn followings_key(id: &str) -> String {
    format!("followings:{}", id)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Process-wide settings, read once at startup and never mutated afterwards.
#[derive(Clone)]
pub struct AppConfig {
    /// HMAC secret used to sign and verify bearer tokens.
    pub secret_key: Vec<u8>,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("secret_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// Outside production (`ENVIRONMENT` other than `PROD`) a `.env` file is
    /// read first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if std::env::var("ENVIRONMENT").map_or(true, |env| env != "PROD") {
            // A missing .env file is not an error.
            let _ = dotenvy::dotenv();
        }
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = var("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;
        if secret_key.is_empty() {
            return Err(ConfigError::Invalid {
                name: "SECRET_KEY",
                message: "must not be empty".to_string(),
            });
        }

        let port = match var("API_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "API_PORT",
                message: format!("'{}' is not a valid port number", value),
            })?,
            None => DEFAULT_API_PORT,
        };

        let host = var("API_HOST").unwrap_or_else(|| DEFAULT_API_HOST.to_string());

        Ok(Self {
            secret_key: secret_key.into_bytes(),
            host,
            port,
        })
    }
}
