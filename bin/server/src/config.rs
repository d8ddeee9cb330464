//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables.
//!
//! See [`OAuthConfig`](gatehouse_access::OAuthConfig) for the identity
//! provider settings.

use chrono::Duration;
use gatehouse_access::{OAuthConfig, TokenCodec, TokenLifetimes};
use serde::Deserialize;
use std::collections::HashMap;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Where the login callback sends the browser, with tokens attached.
    pub frontend_url: String,

    /// Session token configuration.
    pub tokens: TokenConfig,

    /// OAuth identity provider configuration.
    pub oauth: OAuthConfig,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

/// Signing secret and lifetimes for session tokens.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// HS256 signing secret. Must not be empty.
    pub secret: String,

    #[serde(default = "default_access_ttl_seconds")]
    pub access_ttl_seconds: i64,

    #[serde(default = "default_refresh_ttl_seconds")]
    pub refresh_ttl_seconds: i64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[redacted]")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

/// Longest lifetime accepted for either token kind: one year.
const MAX_TTL_SECONDS: i64 = 366 * 24 * 60 * 60;

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_access_ttl_seconds() -> i64 {
    TokenLifetimes::DEFAULT_ACCESS.num_seconds()
}

fn default_refresh_ttl_seconds() -> i64 {
    TokenLifetimes::DEFAULT_REFRESH.num_seconds()
}

impl TokenConfig {
    #[must_use]
    pub fn lifetimes(&self) -> TokenLifetimes {
        TokenLifetimes {
            access: Duration::seconds(self.access_ttl_seconds),
            refresh: Duration::seconds(self.refresh_ttl_seconds),
        }
    }

    /// Builds the token codec for this configuration.
    #[must_use]
    pub fn codec(&self) -> TokenCodec {
        TokenCodec::new(self.secret.as_bytes(), self.lifetimes())
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Loads configuration from an explicit variable map instead of the
    /// process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, config::ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.tokens.secret.is_empty() {
            return Err(config::ConfigError::Message(
                "tokens.secret must not be empty".to_string(),
            ));
        }
        let ttls = [
            self.tokens.access_ttl_seconds,
            self.tokens.refresh_ttl_seconds,
        ];
        if ttls.iter().any(|ttl| *ttl <= 0) {
            return Err(config::ConfigError::Message(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if ttls.iter().any(|ttl| *ttl > MAX_TTL_SECONDS) {
            return Err(config::ConfigError::Message(format!(
                "token lifetimes must not exceed {MAX_TTL_SECONDS} seconds"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(extra: &[(&str, &str)]) -> HashMap<String, String> {
        let mut vars: HashMap<String, String> = [
            ("DATABASE_URL", "postgres://localhost/gatehouse"),
            ("FRONTEND_URL", "https://app.example.com/"),
            ("TOKENS__SECRET", "a-very-secret-value"),
            ("OAUTH__CLIENT_ID", "client"),
            ("OAUTH__CLIENT_SECRET", "shh"),
            ("OAUTH__REDIRECT_URI", "https://api.example.com/auth/callback"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            vars.insert((*k).to_string(), (*v).to_string());
        }
        vars
    }

    #[test]
    fn loads_with_defaults() {
        let config = ServerConfig::from_vars(vars(&[])).expect("load");

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.secure_cookies);
        assert_eq!(config.tokens.access_ttl_seconds, 900);
        assert_eq!(config.tokens.refresh_ttl_seconds, 604_800);
        assert_eq!(config.tokens.lifetimes(), TokenLifetimes::default());
        assert_eq!(config.oauth.client_id(), "client");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = ServerConfig::from_vars(vars(&[
            ("SECURE_COOKIES", "false"),
            ("TOKENS__ACCESS_TTL_SECONDS", "60"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
        ]))
        .expect("load");

        assert!(!config.secure_cookies);
        assert_eq!(config.tokens.lifetimes().access, Duration::seconds(60));
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
    }

    #[test]
    fn missing_secret_is_rejected() {
        let mut vars = vars(&[]);
        vars.remove("TOKENS__SECRET");
        assert!(ServerConfig::from_vars(vars).is_err());
    }

    #[test]
    fn non_positive_lifetime_is_rejected() {
        assert!(ServerConfig::from_vars(vars(&[("TOKENS__REFRESH_TTL_SECONDS", "0")])).is_err());
    }

    #[test]
    fn oversized_lifetime_is_rejected() {
        let err = ServerConfig::from_vars(vars(&[(
            "TOKENS__ACCESS_TTL_SECONDS",
            "9223372036854775807",
        )]))
        .expect_err("lifetime beyond a year");
        assert!(err.to_string().contains("must not exceed"), "{err}");

        let config = ServerConfig::from_vars(vars(&[(
            "TOKENS__REFRESH_TTL_SECONDS",
            &MAX_TTL_SECONDS.to_string(),
        )]))
        .expect("a year is accepted");
        assert_eq!(config.tokens.lifetimes().refresh, Duration::days(366));
    }

    #[test]
    fn debug_redacts_token_secret() {
        let config = ServerConfig::from_vars(vars(&[])).expect("load");
        assert!(!format!("{config:?}").contains("a-very-secret-value"));
    }
}
