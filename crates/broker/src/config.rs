//! Broker configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Server
//! - `BROKER_HOST` - Bind address (default: 127.0.0.1)
//! - `BROKER_PORT` - Listen port (default: 3001)
//! - `BROKER_PUBLIC_URL` - Public URL used for the OAuth redirect (default: `http://localhost:3001`)
//! - `BROKER_DATABASE_URL` - Postgres for tokens and sessions (memory otherwise)
//!
//! ## Admin OAuth
//! - `ADMIN_BROKER_ENABLED` - Master switch (default: false)
//! - `ADMIN_BROKER_SHOP` - Default shop when a request names none
//! - `ADMIN_BROKER_CLIENT_ID` / `SHOPIFY_ADMIN_API_KEY` - App client ID
//! - `ADMIN_BROKER_CLIENT_SECRET` / `SHOPIFY_ADMIN_API_SECRET` - App client secret, also the callback HMAC key
//! - `ADMIN_BROKER_SCOPES` - Requested scopes (default: `read_customers,write_customers`)
//! - `ADMIN_BROKER_REDIRECT_URI` - Callback URL (default: `{BROKER_PUBLIC_URL}/admin/broker/callback`)
//!
//! ## Signing
//! - `BROKER_SHARED_SECRET` - HMAC key shared with the storefront
//! - `SIGNUP_TOKEN_SECRET` - Signup token key (falls back to `BROKER_SHARED_SECRET`, then `SESSION_SECRET`)
//! - `SESSION_SECRET` - Session secret
//! - `SIGNUP_TOKEN_SINGLE_USE` - Reject reused signup tokens (default: true)
//!
//! ## Admin API
//! - `PRIVATE_ADMIN_API_TOKEN` / `SHOPIFY_ADMIN_ACCESS_TOKEN` - Static token that bypasses the token store
//! - `SHOPIFY_ADMIN_API_VERSION` - Admin API version (default: 2025-10)
//! - `SHOPIFY_ADMIN_BASE_URL` - Send server-to-server Shopify calls here instead of `https://{shop}`
//!
//! ## Observability
//! - `LOG_FORMAT` - `json` for structured logs
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::net::{IpAddr, SocketAddr};

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::signup_token;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const DEFAULT_API_VERSION: &str = "2025-10";
const DEFAULT_SCOPES: &str = "read_customers,write_customers";
const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Broker application configuration.
#[derive(Clone)]
pub struct BrokerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the broker
    pub public_url: String,
    /// Session secret, also the last-resort signup token key
    pub session_secret: SecretString,
    /// Optional Postgres URL for the token and session stores
    pub database_url: Option<SecretString>,
    /// Admin OAuth app settings
    pub oauth: AdminOAuthConfig,
    /// Key shared with the storefront for request signing
    pub shared_secret: Option<SecretString>,
    /// Dedicated signup token key
    pub signup_token_secret: Option<SecretString>,
    /// Whether a signup token may authorize only one phone/SMS write
    pub signup_token_single_use: bool,
    /// Static Admin API token that takes precedence over stored tokens
    pub private_admin_token: Option<SecretString>,
    /// Admin API version
    pub admin_api_version: String,
    /// Origin override for token exchange and Admin GraphQL, mainly for tests
    pub admin_base_url: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance sample rate
    pub sentry_traces_sample_rate: f32,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_url", &self.public_url)
            .field("session_secret", &"[REDACTED]")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("oauth", &self.oauth)
            .field(
                "shared_secret",
                &self.shared_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "signup_token_secret",
                &self.signup_token_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("signup_token_single_use", &self.signup_token_single_use)
            .field(
                "private_admin_token",
                &self.private_admin_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_api_version", &self.admin_api_version)
            .field("admin_base_url", &self.admin_base_url)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .finish_non_exhaustive()
    }
}

/// Shopify Admin OAuth app configuration.
#[derive(Clone)]
pub struct AdminOAuthConfig {
    /// Whether the broker accepts any OAuth or API traffic
    pub enabled: bool,
    /// Default shop
    pub shop: Option<ShopDomain>,
    /// App client ID
    pub client_id: Option<String>,
    /// App client secret
    pub client_secret: Option<SecretString>,
    /// Comma-separated scopes
    pub scopes: String,
    /// OAuth callback URL
    pub redirect_uri: String,
}

impl std::fmt::Debug for AdminOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminOAuthConfig")
            .field("enabled", &self.enabled)
            .field("shop", &self.shop)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl AdminOAuthConfig {
    /// Client ID and secret, when both are set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((
            self.client_id.as_deref()?,
            self.client_secret.as_ref()?.expose_secret(),
        ))
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing or fails to parse, or
    /// if `SESSION_SECRET` is too short.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("BROKER_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("BROKER_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("BROKER_PORT", "3001")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("BROKER_PORT".to_string(), e.to_string()))?;
        let public_url = get_optional_env("BROKER_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let session_secret = SecretString::from(get_required_env("SESSION_SECRET")?);
        if session_secret.expose_secret().len() < MIN_SESSION_SECRET_LENGTH {
            return Err(ConfigError::InsecureSecret(
                "SESSION_SECRET".to_string(),
                format!("must be at least {MIN_SESSION_SECRET_LENGTH} characters"),
            ));
        }

        let shop = get_optional_env("ADMIN_BROKER_SHOP")
            .map(|raw| {
                ShopDomain::normalize(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("ADMIN_BROKER_SHOP".to_string(), e.to_string())
                })
            })
            .transpose()?;

        let oauth = AdminOAuthConfig {
            enabled: get_bool_env("ADMIN_BROKER_ENABLED", false)?,
            shop,
            client_id: get_first_env(&["ADMIN_BROKER_CLIENT_ID", "SHOPIFY_ADMIN_API_KEY"]),
            client_secret: get_first_env(&[
                "ADMIN_BROKER_CLIENT_SECRET",
                "SHOPIFY_ADMIN_API_SECRET",
            ])
            .map(SecretString::from),
            scopes: get_env_or_default("ADMIN_BROKER_SCOPES", DEFAULT_SCOPES),
            redirect_uri: get_optional_env("ADMIN_BROKER_REDIRECT_URI")
                .unwrap_or_else(|| format!("{public_url}/admin/broker/callback")),
        };

        Ok(Self {
            host,
            port,
            public_url,
            session_secret,
            database_url: get_optional_env("BROKER_DATABASE_URL").map(SecretString::from),
            oauth,
            shared_secret: get_optional_env("BROKER_SHARED_SECRET").map(SecretString::from),
            signup_token_secret: get_optional_env("SIGNUP_TOKEN_SECRET").map(SecretString::from),
            signup_token_single_use: get_bool_env("SIGNUP_TOKEN_SINGLE_USE", true)?,
            private_admin_token: get_first_env(&[
                "PRIVATE_ADMIN_API_TOKEN",
                "SHOPIFY_ADMIN_ACCESS_TOKEN",
            ])
            .map(SecretString::from),
            admin_api_version: get_env_or_default("SHOPIFY_ADMIN_API_VERSION", DEFAULT_API_VERSION),
            admin_base_url: get_optional_env("SHOPIFY_ADMIN_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_f32_env("SENTRY_SAMPLE_RATE", 1.0)?,
            sentry_traces_sample_rate: get_f32_env("SENTRY_TRACES_SAMPLE_RATE", 0.1)?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Storefront-to-broker signing key.
    #[must_use]
    pub fn shared_secret(&self) -> Option<&str> {
        self.shared_secret
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .filter(|s| !s.is_empty())
    }

    /// Signup token key: the dedicated secret, then the shared secret, then
    /// the session secret.
    #[must_use]
    pub fn signup_token_secret(&self) -> Option<&str> {
        signup_token::resolve_secret(
            self.signup_token_secret
                .as_ref()
                .map(ExposeSecret::expose_secret),
            self.shared_secret.as_ref().map(ExposeSecret::expose_secret),
            Some(self.session_secret.expose_secret()),
        )
    }

    /// Scheme and host for server-to-server calls to `shop`.
    #[must_use]
    pub fn shop_origin(&self, shop: &ShopDomain) -> String {
        self.admin_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{shop}"))
    }

    /// Admin GraphQL endpoint for `shop`.
    #[must_use]
    pub fn admin_graphql_url(&self, shop: &ShopDomain) -> String {
        match &self.admin_base_url {
            Some(base) => format!(
                "{base}/admin/api/{}/graphql.json",
                self.admin_api_version
            ),
            None => shop.admin_graphql_url(&self.admin_api_version),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    get_optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| get_optional_env(key))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| parse_bool(key, &value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

fn get_f32_env(key: &str, default: f32) -> Result<f32, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .parse::<f32>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
