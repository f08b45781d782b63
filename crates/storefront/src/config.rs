//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SESSION_SECRET` - Session secret (min 32 chars, high entropy)
//! - `SHOPIFY_STORE_DOMAIN` - Shop domain (aliases: `NEXT_PUBLIC_SHOPIFY_STORE_DOMAIN`, `PUBLIC_STORE_DOMAIN`)
//! - `SHOPIFY_STOREFRONT_ACCESS_TOKEN` - Storefront API access token
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (alias: `NEXT_PUBLIC_SITE_URL`, default: `http://localhost:3000`)
//! - `STOREFRONT_DATABASE_URL` / `DATABASE_URL` - Postgres for sessions (memory store otherwise)
//! - `SHOPIFY_API_VERSION` - Storefront API version (default: 2025-10)
//! - `SHOPIFY_STOREFRONT_API_URL` - Override the Storefront GraphQL endpoint
//! - `SHOPIFY_SHOP_ID`, `SHOPIFY_CLIENT_ID` - Customer Account API (both needed to enable login)
//! - `SHOPIFY_CLIENT_SECRET` - Customer Account API confidential client secret
//! - `SHOPIFY_CUSTOMER_AUTH_BASE_URL` - Override `https://shopify.com`
//! - `STORE_PASSWORD` / `SHOPIFY_STORE_PASSWORD` - Coming-soon password
//! - `STORE_PASSWORD_ENABLED` - Enforce the password gate (default: false)
//! - `BROKER_BASE_URL`, `BROKER_SHARED_SECRET` - Broker forwarding (both needed)
//! - `CART_DEBOUNCE_MS` - Quantity update debounce window (default: 400)
//! - `RATE_LIMIT_ENABLED` - Per-IP rate limiting (default: true)
//! - `APP_ENV` - Environment name reported by diagnostics (default: development)
//! - `LOG_FORMAT` - `json` for structured logs
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use artfulfam_core::ShopDomain;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_API_VERSION: &str = "2025-10";
const DEFAULT_CUSTOMER_AUTH_BASE_URL: &str = "https://shopify.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

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

/// Storefront application configuration.
#[derive(Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used for OAuth redirects and post-auth landing
    pub base_url: String,
    /// Session secret
    pub session_secret: SecretString,
    /// Optional Postgres URL for the session store
    pub database_url: Option<SecretString>,
    /// Environment name (development, staging, production)
    pub environment: String,
    /// Shopify Storefront API configuration
    pub shopify: ShopifyStorefrontConfig,
    /// Customer Account API configuration, absent when login is not set up
    pub customer: Option<CustomerAccountConfig>,
    /// Raw Customer Account variables, kept for diagnostics
    pub customer_env: CustomerAccountEnv,
    /// Coming-soon password gate
    pub gate: StoreGateConfig,
    /// Broker forwarding, absent when the broker is not set up
    pub broker: Option<BrokerClientConfig>,
    /// Quantity update debounce window
    pub cart_debounce: Duration,
    /// Whether per-IP rate limiting is applied
    pub rate_limit_enabled: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance sample rate
    pub sentry_traces_sample_rate: f32,
}

impl std::fmt::Debug for StorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorefrontConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("session_secret", &"[REDACTED]")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("environment", &self.environment)
            .field("shopify", &self.shopify)
            .field("customer", &self.customer)
            .field("customer_env", &self.customer_env)
            .field("gate", &self.gate)
            .field("broker", &self.broker)
            .field("cart_debounce", &self.cart_debounce)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .finish_non_exhaustive()
    }
}

/// Shopify Storefront API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct ShopifyStorefrontConfig {
    /// Normalized shop domain (e.g., artfulfam.myshopify.com)
    pub store_domain: ShopDomain,
    /// Shopify API version (e.g., 2025-10)
    pub api_version: String,
    /// Storefront API access token
    pub storefront_token: SecretString,
    /// Endpoint override, mainly for tests
    pub api_url: Option<String>,
}

impl ShopifyStorefrontConfig {
    /// The GraphQL endpoint for Storefront API requests.
    #[must_use]
    pub fn graphql_endpoint(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| self.store_domain.storefront_graphql_url(&self.api_version))
    }
}

impl std::fmt::Debug for ShopifyStorefrontConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyStorefrontConfig")
            .field("store_domain", &self.store_domain)
            .field("api_version", &self.api_version)
            .field("storefront_token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Customer Account API (OAuth 2.0 + PKCE) configuration.
#[derive(Clone)]
pub struct CustomerAccountConfig {
    /// Numeric shop ID used in Customer Account URLs
    pub shop_id: String,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret; sent as HTTP Basic auth when present
    pub client_secret: Option<SecretString>,
    /// Base URL for authentication and customer API endpoints
    pub auth_base_url: String,
}

impl CustomerAccountConfig {
    /// `GET` authorization endpoint.
    #[must_use]
    pub fn authorize_endpoint(&self) -> String {
        format!(
            "{}/authentication/{}/oauth/authorize",
            self.auth_base_url, self.shop_id
        )
    }

    /// Token exchange and refresh endpoint.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "{}/authentication/{}/oauth/token",
            self.auth_base_url, self.shop_id
        )
    }

    /// End-session endpoint.
    #[must_use]
    pub fn logout_endpoint(&self) -> String {
        format!("{}/authentication/{}/logout", self.auth_base_url, self.shop_id)
    }

    /// Customer Account GraphQL endpoint.
    #[must_use]
    pub fn graphql_endpoint(&self, api_version: &str) -> String {
        format!(
            "{}/{}/account/customer/api/{api_version}/graphql",
            self.auth_base_url, self.shop_id
        )
    }
}

impl std::fmt::Debug for CustomerAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerAccountConfig")
            .field("shop_id", &self.shop_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("auth_base_url", &self.auth_base_url)
            .finish()
    }
}

/// Customer Account variables as found in the environment.
///
/// Login needs both IDs; this keeps each one so diagnostics can say which is
/// missing.
#[derive(Debug, Clone, Default)]
pub struct CustomerAccountEnv {
    /// `SHOPIFY_SHOP_ID`
    pub shop_id: Option<String>,
    /// `SHOPIFY_CLIENT_ID`
    pub client_id: Option<String>,
    /// Whether `SHOPIFY_CLIENT_SECRET` is set
    pub has_client_secret: bool,
}

impl CustomerAccountEnv {
    /// Whether the shop ID is all digits, as Customer Account URLs require.
    #[must_use]
    pub fn shop_id_valid(&self) -> bool {
        self.shop_id
            .as_deref()
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Whether login can be attempted at all.
    #[must_use]
    pub fn login_ready(&self) -> bool {
        self.client_id.is_some() && self.shop_id_valid()
    }
}

/// Coming-soon password gate.
#[derive(Clone, Default)]
pub struct StoreGateConfig {
    /// The shared store password
    pub password: Option<SecretString>,
    /// Whether unauthenticated visitors are redirected to `/coming-soon`
    pub enabled: bool,
}

impl StoreGateConfig {
    /// The gate only applies when switched on and a password exists.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.enabled && self.password.is_some()
    }
}

impl std::fmt::Debug for StoreGateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreGateConfig")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Where and how to reach the broker.
#[derive(Clone)]
pub struct BrokerClientConfig {
    /// Broker base URL (e.g., `http://127.0.0.1:3001`)
    pub base_url: String,
    /// HMAC key shared with the broker
    pub shared_secret: SecretString,
}

impl std::fmt::Debug for BrokerClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClientConfig")
            .field("base_url", &self.base_url)
            .field("shared_secret", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_first_env(&["STOREFRONT_BASE_URL", "NEXT_PUBLIC_SITE_URL"])
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        let database_url =
            get_first_env(&["STOREFRONT_DATABASE_URL", "DATABASE_URL"]).map(SecretString::from);

        let cart_debounce_ms = get_env_or_default("CART_DEBOUNCE_MS", "400")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CART_DEBOUNCE_MS".to_string(), e.to_string())
            })?;

        let customer_env = CustomerAccountEnv {
            shop_id: get_optional_env("SHOPIFY_SHOP_ID"),
            client_id: get_optional_env("SHOPIFY_CLIENT_ID"),
            has_client_secret: get_optional_env("SHOPIFY_CLIENT_SECRET").is_some(),
        };

        Ok(Self {
            host,
            port,
            base_url,
            session_secret,
            database_url,
            environment: get_env_or_default("APP_ENV", "development"),
            shopify: ShopifyStorefrontConfig::from_env()?,
            customer: CustomerAccountConfig::from_env(&customer_env),
            customer_env,
            gate: StoreGateConfig::from_env()?,
            broker: BrokerClientConfig::from_env(),
            cart_debounce: Duration::from_millis(cart_debounce_ms),
            rate_limit_enabled: get_bool_env("RATE_LIMIT_ENABLED", true)?,
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

    /// Customer Account OAuth callback URL.
    #[must_use]
    pub fn customer_redirect_uri(&self) -> String {
        format!("{}/api/auth/callback", self.base_url)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl ShopifyStorefrontConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_domain = get_first_env(&[
            "SHOPIFY_STORE_DOMAIN",
            "NEXT_PUBLIC_SHOPIFY_STORE_DOMAIN",
            "PUBLIC_STORE_DOMAIN",
        ])
        .ok_or_else(|| ConfigError::MissingEnvVar("SHOPIFY_STORE_DOMAIN".to_string()))?;
        let store_domain = ShopDomain::normalize(&raw_domain).map_err(|e| {
            ConfigError::InvalidEnvVar("SHOPIFY_STORE_DOMAIN".to_string(), e.to_string())
        })?;

        Ok(Self {
            store_domain,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
            storefront_token: get_required_secret("SHOPIFY_STOREFRONT_ACCESS_TOKEN")?,
            api_url: get_optional_env("SHOPIFY_STOREFRONT_API_URL"),
        })
    }
}

impl CustomerAccountConfig {
    fn from_env(env: &CustomerAccountEnv) -> Option<Self> {
        Some(Self {
            shop_id: env.shop_id.clone()?,
            client_id: env.client_id.clone()?,
            client_secret: get_optional_env("SHOPIFY_CLIENT_SECRET").map(SecretString::from),
            auth_base_url: get_env_or_default(
                "SHOPIFY_CUSTOMER_AUTH_BASE_URL",
                DEFAULT_CUSTOMER_AUTH_BASE_URL,
            )
            .trim_end_matches('/')
            .to_string(),
        })
    }
}

impl StoreGateConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            password: get_first_env(&["STORE_PASSWORD", "SHOPIFY_STORE_PASSWORD"])
                .map(SecretString::from),
            enabled: get_bool_env("STORE_PASSWORD_ENABLED", false)?,
        })
    }
}

impl BrokerClientConfig {
    fn from_env() -> Option<Self> {
        Some(Self {
            base_url: get_optional_env("BROKER_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            shared_secret: SecretString::from(get_optional_env("BROKER_SHARED_SECRET")?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    get_optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get the first set variable among `keys`.
fn get_first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| get_optional_env(key))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`).
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

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
