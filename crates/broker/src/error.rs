//! Unified error handling for the broker.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as
//! `{"error": "<message>"}`; 5xx variants are captured to Sentry first.

use artfulfam_core::crypto::{BrokerAuthError, SignupTokenError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::shopify::AdminShopifyError;
use crate::store::StoreError;

/// Application-level error type for the broker.
#[derive(Debug, Error)]
pub enum AppError {
    /// The token store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Shopify Admin API operation failed.
    #[error("Shopify error: {0}")]
    Shopify(#[from] AdminShopifyError),

    /// Reading or writing the session failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// The request signature did not verify.
    #[error("{0}")]
    BrokerAuth(#[from] BrokerAuthError),

    /// The signup token did not verify.
    #[error("{0}")]
    SignupToken(#[from] SignupTokenError),

    /// `ADMIN_BROKER_ENABLED` is off.
    #[error("Admin broker is disabled.")]
    Disabled,

    /// No Admin token for the shop.
    #[error("Broker is not connected to this shop (no Admin token).")]
    NotConnected,

    /// A required setting is missing.
    #[error("{0}")]
    Config(String),

    /// A Shopify mutation rejected its input during a named step.
    #[error("{message}")]
    StepFailed {
        step: &'static str,
        message: String,
    },

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Caller presented a bad credential.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("{0}")]
    BadRequest(String),

    /// The request repeats one that may only happen once.
    #[error("{0}")]
    Conflict(String),

    /// Shopify answered, but not usefully.
    #[error("{0}")]
    Upstream(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub(crate) const fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Shopify(AdminShopifyError::UserError(_))
            | Self::StepFailed { .. }
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Shopify(AdminShopifyError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            Self::Shopify(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::BrokerAuth(_) | Self::SignupToken(_) | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Disabled | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// Message safe to show the client.
    fn client_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Shopify(AdminShopifyError::UserError(msg)) => msg.clone(),
            Self::Shopify(AdminShopifyError::RateLimited(_)) => "Too many requests".to_string(),
            Self::Shopify(_) => "External service error".to_string(),
            other => other.to_string(),
        }
    }

    fn report(&self) {
        if self.status().is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Broker request error"
            );
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();
        let body = match &self {
            Self::StepFailed { step, message } => {
                json!({ "error": message, "step": step, "source": "admin" })
            }
            other => json!({ "error": other.client_message() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
