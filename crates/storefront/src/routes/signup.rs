//! Newsletter signup and SMS capture, forwarded to the broker.
//!
//! The storefront only validates what it can check cheaply; the broker owns
//! every Shopify write and its answer is relayed unchanged.

use artfulfam_core::Email;
use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use tracing::instrument;

use super::JsonBody;
use crate::broker::{
    BrokerClientError, BrokerResponse, CUSTOMER_SIGNUP_PATH, UPDATE_CUSTOMER_SMS_PATH,
};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::state::AppState;

fn relay(response: BrokerResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .content_type
        .unwrap_or_else(|| "application/json".to_string());
    (
        status,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(response.body),
    )
        .into_response()
}

async fn forward(state: &AppState, path: &str, body: &Value) -> Result<Response> {
    let broker = state.broker().ok_or(BrokerClientError::NotConfigured)?;
    Ok(relay(broker.forward(path, body).await?))
}

/// Sign a visitor up for launch news.
///
/// # Route
///
/// `POST /api/customer-signup`
#[instrument(skip_all)]
pub async fn customer_signup(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response> {
    let email = body
        .get("email")
        .and_then(Value::as_str)
        .and_then(|raw| Email::parse(raw).ok())
        .ok_or_else(|| AppError::BadRequest("Invalid email address".to_string()))?;

    add_breadcrumb("signup", "Customer signup", None);
    tracing::info!(email_domain = email.as_str().rsplit('@').next(), "Forwarding signup");

    forward(&state, CUSTOMER_SIGNUP_PATH, &body).await
}

/// Record a phone number and SMS consent, authorized by a signup token.
///
/// # Route
///
/// `POST /api/update-customer-sms`
#[instrument(skip_all)]
pub async fn update_customer_sms(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response> {
    if !body.is_object() {
        return Err(AppError::BadRequest("Invalid JSON".to_string()));
    }
    forward(&state, UPDATE_CUSTOMER_SMS_PATH, &body).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::BrokerClientConfig;
    use crate::routes::test_support::{TestApp, test_config};

    async fn app_with_broker(broker_url: &str) -> TestApp {
        let mut config = test_config("http://127.0.0.1:1");
        config.broker = Some(BrokerClientConfig {
            base_url: broker_url.to_string(),
            shared_secret: SecretString::from("test-broker-shared-secret"),
        });
        TestApp::with_config(config).await
    }

    #[tokio::test]
    async fn test_signup_rejects_bad_email() {
        let app = TestApp::new("http://127.0.0.1:1").await;
        let response = app
            .post_json("/api/customer-signup", &json!({"email": "not-an-email"}))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            TestApp::json(response).await,
            json!({"error": "Invalid email address"})
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_json_error() {
        let app = TestApp::new("http://127.0.0.1:1").await;
        for uri in ["/api/customer-signup", "/api/update-customer-sms"] {
            let response = app.post_raw(uri, "{\"email\": ").await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(
                TestApp::json(response).await,
                json!({"error": "Invalid JSON"})
            );
        }
    }

    #[tokio::test]
    async fn test_signup_without_broker_is_500() {
        let app = TestApp::new("http://127.0.0.1:1").await;
        let response = app
            .post_json("/api/customer-signup", &json!({"email": "parent@example.com"}))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_signup_relays_broker_answer() {
        let broker = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CUSTOMER_SIGNUP_PATH))
            .and(header_exists("x-broker-signature"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "isNewCustomer": true,
                "signupToken": "payload.sig"
            })))
            .expect(1)
            .mount(&broker)
            .await;

        let app = app_with_broker(&broker.uri()).await;
        let response = app
            .post_json("/api/customer-signup", &json!({"email": "parent@example.com"}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = TestApp::json(response).await;
        assert_eq!(body["signupToken"], "payload.sig");
    }

    #[tokio::test]
    async fn test_sms_relays_broker_error_status() {
        let broker = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(UPDATE_CUSTOMER_SMS_PATH))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({
                    "error": "Phone/SMS capture is not allowed for this customer."
                })),
            )
            .mount(&broker)
            .await;

        let app = app_with_broker(&broker.uri()).await;
        let response = app
            .post_json(
                "/api/update-customer-sms",
                &json!({"phone": "5551234567", "signupToken": "t", "consent": true}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_502() {
        let app = app_with_broker("http://127.0.0.1:1").await;
        let response = app
            .post_json("/api/customer-signup", &json!({"email": "parent@example.com"}))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
