//! Signed customer API: signup, SMS capture and the older upsert endpoints.
//!
//! Every handler takes a [`Signed`] body, so the storefront signature has
//! already been checked by the time these run.

use artfulfam_core::crypto::signup_token::{self, DEFAULT_TTL_SECONDS};
use artfulfam_core::crypto::{SignupTokenClaims, SignupTokenPayload};
use artfulfam_core::{Email, PhoneNumber, ShopDomain};
use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::resolve_shop;
use crate::error::{AppError, Result};
use crate::middleware::Signed;
use crate::replay::Claim;
use crate::shopify::{AdminClient, AdminShopifyError};
use crate::state::AppState;

/// Tag applied to customers created from the launch page.
const SIGNUP_TAG: &str = "coming-soon";

fn default_tags() -> Vec<String> {
    vec![SIGNUP_TAG.to_string()]
}

/// Shop from the signed header, then the body, then `ADMIN_BROKER_SHOP`.
fn request_shop<T>(state: &AppState, request: &Signed<T>, body_shop: Option<&str>) -> Result<ShopDomain> {
    resolve_shop(
        &[request.shop.as_ref().map(ShopDomain::as_str), body_shop],
        state.config(),
    )
}

fn signup_secret(state: &AppState) -> Result<&str> {
    state.config().signup_token_secret().ok_or_else(|| {
        AppError::Config("Missing SIGNUP_TOKEN_SECRET (or BROKER_SHARED_SECRET).".to_string())
    })
}

/// Tag a rejected Shopify input with the step that failed.
fn at_step(step: &'static str) -> impl Fn(AdminShopifyError) -> AppError {
    move |e| match e {
        AdminShopifyError::UserError(message) => AppError::StepFailed { step, message },
        other => AppError::Shopify(other),
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    shop: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    success: bool,
    is_new_customer: bool,
    sms_enabled: bool,
    collect_phone: bool,
    signup_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_id: Option<String>,
    message: &'static str,
}

/// Email signup from the launch page.
///
/// New customers get a token that allows one phone capture; returning
/// customers get a token that does not.
///
/// # Route
///
/// `POST /admin/broker/api/customer-signup`
#[instrument(skip_all)]
pub async fn customer_signup(
    State(state): State<AppState>,
    request: Signed<SignupRequest>,
) -> Result<Json<SignupResponse>> {
    let email = Email::parse(&request.body.email)
        .map_err(|_| AppError::BadRequest("Invalid email address".to_string()))?;
    let shop = request_shop(&state, &request, request.body.shop.as_deref())?;
    let admin = state.admin_client(&shop).await?;
    let secret = signup_secret(&state)?;
    let now = Utc::now();

    if admin.find_customer_by_email(&email).await?.is_some() {
        tracing::info!(shop = %shop, "Signup for existing customer");
        let claims = SignupTokenClaims {
            shop: shop.to_string(),
            email: email.to_string(),
            ..Default::default()
        };
        return Ok(Json(SignupResponse {
            success: true,
            is_new_customer: false,
            sms_enabled: false,
            collect_phone: false,
            signup_token: signup_token::issue(secret, &claims, DEFAULT_TTL_SECONDS, now),
            customer_id: None,
            message: "Already signed up!",
        }));
    }

    let customer = admin
        .create_customer(&email, &default_tags())
        .await?
        .ok_or_else(|| AppError::Upstream("Customer was not created".to_string()))?;
    tracing::info!(shop = %shop, customer_id = %customer.id, "Created customer from signup");

    let claims = SignupTokenClaims {
        shop: shop.to_string(),
        email: email.to_string(),
        customer_id: Some(customer.id.clone()),
        allow_phone_capture: true,
    };
    Ok(Json(SignupResponse {
        success: true,
        is_new_customer: true,
        sms_enabled: true,
        collect_phone: true,
        signup_token: signup_token::issue(secret, &claims, DEFAULT_TTL_SECONDS, now),
        customer_id: Some(customer.id),
        message: "Successfully signed up!",
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SmsOperation {
    Phone,
    Consent,
    Both,
}

impl SmsOperation {
    fn parse(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None | Some("both") => Ok(Self::Both),
            Some("phone") => Ok(Self::Phone),
            Some("consent") => Ok(Self::Consent),
            Some(_) => Err(AppError::BadRequest("Invalid operation".to_string())),
        }
    }

    const fn writes_phone(self) -> bool {
        matches!(self, Self::Phone | Self::Both)
    }

    const fn writes_consent(self) -> bool {
        matches!(self, Self::Consent | Self::Both)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsUpdateRequest {
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    signup_token: Option<String>,
    #[serde(default)]
    consent: Option<bool>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    shop: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SmsUpdateResponse {
    success: bool,
    source: &'static str,
    message: &'static str,
}

/// Attach a phone number and SMS consent to the customer named in the
/// signup token.
///
/// With single-use tokens on, a token is claimed before any write and
/// released again if a write fails, so the visitor can retry.
///
/// # Route
///
/// `POST /admin/broker/api/update-customer-sms`
#[instrument(skip_all)]
pub async fn update_customer_sms(
    State(state): State<AppState>,
    request: Signed<SmsUpdateRequest>,
) -> Result<Json<SmsUpdateResponse>> {
    let body = &request.body;
    let operation = SmsOperation::parse(body.operation.as_deref())?;

    let raw_phone = body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    if operation.writes_phone() && raw_phone.is_none() {
        return Err(AppError::BadRequest("Phone is required".to_string()));
    }
    if operation.writes_consent() && body.consent != Some(true) {
        return Err(AppError::BadRequest("SMS consent is required".to_string()));
    }
    let phone = raw_phone
        .map(PhoneNumber::to_e164)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let shop = request_shop(&state, &request, body.shop.as_deref())?;
    let secret = signup_secret(&state)?;

    let token = body.signup_token.as_deref().filter(|t| !t.is_empty());
    let payload: Option<SignupTokenPayload> = token
        .map(|t| signup_token::verify(secret, t, Some(shop.as_str()), Utc::now()))
        .transpose()?;

    let admin = state.admin_client(&shop).await?;

    let (Some(token), Some(payload)) = (token, payload.filter(SignupTokenPayload::allows_phone_capture))
    else {
        return Err(AppError::Forbidden(
            "Phone/SMS capture is not allowed for this customer.".to_string(),
        ));
    };
    let customer_id = payload
        .customer_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing customerId in signupToken.".to_string()))?;

    let claimed = match (state.consumed_tokens(), signup_token::signature_of(token)) {
        (Some(ledger), Some(signature)) => {
            if ledger.claim(signature, payload.exp).await == Claim::AlreadyUsed {
                tracing::warn!(shop = %shop, "Signup token replayed");
                return Err(AppError::Conflict("signupToken already used".to_string()));
            }
            Some((ledger, signature))
        }
        _ => None,
    };

    let written = write_sms(&admin, customer_id, phone.as_ref(), operation).await;
    if let Err(e) = written {
        if let Some((ledger, signature)) = claimed {
            ledger.release(signature).await;
        }
        return Err(e);
    }

    tracing::info!(shop = %shop, customer_id, ?operation, "Customer SMS details updated");
    Ok(Json(SmsUpdateResponse {
        success: true,
        source: "admin",
        message: "Thank you! We'll contact you when we launch.",
    }))
}

async fn write_sms(
    admin: &AdminClient,
    customer_id: &str,
    phone: Option<&PhoneNumber>,
    operation: SmsOperation,
) -> Result<()> {
    if let (true, Some(phone)) = (operation.writes_phone(), phone) {
        admin
            .update_customer_phone(customer_id, phone)
            .await
            .map_err(at_step("phone"))?;
    }
    if operation.writes_consent() {
        admin
            .subscribe_sms(customer_id, Utc::now())
            .await
            .map_err(at_step("smsConsent"))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    shop: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    success: bool,
    is_new_customer: bool,
    customer_id: String,
}

/// Find or create a customer by email.
///
/// # Route
///
/// `POST /admin/broker/api/customer-upsert`
#[instrument(skip_all)]
pub async fn customer_upsert(
    State(state): State<AppState>,
    request: Signed<UpsertRequest>,
) -> Result<Json<UpsertResponse>> {
    let email = Email::parse(&request.body.email)
        .map_err(|_| AppError::BadRequest("Invalid email".to_string()))?;
    let shop = request_shop(&state, &request, request.body.shop.as_deref())?;
    let admin = state.admin_client(&shop).await?;

    if let Some(existing) = admin.find_customer_by_email(&email).await? {
        return Ok(Json(UpsertResponse {
            success: true,
            is_new_customer: false,
            customer_id: existing.id,
        }));
    }

    let tags = request
        .body
        .tags
        .clone()
        .filter(|tags| !tags.is_empty())
        .unwrap_or_else(default_tags);
    let created = admin
        .create_customer(&email, &tags)
        .await?
        .ok_or_else(|| AppError::Upstream("Customer was not created".to_string()))?;

    Ok(Json(UpsertResponse {
        success: true,
        is_new_customer: true,
        customer_id: created.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CustomerSmsRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    shop: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    success: bool,
}

/// Set phone and SMS consent on an existing customer, US numbers only.
///
/// # Route
///
/// `POST /admin/broker/api/customer-sms`
#[instrument(skip_all)]
pub async fn customer_sms(
    State(state): State<AppState>,
    request: Signed<CustomerSmsRequest>,
) -> Result<Json<SuccessResponse>> {
    let email = Email::parse(&request.body.email)
        .map_err(|_| AppError::BadRequest("Invalid email".to_string()))?;
    let phone = PhoneNumber::us_ten_digit(&request.body.phone)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let shop = request_shop(&state, &request, request.body.shop.as_deref())?;
    let admin = state.admin_client(&shop).await?;

    let customer = admin
        .find_customer_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound("Customer not found in Shopify.".to_string()))?;
    admin
        .update_customer_phone_and_sms(&customer.id, &phone)
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::tests::test_config;
    use crate::routes::test_support::{SHOP, SIGNUP_SECRET, TestApp};

    const GRAPHQL_PATH: &str = "/admin/api/2025-10/graphql.json";
    const CUSTOMER_ID: &str = "gid://shopify/Customer/42";

    async fn mock_operation(server: &MockServer, operation: &str, data: Value, times: u64) {
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(header("x-shopify-access-token", "shpat_test"))
            .and(body_string_contains(operation))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn mock_lookup(server: &MockServer, found: bool) {
        let nodes = if found {
            json!([{ "id": CUSTOMER_ID, "email": "parent@example.com" }])
        } else {
            json!([])
        };
        mock_operation(
            server,
            "query CustomerByEmail",
            json!({ "customers": { "nodes": nodes } }),
            1,
        )
        .await;
    }

    async fn connected(server: &MockServer) -> TestApp {
        let app = TestApp::new(&server.uri());
        app.connect("shpat_test").await;
        app
    }

    fn capture_token(allow_phone_capture: bool) -> String {
        let claims = SignupTokenClaims {
            shop: SHOP.to_string(),
            email: "parent@example.com".to_string(),
            customer_id: Some(CUSTOMER_ID.to_string()),
            allow_phone_capture,
        };
        signup_token::issue(SIGNUP_SECRET, &claims, DEFAULT_TTL_SECONDS, Utc::now())
    }

    async fn mock_sms_writes(server: &MockServer, times: u64) {
        let ok = json!({ "customer": { "id": CUSTOMER_ID }, "userErrors": [] });
        mock_operation(
            server,
            "mutation CustomerUpdate",
            json!({ "customerUpdate": ok.clone() }),
            times,
        )
        .await;
        mock_operation(
            server,
            "mutation CustomerSmsMarketingConsentUpdate",
            json!({ "customerSmsMarketingConsentUpdate": ok }),
            times,
        )
        .await;
    }

    #[tokio::test]
    async fn test_signup_new_customer() {
        let server = MockServer::start().await;
        mock_lookup(&server, false).await;
        mock_operation(
            &server,
            "mutation CustomerCreate",
            json!({ "customerCreate": {
                "customer": { "id": CUSTOMER_ID, "email": "parent@example.com" },
                "userErrors": []
            }}),
            1,
        )
        .await;
        let app = connected(&server).await;

        let response = app
            .post_signed(
                "/admin/broker/api/customer-signup",
                &json!({ "email": " Parent@Example.com " }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = TestApp::json(response).await;
        assert_eq!(body["isNewCustomer"], true);
        assert_eq!(body["collectPhone"], true);
        assert_eq!(body["customerId"], CUSTOMER_ID);
        assert_eq!(body["message"], "Successfully signed up!");

        let payload = signup_token::verify(
            SIGNUP_SECRET,
            body["signupToken"].as_str().unwrap(),
            Some(SHOP),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(payload.email, "parent@example.com");
        assert_eq!(payload.customer_id.as_deref(), Some(CUSTOMER_ID));
        assert!(payload.allows_phone_capture());
    }

    #[tokio::test]
    async fn test_signup_existing_customer() {
        let server = MockServer::start().await;
        mock_lookup(&server, true).await;
        let app = connected(&server).await;

        let response = app
            .post_signed(
                "/admin/broker/api/customer-signup",
                &json!({ "email": "parent@example.com" }),
            )
            .await;
        let body = TestApp::json(response).await;
        assert_eq!(body["isNewCustomer"], false);
        assert_eq!(body["smsEnabled"], false);
        assert_eq!(body["message"], "Already signed up!");
        assert!(body.get("customerId").is_none());

        let payload = signup_token::verify(
            SIGNUP_SECRET,
            body["signupToken"].as_str().unwrap(),
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(!payload.allows_phone_capture());
    }

    #[tokio::test]
    async fn test_signup_rejections() {
        let app = TestApp::new("http://127.0.0.1:1");

        let response = app
            .post_signed("/admin/broker/api/customer-signup", &json!({ "email": "nope" }))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(TestApp::json(response).await["error"], "Invalid email address");

        let response = app
            .post_signed(
                "/admin/broker/api/customer-signup",
                &json!({ "email": "parent@example.com" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_signature_checks() {
        let app = TestApp::new("http://127.0.0.1:1");
        let stale = Utc::now().timestamp_millis() - 6 * 60 * 1000;
        let response = app
            .post_signed_at(
                "/admin/broker/api/customer-signup",
                &json!({ "email": "parent@example.com" }),
                stale,
                Some(SHOP),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut config = test_config("http://127.0.0.1:1");
        config.oauth.enabled = false;
        let response = TestApp::with_config(config)
            .post_signed("/admin/broker/api/customer-signup", &json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(TestApp::json(response).await["error"], "Admin broker is disabled.");
    }

    #[tokio::test]
    async fn test_sms_update_then_replay() {
        let server = MockServer::start().await;
        mock_sms_writes(&server, 1).await;
        let app = connected(&server).await;
        let body = json!({
            "phone": "(555) 123-4567",
            "consent": true,
            "signupToken": capture_token(true),
        });

        let response = app
            .post_signed("/admin/broker/api/update-customer-sms", &body)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = TestApp::json(response).await;
        assert_eq!(json["source"], "admin");

        let replay = app
            .post_signed("/admin/broker/api/update-customer-sms", &body)
            .await;
        assert_eq!(replay.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_sms_update_requires_capture_grant() {
        let server = MockServer::start().await;
        mock_sms_writes(&server, 0).await;
        let app = connected(&server).await;

        for token in [Some(capture_token(false)), None] {
            let mut body = json!({ "phone": "+15551234567", "consent": true });
            if let Some(token) = token {
                body["signupToken"] = json!(token);
            }
            let response = app
                .post_signed("/admin/broker/api/update-customer-sms", &body)
                .await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(
                TestApp::json(response).await["error"],
                "Phone/SMS capture is not allowed for this customer."
            );
        }
    }

    #[tokio::test]
    async fn test_sms_update_input_order() {
        let app = TestApp::new("http://127.0.0.1:1");
        let cases = [
            (json!({ "operation": "email" }), "Invalid operation"),
            (json!({ "consent": true }), "Phone is required"),
            (json!({ "phone": "+15551234567" }), "SMS consent is required"),
            (
                json!({ "phone": "123", "consent": true }),
                "Phone number must be a valid E.164 phone number.",
            ),
        ];
        for (body, message) in cases {
            let response = app
                .post_signed("/admin/broker/api/update-customer-sms", &body)
                .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(TestApp::json(response).await["error"], message);
        }

        let response = app
            .post_signed(
                "/admin/broker/api/update-customer-sms",
                &json!({ "phone": "+15551234567", "consent": true, "signupToken": "a.b" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sms_user_error_releases_token() {
        let server = MockServer::start().await;
        mock_operation(
            &server,
            "mutation CustomerUpdate",
            json!({ "customerUpdate": {
                "customer": null,
                "userErrors": [{ "field": ["phone"], "message": "Phone has already been taken" }]
            }}),
            2,
        )
        .await;
        let app = connected(&server).await;
        let body = json!({
            "phone": "+15551234567",
            "operation": "phone",
            "signupToken": capture_token(true),
        });

        for _ in 0..2 {
            let response = app
                .post_signed("/admin/broker/api/update-customer-sms", &body)
                .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json = TestApp::json(response).await;
            assert_eq!(json["step"], "phone");
            assert_eq!(json["error"], "Phone has already been taken");
        }
    }

    #[tokio::test]
    async fn test_upsert_and_customer_sms() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(body_string_contains("query CustomerByEmail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
                "customers": { "nodes": [{ "id": CUSTOMER_ID }] }
            }})))
            .mount(&server)
            .await;
        mock_operation(
            &server,
            "mutation CustomerUpdate",
            json!({ "customerUpdate": { "customer": { "id": CUSTOMER_ID }, "userErrors": [] } }),
            1,
        )
        .await;
        let app = connected(&server).await;

        let response = app
            .post_signed(
                "/admin/broker/api/customer-upsert",
                &json!({ "email": "parent@example.com" }),
            )
            .await;
        let body = TestApp::json(response).await;
        assert_eq!(body["isNewCustomer"], false);
        assert_eq!(body["customerId"], CUSTOMER_ID);

        let response = app
            .post_signed(
                "/admin/broker/api/customer-sms",
                &json!({ "email": "parent@example.com", "phone": "+15551234567" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .post_signed(
                "/admin/broker/api/customer-sms",
                &json!({ "email": "parent@example.com", "phone": "555-123-4567" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(TestApp::json(response).await, json!({ "success": true }));
    }

    #[tokio::test]
    async fn test_customer_sms_unknown_customer() {
        let server = MockServer::start().await;
        mock_lookup(&server, false).await;
        let app = connected(&server).await;

        let response = app
            .post_signed(
                "/admin/broker/api/customer-sms",
                &json!({ "email": "parent@example.com", "phone": "5551234567" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            TestApp::json(response).await["error"],
            "Customer not found in Shopify."
        );
    }
}
