//! Connecting a shop through the broker's Admin OAuth flow.

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::hmac::callback_message;
use artfulfam_core::crypto::sign_hex;
use artfulfam_broker::store::TokenStore;
use artfulfam_integration_tests::{CLIENT_ID, CLIENT_SECRET, SHOP, TestStack};
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

/// Follow `/admin/broker/start` and return the `state` sent to Shopify.
async fn begin(stack: &TestStack) -> String {
    let response = stack
        .client
        .get(stack.broker(&format!("/api/auth/shopify/install?shop={SHOP}")))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers()["location"].to_str().expect("ascii location");
    let authorize = url::Url::parse(location).expect("absolute redirect");
    assert_eq!(authorize.host_str(), Some(SHOP));
    let param = |name: &str| {
        authorize
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    assert_eq!(param("client_id").as_deref(), Some(CLIENT_ID));
    param("state").expect("state parameter")
}

fn signed_callback(stack: &TestStack, code: &str, state: &str) -> String {
    let params = [
        ("code", code),
        ("host", "YWRtaW4uc2hvcGlmeS5jb20"),
        ("shop", SHOP),
        ("state", state),
        ("timestamp", "1760000000"),
    ];
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in params {
        query.append_pair(k, v);
    }
    query.append_pair("hmac", &sign_hex(CLIENT_SECRET, &callback_message(params)));
    stack.broker(&format!("/admin/broker/callback?{}", query.finish()))
}

#[tokio::test]
async fn test_connect_shop_end_to_end() {
    let stack = TestStack::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .and(body_partial_json(json!({
            "client_id": CLIENT_ID,
            "client_secret": CLIENT_SECRET,
            "code": "auth-code-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "shpat_from_oauth",
            "scope": "read_customers,write_customers"
        })))
        .expect(1)
        .mount(&stack.shopify)
        .await;

    let state = begin(&stack).await;
    let response = stack
        .client
        .get(signed_callback(&stack, "auth-code-1", &state))
        .send()
        .await
        .expect("request failed");
    assert_eq!(response.status(), StatusCode::FOUND);

    let shop = ShopDomain::normalize(SHOP).expect("valid shop");
    let token = stack
        .tokens
        .get(&shop)
        .await
        .expect("store readable")
        .expect("token stored");
    assert_eq!(token.access_token.expose_secret(), "shpat_from_oauth");

    let status: Value = stack
        .client
        .get(stack.broker("/admin/broker"))
        .send()
        .await
        .expect("request failed")
        .json()
        .await
        .expect("JSON body");
    assert_eq!(status["connectedShops"], json!([SHOP]));
    assert!(status.get("clientSecret").is_none());
}

#[tokio::test]
async fn test_callback_cannot_be_replayed() {
    let stack = TestStack::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "shpat_from_oauth"
        })))
        .expect(1)
        .mount(&stack.shopify)
        .await;

    let state = begin(&stack).await;
    let callback = signed_callback(&stack, "auth-code-2", &state);

    let first = stack.client.get(&callback).send().await.expect("request failed");
    assert_eq!(first.status(), StatusCode::FOUND);

    let second = stack.client.get(&callback).send().await.expect("request failed");
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forged_state_never_exchanges_code() {
    let stack = TestStack::start().await;
    Mock::given(method("POST"))
        .and(path("/admin/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&stack.shopify)
        .await;

    let _state = begin(&stack).await;
    let response = stack
        .client
        .get(signed_callback(&stack, "auth-code-3", "attacker-state"))
        .send()
        .await
        .expect("request failed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(stack.tokens.list().await.expect("store readable").is_empty());
}
