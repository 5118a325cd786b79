use axum::http::StatusCode;
use chrono::Utc;
use datahub_auth::{auth::session::SessionClaims, test_utils::TestServerBuilder};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::json;

mod common;
use common::TestHarness;

fn sign(claims: &SessionClaims, secret: &str, algorithm: Algorithm) -> String {
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_issued_session_authenticates_accounts_route() {
    let harness = TestHarness::new().await;
    let (_user, token) = harness.create_user_with_session("frank@example.com").await;

    let (status, body) = harness.get("/auth/github/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "accounts": []}));
}

#[tokio::test]
async fn test_session_from_other_secret_rejected() {
    let harness = TestHarness::new().await;
    let other = TestHarness::with_builder(
        TestServerBuilder::new().with_session_secret("another-secret"),
    )
    .await;
    let (_user, token) = other.create_user_with_session("grace@example.com").await;

    let (status, body) = harness.get("/auth/github/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_expired_session_rejected() {
    let harness = TestHarness::new().await;
    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: 1,
        email: "heidi@example.com".to_string(),
        iat: now - 120,
        exp: now - 1,
    };

    let token = sign(&claims, "test-secret", Algorithm::HS256);
    let (status, _) = harness.get("/auth/github/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_non_hs256_session_rejected() {
    let harness = TestHarness::new().await;
    let claims = SessionClaims::new(1, "ivan@example.com", 3600);

    for algorithm in [Algorithm::HS384, Algorithm::HS512] {
        let token = sign(&claims, "test-secret", algorithm);
        let (status, _) = harness.get("/auth/github/accounts", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{algorithm:?}");
    }
}

#[tokio::test]
async fn test_unsigned_session_rejected() {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    let harness = TestHarness::new().await;
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
    let exp = Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"sub":1,"email":"judy@example.com","iat":0,"exp":{exp}}}"#
    ));
    let token = format!("{header}.{payload}.");

    let (status, _) = harness.get("/auth/github/accounts", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_claims_rejected() {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    let harness = TestHarness::new().await;
    let (_user, token) = harness.create_user_with_session("mallory@example.com").await;

    let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
    let exp = Utc::now().timestamp() + 3600;
    parts[1] = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"sub":9999,"email":"admin@example.com","iat":0,"exp":{exp}}}"#
    ));
    let forged = parts.join(".");

    let (status, _) = harness.get("/auth/github/accounts", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_token_from_sign_in_carries_identity() {
    let harness = TestHarness::new().await;
    let token = harness.sign_in("session-code", "kate@example.com").await;

    let claims = harness.server.session.verify(&token).unwrap();
    assert_eq!(claims.email, "kate@example.com");
    assert_eq!(
        claims.exp - claims.iat,
        harness.server.session.ttl_seconds() as i64
    );
}
