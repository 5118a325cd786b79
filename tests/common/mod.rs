#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use datahub_auth::{
    Server,
    database::entities::UserRecord,
    test_utils::{TestServerBuilder, create_test_user, session_token_for},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

/// Server wired to wiremock-backed Google and GitHub endpoints
pub struct TestHarness {
    pub server: Server,
    pub app: Router,
    pub providers: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_builder(TestServerBuilder::new()).await
    }

    /// Start the mock providers and build the server from `builder`
    pub async fn with_builder(builder: TestServerBuilder) -> Self {
        let providers = MockServer::start().await;
        let server = builder
            .with_provider_base_url(&providers.uri())
            .build()
            .await;
        let app = server.create_app();

        Self {
            server,
            app,
            providers,
        }
    }

    pub async fn make_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.make_request(RequestBuilder::get(uri, token)).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: &Value,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        self.make_request(RequestBuilder::post_json(uri, body, token))
            .await
    }

    /// Request an authorization URL and return the state it carries
    pub async fn issue_state(&self, provider: &str, token: Option<&str>) -> String {
        let (status, body) = self
            .get(&format!("/auth/{provider}/oauth-url"), token)
            .await;
        assert_eq!(status, StatusCode::OK, "oauth-url failed: {body}");
        state_from_url(body["authURL"].as_str().unwrap())
    }

    /// Google answers `code` with a token and a profile for `email`
    pub async fn mock_google_sign_in(&self, code: &str, email: &str, name: &str) {
        let access_token = format!("google-access-{code}");
        Mock::given(method("POST"))
            .and(path("/google/token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3599,
                "refresh_token": format!("google-refresh-{code}"),
                "scope": "openid email profile"
            })))
            .mount(&self.providers)
            .await;

        Mock::given(method("GET"))
            .and(path("/google/userinfo"))
            .and(wiremock::matchers::header(
                "authorization",
                format!("Bearer {access_token}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "1234567890",
                "email": email,
                "verified_email": true,
                "name": name
            })))
            .mount(&self.providers)
            .await;
    }

    /// GitHub answers `code` with a token and a profile for `login`
    pub async fn mock_github_link(&self, code: &str, login: &str) {
        let access_token = format!("gho_{code}");
        Mock::given(method("POST"))
            .and(path("/github/access_token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access_token,
                "token_type": "bearer",
                "scope": "repo,delete_repo"
            })))
            .mount(&self.providers)
            .await;

        Mock::given(method("GET"))
            .and(path("/github/user"))
            .and(wiremock::matchers::header(
                "authorization",
                format!("Bearer {access_token}").as_str(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "login": login,
                "id": 583231,
                "name": null,
                "email": null
            })))
            .mount(&self.providers)
            .await;
    }

    /// Full primary sign-in, returning the session token
    pub async fn sign_in(&self, code: &str, email: &str) -> String {
        self.mock_google_sign_in(code, email, "Test User").await;
        let state = self.issue_state("google", None).await;
        let (status, body) = self
            .post_json("/auth/google", &json!({"code": code, "state": state}), None)
            .await;
        assert_eq!(status, StatusCode::OK, "sign-in failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_user_with_session(&self, email: &str) -> (UserRecord, String) {
        let user = create_test_user(&self.server, email).await;
        let token = session_token_for(&self.server, &user);
        (user, token)
    }

    pub async fn user_count(&self) -> usize {
        use sea_orm::{EntityTrait, PaginatorTrait};
        datahub_auth::database::entities::Users::find()
            .count(self.server.database.connection())
            .await
            .unwrap() as usize
    }
}

pub fn state_from_url(auth_url: &str) -> String {
    Url::parse(auth_url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap()
}

/// Builders for common request shapes
pub struct RequestBuilder;

impl RequestBuilder {
    pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
        Self::post_raw(uri, &body.to_string(), token)
    }

    pub fn post_raw(uri: &str, body: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }
}
