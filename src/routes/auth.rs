use crate::{
    auth::{
        error::AuthError,
        middleware::{OptionalSession, SessionUser},
        oauth::ProviderKind,
    },
    error::AppError,
    server::Server,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Authorization code and state echoed back by the provider's redirect
#[derive(Debug, Deserialize)]
pub struct CodeExchangeRequest {
    pub code: String,
    pub state: String,
}

impl CodeExchangeRequest {
    fn validate(self) -> Result<Self, AppError> {
        if self.code.trim().is_empty() || self.state.trim().is_empty() {
            return Err(AppError::bad_request(
                "Incorrect body structure",
                Some("code and state are required".to_string()),
            ));
        }
        Ok(self)
    }
}

#[derive(Debug, Serialize)]
pub struct OAuthUrlResponse {
    #[serde(rename = "authURL")]
    pub auth_url: String,
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub message: String,
    pub success: bool,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AccountsResponse {
    pub success: bool,
    pub accounts: Vec<String>,
}

pub fn create_auth_routes() -> Router<Server> {
    Router::new()
        .route("/primary", post(primary_sign_in_handler))
        .route("/{provider}", post(sign_in_handler))
        .route("/{provider}/oauth-url", get(oauth_url_handler))
}

/// Routes acting on behalf of a signed-in user; wrapped in `session_auth_middleware`
pub fn create_protected_auth_routes() -> Router<Server> {
    Router::new().route(
        "/{provider}/accounts",
        get(list_accounts_handler).post(link_account_handler),
    )
}

fn parse_provider(slug: &str) -> Result<ProviderKind, AppError> {
    ProviderKind::from_slug(slug)
        .ok_or_else(|| AuthError::UnsupportedProvider(slug.to_string()).into())
}

fn parse_body(
    payload: Result<Json<CodeExchangeRequest>, JsonRejection>,
) -> Result<CodeExchangeRequest, AppError> {
    let Json(body) = payload?;
    body.validate()
}

pub async fn oauth_url_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    OptionalSession(session): OptionalSession,
) -> Result<Json<OAuthUrlResponse>, AppError> {
    let kind = parse_provider(&provider)?;
    let auth_url = server
        .oauth
        .authorization_url(kind, session.as_ref())
        .await?;

    Ok(Json(OAuthUrlResponse {
        auth_url,
        success: true,
    }))
}

pub async fn sign_in_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    payload: Result<Json<CodeExchangeRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, AppError> {
    let kind = parse_provider(&provider)?;
    sign_in(&server, kind, parse_body(payload)?).await
}

pub async fn primary_sign_in_handler(
    State(server): State<Server>,
    payload: Result<Json<CodeExchangeRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, AppError> {
    let kind = server.oauth.providers().primary();
    sign_in(&server, kind, parse_body(payload)?).await
}

async fn sign_in(
    server: &Server,
    kind: ProviderKind,
    body: CodeExchangeRequest,
) -> Result<Json<SignInResponse>, AppError> {
    let outcome = server.oauth.sign_in(kind, &body.code, &body.state).await?;

    Ok(Json(SignInResponse {
        message: "Authentication successful".to_string(),
        success: true,
        token: outcome.token,
    }))
}

pub async fn link_account_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    SessionUser(claims): SessionUser,
    payload: Result<Json<CodeExchangeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let kind = parse_provider(&provider)?;
    let body = parse_body(payload)?;

    let outcome = server
        .oauth
        .link_account(kind, &claims, &body.code, &body.state)
        .await?;

    let mut response = json!({
        "message": format!("{} account linked successfully", outcome.provider.label()),
        "success": true,
    });
    response[format!("{}Username", outcome.provider.slug())] = json!(outcome.account);
    Ok(Json(response))
}

pub async fn list_accounts_handler(
    State(server): State<Server>,
    Path(provider): Path<String>,
    SessionUser(claims): SessionUser,
) -> Result<Json<AccountsResponse>, AppError> {
    let kind = parse_provider(&provider)?;
    let accounts = server.oauth.list_accounts(kind, &claims).await?;

    Ok(Json(AccountsResponse {
        success: true,
        accounts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!(parse_provider("google").unwrap(), ProviderKind::Google);
        assert_eq!(parse_provider("github").unwrap(), ProviderKind::GitHub);

        let err = parse_provider("gitlab").unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_PROVIDER");
    }

    #[test]
    fn test_blank_code_or_state_rejected() {
        let body = CodeExchangeRequest {
            code: "abc".to_string(),
            state: "  ".to_string(),
        };
        let err = body.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_oauth_url_response_field_name() {
        let value = serde_json::to_value(OAuthUrlResponse {
            auth_url: "https://example.com".to_string(),
            success: true,
        })
        .unwrap();
        assert_eq!(value["authURL"], "https://example.com");
    }
}
