use crate::auth::session::{SessionClaims, SessionService};
use crate::error::AppError;
use crate::server::Server;
use crate::utils::request_id::RequestIdExt;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};

/// Session authentication middleware for routes that act on behalf of a signed-in user.
/// Verified claims are added to request extensions.
pub async fn session_auth_middleware(
    State(server): State<Server>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let request_id = request.extensions().request_id();
    let claims = authenticate(request.headers(), server.session.as_ref()).inspect_err(|e| {
        warn!(request_id = %request_id, "Session authentication failed: {}", e);
    })?;

    trace!(user_id = claims.sub, request_id = %request_id, "Session authentication successful");
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Verify the `Authorization: Bearer <token>` header
pub fn authenticate(
    headers: &HeaderMap,
    session: &dyn SessionService,
) -> Result<SessionClaims, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Authorization header required".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Authorization header must start with 'Bearer '".to_string())
    })?;
    if token.is_empty() {
        return Err(AppError::Unauthorized("JWT token required".to_string()));
    }

    Ok(session.verify(token)?)
}

/// Claims of the signed-in user, set by `session_auth_middleware`
pub struct SessionUser(pub SessionClaims);

impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(SessionUser)
            .ok_or_else(|| AppError::Unauthorized("Missing user authentication".to_string()))
    }
}

/// Claims when the request carries a valid session, for routes that are
/// public for some providers
pub struct OptionalSession(pub Option<SessionClaims>);

impl FromRequestParts<Server> for OptionalSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        server: &Server,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(OptionalSession(None));
        }
        match authenticate(&parts.headers, server.session.as_ref()) {
            Ok(claims) => Ok(OptionalSession(Some(claims))),
            Err(e) => {
                trace!("Ignoring unusable session: {}", e);
                Ok(OptionalSession(None))
            }
        }
    }
}
