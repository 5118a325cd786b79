use crate::{
    auth::middleware::session_auth_middleware, server::Server,
    utils::request_id::RequestIdExt,
};
use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Request},
    middleware::{self, Next},
    response::Response,
};
use std::net::SocketAddr;
use tracing::info;

/// Helper functions for creating routes with common middleware patterns
pub struct RouteHelpers;

impl RouteHelpers {
    /// Nest routes that require a verified session
    pub fn with_session_auth(
        path: &str,
        routes: Router<Server>,
        server: &Server,
    ) -> Router<Server> {
        Router::new().nest(
            path,
            routes.layer(middleware::from_fn_with_state(
                server.clone(),
                session_auth_middleware,
            )),
        )
    }

    pub fn without_auth(path: &str, routes: Router<Server>) -> Router<Server> {
        Router::new().nest(path, routes)
    }
}

/// Request/response logging for the auth and health routes
pub async fn request_response_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    if !(path.starts_with("/auth") || path.starts_with("/health")) {
        return next.run(req).await;
    }

    let request_id = req.extensions().request_id();
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|connect_info| connect_info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        method = %method,
        path = %path,
        ip = %ip,
        request_id = %request_id,
        "API request"
    );

    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        latency_ms = %duration.as_millis(),
        request_id = %request_id,
        "API response"
    );

    response
}
