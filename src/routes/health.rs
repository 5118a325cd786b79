use crate::{error::AppError, health::HealthService};
use axum::{
    Router,
    extract::{Query, State},
    response::Json,
    routing::get,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct HealthCheckQuery {
    #[serde(default)]
    check: Option<String>,
}

/// Health endpoint. Without `?check=` it is a liveness probe; `?check=all` runs
/// every registered component check and `?check=<name>` runs one.
pub fn create_health_routes() -> Router<Arc<HealthService>> {
    Router::new().route("/", get(health_check))
}

async fn health_check(
    State(health_service): State<Arc<HealthService>>,
    Query(params): Query<HealthCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let health_response = health_service.check_health(params.check.as_deref()).await;

    let response_json = serde_json::to_value(&health_response)
        .map_err(|e| AppError::Internal(format!("Failed to serialize health response: {}", e)))?;

    Ok(Json(response_json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::JwtSessionService;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn create_test_health_service() -> Arc<HealthService> {
        let health_service = Arc::new(HealthService::new());
        let session = JwtSessionService::new("test-secret", 3600).unwrap();
        health_service.register(session.health_checker()).await;
        health_service
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_basic() {
        let app = create_health_routes().with_state(create_test_health_service().await);
        let (status, body) = get_json(app, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["checks"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_health_check_with_all_query() {
        let app = create_health_routes().with_state(create_test_health_service().await);
        let (status, body) = get_json(app, "/?check=all").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["session"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_health_check_with_unknown_query() {
        let app = create_health_routes().with_state(create_test_health_service().await);
        let (status, body) = get_json(app, "/?check=unknown").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["checks"].as_object().unwrap().is_empty());
    }
}
