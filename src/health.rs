use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "ok")]
    Healthy,
    #[serde(rename = "degraded")]
    Degraded,
    #[serde(rename = "unhealthy")]
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl HealthCheckResult {
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            details: None,
            duration_ms: None,
        }
    }

    pub fn healthy_with_details(details: serde_json::Value) -> Self {
        Self {
            details: Some(details),
            ..Self::healthy()
        }
    }

    pub fn unhealthy(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message),
            details: None,
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// The name of this health check component
    fn name(&self) -> &str;

    /// Perform the health check
    async fn check(&self) -> HealthCheckResult;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallHealthResponse {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: String,
    pub checks: BTreeMap<String, HealthCheckResult>,
}

pub struct HealthService {
    checkers: RwLock<BTreeMap<String, Arc<dyn HealthChecker>>>,
}

impl HealthService {
    pub fn new() -> Self {
        Self {
            checkers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a health checker for a specific component
    pub async fn register(&self, checker: Arc<dyn HealthChecker>) {
        let name = checker.name().to_string();
        self.checkers.write().await.insert(name, checker);
    }

    /// Run all checks (`all`), one named check, or none for a liveness probe
    pub async fn check_health(&self, filter: Option<&str>) -> OverallHealthResponse {
        let checkers = self.checkers.read().await;
        let mut results = BTreeMap::new();

        let checks_to_run: Vec<_> = match filter {
            Some("all") => checkers.iter().collect(),
            Some(specific) => checkers
                .iter()
                .filter(|(name, _)| name.as_str() == specific)
                .collect(),
            None => vec![],
        };

        for (name, checker) in checks_to_run {
            let start = Instant::now();
            let result = checker
                .check()
                .await
                .with_duration(start.elapsed().as_millis() as u64);
            results.insert(name.clone(), result);
        }

        let overall_status = if results
            .values()
            .any(|r: &HealthCheckResult| r.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else if results.values().any(|r| r.status == HealthStatus::Degraded) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        OverallHealthResponse {
            status: overall_status,
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            checks: results,
        }
    }

    pub async fn registered_checkers(&self) -> Vec<String> {
        self.checkers.read().await.keys().cloned().collect()
    }
}

impl Default for HealthService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedChecker(&'static str, HealthStatus);

    #[async_trait]
    impl HealthChecker for FixedChecker {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> HealthCheckResult {
            match self.1 {
                HealthStatus::Healthy => HealthCheckResult::healthy(),
                HealthStatus::Degraded => HealthCheckResult {
                    status: HealthStatus::Degraded,
                    ..HealthCheckResult::healthy()
                },
                HealthStatus::Unhealthy => HealthCheckResult::unhealthy("down".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn test_liveness_runs_no_checks() {
        let service = HealthService::new();
        service
            .register(Arc::new(FixedChecker("database", HealthStatus::Unhealthy)))
            .await;

        let response = service.check_health(None).await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert!(response.checks.is_empty());
        assert_eq!(response.service, "datahub-auth");
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let service = HealthService::new();
        service
            .register(Arc::new(FixedChecker("database", HealthStatus::Healthy)))
            .await;
        service
            .register(Arc::new(FixedChecker("state", HealthStatus::Degraded)))
            .await;

        let response = service.check_health(Some("all")).await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks.len(), 2);
        assert!(response.checks["database"].duration_ms.is_some());

        service
            .register(Arc::new(FixedChecker("session", HealthStatus::Unhealthy)))
            .await;
        let response = service.check_health(Some("all")).await;
        assert_eq!(response.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_specific_check() {
        let service = HealthService::new();
        service
            .register(Arc::new(FixedChecker("database", HealthStatus::Healthy)))
            .await;
        service
            .register(Arc::new(FixedChecker("state", HealthStatus::Unhealthy)))
            .await;

        let response = service.check_health(Some("database")).await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert!(response.checks.contains_key("database"));
        assert!(!response.checks.contains_key("state"));
        assert_eq!(
            service.registered_checkers().await,
            vec!["database".to_string(), "state".to_string()]
        );
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_value(HealthStatus::Healthy).unwrap(), "ok");
        assert_eq!(
            serde_json::to_value(HealthStatus::Unhealthy).unwrap(),
            "unhealthy"
        );
    }
}
