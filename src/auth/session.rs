use crate::{
    auth::error::AuthError,
    health::{HealthCheckResult, HealthChecker},
};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Claims carried by the broker's own session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i32, // Database user ID
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(user_id: i32, email: impl Into<String>, expires_in_seconds: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            email: email.into(),
            iat: now,
            exp: now.saturating_add(i64::try_from(expires_in_seconds).unwrap_or(i64::MAX)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }
}

/// Session token service trait for dependency injection and testing
pub trait SessionService: Send + Sync {
    /// Mint a session token for a user
    fn issue(&self, user_id: i32, email: &str) -> Result<String, AuthError>;

    /// Verify signature, algorithm and expiry
    fn verify(&self, token: &str) -> Result<SessionClaims, AuthError>;

    fn ttl_seconds(&self) -> u64;
}

/// HS256 session tokens signed with a shared secret
#[derive(Clone)]
pub struct JwtSessionService {
    ttl_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtSessionService {
    pub fn new(secret: &str, ttl_seconds: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::session_failed("session signing secret is empty"));
        }
        if ttl_seconds == 0 {
            return Err(AuthError::session_failed("session TTL must be positive"));
        }

        Ok(Self {
            ttl_seconds,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Create a health checker for this session service
    pub fn health_checker(&self) -> Arc<SessionHealthChecker> {
        Arc::new(SessionHealthChecker {
            service: self.clone(),
        })
    }

    fn validation() -> Validation {
        // Pinned to HS256: tokens whose header names any other alg fail decoding
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation
    }
}

impl SessionService for JwtSessionService {
    fn issue(&self, user_id: i32, email: &str) -> Result<String, AuthError> {
        let claims = SessionClaims::new(user_id, email, self.ttl_seconds);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(AuthError::session_failed)
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let token_data = decode::<SessionClaims>(token, &self.decoding_key, &Self::validation())
            .map_err(|e| {
                tracing::debug!("Session token rejected: {}", e);
                AuthError::unauthenticated("Invalid or expired token")
            })?;

        Ok(token_data.claims)
    }

    fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }
}

/// Health checker that signs and verifies a throwaway token
pub struct SessionHealthChecker {
    service: JwtSessionService,
}

#[async_trait]
impl HealthChecker for SessionHealthChecker {
    fn name(&self) -> &str {
        "session"
    }

    async fn check(&self) -> HealthCheckResult {
        let verified = self
            .service
            .issue(0, "health@localhost")
            .and_then(|token| self.service.verify(&token));

        match verified {
            Ok(claims) if claims.sub == 0 => {
                HealthCheckResult::healthy_with_details(serde_json::json!({
                    "algorithm": "HS256",
                    "ttl_seconds": self.service.ttl_seconds,
                }))
            }
            Ok(_) => {
                HealthCheckResult::unhealthy("Session round trip returned wrong claims".to_string())
            }
            Err(err) => HealthCheckResult::unhealthy(format!("Session round trip failed: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStatus;

    fn service() -> JwtSessionService {
        JwtSessionService::new("test-secret", 3600).unwrap()
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = service();
        let token = service.issue(7, "alice@example.com").unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.exp - claims.iat, 3600);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = service().issue(7, "alice@example.com").unwrap();
        let other = JwtSessionService::new("other-secret", 3600).unwrap();

        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let mut claims = SessionClaims::new(7, "alice@example.com", 3600);
        claims.iat -= 7200;
        claims.exp = Utc::now().timestamp() - 1;
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(claims.is_expired());
        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_other_algorithms_are_rejected() {
        let claims = SessionClaims::new(7, "alice@example.com", 3600);
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(service().verify(&token).is_err());
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(service().verify("not.a.jwt").is_err());
        assert!(service().verify("").is_err());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let err = JwtSessionService::new("", 3600).err().unwrap();
        assert_eq!(err.code(), "JWT_GENERATION_FAILED");
    }

    #[tokio::test]
    async fn test_health_checker() {
        let result = service().health_checker().check().await;
        assert!(matches!(result.status, HealthStatus::Healthy));
    }
}
