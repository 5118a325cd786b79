use axum::http::StatusCode;
use thiserror::Error;

/// Failures of the sign-in and account-linking flows.
///
/// Every variant carries a human-readable message and an optional underlying
/// cause that is surfaced to the client as `details`.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{message}")]
    InvalidState {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    ExchangeFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    RefreshFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    ProfileFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    UserCreationFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    PersistFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    SessionFailed {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    Unauthenticated {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    StateUnavailable {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    AccountsUnavailable {
        message: String,
        details: Option<String>,
    },
    #[error("{message}")]
    ProviderMisconfigured {
        message: String,
        details: Option<String>,
    },
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
}

impl AuthError {
    pub fn invalid_state() -> Self {
        AuthError::InvalidState {
            message: "Invalid or expired state parameter".to_string(),
            details: None,
        }
    }

    pub fn exchange_failed(details: impl ToString) -> Self {
        AuthError::ExchangeFailed {
            message: "Failed to exchange authorization code".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn refresh_failed(details: impl ToString) -> Self {
        AuthError::RefreshFailed {
            message: "Failed to refresh access token".to_string(),
            details: Some(details.to_string()),
        }
    }

    /// Token endpoint failures on the refresh path keep their details
    pub fn into_refresh_failure(self) -> Self {
        match self {
            AuthError::ExchangeFailed { details, .. } => AuthError::RefreshFailed {
                message: "Failed to refresh access token".to_string(),
                details,
            },
            other => other,
        }
    }

    pub fn profile_failed(details: impl ToString) -> Self {
        AuthError::ProfileFailed {
            message: "Failed to retrieve user information".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn user_creation_failed(details: impl ToString) -> Self {
        AuthError::UserCreationFailed {
            message: "Failed to create or find user".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn persist_failed(details: impl ToString) -> Self {
        AuthError::PersistFailed {
            message: "Failed to store provider token".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn session_failed(details: impl ToString) -> Self {
        AuthError::SessionFailed {
            message: "Failed to generate session token".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        AuthError::Unauthenticated {
            message: message.into(),
            details: None,
        }
    }

    pub fn state_unavailable(details: impl ToString) -> Self {
        AuthError::StateUnavailable {
            message: "Failed to generate state parameter".to_string(),
            details: Some(details.to_string()),
        }
    }

    pub fn state_check_failed(details: impl ToString) -> Self {
        AuthError::StateUnavailable {
            message: "Failed to verify state parameter".to_string(),
            details: Some(details.to_string()),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidState { .. } => "INVALID_STATE",
            AuthError::ExchangeFailed { .. } => "TOKEN_EXCHANGE_FAILED",
            AuthError::RefreshFailed { .. } => "TOKEN_REFRESH_FAILED",
            AuthError::ProfileFailed { .. } => "USER_INFO_FAILED",
            AuthError::UserCreationFailed { .. } => "USER_CREATION_FAILED",
            AuthError::PersistFailed { .. } => "TOKEN_STORAGE_FAILED",
            AuthError::SessionFailed { .. } => "JWT_GENERATION_FAILED",
            AuthError::Unauthenticated { .. } => "UNAUTHENTICATED",
            AuthError::StateUnavailable { .. } => "STATE_GENERATION_FAILED",
            AuthError::AccountsUnavailable { .. } => "ACCOUNTS_RETRIEVAL_FAILED",
            AuthError::ProviderMisconfigured { .. } => "PROVIDER_CONFIGURATION_ERROR",
            AuthError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidState { .. }
            | AuthError::ExchangeFailed { .. }
            | AuthError::RefreshFailed { .. }
            | AuthError::ProfileFailed { .. } => StatusCode::BAD_REQUEST,
            AuthError::UnsupportedProvider(_) => StatusCode::NOT_FOUND,
            AuthError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AuthError::UserCreationFailed { .. }
            | AuthError::PersistFailed { .. }
            | AuthError::SessionFailed { .. }
            | AuthError::StateUnavailable { .. }
            | AuthError::AccountsUnavailable { .. }
            | AuthError::ProviderMisconfigured { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn details(&self) -> Option<&str> {
        match self {
            AuthError::InvalidState { details, .. }
            | AuthError::ExchangeFailed { details, .. }
            | AuthError::RefreshFailed { details, .. }
            | AuthError::ProfileFailed { details, .. }
            | AuthError::UserCreationFailed { details, .. }
            | AuthError::PersistFailed { details, .. }
            | AuthError::SessionFailed { details, .. }
            | AuthError::Unauthenticated { details, .. }
            | AuthError::StateUnavailable { details, .. }
            | AuthError::AccountsUnavailable { details, .. }
            | AuthError::ProviderMisconfigured { details, .. } => details.as_deref(),
            AuthError::UnsupportedProvider(_) => None,
        }
    }
}
