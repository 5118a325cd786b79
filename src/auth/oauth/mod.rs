//! OAuth 2.0 sign-in and account linking
//!
//! Google is the identity provider: signing in with it creates or finds the
//! user and mints a session token. GitHub is a storage provider: an already
//! signed-in user links one or more GitHub accounts to their profile.

pub mod flows;
pub mod linking;
pub mod providers;
pub mod state;

pub use flows::{FlowStage, LinkOutcome, OAuthFlows, SignInOutcome};
pub use linking::AccountLinkingPolicy;
pub use providers::{OAuthProvider, ProviderGrant, ProviderKind, ProviderProfile, ProviderRegistry};
pub use state::{StateError, StateRegistry, StateStore};
