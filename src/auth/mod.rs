pub mod config;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod session;

pub use error::AuthError;
pub use middleware::{OptionalSession, SessionUser, session_auth_middleware};
pub use session::{JwtSessionService, SessionClaims, SessionService};
