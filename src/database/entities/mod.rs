pub mod provider_tokens;
pub mod users;

pub use provider_tokens::Entity as ProviderTokens;
pub use provider_tokens::ProviderKind;
pub use users::Entity as Users;

// Type aliases
pub type UserRecord = users::Model;
pub type ProviderTokenRecord = provider_tokens::Model;
