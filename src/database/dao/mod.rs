pub mod provider_tokens;
pub mod users;

pub use provider_tokens::ProviderTokensDao;
pub use users::UsersDao;
