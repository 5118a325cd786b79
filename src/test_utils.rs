use crate::{
    auth::config::ProviderConfig,
    config::Config,
    database::entities::UserRecord,
    server::Server,
};

/// Configuration with in-memory backends and dummy provider credentials
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.secret = "test-secret".to_string();
    config.state.backend = "memory".to_string();
    // Every pooled connection to `sqlite::memory:` is a separate database
    config.database.url = "sqlite::memory:".to_string();
    config.database.max_connections = 1;
    config.logging.log_request = false;
    config.oauth.google = configured(ProviderConfig::google(), "google");
    config.oauth.github = configured(ProviderConfig::github(), "github");
    config
}

fn configured(mut provider: ProviderConfig, name: &str) -> ProviderConfig {
    provider.client_id = format!("{name}-client-id");
    provider.client_secret = format!("{name}-client-secret");
    provider.callback_url = format!("http://localhost:3000/auth/{name}/callback");
    provider
}

/// Test server builder for creating test instances over in-memory backends
pub struct TestServerBuilder {
    config: Config,
}

impl TestServerBuilder {
    pub fn new() -> Self {
        Self {
            config: test_config(),
        }
    }

    /// Set a custom configuration
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set a custom session signing secret
    pub fn with_session_secret(mut self, secret: &str) -> Self {
        self.config.session.secret = secret.to_string();
        self
    }

    /// Point both providers at a mock server.
    ///
    /// Google uses `/google/{authorize,token,userinfo}`, GitHub uses
    /// `/github/{authorize,access_token,user}`.
    pub fn with_provider_base_url(mut self, base_url: &str) -> Self {
        let google = &mut self.config.oauth.google;
        google.authorization_url = format!("{base_url}/google/authorize");
        google.token_url = format!("{base_url}/google/token");
        google.user_info_url = format!("{base_url}/google/userinfo");

        let github = &mut self.config.oauth.github;
        github.authorization_url = format!("{base_url}/github/authorize");
        github.token_url = format!("{base_url}/github/access_token");
        github.user_info_url = format!("{base_url}/github/user");
        self
    }

    /// Shorten provider call timeouts
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.config.oauth.request_timeout_seconds = seconds;
        self
    }

    /// Leave GitHub without client credentials
    pub fn without_github(mut self) -> Self {
        self.config.oauth.github.client_id.clear();
        self.config.oauth.github.client_secret.clear();
        self
    }

    /// Build the test server and run migrations
    pub async fn build(self) -> Server {
        let server = Server::new(self.config).await.unwrap();
        server.database.migrate().await.unwrap();
        server
    }
}

impl Default for TestServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert a user directly, bypassing the sign-in flow
pub async fn create_test_user(server: &Server, email: &str) -> UserRecord {
    server.database.users().create(email, "Test User").await.unwrap()
}

/// Mint a session token for a user
pub fn session_token_for(server: &Server, user: &UserRecord) -> String {
    server.session.issue(user.id, &user.email).unwrap()
}
