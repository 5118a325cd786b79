pub mod config;
pub mod route_builder;

use crate::{
    auth::{
        oauth::{AccountLinkingPolicy, OAuthFlows, ProviderRegistry, StateRegistry},
        session::{JwtSessionService, SessionService},
    },
    config::Config,
    database::{DatabaseManager, DatabaseManagerImpl},
    error::AppError,
    health::HealthService,
    routes::{create_auth_routes, create_health_routes, create_protected_auth_routes},
    server::route_builder::{RouteHelpers, request_response_logger},
    utils::request_id::request_id_middleware,
};
use axum::{Router, middleware};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

#[derive(Clone)]
pub struct Server {
    pub config: Arc<Config>,
    pub session: Arc<dyn SessionService>,
    pub oauth: Arc<OAuthFlows>,
    pub health_service: Arc<HealthService>,
    pub database: Arc<dyn DatabaseManager>,
}

impl Server {
    pub async fn new(config: Config) -> Result<Self, AppError> {
        let session_impl =
            JwtSessionService::new(&config.session.secret, config.session.ttl_seconds)?;
        let session_health = session_impl.health_checker();
        let session: Arc<dyn SessionService> = Arc::new(session_impl);

        let database_impl = Arc::new(DatabaseManagerImpl::new_from_config(&config).await?);
        let database: Arc<dyn DatabaseManager> = database_impl.clone();

        let state = StateRegistry::from_config(&config.state)
            .map_err(|e| AppError::Internal(format!("Failed to initialize state store: {}", e)))?;
        let providers = ProviderRegistry::from_config(&config)?;
        info!(
            providers = ?providers.configured(),
            primary = %providers.primary(),
            "OAuth providers initialized"
        );

        let linking = AccountLinkingPolicy::new(Arc::new(database.provider_tokens()));
        let oauth = Arc::new(OAuthFlows::new(
            providers,
            state.clone(),
            linking,
            Arc::new(database.users()),
            session.clone(),
        ));

        let health_service = Arc::new(HealthService::new());
        health_service.register(database_impl).await;
        health_service.register(state.health_checker()).await;
        health_service.register(session_health).await;

        Ok(Self {
            config: Arc::new(config),
            session,
            oauth,
            health_service,
            database,
        })
    }

    pub async fn run(&self) -> Result<(), AppError> {
        if self.config.database.migration_on_startup {
            self.database.migrate().await?;
        }

        let app = self.create_app();

        let addr: SocketAddr = format!("{}:{}", self.config.server.host, self.config.server.port)
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid listen address: {}", e)))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind to address: {}", e)))?;

        info!("Server listening on http://{}", addr);

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        if let Err(e) = result {
            error!("Server error: {}", e);
            return Err(AppError::Internal(format!("Server error: {}", e)));
        }

        info!("Server shutdown complete");
        Ok(())
    }

    // Creates an application router
    pub fn create_app(&self) -> Router {
        let mut app = Router::new()
            .merge(RouteHelpers::without_auth("/auth", create_auth_routes()))
            .merge(RouteHelpers::with_session_auth(
                "/auth",
                create_protected_auth_routes(),
                self,
            ))
            .nest(
                "/health",
                create_health_routes().with_state(self.health_service.clone()),
            )
            .with_state(self.clone());

        if self.config.logging.log_request {
            app = app.layer(middleware::from_fn(request_response_logger));
        }
        app.layer(middleware::from_fn(request_id_middleware))
    }
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
    info!("Graceful shutdown initiated");
}
