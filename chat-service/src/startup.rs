//! Application assembly: state, router and the HTTP server lifecycle.

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{ChatConfig, ProviderKind};
use crate::handlers::{
    billing::billing_webhook,
    chat::{delete_conversation, get_conversation, get_credits, stream_chat},
    executions::list_executions,
    health::{health_check, readiness_check},
    metrics::metrics_handler,
};
use crate::middleware::auth_middleware;
use crate::services::providers::mock::MockChatProvider;
use crate::services::providers::openrouter::{OpenRouterConfig, OpenRouterProvider};
use crate::services::providers::ChatProvider;
use crate::services::{ChatOrchestrator, CreditLedger, Database, JwtService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ChatConfig>,
    pub db: Database,
    pub jwt_service: Arc<JwtService>,
    pub orchestrator: ChatOrchestrator,
    pub provider: Arc<dyn ChatProvider>,
}

/// The built application: bound listener plus router, not yet serving.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    db: Database,
}

impl Application {
    /// Wire up state, routes and the listener.
    pub async fn build(config: ChatConfig) -> Result<Self, AppError> {
        let db = Database::new(&config.database.url, config.database.max_connections).await?;

        let jwt_service = Arc::new(JwtService::new(&config.jwt)?);

        let provider: Arc<dyn ChatProvider> = match config.provider.kind {
            ProviderKind::Mock => Arc::new(MockChatProvider::new()),
            ProviderKind::OpenRouter => Arc::new(
                OpenRouterProvider::new(OpenRouterConfig {
                    api_key: config.provider.api_key.clone(),
                    base_url: config.provider.base_url.clone(),
                    idle_timeout: std::time::Duration::from_secs(
                        config.provider.idle_timeout_secs,
                    ),
                })
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Provider setup: {}", e)))?,
            ),
        };

        let ledger = CreditLedger::new(db.clone());
        let orchestrator = ChatOrchestrator::new(
            db.clone(),
            ledger.clone(),
            provider.clone(),
            config.chat.turn_cost,
        );

        let port = config.common.port;
        let state = AppState {
            config: Arc::new(config),
            db: db.clone(),
            jwt_service,
            orchestrator,
            provider,
        };

        let router = build_router(state);

        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
            db,
        })
    }

    /// The port the listener is bound to (useful with port 0 in tests).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Handle to the database pool, for test setup.
    pub fn db(&self) -> Database {
        self.db.clone()
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/billing/webhook", post(billing_webhook));

    let protected = Router::new()
        .route("/ai/chat", post(stream_chat))
        .route("/ai/chat/:id", delete(delete_conversation))
        .route("/ai/credits", get(get_credits))
        .route("/ai/conversations/:id", get(get_conversation))
        .route("/execution", get(list_executions))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}
