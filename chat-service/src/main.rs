use chat_service::config::ChatConfig;
use chat_service::services::metrics::init_metrics;
use chat_service::Application;
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    init_tracing("chat-service", "info");
    init_metrics();

    let config = ChatConfig::load()?;
    let application = Application::build(config).await?;

    tracing::info!(port = application.port(), "Starting chat-service");

    application.run_until_stopped().await?;

    Ok(())
}
