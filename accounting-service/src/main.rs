use accounting_service::{config::Config, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
