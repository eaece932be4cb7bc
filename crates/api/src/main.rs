use std::sync::Arc;

use anyhow::Context;

use tradeledger_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tradeledger_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let services = tradeledger_api::app::services::build_services(&config)
        .await
        .context("failed to wire ledger services")?;
    let app = tradeledger_api::app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
