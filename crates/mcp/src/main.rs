use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{self, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ncbi_mcp::providers::Providers;
use ncbi_mcp::{build_registry, McpServer, ServerConfig};

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::from_args()?;
    init_tracing(config.debug);

    if config.eutils.api_key.is_none() {
        warn!("no NCBI API key configured; E-utilities requests are rate limited");
    }
    if config.eutils.email.is_none() {
        warn!("no contact email configured; NCBI asks clients to identify themselves");
    }

    let providers = Providers::connect(&config).await;
    let registry = build_registry(&providers).context("failed to register tools")?;
    info!(
        tools = registry.len(),
        datasets = providers.datasets.is_some(),
        strictness = ?config.strictness,
        "registry ready"
    );

    let server = McpServer::new(Arc::new(registry), config.strictness);
    server
        .serve(BufReader::new(io::stdin()), io::stdout())
        .await
        .context("stdio transport failed")?;

    Ok(())
}
