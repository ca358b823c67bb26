use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use graphweave::{
    DelegatingQueryExecutor, GatewayConfig, GatewayError, LINK_TYPE_DEFS, MergedSchema,
    StitchGateway, StitchQueryPlanner, link_rules, schema_loader,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Any failure before the listener is up is fatal: the gateway never
    // serves a partially built schema.
    if let Err(e) = run().await {
        error!(error = %e, "gateway failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), GatewayError> {
    let config = GatewayConfig::from_env()?;
    let client = reqwest::Client::new();

    let upstreams = config.upstreams();
    info!(upstreams = upstreams.len(), "introspecting upstreams");
    let remotes = schema_loader::load_all(&client, &upstreams).await?;

    let schema = MergedSchema::new(remotes, LINK_TYPE_DEFS, link_rules())?;

    let gateway = Arc::new(StitchGateway::new(
        schema,
        Box::new(StitchQueryPlanner::new()),
        Box::new(DelegatingQueryExecutor::new()),
    ));

    graphweave::server::serve(gateway, config.port).await?;
    Ok(())
}
