use std::sync::Arc;

use envconfig::Envconfig;
use keptn_observability::{TracerRegistry, init_propagation, init_tracing};
use kube::Client;
use lifecycle_operator::{config::OperatorConfig, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    init_propagation();

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    let cfg = OperatorConfig::init_from_env()?;
    info!(?cfg, "Starting lifecycle operator");

    let tracers = Arc::new(TracerRegistry::with_collector(
        cfg.telemetry.service_name.clone(),
        cfg.telemetry.collector_url.as_deref(),
    )?);

    let client = Client::try_default().await?;
    let result = runtime::run_all(client, cfg, tracers.clone()).await;
    tracers.shutdown();
    result
}
