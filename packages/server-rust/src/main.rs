//! Standalone server entrypoint.
//!
//! Starts an empty-registry server: health endpoints answer, every other
//! path goes through the dispatch pipeline. Hosts embedding the crate
//! build their own registry and wire the module themselves.

use std::sync::Arc;

use restgate_server::dispatch::{
    AllowAll, Dispatcher, DispatcherConfig, HeaderSessionId, MemorySessionStore, RegistryBuilder,
};
use restgate_server::network::{NetworkConfig, NetworkModule};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let registry = Arc::new(RegistryBuilder::new().freeze());
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(HeaderSessionId::default()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(AllowAll),
        DispatcherConfig::default(),
    ));

    let mut module = NetworkModule::new(NetworkConfig::default(), dispatcher);
    let port = module.start().await?;
    info!("listening on port {port}");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
