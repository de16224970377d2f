use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use omnigate_common::GatewayConfig;
use omnigate_core::{ChatCore, ChatSettings, RequestLogSink, UpstreamClientConfig, WreqUpstreamClient};
use omnigate_provider_impl::builtin_registry;
use omnigate_router::{CredentialStore, ProxyState, proxy_router};

mod cli;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("omnigate failed: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = GatewayConfig::load(&cli.config)?;
    config.overlay(cli.overrides());
    config.validate()?;
    info!(
        event = "config_loaded",
        path = %cli.config.display(),
        host = %config.host,
        port = config.port,
        proxy = %config.proxy.as_deref().unwrap_or(""),
        providers = config.enabled_providers().count(),
        "config loaded"
    );

    omnigate_transform::ensure_initialized()
        .await
        .context("translator registry")?;

    let registry = builtin_registry();
    let store = Arc::new(CredentialStore::from_config(&config, &registry));
    for name in store.providers() {
        info!(event = "provider_ready", provider = %name);
    }

    let client = WreqUpstreamClient::new(UpstreamClientConfig::from_gateway(&config))
        .context("build upstream client")?;
    let mut core = ChatCore::new(Arc::new(registry), Arc::new(client), ChatSettings::from_config(&config));
    if let Some(dir) = &config.log_dir {
        info!(event = "request_log_enabled", dir = %dir.display());
        core = core.with_request_log(RequestLogSink::spawn(dir.clone()));
    }

    let bind = format!("{}:{}", config.host, config.port);
    let app = proxy_router(ProxyState {
        core: Arc::new(core),
        store,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(event = "listening", addr = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("omnigate=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!(event = "shutdown", "ctrl-c received");
    }
}
