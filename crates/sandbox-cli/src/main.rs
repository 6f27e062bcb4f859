mod cli;
mod config;
mod storage;

use std::{sync::Arc, time::Duration};

use crate::cli::ConfigCommand;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use sandbox_convert::{
    presentation3::ManifestUpgrader,
    remote::{RemoteConverter, RemoteSettings},
};
use sandbox_core::convert::DocumentConverter;
use sandbox_router::{server, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config_path = config::resolve_path(cli.config.as_deref())?;
    let config = config::load_from_path(&config_path)?;
    match cli.command.unwrap_or(cli::Command::Serve) {
        cli::Command::Serve => run_server(&config).await?,
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config).await?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config, &config_path)?,
        cli::Command::Config(ConfigCommand::Show) => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("sandbox-cli {}", env!("CARGO_PKG_VERSION"));
}

async fn run_server(config: &config::Config) -> Result<()> {
    config.validate()?;
    let backend = storage::store_from_config(config)?;
    let converter = build_converter(config)?;
    info!(
        store = %backend.describe(),
        converter = converter.name(),
        encryption = config.sandbox.encryption,
        "starting sandbox"
    );

    let router = Arc::new(Router::new(
        config.sandbox.clone(),
        backend.object_store(),
        converter,
    ));
    let listener = TcpListener::bind(config.listen).await?;

    let sweeper = (config.sweep_interval_secs > 0).then(|| {
        tokio::spawn(sweep_expired(
            backend.clone(),
            Duration::from_secs(config.sweep_interval_secs),
        ))
    });

    server::serve(listener, router, config.max_body_bytes, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    })
    .await;

    if let Some(task) = sweeper {
        task.abort();
    }
    info!("sandbox stopped");
    Ok(())
}

async fn sweep_expired(backend: storage::Backend, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match backend.purge_expired().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "swept expired objects"),
            Err(err) => warn!("expiry sweep failed: {err}"),
        }
    }
}

fn build_converter(config: &config::Config) -> Result<Arc<dyn DocumentConverter>> {
    match config.converter.kind {
        config::ConverterKind::Local => Ok(Arc::new(ManifestUpgrader)),
        config::ConverterKind::Remote => {
            let endpoint = config
                .converter
                .endpoint
                .clone()
                .ok_or_else(|| eyre!("converter.endpoint is not set"))?;
            let mut settings = RemoteSettings::new(endpoint);
            if let Some(secs) = config.converter.timeout_secs {
                settings.timeout_secs = secs;
            }
            let converter = RemoteConverter::new(settings).map_err(|e| eyre!("{e:#}"))?;
            Ok(Arc::new(converter))
        }
    }
}

/// Runs a quick health check of the configured store.
async fn run_health_check(config: &config::Config) -> Result<()> {
    config.validate()?;
    let backend = storage::store_from_config(config)?;
    storage::round_trip_probe(backend.object_store().as_ref()).await?;
    println!("Storage ({}): ok", backend.describe());
    Ok(())
}

fn init_config(config: &config::Config, path: &std::path::Path) -> Result<()> {
    let path = config::write_if_missing(config, path)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_converter_is_default() {
        let converter = build_converter(&config::Config::default()).expect("converter");
        assert_eq!(converter.name(), "presentation3");
    }

    #[test]
    fn remote_converter_uses_endpoint() {
        let cfg = config::Config {
            converter: config::ConverterConfig {
                kind: config::ConverterKind::Remote,
                endpoint: Some("http://127.0.0.1:9/convert".into()),
                timeout_secs: Some(2),
            },
            ..config::Config::default()
        };
        let converter = build_converter(&cfg).expect("converter");
        assert_eq!(converter.name(), "remote");
    }

    #[tokio::test]
    async fn health_check_passes_on_memory_store() {
        let cfg = config::Config {
            store: config::StoreKind::Memory,
            ..config::Config::default()
        };
        run_health_check(&cfg).await.expect("health");
    }

    #[tokio::test]
    async fn sweeper_purges_on_each_tick() {
        use sandbox_core::storage::{InMemoryObjectStore, ObjectStore, PutOptions};

        let store = InMemoryObjectStore::new();
        store
            .put(
                "gone",
                b"v",
                PutOptions {
                    expiration_ttl: 0,
                    metadata: None,
                },
            )
            .await
            .expect("put");
        assert_eq!(store.len(), 1);

        let task = tokio::spawn(sweep_expired(
            storage::Backend::Memory(store.clone()),
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();
        assert!(store.is_empty());
    }
}
