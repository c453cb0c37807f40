use super::config::{resolve_config_path, ClusterTrustConfig, TrustOverrides};
use super::logging;
use clustertrust::chain::RpcChainClient;
use clustertrust::cluster::{CommandReloadHook, ConfigSynchronizer, NoopReloadHook, ReloadHook};
use clustertrust::daemon::Daemon;
use clustertrust::trust::TrustEngine;
use std::sync::Arc;
use tracing::{info, warn};

/// Run the sync daemon
///
/// ## Configuration Loading
///
/// Configuration is read from `--config` if given, otherwise from
/// `~/.config/clustertrust/config.toml`. A commented default is written if
/// the file does not exist. Command-line overrides are applied on top.
///
/// The daemon resyncs commitment storage, writes the trusted peers once,
/// then follows finalized blocks until ctrl-c.
pub async fn execute(
    config_path: Option<String>,
    overrides: TrustOverrides,
    force_update: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    let mut config = ClusterTrustConfig::load_or_create(&config_path)?;
    config.apply_overrides(&overrides);
    let settings = config.engine_settings()?;

    logging::init(&config.logging)?;
    info!(
        config = %config_path.display(),
        netuid = settings.policy.netuid,
        min_stake = settings.policy.min_stake,
        time_window = settings.policy.time_window,
        endpoint = %config.chain.endpoint,
        cluster_config = %config.cluster.config_path.display(),
        force_update,
        "starting clustertrust"
    );

    let client = Arc::new(RpcChainClient::new(
        &config.chain.endpoint,
        config.request_timeout(),
        config.poll_interval(),
    ));
    let synchronizer = ConfigSynchronizer::new(
        &config.cluster.config_path,
        &config.cluster.trusted_peers_path,
        reload_hook(&config)?,
    )?;
    let engine = TrustEngine::new(client, settings);
    let mut daemon = Daemon::new(engine, synchronizer, force_update);

    daemon.run(shutdown_signal()).await?;
    info!("clustertrust stopped");
    Ok(())
}

/// The configured reload command, or a no-op.
pub fn reload_hook(
    config: &ClusterTrustConfig,
) -> Result<Box<dyn ReloadHook>, Box<dyn std::error::Error>> {
    match config.cluster.reload_command.as_deref() {
        Some(command) => Ok(Box::new(CommandReloadHook::parse(command)?)),
        None => Ok(Box::new(NoopReloadHook)),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c; run until the subscription ends");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_creates_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        assert!(!config_path.exists());

        let result = execute(
            Some(config_path.to_string_lossy().to_string()),
            TrustOverrides::default(),
            false,
        )
        .await;

        // The generated file leaves netuid for the operator.
        assert!(result.is_err());
        assert!(config_path.exists());
    }

    #[tokio::test]
    async fn test_run_fails_when_gateway_unreachable() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let config_content = r#"
[chain]
endpoint = "http://127.0.0.1:1"
request_timeout_ms = 500

[trust]
netuid = 21
min_stake = 1000.0
"#;
        std::fs::write(&config_path, config_content).unwrap();

        let result = execute(
            Some(config_path.to_string_lossy().to_string()),
            TrustOverrides::default(),
            false,
        )
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn test_reload_hook_selection() {
        let mut config = ClusterTrustConfig::default();
        assert!(reload_hook(&config).is_ok());

        config.cluster.reload_command = Some("systemctl restart ipfs-cluster".to_string());
        assert!(reload_hook(&config).is_ok());

        config.cluster.reload_command = Some("   ".to_string());
        assert!(reload_hook(&config).is_err());
    }
}
