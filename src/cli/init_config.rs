use super::config::{default_cluster_config_path, resolve_config_path, ClusterTrustConfig};
use std::path::PathBuf;

/// Write a commented default configuration file
///
/// Refuses to replace an existing file unless `force` is set.
pub fn execute(
    config_path: Option<String>,
    cluster_config: Option<String>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    if config_path.exists() && !force {
        return Err(format!(
            "Config file '{}' already exists (use --force to overwrite)",
            config_path.display()
        )
        .into());
    }

    let cluster_config = cluster_config
        .map(PathBuf::from)
        .unwrap_or_else(default_cluster_config_path);
    ClusterTrustConfig::create_default(&config_path, &cluster_config)?;

    println!("📝 Wrote {}", config_path.display());
    println!("   Set trust.netuid and trust.min_stake before running the daemon.");
    Ok(())
}
