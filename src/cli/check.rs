use super::config::{resolve_config_path, ClusterTrustConfig, TrustOverrides};
use super::logging;
use super::run::reload_hook;
use clustertrust::chain::traits::{BlockNumber, ChainClient, ChainError};
use clustertrust::chain::{ClusterId, RpcChainClient};
use clustertrust::cluster::ConfigSynchronizer;
use clustertrust::trust::{
    EngineSettings, Inscription, TrustEngine, TrustEvaluator, TrustSetManager, Verdict,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Verdicts for every known inscription at one block.
pub struct AuditReport {
    pub block: BlockNumber,
    pub verdicts: Vec<(Inscription, Verdict)>,
    pub trusted: BTreeSet<ClusterId>,
}

/// Evaluate every inscription once at the finalized head and print the
/// result. With `write`, the trusted peers are also synced to the cluster
/// config.
pub async fn execute(
    config_path: Option<String>,
    overrides: TrustOverrides,
    write: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config_path);
    let mut config = ClusterTrustConfig::load(&config_path)?;
    config.apply_overrides(&overrides);
    let settings = config.engine_settings()?;
    logging::init(&config.logging)?;

    let client = Arc::new(RpcChainClient::new(
        &config.chain.endpoint,
        config.request_timeout(),
        config.poll_interval(),
    ));
    let report = audit(client, settings).await?;
    print_report(&report);

    if write {
        let synchronizer = ConfigSynchronizer::new(
            &config.cluster.config_path,
            &config.cluster.trusted_peers_path,
            reload_hook(&config)?,
        )?;
        if synchronizer.sync(&report.trusted, false)? {
            println!("📝 Updated {}", config.cluster.config_path.display());
        } else {
            println!("Cluster config already up to date");
        }
    }

    Ok(())
}

/// Resync commitment storage and evaluate it at the finalized head.
pub async fn audit<C: ChainClient + ?Sized>(
    client: Arc<C>,
    settings: EngineSettings,
) -> Result<AuditReport, ChainError> {
    let head = client.finalized_head().await?;
    let mut engine = TrustEngine::new(client.clone(), settings);
    engine.resync(head.number).await?;

    let settings = engine.settings();
    let evaluator = TrustEvaluator::new(client.as_ref(), &settings.policy);
    let mut verdicts = TrustSetManager::evaluate_all(
        engine.store().snapshot(),
        &evaluator,
        head.number,
        settings.max_concurrent_queries,
    )
    .await;
    verdicts.sort_by(|a, b| a.0.participant.cmp(&b.0.participant));

    let mut manager = TrustSetManager::new();
    manager.apply(verdicts.clone(), head.number);

    Ok(AuditReport {
        block: head.number,
        verdicts,
        trusted: manager.trusted().clone(),
    })
}

fn print_report(report: &AuditReport) {
    println!("Finalized block: {}", report.block);
    println!("Inscriptions: {}", report.verdicts.len());
    println!();
    for (inscription, verdict) in &report.verdicts {
        match verdict {
            Verdict::Trusted => println!(
                "  ✅ {} {} (block {})",
                inscription.participant.short(),
                inscription.cluster_id,
                inscription.inscribed_at
            ),
            Verdict::Untrusted(reason) => println!(
                "  ❌ {} {} (block {}): {}",
                inscription.participant.short(),
                inscription.cluster_id,
                inscription.inscribed_at,
                reason
            ),
        }
    }
    println!();
    println!("Trusted peers: {}", report.trusted.len());
    for cluster_id in &report.trusted {
        println!("  {}", cluster_id);
    }
}
