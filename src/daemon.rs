//! The long-running loop: finalized headers in, cluster config out.

use crate::chain::traits::{BlockHeader, ChainClient, ChainError};
use crate::cluster::{ClusterConfigError, ConfigSynchronizer, ReloadHook};
use crate::trust::{CycleOutcome, TrustEngine};
use futures::StreamExt;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("cluster config error: {0}")]
    Config(#[from] ClusterConfigError),

    #[error("finalized block subscription ended")]
    SubscriptionEnded,
}

/// One engine, one synchronizer, one subscription.
pub struct Daemon<C: ChainClient + ?Sized, H: ReloadHook> {
    engine: TrustEngine<C>,
    synchronizer: ConfigSynchronizer<H>,
    force_next_sync: bool,
}

impl<C: ChainClient + ?Sized, H: ReloadHook> Daemon<C, H> {
    /// `force_update` makes the first sync of this run write even when the
    /// file already matches.
    pub fn new(
        engine: TrustEngine<C>,
        synchronizer: ConfigSynchronizer<H>,
        force_update: bool,
    ) -> Self {
        Self {
            engine,
            synchronizer,
            force_next_sync: force_update,
        }
    }

    pub fn engine(&self) -> &TrustEngine<C> {
        &self.engine
    }

    pub fn synchronizer(&self) -> &ConfigSynchronizer<H> {
        &self.synchronizer
    }

    /// Resync storage, reconcile at the finalized head and sync once.
    pub async fn bootstrap(&mut self) -> Result<CycleOutcome, DaemonError> {
        let head = self.engine.client().finalized_head().await?;
        info!(block = head.number, "starting from finalized head");

        self.engine.resync(head.number).await?;
        let outcome = self.engine.on_finalized(&head).await;

        // Sync unconditionally so the file reflects this run's view.
        self.sync()?;
        Ok(outcome)
    }

    /// Run until `shutdown` resolves or the subscription ends.
    ///
    /// Subscription failure and config write failure are fatal; everything
    /// per-block is logged and the loop carries on.
    pub async fn run<S>(&mut self, shutdown: S) -> Result<(), DaemonError>
    where
        S: Future<Output = ()>,
    {
        let mut subscription = self.engine.client().subscribe_finalized().await?;
        self.bootstrap().await?;

        tokio::pin!(shutdown);
        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }
                header = subscription.next() => match header {
                    Some(header) => {
                        if let Err(e) = self.on_header(&header).await {
                            break Err(e);
                        }
                    }
                    None => {
                        warn!("finalized block subscription ended");
                        break Err(DaemonError::SubscriptionEnded);
                    }
                },
            }
        };

        subscription.unsubscribe();
        result
    }

    /// Process one finalized header and sync if the trusted set moved.
    pub async fn on_header(&mut self, header: &BlockHeader) -> Result<CycleOutcome, DaemonError> {
        let outcome = self.engine.on_finalized(header).await;
        if outcome.reconcile.changed() || self.force_next_sync {
            self.sync()?;
        } else {
            debug!(block = header.number, "trusted set unchanged");
        }
        Ok(outcome)
    }

    fn sync(&mut self) -> Result<bool, DaemonError> {
        let force = std::mem::take(&mut self.force_next_sync);
        Ok(self.synchronizer.sync(self.engine.trusted(), force)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::commitment::CommitmentInfo;
    use crate::chain::mock::MockChainClient;
    use crate::chain::traits::{AccountId, Block, Stake, StoredCommitment};
    use crate::cluster::{RecordingReloadHook, DEFAULT_TRUSTED_PEERS_PATH};
    use crate::trust::{EngineSettings, FailurePolicy, TrustPolicy};
    use std::sync::Arc;
    use tempfile::TempDir;

    const NETUID: u16 = 21;

    fn block(number: u64) -> Block {
        Block {
            header: BlockHeader {
                number,
                hash: format!("0x{:064x}", number),
            },
            extrinsics: vec![],
            events: vec![],
        }
    }

    fn daemon(
        client: &Arc<MockChainClient>,
        dir: &TempDir,
        force_update: bool,
    ) -> (Daemon<MockChainClient, RecordingReloadHook>, RecordingReloadHook) {
        let path = dir.path().join("service.json");
        std::fs::write(&path, r#"{"consensus": {"crdt": {"trusted_peers": []}}}"#).unwrap();
        let hook = RecordingReloadHook::new();
        let synchronizer =
            ConfigSynchronizer::new(path, DEFAULT_TRUSTED_PEERS_PATH, hook.clone()).unwrap();
        let settings = EngineSettings {
            policy: TrustPolicy {
                netuid: NETUID,
                min_stake: 1000.0,
                time_window: 50,
                failure_policy: FailurePolicy::Closed,
            },
            allow_unsuccessful_commitments: false,
            resync_interval_blocks: 0,
            max_concurrent_queries: 4,
        };
        let engine = TrustEngine::new(client.clone(), settings);
        (Daemon::new(engine, synchronizer, force_update), hook)
    }

    fn seed_validator(client: &MockChainClient, at: u64) {
        let account = AccountId::new([1; 32]);
        client.register(NETUID, account, 1);
        client.set_permit(NETUID, 1, true);
        client.set_stake(account, Stake::from_tao(2000));
        client.put_commitment(
            NETUID,
            StoredCommitment {
                account,
                block: at,
                info: CommitmentInfo::raw("Qm1"),
            },
        );
    }

    #[tokio::test]
    async fn test_bootstrap_writes_once() {
        let client = Arc::new(MockChainClient::new());
        seed_validator(&client, 100);
        client.put_block(block(110));
        let dir = TempDir::new().unwrap();
        let (mut daemon, hook) = daemon(&client, &dir, false);

        let outcome = daemon.bootstrap().await.unwrap();

        assert_eq!(outcome.block, 110);
        assert!(outcome.reconcile.changed());
        assert_eq!(hook.count(), 1);
        let peers: Vec<String> = daemon.synchronizer().read_peers().unwrap().into_iter().collect();
        assert_eq!(peers, vec!["Qm1"]);
    }

    #[tokio::test]
    async fn test_force_update_applies_to_first_sync_only() {
        let client = Arc::new(MockChainClient::new());
        client.put_block(block(10));
        client.put_block(block(11));
        let dir = TempDir::new().unwrap();
        let (mut daemon, hook) = daemon(&client, &dir, true);

        // Empty set against an empty list: only the force writes.
        daemon.bootstrap().await.unwrap();
        assert_eq!(hook.count(), 1);

        daemon.on_header(&block(11).header).await.unwrap();
        assert_eq!(hook.count(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_without_head_fails() {
        let client = Arc::new(MockChainClient::new());
        let dir = TempDir::new().unwrap();
        let (mut daemon, _hook) = daemon(&client, &dir, false);

        assert!(matches!(
            daemon.bootstrap().await,
            Err(DaemonError::Chain(_))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let client = Arc::new(MockChainClient::new());
        client.put_block(block(5));
        let dir = TempDir::new().unwrap();
        let (mut daemon, _hook) = daemon(&client, &dir, false);

        let result = daemon.run(async {}).await;

        assert!(result.is_ok());
        assert_eq!(daemon.engine().last_processed(), Some(5));
    }

    #[tokio::test]
    async fn test_run_processes_headers_until_stream_ends() {
        let client = Arc::new(MockChainClient::new());
        seed_validator(&client, 100);
        for n in 100..=160 {
            client.put_block(block(n));
        }
        client.set_head(100);
        let dir = TempDir::new().unwrap();
        let (mut daemon, hook) = daemon(&client, &dir, false);

        let producer = client.clone();
        let feed = tokio::spawn(async move {
            while !producer.push_finalized(block(120).header).await {
                tokio::task::yield_now().await;
            }
            producer.push_finalized(block(160).header).await;
            producer.end_subscription();
        });

        let result = daemon.run(std::future::pending()).await;
        feed.await.unwrap();

        assert!(matches!(result, Err(DaemonError::SubscriptionEnded)));
        assert_eq!(daemon.engine().last_processed(), Some(160));
        // Trusted at 100, expired at 160 (cutoff 110).
        assert_eq!(hook.count(), 2);
        assert!(daemon.engine().trusted().is_empty());
    }
}
