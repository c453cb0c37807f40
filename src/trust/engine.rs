//! The trust engine: inscription store plus trusted set, advanced one
//! finalized block at a time.
//!
//! Methods take `&mut self`, so two blocks can never be reconciled at once;
//! the daemon loop owns the engine and feeds it headers in order.

use crate::chain::commitment::parse_cluster_id;
use crate::chain::traits::{Block, BlockHeader, BlockNumber, ChainClient, ChainResult};
use crate::chain::ClusterId;
use crate::trust::evaluator::{TrustEvaluator, TrustPolicy};
use crate::trust::extractor::{CommitmentExtractor, ExtractionReport};
use crate::trust::inscription::{Inscription, InscriptionStore};
use crate::trust::manager::{ReconcileOutcome, TrustSetManager};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Blocks fetched individually when the subscription skips ahead. Larger
/// gaps fall back to a storage resync.
pub const MAX_CATCH_UP_BLOCKS: BlockNumber = 256;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub policy: TrustPolicy,
    pub allow_unsuccessful_commitments: bool,
    /// Resync commitment storage every this many blocks; 0 disables.
    pub resync_interval_blocks: BlockNumber,
    /// Participants evaluated concurrently.
    pub max_concurrent_queries: usize,
}

/// What one finalized header did to the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub block: BlockNumber,
    pub extraction: ExtractionReport,
    pub resynced: bool,
    pub reconcile: ReconcileOutcome,
}

/// Owns the inscription store and the trusted set.
pub struct TrustEngine<C: ChainClient + ?Sized> {
    client: Arc<C>,
    settings: EngineSettings,
    extractor: CommitmentExtractor,
    store: InscriptionStore,
    manager: TrustSetManager,
    last_processed: Option<BlockNumber>,
    last_resync: Option<BlockNumber>,
}

impl<C: ChainClient + ?Sized> TrustEngine<C> {
    pub fn new(client: Arc<C>, settings: EngineSettings) -> Self {
        let extractor = CommitmentExtractor::new(
            settings.policy.netuid,
            settings.allow_unsuccessful_commitments,
        );
        Self {
            client,
            settings,
            extractor,
            store: InscriptionStore::new(),
            manager: TrustSetManager::new(),
            last_processed: None,
            last_resync: None,
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &InscriptionStore {
        &self.store
    }

    pub fn trusted(&self) -> &BTreeSet<ClusterId> {
        self.manager.trusted()
    }

    pub fn last_processed(&self) -> Option<BlockNumber> {
        self.last_processed
    }

    /// Merge every commitment in subnet storage into the store.
    ///
    /// Unparseable entries are skipped. Entries absent from storage are
    /// kept (see [`InscriptionStore::bulk_resync`]).
    pub async fn resync(&mut self, at: BlockNumber) -> ChainResult<usize> {
        let stored = self.client.commitments(self.settings.policy.netuid).await?;
        let total = stored.len();

        let inscriptions: Vec<Inscription> = stored
            .into_iter()
            .filter_map(|commitment| match parse_cluster_id(&commitment.info) {
                Ok(cluster_id) => Some(Inscription {
                    participant: commitment.account,
                    cluster_id,
                    inscribed_at: commitment.block,
                }),
                Err(e) => {
                    warn!(
                        participant = %commitment.account.short(),
                        block = commitment.block,
                        error = %e,
                        "skipping unparseable stored commitment"
                    );
                    None
                }
            })
            .collect();

        let updated = self.store.bulk_resync(inscriptions);
        self.last_resync = Some(at);
        info!(
            block = at,
            stored = total,
            updated,
            tracked = self.store.len(),
            "commitment storage resynced"
        );
        Ok(updated)
    }

    /// Extract commitments from one block into the store.
    pub fn ingest(&mut self, block: &Block) -> ExtractionReport {
        let report = self.extractor.extract(block, &mut self.store);
        self.last_processed = Some(
            self.last_processed
                .map_or(block.header.number, |last| last.max(block.header.number)),
        );
        report
    }

    /// Re-evaluate every tracked inscription at `current_block`.
    pub async fn reconcile_at(&mut self, current_block: BlockNumber) -> ReconcileOutcome {
        let snapshot = self.store.snapshot();
        let evaluator = TrustEvaluator::new(self.client.as_ref(), &self.settings.policy);
        let outcome = self
            .manager
            .reconcile(
                snapshot,
                &evaluator,
                current_block,
                self.settings.max_concurrent_queries,
            )
            .await;
        debug!(
            block = current_block,
            evaluated = outcome.evaluated,
            trusted = self.manager.trusted().len(),
            changed = outcome.changed(),
            "reconciliation finished"
        );
        outcome
    }

    /// Handle one finalized header: fetch and extract every block not yet
    /// seen up to it, resync when due, then reconcile at its height.
    ///
    /// Block fetch and resync failures are logged and do not stop the
    /// reconciliation, so expirations still apply.
    pub async fn on_finalized(&mut self, header: &BlockHeader) -> CycleOutcome {
        let target = header.number;
        let mut outcome = CycleOutcome {
            block: target,
            ..CycleOutcome::default()
        };

        let first = self.last_processed.map_or(target, |last| last + 1);
        if first <= target {
            let mut start = first;
            if target - first >= MAX_CATCH_UP_BLOCKS {
                start = target + 1 - MAX_CATCH_UP_BLOCKS;
                warn!(
                    from = first,
                    to = start - 1,
                    "finalized stream skipped too far ahead; resyncing instead of replaying"
                );
                outcome.resynced = self.try_resync(target).await;
            }
            for number in start..=target {
                match self.client.block(number).await {
                    Ok(block) => {
                        let report = self.ingest(&block);
                        outcome.extraction.recorded += report.recorded;
                        outcome.extraction.skipped += report.skipped;
                    }
                    Err(e) => {
                        warn!(block = number, error = %e, "failed to fetch finalized block; skipping");
                        self.last_processed = Some(number);
                    }
                }
            }
        } else {
            debug!(block = target, "header already processed");
        }

        if !outcome.resynced && self.resync_due(target) {
            outcome.resynced = self.try_resync(target).await;
        }

        outcome.reconcile = self.reconcile_at(target).await;
        outcome
    }

    fn resync_due(&self, at: BlockNumber) -> bool {
        let interval = self.settings.resync_interval_blocks;
        if interval == 0 {
            return false;
        }
        self.last_resync
            .map_or(true, |last| at.saturating_sub(last) >= interval)
    }

    async fn try_resync(&mut self, at: BlockNumber) -> bool {
        match self.resync(at).await {
            Ok(_) => true,
            Err(e) => {
                warn!(block = at, error = %e, "commitment storage resync failed");
                false
            }
        }
    }
}
