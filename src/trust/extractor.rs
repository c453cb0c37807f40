//! Commitment extraction from finalized blocks.
//!
//! Walks a block's extrinsics in order and records an inscription for every
//! commitment published to the target subnet. A bad extrinsic is logged and
//! skipped; it never stops the rest of the block from being read.

use crate::chain::commitment::parse_cluster_id;
use crate::chain::traits::{Block, Call, ChainEvent, EventRecord, Extrinsic, Netuid, Phase};
use crate::trust::inscription::{Inscription, InscriptionStore};
use tracing::{debug, info, warn};

/// How an extrinsic ended, according to the block's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtrinsicOutcome {
    Succeeded,
    Failed(String),
    /// No success or failure event was found for the extrinsic.
    Unknown,
}

/// Correlate the events emitted while applying extrinsic `index`.
pub fn extrinsic_outcome(events: &[EventRecord], index: u32) -> ExtrinsicOutcome {
    events
        .iter()
        .filter(|record| record.phase == Phase::ApplyExtrinsic(index))
        .find_map(|record| match &record.event {
            ChainEvent::ExtrinsicSuccess => Some(ExtrinsicOutcome::Succeeded),
            ChainEvent::ExtrinsicFailed { error } => Some(ExtrinsicOutcome::Failed(error.clone())),
            ChainEvent::Other { .. } | ChainEvent::Unrecognized => None,
        })
        .unwrap_or(ExtrinsicOutcome::Unknown)
}

/// Counts for one extracted block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Inscriptions written to the store.
    pub recorded: usize,
    /// Commitments for the subnet that were not recorded.
    pub skipped: usize,
}

/// Finds subnet commitments in blocks.
#[derive(Debug, Clone)]
pub struct CommitmentExtractor {
    netuid: Netuid,
    allow_unsuccessful: bool,
}

impl CommitmentExtractor {
    pub fn new(netuid: Netuid, allow_unsuccessful: bool) -> Self {
        Self {
            netuid,
            allow_unsuccessful,
        }
    }

    /// Record every commitment for the subnet in `block` into `store`.
    pub fn extract(&self, block: &Block, store: &mut InscriptionStore) -> ExtractionReport {
        let mut report = ExtractionReport::default();
        for extrinsic in &block.extrinsics {
            match self.candidate(block, extrinsic) {
                Candidate::Accepted(inscription) => {
                    info!(
                        block = block.header.number,
                        participant = %inscription.participant.short(),
                        cluster_id = %inscription.cluster_id,
                        "inscription recorded"
                    );
                    store.upsert(inscription);
                    report.recorded += 1;
                }
                Candidate::Skipped => report.skipped += 1,
                Candidate::NotCommitment => {}
            }
        }
        report
    }

    fn candidate(&self, block: &Block, extrinsic: &Extrinsic) -> Candidate {
        let (netuid, info) = match &extrinsic.call {
            Call::SetCommitment { netuid, info } => (*netuid, info),
            Call::Other { .. } | Call::Unrecognized => return Candidate::NotCommitment,
        };
        if netuid != self.netuid {
            debug!(
                block = block.header.number,
                extrinsic = extrinsic.index,
                netuid,
                "commitment for another subnet"
            );
            return Candidate::NotCommitment;
        }

        let number = block.header.number;
        let index = extrinsic.index;

        match extrinsic_outcome(&block.events, index) {
            ExtrinsicOutcome::Succeeded => {}
            ExtrinsicOutcome::Failed(cause) if !self.allow_unsuccessful => {
                warn!(block = number, extrinsic = index, %cause, "skipping failed commitment");
                return Candidate::Skipped;
            }
            ExtrinsicOutcome::Unknown if !self.allow_unsuccessful => {
                warn!(
                    block = number,
                    extrinsic = index,
                    "skipping commitment with no success or failure event"
                );
                return Candidate::Skipped;
            }
            outcome => {
                debug!(block = number, extrinsic = index, ?outcome, "accepting unsuccessful commitment");
            }
        }

        let Some(signer) = extrinsic.signer else {
            warn!(block = number, extrinsic = index, "skipping unsigned commitment");
            return Candidate::Skipped;
        };

        match parse_cluster_id(info) {
            Ok(cluster_id) => Candidate::Accepted(Inscription {
                participant: signer,
                cluster_id,
                inscribed_at: number,
            }),
            Err(e) => {
                warn!(
                    block = number,
                    extrinsic = index,
                    participant = %signer.short(),
                    error = %e,
                    "skipping unparseable commitment"
                );
                Candidate::Skipped
            }
        }
    }
}

/// What one extrinsic contributes to the store. Skips are logged where
/// they are decided.
enum Candidate {
    NotCommitment,
    Skipped,
    Accepted(Inscription),
}
