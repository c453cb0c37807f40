//! Trusted-set reconciliation.
//!
//! Every cycle re-derives the trusted set from the inscription snapshot and
//! live chain reads, then diffs it against the set held from the previous
//! cycle. Nothing is carried over except that set, so a pass can be repeated
//! freely: with unchanged chain state the second pass reports no change.
//!
//! Verdicts are per participant but membership is per cluster id. When more
//! than one participant claims the same cluster id, the participant with the
//! smallest account id decides it, whatever order the verdicts arrive in.

use crate::chain::traits::{AccountId, BlockNumber, ChainClient};
use crate::chain::ClusterId;
use crate::trust::evaluator::{TrustEvaluator, Verdict};
use crate::trust::inscription::Inscription;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub added: Vec<ClusterId>,
    pub removed: Vec<ClusterId>,
    /// Inscriptions evaluated in this pass.
    pub evaluated: usize,
}

impl ReconcileOutcome {
    /// Whether the trusted set changed.
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Owns the current trusted set.
#[derive(Debug, Default)]
pub struct TrustSetManager {
    trusted: BTreeSet<ClusterId>,
}

impl TrustSetManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trusted(&self) -> &BTreeSet<ClusterId> {
        &self.trusted
    }

    pub fn contains(&self, cluster_id: &ClusterId) -> bool {
        self.trusted.contains(cluster_id)
    }

    /// Evaluate every inscription and apply the verdicts.
    pub async fn reconcile<C: ChainClient + ?Sized>(
        &mut self,
        inscriptions: Vec<Inscription>,
        evaluator: &TrustEvaluator<'_, C>,
        current_block: BlockNumber,
        max_concurrency: usize,
    ) -> ReconcileOutcome {
        let verdicts = Self::evaluate_all(inscriptions, evaluator, current_block, max_concurrency).await;
        self.apply(verdicts, current_block)
    }

    /// Verdict for every inscription, in no particular order.
    ///
    /// Participants are evaluated concurrently, at most `max_concurrency` at
    /// a time; each participant's own reads stay sequential.
    pub async fn evaluate_all<C: ChainClient + ?Sized>(
        inscriptions: Vec<Inscription>,
        evaluator: &TrustEvaluator<'_, C>,
        current_block: BlockNumber,
        max_concurrency: usize,
    ) -> Vec<(Inscription, Verdict)> {
        stream::iter(inscriptions)
            .map(|inscription| async move {
                let verdict = evaluator.evaluate(&inscription, current_block).await;
                (inscription, verdict)
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await
    }

    /// Replace the trusted set with the one implied by `verdicts`.
    pub fn apply(
        &mut self,
        verdicts: Vec<(Inscription, Verdict)>,
        current_block: BlockNumber,
    ) -> ReconcileOutcome {
        let evaluated = verdicts.len();
        let decided = resolve_claims(verdicts);

        let mut outcome = ReconcileOutcome {
            evaluated,
            ..ReconcileOutcome::default()
        };

        for (cluster_id, (participant, verdict)) in &decided {
            let was_trusted = self.trusted.contains(cluster_id);
            match verdict {
                Verdict::Trusted if !was_trusted => {
                    info!(
                        block = current_block,
                        %cluster_id,
                        participant = %participant.short(),
                        "cluster peer trusted"
                    );
                    self.trusted.insert(cluster_id.clone());
                    outcome.added.push(cluster_id.clone());
                }
                Verdict::Untrusted(reason) if was_trusted => {
                    info!(
                        block = current_block,
                        %cluster_id,
                        participant = %participant.short(),
                        %reason,
                        "cluster peer no longer trusted"
                    );
                    self.trusted.remove(cluster_id);
                    outcome.removed.push(cluster_id.clone());
                }
                Verdict::Untrusted(reason) => {
                    debug!(
                        block = current_block,
                        %cluster_id,
                        participant = %participant.short(),
                        %reason,
                        "cluster peer remains untrusted"
                    );
                }
                Verdict::Trusted => {}
            }
        }

        // Ids nobody claims any more (the participant inscribed a new one).
        let unclaimed: Vec<ClusterId> = self
            .trusted
            .iter()
            .filter(|id| !decided.contains_key(*id))
            .cloned()
            .collect();
        for cluster_id in unclaimed {
            info!(
                block = current_block,
                %cluster_id,
                "cluster peer no longer trusted: no participant inscribes it"
            );
            self.trusted.remove(&cluster_id);
            outcome.removed.push(cluster_id);
        }

        outcome
    }
}

/// One verdict per cluster id; the smallest claiming account decides.
fn resolve_claims(
    verdicts: Vec<(Inscription, Verdict)>,
) -> BTreeMap<ClusterId, (AccountId, Verdict)> {
    let mut decided: BTreeMap<ClusterId, (AccountId, Verdict)> = BTreeMap::new();
    for (inscription, verdict) in verdicts {
        let Inscription {
            participant,
            cluster_id,
            ..
        } = inscription;
        match decided.get_mut(&cluster_id) {
            Some(current) if participant < current.0 => {
                debug!(
                    %cluster_id,
                    kept = %participant.short(),
                    dropped = %current.0.short(),
                    "cluster id claimed by several participants"
                );
                *current = (participant, verdict);
            }
            Some(current) => {
                debug!(
                    %cluster_id,
                    kept = %current.0.short(),
                    dropped = %participant.short(),
                    "cluster id claimed by several participants"
                );
            }
            None => {
                decided.insert(cluster_id, (participant, verdict));
            }
        }
    }
    decided
}
