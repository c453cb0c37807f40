//! Per-participant trust decision.
//!
//! A participant's inscription is honored only when all four hold:
//!
//! 1. the participant is registered in the subnet,
//! 2. its uid holds a validator permit,
//! 3. its network-wide stake is at least `min_stake` TAO,
//! 4. the inscription is no older than `time_window` blocks.
//!
//! Both boundaries are inclusive. Checks run in that order and stop at the
//! first failure; the order only changes which reason is reported.
//!
//! ## Read consistency
//!
//! The registration, permit and stake reads are separate queries. They are
//! issued close together but are not pinned to one block, and reads for
//! different participants in the same cycle may observe different heights.
//! A participant that crosses a threshold mid-cycle is picked up on the next
//! block.

use crate::chain::traits::{BlockNumber, ChainClient, LookupError, Netuid, Stake};
use crate::trust::inscription::Inscription;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// What to do when a chain read fails (as opposed to answering "no").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// A failed read makes the participant untrusted for this cycle.
    #[default]
    Closed,
    /// A failed read lets that check pass.
    Open,
}

/// Trust thresholds for one subnet.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustPolicy {
    pub netuid: Netuid,
    /// Minimum total stake in TAO.
    pub min_stake: f64,
    /// Blocks an inscription stays fresh for.
    pub time_window: BlockNumber,
    pub failure_policy: FailurePolicy,
}

/// A check backed by a chain read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Registration,
    ValidatorPermit,
    Stake,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Check::Registration => "registration",
            Check::ValidatorPermit => "validator permit",
            Check::Stake => "stake",
        };
        f.write_str(name)
    }
}

/// Why an inscription is not honored.
#[derive(Debug, Clone, PartialEq)]
pub enum UntrustedReason {
    NotRegistered,
    NoValidatorPermit,
    InsufficientStake { stake: Stake, required: f64 },
    Expired { inscribed_at: BlockNumber, cutoff: BlockNumber },
    QueryFailed { check: Check, error: String },
}

impl fmt::Display for UntrustedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "not registered in subnet"),
            Self::NoValidatorPermit => write!(f, "no validator permit"),
            Self::InsufficientStake { stake, required } => {
                write!(f, "stake {stake} below required {required} TAO")
            }
            Self::Expired {
                inscribed_at,
                cutoff,
            } => write!(
                f,
                "inscription at block {inscribed_at} expired (cutoff {cutoff}); re-inscription required"
            ),
            Self::QueryFailed { check, error } => write!(f, "{check} query failed: {error}"),
        }
    }
}

/// Trust decision for one inscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Trusted,
    Untrusted(UntrustedReason),
}

impl Verdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verdict::Trusted)
    }
}

/// Chain facts for one (participant, subnet) pair at one height.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSnapshot {
    pub is_registered: bool,
    pub has_validator_permit: bool,
    pub total_stake: Stake,
    pub current_block: BlockNumber,
}

/// Oldest block an inscription may carry and still be fresh.
pub fn expiry_cutoff(current_block: BlockNumber, time_window: BlockNumber) -> BlockNumber {
    current_block.saturating_sub(time_window)
}

pub fn meets_stake(stake: Stake, min_stake: f64) -> bool {
    stake.as_tao() >= min_stake
}

impl From<Result<(), UntrustedReason>> for Verdict {
    fn from(result: Result<(), UntrustedReason>) -> Self {
        match result {
            Ok(()) => Verdict::Trusted,
            Err(reason) => Verdict::Untrusted(reason),
        }
    }
}

fn check_recency(
    inscription: &Inscription,
    current_block: BlockNumber,
    time_window: BlockNumber,
) -> Result<(), UntrustedReason> {
    let cutoff = expiry_cutoff(current_block, time_window);
    if inscription.inscribed_at >= cutoff {
        Ok(())
    } else {
        Err(UntrustedReason::Expired {
            inscribed_at: inscription.inscribed_at,
            cutoff,
        })
    }
}

fn check_stake(stake: Stake, min_stake: f64) -> Result<(), UntrustedReason> {
    if meets_stake(stake, min_stake) {
        Ok(())
    } else {
        Err(UntrustedReason::InsufficientStake {
            stake,
            required: min_stake,
        })
    }
}

/// Decide from already-read chain facts.
pub fn decide(snapshot: &ChainSnapshot, policy: &TrustPolicy, inscription: &Inscription) -> Verdict {
    let checks = || {
        if !snapshot.is_registered {
            return Err(UntrustedReason::NotRegistered);
        }
        if !snapshot.has_validator_permit {
            return Err(UntrustedReason::NoValidatorPermit);
        }
        check_stake(snapshot.total_stake, policy.min_stake)?;
        check_recency(inscription, snapshot.current_block, policy.time_window)
    };
    checks().into()
}

/// Evaluates inscriptions against live chain reads.
pub struct TrustEvaluator<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    policy: &'a TrustPolicy,
}

impl<'a, C: ChainClient + ?Sized> TrustEvaluator<'a, C> {
    pub fn new(client: &'a C, policy: &'a TrustPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &TrustPolicy {
        self.policy
    }

    /// Boolean form of [`TrustEvaluator::evaluate`].
    pub async fn is_trusted(&self, inscription: &Inscription, current_block: BlockNumber) -> bool {
        self.evaluate(inscription, current_block).await.is_trusted()
    }

    /// Run the four checks for `inscription` at `current_block`.
    pub async fn evaluate(&self, inscription: &Inscription, current_block: BlockNumber) -> Verdict {
        self.run_checks(inscription, current_block).await.into()
    }

    async fn run_checks(
        &self,
        inscription: &Inscription,
        current_block: BlockNumber,
    ) -> Result<(), UntrustedReason> {
        let netuid = self.policy.netuid;
        let participant = &inscription.participant;

        let uid = match self.client.uid_for(netuid, participant).await {
            Ok(uid) => Some(uid),
            Err(LookupError::NotFound) => return Err(UntrustedReason::NotRegistered),
            Err(LookupError::QueryFailed(error)) => {
                self.on_query_failure(inscription, Check::Registration, error)?;
                None
            }
        };

        // With fail-open and an unknown uid there is nothing to look a permit up by.
        if let Some(uid) = uid {
            match self.client.validator_permit(netuid, uid).await {
                Ok(true) => {}
                Ok(false) | Err(LookupError::NotFound) => {
                    return Err(UntrustedReason::NoValidatorPermit)
                }
                Err(LookupError::QueryFailed(error)) => {
                    self.on_query_failure(inscription, Check::ValidatorPermit, error)?
                }
            }
        }

        match self.client.total_stake(participant).await {
            Ok(stake) => check_stake(stake, self.policy.min_stake)?,
            // No stake entry means nothing is bonded.
            Err(LookupError::NotFound) => check_stake(Stake::ZERO, self.policy.min_stake)?,
            Err(LookupError::QueryFailed(error)) => {
                self.on_query_failure(inscription, Check::Stake, error)?
            }
        }

        check_recency(inscription, current_block, self.policy.time_window)
    }

    /// Fail-closed turns the failed read into the verdict; fail-open skips the check.
    fn on_query_failure(
        &self,
        inscription: &Inscription,
        check: Check,
        error: String,
    ) -> Result<(), UntrustedReason> {
        match self.policy.failure_policy {
            FailurePolicy::Closed => Err(UntrustedReason::QueryFailed { check, error }),
            FailurePolicy::Open => {
                warn!(
                    participant = %inscription.participant.short(),
                    %check,
                    %error,
                    "chain query failed; passing check under fail-open policy"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainClient;
    use crate::chain::{AccountId, ClusterId};

    const NETUID: Netuid = 21;

    fn policy() -> TrustPolicy {
        TrustPolicy {
            netuid: NETUID,
            min_stake: 1000.0,
            time_window: 50,
            failure_policy: FailurePolicy::Closed,
        }
    }

    fn inscription(at: BlockNumber) -> Inscription {
        Inscription {
            participant: AccountId::new([7u8; 32]),
            cluster_id: ClusterId::parse("Qm1").unwrap(),
            inscribed_at: at,
        }
    }

    fn validator(client: &MockChainClient, stake_tao: u64) -> AccountId {
        let account = AccountId::new([7u8; 32]);
        client.register(NETUID, account, 3);
        client.set_permit(NETUID, 3, true);
        client.set_stake(account, Stake::from_tao(stake_tao));
        account
    }

    #[tokio::test]
    async fn test_trusted_validator_within_window() {
        let client = MockChainClient::new();
        validator(&client, 1500);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert_eq!(evaluator.evaluate(&inscription(100), 120).await, Verdict::Trusted);
        assert!(evaluator.is_trusted(&inscription(100), 120).await);
    }

    #[tokio::test]
    async fn test_unregistered_participant() {
        let client = MockChainClient::new();
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert_eq!(
            evaluator.evaluate(&inscription(100), 120).await,
            Verdict::Untrusted(UntrustedReason::NotRegistered)
        );
    }

    #[tokio::test]
    async fn test_missing_permit() {
        let client = MockChainClient::new();
        validator(&client, 1500);
        client.set_permit(NETUID, 3, false);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert_eq!(
            evaluator.evaluate(&inscription(100), 120).await,
            Verdict::Untrusted(UntrustedReason::NoValidatorPermit)
        );
    }

    #[tokio::test]
    async fn test_stake_boundary_is_inclusive() {
        let client = MockChainClient::new();
        let account = validator(&client, 1000);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert!(evaluator.is_trusted(&inscription(100), 120).await);

        client.set_stake(account, Stake::from_rao(Stake::from_tao(1000).rao() - 1));
        assert!(matches!(
            evaluator.evaluate(&inscription(100), 120).await,
            Verdict::Untrusted(UntrustedReason::InsufficientStake { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_stake_counts_as_zero() {
        let client = MockChainClient::new();
        let account = AccountId::new([7u8; 32]);
        client.register(NETUID, account, 3);
        client.set_permit(NETUID, 3, true);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert_eq!(
            evaluator.evaluate(&inscription(100), 120).await,
            Verdict::Untrusted(UntrustedReason::InsufficientStake {
                stake: Stake::ZERO,
                required: 1000.0
            })
        );
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let client = MockChainClient::new();
        validator(&client, 1500);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        // 100 == 150 - 50
        assert!(evaluator.is_trusted(&inscription(100), 150).await);
        assert_eq!(
            evaluator.evaluate(&inscription(100), 151).await,
            Verdict::Untrusted(UntrustedReason::Expired {
                inscribed_at: 100,
                cutoff: 101
            })
        );
    }

    #[tokio::test]
    async fn test_window_larger_than_chain_height() {
        let client = MockChainClient::new();
        validator(&client, 1500);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert!(evaluator.is_trusted(&inscription(0), 10).await);
    }

    #[tokio::test]
    async fn test_query_failure_is_fail_closed_by_default() {
        let client = MockChainClient::new();
        let account = validator(&client, 1500);
        client.fail_queries_for(account);
        let policy = policy();
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert!(matches!(
            evaluator.evaluate(&inscription(100), 120).await,
            Verdict::Untrusted(UntrustedReason::QueryFailed {
                check: Check::Registration,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_query_failure_passes_under_fail_open() {
        let client = MockChainClient::new();
        let account = validator(&client, 1500);
        client.fail_queries_for(account);
        let mut policy = policy();
        policy.failure_policy = FailurePolicy::Open;
        let evaluator = TrustEvaluator::new(&client, &policy);

        assert!(evaluator.is_trusted(&inscription(100), 120).await);
        // Recency still applies.
        assert!(!evaluator.is_trusted(&inscription(10), 120).await);
    }

    #[test]
    fn test_decide_matches_scenarios() {
        let policy = policy();
        let snapshot = |current_block| ChainSnapshot {
            is_registered: true,
            has_validator_permit: true,
            total_stake: Stake::from_tao(1500),
            current_block,
        };

        assert_eq!(decide(&snapshot(120), &policy, &inscription(100)), Verdict::Trusted);
        assert!(matches!(
            decide(&snapshot(200), &policy, &inscription(100)),
            Verdict::Untrusted(UntrustedReason::Expired { .. })
        ));
    }

    #[test]
    fn test_reason_display() {
        let reason = UntrustedReason::Expired {
            inscribed_at: 100,
            cutoff: 150,
        };
        assert!(reason.to_string().contains("re-inscription required"));
        let failed = UntrustedReason::QueryFailed {
            check: Check::Stake,
            error: "timeout".to_string(),
        };
        assert_eq!(failed.to_string(), "stake query failed: timeout");
    }
}
