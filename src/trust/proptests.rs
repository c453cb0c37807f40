//! Property-based tests for the trust predicate and reconciliation
//!
//! Tests for:
//! - The verdict is trusted exactly when all four conditions hold
//! - Reconciling the same verdicts twice reports no change
//! - Claim resolution does not depend on verdict order

use super::evaluator::{
    decide, expiry_cutoff, ChainSnapshot, FailurePolicy, TrustPolicy, UntrustedReason, Verdict,
};
use super::inscription::Inscription;
use super::manager::TrustSetManager;
use crate::chain::traits::{AccountId, Stake, RAO_PER_TAO};
use crate::chain::ClusterId;
use proptest::prelude::*;

fn inscription(participant: u8, cluster: u8, inscribed_at: u64) -> Inscription {
    Inscription {
        participant: AccountId::new([participant; 32]),
        cluster_id: ClusterId::parse(&format!("Qm{}", cluster % 9 + 1)).unwrap(),
        inscribed_at,
    }
}

proptest! {
    /// Trusted iff registered, permitted, staked and fresh
    #[test]
    fn prop_verdict_is_conjunction(
        is_registered in any::<bool>(),
        has_validator_permit in any::<bool>(),
        stake_rao in 0u64..(5_000 * RAO_PER_TAO),
        min_stake in 0u64..5_000,
        time_window in 0u64..500,
        inscribed_at in 0u64..1_000,
        current_block in 0u64..1_000,
    ) {
        let policy = TrustPolicy {
            netuid: 21,
            min_stake: min_stake as f64,
            time_window,
            failure_policy: FailurePolicy::Closed,
        };
        let snapshot = ChainSnapshot {
            is_registered,
            has_validator_permit,
            total_stake: Stake::from_rao(stake_rao),
            current_block,
        };
        let verdict = decide(&snapshot, &policy, &inscription(1, 1, inscribed_at));

        let expected = is_registered
            && has_validator_permit
            && stake_rao >= min_stake * RAO_PER_TAO
            && inscribed_at >= current_block.saturating_sub(time_window);
        prop_assert_eq!(verdict.is_trusted(), expected);
    }

    /// The cutoff never underflows and never exceeds the current block
    #[test]
    fn prop_cutoff_bounded(current_block in any::<u64>(), time_window in any::<u64>()) {
        let cutoff = expiry_cutoff(current_block, time_window);
        prop_assert!(cutoff <= current_block);
        if time_window >= current_block {
            prop_assert_eq!(cutoff, 0);
        }
    }

    /// A second apply with the same verdicts changes nothing
    #[test]
    fn prop_apply_idempotent(
        claims in prop::collection::btree_map(0u8..20, (0u8..20, any::<bool>()), 0..20),
    ) {
        let verdicts: Vec<_> = claims
            .iter()
            .map(|(&who, &(cluster, trusted))| {
                let verdict = if trusted {
                    Verdict::Trusted
                } else {
                    Verdict::Untrusted(UntrustedReason::NoValidatorPermit)
                };
                (inscription(who, cluster, 10), verdict)
            })
            .collect();

        let mut manager = TrustSetManager::new();
        manager.apply(verdicts.clone(), 20);
        let again = manager.apply(verdicts, 20);
        prop_assert!(!again.changed());
    }

    /// Verdict order does not change the resulting set
    #[test]
    fn prop_apply_order_independent(
        claims in prop::collection::btree_map(0u8..20, (0u8..20, any::<bool>()), 0..20),
    ) {
        let verdicts: Vec<_> = claims
            .iter()
            .map(|(&who, &(cluster, trusted))| {
                let verdict = if trusted {
                    Verdict::Trusted
                } else {
                    Verdict::Untrusted(UntrustedReason::NotRegistered)
                };
                (inscription(who, cluster, 10), verdict)
            })
            .collect();
        let mut reversed = verdicts.clone();
        reversed.reverse();

        let mut forward = TrustSetManager::new();
        forward.apply(verdicts, 20);
        let mut backward = TrustSetManager::new();
        backward.apply(reversed, 20);
        prop_assert_eq!(forward.trusted(), backward.trusted());
    }
}
