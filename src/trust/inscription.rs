//! Inscriptions and their in-memory store.
//!
//! One inscription is kept per participant and a newer observation always
//! replaces the older one. Blocks are processed in order, so the last write
//! is the most recent inscription.
//!
//! Resync from chain storage only merges: a participant that disappears from
//! storage keeps its last inscription here until the process restarts. The
//! recency check ages such entries out of the trusted set, but the store
//! itself never shrinks.

use crate::chain::{AccountId, BlockNumber, ClusterId};
use serde::Serialize;
use std::collections::HashMap;

/// Latest cluster id claimed by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inscription {
    pub participant: AccountId,
    pub cluster_id: ClusterId,
    pub inscribed_at: BlockNumber,
}

/// Participant → latest inscription.
#[derive(Debug, Default)]
pub struct InscriptionStore {
    entries: HashMap<AccountId, Inscription>,
}

impl InscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the participant's inscription. Returns the replaced
    /// entry, if any.
    pub fn upsert(&mut self, inscription: Inscription) -> Option<Inscription> {
        self.entries.insert(inscription.participant, inscription)
    }

    /// Merge a full storage read. Entries missing from `entries` are kept.
    /// Returns how many entries were new or differed from what was held.
    pub fn bulk_resync<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = Inscription>,
    {
        let mut updated = 0;
        for inscription in entries {
            let previous = self.upsert(inscription.clone());
            if previous.as_ref() != Some(&inscription) {
                updated += 1;
            }
        }
        updated
    }

    /// Owned copy of every entry, ordered by participant.
    pub fn snapshot(&self) -> Vec<Inscription> {
        let mut entries: Vec<Inscription> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.participant.cmp(&b.participant));
        entries
    }

    pub fn get(&self, participant: &AccountId) -> Option<&Inscription> {
        self.entries.get(participant)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inscription(byte: u8, cluster: &str, at: BlockNumber) -> Inscription {
        Inscription {
            participant: AccountId::new([byte; 32]),
            cluster_id: ClusterId::parse(cluster).unwrap(),
            inscribed_at: at,
        }
    }

    #[test]
    fn test_upsert_replaces_prior_entry() {
        let mut store = InscriptionStore::new();
        assert!(store.upsert(inscription(1, "Qm1", 100)).is_none());

        let previous = store.upsert(inscription(1, "Qm2", 110)).unwrap();
        assert_eq!(previous.cluster_id.as_str(), "Qm1");

        assert_eq!(store.len(), 1);
        let current = store.get(&AccountId::new([1; 32])).unwrap();
        assert_eq!(current.cluster_id.as_str(), "Qm2");
        assert_eq!(current.inscribed_at, 110);
    }

    #[test]
    fn test_bulk_resync_is_merge_only() {
        let mut store = InscriptionStore::new();
        store.upsert(inscription(1, "Qm1", 100));
        store.upsert(inscription(2, "Qm2", 100));

        // Participant 2 is absent from the resync and must survive it.
        let updated = store.bulk_resync(vec![inscription(1, "Qm1", 100), inscription(3, "Qm3", 90)]);

        assert_eq!(updated, 1);
        assert_eq!(store.len(), 3);
        assert!(store.get(&AccountId::new([2; 32])).is_some());
    }

    #[test]
    fn test_snapshot_is_sorted_and_detached() {
        let mut store = InscriptionStore::new();
        store.upsert(inscription(9, "Qm9", 1));
        store.upsert(inscription(3, "Qm3", 1));
        store.upsert(inscription(5, "Qm5", 1));

        let snapshot = store.snapshot();
        let order: Vec<u8> = snapshot.iter().map(|i| i.participant.as_bytes()[0]).collect();
        assert_eq!(order, vec![3, 5, 9]);

        store.upsert(inscription(3, "QmX", 2));
        store.upsert(inscription(4, "Qm4", 2));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0].cluster_id.as_str(), "Qm3");
    }
}
