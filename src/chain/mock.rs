//! Mock chain client for testing.
//!
//! Holds blocks, subnet registrations, permits, stakes and commitment
//! storage in memory. Individual accounts can be marked as failing to
//! exercise the fail-closed path.

use super::stream::{BlockSubscription, HeaderSender, DEFAULT_SUBSCRIPTION_CAPACITY};
use super::traits::*;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock chain client for testing.
#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    blocks: BTreeMap<BlockNumber, Block>,
    head: Option<BlockHeader>,
    commitments: HashMap<Netuid, Vec<StoredCommitment>>,
    uids: HashMap<(Netuid, AccountId), Uid>,
    permits: HashMap<(Netuid, Uid), bool>,
    stakes: HashMap<AccountId, Stake>,
    failing: HashSet<AccountId>,
    subscriber: Option<HeaderSender>,
    commitment_queries: usize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a block and make it the finalized head if it is the newest.
    pub fn put_block(&self, block: Block) {
        let mut s = self.state.lock().unwrap();
        let newer = s
            .head
            .as_ref()
            .map_or(true, |h| block.header.number >= h.number);
        if newer {
            s.head = Some(block.header.clone());
        }
        s.blocks.insert(block.header.number, block);
    }

    /// Move the finalized head without storing a block.
    pub fn set_head(&self, number: BlockNumber) {
        let mut s = self.state.lock().unwrap();
        s.head = Some(BlockHeader {
            number,
            hash: format!("0x{:064x}", number),
        });
    }

    /// Register an account under `uid` in a subnet.
    pub fn register(&self, netuid: Netuid, account: AccountId, uid: Uid) {
        let mut s = self.state.lock().unwrap();
        s.uids.insert((netuid, account), uid);
    }

    pub fn deregister(&self, netuid: Netuid, account: &AccountId) {
        let mut s = self.state.lock().unwrap();
        s.uids.remove(&(netuid, *account));
    }

    pub fn set_permit(&self, netuid: Netuid, uid: Uid, permit: bool) {
        let mut s = self.state.lock().unwrap();
        s.permits.insert((netuid, uid), permit);
    }

    pub fn set_stake(&self, account: AccountId, stake: Stake) {
        let mut s = self.state.lock().unwrap();
        s.stakes.insert(account, stake);
    }

    /// Make every lookup for `account` fail with `QueryFailed`.
    pub fn fail_queries_for(&self, account: AccountId) {
        let mut s = self.state.lock().unwrap();
        s.failing.insert(account);
    }

    pub fn heal_queries_for(&self, account: &AccountId) {
        let mut s = self.state.lock().unwrap();
        s.failing.remove(account);
    }

    /// Put a commitment into subnet storage (replacing the account's prior one).
    pub fn put_commitment(&self, netuid: Netuid, commitment: StoredCommitment) {
        let mut s = self.state.lock().unwrap();
        let stored = s.commitments.entry(netuid).or_default();
        stored.retain(|c| c.account != commitment.account);
        stored.push(commitment);
    }

    /// Number of `commitments` storage reads served so far.
    pub fn commitment_queries(&self) -> usize {
        self.state.lock().unwrap().commitment_queries
    }

    /// Deliver a header to the current subscriber, if any.
    pub async fn push_finalized(&self, header: BlockHeader) -> bool {
        let sender = self.state.lock().unwrap().subscriber.clone();
        match sender {
            Some(sender) => sender.send(header).await.is_ok(),
            None => false,
        }
    }

    /// Drop the producer side, ending the subscription stream.
    pub fn end_subscription(&self) {
        self.state.lock().unwrap().subscriber = None;
    }

    fn check_failing(&self, account: &AccountId) -> Result<(), LookupError> {
        if self.state.lock().unwrap().failing.contains(account) {
            return Err(LookupError::QueryFailed(format!(
                "mock failure for {}",
                account.short()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn subscribe_finalized(&self) -> ChainResult<BlockSubscription> {
        let (subscription, sender) = BlockSubscription::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        self.state.lock().unwrap().subscriber = Some(sender);
        Ok(subscription)
    }

    async fn finalized_head(&self) -> ChainResult<BlockHeader> {
        self.state
            .lock()
            .unwrap()
            .head
            .clone()
            .ok_or_else(|| ChainError::Transport("no finalized head".to_string()))
    }

    async fn block(&self, number: BlockNumber) -> ChainResult<Block> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&number)
            .cloned()
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn commitments(&self, netuid: Netuid) -> ChainResult<Vec<StoredCommitment>> {
        let mut s = self.state.lock().unwrap();
        s.commitment_queries += 1;
        Ok(s.commitments.get(&netuid).cloned().unwrap_or_default())
    }

    async fn uid_for(&self, netuid: Netuid, account: &AccountId) -> RegistrationLookup {
        self.check_failing(account)?;
        self.state
            .lock()
            .unwrap()
            .uids
            .get(&(netuid, *account))
            .copied()
            .ok_or(LookupError::NotFound)
    }

    async fn validator_permit(&self, netuid: Netuid, uid: Uid) -> PermitLookup {
        self.state
            .lock()
            .unwrap()
            .permits
            .get(&(netuid, uid))
            .copied()
            .ok_or(LookupError::NotFound)
    }

    async fn total_stake(&self, account: &AccountId) -> StakeLookup {
        self.check_failing(account)?;
        self.state
            .lock()
            .unwrap()
            .stakes
            .get(account)
            .copied()
            .ok_or(LookupError::NotFound)
    }
}
