//! Trait abstractions for chain reads.
//!
//! The daemon never talks to a node directly: every finalized-block
//! notification, block fetch and storage query goes through
//! [`ChainClient`], so the trust engine can be driven by
//! [`MockChainClient`](crate::chain::mock::MockChainClient) in tests and by
//! [`RpcChainClient`](crate::chain::rpc::RpcChainClient) in production.

use crate::chain::commitment::CommitmentInfo;
use crate::chain::stream::BlockSubscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block height.
pub type BlockNumber = u64;

/// Subnet identifier.
pub type Netuid = u16;

/// Position of a registered participant inside one subnet.
pub type Uid = u16;

/// Base units per TAO.
pub const RAO_PER_TAO: u64 = 1_000_000_000;

/// Signer public key (32 bytes), rendered as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; 32]);

impl AccountId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.short())
    }
}

/// Account id parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountIdError {
    #[error("account id is not valid hex: {0}")]
    InvalidHex(String),

    #[error("account id must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for AccountId {
    type Err = AccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| AccountIdError::InvalidHex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AccountIdError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl TryFrom<String> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.to_string()
    }
}

/// Stake amount in base units (rao).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stake(u64);

impl Stake {
    pub const ZERO: Stake = Stake(0);

    pub const fn from_rao(rao: u64) -> Self {
        Self(rao)
    }

    /// Whole-TAO amount, mostly for tests and fixtures.
    pub const fn from_tao(tao: u64) -> Self {
        Self(tao.saturating_mul(RAO_PER_TAO))
    }

    pub const fn rao(&self) -> u64 {
        self.0
    }

    /// Amount in human units.
    pub fn as_tao(&self) -> f64 {
        self.0 as f64 / RAO_PER_TAO as f64
    }
}

impl fmt::Display for Stake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9} TAO", self.as_tao())
    }
}

/// Finalized block header as delivered by the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: BlockNumber,
    pub hash: String,
}

/// A full block: ordered extrinsics plus the block's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub extrinsics: Vec<Extrinsic>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
}

/// One extrinsic, positioned by its index within the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extrinsic {
    pub index: u32,
    /// `None` for unsigned (inherent) extrinsics.
    #[serde(default)]
    pub signer: Option<AccountId>,
    #[serde(flatten)]
    pub call: Call,
}

/// Decoded call. Only the commitment call is modelled; everything else is
/// kept by name so it can be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    /// `Commitments::set_commitment(netuid, info)`
    SetCommitment { netuid: Netuid, info: CommitmentInfo },
    Other { pallet: String, method: String },
    /// Any call tag this client does not know.
    #[serde(other)]
    Unrecognized,
}

/// Event log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: ChainEvent,
}

/// Phase of block execution an event was emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

/// Events the extractor cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChainEvent {
    ExtrinsicSuccess,
    ExtrinsicFailed { error: String },
    Other { pallet: String, name: String },
    #[serde(other)]
    Unrecognized,
}

/// A commitment as currently held in chain storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCommitment {
    pub account: AccountId,
    /// Block in which the commitment was last set.
    pub block: BlockNumber,
    pub info: CommitmentInfo,
}

/// Failure of a single point-in-time lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The chain answered and the entry does not exist.
    #[error("not found")]
    NotFound,

    /// The chain could not be asked.
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// `uid` of an account inside a subnet.
pub type RegistrationLookup = Result<Uid, LookupError>;

/// Validator permit flag of a uid inside a subnet.
pub type PermitLookup = Result<bool, LookupError>;

/// Network-wide stake of an account.
pub type StakeLookup = Result<Stake, LookupError>;

/// Result type for chain operations that are not per-participant lookups.
pub type ChainResult<T> = Result<T, ChainError>;

/// Chain client errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("block {0} not found")]
    BlockNotFound(BlockNumber),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Read access to the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Subscribe to finalized block headers.
    async fn subscribe_finalized(&self) -> ChainResult<BlockSubscription>;

    /// Current finalized head.
    async fn finalized_head(&self) -> ChainResult<BlockHeader>;

    /// Fetch a finalized block with extrinsics and events.
    async fn block(&self, number: BlockNumber) -> ChainResult<Block>;

    /// Every commitment currently stored for a subnet.
    async fn commitments(&self, netuid: Netuid) -> ChainResult<Vec<StoredCommitment>>;

    /// Resolve an account to its uid in a subnet.
    async fn uid_for(&self, netuid: Netuid, account: &AccountId) -> RegistrationLookup;

    /// Validator permit flag for a uid.
    async fn validator_permit(&self, netuid: Netuid, uid: Uid) -> PermitLookup;

    /// Total stake of an account across the network.
    async fn total_stake(&self, account: &AccountId) -> StakeLookup;
}
