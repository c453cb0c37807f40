//! Chain access for the trust engine.
//!
//! - Trait abstraction over the chain node (mockable)
//! - Finalized-block subscription as a single-consumer stream
//! - Commitment payload decoding

pub mod commitment;
pub mod mock;
pub mod rpc;
pub mod stream;
pub mod traits;

pub use commitment::{parse_cluster_id, ClusterId, CommitmentInfo, ParseError};
pub use rpc::RpcChainClient;
pub use stream::BlockSubscription;
pub use traits::{AccountId, BlockNumber, ChainClient, LookupError, Netuid, Stake};
