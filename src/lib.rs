//! clustertrust - IPFS-Cluster trusted peers from subnet commitments
//!
//! Validators publish their cluster peer id as an on-chain commitment. This
//! crate follows finalized blocks, decides which of those peer ids belong to
//! registered, permitted, sufficiently staked validators with a fresh
//! commitment, and keeps the cluster's `trusted_peers` list equal to that set.
//!
//! Key pieces:
//! - `chain`: chain access behind the `ChainClient` trait
//! - `trust`: extraction, evaluation and reconciliation
//! - `cluster`: the cluster config file and reload hook
//! - `daemon`: the loop tying them together

pub mod chain;
pub mod cluster;
pub mod daemon;
pub mod trust;
