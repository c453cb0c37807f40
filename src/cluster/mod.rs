//! IPFS-Cluster side: the trusted-peers list in the cluster config file and
//! the hook that makes the cluster daemon pick it up.

pub mod reload;
pub mod sync;

pub use reload::{CommandReloadHook, NoopReloadHook, RecordingReloadHook, ReloadHook};
pub use sync::{ClusterConfigError, ConfigSynchronizer, DEFAULT_TRUSTED_PEERS_PATH};
