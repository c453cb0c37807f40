//! Trusted-peers synchronization into the cluster config file.
//!
//! The config is an IPFS-Cluster `service.json`. Only the field at the
//! configured dotted path is touched; every other key is written back as it
//! was read, in the same order.

use super::reload::ReloadHook;
use crate::chain::ClusterId;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Where IPFS-Cluster's CRDT consensus keeps its trusted peers.
pub const DEFAULT_TRUSTED_PEERS_PATH: &str = "consensus.crdt.trusted_peers";

#[derive(Debug, Error)]
pub enum ClusterConfigError {
    #[error("failed to read cluster config '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write cluster config '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("cluster config '{path}' is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize cluster config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("'{segment}' in '{field_path}' is not a JSON object")]
    NotAnObject { field_path: String, segment: String },

    #[error("'{field_path}' is not a list of peer id strings")]
    InvalidPeerList { field_path: String },

    #[error("trusted peers path is empty")]
    EmptyFieldPath,
}

/// Keeps the cluster's trusted-peers list equal to the trusted set.
pub struct ConfigSynchronizer<H: ReloadHook> {
    path: PathBuf,
    field_path: Vec<String>,
    hook: H,
}

impl<H: ReloadHook> ConfigSynchronizer<H> {
    pub fn new(
        path: impl Into<PathBuf>,
        field_path: &str,
        hook: H,
    ) -> Result<Self, ClusterConfigError> {
        let field_path: Vec<String> = field_path
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        if field_path.is_empty() {
            return Err(ClusterConfigError::EmptyFieldPath);
        }
        Ok(Self {
            path: path.into(),
            field_path,
            hook,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn field_path(&self) -> String {
        self.field_path.join(".")
    }

    /// Peers currently listed in the config. A missing field reads as empty.
    pub fn read_peers(&self) -> Result<BTreeSet<String>, ClusterConfigError> {
        let document = self.read_document()?;
        self.peers_in(&document)
    }

    /// Write `trusted` into the config if it differs from what is there, or
    /// unconditionally when `force` is set. Returns whether a write happened.
    ///
    /// The reload hook fires once after each write and never otherwise.
    pub fn sync(
        &self,
        trusted: &BTreeSet<ClusterId>,
        force: bool,
    ) -> Result<bool, ClusterConfigError> {
        let mut document = self.read_document()?;
        let current = self.peers_in(&document)?;
        let desired: BTreeSet<String> = trusted.iter().map(|id| id.as_str().to_string()).collect();

        if !force && current == desired {
            debug!(
                path = %self.path.display(),
                peers = desired.len(),
                "cluster trusted peers already up to date"
            );
            return Ok(false);
        }

        let peers: Vec<Value> = desired.iter().cloned().map(Value::String).collect();
        *self.field_mut(&mut document)? = Value::Array(peers);
        self.write_document(&document)?;

        let added = desired.difference(&current).count();
        let removed = current.difference(&desired).count();
        info!(
            path = %self.path.display(),
            peers = desired.len(),
            added,
            removed,
            force,
            "cluster trusted peers written"
        );
        self.hook.reload();
        Ok(true)
    }

    fn read_document(&self) -> Result<Value, ClusterConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ClusterConfigError::Read {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ClusterConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file through a sibling temp file so readers never see a
    /// partial document.
    fn write_document(&self, document: &Value) -> Result<(), ClusterConfigError> {
        let mut contents = serde_json::to_string_pretty(document)?;
        contents.push('\n');

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".clustertrust.tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let write_err = |source| ClusterConfigError::Write {
            path: self.path.clone(),
            source,
        };
        // The document may hold the cluster secret; keep the file's mode.
        let permissions = fs::metadata(&self.path).map_err(write_err)?.permissions();
        fs::write(&tmp_path, contents).map_err(write_err)?;
        if let Err(e) = fs::set_permissions(&tmp_path, permissions) {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_err(e));
        }
        fs::rename(&tmp_path, &self.path).map_err(write_err)
    }

    fn peers_in(&self, document: &Value) -> Result<BTreeSet<String>, ClusterConfigError> {
        let mut node = document;
        for segment in &self.field_path {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(BTreeSet::new()),
            }
        }
        match node {
            Value::Null => Ok(BTreeSet::new()),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<BTreeSet<String>>>()
                .ok_or_else(|| ClusterConfigError::InvalidPeerList {
                    field_path: self.field_path(),
                }),
            _ => Err(ClusterConfigError::InvalidPeerList {
                field_path: self.field_path(),
            }),
        }
    }

    /// The target field, creating intermediate objects as needed.
    fn field_mut<'d>(&self, document: &'d mut Value) -> Result<&'d mut Value, ClusterConfigError> {
        let mut node = document;
        for segment in &self.field_path {
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(object) = node else {
                return Err(ClusterConfigError::NotAnObject {
                    field_path: self.field_path(),
                    segment: segment.clone(),
                });
            };
            node = object.entry(segment.clone()).or_insert(Value::Null);
        }
        Ok(node)
    }
}
