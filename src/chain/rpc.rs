//! JSON-RPC chain client.
//!
//! Talks JSON-RPC 2.0 over HTTP to a chain gateway that serves decoded
//! blocks and storage values as JSON. Methods used:
//!
//! | method                    | params               | result                        |
//! |---------------------------|----------------------|-------------------------------|
//! | `chain_finalizedHead`     | `[]`                 | `BlockHeader`                 |
//! | `chain_block`             | `[number]`           | `Block` or `null`             |
//! | `commitments_byNetuid`    | `[netuid]`           | `[StoredCommitment]`          |
//! | `subnet_uidForAccount`    | `[netuid, account]`  | `uid` or `null`               |
//! | `subnet_validatorPermit`  | `[netuid, uid]`      | `bool` or `null`              |
//! | `stake_totalForAccount`   | `[account]`          | stake in rao or `null`        |
//!
//! Blocks and storage lists are decoded entry by entry: an extrinsic, event
//! or stored commitment that does not decode is logged and dropped, and the
//! rest of the response is still used.
//!
//! There is no push subscription: a producer task polls the finalized head
//! and emits each new head on the [`BlockSubscription`]. Gaps between two
//! polled heads are filled by the consumer, which fetches blocks by number.

use crate::chain::stream::{BlockSubscription, DEFAULT_SUBSCRIPTION_CAPACITY};
use crate::chain::traits::*;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC client for the chain gateway.
#[derive(Clone)]
pub struct RpcChainClient {
    inner: Arc<RpcInner>,
    poll_interval: Duration,
}

struct RpcInner {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcChainClient {
    pub fn new(endpoint: &str, request_timeout: Duration, poll_interval: Duration) -> Self {
        // Fall back to a default client rather than failing construction.
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            inner: Arc::new(RpcInner {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                client,
                next_id: AtomicU64::new(1),
            }),
            poll_interval,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<Option<T>> {
        self.inner.call(method, params).await
    }

    async fn lookup<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LookupError> {
        match self.call::<T>(method, params).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(LookupError::NotFound),
            Err(e) => Err(LookupError::QueryFailed(e.to_string())),
        }
    }
}

impl RpcInner {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ChainResult<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!(
                "{method} returned HTTP status {status}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        decode_response(method, &body)
    }

    async fn finalized_head(&self) -> ChainResult<BlockHeader> {
        self.call("chain_finalizedHead", json!([]))
            .await?
            .ok_or_else(|| ChainError::Decode("chain_finalizedHead returned null".to_string()))
    }
}

/// Decode a JSON-RPC response body. `null` results map to `None`.
fn decode_response<T: DeserializeOwned>(method: &str, body: &str) -> ChainResult<Option<T>> {
    let parsed: RpcResponse =
        serde_json::from_str(body).map_err(|e| ChainError::Decode(format!("{method}: {e}")))?;

    if let Some(err) = parsed.error {
        return Err(ChainError::Transport(format!(
            "{method} failed with code {}: {}",
            err.code, err.message
        )));
    }

    match parsed.result {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ChainError::Decode(format!("{method}: {e}"))),
    }
}

/// `chain_block` result with its entries still undecoded.
#[derive(Debug, Deserialize)]
struct GatewayBlock {
    header: BlockHeader,
    #[serde(default)]
    extrinsics: Vec<Value>,
    #[serde(default)]
    events: Vec<Value>,
}

impl GatewayBlock {
    fn into_block(self) -> Block {
        let number = self.header.number;
        let received = self.extrinsics.len() + self.events.len();
        let extrinsics: Vec<Extrinsic> = decode_entries(self.extrinsics, "extrinsic");
        let events: Vec<EventRecord> = decode_entries(self.events, "event");
        let dropped = received - extrinsics.len() - events.len();
        if dropped > 0 {
            warn!(block = number, dropped, "block decoded with entries dropped");
        }
        Block {
            header: self.header,
            extrinsics,
            events,
        }
    }
}

/// Decode each entry on its own, dropping the ones that fail.
fn decode_entries<T: DeserializeOwned>(entries: Vec<Value>, kind: &'static str) -> Vec<T> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value(entry) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(kind, position, error = %e, "skipping undecodable entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn subscribe_finalized(&self) -> ChainResult<BlockSubscription> {
        // Probe once so a dead endpoint fails the subscription up front.
        let first = self
            .inner
            .finalized_head()
            .await
            .map_err(|e| ChainError::SubscriptionFailed(e.to_string()))?;

        let (subscription, sender) = BlockSubscription::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        let inner = Arc::clone(&self.inner);
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut last_seen = first.number;
            if sender.send(first).await.is_err() {
                return;
            }
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if sender.is_closed() {
                    break;
                }
                match inner.finalized_head().await {
                    Ok(head) if head.number > last_seen => {
                        last_seen = head.number;
                        if sender.send(head).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "finalized head poll failed; retrying"),
                }
            }
            debug!("finalized head poller stopped");
        });

        Ok(subscription)
    }

    async fn finalized_head(&self) -> ChainResult<BlockHeader> {
        self.inner.finalized_head().await
    }

    async fn block(&self, number: BlockNumber) -> ChainResult<Block> {
        self.call::<GatewayBlock>("chain_block", json!([number]))
            .await?
            .map(GatewayBlock::into_block)
            .ok_or(ChainError::BlockNotFound(number))
    }

    async fn commitments(&self, netuid: Netuid) -> ChainResult<Vec<StoredCommitment>> {
        let entries: Vec<Value> = self
            .call("commitments_byNetuid", json!([netuid]))
            .await?
            .unwrap_or_default();
        Ok(decode_entries(entries, "stored commitment"))
    }

    async fn uid_for(&self, netuid: Netuid, account: &AccountId) -> RegistrationLookup {
        self.lookup("subnet_uidForAccount", json!([netuid, account.to_string()]))
            .await
    }

    async fn validator_permit(&self, netuid: Netuid, uid: Uid) -> PermitLookup {
        self.lookup("subnet_validatorPermit", json!([netuid, uid]))
            .await
    }

    async fn total_stake(&self, account: &AccountId) -> StakeLookup {
        self.lookup::<u64>("stake_totalForAccount", json!([account.to_string()]))
            .await
            .map(Stake::from_rao)
    }
}
