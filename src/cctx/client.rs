use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{CCTX_PATH, INBOUND_HASH_TO_CCTX_DATA_PATH, OUTBOUND_TRACKER_PATH};
use crate::types::{CrossChainTx, LookupKey, OutboundTracker, TrackerError, TrackerResult};

/// Read-only view of the crosschain module.
///
/// Implementations are shared between concurrently running pollers, so every
/// call must be a fresh, independent read.
#[async_trait]
pub trait CctxQueryClient: Send + Sync {
    async fn cctx_by_index(&self, index: &str) -> TrackerResult<CrossChainTx>;

    /// All CCTXs created by one inbound transaction. An unknown hash is `NotFound`.
    async fn cctxs_by_inbound_hash(&self, inbound_hash: &str) -> TrackerResult<Vec<CrossChainTx>>;

    /// `None` while no broadcast has been reported for `(chain_id, nonce)`
    async fn outbound_tracker(&self, chain_id: i64, nonce: u64) -> TrackerResult<Option<OutboundTracker>>;

    /// Resolve a key to a single CCTX. For inbound hashes the most recent CCTX wins.
    async fn lookup(&self, key: &LookupKey) -> TrackerResult<CrossChainTx> {
        match key {
            LookupKey::Index(index) => self.cctx_by_index(index).await,
            LookupKey::InboundHash(hash) => {
                let mut cctxs = self.cctxs_by_inbound_hash(hash).await?;
                cctxs
                    .pop()
                    .ok_or_else(|| TrackerError::NotFound(format!("no cctx for inbound hash {}", hash)))
            }
        }
    }

    /// Every CCTX behind a key: one for an index, all of them for an inbound hash
    async fn lookup_all(&self, key: &LookupKey) -> TrackerResult<Vec<CrossChainTx>> {
        match key {
            LookupKey::Index(index) => Ok(vec![self.cctx_by_index(index).await?]),
            LookupKey::InboundHash(hash) => {
                let cctxs = self.cctxs_by_inbound_hash(hash).await?;
                if cctxs.is_empty() {
                    return Err(TrackerError::NotFound(format!("no cctx for inbound hash {}", hash)));
                }
                Ok(cctxs)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CctxResponse {
    #[serde(rename = "CrossChainTx")]
    cross_chain_tx: CrossChainTx,
}

#[derive(Debug, Deserialize)]
struct InboundHashToCctxResponse {
    #[serde(rename = "CrossChainTxs", default)]
    cross_chain_txs: Vec<CrossChainTx>,
}

#[derive(Debug, Deserialize)]
struct OutboundTrackerResponse {
    #[serde(rename = "outboundTracker")]
    outbound_tracker: OutboundTracker,
}

/// ZetaChain REST gateway client
#[derive(Debug, Clone)]
pub struct HttpCctxClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCctxClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> TrackerResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TrackerError::Config("zetacore REST URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self { base_url, http })
    }

    pub fn from_config(config: &Config) -> TrackerResult<Self> {
        Self::new(&config.zetacore.rest_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, key: &str) -> TrackerResult<T> {
        let url = format!("{}/{}", self.base_url, path);
        let request_id = Uuid::new_v4();

        let response = self
            .http
            .get(&url)
            .send()
            .instrument(tracing::debug_span!("cctx query", url = url.as_str(), request_id = %request_id))
            .await
            .map_err(|e| TrackerError::Transport(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(TrackerError::NotFound(key.to_string()));
        }

        let text = response
            .text()
            .await
            .map_err(|e| TrackerError::Transport(format!("reading body of {}: {}", url, e)))?;

        if status == StatusCode::BAD_REQUEST {
            return Err(TrackerError::InvalidKey(format!("{} ({})", key, text.trim())));
        }
        if !status.is_success() {
            return Err(TrackerError::Transport(format!("HTTP {} from {}", status, url)));
        }

        debug!("📥 {} -> {} bytes", url, text.len());

        serde_json::from_str::<T>(&text)
            .map_err(|e| TrackerError::Decode(format!("{} from {}: {}", e, url, text)))
    }
}

fn checked_key(key: &str) -> TrackerResult<&str> {
    let key = key.trim();
    if key.is_empty() || key.contains('/') {
        return Err(TrackerError::InvalidKey(format!("{:?}", key)));
    }
    Ok(key)
}

#[async_trait]
impl CctxQueryClient for HttpCctxClient {
    async fn cctx_by_index(&self, index: &str) -> TrackerResult<CrossChainTx> {
        let index = checked_key(index)?;
        let body: CctxResponse = self
            .get_json(&format!("{}/{}", CCTX_PATH, index), index)
            .await?;
        Ok(body.cross_chain_tx)
    }

    async fn cctxs_by_inbound_hash(&self, inbound_hash: &str) -> TrackerResult<Vec<CrossChainTx>> {
        let hash = checked_key(inbound_hash)?;
        let body: InboundHashToCctxResponse = self
            .get_json(&format!("{}/{}", INBOUND_HASH_TO_CCTX_DATA_PATH, hash), hash)
            .await?;

        if body.cross_chain_txs.is_empty() {
            return Err(TrackerError::NotFound(hash.to_string()));
        }
        Ok(body.cross_chain_txs)
    }

    async fn outbound_tracker(&self, chain_id: i64, nonce: u64) -> TrackerResult<Option<OutboundTracker>> {
        let key = format!("{}/{}", chain_id, nonce);
        let result: TrackerResult<OutboundTrackerResponse> = self
            .get_json(&format!("{}/{}", OUTBOUND_TRACKER_PATH, key), &key)
            .await;

        match result {
            Ok(body) => Ok(Some(body.outbound_tracker)),
            Err(TrackerError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
