use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;

use super::cctx_with_status;
use crate::cctx::CctxQueryClient;
use crate::types::{CctxStatus, CrossChainTx, OutboundTracker, TrackerError, TrackerResult};

/// Scripted reply for one query
#[derive(Debug, Clone)]
pub enum MockReply {
    Cctxs(Vec<CrossChainTx>),
    NotFound,
    InvalidKey(String),
    Transport(String),
    Decode(String),
}

impl MockReply {
    fn into_result(self, key: &str) -> TrackerResult<Vec<CrossChainTx>> {
        match self {
            MockReply::Cctxs(cctxs) if cctxs.is_empty() => Err(TrackerError::NotFound(key.to_string())),
            MockReply::Cctxs(cctxs) => Ok(cctxs),
            MockReply::NotFound => Err(TrackerError::NotFound(key.to_string())),
            MockReply::InvalidKey(msg) => Err(TrackerError::InvalidKey(msg)),
            MockReply::Transport(msg) => Err(TrackerError::Transport(msg)),
            MockReply::Decode(msg) => Err(TrackerError::Decode(msg)),
        }
    }
}

/// In-memory crosschain module.
///
/// Each key (index or inbound hash) owns a queue of replies consumed one per
/// query; the last reply repeats once the queue is down to one entry. Unknown
/// keys answer `NotFound`. Every query is recorded as `"<kind>:<key>"`.
#[derive(Default)]
pub struct MockCctxClient {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    trackers: Mutex<HashMap<(i64, u64), VecDeque<Option<OutboundTracker>>>>,
    calls: Mutex<Vec<String>>,
    latency: Option<(Duration, Duration)>,
}

impl MockCctxClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep a uniformly random duration in `[min, max]` before every reply
    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = Some((min, max.max(min)));
        self
    }

    pub async fn push_reply(&self, key: &str, reply: MockReply) {
        self.replies
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub async fn push_cctxs(&self, key: &str, cctxs: Vec<CrossChainTx>) {
        self.push_reply(key, MockReply::Cctxs(cctxs)).await;
    }

    pub async fn push_status(&self, key: &str, index: &str, status: CctxStatus) {
        self.push_cctxs(key, vec![cctx_with_status(index, status)]).await;
    }

    pub async fn push_tracker(&self, chain_id: i64, nonce: u64, tracker: Option<OutboundTracker>) {
        self.trackers
            .lock()
            .await
            .entry((chain_id, nonce))
            .or_default()
            .push_back(tracker);
    }

    /// Query log in call order
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    /// Number of queries logged as `key` or ending with `:<key>`
    pub async fn call_count(&self, key: &str) -> usize {
        let suffix = format!(":{}", key);
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.as_str() == key || c.ends_with(&suffix))
            .count()
    }

    async fn simulate_latency(&self) {
        if let Some((min, max)) = self.latency {
            tokio::time::sleep(random_delay(min, max)).await;
        }
    }

    async fn next_reply(&self, kind: &str, key: &str) -> TrackerResult<Vec<CrossChainTx>> {
        self.calls.lock().await.push(format!("{}:{}", kind, key));
        self.simulate_latency().await;

        let reply = {
            let mut replies = self.replies.lock().await;
            match replies.get_mut(key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        debug!("🎭 [MOCK] {}:{} -> {:?}", kind, key, reply.as_ref().map(|_| "scripted"));
        reply.unwrap_or(MockReply::NotFound).into_result(key)
    }
}

pub(crate) fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
}

#[async_trait]
impl CctxQueryClient for MockCctxClient {
    async fn cctx_by_index(&self, index: &str) -> TrackerResult<CrossChainTx> {
        let mut cctxs = self.next_reply("index", index).await?;
        cctxs
            .pop()
            .ok_or_else(|| TrackerError::NotFound(index.to_string()))
    }

    async fn cctxs_by_inbound_hash(&self, inbound_hash: &str) -> TrackerResult<Vec<CrossChainTx>> {
        self.next_reply("inbound_hash", inbound_hash).await
    }

    async fn outbound_tracker(&self, chain_id: i64, nonce: u64) -> TrackerResult<Option<OutboundTracker>> {
        self.calls
            .lock()
            .await
            .push(format!("tracker:{}/{}", chain_id, nonce));
        self.simulate_latency().await;

        let mut trackers = self.trackers.lock().await;
        let tracker = match trackers.get_mut(&(chain_id, nonce)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().cloned().flatten(),
            None => None,
        };
        Ok(tracker)
    }
}
