use std::time::Duration;

use tracing::{error, info, instrument};

use super::poller::StatusPoller;
use crate::types::{CrossChainTx, LookupKey, TrackerError, TrackerResult};

/// Follows chained CCTXs (deposit -> call -> withdraw ...).
///
/// A CCTX created by another CCTX is indexed under the parent's index as its
/// inbound hash, so hop `i + 1` can only be looked up once hop `i` is known.
#[derive(Clone)]
pub struct MultiHopResolver {
    poller: StatusPoller,
}

impl MultiHopResolver {
    pub fn new(poller: StatusPoller) -> Self {
        Self { poller }
    }

    /// Wait for `hop_count` chained CCTXs, each to a terminal status, in order.
    ///
    /// The first failing hop aborts the chain with `HopFailed { hop, total }` (1-based).
    #[instrument(skip(self))]
    pub async fn wait_for_chain(
        &self,
        first_inbound_hash: &str,
        hop_count: usize,
        timeout_per_hop: Duration,
    ) -> TrackerResult<Vec<CrossChainTx>> {
        if hop_count == 0 {
            return Err(TrackerError::InvalidInput("hop count must be at least 1".to_string()));
        }

        let mut chain: Vec<CrossChainTx> = Vec::with_capacity(hop_count);
        let mut next_key = first_inbound_hash.to_string();

        for hop in 1..=hop_count {
            let key = LookupKey::InboundHash(next_key.clone());
            info!("🔗 hop {}/{} 대기 중: {}", hop, hop_count, key);

            let cctx = self
                .poller
                .wait_for_terminal(&key, timeout_per_hop)
                .await
                .map_err(|e| {
                    error!("❌ hop {}/{} 실패: {}", hop, hop_count, e);
                    TrackerError::HopFailed {
                        hop,
                        total: hop_count,
                        source: Box::new(e),
                    }
                })?;

            info!("✅ hop {}/{} 완료: {} ({})", hop, hop_count, cctx.index, cctx.status());
            next_key = cctx.index.clone();
            chain.push(cctx);
        }

        Ok(chain)
    }
}
