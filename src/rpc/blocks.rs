use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::client::JsonRpcClient;
use crate::cctx::poller::{poll_until, PollOutcome};
use crate::constants::{DEFAULT_LOG_EVERY, ZETA_BLOCK_TIME_MS};
use crate::types::TrackerResult;

/// Waits on `eth_blockNumber` of an EVM endpoint (zEVM or a connected chain)
#[derive(Clone)]
pub struct BlockHeightWaiter {
    rpc: Arc<JsonRpcClient>,
    interval: Duration,
    log_every: u32,
    cancel: CancellationToken,
}

impl BlockHeightWaiter {
    /// Checks twice per ZetaChain block
    pub fn new(rpc: Arc<JsonRpcClient>, cancel: CancellationToken) -> Self {
        Self {
            rpc,
            interval: Duration::from_millis(ZETA_BLOCK_TIME_MS / 2),
            log_every: DEFAULT_LOG_EVERY,
            cancel,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until the chain reaches `height`, returning the height observed
    #[instrument(skip(self))]
    pub async fn wait_for_height(&self, height: u64, timeout: Duration) -> TrackerResult<u64> {
        let rpc = &self.rpc;
        let label = format!("block height {}", height);

        poll_until(&self.cancel, &label, timeout, self.interval, self.log_every, || async move {
            let current = rpc.block_number().await?;
            if current >= height {
                info!("🧱 블록 높이 {} 도달 (현재 {})", height, current);
                Ok(PollOutcome::Ready(current))
            } else {
                Ok(PollOutcome::Pending {
                    status: format!("height {}", current),
                    message: format!("{} blocks to go", height - current),
                    index: None,
                })
            }
        })
        .await
    }

    /// Wait for `count` new blocks past the current height
    pub async fn wait_for_blocks(&self, count: u64, timeout: Duration) -> TrackerResult<u64> {
        let start = self.rpc.block_number().await?;
        self.wait_for_height(start.saturating_add(count), timeout).await
    }
}
