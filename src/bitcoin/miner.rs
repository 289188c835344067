use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rpc::JsonRpcClient;

/// Keeps a local regtest node producing blocks while a test waits on it
pub struct BackgroundMiner;

impl BackgroundMiner {
    /// Mine one block to `address` every `interval` until the handle is stopped or dropped
    pub fn start(rpc: Arc<JsonRpcClient>, address: &str, interval: Duration) -> MinerHandle {
        Self::start_with_cancellation(rpc, address, interval, CancellationToken::new())
    }

    /// Like `start`, also stopping when `parent` is cancelled
    pub fn start_with_cancellation(
        rpc: Arc<JsonRpcClient>,
        address: &str,
        interval: Duration,
        parent: CancellationToken,
    ) -> MinerHandle {
        let cancel = parent.child_token();
        let blocks_mined = Arc::new(AtomicU64::new(0));
        let address = address.to_string();

        info!("⛏️ 백그라운드 블록 채굴 시작: {} (간격 {:?})", address, interval);

        let handle = {
            let cancel = cancel.clone();
            let blocks_mined = Arc::clone(&blocks_mined);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => {
                            match rpc.call_raw("generatetoaddress", json!([1, address])).await {
                                Ok(hashes) => {
                                    let total = blocks_mined.fetch_add(1, Ordering::Relaxed) + 1;
                                    debug!("⛏️ 블록 채굴됨 ({}개): {}", total, hashes);
                                }
                                Err(e) => warn!("⚠️ 블록 채굴 실패: {}", e),
                            }
                        }
                    }
                }
                debug!("⛏️ 백그라운드 채굴 종료");
            })
        };

        MinerHandle {
            cancel,
            handle: Some(handle),
            blocks_mined,
        }
    }
}

/// Stops the miner on `stop()` or drop
pub struct MinerHandle {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    blocks_mined: Arc<AtomicU64>,
}

impl MinerHandle {
    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Stop mining and wait for the loop to exit
    pub async fn stop(mut self) -> u64 {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("⚠️ 채굴 태스크 종료 오류: {}", e);
            }
        }
        let mined = self.blocks_mined();
        info!("⛏️ 백그라운드 채굴 중지 (총 {}개 블록)", mined);
        mined
    }
}

impl Drop for MinerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn regtest_node() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "generatetoaddress" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": ["0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"],
                "error": null,
                "id": 1
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_miner_mines_until_stopped() {
        let server = regtest_node().await;
        let rpc = Arc::new(JsonRpcClient::new(&server.uri(), Duration::from_secs(2)).unwrap());

        let handle = BackgroundMiner::start(rpc, "bcrt1qaddress", Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(120)).await;
        let mined = handle.stop().await;
        assert!(mined >= 2);

        let after_stop = server.received_requests().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), after_stop);
    }

    #[tokio::test]
    async fn test_drop_cancels_miner() {
        let server = regtest_node().await;
        let rpc = Arc::new(JsonRpcClient::new(&server.uri(), Duration::from_secs(2)).unwrap());

        let handle = BackgroundMiner::start(rpc, "bcrt1qaddress", Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let after_drop = server.received_requests().await.unwrap().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), after_drop);
    }

    #[tokio::test]
    async fn test_parent_cancellation_stops_miner() {
        let server = regtest_node().await;
        let rpc = Arc::new(JsonRpcClient::new(&server.uri(), Duration::from_secs(2)).unwrap());
        let parent = CancellationToken::new();

        let handle =
            BackgroundMiner::start_with_cancellation(rpc, "bcrt1qaddress", Duration::from_millis(20), parent.clone());
        parent.cancel();
        let mined = tokio::time::timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
        assert!(mined <= 1);
    }
}
