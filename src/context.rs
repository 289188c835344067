use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bitcoin::{BackgroundMiner, BitcoinChainView, MinerHandle};
use crate::cctx::{
    CctxQueryClient, FeeReplacementWatcher, HttpCctxClient, MultiHopResolver, OutboundTrackerWatcher,
    PollSettings, StatusPoller,
};
use crate::config::Config;
use crate::monitor::{MonitorPool, PoolSettings};
use crate::rpc::{BlockHeightWaiter, JsonRpcClient};
use crate::types::{TrackerError, TrackerResult};

/// Everything a tracking run needs, passed explicitly to each component
#[derive(Clone)]
pub struct TrackerContext {
    pub cctx_client: Arc<dyn CctxQueryClient>,
    pub evm_rpc: Option<Arc<JsonRpcClient>>,
    pub bitcoin_rpc: Option<Arc<JsonRpcClient>>,
    pub poll: PollSettings,
    pub pool: PoolSettings,
    pub cancel: CancellationToken,
}

impl TrackerContext {
    pub fn new(cctx_client: Arc<dyn CctxQueryClient>, poll: PollSettings, pool: PoolSettings) -> Self {
        Self {
            cctx_client,
            evm_rpc: None,
            bitcoin_rpc: None,
            poll,
            pool,
            cancel: CancellationToken::new(),
        }
    }

    /// Build HTTP clients for every endpoint configured
    pub fn from_config(config: &Config) -> TrackerResult<Self> {
        let cctx_client = HttpCctxClient::from_config(config)?;
        info!("🔗 zetacore REST: {}", cctx_client.base_url());

        let mut ctx = Self::new(Arc::new(cctx_client), config.poll_settings(), config.pool_settings());

        if let Some(url) = &config.evm_rpc.url {
            let rpc = JsonRpcClient::new(url, Duration::from_secs(config.evm_rpc.request_timeout_secs))?;
            info!("🔗 EVM RPC: {}", url);
            ctx.evm_rpc = Some(Arc::new(rpc));
        }

        if let Some(url) = &config.bitcoin.rpc_url {
            let mut rpc = JsonRpcClient::new(url, Duration::from_secs(config.bitcoin.request_timeout_secs))?;
            if let Some(user) = &config.bitcoin.rpc_user {
                rpc = rpc.with_basic_auth(user, config.bitcoin.rpc_password.as_deref());
            }
            info!("🔗 Bitcoin RPC: {}", url);
            ctx.bitcoin_rpc = Some(Arc::new(rpc));
        }

        Ok(ctx)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn poller(&self) -> StatusPoller {
        StatusPoller::new(Arc::clone(&self.cctx_client), self.poll.clone(), self.cancel.clone())
    }

    pub fn resolver(&self) -> MultiHopResolver {
        MultiHopResolver::new(self.poller())
    }

    pub fn tracker_watcher(&self) -> OutboundTrackerWatcher {
        OutboundTrackerWatcher::new(Arc::clone(&self.cctx_client), self.poll.clone(), self.cancel.clone())
    }

    pub fn pool(&self) -> MonitorPool {
        MonitorPool::new(self.poller(), self.pool.clone(), self.cancel.clone())
    }

    pub fn evm_rpc(&self) -> TrackerResult<&Arc<JsonRpcClient>> {
        self.evm_rpc
            .as_ref()
            .ok_or_else(|| TrackerError::Config("evm_rpc.url is not configured".to_string()))
    }

    /// Block-height waiter over the configured EVM endpoint
    pub fn block_waiter(&self) -> TrackerResult<BlockHeightWaiter> {
        Ok(BlockHeightWaiter::new(Arc::clone(self.evm_rpc()?), self.cancel.clone()))
    }

    pub fn bitcoin_rpc(&self) -> TrackerResult<&Arc<JsonRpcClient>> {
        self.bitcoin_rpc
            .as_ref()
            .ok_or_else(|| TrackerError::Config("bitcoin.rpc_url is not configured".to_string()))
    }

    /// Fee-replacement watcher over the configured Bitcoin node, polled once per tracker interval
    pub fn fee_replacement_watcher(&self) -> TrackerResult<FeeReplacementWatcher> {
        let view = BitcoinChainView::new(Arc::clone(self.bitcoin_rpc()?));
        Ok(FeeReplacementWatcher::new(
            Arc::new(view),
            self.poll.tracker_interval,
            self.poll.log_every,
            self.cancel.clone(),
        ))
    }

    /// Start mining on the local regtest node, bound to this context's cancellation
    pub fn start_miner(&self, address: &str, interval: Duration) -> TrackerResult<MinerHandle> {
        let rpc = Arc::clone(self.bitcoin_rpc()?);
        Ok(BackgroundMiner::start_with_cancellation(rpc, address, interval, self.cancel.clone()))
    }
}
