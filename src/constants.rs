use std::time::Duration;

// Polling (in milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const ZETA_BLOCK_TIME_MS: u64 = 6_000;

// Timeouts (in seconds)
pub const DEFAULT_CCTX_TIMEOUT_SECS: u64 = 8 * 60; // 8 minutes
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// Log throttling: repeated not-found / transport errors are logged every N attempts
pub const DEFAULT_LOG_EVERY: u32 = 10;

// Monitor pool
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;
pub const DEFAULT_PERCENTILES: [f64; 4] = [50.0, 90.0, 95.0, 99.0];
pub const MAX_REPORTED_FAILURES: usize = 10;

// Bitcoin regtest
pub const BTC_REGTEST_BLOCK_TIME_MS: u64 = 6_000;
pub const SATOSHIS_PER_BTC: u64 = 100_000_000;
/// bitcoind: "No such mempool or blockchain transaction"
pub const BTC_RPC_TX_NOT_FOUND: i64 = -5;

// ZetaChain REST gateway paths
pub const CCTX_PATH: &str = "zeta-chain/crosschain/cctx";
pub const INBOUND_HASH_TO_CCTX_DATA_PATH: &str = "zeta-chain/crosschain/inboundHashToCctxData";
pub const OUTBOUND_TRACKER_PATH: &str = "zeta-chain/crosschain/outboundTracker";

// debug_trace* tracer
pub const CALL_TRACER: &str = "callTracer";

pub fn default_poll_interval() -> Duration {
    Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
}

pub fn default_cctx_timeout() -> Duration {
    Duration::from_secs(DEFAULT_CCTX_TIMEOUT_SECS)
}
