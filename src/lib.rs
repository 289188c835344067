// ZetaChain CCTX Tracker Library

pub mod config;
pub mod context;
pub mod cctx;
pub mod monitor;
pub mod rpc;
pub mod bitcoin;
pub mod mocks;

// Core types
pub mod types;
pub mod constants;

// Re-exports for convenience
pub use config::Config;
pub use context::TrackerContext;
pub use cctx::{CctxMatcher, CctxQueryClient, HttpCctxClient, MultiHopResolver, PollSettings, StatusPoller};
pub use monitor::{describe, LatencyStats, MonitorPool, MonitorReport, MonitorTask, StressSummary};
pub use rpc::JsonRpcClient;
pub use types::{expect_status, CctxStatus, CrossChainTx, LookupKey, TrackerError, TrackerResult};
