// CCTX 조회 및 상태 대기

pub mod client;
pub mod poller;
pub mod resolver;
pub mod tracker;

pub use client::{CctxQueryClient, HttpCctxClient};
pub use poller::{CctxMatcher, PollSettings, StatusPoller};
pub use resolver::MultiHopResolver;
pub use tracker::{
    verify_fee_replacement, wait_for_fee_bump, FeeReplacementWatcher, OutboundTrackerWatcher, ReplacementObservation,
    TxState, UtxoChainView,
};
