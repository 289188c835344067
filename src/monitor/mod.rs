// 동시 CCTX 모니터링 및 지연 시간 통계

pub mod pool;
pub mod report;
pub mod stats;

pub use pool::{
    LatencyRecorder, MonitorPool, MonitorReport, MonitorTarget, MonitorTask, PoolSettings, TaskFailure,
    TaskOutcome,
};
pub use report::StressSummary;
pub use stats::{describe, LatencyStats};
