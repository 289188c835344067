use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cctx::{MultiHopResolver, StatusPoller};
use crate::constants::DEFAULT_MAX_CONCURRENCY;
use crate::types::{expect_status, CctxStatus, CrossChainTx, LookupKey, TrackerError, TrackerResult};

/// 모니터 풀 설정
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_concurrency: usize,
    /// Cancel every other task after the first failure
    pub fail_fast: bool,
    pub record_latencies: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            fail_fast: true,
            record_latencies: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorTarget {
    /// One CCTX to a terminal status
    Terminal(LookupKey),
    /// A chain of `hops` CCTXs starting at an inbound hash
    Chain { inbound_hash: String, hops: usize },
}

#[derive(Debug, Clone)]
pub struct MonitorTask {
    pub index: usize,
    pub label: String,
    pub target: MonitorTarget,
    /// Required status of the final CCTX
    pub expected: Option<CctxStatus>,
    /// Per-wait timeout, the poller default when unset
    pub timeout: Option<Duration>,
}

impl MonitorTask {
    pub fn terminal(index: usize, key: LookupKey) -> Self {
        Self {
            index,
            label: key.to_string(),
            target: MonitorTarget::Terminal(key),
            expected: None,
            timeout: None,
        }
    }

    pub fn chain(index: usize, inbound_hash: &str, hops: usize) -> Self {
        Self {
            index,
            label: format!("chain({})={}", hops, inbound_hash),
            target: MonitorTarget::Chain {
                inbound_hash: inbound_hash.to_string(),
                hops,
            },
            expected: None,
            timeout: None,
        }
    }

    pub fn expect(mut self, status: CctxStatus) -> Self {
        self.expected = Some(status);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub index: usize,
    pub label: String,
    /// One entry per hop
    pub cctxs: Vec<CrossChainTx>,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn final_status(&self) -> Option<CctxStatus> {
        self.cctxs.last().map(|c| c.status())
    }
}

#[derive(Debug)]
pub struct TaskFailure {
    /// `None` when the task panicked or was aborted
    pub index: Option<usize>,
    pub label: String,
    pub elapsed: Duration,
    pub error: TrackerError,
}

impl TaskFailure {
    /// Last CCTX status known when the task failed
    pub fn status(&self) -> Option<String> {
        fn status_of(error: &TrackerError) -> Option<String> {
            match error {
                TrackerError::UnexpectedStatus { actual, .. } => Some(actual.to_string()),
                TrackerError::Timeout { last_status, .. } => Some(last_status.clone()),
                TrackerError::HopFailed { source, .. } | TrackerError::TaskFailed { source, .. } => status_of(source),
                _ => None,
            }
        }
        status_of(&self.error)
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.error, TrackerError::Cancelled(_))
    }
}

#[derive(Debug, Default)]
pub struct MonitorReport {
    /// Successful tasks ordered by task index
    pub outcomes: Vec<TaskOutcome>,
    /// Failed tasks in completion order
    pub failures: Vec<TaskFailure>,
    /// Seconds from start to success, in completion order
    pub latencies: Vec<f64>,
}

impl MonitorReport {
    pub fn total(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}

/// Shared sink for per-task latency samples
#[derive(Debug, Clone, Default)]
pub struct LatencyRecorder {
    samples: Arc<Mutex<Vec<f64>>>,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, seconds: f64) {
        self.samples.lock().await.push(seconds);
    }

    pub async fn snapshot(&self) -> Vec<f64> {
        self.samples.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.samples.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.lock().await.is_empty()
    }
}

/// Runs many monitor tasks concurrently under one cancellation scope
#[derive(Clone)]
pub struct MonitorPool {
    poller: StatusPoller,
    settings: PoolSettings,
    cancel: CancellationToken,
}

impl MonitorPool {
    pub fn new(poller: StatusPoller, settings: PoolSettings, cancel: CancellationToken) -> Self {
        Self { poller, settings, cancel }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Run every task and fail with the first task error.
    ///
    /// All tasks are joined before returning, so no task outlives the call.
    pub async fn run_all(&self, tasks: Vec<MonitorTask>) -> TrackerResult<MonitorReport> {
        let mut report = self.run_collect(tasks).await;
        if report.failures.is_empty() {
            return Ok(report);
        }

        let first = report.failures.remove(0);
        Err(TrackerError::TaskFailed {
            task: first.label,
            source: Box::new(first.error),
        })
    }

    /// Run every task and keep all failures in the report
    pub async fn run_collect(&self, tasks: Vec<MonitorTask>) -> MonitorReport {
        let max_concurrency = self.settings.max_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let pool_token = self.cancel.child_token();
        let recorder = LatencyRecorder::new();
        let mut set = JoinSet::new();

        info!("🚀 모니터 태스크 {}개 시작 (최대 동시 실행 {})", tasks.len(), max_concurrency);

        for task in tasks {
            let semaphore = Arc::clone(&semaphore);
            let token = pool_token.child_token();
            let poller = self.poller.with_cancellation(token.clone());
            let recorder = recorder.clone();
            let record_latency = self.settings.record_latencies;

            set.spawn(async move {
                let permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit,
                    _ = token.cancelled() => {
                        let error = TrackerError::Cancelled(task.label.clone());
                        return (task, Duration::ZERO, Err(error));
                    }
                };
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        let error = TrackerError::Cancelled(task.label.clone());
                        return (task, Duration::ZERO, Err(error));
                    }
                };

                // latency covers the task's own work, not the wait for a permit
                let start = Instant::now();
                let result = run_task(&poller, &task).await;
                let elapsed = start.elapsed();

                if result.is_ok() && record_latency {
                    recorder.record(elapsed.as_secs_f64()).await;
                }
                (task, elapsed, result)
            });
        }

        let mut report = MonitorReport::default();

        while let Some(joined) = set.join_next().await {
            let failure = match joined {
                Ok((task, elapsed, Ok(cctxs))) => {
                    debug!("✅ 태스크 {} 완료 ({:?})", task.label, elapsed);
                    report.outcomes.push(TaskOutcome {
                        index: task.index,
                        label: task.label,
                        cctxs,
                        elapsed,
                    });
                    continue;
                }
                Ok((task, elapsed, Err(error))) => TaskFailure {
                    index: Some(task.index),
                    label: task.label,
                    elapsed,
                    error,
                },
                Err(join_error) => TaskFailure {
                    index: None,
                    label: "monitor task".to_string(),
                    elapsed: Duration::ZERO,
                    error: TrackerError::Cancelled(format!("task aborted: {}", join_error)),
                },
            };

            if report.failures.is_empty() {
                error!("❌ 태스크 {} 실패: {}", failure.label, failure.error);
                if self.settings.fail_fast {
                    warn!("🛑 fail-fast: 나머지 태스크 취소");
                    pool_token.cancel();
                }
            } else if failure.is_cancellation() {
                debug!("🛑 태스크 {} 취소됨", failure.label);
            } else {
                warn!("⚠️ 태스크 {} 실패: {}", failure.label, failure.error);
            }
            report.failures.push(failure);
        }

        report.outcomes.sort_by_key(|o| o.index);
        report.latencies = recorder.snapshot().await;

        info!(
            "📊 모니터 완료: 성공 {}, 실패 {}",
            report.outcomes.len(),
            report.failures.len()
        );
        report
    }
}

async fn run_task(poller: &StatusPoller, task: &MonitorTask) -> TrackerResult<Vec<CrossChainTx>> {
    let timeout = task.timeout.unwrap_or(poller.settings().default_timeout);

    let cctxs = match &task.target {
        MonitorTarget::Terminal(key) => vec![poller.wait_for_terminal(key, timeout).await?],
        MonitorTarget::Chain { inbound_hash, hops } => {
            MultiHopResolver::new(poller.clone())
                .wait_for_chain(inbound_hash, *hops, timeout)
                .await?
        }
    };

    if let (Some(expected), Some(last)) = (task.expected, cctxs.last()) {
        expect_status(last, expected)?;
    }
    Ok(cctxs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cctx::PollSettings;
    use crate::mocks::MockCctxClient;

    fn fast_settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(10),
            default_timeout: Duration::from_secs(5),
            ..PollSettings::default()
        }
    }

    fn pool(mock: Arc<MockCctxClient>, settings: PoolSettings) -> MonitorPool {
        let cancel = CancellationToken::new();
        let poller = StatusPoller::new(mock, fast_settings(), cancel.clone());
        MonitorPool::new(poller, settings, cancel)
    }

    #[tokio::test]
    async fn test_fifty_concurrent_tasks_record_fifty_latencies() {
        let mock = Arc::new(
            MockCctxClient::new().with_latency(Duration::from_millis(0), Duration::from_millis(200)),
        );
        let mut tasks = Vec::new();
        for i in 0..50 {
            let hash = format!("0xin{}", i);
            let index = format!("0xcctx{}", i);
            mock.push_status(&hash, &index, CctxStatus::PendingOutbound).await;
            mock.push_status(&hash, &index, CctxStatus::OutboundMined).await;
            tasks.push(MonitorTask::terminal(i, LookupKey::InboundHash(hash)).expect(CctxStatus::OutboundMined));
        }

        let started = Instant::now();
        let report = pool(mock, PoolSettings::default()).run_all(tasks).await.unwrap();

        assert_eq!(report.outcomes.len(), 50);
        assert_eq!(report.latencies.len(), 50);
        assert!(report.latencies.iter().all(|l| *l >= 0.0 && *l < 5.0));
        assert_eq!(report.outcomes[0].index, 0);
        assert_eq!(report.outcomes[49].final_status(), Some(CctxStatus::OutboundMined));
        // 50 tasks of at most ~2 x 200ms each must overlap
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_fail_fast_cancels_siblings() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xbad", "0xbad", CctxStatus::Aborted).await;
        for i in 0..5 {
            mock.push_status(&format!("0xslow{}", i), "0xslow", CctxStatus::PendingOutbound).await;
        }

        let mut tasks = vec![MonitorTask::terminal(0, LookupKey::InboundHash("0xbad".into()))
            .expect(CctxStatus::OutboundMined)];
        for i in 0..5 {
            tasks.push(MonitorTask::terminal(i + 1, LookupKey::InboundHash(format!("0xslow{}", i))));
        }

        let started = Instant::now();
        let err = pool(mock, PoolSettings::default()).run_all(tasks).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        match err {
            TrackerError::TaskFailed { task, source } => {
                assert_eq!(task, "inbound_hash=0xbad");
                assert!(matches!(*source, TrackerError::UnexpectedStatus { actual: CctxStatus::Aborted, .. }));
            }
            other => panic!("expected task failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_fail_fast_all_tasks_finish() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xbad", "0xbad", CctxStatus::Reverted).await;
        mock.push_status("0xok1", "0xok1", CctxStatus::PendingOutbound).await;
        mock.push_status("0xok1", "0xok1", CctxStatus::OutboundMined).await;
        mock.push_status("0xok2", "0xok2", CctxStatus::OutboundMined).await;

        let tasks = vec![
            MonitorTask::terminal(0, LookupKey::InboundHash("0xbad".into())).expect(CctxStatus::OutboundMined),
            MonitorTask::terminal(1, LookupKey::InboundHash("0xok1".into())).expect(CctxStatus::OutboundMined),
            MonitorTask::terminal(2, LookupKey::InboundHash("0xok2".into())).expect(CctxStatus::OutboundMined),
        ];

        let settings = PoolSettings {
            fail_fast: false,
            ..PoolSettings::default()
        };
        let pool = pool(mock, settings);
        let report = pool.run_collect(tasks.clone()).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, Some(0));
        assert_eq!(report.failures[0].status(), Some("Reverted".to_string()));
        assert_eq!(report.latencies.len(), 2);

        assert!(matches!(pool.run_all(tasks).await, Err(TrackerError::TaskFailed { .. })));
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let mock = Arc::new(
            MockCctxClient::new().with_latency(Duration::from_millis(50), Duration::from_millis(50)),
        );
        let mut tasks = Vec::new();
        for i in 0..4 {
            let hash = format!("0x{}", i);
            mock.push_status(&hash, &hash, CctxStatus::OutboundMined).await;
            tasks.push(MonitorTask::terminal(i, LookupKey::InboundHash(hash)));
        }

        let settings = PoolSettings {
            max_concurrency: 1,
            ..PoolSettings::default()
        };
        let started = Instant::now();
        let report = pool(mock, settings).run_all(tasks).await.unwrap();

        assert_eq!(report.outcomes.len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_chain_task() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xdeposit", "0xA", CctxStatus::OutboundMined).await;
        mock.push_status("0xA", "0xB", CctxStatus::OutboundMined).await;

        let tasks = vec![MonitorTask::chain(0, "0xdeposit", 2).expect(CctxStatus::OutboundMined)];
        let report = pool(mock, PoolSettings::default()).run_all(tasks).await.unwrap();

        assert_eq!(report.outcomes[0].cctxs.len(), 2);
        assert_eq!(report.outcomes[0].cctxs[1].index, "0xB");
    }

    #[tokio::test]
    async fn test_latency_recorder_shared() {
        let recorder = LatencyRecorder::new();
        let clone = recorder.clone();
        clone.record(1.5).await;
        recorder.record(0.5).await;
        assert_eq!(recorder.len().await, 2);
        assert_eq!(clone.snapshot().await, vec![1.5, 0.5]);
    }
}
