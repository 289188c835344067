use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::client::CctxQueryClient;
use crate::constants::*;
use crate::types::{CctxStatus, CrossChainTx, LookupKey, TrackerError, TrackerResult};

/// 폴링 설정
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub default_timeout: Duration,
    pub tracker_interval: Duration,
    pub log_every: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            default_timeout: default_cctx_timeout(),
            tracker_interval: Duration::from_millis(ZETA_BLOCK_TIME_MS),
            log_every: DEFAULT_LOG_EVERY,
        }
    }
}

/// One observation of a polled resource
pub(crate) enum PollOutcome<T> {
    Ready(T),
    Pending {
        status: String,
        message: String,
        /// CCTX still holding things up, when there is one
        index: Option<String>,
    },
}

/// Fixed-interval poll loop shared by every waiter.
///
/// The first attempt runs immediately. `NotFound` and `Transport` errors are
/// retried until the deadline, every other error is returned as is.
pub(crate) async fn poll_until<T, F, Fut>(
    cancel: &CancellationToken,
    label: &str,
    timeout: Duration,
    interval: Duration,
    log_every: u32,
    mut attempt_fn: F,
) -> TrackerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TrackerResult<PollOutcome<T>>>,
{
    let log_every = log_every.max(1);
    let start = Instant::now();
    let deadline = start + timeout;
    let mut last_status = "unknown".to_string();
    let mut last_index = "unknown".to_string();
    let mut last_message = String::new();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled(label.to_string()));
        }
        attempt += 1;

        match attempt_fn().await {
            Ok(PollOutcome::Ready(value)) => {
                debug!("✅ {} 완료 (시도 {}회, {:?})", label, attempt, start.elapsed());
                return Ok(value);
            }
            Ok(PollOutcome::Pending { status, message, index }) => {
                if status != last_status {
                    info!("🔄 {} 상태 변경: {} -> {}", label, last_status, status);
                } else if attempt % log_every == 0 {
                    info!("⏳ {} 대기 중: {} (시도 {}회, {:?})", label, status, attempt, start.elapsed());
                }
                last_status = status;
                last_message = message;
                if let Some(index) = index {
                    last_index = index;
                }
            }
            Err(e) if e.is_retryable() => {
                if attempt % log_every == 0 {
                    match &e {
                        TrackerError::NotFound(_) => debug!("🔍 {} 아직 없음 (시도 {}회)", label, attempt),
                        _ => warn!("⚠️ {} 조회 실패, 재시도: {} (시도 {}회)", label, e, attempt),
                    }
                }
                last_message = e.to_string();
            }
            Err(e) => return Err(e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(TrackerError::Timeout {
                key: label.to_string(),
                last_index,
                elapsed: start.elapsed(),
                last_status,
                last_message,
            });
        }

        let pause = interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => return Err(TrackerError::Cancelled(label.to_string())),
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

/// Predicate over a CCTX, used by `wait_for_match`
#[derive(Debug, Clone, PartialEq)]
pub enum CctxMatcher {
    /// Status is one of the listed values
    Status(Vec<CctxStatus>),
    /// Reverted, with the revert outbound already broadcast
    Reverted,
    /// Current outbound carries a transaction hash
    HasOutboundHash,
}

impl CctxMatcher {
    pub fn status(status: CctxStatus) -> Self {
        CctxMatcher::Status(vec![status])
    }

    pub fn statuses(statuses: &[CctxStatus]) -> Self {
        CctxMatcher::Status(statuses.to_vec())
    }

    pub fn reverted() -> Self {
        CctxMatcher::Reverted
    }

    pub fn has_outbound_hash() -> Self {
        CctxMatcher::HasOutboundHash
    }

    pub fn matches(&self, cctx: &CrossChainTx) -> bool {
        match self {
            CctxMatcher::Status(statuses) => statuses.contains(&cctx.status()),
            CctxMatcher::Reverted => {
                cctx.status() == CctxStatus::Reverted
                    && cctx.outbound_params.len() == 2
                    && !cctx.outbound_params[1].hash.is_empty()
            }
            CctxMatcher::HasOutboundHash => cctx
                .current_outbound_param()
                .map(|p| !p.hash.is_empty())
                .unwrap_or(false),
        }
    }
}

/// Waits for CCTXs to settle
#[derive(Clone)]
pub struct StatusPoller {
    client: Arc<dyn CctxQueryClient>,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl StatusPoller {
    pub fn new(client: Arc<dyn CctxQueryClient>, settings: PollSettings, cancel: CancellationToken) -> Self {
        Self { client, settings, cancel }
    }

    /// Same client and settings, bound to another cancellation scope
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            client: Arc::clone(&self.client),
            settings: self.settings.clone(),
            cancel,
        }
    }

    pub fn client(&self) -> &Arc<dyn CctxQueryClient> {
        &self.client
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Poll until the CCTX reaches a terminal status.
    ///
    /// For an inbound hash every CCTX it created must be terminal; the most
    /// recent one is returned. Any terminal status is a successful return, `Aborted` and `Cancelled`
    /// included; callers decide what the status means.
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn wait_for_terminal(&self, key: &LookupKey, timeout: Duration) -> TrackerResult<CrossChainTx> {
        if key.as_str().trim().is_empty() {
            return Err(TrackerError::InvalidKey(key.to_string()));
        }

        let client = &self.client;
        let label = key.to_string();

        poll_until(
            &self.cancel,
            &label,
            timeout,
            self.settings.interval,
            self.settings.log_every,
            || async move {
                let mut cctxs = client.lookup_all(key).await?;
                if let Some(pending) = cctxs.iter().find(|c| !c.is_terminal()) {
                    return Ok(PollOutcome::Pending {
                        status: pending.status().to_string(),
                        message: pending.cctx_status.status_message.clone(),
                        index: Some(pending.index.clone()),
                    });
                }
                match cctxs.pop() {
                    Some(cctx) => {
                        info!("🏁 cctx {} 최종 상태: {}", cctx.index, cctx.status());
                        Ok(PollOutcome::Ready(cctx))
                    }
                    None => Err(TrackerError::NotFound(key.to_string())),
                }
            },
        )
        .await
    }

    /// Poll with the configured default timeout
    pub async fn wait_for_terminal_default(&self, key: &LookupKey) -> TrackerResult<CrossChainTx> {
        self.wait_for_terminal(key, self.settings.default_timeout).await
    }

    /// Wait until at least `count` CCTXs exist for the inbound hash and all are terminal
    #[instrument(skip(self))]
    pub async fn wait_for_cctxs(
        &self,
        inbound_hash: &str,
        count: usize,
        timeout: Duration,
    ) -> TrackerResult<Vec<CrossChainTx>> {
        if count == 0 {
            return Err(TrackerError::InvalidInput("cctx count must be at least 1".to_string()));
        }

        let client = &self.client;
        let label = LookupKey::InboundHash(inbound_hash.to_string()).to_string();

        poll_until(
            &self.cancel,
            &label,
            timeout,
            self.settings.interval,
            self.settings.log_every,
            || async move {
                let cctxs = client.cctxs_by_inbound_hash(inbound_hash).await?;
                if cctxs.len() < count {
                    return Ok(PollOutcome::Pending {
                        status: format!("{}/{} cctxs", cctxs.len(), count),
                        message: String::new(),
                        index: cctxs.last().map(|c| c.index.clone()),
                    });
                }
                match cctxs.iter().find(|c| !c.is_terminal()) {
                    Some(pending) => Ok(PollOutcome::Pending {
                        status: pending.status().to_string(),
                        message: pending.cctx_status.status_message.clone(),
                        index: Some(pending.index.clone()),
                    }),
                    None => Ok(PollOutcome::Ready(cctxs)),
                }
            },
        )
        .await
    }

    /// Wait until every CCTX of the inbound hash satisfies `matcher`
    #[instrument(skip(self, matcher))]
    pub async fn wait_for_match(
        &self,
        inbound_hash: &str,
        matcher: &CctxMatcher,
        timeout: Duration,
    ) -> TrackerResult<Vec<CrossChainTx>> {
        let client = &self.client;
        let label = LookupKey::InboundHash(inbound_hash.to_string()).to_string();

        poll_until(
            &self.cancel,
            &label,
            timeout,
            self.settings.interval,
            self.settings.log_every,
            || async move {
                let cctxs = client.cctxs_by_inbound_hash(inbound_hash).await?;
                match cctxs.iter().find(|c| !matcher.matches(c)) {
                    Some(unmatched) => Ok(PollOutcome::Pending {
                        status: unmatched.status().to_string(),
                        message: unmatched.cctx_status.status_message.clone(),
                        index: Some(unmatched.index.clone()),
                    }),
                    None => Ok(PollOutcome::Ready(cctxs)),
                }
            },
        )
        .await
    }

    /// Single query asserting that the inbound hash created no CCTX
    pub async fn ensure_no_cctx(&self, inbound_hash: &str) -> TrackerResult<()> {
        match self.client.cctxs_by_inbound_hash(inbound_hash).await {
            Err(TrackerError::NotFound(_)) => Ok(()),
            Ok(cctxs) if cctxs.is_empty() => Ok(()),
            Ok(cctxs) => Err(TrackerError::UnexpectedCctx(format!(
                "inbound hash {} created {} cctx(s), first index {} with status {}",
                inbound_hash,
                cctxs.len(),
                cctxs[0].index,
                cctxs[0].status()
            ))),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{cctx_with_status, MockCctxClient, MockReply};

    fn fast_settings() -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(10),
            default_timeout: Duration::from_secs(2),
            tracker_interval: Duration::from_millis(10),
            log_every: 10,
        }
    }

    fn poller(mock: &Arc<MockCctxClient>) -> StatusPoller {
        StatusPoller::new(mock.clone(), fast_settings(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_returns_after_third_poll() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xin", "0x01", CctxStatus::PendingOutbound).await;
        mock.push_status("0xin", "0x01", CctxStatus::PendingOutbound).await;
        mock.push_status("0xin", "0x01", CctxStatus::OutboundMined).await;

        let key = LookupKey::InboundHash("0xin".into());
        let cctx = poller(&mock).wait_for_terminal(&key, Duration::from_secs(2)).await.unwrap();

        assert_eq!(cctx.status(), CctxStatus::OutboundMined);
        assert_eq!(mock.call_count("0xin").await, 3);
    }

    #[tokio::test]
    async fn test_timeout_reports_last_status() {
        let mock = Arc::new(MockCctxClient::new());
        let mut cctx = cctx_with_status("0x01", CctxStatus::PendingOutbound);
        cctx.cctx_status.status_message = "waiting for outbound".into();
        mock.push_cctxs("0xin", vec![cctx]).await;

        let key = LookupKey::InboundHash("0xin".into());
        let start = Instant::now();
        let err = poller(&mock).wait_for_terminal(&key, Duration::from_millis(100)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(1));
        match err {
            TrackerError::Timeout { ref key, ref last_index, ref last_status, ref last_message, .. } => {
                assert_eq!(key, "inbound_hash=0xin");
                assert_eq!(last_index, "0x01");
                assert_eq!(last_status, "PendingOutbound");
                assert_eq!(last_message, "waiting for outbound");
            }
            ref other => panic!("expected timeout, got {:?}", other),
        }
        assert!(err.to_string().contains("index: 0x01"));
    }

    #[tokio::test]
    async fn test_inbound_hash_waits_for_every_cctx() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_cctxs(
            "0xin",
            vec![
                cctx_with_status("0x01", CctxStatus::PendingOutbound),
                cctx_with_status("0x02", CctxStatus::OutboundMined),
            ],
        )
        .await;
        mock.push_cctxs(
            "0xin",
            vec![
                cctx_with_status("0x01", CctxStatus::OutboundMined),
                cctx_with_status("0x02", CctxStatus::OutboundMined),
            ],
        )
        .await;

        let cctx = poller(&mock)
            .wait_for_terminal(&LookupKey::InboundHash("0xin".into()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(cctx.index, "0x02");
        assert_eq!(mock.call_count("0xin").await, 2);
    }

    #[tokio::test]
    async fn test_timeout_names_blocking_sibling() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_cctxs(
            "0xin",
            vec![
                cctx_with_status("0xCCTXINDEX", CctxStatus::PendingOutbound),
                cctx_with_status("0x02", CctxStatus::OutboundMined),
            ],
        )
        .await;

        let err = poller(&mock)
            .wait_for_terminal(&LookupKey::InboundHash("0xin".into()), Duration::from_millis(50))
            .await
            .unwrap_err();
        match &err {
            TrackerError::Timeout { last_index, last_status, .. } => {
                assert_eq!(last_index, "0xCCTXINDEX");
                assert_eq!(last_status, "PendingOutbound");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(err.to_string().contains("index: 0xCCTXINDEX"));
    }

    #[tokio::test]
    async fn test_cancelled_status_is_terminal() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0x01", "0x01", CctxStatus::Cancelled).await;

        let cctx = poller(&mock)
            .wait_for_terminal(&LookupKey::Index("0x01".into()), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(cctx.status(), CctxStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_not_found_is_retried() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_reply("0xin", MockReply::NotFound).await;
        mock.push_reply("0xin", MockReply::Transport("connection reset".into())).await;
        mock.push_status("0xin", "0x01", CctxStatus::Reverted).await;

        let cctx = poller(&mock)
            .wait_for_terminal(&LookupKey::InboundHash("0xin".into()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(cctx.status(), CctxStatus::Reverted);
        assert_eq!(mock.call_count("0xin").await, 3);
    }

    #[tokio::test]
    async fn test_invalid_key_not_retried() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_reply("0xbad", MockReply::InvalidKey("malformed hash".into())).await;

        let err = poller(&mock)
            .wait_for_terminal(&LookupKey::InboundHash("0xbad".into()), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidKey(_)));
        assert_eq!(mock.call_count("0xbad").await, 1);

        let err = poller(&mock)
            .wait_for_terminal(&LookupKey::Index(" ".into()), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_terminal_result_is_stable() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0x01", "0x01", CctxStatus::Aborted).await;

        let poller = poller(&mock);
        let key = LookupKey::Index("0x01".into());
        let first = poller.wait_for_terminal(&key, Duration::from_secs(1)).await.unwrap();
        let second = poller.wait_for_terminal(&key, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xin", "0x01", CctxStatus::PendingInbound).await;

        let cancel = CancellationToken::new();
        let poller = StatusPoller::new(mock.clone(), fast_settings(), cancel.clone());

        let handle = tokio::spawn(async move {
            poller
                .wait_for_terminal(&LookupKey::InboundHash("0xin".into()), Duration::from_secs(30))
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(TrackerError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_wait_for_cctxs_needs_count_and_terminal() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_cctxs("0xin", vec![cctx_with_status("0x01", CctxStatus::OutboundMined)]).await;
        mock.push_cctxs(
            "0xin",
            vec![
                cctx_with_status("0x01", CctxStatus::OutboundMined),
                cctx_with_status("0x02", CctxStatus::PendingOutbound),
            ],
        )
        .await;
        mock.push_cctxs(
            "0xin",
            vec![
                cctx_with_status("0x01", CctxStatus::OutboundMined),
                cctx_with_status("0x02", CctxStatus::Reverted),
            ],
        )
        .await;

        let cctxs = poller(&mock).wait_for_cctxs("0xin", 2, Duration::from_secs(2)).await.unwrap();
        assert_eq!(cctxs.len(), 2);
        assert_eq!(mock.call_count("0xin").await, 3);

        let err = poller(&mock).wait_for_cctxs("0xin", 0, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_wait_for_match_reverted() {
        let mock = Arc::new(MockCctxClient::new());
        let mut pending = cctx_with_status("0x01", CctxStatus::Reverted);
        pending.outbound_params.push(Default::default());
        let mut reverted = pending.clone();
        reverted.outbound_params[1].hash = "0xrevert".into();

        mock.push_cctxs("0xin", vec![pending]).await;
        mock.push_cctxs("0xin", vec![reverted]).await;

        let cctxs = poller(&mock)
            .wait_for_match("0xin", &CctxMatcher::reverted(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(cctxs[0].outbound_params[1].hash, "0xrevert");
    }

    #[test]
    fn test_matchers() {
        let mut cctx = cctx_with_status("0x01", CctxStatus::OutboundMined);
        assert!(CctxMatcher::status(CctxStatus::OutboundMined).matches(&cctx));
        assert!(CctxMatcher::statuses(&[CctxStatus::Aborted, CctxStatus::OutboundMined]).matches(&cctx));
        assert!(!CctxMatcher::reverted().matches(&cctx));
        assert!(!CctxMatcher::has_outbound_hash().matches(&cctx));

        cctx.outbound_params[0].hash = "0xout".into();
        assert!(CctxMatcher::has_outbound_hash().matches(&cctx));
    }

    #[tokio::test]
    async fn test_ensure_no_cctx() {
        let mock = Arc::new(MockCctxClient::new());
        mock.push_status("0xhas", "0x01", CctxStatus::PendingOutbound).await;

        let poller = poller(&mock);
        assert!(poller.ensure_no_cctx("0xnone").await.is_ok());
        assert!(matches!(
            poller.ensure_no_cctx("0xhas").await,
            Err(TrackerError::UnexpectedCctx(_))
        ));
    }
}
