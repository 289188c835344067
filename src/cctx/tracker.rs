use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::client::CctxQueryClient;
use super::poller::{poll_until, PollOutcome, PollSettings};
use crate::types::{TrackerError, TrackerResult};

/// Where a UTXO-chain transaction currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// In the mempool
    Pending,
    /// Included in a block
    Mined,
    /// Neither in the mempool nor in the chain (replaced or evicted)
    Dropped,
}

/// Snapshot of one broadcast attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementObservation {
    pub hash: String,
    /// sat/vB
    pub fee_rate: Decimal,
    pub state: TxState,
}

/// Read access to a UTXO chain's mempool and ledger
#[async_trait]
pub trait UtxoChainView: Send + Sync {
    async fn tx_state(&self, hash: &str) -> TrackerResult<TxState>;

    /// Fee rate in sat/vB. Only answerable while the transaction is still known to the node.
    async fn fee_rate(&self, hash: &str) -> TrackerResult<Decimal>;
}

/// Check a fee-bump pair: the replacement pays strictly more per vbyte, the
/// original never made it into a block and the replacement is still alive.
pub fn verify_fee_replacement(
    original: &ReplacementObservation,
    replacement: &ReplacementObservation,
) -> TrackerResult<()> {
    if replacement.fee_rate <= original.fee_rate {
        return Err(TrackerError::FeeReplacement(format!(
            "replacement {} fee rate {} sat/vB is not above original {} fee rate {} sat/vB",
            replacement.hash, replacement.fee_rate, original.hash, original.fee_rate
        )));
    }
    if original.state == TxState::Mined {
        return Err(TrackerError::FeeReplacement(format!(
            "original tx {} was mined instead of being replaced",
            original.hash
        )));
    }
    if replacement.state == TxState::Dropped {
        return Err(TrackerError::FeeReplacement(format!(
            "replacement tx {} was dropped",
            replacement.hash
        )));
    }
    Ok(())
}

/// Polls the outbound tracker of one `(chain, nonce)`
#[derive(Clone)]
pub struct OutboundTrackerWatcher {
    client: Arc<dyn CctxQueryClient>,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl OutboundTrackerWatcher {
    pub fn new(client: Arc<dyn CctxQueryClient>, settings: PollSettings, cancel: CancellationToken) -> Self {
        Self { client, settings, cancel }
    }

    /// Wait until the tracker lists at least `min_count` broadcast hashes.
    ///
    /// Polls once per `tracker_interval` (one ZetaChain block by default).
    /// Hashes come back in reporting order: `[0]` is the first broadcast.
    #[instrument(skip(self))]
    pub async fn wait_for_tracker_hashes(
        &self,
        chain_id: i64,
        nonce: u64,
        min_count: usize,
        timeout: Duration,
    ) -> TrackerResult<Vec<String>> {
        if min_count == 0 {
            return Err(TrackerError::InvalidInput("min tracker hash count must be at least 1".to_string()));
        }

        let client = &self.client;
        let label = format!("outbound tracker {}/{}", chain_id, nonce);

        poll_until(
            &self.cancel,
            &label,
            timeout,
            self.settings.tracker_interval,
            self.settings.log_every,
            || async move {
                let hashes = client
                    .outbound_tracker(chain_id, nonce)
                    .await?
                    .map(|t| t.hashes())
                    .unwrap_or_default();

                if hashes.len() >= min_count {
                    info!("📌 outbound tracker {}/{}: {}개 해시 확인", chain_id, nonce, hashes.len());
                    Ok(PollOutcome::Ready(hashes))
                } else {
                    Ok(PollOutcome::Pending {
                        status: format!("{}/{} hashes", hashes.len(), min_count),
                        message: String::new(),
                        index: None,
                    })
                }
            },
        )
        .await
    }
}

/// Watches an original / replacement pair until the replacement wins
#[derive(Clone)]
pub struct FeeReplacementWatcher {
    view: Arc<dyn UtxoChainView>,
    interval: Duration,
    log_every: u32,
    cancel: CancellationToken,
}

impl FeeReplacementWatcher {
    pub fn new(view: Arc<dyn UtxoChainView>, interval: Duration, log_every: u32, cancel: CancellationToken) -> Self {
        Self {
            view,
            interval,
            log_every,
            cancel,
        }
    }

    /// Poll until `hash` can be priced, i.e. the node still knows it
    #[instrument(skip(self))]
    pub async fn observe(&self, hash: &str, timeout: Duration) -> TrackerResult<ReplacementObservation> {
        let view = &self.view;
        let label = format!("fee rate {}", hash);

        poll_until(&self.cancel, &label, timeout, self.interval, self.log_every, || async move {
            let state = view.tx_state(hash).await?;
            if state == TxState::Dropped {
                return Ok(PollOutcome::Pending {
                    status: format!("{:?}", state),
                    message: String::new(),
                    index: None,
                });
            }
            let fee_rate = view.fee_rate(hash).await?;
            info!("💸 tx {} 수수료율 {} sat/vB ({:?})", hash, fee_rate, state);
            Ok(PollOutcome::Ready(ReplacementObservation {
                hash: hash.to_string(),
                fee_rate,
                state,
            }))
        })
        .await
    }

    /// Poll until `hashes[0]` is dropped and `hashes[1]` is mined, then check fee rates.
    ///
    /// Fee rates are sampled while each transaction is still visible, since a
    /// dropped transaction can no longer be priced. When the original may
    /// already be gone, observe it first and use `wait_for_replacement_of`.
    #[instrument(skip(self))]
    pub async fn wait_for_replacement(
        &self,
        hashes: &[String],
        timeout: Duration,
    ) -> TrackerResult<(ReplacementObservation, ReplacementObservation)> {
        if hashes.len() < 2 {
            return Err(TrackerError::InvalidInput(format!(
                "fee replacement needs 2 tracker hashes, got {}",
                hashes.len()
            )));
        }
        self.watch(&hashes[0], None, &hashes[1], timeout).await
    }

    /// Like `wait_for_replacement`, with the original priced beforehand
    #[instrument(skip(self, original), fields(original = %original.hash))]
    pub async fn wait_for_replacement_of(
        &self,
        original: &ReplacementObservation,
        replacement: &str,
        timeout: Duration,
    ) -> TrackerResult<(ReplacementObservation, ReplacementObservation)> {
        if original.state == TxState::Mined {
            return Err(TrackerError::FeeReplacement(format!(
                "original tx {} was mined instead of being replaced",
                original.hash
            )));
        }
        self.watch(&original.hash, Some(original.fee_rate), replacement, timeout)
            .await
    }

    async fn watch(
        &self,
        original: &str,
        original_rate: Option<Decimal>,
        replacement: &str,
        timeout: Duration,
    ) -> TrackerResult<(ReplacementObservation, ReplacementObservation)> {
        let view = &self.view;
        let fee_rates: Mutex<[Option<Decimal>; 2]> = Mutex::new([original_rate, None]);
        let fee_rates = &fee_rates;
        let label = format!("fee replacement {} -> {}", original, replacement);

        poll_until(&self.cancel, &label, timeout, self.interval, self.log_every, || async move {
            let states = [view.tx_state(original).await?, view.tx_state(replacement).await?];

            let mut cached = fee_rates.lock().await;
            for (i, hash) in [original, replacement].iter().enumerate() {
                if cached[i].is_none() && states[i] != TxState::Dropped {
                    cached[i] = Some(view.fee_rate(hash).await?);
                }
            }

            if states[0] == TxState::Mined {
                return Err(TrackerError::FeeReplacement(format!(
                    "original tx {} was mined instead of being replaced",
                    original
                )));
            }
            if states[1] == TxState::Dropped && states[0] == TxState::Dropped {
                warn!("⚠️ 원본과 대체 트랜잭션 모두 사라짐: {} / {}", original, replacement);
                return Err(TrackerError::FeeReplacement(format!(
                    "both {} and {} were dropped",
                    original, replacement
                )));
            }
            if states[0] != TxState::Dropped || states[1] != TxState::Mined {
                return Ok(PollOutcome::Pending {
                    status: format!("original {:?}, replacement {:?}", states[0], states[1]),
                    message: String::new(),
                    index: None,
                });
            }

            let (Some(original_rate), Some(replacement_rate)) = (cached[0], cached[1]) else {
                return Err(TrackerError::FeeReplacement(format!(
                    "fee rate of {} was never observed before it left the mempool",
                    if cached[0].is_none() { original } else { replacement }
                )));
            };

            let observed = (
                ReplacementObservation {
                    hash: original.to_string(),
                    fee_rate: original_rate,
                    state: states[0],
                },
                ReplacementObservation {
                    hash: replacement.to_string(),
                    fee_rate: replacement_rate,
                    state: states[1],
                },
            );
            verify_fee_replacement(&observed.0, &observed.1)?;
            info!(
                "✅ 수수료 대체 확인: {} ({} sat/vB) -> {} ({} sat/vB)",
                original, original_rate, replacement, replacement_rate
            );
            Ok(PollOutcome::Ready(observed))
        })
        .await
    }
}

/// Full fee-bump check for one outbound: price the first broadcast while it is
/// the only tracker hash, then wait for the second hash to replace it.
pub async fn wait_for_fee_bump(
    trackers: &OutboundTrackerWatcher,
    fees: &FeeReplacementWatcher,
    chain_id: i64,
    nonce: u64,
    timeout: Duration,
) -> TrackerResult<(ReplacementObservation, ReplacementObservation)> {
    let first = trackers.wait_for_tracker_hashes(chain_id, nonce, 1, timeout).await?;
    let original = fees.observe(&first[0], timeout).await?;

    let hashes = trackers.wait_for_tracker_hashes(chain_id, nonce, 2, timeout).await?;
    if hashes[0] != original.hash {
        return Err(TrackerError::FeeReplacement(format!(
            "tracker {}/{} first hash changed from {} to {}",
            chain_id, nonce, original.hash, hashes[0]
        )));
    }
    fees.wait_for_replacement_of(&original, &hashes[1], timeout).await
}
