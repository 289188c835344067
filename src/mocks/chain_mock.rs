use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::cctx::{TxState, UtxoChainView};
use crate::types::{TrackerError, TrackerResult};

/// Scripted UTXO chain for fee-replacement checks.
///
/// States follow the same queue rule as `MockCctxClient`: consumed one per
/// query, last one sticky. Unknown transactions are reported as dropped.
#[derive(Default)]
pub struct MockChainView {
    states: Mutex<HashMap<String, VecDeque<TxState>>>,
    fee_rates: Mutex<HashMap<String, Decimal>>,
}

impl MockChainView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_state(&self, hash: &str, state: TxState) {
        self.states
            .lock()
            .await
            .entry(hash.to_string())
            .or_default()
            .push_back(state);
    }

    pub async fn set_fee_rate(&self, hash: &str, sat_per_vbyte: Decimal) {
        self.fee_rates.lock().await.insert(hash.to_string(), sat_per_vbyte);
    }
}

#[async_trait]
impl UtxoChainView for MockChainView {
    async fn tx_state(&self, hash: &str) -> TrackerResult<TxState> {
        let mut states = self.states.lock().await;
        let state = match states.get_mut(hash) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        Ok(state.unwrap_or(TxState::Dropped))
    }

    async fn fee_rate(&self, hash: &str) -> TrackerResult<Decimal> {
        self.fee_rates
            .lock()
            .await
            .get(hash)
            .copied()
            .ok_or_else(|| TrackerError::NotFound(format!("fee rate for {}", hash)))
    }
}
