use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// CCTX status as reported by the crosschain module
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CctxStatus {
    #[default]
    PendingInbound,
    PendingOutbound,
    OutboundMined,
    PendingRevert,
    Reverted,
    Aborted,
    Cancelled,
}

impl CctxStatus {
    /// Terminal statuses never change again; everything else must be re-polled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CctxStatus::OutboundMined
                | CctxStatus::Reverted
                | CctxStatus::Aborted
                | CctxStatus::Cancelled
        )
    }
}

impl std::fmt::Display for CctxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CctxStatus::PendingInbound => write!(f, "PendingInbound"),
            CctxStatus::PendingOutbound => write!(f, "PendingOutbound"),
            CctxStatus::OutboundMined => write!(f, "OutboundMined"),
            CctxStatus::PendingRevert => write!(f, "PendingRevert"),
            CctxStatus::Reverted => write!(f, "Reverted"),
            CctxStatus::Aborted => write!(f, "Aborted"),
            CctxStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for CctxStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pendinginbound" | "pending_inbound" => Ok(CctxStatus::PendingInbound),
            "pendingoutbound" | "pending_outbound" => Ok(CctxStatus::PendingOutbound),
            "outboundmined" | "outbound_mined" | "mined" => Ok(CctxStatus::OutboundMined),
            "pendingrevert" | "pending_revert" => Ok(CctxStatus::PendingRevert),
            "reverted" => Ok(CctxStatus::Reverted),
            "aborted" => Ok(CctxStatus::Aborted),
            "cancelled" | "canceled" => Ok(CctxStatus::Cancelled),
            other => Err(TrackerError::InvalidInput(format!("unknown cctx status: {}", other))),
        }
    }
}

/// Inbound confirmation tier
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfirmationMode {
    #[default]
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "FAST")]
    Fast,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CoinType {
    Zeta,
    #[default]
    Gas,
    ERC20,
    Cmd,
    NoAssetCall,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrossChainTx {
    pub creator: String,
    pub index: String,
    pub zeta_fees: String,
    pub relayed_message: String,
    pub cctx_status: CctxStatusInfo,
    pub inbound_params: InboundParams,
    pub outbound_params: Vec<OutboundParams>,
    pub protocol_contract_version: String,
    pub revert_options: RevertOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CctxStatusInfo {
    pub status: CctxStatus,
    pub status_message: String,
    pub error_message: String,
    #[serde(rename = "lastUpdate_timestamp")]
    pub last_update_timestamp: String,
    #[serde(rename = "isAbortRefunded")]
    pub is_abort_refunded: bool,
    pub created_timestamp: String,
    pub error_message_revert: String,
    pub error_message_abort: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InboundParams {
    pub sender: String,
    pub sender_chain_id: String,
    pub tx_origin: String,
    pub coin_type: CoinType,
    pub asset: String,
    pub amount: String,
    pub observed_hash: String,
    pub observed_external_height: String,
    pub ballot_index: String,
    pub finalized_zeta_height: String,
    pub tx_finalization_status: String,
    pub is_cross_chain_call: bool,
    pub status: String,
    pub confirmation_mode: ConfirmationMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutboundParams {
    pub receiver: String,
    #[serde(rename = "receiver_chainId")]
    pub receiver_chain_id: String,
    pub coin_type: CoinType,
    pub amount: String,
    pub tss_nonce: String,
    pub gas_limit: String,
    pub gas_price: String,
    pub gas_priority_fee: String,
    pub hash: String,
    pub ballot_index: String,
    pub observed_external_height: String,
    pub gas_used: String,
    pub effective_gas_price: String,
    pub effective_gas_limit: String,
    pub tss_pubkey: String,
    pub tx_finalization_status: String,
    pub confirmation_mode: ConfirmationMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RevertOptions {
    pub revert_address: String,
    pub call_on_revert: bool,
    pub abort_address: String,
    pub revert_message: Option<String>,
    pub revert_gas_limit: String,
}

impl CrossChainTx {
    pub fn status(&self) -> CctxStatus {
        self.cctx_status.status
    }

    pub fn is_terminal(&self) -> bool {
        self.cctx_status.status.is_terminal()
    }

    /// The outbound attempt currently in flight (last element)
    pub fn current_outbound_param(&self) -> Option<&OutboundParams> {
        self.outbound_params.last()
    }

    pub fn sender_chain_id(&self) -> TrackerResult<i64> {
        parse_int_field("inbound_params.sender_chain_id", &self.inbound_params.sender_chain_id)
    }

    pub fn inbound_amount(&self) -> TrackerResult<Decimal> {
        parse_decimal_field("inbound_params.amount", &self.inbound_params.amount)
    }

    /// Last status change on zetacore (unix seconds on the wire)
    pub fn last_update(&self) -> TrackerResult<DateTime<Utc>> {
        let secs: i64 = parse_int_field(
            "cctx_status.lastUpdate_timestamp",
            &self.cctx_status.last_update_timestamp,
        )?;
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| TrackerError::Decode(format!("timestamp out of range: {}", secs)))
    }
}

impl OutboundParams {
    pub fn tss_nonce(&self) -> TrackerResult<u64> {
        parse_int_field("outbound_params.tss_nonce", &self.tss_nonce)
    }

    pub fn receiver_chain_id(&self) -> TrackerResult<i64> {
        parse_int_field("outbound_params.receiver_chainId", &self.receiver_chain_id)
    }

    pub fn amount(&self) -> TrackerResult<Decimal> {
        parse_decimal_field("outbound_params.amount", &self.amount)
    }
}

fn parse_int_field<T: FromStr>(field: &str, raw: &str) -> TrackerResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| TrackerError::Decode(format!("{} is not an integer: {:?}", field, raw)))
}

fn parse_decimal_field(field: &str, raw: &str) -> TrackerResult<Decimal> {
    Decimal::from_str(raw.trim())
        .map_err(|e| TrackerError::Decode(format!("{} is not a decimal ({}): {:?}", field, e, raw)))
}

/// Outbound tracker entry: every broadcast attempt for one (chain, nonce)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutboundTracker {
    pub index: String,
    pub chain_id: String,
    pub nonce: String,
    pub hash_list: Vec<TxHashEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TxHashEntry {
    pub tx_hash: String,
    pub tx_signer: String,
    pub proven: bool,
}

impl OutboundTracker {
    /// Broadcast hashes in the order they were reported
    pub fn hashes(&self) -> Vec<String> {
        self.hash_list.iter().map(|h| h.tx_hash.clone()).collect()
    }
}

/// Key used to look up a CCTX
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupKey {
    /// Inbound transaction hash (or the index of a parent CCTX for chained calls)
    InboundHash(String),
    /// CCTX index
    Index(String),
}

impl LookupKey {
    pub fn as_str(&self) -> &str {
        match self {
            LookupKey::InboundHash(s) | LookupKey::Index(s) => s,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LookupKey::InboundHash(_) => "inbound_hash",
            LookupKey::Index(_) => "index",
        }
    }
}

impl std::fmt::Display for LookupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.kind(), self.as_str())
    }
}

/// Error types
#[derive(thiserror::Error, Debug)]
pub enum TrackerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid lookup key: {0}")]
    InvalidKey(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("waiting cctx timeout, {key}, index: {last_index}, elapsed: {elapsed:?}, last status: {last_status}, message: {last_message}")]
    Timeout {
        key: String,
        /// Index of the last pending CCTX seen, `unknown` if none was
        last_index: String,
        elapsed: Duration,
        last_status: String,
        last_message: String,
    },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("Hop {hop}/{total} failed: {source}")]
    HopFailed {
        hop: usize,
        total: usize,
        #[source]
        source: Box<TrackerError>,
    },

    #[error("Unexpected cctx status: index {index}, expected {expected}, got {actual}, message: {message}")]
    UnexpectedStatus {
        index: String,
        expected: CctxStatus,
        actual: CctxStatus,
        message: String,
    },

    #[error("Unexpected cctx: {0}")]
    UnexpectedCctx(String),

    #[error("Fee replacement check failed: {0}")]
    FeeReplacement(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<TrackerError>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Only "not there yet" and transport failures are worth another poll.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::NotFound(_) | TrackerError::Transport(_))
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TrackerError::Decode(e.to_string())
        } else {
            TrackerError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(e: serde_json::Error) -> Self {
        TrackerError::Decode(e.to_string())
    }
}

/// Result type alias
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Fail unless the CCTX reached `expected`.
///
/// The poller hands back any terminal record; deciding whether that record is a
/// pass or a failure belongs to the caller.
pub fn expect_status(cctx: &CrossChainTx, expected: CctxStatus) -> TrackerResult<()> {
    if cctx.status() == expected {
        return Ok(());
    }
    Err(TrackerError::UnexpectedStatus {
        index: cctx.index.clone(),
        expected,
        actual: cctx.status(),
        message: cctx.cctx_status.status_message.clone(),
    })
}
