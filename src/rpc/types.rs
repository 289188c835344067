use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{TrackerError, TrackerResult};

/// JSON-RPC 2.0 요청
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// JSON-RPC 응답 (Bitcoin Core omits `jsonrpc`)
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(raw: &str) -> TrackerResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| TrackerError::Decode(format!("not a hex quantity: {:?}", raw)))?;
    if digits.is_empty() {
        return Err(TrackerError::Decode(format!("empty hex quantity: {:?}", raw)));
    }
    u64::from_str_radix(digits, 16).map_err(|e| TrackerError::Decode(format!("{:?}: {}", raw, e)))
}

/// EVM transaction. Quantities stay hex strings; unknown fields land in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransaction {
    pub hash: String,
    pub nonce: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
    pub gas: String,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub input: String,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub chain_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RpcTransaction {
    pub fn is_pending(&self) -> bool {
        self.block_hash.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    pub removed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcReceipt {
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub block_number: String,
    pub from: String,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    pub cumulative_gas_used: String,
    pub gas_used: String,
    pub effective_gas_price: Option<String>,
    /// `0x1` success, `0x0` revert; absent on pre-Byzantium chains
    pub status: Option<String>,
    pub logs: Vec<RpcLog>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RpcReceipt {
    pub fn succeeded(&self) -> Option<bool> {
        self.status
            .as_deref()
            .and_then(|s| parse_hex_u64(s).ok())
            .map(|s| s == 1)
    }

    pub fn block_number(&self) -> TrackerResult<u64> {
        parse_hex_u64(&self.block_number)
    }
}

/// Block body: hashes only, or full transactions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BlockTransactions {
    Hashes(Vec<String>),
    Full(Vec<RpcTransaction>),
}

impl Default for BlockTransactions {
    fn default() -> Self {
        BlockTransactions::Hashes(Vec::new())
    }
}

impl BlockTransactions {
    pub fn len(&self) -> usize {
        match self {
            BlockTransactions::Hashes(h) => h.len(),
            BlockTransactions::Full(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hashes(&self) -> Vec<String> {
        match self {
            BlockTransactions::Hashes(h) => h.clone(),
            BlockTransactions::Full(t) => t.iter().map(|tx| tx.hash.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlock {
    pub hash: Option<String>,
    pub parent_hash: String,
    pub number: Option<String>,
    pub timestamp: String,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub base_fee_per_gas: Option<String>,
    pub transactions: BlockTransactions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RpcBlock {
    pub fn number(&self) -> TrackerResult<u64> {
        let raw = self
            .number
            .as_deref()
            .ok_or_else(|| TrackerError::Decode("pending block has no number".to_string()))?;
        parse_hex_u64(raw)
    }
}

/// One frame of a `callTracer` trace
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: String,
    pub to: Option<String>,
    pub value: Option<String>,
    pub gas: Option<String>,
    pub gas_used: Option<String>,
    pub input: String,
    pub output: Option<String>,
    pub error: Option<String>,
    pub revert_reason: Option<String>,
    pub calls: Vec<CallFrame>,
}

impl CallFrame {
    /// Nesting depth, 1 for a frame without subcalls
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(1usize, self)];
        while let Some((depth, frame)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(frame.calls.iter().map(|child| (depth + 1, child)));
        }
        deepest
    }

    /// Pre-order traversal as `(depth, frame)`, root at depth 0
    pub fn walk(&self) -> Vec<(usize, &CallFrame)> {
        let mut frames = Vec::new();
        let mut stack = vec![(0usize, self)];
        while let Some((depth, frame)) = stack.pop() {
            frames.push((depth, frame));
            for child in frame.calls.iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        frames
    }

    /// First frame (pre-order) that reverted
    pub fn first_error(&self) -> Option<&CallFrame> {
        self.walk()
            .into_iter()
            .map(|(_, frame)| frame)
            .find(|frame| frame.error.is_some())
    }
}

/// Entry of `debug_traceBlockByNumber`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockTrace {
    pub tx_hash: Option<String>,
    pub result: CallFrame,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x1a").unwrap(), 26);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert!(parse_hex_u64("26").is_err());
        assert!(parse_hex_u64("0x").is_err());
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_unknown_fields_are_kept() {
        let tx: RpcTransaction = serde_json::from_value(json!({
            "hash": "0xaa",
            "from": "0x01",
            "to": null,
            "value": "0x0",
            "blockHash": null,
            "yParity": "0x1",
            "accessList": []
        }))
        .unwrap();

        assert!(tx.is_pending());
        assert!(tx.to.is_none());
        assert_eq!(tx.extra.get("yParity"), Some(&json!("0x1")));
        assert!(tx.extra.contains_key("accessList"));
    }

    #[test]
    fn test_block_transactions_both_shapes() {
        let hashes: RpcBlock = serde_json::from_value(json!({
            "number": "0x10",
            "transactions": ["0xaa", "0xbb"]
        }))
        .unwrap();
        assert_eq!(hashes.number().unwrap(), 16);
        assert_eq!(hashes.transactions, BlockTransactions::Hashes(vec!["0xaa".into(), "0xbb".into()]));

        let full: RpcBlock = serde_json::from_value(json!({
            "number": "0x10",
            "transactions": [{ "hash": "0xaa", "from": "0x01", "value": "0x1" }]
        }))
        .unwrap();
        assert_eq!(full.transactions.hashes(), vec!["0xaa".to_string()]);
        assert!(matches!(full.transactions, BlockTransactions::Full(_)));
    }

    #[test]
    fn test_receipt_status() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0xaa",
            "blockNumber": "0x2a",
            "status": "0x1",
            "logs": [{ "address": "0x02", "topics": ["0xdd"], "data": "0x" }]
        }))
        .unwrap();
        assert_eq!(receipt.succeeded(), Some(true));
        assert_eq!(receipt.block_number().unwrap(), 42);
        assert_eq!(receipt.logs[0].topics.len(), 1);
    }

    #[test]
    fn test_nested_call_frames() {
        let frame: CallFrame = serde_json::from_value(json!({
            "type": "CALL",
            "from": "0x01",
            "to": "0x02",
            "input": "0x",
            "calls": [
                {
                    "type": "DELEGATECALL",
                    "from": "0x02",
                    "to": "0x03",
                    "input": "0x",
                    "calls": [
                        { "type": "STATICCALL", "from": "0x03", "to": "0x04", "input": "0x" }
                    ]
                },
                { "type": "CALL", "from": "0x02", "to": "0x05", "input": "0x", "error": "execution reverted" }
            ]
        }))
        .unwrap();

        assert_eq!(frame.depth(), 3);
        let walked: Vec<(usize, &str)> = frame
            .walk()
            .into_iter()
            .map(|(d, f)| (d, f.to.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(walked, vec![(0, "0x02"), (1, "0x03"), (2, "0x04"), (1, "0x05")]);
        assert_eq!(frame.first_error().and_then(|f| f.to.as_deref()), Some("0x05"));
    }
}
