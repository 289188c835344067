use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, Instrument};

use super::types::{BlockTrace, CallFrame, JsonRpcRequest, JsonRpcResponse, RpcBlock, RpcReceipt, RpcTransaction};
use crate::constants::CALL_TRACER;
use crate::types::{TrackerError, TrackerResult};

/// Minimal JSON-RPC 2.0 client over HTTP.
///
/// Read-only: no signing, no retries. Errors map to `Rpc` (error object in the
/// response), `Transport` (connection / non-JSON HTTP failure) and `Decode`.
#[derive(Debug)]
pub struct JsonRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    basic_auth: Option<(String, Option<String>)>,
}

impl JsonRpcClient {
    pub fn new(url: &str, request_timeout: Duration) -> TrackerResult<Self> {
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(TrackerError::Config("JSON-RPC URL is empty".to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
            basic_auth: None,
        })
    }

    /// Bitcoin Core style `rpcuser` / `rpcpassword`
    pub fn with_basic_auth(mut self, user: &str, password: Option<&str>) -> Self {
        self.basic_auth = Some((user.to_string(), password.map(str::to_string)));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call_raw(&self, method: &str, params: Value) -> TrackerResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some((user, password)) = &self.basic_auth {
            builder = builder.basic_auth(user, password.as_ref());
        }

        let response = builder
            .send()
            .instrument(tracing::debug_span!("json-rpc", method, id))
            .await
            .map_err(|e| TrackerError::Transport(format!("{} {}: {}", method, self.url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TrackerError::Transport(format!("reading {} response: {}", method, e)))?;

        // error objects may come with a non-2xx status (bitcoind answers 500 / 404)
        let parsed: JsonRpcResponse = match decode_unbounded(&text) {
            Ok(parsed) => parsed,
            Err(e) if status.is_success() => {
                return Err(TrackerError::Decode(format!("{} response: {}: {}", method, e, text)));
            }
            Err(_) => {
                return Err(TrackerError::Transport(format!("{} HTTP {}: {}", method, status, text.trim())));
            }
        };

        if let Some(error) = parsed.error {
            debug!("📥 {} RPC 오류 {}: {}", method, error.code, error.message);
            return Err(TrackerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(parsed.result.unwrap_or(Value::Null))
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> TrackerResult<T> {
        let raw = self.call_raw(method, params).await?;
        T::deserialize(serde_stacker::Deserializer::new(raw))
            .map_err(|e| TrackerError::Decode(format!("{} result: {}", method, e)))
    }

    pub async fn block_number(&self) -> TrackerResult<u64> {
        let raw: String = self.call("eth_blockNumber", json!([])).await?;
        super::types::parse_hex_u64(&raw)
    }

    /// `None` for an unknown hash
    pub async fn get_transaction_by_hash(&self, hash: &str) -> TrackerResult<Option<RpcTransaction>> {
        self.call("eth_getTransactionByHash", json!([hash])).await
    }

    /// `None` while the transaction is pending or unknown
    pub async fn get_transaction_receipt(&self, hash: &str) -> TrackerResult<Option<RpcReceipt>> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }

    pub async fn get_block_by_number(&self, number: u64, full_transactions: bool) -> TrackerResult<Option<RpcBlock>> {
        self.call("eth_getBlockByNumber", json!([format!("{:#x}", number), full_transactions]))
            .await
    }

    pub async fn get_block_by_hash(&self, hash: &str, full_transactions: bool) -> TrackerResult<Option<RpcBlock>> {
        self.call("eth_getBlockByHash", json!([hash, full_transactions])).await
    }

    /// `debug_traceTransaction` with the call tracer
    pub async fn trace_transaction(&self, hash: &str) -> TrackerResult<CallFrame> {
        self.call("debug_traceTransaction", json!([hash, { "tracer": CALL_TRACER }]))
            .await
    }

    /// `debug_traceBlockByNumber` with the call tracer, one entry per transaction
    pub async fn trace_block_by_number(&self, number: u64) -> TrackerResult<Vec<BlockTrace>> {
        self.call(
            "debug_traceBlockByNumber",
            json!([format!("{:#x}", number), { "tracer": CALL_TRACER }]),
        )
        .await
    }
}

/// Call traces nest up to the EVM call depth limit (1024), well past
/// serde_json's default recursion limit of 128.
fn decode_unbounded<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let value = T::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(value)
}
