use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::debug;

use crate::cctx::{TxState, UtxoChainView};
use crate::constants::{BTC_RPC_TX_NOT_FOUND, SATOSHIS_PER_BTC};
use crate::rpc::JsonRpcClient;
use crate::types::{TrackerError, TrackerResult};

/// `UtxoChainView` backed by a Bitcoin Core node (requires `txindex`)
#[derive(Clone)]
pub struct BitcoinChainView {
    rpc: Arc<JsonRpcClient>,
}

impl BitcoinChainView {
    pub fn new(rpc: Arc<JsonRpcClient>) -> Self {
        Self { rpc }
    }

    async fn raw_transaction(&self, txid: &str, verbosity: Value) -> TrackerResult<Value> {
        self.rpc.call_raw("getrawtransaction", json!([txid, verbosity])).await
    }

    /// Value in satoshis of output `vout` of `txid`
    async fn prevout_value(&self, txid: &str, vout: u64) -> TrackerResult<Decimal> {
        let parent = self.raw_transaction(txid, json!(true)).await?;
        let output = parent["vout"]
            .as_array()
            .and_then(|outs| outs.iter().find(|o| o["n"].as_u64() == Some(vout)))
            .ok_or_else(|| TrackerError::Decode(format!("tx {} has no output {}", txid, vout)))?;
        btc_to_sats(&output["value"])
    }
}

/// BTC amount (JSON number) to satoshis
pub fn btc_to_sats(value: &Value) -> TrackerResult<Decimal> {
    let btc = value
        .as_f64()
        .and_then(Decimal::from_f64)
        .ok_or_else(|| TrackerError::Decode(format!("not a BTC amount: {}", value)))?;
    Ok((btc.round_dp(8) * Decimal::from(SATOSHIS_PER_BTC)).round())
}

#[async_trait]
impl UtxoChainView for BitcoinChainView {
    async fn tx_state(&self, hash: &str) -> TrackerResult<TxState> {
        match self.raw_transaction(hash, json!(true)).await {
            Ok(tx) => {
                let confirmations = tx["confirmations"].as_u64().unwrap_or(0);
                if confirmations > 0 || tx["blockhash"].is_string() {
                    Ok(TxState::Mined)
                } else {
                    Ok(TxState::Pending)
                }
            }
            Err(TrackerError::Rpc { code, .. }) if code == BTC_RPC_TX_NOT_FOUND => Ok(TxState::Dropped),
            Err(e) => Err(e),
        }
    }

    /// fee = Σ prevout values - Σ output values, rate = fee / vsize (sat/vB)
    async fn fee_rate(&self, hash: &str) -> TrackerResult<Decimal> {
        let tx = match self.raw_transaction(hash, json!(2)).await {
            Err(TrackerError::Rpc { code, message }) if code == BTC_RPC_TX_NOT_FOUND => {
                return Err(TrackerError::NotFound(format!("tx {}: {}", hash, message)));
            }
            other => other?,
        };

        let vsize = tx["vsize"]
            .as_u64()
            .filter(|v| *v > 0)
            .ok_or_else(|| TrackerError::Decode(format!("tx {} has no vsize", hash)))?;

        let mut input_sats = Decimal::ZERO;
        for input in tx["vin"].as_array().cloned().unwrap_or_default() {
            if input.get("coinbase").is_some() {
                return Err(TrackerError::InvalidInput(format!("tx {} is a coinbase", hash)));
            }
            // verbosity 2 includes prevouts on Bitcoin Core 25+
            if let Some(prevout) = input.get("prevout") {
                input_sats += btc_to_sats(&prevout["value"])?;
                continue;
            }
            let txid = input["txid"]
                .as_str()
                .ok_or_else(|| TrackerError::Decode(format!("tx {} input without txid", hash)))?;
            let vout = input["vout"]
                .as_u64()
                .ok_or_else(|| TrackerError::Decode(format!("tx {} input without vout", hash)))?;
            input_sats += self.prevout_value(txid, vout).await?;
        }

        let mut output_sats = Decimal::ZERO;
        for output in tx["vout"].as_array().cloned().unwrap_or_default() {
            output_sats += btc_to_sats(&output["value"])?;
        }

        let fee = input_sats - output_sats;
        if fee.is_sign_negative() {
            return Err(TrackerError::Decode(format!(
                "tx {} outputs ({} sats) exceed inputs ({} sats)",
                hash, output_sats, input_sats
            )));
        }

        let rate = fee / Decimal::from(vsize);
        debug!("💸 tx {} fee {} sats, vsize {}, {} sat/vB", hash, fee, vsize, rate);
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn view_for(server: &MockServer) -> BitcoinChainView {
        let rpc = JsonRpcClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_basic_auth("e2etest", Some("123"));
        BitcoinChainView::new(Arc::new(rpc))
    }

    async fn mount(server: &MockServer, params: Value, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getrawtransaction", "params": params })))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_btc_to_sats() {
        assert_eq!(btc_to_sats(&json!(0.001)).unwrap(), Decimal::from(100_000));
        assert_eq!(btc_to_sats(&json!(1)).unwrap(), Decimal::from(100_000_000));
        assert_eq!(btc_to_sats(&json!(0.00000001)).unwrap(), Decimal::from(1));
        assert!(btc_to_sats(&json!("0.1")).is_err());
    }

    #[tokio::test]
    async fn test_tx_state() {
        let server = MockServer::start().await;
        mount(&server, json!(["mined", true]), 200, json!({ "result": { "txid": "mined", "confirmations": 3, "blockhash": "00ab" }, "error": null, "id": 1 })).await;
        mount(&server, json!(["pending", true]), 200, json!({ "result": { "txid": "pending" }, "error": null, "id": 1 })).await;
        mount(&server, json!(["gone", true]), 500, json!({ "result": null, "error": { "code": -5, "message": "No such mempool or blockchain transaction. Use gettransaction for wallet transactions." }, "id": 1 })).await;

        let view = view_for(&server);
        assert_eq!(view.tx_state("mined").await.unwrap(), TxState::Mined);
        assert_eq!(view.tx_state("pending").await.unwrap(), TxState::Pending);
        assert_eq!(view.tx_state("gone").await.unwrap(), TxState::Dropped);
    }

    #[tokio::test]
    async fn test_fee_rate_with_prevouts() {
        let server = MockServer::start().await;
        mount(
            &server,
            json!(["child", 2]),
            200,
            json!({
                "result": {
                    "txid": "child",
                    "vsize": 200,
                    "vin": [
                        { "txid": "p1", "vout": 0, "prevout": { "value": 0.001 } },
                        { "txid": "p2", "vout": 1, "prevout": { "value": 0.0005 } }
                    ],
                    "vout": [{ "n": 0, "value": 0.0014 }]
                },
                "error": null,
                "id": 1
            }),
        )
        .await;

        let rate = view_for(&server).fee_rate("child").await.unwrap();
        assert_eq!(rate, Decimal::from(50));
    }

    #[tokio::test]
    async fn test_fee_rate_fetches_parent_outputs() {
        let server = MockServer::start().await;
        mount(
            &server,
            json!(["child", 2]),
            200,
            json!({
                "result": {
                    "txid": "child",
                    "vsize": 100,
                    "vin": [{ "txid": "parent", "vout": 1 }],
                    "vout": [{ "n": 0, "value": 0.0099 }]
                },
                "error": null,
                "id": 1
            }),
        )
        .await;
        mount(
            &server,
            json!(["parent", true]),
            200,
            json!({
                "result": {
                    "txid": "parent",
                    "vout": [{ "n": 0, "value": 5.0 }, { "n": 1, "value": 0.01 }]
                },
                "error": null,
                "id": 1
            }),
        )
        .await;

        let rate = view_for(&server).fee_rate("child").await.unwrap();
        assert_eq!(rate, Decimal::from(100));
    }
}
