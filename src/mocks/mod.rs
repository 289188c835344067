pub mod cctx_mock;
pub mod chain_mock;

pub use cctx_mock::{MockCctxClient, MockReply};
pub use chain_mock::MockChainView;

use crate::types::{CctxStatus, CrossChainTx, OutboundParams};

/// Minimal CCTX with one outbound attempt
pub fn cctx_with_status(index: &str, status: CctxStatus) -> CrossChainTx {
    let mut cctx = CrossChainTx {
        index: index.to_string(),
        outbound_params: vec![OutboundParams {
            receiver_chain_id: "1337".to_string(),
            tss_nonce: "0".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    cctx.cctx_status.status = status;
    cctx.inbound_params.sender_chain_id = "7001".to_string();
    cctx
}
