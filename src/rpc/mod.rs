// 외부 체인 JSON-RPC 조회

pub mod blocks;
pub mod client;
pub mod types;

pub use blocks::BlockHeightWaiter;
pub use client::JsonRpcClient;
pub use types::{
    parse_hex_u64, BlockTrace, BlockTransactions, CallFrame, JsonRpcError, RpcBlock, RpcLog, RpcReceipt,
    RpcTransaction,
};
