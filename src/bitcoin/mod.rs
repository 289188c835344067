// Bitcoin regtest 노드 연동

pub mod miner;
pub mod view;

pub use miner::{BackgroundMiner, MinerHandle};
pub use view::{btc_to_sats, BitcoinChainView};
