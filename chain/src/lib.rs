pub mod config;

pub use config::{ChainConfig, MAINNET_CONFIG};
