pub mod bootnodes;
pub mod compressor;
pub mod discovery;
pub mod encoding;
pub mod error;
pub mod gossipsub;
pub mod network;
pub mod p2p;
pub mod req_resp;
pub mod sync;
pub mod types;

pub use error::{NetworkError, Result};
