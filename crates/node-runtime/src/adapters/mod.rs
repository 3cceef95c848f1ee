//! Adapters connecting the consensus core to the node's transport.

pub mod local_network;

pub use local_network::*;
