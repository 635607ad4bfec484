//! burnindex-rpc: JSON-RPC plumbing for the indexer.
//!
//! - [`RpcTransport`]: object-safe trait over one endpoint
//! - [`HttpRpcClient`]: `reqwest`-backed implementation
//! - [`EndpointPool`]: per-chain endpoint set with probing and failover
//! - [`stop_requested`]: shutdown wait used by every background loop

pub mod error;
pub mod http;
pub mod pool;
pub mod request;
pub mod shutdown;
pub mod transport;

pub use error::TransportError;
pub use http::HttpRpcClient;
pub use pool::{EndpointHealth, EndpointPool, PoolConfig};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use shutdown::stop_requested;
pub use transport::RpcTransport;
