//! The `RpcTransport` trait: the seam between the endpoint pool and a
//! concrete wire client.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A single JSON-RPC endpoint.
///
/// Implementations must be `Send + Sync` and object-safe; the pool stores
/// them as `Arc<dyn RpcTransport>`.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the raw response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// The endpoint URL, used as its identity in logs and health records.
    fn url(&self) -> &str;

    /// Send `method` and unwrap the result, turning node errors into
    /// [`TransportError::Rpc`].
    async fn call(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, TransportError> {
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}
