//! EVM block and log fetcher.
//!
//! [`EvmRpcClient`] is the narrow view of a chain the indexer and the health
//! monitor need. The production implementation is the chain's
//! [`EndpointPool`]; tests substitute scripted clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use burnindex_core::error::IndexerError;
use burnindex_core::types::BlockRange;
use burnindex_rpc::request::{parse_quantity, quantity_from_value, to_quantity};
use burnindex_rpc::EndpointPool;

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> Result<u64, IndexerError> {
        parse_quantity(&self.block_number).map_err(IndexerError::from)
    }

    pub fn log_index_u32(&self) -> Result<u32, IndexerError> {
        let index = parse_quantity(&self.log_index)?;
        u32::try_from(index)
            .map_err(|_| IndexerError::Other(format!("log index {index} out of range")))
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// An `eth_getLogs` filter for one contract.
///
/// `topics[i]` lists the accepted values at position `i`; an empty list
/// matches anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: String,
    pub topics: Vec<Vec<String>>,
}

impl LogFilter {
    /// The JSON filter object for `range`.
    pub fn to_params(&self, range: BlockRange) -> Value {
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|alts| match alts.as_slice() {
                [] => Value::Null,
                [one] => Value::String(one.clone()),
                many => json!(many),
            })
            .collect();
        json!({
            "fromBlock": to_quantity(range.from),
            "toBlock": to_quantity(range.to),
            "address": self.address,
            "topics": topics,
        })
    }
}

/// Chain queries used by the indexer and the health monitor.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64, IndexerError>;

    /// The chain id reported by the node.
    async fn chain_id(&self) -> Result<u64, IndexerError>;

    /// Timestamp (seconds) of block `number`.
    async fn block_timestamp(&self, number: u64) -> Result<i64, IndexerError>;

    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError>;

    /// URL of the endpoint currently answering queries.
    fn active_endpoint(&self) -> String;

    /// Tell the client a query through `url` failed outside its own request
    /// path. Clients without failover ignore this.
    fn report_failure(&self, _url: &str, _error: &str) {}
}

#[async_trait]
impl EvmRpcClient for EndpointPool {
    async fn block_number(&self) -> Result<u64, IndexerError> {
        let value = self.request("eth_blockNumber", vec![]).await?;
        Ok(quantity_from_value(&value)?)
    }

    async fn chain_id(&self) -> Result<u64, IndexerError> {
        let value = self.request("eth_chainId", vec![]).await?;
        Ok(quantity_from_value(&value)?)
    }

    async fn block_timestamp(&self, number: u64) -> Result<i64, IndexerError> {
        let block = self
            .request(
                "eth_getBlockByNumber",
                vec![Value::String(to_quantity(number)), Value::Bool(false)],
            )
            .await?;
        if block.is_null() {
            return Err(IndexerError::Rpc(format!(
                "block {number} not found on {}",
                self.active_url()
            )));
        }
        let ts = quantity_from_value(&block["timestamp"])?;
        i64::try_from(ts).map_err(|_| IndexerError::Other(format!("timestamp {ts} out of range")))
    }

    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let value = self
            .request("eth_getLogs", vec![filter.to_params(range)])
            .await?;
        serde_json::from_value(value)
            .map_err(|e| IndexerError::Rpc(format!("malformed eth_getLogs response: {e}")))
    }

    fn active_endpoint(&self) -> String {
        self.active_url()
    }

    fn report_failure(&self, url: &str, error: &str) {
        self.evaluate_switch(url, error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_log_from_json() {
        let log: RawLog = serde_json::from_value(json!({
            "address": "0x1111111111111111111111111111111111111111",
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockNumber": "0x12a05f200",
            "blockHash": "0xabc",
            "transactionHash": "0xfeed",
            "logIndex": "0x5",
            "transactionIndex": "0x0"
        }))
        .unwrap();
        assert_eq!(log.block_number_u64().unwrap(), 5_000_000_000);
        assert_eq!(log.log_index_u32().unwrap(), 5);
        assert!(!log.is_removed());
    }

    #[test]
    fn filter_params() {
        let filter = LogFilter {
            address: "0xaa".into(),
            topics: vec![vec!["0x01".into()], vec![], vec!["0x02".into(), "0x03".into()]],
        };
        let params = filter.to_params(BlockRange::new(1001, 1050));
        assert_eq!(params["fromBlock"], "0x3e9");
        assert_eq!(params["toBlock"], "0x41a");
        assert_eq!(params["topics"], json!(["0x01", null, ["0x02", "0x03"]]));
    }
}
