//! Unsigned transaction envelope shared by Graphene-family chains
//!
//! Steem and BitShares use the same TaPoS fields: the low 16 bits of the head
//! block number and bytes 4..8 of the head block id (little endian), plus an
//! expiration time in the chain's clock.

use chrono::{Duration, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::rpc::RpcError;

/// Seconds until a prepared transaction expires
pub const TX_EXPIRATION_SECS: i64 = 60;

const CHAIN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Subset of `get_dynamic_global_properties`
#[derive(Debug, Clone, Deserialize)]
pub struct ChainProps {
    pub head_block_number: u64,
    pub head_block_id: String,
    pub time: String,
}

/// `ref_block_prefix`: bytes 4..8 of the block id, little endian.
pub fn ref_block_prefix(block_id: &str) -> Result<u32, RpcError> {
    let bytes = hex::decode(block_id)
        .map_err(|e| RpcError::Decode(format!("invalid head_block_id {}: {}", block_id, e)))?;
    if bytes.len() < 8 {
        return Err(RpcError::Decode(format!(
            "head_block_id {} is too short",
            block_id
        )));
    }
    Ok(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]))
}

/// Chain time plus `secs`, in the chain's timestamp format.
pub fn expiration(chain_time: &str, secs: i64) -> Result<String, RpcError> {
    let now = NaiveDateTime::parse_from_str(chain_time, CHAIN_TIME_FORMAT)
        .map_err(|e| RpcError::Decode(format!("invalid chain time {}: {}", chain_time, e)))?;
    Ok((now + Duration::seconds(secs))
        .format(CHAIN_TIME_FORMAT)
        .to_string())
}

/// Build the unsigned transaction for `operations` on top of `props`.
pub fn unsigned_transaction(props: &ChainProps, operations: Vec<Value>) -> Result<Value, RpcError> {
    Ok(json!({
        "ref_block_num": props.head_block_number & 0xffff,
        "ref_block_prefix": ref_block_prefix(&props.head_block_id)?,
        "expiration": expiration(&props.time, TX_EXPIRATION_SECS)?,
        "operations": operations,
        "extensions": [],
        "signatures": [],
    }))
}
