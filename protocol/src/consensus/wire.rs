//! # Engine JSON-RPC Wire Format
//!
//! JSON-RPC 2.0 envelopes and the result shapes of the four Tendermint RPC
//! methods the gateway uses. Everything here is pure: build params, decode
//! results. Transport lives in [`super::session`].
//!
//! Tendermint encodes 64-bit integers as JSON strings and byte slices as
//! base64. Both are handled at the edge so nothing above this module sees
//! either quirk.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use super::{BroadcastReceipt, EngineInfo, EqualityQuery, GatewayError, SearchHit};
use crate::config::SEARCH_PAGE_SIZE;

/// JSON-RPC version string. Always "2.0".
pub const JSONRPC_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    AbciInfo,
    BroadcastTxSync,
    TxSearch,
    Health,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::AbciInfo => "abci_info",
            Method::BroadcastTxSync => "broadcast_tx_sync",
            Method::TxSearch => "tx_search",
            Method::Health => "health",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: Method, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.as_str(),
            params,
        }
    }
}

/// Exactly one of `result` or `error` is set by a conforming engine.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// JSON-RPC 2.0 error object. Tendermint puts the useful detail in `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    fn detail(&self) -> String {
        match &self.data {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => self.message.clone(),
        }
    }

    /// A JSON-RPC error on a broadcast means the mempool refused the bytes
    /// (full, duplicate in cache, too large). Anywhere else it means the
    /// engine could not serve the request.
    fn into_gateway_error(self, method: Method) -> GatewayError {
        match method {
            Method::BroadcastTxSync => GatewayError::Rejected {
                code: u32::try_from(self.code.unsigned_abs()).unwrap_or(u32::MAX),
                log: self.detail(),
            },
            _ => GatewayError::Protocol(format!("{method}: {} ({})", self.detail(), self.code)),
        }
    }
}

impl RpcResponse {
    pub fn into_result(self, method: Method) -> Result<Value, GatewayError> {
        if let Some(err) = self.error {
            return Err(err.into_gateway_error(method));
        }
        self.result.ok_or_else(|| {
            GatewayError::Protocol(format!("{method}: response has neither result nor error"))
        })
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

pub fn broadcast_params(tx: &[u8]) -> Value {
    json!({ "tx": BASE64.encode(tx) })
}

pub fn search_params(query: &EqualityQuery, page: u32) -> Value {
    json!({
        "query": query.to_string(),
        "prove": false,
        "page": page.to_string(),
        "per_page": SEARCH_PAGE_SIZE.to_string(),
        "order_by": "asc",
    })
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AbciInfoResult {
    response: AbciInfoResponse,
}

#[derive(Debug, Deserialize)]
struct AbciInfoResponse {
    #[serde(default)]
    data: String,
    #[serde(default)]
    version: String,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    last_block_height: u64,
    #[serde(default)]
    last_block_app_hash: Option<String>,
}

/// `abci_info` result plus the raw anchor bytes.
pub fn decode_info(result: Value) -> Result<(EngineInfo, Vec<u8>), GatewayError> {
    let parsed: AbciInfoResult = from_result(Method::AbciInfo, result)?;
    let response = parsed.response;
    let anchor = match response.last_block_app_hash.as_deref() {
        None | Some("") => Vec::new(),
        Some(encoded) => BASE64.decode(encoded).map_err(|e| {
            GatewayError::Protocol(format!("abci_info: last_block_app_hash is not base64: {e}"))
        })?,
    };
    let info = EngineInfo {
        data: response.data,
        version: response.version,
        last_block_height: response.last_block_height,
        last_block_app_hash: hex::encode(&anchor),
    };
    Ok((info, anchor))
}

#[derive(Debug, Deserialize)]
struct BroadcastResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    hash: String,
}

/// Non-zero `code` is an application-level rejection from `CheckTx`.
pub fn decode_broadcast(result: Value) -> Result<BroadcastReceipt, GatewayError> {
    let parsed: BroadcastResult = from_result(Method::BroadcastTxSync, result)?;
    if parsed.code != 0 {
        return Err(GatewayError::Rejected {
            code: parsed.code,
            log: parsed.log,
        });
    }
    Ok(BroadcastReceipt {
        hash: parsed.hash,
        log: parsed.log,
    })
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    txs: Vec<RawHit>,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    hash: String,
    #[serde(deserialize_with = "u64_from_str_or_num")]
    height: u64,
    #[serde(default, deserialize_with = "u64_from_str_or_num")]
    index: u64,
    tx: String,
}

/// One page of `tx_search`: the hits and the engine's total match count.
pub fn decode_search_page(result: Value) -> Result<(Vec<SearchHit>, u64), GatewayError> {
    let parsed: SearchResult = from_result(Method::TxSearch, result)?;
    let hits = parsed
        .txs
        .into_iter()
        .map(|raw| {
            let tx = BASE64.decode(&raw.tx).map_err(|e| {
                GatewayError::Protocol(format!("tx_search: tx {} is not base64: {e}", raw.hash))
            })?;
            Ok(SearchHit {
                hash: raw.hash,
                height: raw.height,
                index: raw.index,
                tx,
            })
        })
        .collect::<Result<Vec<_>, GatewayError>>()?;
    Ok((hits, parsed.total_count))
}

fn from_result<T: for<'de> Deserialize<'de>>(method: Method, result: Value) -> Result<T, GatewayError> {
    serde_json::from_value(result)
        .map_err(|e| GatewayError::Protocol(format!("{method}: unexpected result shape: {e}")))
}

/// Tendermint writes int64 as `"123"`; some proxies rewrite it as `123`.
fn u64_from_str_or_num<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
