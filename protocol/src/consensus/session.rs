//! One connection context to the consensus engine.
//!
//! A session owns an HTTP client configured with the gateway's connect and
//! request timeouts plus a request-id counter. Opening one probes `health`
//! so a dead endpoint fails at acquisition instead of mid-operation.
//! [`RpcSession::release`] ends it explicitly; dropping it without a release
//! is logged so leaked sessions show up in traces.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{json, Value};
use tracing::{debug, trace};

use super::wire::{self, Method, RpcRequest, RpcResponse};
use super::{BroadcastReceipt, EngineInfo, EqualityQuery, GatewayConfig, GatewayError, SearchHit};

#[derive(Debug)]
pub struct RpcSession {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
    released: bool,
}

impl RpcSession {
    /// Connect to `config.rpc_url` and confirm the engine is answering.
    pub async fn open(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("cannot build http client: {e}")))?;

        let session = Self {
            client,
            url: config.rpc_url.clone(),
            next_id: AtomicU64::new(1),
            released: false,
        };
        session.call(Method::Health, json!({})).await?;
        debug!(url = %session.url, "opened consensus session");
        Ok(session)
    }

    /// One JSON-RPC round trip. Returns the `result` member.
    pub async fn call(&self, method: Method, params: Value) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!(method = %method, id, "consensus rpc call");

        let response = self
            .client
            .post(&self.url)
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .map_err(|e| transport_error(method, &e))?;

        let status = response.status();
        match response.json::<RpcResponse>().await {
            Ok(body) => body.into_result(method),
            Err(_) if !status.is_success() => Err(GatewayError::Unavailable(format!(
                "{method}: engine returned HTTP {status}"
            ))),
            Err(e) if e.is_timeout() => Err(transport_error(method, &e)),
            Err(e) => Err(GatewayError::Protocol(format!("{method}: {e}"))),
        }
    }

    /// `abci_info`, decoded. Returns the info and the raw anchor bytes.
    pub async fn abci_info(&self) -> Result<(EngineInfo, Vec<u8>), GatewayError> {
        wire::decode_info(self.call(Method::AbciInfo, json!({})).await?)
    }

    pub async fn broadcast_tx_sync(&self, tx: &[u8]) -> Result<BroadcastReceipt, GatewayError> {
        wire::decode_broadcast(
            self.call(Method::BroadcastTxSync, wire::broadcast_params(tx))
                .await?,
        )
    }

    /// Every match, paging through `tx_search` until the engine's total is
    /// reached or a page comes back empty.
    pub async fn tx_search(&self, query: &EqualityQuery) -> Result<Vec<SearchHit>, GatewayError> {
        let mut hits = Vec::new();
        let mut page = 1u32;
        loop {
            let result = self
                .call(Method::TxSearch, wire::search_params(query, page))
                .await?;
            let (batch, total) = wire::decode_search_page(result)?;
            let empty = batch.is_empty();
            hits.extend(batch);
            if empty || hits.len() as u64 >= total {
                break;
            }
            page += 1;
        }
        hits.sort_by_key(|hit| (hit.height, hit.index));
        Ok(hits)
    }

    /// End the session. The HTTP client and its connection pool go with it.
    pub fn release(mut self) {
        self.released = true;
        debug!(url = %self.url, "released consensus session");
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        if !self.released {
            debug!(url = %self.url, "consensus session dropped without release");
        }
    }
}

fn transport_error(method: Method, err: &reqwest::Error) -> GatewayError {
    let cause = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    GatewayError::Unavailable(format!("{method}: {cause}: {err}"))
}
