//! Scoped and persistent RPC gateways.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use super::session::RpcSession;
use super::{
    BroadcastReceipt, ConsensusGateway, EngineInfo, EqualityQuery, GatewayConfig, GatewayError,
    SearchHit,
};
use crate::config::READ_RETRY_BACKOFF;

/// Run an idempotent read, retrying transport failures up to `retries`
/// extra times. Rejections and protocol errors are returned immediately.
async fn retry_read<T, F, Fut>(
    operation: &'static str,
    retries: u32,
    mut attempt: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut tries = 0;
    loop {
        match attempt().await {
            Err(GatewayError::Unavailable(reason)) if tries < retries => {
                tries += 1;
                warn!(operation, attempt = tries, %reason, "consensus read failed, retrying");
                tokio::time::sleep(READ_RETRY_BACKOFF).await;
            }
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------------
// ScopedGateway
// ---------------------------------------------------------------------------

/// Opens a fresh session for every call and releases it before returning,
/// whatever the outcome.
#[derive(Debug, Clone)]
pub struct ScopedGateway {
    config: GatewayConfig,
}

impl ScopedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConsensusGateway for ScopedGateway {
    async fn anchor(&self) -> Result<Vec<u8>, GatewayError> {
        retry_read("anchor", self.config.read_retries, || async move {
            let session = RpcSession::open(&self.config).await?;
            let result = session.abci_info().await;
            session.release();
            result.map(|(_, anchor)| anchor)
        })
        .await
    }

    async fn broadcast_sync(&self, tx: &[u8]) -> Result<BroadcastReceipt, GatewayError> {
        let session = RpcSession::open(&self.config).await?;
        let result = session.broadcast_tx_sync(tx).await;
        session.release();
        result
    }

    async fn search(&self, query: &EqualityQuery) -> Result<Vec<SearchHit>, GatewayError> {
        retry_read("search", self.config.read_retries, || async move {
            let session = RpcSession::open(&self.config).await?;
            let result = session.tx_search(query).await;
            session.release();
            result
        })
        .await
    }

    async fn info(&self) -> Result<EngineInfo, GatewayError> {
        retry_read("info", self.config.read_retries, || async move {
            let session = RpcSession::open(&self.config).await?;
            let result = session.abci_info().await;
            session.release();
            result.map(|(info, _)| info)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// PersistentGateway
// ---------------------------------------------------------------------------

/// One long-lived session shared by every caller.
///
/// The mutex serializes use of the session. A transport failure discards
/// the session and the next call opens a new one. After [`shutdown`] every
/// call fails [`GatewayError::Closed`].
///
/// [`shutdown`]: PersistentGateway::shutdown
#[derive(Debug)]
pub struct PersistentGateway {
    config: GatewayConfig,
    session: Mutex<Option<RpcSession>>,
    shut_down: AtomicBool,
}

impl PersistentGateway {
    /// Create the gateway without connecting. The first call connects.
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create the gateway and open its session now, so a bad endpoint is
    /// reported at startup.
    pub async fn connect(config: GatewayConfig) -> Result<Self, GatewayError> {
        let session = RpcSession::open(&config).await?;
        info!(url = %config.rpc_url, "persistent consensus session established");
        Ok(Self {
            config,
            session: Mutex::new(Some(session)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Release the session and refuse further calls.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        if let Some(session) = self.session.lock().await.take() {
            session.release();
        }
        info!(url = %self.config.rpc_url, "persistent consensus session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Lock the session, opening one if there is none.
    async fn acquire(&self) -> Result<MutexGuard<'_, Option<RpcSession>>, GatewayError> {
        let mut guard = self.session.lock().await;
        if self.is_shut_down() {
            return Err(GatewayError::Closed);
        }
        if guard.is_none() {
            *guard = Some(RpcSession::open(&self.config).await?);
        }
        Ok(guard)
    }
}

fn live(slot: &Option<RpcSession>) -> Result<&RpcSession, GatewayError> {
    slot.as_ref().ok_or(GatewayError::Closed)
}

/// Drop the session after a transport failure so the next call reconnects.
fn settle<T>(slot: &mut Option<RpcSession>, result: &Result<T, GatewayError>) {
    if matches!(result, Err(GatewayError::Unavailable(_))) {
        if let Some(stale) = slot.take() {
            stale.release();
        }
    }
}

#[async_trait]
impl ConsensusGateway for PersistentGateway {
    async fn anchor(&self) -> Result<Vec<u8>, GatewayError> {
        retry_read("anchor", self.config.read_retries, || async move {
            let mut guard = self.acquire().await?;
            let result = live(&guard)?.abci_info().await;
            settle(&mut guard, &result);
            result.map(|(_, anchor)| anchor)
        })
        .await
    }

    async fn broadcast_sync(&self, tx: &[u8]) -> Result<BroadcastReceipt, GatewayError> {
        let mut guard = self.acquire().await?;
        let result = live(&guard)?.broadcast_tx_sync(tx).await;
        settle(&mut guard, &result);
        result
    }

    async fn search(&self, query: &EqualityQuery) -> Result<Vec<SearchHit>, GatewayError> {
        retry_read("search", self.config.read_retries, || async move {
            let mut guard = self.acquire().await?;
            let result = live(&guard)?.tx_search(query).await;
            settle(&mut guard, &result);
            result
        })
        .await
    }

    async fn info(&self) -> Result<EngineInfo, GatewayError> {
        retry_read("info", self.config.read_retries, || async move {
            let mut guard = self.acquire().await?;
            let result = live(&guard)?.abci_info().await;
            settle(&mut guard, &result);
            result.map(|(info, _)| info)
        })
        .await
    }
}
