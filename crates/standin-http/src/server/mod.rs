//! HTTP/1.1 listener for the stand-in.
//!
//! One tokio task per connection; every task shares the same read-only [`Engine`].

mod handler;

pub use handler::{handle_request, header_map_to_hashmap, HandlerError};

use crate::engine::Engine;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Address in use, giving up")]
    AddressInUse { addr: SocketAddr, attempts: u32 },
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Listener error: {0}")]
    Listener(#[from] std::io::Error),
}

/// Pause after a failed `accept` so resource exhaustion (EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How often and how patiently to retry a bind that hits `AddrInUse`.
#[derive(Debug, Clone, Copy)]
pub struct BindRetry {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for BindRetry {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Bind `addr`, retrying while the address is in use.
///
/// Other bind errors are returned immediately.
pub async fn bind_with_retry(addr: SocketAddr, retry: BindRetry) -> Result<TcpListener, ServerError> {
    let mut retries = 0;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                retries += 1;
                if retries > retry.max_retries {
                    error!("Address in use, giving up");
                    return Err(ServerError::AddressInUse {
                        addr,
                        attempts: retries,
                    });
                }
                warn!("Address in use, retrying on {}", addr);
                tokio::time::sleep(retry.delay).await;
            }
            Err(source) => return Err(ServerError::Bind { addr, source }),
        }
    }
}

/// Call `accept` until it succeeds, sleeping `backoff` after every error.
async fn accept_with_backoff<F, Fut, T>(mut accept: F, backoff: Duration) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!("Accept error: {}", e);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// The stand-in server: an engine plus a shutdown signal for its accept loop.
pub struct StandinServer {
    engine: Arc<Engine>,
    shutdown_tx: watch::Sender<bool>,
}

impl StandinServer {
    pub fn new(engine: Engine) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            engine: Arc::new(engine),
            shutdown_tx,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Stop accepting connections. Connections already accepted run to completion.
    ///
    /// Sticky: a `run` started after this call returns immediately.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Accept connections on `listener` until [`StandinServer::shutdown`] is called.
    pub async fn run(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return Ok(());
        }
        info!("Serving {} rules on {}", self.engine.rules().len(), local_addr);

        loop {
            tokio::select! {
                (stream, peer) = accept_with_backoff(|| listener.accept(), ACCEPT_ERROR_BACKOFF) => {
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let engine = Arc::clone(&engine);
                            async move { handle_request(req, engine).await }
                        });
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(io, service)
                            .await
                        {
                            debug!("Connection error from {}: {}", peer, e);
                        }
                    });
                }
                _ = shutdown_rx.changed() => {
                    info!("Server on {} shutting down", local_addr);
                    break;
                }
            }
        }
        Ok(())
    }
}
