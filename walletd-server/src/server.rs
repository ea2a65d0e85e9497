//! HTTP server implementation.
//!
//! Serves the JSON-RPC API on `/v2` (GET and POST) and, when metrics are
//! enabled, Prometheus text on `/metrics` from the same listener. Request
//! handling runs on the blocking pool so a slow wallet call never stalls the
//! accept loop.

use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics::{Metrics, METRICS_CONTENT_TYPE};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method as HttpMethod, Request as HttpRequest, Response as HttpResponse, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use walletd_protocol::{ErrorCode, ErrorObject, Response, API_PATH, DEFAULT_PORT};
use walletd_wallet::{RateSource, Wallet};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_connections", &self.max_connections)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            max_connections: 1000,
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
            metrics: None,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    /// Builds the server settings from the daemon configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            bind_addr: config.network.bind_addr,
            max_connections: config.network.max_connections,
            max_body_bytes: config.network.max_body_bytes,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Returns whether metrics are enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics.is_some()
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// State shared by every connection.
struct ConnContext {
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    max_body_bytes: usize,
    metrics: Option<Arc<Metrics>>,
    shutdown_requested: Arc<AtomicBool>,
}

/// HTTP server for the wallet API.
pub struct Server {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    /// Set before the shutdown broadcast so late subscribers still see it.
    shutdown_requested: Arc<AtomicBool>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, wallet: Arc<Wallet>, rate: Arc<dyn RateSource>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = RequestHandler::new(wallet, rate);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        handler.update_gauge_metrics();
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run_on(listener).await
    }

    /// Runs the server on an already bound listener until shutdown.
    pub async fn run_on(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.shutdown_requested.load(Ordering::SeqCst) {
            tracing::info!("Shutdown requested before start, not serving");
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Server listening on http://{}{} (metrics {})",
            local_addr,
            API_PATH,
            if self.config.metrics_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );

        let ctx = Arc::new(ConnContext {
            handler: self.handler.clone(),
            stats: self.stats.clone(),
            max_body_bytes: self.config.max_body_bytes,
            metrics: self.config.metrics.clone(),
            shutdown_requested: self.shutdown_requested.clone(),
        });

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            if let Some(ref metrics) = self.config.metrics {
                                metrics.connections_total.inc();
                                metrics.connections_active.inc();
                            }

                            let ctx = ctx.clone();
                            let conn_shutdown = self.shutdown.subscribe();
                            tokio::spawn(async move {
                                Self::handle_connection(stream, addr, ctx.clone(), conn_shutdown).await;

                                ctx.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                if let Some(ref metrics) = ctx.metrics {
                                    metrics.connections_active.dec();
                                }
                                tracing::debug!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Serves one connection, finishing in-flight requests on shutdown.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        ctx: Arc<ConnContext>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::debug!("Client connected: {}", addr);

        let shutdown_requested = ctx.shutdown_requested.clone();
        let io = TokioIo::new(stream);
        let service = service_fn(move |req| {
            let ctx = ctx.clone();
            async move { Ok::<_, Infallible>(Self::route(req, ctx).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        // Accepted after the broadcast went out.
        if shutdown_requested.load(Ordering::SeqCst) {
            conn.as_mut().graceful_shutdown();
        }

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };

        if let Err(e) = result {
            tracing::debug!("Connection {} error: {}", addr, e);
        }
    }

    /// Routes a request by path and method.
    async fn route(req: HttpRequest<Incoming>, ctx: Arc<ConnContext>) -> HttpResponse<Full<Bytes>> {
        let path = req.uri().path();

        if path == API_PATH {
            if *req.method() == HttpMethod::GET || *req.method() == HttpMethod::POST {
                return Self::handle_api(req, ctx).await;
            }
            let mut response =
                plain_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, POST"));
            return response;
        }

        match (path, &ctx.metrics) {
            ("/metrics", Some(metrics)) => {
                http_response(StatusCode::OK, METRICS_CONTENT_TYPE, metrics.encode().into())
            }
            _ => plain_response(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    /// Reads the body, dispatches it on the blocking pool and renders the
    /// JSON-RPC response.
    async fn handle_api(req: HttpRequest<Incoming>, ctx: Arc<ConnContext>) -> HttpResponse<Full<Bytes>> {
        ctx.stats.requests_total.fetch_add(1, Ordering::Relaxed);

        let limit = ctx.max_body_bytes;
        let response = match Limited::new(req.into_body(), limit).collect().await {
            Ok(collected) => {
                let body = collected.to_bytes();
                let handler = ctx.handler.clone();
                match tokio::task::spawn_blocking(move || handler.handle_body(&body)).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::error!("Request task failed: {}", e);
                        Response::error(
                            serde_json::Value::Null,
                            ErrorObject::new(ErrorCode::InternalError).with_data(e.to_string()),
                        )
                    }
                }
            }
            Err(e) => {
                let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                    ServerError::BodyTooLarge { limit }
                } else {
                    ServerError::BodyRead(e.to_string())
                };
                ctx.handler.reject(err)
            }
        };

        if response.is_error() {
            ctx.stats.errors_total.fetch_add(1, Ordering::Relaxed);
        }

        match response.to_json() {
            Ok(body) => http_response(StatusCode::OK, JSON_CONTENT_TYPE, body.into()),
            Err(e) => {
                tracing::error!("Failed to encode response: {}", e);
                plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// Waits until every connection has closed or `timeout` elapses.
    /// Returns whether all connections drained.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.stats.connections_active.load(Ordering::Relaxed) > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }
}

fn http_response(status: StatusCode, content_type: &'static str, body: Bytes) -> HttpResponse<Full<Bytes>> {
    let mut response = HttpResponse::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn plain_response(status: StatusCode, text: &'static str) -> HttpResponse<Full<Bytes>> {
    http_response(status, "text/plain; charset=utf-8", Bytes::from_static(text.as_bytes()))
}
