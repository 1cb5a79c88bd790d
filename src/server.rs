//! HTTP glue: serves the MJPEG stream, health and statistics endpoints

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::Serialize;
use std::convert::Infallible;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::frame::FrameHolder;
use crate::streamer::{self, MjpegStream, StreamConfig, StreamCounters, StreamerStats, Transport, TransportError};

/// Web server state
#[derive(Clone)]
pub struct AppState {
    pub holder: Arc<FrameHolder>,
    pub stream: Arc<StreamConfig>,
    pub counters: Arc<StreamCounters>,
    pub stream_uri: String,
    /// Chunks buffered between a streaming loop and its response body
    pub channel_capacity: usize,
}

impl AppState {
    pub fn new(config: &Config, holder: Arc<FrameHolder>, counters: Arc<StreamCounters>) -> Self {
        Self {
            holder,
            stream: Arc::new(config.stream.to_stream_config()),
            counters,
            stream_uri: config.server.stream_uri.clone(),
            channel_capacity: config.stream.channel_capacity,
        }
    }
}

/// Transport feeding a response body through a bounded channel.
///
/// HTTP chunking is done by the server, so the part terminator is not
/// forwarded. A dropped receiver means the client went away.
pub struct ChannelTransport {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            return Ok(());
        }
        self.write_bytes(Bytes::copy_from_slice(data))
    }

    fn write_bytes(&mut self, data: Bytes) -> Result<(), TransportError> {
        if data.is_empty() {
            return Ok(());
        }
        self.tx
            .blocking_send(data)
            .map_err(|_| TransportError::Closed)
    }
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(&state.stream_uri, get(mjpeg_handler))
        .route("/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the configured address and serves until `shutdown` resolves
pub async fn run_server<F>(config: &Config, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, state, shutdown).await
}

/// Serves on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(
        "MJPEG stream URI: http://{}{}",
        listener.local_addr()?,
        state.stream_uri
    );

    // open streams never finish on their own, so stop serving outright
    tokio::select! {
        result = axum::serve(listener, router(state)).into_future() => result?,
        _ = shutdown => info!("Web server stopped"),
    }

    Ok(())
}

/// MJPEG stream handler
async fn mjpeg_handler(State(state): State<AppState>) -> Response {
    let (tx, rx) = mpsc::channel::<Bytes>(state.channel_capacity.max(1));
    let boundary = state.stream.boundary.clone();

    let mut stream = MjpegStream::with_counters(
        Arc::clone(&state.holder),
        ChannelTransport::new(tx),
        StreamConfig::clone(&state.stream),
        Arc::clone(&state.counters),
    );
    tokio::task::spawn_blocking(move || {
        let err = stream.run();
        debug!(error = %err, "MJPEG streaming loop finished");
    });

    let body = Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    }));

    Response::builder()
        .header(header::CONTENT_TYPE, streamer::content_type(&boundary))
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .unwrap_or_else(|e| {
            error!("Failed to build MJPEG response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Streaming statistics handler
async fn stats_handler(State(state): State<AppState>) -> Json<StreamerStats> {
    Json(state.counters.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_transport_closed() {
        let (tx, rx) = mpsc::channel(1);
        let mut transport = ChannelTransport::new(tx);

        transport.write_chunk(b"abc").unwrap();
        // the terminator never reaches the body
        transport.write_chunk(&[]).unwrap();

        drop(rx);
        assert!(matches!(
            transport.write_chunk(b"def"),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_channel_transport_forwards_chunks() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut transport = ChannelTransport::new(tx);
        transport.write_bytes(Bytes::from_static(b"12")).unwrap();
        transport.write_chunk(b"34").unwrap();
        drop(transport);

        assert_eq!(rx.blocking_recv().unwrap(), Bytes::from_static(b"12"));
        assert_eq!(rx.blocking_recv().unwrap(), Bytes::from_static(b"34"));
        assert!(rx.blocking_recv().is_none());
    }
}
