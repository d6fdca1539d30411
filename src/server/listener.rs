//! HTTP stream server
//!
//! Binds a TCP listener and serves the multipart stream endpoint with axum.
//! Each accepted viewer gets its own task running a [`ViewerStream`] that
//! writes into an in-memory pipe; the read half of the pipe is the response
//! body. When hyper drops the body because the client went away, the next
//! write into the pipe fails and the viewer task ends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::stream::{ViewerStream, STREAM_CONTENT_TYPE};
use crate::error::Result;
use crate::hub::FrameHub;

/// Multipart MJPEG server
pub struct StreamServer {
    config: ServerConfig,
    hub: Arc<FrameHub>,
    listener: TcpListener,
}

#[derive(Clone)]
struct ServerState {
    hub: Arc<FrameHub>,
    cancel: CancellationToken,
    next_viewer_id: Arc<AtomicU64>,
    max_viewers: usize,
    pipe_buffer_size: usize,
}

impl StreamServer {
    /// Bind the listener
    pub async fn bind(config: ServerConfig, hub: Arc<FrameHub>) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %config.stream_path,
            "Stream server listening"
        );

        Ok(Self {
            config,
            hub,
            listener,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `cancel` fires
    ///
    /// Cancellation also ends every streaming loop, so graceful shutdown
    /// completes once their bodies are drained.
    pub async fn run_until(self, cancel: CancellationToken) -> Result<()> {
        let app = self.router(cancel.clone());

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

        tracing::info!("Stream server stopped");
        Ok(())
    }

    fn router(&self, cancel: CancellationToken) -> Router {
        let state = ServerState {
            hub: Arc::clone(&self.hub),
            cancel,
            next_viewer_id: Arc::new(AtomicU64::new(1)),
            max_viewers: self.config.max_viewers,
            pipe_buffer_size: self.config.pipe_buffer_size,
        };

        Router::new()
            .route(&self.config.stream_path, get(stream_handler))
            .fallback(|| async { StatusCode::NOT_FOUND })
            .with_state(state)
    }
}

async fn stream_handler(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let id = state.next_viewer_id.fetch_add(1, Ordering::Relaxed);

    let Some(viewer) = ViewerStream::attach(id, Arc::clone(&state.hub), state.max_viewers) else {
        tracing::warn!(peer = %peer, limit = state.max_viewers, "Viewer rejected: limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "viewer limit reached").into_response();
    };

    tracing::info!(
        viewer = id,
        peer = %peer,
        viewers = state.hub.demand().count(),
        "Viewer connected"
    );

    let (writer, reader) = tokio::io::duplex(state.pipe_buffer_size);
    let cancel = state.cancel.clone();
    let hub = Arc::clone(&state.hub);

    tokio::spawn(async move {
        let end = viewer.run(writer, cancel).await;
        tracing::info!(
            viewer = id,
            peer = %peer,
            reason = %end,
            viewers = hub.demand().count(),
            "Viewer disconnected"
        );
    });

    (
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "close"),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}
