//! Server configuration

use std::net::SocketAddr;

/// HTTP stream server options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Path of the multipart stream endpoint
    pub stream_path: String,

    /// Maximum concurrent viewers (0 = unlimited)
    pub max_viewers: usize,

    /// Size of the in-memory pipe between a viewer task and its response body
    pub pipe_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            stream_path: "/stream".to_string(),
            max_viewers: 0, // Unlimited
            pipe_buffer_size: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the stream endpoint path (a leading '/' is added if missing)
    pub fn stream_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.stream_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Set maximum concurrent viewers
    pub fn max_viewers(mut self, max: usize) -> Self {
        self.max_viewers = max;
        self
    }

    /// Set the per-viewer pipe buffer size
    pub fn pipe_buffer_size(mut self, size: usize) -> Self {
        self.pipe_buffer_size = size.max(1024);
        self
    }
}
