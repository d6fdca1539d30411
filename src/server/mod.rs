//! HTTP multipart stream server
//!
//! One endpoint, one long-lived response per viewer:
//!
//! ```text
//!   GET /stream
//!        │
//!        ▼
//!   stream_handler ── attach ──► ViewerGuard (demand +1)
//!        │
//!        ├── spawn ViewerStream::run ──► duplex writer
//!        │                                    │
//!        └── Body::from_stream(reader) ◄──────┘
//! ```
//!
//! The viewer task owns the guard, so demand drops as soon as the task ends,
//! whatever the reason.

pub mod config;
pub mod listener;
pub mod stream;

pub use config::ServerConfig;
pub use listener::StreamServer;
pub use stream::{StreamEnd, ViewerStream, BOUNDARY, STREAM_CONTENT_TYPE};
