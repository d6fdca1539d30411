//! Frame production
//!
//! The producer is the single writer of the frame hub. It pulls frames from
//! the capture channel, applies the demand gate, transcodes on a blocking
//! thread and publishes the result.

pub mod config;
pub mod producer;

pub use config::PipelineConfig;
pub use producer::{FrameOutcome, Producer};
