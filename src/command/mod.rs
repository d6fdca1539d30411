//! Line-oriented command channel
//!
//! Out-of-band operations for a supervising process: snapshot capture,
//! device introspection, control changes and pipeline counters. Input is one
//! command per line; every non-blank line gets one JSON reply line.

pub mod device;
pub mod dispatcher;
pub mod parse;

pub use device::{
    ControlDescriptor, DeviceControl, DeviceError, DeviceInfo, DeviceSummary, FormatDescriptor,
    FrameSize, NoDevice,
};
pub use dispatcher::{CommandDispatcher, Reply, Status};
pub use parse::{parse, Command, CommandError};
