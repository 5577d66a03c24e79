//! Core data-acquisition pipeline: device boundary, framer, header decoder, grouper, and frame
//! assembler, wired together by [`pipeline::PipelineController`].

pub mod assembler;
pub mod config;
pub mod device;
pub mod error;
pub mod framer;
pub mod grouper;
pub mod header;
pub mod pipeline;
pub mod sinks;

pub use assembler::Frame;
pub use config::DeviceConfig;
pub use device::{Device, MockDevice, UnimplementedDevice};
pub use error::{BufferError, CaptureError, ConfigError, DeviceError};
pub use header::Header;
pub use pipeline::{CaptureOptions, PipelineController, QueueItem};
