use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal at startup; always reported back to the caller.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?} as YAML")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("header format is missing required field {0:?}")]
    MissingHeaderField(&'static str),
    #[error("buffer_block_length * block_size ({bytes_per_buffer}) is smaller than header_len/8 ({header_bytes})")]
    BufferSmallerThanHeader {
        bytes_per_buffer: usize,
        header_bytes: usize,
    },
    #[error("configured bitfile {0:?} does not exist")]
    MissingBitfile(PathBuf),
}

/// Recoverable at the level of a single buffer; the caller never sees these, only the log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer of {got} bytes is shorter than preamble+header ({needed} bytes)")]
    TooShort { got: usize, needed: usize },
    #[error("frame_buffer_count {got} is out of range (expected < {nbuffer_per_fm})")]
    FrameBufferCountOutOfRange { got: usize, nbuffer_per_fm: usize },
}

/// Device lifecycle errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device read failed")]
    Read(#[source] io::Error),
    #[error("failed to upload bitfile {path:?}")]
    BitfileUpload {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Surfaces from a capture run driven through [`crate::pipeline::PipelineController`]
/// (`start`/`frames`/`join`).
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("device error during capture")]
    Device(#[from] DeviceError),
    #[error("capture produced no frames")]
    NoFramesProduced,
}
