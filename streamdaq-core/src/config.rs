//! Declarative device configuration, loaded once from YAML at startup.
//!
//! The bit-field layout is data, not code, so new devices are supported by editing a config
//! file rather than recompiling.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// A single named bit-field within the buffer header, e.g. `(frame_num, 0, 32)`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HeaderFieldSpec {
    pub name: String,
    pub bit_start: usize,
    pub bit_length: usize,
}

/// Ordered list of header bit-fields, as declared in the config file.
pub type HeaderFormat = Vec<HeaderFieldSpec>;

pub const FRAME_NUM_FIELD: &str = "frame_num";
pub const BUFFER_COUNT_FIELD: &str = "buffer_count";
pub const FRAME_BUFFER_COUNT_FIELD: &str = "frame_buffer_count";

const REQUIRED_FIELDS: [&str; 3] = [FRAME_NUM_FIELD, BUFFER_COUNT_FIELD, FRAME_BUFFER_COUNT_FIELD];

/// Runtime tunables that do not describe the device itself: queue depths, sink buffering, and
/// the length of the metadata history kept for the live plot sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub q1_size: usize,
    pub q2_size: usize,
    pub q3_size: usize,
    pub csv_buffer: usize,
    pub plot_history: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            q1_size: 32,
            q2_size: 8,
            q3_size: 8,
            csv_buffer: 100,
            plot_history: 500,
        }
    }
}

/// Device connection parameters. Only one of `uart`/`fpga` is meaningful for a given
/// [`crate::device::Device`] implementation, but both are kept on the config since the same file
/// should work regardless of which transport is selected on the command line.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionConfig {
    pub bitstream: Option<PathBuf>,
    pub port: Option<String>,
    pub baudrate: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Preamble bit-pattern, given as raw bytes (typically 4 bytes / 32 bits).
    pub preamble: Vec<u8>,
    /// Header length, in bits.
    pub header_len: usize,
    /// Bits per pixel.
    pub pix_depth: usize,
    pub frame_width: usize,
    pub frame_height: usize,
    pub buffer_block_length: usize,
    pub block_size: usize,

    #[serde(default)]
    pub reverse_header_bits: bool,
    #[serde(default)]
    pub reverse_header_bytes: bool,
    #[serde(default)]
    pub reverse_payload_bits: bool,
    #[serde(default)]
    pub reverse_payload_bytes: bool,

    pub header_format: HeaderFormat,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Frame rate, used by the video sink; has no bearing on the core pipeline.
    #[serde(default = "default_fps")]
    pub fs: f64,
}

fn default_fps() -> f64 {
    30.0
}

impl DeviceConfig {
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DeviceConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for required in REQUIRED_FIELDS {
            if !self.header_format.iter().any(|f| f.name == required) {
                return Err(ConfigError::MissingHeaderField(required));
            }
        }

        let bytes_per_buffer = self.buffer_block_length * self.block_size;
        let header_bytes = self.header_len / 8;
        if bytes_per_buffer < header_bytes {
            return Err(ConfigError::BufferSmallerThanHeader {
                bytes_per_buffer,
                header_bytes,
            });
        }

        Ok(())
    }

    /// Number of payload bytes carried by a single full buffer.
    pub fn px_per_buffer(&self) -> usize {
        self.buffer_block_length * self.block_size - self.header_len / 8
    }

    /// Expected payload size (bytes) for every buffer-index within a frame. All entries but the
    /// last equal [`Self::px_per_buffer`]; the last entry is the remainder needed to reach
    /// `frame_width * frame_height` total bytes.
    pub fn buffer_npix(&self) -> Vec<usize> {
        let px_per_frame = self.frame_width * self.frame_height;
        let px_per_buffer = self.px_per_buffer();
        let quotient = px_per_frame / px_per_buffer;
        let remainder = px_per_frame % px_per_buffer;

        let mut npix = vec![px_per_buffer; quotient];
        npix.push(remainder);
        npix
    }

    pub fn nbuffer_per_fm(&self) -> usize {
        self.buffer_npix().len()
    }

    /// The device-alignment-friendly read length used when the caller does not pin one down:
    /// the largest per-buffer byte count, scaled by bit depth, rounded down to a multiple of 16.
    pub fn default_read_length(&self) -> usize {
        let max_npix = self.buffer_npix().into_iter().max().unwrap_or(0);
        (max_npix * self.pix_depth / 8 / 16) * 16
    }
}
