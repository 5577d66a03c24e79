use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[clap(name = "streamdaq", version, author, about = "FPGA/UART imaging device acquisition pipeline")]
pub struct StreamDaqArgs {
    #[clap(subcommand)]
    pub command: StreamDaqCommand,
}

#[derive(Subcommand, Debug)]
pub enum StreamDaqCommand {
    /// Run the acquisition pipeline until the device reaches end of stream or is interrupted.
    Capture(CaptureArgs),
    /// Validate a device config file and print its derived quantities without opening a device.
    CheckConfig(CheckConfigArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceKind {
    Fpga,
    Uart,
    Mock,
}

#[derive(Parser, Debug)]
pub struct CaptureArgs {
    /// Path to the device config YAML file.
    #[clap(long)]
    pub config: PathBuf,

    /// Device transport to capture from.
    #[clap(long, value_enum, default_value = "mock")]
    pub source: SourceKind,

    /// Output video file path. Omit to disable video output (metadata/plot only).
    #[clap(long)]
    pub video: Option<PathBuf>,

    /// Output CSV metadata file path. Omit to disable CSV metadata output.
    #[clap(long)]
    pub metadata: Option<PathBuf>,

    /// Path to append raw device bytes to, for offline replay/debugging.
    #[clap(long)]
    pub binary: Option<PathBuf>,

    /// Print a running count of decoded frames to stdout.
    #[clap(long)]
    pub show_video: bool,

    /// Print the most recent decoded header to stdout as each frame completes.
    #[clap(long)]
    pub show_metadata: bool,

    /// Override the per-read chunk size in bytes; defaults to the config's derived value.
    #[clap(long)]
    pub read_length: Option<usize>,

    /// Fixture path used when `--source mock` replays a file instead of a built-in pattern.
    #[clap(long)]
    pub mock_fixture: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    /// Path to the device config YAML file.
    #[clap(long)]
    pub config: PathBuf,
}
