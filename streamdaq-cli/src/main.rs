use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use streamdaq_core::config::DeviceConfig;
use streamdaq_core::device::{bitfile_exists, is_mockrun, Device, MockDevice, UnimplementedDevice};
use streamdaq_core::error::{CaptureError, ConfigError};
use streamdaq_core::grouper::GrouperSinks;
use streamdaq_core::pipeline::{CaptureOptions, PipelineController, QueueItem};
use streamdaq_core::sinks::{CsvMetadataSink, MetadataRing, NullVideoSink, RawVideoSink, VideoSink};

mod cli;
mod logging;

use cli::{CaptureArgs, CheckConfigArgs, SourceKind, StreamDaqArgs, StreamDaqCommand};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_env("STREAMDAQ_LOG")
        .format(logging::formatter)
        .init();

    let args = StreamDaqArgs::parse();
    log::debug!("{args:#?}");

    match args.command {
        StreamDaqCommand::Capture(capture_args) => run_capture(capture_args),
        StreamDaqCommand::CheckConfig(check_args) => run_check_config(check_args),
    }
}

fn run_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = DeviceConfig::from_yaml(&args.config)?;
    println!("config OK: {}", args.config.display());
    println!("  px_per_buffer      = {}", config.px_per_buffer());
    println!("  buffer_npix        = {:?}", config.buffer_npix());
    println!("  nbuffer_per_fm     = {}", config.nbuffer_per_fm());
    println!("  default_read_length = {}", config.default_read_length());
    Ok(())
}

fn run_capture(args: CaptureArgs) -> anyhow::Result<()> {
    let config = Arc::new(DeviceConfig::from_yaml(&args.config)?);
    let device = select_device(&args, &config)?;

    let metadata_ring = Arc::new(MetadataRing::new(config.runtime.plot_history));
    let mut sinks = GrouperSinks::new(Arc::clone(&metadata_ring));
    if let Some(path) = &args.metadata {
        sinks = sinks.with_csv(CsvMetadataSink::create(path, config.runtime.csv_buffer)?);
    }

    let mut video_sink: Box<dyn VideoSink> = match &args.video {
        Some(path) => Box::new(RawVideoSink::create(
            path,
            *b"GREY",
            config.fs,
            config.frame_width,
            config.frame_height,
        )?),
        None => Box::new(NullVideoSink::default()),
    };

    let options = CaptureOptions {
        read_length: args.read_length,
        capture_binary: args.binary.clone(),
        ..Default::default()
    };

    let controller = PipelineController::start(Arc::clone(&config), device, options, sinks);

    let cancel = controller.cancel_flag();
    ctrlc::set_handler(move || {
        log::info!(target: "streamdaq::cli", "interrupt received, shutting down");
        cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    })?;

    let mut frame_count = 0usize;
    loop {
        match controller.frames().recv() {
            Ok(QueueItem::Item(frame)) => {
                frame_count += 1;
                if let Err(err) = video_sink.write_frame(&frame) {
                    log::error!(target: "streamdaq::cli", "video sink write failed: {err}");
                }
                if args.show_video {
                    println!("frame {frame_count}: {}x{}", frame.width, frame.height);
                }
                if args.show_metadata {
                    if let Some(header) = metadata_ring.snapshot().last() {
                        println!(
                            "frame_num={} buffer_count={} frame_buffer_count={}",
                            header.frame_num, header.buffer_count, header.frame_buffer_count
                        );
                    }
                }
            }
            Ok(QueueItem::EndOfStream) => break,
            Err(_) => break,
        }
    }

    video_sink.close()?;
    let device_failed = controller.device_failed();
    controller.join();
    log::info!(target: "streamdaq::cli", "capture finished: {frame_count} frames");

    if frame_count == 0 && device_failed {
        return Err(CaptureError::NoFramesProduced.into());
    }
    Ok(())
}

/// Picks the device adapter for this capture. `STREAMDAQ_MOCKRUN` (or running under `cargo test`)
/// forces a mock device regardless of `--source`, per the auto-selection requirement; otherwise
/// the adapter follows `--source` directly, with an `--source fpga` capture additionally requiring
/// a bitfile to exist on disk before it is uploaded.
fn select_device(args: &CaptureArgs, config: &DeviceConfig) -> anyhow::Result<Box<dyn Device>> {
    if is_mockrun() {
        if !matches!(args.source, SourceKind::Mock) {
            log::info!(
                target: "streamdaq::cli",
                "STREAMDAQ_MOCKRUN active, using mock device instead of --source {:?}",
                args.source
            );
        }
        return Ok(match &args.mock_fixture {
            Some(path) => Box::new(MockDevice::from_file(path)?),
            None => Box::new(MockDevice::new(Vec::new())),
        });
    }

    let device: Box<dyn Device> = match args.source {
        SourceKind::Mock => match &args.mock_fixture {
            Some(path) => Box::new(MockDevice::from_file(path)?),
            None => Box::new(MockDevice::new(Vec::new())),
        },
        SourceKind::Uart => Box::new(UnimplementedDevice::uart()),
        SourceKind::Fpga => {
            let bitstream = config
                .connection
                .bitstream
                .clone()
                .ok_or_else(|| ConfigError::MissingBitfile(std::path::PathBuf::new()))?;
            if !bitfile_exists(&bitstream) {
                return Err(ConfigError::MissingBitfile(bitstream).into());
            }
            let mut fpga = UnimplementedDevice::fpga();
            fpga.upload_bitfile(&bitstream)
                .map_err(CaptureError::from)?;
            Box::new(fpga)
        }
    };

    Ok(device)
}
