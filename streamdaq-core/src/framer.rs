//! Stage 1: bitstream -> logical buffers.
//!
//! Pulls fixed-size chunks from the [`Device`], finds the preamble in a rolling bit buffer, and
//! emits one byte sequence per inter-preamble region onto Q1.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use streamdaq_common::{preamble_bits, BitBuffer};

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::pipeline::{CaptureOptions, QueueItem, RawBuffer};

const LOG_TARGET: &str = "streamdaq::framer";

pub fn run(
    mut device: Box<dyn Device>,
    config: &DeviceConfig,
    tx: Sender<QueueItem<RawBuffer>>,
    cancel: Arc<AtomicBool>,
    device_failed: Arc<AtomicBool>,
    options: CaptureOptions,
) {
    let read_length = options
        .read_length
        .unwrap_or_else(|| config.default_read_length())
        .max(1);
    let preamble = preamble_bits(&config.preamble, config.reverse_header_bits);

    let mut rolling = BitBuffer::new();

    loop {
        if cancel.load(Ordering::SeqCst) {
            log::debug!(target: LOG_TARGET, "cancel observed, shutting down");
            let _ = tx.send(QueueItem::EndOfStream);
            return;
        }

        let chunk = match device.read_data(read_length) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                log::info!(target: LOG_TARGET, "device reached end of stream");
                cancel.store(true, Ordering::SeqCst);
                let _ = tx.send(QueueItem::EndOfStream);
                return;
            }
            Err(err) => {
                log::error!(target: LOG_TARGET, "device read failed: {err}");
                device_failed.store(true, Ordering::SeqCst);
                cancel.store(true, Ordering::SeqCst);
                let _ = tx.send(QueueItem::EndOfStream);
                return;
            }
        };

        if let Some(path) = &options.capture_binary {
            if let Err(err) = append_binary(path, &chunk) {
                log::error!(target: LOG_TARGET, "binary capture write failed: {err}, disabling it for the rest of the capture");
            }
        }

        rolling.push_bytes(&chunk);

        let positions = rolling.find_all(&preamble);
        for pair in positions.windows(2) {
            let (mut start, mut stop) = (pair[0], pair[1]);
            if !options.pre_first {
                start += preamble.len();
                stop += preamble.len();
            }
            let region = rolling.slice(start, stop);
            match region.to_bytes() {
                Ok(bytes) => {
                    if tx.send(QueueItem::Item(bytes)).is_err() {
                        log::warn!(target: LOG_TARGET, "downstream stage gone, stopping");
                        return;
                    }
                }
                Err(err) => {
                    log::warn!(target: LOG_TARGET, "dropping non-byte-aligned buffer: {err}");
                }
            }
        }

        if let Some(&last) = positions.last() {
            rolling.retain_from(last);
        }
    }
}

fn append_binary(path: &std::path::Path, chunk: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(chunk)
}
