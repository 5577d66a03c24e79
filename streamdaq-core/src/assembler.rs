//! Stage 4: frame assembly.
//!
//! Concatenates a sealed slot array from Q2 into one contiguous byte run and reshapes it into a
//! `frame_width x frame_height` pixel grid. A slot array that doesn't concatenate to exactly
//! `frame_width * frame_height` bytes (a dropped/out-of-range buffer upstream, or a device that
//! disagrees with its own config) cannot be reshaped; rather than taking the pipeline down, that
//! frame is replaced with an all-zero frame of the expected shape and the mismatch is logged at
//! error level.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::config::DeviceConfig;
use crate::pipeline::{FrameSlots, QueueItem};

const LOG_TARGET: &str = "streamdaq::assembler";

/// One assembled, reshaped video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

pub fn run(
    rx: Receiver<QueueItem<FrameSlots>>,
    tx: Sender<QueueItem<Frame>>,
    config: &DeviceConfig,
    cancel: Arc<AtomicBool>,
) {
    let width = config.frame_width;
    let height = config.frame_height;
    let expected_len = width * height;

    loop {
        if cancel.load(Ordering::SeqCst) {
            log::debug!(target: LOG_TARGET, "cancel observed, shutting down");
            break;
        }

        let slots = match rx.recv() {
            Ok(QueueItem::Item(slots)) => slots,
            Ok(QueueItem::EndOfStream) | Err(_) => break,
        };

        let mut pixels: Vec<u8> = Vec::with_capacity(expected_len);
        for slot in &slots {
            pixels.extend_from_slice(slot);
        }

        if pixels.len() != expected_len {
            log::error!(
                target: LOG_TARGET,
                "assembled frame has {} bytes, expected {width}x{height}={expected_len}; \
                 substituting a blank frame",
                pixels.len()
            );
            pixels = vec![0u8; expected_len];
        }

        let frame = Frame {
            width,
            height,
            pixels,
        };

        if tx.send(QueueItem::Item(frame)).is_err() {
            log::warn!(target: LOG_TARGET, "downstream consumer gone, stopping");
            break;
        }
    }

    let _ = tx.send(QueueItem::EndOfStream);
}
