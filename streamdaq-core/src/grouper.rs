//! Stage 3: buffer -> frame grouping.
//!
//! Decodes each buffer's header, trims/pads its payload to the expected size, files it into the
//! current frame's slot array, and seals+emits that array to Q2 whenever a header with a new
//! `frame_num` arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::config::DeviceConfig;
use crate::error::BufferError;
use crate::header::decode_header;
use crate::pipeline::{FrameSlots, QueueItem, RawBuffer};
use crate::sinks::{CsvMetadataSink, MetadataRing};

const LOG_TARGET: &str = "streamdaq::grouper";

/// Sinks the Grouper owns and drives; bundled so `PipelineController::start` doesn't need a long
/// argument list.
pub struct GrouperSinks {
    pub csv: Option<CsvMetadataSink>,
    pub metadata_ring: Arc<MetadataRing>,
}

impl GrouperSinks {
    pub fn new(metadata_ring: Arc<MetadataRing>) -> Self {
        Self {
            csv: None,
            metadata_ring,
        }
    }

    pub fn with_csv(mut self, csv: CsvMetadataSink) -> Self {
        self.csv = Some(csv);
        self
    }
}

pub fn run(
    rx: Receiver<QueueItem<RawBuffer>>,
    tx: Sender<QueueItem<FrameSlots>>,
    config: &DeviceConfig,
    cancel: Arc<AtomicBool>,
    mut sinks: GrouperSinks,
) {
    let buffer_npix = config.buffer_npix();
    let nbuffer_per_fm = buffer_npix.len();
    let prototype: FrameSlots = buffer_npix.iter().map(|&n| vec![0u8; n]).collect();
    let mut frame_buffer = prototype.clone();
    let mut cur_frame_num: i64 = -1;

    loop {
        if cancel.load(Ordering::SeqCst) {
            log::debug!(target: LOG_TARGET, "cancel observed, shutting down");
            break;
        }

        let raw = match rx.recv() {
            Ok(QueueItem::Item(raw)) => raw,
            Ok(QueueItem::EndOfStream) | Err(_) => break,
        };

        let (header, mut payload) = match decode_header(&raw, &config.header_format, config) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!(target: LOG_TARGET, "dropping malformed buffer: {err}");
                continue;
            }
        };

        sinks.metadata_ring.push(header.clone());
        if let Some(csv) = sinks.csv.as_mut() {
            csv.append(&header);
        }

        if header.frame_buffer_count >= nbuffer_per_fm {
            let err = BufferError::FrameBufferCountOutOfRange {
                got: header.frame_buffer_count,
                nbuffer_per_fm,
            };
            log::warn!(
                target: LOG_TARGET,
                "frame {}; buffer {}: {err}, discarding",
                header.frame_num, header.buffer_count
            );
            continue;
        }

        // Preserved quirk: this compares against `buffer_npix[0]` rather than the per-slot
        // expected size, so the final (shorter) buffer of every frame double-warns. See
        // SPEC_FULL.md design notes, Open Question 2.
        let expected_first = buffer_npix[0];
        if payload.len() != expected_first {
            log::warn!(
                target: LOG_TARGET,
                "frame {}; buffer {} (#{} in frame): expected buffer data length {}, got {}; padding",
                header.frame_num, header.buffer_count, header.frame_buffer_count,
                expected_first, payload.len()
            );
        }

        let expected = buffer_npix[header.frame_buffer_count];
        if payload.len() != expected {
            if payload.len() > expected {
                payload.truncate(expected);
            } else {
                payload.resize(expected, 0);
            }
        }

        if header.frame_num as i64 != cur_frame_num {
            if cur_frame_num == -1 {
                if header.frame_buffer_count != 0 {
                    log::debug!(target: LOG_TARGET, "discarding first incomplete frame");
                    continue;
                }
                // First frame starting cleanly at buffer 0: nothing sealed yet to emit.
            } else {
                let sealed = std::mem::replace(&mut frame_buffer, prototype.clone());
                if tx.send(QueueItem::Item(sealed)).is_err() {
                    log::warn!(target: LOG_TARGET, "downstream stage gone, stopping");
                    break;
                }
            }

            cur_frame_num = header.frame_num as i64;
            if header.frame_buffer_count != 0 {
                log::warn!(
                    target: LOG_TARGET,
                    "frame {cur_frame_num} started with buffer {}",
                    header.frame_buffer_count
                );
            }
        }

        frame_buffer[header.frame_buffer_count] = payload;
    }

    if let Some(csv) = sinks.csv.as_mut() {
        csv.close();
    }
    let _ = tx.send(QueueItem::EndOfStream);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    // frame_width * frame_height = 3, px_per_buffer = block_size - header_len/8 = 2: buffer_npix
    // = [2, 1], two slots per frame.
    fn config() -> DeviceConfig {
        serde_yaml::from_str(
            r#"
preamble: [0x00, 0x00, 0x00, 0x01]
header_len: 16
pix_depth: 8
frame_width: 3
frame_height: 1
buffer_block_length: 1
block_size: 4
header_format:
  - name: frame_num
    bit_start: 0
    bit_length: 8
  - name: buffer_count
    bit_start: 8
    bit_length: 4
  - name: frame_buffer_count
    bit_start: 12
    bit_length: 4
"#,
        )
        .unwrap()
    }

    fn buffer(frame_num: u8, buffer_count: u8, frame_buffer_count: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0x00, 0x00, 0x00, 0x01, frame_num, (buffer_count << 4) | frame_buffer_count];
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn seals_frame_on_frame_num_change_and_discards_incomplete_first_frame() {
        let config = config();
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let sinks = GrouperSinks::new(Arc::new(MetadataRing::new(10)));

        // first frame (num=1) starts at frame_buffer_count=1: discarded.
        in_tx.send(QueueItem::Item(buffer(1, 0, 1, &[0xFF]))).unwrap();
        // second frame (num=2) starts cleanly at buffer 0: nothing sealed yet, just accumulated.
        in_tx
            .send(QueueItem::Item(buffer(2, 1, 0, &[0x01, 0x02])))
            .unwrap();
        in_tx.send(QueueItem::Item(buffer(2, 2, 1, &[0x03]))).unwrap();
        // frame 3 seals frame 2.
        in_tx
            .send(QueueItem::Item(buffer(3, 3, 0, &[0x04, 0x05])))
            .unwrap();
        in_tx.send(QueueItem::EndOfStream).unwrap();

        run(in_rx, out_tx, &config, cancel, sinks);

        let mut frames = Vec::new();
        while let Ok(item) = out_rx.try_recv() {
            frames.push(item);
        }

        // one sealed frame (frame 2) plus the end-of-stream sentinel; frame 1 never produced a
        // sealed output because it was discarded before any seal point was reached.
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            QueueItem::Item(slots) => {
                assert_eq!(slots, &vec![vec![0x01, 0x02], vec![0x03]]);
            }
            _ => panic!("expected sealed frame"),
        }
        assert!(matches!(frames[1], QueueItem::EndOfStream));
    }

    #[test]
    fn drops_buffer_with_out_of_range_frame_buffer_count() {
        let config = config();
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let sinks = GrouperSinks::new(Arc::new(MetadataRing::new(10)));

        in_tx
            .send(QueueItem::Item(buffer(1, 0, 0, &[0x01, 0x02])))
            .unwrap();
        // frame_buffer_count == nbuffer_per_fm (2): out of range, dropped.
        in_tx.send(QueueItem::Item(buffer(1, 1, 2, &[0x0A]))).unwrap();
        in_tx
            .send(QueueItem::Item(buffer(2, 2, 0, &[0x03, 0x04])))
            .unwrap();
        in_tx.send(QueueItem::EndOfStream).unwrap();

        run(in_rx, out_tx, &config, cancel, sinks);

        match out_rx.try_recv().unwrap() {
            QueueItem::Item(slots) => {
                assert_eq!(slots[0], vec![0x01, 0x02]);
                // slot 1 was never written by the dropped buffer, stays at the zero prototype.
                assert_eq!(slots[1], vec![0x00]);
            }
            _ => panic!("expected sealed frame"),
        }
    }

    #[test]
    fn trims_and_pads_mismatched_payload_sizes() {
        let config = config();
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));
        let sinks = GrouperSinks::new(Arc::new(MetadataRing::new(10)));

        in_tx
            .send(QueueItem::Item(buffer(1, 0, 0, &[0x01, 0x02, 0x03])))
            .unwrap(); // too long, slot size is 2: truncated
        in_tx.send(QueueItem::Item(buffer(1, 1, 1, &[]))).unwrap(); // too short: padded
        in_tx
            .send(QueueItem::Item(buffer(2, 2, 0, &[0x00, 0x00])))
            .unwrap();
        in_tx.send(QueueItem::EndOfStream).unwrap();

        run(in_rx, out_tx, &config, cancel, sinks);

        match out_rx.try_recv().unwrap() {
            QueueItem::Item(slots) => {
                assert_eq!(slots[0], vec![0x01, 0x02]);
                assert_eq!(slots[1], vec![0x00]);
            }
            _ => panic!("expected sealed frame"),
        }
    }
}
