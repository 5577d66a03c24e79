//! Video encoder sink boundary.
//!
//! The real encoder (a system video library, fourcc-driven) is out of scope for this crate; the
//! driver loop only ever depends on the small [`VideoSink`] trait. [`NullVideoSink`] discards
//! frames (useful when only a CSV/plot output is wanted), and [`RawVideoSink`] writes a small
//! deterministic uncompressed container so the crate is fully runnable and testable without
//! vendoring a system codec.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::assembler::Frame;

pub trait VideoSink: Send {
    /// Accepts one grayscale frame; implementations are responsible for any colorspace
    /// conversion their target container needs (the driver loop always converts gray -> BGR before
    /// handing frames to OpenCV).
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
}

/// Discards frames, only counting them. Used when the caller wants metadata/plotting without a
/// video file.
#[derive(Default)]
pub struct NullVideoSink {
    pub frames_written: usize,
}

impl VideoSink for NullVideoSink {
    fn write_frame(&mut self, _frame: &Frame) -> io::Result<()> {
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const MAGIC: &[u8; 4] = b"SDQV";

/// A trivial uncompressed container: a fixed header (magic, width, height, fourcc, fps) followed
/// by one BGR8 frame per `write_frame` call. Deterministic by construction, which is what the
/// idempotence property in the testable-properties section needs.
pub struct RawVideoSink {
    writer: BufWriter<File>,
    width: u32,
    height: u32,
}

impl RawVideoSink {
    pub fn create(
        path: impl AsRef<Path>,
        fourcc: [u8; 4],
        fps: f64,
        width: usize,
        height: usize,
    ) -> io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(width as u32)?;
        writer.write_u32::<LittleEndian>(height as u32)?;
        writer.write_all(&fourcc)?;
        writer.write_f64::<LittleEndian>(fps)?;
        Ok(Self {
            writer,
            width: width as u32,
            height: height as u32,
        })
    }
}

impl VideoSink for RawVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> io::Result<()> {
        debug_assert_eq!(frame.width as u32, self.width);
        debug_assert_eq!(frame.height as u32, self.height);
        for &gray in &frame.pixels {
            // gray -> BGR, matching the driver loop's `cv2.COLOR_GRAY2BGR` conversion.
            self.writer.write_all(&[gray, gray, gray])?;
        }
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Drop for RawVideoSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: usize, height: usize, fill: u8) -> Frame {
        Frame {
            width,
            height,
            pixels: vec![fill; width * height],
        }
    }

    #[test]
    fn writing_the_same_input_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path_a = dir.path().join("a.sdqv");
        let path_b = dir.path().join("b.sdqv");

        for path in [&path_a, &path_b] {
            let mut sink = RawVideoSink::create(path, *b"GREY", 30.0, 2, 2).unwrap();
            sink.write_frame(&frame(2, 2, 42)).unwrap();
            sink.close().unwrap();
        }

        assert_eq!(
            std::fs::read(&path_a).unwrap(),
            std::fs::read(&path_b).unwrap()
        );
    }

    #[test]
    fn null_sink_only_counts() {
        let mut sink = NullVideoSink::default();
        sink.write_frame(&frame(1, 1, 0)).unwrap();
        sink.write_frame(&frame(1, 1, 0)).unwrap();
        assert_eq!(sink.frames_written, 2);
    }
}
