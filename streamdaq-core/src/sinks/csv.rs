//! Line-buffered CSV metadata sink, owned exclusively by the Grouper.

use std::path::Path;

use crate::header::Header;

const LOG_TARGET: &str = "streamdaq::sinks::csv";

/// Writes one header record per row; the first row written is the field-name header line.
///
/// On any write failure the sink disables itself (logs once, then silently drops subsequent
/// rows) rather than taking the pipeline down, matching the "sink write failure" policy in the
/// error-handling design.
pub struct CsvMetadataSink {
    writer: Option<csv::Writer<std::fs::File>>,
    wrote_header: bool,
}

impl CsvMetadataSink {
    pub fn create(path: impl AsRef<Path>, buffer_capacity: usize) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        let writer = csv::WriterBuilder::new()
            .buffer_capacity(buffer_capacity.max(8))
            .from_writer(file);
        Ok(Self {
            writer: Some(writer),
            wrote_header: false,
        })
    }

    pub fn append(&mut self, header: &Header) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        if !self.wrote_header {
            if let Err(err) = writer.write_record(header.field_names()) {
                log::error!(target: LOG_TARGET, "failed to write CSV header row: {err}, disabling CSV sink");
                self.writer = None;
                return;
            }
            self.wrote_header = true;
        }

        let row: Vec<String> = header.field_values().iter().map(|v| v.to_string()).collect();
        if let Err(err) = writer.write_record(&row) {
            log::error!(target: LOG_TARGET, "failed to write CSV row: {err}, disabling CSV sink");
            self.writer = None;
        }
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                log::error!(target: LOG_TARGET, "failed to flush CSV sink on close: {err}");
            }
        }
    }
}

impl Drop for CsvMetadataSink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::header::decode_header;

    fn config() -> DeviceConfig {
        serde_yaml::from_str(
            r#"
preamble: [0x00, 0x00, 0x00, 0x01]
header_len: 16
pix_depth: 8
frame_width: 1
frame_height: 1
buffer_block_length: 1
block_size: 1
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

    #[test]
    fn writes_header_row_then_data_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let config = config();
        let (header, _) =
            decode_header(&[0, 0, 0, 1, 7, 0], &config.header_format, &config).unwrap();

        {
            let mut sink = CsvMetadataSink::create(&path, 10).unwrap();
            sink.append(&header);
            sink.close();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "frame_num,buffer_count,frame_buffer_count"
        );
        assert_eq!(lines.next().unwrap(), "7,0,0");
    }
}
