//! The device adapter boundary.
//!
//! The physical FPGA/UART driver is explicitly out of scope for this crate (see the top-level
//! spec); everything downstream of the Framer only ever talks to the small [`Device`] trait. A
//! [`MockDevice`] replaying a fixture is the only implementation shipped here, and it is what the
//! integration tests and `STREAMDAQ_MOCKRUN=1` runs use.

use std::path::{Path, PathBuf};

use crate::error::DeviceError;

/// Two-method boundary a device adapter must implement: upload firmware once, then hand back
/// byte chunks on demand.
///
/// `read_data` returning `Ok(None)` is the explicit end-of-stream signal (see REDESIGN FLAGS):
/// there is no exception-based control flow here.
pub trait Device: Send {
    fn upload_bitfile(&mut self, path: &Path) -> Result<(), DeviceError>;
    fn read_data(&mut self, n_bytes: usize) -> Result<Option<Vec<u8>>, DeviceError>;
}

/// Returns true when the process should use [`MockDevice`] instead of a real transport: either
/// `STREAMDAQ_MOCKRUN` is set, or we are running under `cargo test`.
pub fn is_mockrun() -> bool {
    std::env::var_os("STREAMDAQ_MOCKRUN").is_some() || cfg!(test)
}

/// Replays a fixed byte buffer in caller-requested chunk sizes, then signals end-of-stream.
pub struct MockDevice {
    data: Vec<u8>,
    pos: usize,
}

impl MockDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self::new(std::fs::read(path)?))
    }
}

impl Device for MockDevice {
    fn upload_bitfile(&mut self, _path: &Path) -> Result<(), DeviceError> {
        Ok(())
    }

    fn read_data(&mut self, n_bytes: usize) -> Result<Option<Vec<u8>>, DeviceError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let end = (self.pos + n_bytes).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(Some(chunk))
    }
}

/// A not-yet-implemented real transport.
///
/// Uploading a bitfile and reading data both fail immediately with [`DeviceError::Read`]; a real
/// driver (OpalKelly FrontPanel, a serial port, ...) is a native-library integration that belongs
/// behind this trait but outside this crate.
///
/// Known limitation, carried forward rather than silently fixed: a real UART transport blocked in
/// a serial read has no portable way to observe the pipeline's cancellation flag until the next
/// byte arrives. Do not assume `UnimplementedDevice`-based UART capture shuts down promptly on
/// cancel once it is filled in.
pub struct UnimplementedDevice {
    name: &'static str,
}

impl UnimplementedDevice {
    pub fn uart() -> Self {
        Self { name: "uart" }
    }

    pub fn fpga() -> Self {
        Self { name: "fpga" }
    }
}

impl Device for UnimplementedDevice {
    fn upload_bitfile(&mut self, path: &Path) -> Result<(), DeviceError> {
        Err(DeviceError::BitfileUpload {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{} transport is not implemented in this build", self.name),
            ),
        })
    }

    fn read_data(&mut self, _n_bytes: usize) -> Result<Option<Vec<u8>>, DeviceError> {
        Err(DeviceError::Read(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("{} transport is not implemented in this build", self.name),
        )))
    }
}

pub fn bitfile_exists(path: &PathBuf) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_device_replays_in_requested_chunks() {
        let mut dev = MockDevice::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(dev.read_data(2).unwrap(), Some(vec![1, 2]));
        assert_eq!(dev.read_data(2).unwrap(), Some(vec![3, 4]));
        assert_eq!(dev.read_data(2).unwrap(), Some(vec![5]));
        assert_eq!(dev.read_data(2).unwrap(), None);
    }

    #[test]
    fn unimplemented_device_errors_on_read() {
        let mut dev = UnimplementedDevice::uart();
        assert!(dev.read_data(16).is_err());
    }
}
