//! Queue plumbing and the pipeline controller.
//!
//! Q1/Q2/Q3 are bounded `crossbeam_channel`s; a shared `Arc<AtomicBool>` cancel flag and a single
//! `EndOfStream` sentinel per queue give every stage an explicit, observable shutdown signal
//! instead of relying on process teardown. Every stage runs on its own `std::thread`, matching
//! the "prefer threads with bounded channels" choice recorded in the design notes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::assembler::{self, Frame};
use crate::config::DeviceConfig;
use crate::device::Device;
use crate::framer;
use crate::grouper::{self, GrouperSinks};

/// Item carried on a pipeline queue: either real data, or the one-shot shutdown marker.
#[derive(Debug, Clone)]
pub enum QueueItem<T> {
    Item(T),
    EndOfStream,
}

pub type RawBuffer = Vec<u8>;
pub type FrameSlots = Vec<Vec<u8>>;

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Options controlling a single capture run.
pub struct CaptureOptions {
    pub read_length: Option<usize>,
    pub pre_first: bool,
    pub capture_binary: Option<std::path::PathBuf>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            read_length: None,
            pre_first: true,
            capture_binary: None,
        }
    }
}

/// Owns the three queues and the cancel flag, launches the three worker threads, and exposes the
/// Q3 receiver for the caller to drain (the caller plays the role of the driver loop: feeding
/// the video writer / display / plot sink).
pub struct PipelineController {
    cancel: Arc<AtomicBool>,
    device_failed: Arc<AtomicBool>,
    framer_handle: Option<JoinHandle<()>>,
    grouper_handle: Option<JoinHandle<()>>,
    assembler_handle: Option<JoinHandle<()>>,
    q3_rx: Receiver<QueueItem<Frame>>,
}

impl PipelineController {
    /// Starts the pipeline. `device` is typically a `Box<dyn Device>` already configured with its
    /// bitfile/port; this function does not call `upload_bitfile` itself, since bitfile upload is
    /// a device-init concern, not a per-capture one.
    pub fn start(
        config: Arc<DeviceConfig>,
        device: Box<dyn Device>,
        options: CaptureOptions,
        sinks: GrouperSinks,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let device_failed = Arc::new(AtomicBool::new(false));

        let (q1_tx, q1_rx): (Sender<QueueItem<RawBuffer>>, Receiver<QueueItem<RawBuffer>>) =
            bounded(config.runtime.q1_size.max(1));
        let (q2_tx, q2_rx): (Sender<QueueItem<FrameSlots>>, Receiver<QueueItem<FrameSlots>>) =
            bounded(config.runtime.q2_size.max(1));
        let (q3_tx, q3_rx): (Sender<QueueItem<Frame>>, Receiver<QueueItem<Frame>>) =
            bounded(config.runtime.q3_size.max(1));

        let framer_handle = {
            let config = Arc::clone(&config);
            let cancel = Arc::clone(&cancel);
            let device_failed = Arc::clone(&device_failed);
            std::thread::Builder::new()
                .name("streamdaq-framer".into())
                .spawn(move || {
                    framer::run(device, &config, q1_tx, cancel, device_failed, options);
                })
                .expect("failed to spawn framer thread")
        };

        let grouper_handle = {
            let config = Arc::clone(&config);
            let cancel = Arc::clone(&cancel);
            std::thread::Builder::new()
                .name("streamdaq-grouper".into())
                .spawn(move || {
                    grouper::run(q1_rx, q2_tx, &config, cancel, sinks);
                })
                .expect("failed to spawn grouper thread")
        };

        let assembler_handle = {
            let config = Arc::clone(&config);
            let cancel = Arc::clone(&cancel);
            std::thread::Builder::new()
                .name("streamdaq-assembler".into())
                .spawn(move || {
                    assembler::run(q2_rx, q3_tx, &config, cancel);
                })
                .expect("failed to spawn assembler thread")
        };

        Self {
            cancel,
            device_failed,
            framer_handle: Some(framer_handle),
            grouper_handle: Some(grouper_handle),
            assembler_handle: Some(assembler_handle),
            q3_rx,
        }
    }

    /// The Q3 receiver the driver loop should drain until it sees [`QueueItem::EndOfStream`].
    pub fn frames(&self) -> &Receiver<QueueItem<Frame>> {
        &self.q3_rx
    }

    /// Sets the shared cancel flag. Every stage observes it on its next queue operation.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// True once the Framer's device read has failed at least once during this capture (as
    /// opposed to a clean end-of-stream from `Device::read_data` returning `Ok(None)`).
    pub fn device_failed(&self) -> bool {
        self.device_failed.load(Ordering::SeqCst)
    }

    /// Joins every stage thread, with a bounded timeout per stage. A stage that is still alive
    /// past its timeout is logged and detached rather than force-killed: Rust has no portable way
    /// to kill a thread mid-operation.
    pub fn join(mut self) {
        self.cancel();
        for (name, handle) in [
            ("framer", self.framer_handle.take()),
            ("grouper", self.grouper_handle.take()),
            ("assembler", self.assembler_handle.take()),
        ] {
            if let Some(handle) = handle {
                join_with_timeout(name, handle);
            }
        }
    }
}

fn join_with_timeout(name: &str, handle: JoinHandle<()>) {
    // `JoinHandle` has no built-in timed join; approximate a bounded join by polling
    // `is_finished` rather than blocking forever on a wedged stage.
    let start = std::time::Instant::now();
    while !handle.is_finished() {
        if start.elapsed() > JOIN_TIMEOUT {
            log::warn!(
                target: "streamdaq::pipeline",
                "stage {name} did not stop within {JOIN_TIMEOUT:?}, detaching it"
            );
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if let Err(_) = handle.join() {
        log::error!(target: "streamdaq::pipeline", "stage {name} panicked");
    }
}
