//! Sinks consuming pipeline output: CSV metadata, the metadata ring feeding the live plot, and
//! the video encoder boundary. All three are "external collaborators behind narrow interfaces"
//! per the top-level spec; only the narrow interfaces and a deterministic reference
//! implementation live in this crate.

pub mod csv;
pub mod metadata_ring;
pub mod video;

pub use csv::CsvMetadataSink;
pub use metadata_ring::MetadataRing;
pub use video::{NullVideoSink, RawVideoSink, VideoSink};
