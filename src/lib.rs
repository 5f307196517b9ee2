mod attributes;
mod capture;
mod config;
mod constants;
mod error;
mod layout;
mod mem_fd;
mod read_segment;
mod record;
mod region_writer;
mod semaphore;
mod synthetic;
mod utils;
mod write_segment;

pub use crate::attributes::{AudioFormat, DisplayMode, FieldDominance, PixelFormat, StreamAttributes};
pub use crate::capture::{AudioPacket, CaptureCallback, ShmCapture, VideoFrame};
pub use crate::config::{CaptureConfig, ConfigError};
pub use crate::error::Error;
pub use crate::layout::{Layout, Region, RegionKind};
pub use crate::read_segment::{AudioSnapshot, ReadSegment, VideoSnapshot};
pub use crate::record::{AudioRecordHeader, MetadataRecord, VideoRecordHeader};
pub use crate::synthetic::SyntheticSource;
pub use crate::utils::compute_crc32;
pub use crate::write_segment::{SyncMode, WriteSegment};
