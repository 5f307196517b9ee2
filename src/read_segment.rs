/*
 * Reader side of a capture segment.
 *
 * Records in a region are contiguous from the region start up to the
 * published cursor, so the latest record is found by walking record lengths
 * from the start until one ends exactly at the cursor.
 *
 * In semaphore mode the walk and the copy happen while holding the semaphore
 * named in the header. In lock free mode nothing stops the writer, so the
 * region's write sequence is read before and after the copy: an odd value or
 * a change means a write overlapped and the read is redone. The sequence is
 * 8 bits, a copy that spans a multiple of 128 whole writes is not detected.
 *
 * The header does not describe the layout. A segment written with explicit
 * region sizes must be opened with the same layout, `open` only checks that
 * the published cursors fall inside the default regions.
 */
use crate::constants::{HDR_POS_SEMAPHORE_NAME, HDR_POS_WRITE_SEQUENCE, SEMAPHORE_NAME_CAPACITY};
use crate::error::Error;
use crate::layout::{Layout, RegionKind};
use crate::mem_fd::{shm_name, MemFd};
use crate::record::{record_len, AudioRecordHeader, MetadataRecord, VideoRecordHeader};
use crate::semaphore::NamedSemaphore;
use crate::utils::compute_crc32;
use crate::write_segment::SyncMode;
use log::{debug, info};
use std::sync::atomic::{fence, Ordering};

// a writer producing faster than we can copy would otherwise starve us
const MAX_READ_ATTEMPTS: usize = 16;

enum ReadResult {
    Nothing,
    Retry,
    Success(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct VideoSnapshot {
    pub header: VideoRecordHeader,
    pub data: Vec<u8>,
}

impl VideoSnapshot {
    pub fn checksum(&self) -> u32 {
        return compute_crc32(&self.data);
    }
}

#[derive(Debug, Clone)]
pub struct AudioSnapshot {
    pub header: AudioRecordHeader,
    pub data: Vec<u8>,
}

impl AudioSnapshot {
    pub fn checksum(&self) -> u32 {
        return compute_crc32(&self.data);
    }
}

pub struct ReadSegment {
    semaphore: Option<NamedSemaphore>,
    layout: Layout,
    mem_fd: MemFd,
}

impl ReadSegment {
    /// Opens a segment written with the default region split. Fails with
    /// `Error::Layout` when a published cursor lies outside its default
    /// region, the writer was configured with other sizes then.
    pub fn open(name: &str) -> Result<ReadSegment, Error> {
        let name = shm_name(name)?;
        let mem_fd = MemFd::open_read_only(&name)?;
        let layout = Layout::plan(mem_fd.len())?;
        let segment = ReadSegment::from_mem_fd(mem_fd, layout)?;
        for kind in RegionKind::ALL {
            let region = layout.region(kind);
            let cursor = segment.published_cursor(kind);
            if cursor < region.offset || cursor > region.end() {
                return Err(Error::Layout(format!(
                    "{} cursor {} of {} is outside the default {} region [{}, {}), \
                    open it with the writer's layout",
                    kind,
                    cursor,
                    name,
                    kind,
                    region.offset,
                    region.end()
                )));
            }
        }
        return Ok(segment);
    }

    /// Opens a segment whose writer was configured with explicit region
    /// sizes.
    pub fn open_with_layout(name: &str, layout: Layout) -> Result<ReadSegment, Error> {
        let name = shm_name(name)?;
        let mem_fd = MemFd::open_read_only(&name)?;
        if mem_fd.len() != layout.segment_size {
            return Err(Error::Layout(format!(
                "{} is {} bytes but the layout describes {}",
                name,
                mem_fd.len(),
                layout.segment_size
            )));
        }
        return ReadSegment::from_mem_fd(mem_fd, layout);
    }

    fn from_mem_fd(mem_fd: MemFd, layout: Layout) -> Result<ReadSegment, Error> {
        layout.validate()?;

        let mut raw_name = [0u8; SEMAPHORE_NAME_CAPACITY];
        mem_fd.read_into(HDR_POS_SEMAPHORE_NAME, &mut raw_name);
        let end = raw_name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(raw_name.len());
        let semaphore = if end == 0 {
            None
        } else {
            let sem_name = String::from_utf8_lossy(&raw_name[..end]).to_string();
            Some(NamedSemaphore::open(&sem_name)?)
        };

        info!(
            "Opened shared memory {} ({} bytes, {})",
            mem_fd.name(),
            mem_fd.len(),
            match &semaphore {
                Some(semaphore) => format!("guarded by {}", semaphore.name()),
                None => String::from("lock free"),
            }
        );

        return Ok(ReadSegment {
            semaphore: semaphore,
            layout: layout,
            mem_fd: mem_fd,
        });
    }

    pub fn name(&self) -> &str {
        return self.mem_fd.name();
    }

    pub fn layout(&self) -> &Layout {
        return &self.layout;
    }

    pub fn sync_mode(&self) -> SyncMode {
        return match self.semaphore {
            Some(_) => SyncMode::Semaphore,
            None => SyncMode::LockFree,
        };
    }

    fn write_sequence(&self, kind: RegionKind) -> u8 {
        let word = self
            .mem_fd
            .atomic_u32_at(HDR_POS_WRITE_SEQUENCE)
            .load(Ordering::Acquire);
        return (word >> kind.sequence_shift()) as u8;
    }

    pub fn published_cursor(&self, kind: RegionKind) -> usize {
        return self
            .mem_fd
            .atomic_u32_at(kind.cursor_position())
            .load(Ordering::Acquire) as usize;
    }

    pub fn latest_metadata(&self) -> Result<Option<MetadataRecord>, Error> {
        return Ok(self
            .latest_record(RegionKind::Metadata)?
            .and_then(|bytes| MetadataRecord::decode(&bytes)));
    }

    pub fn latest_video(&self) -> Result<Option<VideoSnapshot>, Error> {
        let mut bytes = match self.latest_record(RegionKind::Video)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        return Ok(VideoRecordHeader::decode(&bytes).map(|header| {
            let data = bytes.split_off(bytes.len() - header.payload_size as usize);
            VideoSnapshot { header, data }
        }));
    }

    pub fn latest_audio(&self) -> Result<Option<AudioSnapshot>, Error> {
        let mut bytes = match self.latest_record(RegionKind::Audio)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        return Ok(AudioRecordHeader::decode(&bytes).map(|header| {
            let data = bytes.split_off(bytes.len() - header.payload_size as usize);
            AudioSnapshot { header, data }
        }));
    }

    /// Copy of the record ending at the published cursor of `kind`, None if
    /// the region is empty or kept changing under us.
    pub fn latest_record(&self, kind: RegionKind) -> Result<Option<Vec<u8>>, Error> {
        for _ in 0..MAX_READ_ATTEMPTS {
            let _guard = match &self.semaphore {
                Some(semaphore) => Some(semaphore.acquire()?),
                None => None,
            };
            match self.read_latest(kind) {
                ReadResult::Nothing => return Ok(None),
                ReadResult::Retry => continue,
                ReadResult::Success(bytes) => return Ok(Some(bytes)),
            }
        }
        debug!(
            "Gave up reading {} after {} attempts",
            kind, MAX_READ_ATTEMPTS
        );
        return Ok(None);
    }

    fn read_latest(&self, kind: RegionKind) -> ReadResult {
        let lock_free = self.semaphore.is_none();
        let sequence = self.write_sequence(kind);
        if lock_free && sequence % 2 == 1 {
            return ReadResult::Retry;
        }

        let region = self.layout.region(kind);
        let cursor = self.published_cursor(kind);
        if cursor == region.offset {
            return ReadResult::Nothing;
        }
        if cursor < region.offset || cursor > region.end() {
            debug!("{} cursor {} is outside its region", kind, cursor);
            return ReadResult::Retry;
        }

        let min_len = kind.min_record_size();
        let mut head = vec![0u8; min_len];
        let mut pos = region.offset;
        let len = loop {
            if pos + min_len > cursor {
                return ReadResult::Retry;
            }
            self.mem_fd.read_into(pos, &mut head);
            let len = match record_len(kind, &head) {
                Some(len) => len,
                None => return ReadResult::Retry,
            };
            if pos + len > cursor {
                // a length that runs past the cursor was overwritten mid walk
                return ReadResult::Retry;
            }
            if pos + len == cursor {
                break len;
            }
            pos += len;
        };

        let mut out = vec![0u8; len];
        self.mem_fd.read_into(pos, &mut out);

        if lock_free {
            // keep the second loads after the copy
            fence(Ordering::Acquire);
            if self.write_sequence(kind) != sequence || self.published_cursor(kind) != cursor {
                debug!("{} was written while copying, reading again", kind);
                return ReadResult::Retry;
            }
        }
        return ReadResult::Success(out);
    }
}
