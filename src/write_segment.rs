/*
 * Implements a single writer, multiple reader shared segment.
 *
 * The writer owns the name for its whole run: any stale segment left by a
 * previous run is unlinked, a fresh one is created, and it is unlinked again
 * on drop. Each region has its own writer behind its own lock so video and
 * audio never wait for each other in lock free mode.
 */
use crate::constants::{HDR_POS_SEMAPHORE_NAME, SEMAPHORE_NAME_CAPACITY};
use crate::error::Error;
use crate::layout::{Layout, RegionKind};
use crate::mem_fd::{shm_name, unlink_stale, MemFd};
use crate::record::Encode;
use crate::region_writer::RegionWriter;
use crate::semaphore::{semaphore_name, NamedSemaphore, SemaphoreGuard};
use log::info;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};

/// How publishing is coordinated with readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Every event is written while holding the named semaphore
    /// `<name>_sem`, readers take the same semaphore before copying.
    Semaphore,
    /// No shared lock. Cursors are published with atomic adds after the
    /// record is written, readers re-check the cursor after copying.
    LockFree,
}

impl Default for SyncMode {
    fn default() -> Self {
        return SyncMode::LockFree;
    }
}

pub struct WriteSegment {
    // dropped first, the semaphore goes before the memory
    semaphore: Option<NamedSemaphore>,

    metadata: Mutex<RegionWriter>,
    video: Mutex<RegionWriter>,
    audio: Mutex<RegionWriter>,

    layout: Layout,
    sync_mode: SyncMode,
    mem_fd: Arc<MemFd>,
}

impl WriteSegment {
    pub fn create(name: &str, layout: Layout, sync_mode: SyncMode) -> Result<WriteSegment, Error> {
        layout.validate()?;
        let name = shm_name(name)?;

        unlink_stale(&name);
        let mem_fd = Arc::new(MemFd::create(&name, layout.segment_size)?);

        // ftruncate already zero fills, but be explicit about the header
        mem_fd.zero(0, layout.header_size);

        let semaphore = match sync_mode {
            SyncMode::Semaphore => {
                let sem_name = semaphore_name(&name);
                assert!(sem_name.len() < SEMAPHORE_NAME_CAPACITY);
                unsafe {
                    mem_fd
                        .slice_mut_at(HDR_POS_SEMAPHORE_NAME, sem_name.len())
                        .copy_from_slice(sem_name.as_bytes());
                }
                Some(NamedSemaphore::create(&sem_name)?)
            }
            SyncMode::LockFree => None,
        };

        let metadata = RegionWriter::new(mem_fd.clone(), layout.metadata, sync_mode);
        let video = RegionWriter::new(mem_fd.clone(), layout.video, sync_mode);
        let audio = RegionWriter::new(mem_fd.clone(), layout.audio, sync_mode);

        info!(
            "Created shared memory {} ({} bytes, {:?}): metadata at {}, video at {} ({} bytes), \
            audio at {} ({} bytes)",
            name,
            layout.segment_size,
            sync_mode,
            layout.metadata.offset,
            layout.video.offset,
            layout.video.size,
            layout.audio.offset,
            layout.audio.size
        );

        return Ok(WriteSegment {
            semaphore: semaphore,
            metadata: Mutex::new(metadata),
            video: Mutex::new(video),
            audio: Mutex::new(audio),
            layout: layout,
            sync_mode: sync_mode,
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
        return self.sync_mode;
    }

    /// Enters the critical section of one event. Holds the named semaphore in
    /// semaphore mode, does nothing in lock free mode.
    pub fn begin_event(&self) -> Result<Option<SemaphoreGuard<'_>>, Error> {
        return match &self.semaphore {
            Some(semaphore) => Ok(Some(semaphore.acquire()?)),
            None => Ok(None),
        };
    }

    /// Writes one record into the ring of `kind` and returns the published
    /// cursor. In semaphore mode call this inside `begin_event`.
    pub fn publish<R: Encode + ?Sized>(&self, kind: RegionKind, record: &R) -> usize {
        let writer = match kind {
            RegionKind::Metadata => &self.metadata,
            RegionKind::Video => &self.video,
            RegionKind::Audio => &self.audio,
        };
        // a panic mid write leaves nothing worse than a torn record
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        return writer.publish(record);
    }

    /// Cursor currently visible to readers.
    pub fn published_cursor(&self, kind: RegionKind) -> usize {
        return self
            .mem_fd
            .atomic_u32_at(kind.cursor_position())
            .load(std::sync::atomic::Ordering::Acquire) as usize;
    }
}

impl Drop for WriteSegment {
    fn drop(&mut self) {
        info!("Removing shared memory {}", self.mem_fd.name());
        // fields drop in order: semaphore, region writers, then the mapping
        // once the last reference to it is gone
    }
}
