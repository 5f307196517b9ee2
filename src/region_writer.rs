/*
 * Append-with-wraparound ring over one region of the segment.
 *
 * Records are written back to back from the region start. When the next
 * record would run past the region end the cursor goes back to the region
 * start, so the records between the region start and the published cursor are
 * always contiguous and the last of them ends exactly at the cursor.
 *
 * Nothing is read back before being overwritten and readers are not tracked.
 * In lock free mode every write is bracketed by the region's byte of the
 * write sequence word (odd while writing), so a reader that copied during a
 * write can tell and read again.
 */
use crate::constants::HDR_POS_WRITE_SEQUENCE;
use crate::layout::Region;
use crate::mem_fd::MemFd;
use crate::record::Encode;
use crate::write_segment::SyncMode;
use log::debug;
use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

/// Where a record of `len` bytes goes when the ring is at `cursor`. None when
/// the record can never fit the region.
pub fn next_write_position(cursor: usize, len: usize, region: &Region) -> Option<usize> {
    if len > region.size {
        return None;
    }
    // past the end, or drifted below the region (corruption guard)
    if cursor + len > region.end() || cursor < region.offset {
        return Some(region.offset);
    }
    return Some(cursor);
}

pub struct RegionWriter {
    mem_fd: Arc<MemFd>,
    region: Region,
    sync_mode: SyncMode,

    // where the next record starts, absolute in the segment
    cursor: usize,

    // last value written to the header field, the lock free update adds the
    // difference to it
    published: u32,

    // our byte of the write sequence word, only we change it
    sequence: u8,
}

impl RegionWriter {
    /// Starts an empty ring, the header field is set to the region start.
    pub fn new(mem_fd: Arc<MemFd>, region: Region, sync_mode: SyncMode) -> RegionWriter {
        let start = region.offset as u32;
        mem_fd
            .atomic_u32_at(region.kind.cursor_position())
            .store(start, Ordering::Release);
        return RegionWriter {
            mem_fd: mem_fd,
            region: region,
            sync_mode: sync_mode,
            cursor: region.offset,
            published: start,
            sequence: 0,
        };
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        return self.cursor;
    }

    /// Writes `record` into the ring and publishes its end offset to the
    /// header once every byte of it is in place. Returns the new cursor.
    ///
    /// A record larger than the whole region is dropped and the ring restarts
    /// empty.
    pub fn publish<R: Encode + ?Sized>(&mut self, record: &R) -> usize {
        let len = record.encoded_len();
        let start = match next_write_position(self.cursor, len, &self.region) {
            Some(start) => start,
            None => {
                debug!(
                    "Dropping {} byte {} record, the region only has {} bytes",
                    len, self.region.kind, self.region.size
                );
                self.cursor = self.region.offset;
                self.publish_cursor(self.cursor);
                return self.cursor;
            }
        };

        self.bump_sequence();
        // the odd sequence must be visible before any record byte
        fence(Ordering::Release);

        // we are the only writer of this region, see WriteSegment
        let out = unsafe { self.mem_fd.slice_mut_at(start, len) };
        record.encode_into(out);

        let new_cursor = start + len;
        self.publish_cursor(new_cursor);
        self.bump_sequence();
        self.cursor = new_cursor;
        return new_cursor;
    }

    /// Moves our byte of the write sequence word by one. Wraps 255 -> 0
    /// without carrying into the neighbouring region's byte.
    fn bump_sequence(&mut self) {
        if self.sync_mode != SyncMode::LockFree {
            return;
        }
        let shift = self.region.kind.sequence_shift();
        let field = self.mem_fd.atomic_u32_at(HDR_POS_WRITE_SEQUENCE);
        if self.sequence == u8::MAX {
            field.fetch_sub((u8::MAX as u32) << shift, Ordering::AcqRel);
        } else {
            field.fetch_add(1 << shift, Ordering::AcqRel);
        }
        self.sequence = self.sequence.wrapping_add(1);
    }

    fn publish_cursor(&mut self, new_cursor: usize) {
        // Layout::validate keeps the whole segment addressable with u32
        let new_cursor = new_cursor as u32;
        let field = self
            .mem_fd
            .atomic_u32_at(self.region.kind.cursor_position());
        match self.sync_mode {
            SyncMode::LockFree => {
                // release makes the record bytes visible before the cursor
                if new_cursor >= self.published {
                    field.fetch_add(new_cursor - self.published, Ordering::Release);
                } else {
                    field.fetch_sub(self.published - new_cursor, Ordering::Release);
                }
            }
            SyncMode::Semaphore => {
                field.store(new_cursor, Ordering::Release);
            }
        }
        self.published = new_cursor;
    }

    #[cfg(test)]
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    #[cfg(test)]
    pub fn sequence(&self) -> u8 {
        return self.sequence;
    }
}
