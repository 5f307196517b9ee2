/*
 * Splits one segment into header, metadata, video and audio regions.
 * Regions are laid out back to back in that order and audio always takes
 * whatever is left, so the last region ends exactly at the segment end.
 */
use crate::constants::{
    AUDIO_HEADER_SIZE, HDR_POS_AUDIO_CURSOR, HDR_POS_METADATA_CURSOR, HDR_POS_VIDEO_CURSOR,
    HEADER_SIZE, METADATA_RECORD_SIZE, METADATA_REGION_SIZE, VIDEO_HEADER_SIZE, VIDEO_SHARE_DEN,
    VIDEO_SHARE_NUM,
};
use crate::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Metadata,
    Video,
    Audio,
}

impl RegionKind {
    pub const ALL: [RegionKind; 3] = [RegionKind::Metadata, RegionKind::Video, RegionKind::Audio];

    /// Position of this region's published cursor in the header.
    pub fn cursor_position(&self) -> usize {
        return match self {
            RegionKind::Metadata => HDR_POS_METADATA_CURSOR,
            RegionKind::Video => HDR_POS_VIDEO_CURSOR,
            RegionKind::Audio => HDR_POS_AUDIO_CURSOR,
        };
    }

    /// Bit offset of this region's byte in the write sequence word.
    pub fn sequence_shift(&self) -> u32 {
        return match self {
            RegionKind::Metadata => 0,
            RegionKind::Video => 8,
            RegionKind::Audio => 16,
        };
    }

    /// Smallest record that can ever be written to this region.
    pub fn min_record_size(&self) -> usize {
        return match self {
            RegionKind::Metadata => METADATA_RECORD_SIZE,
            RegionKind::Video => VIDEO_HEADER_SIZE,
            RegionKind::Audio => AUDIO_HEADER_SIZE,
        };
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RegionKind::Metadata => "metadata",
            RegionKind::Video => "video",
            RegionKind::Audio => "audio",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub kind: RegionKind,
    pub offset: usize,
    pub size: usize,
}

impl Region {
    pub fn end(&self) -> usize {
        return self.offset + self.size;
    }

    pub fn contains(&self, pos: usize, len: usize) -> bool {
        return pos >= self.offset && pos + len <= self.end();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub segment_size: usize,
    pub header_size: usize,
    pub metadata: Region,
    pub video: Region,
    pub audio: Region,
}

impl Layout {
    /// Default policy: small fixed metadata ring, 5/8 of the segment for video
    /// and the rest for audio.
    pub fn plan(segment_size: usize) -> Result<Layout, Error> {
        let video_size = segment_size / VIDEO_SHARE_DEN * VIDEO_SHARE_NUM;
        return Layout::with_sizes(segment_size, METADATA_REGION_SIZE, video_size);
    }

    pub fn with_sizes(
        segment_size: usize,
        metadata_size: usize,
        video_size: usize,
    ) -> Result<Layout, Error> {
        let fixed = HEADER_SIZE
            .checked_add(metadata_size)
            .and_then(|n| n.checked_add(video_size))
            .ok_or_else(|| Error::Layout(String::from("region sizes overflow")))?;
        if fixed >= segment_size {
            return Err(Error::Layout(format!(
                "segment of {} bytes leaves no room for audio after {} bytes of header, \
                metadata and video",
                segment_size, fixed
            )));
        }

        let metadata = Region {
            kind: RegionKind::Metadata,
            offset: HEADER_SIZE,
            size: metadata_size,
        };
        let video = Region {
            kind: RegionKind::Video,
            offset: metadata.end(),
            size: video_size,
        };
        let audio = Region {
            kind: RegionKind::Audio,
            offset: video.end(),
            size: segment_size - video.end(),
        };

        let layout = Layout {
            segment_size: segment_size,
            header_size: HEADER_SIZE,
            metadata: metadata,
            video: video,
            audio: audio,
        };
        layout.validate()?;
        return Ok(layout);
    }

    pub fn region(&self, kind: RegionKind) -> &Region {
        return match kind {
            RegionKind::Metadata => &self.metadata,
            RegionKind::Video => &self.video,
            RegionKind::Audio => &self.audio,
        };
    }

    pub fn validate(&self) -> Result<(), Error> {
        // cursors are published as u32
        if self.segment_size > u32::MAX as usize {
            return Err(Error::Layout(format!(
                "segment of {} bytes is too large for 32 bit cursors",
                self.segment_size
            )));
        }

        if self.metadata.offset < self.header_size {
            return Err(Error::Layout(format!(
                "metadata region at {} overlaps the header",
                self.metadata.offset
            )));
        }

        let mut prev_end = self.header_size;
        for kind in RegionKind::ALL {
            let region = self.region(kind);
            if region.offset < prev_end {
                return Err(Error::Layout(format!(
                    "{} region at {} overlaps the previous region ending at {}",
                    kind, region.offset, prev_end
                )));
            }
            if region.size < kind.min_record_size() {
                return Err(Error::Layout(format!(
                    "{} region of {} bytes cannot hold a {} byte record",
                    kind,
                    region.size,
                    kind.min_record_size()
                )));
            }
            prev_end = region.end();
        }

        if self.audio.end() != self.segment_size {
            return Err(Error::Layout(format!(
                "regions end at {} but the segment is {} bytes",
                self.audio.end(),
                self.segment_size
            )));
        }
        return Ok(());
    }
}
