// The segment is one header followed by three rings: metadata, video, audio.
// Offsets and sizes of the rings come from the Layout, only the header and
// the record envelopes are fixed here.

// header layout
//  0  -- u32 published metadata cursor (absolute end of latest record)
//  4  -- u32 published video cursor
//  8  -- u32 published audio cursor
// 12  -- u32 write sequences, lock free mode only: bits 0-7 metadata,
//        8-15 video, 16-23 audio, odd while that region is being written
// 16  -- uint8[256] semaphore name, nul terminated, zero in lock free mode
// 272 -- end

pub const HEADER_SIZE: usize = 272;

// Absolute positions in the header
pub const HDR_POS_METADATA_CURSOR: usize = 0;
pub const HDR_POS_VIDEO_CURSOR: usize = 4;
pub const HDR_POS_AUDIO_CURSOR: usize = 8;
pub const HDR_POS_WRITE_SEQUENCE: usize = 12;
pub const HDR_POS_SEMAPHORE_NAME: usize = 16;

// NAME_MAX + 1, so any name the OS accepts fits with its terminator
pub const SEMAPHORE_NAME_CAPACITY: usize = 256;
pub const SEMAPHORE_SUFFIX: &str = "_sem";

// metadata record
// u32  0 -- pixel format
// u32  4 -- width
// u32  8 -- height
// i64 12 -- frame duration
// i64 20 -- time scale
// u32 28 -- field dominance
// u32 32 -- audio sample rate
// u32 36 -- audio sample depth
// u32 40 -- audio channels
//     44 -- end
pub const METADATA_RECORD_SIZE: usize = 44;

pub const META_POS_PIXEL_FORMAT: usize = 0;
pub const META_POS_WIDTH: usize = 4;
pub const META_POS_HEIGHT: usize = 8;
pub const META_POS_FRAME_DURATION: usize = 12;
pub const META_POS_TIME_SCALE: usize = 20;
pub const META_POS_FIELD_DOMINANCE: usize = 28;
pub const META_POS_SAMPLE_RATE: usize = 32;
pub const META_POS_SAMPLE_DEPTH: usize = 36;
pub const META_POS_CHANNELS: usize = 40;

// video record
// i64  0 -- timestamp
// i64  8 -- duration
// u32 16 -- width
// u32 20 -- height
// u32 24 -- stride
// u32 28 -- payload size (height * stride)
//     32 -- payload
pub const VIDEO_HEADER_SIZE: usize = 32;

pub const VIDEO_POS_TIMESTAMP: usize = 0;
pub const VIDEO_POS_DURATION: usize = 8;
pub const VIDEO_POS_WIDTH: usize = 16;
pub const VIDEO_POS_HEIGHT: usize = 20;
pub const VIDEO_POS_STRIDE: usize = 24;
pub const VIDEO_POS_SIZE: usize = 28;

// audio record
// i64  0 -- timestamp
// u32  8 -- sample frame count
// u32 12 -- payload size (frames * channels * depth / 8)
//     16 -- payload
pub const AUDIO_HEADER_SIZE: usize = 16;

pub const AUDIO_POS_TIMESTAMP: usize = 0;
pub const AUDIO_POS_SAMPLE_FRAMES: usize = 8;
pub const AUDIO_POS_SIZE: usize = 12;

// default sizing
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024 * 1024;
pub const METADATA_REGION_SIZE: usize = 128;
// video gets 5/8 of the segment, 40 MiB of the default 64 MiB
pub const VIDEO_SHARE_NUM: usize = 5;
pub const VIDEO_SHARE_DEN: usize = 8;
