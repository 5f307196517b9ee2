/*
 * Binary envelopes of the three record kinds. Encoding only fills a buffer
 * handed in by the caller, where that buffer lives (usually straight inside
 * the shared segment) is the region writer's business.
 *
 * All integers are native endian and fixed width, see constants.rs for the
 * field positions.
 */
use crate::attributes::{AudioFormat, StreamAttributes};
use crate::capture::{AudioPacket, VideoFrame};
use crate::constants::{
    AUDIO_HEADER_SIZE, AUDIO_POS_SAMPLE_FRAMES, AUDIO_POS_SIZE, AUDIO_POS_TIMESTAMP,
    METADATA_RECORD_SIZE, META_POS_CHANNELS, META_POS_FIELD_DOMINANCE, META_POS_FRAME_DURATION,
    META_POS_HEIGHT, META_POS_PIXEL_FORMAT, META_POS_SAMPLE_DEPTH, META_POS_SAMPLE_RATE,
    META_POS_TIME_SCALE, META_POS_WIDTH, VIDEO_HEADER_SIZE, VIDEO_POS_DURATION, VIDEO_POS_HEIGHT,
    VIDEO_POS_SIZE, VIDEO_POS_STRIDE, VIDEO_POS_TIMESTAMP, VIDEO_POS_WIDTH,
};
use crate::error::Error;
use crate::layout::RegionKind;

pub trait Encode {
    /// Total bytes `encode_into` writes.
    fn encoded_len(&self) -> usize;

    /// Writes the record into `out`, which is exactly `encoded_len()` long.
    fn encode_into(&self, out: &mut [u8]);

    #[cfg(test)]
    fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.encoded_len()];
        self.encode_into(&mut out);
        return out;
    }
}

fn put_u32(out: &mut [u8], pos: usize, value: u32) {
    out[pos..pos + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_i64(out: &mut [u8], pos: usize, value: i64) {
    out[pos..pos + 8].copy_from_slice(&value.to_ne_bytes());
}

fn get_u32(data: &[u8], pos: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[pos..pos + 4]);
    return u32::from_ne_bytes(bytes);
}

fn get_i64(data: &[u8], pos: usize) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[pos..pos + 8]);
    return i64::from_ne_bytes(bytes);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataRecord {
    pub pixel_format: u32,
    pub width: u32,
    pub height: u32,
    pub frame_duration: i64,
    pub time_scale: i64,
    pub field_dominance: u32,
    pub audio_sample_rate: u32,
    pub audio_sample_depth: u32,
    pub audio_channels: u32,
}

impl From<&StreamAttributes> for MetadataRecord {
    fn from(attributes: &StreamAttributes) -> Self {
        return MetadataRecord {
            pixel_format: attributes.pixel_format.0,
            width: attributes.width,
            height: attributes.height,
            frame_duration: attributes.frame_duration,
            time_scale: attributes.time_scale,
            field_dominance: attributes.field_dominance.0,
            audio_sample_rate: attributes.audio.sample_rate,
            audio_sample_depth: attributes.audio.sample_depth,
            audio_channels: attributes.audio.channels,
        };
    }
}

impl MetadataRecord {
    pub fn decode(data: &[u8]) -> Option<MetadataRecord> {
        if data.len() < METADATA_RECORD_SIZE {
            return None;
        }
        return Some(MetadataRecord {
            pixel_format: get_u32(data, META_POS_PIXEL_FORMAT),
            width: get_u32(data, META_POS_WIDTH),
            height: get_u32(data, META_POS_HEIGHT),
            frame_duration: get_i64(data, META_POS_FRAME_DURATION),
            time_scale: get_i64(data, META_POS_TIME_SCALE),
            field_dominance: get_u32(data, META_POS_FIELD_DOMINANCE),
            audio_sample_rate: get_u32(data, META_POS_SAMPLE_RATE),
            audio_sample_depth: get_u32(data, META_POS_SAMPLE_DEPTH),
            audio_channels: get_u32(data, META_POS_CHANNELS),
        });
    }
}

impl Encode for MetadataRecord {
    fn encoded_len(&self) -> usize {
        return METADATA_RECORD_SIZE;
    }

    fn encode_into(&self, out: &mut [u8]) {
        assert!(out.len() == METADATA_RECORD_SIZE);
        put_u32(out, META_POS_PIXEL_FORMAT, self.pixel_format);
        put_u32(out, META_POS_WIDTH, self.width);
        put_u32(out, META_POS_HEIGHT, self.height);
        put_i64(out, META_POS_FRAME_DURATION, self.frame_duration);
        put_i64(out, META_POS_TIME_SCALE, self.time_scale);
        put_u32(out, META_POS_FIELD_DOMINANCE, self.field_dominance);
        put_u32(out, META_POS_SAMPLE_RATE, self.audio_sample_rate);
        put_u32(out, META_POS_SAMPLE_DEPTH, self.audio_sample_depth);
        put_u32(out, META_POS_CHANNELS, self.audio_channels);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoRecordHeader {
    pub timestamp: i64,
    pub duration: i64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub payload_size: u32,
}

impl VideoRecordHeader {
    pub fn decode(data: &[u8]) -> Option<VideoRecordHeader> {
        if data.len() < VIDEO_HEADER_SIZE {
            return None;
        }
        return Some(VideoRecordHeader {
            timestamp: get_i64(data, VIDEO_POS_TIMESTAMP),
            duration: get_i64(data, VIDEO_POS_DURATION),
            width: get_u32(data, VIDEO_POS_WIDTH),
            height: get_u32(data, VIDEO_POS_HEIGHT),
            stride: get_u32(data, VIDEO_POS_STRIDE),
            payload_size: get_u32(data, VIDEO_POS_SIZE),
        });
    }

    pub fn record_len(&self) -> usize {
        return VIDEO_HEADER_SIZE + self.payload_size as usize;
    }
}

/// A video frame ready to be written, borrowing the capture buffer.
#[derive(Debug)]
pub struct VideoRecord<'a> {
    pub header: VideoRecordHeader,
    pub payload: &'a [u8],
}

impl<'a> VideoRecord<'a> {
    /// The payload is exactly height * stride bytes of the frame buffer.
    pub fn new(frame: &VideoFrame<'a>) -> Result<VideoRecord<'a>, Error> {
        let payload_size = frame
            .height
            .checked_mul(frame.row_bytes)
            .ok_or(Error::Overflow("video payload size"))?;
        let expected = payload_size as usize;
        if frame.data.len() < expected {
            return Err(Error::Payload {
                kind: RegionKind::Video,
                expected: expected,
                actual: frame.data.len(),
            });
        }

        return Ok(VideoRecord {
            header: VideoRecordHeader {
                timestamp: frame.timestamp,
                duration: frame.duration,
                width: frame.width,
                height: frame.height,
                stride: frame.row_bytes,
                payload_size: payload_size,
            },
            payload: &frame.data[..expected],
        });
    }
}

impl Encode for VideoRecord<'_> {
    fn encoded_len(&self) -> usize {
        return self.header.record_len();
    }

    fn encode_into(&self, out: &mut [u8]) {
        assert!(out.len() == self.encoded_len());
        put_i64(out, VIDEO_POS_TIMESTAMP, self.header.timestamp);
        put_i64(out, VIDEO_POS_DURATION, self.header.duration);
        put_u32(out, VIDEO_POS_WIDTH, self.header.width);
        put_u32(out, VIDEO_POS_HEIGHT, self.header.height);
        put_u32(out, VIDEO_POS_STRIDE, self.header.stride);
        put_u32(out, VIDEO_POS_SIZE, self.header.payload_size);
        out[VIDEO_HEADER_SIZE..].copy_from_slice(self.payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioRecordHeader {
    pub timestamp: i64,
    pub sample_frame_count: u32,
    pub payload_size: u32,
}

impl AudioRecordHeader {
    pub fn decode(data: &[u8]) -> Option<AudioRecordHeader> {
        if data.len() < AUDIO_HEADER_SIZE {
            return None;
        }
        return Some(AudioRecordHeader {
            timestamp: get_i64(data, AUDIO_POS_TIMESTAMP),
            sample_frame_count: get_u32(data, AUDIO_POS_SAMPLE_FRAMES),
            payload_size: get_u32(data, AUDIO_POS_SIZE),
        });
    }

    pub fn record_len(&self) -> usize {
        return AUDIO_HEADER_SIZE + self.payload_size as usize;
    }
}

#[derive(Debug)]
pub struct AudioRecord<'a> {
    pub header: AudioRecordHeader,
    pub payload: &'a [u8],
}

impl<'a> AudioRecord<'a> {
    /// The payload is frames * channels * depth / 8 bytes, using the audio
    /// format the stream was configured with.
    pub fn new(packet: &AudioPacket<'a>, format: &AudioFormat) -> Result<AudioRecord<'a>, Error> {
        let payload_size = packet
            .sample_frame_count
            .checked_mul(format.channels)
            .and_then(|n| n.checked_mul(format.sample_depth / 8))
            .ok_or(Error::Overflow("audio payload size"))?;
        let expected = payload_size as usize;
        if packet.data.len() < expected {
            return Err(Error::Payload {
                kind: RegionKind::Audio,
                expected: expected,
                actual: packet.data.len(),
            });
        }

        return Ok(AudioRecord {
            header: AudioRecordHeader {
                timestamp: packet.timestamp,
                sample_frame_count: packet.sample_frame_count,
                payload_size: payload_size,
            },
            payload: &packet.data[..expected],
        });
    }
}

impl Encode for AudioRecord<'_> {
    fn encoded_len(&self) -> usize {
        return self.header.record_len();
    }

    fn encode_into(&self, out: &mut [u8]) {
        assert!(out.len() == self.encoded_len());
        put_i64(out, AUDIO_POS_TIMESTAMP, self.header.timestamp);
        put_u32(out, AUDIO_POS_SAMPLE_FRAMES, self.header.sample_frame_count);
        put_u32(out, AUDIO_POS_SIZE, self.header.payload_size);
        out[AUDIO_HEADER_SIZE..].copy_from_slice(self.payload);
    }
}

/// Length of the record starting at `data`, as far as its header tells.
/// None if not even the header is there.
pub fn record_len(kind: RegionKind, data: &[u8]) -> Option<usize> {
    return match kind {
        RegionKind::Metadata => {
            if data.len() < METADATA_RECORD_SIZE {
                None
            } else {
                Some(METADATA_RECORD_SIZE)
            }
        }
        RegionKind::Video => VideoRecordHeader::decode(data).map(|h| h.record_len()),
        RegionKind::Audio => AudioRecordHeader::decode(data).map(|h| h.record_len()),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{DisplayMode, FieldDominance, PixelFormat};

    #[test]
    fn metadata_round_trip() {
        let mode = &DisplayMode::standard_modes()[7]; // 1080p23.98
        let attributes = StreamAttributes::new(
            mode,
            PixelFormat::YUV_10BIT,
            AudioFormat {
                sample_rate: 48_000,
                sample_depth: 32,
                channels: 8,
            },
        );
        let record = MetadataRecord::from(&attributes);
        let bytes = record.encode();
        assert_eq!(bytes.len(), METADATA_RECORD_SIZE);

        let decoded = MetadataRecord::decode(&bytes).expect("Should decode");
        assert_eq!(decoded, record);
        assert_eq!(decoded.pixel_format, PixelFormat::YUV_10BIT.0);
        assert_eq!(decoded.width, 1920);
        assert_eq!(decoded.height, 1080);
        assert_eq!(decoded.frame_duration, 1001);
        assert_eq!(decoded.time_scale, 24000);
        assert_eq!(decoded.field_dominance, FieldDominance::PROGRESSIVE.0);
        assert_eq!(decoded.audio_sample_rate, 48_000);
        assert_eq!(decoded.audio_sample_depth, 32);
        assert_eq!(decoded.audio_channels, 8);

        // fields sit where readers expect them
        assert_eq!(bytes[META_POS_WIDTH..META_POS_WIDTH + 4], 1920u32.to_ne_bytes());
        assert_eq!(
            bytes[META_POS_TIME_SCALE..META_POS_TIME_SCALE + 8],
            24000i64.to_ne_bytes()
        );
        assert_eq!(bytes[META_POS_CHANNELS..META_POS_CHANNELS + 4], 8u32.to_ne_bytes());

        assert_eq!(MetadataRecord::decode(&bytes[..METADATA_RECORD_SIZE - 1]), None);
    }

    #[test]
    fn hd_video_record() {
        let data = vec![0x80u8; 3840 * 1080];
        let frame = VideoFrame {
            timestamp: 90_000,
            duration: 1000,
            width: 1920,
            height: 1080,
            row_bytes: 3840,
            no_input_source: false,
            data: &data,
        };
        let record = VideoRecord::new(&frame).expect("Should build");
        assert_eq!(record.header.payload_size, 4_147_200);
        assert_eq!(record.encoded_len(), 4_147_200 + VIDEO_HEADER_SIZE);

        let bytes = record.encode();
        let header = VideoRecordHeader::decode(&bytes).expect("Should decode");
        assert_eq!(header, record.header);
        // payload size field equals the bytes that follow
        assert_eq!(header.payload_size as usize, bytes.len() - VIDEO_HEADER_SIZE);
        assert_eq!(record_len(RegionKind::Video, &bytes), Some(bytes.len()));
        assert!(bytes[VIDEO_HEADER_SIZE..].iter().all(|b| *b == 0x80));
    }

    #[test]
    fn video_payload_is_cut_to_height_times_stride() {
        let data: Vec<u8> = (0..100u8).collect();
        let frame = VideoFrame {
            timestamp: -5,
            duration: 40,
            width: 4,
            height: 3,
            row_bytes: 8,
            no_input_source: false,
            data: &data,
        };
        let record = VideoRecord::new(&frame).expect("Should build");
        assert_eq!(record.payload.len(), 24);
        let bytes = record.encode();
        assert_eq!(bytes.len(), VIDEO_HEADER_SIZE + 24);
        assert_eq!(&bytes[VIDEO_HEADER_SIZE..], &data[..24]);
        let header = VideoRecordHeader::decode(&bytes).expect("Should decode");
        assert_eq!(header.timestamp, -5);
    }

    #[test]
    fn short_video_payload_is_rejected() {
        let data = vec![0u8; 10];
        let frame = VideoFrame {
            timestamp: 0,
            duration: 0,
            width: 4,
            height: 3,
            row_bytes: 8,
            no_input_source: false,
            data: &data,
        };
        match VideoRecord::new(&frame) {
            Err(Error::Payload {
                kind,
                expected,
                actual,
            }) => {
                assert_eq!(kind, RegionKind::Video);
                assert_eq!(expected, 24);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected {:?}", other),
        }

        let frame = VideoFrame {
            height: u32::MAX,
            row_bytes: 2,
            ..frame
        };
        assert!(matches!(VideoRecord::new(&frame), Err(Error::Overflow(_))));
    }

    #[test]
    fn audio_record() {
        let format = AudioFormat {
            sample_rate: 48_000,
            sample_depth: 16,
            channels: 2,
        };
        let data: Vec<u8> = (0..2000).map(|i| i as u8).collect();
        let packet = AudioPacket {
            timestamp: 48_000,
            sample_frame_count: 480,
            data: &data,
        };
        let record = AudioRecord::new(&packet, &format).expect("Should build");
        assert_eq!(record.header.payload_size, 480 * 2 * 2);

        let bytes = record.encode();
        assert_eq!(bytes.len(), AUDIO_HEADER_SIZE + 1920);
        let header = AudioRecordHeader::decode(&bytes).expect("Should decode");
        assert_eq!(header, record.header);
        assert_eq!(&bytes[AUDIO_HEADER_SIZE..], &data[..1920]);
        assert_eq!(record_len(RegionKind::Audio, &bytes), Some(bytes.len()));

        let short = AudioPacket {
            data: &data[..100],
            ..packet
        };
        assert!(matches!(
            AudioRecord::new(&short, &format),
            Err(Error::Payload { .. })
        ));
    }

    #[test]
    fn record_len_needs_header() {
        assert_eq!(record_len(RegionKind::Metadata, &[0u8; 10]), None);
        assert_eq!(
            record_len(RegionKind::Metadata, &[0u8; METADATA_RECORD_SIZE]),
            Some(METADATA_RECORD_SIZE)
        );
        assert_eq!(record_len(RegionKind::Video, &[0u8; VIDEO_HEADER_SIZE - 1]), None);
        assert_eq!(record_len(RegionKind::Audio, &[0u8; AUDIO_HEADER_SIZE]), Some(AUDIO_HEADER_SIZE));
    }
}
