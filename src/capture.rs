/*
 * The producer side as seen by a capture source. The source calls into a
 * CaptureCallback from its own threads; ShmCapture turns every call into
 * records in the shared segment.
 */
use crate::attributes::{DisplayMode, StreamAttributes};
use crate::config::CaptureConfig;
use crate::error::Error;
use crate::layout::RegionKind;
use crate::record::{AudioRecord, MetadataRecord, VideoRecord};
use crate::write_segment::WriteSegment;
use log::{info, warn};
use std::sync::{Arc, PoisonError, RwLock};

/// One captured video frame, borrowed from the capture source for the
/// duration of the callback.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    /// stream time in time scale units
    pub timestamp: i64,
    pub duration: i64,
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    /// the hardware delivered a frame but sees no signal on its input
    pub no_input_source: bool,
    pub data: &'a [u8],
}

/// One captured audio packet, interleaved samples.
#[derive(Debug, Clone, Copy)]
pub struct AudioPacket<'a> {
    /// packet time in units of the sample rate
    pub timestamp: i64,
    pub sample_frame_count: u32,
    pub data: &'a [u8],
}

/// Events a capture source delivers. Both may be called concurrently from
/// different threads. The return value tells the source whether the event
/// was handled; a failed event is dropped, capture goes on.
pub trait CaptureCallback: Send + Sync {
    fn on_format_changed(&self, mode: &DisplayMode) -> bool;

    fn on_frame_arrived(&self, video: Option<&VideoFrame>, audio: Option<&AudioPacket>) -> bool;
}

pub struct ShmCapture {
    segment: WriteSegment,
    // replaced whole on a format change, never edited in place
    attributes: RwLock<Arc<StreamAttributes>>,
}

impl ShmCapture {
    /// Creates the segment described by `config` and publishes the initial
    /// stream metadata. Any failure here is fatal for the producer.
    pub fn start(config: &CaptureConfig) -> Result<ShmCapture, Error> {
        info!(
            "Capture instance {} (video connection {}, audio connection {}) into {} as {:?}",
            config.instance,
            config.video_connection,
            config.audio_connection,
            config.name,
            config.sync_mode
        );
        let layout = config.layout()?;
        let attributes = config.initial_attributes()?;
        let segment = WriteSegment::create(&config.name, layout, config.sync_mode)?;
        return ShmCapture::with_segment(segment, attributes);
    }

    pub fn with_segment(
        segment: WriteSegment,
        attributes: StreamAttributes,
    ) -> Result<ShmCapture, Error> {
        info!(
            "width: {}, height: {}, frameDuration: {}, timeScale: {}",
            attributes.width, attributes.height, attributes.frame_duration, attributes.time_scale
        );
        info!(
            "audioSampleRate: {}, audioSampleDepth: {}, audioChannels: {}",
            attributes.audio.sample_rate, attributes.audio.sample_depth, attributes.audio.channels
        );

        let capture = ShmCapture {
            segment: segment,
            attributes: RwLock::new(Arc::new(attributes)),
        };
        capture.write_metadata(&capture.attributes())?;
        return Ok(capture);
    }

    pub fn segment(&self) -> &WriteSegment {
        return &self.segment;
    }

    /// The current attribute snapshot.
    pub fn attributes(&self) -> Arc<StreamAttributes> {
        return self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
    }

    fn write_metadata(&self, attributes: &StreamAttributes) -> Result<(), Error> {
        let _guard = self.segment.begin_event()?;
        self.segment
            .publish(RegionKind::Metadata, &MetadataRecord::from(attributes));
        return Ok(());
    }

    fn format_changed(&self, mode: &DisplayMode) -> Result<(), Error> {
        // held across the publish so the newest metadata record always
        // matches the snapshot that wins
        let mut current = self
            .attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let next = current.with_display_mode(mode);
        self.write_metadata(&next)?;
        info!(
            "Format changed to {}: {}x{}, frameDuration: {}, timeScale: {}",
            mode.name, next.width, next.height, next.frame_duration, next.time_scale
        );
        *current = Arc::new(next);
        return Ok(());
    }

    fn frame_arrived(
        &self,
        video: Option<&VideoFrame>,
        audio: Option<&AudioPacket>,
    ) -> Result<(), Error> {
        let video = video.filter(|frame| !frame.no_input_source);
        if video.is_none() && audio.is_none() {
            return Ok(());
        }

        // build both records before taking the lock, a bad payload must not
        // leave the other record half published
        let video_record = video.map(VideoRecord::new).transpose()?;
        let attributes = self.attributes();
        let audio_record = audio
            .map(|packet| AudioRecord::new(packet, &attributes.audio))
            .transpose()?;

        let _guard = self.segment.begin_event()?;
        if let Some(record) = &video_record {
            self.segment.publish(RegionKind::Video, record);
        }
        if let Some(record) = &audio_record {
            self.segment.publish(RegionKind::Audio, record);
        }
        return Ok(());
    }
}

impl CaptureCallback for ShmCapture {
    fn on_format_changed(&self, mode: &DisplayMode) -> bool {
        return match self.format_changed(mode) {
            Ok(()) => true,
            Err(err) => {
                warn!("Dropping format change: {}", err);
                false
            }
        };
    }

    fn on_frame_arrived(&self, video: Option<&VideoFrame>, audio: Option<&AudioPacket>) -> bool {
        return match self.frame_arrived(video, audio) {
            Ok(()) => true,
            Err(err) => {
                warn!("Dropping frame: {}", err);
                false
            }
        };
    }
}
