/*
 * Stand-in capture source: scrolling bands for video and a tone for audio,
 * delivered on two threads at the pace real hardware would deliver them.
 */
use crate::attributes::{AudioFormat, DisplayMode, PixelFormat};
use crate::capture::{AudioPacket, CaptureCallback, VideoFrame};
use crate::config::{CaptureConfig, ConfigError};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

// audio packets are delivered every 10 ms
const AUDIO_PACKETS_PER_SECOND: u32 = 100;
const TONE_HZ: f64 = 1000.0;

pub struct SyntheticSource {
    mode: DisplayMode,
    pixel_format: PixelFormat,
    audio: AudioFormat,
}

fn pace(next: &mut Instant, period: Duration) {
    *next += period;
    let now = Instant::now();
    if *next > now {
        std::thread::sleep(*next - now);
    } else {
        // fell behind, don't burst to catch up
        *next = now;
    }
}

impl SyntheticSource {
    pub fn new(mode: &DisplayMode, pixel_format: PixelFormat, audio: AudioFormat) -> Self {
        return SyntheticSource {
            mode: mode.clone(),
            pixel_format: pixel_format,
            audio: audio,
        };
    }

    /// Generates the mode and formats `config` selects.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, ConfigError> {
        return Ok(SyntheticSource::new(
            config.display_mode()?,
            config.pixel_format()?,
            config.audio_format()?,
        ));
    }

    /// Announces the display mode, then delivers video and audio until `stop`
    /// is set.
    pub fn run<C: CaptureCallback + ?Sized>(&self, callback: &C, stop: &AtomicBool) {
        info!(
            "Synthetic source running {} at {:.2} fps",
            self.mode.name,
            self.mode.frames_per_second()
        );
        if !callback.on_format_changed(&self.mode) {
            warn!("Format change to {} was not accepted", self.mode.name);
        }
        std::thread::scope(|scope| {
            scope.spawn(|| self.run_video(callback, stop));
            scope.spawn(|| self.run_audio(callback, stop));
        });
    }

    fn run_video<C: CaptureCallback + ?Sized>(&self, callback: &C, stop: &AtomicBool) {
        let row_bytes = match self.pixel_format.row_bytes(self.mode.width) {
            Some(row_bytes) => row_bytes,
            None => {
                warn!("No row size for pixel format {:#x}", self.pixel_format.0);
                return;
            }
        };
        if self.mode.frame_duration <= 0 || self.mode.time_scale <= 0 {
            warn!("Display mode {} has no frame rate", self.mode.name);
            return;
        }
        let period = Duration::from_secs_f64(
            self.mode.frame_duration as f64 / self.mode.time_scale as f64,
        );

        let mut data = vec![0u8; self.mode.height as usize * row_bytes as usize];
        let mut next = Instant::now();
        let mut index: i64 = 0;
        while !stop.load(Ordering::Relaxed) {
            for (y, row) in data.chunks_mut(row_bytes as usize).enumerate() {
                row.fill(((y as i64 + index * 8) & 0xff) as u8);
            }
            let frame = VideoFrame {
                timestamp: index * self.mode.frame_duration,
                duration: self.mode.frame_duration,
                width: self.mode.width,
                height: self.mode.height,
                row_bytes: row_bytes,
                no_input_source: false,
                data: &data,
            };
            if !callback.on_frame_arrived(Some(&frame), None) {
                debug!("Video frame {} was dropped", index);
            }
            index += 1;
            pace(&mut next, period);
        }
    }

    fn run_audio<C: CaptureCallback + ?Sized>(&self, callback: &C, stop: &AtomicBool) {
        let sample_bytes = (self.audio.sample_depth / 8) as usize;
        let frames = self.audio.sample_rate / AUDIO_PACKETS_PER_SECOND;
        if sample_bytes == 0 || sample_bytes > 8 || frames == 0 || self.audio.channels == 0 {
            warn!("Audio format {:?} cannot be generated", self.audio);
            return;
        }
        let period = Duration::from_secs(1) / AUDIO_PACKETS_PER_SECOND;
        let amplitude = ((1i64 << (self.audio.sample_depth.min(32) - 1)) - 1) as f64 / 4.0;

        let mut data = vec![0u8; frames as usize * self.audio.bytes_per_sample_frame() as usize];
        let mut next = Instant::now();
        let mut timestamp: i64 = 0;
        while !stop.load(Ordering::Relaxed) {
            let sample_frame_size = sample_bytes * self.audio.channels as usize;
            for (i, sample_frame) in data.chunks_mut(sample_frame_size).enumerate() {
                let t = (timestamp + i as i64) as f64 / self.audio.sample_rate as f64;
                let value = (amplitude * (2.0 * std::f64::consts::PI * TONE_HZ * t).sin()) as i64;
                let bytes = value.to_le_bytes();
                for sample in sample_frame.chunks_mut(sample_bytes) {
                    sample.copy_from_slice(&bytes[..sample.len()]);
                }
            }
            let packet = AudioPacket {
                timestamp: timestamp,
                sample_frame_count: frames,
                data: &data,
            };
            if !callback.on_frame_arrived(None, Some(&packet)) {
                debug!("Audio packet at {} was dropped", timestamp);
            }
            timestamp += frames as i64;
            pace(&mut next, period);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ShmCapture;
    use crate::read_segment::ReadSegment;
    use crate::utils::unique_name;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    struct Recorder<'a> {
        stop: &'a AtomicBool,
        formats: AtomicUsize,
        video: Mutex<Vec<(i64, u32, usize)>>,
        audio: Mutex<Vec<(i64, u32, usize)>>,
    }

    impl Recorder<'_> {
        fn check_done(&self) {
            let video = self.video.lock().unwrap().len();
            let audio = self.audio.lock().unwrap().len();
            if video >= 3 && audio >= 3 {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    impl CaptureCallback for Recorder<'_> {
        fn on_format_changed(&self, _mode: &DisplayMode) -> bool {
            self.formats.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        fn on_frame_arrived(&self, video: Option<&VideoFrame>, audio: Option<&AudioPacket>) -> bool {
            // the two streams arrive on separate notifications
            assert!(video.is_some() != audio.is_some());
            if let Some(frame) = video {
                self.video
                    .lock()
                    .unwrap()
                    .push((frame.timestamp, frame.row_bytes, frame.data.len()));
            }
            if let Some(packet) = audio {
                self.audio.lock().unwrap().push((
                    packet.timestamp,
                    packet.sample_frame_count,
                    packet.data.len(),
                ));
            }
            self.check_done();
            return true;
        }
    }

    #[test]
    fn delivers_both_streams_until_stopped() {
        init();
        let pal = &DisplayMode::standard_modes()[1];
        let source = SyntheticSource::new(pal, PixelFormat::YUV_8BIT, AudioFormat::default());
        let stop = AtomicBool::new(false);
        let recorder = Recorder {
            stop: &stop,
            formats: AtomicUsize::new(0),
            video: Mutex::new(vec![]),
            audio: Mutex::new(vec![]),
        };
        source.run(&recorder, &stop);

        assert_eq!(recorder.formats.load(Ordering::Relaxed), 1);
        let video = recorder.video.lock().unwrap();
        assert!(video.len() >= 3);
        for (i, (timestamp, row_bytes, len)) in video.iter().enumerate() {
            assert_eq!(*timestamp, i as i64 * 1000);
            assert_eq!(*row_bytes, 1440);
            assert_eq!(*len, 576 * 1440);
        }
        let audio = recorder.audio.lock().unwrap();
        assert!(audio.len() >= 3);
        for (i, (timestamp, frames, len)) in audio.iter().enumerate() {
            assert_eq!(*timestamp, i as i64 * 480);
            assert_eq!(*frames, 480);
            assert_eq!(*len, 480 * 4);
        }
    }

    #[test]
    fn drives_capture_into_segment() {
        init();
        let mut config = CaptureConfig::new(&unique_name("synthetic"));
        config.memory_size = 16 * 1024 * 1024;
        config.video_mode = 1;
        let capture = ShmCapture::start(&config).expect("Should start");
        let source = SyntheticSource::from_config(&config).expect("Should resolve");

        let stop = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| source.run(&capture, &stop));
            std::thread::sleep(Duration::from_millis(200));
            stop.store(true, Ordering::Relaxed);
        });

        let reader = ReadSegment::open(&config.name).expect("Should open");
        let metadata = reader
            .latest_metadata()
            .expect("Should read")
            .expect("Should have metadata");
        assert_eq!(metadata.width, 720);
        assert_eq!(metadata.height, 576);

        let video = reader
            .latest_video()
            .expect("Should read")
            .expect("Should have video");
        assert_eq!(video.header.height, 576);
        assert_eq!(video.header.stride, 1440);
        assert_eq!(video.data.len(), 576 * 1440);

        let audio = reader
            .latest_audio()
            .expect("Should read")
            .expect("Should have audio");
        assert_eq!(audio.header.sample_frame_count, 480);
        assert_eq!(audio.data.len(), 480 * 4);
    }
}
