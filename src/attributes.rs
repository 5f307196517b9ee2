/*
 * Scalar description of the stream being captured. The producer keeps one
 * immutable StreamAttributes snapshot and swaps in a new one on every format
 * change, frame writes read whichever snapshot is current.
 */

const fn fourcc(code: &[u8; 4]) -> u32 {
    return u32::from_be_bytes(*code);
}

/// Pixel format code as reported by the capture hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const YUV_8BIT: PixelFormat = PixelFormat(fourcc(b"2vuy"));
    pub const YUV_10BIT: PixelFormat = PixelFormat(fourcc(b"v210"));
    pub const ARGB_8BIT: PixelFormat = PixelFormat(32);
    pub const BGRA_8BIT: PixelFormat = PixelFormat(fourcc(b"BGRA"));
    pub const RGB_10BIT: PixelFormat = PixelFormat(fourcc(b"r210"));

    /// Selectable formats, indexed by the `video_format` setting.
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::YUV_8BIT,
        PixelFormat::YUV_10BIT,
        PixelFormat::ARGB_8BIT,
        PixelFormat::BGRA_8BIT,
        PixelFormat::RGB_10BIT,
    ];

    /// Bytes per row for a frame `width` pixels wide, None for unknown codes.
    pub fn row_bytes(&self, width: u32) -> Option<u32> {
        let width = width as u64;
        let bytes = match *self {
            PixelFormat::YUV_8BIT => width * 2,
            // 6 pixels per 16 bytes, rows padded to 128 bytes
            PixelFormat::YUV_10BIT => (width + 47) / 48 * 128,
            PixelFormat::ARGB_8BIT | PixelFormat::BGRA_8BIT => width * 4,
            // rows padded to 256 bytes
            PixelFormat::RGB_10BIT => (width + 63) / 64 * 256,
            _ => return None,
        };
        return u32::try_from(bytes).ok();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDominance(pub u32);

impl FieldDominance {
    pub const UNKNOWN: FieldDominance = FieldDominance(0);
    pub const LOWER_FIELD_FIRST: FieldDominance = FieldDominance(fourcc(b"lowr"));
    pub const UPPER_FIELD_FIRST: FieldDominance = FieldDominance(fourcc(b"uppr"));
    pub const PROGRESSIVE: FieldDominance = FieldDominance(fourcc(b"prog"));
    pub const PROGRESSIVE_SEGMENTED: FieldDominance = FieldDominance(fourcc(b"psf "));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    /// bits per sample
    pub sample_depth: u32,
    pub channels: u32,
}

impl AudioFormat {
    /// Bytes taken by one sample frame (one sample on every channel).
    pub fn bytes_per_sample_frame(&self) -> u32 {
        return self.channels * (self.sample_depth / 8);
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        return AudioFormat {
            sample_rate: 48_000,
            sample_depth: 16,
            channels: 2,
        };
    }
}

/// A video mode, what the capture source reports on a format change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMode {
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    /// frame duration in time scale units, frame rate is time_scale / frame_duration
    pub frame_duration: i64,
    pub time_scale: i64,
    pub field_dominance: FieldDominance,
}

impl DisplayMode {
    const fn new(
        name: &'static str,
        width: u32,
        height: u32,
        frame_duration: i64,
        time_scale: i64,
        field_dominance: FieldDominance,
    ) -> DisplayMode {
        return DisplayMode {
            name,
            width,
            height,
            frame_duration,
            time_scale,
            field_dominance,
        };
    }

    /// Modes selectable through the `video_mode` setting, in index order.
    pub fn standard_modes() -> &'static [DisplayMode] {
        return &STANDARD_MODES;
    }

    pub fn frames_per_second(&self) -> f64 {
        if self.frame_duration <= 0 {
            return 0.0;
        }
        return self.time_scale as f64 / self.frame_duration as f64;
    }
}

static STANDARD_MODES: [DisplayMode; 15] = [
    DisplayMode::new("NTSC", 720, 486, 1001, 30000, FieldDominance::LOWER_FIELD_FIRST),
    DisplayMode::new("PAL", 720, 576, 1000, 25000, FieldDominance::UPPER_FIELD_FIRST),
    DisplayMode::new("720p50", 1280, 720, 1000, 50000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("720p59.94", 1280, 720, 1001, 60000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("720p60", 1280, 720, 1000, 60000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080i50", 1920, 1080, 1000, 25000, FieldDominance::UPPER_FIELD_FIRST),
    DisplayMode::new("1080i59.94", 1920, 1080, 1001, 30000, FieldDominance::UPPER_FIELD_FIRST),
    DisplayMode::new("1080p23.98", 1920, 1080, 1001, 24000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080p24", 1920, 1080, 1000, 24000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080p25", 1920, 1080, 1000, 25000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080p29.97", 1920, 1080, 1001, 30000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080p30", 1920, 1080, 1000, 30000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("1080PsF25", 1920, 1080, 1000, 25000, FieldDominance::PROGRESSIVE_SEGMENTED),
    DisplayMode::new("2160p25", 3840, 2160, 1000, 25000, FieldDominance::PROGRESSIVE),
    DisplayMode::new("2160p30", 3840, 2160, 1000, 30000, FieldDominance::PROGRESSIVE),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAttributes {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_duration: i64,
    pub time_scale: i64,
    pub field_dominance: FieldDominance,
    pub audio: AudioFormat,
}

impl StreamAttributes {
    pub fn new(mode: &DisplayMode, pixel_format: PixelFormat, audio: AudioFormat) -> Self {
        return StreamAttributes {
            pixel_format: pixel_format,
            width: mode.width,
            height: mode.height,
            frame_duration: mode.frame_duration,
            time_scale: mode.time_scale,
            field_dominance: mode.field_dominance,
            audio: audio,
        };
    }

    /// Same pixel and audio format, video mode replaced.
    pub fn with_display_mode(&self, mode: &DisplayMode) -> Self {
        return StreamAttributes::new(mode, self.pixel_format, self.audio);
    }
}
