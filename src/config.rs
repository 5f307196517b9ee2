use crate::attributes::{AudioFormat, DisplayMode, PixelFormat, StreamAttributes};
use crate::error::Error;
use crate::layout::Layout;
use crate::write_segment::SyncMode;
use serde::Deserialize;
use std::path::Path;

/// Everything the producer needs, resolved before the segment is created.
#[derive(Deserialize, Debug, Clone)]
pub struct CaptureConfig {
    /// shared memory name, the semaphore is `<name>_sem`
    pub name: String,
    #[serde(default)]
    pub instance: u32,
    /// index into `DisplayMode::standard_modes()`
    #[serde(default)]
    pub video_mode: usize,
    #[serde(default)]
    pub video_connection: u32,
    /// index into `PixelFormat::ALL`
    #[serde(default)]
    pub video_format: usize,
    #[serde(default)]
    pub audio_connection: u32,
    #[serde(default = "defaults::memory_size")]
    pub memory_size: usize,
    #[serde(default = "defaults::metadata_size")]
    pub metadata_size: usize,
    /// defaults to 5/8 of `memory_size`
    #[serde(default)]
    pub video_size: Option<usize>,
    #[serde(default)]
    pub sync_mode: SyncMode,
    #[serde(default = "defaults::audio_sample_rate")]
    pub audio_sample_rate: u32,
    #[serde(default = "defaults::audio_sample_depth")]
    pub audio_sample_depth: u32,
    #[serde(default = "defaults::audio_channels")]
    pub audio_channels: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Invalid(String),
}

mod defaults {
    use crate::constants::{DEFAULT_MEMORY_SIZE, METADATA_REGION_SIZE};

    pub fn memory_size() -> usize {
        return DEFAULT_MEMORY_SIZE;
    }

    pub fn metadata_size() -> usize {
        return METADATA_REGION_SIZE;
    }

    pub fn audio_sample_rate() -> u32 {
        return 48_000;
    }

    pub fn audio_sample_depth() -> u32 {
        return 16;
    }

    pub fn audio_channels() -> u32 {
        return 2;
    }
}

impl CaptureConfig {
    /// Defaults for everything but the name.
    pub fn new(name: &str) -> Self {
        return CaptureConfig {
            name: name.to_string(),
            instance: 0,
            video_mode: 0,
            video_connection: 0,
            video_format: 0,
            audio_connection: 0,
            memory_size: defaults::memory_size(),
            metadata_size: defaults::metadata_size(),
            video_size: None,
            sync_mode: SyncMode::default(),
            audio_sample_rate: defaults::audio_sample_rate(),
            audio_sample_depth: defaults::audio_sample_depth(),
            audio_channels: defaults::audio_channels(),
        };
    }

    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        return CaptureConfig::parse(&toml_to_str);
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: CaptureConfig = toml::from_str(toml_str)?;
        return Ok(config);
    }

    /// Region layout, checked here so a bad size fails at startup.
    pub fn layout(&self) -> Result<Layout, Error> {
        return match self.video_size {
            Some(video_size) => {
                Layout::with_sizes(self.memory_size, self.metadata_size, video_size)
            }
            None => {
                let planned = Layout::plan(self.memory_size)?;
                Layout::with_sizes(self.memory_size, self.metadata_size, planned.video.size)
            }
        };
    }

    pub fn audio_format(&self) -> Result<AudioFormat, ConfigError> {
        if self.audio_sample_depth == 0 || self.audio_sample_depth % 8 != 0 {
            return Err(ConfigError::Invalid(format!(
                "audio sample depth must be a whole number of bytes, got {} bits",
                self.audio_sample_depth
            )));
        }
        if self.audio_channels == 0 || self.audio_sample_rate == 0 {
            return Err(ConfigError::Invalid(String::from(
                "audio needs at least one channel and a sample rate",
            )));
        }
        return Ok(AudioFormat {
            sample_rate: self.audio_sample_rate,
            sample_depth: self.audio_sample_depth,
            channels: self.audio_channels,
        });
    }

    pub fn display_mode(&self) -> Result<&'static DisplayMode, ConfigError> {
        let modes = DisplayMode::standard_modes();
        return modes.get(self.video_mode).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "video mode {} does not exist, there are {} modes",
                self.video_mode,
                modes.len()
            ))
        });
    }

    pub fn pixel_format(&self) -> Result<PixelFormat, ConfigError> {
        return PixelFormat::ALL
            .get(self.video_format)
            .copied()
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "video format {} does not exist, there are {} formats",
                    self.video_format,
                    PixelFormat::ALL.len()
                ))
            });
    }

    /// Stream attributes to publish before the first format change arrives.
    pub fn initial_attributes(&self) -> Result<StreamAttributes, ConfigError> {
        return Ok(StreamAttributes::new(
            self.display_mode()?,
            self.pixel_format()?,
            self.audio_format()?,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::FieldDominance;

    #[test]
    fn defaults_from_name_only() {
        let config = CaptureConfig::parse("name = \"capture\"").expect("Should parse");
        assert_eq!(config.name, "capture");
        assert_eq!(config.memory_size, 64 * 1024 * 1024);
        assert_eq!(config.metadata_size, 128);
        assert_eq!(config.sync_mode, SyncMode::LockFree);
        assert_eq!(config.video_size, None);

        let layout = config.layout().expect("Should plan");
        assert_eq!(layout.video.size, 40 * 1024 * 1024);

        let attributes = config.initial_attributes().expect("Should resolve");
        assert_eq!(attributes.width, 720);
        assert_eq!(attributes.height, 486);
        assert_eq!(attributes.field_dominance, FieldDominance::LOWER_FIELD_FIRST);
        assert_eq!(attributes.pixel_format, PixelFormat::YUV_8BIT);
        assert_eq!(attributes.audio, AudioFormat::default());
    }

    #[test]
    fn full_config() {
        let config = CaptureConfig::parse(
            r#"
            name = "studio"
            instance = 1
            video_mode = 9
            video_connection = 2
            video_format = 1
            audio_connection = 1
            memory_size = 134217728
            metadata_size = 256
            video_size = 83886080
            sync_mode = "semaphore"
            audio_sample_rate = 48000
            audio_sample_depth = 32
            audio_channels = 8
            "#,
        )
        .expect("Should parse");
        assert_eq!(config.instance, 1);
        assert_eq!(config.sync_mode, SyncMode::Semaphore);

        let layout = config.layout().expect("Should plan");
        assert_eq!(layout.metadata.size, 256);
        assert_eq!(layout.video.size, 80 * 1024 * 1024);
        assert_eq!(layout.audio.end(), 128 * 1024 * 1024);

        let attributes = config.initial_attributes().expect("Should resolve");
        assert_eq!(attributes.width, 1920);
        assert_eq!(attributes.time_scale, 25000);
        assert_eq!(attributes.pixel_format, PixelFormat::YUV_10BIT);
        assert_eq!(attributes.audio.channels, 8);
        assert_eq!(attributes.audio.sample_depth, 32);
    }

    #[test]
    fn rejects_bad_values() {
        CaptureConfig::parse("name = \"x\"\nsync_mode = \"spinlock\"").expect_err("Unknown mode");
        CaptureConfig::parse("video_mode = 1").expect_err("Name is required");

        let mut config = CaptureConfig::new("x");
        config.video_mode = 1000;
        config.initial_attributes().expect_err("No such mode");

        let mut config = CaptureConfig::new("x");
        config.video_format = PixelFormat::ALL.len();
        config.initial_attributes().expect_err("No such format");

        let mut config = CaptureConfig::new("x");
        config.audio_sample_depth = 12;
        config.initial_attributes().expect_err("Partial bytes");

        let mut config = CaptureConfig::new("x");
        config.memory_size = 1024;
        config.layout().expect_err("Too small");
    }

    #[test]
    fn missing_file() {
        match CaptureConfig::load("/nonexistent/shm_capture.toml") {
            Err(ConfigError::Read { path, .. }) => {
                assert_eq!(path, "/nonexistent/shm_capture.toml")
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
