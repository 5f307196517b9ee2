use log::{error, info};
use shm_capture::{CaptureConfig, PixelFormat, ReadSegment};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("usage: {} <name> [config.toml]", args[0]);
        std::process::exit(2);
    }

    // a publisher started with a config file may have moved the region
    // boundaries, the same file tells us where they are
    let opened = match args.get(2) {
        Some(path) => match CaptureConfig::load(path.as_str()) {
            Ok(config) => config
                .layout()
                .and_then(|layout| ReadSegment::open_with_layout(&args[1], layout)),
            Err(err) => {
                error!("Failed to load {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => ReadSegment::open(&args[1]),
    };
    let segment = match opened {
        Ok(segment) => segment,
        Err(err) => {
            error!("Failed to open {}: {}", args[1], err);
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed)) {
        error!("Failed to install ctrl-c handler: {}", err);
        std::process::exit(1);
    }

    while !stop.load(Ordering::Relaxed) {
        match segment.latest_metadata() {
            Ok(Some(metadata)) => info!(
                "metadata: {}x{} {:?} {}/{}, audio {} Hz {} bit {} channels",
                metadata.width,
                metadata.height,
                PixelFormat(metadata.pixel_format),
                metadata.frame_duration,
                metadata.time_scale,
                metadata.audio_sample_rate,
                metadata.audio_sample_depth,
                metadata.audio_channels
            ),
            Ok(None) => info!("No metadata yet"),
            Err(err) => error!("Reading metadata: {}", err),
        }
        match segment.latest_video() {
            Ok(Some(video)) => info!(
                "video: {}x{} stride {} at {}, crc {:08x}",
                video.header.width,
                video.header.height,
                video.header.stride,
                video.header.timestamp,
                video.checksum()
            ),
            Ok(None) => info!("No video yet"),
            Err(err) => error!("Reading video: {}", err),
        }
        match segment.latest_audio() {
            Ok(Some(audio)) => info!(
                "audio: {} sample frames at {}, crc {:08x}",
                audio.header.sample_frame_count,
                audio.header.timestamp,
                audio.checksum()
            ),
            Ok(None) => info!("No audio yet"),
            Err(err) => error!("Reading audio: {}", err),
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
