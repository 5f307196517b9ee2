use log::{error, info};
use shm_capture::{CaptureConfig, ShmCapture, SyntheticSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("usage: {} <name> [config.toml]", args[0]);
        std::process::exit(2);
    }

    let config = match args.get(2) {
        Some(path) => match CaptureConfig::load(path.as_str()) {
            Ok(mut config) => {
                config.name = args[1].clone();
                config
            }
            Err(err) => {
                error!("Failed to load {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => CaptureConfig::new(&args[1]),
    };

    let capture = match ShmCapture::start(&config) {
        Ok(capture) => capture,
        Err(err) => {
            error!("Failed to start capture: {}", err);
            std::process::exit(1);
        }
    };

    let source = match SyntheticSource::from_config(&config) {
        Ok(source) => source,
        Err(err) => {
            error!("Failed to set up the synthetic source: {}", err);
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_stop.store(true, Ordering::Relaxed)) {
        error!("Failed to install ctrl-c handler: {}", err);
        std::process::exit(1);
    }

    source.run(&capture, &stop);
    info!("Stopping capture");
}
