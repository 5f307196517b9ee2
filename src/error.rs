use crate::layout::RegionKind;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid segment name '{0}'")]
    InvalidName(String),

    #[error("failed to create shared memory '{name}'")]
    Create {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open shared memory '{name}'")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to resize shared memory '{name}' to {n_bytes} bytes")]
    Truncate {
        name: String,
        n_bytes: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to map shared memory '{name}'")]
    Map {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open semaphore '{name}'")]
    Semaphore {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to acquire semaphore '{name}'")]
    Acquire {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration")]
    Config(#[from] crate::config::ConfigError),

    #[error("invalid layout: {0}")]
    Layout(String),

    #[error("{kind} payload holds {actual} bytes but the record needs {expected}")]
    Payload {
        kind: RegionKind,
        expected: usize,
        actual: usize,
    },

    #[error("{0} does not fit a 32 bit record field")]
    Overflow(&'static str),
}
