use std::path::PathBuf;

use crate::config::ConfigError;
use crate::procfs::SampleError;

/// Why a session never reached the running state.
///
/// Everything here happens before the first tick: configuration
/// validation, process resolution, sampler setup and sink creation.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no live process named `{0}`")]
    Resolution(String),

    #[error("process resolution failed: {0}")]
    Locator(#[from] crate::process::Error),

    #[error("failed to open sampler: {0}")]
    Sampler(#[from] SampleError),

    #[error("failed to create record sink: {0}")]
    Sink(#[from] crate::recorder::Error),

    #[error("failed to create record directory `{path}`: {source}")]
    RecordDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
