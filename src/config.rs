//! The monitoring configuration surface.
//!
//! A [`MonitorConfig`] describes one session: what to monitor (scope,
//! target process, resource kinds), how often (interval, CPU window), for
//! how long (duration or unbounded) and how tolerant the recorder is of
//! write failures. Configurations are plain data deserialized from JSON;
//! [`MonitorConfig::validate`] is the gate every config passes before a
//! session may start, so scheduling code never sees an unusable setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::procfs::DEFAULT_CPU_WINDOW;
use crate::procfs::stats::{ResourceKind, Scope};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    /// Name of the target process. Required for process scope, unused for
    /// system scope.
    pub process_name: Option<String>,
    /// Whether to monitor the whole system or one process.
    pub scope: Scope,
    /// Resource classes to sample each tick.
    pub resource_kinds: Vec<ResourceKind>,
    /// Sampling period in seconds.
    pub interval_seconds: f64,
    /// Total monitoring length in seconds; `None` monitors until stopped.
    pub duration_seconds: Option<f64>,
    /// Length of the CPU utilization measurement window in milliseconds.
    pub cpu_window_ms: u64,
    /// Consecutive record write failures tolerated before the session is
    /// force-stopped.
    pub record_failure_threshold: u32,
    /// Directory receiving the per-session record streams.
    pub record_dir: PathBuf,
    /// Root of the proc filesystem.
    pub proc_root: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            process_name: None,
            scope: Scope::System,
            resource_kinds: ResourceKind::ALL.to_vec(),
            interval_seconds: 1.0,
            duration_seconds: None,
            cpu_window_ms: DEFAULT_CPU_WINDOW.as_millis() as u64,
            record_failure_threshold: 3,
            record_dir: PathBuf::from("records"),
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl MonitorConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] when the
    /// file cannot be read or decoded. The result is not yet validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Checks the configuration for contradictions and unsupported
    /// requests.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found. A configuration that
    /// passes can be handed to the session controller without further
    /// checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.interval_seconds.is_finite() || self.interval_seconds <= 0.0 {
            return Err(ConfigError::NonPositiveInterval(self.interval_seconds));
        }
        if let Some(duration) = self.duration_seconds {
            if !duration.is_finite() || duration <= 0.0 {
                return Err(ConfigError::NonPositiveDuration(duration));
            }
        }

        if self.resource_kinds.is_empty() {
            return Err(ConfigError::NoResourceKinds);
        }
        for (idx, kind) in self.resource_kinds.iter().enumerate() {
            if self.resource_kinds[..idx].contains(kind) {
                return Err(ConfigError::DuplicateResourceKind(*kind));
            }
        }

        if self.resource_kinds.contains(&ResourceKind::Cpu) {
            if self.cpu_window_ms == 0 {
                return Err(ConfigError::ZeroCpuWindow);
            }
            if self.cpu_window_ms as f64 / 1000.0 >= self.interval_seconds {
                return Err(ConfigError::WindowExceedsInterval {
                    window_ms: self.cpu_window_ms,
                    interval_seconds: self.interval_seconds,
                });
            }
        }

        if self.record_failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }

        if self.scope == Scope::Process {
            match self.process_name.as_deref() {
                Some(name) if !name.is_empty() => {}
                _ => return Err(ConfigError::MissingProcessName),
            }
            if self.resource_kinds.contains(&ResourceKind::NetworkIo) {
                return Err(ConfigError::UnsupportedMetric {
                    kind: ResourceKind::NetworkIo,
                    scope: Scope::Process,
                });
            }
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.interval_seconds)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_seconds.map(Duration::from_secs_f64)
    }

    pub fn cpu_window(&self) -> Duration {
        Duration::from_millis(self.cpu_window_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("sampling interval must be positive, got {0}")]
    NonPositiveInterval(f64),

    #[error("monitoring duration must be positive, got {0}")]
    NonPositiveDuration(f64),

    #[error("no resource kinds selected")]
    NoResourceKinds,

    #[error("resource kind {0} listed more than once")]
    DuplicateResourceKind(ResourceKind),

    #[error("cpu measurement window must be positive")]
    ZeroCpuWindow,

    #[error(
        "cpu measurement window ({window_ms} ms) must be shorter than the sampling interval ({interval_seconds} s)"
    )]
    WindowExceedsInterval {
        window_ms: u64,
        interval_seconds: f64,
    },

    #[error("record failure threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("process scope requires a process name")]
    MissingProcessName,

    #[error("{kind} metrics are not available under {scope} scope")]
    UnsupportedMetric { kind: ResourceKind, scope: Scope },

    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
