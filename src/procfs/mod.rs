//! Resource sampling from the proc filesystem.
//!
//! This module turns procfs files into typed, timestamped readings of the
//! four resource classes the monitor knows about (CPU, memory, disk I/O,
//! network I/O), for the whole system or for one process.
//!
//! # Monitored sources
//!
//! - `/proc/stat` and `/proc/<pid>/stat` for CPU time counters
//! - `/proc/meminfo` and `/proc/<pid>/status` for memory usage
//! - `/proc/diskstats` and `/proc/<pid>/io` for block I/O
//! - `/proc/net/dev` for network traffic (system scope only)
//!
//! # Key components
//!
//! - [`stats`]: parsers producing typed stat structs, plus the [`Sample`]
//!   record type.
//! - [`KindSampler`]: one open-once, read-per-tick sampler per monitored
//!   resource kind.
//!
//! # Platform requirements
//!
//! Linux with a readable proc filesystem. Reading `/proc/<pid>/io` of a
//! foreign process additionally needs ptrace-level access.
//!
//! [`Sample`]: stats::Sample

mod sampler;
pub mod stats;
mod utils;

pub use sampler::{DEFAULT_CPU_WINDOW, KindSampler, SampleError, Target};
