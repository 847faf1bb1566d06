//! Memory statistics from `/proc/meminfo` and `/proc/<pid>/status`.
//!
//! Both files use the `Key:   value kB` layout; keys are normalized by
//! stripping the trailing colon and the kB quantities are scaled to bytes in
//! the field handlers, so consumers never see kernel units.
//!
//! # Parsing assumptions
//!
//! - One key-value pair per line; the trailing `kB` unit token is ignored.
//! - Keys never repeat within one file.
//! - Unknown keys are skipped (`/proc/meminfo` carries dozens of fields this
//!   crate does not record).
//!
//! # Examples
//!
//! ```rust
//! use procwatch::procfs::stats::{KeyValueStat, MemInfo};
//!
//! let data = "MemTotal:       16384 kB\nMemFree:        4096 kB\nMemAvailable:   8192 kB\n";
//! let info = MemInfo::from_reader(&mut data.as_bytes()).unwrap();
//! assert_eq!(info.total_bytes, 16384 * 1024);
//! assert_eq!(info.available_bytes, 8192 * 1024);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use super::parser::KeyValueStat;

const KIB: u64 = 1024;

/// System-wide memory counters from `/proc/meminfo`, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemInfo {
    /// Total usable RAM.
    pub total_bytes: u64,
    /// Completely unused RAM.
    pub free_bytes: u64,
    /// Estimate of memory available for new workloads without swapping.
    pub available_bytes: u64,
    /// Temporary storage for raw block devices.
    pub buffers_bytes: u64,
    /// Page cache.
    pub cached_bytes: u64,
}

impl MemInfo {
    fn set_total(&mut self, kb: u64) {
        self.total_bytes = kb * KIB;
    }

    fn set_free(&mut self, kb: u64) {
        self.free_bytes = kb * KIB;
    }

    fn set_available(&mut self, kb: u64) {
        self.available_bytes = kb * KIB;
    }

    fn set_buffers(&mut self, kb: u64) {
        self.buffers_bytes = kb * KIB;
    }

    fn set_cached(&mut self, kb: u64) {
        self.cached_bytes = kb * KIB;
    }

    /// Memory considered in use: total minus available.
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    /// Used share of total memory, in percent. Zero when the total is zero.
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.used_bytes() as f64 / self.total_bytes as f64 * 100.0
    }
}

type MemInfoSetter = fn(&mut MemInfo, u64);

static MEMINFO_SETTERS: LazyLock<HashMap<&'static str, MemInfoSetter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, MemInfoSetter> = HashMap::with_capacity(5);

    m.insert("MemTotal", MemInfo::set_total);
    m.insert("MemFree", MemInfo::set_free);
    m.insert("MemAvailable", MemInfo::set_available);
    m.insert("Buffers", MemInfo::set_buffers);
    m.insert("Cached", MemInfo::set_cached);

    m
});

impl KeyValueStat for MemInfo {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_LINES: usize = 0;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &MEMINFO_SETTERS
    }

    #[inline]
    fn normalize_key(key: &str) -> &str {
        key.trim_end_matches(':')
    }
}

/// Memory footprint of one process from `/proc/<pid>/status`, in bytes.
///
/// Kernel threads carry no `Vm*` lines; parsing those yields all-zero
/// values rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessMemory {
    /// Resident set size (`VmRSS`).
    pub rss_bytes: u64,
    /// Virtual memory size (`VmSize`).
    pub vms_bytes: u64,
}

impl ProcessMemory {
    fn set_rss(&mut self, kb: u64) {
        self.rss_bytes = kb * KIB;
    }

    fn set_vms(&mut self, kb: u64) {
        self.vms_bytes = kb * KIB;
    }

    /// Resident share of total system memory, in percent.
    pub fn rss_percent(&self, total_bytes: u64) -> f64 {
        if total_bytes == 0 {
            return 0.0;
        }
        self.rss_bytes as f64 / total_bytes as f64 * 100.0
    }
}

type ProcessMemorySetter = fn(&mut ProcessMemory, u64);

static STATUS_SETTERS: LazyLock<HashMap<&'static str, ProcessMemorySetter>> =
    LazyLock::new(|| {
        let mut m: HashMap<&'static str, ProcessMemorySetter> = HashMap::with_capacity(2);

        m.insert("VmRSS", ProcessMemory::set_rss);
        m.insert("VmSize", ProcessMemory::set_vms);

        m
    });

impl KeyValueStat for ProcessMemory {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_LINES: usize = 0;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &STATUS_SETTERS
    }

    #[inline]
    fn normalize_key(key: &str) -> &str {
        key.trim_end_matches(':')
    }
}

/// System memory sample derived from one [`MemInfo`] reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SystemMemorySample {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f64,
}

impl From<MemInfo> for SystemMemorySample {
    fn from(info: MemInfo) -> Self {
        Self {
            total_bytes: info.total_bytes,
            used_bytes: info.used_bytes(),
            available_bytes: info.available_bytes,
            used_percent: info.used_percent(),
        }
    }
}

/// Process memory sample derived from one [`ProcessMemory`] reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessMemorySample {
    pub rss_bytes: u64,
    pub vms_bytes: u64,
    pub rss_percent: f64,
}
