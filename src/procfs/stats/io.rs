//! Per-process I/O counters from `/proc/<pid>/io`.
//!
//! The file is a plain `key: value` listing. The monitor records the
//! storage-backed byte counters (`read_bytes`/`write_bytes`) together with
//! the read/write syscall counts; `rchar`/`wchar` are deliberately not used
//! since they include tty and pipe traffic.
//!
//! Reading this file for a foreign process requires ptrace-level access;
//! a permission error surfaces to the sampler as an unavailable resource.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::disk::DiskIoStat;
use super::parser::KeyValueStat;

/// I/O counters of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessIoStat {
    /// Read syscalls issued (`syscr`).
    pub read_ops: u64,
    /// Write syscalls issued (`syscw`).
    pub write_ops: u64,
    /// Bytes fetched from the storage layer.
    pub read_bytes: u64,
    /// Bytes sent to the storage layer.
    pub write_bytes: u64,
}

impl ProcessIoStat {
    fn set_read_ops(&mut self, v: u64) {
        self.read_ops = v;
    }

    fn set_write_ops(&mut self, v: u64) {
        self.write_ops = v;
    }

    fn set_read_bytes(&mut self, v: u64) {
        self.read_bytes = v;
    }

    fn set_write_bytes(&mut self, v: u64) {
        self.write_bytes = v;
    }
}

impl From<ProcessIoStat> for DiskIoStat {
    fn from(io: ProcessIoStat) -> Self {
        DiskIoStat {
            read_ops: io.read_ops,
            write_ops: io.write_ops,
            read_bytes: io.read_bytes,
            write_bytes: io.write_bytes,
        }
    }
}

type Setter = fn(&mut ProcessIoStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(4);

    m.insert("syscr", ProcessIoStat::set_read_ops);
    m.insert("syscw", ProcessIoStat::set_write_ops);
    m.insert("read_bytes", ProcessIoStat::set_read_bytes);
    m.insert("write_bytes", ProcessIoStat::set_write_bytes);

    m
});

impl KeyValueStat for ProcessIoStat {
    const SPLIT_CHAR: Option<char> = None;
    const SKIP_LINES: usize = 0;
    const SKIP_VALUES: usize = 0;
    const ALLOW_DUPLICATE_KEYS: bool = false;
    const ALLOW_MULTIPLE_KV_PER_LINE: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }

    #[inline]
    fn normalize_key(key: &str) -> &str {
        key.trim_end_matches(':')
    }
}
