//! Resolution of human-readable process names to live process ids.
//!
//! The locator walks the numeric entries of `/proc` once per resolution and
//! matches each process's `comm` name exactly. It is a read-only OS query
//! with a deterministic tie-break: pids are compared in ascending order (the
//! order procfs itself enumerates them in) and the first match wins, with
//! duplicate matches surfaced as a warning rather than silently overwritten.
//!
//! Note that `comm` is capped at 15 bytes by the kernel, so long binary
//! names must be given in their truncated form.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

mod error;

pub use error::{Error, Result};

/// A process identifier.
///
/// Plain integers make poor pids: `-1` looks valid but addresses every
/// process on the system. This newtype only ever holds an id that was
/// produced by enumeration or parsed as an unsigned value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(u32);

impl Pid {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u32>()
            .map(Pid)
            .map_err(|_| Error::InvalidPid(s.to_owned()))
    }
}

impl Borrow<u32> for Pid {
    fn borrow(&self) -> &u32 {
        &self.0
    }
}

/// A read-only view of the live processes under one proc root.
///
/// The root is a constructor parameter so tests can point the table at a
/// fake tree; production code uses [`ProcessTable::default`], which reads
/// `/proc`.
#[derive(Debug, Clone)]
pub struct ProcessTable {
    proc_root: PathBuf,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessTable {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    /// Resolves a process name to the pid of the first live process whose
    /// `comm` matches exactly.
    ///
    /// Enumerates the proc root once. Processes that vanish mid-walk are
    /// skipped. Multiple matches are legal (several instances of the same
    /// binary); the lowest pid wins and the ambiguity is logged.
    ///
    /// # Returns
    ///
    /// `Ok(Some(pid))` on a match, `Ok(None)` when no live process carries
    /// the name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Enumerate`] only when the proc root itself cannot
    /// be listed.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Pid>> {
        let entries = std::fs::read_dir(&self.proc_root).map_err(|source| Error::Enumerate {
            path: self.proc_root.clone(),
            source,
        })?;

        let mut matches: Vec<Pid> = Vec::new();
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(pid) = file_name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };

            // The process may exit between readdir and this read.
            let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) else {
                continue;
            };

            if comm.trim_end() == name {
                matches.push(Pid::new(pid));
            }
        }

        // readdir order is not guaranteed for arbitrary filesystems; sorting
        // pins the tie-break to ascending pid, which is what procfs
        // enumeration yields anyway.
        matches.sort_unstable();

        if matches.len() > 1 {
            log::warn!(
                "process name `{name}` matched {} live processes; using first match (pid {})",
                matches.len(),
                matches[0],
            );
        }

        Ok(matches.first().copied())
    }
}
