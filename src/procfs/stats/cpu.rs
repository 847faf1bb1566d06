//! CPU time counters from `/proc/stat` and `/proc/<pid>/stat`.
//!
//! Both files expose monotonically increasing time counters, not rates. A
//! usable utilization percentage therefore always needs two reads separated
//! by a measurement window; [`CpuTimes::percent_since`] and
//! [`ProcessCpuTimes::percent_over`] compute the percentages from such a
//! pair of readings.
//!
//! # Parsing assumptions
//!
//! - The first line of `/proc/stat` is the aggregate `cpu` line with
//!   positional jiffy counters (user, nice, system, idle, iowait, irq,
//!   softirq, steal). Trailing counters absent on older kernels default to
//!   zero.
//! - `/proc/<pid>/stat` is a single record whose second field (`comm`) may
//!   contain spaces and parentheses; fields are located relative to the
//!   *last* closing parenthesis.

use std::io::BufRead;
use std::time::Duration;

use super::parser::SingleLineStat;
use super::StatParseError;

/// Userspace clock tick rate (`USER_HZ`). Linux reports 100 to userspace on
/// every supported architecture.
pub const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// Aggregate CPU jiffy counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    /// Time spent in user mode.
    pub user: u64,
    /// Time spent in user mode with low priority.
    pub nice: u64,
    /// Time spent in kernel mode.
    pub system: u64,
    /// Idle time.
    pub idle: u64,
    /// Time waiting for I/O completion.
    pub iowait: u64,
    /// Time servicing hardware interrupts.
    pub irq: u64,
    /// Time servicing soft interrupts.
    pub softirq: u64,
    /// Involuntary wait while running virtualized.
    pub steal: u64,
}

impl CpuTimes {
    /// Sum of all counted jiffies.
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Jiffies spent doing anything but idling or waiting for I/O.
    pub fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    /// Computes utilization percentages for the interval between `prev` and
    /// `self`.
    ///
    /// Returns an all-zero sample when no time elapsed between the readings
    /// (or the counters went backwards, which procfs does not do).
    pub fn percent_since(&self, prev: &CpuTimes) -> CpuSample {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return CpuSample::default();
        }

        let pct = |delta: u64| delta as f64 / total_delta as f64 * 100.0;
        CpuSample {
            total_percent: pct(self.busy().saturating_sub(prev.busy())),
            user_percent: pct((self.user + self.nice).saturating_sub(prev.user + prev.nice)),
            system_percent: pct(
                (self.system + self.irq + self.softirq)
                    .saturating_sub(prev.system + prev.irq + prev.softirq),
            ),
        }
    }
}

impl SingleLineStat for CpuTimes {
    /// Parses the aggregate `cpu` line of `/proc/stat`.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::MalformedLine`] if the first token is not
    /// `cpu`, or [`StatParseError::InvalidValue`] if a counter is not
    /// numeric.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;

        let mut parts = line.split_whitespace();
        if parts.next() != Some("cpu") {
            return Err(StatParseError::MalformedLine {
                content: line.trim_end().to_string(),
                line: 1,
            }
            .into());
        }

        let mut next_counter = || -> std::io::Result<u64> {
            match parts.next() {
                None => Ok(0),
                Some(token) => {
                    token
                        .parse::<u64>()
                        .map_err(|source| StatParseError::InvalidValue {
                            value: token.to_string(),
                            line: 1,
                            source,
                        })
                        .map_err(Into::into)
                }
            }
        };

        Ok(CpuTimes {
            user: next_counter()?,
            nice: next_counter()?,
            system: next_counter()?,
            idle: next_counter()?,
            iowait: next_counter()?,
            irq: next_counter()?,
            softirq: next_counter()?,
            steal: next_counter()?,
        })
    }
}

/// CPU tick counters for one process from `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessCpuTimes {
    /// Clock ticks scheduled in user mode (field 14).
    pub utime: u64,
    /// Clock ticks scheduled in kernel mode (field 15).
    pub stime: u64,
}

// Position of utime among the tokens following the comm field; stime is the
// next token. The first token after the closing parenthesis is field 3
// (state).
const UTIME_OFFSET: usize = 11;

impl ProcessCpuTimes {
    /// Total clock ticks consumed by the process.
    pub fn total_ticks(&self) -> u64 {
        self.utime + self.stime
    }

    /// Computes the CPU utilization percentage over a measurement window.
    ///
    /// The result can exceed 100 for multi-threaded processes running on
    /// several cores, matching the convention of per-process CPU meters.
    pub fn percent_over(&self, prev: &ProcessCpuTimes, window: Duration) -> CpuSample {
        let secs = window.as_secs_f64();
        if secs <= 0.0 {
            return CpuSample::default();
        }

        let pct = |delta: u64| delta as f64 / CLOCK_TICKS_PER_SEC / secs * 100.0;
        let user_percent = pct(self.utime.saturating_sub(prev.utime));
        let system_percent = pct(self.stime.saturating_sub(prev.stime));
        CpuSample {
            total_percent: user_percent + system_percent,
            user_percent,
            system_percent,
        }
    }
}

impl SingleLineStat for ProcessCpuTimes {
    /// Parses a `/proc/<pid>/stat` record.
    ///
    /// The comm field is skipped by locating the last `)` in the line, since
    /// process names may themselves contain parentheses.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::MalformedLine`] if the record has no comm
    /// delimiter or too few fields, and [`StatParseError::InvalidValue`] if
    /// a tick counter is not numeric.
    fn from_reader<R: BufRead>(buf: &mut R) -> std::io::Result<Self> {
        let mut line = String::new();
        buf.read_line(&mut line)?;

        let malformed = || StatParseError::MalformedLine {
            content: line.trim_end().to_string(),
            line: 1,
        };

        let rest = line
            .rfind(')')
            .map(|i| &line[i + 1..])
            .ok_or_else(|| malformed())?;

        let mut fields = rest.split_whitespace().skip(UTIME_OFFSET);
        let utime = fields.next().ok_or_else(|| malformed())?;
        let stime = fields.next().ok_or_else(|| malformed())?;

        let parse = |token: &str| -> std::io::Result<u64> {
            token
                .parse::<u64>()
                .map_err(|source| StatParseError::InvalidValue {
                    value: token.to_string(),
                    line: 1,
                    source,
                })
                .map_err(Into::into)
        };

        Ok(ProcessCpuTimes {
            utime: parse(utime)?,
            stime: parse(stime)?,
        })
    }
}

/// CPU utilization percentages computed from two readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CpuSample {
    /// Non-idle share of the window, in percent.
    pub total_percent: f64,
    /// User-mode share of the window, in percent.
    pub user_percent: f64,
    /// Kernel-mode share of the window, in percent.
    pub system_percent: f64,
}
