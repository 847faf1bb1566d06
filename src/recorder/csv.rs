//! The delimited text record stream.
//!
//! One file per session. The first row names the fields, every following
//! row is one sample: the fixed columns (timestamp, tick, kind, scope)
//! followed by that sample's `metric=value` pairs, all comma-separated.
//! Rows are flushed and synced before `append` acknowledges, so the stream
//! on disk never trails the samples the session believes are recorded.
//!
//! The stream of a finished session is read back with [`read_records`];
//! rows come out in append order, which the scheduler guarantees to be
//! non-decreasing in timestamp per resource kind.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::io::AsyncWriteExt;

use crate::procfs::stats::{MetricValue, ResourceKind, Sample, Scope};

use super::sink::SampleSink;
use super::{Error, Result};

/// Field delimiter of the record stream.
pub const DELIMITER: char = ',';

const HEADER: &str = "timestamp_ms,tick,resource_kind,scope,metric=value...";

/// Builds the file name identifying a session's record stream.
///
/// Process-scoped sessions are identified by process name and resolved pid,
/// system-scoped ones by the literal `system`; both carry the session start
/// timestamp.
pub fn stream_file_name(process: Option<(&str, u32)>, start_ms: u64) -> String {
    match process {
        Some((name, pid)) => format!("{}_{pid}_{start_ms}.csv", sanitize(name)),
        None => format!("system_{start_ms}.csv"),
    }
}

/// Replaces file-name-hostile characters of a process name.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// An append-only delimited text sink backed by one file.
#[derive(Debug)]
pub struct CsvRecorder {
    path: PathBuf,
    file: tokio::fs::File,
}

impl CsvRecorder {
    /// Creates the record stream file and writes the header row.
    ///
    /// The file must not already exist; record streams are append-only and
    /// never reopened for writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Create`] if the file cannot be created or the
    /// header cannot be written durably.
    pub async fn create(path: PathBuf) -> Result<Self> {
        let create = |source| Error::Create {
            path: path.clone(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .await
            .map_err(create)?;

        file.write_all(HEADER.as_bytes()).await.map_err(create)?;
        file.write_all(b"\n").await.map_err(create)?;
        file.flush().await.map_err(create)?;
        file.sync_data().await.map_err(create)?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn format_row(sample: &Sample) -> String {
    let mut row = format!(
        "{}{DELIMITER}{}{DELIMITER}{}{DELIMITER}{}",
        sample.timestamp_ms(),
        sample.tick(),
        sample.kind(),
        sample.scope(),
    );
    for (name, value) in sample.values().metrics() {
        row.push(DELIMITER);
        row.push_str(name);
        row.push('=');
        row.push_str(&value.to_string());
    }
    row.push('\n');
    row
}

impl SampleSink for CsvRecorder {
    async fn append(&mut self, sample: &Sample) -> Result<()> {
        let row = format_row(sample);
        self.file
            .write_all(row.as_bytes())
            .await
            .map_err(Error::Append)?;
        self.file.flush().await.map_err(Error::Append)?;
        self.file.sync_data().await.map_err(Error::Append)?;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.file.flush().await.map_err(Error::Finalize)?;
        self.file.sync_all().await.map_err(Error::Finalize)?;
        Ok(())
    }
}

/// One row read back from a record stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp_ms: u64,
    pub tick: u64,
    pub kind: ResourceKind,
    pub scope: Scope,
    pub metrics: Vec<(String, MetricValue)>,
}

/// Reads a record stream back into its ordered rows.
///
/// Intended for the post-stop consumers of a finished session (statistics,
/// plotting); the read side is plain synchronous I/O.
///
/// # Errors
///
/// Returns [`Error::Read`] if the file cannot be read and
/// [`Error::Malformed`] if the header or any row does not decode.
pub fn read_records(path: &Path) -> Result<Vec<Record>> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |line: usize| Error::Malformed {
        path: path.to_path_buf(),
        line,
    };

    let mut lines = content.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header == HEADER => {}
        Some(_) => return Err(malformed(1)),
        None => return Err(malformed(1)),
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        let lineno = idx + 1;
        let mut fields = line.split(DELIMITER);

        let mut fixed = || fields.next().ok_or_else(|| malformed(lineno));
        let timestamp_ms = fixed()?.parse::<u64>().map_err(|_| malformed(lineno))?;
        let tick = fixed()?.parse::<u64>().map_err(|_| malformed(lineno))?;
        let kind = ResourceKind::from_str(fixed()?).map_err(|_| malformed(lineno))?;
        let scope = Scope::from_str(fixed()?).map_err(|_| malformed(lineno))?;

        let mut metrics = Vec::new();
        for pair in fields {
            let (name, value) = pair.split_once('=').ok_or_else(|| malformed(lineno))?;
            let value = MetricValue::from_str(value).map_err(|_| malformed(lineno))?;
            metrics.push((name.to_owned(), value));
        }

        records.push(Record {
            timestamp_ms,
            tick,
            kind,
            scope,
            metrics,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procfs::stats::{CpuSample, SampleValues, SystemMemorySample};

    fn cpu_sample(timestamp_ms: u64, tick: u64) -> Sample {
        Sample::new(
            timestamp_ms,
            tick,
            ResourceKind::Cpu,
            Scope::System,
            SampleValues::Cpu(CpuSample {
                total_percent: 25.0,
                user_percent: 20.0,
                system_percent: 5.0,
            }),
        )
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(stream_file_name(None, 1_700_000_000_000));

        let mut recorder = CsvRecorder::create(path.clone()).await.unwrap();
        recorder.append(&cpu_sample(1_700_000_000_000, 0)).await.unwrap();
        recorder.append(&cpu_sample(1_700_000_001_000, 1)).await.unwrap();
        recorder
            .append(&Sample::new(
                1_700_000_001_010,
                1,
                ResourceKind::Memory,
                Scope::System,
                SampleValues::SystemMemory(SystemMemorySample {
                    total_bytes: 1024,
                    used_bytes: 512,
                    available_bytes: 512,
                    used_percent: 50.0,
                }),
            ))
            .await
            .unwrap();
        recorder.finalize().await.unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(records[0].tick, 0);
        assert_eq!(records[0].kind, ResourceKind::Cpu);
        assert_eq!(records[0].scope, Scope::System);
        assert_eq!(
            records[0].metrics[0],
            ("cpu_percent".to_owned(), MetricValue::Gauge(25.0))
        );

        assert_eq!(records[1].tick, 1);

        assert_eq!(records[2].kind, ResourceKind::Memory);
        assert_eq!(
            records[2].metrics[0],
            ("total_bytes".to_owned(), MetricValue::Counter(1024))
        );
    }

    #[tokio::test]
    async fn test_rows_are_durable_before_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.csv");

        let mut recorder = CsvRecorder::create(path.clone()).await.unwrap();
        recorder.append(&cpu_sample(1, 0)).await.unwrap();

        // Not finalized: the appended row must already be on disk.
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.csv");
        std::fs::write(&path, "leftover").unwrap();

        let err = CsvRecorder::create(path).await.unwrap_err();
        assert!(matches!(err, Error::Create { .. }));
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.csv");
        std::fs::write(&path, "time,cpu\n1,2\n").unwrap();

        assert!(matches!(
            read_records(&path),
            Err(Error::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn test_read_reports_malformed_row_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.csv");
        std::fs::write(&path, format!("{HEADER}\n123,0,cpu,system,ok=1\nnot a row\n")).unwrap();

        assert!(matches!(
            read_records(&path),
            Err(Error::Malformed { line: 3, .. })
        ));
    }

    #[test]
    fn test_stream_file_name() {
        assert_eq!(
            stream_file_name(Some(("nginx", 1234)), 42),
            "nginx_1234_42.csv"
        );
        assert_eq!(stream_file_name(None, 42), "system_42.csv");
        // Shell metacharacters never reach the filesystem.
        assert_eq!(
            stream_file_name(Some(("a b/c", 1)), 2),
            "a-b-c_1_2.csv"
        );
    }
}
