//! Durable persistence of sample streams.
//!
//! A session owns exactly one sink for its lifetime. The [`SampleSink`]
//! trait is the seam between the scheduler and the storage format; the
//! shipped implementation is [`CsvRecorder`], an append-only delimited
//! text file, with [`read_records`] and [`Summary`] serving the post-stop
//! consumers.

mod csv;
mod error;
mod sink;
mod summary;

pub use csv::{CsvRecorder, DELIMITER, Record, read_records, stream_file_name};
pub use error::{Error, Result};
pub use sink::SampleSink;
pub use summary::{MetricSummary, Summary};
