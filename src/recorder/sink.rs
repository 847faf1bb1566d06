use crate::procfs::stats::Sample;

use super::Result;

/// The write side of a session's record stream.
///
/// `append` is the sole write operation; implementations must make the
/// sample durable before returning so an abrupt termination never loses
/// acknowledged samples. `finalize` closes the stream once the session has
/// stopped; no appends follow it.
pub trait SampleSink {
    fn append(&mut self, sample: &Sample) -> impl std::future::Future<Output = Result<()>> + Send;

    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}
