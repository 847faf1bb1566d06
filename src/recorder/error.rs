use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create record stream `{path}`: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to append to record stream: {0}")]
    Append(#[source] std::io::Error),

    #[error("failed to finalize record stream: {0}")]
    Finalize(#[source] std::io::Error),

    #[error("failed to read record stream `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record stream `{path}` at line {line}")]
    Malformed { path: PathBuf, line: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
