use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to enumerate processes under `{path}`: {source}")]
    Enumerate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pid `{0}`")]
    InvalidPid(String),
}

pub type Result<T> = std::result::Result<T, Error>;
