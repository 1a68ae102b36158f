use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while encoding or decoding binary NBT.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("an I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::Malformed(msg.into())
    }
}
