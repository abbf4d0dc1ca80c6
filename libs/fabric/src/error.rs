use addsvc_core::Status;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{0} timeout exceeded")]
    Timeout(&'static str),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The peer answered the call with a non-OK status
    #[error(transparent)]
    Status(#[from] Status),

    #[error("Missing {0}")]
    MissingConfig(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for addsvc_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Status(status) => addsvc_core::Error::Remote(status),
            other => addsvc_core::Error::transport(other),
        }
    }
}
