use std::error::Error as StdError;

use thiserror::Error;

use crate::status::Status;

/// Boxed foreign error used as the cause of transport failures
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed wire payload
    #[error("decode error: {0}")]
    Decode(String),

    /// No bearer token was propagated into the call context
    #[error("token up for parsing was not passed through the context")]
    MissingAuthToken,

    /// Business failure raised by the domain service
    #[error("{0}")]
    Domain(String),

    /// Connection, deadline or framing failure on the client side
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    /// Error that already carries a transport status, typically received from a peer
    #[error("{0}")]
    Remote(#[from] Status),

    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Taxonomy member an error classifies into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    MissingAuthToken,
    Domain,
    Transport,
    Remote,
}

impl Error {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn domain(msg: impl Into<String>) -> Self {
        Self::Domain(msg.into())
    }

    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }

    /// Wrap this error with additional context, keeping it reachable through `source()`
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Self::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classification of the innermost error, looking through `Wrapped` layers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) => ErrorKind::Decode,
            Error::MissingAuthToken => ErrorKind::MissingAuthToken,
            Error::Domain(_) => ErrorKind::Domain,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Remote(_) => ErrorKind::Remote,
            Error::Wrapped { source, .. } => source.kind(),
        }
    }

    /// Walk the cause chain and report whether any link is of the given kind
    pub fn contains(&self, kind: ErrorKind) -> bool {
        chain(self)
            .filter_map(as_error)
            .any(|err| !matches!(err, Error::Wrapped { .. }) && err.kind() == kind)
    }

    /// First explicit transport status found in the cause chain
    pub fn status(&self) -> Option<&Status> {
        chain(self).find_map(|err| {
            err.downcast_ref::<Status>().or_else(|| match as_error(err) {
                Some(Error::Remote(status)) => Some(status),
                _ => None,
            })
        })
    }
}

fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&err| err.source())
}

// `Box<Error>` is its own link in the chain, so both shapes are recognized.
fn as_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a Error> {
    err.downcast_ref::<Error>()
        .or_else(|| err.downcast_ref::<Box<Error>>().map(|boxed| boxed.as_ref()))
}

pub type Result<T> = std::result::Result<T, Error>;
