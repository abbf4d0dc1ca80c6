//! Mapping between service errors and wire statuses.

use std::sync::Arc;

use addsvc_core::{Code, Error, ErrorKind, Status};
use addsvc_fabric::server::ErrorEncoder;

pub const INTERNAL_MESSAGE: &str = "internal server error";

/// Status returned to the caller for a failed call, `None` on success.
///
/// A status already present in the cause chain is passed through unchanged.
/// A missing auth token becomes `Unauthenticated` with the error's own
/// message. Anything else is reported as an opaque `Internal`.
pub fn encode_error(err: Option<&Error>) -> Option<Status> {
    let err = err?;

    if let Some(status) = err.status() {
        return Some(status.clone());
    }

    if err.contains(ErrorKind::MissingAuthToken) {
        return Some(Status::unauthenticated(err.to_string()));
    }

    tracing::warn!(error = %err, "call failed");
    Some(Status::new(Code::Internal, INTERNAL_MESSAGE))
}

/// Client-side view of a status received from the server
pub fn decode_status(status: Status) -> Error {
    Error::Remote(status)
}

/// [`encode_error`] in the shape the server adapters take
pub fn error_encoder() -> ErrorEncoder {
    Arc::new(|err: &Error| encode_error(Some(err)).unwrap_or_else(|| Status::new(Code::Internal, INTERNAL_MESSAGE)))
}
