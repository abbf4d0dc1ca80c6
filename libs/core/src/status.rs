use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome code of an RPC call as seen on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    Ok,
    InvalidArgument,
    DeadlineExceeded,
    Unimplemented,
    Unauthenticated,
    Internal,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::InvalidArgument => "InvalidArgument",
            Code::DeadlineExceeded => "DeadlineExceeded",
            Code::Unimplemented => "Unimplemented",
            Code::Unauthenticated => "Unauthenticated",
            Code::Internal => "Internal",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level status: a code plus a message that is safe to show the caller
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("rpc error: code = {code} desc = {message}")]
pub struct Status {
    code: Code,
    message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
