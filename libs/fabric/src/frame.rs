//! Envelope frames exchanged on an RPC connection.
//!
//! A client writes [`RequestFrame`]s and the server answers each with a
//! [`ResponseFrame`] carrying the same id. Replies may arrive in any order.

use std::time::{Duration, Instant};

use addsvc_core::Status;
use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    /// Fully qualified method, `service/Method`
    pub method: String,
    pub metadata: Metadata,
    /// Time the caller is still willing to wait, in milliseconds
    pub timeout_ms: Option<u64>,
    /// Codec-encoded wire request
    pub payload: Vec<u8>,
}

impl RequestFrame {
    /// Local deadline derived from the propagated timeout. A timeout too
    /// large to represent is treated as none.
    pub fn deadline(&self, received_at: Instant) -> Option<Instant> {
        self.timeout_ms
            .and_then(|ms| received_at.checked_add(Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub result: Result<Vec<u8>, Status>,
}
