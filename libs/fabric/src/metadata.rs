use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header carrying the bearer token, `Bearer <token>`
pub const AUTHORIZATION: &str = "authorization";

/// Header carrying the W3C trace context
pub const TRACEPARENT: &str = "traceparent";

const BEARER_PREFIX: &str = "Bearer ";

/// Per-call key/value metadata sent alongside a request
///
/// Keys are case-insensitive and stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Token from an `authorization: Bearer <token>` entry
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.get(AUTHORIZATION)?;
        let scheme = value.get(..BEARER_PREFIX.len())?;
        if !scheme.eq_ignore_ascii_case(BEARER_PREFIX) {
            return None;
        }
        let token = value.get(BEARER_PREFIX.len()..)?.trim();
        (!token.is_empty()).then_some(token)
    }

    pub fn set_bearer_token(&mut self, token: &str) {
        self.insert(AUTHORIZATION, format!("{BEARER_PREFIX}{token}"));
    }
}
