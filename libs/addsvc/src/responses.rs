//! Response envelope for document-style transports.
//!
//! The RPC transport sends bare replies; a transport that renders documents
//! (JSON over HTTP, say) would wrap every response in a [`DataRes`] and use
//! the [`Responder`] hooks for its status line and headers.

use addsvc_fabric::Metadata;
use serde::Serialize;

use crate::endpoints::{ConcatResponse, SumResponse};
use crate::service::API_VERSION;

pub const STATUS_OK: u16 = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataRes<T> {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub data: T,
}

impl<T> DataRes<T> {
    pub fn new(data: T) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            data,
        }
    }
}

pub trait Responder {
    fn status_code(&self) -> u16 {
        STATUS_OK
    }

    fn headers(&self) -> Metadata {
        Metadata::new()
    }

    fn response(&self) -> DataRes<&Self>
    where
        Self: Sized,
    {
        DataRes::new(self)
    }
}

impl Responder for SumResponse {}

impl Responder for ConcatResponse {}

#[cfg(test)]
mod tests {
    use addsvc_core::Error;
    use serde_json::json;

    use super::*;

    #[test]
    fn successful_sum_is_enveloped() {
        let response = SumResponse { res: 5, err: None };

        assert_eq!(response.status_code(), 200);
        assert!(response.headers().is_empty());
        assert_eq!(
            serde_json::to_value(response.response()).unwrap(),
            json!({ "apiVersion": "v1", "data": { "res": 5 } })
        );
    }

    #[test]
    fn failed_concat_carries_only_the_error() {
        let response = ConcatResponse {
            res: "ignored".to_string(),
            err: Some(Error::domain("no luck")),
        };

        assert_eq!(
            serde_json::to_value(response.response()).unwrap(),
            json!({ "apiVersion": "v1", "data": { "err": "no luck" } })
        );
    }
}
