//! Endpoint layer of the add service.
//!
//! Each service method is wrapped as an [`Endpoint`] taking a request struct
//! and producing a response struct. Business errors travel inside the
//! response (see [`Failer`]); the `Err` side of an endpoint is reserved for
//! failures of the call itself.

use std::sync::Arc;
use std::time::Instant;

use addsvc_core::{chain, trace_server, Context, Endpoint, Error, Failer, Middleware, Result, Tracer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::debug;

use crate::service::AddService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumRequest {
    pub a: i64,
    pub b: i64,
}

/// Outcome of a sum; `res` is meaningless when `err` is set
#[derive(Debug, Default)]
pub struct SumResponse {
    pub res: i64,
    pub err: Option<Error>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatRequest {
    pub a: String,
    pub b: String,
}

/// Outcome of a concat; `res` is meaningless when `err` is set
#[derive(Debug, Default)]
pub struct ConcatResponse {
    pub res: String,
    pub err: Option<Error>,
}

impl Failer for SumResponse {
    fn failed(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}

impl Failer for ConcatResponse {
    fn failed(&self) -> Option<&Error> {
        self.err.as_ref()
    }
}

// A failed response serializes its error message in place of the result.
impl Serialize for SumResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SumResponse", 1)?;
        match &self.err {
            Some(err) => state.serialize_field("err", &err.to_string())?,
            None => state.serialize_field("res", &self.res)?,
        }
        state.end()
    }
}

impl Serialize for ConcatResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ConcatResponse", 1)?;
        match &self.err {
            Some(err) => state.serialize_field("err", &err.to_string())?,
            None => state.serialize_field("res", &self.res)?,
        }
        state.end()
    }
}

pub fn make_sum_endpoint(svc: Arc<dyn AddService>) -> Endpoint<SumRequest, SumResponse> {
    Endpoint::new(move |ctx: Context, req: SumRequest| {
        let svc = Arc::clone(&svc);
        async move {
            let response = match svc.sum(&ctx, req.a, req.b).await {
                Ok(res) => SumResponse { res, err: None },
                Err(err) => SumResponse { res: 0, err: Some(err) },
            };
            Ok::<_, Error>(response)
        }
    })
}

pub fn make_concat_endpoint(svc: Arc<dyn AddService>) -> Endpoint<ConcatRequest, ConcatResponse> {
    Endpoint::new(move |ctx: Context, req: ConcatRequest| {
        let svc = Arc::clone(&svc);
        async move {
            let response = match svc.concat(&ctx, &req.a, &req.b).await {
                Ok(res) => ConcatResponse { res, err: None },
                Err(err) => ConcatResponse {
                    res: String::new(),
                    err: Some(err),
                },
            };
            Ok::<_, Error>(response)
        }
    })
}

/// Logs how long the wrapped endpoint took and whether the call itself failed
pub fn logging_middleware<Req, Res>(method: &'static str) -> Middleware<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    Middleware::new(move |next: Endpoint<Req, Res>| {
        Endpoint::new(move |ctx: Context, request: Req| {
            let next = next.clone();
            async move {
                let started = Instant::now();
                let result = next.call(ctx, request).await;
                let took_us = started.elapsed().as_micros() as u64;
                match &result {
                    Ok(_) => debug!(method, took_us, "endpoint returned"),
                    Err(err) => debug!(method, took_us, transport_error = %err, "endpoint failed"),
                }
                result
            }
        })
    })
}

/// All endpoints of the add service.
///
/// On the server it wraps a service implementation; on the client it is
/// built from remote endpoints and is itself an [`AddService`].
#[derive(Clone)]
pub struct Endpoints {
    pub sum: Endpoint<SumRequest, SumResponse>,
    pub concat: Endpoint<ConcatRequest, ConcatResponse>,
}

impl Endpoints {
    /// Wrap a service with the server-side endpoint middleware
    pub fn new(svc: impl AddService + 'static, tracer: Arc<dyn Tracer>) -> Self {
        let svc: Arc<dyn AddService> = Arc::new(svc);

        let sum = make_sum_endpoint(Arc::clone(&svc)).with(&chain(vec![
            trace_server(Arc::clone(&tracer), "Sum"),
            logging_middleware("Sum"),
        ]));
        let concat = make_concat_endpoint(svc).with(&chain(vec![
            trace_server(tracer, "Concat"),
            logging_middleware("Concat"),
        ]));

        Self { sum, concat }
    }
}

#[async_trait::async_trait]
impl AddService for Endpoints {
    async fn sum(&self, ctx: &Context, a: i64, b: i64) -> Result<i64> {
        let response = self.sum.call(ctx.clone(), SumRequest { a, b }).await?;
        match response.err {
            Some(err) => Err(err),
            None => Ok(response.res),
        }
    }

    async fn concat(&self, ctx: &Context, a: &str, b: &str) -> Result<String> {
        let request = ConcatRequest {
            a: a.to_string(),
            b: b.to_string(),
        };
        let response = self.concat.call(ctx.clone(), request).await?;
        match response.err {
            Some(err) => Err(err),
            None => Ok(response.res),
        }
    }
}
