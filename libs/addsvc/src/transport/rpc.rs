//! RPC bindings for the add service endpoints.

use std::sync::Arc;

use addsvc_core::{trace_client, Result, Tracer};
use addsvc_fabric::propagation::{extract_token, extract_trace, inject_token, inject_trace};
use addsvc_fabric::server::EndpointHandler;
use addsvc_fabric::{Connection, RemoteEndpoint, Server, ServerConfig};

use crate::endpoints::{ConcatRequest, ConcatResponse, Endpoints, SumRequest, SumResponse};
use crate::pb;
use crate::transport::errors::error_encoder;

/// Serve a set of endpoints under the `addsvc.Add` methods
pub fn make_rpc_server(endpoints: Endpoints) -> Server {
    make_rpc_server_with_config(endpoints, ServerConfig::default())
}

pub fn make_rpc_server_with_config(endpoints: Endpoints, config: ServerConfig) -> Server {
    let sum = EndpointHandler::new(endpoints.sum, decode_sum_request, encode_sum_response, error_encoder())
        .before(extract_trace())
        .before(extract_token());

    let concat = EndpointHandler::new(
        endpoints.concat,
        decode_concat_request,
        encode_concat_response,
        error_encoder(),
    )
    .before(extract_trace())
    .before(extract_token());

    Server::builder()
        .config(config)
        .handler(pb::METHOD_SUM, sum)
        .handler(pb::METHOD_CONCAT, concat)
        .build()
}

/// Client-side endpoints calling a remote add service over `conn`.
///
/// The connection stays owned by the caller; dropping the returned endpoints
/// does not close it.
pub fn make_rpc_client(conn: Connection, tracer: Arc<dyn Tracer>) -> Endpoints {
    let sum = RemoteEndpoint::new(conn.clone(), pb::METHOD_SUM, encode_sum_request, decode_sum_response)
        .before(inject_trace())
        .before(inject_token())
        .endpoint()
        .with(&trace_client(Arc::clone(&tracer), "Sum"));

    let concat = RemoteEndpoint::new(conn, pb::METHOD_CONCAT, encode_concat_request, decode_concat_response)
        .before(inject_trace())
        .before(inject_token())
        .endpoint()
        .with(&trace_client(tracer, "Concat"));

    Endpoints { sum, concat }
}

fn decode_sum_request(req: pb::SumRequest) -> Result<SumRequest> {
    Ok(SumRequest { a: req.a, b: req.b })
}

fn encode_sum_response(res: SumResponse) -> Result<pb::SumReply> {
    Ok(pb::SumReply { res: res.res })
}

fn decode_concat_request(req: pb::ConcatRequest) -> Result<ConcatRequest> {
    Ok(ConcatRequest { a: req.a, b: req.b })
}

fn encode_concat_response(res: ConcatResponse) -> Result<pb::ConcatReply> {
    Ok(pb::ConcatReply { res: res.res })
}

fn encode_sum_request(req: SumRequest) -> Result<pb::SumRequest> {
    Ok(pb::SumRequest { a: req.a, b: req.b })
}

fn decode_sum_response(reply: pb::SumReply) -> Result<SumResponse> {
    Ok(SumResponse {
        res: reply.res,
        err: None,
    })
}

fn encode_concat_request(req: ConcatRequest) -> Result<pb::ConcatRequest> {
    Ok(pb::ConcatRequest { a: req.a, b: req.b })
}

fn decode_concat_response(reply: pb::ConcatReply) -> Result<ConcatResponse> {
    Ok(ConcatResponse {
        res: reply.res,
        err: None,
    })
}
