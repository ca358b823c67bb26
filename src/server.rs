use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::GraphQLRequest;
use crate::stitch_gateway::StitchGateway;

// Create a response body from a string
fn full<T: Into<Bytes>>(value: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(value.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Route one incoming request. The only surface is `POST /graphql`;
/// introspection goes through it like any other query, and no interactive
/// query UI is served.
pub async fn handle_request<B>(
    req: Request<B>,
    gateway: Arc<StitchGateway>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Infallible>
where
    B: hyper::body::Body,
    B::Data: Buf,
{
    let auth_headers = extract_auth_headers(&req);

    let result = match (req.method(), req.uri().path()) {
        (&Method::POST, "/graphql") => {
            let body_bytes = match req.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => {
                    return Ok(Response::builder()
                        .status(StatusCode::BAD_REQUEST)
                        .body(full("Failed to read request body"))
                        .unwrap_or_else(|_| internal_server_error()));
                }
            };

            match serde_json::from_slice::<GraphQLRequest>(&body_bytes) {
                Ok(mut graphql_req) => {
                    graphql_req.auth_headers = auth_headers;

                    let payload = match gateway.process_request(graphql_req).await {
                        Ok(result) => result,
                        // Planning failures are GraphQL errors, not HTTP ones.
                        Err(e) => json!({ "errors": [{ "message": e.to_string() }] }),
                    };
                    let body = serde_json::to_string(&payload).unwrap_or_default();
                    Response::builder()
                        .header("Content-Type", "application/json")
                        .header("Access-Control-Allow-Origin", "*")
                        .body(full(body))
                        .unwrap_or_else(|_| internal_server_error())
                }
                Err(e) => Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .header("Access-Control-Allow-Origin", "*")
                    .body(full(format!("Invalid JSON request: {}", e)))
                    .unwrap_or_else(|_| internal_server_error()),
            }
        }

        (&Method::OPTIONS, _) => Response::builder()
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type, Authorization",
            )
            .body(full(""))
            .unwrap_or_else(|_| internal_server_error()),

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Access-Control-Allow-Origin", "*")
            .body(full("Not Found"))
            .unwrap_or_else(|_| internal_server_error()),
    };

    Ok(result)
}

fn internal_server_error() -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = Response::new(full("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Auth context forwarded to every upstream call of the request.
fn extract_auth_headers<B>(req: &Request<B>) -> Option<HashMap<String, String>> {
    let mut auth_headers = HashMap::new();

    for header_name in ["Authorization", "x-api-key", "x-token"] {
        if let Some(value) = req.headers().get(header_name)
            && let Ok(value) = value.to_str()
        {
            auth_headers.insert(header_name.to_string(), value.to_string());
        }
    }

    if auth_headers.is_empty() {
        None
    } else {
        Some(auth_headers)
    }
}

/// Accept connections until the process is terminated. There is no graceful
/// shutdown; dropping the process drops everything.
pub async fn serve(gateway: Arc<StitchGateway>, port: u16) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await?;
    info!("gateway listening on http://{}/graphql", addr);

    loop {
        let (stream, _addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let gateway = Arc::clone(&gateway);

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let gateway = gateway.clone();
                handle_request(req, gateway)
            });

            if let Err(e) = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                warn!(error = %e, "error processing connection");
            }
        });
    }
}
