//! Admin HTTP API
//!
//! Read-only view of the bridge for operators:
//! - `GET /clients` lists connected sessions (HTTP Basic, password only)
//! - `GET /` reports name, version, session count and route names
//! - `GET /health` liveness probe

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::bridge::Bridge;
use crate::registry::SessionRegistry;


const REALM: &str = "Basic realm=\"mqtt2http\"";

/// Body of `GET /`
#[derive(Debug, Serialize)]
struct Info<'a> {
    name: &'static str,
    version: &'static str,
    sessions: usize,
    routes: &'a [String],
}

struct ApiState {
    registry: Arc<SessionRegistry>,
    route_names: Vec<String>,
    /// `None` leaves `/clients` open
    password: Option<String>,
}

/// HTTP server for the admin endpoints
pub struct AdminServer {
    state: Arc<ApiState>,
    addr: SocketAddr,
}

impl AdminServer {
    /// An empty password is treated like no password.
    pub fn new(bridge: &Bridge, password: Option<String>, addr: SocketAddr) -> Self {
        let route_names = bridge
            .routes()
            .iter()
            .map(|route| route.name().to_string())
            .collect();
        Self {
            state: Arc::new(ApiState {
                registry: bridge.registry(),
                route_names,
                password: password.filter(|p| !p.is_empty()),
            }),
            addr,
        }
    }

    /// Bind and serve until a shutdown signal arrives
    pub async fn run(
        self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until a shutdown signal arrives
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("Admin API listening on http://{}", listener.local_addr()?);
        if self.state.password.is_none() {
            warn!("Admin API /clients is not password protected");
        }

        loop {
            let (stream, _) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.recv() => {
                    debug!("Admin API stopping");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let state = self.state.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { handle_request(req, state).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving admin connection: {:?}", err);
                }
            });
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn json(body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn unauthorized() -> Response<Full<Bytes>> {
    let mut response = text(StatusCode::UNAUTHORIZED, "Unauthorized");
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

/// Password from a `Basic` authorization header; the username is ignored
fn basic_password(header: &HeaderValue) -> Option<String> {
    let value = header.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;
    Some(password.to_string())
}

fn authorized<B>(req: &Request<B>, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    req.headers()
        .get(AUTHORIZATION)
        .and_then(basic_password)
        .is_some_and(|password| password == expected)
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ApiState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(route_request(&req, &state))
}

fn route_request<B>(req: &Request<B>, state: &ApiState) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }

    match req.uri().path() {
        "/clients" => {
            if !authorized(req, state.password.as_deref()) {
                debug!("Rejected unauthenticated /clients request");
                return unauthorized();
            }
            match state.registry.export_json() {
                Ok(body) => json(body),
                Err(e) => {
                    error!("Failed to serialize sessions: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
        "/" => {
            let info = Info {
                name: env!("CARGO_PKG_NAME"),
                version: env!("CARGO_PKG_VERSION"),
                sessions: state.registry.len(),
                routes: &state.route_names,
            };
            match serde_json::to_vec(&info) {
                Ok(body) => json(body),
                Err(e) => {
                    error!("Failed to serialize info: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                }
            }
        }
        "/health" => text(StatusCode::OK, "OK"),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}
