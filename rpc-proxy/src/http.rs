use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{
        HeaderMap, HeaderName, StatusCode,
        header::{self, AUTHORIZATION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, copy_bidirectional},
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::{
    error::ProxyError,
    framing::{MAX_MESSAGE_BYTES, find_header_end, header_lines, status_code},
    upstream::Upstream,
};

/// Upper bound on a forwarded request body.
const MAX_BODY_BYTES: usize = MAX_MESSAGE_BYTES;

/// Upper bound on the upstream's handshake response head.
const MAX_HANDSHAKE_BYTES: usize = 64 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

pub struct HttpProxy {
    pub addr: SocketAddr,
    pub upstream: Arc<Upstream>,
}

impl HttpProxy {
    pub fn new(addr: SocketAddr, upstream: Arc<Upstream>) -> Self {
        Self { addr, upstream }
    }

    pub fn router(upstream: Arc<Upstream>) -> Router {
        Router::new()
            .fallback(proxy_request)
            .layer(TraceLayer::new_for_http())
            .with_state(upstream)
    }

    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), ProxyError> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("HTTP proxy listening on http://{}", listener.local_addr()?);
        Self::serve(listener, self.upstream, shutdown).await
    }

    pub async fn serve(
        listener: TcpListener,
        upstream: Arc<Upstream>,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ProxyError> {
        axum::serve(listener, Self::router(upstream))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

async fn proxy_request(State(upstream): State<Arc<Upstream>>, request: Request) -> Response {
    let result = if is_upgrade(request.headers()) {
        tunnel(&upstream, request).await
    } else {
        forward(&upstream, request).await
    };

    result.unwrap_or_else(|e| {
        error!(error = %e, "Proxy request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(CONTENT_TYPE, "text/plain")],
            "Proxy server error",
        )
            .into_response()
    })
}

fn is_upgrade(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && headers.contains_key(header::UPGRADE)
}

/// Request headers that may be passed on, without the caller's credential.
fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || matches!(name.as_str(), "host" | "authorization" | "content-length") {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }
    forwarded
}

async fn forward(upstream: &Upstream, request: Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::RequestBody(e.to_string()))?;
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut headers = outbound_headers(&parts.headers);
    headers.insert(AUTHORIZATION, upstream.authorization_header());

    let response = upstream
        .client()
        .request(parts.method, upstream.url_for(path))
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if is_hop_by_hop(name) || name.as_str() == "content-length" {
            continue;
        }
        builder = builder.header(name, value);
    }
    let bytes = response.bytes().await?;
    debug!(%status, path, bytes = bytes.len(), "Forwarded request");

    builder
        .body(Body::from(bytes))
        .map_err(|e| ProxyError::MalformedResponse(e.to_string()))
}

/// Replays an upgrade handshake against the upstream over a raw socket and,
/// on `101`, splices the two connections together.
async fn tunnel(upstream: &Upstream, mut request: Request) -> Result<Response, ProxyError> {
    let (host, port, prefix) = upstream.socket_target()?;
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut head = format!("{} {prefix}{path} HTTP/1.1\r\nHost: {host}:{port}\r\n", request.method());
    for (name, value) in request.headers() {
        if matches!(name.as_str(), "host" | "authorization") {
            continue;
        }
        if let Ok(value) = value.to_str() {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    head.push_str(&format!("{AUTHORIZATION}: {}\r\n\r\n", upstream.authorization()));

    let connect = TcpStream::connect((host.as_str(), port));
    let mut socket = timeout(upstream.timeout(), connect)
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(upstream.timeout()))??;
    socket.write_all(head.as_bytes()).await?;

    let (response_head, leftover) = timeout(upstream.timeout(), read_head(&mut socket))
        .await
        .map_err(|_| ProxyError::UpstreamTimeout(upstream.timeout()))??;
    let status = status_code(&response_head)
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ProxyError::MalformedResponse("bad status line".to_string()))?;

    let mut builder = Response::builder().status(status);
    // The body, if any, is only what arrived with the head.
    for (name, value) in header_lines(&response_head) {
        if matches!(name.as_str(), "content-length" | "transfer-encoding") {
            continue;
        }
        builder = builder.header(name, value);
    }

    if status != StatusCode::SWITCHING_PROTOCOLS {
        warn!(%status, path, "Upstream refused upgrade");
        return builder
            .body(Body::from(leftover))
            .map_err(|e| ProxyError::MalformedResponse(e.to_string()));
    }

    let on_upgrade = hyper::upgrade::on(&mut request);
    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                warn!(error = %e, "Client upgrade failed");
                return;
            }
        };
        let mut client = TokioIo::new(upgraded);
        if !leftover.is_empty() {
            if let Err(e) = client.write_all(&leftover).await {
                warn!(error = %e, "Tunnel closed");
                return;
            }
        }
        match copy_bidirectional(&mut client, &mut socket).await {
            Ok((sent, received)) => debug!(sent, received, "Tunnel closed"),
            Err(e) => debug!(error = %e, "Tunnel closed"),
        }
    });

    builder
        .body(Body::empty())
        .map_err(|e| ProxyError::MalformedResponse(e.to_string()))
}

/// Reads a response head. Returns it together with any bytes read past it.
async fn read_head(socket: &mut TcpStream) -> Result<(Vec<u8>, Vec<u8>), ProxyError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProxyError::MalformedResponse(
                "connection closed during handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buf) {
            let leftover = buf.split_off(end);
            return Ok((buf, leftover));
        }
        if buf.len() > MAX_HANDSHAKE_BYTES {
            return Err(ProxyError::MalformedResponse("handshake too large".to_string()));
        }
    }
}
