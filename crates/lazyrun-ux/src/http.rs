use crate::EvalBackend;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use thiserror::Error;
use tracing::{debug, warn};

const HEADER_LIMIT: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub bind: SocketAddr,
    pub max_body_bytes: usize,
}

#[derive(Debug, Error)]
pub enum HttpServeError {
    #[error("bind failed: {0}")]
    Bind(std::io::Error),
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HttpResponse {
    status: u16,
    body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HttpRequest {
    method: String,
    target: String,
    body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    Healthz,
    Index,
    State,
    Run(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
enum RouteError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

/// Serve the evaluation API until the listener fails. Connections are
/// handled one at a time, so requests reach the bridge in arrival order.
pub fn serve_eval_api<B: EvalBackend>(
    config: HttpServerConfig,
    backend: &B,
) -> Result<(), HttpServeError> {
    let listener = TcpListener::bind(config.bind).map_err(HttpServeError::Bind)?;
    serve_listener(listener, &config, backend, None)
}

fn serve_listener<B: EvalBackend>(
    listener: TcpListener,
    config: &HttpServerConfig,
    backend: &B,
    max_requests: Option<usize>,
) -> Result<(), HttpServeError> {
    let mut served = 0usize;

    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                if let Err(err) = handle_connection(&mut stream, config, backend) {
                    warn!(error = %err, "http connection failed");
                    let _ = write_json_response(
                        &mut stream,
                        HttpResponse {
                            status: 500,
                            body: json!({ "error": format!("internal server error: {err}") }),
                        },
                    );
                }
                served += 1;
            }
            Err(err) => return Err(HttpServeError::Accept(err)),
        }

        if let Some(limit) = max_requests
            && served >= limit
        {
            break;
        }
    }

    Ok(())
}

fn handle_connection<B: EvalBackend>(
    stream: &mut TcpStream,
    config: &HttpServerConfig,
    backend: &B,
) -> Result<(), String> {
    let response = match read_request(stream, config.max_body_bytes)
        .and_then(|request| parse_route(&request))
    {
        Ok(route) => {
            debug!(?route, "http request routed");
            execute_route(backend, route)
        }
        Err(err) => route_error_response(err),
    };
    write_json_response(stream, response).map_err(|e| e.to_string())
}

fn read_request(stream: &mut TcpStream, max_body_bytes: usize) -> Result<HttpRequest, RouteError> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > HEADER_LIMIT {
            return Err(RouteError::BadRequest("request headers too large".to_string()));
        }
        let n = stream
            .read(&mut chunk)
            .map_err(|e| RouteError::BadRequest(format!("failed to read request: {e}")))?;
        if n == 0 {
            return Err(RouteError::BadRequest("incomplete request".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let line = lines
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing request line".to_string()))?;
    let (method, target) = parse_request_line(line)?;
    let content_length = content_length(lines)?;
    if content_length > max_body_bytes {
        return Err(RouteError::PayloadTooLarge(format!(
            "body of {content_length} bytes exceeds limit of {max_body_bytes}"
        )));
    }

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .map_err(|e| RouteError::BadRequest(format!("failed to read body: {e}")))?;
        if n == 0 {
            return Err(RouteError::BadRequest("truncated request body".to_string()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        target,
        body,
    })
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn content_length<'a>(headers: impl Iterator<Item = &'a str>) -> Result<usize, RouteError> {
    for header in headers {
        if let Some((name, value)) = header.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            return value.trim().parse().map_err(|_| {
                RouteError::BadRequest(format!("invalid content-length: {}", value.trim()))
            });
        }
    }
    Ok(0)
}

fn parse_request_line(line: &str) -> Result<(String, String), RouteError> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing method".to_string()))?;
    let target = parts
        .next()
        .ok_or_else(|| RouteError::BadRequest("missing target".to_string()))?;
    Ok((method.to_string(), target.to_string()))
}

fn parse_route(request: &HttpRequest) -> Result<Route, RouteError> {
    let (path, query) = split_target(&request.target);
    let params = parse_query_params(query);

    match (request.method.as_str(), path) {
        ("GET", "/") => Ok(Route::Index),
        ("GET", "/healthz") => Ok(Route::Healthz),
        ("GET", "/state") => Ok(Route::State),
        ("POST", "/run") => String::from_utf8(request.body.clone())
            .map(Route::Run)
            .map_err(|_| RouteError::BadRequest("request body must be UTF-8".to_string())),
        ("GET", "/run") => {
            let source = params.get("source").cloned().ok_or_else(|| {
                RouteError::BadRequest(
                    "missing source (use POST /run or /run?source=<text>)".to_string(),
                )
            })?;
            Ok(Route::Run(source))
        }
        (method, "/" | "/healthz" | "/state" | "/run") => Err(RouteError::MethodNotAllowed(
            format!("{method} {path}"),
        )),
        _ => Err(RouteError::NotFound(format!("unknown route: {path}"))),
    }
}

fn split_target(target: &str) -> (&str, &str) {
    match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    }
}

fn parse_query_params(query: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = percent_decode(k);
        if key.is_empty() {
            continue;
        }
        out.insert(key, percent_decode(v));
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let (Some(h), Some(l)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    out.push(h * 16 + l);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn execute_route<B: EvalBackend>(backend: &B, route: Route) -> HttpResponse {
    match route {
        Route::Healthz => HttpResponse {
            status: 200,
            body: json!({ "ok": true }),
        },
        Route::Index => HttpResponse {
            status: 200,
            body: json!({
                "service": "lazyrun.eval.v1",
                "routes": [
                    "GET /healthz",
                    "GET /state",
                    "POST /run",
                    "GET /run?source=<text>"
                ]
            }),
        },
        Route::State => HttpResponse {
            status: 200,
            body: json!({ "state": backend.state() }),
        },
        Route::Run(source) => {
            let output = backend.evaluate_blocking(source);
            match serde_json::to_value(&output) {
                Ok(body) => HttpResponse { status: 200, body },
                Err(err) => HttpResponse {
                    status: 500,
                    body: json!({ "error": err.to_string() }),
                },
            }
        }
    }
}

fn route_error_response(err: RouteError) -> HttpResponse {
    let status = match &err {
        RouteError::BadRequest(_) => 400,
        RouteError::NotFound(_) => 404,
        RouteError::MethodNotAllowed(_) => 405,
        RouteError::PayloadTooLarge(_) => 413,
    };
    HttpResponse {
        status,
        body: json!({ "error": err.to_string() }),
    }
}

fn write_json_response(stream: &mut TcpStream, response: HttpResponse) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(&response.body)?;
    let status_text = reason_phrase(response.status);
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, POST\r\nConnection: close\r\n\r\n",
        response.status,
        status_text,
        body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
