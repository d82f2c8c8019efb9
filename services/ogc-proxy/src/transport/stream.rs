//! Plain stream backend: a hand written HTTP/1.1 exchange over TCP.
//!
//! The response head is not structured by the transport, so the status line
//! and `Content-Type` header are parsed out of the raw header lines. Only
//! plain `http` URLs are served; anything else goes through the client
//! backend.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, instrument};
use url::Url;

use ogc_common::{ProxyError, ProxyResult};

use super::{PreparedRequest, RemoteData};
use crate::config::RequestProxyConfig;

/// Mime type reported when the response carries no `Content-Type`.
pub const DEFAULT_MIME: &str = "image/png";

/// Whether this backend can serve `url`.
pub fn supports(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.scheme() == "http")
        .unwrap_or(false)
}

/// Execute a buffered request. Failures yield an empty body, the default
/// mime type and status 0.
#[instrument(skip_all, fields(url = %req.url))]
pub async fn execute(
    req: &PreparedRequest,
    proxy: &RequestProxyConfig,
    timeout: Duration,
) -> RemoteData {
    let raw = match tokio::time::timeout(timeout, exchange(req, proxy)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => {
            debug!(error = %e, "Stream request failed");
            return failed();
        }
        Err(_) => {
            debug!(timeout_secs = timeout.as_secs(), "Stream request timed out");
            return failed();
        }
    };

    let response = parse_response(&raw);
    if req.debug && response.status >= 400 {
        error!(url = %req.url, "getRemoteData, bad response");
        error!(method = %req.method, headers = ?req.headers, "getRemoteData, bad response, options");
        error!(headers = ?response.header_lines, "getRemoteData, bad response, response headers");
    }

    RemoteData {
        body: response.body,
        mime: response.mime,
        status: response.status,
    }
}

fn failed() -> RemoteData {
    RemoteData {
        body: Bytes::new(),
        mime: DEFAULT_MIME.to_string(),
        status: 0,
    }
}

/// Serialize the request head. Through a proxy the request target is the
/// full URL and proxy credentials go in `Proxy-Authorization`.
pub(crate) fn request_head(req: &PreparedRequest, url: &Url, via_proxy: Option<&RequestProxyConfig>) -> String {
    let mut headers = req.headers.clone();

    let target = match via_proxy {
        Some(proxy) => {
            if let Some((user, password)) = proxy.credentials() {
                headers.set(
                    "Proxy-Authorization",
                    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password))),
                );
            }
            req.url.clone()
        }
        None => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
    };

    if !req.referer.is_empty() {
        headers.set("Referer", &req.referer);
    }
    if req.method != "get" && !req.body.is_empty() {
        headers.set("Content-Length", req.body.len().to_string());
    } else {
        headers.remove("Connection");
    }

    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or("localhost"), port),
        None => url.host_str().unwrap_or("localhost").to_string(),
    };

    let mut head = format!("{} {} HTTP/1.1\r\n", req.method.to_uppercase(), target);
    if !headers.contains("Host") {
        head.push_str(&format!("Host: {}\r\n", host));
    }
    for (name, value) in headers.iter() {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    // the body is read until the server closes the connection
    if !headers.contains("Connection") {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");
    head
}

async fn exchange(req: &PreparedRequest, proxy: &RequestProxyConfig) -> ProxyResult<Vec<u8>> {
    let url = Url::parse(&req.url).map_err(|e| ProxyError::InvalidParameter {
        param: "url".to_string(),
        message: e.to_string(),
    })?;
    let host = url.host_str().unwrap_or("localhost");

    let via_proxy = proxy.applies_to(host).then_some(proxy);
    let connect_to = match via_proxy {
        Some(proxy) if proxy.port.is_some() => proxy.authority(),
        Some(proxy) => format!("{}:80", proxy.authority()),
        None => format!("{}:{}", host, url.port_or_known_default().unwrap_or(80)),
    };

    let mut stream = TcpStream::connect(&connect_to)
        .await
        .map_err(|e| ProxyError::Transport(format!("Failed to connect to {}: {}", connect_to, e)))?;

    let head = request_head(req, &url, via_proxy);
    stream.write_all(head.as_bytes()).await?;
    if req.method != "get" && !req.body.is_empty() {
        stream.write_all(req.body.as_bytes()).await?;
    }
    stream.flush().await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    Ok(raw)
}

/// A raw HTTP response split into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub status: u16,
    pub mime: String,
    pub header_lines: Vec<String>,
    pub body: Bytes,
}

/// Parse a raw response. Status defaults to 0 and mime to [`DEFAULT_MIME`].
pub fn parse_response(raw: &[u8]) -> ParsedResponse {
    let (head, body) = match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(pos) => (&raw[..pos], &raw[pos + 4..]),
        None => (raw, &[][..]),
    };

    let header_lines: Vec<String> = String::from_utf8_lossy(head)
        .split("\r\n")
        .map(str::to_string)
        .collect();

    let mut status = 0;
    let mut mime = DEFAULT_MIME.to_string();
    let mut chunked = false;
    let mut content_length = None;

    for line in &header_lines {
        if let Some(value) = content_type_from_header(line) {
            mime = value;
        } else if line.starts_with("HTTP/") {
            status = line
                .split(' ')
                .nth(1)
                .and_then(|code| code.parse().ok())
                .unwrap_or(0);
        } else if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.trim().eq_ignore_ascii_case("chunked");
            } else if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse::<usize>().ok();
            }
        }
    }

    let body = if chunked {
        decode_chunked(body)
    } else {
        match content_length {
            Some(len) if len < body.len() => body[..len].to_vec(),
            _ => body.to_vec(),
        }
    };

    ParsedResponse {
        status,
        mime,
        header_lines,
        body: Bytes::from(body),
    }
}

/// Mime type from a `Content-Type: type/subtype[; charset=x]` header line.
/// Other parameters are dropped.
pub fn content_type_from_header(line: &str) -> Option<String> {
    let (name, rest) = line.split_once(':')?;
    if !name.eq_ignore_ascii_case("content-type") || !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '.' | '+' | '-')))
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }

    let mut mime = rest[..end].to_string();
    if let Some(params) = rest[end..].strip_prefix(';') {
        let trimmed = params.trim_start();
        let has_space = trimmed.len() < params.len();
        let is_charset = trimmed
            .get(..8)
            .map_or(false, |p| p.eq_ignore_ascii_case("charset="));
        if has_space && is_charset && trimmed.len() > 8 {
            let charset: String = trimmed[8..]
                .chars()
                .take_while(|c| !c.is_whitespace())
                .collect();
            mime.push_str("; charset=");
            mime.push_str(&charset);
        }
    }
    Some(mime)
}

/// Decode a chunked body. Decoding stops at the last chunk or at the first
/// malformed one.
pub fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    loop {
        let Some(line_end) = data.windows(2).position(|w| w == b"\r\n") else {
            break;
        };
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let Ok(size) = usize::from_str_radix(size_hex, 16) else {
            break;
        };
        if size == 0 {
            break;
        }

        let start = line_end + 2;
        let Some(end) = start.checked_add(size) else {
            break;
        };
        let end = end.min(data.len());
        out.extend_from_slice(&data[start..end]);
        if end + 2 > data.len() {
            break;
        }
        data = &data[end + 2..];
    }
    out
}
