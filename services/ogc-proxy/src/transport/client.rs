//! HTTP client backend (reqwest).

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, REFERER};
use tracing::{debug, error};

use ogc_common::{ProxyError, ProxyResult};

use super::{PreparedRequest, RemoteData};
use crate::config::{ProxyConfig, ProxyType, RequestProxyConfig};

/// Build a client: no TLS peer verification, redirects followed, outbound
/// proxy applied when configured.
pub fn build_client(config: &ProxyConfig, timeout: Option<Duration>) -> ProxyResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(proxy) = outbound_proxy(&config.request_proxy)? {
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| ProxyError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Proxy URL with url-encoded credentials, e.g. `socks5://user:pw@host:1080`.
pub fn proxy_url(proxy: &RequestProxyConfig) -> String {
    let scheme = match proxy.proxy_type {
        ProxyType::Socks5 => "socks5",
        ProxyType::Http => "http",
    };
    let userinfo = match proxy.credentials() {
        Some((user, password)) => format!("{}:{}@", urlencode(user), urlencode(password)),
        None => String::new(),
    };
    format!("{}://{}{}", scheme, userinfo, proxy.authority())
}

fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn outbound_proxy(config: &RequestProxyConfig) -> ProxyResult<Option<reqwest::Proxy>> {
    if !config.is_active() {
        return Ok(None);
    }

    let mut proxy = reqwest::Proxy::all(proxy_url(config))
        .map_err(|e| ProxyError::Config(format!("Invalid outbound proxy: {}", e)))?;
    if let Some(list) = config.not_for_domain.as_deref() {
        proxy = proxy.no_proxy(reqwest::NoProxy::from_string(list));
    }
    Ok(Some(proxy))
}

pub(crate) fn transport_error(e: reqwest::Error) -> ProxyError {
    if e.is_timeout() {
        ProxyError::Timeout
    } else {
        ProxyError::Transport(e.to_string())
    }
}

pub(crate) fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Request builder carrying method, headers, referer and body of `req`.
pub(crate) fn request_builder(
    client: &reqwest::Client,
    req: &PreparedRequest,
) -> ProxyResult<reqwest::RequestBuilder> {
    let method = reqwest::Method::from_bytes(req.method.to_uppercase().as_bytes()).map_err(|_| {
        ProxyError::InvalidParameter {
            param: "method".to_string(),
            message: req.method.clone(),
        }
    })?;

    let mut builder = client.request(method, &req.url);
    for (name, value) in req.headers.iter() {
        builder = builder.header(name, value);
    }
    if !req.referer.is_empty() {
        builder = builder.header(REFERER, &req.referer);
    }
    if req.method != "get" && !req.body.is_empty() {
        builder = builder.body(req.body.clone());
    }
    Ok(builder)
}

/// Execute a buffered request. Transport failures yield an empty body with
/// status 0.
pub async fn execute(client: &reqwest::Client, req: &PreparedRequest) -> RemoteData {
    let result = async {
        let response = request_builder(client, req)?
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let mime = content_type(response.headers());
        let body = response.bytes().await.map_err(transport_error)?;
        Ok::<_, ProxyError>(RemoteData { body, mime, status })
    }
    .await;

    match result {
        Ok(data) => data,
        Err(e) => {
            if req.debug {
                error!(url = %req.url, method = %req.method, headers = ?req.headers, error = %e, "HTTP client request failed");
            } else {
                debug!(url = %req.url, error = %e, "HTTP client request failed");
            }
            RemoteData {
                body: Bytes::new(),
                mime: String::new(),
                status: 0,
            }
        }
    }
}
