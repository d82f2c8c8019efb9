//! OGC endpoint: WMS, WFS and WMTS requests.
//!
//! Cacheable requests (WMTS GetTile, tiled WMS GetMap) are answered from the
//! cache profile of their layers, filled from the map server on a miss.
//! Everything else is forwarded and the response streamed back unbuffered.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Extension, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use ogc_common::{construct_url, ProxyError};
use ogc_protocol::{ogc_exception, OgcRequest, OgcService};
use storage::CacheStore;

use crate::context::ProxyContext;
use crate::metrics::Timer;
use crate::transport::{ProxyResponse, RemoteData, RequestOptions};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const XML_CONTENT_TYPE: &str = "text/xml";
const DEFAULT_TILE_FORMAT: &str = "image/png";

/// GET /ows - KVP request
pub async fn ows_get_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    handle_ows(&ctx, &headers, params, InboundBody::None).await
}

/// POST /ows - form encoded parameters or an XML request document
pub async fn ows_post_handler(
    Extension(ctx): Extension<Arc<ProxyContext>>,
    headers: HeaderMap,
    Query(mut params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
        .unwrap_or(false);

    if is_form {
        params.extend(
            url::form_urlencoded::parse(&body).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
        handle_ows(&ctx, &headers, params, InboundBody::Form).await
    } else {
        let xml = String::from_utf8_lossy(&body).into_owned();
        handle_ows(&ctx, &headers, params, InboundBody::Xml(xml)).await
    }
}

/// How the inbound request carried its parameters.
enum InboundBody {
    None,
    Form,
    Xml(String),
}

#[instrument(skip_all)]
async fn handle_ows(
    ctx: &ProxyContext,
    headers: &HeaderMap,
    params: Vec<(String, String)>,
    body: InboundBody,
) -> Response {
    let request_xml = match &body {
        InboundBody::Xml(xml) => Some(xml.as_str()),
        _ => None,
    };

    let Some(request) = ogc_protocol::build(params, request_xml) else {
        ctx.metrics.record_rejected_request();
        return exception_response(None, &ProxyError::MissingParameter("SERVICE".to_string()));
    };
    let service = request.service();
    ctx.metrics.record_ows_request(service);

    let url = construct_url(&request.inner().forward_params(), &ctx.config.wms_server_url);
    let options = outbound_options(ctx, headers, &request, &body);

    let repository = request.inner().param("repository");
    let project = request.inner().param("project");
    if let (Some((layers, crs)), Some(repository), Some(project), Some(key)) = (
        request.cache_scope(),
        repository,
        project,
        request.cache_entry_key(),
    ) {
        let scope = CacheScope {
            repository,
            project,
            layers: &layers,
            crs: &crs,
            key: &key,
            format: request.inner().param("format").unwrap_or(DEFAULT_TILE_FORMAT),
        };
        return cached_response(ctx, service, scope, &url, options).await;
    }

    let timer = Timer::start();
    match ctx.transport.get_remote_data_as_stream(&url, options).await {
        Ok(response) => {
            ctx.metrics
                .record_upstream(timer.elapsed_us(), response.status)
                .await;
            stream_response(response)
        }
        Err(e) => {
            ctx.metrics.record_upstream(timer.elapsed_us(), 0).await;
            warn!(error = %e, url = %url, "Map server request failed");
            exception_response(Some(service), &e)
        }
    }
}

/// Options of the call to the map server.
///
/// XML documents are posted as is. Form posts are forwarded as form posts:
/// the transport moves the query string into the body.
fn outbound_options(
    ctx: &ProxyContext,
    headers: &HeaderMap,
    request: &OgcRequest,
    body: &InboundBody,
) -> RequestOptions {
    let mut options = RequestOptions::new().user(ctx.user_from_headers(headers));

    if let Some(referer) = headers.get(header::REFERER).and_then(|v| v.to_str().ok()) {
        options = options.referer(referer);
    }

    match (body, request.inner().request_xml.as_deref()) {
        (_, Some(xml)) => options
            .method("post")
            .header("Content-type", XML_CONTENT_TYPE)
            .body(xml),
        (InboundBody::Form, None) | (InboundBody::Xml(_), None) => options.method("post"),
        (InboundBody::None, None) => options.method("get"),
    }
}

/// Cache profile and entry of a cacheable request.
struct CacheScope<'a> {
    repository: &'a str,
    project: &'a str,
    layers: &'a str,
    crs: &'a str,
    key: &'a str,
    format: &'a str,
}

async fn cached_response(
    ctx: &ProxyContext,
    service: OgcService,
    scope: CacheScope<'_>,
    url: &str,
    options: RequestOptions,
) -> Response {
    let profile = match ctx
        .cache
        .declare_profile(scope.repository, scope.project, scope.layers, scope.crs)
        .await
    {
        Ok(profile) => profile,
        Err(e) => return exception_response(Some(service), &e),
    };

    let store = match ctx.cache.store(&profile).await {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(profile = %profile, error = %e, "Cache store unavailable, bypassing cache");
            None
        }
    };

    if let Some(store) = &store {
        match store.get(scope.key).await {
            Ok(Some(data)) => {
                ctx.metrics.record_cache_hit();
                debug!(profile = %profile, key = scope.key, "Cache hit");
                return data_response(200, scope.format, data);
            }
            Ok(None) => ctx.metrics.record_cache_miss(),
            Err(e) => {
                ctx.metrics.record_cache_miss();
                warn!(profile = %profile, error = %e, "Cache read failed");
            }
        }
    }

    let timer = Timer::start();
    let RemoteData { body, mime, status } = ctx.transport.get_remote_data(url, options).await;
    ctx.metrics.record_upstream(timer.elapsed_us(), status).await;

    if status == 200 {
        if let Some(store) = &store {
            if let Err(e) = store.set(scope.key, &body).await {
                warn!(profile = %profile, error = %e, "Cache write failed");
            }
        }
    }

    data_response(status, &mime, body)
}

/// Origin status, or 502 when the map server could not be reached.
fn response_status(status: u16) -> StatusCode {
    StatusCode::from_u16(status)
        .ok()
        .filter(|s| !s.is_informational())
        .unwrap_or(StatusCode::BAD_GATEWAY)
}

fn data_response(status: u16, mime: &str, body: Bytes) -> Response {
    let status = response_status(status);
    if mime.is_empty() {
        (status, body).into_response()
    } else {
        (status, [(header::CONTENT_TYPE, mime.to_string())], body).into_response()
    }
}

fn stream_response(response: ProxyResponse) -> Response {
    let status = response_status(response.status);
    let body = Body::from_stream(response.body);
    if response.content_type.is_empty() {
        (status, body).into_response()
    } else {
        (status, [(header::CONTENT_TYPE, response.content_type)], body).into_response()
    }
}

/// OGC exception document for an error raised by the proxy itself.
pub fn exception_response(service: Option<OgcService>, err: &ProxyError) -> Response {
    let status = StatusCode::from_u16(err.http_status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, XML_CONTENT_TYPE)],
        ogc_exception(service, err),
    )
        .into_response()
}
