//! Transport tests against a scripted origin server.
//!
//! Both backends are exercised on the same scenarios: what goes on the wire
//! and what comes back as `RemoteData`.

use std::collections::BTreeMap;
use std::sync::Arc;

use ogc_proxy::config::ProxyConfig;
use ogc_proxy::echo::{EchoLog, ECHO_MARKER};
use ogc_proxy::transport::{HttpBackend, RequestOptions, Transport, UserIdentity, ECHO_MIME};
use test_utils::{OriginServer, ScriptedResponse};

fn transport(origin: &OriginServer, echo: EchoLog) -> Transport {
    let mut wms_server_headers = BTreeMap::new();
    wms_server_headers.insert("X-Qgis-Secret".to_string(), "s3cret".to_string());

    let config = ProxyConfig {
        wms_server_url: format!("{}/ows", origin.url()),
        wms_server_headers,
        max_execution_time: 15,
        ..ProxyConfig::default()
    };
    Transport::new(Arc::new(config), echo).unwrap()
}

fn no_echo() -> EchoLog {
    EchoLog::new(std::env::temp_dir().join("unused-echoproxy.log"), false)
}

/// A URL nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/ows?SERVICE=WMS", addr)
}

const BACKENDS: [HttpBackend; 2] = [HttpBackend::Client, HttpBackend::Stream];

// ============================================================================
// Buffered calls
// ============================================================================

#[tokio::test]
async fn test_get_returns_status_mime_and_body() {
    for backend in BACKENDS {
        let origin = OriginServer::start(ScriptedResponse::ok("image/png", "PNGDATA"))
            .await
            .unwrap();
        let transport = transport(&origin, no_echo());

        let url = format!("{}/ows?SERVICE=WMS&REQUEST=GetMap", origin.url());
        let data = transport
            .get_remote_data(&url, RequestOptions::new().backend(backend))
            .await;

        assert_eq!(data.status, 200, "{:?}", backend);
        assert_eq!(data.mime, "image/png", "{:?}", backend);
        assert_eq!(data.body.as_ref(), b"PNGDATA", "{:?}", backend);

        let request = origin.single_request().await;
        assert_eq!(request.method, "GET");
        assert_eq!(request.query(), "SERVICE=WMS&REQUEST=GetMap");
        assert_eq!(request.header("Accept"), Some("*/*"));
        assert!(request
            .header("User-Agent")
            .unwrap_or_default()
            .starts_with("ogc-proxy/"));
    }
}

#[tokio::test]
async fn test_post_without_body_moves_query_into_form() {
    for backend in BACKENDS {
        let origin = OriginServer::start(ScriptedResponse::ok("text/xml", "<ok/>"))
            .await
            .unwrap();
        let transport = transport(&origin, no_echo());

        let url = format!("{}/ows?SERVICE=WFS&REQUEST=GetFeature", origin.url());
        let data = transport
            .get_remote_data(&url, RequestOptions::new().method("post").backend(backend))
            .await;
        assert_eq!(data.status, 200);

        let request = origin.single_request().await;
        assert_eq!(request.method, "POST", "{:?}", backend);
        assert_eq!(request.target, "/ows", "{:?}", backend);
        assert_eq!(request.body_str(), "SERVICE=WFS&REQUEST=GetFeature");
        assert_eq!(
            request.header("Content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }
}

#[tokio::test]
async fn test_map_server_calls_carry_identity_and_server_headers() {
    for backend in BACKENDS {
        let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "ok"))
            .await
            .unwrap();
        let transport = transport(&origin, no_echo());

        let user = UserIdentity {
            login: "admin".to_string(),
            groups: vec!["admins".to_string(), "editors".to_string()],
        };
        let url = format!("{}/ows?SERVICE=WMS", origin.url());
        transport
            .get_remote_data(
                &url,
                RequestOptions::new()
                    .backend(backend)
                    .user(Some(user))
                    .login_filtered_override("true"),
            )
            .await;

        let request = origin.single_request().await;
        assert_eq!(request.header("X-Lizmap-User"), Some("admin"));
        assert_eq!(request.header("X-Lizmap-User-Groups"), Some("admins, editors"));
        assert_eq!(request.header("X-Qgis-Secret"), Some("s3cret"));
        assert_eq!(request.header("X-Lizmap-Override-Filter"), Some("true"));
        assert!(request.header("X-Request-Id").is_some(), "{:?}", backend);
    }
}

#[tokio::test]
async fn test_caller_headers_override_server_headers() {
    let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "ok"))
        .await
        .unwrap();
    let transport = transport(&origin, no_echo());

    let url = format!("{}/ows?SERVICE=WMS", origin.url());
    transport
        .get_remote_data(&url, RequestOptions::new().header("X-Qgis-Secret", "mine"))
        .await;

    let request = origin.single_request().await;
    assert_eq!(request.header("X-Qgis-Secret"), Some("mine"));
}

#[tokio::test]
async fn test_other_hosts_get_no_map_server_headers() {
    let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "ok"))
        .await
        .unwrap();
    let transport = transport(&origin, no_echo());

    let url = format!("{}/external/capabilities.xml", origin.url());
    transport.get_remote_data(&url, RequestOptions::new()).await;

    let request = origin.single_request().await;
    assert!(request.header("X-Request-Id").is_none());
    assert!(request.header("X-Qgis-Secret").is_none());
    assert!(request.header("X-Lizmap-User").is_none());
}

#[tokio::test]
async fn test_chunked_response_is_decoded() {
    for backend in BACKENDS {
        let body = "a chunked feature collection body";
        let origin = OriginServer::start(
            ScriptedResponse::ok("application/json; charset=utf-8", body).chunked(),
        )
        .await
        .unwrap();
        let transport = transport(&origin, no_echo());

        let url = format!("{}/ows?SERVICE=WFS", origin.url());
        let data = transport
            .get_remote_data(&url, RequestOptions::new().backend(backend))
            .await;

        assert_eq!(data.status, 200);
        assert_eq!(data.body.as_ref(), body.as_bytes(), "{:?}", backend);
        assert!(data.mime.starts_with("application/json"), "{:?}", backend);
    }
}

#[tokio::test]
async fn test_error_status_is_returned_with_body() {
    for backend in BACKENDS {
        let origin = OriginServer::start(
            ScriptedResponse::status(404, "Not Found", "no such layer")
                .with_header("Content-Type", "text/plain"),
        )
        .await
        .unwrap();
        let transport = transport(&origin, no_echo());

        let url = format!("{}/ows?SERVICE=WMS", origin.url());
        let data = transport
            .get_remote_data(&url, RequestOptions::new().backend(backend).debug(true))
            .await;

        assert_eq!(data.status, 404, "{:?}", backend);
        assert_eq!(data.body.as_ref(), b"no such layer");
    }
}

#[tokio::test]
async fn test_unreachable_origin_yields_status_zero() {
    let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "unused"))
        .await
        .unwrap();
    let transport = transport(&origin, no_echo());
    let url = closed_port_url();

    let data = transport
        .get_remote_data(&url, RequestOptions::new().backend(HttpBackend::Client))
        .await;
    assert_eq!(data.status, 0);
    assert!(data.body.is_empty());
    assert_eq!(data.mime, "");

    let data = transport
        .get_remote_data(&url, RequestOptions::new().backend(HttpBackend::Stream))
        .await;
    assert_eq!(data.status, 0);
    assert!(data.body.is_empty());
    assert_eq!(data.mime, "image/png");
}

// ============================================================================
// Streaming calls
// ============================================================================

#[tokio::test]
async fn test_streaming_response() {
    let origin = OriginServer::start(ScriptedResponse::ok("image/jpeg", "JPEGDATA").chunked())
        .await
        .unwrap();
    let transport = transport(&origin, no_echo());

    let url = format!("{}/ows?SERVICE=WMS&REQUEST=GetMap", origin.url());
    let response = transport
        .get_remote_data_as_stream(&url, RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type, "image/jpeg");
    assert_eq!(response.into_bytes().await.unwrap().as_ref(), b"JPEGDATA");
}

#[tokio::test]
async fn test_streaming_unreachable_origin_is_an_error() {
    let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "unused"))
        .await
        .unwrap();
    let transport = transport(&origin, no_echo());

    let result = transport
        .get_remote_data_as_stream(&closed_port_url(), RequestOptions::new())
        .await;
    assert!(result.is_err());
}

// ============================================================================
// Echo log
// ============================================================================

#[tokio::test]
async fn test_echo_records_then_replays() {
    let dir = tempfile::tempdir().unwrap();
    let echo = EchoLog::new(dir.path().join("echoproxy.log"), true);
    let origin = OriginServer::start(ScriptedResponse::ok("image/png", "PNGDATA"))
        .await
        .unwrap();
    let transport = transport(&origin, echo);

    let url = format!("{}/ows?SERVICE=WMS&REQUEST=GetMap", origin.url());
    let data = transport.get_remote_data(&url, RequestOptions::new()).await;
    assert_eq!(data.body.as_ref(), b"PNGDATA");

    let replay = transport
        .get_remote_data(&url, RequestOptions::new().method("post").body(ECHO_MARKER))
        .await;
    assert_eq!(replay.status, 200);
    assert_eq!(replay.mime, ECHO_MIME);
    assert_eq!(replay.body.as_ref(), format!("{}?", url).as_bytes());

    let streamed = transport
        .get_remote_data_as_stream(&url, RequestOptions::new().method("post").body(ECHO_MARKER))
        .await
        .unwrap();
    assert_eq!(streamed.content_type, ECHO_MIME);
    assert_eq!(
        streamed.into_bytes().await.unwrap().as_ref(),
        format!("{}?", url).as_bytes()
    );

    // replays never reach the origin
    assert_eq!(origin.requests().await.len(), 1);
}

#[tokio::test]
async fn test_echo_replay_of_unknown_request() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("echoproxy.log");
    let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "unused"))
        .await
        .unwrap();

    let transport = transport(&origin, EchoLog::new(&log, true));
    let url = format!("{}/ows?SERVICE=WFS", origin.url());
    let options = || RequestOptions::new().method("post").body(ECHO_MARKER);

    let missing_log = transport.get_remote_data(&url, options()).await;
    assert_eq!(missing_log.body.as_ref(), b"unfound echoproxy.log");

    std::fs::write(&log, "deadbeef\thttp://elsewhere?x\n").unwrap();
    let unfound = transport.get_remote_data(&url, options()).await;
    let text = String::from_utf8_lossy(&unfound.body).into_owned();
    assert!(text.starts_with("unfound "), "{}", text);
    assert_eq!(text.len(), "unfound ".len() + 64);

    assert!(origin.requests().await.is_empty());
}
