//! Outbound request options and header assembly.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::ProxyConfig;

/// HTTP implementation used for an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpBackend {
    /// Full featured HTTP client (reqwest).
    #[default]
    #[serde(rename = "client", alias = "curl")]
    Client,
    /// Minimal HTTP/1.1 exchange over a plain TCP stream.
    #[serde(rename = "stream", alias = "php")]
    Stream,
}

impl HttpBackend {
    /// Parse a backend name. An empty name means "use the configured
    /// default" and yields `None`, as does an unknown name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "client" | "curl" => Some(Self::Client),
            "stream" | "php" => Some(Self::Stream),
            _ => None,
        }
    }
}

/// Authenticated end user on whose behalf a request is made.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserIdentity {
    pub login: String,
    pub groups: Vec<String>,
}

/// Ordered header list. Names compare case-insensitively; setting an
/// existing name replaces its value in place.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// `self` with every header of `overrides` applied on top.
    pub fn merged(mut self, overrides: HeaderList) -> Self {
        for (name, value) in overrides.0 {
            self.set(name, value);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderList {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut list = HeaderList::new();
        for (k, v) in iter {
            list.set(k, v);
        }
        list
    }
}

/// Caller supplied options of an outbound call. Unset fields take the
/// service wide defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub referer: Option<String>,
    pub headers: HeaderList,
    pub proxy_http_backend: Option<HttpBackend>,
    pub debug: Option<bool>,
    pub body: Option<String>,
    /// Value of the `X-Lizmap-Override-Filter` header, when requested.
    pub login_filtered_override: Option<String>,
    /// End user of the request; anonymous when `None`.
    pub user: Option<UserIdentity>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy call form where only a backend name, a method and a debug
    /// flag were given.
    pub fn from_backend(backend: &str, method: &str, debug: Option<bool>) -> Self {
        Self {
            method: Some(method.to_string()),
            proxy_http_backend: HttpBackend::from_name(backend),
            debug,
            ..Self::default()
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }

    pub fn backend(mut self, backend: HttpBackend) -> Self {
        self.proxy_http_backend = Some(backend);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn login_filtered_override(mut self, value: &str) -> Self {
        self.login_filtered_override = Some(value.to_string());
        self
    }

    pub fn user(mut self, user: Option<UserIdentity>) -> Self {
        self.user = user;
        self
    }
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A fully resolved outbound request, ready for either backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: String,
    /// Lower-case HTTP method.
    pub method: String,
    pub referer: String,
    pub headers: HeaderList,
    pub backend: HttpBackend,
    pub debug: bool,
    pub body: String,
}

impl PreparedRequest {
    /// Resolve options against the configuration and assemble headers.
    ///
    /// POST and PUT requests without a body get the query string of `url`
    /// moved into the body as a form. Default headers sit under the caller's
    /// headers. Requests to the configured map server additionally carry
    /// the user identity, the configured server headers and a fresh request
    /// id, all overridable by the caller.
    pub fn prepare(url: &str, options: RequestOptions, config: &ProxyConfig) -> Self {
        let method = options
            .method
            .as_deref()
            .unwrap_or("get")
            .to_lowercase();
        let mut url = url.to_string();
        let mut body = options.body.unwrap_or_default();
        let mut headers = options.headers;

        if method == "post" || method == "put" {
            if body.is_empty() {
                headers.set("Content-type", FORM_CONTENT_TYPE);
                if let Some((base, query)) = url.split_once('?') {
                    body = query.to_string();
                    url = base.to_string();
                }
            } else if !headers.contains("Content-type") {
                headers.set("Content-type", FORM_CONTENT_TYPE);
            }
        }

        let defaults: HeaderList = [
            ("Connection", "close"),
            ("User-Agent", config.user_agent.as_str()),
            ("Accept", "*/*"),
        ]
        .into_iter()
        .collect();
        let mut headers = defaults.merged(headers);

        if !config.wms_server_url.is_empty() && url.starts_with(&config.wms_server_url) {
            let server_headers: HeaderList = config
                .wms_server_headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            let request_id: HeaderList =
                std::iter::once(("X-Request-Id", generate_request_id())).collect();

            headers = user_headers(options.user.as_ref())
                .merged(server_headers)
                .merged(request_id)
                .merged(headers);
        }

        if let Some(value) = options.login_filtered_override {
            headers.set("X-Lizmap-Override-Filter", value);
        }

        Self {
            url,
            method,
            referer: options.referer.unwrap_or_default(),
            headers,
            backend: options.proxy_http_backend.unwrap_or(config.proxy_http_backend),
            debug: options.debug.unwrap_or(config.debug_mode),
            body,
        }
    }
}

/// Identity headers for the map server access control. Anonymous requests
/// send both headers empty.
pub fn user_headers(user: Option<&UserIdentity>) -> HeaderList {
    let (login, groups) = match user {
        Some(user) => (user.login.clone(), user.groups.join(", ")),
        None => (String::new(), String::new()),
    };
    [("X-Lizmap-User", login), ("X-Lizmap-User-Groups", groups)]
        .into_iter()
        .collect()
}

/// Unique request id: a time based token followed by 10 random bytes in hex.
pub fn generate_request_id() -> String {
    let now = chrono::Utc::now();
    let mut random = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut random);
    format!(
        "{:08x}{:05x}-{}",
        now.timestamp(),
        now.timestamp_subsec_micros(),
        hex::encode(random)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        ProxyConfig {
            wms_server_url: "http://map:8080/ows/".to_string(),
            user_agent: "lizmap-proxy".to_string(),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(HttpBackend::from_name("curl"), Some(HttpBackend::Client));
        assert_eq!(HttpBackend::from_name("php"), Some(HttpBackend::Stream));
        assert_eq!(HttpBackend::from_name(" Stream "), Some(HttpBackend::Stream));
        assert_eq!(HttpBackend::from_name(""), None);
    }

    #[test]
    fn test_defaults() {
        let req = PreparedRequest::prepare("http://other/x", RequestOptions::new(), &config());
        assert_eq!(req.method, "get");
        assert_eq!(req.body, "");
        assert_eq!(req.referer, "");
        assert_eq!(req.backend, HttpBackend::Client);
        assert!(!req.debug);
        assert_eq!(req.headers.get("Connection"), Some("close"));
        assert_eq!(req.headers.get("User-Agent"), Some("lizmap-proxy"));
        assert_eq!(req.headers.get("Accept"), Some("*/*"));
        assert!(!req.headers.contains("X-Request-Id"));
    }

    #[test]
    fn test_post_moves_query_into_body() {
        let req = PreparedRequest::prepare(
            "http://host/wms?SERVICE=WMS&REQUEST=GetMap",
            RequestOptions::new().method("POST"),
            &config(),
        );
        assert_eq!(req.method, "post");
        assert_eq!(req.url, "http://host/wms");
        assert_eq!(req.body, "SERVICE=WMS&REQUEST=GetMap");
        assert_eq!(
            req.headers.get("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_post_with_body_keeps_caller_content_type() {
        let req = PreparedRequest::prepare(
            "http://host/wms?a=1",
            RequestOptions::new()
                .method("post")
                .body("<xml/>")
                .header("Content-type", "text/xml"),
            &config(),
        );
        assert_eq!(req.url, "http://host/wms?a=1");
        assert_eq!(req.headers.get("Content-Type"), Some("text/xml"));
    }

    #[test]
    fn test_caller_headers_win() {
        let req = PreparedRequest::prepare(
            "http://other/x",
            RequestOptions::new().header("accept", "image/png"),
            &config(),
        );
        assert_eq!(req.headers.get("Accept"), Some("image/png"));
        assert_eq!(req.headers.len(), 3);
    }

    #[test]
    fn test_map_server_headers() {
        let mut config = config();
        config
            .wms_server_headers
            .insert("X-Qgis-Token".to_string(), "secret".to_string());
        let user = UserIdentity {
            login: "admin".to_string(),
            groups: vec!["admins".to_string(), "editors".to_string()],
        };

        let req = PreparedRequest::prepare(
            "http://map:8080/ows/?SERVICE=WMS",
            RequestOptions::new().user(Some(user)),
            &config,
        );
        assert_eq!(req.headers.get("X-Lizmap-User"), Some("admin"));
        assert_eq!(req.headers.get("X-Lizmap-User-Groups"), Some("admins, editors"));
        assert_eq!(req.headers.get("X-Qgis-Token"), Some("secret"));
        assert!(req.headers.contains("X-Request-Id"));
        // identity first, defaults last
        let names: Vec<&str> = req.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names[0], "X-Lizmap-User");
        assert_eq!(names[names.len() - 1], "Accept");
    }

    #[test]
    fn test_anonymous_user_headers_are_empty() {
        let req = PreparedRequest::prepare("http://map:8080/ows/", RequestOptions::new(), &config());
        assert_eq!(req.headers.get("X-Lizmap-User"), Some(""));
        assert_eq!(req.headers.get("X-Lizmap-User-Groups"), Some(""));
    }

    #[test]
    fn test_login_filtered_override() {
        let req = PreparedRequest::prepare(
            "http://other/",
            RequestOptions::new().login_filtered_override("1"),
            &config(),
        );
        assert_eq!(req.headers.get("X-Lizmap-Override-Filter"), Some("1"));
    }

    #[test]
    fn test_legacy_backend_form() {
        let options = RequestOptions::from_backend("php", "POST", Some(true));
        let req = PreparedRequest::prepare("http://other/", options, &config());
        assert_eq!(req.backend, HttpBackend::Stream);
        assert_eq!(req.method, "post");
        assert!(req.debug);
    }

    #[test]
    fn test_request_id_shape() {
        let id = generate_request_id();
        let (token, random) = id.split_once('-').unwrap();
        assert_eq!(token.len(), 13);
        assert_eq!(random.len(), 20);
        assert_ne!(id, generate_request_id());
    }
}
