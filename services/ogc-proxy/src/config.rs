//! Service configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use storage::{CacheConfig, CacheStorageType, FlushMethod};

use crate::transport::HttpBackend;

/// Protocol spoken to the outbound proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Socks5,
}

/// Outbound proxy used to reach the map server and other remote hosts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: Option<u16>,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Comma separated hosts reached without the proxy.
    pub not_for_domain: Option<String>,
}

impl RequestProxyConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.host.trim().is_empty()
    }

    /// `host[:port]` of the proxy.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host.trim(), port),
            None => self.host.trim().to_string(),
        }
    }

    pub fn no_proxy_hosts(&self) -> Vec<&str> {
        self.not_for_domain
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether requests to `host` go through the proxy.
    pub fn applies_to(&self, host: &str) -> bool {
        self.is_active() && !self.no_proxy_hosts().contains(&host)
    }

    /// Credentials, when a proxy user is configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let user = self.user.as_deref().filter(|u| !u.is_empty())?;
        Some((user, self.password.as_deref().unwrap_or("")))
    }
}

/// Configuration of the proxy service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URL of the origin map server.
    pub wms_server_url: String,
    /// Extra headers sent with every map server request.
    pub wms_server_headers: BTreeMap<String, String>,
    pub proxy_http_backend: HttpBackend,
    pub debug_mode: bool,
    pub user_agent: String,
    /// Request time budget in seconds; bounds outbound calls.
    pub max_execution_time: u64,
    pub cache: CacheConfig,
    pub request_proxy: RequestProxyConfig,
    pub echo_log_path: PathBuf,
    /// Header set by an authenticating reverse proxy with the user login.
    pub trusted_user_header: Option<String>,
    /// Header set by an authenticating reverse proxy with the user groups,
    /// comma separated.
    pub trusted_groups_header: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            wms_server_url: "http://127.0.0.1/cgi-bin/qgis_mapserv.fcgi".to_string(),
            wms_server_headers: BTreeMap::new(),
            proxy_http_backend: HttpBackend::default(),
            debug_mode: false,
            user_agent: format!("ogc-proxy/{}", env!("CARGO_PKG_VERSION")),
            max_execution_time: 30,
            cache: CacheConfig::default(),
            request_proxy: RequestProxyConfig::default(),
            echo_log_path: std::env::temp_dir().join("echoproxy.log"),
            trusted_user_header: None,
            trusted_groups_header: None,
        }
    }
}

impl ProxyConfig {
    /// Load the configuration file when given, then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(v) = var("WMS_SERVER_URL") {
            self.wms_server_url = v;
        }
        if let Some(v) = var("PROXY_HTTP_BACKEND") {
            if let Some(backend) = HttpBackend::from_name(&v) {
                self.proxy_http_backend = backend;
            }
        }
        if let Some(v) = var("DEBUG_MODE") {
            self.debug_mode = parse_bool(&v);
        }
        if let Some(v) = var("USER_AGENT") {
            self.user_agent = v;
        }
        if let Some(v) = var("MAX_EXECUTION_TIME") {
            self.max_execution_time = parse_number("MAX_EXECUTION_TIME", &v)?;
        }
        if let Some(v) = var("ECHO_LOG_PATH") {
            self.echo_log_path = PathBuf::from(v);
        }

        let cache = &mut self.cache;
        if let Some(v) = var("CACHE_STORAGE_TYPE") {
            cache.storage_type = CacheStorageType::from_config(&v);
        }
        if let Some(v) = var("CACHE_EXPIRATION") {
            cache.expiration = parse_number("CACHE_EXPIRATION", &v)?;
        }
        if let Some(v) = var("CACHE_ROOT_DIRECTORY") {
            cache.root_directory = PathBuf::from(v);
        }
        if let Some(v) = var("CACHE_REDIS_HOST") {
            cache.redis.host = v;
        }
        if let Some(v) = var("CACHE_REDIS_PORT") {
            cache.redis.port = parse_number("CACHE_REDIS_PORT", &v)?;
        }
        if let Some(v) = var("CACHE_REDIS_DB") {
            cache.redis.db = Some(parse_number("CACHE_REDIS_DB", &v)?);
        }
        if let Some(v) = var("CACHE_REDIS_KEY_PREFIX") {
            cache.redis.key_prefix = Some(v);
        }
        if let Some(v) = var("CACHE_REDIS_KEY_PREFIX_FLUSH_METHOD") {
            cache.redis.key_prefix_flush_method = match v.trim().to_lowercase().as_str() {
                "direct" | "keys" => Some(FlushMethod::Direct),
                _ => Some(FlushMethod::Scan),
            };
        }

        let proxy = &mut self.request_proxy;
        if let Some(v) = var("REQUEST_PROXY_ENABLED") {
            proxy.enabled = parse_bool(&v);
        }
        if let Some(v) = var("REQUEST_PROXY_HOST") {
            proxy.host = v;
        }
        if let Some(v) = var("REQUEST_PROXY_PORT") {
            proxy.port = Some(parse_number("REQUEST_PROXY_PORT", &v)?);
        }
        if let Some(v) = var("REQUEST_PROXY_TYPE") {
            proxy.proxy_type = if v.trim().eq_ignore_ascii_case("socks5") {
                ProxyType::Socks5
            } else {
                ProxyType::Http
            };
        }
        if let Some(v) = var("REQUEST_PROXY_USER") {
            proxy.user = Some(v);
        }
        if let Some(v) = var("REQUEST_PROXY_PASSWORD") {
            proxy.password = Some(v);
        }
        if let Some(v) = var("REQUEST_PROXY_NOT_FOR_DOMAIN") {
            proxy.not_for_domain = Some(v);
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {}", name, value))
}
