//! Process wide proxy context.
//!
//! Built once at startup and handed to every handler: configuration, the
//! cache manager with its registry of declared profiles, the transport and
//! the metrics collector.

use std::sync::Arc;

use axum::http::HeaderMap;

use ogc_common::ProxyResult;
use storage::CacheManager;

use crate::config::ProxyConfig;
use crate::echo::EchoLog;
use crate::metrics::MetricsCollector;
use crate::transport::{Transport, UserIdentity};

pub struct ProxyContext {
    pub config: Arc<ProxyConfig>,
    pub cache: CacheManager,
    pub transport: Transport,
    pub metrics: MetricsCollector,
}

impl ProxyContext {
    /// Context with the echo log toggled by the environment.
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        let echo = EchoLog::from_env(config.echo_log_path.clone());
        Self::with_echo(config, echo)
    }

    pub fn with_echo(config: ProxyConfig, echo: EchoLog) -> ProxyResult<Self> {
        let config = Arc::new(config);
        let cache = CacheManager::new(config.cache.clone());
        let transport = Transport::new(config.clone(), echo)?;

        Ok(Self {
            config,
            cache,
            transport,
            metrics: MetricsCollector::new(),
        })
    }

    /// End user authenticated upstream, read from the trusted headers.
    /// Anonymous when no user header is configured or present.
    pub fn user_from_headers(&self, headers: &HeaderMap) -> Option<UserIdentity> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let login = header(self.config.trusted_user_header.as_deref()?)?;
        let groups = self
            .config
            .trusted_groups_header
            .as_deref()
            .and_then(header)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Some(UserIdentity {
            login: login.to_string(),
            groups,
        })
    }
}
