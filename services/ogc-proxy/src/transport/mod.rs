//! Outbound HTTP calls to the origin map server.
//!
//! Two interchangeable backends serve buffered calls: the HTTP client
//! (reqwest) and a plain stream exchange over TCP. Large responses go
//! through the streaming variant, which hands the body back unread. Every
//! call passes through the echo log first when it is enabled.

pub mod client;
pub mod options;
pub mod stream;
pub mod streaming;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, instrument, warn};

use ogc_common::ProxyResult;

use crate::config::ProxyConfig;
use crate::echo::EchoLog;

pub use self::options::{
    generate_request_id, user_headers, HeaderList, HttpBackend, PreparedRequest, RequestOptions,
    UserIdentity,
};
pub use self::streaming::{BodyStream, ProxyResponse};

/// Mime type of replayed echo responses.
pub const ECHO_MIME: &str = "text/json";

/// Body, mime type and status of a buffered call. Always complete, even
/// when the call failed: the body is then empty and the status 0.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteData {
    pub body: Bytes,
    pub mime: String,
    pub status: u16,
}

/// Timeout of streaming calls: what is left of the request time budget,
/// never less than 10 seconds.
pub fn stream_timeout(max_execution_time: u64) -> Duration {
    Duration::from_secs(max_execution_time.saturating_sub(5).max(10))
}

/// Report responses with an error status on the admin and error logs.
pub fn log_request_if_error(status: u16, url: &str) {
    if status < 400 {
        return;
    }
    warn!(
        target: "admin",
        status,
        "An HTTP request ended with an error, please check the main error log"
    );
    error!(status, url, "The HTTP request ended with an error");
}

/// Executes outbound calls with the service configuration.
pub struct Transport {
    config: Arc<ProxyConfig>,
    client: reqwest::Client,
    streaming_client: reqwest::Client,
    echo: EchoLog,
}

impl Transport {
    pub fn new(config: Arc<ProxyConfig>, echo: EchoLog) -> ProxyResult<Self> {
        let buffered_timeout = Duration::from_secs(config.max_execution_time.max(1));
        let client = client::build_client(&config, Some(buffered_timeout))?;
        let streaming_client =
            client::build_client(&config, Some(stream_timeout(config.max_execution_time)))?;

        Ok(Self {
            config,
            client,
            streaming_client,
            echo,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn echo(&self) -> &EchoLog {
        &self.echo
    }

    /// Resolve options and headers of a call to `url`.
    pub fn prepare(&self, url: &str, options: RequestOptions) -> PreparedRequest {
        PreparedRequest::prepare(url, options, &self.config)
    }

    /// Fetch `url` and buffer the response.
    #[instrument(skip(self, options))]
    pub async fn get_remote_data(&self, url: &str, options: RequestOptions) -> RemoteData {
        let req = self.prepare(url, options);
        if let Some(replay) = self.replay_or_record(&req).await {
            return RemoteData {
                body: Bytes::from(replay),
                mime: ECHO_MIME.to_string(),
                status: 200,
            };
        }

        let data = match req.backend {
            HttpBackend::Stream if stream::supports(&req.url) => {
                let timeout = Duration::from_secs(self.config.max_execution_time.max(1));
                stream::execute(&req, &self.config.request_proxy, timeout).await
            }
            _ => client::execute(&self.client, &req).await,
        };

        log_request_if_error(data.status, &req.url);
        data
    }

    /// Fetch `url`, returning the body as a stream.
    #[instrument(skip(self, options))]
    pub async fn get_remote_data_as_stream(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> ProxyResult<ProxyResponse> {
        let req = self.prepare(url, options);
        if let Some(replay) = self.replay_or_record(&req).await {
            return Ok(ProxyResponse::from_bytes(200, ECHO_MIME, replay));
        }

        let response = streaming::send(&self.streaming_client, &req).await?;
        log_request_if_error(response.status, &req.url);
        Ok(response)
    }

    /// With the echo log enabled: the recorded content for a replay request,
    /// otherwise record the request and return `None`.
    async fn replay_or_record(&self, req: &PreparedRequest) -> Option<String> {
        if !self.echo.is_enabled() {
            return None;
        }
        if EchoLog::has_echo_in_body(&req.body) {
            return Some(self.echo.lookup(&req.url, &req.body).await);
        }
        self.echo.record(&req.url, &req.body).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_timeout_floor() {
        assert_eq!(stream_timeout(0), Duration::from_secs(10));
        assert_eq!(stream_timeout(12), Duration::from_secs(10));
        assert_eq!(stream_timeout(30), Duration::from_secs(25));
        assert_eq!(stream_timeout(300), Duration::from_secs(295));
    }
}
