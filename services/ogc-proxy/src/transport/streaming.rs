//! Streaming variant of the transport: the response body is handed back as
//! a lazily read stream instead of being buffered.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use ogc_common::{ProxyError, ProxyResult};

use super::client::{content_type, request_builder, transport_error};
use super::PreparedRequest;

pub type BodyStream = BoxStream<'static, Result<Bytes, ProxyError>>;

/// Status, content type and body stream of an origin response.
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: String,
    pub body: BodyStream,
}

impl ProxyResponse {
    /// Response over an in-memory body.
    pub fn from_bytes(status: u16, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            content_type: content_type.into(),
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// Read the whole body.
    pub async fn into_bytes(self) -> ProxyResult<Bytes> {
        let buf = self
            .body
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Send `req`. Error statuses are returned as responses; only transport
/// failures are errors.
pub(crate) async fn send(client: &reqwest::Client, req: &PreparedRequest) -> ProxyResult<ProxyResponse> {
    let response = request_builder(client, req)?
        .send()
        .await
        .map_err(transport_error)?;

    let status = response.status().as_u16();
    let content_type = content_type(response.headers());
    let body = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(transport_error))
        .boxed();

    Ok(ProxyResponse {
        status,
        content_type,
        body,
    })
}
