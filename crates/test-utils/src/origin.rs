//! Scripted HTTP origin server.
//!
//! Answers every connection with the same canned response and records the
//! raw requests it received, so tests can check what a client actually put
//! on the wire. One request per connection; the server always closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Canned response of an [`OriginServer`].
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Send the body with `Transfer-Encoding: chunked`.
    pub chunked: bool,
}

impl ScriptedResponse {
    /// A 200 response with the given content type.
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::status(200, "OK", body).with_header("Content-Type", content_type)
    }

    /// A response with an arbitrary status and no content type.
    pub fn status(status: u16, reason: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            headers: Vec::new(),
            body: body.into(),
            chunked: false,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    fn to_wire(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("Connection: close\r\n");
        if self.chunked {
            head.push_str("Transfer-Encoding: chunked\r\n\r\n");
        } else {
            head.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
        }

        let mut wire = head.into_bytes();
        if self.chunked {
            for chunk in self.body.chunks(7) {
                wire.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                wire.extend_from_slice(chunk);
                wire.extend_from_slice(b"\r\n");
            }
            wire.extend_from_slice(b"0\r\n\r\n");
        } else {
            wire.extend_from_slice(&self.body);
        }
        wire
    }
}

/// A request as received by the origin.
#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    /// Request target exactly as sent: a path, or an absolute URL when the
    /// origin is used as a forward proxy.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Query string of the request target, empty when absent.
    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or("")
    }
}

/// Local HTTP origin answering with a [`ScriptedResponse`].
pub struct OriginServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl OriginServer {
    /// Bind an ephemeral port on localhost and start serving.
    pub async fn start(response: ScriptedResponse) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let response = response.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &response, &recorded).await;
                });
            }
        });

        Ok(Self {
            addr,
            requests,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the origin, without trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests received so far, in arrival order.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// The only request received. Panics unless exactly one arrived.
    pub async fn single_request(&self) -> RecordedRequest {
        let requests = self.requests().await;
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().unwrap_or_default()
    }
}

impl Drop for OriginServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    response: &ScriptedResponse,
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let request = read_request(&mut stream).await?;
    recorded.lock().await.push(request);
    stream.write_all(&response.to_wire()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunked_wire_format() {
        let wire = ScriptedResponse::ok("text/plain", "hello world").chunked().to_wire();
        let text = String::from_utf8(wire).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Transfer-Encoding: chunked"));
        assert!(text.ends_with("7\r\nhello w\r\n4\r\norld\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_records_request() {
        let origin = OriginServer::start(ScriptedResponse::ok("text/plain", "pong"))
            .await
            .unwrap();

        let mut stream = TcpStream::connect(origin.addr()).await.unwrap();
        stream
            .write_all(b"POST /ows?a=1 HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\nbody")
            .await
            .unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(String::from_utf8_lossy(&reply).ends_with("pong"));

        let request = origin.single_request().await;
        assert_eq!(request.method, "POST");
        assert_eq!(request.query(), "a=1");
        assert_eq!(request.header("host"), Some("x"));
        assert_eq!(request.body_str(), "body");
    }
}
