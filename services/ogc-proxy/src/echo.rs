//! Capture and replay of outbound requests.
//!
//! When enabled, every outbound request is appended to the echo log as a
//! `<hash>\t<url>?<body>` line. A request whose body carries the echo
//! marker is not sent: the recorded `<url>?<body>` of the matching earlier
//! request is returned instead, which lets tests check what the proxy would
//! have sent to the map server.
//!
//! The log rolls over to `<path>.1` once it reaches [`ECHO_MAX_BYTES`], and
//! replays only read its last [`ECHO_TAIL_LINES`] lines.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, error};

/// Environment variable enabling the echo log.
pub const ECHO_ENV_VAR: &str = "ECHO_OGC_ORIGINAL_REQUEST";

/// Form-encoded `__echo__=&` parameter marking a replay request.
pub const ECHO_MARKER: &str = "%5F%5Fecho%5F%5F=&";

/// Number of trailing log lines searched on replay.
pub const ECHO_TAIL_LINES: usize = 50;

/// Size at which the log is rolled over.
pub const ECHO_MAX_BYTES: u64 = 1024 * 1024;

const TAIL_BLOCK_SIZE: u64 = 8 * 1024;

#[derive(Debug, Clone)]
pub struct EchoLog {
    enabled: bool,
    path: PathBuf,
    max_bytes: u64,
}

impl EchoLog {
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            enabled,
            path: path.into(),
            max_bytes: ECHO_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Echo log enabled by [`ECHO_ENV_VAR`]: any non-empty value other than `0`.
    pub fn from_env(path: impl Into<PathBuf>) -> Self {
        let enabled = std::env::var(ECHO_ENV_VAR)
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);
        Self::new(path, enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previous generation of the log.
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    pub fn has_echo_in_body(body: &str) -> bool {
        body.contains(ECHO_MARKER)
    }

    /// Hash identifying a `(url, body)` pair in the log.
    pub fn request_hash(url: &str, body: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update(b"|");
        hasher.update(body.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Append a request to the log. Failures are logged, never returned.
    pub async fn record(&self, url: &str, body: &str) {
        let line = format!("{}\t{}?{}\n", Self::request_hash(url, body), url, body);
        if let Err(e) = self.append(&line).await {
            error!(path = %self.path.display(), error = %e, "Failed to write echo log");
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        self.rotate_if_full().await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await
    }

    async fn rotate_if_full(&self) -> std::io::Result<()> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if size >= self.max_bytes {
            debug!(path = %self.path.display(), size, "Rotating echo log");
            tokio::fs::rename(&self.path, self.rotated_path()).await?;
        }
        Ok(())
    }

    /// Content recorded for a replay request, or a descriptive "unfound"
    /// string. The echo marker is removed from the body before hashing.
    pub async fn lookup(&self, url: &str, body: &str) -> String {
        let hash = Self::request_hash(url, &body.replace(ECHO_MARKER, ""));

        let mut lines = match tail_lines(&self.path, ECHO_TAIL_LINES).await {
            Ok(lines) => lines,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Echo log unavailable");
                return "unfound echoproxy.log".to_string();
            }
        };
        let missing = ECHO_TAIL_LINES - lines.len();
        if missing > 0 {
            if let Ok(mut older) = tail_lines(&self.rotated_path(), missing).await {
                older.append(&mut lines);
                lines = older;
            }
        }

        lines
            .iter()
            .find_map(|line| recorded_content(line, &hash))
            .map(str::to_string)
            .unwrap_or_else(|| format!("unfound {}", hash))
    }
}

/// Last `count` lines of a file, read backwards from its end.
async fn tail_lines(path: &Path, count: usize) -> std::io::Result<Vec<String>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    let mut tail: Vec<u8> = Vec::new();

    // one newline more than lines wanted guarantees the first kept line is whole
    while pos > 0 && tail.iter().filter(|b| **b == b'\n').count() <= count {
        let read_len = TAIL_BLOCK_SIZE.min(pos);
        pos -= read_len;
        file.seek(SeekFrom::Start(pos)).await?;

        let mut block = vec![0u8; read_len as usize];
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&tail);
        tail = block;
    }

    let text = String::from_utf8_lossy(&tail);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].iter().map(|line| line.to_string()).collect())
}

/// Field following `hash` in a tab separated log line.
fn recorded_content<'a>(line: &'a str, hash: &str) -> Option<&'a str> {
    let mut fields = line.split('\t');
    fields.by_ref().find(|field| *field == hash)?;
    fields.next()
}
