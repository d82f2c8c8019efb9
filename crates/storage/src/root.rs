//! Cache root directory resolution.

use std::path::{Path, PathBuf};
use tracing::warn;

use ogc_common::{ProxyError, ProxyResult};

/// Check that `value` can be used as a single path component under the
/// cache root: not empty, not `.` or `..`, no separator and no NUL.
pub fn check_path_component(param: &str, value: &str) -> ProxyResult<()> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ProxyError::InvalidParameter {
            param: param.to_string(),
            message: format!("'{}' is not a valid cache path component", value.escape_debug()),
        });
    }
    Ok(())
}

/// Check that `dir` is a directory the process can create files in.
pub fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && tempfile::Builder::new().prefix(".probe").tempfile_in(dir).is_ok()
}

/// Resolve the cache root, falling back to the system temp directory when
/// the configured root is not a writable directory.
///
/// A misconfigured cache path must not fail requests: the fallback is
/// reported on the admin log only.
pub fn resolve_cache_root(configured: &Path) -> PathBuf {
    if is_writable_dir(configured) {
        return configured.to_path_buf();
    }

    let fallback = std::env::temp_dir();
    warn!(
        target: "admin",
        configured = %configured.display(),
        fallback = %fallback.display(),
        "Cache root directory is not a directory or is not writable"
    );
    fallback
}
