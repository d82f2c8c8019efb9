//! Shared test utilities for the ogc-proxy workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Request fixtures (parameter bags, XML bodies, bounding boxes)
//! - Temporary cache roots
//! - A scripted HTTP origin that records the requests it receives
//! - Skip macros for tests that need an external service
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod origin;

pub use fixtures::*;
pub use origin::{OriginServer, RecordedRequest, ScriptedResponse};

/// Macro to skip a test if an environment variable is not set, yielding its
/// value otherwise.
///
/// Used by tests that need a live service such as Redis.
///
/// # Usage
///
/// ```ignore
/// use test_utils::require_env;
///
/// #[tokio::test]
/// async fn test_against_redis() {
///     let url = require_env!("TEST_REDIS_HOST");
///     // Test code using url...
/// }
/// ```
#[macro_export]
macro_rules! require_env {
    ($name:expr) => {{
        match ::std::env::var($name) {
            Ok(value) if !value.is_empty() => value,
            _ => {
                eprintln!("SKIPPED: environment variable '{}' is not set.", $name);
                return;
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    static REACHED: AtomicBool = AtomicBool::new(false);

    fn guarded() {
        let _value = require_env!("TEST_UTILS_SURELY_UNSET_VARIABLE");
        REACHED.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_require_env_skips_when_unset() {
        guarded();
        assert!(!REACHED.load(Ordering::SeqCst));
    }
}
