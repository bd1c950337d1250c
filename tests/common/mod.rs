//! Common test utilities.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[test]
//! fn my_test() {
//!     common::init_tracing();
//!     // ... test body; RUST_LOG filters apply when built with --features tracing
//! }
//! ```

#![allow(dead_code)]

use std::sync::Once;

/// Ensures tracing is only initialized once across all tests.
static INIT: Once = Once::new();

/// Initialize a console tracing subscriber driven by `RUST_LOG`.
///
/// Safe to call multiple times - only the first call takes effect. A no-op
/// unless the crate is built with `--features tracing` (the instrumentation
/// macros compile to nothing otherwise, so there is nothing to collect).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
