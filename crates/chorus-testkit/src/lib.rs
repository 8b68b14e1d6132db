//! Chorus Testing Infrastructure
//!
//! Deterministic stand-ins for every remote collaborator of a feed session:
//!
//! - [`MockRemote`]: REST engagement and post endpoints with scripted
//!   outcomes, latency and call recording
//! - [`InMemoryRelay`]: an in-process broadcast server that acknowledges
//!   publishes, fans posts out between sessions, and can drop or refuse links
//! - [`fixtures`]: small builders for posts and feed entries
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! chorus-testkit = { path = "../chorus-testkit" }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod fixtures;
pub mod mock_remote;
pub mod relay;

pub use fixtures::*;
pub use mock_remote::{MockOutcome, MockRemote, RecordedCall};
pub use relay::{InMemoryRelay, RelayTransport};

/// Install a test-friendly tracing subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
