//! Test harness helpers.

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Create a temporary directory for testing.
///
/// The directory is removed when the returned `TempDir` is dropped.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Install a test-writer subscriber with the given filter.
///
/// Safe to call from many tests; only the first call wins.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// [`setup_test_logging`] at `debug` for the Nexus crates.
pub fn init_test_tracing() {
    setup_test_logging("nexus=debug,nexus_approval=debug,nexus_tools=debug,nexus_gateway=debug");
}
