//! Log capture for tests.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is not set: dependencies stay quiet.
const DEFAULT_FILTER: &str = "WARN,loadtest=DEBUG,loadtest_test=DEBUG";

/// Routes logs into the output captured by the test harness.
///
/// Honors `RUST_LOG` when set. Safe to call from every test, only the first call installs the
/// subscriber.
///
/// ```
/// loadtest_test::tracing::init();
/// loadtest_test::tracing::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .without_time()
        .try_init();
}
