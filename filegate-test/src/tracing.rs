use tracing_subscriber::EnvFilter;

/// Log directives for tests: errors from dependencies, everything from filegate itself.
const TEST_DIRECTIVES: &str = "error,filegate=trace,filegate_server=trace,filegate_service=trace";

/// Initialize the logger for testing.
///
/// Output goes through the test writer, so it is only shown for failing tests. `RUST_LOG`
/// overrides the default directives when set.
///
/// # Example
///
/// ```
/// filegate_test::tracing::init();
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(TEST_DIRECTIVES));

    tracing_subscriber::fmt::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}
