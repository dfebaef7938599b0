use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing` subscriber once per test binary so failures show
/// the runtime's `debug!`/`trace!` output instead of nothing.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
    });
}
