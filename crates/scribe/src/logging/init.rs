use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// `filter` follows the `env_logger` syntax (e.g. `"info"` or
/// `"scribe=debug,wgpu=warn"`). When `None`, `RUST_LOG` is honored,
/// falling back to warn level — a library overlay should stay quiet
/// unless asked.
///
/// This function is idempotent; subsequent calls are ignored.
pub fn init_logging(filter: Option<&str>) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = filter {
            builder.parse_filters(filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Warn);
        }

        builder.init();

        log::debug!("logging initialized");
    });
}
