//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with an explicit filter string (e.g. `"info"`,
/// `"dual_engine=debug"`). `RUST_LOG` still wins when it is set.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_with_level(level: &str) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if builder.try_init().is_err() {
        log::trace!("Logger already initialized, keeping existing configuration");
    }
}
