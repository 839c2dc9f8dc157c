//! Logger setup for the native binary.

use crate::config::LogLevel;

/// Initialize `env_logger` at the given level.
///
/// `RUST_LOG` still takes precedence when set. Calling this twice is
/// harmless; the second call only logs a debug message.
pub fn init(level: LogLevel) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level.to_level_filter())
        .format_timestamp_millis()
        .parse_default_env();

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init(LogLevel::Debug);
        init(LogLevel::Warn);
        assert!(log::max_level() != log::LevelFilter::Off);
    }
}
