//! Logging facade for the scheduler log analysis crates
//!
//! Every crate in the workspace logs through these macros so that a single
//! environment variable controls verbosity:
//! - `SCHEDLOG_LOG=off` (default) - no logs
//! - `SCHEDLOG_LOG=error` / `warn` - failures and degraded loads only
//! - `SCHEDLOG_LOG=info` - catalog builds, view construction
//! - `SCHEDLOG_LOG=debug` - per-file row counts, worker scheduling

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

/// Environment variable selecting the minimum log level.
pub const LOG_ENV: &str = "SCHEDLOG_LOG";

static INIT: Once = Once::new();

/// Map a `SCHEDLOG_LOG` value onto a minimum level; `None` disables logging.
fn parse_level(value: &str) -> Option<Option<emit::Level>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "off" | "" => Some(None),
        "debug" => Some(Some(emit::Level::Debug)),
        "info" => Some(Some(emit::Level::Info)),
        "warn" => Some(Some(emit::Level::Warn)),
        "error" => Some(Some(emit::Level::Error)),
        _ => None,
    }
}

/// Initialize diagnostics based on the `SCHEDLOG_LOG` environment variable
///
/// Call once at application startup. Later calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let value = std::env::var(LOG_ENV).unwrap_or_else(|_| "off".to_string());

        let (level, unknown) = match parse_level(&value) {
            Some(None) => return,
            Some(Some(level)) => (level, false),
            None => (emit::Level::Info, true),
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        if unknown {
            emit::warn!("unknown {var} value {value}, using info", var: LOG_ENV, value: value.as_str());
        }

        // The runtime must outlive every emitting thread, including workers.
        std::mem::forget(rt);
    });
}

/// Log basic operations (catalog builds, view construction)
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Log detailed diagnostics (per-file row counts, worker scheduling)
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Log recoverable problems (skipped files, degraded loads)
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Log failures that abort an operation
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Short form of [`log_info!`]
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::emit::info!($($arg)*)
    };
}

/// Short form of [`log_debug!`]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::emit::debug!($($arg)*)
    };
}

/// Short form of [`log_warn!`]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::emit::warn!($($arg)*)
    };
}

/// Short form of [`log_error!`]
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::emit::error!($($arg)*)
    };
}

/// Re-export the init function for convenience
pub use init_diagnostics as init;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_safe_to_call_multiple_times() {
        init_diagnostics();
        init_diagnostics();
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("off"), Some(None));
        assert_eq!(parse_level(""), Some(None));
        assert_eq!(parse_level("DEBUG"), Some(Some(emit::Level::Debug)));
        assert_eq!(parse_level(" warn "), Some(Some(emit::Level::Warn)));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_macros_compile() {
        log_info!("Test message");
        log_debug!("Debug message with {value}", value: 42);
        info!("Loaded {rows} rows", rows: 10);
        warn!("Skipped {name}", name: "CMAC_dlUeTtiInfo_bad.csv");
        error!("Error message");
    }
}
