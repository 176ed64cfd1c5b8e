/// Process-wide RHI services
///
/// The only state shared by the whole process is the log sink. Devices are
/// never global: they are created through a [`crate::device::BackendRegistry`]
/// and owned by the caller.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are dropped before reaching the logger
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Info as u8);

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

// ===== PUBLIC API =====

/// Entry point for process-wide RHI services (logging)
pub struct Rhi;

impl Rhi {
    /// Set a custom logger
    ///
    /// # Arguments
    ///
    /// * `logger` - Any type implementing the Logger trait
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ten_rhi::rhi::Rhi;
    /// use ten_rhi::rhi::log::{Logger, LogEntry};
    ///
    /// struct Quiet;
    /// impl Logger for Quiet {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Rhi::set_logger(Quiet);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(logger_impl);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Set the minimum severity forwarded to the logger (default: Info)
    pub fn set_min_severity(severity: LogSeverity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    /// Current minimum severity
    pub fn min_severity() -> LogSeverity {
        LogSeverity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like rhi_info!, rhi_warn!, etc.
    ///
    /// # Arguments
    ///
    /// * `severity` - Log severity level
    /// * `source` - Source component (e.g., "ten_rhi::software")
    /// * `message` - Log message
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(severity, source, message, None, None);
    }

    /// Internal logging method with file:line information (for ERROR logs)
    ///
    /// Used by rhi_error!, rhi_err!, rhi_bail! and rhi_invalid! to include source location.
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::dispatch(severity, source, message, Some(file), Some(line));
    }

    fn dispatch(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: Option<&'static str>,
        line: Option<u32>,
    ) {
        if severity < Self::min_severity() {
            return;
        }
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file,
                line,
            });
        }
    }
}

#[cfg(test)]
#[path = "rhi_core_tests.rs"]
mod tests;
