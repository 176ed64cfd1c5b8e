//! Internal logging system for the TenEngine RHI
//!
//! This module provides a flexible logging system with:
//! - Customizable logger via Logger trait
//! - Severity levels (Trace, Debug, Info, Warn, Error)
//! - Colored console output by default
//! - File and line information for detailed ERROR logs
//!
//! The active logger and the minimum severity live in [`crate::rhi_core::Rhi`].

use colored::*;
use std::time::SystemTime;
use chrono::{DateTime, Local};

/// Logger trait for custom logging implementations
///
/// Implement this trait to route RHI messages somewhere else (file, engine console, test capture).
///
/// # Example
///
/// ```no_run
/// use ten_rhi::rhi::log::{Logger, LogEntry};
///
/// struct FileLogger {
///     file: std::fs::File,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Write to file...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    ///
    /// # Arguments
    ///
    /// * `entry` - The log entry to process
    fn log(&self, entry: &LogEntry);
}

/// Log entry containing all information about a log message
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level (Trace, Debug, Info, Warn, Error)
    pub severity: LogSeverity,

    /// Timestamp when the log was created
    pub timestamp: SystemTime,

    /// Source component (e.g., "ten_rhi::software", "ten_rhi::vulkan")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for detailed ERROR logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed ERROR logs)
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    /// Very verbose information, used for skipped recording calls
    Trace,

    /// Development/debugging information
    Debug,

    /// Important informational messages
    Info,

    /// Warning messages (potential issues)
    Warn,

    /// Error messages (critical issues with file:line details)
    Error,
}

impl LogSeverity {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => LogSeverity::Trace,
            1 => LogSeverity::Debug,
            2 => LogSeverity::Info,
            3 => LogSeverity::Warn,
            _ => LogSeverity::Error,
        }
    }
}

/// Default logger implementation using colored console output
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger;

impl DefaultLogger {
    /// Format an entry without colors
    pub fn format_plain(entry: &LogEntry) -> String {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f");
        let severity = match entry.severity {
            LogSeverity::Trace => "TRACE",
            LogSeverity::Debug => "DEBUG",
            LogSeverity::Info => "INFO ",
            LogSeverity::Warn => "WARN ",
            LogSeverity::Error => "ERROR",
        };
        match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity, entry.source, entry.message, file, line
            ),
            _ => format!("[{}] [{}] [{}] {}", timestamp, severity, entry.source, entry.message),
        }
    }
}

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp,
                severity_str,
                source,
                entry.message,
                file,
                line
            );
        } else {
            println!(
                "[{}] [{}] [{}] {}",
                timestamp,
                severity_str,
                source,
                entry.message
            );
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (very verbose, filtered out by default)
///
/// # Example
///
/// ```no_run
/// ten_rhi::rhi_trace!("ten_rhi::software", "draw skipped: list not recording");
/// ```
#[macro_export]
macro_rules! rhi_trace {
    ($source:expr, $($arg:tt)*) => {
        $crate::rhi::Rhi::log(
            $crate::rhi::log::LogSeverity::Trace,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a DEBUG message (development information)
#[macro_export]
macro_rules! rhi_debug {
    ($source:expr, $($arg:tt)*) => {
        $crate::rhi::Rhi::log(
            $crate::rhi::log::LogSeverity::Debug,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an INFO message (important events)
///
/// # Example
///
/// ```no_run
/// ten_rhi::rhi_info!("ten_rhi::vulkan", "Device created on {}", "GPU 0");
/// ```
#[macro_export]
macro_rules! rhi_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::rhi::Rhi::log(
            $crate::rhi::log::LogSeverity::Info,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARN message (potential issues)
#[macro_export]
macro_rules! rhi_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::rhi::Rhi::log(
            $crate::rhi::log::LogSeverity::Warn,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log an ERROR message with file:line information
///
/// # Example
///
/// ```no_run
/// ten_rhi::rhi_error!("ten_rhi::vulkan", "Failed to create buffer: {}", "oom");
/// ```
#[macro_export]
macro_rules! rhi_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::rhi::Rhi::log_detailed(
            $crate::rhi::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

/// Log an ERROR message and evaluate to an `Error::BackendError` with the same text
///
/// Meant for `map_err` closures around native calls.
///
/// # Example
///
/// ```no_run
/// # fn f() -> ten_rhi::rhi::Result<()> {
/// let r: Result<(), i32> = Err(-3);
/// r.map_err(|e| ten_rhi::rhi_err!("ten_rhi::vulkan", "vkQueueSubmit failed: {:?}", e))?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! rhi_err {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::rhi::Rhi::log_detailed(
            $crate::rhi::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::rhi::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return `Err(Error::BackendError)` from the enclosing function
#[macro_export]
macro_rules! rhi_bail {
    ($source:expr, $($arg:tt)*) => {
        return Err($crate::rhi_err!($source, $($arg)*))
    };
}

/// Log an ERROR message and return `Err(Error::InvalidArgument)` from the enclosing function
#[macro_export]
macro_rules! rhi_invalid {
    ($source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::rhi::Rhi::log_detailed(
            $crate::rhi::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        return Err($crate::rhi::Error::InvalidArgument(message));
    }};
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
