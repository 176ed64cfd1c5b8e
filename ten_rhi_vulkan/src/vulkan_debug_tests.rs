//! Unit tests for validation message forwarding (no GPU required)

use super::*;
use serial_test::serial;
use std::sync::{Arc, Mutex};
use ten_rhi::rhi::log::{LogEntry, Logger};

struct CaptureLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// SEVERITY MAPPING TESTS
// ============================================================================

#[test]
fn test_message_severity_mapping() {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
    assert_eq!(message_severity(Sev::ERROR), LogSeverity::Error);
    assert_eq!(message_severity(Sev::WARNING), LogSeverity::Warn);
    assert_eq!(message_severity(Sev::INFO), LogSeverity::Debug);
    assert_eq!(message_severity(Sev::VERBOSE), LogSeverity::Trace);
}

#[test]
fn test_message_category() {
    use vk::DebugUtilsMessageTypeFlagsEXT as Ty;
    assert_eq!(message_category(Ty::VALIDATION), "Validation");
    assert_eq!(message_category(Ty::PERFORMANCE), "Performance");
    assert_eq!(message_category(Ty::GENERAL), "General");
    assert_eq!(message_category(Ty::GENERAL | Ty::VALIDATION), "Validation");
}

// ============================================================================
// FORWARDING TESTS
// ============================================================================

#[test]
#[serial]
fn test_forward_message_counts_by_severity() {
    reset_validation_stats();
    forward_message(
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        "VUID-test",
        "bad thing",
    );
    forward_message(
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        "perf",
        "slow thing",
    );
    forward_message(
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL,
        "loader",
        "chatty",
    );

    let stats = validation_stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.warnings, 1);
    assert_eq!(stats.info, 0);
    assert_eq!(stats.verbose, 1);
    assert_eq!(stats.total(), 3);

    reset_validation_stats();
    assert_eq!(validation_stats(), ValidationStats::default());
}

#[test]
#[serial]
fn test_forward_message_reaches_logger() {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Rhi::set_logger(CaptureLogger { entries: Arc::clone(&entries) });

    forward_message(
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        "VUID-vkCmdDraw-None-02700",
        "render pass mismatch",
    );

    Rhi::reset_logger();

    let entries = entries.lock().unwrap();
    let entry = entries
        .iter()
        .find(|e| e.source == "ten_rhi::vulkan::validation")
        .expect("validation message logged");
    assert_eq!(entry.severity, LogSeverity::Error);
    assert!(entry.message.contains("[Validation]"));
    assert!(entry.message.contains("VUID-vkCmdDraw-None-02700"));
    assert!(entry.message.contains("render pass mismatch"));
}
