/// Vulkan validation messages forwarded into the RHI logger
///
/// Compiled only with the `vulkan-validation` feature. The messenger callback
/// maps each message to a `LogSeverity`, logs it under
/// `"ten_rhi::vulkan::validation"` and bumps a per-severity counter.

use ash::vk;
use std::ffi::CStr;
use std::sync::atomic::{AtomicU32, Ordering};
use ten_rhi::rhi::log::LogSeverity;
use ten_rhi::rhi::{Error, Rhi, Result};
use ten_rhi::rhi_error;

const VALIDATION_SOURCE: &str = "ten_rhi::vulkan::validation";

/// Global validation statistics (thread-safe atomic counters)
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Validation message counts since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn record(&self, severity: LogSeverity) {
        let counter = match severity {
            LogSeverity::Error => &self.errors,
            LogSeverity::Warn => &self.warnings,
            LogSeverity::Info | LogSeverity::Debug => &self.info,
            LogSeverity::Trace => &self.verbose,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn get(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Current validation statistics (process-wide)
pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.get()
}

pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
}

/// Log severity of a validation message
pub(crate) fn message_severity(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> LogSeverity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        LogSeverity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        LogSeverity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        LogSeverity::Debug
    } else {
        LogSeverity::Trace
    }
}

pub(crate) fn message_category(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

/// Count and log one message
pub(crate) fn forward_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    message_id: &str,
    message: &str,
) {
    let log_severity = message_severity(severity);
    VALIDATION_STATS.record(log_severity);
    Rhi::log(
        log_severity,
        VALIDATION_SOURCE,
        format!("[{}] {}: {}", message_category(message_type), message_id, message),
    );
}

unsafe fn c_str_or<'a>(ptr: *const std::os::raw::c_char, fallback: &'a str) -> std::borrow::Cow<'a, str> {
    if ptr.is_null() {
        std::borrow::Cow::Borrowed(fallback)
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// Vulkan debug messenger callback
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = unsafe { &*p_callback_data };
    let message_id = unsafe { c_str_or(callback_data.p_message_id_name, "Unknown") };
    let message = unsafe { c_str_or(callback_data.p_message, "No message") };
    forward_message(message_severity, message_type, &message_id, &message);
    vk::FALSE // Don't abort Vulkan execution
}

/// Debug utils messenger and the loader that destroys it
pub(crate) struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&debug_info, None) }.map_err(|e| {
            rhi_error!(crate::vulkan_context::SOURCE, "Failed to create debug messenger: {:?}", e);
            Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
        })?;
        reset_validation_stats();
        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger; must run before the instance is destroyed
    pub fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.messenger, None) };
    }
}

#[cfg(test)]
#[path = "vulkan_debug_tests.rs"]
mod tests;
