//! Progress log broadcasting.
//!
//! Pipeline progress lines go through a global broadcaster that echoes them
//! to stderr and fans them out to subscribers (the stub server streams them
//! as Server-Sent Events). [`init`] also routes `log` facade records into the
//! same sink, so one place handles both.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::MAX_LOG_ENTRIES;

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level for grouped lines
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Broadcasts log entries to all subscribers
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
    echo: AtomicBool,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(MAX_LOG_ENTRIES);
        Self {
            sender,
            echo: AtomicBool::new(true),
        }
    }

    /// Send a log entry to all subscribers
    pub fn log(&self, entry: LogEntry) {
        if self.echo.load(Ordering::Relaxed) {
            let prefix = match entry.level {
                LogLevel::Info => "  ",
                LogLevel::Success => "✓ ",
                LogLevel::Warning => "⚠️ ",
                LogLevel::Error => "❌",
            };
            let indent = "   ".repeat(entry.indent as usize);
            eprintln!("{}{} {}", indent, prefix, entry.message);
        }

        // No receivers is fine
        let _ = self.sender.send(entry);
    }

    /// Get a receiver for streaming
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Turn stderr echo on or off (subscribers still receive entries).
    pub fn set_echo(&self, echo: bool) {
        self.echo.store(echo, Ordering::Relaxed);
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// `log` facade backend forwarding into [`LOG_BROADCASTER`].
struct BroadcastLogger;

impl log::Log for BroadcastLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let entry = match record.level() {
            log::Level::Error => LogEntry::error(message),
            log::Level::Warn => LogEntry::warning(message),
            log::Level::Info => LogEntry::info(message),
            log::Level::Debug | log::Level::Trace => LogEntry::info(message).with_indent(1),
        };
        LOG_BROADCASTER.log(entry);
    }

    fn flush(&self) {}
}

static LOGGER: BroadcastLogger = BroadcastLogger;

/// Install the broadcaster as the `log` backend.
///
/// Calling it twice is harmless; the first logger stays installed.
pub fn init(level: log::LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribers_receive_entries() {
        let broadcaster = LogBroadcaster::new();
        broadcaster.set_echo(false);
        let mut rx = broadcaster.subscribe();

        broadcaster.log(LogEntry::success("Validated 12 rows").with_indent(1));

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert_eq!(entry.indent, 1);
        assert_eq!(entry.message, "Validated 12 rows");
    }

    #[test]
    fn test_entry_wire_format() {
        let json = serde_json::to_value(LogEntry::warning("3 rows dropped")).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["indent"], 0);
    }
}
