//! Reporting sink injected into the pipeline stages.
//!
//! Stages never reach for process-wide state to report what happened.
//! Instead they receive an `Arc<dyn ReportSink>` and emit [`ReportEvent`]s
//! through it. [`LogSink`] forwards to the `log` facade, [`NullSink`]
//! discards everything, and [`MemorySink`] keeps events around so tests can
//! assert on them.

use std::sync::{Arc, Mutex, PoisonError};

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something was skipped or assumed; the run continues.
    Warning,
    /// Something failed; the run may still continue.
    Error,
}

/// One reported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEvent {
    /// How serious the event is.
    pub severity: Severity,
    /// Component or source id the event belongs to (e.g. `"cache"`,
    /// `"taipei_city"`).
    pub scope: String,
    /// Human-readable message.
    pub message: String,
}

/// Destination for pipeline events.
///
/// Implementations must be `Send + Sync` so one sink can be shared across
/// concurrently running source tasks.
pub trait ReportSink: Send + Sync {
    /// Records a single event.
    fn report(&self, event: ReportEvent);

    /// Records a debug event.
    fn debug(&self, scope: &str, message: &str) {
        self.report(ReportEvent {
            severity: Severity::Debug,
            scope: scope.to_string(),
            message: message.to_string(),
        });
    }

    /// Records an info event.
    fn info(&self, scope: &str, message: &str) {
        self.report(ReportEvent {
            severity: Severity::Info,
            scope: scope.to_string(),
            message: message.to_string(),
        });
    }

    /// Records a warning.
    fn warn(&self, scope: &str, message: &str) {
        self.report(ReportEvent {
            severity: Severity::Warning,
            scope: scope.to_string(),
            message: message.to_string(),
        });
    }

    /// Records an error.
    fn error(&self, scope: &str, message: &str) {
        self.report(ReportEvent {
            severity: Severity::Error,
            scope: scope.to_string(),
            message: message.to_string(),
        });
    }
}

/// Forwards every event to the `log` facade, prefixed with its scope.
pub struct LogSink;

impl ReportSink for LogSink {
    fn report(&self, event: ReportEvent) {
        let level = match event.severity {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error => log::Level::Error,
        };
        log::log!(level, "[{}] {}", event.scope, event.message);
    }
}

/// Silently ignores all events.
pub struct NullSink;

impl ReportSink for NullSink {
    fn report(&self, _event: ReportEvent) {}
}

/// Collects events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ReportEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the events at exactly `severity`.
    #[must_use]
    pub fn with_severity(&self, severity: Severity) -> Vec<ReportEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }
}

impl ReportSink for MemorySink {
    fn report(&self, event: ReportEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Returns a shared [`LogSink`].
#[must_use]
pub fn log_sink() -> Arc<dyn ReportSink> {
    Arc::new(LogSink)
}

/// Returns a shared [`NullSink`].
#[must_use]
pub fn null_sink() -> Arc<dyn ReportSink> {
    Arc::new(NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_events_in_order() {
        let sink = MemorySink::new();
        sink.info("cache", "hit");
        sink.warn("taipei_city", "fallback");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].scope, "cache");
        assert_eq!(events[1].severity, Severity::Warning);
    }

    #[test]
    fn filters_by_severity() {
        let sink = MemorySink::new();
        sink.debug("a", "x");
        sink.error("b", "y");
        sink.error("c", "z");

        assert_eq!(sink.with_severity(Severity::Error).len(), 2);
        assert!(sink.with_severity(Severity::Warning).is_empty());
    }
}
