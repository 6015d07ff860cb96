//! Proxy diagnostics
//!
//! The proxy layer never aborts construction over a member it cannot
//! forward and never panics on a bad update; those conditions are recorded
//! here instead. A healthy create/get/update/refresh cycle records nothing,
//! which tests assert directly.

use parking_lot::Mutex;

/// Severity of a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// Degraded but usable (e.g. a member left bound to its original)
    Warning,
    /// A rejected operation (e.g. an update with a non-class value)
    Error,
}

/// A single recorded condition
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity
    pub level: DiagnosticLevel,
    /// Human-readable description
    pub message: String,
}

/// Shared collector of proxy diagnostics
#[derive(Default)]
pub struct DiagnosticSink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning
    pub fn warn(&self, message: impl Into<String>) {
        self.entries.lock().push(Diagnostic {
            level: DiagnosticLevel::Warning,
            message: message.into(),
        });
    }

    /// Record an error
    pub fn error(&self, message: impl Into<String>) {
        self.entries.lock().push(Diagnostic {
            level: DiagnosticLevel::Error,
            message: message.into(),
        });
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    /// Drain everything recorded so far
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of recorded warnings
    pub fn warning_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }
}

impl std::fmt::Debug for DiagnosticSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticSink")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let sink = DiagnosticSink::new();
        assert!(sink.is_empty());
        assert_eq!(sink.warning_count(), 0);
    }

    #[test]
    fn test_records_levels() {
        let sink = DiagnosticSink::new();
        sink.warn("left bound to original");
        sink.error("rejected");

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, DiagnosticLevel::Warning);
        assert_eq!(entries[1].level, DiagnosticLevel::Error);
        assert_eq!(sink.warning_count(), 1);
    }

    #[test]
    fn test_take_drains() {
        let sink = DiagnosticSink::new();
        sink.warn("once");
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }
}
