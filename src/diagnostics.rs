//! Non-fatal failure reporting.
//!
//! Broken extensions and contained panics are reported as [`Diagnostic`]s
//! through a [`DiagnosticSink`] instead of tearing the run down. Embedders
//! choose where those reports land; the default forwards to `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One non-fatal report produced during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Where the failing extension was configured to come from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_location: Option<String>,
    /// Captured backtrace for construction failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            source_location: None,
            backtrace: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_source_location(mut self, location: impl Into<String>) -> Self {
        self.source_location = Some(location.into());
        self
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = Some(backtrace.into());
        self
    }
}

/// Destination for diagnostics raised while scheduling.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: forwards each diagnostic to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        let location = diagnostic.source_location.as_deref().unwrap_or("");
        match diagnostic.severity {
            Severity::Error => error!(source = location, "{}", diagnostic.message),
            Severity::Warning => warn!(source = location, "{}", diagnostic.message),
            Severity::Info => info!(source = location, "{}", diagnostic.message),
        }
    }
}

/// Sink that retains diagnostics in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().unwrap().clone()
    }

    /// Drain and return everything reported so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.lock().unwrap().push(diagnostic);
    }
}

/// Best-effort text for a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
