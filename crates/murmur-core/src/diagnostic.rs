//! One-way diagnostic reporting.
//!
//! Units and the engine never return errors from the audio path. Malformed
//! arguments, missing named targets, and output from `print`-style units are
//! handed to a [`DiagnosticSink`] instead. The default sink forwards to
//! `tracing`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Regular output, e.g. from a `print` unit.
    Info,
    /// Recoverable misconfiguration; a default was used.
    Warning,
    /// Something was dropped or could not be resolved.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Receiver of engine and unit diagnostics.
pub trait DiagnosticSink: Send + Sync {
    /// Reports one diagnostic. `source` is usually a unit label.
    fn report(&self, severity: Severity, source: &str, message: fmt::Arguments<'_>);
}

/// Forwards diagnostics to `tracing` under the `murmur` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, severity: Severity, source: &str, message: fmt::Arguments<'_>) {
        match severity {
            Severity::Info => tracing::info!(target: "murmur", "{source}: {message}"),
            Severity::Warning => tracing::warn!(target: "murmur", "{source}: {message}"),
            Severity::Error => tracing::error!(target: "murmur", "{source}: {message}"),
        }
    }
}

/// A diagnostic captured by [`CollectingSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the report.
    pub severity: Severity,
    /// Reporting unit or subsystem.
    pub source: String,
    /// Rendered message.
    pub message: String,
}

/// Sink that stores every diagnostic, for hosts that poll and for tests.
#[derive(Clone, Debug, Default)]
pub struct CollectingSink {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl CollectingSink {
    /// Creates an empty sink. Clones share storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything collected so far.
    pub fn drain(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Returns the number of stored diagnostics.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, severity: Severity, source: &str, message: fmt::Arguments<'_>) {
        self.entries.lock().push(Diagnostic {
            severity,
            source: source.to_owned(),
            message: message.to_string(),
        });
    }
}
