// src/core/diagnostics.rs

//! Problems collected over a run and reported at its end.

use std::fmt::Write;

/// A problem recorded during a run. Errors make the run exit non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Short category, e.g. `ExecutionFailure`.
    pub kind: &'static str,
    /// What happened.
    pub message: String,
}

/// Errors and warnings accumulated during a run, reported together at the end
/// of the log so one look at the tail shows every problem.
#[derive(Debug, Clone, Default)]
pub struct RunDiagnostics {
    errors: Vec<RunError>,
    warnings: Vec<String>,
}

impl RunDiagnostics {
    /// Starts with no problems recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error; the run will exit non-zero.
    pub fn error(&mut self, kind: &'static str, message: impl Into<String>) {
        self.errors.push(RunError {
            kind,
            message: message.into(),
        });
    }

    /// Records a warning.
    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Errors in the order they were recorded.
    pub fn errors(&self) -> &[RunError] {
        &self.errors
    }

    /// Warnings in the order they were recorded.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether any error was recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 1 if any error was recorded, else 0.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_errors())
    }

    /// Renders the end-of-run summary, or `None` when there is nothing to say.
    pub fn summary(&self) -> Option<String> {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return None;
        }
        let mut msg = String::new();
        if !self.warnings.is_empty() {
            msg.push_str("Previous warnings:\n");
            for warning in &self.warnings {
                let _ = writeln!(msg, "  Warning: {}", warning);
            }
        }
        if !self.errors.is_empty() {
            msg.push_str("Previous errors:\n");
            for err in &self.errors {
                let _ = writeln!(msg, "  {}: {}", err.kind, err.message);
            }
        }
        Some(msg)
    }

    /// Logs the summary at info level.
    pub fn report(&self) {
        if let Some(summary) = self.summary() {
            log::info!("{}", summary.trim_end());
        }
    }
}
