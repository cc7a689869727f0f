//! Diagnostic collection and reporting.
//!
//! Every pipeline stage reports into a shared [`DiagnosticEngine`] instead of
//! aborting on the first problem, so a single run can surface every lexical,
//! syntactic, and semantic error it finds. Stage boundaries check
//! [`DiagnosticEngine::has_errors`] before handing off to the next stage.

use crate::source::SourceLocation;
use std::fmt;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_RED: &str = "\x1b[1;31m";
const COLOR_YELLOW: &str = "\x1b[1;33m";
const COLOR_CYAN: &str = "\x1b[1;36m";
const COLOR_WHITE: &str = "\x1b[1;37m";
const COLOR_BOLD: &str = "\x1b[1m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
    Info,
}

impl Level {
    fn label(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
            Level::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Level::Error => COLOR_RED,
            Level::Warning => COLOR_YELLOW,
            Level::Note => COLOR_CYAN,
            Level::Info => COLOR_WHITE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub location: SourceLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}: {}{}: {}{}",
            COLOR_BOLD,
            self.location,
            self.level.color(),
            self.level.label(),
            self.message,
            COLOR_RESET
        )
    }
}

/// Accumulates diagnostics across a single compilation.
#[derive(Debug, Default)]
pub struct DiagnosticEngine {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        DiagnosticEngine::default()
    }

    pub fn report(&mut self, level: Level, location: SourceLocation, message: impl Into<String>) {
        match level {
            Level::Error => self.error_count += 1,
            Level::Warning => self.warning_count += 1,
            Level::Note | Level::Info => {}
        }
        self.diagnostics.push(Diagnostic {
            level,
            location,
            message: message.into(),
        });
    }

    pub fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Level::Error, location, message);
    }

    pub fn warning(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Level::Warning, location, message);
    }

    pub fn note(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.report(Level::Note, location, message);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.error_count = 0;
        self.warning_count = 0;
    }

    /// Write every diagnostic to stderr, then a one- or two-line summary.
    pub fn print_all(&self) {
        for d in &self.diagnostics {
            eprintln!("{d}");
        }

        if self.error_count > 0 || self.warning_count > 0 {
            eprintln!();
            if self.error_count > 0 {
                eprintln!(
                    "{}{} error{} generated{}",
                    COLOR_RED,
                    self.error_count,
                    if self.error_count == 1 { "" } else { "s" },
                    COLOR_RESET
                );
            }
            if self.warning_count > 0 {
                eprintln!(
                    "{}{} warning{} generated{}",
                    COLOR_YELLOW,
                    self.warning_count,
                    if self.warning_count == 1 { "" } else { "s" },
                    COLOR_RESET
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.cp", 1, 1)
    }

    #[test]
    fn fresh_engine_has_no_errors() {
        let engine = DiagnosticEngine::new();
        assert!(!engine.has_errors());
        assert!(!engine.has_warnings());
        assert_eq!(engine.error_count(), 0);
    }

    #[test]
    fn error_increments_error_count_only() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(), "boom");
        assert!(engine.has_errors());
        assert_eq!(engine.error_count(), 1);
        assert_eq!(engine.warning_count(), 0);
    }

    #[test]
    fn warning_does_not_count_as_error() {
        let mut engine = DiagnosticEngine::new();
        engine.warning(loc(), "hm");
        assert!(!engine.has_errors());
        assert!(engine.has_warnings());
    }

    #[test]
    fn clear_resets_everything() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(), "boom");
        engine.warning(loc(), "hm");
        engine.clear();
        assert!(!engine.has_errors());
        assert!(!engine.has_warnings());
        assert!(engine.diagnostics().is_empty());
    }

    #[test]
    fn display_contains_level_and_message() {
        let mut engine = DiagnosticEngine::new();
        engine.error(loc(), "undefined symbol 'x'");
        let text = engine.diagnostics()[0].to_string();
        assert!(text.contains("error"));
        assert!(text.contains("undefined symbol 'x'"));
    }
}
