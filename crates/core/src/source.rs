//! Source locations shared by every pipeline stage.

use std::fmt;
use std::path::{Path, PathBuf};

/// A single point (or a named point associated with a one-line message) in a
/// source file. Lines and columns are 1-based, matching the convention of
/// every other diagnostic tool a C+ programmer is likely to have used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
            column,
        }
    }

    /// A location with no meaningful file (used for synthesized nodes, e.g.
    /// constructors generated by the compiler rather than parsed).
    pub fn synthetic() -> Self {
        SourceLocation::new(Path::new("<generated>"), 0, 0)
    }

    pub fn file_name(&self) -> String {
        self.file.display().to_string()
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_name(), self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_tool_convention() {
        let loc = SourceLocation::new("main.cp", 12, 5);
        assert_eq!(loc.to_string(), "main.cp:12:5");
    }

    #[test]
    fn synthetic_location_is_stable() {
        let a = SourceLocation::synthetic();
        let b = SourceLocation::synthetic();
        assert_eq!(a, b);
    }
}
