//! C+ Core: source locations, diagnostics, and small utilities shared
//! across the preprocessor, lexer, parser, analyzer, and both backends.
//!
//! # Modules
//!
//! - `source`: `SourceLocation`, attached to every token, AST node, and
//!   diagnostic.
//! - `diagnostics`: the collect-then-print `DiagnosticEngine` used at every
//!   pipeline stage boundary.
//! - `ringbuf`: a bounded ring buffer backing the parser's lookahead.

pub mod diagnostics;
pub mod ringbuf;
pub mod source;

pub use diagnostics::{Diagnostic, DiagnosticEngine, Level};
pub use ringbuf::RingBuffer;
pub use source::SourceLocation;
