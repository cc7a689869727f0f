//! Line-oriented macro preprocessor: `#define`, `#undef`, and `#include`.
//!
//! Mirrors the structure of a classic single-pass text preprocessor: scan
//! line by line, dispatch directive lines, and recursively expand macro
//! identifiers in content lines. An "expanding" stack per macro name
//! prevents `#define X X`-style self-reference from looping forever; a
//! separate "including" stack of canonicalized paths does the same for
//! `#include` cycles.

use cplus_core::{DiagnosticEngine, SourceLocation};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct Macro {
    params: Vec<String>,
    is_function_like: bool,
    replacement: String,
}

/// Hook for `#include <...>` resolution; quoted includes never need this
/// since they always search relative to the cwd and the including file's
/// directory first.
#[derive(Debug, Clone, Default)]
pub struct IncludeSearchPaths(pub Vec<PathBuf>);

pub struct Preprocessor<'a> {
    macros: HashMap<String, Macro>,
    expanding: Vec<String>,
    including: Vec<PathBuf>,
    search_paths: &'a IncludeSearchPaths,
    diagnostics: &'a mut DiagnosticEngine,
}

impl<'a> Preprocessor<'a> {
    pub fn new(diagnostics: &'a mut DiagnosticEngine, search_paths: &'a IncludeSearchPaths) -> Self {
        Preprocessor {
            macros: HashMap::new(),
            expanding: Vec::new(),
            including: Vec::new(),
            search_paths,
            diagnostics,
        }
    }

    /// Processes `source` as if it lived at `file_path`, expanding macros
    /// and inlining `#include`d files. Returns the fully expanded text.
    pub fn process_file(&mut self, file_path: &Path, source: &str) -> String {
        let canonical = file_path
            .canonicalize()
            .unwrap_or_else(|_| file_path.to_path_buf());
        if self.including.contains(&canonical) {
            self.diagnostics.error(
                SourceLocation::new(file_path, 1, 1),
                format!("circular #include detected for '{}'", file_path.display()),
            );
            return String::new();
        }
        self.including.push(canonical);
        let dir = file_path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut out = String::with_capacity(source.len());
        for (line_no, line) in source.lines().enumerate() {
            let line_no = line_no + 1;
            if let Some(processed) = self.process_line(file_path, &dir, line_no, line) {
                out.push_str(&processed);
            }
            out.push('\n');
        }

        self.including.pop();
        out
    }

    fn process_line(
        &mut self,
        file_path: &Path,
        dir: &Path,
        line_no: usize,
        line: &str,
    ) -> Option<String> {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start();
            if let Some(def) = rest.strip_prefix("define") {
                self.parse_define(file_path, line_no, def);
                return None;
            }
            if let Some(name) = rest.strip_prefix("undef") {
                let name = name.trim();
                self.macros.remove(name);
                return None;
            }
            if let Some(inc) = rest.strip_prefix("include") {
                return Some(self.process_include(file_path, dir, line_no, inc.trim()));
            }
            self.diagnostics.error(
                SourceLocation::new(file_path, line_no, 1),
                format!("unknown preprocessor directive '{}'", rest),
            );
            return None;
        }

        Some(self.expand_macros(file_path, line_no, line))
    }

    fn process_include(
        &mut self,
        file_path: &Path,
        dir: &Path,
        line_no: usize,
        directive: &str,
    ) -> String {
        let (target, quoted) = if let Some(rest) = directive.strip_prefix('"') {
            match rest.find('"') {
                Some(end) => (rest[..end].to_string(), true),
                None => {
                    self.diagnostics.error(
                        SourceLocation::new(file_path, line_no, 1),
                        "unterminated #include \"...\"",
                    );
                    return String::new();
                }
            }
        } else if let Some(rest) = directive.strip_prefix('<') {
            match rest.find('>') {
                Some(end) => (rest[..end].to_string(), false),
                None => {
                    self.diagnostics.error(
                        SourceLocation::new(file_path, line_no, 1),
                        "unterminated #include <...>",
                    );
                    return String::new();
                }
            }
        } else {
            self.diagnostics.error(
                SourceLocation::new(file_path, line_no, 1),
                "expected \"path\" or <path> after #include",
            );
            return String::new();
        };

        let resolved = if quoted {
            let in_cwd = PathBuf::from(&target);
            let in_dir = dir.join(&target);
            if in_cwd.is_file() {
                Some(in_cwd)
            } else if in_dir.is_file() {
                Some(in_dir)
            } else {
                None
            }
        } else {
            self.search_paths
                .0
                .iter()
                .map(|p| p.join(&target))
                .find(|p| p.is_file())
        };

        match resolved {
            Some(path) => match fs::read_to_string(&path) {
                Ok(contents) => self.process_file(&path, &contents),
                Err(err) => {
                    self.diagnostics.error(
                        SourceLocation::new(file_path, line_no, 1),
                        format!("could not read included file '{}': {err}", path.display()),
                    );
                    String::new()
                }
            },
            None => {
                self.diagnostics.error(
                    SourceLocation::new(file_path, line_no, 1),
                    format!("#include target '{}' not found", target),
                );
                String::new()
            }
        }
    }

    fn parse_define(&mut self, file_path: &Path, line_no: usize, rest: &str) {
        let rest = rest.trim_start();
        let name_end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        if name_end == 0 {
            self.diagnostics.error(
                SourceLocation::new(file_path, line_no, 1),
                "expected macro name after #define",
            );
            return;
        }
        let name = rest[..name_end].to_string();
        let after_name = &rest[name_end..];

        if let Some(after_paren) = after_name.strip_prefix('(') {
            let close = match after_paren.find(')') {
                Some(i) => i,
                None => {
                    self.diagnostics.error(
                        SourceLocation::new(file_path, line_no, 1),
                        "expected ')' after macro parameters",
                    );
                    return;
                }
            };
            let params: Vec<String> = after_paren[..close]
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let replacement = after_paren[close + 1..].trim_start().to_string();
            self.macros.insert(
                name,
                Macro {
                    params,
                    is_function_like: true,
                    replacement,
                },
            );
        } else {
            let replacement = after_name.trim_start().to_string();
            self.macros.insert(
                name,
                Macro {
                    params: Vec::new(),
                    is_function_like: false,
                    replacement,
                },
            );
        }
    }

    fn expand_macros(&mut self, file_path: &Path, line_no: usize, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if !c.is_alphabetic() && c != '_' {
                out.push(c);
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            let is_expanding = self.expanding.contains(&ident);
            let macro_def = self.macros.get(&ident).cloned();

            match macro_def {
                Some(m) if !is_expanding && m.is_function_like => {
                    let mut after = i;
                    while after < chars.len() && chars[after].is_whitespace() {
                        after += 1;
                    }
                    if after < chars.len() && chars[after] == '(' {
                        let (args, consumed_to) = Self::scan_args(&chars, after);
                        if args.len() != m.params.len() {
                            self.diagnostics.error(
                                SourceLocation::new(file_path, line_no, start + 1),
                                format!(
                                    "macro '{}' expects {} argument(s), got {}",
                                    ident,
                                    m.params.len(),
                                    args.len()
                                ),
                            );
                        } else {
                            let substituted = Self::substitute_params(&m, &args);
                            self.expanding.push(ident.clone());
                            let expanded = self.expand_macros(file_path, line_no, &substituted);
                            self.expanding.pop();
                            out.push_str(&expanded);
                        }
                        i = consumed_to;
                    } else {
                        out.push_str(&ident);
                    }
                }
                Some(m) if !is_expanding => {
                    self.expanding.push(ident.clone());
                    let expanded = self.expand_macros(file_path, line_no, &m.replacement);
                    self.expanding.pop();
                    out.push_str(&expanded);
                }
                _ => out.push_str(&ident),
            }
        }
        out
    }

    /// Scans a parenthesized, comma-separated argument list starting at the
    /// `(` found at `open`. Returns the trimmed argument texts and the index
    /// just past the matching `)`.
    fn scan_args(chars: &[char], open: usize) -> (Vec<String>, usize) {
        let mut args = Vec::new();
        let mut depth = 0;
        let mut arg_start = open + 1;
        let mut i = open;
        while i < chars.len() {
            match chars[i] {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let arg: String = chars[arg_start..i].iter().collect();
                        let trimmed = arg.trim();
                        if !trimmed.is_empty() || !args.is_empty() || arg_start < i {
                            args.push(trimmed.to_string());
                        }
                        i += 1;
                        return (
                            if args.len() == 1 && args[0].is_empty() {
                                Vec::new()
                            } else {
                                args
                            },
                            i,
                        );
                    }
                }
                ',' if depth == 1 => {
                    let arg: String = chars[arg_start..i].iter().collect();
                    args.push(arg.trim().to_string());
                    arg_start = i + 1;
                }
                _ => {}
            }
            i += 1;
        }
        (args, i)
    }

    fn substitute_params(m: &Macro, args: &[String]) -> String {
        let mut out = String::with_capacity(m.replacement.len());
        let chars: Vec<char> = m.replacement.chars().collect();
        let mut i = 0;
        'outer: while i < chars.len() {
            if chars[i].is_alphabetic() || chars[i] == '_' {
                let start = i;
                let mut j = i;
                while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                let word: String = chars[start..j].iter().collect();
                for (p_idx, param) in m.params.iter().enumerate() {
                    if *param == word {
                        out.push_str(&args[p_idx]);
                        i = j;
                        continue 'outer;
                    }
                }
                out.push_str(&word);
                i = j;
                continue;
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (String, DiagnosticEngine) {
        let mut diag = DiagnosticEngine::new();
        let search = IncludeSearchPaths::default();
        let out = {
            let mut pp = Preprocessor::new(&mut diag, &search);
            pp.process_file(Path::new("t.cp"), source)
        };
        (out, diag)
    }

    #[test]
    fn object_like_macro_expands() {
        let (out, diag) = run("#define FOO 42\nint x = FOO;");
        assert!(!diag.has_errors());
        assert!(out.contains("int x = 42;"));
    }

    #[test]
    fn function_like_macro_double_expands_argument() {
        let (out, diag) = run("#define SQ(x) ((x)*(x))\nint main() { return SQ(3+1); }");
        assert!(!diag.has_errors());
        assert!(out.contains("((3+1)*(3+1))"));
    }

    #[test]
    fn self_referential_object_macro_does_not_loop() {
        let (out, diag) = run("#define X X\nint y = X;");
        assert!(!diag.has_errors());
        assert!(out.contains("int y = X;"));
    }

    #[test]
    fn mutually_recursive_macros_do_not_loop() {
        let (out, diag) = run("#define A B\n#define B A\nint z = A;");
        assert!(!diag.has_errors());
        // A -> B -> A (blocked, A already expanding) -> "A"
        assert!(out.contains("int z = A;"));
    }

    #[test]
    fn wrong_arity_call_is_an_error() {
        let (_out, diag) = run("#define ADD(a, b) ((a)+(b))\nint r = ADD(1);");
        assert!(diag.has_errors());
    }

    #[test]
    fn undef_removes_macro() {
        let (out, diag) = run("#define FOO 1\n#undef FOO\nint x = FOO;");
        assert!(!diag.has_errors());
        assert!(out.contains("int x = FOO;"));
    }

    #[test]
    fn plain_text_without_directives_is_identity_up_to_trailing_newline() {
        let (out, _diag) = run("int main() { return 0; }");
        assert_eq!(out.trim_end(), "int main() { return 0; }");
    }
}
