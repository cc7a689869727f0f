//! Compiler configuration for extensibility.
//!
//! A builder-style struct: knobs that matter to a library caller
//! (embedding `cplusc` in another tool) but have no natural CLI flag, or
//! that the CLI flag simply sets on this struct before handing it to
//! [`crate::compile_file_with_config`].

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Which of the two code generators produces the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Llvm,
    Cat,
}

impl Backend {
    pub fn parse(name: &str) -> Option<Backend> {
        match name {
            "llvm" => Some(Backend::Llvm),
            "cat" => Some(Backend::Cat),
            _ => None,
        }
    }
}

/// Minimum ring-buffer lookahead the parser will accept; below this the
/// grammar's longest fixed lookahead (the `global_var`/`function`
/// disambiguation) could run past the buffer's end.
pub const MIN_LOOKAHEAD: usize = 5;
const DEFAULT_LOOKAHEAD: usize = 50;

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Which backend `compile_file_with_config` invokes.
    pub backend: Backend,

    /// Output path override; defaults to the input file's stem when unset.
    pub output: Option<PathBuf>,

    /// Keep the intermediate `.ll` file next to the LLVM backend's output
    /// instead of deleting it once `clang` has consumed it.
    pub keep_ir: bool,

    /// Search directories consulted for `#include <...>`; this is the
    /// host-integration hook for angle-bracket includes, which have no
    /// default search path of their own. Quoted includes never consult
    /// this list.
    pub include_search_paths: Vec<PathBuf>,

    /// Parser ring-buffer lookahead width; clamped to [`MIN_LOOKAHEAD`].
    pub lookahead: usize,

    /// Extra `-L` directories passed to `clang` when linking the LLVM
    /// backend's output into an executable.
    pub library_paths: Vec<PathBuf>,

    /// Extra `-l` libraries passed to `clang`, e.g. a host-supplied `c+`
    /// runtime implementing the `__cplus_*` built-in functions. This
    /// crate never defines them itself.
    pub libraries: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            backend: Backend::default(),
            output: None,
            keep_ir: false,
            include_search_paths: Vec::new(),
            lookahead: DEFAULT_LOOKAHEAD,
            library_paths: Vec::new(),
            libraries: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_keep_ir(mut self, keep_ir: bool) -> Self {
        self.keep_ir = keep_ir;
        self
    }

    pub fn with_include_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_search_paths.push(path.into());
        self
    }

    pub fn with_lookahead(mut self, lookahead: usize) -> Self {
        self.lookahead = lookahead.max(MIN_LOOKAHEAD);
        self
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    pub fn with_library(mut self, name: impl Into<String>) -> Self {
        self.libraries.push(name.into());
        self
    }

    /// Parses a `CompilerConfig` from TOML text, e.g. a project's
    /// `cplusc.toml`. Any field the document omits keeps its
    /// [`CompilerConfig::default`] value.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        let parsed: TomlConfig =
            toml::from_str(toml_str).map_err(|e| format!("failed to parse compiler config: {e}"))?;

        let mut config = CompilerConfig::default();
        if let Some(backend) = parsed.backend {
            config.backend = Backend::parse(&backend)
                .ok_or_else(|| format!("unknown backend '{backend}' in compiler config"))?;
        }
        if parsed.output.is_some() {
            config.output = parsed.output;
        }
        if let Some(keep_ir) = parsed.keep_ir {
            config.keep_ir = keep_ir;
        }
        if let Some(lookahead) = parsed.lookahead {
            config.lookahead = lookahead.max(MIN_LOOKAHEAD);
        }
        config.include_search_paths = parsed.include_search_paths;
        config.library_paths = parsed.library_paths;
        config.libraries = parsed.libraries;
        Ok(config)
    }

    /// Loads a `CompilerConfig` from a TOML file on disk.
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("failed to read compiler config '{}': {e}", path.display()))?;
        Self::from_toml(&text)
    }
}

/// On-disk shape of a `CompilerConfig`; every field is optional so a config
/// file only needs to mention the knobs it overrides.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    backend: Option<String>,
    output: Option<PathBuf>,
    keep_ir: Option<bool>,
    #[serde(default)]
    include_search_paths: Vec<PathBuf>,
    lookahead: Option<usize>,
    #[serde(default)]
    library_paths: Vec<PathBuf>,
    #[serde(default)]
    libraries: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend_is_llvm() {
        assert_eq!(CompilerConfig::default().backend, Backend::Llvm);
    }

    #[test]
    fn backend_parse_rejects_unknown_names() {
        assert_eq!(Backend::parse("llvm"), Some(Backend::Llvm));
        assert_eq!(Backend::parse("cat"), Some(Backend::Cat));
        assert_eq!(Backend::parse("wasm"), None);
    }

    #[test]
    fn lookahead_is_clamped_to_minimum() {
        let config = CompilerConfig::new().with_lookahead(1);
        assert_eq!(config.lookahead, MIN_LOOKAHEAD);
    }

    #[test]
    fn builder_accumulates_include_search_paths() {
        let config = CompilerConfig::new()
            .with_include_search_path("/usr/include/c+")
            .with_include_search_path("/opt/c+/include");
        assert_eq!(config.include_search_paths.len(), 2);
    }

    #[test]
    fn from_toml_overrides_only_the_fields_it_mentions() {
        let toml = r#"
            backend = "cat"
            keep_ir = true
            libraries = ["c+"]
        "#;
        let config = CompilerConfig::from_toml(toml).expect("valid config parses");
        assert_eq!(config.backend, Backend::Cat);
        assert!(config.keep_ir);
        assert_eq!(config.libraries, vec!["c+".to_string()]);
        assert_eq!(config.lookahead, DEFAULT_LOOKAHEAD);
        assert!(config.output.is_none());
    }

    #[test]
    fn from_toml_rejects_unknown_backend() {
        let result = CompilerConfig::from_toml("backend = \"wasm\"");
        assert!(result.is_err());
    }

    #[test]
    fn from_toml_clamps_lookahead_to_minimum() {
        let config = CompilerConfig::from_toml("lookahead = 1").expect("valid config parses");
        assert_eq!(config.lookahead, MIN_LOOKAHEAD);
    }

    #[test]
    fn load_from_file_reads_and_parses_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cplusc.toml");
        std::fs::write(&path, "backend = \"llvm\"\ninclude_search_paths = [\"/opt/c+/include\"]").unwrap();
        let config = CompilerConfig::load_from_file(&path).expect("file loads and parses");
        assert_eq!(config.backend, Backend::Llvm);
        assert_eq!(config.include_search_paths, vec![PathBuf::from("/opt/c+/include")]);
    }
}
