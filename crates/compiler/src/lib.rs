//! C+ Compiler Library
//!
//! Drives the full pipeline — preprocess, lex, parse, analyze, generate —
//! from a single entry point, [`compile_file`] (or [`compile_file_with_config`]
//! for callers that need backend selection, `#include <...>` search paths,
//! or extra link libraries).
//!
//! # Example
//!
//! ```rust,ignore
//! use cplusc::{CompilerConfig, compile_file_with_config};
//! use cplusc::config::Backend;
//!
//! let config = CompilerConfig::new().with_backend(Backend::Cat);
//! compile_file_with_config("hello.cp".as_ref(), "hello.asm".as_ref(), &config)?;
//! ```

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod lexer;
pub mod parser;
pub mod preprocessor;
pub mod sema;

pub use ast::Program;
pub use config::{Backend, CompilerConfig};
pub use parser::Parser;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use cplus_core::DiagnosticEngine;
use preprocessor::{IncludeSearchPaths, Preprocessor};

/// Compile a C+ source file using the default configuration (LLVM backend,
/// output path derived from the input file's stem).
pub fn compile_file(source_path: &Path, output_path: &Path) -> Result<(), String> {
    compile_file_with_config(source_path, output_path, &CompilerConfig::default())
}

/// Compile a C+ source file with an explicit [`CompilerConfig`].
///
/// Runs the pipeline stage by stage: preprocess, lex+parse, analyze, then
/// hand the annotated `Program` to whichever backend `config.backend`
/// selects. Each stage boundary checks `DiagnosticEngine::has_errors`
/// before proceeding, so a dirty preprocess or parse never reaches the
/// analyzer or a backend.
pub fn compile_file_with_config(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> Result<(), String> {
    tracing::info!(file = %source_path.display(), "reading source file");
    let source = fs::read_to_string(source_path)
        .map_err(|e| format!("failed to read source file '{}': {e}", source_path.display()))?;

    let mut diagnostics = DiagnosticEngine::new();

    tracing::info!("preprocessing");
    let search_paths = IncludeSearchPaths(config.include_search_paths.clone());
    let preprocessed = {
        let mut pp = Preprocessor::new(&mut diagnostics, &search_paths);
        pp.process_file(source_path, &source)
    };
    if diagnostics.has_errors() {
        diagnostics.print_all();
        return Err("preprocessing failed".to_string());
    }

    tracing::info!("parsing");
    let mut parser = Parser::with_lookahead(source_path, &preprocessed, &mut diagnostics, config.lookahead);
    let mut program = parser.parse(&mut diagnostics);
    if diagnostics.has_errors() {
        diagnostics.print_all();
        return Err("parsing failed".to_string());
    }

    tracing::info!("analyzing");
    sema::analyze(&mut program, &mut diagnostics);
    if diagnostics.has_errors() {
        diagnostics.print_all();
        return Err("semantic analysis failed".to_string());
    }
    diagnostics.print_all();

    match config.backend {
        Backend::Llvm => generate_llvm(&program, output_path, config),
        Backend::Cat => generate_cat(&program, output_path),
    }
}

fn generate_llvm(program: &Program, output_path: &Path, config: &CompilerConfig) -> Result<(), String> {
    tracing::info!("generating LLVM IR");
    let mut codegen = codegen::llvm::LlvmCodegen::new();
    let ir = codegen.generate(program).map_err(|e| e.to_string())?;

    let ir_path = ir_path_for(output_path);
    fs::write(&ir_path, &ir).map_err(|e| format!("failed to write IR file: {e}"))?;

    check_clang_available()?;

    tracing::info!(output = %output_path.display(), "invoking clang");
    let mut clang = Command::new("clang");
    clang.arg(&ir_path).arg("-o").arg(output_path);
    for lib_path in &config.library_paths {
        clang.arg("-L").arg(lib_path);
    }
    for lib in &config.libraries {
        clang.arg("-l").arg(lib);
    }

    let result = clang
        .output()
        .map_err(|e| format!("failed to run clang: {e}"))?;

    if !config.keep_ir {
        let _ = fs::remove_file(&ir_path);
    }

    if !result.status.success() {
        return Err(format!(
            "clang failed with exit code {:?}:\n{}",
            result.status.code(),
            String::from_utf8_lossy(&result.stderr)
        ));
    }
    Ok(())
}

fn generate_cat(program: &Program, output_path: &Path) -> Result<(), String> {
    tracing::info!("generating Cat assembly");
    let mut codegen = codegen::cat::CatCodegen::new();
    let asm = codegen.generate(program).map_err(|e| e.to_string())?;
    let asm_path = output_path.with_extension("asm");
    fs::write(&asm_path, asm).map_err(|e| format!("failed to write assembly file: {e}"))
}

fn ir_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_owned();
    name.push(".ll");
    PathBuf::from(name)
}

/// Derive the default output path (no extension) from a source file's stem.
pub fn default_output_path(source_path: &Path) -> PathBuf {
    let stem = source_path.file_stem().unwrap_or_default();
    PathBuf::from(stem)
}

fn check_clang_available() -> Result<(), String> {
    Command::new("clang")
        .arg("--version")
        .output()
        .map(|_| ())
        .map_err(|e| format!("clang not found or failed to run: {e}. cplusc requires clang to assemble LLVM IR"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn default_output_path_strips_extension() {
        let path = Path::new("/tmp/hello.cp");
        assert_eq!(default_output_path(path), PathBuf::from("hello"));
    }

    #[test]
    fn compile_file_with_cat_backend_writes_asm() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(&dir, "main.cp", "int main() { return 0; }");
        let output = dir.path().join("out");
        let config = CompilerConfig::new().with_backend(Backend::Cat);
        compile_file_with_config(&source, &output, &config).expect("compile should succeed");
        let asm_path = output.with_extension("asm");
        let asm = fs::read_to_string(asm_path).unwrap();
        assert!(asm.contains("jmp main"));
        assert!(asm.contains("GENERATED FROM C+ BY C+ COMPILER"));
    }

    #[test]
    fn compile_file_reports_parse_errors_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(&dir, "broken.cp", "int main( { return; }");
        let output = dir.path().join("out");
        let config = CompilerConfig::new().with_backend(Backend::Cat);
        let result = compile_file_with_config(&source, &output, &config);
        assert!(result.is_err());
    }

    #[test]
    fn compile_file_reports_semantic_errors() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(&dir, "bad_deref.cp", "int main() { int x; return *x; }");
        let output = dir.path().join("out");
        let config = CompilerConfig::new().with_backend(Backend::Cat);
        let result = compile_file_with_config(&source, &output, &config);
        assert!(result.is_err());
    }

    #[test]
    fn compile_file_missing_source_is_an_error() {
        let config = CompilerConfig::new().with_backend(Backend::Cat);
        let result = compile_file_with_config(
            Path::new("/nonexistent/path/does/not/exist.cp"),
            Path::new("/tmp/out"),
            &config,
        );
        assert!(result.is_err());
    }
}
