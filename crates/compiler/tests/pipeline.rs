//! End-to-end pipeline scenarios: preprocess -> parse -> analyze -> codegen.
//! The Cat backend is used throughout since it needs no external
//! assembler, unlike the LLVM backend which shells out to `clang`
//! (covered separately by `lib.rs`'s own `#[cfg(test)]` module).

use cplus_core::DiagnosticEngine;
use cplusc::codegen::cat::CatCodegen;
use cplusc::parser::Parser;
use cplusc::preprocessor::{IncludeSearchPaths, Preprocessor};
use cplusc::sema;
use cplusc::Program;

fn compile_to_cat(source: &str) -> Result<(String, DiagnosticEngine), DiagnosticEngine> {
    let mut diagnostics = DiagnosticEngine::new();
    let search_paths = IncludeSearchPaths::default();
    let preprocessed = {
        let mut pp = Preprocessor::new(&mut diagnostics, &search_paths);
        pp.process_file("test.cp".as_ref(), source)
    };
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let mut parser = Parser::new("test.cp", &preprocessed, &mut diagnostics);
    let mut program: Program = parser.parse(&mut diagnostics);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    sema::analyze(&mut program, &mut diagnostics);
    if diagnostics.has_errors() {
        return Err(diagnostics);
    }

    let mut codegen = CatCodegen::new();
    let asm = codegen.generate(&program).expect("codegen should succeed on an analyzed program");
    Ok((asm, diagnostics))
}

#[test]
fn trivial_main_returning_zero_compiles() {
    let (asm, _) = compile_to_cat("int main() { return 0; }").expect("should compile cleanly");
    assert!(asm.contains("jmp main"));
    assert!(asm.starts_with("; GENERATED FROM C+ BY C+ COMPILER"));
}

#[test]
fn local_variable_arithmetic_in_return() {
    let (asm, _) =
        compile_to_cat("int main() { int x = 5; return x + 3; }").expect("should compile cleanly");
    assert!(asm.contains("add"));
}

#[test]
fn for_loop_accumulates_sum_one_to_ten() {
    let source = "int main() { int i = 0; int s = 0; \
                  for (i = 1; i <= 10; i = i + 1) s = s + i; return s; }";
    let (asm, _) = compile_to_cat(source).expect("should compile cleanly");
    assert!(asm.contains(".loop0"));
    assert!(asm.contains(".doneloop0"));
}

#[test]
fn recursive_factorial_compiles_and_calls_itself() {
    let source = "int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } \
                  int main() { return fact(5); }";
    let (asm, _) = compile_to_cat(source).expect("should compile cleanly");
    assert!(asm.contains("call fact"));
}

#[test]
fn function_like_macro_double_expands_its_argument() {
    let source = "#define SQ(x) ((x)*(x))\nint main() { return SQ(3+1); }";
    let mut diagnostics = DiagnosticEngine::new();
    let search_paths = IncludeSearchPaths::default();
    let mut pp = Preprocessor::new(&mut diagnostics, &search_paths);
    let expanded = pp.process_file("test.cp".as_ref(), source);
    // Each occurrence of the parameter is replaced independently, so `x`
    // appears twice in the expansion of `(x)*(x)`.
    assert_eq!(expanded.matches("3+1").count(), 2);
    assert!(!diagnostics.has_errors());
}

#[test]
fn dereferencing_a_pointer_is_accepted() {
    let source = "int main() { int x = 0; int *p; p = &x; *p = 3; return *p; }";
    compile_to_cat(source).expect("pointer deref/assign should type-check");
}

#[test]
fn dereferencing_a_non_pointer_is_a_semantic_error() {
    let source = "int main() { int x; return *x; }";
    let diagnostics = compile_to_cat(source).expect_err("dereference of int should be rejected");
    assert!(diagnostics
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("Cannot dereference non-pointer type 'int'")
            || d.message.contains("cannot dereference non-pointer type 'int'")));
}

#[test]
fn break_inside_while_loop_emits_exactly_one_loop_label_pair() {
    let (asm, _) = compile_to_cat("int main() { while(1) { break; } return 0; }")
        .expect("break inside a loop is legal");
    assert_eq!(asm.matches(".loop0:").count(), 1);
    assert_eq!(asm.matches(".doneloop0:").count(), 1);
}

#[test]
fn break_outside_any_loop_is_a_semantic_error() {
    let source = "int main() { break; return 0; }";
    let diagnostics = compile_to_cat(source).expect_err("break outside a loop should be rejected");
    assert!(diagnostics
        .diagnostics()
        .iter()
        .any(|d| d.message.to_lowercase().contains("break") && d.message.to_lowercase().contains("loop")));
}

#[test]
fn wrong_argument_count_is_a_semantic_error() {
    let source = "int add(int a, int b) { return a + b; } \
                  int main() { return add(1); }";
    let diagnostics = compile_to_cat(source).expect_err("missing argument should be rejected");
    assert!(diagnostics.diagnostics().iter().any(|d| d.message.contains("expects")));
}

#[test]
fn adding_two_pointers_is_a_semantic_error() {
    let source = "int main() { int *p; int *q; int *r; r = p + q; return 0; }";
    let diagnostics = compile_to_cat(source).expect_err("pointer + pointer should be rejected");
    assert!(diagnostics
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("arithmetic operator requires numeric types")));
}

#[test]
fn duplicate_declaration_in_same_scope_is_a_semantic_error() {
    let source = "int main() { int x = 1; int x = 2; return x; }";
    compile_to_cat(source).expect_err("duplicate declaration should be rejected");
}
