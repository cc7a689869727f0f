//! Semantic analysis: scope resolution, type checking, and the
//! return-path check that backs the "not all paths return a value"
//! warning.
//!
//! Two passes over the `Program`. The first registers every function
//! signature and global variable so forward and mutual recursion resolve
//! without a second parse. The second walks each function body, filling
//! in `Expr::ty` / `Expr::pointer_level` as it goes; backends read those
//! fields and never re-derive a type themselves.

use std::collections::HashMap;

use cplus_core::{DiagnosticEngine, SourceLocation};

use crate::ast::{
    AsmBlock, BinaryOp, Expr, ExprKind, Function, GlobalVar, Program, Stmt, TypeKind, UnaryOp,
    VarDecl,
};
use crate::builtins;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: TypeKind,
    pub pointer_level: u32,
    pub is_const: bool,
    pub params: Vec<(TypeKind, u32)>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
    Loop,
}

struct Scope {
    kind: ScopeKind,
    symbols: HashMap<String, Symbol>,
}

impl Scope {
    fn new(kind: ScopeKind) -> Self {
        Scope {
            kind,
            symbols: HashMap::new(),
        }
    }
}

/// Walks the `Scope` stack so lookups and loop checks see enclosing scopes
/// without needing parent pointers baked into the scopes themselves.
struct Analyzer<'a> {
    diagnostics: &'a mut DiagnosticEngine,
    scopes: Vec<Scope>,
    return_ty: TypeKind,
    return_pointer_level: u32,
}

pub fn analyze(program: &mut Program, diagnostics: &mut DiagnosticEngine) {
    let mut analyzer = Analyzer {
        diagnostics,
        scopes: vec![Scope::new(ScopeKind::Global)],
        return_ty: TypeKind::Void,
        return_pointer_level: 0,
    };
    analyzer.analyze_program(program);
}

impl<'a> Analyzer<'a> {
    fn push(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, symbol: Symbol) {
        self.scopes
            .last_mut()
            .expect("at least one scope is always open")
            .symbols
            .insert(symbol.name.clone(), symbol);
    }

    fn lookup_current(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|s| s.symbols.get(name))
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes
            .iter()
            .rev()
            .find_map(|s| s.symbols.get(name))
    }

    fn in_loop(&self) -> bool {
        self.scopes.iter().rev().any(|s| s.kind == ScopeKind::Loop)
    }

    fn analyze_program(&mut self, program: &mut Program) {
        for builtin in builtins::BUILTINS {
            self.declare(Symbol {
                name: builtin.name.to_string(),
                kind: SymbolKind::Function,
                ty: builtin.return_slot.ty,
                pointer_level: builtin.return_slot.pointer_level,
                is_const: false,
                params: builtin
                    .params
                    .iter()
                    .map(|p| (p.ty, p.pointer_level))
                    .collect(),
                location: SourceLocation::synthetic(),
            });
        }

        for function in &program.functions {
            if self.lookup_current(&function.name).is_some() {
                self.diagnostics.error(
                    function.location.clone(),
                    format!("function '{}' already declared", function.name),
                );
                continue;
            }
            self.declare(Symbol {
                name: function.name.clone(),
                kind: SymbolKind::Function,
                ty: function.return_ty,
                pointer_level: function.return_pointer_level,
                is_const: false,
                params: function
                    .params
                    .iter()
                    .map(|p| (p.ty, p.pointer_level))
                    .collect(),
                location: function.location.clone(),
            });
        }

        for global in &mut program.globals {
            self.analyze_global(global);
        }

        for function in &mut program.functions {
            self.analyze_function(function);
        }
    }

    fn analyze_global(&mut self, global: &mut GlobalVar) {
        if self.lookup_current(&global.name).is_some() {
            self.diagnostics.error(
                global.location.clone(),
                format!("global variable '{}' already declared", global.name),
            );
            return;
        }

        let pointer_level = global.pointer_level + if global.array_size.is_some() { 1 } else { 0 };

        if let Some(initializer) = &mut global.initializer {
            self.analyze_expr(initializer);
            if !types_compatible_with_pointers(
                global.ty,
                global.pointer_level,
                initializer.ty,
                initializer.pointer_level,
            ) {
                self.diagnostics.error(
                    global.location.clone(),
                    format!(
                        "type mismatch in initialization of '{}'. expected '{}{}', got '{}{}'",
                        global.name,
                        global.ty.name(),
                        pointer_suffix(global.pointer_level),
                        initializer.ty.name(),
                        pointer_suffix(initializer.pointer_level),
                    ),
                );
            }
        }

        self.declare(Symbol {
            name: global.name.clone(),
            kind: SymbolKind::Variable,
            ty: global.ty,
            pointer_level,
            is_const: global.is_const,
            params: Vec::new(),
            location: global.location.clone(),
        });
    }

    fn analyze_function(&mut self, function: &mut Function) {
        self.push(ScopeKind::Function);
        self.return_ty = function.return_ty;
        self.return_pointer_level = function.return_pointer_level;

        for param in &function.params {
            if self.lookup_current(&param.name).is_some() {
                self.diagnostics.error(
                    param.location.clone(),
                    format!("duplicate parameter '{}'", param.name),
                );
                continue;
            }
            self.declare(Symbol {
                name: param.name.clone(),
                kind: SymbolKind::Parameter,
                ty: param.ty,
                pointer_level: param.pointer_level,
                is_const: param.is_const,
                params: Vec::new(),
                location: param.location.clone(),
            });
        }

        let always_returns = self.analyze_stmt(&mut function.body);

        if function.return_ty != TypeKind::Void && !always_returns {
            self.diagnostics.warning(
                function.location.clone(),
                format!(
                    "function '{}' is declared to return '{}' but not all control paths return a value",
                    function.name,
                    function.return_ty.name(),
                ),
            );
        }

        self.pop();
    }

    /// Returns whether every control-flow path through `stmt` returns.
    fn analyze_stmt(&mut self, stmt: &mut Stmt) -> bool {
        match stmt {
            Stmt::Return(expr, location) => {
                match expr {
                    Some(expr) => {
                        if self.return_ty == TypeKind::Void && self.return_pointer_level == 0 {
                            self.diagnostics
                                .error(location.clone(), "void function cannot return a value");
                        }
                        self.analyze_expr(expr);
                        if !types_compatible_with_pointers(
                            self.return_ty,
                            self.return_pointer_level,
                            expr.ty,
                            expr.pointer_level,
                        ) {
                            self.diagnostics.error(
                                location.clone(),
                                format!(
                                    "return type mismatch. expected '{}{}', got '{}{}'",
                                    self.return_ty.name(),
                                    pointer_suffix(self.return_pointer_level),
                                    expr.ty.name(),
                                    pointer_suffix(expr.pointer_level),
                                ),
                            );
                        }
                    }
                    None => {
                        if self.return_ty != TypeKind::Void || self.return_pointer_level > 0 {
                            self.diagnostics.error(
                                location.clone(),
                                format!(
                                    "non-void function must return a value of type '{}{}'",
                                    self.return_ty.name(),
                                    pointer_suffix(self.return_pointer_level),
                                ),
                            );
                        }
                    }
                }
                true
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                location,
            } => {
                self.analyze_expr(cond);
                if cond.ty != TypeKind::Boolean && !cond.ty.is_numeric() {
                    self.diagnostics.warning(
                        location.clone(),
                        format!("if condition should be boolean or numeric, got '{}'", cond.ty.name()),
                    );
                }
                let then_returns = self.analyze_stmt(then_branch);
                let else_returns = match else_branch {
                    Some(else_branch) => self.analyze_stmt(else_branch),
                    None => false,
                };
                then_returns && else_returns
            }
            Stmt::While { cond, body, location } => {
                self.analyze_expr(cond);
                if cond.ty != TypeKind::Boolean && !cond.ty.is_numeric() {
                    self.diagnostics
                        .warning(location.clone(), "while condition should be boolean or numeric");
                }
                self.push(ScopeKind::Loop);
                self.analyze_stmt(body);
                self.pop();
                false
            }
            Stmt::For {
                init,
                cond,
                incr,
                body,
                location,
            } => {
                self.push(ScopeKind::Loop);
                if let Some(init) = init {
                    self.analyze_stmt(init);
                }
                if let Some(cond) = cond {
                    self.analyze_expr(cond);
                    if cond.ty != TypeKind::Boolean && !cond.ty.is_numeric() {
                        self.diagnostics
                            .warning(location.clone(), "for condition should be boolean or numeric");
                    }
                }
                if let Some(incr) = incr {
                    self.analyze_expr(incr);
                }
                self.analyze_stmt(body);
                self.pop();
                false
            }
            Stmt::Break(location) => {
                if !self.in_loop() {
                    self.diagnostics
                        .error(location.clone(), "'break' statement can only be used inside a loop");
                }
                false
            }
            Stmt::Continue(location) => {
                if !self.in_loop() {
                    self.diagnostics
                        .error(location.clone(), "'continue' statement can only be used inside a loop");
                }
                false
            }
            Stmt::VarDecl(decl) => {
                self.analyze_var_decl(decl);
                false
            }
            Stmt::ExprStmt(expr) => {
                self.analyze_expr(expr);
                false
            }
            Stmt::Compound(stmts, _) => {
                self.push(ScopeKind::Block);
                let mut returns = false;
                for stmt in stmts {
                    if self.analyze_stmt(stmt) {
                        returns = true;
                    }
                }
                self.pop();
                returns
            }
            Stmt::Asm(asm) => {
                self.analyze_asm(asm);
                false
            }
        }
    }

    fn analyze_var_decl(&mut self, decl: &mut VarDecl) {
        if decl.ty == TypeKind::Void && decl.pointer_level == 0 {
            self.diagnostics.error(
                decl.location.clone(),
                format!(
                    "variable '{}' declared as void. variables cannot be void (did you mean 'void*'?)",
                    decl.name
                ),
            );
        }

        if let Some(existing) = self.lookup_current(&decl.name) {
            self.diagnostics.error(
                decl.location.clone(),
                format!(
                    "variable '{}' already declared in this scope (previous declaration at {})",
                    decl.name, existing.location
                ),
            );
        }

        let pointer_level = decl.pointer_level + if decl.array_size.is_some() { 1 } else { 0 };

        self.declare(Symbol {
            name: decl.name.clone(),
            kind: SymbolKind::Variable,
            ty: decl.ty,
            pointer_level,
            is_const: decl.is_const,
            params: Vec::new(),
            location: decl.location.clone(),
        });

        if let Some(initializer) = &mut decl.initializer {
            self.analyze_expr(initializer);
            if !types_compatible_with_pointers(
                decl.ty,
                decl.pointer_level,
                initializer.ty,
                initializer.pointer_level,
            ) {
                self.diagnostics.error(
                    decl.location.clone(),
                    format!(
                        "type mismatch in initialization of '{}'. expected '{}{}', got '{}{}'",
                        decl.name,
                        decl.ty.name(),
                        pointer_suffix(decl.pointer_level),
                        initializer.ty.name(),
                        pointer_suffix(initializer.pointer_level),
                    ),
                );
            }
        }
    }

    fn analyze_asm(&mut self, asm: &mut AsmBlock) {
        for output in &mut asm.outputs {
            self.analyze_expr(&mut output.expr);
            if !output.expr.is_lvalue() {
                self.diagnostics.error(
                    asm.location.clone(),
                    "asm output operand must be an lvalue",
                );
            }
        }
        for input in &mut asm.inputs {
            self.analyze_expr(&mut input.expr);
        }
    }

    fn analyze_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Number(_) => {
                expr.ty = TypeKind::Int;
                expr.pointer_level = 0;
            }
            ExprKind::StringLiteral(_) => {
                expr.ty = TypeKind::String;
                expr.pointer_level = 0;
            }
            ExprKind::Var(name) => match self.lookup(name) {
                Some(symbol) => {
                    expr.ty = symbol.ty;
                    expr.pointer_level = symbol.pointer_level;
                }
                None => {
                    self.diagnostics
                        .error(expr.location.clone(), format!("undefined variable '{name}'"));
                    expr.ty = TypeKind::Int;
                    expr.pointer_level = 0;
                }
            },
            ExprKind::Unary(op, operand) => {
                self.analyze_expr(operand);
                self.analyze_unary(*op, operand, expr);
            }
            ExprKind::Binary(op, left, right) => {
                self.analyze_expr(left);
                self.analyze_expr(right);
                self.analyze_binary(*op, left, right, expr);
            }
            ExprKind::Call(name, args) => {
                self.analyze_call(name, args, expr);
            }
            ExprKind::ArrayIndex(array, index) => {
                self.analyze_expr(array);
                self.analyze_expr(index);
                if array.pointer_level == 0 {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!("cannot index non-pointer/non-array type '{}'", array.ty.name()),
                    );
                }
                if !index.ty.is_numeric() {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!("array index must be a numeric type, got '{}'", index.ty.name()),
                    );
                }
                expr.ty = array.ty;
                expr.pointer_level = array.pointer_level.saturating_sub(1);
            }
        }
    }

    fn analyze_unary(&mut self, op: UnaryOp, operand: &Expr, expr: &mut Expr) {
        match op {
            UnaryOp::Not => {
                if operand.ty == TypeKind::Void || operand.ty == TypeKind::String {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!("invalid type '{}' for '!' operator", operand.ty.name()),
                    );
                }
                expr.ty = TypeKind::Boolean;
                expr.pointer_level = 0;
            }
            UnaryOp::Neg => {
                if !operand.ty.is_numeric() {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!("invalid type '{}' for unary '-' operator", operand.ty.name()),
                    );
                }
                expr.ty = operand.ty;
                expr.pointer_level = operand.pointer_level;
            }
            UnaryOp::Deref => {
                if operand.pointer_level == 0 {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!("cannot dereference non-pointer type '{}'", operand.ty.name()),
                    );
                }
                expr.ty = operand.ty;
                expr.pointer_level = operand.pointer_level.saturating_sub(1);
            }
            UnaryOp::AddrOf => {
                if !operand.is_lvalue() {
                    self.diagnostics
                        .error(expr.location.clone(), "cannot take address of non-lvalue");
                }
                expr.ty = operand.ty;
                expr.pointer_level = operand.pointer_level + 1;
            }
        }
    }

    fn analyze_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, expr: &mut Expr) {
        if op.is_arithmetic() {
            if left.pointer_level > 0 && right.ty.is_numeric() && right.pointer_level == 0 {
                expr.ty = left.ty;
                expr.pointer_level = left.pointer_level;
                return;
            }
            if left.ty.is_numeric() && left.pointer_level == 0 && right.pointer_level > 0 {
                expr.ty = right.ty;
                expr.pointer_level = right.pointer_level;
                return;
            }
            if !left.ty.is_numeric() || !right.ty.is_numeric() || left.pointer_level > 0 || right.pointer_level > 0 {
                self.diagnostics.error(
                    expr.location.clone(),
                    format!(
                        "arithmetic operator requires numeric types, got '{}' and '{}'",
                        left.ty.name(),
                        right.ty.name()
                    ),
                );
            }
            expr.ty = left.ty;
            expr.pointer_level = 0;
            return;
        }

        if op.is_comparison() {
            if !types_compatible_with_pointers(left.ty, left.pointer_level, right.ty, right.pointer_level) {
                self.diagnostics.error(
                    expr.location.clone(),
                    format!("type mismatch in comparison: '{}' vs '{}'", left.ty.name(), right.ty.name()),
                );
            }
            expr.ty = TypeKind::Boolean;
            expr.pointer_level = 0;
            return;
        }

        if op == BinaryOp::Assign {
            if !left.is_lvalue() {
                self.diagnostics.error(
                    expr.location.clone(),
                    "left-hand side of assignment must be a variable, dereferenced pointer, or array element",
                );
            }
            if let ExprKind::Var(name) = &left.kind
                && let Some(symbol) = self.lookup(name)
                && symbol.is_const
            {
                self.diagnostics
                    .error(expr.location.clone(), format!("cannot assign to const variable '{name}'"));
            }
            if !types_compatible_with_pointers(left.ty, left.pointer_level, right.ty, right.pointer_level) {
                self.diagnostics.error(
                    expr.location.clone(),
                    format!(
                        "type mismatch in assignment. cannot assign '{}{}' to '{}{}'",
                        right.ty.name(),
                        pointer_suffix(right.pointer_level),
                        left.ty.name(),
                        pointer_suffix(left.pointer_level),
                    ),
                );
            }
            expr.ty = left.ty;
            expr.pointer_level = left.pointer_level;
            return;
        }

        if op.is_logical() {
            if left.ty != TypeKind::Boolean || right.ty != TypeKind::Boolean {
                self.diagnostics.warning(
                    expr.location.clone(),
                    format!(
                        "logical operators expect boolean operands, got '{}' and '{}'",
                        left.ty.name(),
                        right.ty.name()
                    ),
                );
            }
            expr.ty = TypeKind::Boolean;
            expr.pointer_level = 0;
        }
    }

    fn analyze_call(&mut self, name: &str, args: &mut [Expr], expr: &mut Expr) {
        let symbol = match self.lookup(name) {
            Some(symbol) => symbol.clone(),
            None => {
                self.diagnostics
                    .error(expr.location.clone(), format!("undefined function '{name}'"));
                expr.ty = TypeKind::Int;
                expr.pointer_level = 0;
                for arg in args {
                    self.analyze_expr(arg);
                }
                return;
            }
        };

        if symbol.kind != SymbolKind::Function {
            self.diagnostics
                .error(expr.location.clone(), format!("'{name}' is not a function"));
            expr.ty = TypeKind::Int;
            expr.pointer_level = 0;
            for arg in args {
                self.analyze_expr(arg);
            }
            return;
        }

        for arg in args.iter_mut() {
            self.analyze_expr(arg);
        }

        if args.len() != symbol.params.len() {
            self.diagnostics.error(
                expr.location.clone(),
                format!(
                    "function '{name}' expects {} argument(s), got {}",
                    symbol.params.len(),
                    args.len()
                ),
            );
        } else {
            for (i, (arg, (param_ty, param_ptr))) in args.iter().zip(symbol.params.iter()).enumerate() {
                if !types_compatible_with_pointers(*param_ty, *param_ptr, arg.ty, arg.pointer_level) {
                    self.diagnostics.error(
                        expr.location.clone(),
                        format!(
                            "argument {} to '{name}' has type '{}{}', expected '{}{}'",
                            i + 1,
                            arg.ty.name(),
                            pointer_suffix(arg.pointer_level),
                            param_ty.name(),
                            pointer_suffix(*param_ptr),
                        ),
                    );
                }
            }
        }

        expr.ty = symbol.ty;
        expr.pointer_level = symbol.pointer_level;
    }
}

fn pointer_suffix(level: u32) -> String {
    "*".repeat(level as usize)
}

fn types_compatible(target: TypeKind, source: TypeKind) -> bool {
    if target == source {
        return true;
    }
    target.is_numeric() && source.is_numeric()
}

pub fn types_compatible_with_pointers(
    target_ty: TypeKind,
    target_ptr: u32,
    source_ty: TypeKind,
    source_ptr: u32,
) -> bool {
    if target_ty == TypeKind::String && source_ty == TypeKind::Char && source_ptr == 1 {
        return true;
    }
    if target_ty == TypeKind::Char && target_ptr == 1 && source_ty == TypeKind::String {
        return true;
    }

    if target_ptr > 0 && source_ptr > 0 && (target_ty == TypeKind::Void || source_ty == TypeKind::Void) {
        return true;
    }

    if target_ty == TypeKind::Int && source_ptr > 0 {
        return true;
    }
    if source_ty == TypeKind::Int && target_ptr > 0 {
        return true;
    }

    if target_ptr != source_ptr {
        return false;
    }

    types_compatible(target_ty, source_ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Function, Param, Program, Stmt};

    fn loc() -> SourceLocation {
        SourceLocation::new("t.cp", 1, 1)
    }

    fn num(n: &str) -> Expr {
        Expr::new(ExprKind::Number(n.into()), loc())
    }

    fn var(name: &str) -> Expr {
        Expr::new(ExprKind::Var(name.into()), loc())
    }

    fn main_fn(body: Stmt) -> Function {
        Function {
            name: "main".into(),
            return_ty: TypeKind::Int,
            return_pointer_level: 0,
            params: vec![],
            body,
            location: loc(),
        }
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let mut program = Program::default();
        program.functions.push(main_fn(Stmt::Compound(
            vec![Stmt::Return(Some(var("missing")), loc())],
            loc(),
        )));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn return_type_mismatch_is_an_error() {
        let mut program = Program::default();
        let mut f = main_fn(Stmt::Compound(
            vec![Stmt::Return(
                Some(Expr::new(ExprKind::StringLiteral("x".into()), loc())),
                loc(),
            )],
            loc(),
        ));
        f.return_ty = TypeKind::Int;
        program.functions.push(f);
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn missing_return_path_warns_but_does_not_error() {
        let mut program = Program::default();
        program
            .functions
            .push(main_fn(Stmt::Compound(vec![], loc())));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(!diags.has_errors());
        assert!(diags.has_warnings());
    }

    #[test]
    fn well_typed_return_produces_no_diagnostics() {
        let mut program = Program::default();
        program
            .functions
            .push(main_fn(Stmt::Compound(vec![Stmt::Return(Some(num("0")), loc())], loc())));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(!diags.has_errors());
        assert!(!diags.has_warnings());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let mut program = Program::default();
        program.functions.push(main_fn(Stmt::Compound(
            vec![Stmt::Break(loc()), Stmt::Return(Some(num("0")), loc())],
            loc(),
        )));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn break_inside_while_is_accepted() {
        let mut program = Program::default();
        let body = Stmt::While {
            cond: num("1"),
            body: Box::new(Stmt::Compound(vec![Stmt::Break(loc())], loc())),
            location: loc(),
        };
        program
            .functions
            .push(main_fn(Stmt::Compound(vec![body, Stmt::Return(Some(num("0")), loc())], loc())));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(!diags.has_errors());
    }

    #[test]
    fn assigning_to_const_is_an_error() {
        let mut program = Program::default();
        let decl = VarDecl {
            ty: TypeKind::Int,
            pointer_level: 0,
            array_size: None,
            name: "x".into(),
            initializer: Some(num("1")),
            is_const: true,
            location: loc(),
        };
        let assign = Expr::new(
            ExprKind::Binary(BinaryOp::Assign, Box::new(var("x")), Box::new(num("2"))),
            loc(),
        );
        program.functions.push(main_fn(Stmt::Compound(
            vec![
                Stmt::VarDecl(decl),
                Stmt::ExprStmt(assign),
                Stmt::Return(Some(num("0")), loc()),
            ],
            loc(),
        )));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn call_with_wrong_arity_is_an_error() {
        let mut program = Program::default();
        let helper = Function {
            name: "helper".into(),
            return_ty: TypeKind::Int,
            return_pointer_level: 0,
            params: vec![Param {
                ty: TypeKind::Int,
                pointer_level: 0,
                name: "a".into(),
                is_const: false,
                location: loc(),
            }],
            body: Stmt::Compound(vec![Stmt::Return(Some(num("0")), loc())], loc()),
            location: loc(),
        };
        program.functions.push(helper);
        let call = Expr::new(ExprKind::Call("helper".into(), vec![]), loc());
        program
            .functions
            .push(main_fn(Stmt::Compound(vec![Stmt::ExprStmt(call), Stmt::Return(Some(num("0")), loc())], loc())));
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(diags.has_errors());
    }

    #[test]
    fn mutual_recursion_resolves_via_pass_one() {
        let mut program = Program::default();
        let is_even_call = Expr::new(ExprKind::Call("is_odd".into(), vec![num("1")]), loc());
        program.functions.push(Function {
            name: "is_even".into(),
            return_ty: TypeKind::Boolean,
            return_pointer_level: 0,
            params: vec![Param {
                ty: TypeKind::Int,
                pointer_level: 0,
                name: "n".into(),
                is_const: false,
                location: loc(),
            }],
            body: Stmt::Compound(vec![Stmt::Return(Some(is_even_call), loc())], loc()),
            location: loc(),
        });
        program.functions.push(Function {
            name: "is_odd".into(),
            return_ty: TypeKind::Boolean,
            return_pointer_level: 0,
            params: vec![Param {
                ty: TypeKind::Int,
                pointer_level: 0,
                name: "n".into(),
                is_const: false,
                location: loc(),
            }],
            body: Stmt::Compound(vec![Stmt::Return(Some(num("1")), loc())], loc()),
            location: loc(),
        });
        let mut diags = DiagnosticEngine::new();
        analyze(&mut program, &mut diags);
        assert!(!diags.has_errors());
    }

    #[test]
    fn pointer_arithmetic_keeps_pointer_type() {
        assert!(types_compatible_with_pointers(TypeKind::Int, 1, TypeKind::Int, 0));
        assert!(types_compatible_with_pointers(TypeKind::Void, 1, TypeKind::Int, 1));
        assert!(types_compatible_with_pointers(TypeKind::String, 0, TypeKind::Char, 1));
        assert!(!types_compatible_with_pointers(TypeKind::Int, 0, TypeKind::String, 0));
    }
}
