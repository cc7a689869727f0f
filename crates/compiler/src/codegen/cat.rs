//! The "Cat" backend: a textual assembly emitter for a small register
//! machine (`r0..r7`, Intel-like mnemonics, stack-based calling
//! convention). Unlike the LLVM backend this target has no existing
//! assembler dependency in the ecosystem, so the whole instruction
//! sequence is hand-emitted here.
//!
//! All mutable state (variable offsets, the register-borrow table, the
//! string interner, the branch counter) lives on `CatCodegen` rather than
//! behind module statics, so a fresh context can be built per compilation
//! (or per test) without residue from a previous run.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{
    AsmBlock, BinaryOp, Expr, ExprKind, Function, GlobalVar, Program, Stmt, UnaryOp,
};

use super::error::CodeGenError;

type Result<T> = std::result::Result<T, CodeGenError>;

/// Number of general-purpose registers available to the allocator.
/// `r7` is reserved as the frame pointer and never borrowed.
const NUM_USABLE_REGISTERS: usize = 7;

/// Tracks which of `r0..r6` are currently borrowed, and whether a given
/// borrow must be preserved (pushed/popped) around its use because no
/// free register was available when it was taken.
struct RegisterAllocator {
    borrowed: [bool; NUM_USABLE_REGISTERS],
}

impl RegisterAllocator {
    fn new() -> Self {
        RegisterAllocator {
            borrowed: [false; NUM_USABLE_REGISTERS],
        }
    }

    /// Returns the lowest free register other than `exclude`, or — if
    /// none are free — some other borrowed register with `preserve =
    /// true` to signal the caller must save/restore it.
    fn borrow_register(&mut self, exclude: Option<u32>) -> (u32, bool) {
        for (reg, taken) in self.borrowed.iter_mut().enumerate() {
            if !*taken && Some(reg as u32) != exclude {
                *taken = true;
                return (reg as u32, false);
            }
        }
        for reg in 0..NUM_USABLE_REGISTERS as u32 {
            if Some(reg) != exclude {
                return (reg, true);
            }
        }
        (0, true)
    }

    /// Borrows a specific register, reporting whether it was already in
    /// use (and therefore needs preservation).
    fn borrow_specific(&mut self, reg: u32) -> bool {
        let idx = reg as usize;
        let already_taken = self.borrowed[idx];
        self.borrowed[idx] = true;
        already_taken
    }

    fn return_register(&mut self, reg: u32, preserved: bool) {
        if !preserved {
            self.borrowed[reg as usize] = false;
        }
    }
}

struct LoopLabels {
    id: u32,
}

pub struct CatCodegen {
    output: String,
    data_section: String,
    variables: HashMap<String, i64>,
    current_r7_offset: i64,
    registers: RegisterAllocator,
    strings: Vec<String>,
    branch_num: u32,
    loop_stack: Vec<LoopLabels>,
}

impl CatCodegen {
    pub fn new() -> Self {
        CatCodegen {
            output: String::new(),
            data_section: String::new(),
            variables: HashMap::new(),
            current_r7_offset: 0,
            registers: RegisterAllocator::new(),
            strings: Vec::new(),
            branch_num: 0,
            loop_stack: Vec::new(),
        }
    }

    fn fresh_branch(&mut self) -> u32 {
        let n = self.branch_num;
        self.branch_num += 1;
        n
    }

    fn intern_string(&mut self, s: &str) -> String {
        if let Some(idx) = self.strings.iter().position(|existing| existing == s) {
            return format!("str_{idx}");
        }
        let idx = self.strings.len();
        self.strings.push(s.to_string());
        format!("str_{idx}")
    }

    pub fn generate(&mut self, program: &Program) -> Result<String> {
        if program.find_function("main").is_none() {
            return Err("program has no `main` function".into());
        }

        writeln!(&mut self.output, "; GENERATED FROM C+ BY C+ COMPILER")?;
        writeln!(&mut self.output, "jmp main")?;

        for global in &program.globals {
            self.codegen_global(global)?;
        }

        for function in &program.functions {
            writeln!(&mut self.output)?;
            self.codegen_function(function)?;
            writeln!(&mut self.output)?;
        }

        writeln!(&mut self.output, "; Application Strings")?;
        for (idx, s) in self.strings.iter().enumerate() {
            writeln!(&mut self.output, "str_{idx}:")?;
            let mut bytes: Vec<String> = s.bytes().map(|b| format!("0x{b:02X}")).collect();
            bytes.push("0x00".to_string());
            writeln!(&mut self.output, "    d8 {}", bytes.join(", "))?;
        }

        self.output.push_str(&self.data_section);
        Ok(std::mem::take(&mut self.output))
    }

    /// Global variables have no counterpart anywhere in this backend's
    /// instruction set: there is no data-segment directive for a mutable,
    /// addressable slot, only the byte-array form used for interned
    /// string constants. Programs with globals must use the LLVM backend.
    fn codegen_global(&self, global: &GlobalVar) -> Result<()> {
        Err(format!(
            "global `{}`: the Cat backend does not support global variables, use the LLVM backend",
            global.name
        )
        .into())
    }

    fn codegen_function(&mut self, function: &Function) -> Result<()> {
        let saved_offset = self.current_r7_offset;
        let saved_vars = std::mem::take(&mut self.variables);
        self.current_r7_offset = 4;

        writeln!(&mut self.output, "{}:", function.name)?;
        writeln!(&mut self.output, "    ; prologue")?;
        writeln!(&mut self.output, "    push r4")?;
        writeln!(&mut self.output, "    push r5")?;
        writeln!(&mut self.output, "    push r6")?;
        writeln!(&mut self.output, "    push r7")?;
        writeln!(&mut self.output, "    mov r7, sp")?;
        writeln!(&mut self.output)?;

        writeln!(&mut self.output, "    ; Save arguments on stack")?;
        const ARG_REGISTERS: [&str; 3] = ["r1", "r2", "r3"];
        for (i, param) in function.params.iter().enumerate() {
            if i < 3 {
                writeln!(&mut self.output, "    push {}", ARG_REGISTERS[i])?;
                self.variables.insert(param.name.clone(), self.current_r7_offset);
                self.current_r7_offset += 4;
            } else {
                // Arguments beyond the third were pushed by the caller onto
                // its own frame, above the return address; they sit at
                // negative offsets from our r7.
                let stack_index = (i - 3) as i64;
                self.variables
                    .insert(param.name.clone(), -8 - 4 * stack_index);
            }
        }
        writeln!(&mut self.output)?;

        self.codegen_stmt(&function.body)?;

        writeln!(&mut self.output, "\n    ; epilogue")?;
        writeln!(&mut self.output, ".end:")?;
        writeln!(&mut self.output, "    mov sp, r7")?;
        writeln!(&mut self.output, "    pop r7")?;
        writeln!(&mut self.output, "    pop r6")?;
        writeln!(&mut self.output, "    pop r5")?;
        writeln!(&mut self.output, "    pop r4")?;
        writeln!(&mut self.output, "    ret")?;

        self.current_r7_offset = saved_offset;
        self.variables = saved_vars;
        Ok(())
    }

    fn var_offset(&self, name: &str) -> Result<i64> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| CodeGenError::from(format!("variable `{name}` not found")))
    }

    /// Computes the lvalue target of an assignment, walking through any
    /// leading `Deref` layers and allowing a single `ArrayIndex` on the
    /// base variable. Returns the base variable's name and the number of
    /// extra dereferences required after the base address is loaded, and
    /// additionally emits code (into `reg`) to add an index offset when
    /// the target is an array element.
    fn lower_assign_target(&mut self, target: &Expr, reg: u32) -> Result<u32> {
        match &target.kind {
            ExprKind::Var(name) => {
                let offset = self.var_offset(name)?;
                writeln!(&mut self.output, "    mov r{reg}, r7")?;
                writeln!(&mut self.output, "    sub r{reg}, {offset}")?;
                Ok(0)
            }
            ExprKind::ArrayIndex(base, index) => {
                let ExprKind::Var(name) = &base.kind else {
                    return Err("array assignment target must index a variable".into());
                };
                let offset = self.var_offset(name)?;
                writeln!(&mut self.output, "    mov r{reg}, r7")?;
                writeln!(&mut self.output, "    sub r{reg}, {offset}")?;
                // `name` holds the array's base address, not the array
                // itself, so dereference once to get at the data before
                // applying the scaled index.
                writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                let (idx_reg, idx_preserved) = self.registers.borrow_register(Some(reg));
                if idx_preserved {
                    writeln!(&mut self.output, "    push r{idx_reg}")?;
                }
                self.expr_in_reg(index, idx_reg)?;
                writeln!(&mut self.output, "    umul r{idx_reg}, 4")?;
                writeln!(&mut self.output, "    add r{reg}, r{idx_reg}")?;
                if idx_preserved {
                    writeln!(&mut self.output, "    pop r{idx_reg}")?;
                }
                self.registers.return_register(idx_reg, idx_preserved);
                Ok(0)
            }
            ExprKind::Unary(UnaryOp::Deref, inner) => {
                let derefs = self.lower_assign_target(inner, reg)? + 1;
                for _ in 0..derefs - 1 {
                    writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                }
                Ok(derefs)
            }
            _ => Err("assignment target must be a variable, array element, or dereference".into()),
        }
    }

    /// Lowers `expr` so its value ends up in `r<reg>`.
    fn expr_in_reg(&mut self, expr: &Expr, reg: u32) -> Result<()> {
        match &expr.kind {
            ExprKind::Number(text) => {
                writeln!(&mut self.output, "    mov r{reg}, {text}")?;
                Ok(())
            }
            ExprKind::StringLiteral(s) => {
                let label = self.intern_string(s);
                writeln!(&mut self.output, "    mov r{reg}, {label}")?;
                Ok(())
            }
            ExprKind::Var(name) => {
                let offset = self.var_offset(name)?;
                writeln!(&mut self.output, "    mov r{reg}, r7")?;
                writeln!(&mut self.output, "    sub r{reg}, {offset}")?;
                writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                Ok(())
            }
            ExprKind::ArrayIndex(base, index) => {
                let ExprKind::Var(name) = &base.kind else {
                    return Err("array index base must be a variable".into());
                };
                let offset = self.var_offset(name)?;
                writeln!(&mut self.output, "    mov r{reg}, r7")?;
                writeln!(&mut self.output, "    sub r{reg}, {offset}")?;
                writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                let (idx_reg, idx_preserved) = self.registers.borrow_register(Some(reg));
                if idx_preserved {
                    writeln!(&mut self.output, "    push r{idx_reg}")?;
                }
                self.expr_in_reg(index, idx_reg)?;
                writeln!(&mut self.output, "    umul r{idx_reg}, 4")?;
                writeln!(&mut self.output, "    add r{reg}, r{idx_reg}")?;
                if idx_preserved {
                    writeln!(&mut self.output, "    pop r{idx_reg}")?;
                }
                self.registers.return_register(idx_reg, idx_preserved);
                writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                Ok(())
            }
            ExprKind::Unary(op, operand) => self.codegen_unary(*op, operand, reg),
            ExprKind::Binary(BinaryOp::Assign, lhs, rhs) => self.codegen_assign(lhs, rhs, reg),
            ExprKind::Binary(op, lhs, rhs) if op.is_comparison() => {
                self.codegen_comparison(*op, lhs, rhs, reg)
            }
            ExprKind::Binary(op, lhs, rhs) => self.codegen_arith(*op, lhs, rhs, reg),
            ExprKind::Call(name, args) => {
                self.codegen_call(name, args, Some(reg))?;
                Ok(())
            }
        }
    }

    fn codegen_unary(&mut self, op: UnaryOp, operand: &Expr, reg: u32) -> Result<()> {
        match op {
            UnaryOp::Neg => {
                self.expr_in_reg(operand, reg)?;
                writeln!(&mut self.output, "    not r{reg}")?;
                writeln!(&mut self.output, "    add r{reg}, 1")?;
                Ok(())
            }
            UnaryOp::Not => {
                self.expr_in_reg(operand, reg)?;
                let n = self.fresh_branch();
                writeln!(&mut self.output, "    cmp r{reg}, 0")?;
                writeln!(&mut self.output, "    je .donenot{n}")?;
                writeln!(&mut self.output, "    mov r{reg}, 0")?;
                writeln!(&mut self.output, "    jmp .afternot{n}")?;
                writeln!(&mut self.output, ".donenot{n}:")?;
                writeln!(&mut self.output, "    mov r{reg}, 1")?;
                writeln!(&mut self.output, ".afternot{n}:")?;
                Ok(())
            }
            UnaryOp::Deref => {
                self.expr_in_reg(operand, reg)?;
                writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
                Ok(())
            }
            UnaryOp::AddrOf => {
                let ExprKind::Var(name) = &operand.kind else {
                    return Err("address-of operand must be a variable".into());
                };
                let offset = self.var_offset(name)?;
                writeln!(&mut self.output, "    mov r{reg}, r7")?;
                writeln!(&mut self.output, "    sub r{reg}, {offset}")?;
                Ok(())
            }
        }
    }

    fn codegen_arith(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, reg: u32) -> Result<()> {
        let (s1, preserve1) = self.registers.borrow_register(None);
        if preserve1 {
            writeln!(&mut self.output, "    push r{s1}")?;
        }
        self.expr_in_reg(lhs, s1)?;

        let (s2, preserve2) = self.registers.borrow_register(Some(s1));
        if preserve2 {
            writeln!(&mut self.output, "    push r{s2}")?;
        }
        self.expr_in_reg(rhs, s2)?;

        let mnemonic = match op {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "umul",
            BinaryOp::Div => "udiv",
            BinaryOp::Mod => "umod",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            _ => return Err(format!("{op:?} is not an arithmetic/logical Cat operator").into()),
        };
        writeln!(&mut self.output, "    {mnemonic} r{s1}, r{s2}")?;
        writeln!(&mut self.output, "    mov r{reg}, r{s1}")?;

        if preserve2 {
            writeln!(&mut self.output, "    pop r{s2}")?;
        }
        if preserve1 {
            writeln!(&mut self.output, "    pop r{s1}")?;
        }
        self.registers.return_register(s2, preserve2);
        self.registers.return_register(s1, preserve1);
        Ok(())
    }

    fn codegen_comparison(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, reg: u32) -> Result<()> {
        let (s1, preserve1) = self.registers.borrow_register(None);
        if preserve1 {
            writeln!(&mut self.output, "    push r{s1}")?;
        }
        self.expr_in_reg(lhs, s1)?;

        let (s2, preserve2) = self.registers.borrow_register(Some(s1));
        if preserve2 {
            writeln!(&mut self.output, "    push r{s2}")?;
        }
        self.expr_in_reg(rhs, s2)?;

        writeln!(&mut self.output, "    cmp r{s1}, r{s2}")?;
        let jmp = match op {
            BinaryOp::Eq => "je",
            BinaryOp::Ne => "jne",
            BinaryOp::Gt => "jug",
            BinaryOp::Lt => "jul",
            BinaryOp::Ge => "juge",
            BinaryOp::Le => "jule",
            _ => return Err(format!("{op:?} is not a comparison Cat operator").into()),
        };

        if preserve2 {
            writeln!(&mut self.output, "    pop r{s2}")?;
        }
        if preserve1 {
            writeln!(&mut self.output, "    pop r{s1}")?;
        }
        self.registers.return_register(s2, preserve2);
        self.registers.return_register(s1, preserve1);

        let n = self.fresh_branch();
        writeln!(&mut self.output, "    {jmp} .cmpbranch_{n}_true")?;
        writeln!(&mut self.output, "    jmp .cmpbranch_{n}_false")?;
        writeln!(&mut self.output, ".cmpbranch_{n}_true:")?;
        writeln!(&mut self.output, "    mov r{reg}, 1")?;
        writeln!(&mut self.output, "    jmp .cmpbranch_{n}_end")?;
        writeln!(&mut self.output, ".cmpbranch_{n}_false:")?;
        writeln!(&mut self.output, "    mov r{reg}, 0")?;
        writeln!(&mut self.output, ".cmpbranch_{n}_end:")?;
        Ok(())
    }

    fn codegen_assign(&mut self, lhs: &Expr, rhs: &Expr, reg: u32) -> Result<()> {
        let derefs = self.lower_assign_target(lhs, reg)?;
        for _ in 0..derefs {
            writeln!(&mut self.output, "    mov r{reg}, @r{reg}")?;
        }

        let (scratch, preserve) = self.registers.borrow_register(Some(reg));
        if preserve {
            writeln!(&mut self.output, "    push r{scratch}")?;
        }
        self.expr_in_reg(rhs, scratch)?;
        writeln!(&mut self.output, "    mov @r{reg}, r{scratch}")?;
        if preserve {
            writeln!(&mut self.output, "    pop r{scratch}")?;
        }
        self.registers.return_register(scratch, preserve);
        Ok(())
    }

    fn codegen_call(&mut self, name: &str, args: &[Expr], dest: Option<u32>) -> Result<()> {
        writeln!(&mut self.output, "\n    ; calling {name}")?;

        let preserve_r0 = matches!(dest, Some(d) if d != 0);
        if preserve_r0 {
            writeln!(&mut self.output, "    push r0")?;
        }

        const ARG_REGISTERS: [u32; 3] = [1, 2, 3];
        let mut register_pushes = Vec::new();
        let mut stack_bytes = 0i64;

        for (i, arg) in args.iter().enumerate() {
            if i < 3 {
                let reg = ARG_REGISTERS[i];
                let already_taken = self.registers.borrow_specific(reg);
                if already_taken {
                    writeln!(&mut self.output, "    push r{reg}")?;
                    register_pushes.push(reg);
                }
                self.expr_in_reg(arg, reg)?;
            } else {
                self.expr_in_reg(arg, 0)?;
                writeln!(&mut self.output, "    push r0")?;
                stack_bytes += 4;
            }
        }

        writeln!(&mut self.output, "    call {name}")?;

        if stack_bytes > 0 {
            writeln!(&mut self.output, "    add sp, {stack_bytes}")?;
        }

        for reg in register_pushes.iter().rev() {
            writeln!(&mut self.output, "    pop r{reg}")?;
        }
        for i in 0..args.len().min(3) {
            self.registers.return_register(ARG_REGISTERS[i], false);
        }

        if let Some(dest) = dest {
            if dest != 0 {
                writeln!(&mut self.output, "    mov r{dest}, r0")?;
            }
        }
        if preserve_r0 {
            if let Some(dest) = dest {
                writeln!(&mut self.output, "    pop r{dest}")?;
            } else {
                writeln!(&mut self.output, "    pop r0")?;
            }
        }
        Ok(())
    }

    fn codegen_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Return(expr, _) => {
                if let Some(expr) = expr {
                    self.expr_in_reg(expr, 0)?;
                }
                writeln!(&mut self.output, "    jmp .end")?;
                Ok(())
            }
            Stmt::VarDecl(decl) => {
                let offset = self.current_r7_offset;
                if let Some(size) = decl.array_size {
                    let bytes = 4 * size as i64 + 4;
                    writeln!(&mut self.output, "    sub sp, {bytes}  ; space for {}", decl.name)?;
                    self.variables.insert(decl.name.clone(), offset);
                    self.current_r7_offset += bytes;
                    // The named slot holds a pointer to the first element,
                    // which lives in the bytes directly above it.
                    writeln!(&mut self.output, "    ; initialising {} (array base)", decl.name)?;
                    writeln!(&mut self.output, "    mov r1, r7")?;
                    writeln!(&mut self.output, "    sub r1, {}", offset - 4)?;
                    writeln!(&mut self.output, "    mov r2, r7")?;
                    writeln!(&mut self.output, "    sub r2, {offset}")?;
                    writeln!(&mut self.output, "    mov @r2, r1")?;
                } else {
                    writeln!(&mut self.output, "    sub sp, 4  ; space for {}", decl.name)?;
                    self.variables.insert(decl.name.clone(), offset);
                    self.current_r7_offset += 4;

                    if let Some(init) = &decl.initializer {
                        self.expr_in_reg(init, 1)?;
                        writeln!(&mut self.output, "    ; initialising {}", decl.name)?;
                        writeln!(&mut self.output, "    mov r2, r7")?;
                        writeln!(&mut self.output, "    sub r2, {offset}")?;
                        writeln!(&mut self.output, "    mov @r2, r1")?;
                    }
                }
                Ok(())
            }
            Stmt::ExprStmt(expr) => match &expr.kind {
                ExprKind::Call(name, args) => self.codegen_call(name, args, None),
                ExprKind::Binary(BinaryOp::Assign, lhs, rhs) => {
                    self.codegen_assign(lhs, rhs, 1)
                }
                other => Err(format!("{other:?} is not valid as a statement expression").into()),
            },
            Stmt::Compound(stmts, _) => {
                for s in stmts {
                    self.codegen_stmt(s)?;
                }
                Ok(())
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                self.expr_in_reg(cond, 1)?;
                let n = self.fresh_branch();
                writeln!(&mut self.output, "    cmp r1, 1")?;
                writeln!(&mut self.output, "    je .true_{n}")?;
                writeln!(&mut self.output, "    ; false")?;
                if let Some(else_branch) = else_branch {
                    self.codegen_stmt(else_branch)?;
                }
                writeln!(&mut self.output, "    jmp .done_{n}")?;
                writeln!(&mut self.output, ".true_{n}:")?;
                self.codegen_stmt(then_branch)?;
                writeln!(&mut self.output, ".done_{n}:")?;
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let n = self.fresh_branch();
                self.loop_stack.push(LoopLabels { id: n });
                writeln!(&mut self.output, ".loop{n}:")?;
                self.expr_in_reg(cond, 1)?;
                writeln!(&mut self.output, "    cmp r1, 0")?;
                writeln!(&mut self.output, "    je .doneloop{n}\n")?;
                self.codegen_stmt(body)?;
                writeln!(&mut self.output, ".continueloop{n}:")?;
                writeln!(&mut self.output, "\n    jmp .loop{n}")?;
                writeln!(&mut self.output, ".doneloop{n}:")?;
                self.loop_stack.pop();
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                incr,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.codegen_stmt(init)?;
                }
                let n = self.fresh_branch();
                self.loop_stack.push(LoopLabels { id: n });
                writeln!(&mut self.output, ".loop{n}:")?;
                if let Some(cond) = cond {
                    self.expr_in_reg(cond, 1)?;
                    writeln!(&mut self.output, "    cmp r1, 0")?;
                    writeln!(&mut self.output, "    je .doneloop{n}\n")?;
                }
                self.codegen_stmt(body)?;
                writeln!(&mut self.output, ".continueloop{n}:")?;
                if let Some(incr) = incr {
                    self.expr_in_reg(incr, 1)?;
                }
                writeln!(&mut self.output, "\n    jmp .loop{n}")?;
                writeln!(&mut self.output, ".doneloop{n}:")?;
                self.loop_stack.pop();
                Ok(())
            }
            Stmt::Break(_) => {
                let n = self
                    .loop_stack
                    .last()
                    .ok_or(CodeGenError::from("break outside of a loop"))?
                    .id;
                writeln!(&mut self.output, "    jmp .doneloop{n}")?;
                Ok(())
            }
            Stmt::Continue(_) => {
                let n = self
                    .loop_stack
                    .last()
                    .ok_or(CodeGenError::from("continue outside of a loop"))?
                    .id;
                writeln!(&mut self.output, "    jmp .continueloop{n}")?;
                Ok(())
            }
            Stmt::Asm(asm) => self.codegen_asm(asm),
        }
    }

    fn codegen_asm(&mut self, asm: &AsmBlock) -> Result<()> {
        writeln!(&mut self.output, "\n; BEGIN INLINE ASM")?;
        writeln!(&mut self.output, "push r6")?;

        for clobber in &asm.clobbers {
            writeln!(&mut self.output, "push {clobber}")?;
        }

        if asm.inputs.len() > 3 {
            return Err("inline assembly currently allows at most 3 inputs".into());
        }
        for input in &asm.inputs {
            let reg = parse_register_constraint(&input.constraint)?;
            self.expr_in_reg(&input.expr, reg)?;
        }

        writeln!(&mut self.output)?;
        self.output.push_str(&asm.template);
        writeln!(&mut self.output)?;

        if asm.outputs.len() > 4 {
            return Err("inline assembly currently allows at most 4 outputs".into());
        }
        for output in &asm.outputs {
            let ExprKind::Var(name) = &output.expr.kind else {
                return Err("asm output operand must be a variable".into());
            };
            let offset = self.var_offset(name)?;
            writeln!(&mut self.output, "; outputting {name}")?;
            writeln!(&mut self.output, "mov r6, r7")?;
            writeln!(&mut self.output, "sub r6, {offset}")?;
            writeln!(&mut self.output, "mov @r6, {}", output.constraint)?;
        }

        for clobber in asm.clobbers.iter().rev() {
            writeln!(&mut self.output, "pop {clobber}")?;
        }
        writeln!(&mut self.output, "pop r6")?;
        writeln!(&mut self.output, "\n; END INLINE ASM")?;
        Ok(())
    }
}

/// Parses a `"r<N>"` asm constraint string into its register number.
fn parse_register_constraint(constraint: &str) -> Result<u32> {
    constraint
        .trim_start_matches('r')
        .parse::<u32>()
        .map_err(|_| CodeGenError::from(format!("malformed register constraint `{constraint}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, TypeKind};
    use cplus_core::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation::new("t.cp", 1, 1)
    }

    fn num(n: &str) -> Expr {
        Expr::new(ExprKind::Number(n.into()), loc())
    }

    fn var(name: &str) -> Expr {
        Expr::new(ExprKind::Var(name.into()), loc())
    }

    fn main_returning(body: Vec<Stmt>) -> Function {
        Function {
            name: "main".into(),
            return_ty: TypeKind::Int,
            return_pointer_level: 0,
            params: vec![],
            body: Stmt::Compound(body, loc()),
            location: loc(),
        }
    }

    #[test]
    fn emits_header_and_jmp_main() {
        let mut program = Program::default();
        program.functions.push(main_returning(vec![Stmt::Return(Some(num("0")), loc())]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.starts_with("; GENERATED FROM C+ BY C+ COMPILER\njmp main\n"));
        assert!(out.contains("main:"));
        assert!(out.contains("    ret"));
    }

    #[test]
    fn missing_main_is_an_error() {
        let program = Program::default();
        let mut cg = CatCodegen::new();
        assert!(cg.generate(&program).is_err());
    }

    #[test]
    fn prologue_and_epilogue_save_callee_registers() {
        let mut program = Program::default();
        program.functions.push(main_returning(vec![Stmt::Return(Some(num("0")), loc())]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.contains("push r4"));
        assert!(out.contains("push r5"));
        assert!(out.contains("push r6"));
        assert!(out.contains("push r7"));
        assert!(out.contains("mov r7, sp"));
        assert!(out.contains(".end:"));
        assert!(out.contains("pop r4"));
    }

    #[test]
    fn string_literal_is_interned_and_emitted_in_data_section() {
        let mut program = Program::default();
        let call = Expr::new(
            ExprKind::Call(
                "__cplus_print_".into(),
                vec![Expr::new(ExprKind::StringLiteral("hi".into()), loc())],
            ),
            loc(),
        );
        program.functions.push(main_returning(vec![
            Stmt::ExprStmt(call),
            Stmt::Return(Some(num("0")), loc()),
        ]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.contains("mov r1, str_0"));
        assert!(out.contains("str_0:"));
        assert!(out.contains("d8 0x68, 0x69, 0x00"));
    }

    #[test]
    fn duplicate_string_literals_share_one_label() {
        let mut program = Program::default();
        let call = |text: &str| {
            Expr::new(
                ExprKind::Call(
                    "__cplus_print_".into(),
                    vec![Expr::new(ExprKind::StringLiteral(text.into()), loc())],
                ),
                loc(),
            )
        };
        program.functions.push(main_returning(vec![
            Stmt::ExprStmt(call("hi")),
            Stmt::ExprStmt(call("hi")),
            Stmt::Return(Some(num("0")), loc()),
        ]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert_eq!(out.matches("str_0:").count(), 1);
    }

    #[test]
    fn while_loop_emits_loop_and_done_labels_once() {
        let mut program = Program::default();
        program.functions.push(main_returning(vec![
            Stmt::While {
                cond: num("1"),
                body: Box::new(Stmt::Compound(vec![Stmt::Break(loc())], loc())),
                location: loc(),
            },
            Stmt::Return(Some(num("0")), loc()),
        ]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert_eq!(out.matches(".loop0:").count(), 1);
        assert_eq!(out.matches(".doneloop0:").count(), 1);
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let mut program = Program::default();
        program.functions.push(main_returning(vec![
            Stmt::If {
                cond: num("1"),
                then_branch: Box::new(Stmt::Compound(vec![Stmt::Break(loc())], loc())),
                else_branch: None,
                location: loc(),
            },
            Stmt::Return(Some(num("0")), loc()),
        ]));
        let mut cg = CatCodegen::new();
        assert!(cg.generate(&program).is_err());
    }

    #[test]
    fn call_with_more_than_three_arguments_pushes_the_rest() {
        let mut program = Program::default();
        let mut f = Function {
            name: "f".into(),
            return_ty: TypeKind::Int,
            return_pointer_level: 0,
            params: ["a", "b", "c", "d"]
                .iter()
                .map(|n| Param {
                    ty: TypeKind::Int,
                    pointer_level: 0,
                    name: (*n).into(),
                    is_const: false,
                    location: loc(),
                })
                .collect(),
            body: Stmt::Compound(vec![], loc()),
            location: loc(),
        };
        f.body = Stmt::Compound(vec![Stmt::Return(Some(var("a")), loc())], loc());
        program.functions.push(f);

        let call = Expr::new(
            ExprKind::Call("f".into(), vec![num("1"), num("2"), num("3"), num("4")]),
            loc(),
        );
        program.functions.push(main_returning(vec![Stmt::Return(Some(call), loc())]));

        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.contains("push r0"));
        assert!(out.contains("add sp, 4"));
    }

    #[test]
    fn variable_offset_is_restored_after_function_exits() {
        let mut program = Program::default();
        let decl = |name: &str, init: &str| {
            Stmt::VarDecl(crate::ast::VarDecl {
                ty: TypeKind::Int,
                pointer_level: 0,
                array_size: None,
                name: name.into(),
                initializer: Some(num(init)),
                is_const: false,
                location: loc(),
            })
        };
        let a = Function {
            name: "a".into(),
            return_ty: TypeKind::Int,
            return_pointer_level: 0,
            params: vec![],
            body: Stmt::Compound(vec![decl("x", "1"), Stmt::Return(Some(var("x")), loc())], loc()),
            location: loc(),
        };
        program.functions.push(a);
        program
            .functions
            .push(main_returning(vec![decl("y", "2"), Stmt::Return(Some(var("y")), loc())]));

        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        // Each function starts its own frame at offset 4, independent of
        // what the other function allocated.
        assert!(out.contains("sub sp, 4  ; space for x"));
        assert!(out.contains("sub sp, 4  ; space for y"));
    }

    #[test]
    fn modulo_uses_umod_mnemonic() {
        let mut program = Program::default();
        let modexpr = Expr::new(
            ExprKind::Binary(BinaryOp::Mod, Box::new(num("7")), Box::new(num("2"))),
            loc(),
        );
        program.functions.push(main_returning(vec![Stmt::Return(Some(modexpr), loc())]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.contains("umod"));
    }

    #[test]
    fn negation_uses_not_and_increment() {
        let mut program = Program::default();
        let decl = Stmt::VarDecl(crate::ast::VarDecl {
            ty: TypeKind::Int,
            pointer_level: 0,
            array_size: None,
            name: "x".into(),
            initializer: Some(num("5")),
            is_const: false,
            location: loc(),
        });
        let neg = Expr::new(ExprKind::Unary(UnaryOp::Neg, Box::new(var("x"))), loc());
        program.functions.push(main_returning(vec![decl, Stmt::Return(Some(neg), loc())]));
        let mut cg = CatCodegen::new();
        let out = cg.generate(&program).unwrap();
        assert!(out.contains("not r"));
        assert!(out.contains("add r"));
    }
}
