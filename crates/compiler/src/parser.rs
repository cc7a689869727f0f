//! Recursive-descent parser with bounded ring-buffer lookahead.

use crate::ast::*;
use crate::lexer::{Lexer, Token, TokenKind};
use cplus_core::{DiagnosticEngine, RingBuffer, SourceLocation};
use std::path::PathBuf;

pub struct Parser {
    source: Vec<Token>,
    next_index: usize,
    buf: RingBuffer<Token>,
    lookahead: usize,
    eof_token: Token,
}

impl Parser {
    pub fn new(file: impl Into<PathBuf>, source_text: &str, diagnostics: &mut DiagnosticEngine) -> Self {
        Self::with_lookahead(file, source_text, diagnostics, 50)
    }

    pub fn with_lookahead(
        file: impl Into<PathBuf>,
        source_text: &str,
        diagnostics: &mut DiagnosticEngine,
        lookahead: usize,
    ) -> Self {
        let tokens = Lexer::tokenize(file, source_text, diagnostics);
        let eof_token = tokens.last().cloned().unwrap();
        let mut parser = Parser {
            source: tokens,
            next_index: 0,
            buf: RingBuffer::with_capacity(lookahead),
            lookahead,
            eof_token,
        };
        parser.fill();
        parser
    }

    fn fill(&mut self) {
        while self.buf.len() < self.lookahead && self.next_index < self.source.len() {
            self.buf.push_back(self.source[self.next_index].clone());
            self.next_index += 1;
        }
    }

    fn current(&self) -> &Token {
        self.buf.get(0).unwrap_or(&self.eof_token)
    }

    fn peek(&self, n: usize) -> &Token {
        self.buf.get(n).unwrap_or(&self.eof_token)
    }

    fn advance(&mut self) -> Token {
        let tok = self.buf.pop_front().unwrap_or_else(|| self.eof_token.clone());
        self.fill();
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn expect(&mut self, kind: TokenKind, diagnostics: &mut DiagnosticEngine, what: &str) -> Token {
        if self.check(kind) {
            self.advance()
        } else {
            diagnostics.error(
                self.current().location.clone(),
                format!("expected {what}, found '{}'", self.current().text),
            );
            self.current().clone()
        }
    }

    fn synchronize(&mut self) {
        while !self.check(TokenKind::Eof) {
            let kind = self.current().kind;
            self.advance();
            if kind == TokenKind::Semicolon || kind == TokenKind::LBrace {
                break;
            }
        }
    }

    fn is_type_start(&self, kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Int
                | TokenKind::Long
                | TokenKind::Char
                | TokenKind::Float
                | TokenKind::Double
                | TokenKind::KwString
                | TokenKind::Bool
                | TokenKind::Void
                | TokenKind::Const
        )
    }

    fn parse_type_keyword(&mut self, diagnostics: &mut DiagnosticEngine) -> TypeKind {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Int => TypeKind::Int,
            TokenKind::Long => TypeKind::Long,
            TokenKind::Char => TypeKind::Char,
            TokenKind::Float => TypeKind::Float,
            TokenKind::Double => TypeKind::Double,
            TokenKind::KwString => TypeKind::String,
            TokenKind::Bool => TypeKind::Boolean,
            TokenKind::Void => TypeKind::Void,
            _ => {
                diagnostics.error(tok.location.clone(), format!("expected a type, found '{}'", tok.text));
                TypeKind::Int
            }
        }
    }

    pub fn parse(&mut self, diagnostics: &mut DiagnosticEngine) -> Program {
        let mut program = Program::default();

        while !self.check(TokenKind::Eof) {
            let start_checkpoint = self.current().location.clone();
            let lookahead_offset = if self.check(TokenKind::Const) { 1 } else { 0 };
            if !self.is_type_start(self.peek(lookahead_offset).kind) {
                diagnostics.error(start_checkpoint, format!("expected declaration, found '{}'", self.current().text));
                self.synchronize();
                continue;
            }

            let is_const = self.check(TokenKind::Const);
            if is_const {
                self.advance();
            }
            let ty = self.parse_type_keyword(diagnostics);

            let array_size = if self.check(TokenKind::LBracket) {
                self.advance();
                let size_tok = self.expect(TokenKind::IntNumber, diagnostics, "array size");
                self.expect(TokenKind::RBracket, diagnostics, "']'");
                size_tok.text.parse::<u32>().ok()
            } else {
                None
            };

            let mut pointer_level = 0u32;
            while self.check(TokenKind::Star) {
                self.advance();
                pointer_level += 1;
            }

            let name_tok = self.expect(TokenKind::Identifier, diagnostics, "an identifier");
            let name = name_tok.text.clone();
            let location = name_tok.location.clone();

            if self.check(TokenKind::LParen) {
                let func = self.parse_function_rest(ty, pointer_level, name, location, diagnostics);
                program.functions.push(func);
            } else {
                let initializer = if self.check(TokenKind::Assign) {
                    self.advance();
                    Some(self.parse_expression(diagnostics))
                } else {
                    None
                };
                self.expect(TokenKind::Semicolon, diagnostics, "';'");
                program.globals.push(GlobalVar {
                    ty,
                    pointer_level,
                    array_size,
                    name,
                    initializer,
                    is_const,
                    location,
                });
            }
        }

        program
    }

    fn parse_function_rest(
        &mut self,
        return_ty: TypeKind,
        return_pointer_level: u32,
        name: String,
        location: SourceLocation,
        diagnostics: &mut DiagnosticEngine,
    ) -> Function {
        self.expect(TokenKind::LParen, diagnostics, "'('");
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let is_const = if self.check(TokenKind::Const) {
                    self.advance();
                    true
                } else {
                    false
                };
                let ty = self.parse_type_keyword(diagnostics);
                let mut pointer_level = 0u32;
                while self.check(TokenKind::Star) {
                    self.advance();
                    pointer_level += 1;
                }
                let name_tok = self.expect(TokenKind::Identifier, diagnostics, "a parameter name");
                params.push(Param {
                    ty,
                    pointer_level,
                    name: name_tok.text.clone(),
                    is_const,
                    location: name_tok.location.clone(),
                });
                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, diagnostics, "')'");
        let body = self.parse_compound(diagnostics);
        Function {
            name,
            return_ty,
            return_pointer_level,
            params,
            body,
            location,
        }
    }

    fn parse_compound(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let open = self.expect(TokenKind::LBrace, diagnostics, "'{'");
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            stmts.push(self.parse_statement(diagnostics));
        }
        self.expect(TokenKind::RBrace, diagnostics, "'}'");
        Stmt::Compound(stmts, open.location)
    }

    fn parse_statement(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        match self.current().kind {
            TokenKind::Return => {
                let loc = self.advance().location;
                let expr = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression(diagnostics))
                };
                self.expect(TokenKind::Semicolon, diagnostics, "';'");
                Stmt::Return(expr, loc)
            }
            TokenKind::If => self.parse_if(diagnostics),
            TokenKind::While => self.parse_while(diagnostics),
            TokenKind::For => self.parse_for(diagnostics),
            TokenKind::Break => {
                let loc = self.advance().location;
                self.expect(TokenKind::Semicolon, diagnostics, "';'");
                Stmt::Break(loc)
            }
            TokenKind::Continue => {
                let loc = self.advance().location;
                self.expect(TokenKind::Semicolon, diagnostics, "';'");
                Stmt::Continue(loc)
            }
            TokenKind::Asm => self.parse_asm(diagnostics),
            TokenKind::LBrace => self.parse_compound(diagnostics),
            k if self.is_type_start(k) => self.parse_var_decl(diagnostics),
            _ => {
                let expr = self.parse_expression(diagnostics);
                self.expect(TokenKind::Semicolon, diagnostics, "';'");
                Stmt::ExprStmt(expr)
            }
        }
    }

    fn parse_var_decl(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let is_const = if self.check(TokenKind::Const) {
            self.advance();
            true
        } else {
            false
        };
        let location = self.current().location.clone();
        let ty = self.parse_type_keyword(diagnostics);

        let array_size = if self.check(TokenKind::LBracket) {
            self.advance();
            let size_tok = self.expect(TokenKind::IntNumber, diagnostics, "array size");
            self.expect(TokenKind::RBracket, diagnostics, "']'");
            size_tok.text.parse::<u32>().ok()
        } else {
            None
        };

        let mut pointer_level = 0u32;
        while self.check(TokenKind::Star) {
            self.advance();
            pointer_level += 1;
        }

        let name_tok = self.expect(TokenKind::Identifier, diagnostics, "a variable name");
        let initializer = if self.check(TokenKind::Assign) {
            self.advance();
            Some(self.parse_expression(diagnostics))
        } else {
            None
        };
        self.expect(TokenKind::Semicolon, diagnostics, "';'");

        Stmt::VarDecl(VarDecl {
            ty,
            pointer_level,
            array_size,
            name: name_tok.text,
            initializer,
            is_const,
            location,
        })
    }

    fn parse_if(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let location = self.advance().location;
        self.expect(TokenKind::LParen, diagnostics, "'('");
        let cond = self.parse_expression(diagnostics);
        self.expect(TokenKind::RParen, diagnostics, "')'");
        let then_branch = Box::new(self.parse_statement(diagnostics));
        let else_branch = if self.check(TokenKind::Else) {
            self.advance();
            Some(Box::new(self.parse_statement(diagnostics)))
        } else {
            None
        };
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            location,
        }
    }

    fn parse_while(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let location = self.advance().location;
        self.expect(TokenKind::LParen, diagnostics, "'('");
        let cond = self.parse_expression(diagnostics);
        self.expect(TokenKind::RParen, diagnostics, "')'");
        let body = Box::new(self.parse_statement(diagnostics));
        Stmt::While { cond, body, location }
    }

    fn parse_for(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let location = self.advance().location;
        self.expect(TokenKind::LParen, diagnostics, "'('");

        let init = if self.check(TokenKind::Semicolon) {
            self.advance();
            None
        } else if self.is_type_start(self.current().kind) {
            Some(Box::new(self.parse_var_decl(diagnostics)))
        } else {
            let expr = self.parse_expression(diagnostics);
            self.expect(TokenKind::Semicolon, diagnostics, "';'");
            Some(Box::new(Stmt::ExprStmt(expr)))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(diagnostics))
        };
        self.expect(TokenKind::Semicolon, diagnostics, "';'");

        let incr = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression(diagnostics))
        };
        self.expect(TokenKind::RParen, diagnostics, "')'");

        let body = Box::new(self.parse_statement(diagnostics));
        Stmt::For {
            init,
            cond,
            incr,
            body,
            location,
        }
    }

    fn parse_asm(&mut self, diagnostics: &mut DiagnosticEngine) -> Stmt {
        let location = self.advance().location;
        self.expect(TokenKind::LParen, diagnostics, "'('");
        let template_tok = self.expect(TokenKind::StringLiteral, diagnostics, "an assembly template string");

        let mut outputs = Vec::new();
        let mut inputs = Vec::new();
        let mut clobbers = Vec::new();

        if self.check(TokenKind::Colon) {
            self.advance();
            outputs = self.parse_asm_operand_list(diagnostics);
            if self.check(TokenKind::Colon) {
                self.advance();
                inputs = self.parse_asm_operand_list(diagnostics);
                if self.check(TokenKind::Colon) {
                    self.advance();
                    clobbers = self.parse_asm_clobber_list(diagnostics);
                }
            }
        }

        self.expect(TokenKind::RParen, diagnostics, "')'");
        self.expect(TokenKind::Semicolon, diagnostics, "';'");

        Stmt::Asm(AsmBlock {
            template: template_tok.text,
            outputs,
            inputs,
            clobbers,
            location,
        })
    }

    fn parse_asm_operand_list(&mut self, diagnostics: &mut DiagnosticEngine) -> Vec<AsmOperand> {
        let mut operands = Vec::new();
        if self.check(TokenKind::Colon) || self.check(TokenKind::RParen) {
            return operands;
        }
        loop {
            let constraint_tok =
                self.expect(TokenKind::StringLiteral, diagnostics, "a constraint string");
            self.expect(TokenKind::LParen, diagnostics, "'('");
            let expr = self.parse_expression(diagnostics);
            self.expect(TokenKind::RParen, diagnostics, "')'");
            operands.push(AsmOperand {
                constraint: constraint_tok.text,
                expr,
            });
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        operands
    }

    fn parse_asm_clobber_list(&mut self, diagnostics: &mut DiagnosticEngine) -> Vec<String> {
        let mut clobbers = Vec::new();
        if self.check(TokenKind::RParen) {
            return clobbers;
        }
        loop {
            let tok = self.expect(TokenKind::StringLiteral, diagnostics, "a clobber string");
            clobbers.push(tok.text);
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        clobbers
    }

    // expression → assignment
    fn parse_expression(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        self.parse_assignment(diagnostics)
    }

    fn parse_assignment(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let left = self.parse_logical_or(diagnostics);
        if self.check(TokenKind::Assign) {
            let loc = self.advance().location;
            let right = self.parse_assignment(diagnostics);
            Expr::new(
                ExprKind::Binary(BinaryOp::Assign, Box::new(left), Box::new(right)),
                loc,
            )
        } else {
            left
        }
    }

    fn parse_logical_or(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_logical_and(diagnostics);
        while self.check(TokenKind::OrOr) {
            let loc = self.advance().location;
            let right = self.parse_logical_and(diagnostics);
            left = Expr::new(ExprKind::Binary(BinaryOp::Or, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_logical_and(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_equality(diagnostics);
        while self.check(TokenKind::AndAnd) {
            let loc = self.advance().location;
            let right = self.parse_equality(diagnostics);
            left = Expr::new(ExprKind::Binary(BinaryOp::And, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_equality(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_relational(diagnostics);
        loop {
            let op = match self.current().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            let loc = self.advance().location;
            let right = self.parse_relational(diagnostics);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_relational(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_additive(diagnostics);
        loop {
            let op = match self.current().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => break,
            };
            let loc = self.advance().location;
            let right = self.parse_additive(diagnostics);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_additive(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_term(diagnostics);
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let loc = self.advance().location;
            let right = self.parse_term(diagnostics);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_term(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut left = self.parse_unary(diagnostics);
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let loc = self.advance().location;
            let right = self.parse_unary(diagnostics);
            left = Expr::new(ExprKind::Binary(op, Box::new(left), Box::new(right)), loc);
        }
        left
    }

    fn parse_unary(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let op = match self.current().kind {
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let loc = self.advance().location;
            let operand = self.parse_unary(diagnostics);
            Expr::new(ExprKind::Unary(op, Box::new(operand)), loc)
        } else {
            self.parse_postfix(diagnostics)
        }
    }

    fn parse_postfix(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let mut expr = self.parse_primary(diagnostics);
        while self.check(TokenKind::LBracket) {
            let loc = self.advance().location;
            let index = self.parse_expression(diagnostics);
            self.expect(TokenKind::RBracket, diagnostics, "']'");
            expr = Expr::new(ExprKind::ArrayIndex(Box::new(expr), Box::new(index)), loc);
        }
        expr
    }

    fn parse_primary(&mut self, diagnostics: &mut DiagnosticEngine) -> Expr {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::IntNumber | TokenKind::FloatNumber => {
                self.advance();
                Expr::new(ExprKind::Number(tok.text), tok.location)
            }
            TokenKind::StringLiteral => {
                self.advance();
                Expr::new(ExprKind::StringLiteral(tok.text), tok.location)
            }
            TokenKind::Identifier => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression(diagnostics));
                            if self.check(TokenKind::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen, diagnostics, "')'");
                    Expr::new(ExprKind::Call(tok.text, args), tok.location)
                } else {
                    Expr::new(ExprKind::Var(tok.text), tok.location)
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(diagnostics);
                self.expect(TokenKind::RParen, diagnostics, "')'");
                inner
            }
            _ => {
                diagnostics.error(
                    tok.location.clone(),
                    format!("expected an expression, found '{}'", tok.text),
                );
                self.advance();
                Expr::new(ExprKind::Number("0".into()), tok.location)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Program, DiagnosticEngine) {
        let mut diag = DiagnosticEngine::new();
        let program = Parser::new("t.cp", source, &mut diag).parse(&mut diag);
        (program, diag)
    }

    #[test]
    fn parses_minimal_main() {
        let (program, diag) = parse("int main() { return 0; }");
        assert!(!diag.has_errors());
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].name, "main");
    }

    #[test]
    fn parses_global_variable() {
        let (program, diag) = parse("int counter = 0; int main() { return counter; }");
        assert!(!diag.has_errors());
        assert_eq!(program.globals.len(), 1);
        assert_eq!(program.globals[0].name, "counter");
    }

    #[test]
    fn parses_pointer_and_array_declaration() {
        let (program, diag) = parse("int main() { int *p; int arr[4]; return 0; }");
        assert!(!diag.has_errors());
        let Stmt::Compound(stmts, _) = &program.functions[0].body else {
            panic!("expected compound body");
        };
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn parses_for_loop_with_var_decl_init() {
        let (program, diag) =
            parse("int main() { int i; int s = 0; for (i = 1; i <= 10; i = i + 1) s = s + i; return s; }");
        assert!(!diag.has_errors());
        assert_eq!(program.functions.len(), 1);
    }

    #[test]
    fn operator_precedence_matches_grammar() {
        let (program, diag) = parse("int main() { return 1 + 2 * 3; }");
        assert!(!diag.has_errors());
        let Stmt::Compound(stmts, _) = &program.functions[0].body else {
            panic!()
        };
        let Stmt::Return(Some(expr), _) = &stmts[0] else {
            panic!()
        };
        let ExprKind::Binary(BinaryOp::Add, _, rhs) = &expr.kind else {
            panic!("top-level op should be +")
        };
        assert!(matches!(rhs.kind, ExprKind::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn function_call_parses_arguments() {
        let (program, diag) = parse("int f(int a, int b) { return a + b; } int main() { return f(1, 2); }");
        assert!(!diag.has_errors());
        assert_eq!(program.functions.len(), 2);
    }

    #[test]
    fn parse_error_recovers_and_keeps_parsing() {
        let (program, diag) = parse("int main() { @@@ ; return 0; }");
        assert!(diag.has_errors());
        assert_eq!(program.functions.len(), 1);
    }
}
