//! Character stream to token stream.

use cplus_core::{DiagnosticEngine, SourceLocation};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // type keywords
    Int,
    Long,
    Char,
    Float,
    Double,
    KwString,
    Bool,
    Void,
    Const,
    // control keywords
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Asm,
    // literals / identifiers
    Identifier,
    IntNumber,
    FloatNumber,
    StringLiteral,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    AndAnd,
    OrOr,
    Not,
    Amp,
    PlusPlus,
    MinusMinus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Eof,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: SourceLocation,
}

impl PartialEq<TokenKind> for Token {
    fn eq(&self, other: &TokenKind) -> bool {
        self.kind == *other
    }
}

fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "int" => TokenKind::Int,
        "long" => TokenKind::Long,
        "char" => TokenKind::Char,
        "float" => TokenKind::Float,
        "double" => TokenKind::Double,
        "string" => TokenKind::KwString,
        "bool" => TokenKind::Bool,
        "void" => TokenKind::Void,
        "const" => TokenKind::Const,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "asm" => TokenKind::Asm,
        _ => return None,
    })
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    file: PathBuf,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(file: impl Into<PathBuf>, source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            file: file.into(),
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.file.clone(), self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn next_token(&mut self, diagnostics: &mut DiagnosticEngine) -> Token {
        self.skip_whitespace_and_comments();
        let start_loc = self.loc();

        let Some(c) = self.peek() else {
            return Token {
                kind: TokenKind::Eof,
                text: String::new(),
                location: start_loc,
            };
        };

        if c.is_alphabetic() || c == '_' {
            let mut text = String::new();
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            let kind = keyword(&text).unwrap_or(TokenKind::Identifier);
            return Token {
                kind,
                text,
                location: start_loc,
            };
        }

        if c.is_ascii_digit() {
            let mut text = String::new();
            let mut dots = 0;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else if c == '.' {
                    dots += 1;
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if dots > 1 {
                diagnostics.error(start_loc.clone(), format!("malformed number literal '{text}'"));
                return Token {
                    kind: TokenKind::Invalid,
                    text,
                    location: start_loc,
                };
            }
            let kind = if dots == 1 {
                TokenKind::FloatNumber
            } else {
                TokenKind::IntNumber
            };
            return Token {
                kind,
                text,
                location: start_loc,
            };
        }

        if c == '"' {
            self.advance();
            let mut text = String::new();
            loop {
                match self.peek() {
                    None => {
                        diagnostics.error(start_loc.clone(), "unterminated string literal");
                        break;
                    }
                    Some('"') => {
                        self.advance();
                        break;
                    }
                    Some('\n') => {
                        diagnostics.error(start_loc.clone(), "unterminated string literal");
                        break;
                    }
                    Some('\\') => {
                        self.advance();
                        match self.peek() {
                            Some('n') => {
                                text.push('\n');
                                self.advance();
                            }
                            Some('t') => {
                                text.push('\t');
                                self.advance();
                            }
                            Some('"') => {
                                text.push('"');
                                self.advance();
                            }
                            Some('\\') => {
                                text.push('\\');
                                self.advance();
                            }
                            Some('0') => {
                                text.push('\0');
                                self.advance();
                            }
                            Some('\n') => {
                                self.advance();
                            }
                            Some(other) => {
                                diagnostics.error(
                                    self.loc(),
                                    format!("unknown escape sequence '\\{other}'"),
                                );
                                self.advance();
                            }
                            None => {
                                diagnostics.error(start_loc.clone(), "unterminated string literal");
                            }
                        }
                    }
                    Some(c) => {
                        text.push(c);
                        self.advance();
                    }
                }
            }
            return Token {
                kind: TokenKind::StringLiteral,
                text,
                location: start_loc,
            };
        }

        macro_rules! two_char {
            ($second:expr, $two:expr, $one:expr) => {{
                self.advance();
                if self.peek() == Some($second) {
                    self.advance();
                    Token {
                        kind: $two,
                        text: format!("{c}{}", $second),
                        location: start_loc,
                    }
                } else {
                    Token {
                        kind: $one,
                        text: c.to_string(),
                        location: start_loc,
                    }
                }
            }};
        }

        let token = match c {
            '=' => two_char!('=', TokenKind::EqEq, TokenKind::Assign),
            '!' => two_char!('=', TokenKind::NotEq, TokenKind::Not),
            '<' => two_char!('=', TokenKind::LtEq, TokenKind::Lt),
            '>' => two_char!('=', TokenKind::GtEq, TokenKind::Gt),
            '&' => two_char!('&', TokenKind::AndAnd, TokenKind::Amp),
            '|' => two_char!('|', TokenKind::OrOr, TokenKind::Invalid),
            '+' => {
                self.advance();
                match self.peek() {
                    Some('+') => {
                        self.advance();
                        Token { kind: TokenKind::PlusPlus, text: "++".into(), location: start_loc }
                    }
                    Some('=') => {
                        self.advance();
                        Token { kind: TokenKind::PlusEq, text: "+=".into(), location: start_loc }
                    }
                    _ => Token { kind: TokenKind::Plus, text: "+".into(), location: start_loc },
                }
            }
            '-' => {
                self.advance();
                match self.peek() {
                    Some('-') => {
                        self.advance();
                        Token { kind: TokenKind::MinusMinus, text: "--".into(), location: start_loc }
                    }
                    Some('=') => {
                        self.advance();
                        Token { kind: TokenKind::MinusEq, text: "-=".into(), location: start_loc }
                    }
                    _ => Token { kind: TokenKind::Minus, text: "-".into(), location: start_loc },
                }
            }
            '*' => two_char!('=', TokenKind::StarEq, TokenKind::Star),
            '/' => two_char!('=', TokenKind::SlashEq, TokenKind::Slash),
            '%' => two_char!('=', TokenKind::PercentEq, TokenKind::Percent),
            '(' => {
                self.advance();
                Token { kind: TokenKind::LParen, text: "(".into(), location: start_loc }
            }
            ')' => {
                self.advance();
                Token { kind: TokenKind::RParen, text: ")".into(), location: start_loc }
            }
            '{' => {
                self.advance();
                Token { kind: TokenKind::LBrace, text: "{".into(), location: start_loc }
            }
            '}' => {
                self.advance();
                Token { kind: TokenKind::RBrace, text: "}".into(), location: start_loc }
            }
            '[' => {
                self.advance();
                Token { kind: TokenKind::LBracket, text: "[".into(), location: start_loc }
            }
            ']' => {
                self.advance();
                Token { kind: TokenKind::RBracket, text: "]".into(), location: start_loc }
            }
            ',' => {
                self.advance();
                Token { kind: TokenKind::Comma, text: ",".into(), location: start_loc }
            }
            ';' => {
                self.advance();
                Token { kind: TokenKind::Semicolon, text: ";".into(), location: start_loc }
            }
            ':' => {
                self.advance();
                Token { kind: TokenKind::Colon, text: ":".into(), location: start_loc }
            }
            other => {
                self.advance();
                diagnostics.error(start_loc.clone(), format!("unexpected character '{other}'"));
                Token { kind: TokenKind::Invalid, text: other.to_string(), location: start_loc }
            }
        };

        token
    }

    /// Tokenizes the whole input, always ending with an `Eof` token.
    pub fn tokenize(file: impl Into<PathBuf>, source: &str, diagnostics: &mut DiagnosticEngine) -> Vec<Token> {
        let mut lexer = Lexer::new(file, source);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token(diagnostics);
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, DiagnosticEngine) {
        let mut diag = DiagnosticEngine::new();
        let tokens = Lexer::tokenize("t.cp", source, &mut diag);
        (tokens, diag)
    }

    #[test]
    fn keywords_and_identifiers() {
        let (tokens, diag) = lex("int main return foo");
        assert!(!diag.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].kind, TokenKind::Return);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
    }

    #[test]
    fn multi_char_operators_prefer_longest_match() {
        let (tokens, _diag) = lex("== != <= >= && ||");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn number_with_two_dots_is_an_error() {
        let (_tokens, diag) = lex("1.2.3");
        assert!(diag.has_errors());
    }

    #[test]
    fn string_literal_with_escapes() {
        let (tokens, diag) = lex(r#""hello\nworld""#);
        assert!(!diag.has_errors());
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "hello\nworld");
    }

    #[test]
    fn line_comment_is_skipped() {
        let (tokens, _diag) = lex("int x; // trailing comment\nreturn x;");
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Return));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_tokens, diag) = lex("\"abc");
        assert!(diag.has_errors());
    }

    #[test]
    fn column_tracking_advances_per_character() {
        let (tokens, _diag) = lex("int x");
        assert_eq!(tokens[0].location.column, 1);
        assert_eq!(tokens[1].location.column, 5);
    }
}
