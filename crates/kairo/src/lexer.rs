//! Tokenizer for the source language.
//!
//! Produces a flat token stream with source spans. Automatic semicolon
//! insertion is a parser concern; the lexer's contribution is the
//! `newline_before` flag carried on every token, which the parser consults
//! when deciding whether a statement may end at a line break.
//!
//! Template literals are scanned here in full: a template token carries its
//! literal chunks plus recursively lexed token streams for each `${...}`
//! interpolation, so the parser never needs lexer feedback. Regex literals
//! are disambiguated from division by the kind of the previous token.

use std::{rc::Rc, str::FromStr};

use num_bigint::BigInt;
use strum::EnumString;

use crate::{
    exception::ParseError,
    intern::{Interner, Symbol},
};

/// A 1-based line/column position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

/// A half-open span of source text, used for error carets and AST positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeRange {
    pub start: CodeLoc,
    pub end: CodeLoc,
}

impl CodeRange {
    pub(crate) fn new(start: CodeLoc, end: CodeLoc) -> Self {
        Self { start, end }
    }

    /// A span covering both inputs.
    pub(crate) fn cover(self, other: Self) -> Self {
        Self {
            start: self.start,
            end: other.end,
        }
    }
}

/// Reserved words of the language.
///
/// Contextual keywords (`of`, `get`, `set`, `static`, `async`) are not listed
/// here: they lex as identifiers and the parser matches their symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Kw {
    Let,
    Const,
    Var,
    If,
    Else,
    While,
    Do,
    For,
    Function,
    Return,
    New,
    Class,
    Extends,
    Super,
    This,
    Try,
    Catch,
    Finally,
    Throw,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Yield,
    Await,
    TypeOf,
    Delete,
    Void,
    InstanceOf,
    In,
    Null,
    True,
    False,
    Undefined,
}

/// Punctuators and operators, longest-match scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    DotDotDot,
    Arrow,
    Question,
    QuestionDot,
    QuestionQuestion,
    QuestionQuestionEq,
    Colon,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    UShrEq,
    AndAndEq,
    OrOrEq,
    EqEq,
    NotEq,
    EqEqEq,
    NotEqEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Shl,
    Shr,
    UShr,
}

/// One part of a template literal token.
#[derive(Debug, Clone)]
pub(crate) enum TplPart {
    /// A literal chunk between interpolations (cooked, escapes applied).
    Chunk(Rc<str>),
    /// A `${...}` interpolation, lexed to a nested token stream.
    Expr(Vec<Token>),
}

#[derive(Debug, Clone)]
pub(crate) enum TokKind {
    Ident(Symbol),
    Keyword(Kw),
    Num(f64),
    BigInt(Box<BigInt>),
    Str(Rc<str>),
    Template(Vec<TplPart>),
    Regex { pattern: Rc<str>, flags: Rc<str> },
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokKind,
    pub span: CodeRange,
    /// Whether at least one line terminator separates this token from the
    /// previous one. Drives automatic semicolon insertion in the parser.
    pub newline_before: bool,
}

/// Lexes a complete source text into a token stream ending with `Eof`.
pub(crate) fn lex(source: &str, interner: &mut Interner) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    lexer.lex_all(interner)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    /// Whether the previous significant token can end an expression. When it
    /// can, `/` is division; otherwise it starts a regex literal.
    prev_ends_expr: bool,
    pending_newline: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            prev_ends_expr: false,
            pending_newline: false,
        }
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
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

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.loc())
    }

    fn lex_all(&mut self, interner: &mut Interner) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token(interner)?;
            let done = matches!(token.kind, TokKind::Eof);
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Skips whitespace and comments, recording whether a line terminator was
    /// crossed.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    if c == '\n' {
                        self.pending_newline = true;
                    }
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => self.pending_newline = true,
                            Some(_) => {}
                            None => return Err(self.error("unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self, interner: &mut Interner) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let newline_before = std::mem::take(&mut self.pending_newline);
        let start = self.loc();

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokKind::Eof,
                span: CodeRange::new(start, start),
                newline_before,
            });
        };

        let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.scan_number()?
        } else if c == '"' || c == '\'' {
            self.scan_string(c)?
        } else if c == '`' {
            self.scan_template(interner)?
        } else if c == '/' && !self.prev_ends_expr {
            self.scan_regex()?
        } else if is_ident_start(c) {
            self.scan_word(interner)
        } else {
            self.scan_punct()?
        };

        self.prev_ends_expr = matches!(
            kind,
            TokKind::Ident(_)
                | TokKind::Num(_)
                | TokKind::BigInt(_)
                | TokKind::Str(_)
                | TokKind::Template(_)
                | TokKind::Regex { .. }
                | TokKind::Keyword(Kw::This | Kw::Super | Kw::True | Kw::False | Kw::Null | Kw::Undefined)
                | TokKind::Punct(Punct::RParen | Punct::RBracket | Punct::RBrace | Punct::PlusPlus | Punct::MinusMinus)
        );

        Ok(Token {
            kind,
            span: CodeRange::new(start, self.loc()),
            newline_before,
        })
    }

    fn scan_word(&mut self, interner: &mut Interner) -> TokKind {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if let Ok(kw) = Kw::from_str(&word) {
            TokKind::Keyword(kw)
        } else {
            TokKind::Ident(interner.intern(&word))
        }
    }

    fn scan_number(&mut self) -> Result<TokKind, ParseError> {
        let mut text = String::new();
        let radix = if self.peek() == Some('0') {
            match self.peek_at(1) {
                Some('x' | 'X') => 16,
                Some('o' | 'O') => 8,
                Some('b' | 'B') => 2,
                _ => 10,
            }
        } else {
            10
        };

        if radix != 10 {
            self.bump();
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_digit(radix) || c == '_' {
                    if c != '_' {
                        text.push(c);
                    }
                    self.bump();
                } else {
                    break;
                }
            }
            if text.is_empty() {
                return Err(self.error("missing digits in numeric literal"));
            }
            if self.eat('n') {
                let value = BigInt::parse_bytes(text.as_bytes(), radix).ok_or_else(|| self.error("invalid bigint literal"))?;
                return Ok(TokKind::BigInt(Box::new(value)));
            }
            let value = u128::from_str_radix(&text, radix).map_err(|_| self.error("numeric literal overflow"))? as f64;
            return Ok(TokKind::Num(value));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                if c != '_' {
                    text.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_none_or(|c| c != '.') {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push('e');
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                text.push(self.bump().expect("sign peeked"));
            }
            let mut any = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    any = true;
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            if !any {
                return Err(self.error("missing exponent digits"));
            }
        }
        if self.eat('n') {
            if is_float {
                return Err(self.error("bigint literal cannot have a fractional part"));
            }
            let value = BigInt::parse_bytes(text.as_bytes(), 10).ok_or_else(|| self.error("invalid bigint literal"))?;
            return Ok(TokKind::BigInt(Box::new(value)));
        }
        let value: f64 = text.parse().map_err(|_| self.error("invalid numeric literal"))?;
        Ok(TokKind::Num(value))
    }

    fn scan_string(&mut self, quote: char) -> Result<TokKind, ParseError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => out.push_str(&self.scan_escape()?),
                Some(c) => out.push(c),
            }
        }
        Ok(TokKind::Str(out.into()))
    }

    fn scan_escape(&mut self) -> Result<String, ParseError> {
        let Some(c) = self.bump() else {
            return Err(self.error("unterminated escape sequence"));
        };
        let s = match c {
            'n' => "\n".to_owned(),
            't' => "\t".to_owned(),
            'r' => "\r".to_owned(),
            'b' => "\u{8}".to_owned(),
            'f' => "\u{c}".to_owned(),
            'v' => "\u{b}".to_owned(),
            '0' => "\0".to_owned(),
            '\n' => String::new(),
            'x' => {
                let hi = self.bump().ok_or_else(|| self.error("bad \\x escape"))?;
                let lo = self.bump().ok_or_else(|| self.error("bad \\x escape"))?;
                let code = u32::from_str_radix(&format!("{hi}{lo}"), 16).map_err(|_| self.error("bad \\x escape"))?;
                char::from_u32(code).ok_or_else(|| self.error("bad \\x escape"))?.to_string()
            }
            'u' => {
                if self.eat('{') {
                    let mut digits = String::new();
                    loop {
                        match self.bump() {
                            Some('}') => break,
                            Some(d) if d.is_ascii_hexdigit() => digits.push(d),
                            _ => return Err(self.error("bad \\u escape")),
                        }
                    }
                    let code = u32::from_str_radix(&digits, 16).map_err(|_| self.error("bad \\u escape"))?;
                    char::from_u32(code).ok_or_else(|| self.error("bad \\u escape"))?.to_string()
                } else {
                    let mut digits = String::new();
                    for _ in 0..4 {
                        let d = self.bump().ok_or_else(|| self.error("bad \\u escape"))?;
                        digits.push(d);
                    }
                    let code = u32::from_str_radix(&digits, 16).map_err(|_| self.error("bad \\u escape"))?;
                    char::from_u32(code).ok_or_else(|| self.error("bad \\u escape"))?.to_string()
                }
            }
            other => other.to_string(),
        };
        Ok(s)
    }

    fn scan_template(&mut self, interner: &mut Interner) -> Result<TokKind, ParseError> {
        self.bump();
        let mut parts = Vec::new();
        let mut chunk = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    chunk.push_str(&self.scan_escape()?);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    parts.push(TplPart::Chunk(std::mem::take(&mut chunk).into()));
                    parts.push(TplPart::Expr(self.lex_until_close_brace(interner)?));
                }
                Some(_) => {
                    let c = self.bump().expect("template char peeked");
                    chunk.push(c);
                }
            }
        }
        parts.push(TplPart::Chunk(chunk.into()));
        Ok(TokKind::Template(parts))
    }

    /// Lexes the token stream of a `${...}` interpolation up to the matching
    /// closing brace, tracking nested braces.
    fn lex_until_close_brace(&mut self, interner: &mut Interner) -> Result<Vec<Token>, ParseError> {
        let mut depth = 0u32;
        let mut tokens = Vec::new();
        self.prev_ends_expr = false;
        loop {
            self.skip_trivia()?;
            if self.peek().is_none() {
                return Err(self.error("unterminated template interpolation"));
            }
            if self.peek() == Some('}') && depth == 0 {
                self.bump();
                let loc = self.loc();
                tokens.push(Token {
                    kind: TokKind::Eof,
                    span: CodeRange::new(loc, loc),
                    newline_before: false,
                });
                return Ok(tokens);
            }
            let token = self.next_token(interner)?;
            match token.kind {
                TokKind::Punct(Punct::LBrace) => depth += 1,
                TokKind::Punct(Punct::RBrace) => depth -= 1,
                _ => {}
            }
            tokens.push(token);
        }
    }

    fn scan_regex(&mut self) -> Result<TokKind, ParseError> {
        self.bump();
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated regex literal")),
                Some('\\') => {
                    pattern.push('\\');
                    let c = self.bump().ok_or_else(|| self.error("unterminated regex literal"))?;
                    pattern.push(c);
                }
                Some('[') => {
                    in_class = true;
                    pattern.push('[');
                }
                Some(']') => {
                    in_class = false;
                    pattern.push(']');
                }
                Some('/') if !in_class => break,
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                flags.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(TokKind::Regex {
            pattern: pattern.into(),
            flags: flags.into(),
        })
    }

    fn scan_punct(&mut self) -> Result<TokKind, ParseError> {
        use Punct::*;
        let c = self.bump().expect("punct char peeked");
        let p = match c {
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            ';' => Semi,
            ',' => Comma,
            ':' => Colon,
            '~' => Tilde,
            '.' => {
                if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                    self.bump();
                    self.bump();
                    DotDotDot
                } else {
                    Dot
                }
            }
            '?' => {
                if self.eat('.') {
                    QuestionDot
                } else if self.eat('?') {
                    if self.eat('=') { QuestionQuestionEq } else { QuestionQuestion }
                } else {
                    Question
                }
            }
            '+' => {
                if self.eat('+') {
                    PlusPlus
                } else if self.eat('=') {
                    PlusEq
                } else {
                    Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    MinusMinus
                } else if self.eat('=') {
                    MinusEq
                } else {
                    Minus
                }
            }
            '*' => {
                if self.eat('*') {
                    if self.eat('=') { StarStarEq } else { StarStar }
                } else if self.eat('=') {
                    StarEq
                } else {
                    Star
                }
            }
            '/' => {
                if self.eat('=') { SlashEq } else { Slash }
            }
            '%' => {
                if self.eat('=') { PercentEq } else { Percent }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { EqEqEq } else { EqEq }
                } else if self.eat('>') {
                    Arrow
                } else {
                    Eq
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { NotEqEq } else { NotEq }
                } else {
                    Bang
                }
            }
            '<' => {
                if self.eat('<') {
                    if self.eat('=') { ShlEq } else { Shl }
                } else if self.eat('=') {
                    Le
                } else {
                    Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') { UShrEq } else { UShr }
                    } else if self.eat('=') {
                        ShrEq
                    } else {
                        Shr
                    }
                } else if self.eat('=') {
                    Ge
                } else {
                    Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    if self.eat('=') { AndAndEq } else { AndAnd }
                } else if self.eat('=') {
                    AmpEq
                } else {
                    Amp
                }
            }
            '|' => {
                if self.eat('|') {
                    if self.eat('=') { OrOrEq } else { OrOr }
                } else if self.eat('=') {
                    PipeEq
                } else {
                    Pipe
                }
            }
            '^' => {
                if self.eat('=') { CaretEq } else { Caret }
            }
            other => return Err(self.error(format!("unexpected character '{other}'"))),
        };
        Ok(TokKind::Punct(p))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokKind> {
        let mut interner = Interner::new();
        lex(source, &mut interner).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_numbers_and_bigints() {
        let toks = kinds("1 2.5 0xff 10n 1e3");
        assert!(matches!(toks[0], TokKind::Num(n) if n == 1.0));
        assert!(matches!(toks[1], TokKind::Num(n) if n == 2.5));
        assert!(matches!(toks[2], TokKind::Num(n) if n == 255.0));
        assert!(matches!(&toks[3], TokKind::BigInt(b) if **b == BigInt::from(10)));
        assert!(matches!(toks[4], TokKind::Num(n) if n == 1000.0));
    }

    #[test]
    fn newline_flag_set_after_line_terminator() {
        let mut interner = Interner::new();
        let toks = lex("a\nb", &mut interner).unwrap();
        assert!(!toks[0].newline_before);
        assert!(toks[1].newline_before);
    }

    #[test]
    fn regex_vs_division() {
        let toks = kinds("a / b");
        assert!(matches!(toks[1], TokKind::Punct(Punct::Slash)));
        let toks = kinds("x = /ab+c/g");
        assert!(matches!(&toks[2], TokKind::Regex { pattern, flags }
            if &**pattern == "ab+c" && &**flags == "g"));
    }

    #[test]
    fn template_with_nested_interpolation() {
        let toks = kinds("`a${1 + `b${2}`}c`");
        let TokKind::Template(parts) = &toks[0] else {
            panic!("expected template token");
        };
        assert!(matches!(&parts[0], TplPart::Chunk(c) if &**c == "a"));
        assert!(matches!(&parts[1], TplPart::Expr(_)));
        assert!(matches!(&parts[2], TplPart::Chunk(c) if &**c == "c"));
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#"'a\nbA'"#);
        assert!(matches!(&toks[0], TokKind::Str(s) if &**s == "a\nbA"));
    }
}
