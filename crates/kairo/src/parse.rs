//! Recursive-descent parser: token stream -> symbolic list form.
//!
//! Each construct is tagged by a reserved head symbol; see [`crate::sexpr`].
//! Automatic semicolon insertion follows the usual rule: a statement may end
//! at a line terminator whenever continuing would not form a valid production,
//! and `return`/`throw`/`break`/`continue` plus postfix `++`/`--` are
//! restricted productions that never continue across a line break.

use std::rc::Rc;

use crate::{
    exception::ParseError,
    intern::{Interner, StaticSym, Symbol},
    lexer::{self, CodeLoc, CodeRange, Kw, Punct, TokKind, Token, TplPart},
    sexpr::SExpr,
};

/// Maximum nesting depth for expressions and statements during parsing.
/// Prevents stack overflow from pathological inputs like `((((((x))))))`.
const MAX_NESTING_DEPTH: u32 = 200;

/// Parses source text into the symbolic list form `(Program stmt ..)`.
pub(crate) fn parse(source: &str, interner: &mut Interner) -> Result<SExpr, ParseError> {
    let tokens = lexer::lex(source, interner)?;
    let mut parser = Parser::new(tokens, interner);
    parser.parse_program()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    interner: &'a mut Interner,
    depth: u32,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, interner: &'a mut Interner) -> Self {
        Self {
            tokens,
            pos: 0,
            interner,
            depth: 0,
        }
    }

    // ==========================
    // Token helpers

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn loc(&self) -> CodeLoc {
        self.peek().span.start
    }

    fn span_here(&self) -> CodeRange {
        self.peek().span
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.loc())
    }

    fn at_punct(&self, p: Punct) -> bool {
        matches!(self.peek().kind, TokKind::Punct(q) if q == p)
    }

    fn at_kw(&self, kw: Kw) -> bool {
        matches!(self.peek().kind, TokKind::Keyword(k) if k == kw)
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().kind, TokKind::Eof)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.at_punct(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct, what: &str) -> Result<CodeRange, ParseError> {
        if self.at_punct(p) {
            Ok(self.bump().span)
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// Identifier at the cursor, treating contextual keywords as identifiers.
    fn at_ident(&self) -> Option<Symbol> {
        match self.peek().kind {
            TokKind::Ident(sym) => Some(sym),
            _ => None,
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<(Symbol, CodeRange), ParseError> {
        match self.peek().kind {
            TokKind::Ident(sym) => {
                let span = self.bump().span;
                Ok((sym, span))
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// Consumes a statement terminator, applying automatic semicolon
    /// insertion: an explicit `;`, a line break before the next token, a
    /// closing brace, or end of input all terminate the statement.
    fn consume_semi(&mut self) -> Result<(), ParseError> {
        if self.eat_punct(Punct::Semi) {
            return Ok(());
        }
        if self.peek().newline_before || self.at_punct(Punct::RBrace) || self.at_eof() {
            return Ok(());
        }
        Err(self.error("expected ';'"))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ==========================
    // Statements

    fn parse_program(&mut self) -> Result<SExpr, ParseError> {
        let start = self.span_here();
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        let span = stmts.last().map_or(start, |s| start.cover(s.span()));
        Ok(SExpr::list(StaticSym::Program, stmts, span))
    }

    fn parse_statement(&mut self) -> Result<SExpr, ParseError> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.leave();
        result
    }

    fn parse_statement_inner(&mut self) -> Result<SExpr, ParseError> {
        let span = self.span_here();
        match self.peek().kind {
            TokKind::Punct(Punct::LBrace) => self.parse_block(),
            TokKind::Punct(Punct::Semi) => {
                self.bump();
                Ok(SExpr::list(StaticSym::Empty, vec![], span))
            }
            TokKind::Keyword(Kw::Let) => self.parse_var_decl(StaticSym::Let),
            TokKind::Keyword(Kw::Const) => self.parse_var_decl(StaticSym::Const),
            TokKind::Keyword(Kw::Var) => self.parse_var_decl(StaticSym::Var),
            TokKind::Keyword(Kw::If) => self.parse_if(),
            TokKind::Keyword(Kw::While) => self.parse_while(),
            TokKind::Keyword(Kw::Do) => self.parse_do_while(),
            TokKind::Keyword(Kw::For) => self.parse_for(),
            TokKind::Keyword(Kw::Function) => {
                self.bump();
                let func = self.parse_function_tail(FuncStyle::Declaration, span)?;
                Ok(func)
            }
            TokKind::Keyword(Kw::Class) => self.parse_class(true),
            TokKind::Keyword(Kw::Return) => self.parse_return(),
            TokKind::Keyword(Kw::Throw) => self.parse_throw(),
            TokKind::Keyword(Kw::Break) => self.parse_break_continue(StaticSym::Break),
            TokKind::Keyword(Kw::Continue) => self.parse_break_continue(StaticSym::Continue),
            TokKind::Keyword(Kw::Try) => self.parse_try(),
            TokKind::Keyword(Kw::Switch) => self.parse_switch(),
            TokKind::Ident(sym) => {
                // `async function` declaration
                if sym.is(StaticSym::Async) && matches!(self.peek_at(1).kind, TokKind::Keyword(Kw::Function)) {
                    self.bump();
                    self.bump();
                    return self.parse_function_tail(FuncStyle::AsyncDeclaration, span);
                }
                // labeled statement: `name: stmt`
                if matches!(self.peek_at(1).kind, TokKind::Punct(Punct::Colon)) {
                    self.bump();
                    self.bump();
                    let body = self.parse_statement()?;
                    let span = span.cover(body.span());
                    return Ok(SExpr::list(
                        StaticSym::Label,
                        vec![SExpr::Sym(sym, span), body],
                        span,
                    ));
                }
                self.parse_expression_statement()
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<SExpr, ParseError> {
        let expr = self.parse_expression()?;
        self.consume_semi()?;
        Ok(expr)
    }

    fn parse_block(&mut self) -> Result<SExpr, ParseError> {
        let start = self.expect_punct(Punct::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.error("unterminated block"));
            }
            stmts.push(self.parse_statement()?);
        }
        let end = self.bump().span;
        Ok(SExpr::list(StaticSym::Block, stmts, start.cover(end)))
    }

    /// `let a = 1, b, c = f()` -> `(Let (Assign a 1) (Assign b (Uninitialized)) (Assign c (Call f)))`
    fn parse_var_decl(&mut self, kind: StaticSym) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        let decl = self.parse_var_decl_body(kind, start)?;
        self.consume_semi()?;
        Ok(decl)
    }

    fn parse_var_decl_body(&mut self, kind: StaticSym, start: CodeRange) -> Result<SExpr, ParseError> {
        let mut decls = Vec::new();
        loop {
            let (name, name_span) = self.expect_ident("variable name")?;
            let (init, span) = if self.eat_punct(Punct::Eq) {
                let value = self.parse_assignment()?;
                let span = name_span.cover(value.span());
                (value, span)
            } else {
                (SExpr::list(StaticSym::Uninitialized, vec![], name_span), name_span)
            };
            decls.push(SExpr::list(
                StaticSym::Assign,
                vec![SExpr::Sym(name, name_span), init],
                span,
            ));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let span = decls.last().map_or(start, |d| start.cover(d.span()));
        Ok(SExpr::List {
            head: kind.into(),
            items: decls,
            span,
        })
    }

    fn parse_if(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        self.expect_punct(Punct::LParen, "'(' after if")?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen, "')' after if condition")?;
        let cons = self.parse_statement()?;
        let mut items = vec![test, cons];
        if self.at_kw(Kw::Else) {
            self.bump();
            items.push(self.parse_statement()?);
        }
        let span = start.cover(items.last().expect("if has arms").span());
        Ok(SExpr::list(StaticSym::If, items, span))
    }

    fn parse_while(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        self.expect_punct(Punct::LParen, "'(' after while")?;
        let test = self.parse_expression()?;
        self.expect_punct(Punct::RParen, "')' after while condition")?;
        let body = self.parse_statement()?;
        let span = start.cover(body.span());
        Ok(SExpr::list(StaticSym::While, vec![test, body], span))
    }

    fn parse_do_while(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        let body = self.parse_statement()?;
        if !self.at_kw(Kw::While) {
            return Err(self.error("expected 'while' after do body"));
        }
        self.bump();
        self.expect_punct(Punct::LParen, "'(' after do..while")?;
        let test = self.parse_expression()?;
        let end = self.expect_punct(Punct::RParen, "')' after do..while condition")?;
        self.consume_semi()?;
        Ok(SExpr::list(StaticSym::DoWhile, vec![body, test], start.cover(end)))
    }

    fn parse_for(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        let is_await = if self.at_kw(Kw::Await) {
            self.bump();
            true
        } else {
            false
        };
        self.expect_punct(Punct::LParen, "'(' after for")?;

        // Decl kind of the loop binding, if any.
        let decl_kind = match self.peek().kind {
            TokKind::Keyword(Kw::Let) => Some(StaticSym::Let),
            TokKind::Keyword(Kw::Const) => Some(StaticSym::Const),
            TokKind::Keyword(Kw::Var) => Some(StaticSym::Var),
            _ => None,
        };

        // Look for `for (x of ..)` / `for (x in ..)` forms.
        let target_offset = if decl_kind.is_some() { 1 } else { 0 };
        let is_of = matches!(self.peek_at(target_offset).kind, TokKind::Ident(s) if s.is(StaticSym::Of))
            || matches!(self.peek_at(target_offset + 1).kind, TokKind::Ident(s) if s.is(StaticSym::Of));
        let is_in = matches!(self.peek_at(target_offset + 1).kind, TokKind::Keyword(Kw::In));

        let target_is_simple = if decl_kind.is_some() {
            matches!(self.peek_at(1).kind, TokKind::Ident(_))
        } else {
            matches!(self.peek().kind, TokKind::Ident(_))
        };

        if target_is_simple && (is_of || is_in) {
            let of_or_in_ok = {
                let after_target = self.peek_at(target_offset + 1).clone();
                matches!(after_target.kind, TokKind::Keyword(Kw::In))
                    || matches!(after_target.kind, TokKind::Ident(s) if s.is(StaticSym::Of))
            };
            if of_or_in_ok {
                if decl_kind.is_some() {
                    self.bump();
                }
                let (target, target_span) = self.expect_ident("loop variable")?;
                let in_form = self.at_kw(Kw::In);
                self.bump(); // `of` or `in`
                let object = self.parse_assignment()?;
                self.expect_punct(Punct::RParen, "')' after for head")?;
                let body = self.parse_statement()?;
                let span = start.cover(body.span());
                let head = if in_form {
                    StaticSym::ForIn
                } else if is_await {
                    StaticSym::ForAwaitOf
                } else {
                    StaticSym::ForOf
                };
                if in_form && is_await {
                    return Err(self.error("'for await' requires an of loop"));
                }
                let kind_atom = match decl_kind {
                    Some(kind) => SExpr::Sym(kind.into(), target_span),
                    None => SExpr::list(StaticSym::Empty, vec![], target_span),
                };
                return Ok(SExpr::list(
                    head,
                    vec![kind_atom, SExpr::Sym(target, target_span), object, body],
                    span,
                ));
            }
        }

        if is_await {
            return Err(self.error("'for await' requires an of loop"));
        }

        // Classic three-clause for.
        let init = if self.at_punct(Punct::Semi) {
            self.bump();
            SExpr::list(StaticSym::Empty, vec![], start)
        } else if let Some(kind) = decl_kind {
            let kw_span = self.bump().span;
            let decl = self.parse_var_decl_body(kind, kw_span)?;
            self.expect_punct(Punct::Semi, "';' after for initializer")?;
            decl
        } else {
            let expr = self.parse_expression()?;
            self.expect_punct(Punct::Semi, "';' after for initializer")?;
            expr
        };

        let test = if self.at_punct(Punct::Semi) {
            SExpr::list(StaticSym::Empty, vec![], self.span_here())
        } else {
            self.parse_expression()?
        };
        self.expect_punct(Punct::Semi, "';' after for condition")?;

        let update = if self.at_punct(Punct::RParen) {
            SExpr::list(StaticSym::Empty, vec![], self.span_here())
        } else {
            self.parse_expression()?
        };
        self.expect_punct(Punct::RParen, "')' after for head")?;

        let body = self.parse_statement()?;
        let span = start.cover(body.span());
        Ok(SExpr::list(StaticSym::For, vec![init, test, update, body], span))
    }

    fn parse_return(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        // Restricted production: a line break ends the statement.
        if self.peek().newline_before || self.at_punct(Punct::Semi) || self.at_punct(Punct::RBrace) || self.at_eof() {
            self.consume_semi()?;
            return Ok(SExpr::list(StaticSym::Return, vec![], start));
        }
        let value = self.parse_expression()?;
        let span = start.cover(value.span());
        self.consume_semi()?;
        Ok(SExpr::list(StaticSym::Return, vec![value], span))
    }

    fn parse_throw(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        if self.peek().newline_before {
            return Err(self.error("newline not allowed after 'throw'"));
        }
        let value = self.parse_expression()?;
        let span = start.cover(value.span());
        self.consume_semi()?;
        Ok(SExpr::list(StaticSym::Throw, vec![value], span))
    }

    fn parse_break_continue(&mut self, head: StaticSym) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        // Restricted production: label must be on the same line.
        let mut items = Vec::new();
        if !self.peek().newline_before
            && let Some(label) = self.at_ident()
        {
            let span = self.bump().span;
            items.push(SExpr::Sym(label, span));
        }
        self.consume_semi()?;
        Ok(SExpr::List {
            head: head.into(),
            items,
            span: start,
        })
    }

    fn parse_try(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        let block = self.parse_block()?;
        let mut end = block.span();

        let catch = if self.at_kw(Kw::Catch) {
            let catch_start = self.bump().span;
            let param = if self.eat_punct(Punct::LParen) {
                let (name, span) = self.expect_ident("catch parameter")?;
                self.expect_punct(Punct::RParen, "')' after catch parameter")?;
                SExpr::Sym(name, span)
            } else {
                SExpr::list(StaticSym::Empty, vec![], catch_start)
            };
            let body = self.parse_block()?;
            end = body.span();
            SExpr::list(StaticSym::Catch, vec![param, body], catch_start.cover(end))
        } else {
            SExpr::list(StaticSym::Empty, vec![], start)
        };

        let finally = if self.at_kw(Kw::Finally) {
            self.bump();
            let body = self.parse_block()?;
            end = body.span();
            body
        } else {
            SExpr::list(StaticSym::Empty, vec![], start)
        };

        if matches!(catch.head(), Some(StaticSym::Empty)) && matches!(finally.head(), Some(StaticSym::Empty)) {
            return Err(self.error("try requires catch or finally"));
        }

        Ok(SExpr::list(StaticSym::Try, vec![block, catch, finally], start.cover(end)))
    }

    fn parse_switch(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        self.expect_punct(Punct::LParen, "'(' after switch")?;
        let disc = self.parse_expression()?;
        self.expect_punct(Punct::RParen, "')' after switch discriminant")?;
        self.expect_punct(Punct::LBrace, "'{' to open switch body")?;

        let mut items = vec![disc];
        while !self.at_punct(Punct::RBrace) {
            if self.at_kw(Kw::Case) {
                let case_start = self.bump().span;
                let test = self.parse_expression()?;
                self.expect_punct(Punct::Colon, "':' after case value")?;
                let mut body = vec![test];
                while !self.at_kw(Kw::Case) && !self.at_kw(Kw::Default) && !self.at_punct(Punct::RBrace) {
                    body.push(self.parse_statement()?);
                }
                let span = body.last().map_or(case_start, |s| case_start.cover(s.span()));
                items.push(SExpr::list(StaticSym::Case, body, span));
            } else if self.at_kw(Kw::Default) {
                let case_start = self.bump().span;
                self.expect_punct(Punct::Colon, "':' after default")?;
                let mut body = Vec::new();
                while !self.at_kw(Kw::Case) && !self.at_kw(Kw::Default) && !self.at_punct(Punct::RBrace) {
                    body.push(self.parse_statement()?);
                }
                let span = body.last().map_or(case_start, |s| case_start.cover(s.span()));
                items.push(SExpr::list(StaticSym::Default, body, span));
            } else {
                return Err(self.error("expected 'case' or 'default' in switch body"));
            }
        }
        let end = self.bump().span;
        Ok(SExpr::list(StaticSym::Switch, items, start.cover(end)))
    }

    fn parse_class(&mut self, require_name: bool) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        let name = if let Some(sym) = self.at_ident() {
            let span = self.bump().span;
            SExpr::Sym(sym, span)
        } else if require_name {
            return Err(self.error("expected class name"));
        } else {
            SExpr::list(StaticSym::Empty, vec![], start)
        };

        let parent = if self.at_kw(Kw::Extends) {
            self.bump();
            let parent = self.parse_unary()?;
            SExpr::list(StaticSym::Extends, vec![parent], start)
        } else {
            SExpr::list(StaticSym::Empty, vec![], start)
        };

        self.expect_punct(Punct::LBrace, "'{' to open class body")?;
        let mut items = vec![name, parent];
        while !self.at_punct(Punct::RBrace) {
            if self.eat_punct(Punct::Semi) {
                continue;
            }
            items.push(self.parse_class_member()?);
        }
        let end = self.bump().span;
        Ok(SExpr::list(StaticSym::Class, items, start.cover(end)))
    }

    fn parse_class_member(&mut self) -> Result<SExpr, ParseError> {
        let start = self.span_here();
        let is_static = matches!(self.peek().kind, TokKind::Ident(s) if s.is(StaticSym::Static))
            && !matches!(self.peek_at(1).kind, TokKind::Punct(Punct::LParen));
        if is_static {
            self.bump();
        }

        let member = self.parse_method_like()?;
        if is_static {
            let span = start.cover(member.span());
            Ok(SExpr::list(StaticSym::Static, vec![member], span))
        } else {
            Ok(member)
        }
    }

    /// Parses `name() {}`, `get name() {}`, `set name(v) {}` forms shared by
    /// class bodies and object literals.
    fn parse_method_like(&mut self) -> Result<SExpr, ParseError> {
        let start = self.span_here();
        let accessor = match self.peek().kind {
            TokKind::Ident(s) if s.is(StaticSym::Get) && !matches!(self.peek_at(1).kind, TokKind::Punct(Punct::LParen)) => {
                Some(StaticSym::Getter)
            }
            TokKind::Ident(s) if s.is(StaticSym::Set) && !matches!(self.peek_at(1).kind, TokKind::Punct(Punct::LParen)) => {
                Some(StaticSym::Setter)
            }
            _ => None,
        };
        if accessor.is_some() {
            self.bump();
        }

        let key = self.parse_property_key()?;
        let func = self.parse_function_tail(FuncStyle::Method, start)?;
        let span = start.cover(func.span());
        let head = accessor.unwrap_or(StaticSym::Method);
        Ok(SExpr::List {
            head: head.into(),
            items: vec![key, func],
            span,
        })
    }

    fn parse_property_key(&mut self) -> Result<SExpr, ParseError> {
        let span = self.span_here();
        match self.peek().kind.clone() {
            TokKind::Ident(sym) => {
                self.bump();
                Ok(SExpr::Sym(sym, span))
            }
            TokKind::Keyword(kw) => {
                // Keywords are valid property names: `obj.catch`, `{ default: 1 }`.
                self.bump();
                let name = keyword_text(kw);
                Ok(SExpr::Sym(self.interner.intern(name), span))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(SExpr::Str(s, span))
            }
            TokKind::Num(n) => {
                self.bump();
                Ok(SExpr::Num(n, span))
            }
            TokKind::Punct(Punct::LBracket) => {
                self.bump();
                let expr = self.parse_assignment()?;
                let end = self.expect_punct(Punct::RBracket, "']' after computed key")?;
                Ok(SExpr::list(StaticSym::Computed, vec![expr], span.cover(end)))
            }
            _ => Err(self.error("expected property name")),
        }
    }

    // ==========================
    // Functions

    fn parse_function_tail(&mut self, style: FuncStyle, start: CodeRange) -> Result<SExpr, ParseError> {
        let is_generator = matches!(style, FuncStyle::Declaration | FuncStyle::Expression) && self.eat_punct(Punct::Star);

        let name = if matches!(style, FuncStyle::Method) {
            SExpr::list(StaticSym::Empty, vec![], start)
        } else if let Some(sym) = self.at_ident() {
            let span = self.bump().span;
            SExpr::Sym(sym, span)
        } else if matches!(style, FuncStyle::Declaration | FuncStyle::AsyncDeclaration) {
            return Err(self.error("expected function name"));
        } else {
            SExpr::list(StaticSym::Empty, vec![], start)
        };

        let params = self.parse_params()?;
        let body = self.parse_block()?;
        let span = start.cover(body.span());

        let head = match style {
            _ if is_generator => StaticSym::Generator,
            FuncStyle::AsyncDeclaration | FuncStyle::AsyncExpression => StaticSym::Async,
            _ => StaticSym::Function,
        };
        Ok(SExpr::List {
            head: head.into(),
            items: vec![name, params, body],
            span,
        })
    }

    fn parse_params(&mut self) -> Result<SExpr, ParseError> {
        let start = self.expect_punct(Punct::LParen, "'(' to open parameter list")?;
        let mut params = Vec::new();
        while !self.at_punct(Punct::RParen) {
            if self.eat_punct(Punct::DotDotDot) {
                let (name, span) = self.expect_ident("rest parameter name")?;
                params.push(SExpr::list(StaticSym::Rest, vec![SExpr::Sym(name, span)], span));
                break;
            }
            let (name, span) = self.expect_ident("parameter name")?;
            params.push(SExpr::Sym(name, span));
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.expect_punct(Punct::RParen, "')' to close parameter list")?;
        Ok(SExpr::list(StaticSym::ArrayLiteral, params, start.cover(end)))
    }

    // ==========================
    // Expressions

    fn parse_expression(&mut self) -> Result<SExpr, ParseError> {
        let first = self.parse_assignment()?;
        if !self.at_punct(Punct::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(Punct::Comma) {
            items.push(self.parse_assignment()?);
        }
        let span = items[0].span().cover(items.last().expect("sequence items").span());
        Ok(SExpr::list(StaticSym::Sequence, items, span))
    }

    fn parse_assignment(&mut self) -> Result<SExpr, ParseError> {
        self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave();
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<SExpr, ParseError> {
        // Arrow function lookahead: `x => ..` or `(a, b) => ..`.
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        if self.at_kw(Kw::Yield) {
            return self.parse_yield();
        }

        let target = self.parse_conditional()?;

        let op = match self.peek().kind {
            TokKind::Punct(Punct::Eq) => None,
            TokKind::Punct(Punct::PlusEq) => Some(StaticSym::OpAdd),
            TokKind::Punct(Punct::MinusEq) => Some(StaticSym::OpSub),
            TokKind::Punct(Punct::StarEq) => Some(StaticSym::OpMul),
            TokKind::Punct(Punct::SlashEq) => Some(StaticSym::OpDiv),
            TokKind::Punct(Punct::PercentEq) => Some(StaticSym::OpMod),
            TokKind::Punct(Punct::StarStarEq) => Some(StaticSym::OpPow),
            TokKind::Punct(Punct::AmpEq) => Some(StaticSym::OpBitAnd),
            TokKind::Punct(Punct::PipeEq) => Some(StaticSym::OpBitOr),
            TokKind::Punct(Punct::CaretEq) => Some(StaticSym::OpBitXor),
            TokKind::Punct(Punct::ShlEq) => Some(StaticSym::OpShl),
            TokKind::Punct(Punct::ShrEq) => Some(StaticSym::OpShr),
            TokKind::Punct(Punct::UShrEq) => Some(StaticSym::OpUShr),
            TokKind::Punct(Punct::AndAndEq) => Some(StaticSym::OpAnd),
            TokKind::Punct(Punct::OrOrEq) => Some(StaticSym::OpOr),
            TokKind::Punct(Punct::QuestionQuestionEq) => Some(StaticSym::OpNullish),
            _ => return Ok(target),
        };
        self.bump();
        let value = self.parse_assignment()?;
        let span = target.span().cover(value.span());

        match op {
            None => self.make_assignment(target, value, span),
            Some(op_sym) => Ok(SExpr::list(
                StaticSym::OpAssign,
                vec![SExpr::Sym(op_sym.into(), span), target, value],
                span,
            )),
        }
    }

    /// Lowers `target = value` onto the assignment heads: identifier targets
    /// use `Assign`, member targets use `SetProperty`/`SetIndex`.
    fn make_assignment(&mut self, target: SExpr, value: SExpr, span: CodeRange) -> Result<SExpr, ParseError> {
        match &target {
            SExpr::Sym(..) => Ok(SExpr::list(StaticSym::Assign, vec![target, value], span)),
            SExpr::List { head, items, .. } if head.is(StaticSym::GetProperty) && items.len() == 2 => {
                let mut items = items.clone();
                items.push(value);
                Ok(SExpr::list(StaticSym::SetProperty, items, span))
            }
            SExpr::List { head, items, .. } if head.is(StaticSym::GetIndex) && items.len() == 2 => {
                let mut items = items.clone();
                items.push(value);
                Ok(SExpr::list(StaticSym::SetIndex, items, span))
            }
            _ => Err(ParseError::new("invalid assignment target", span.start)),
        }
    }

    fn parse_yield(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        if self.eat_punct(Punct::Star) {
            let value = self.parse_assignment()?;
            let span = start.cover(value.span());
            return Ok(SExpr::list(StaticSym::YieldStar, vec![value], span));
        }
        // Bare yield: the operand is optional and never crosses a line break.
        if self.peek().newline_before
            || self.at_punct(Punct::Semi)
            || self.at_punct(Punct::RParen)
            || self.at_punct(Punct::RBrace)
            || self.at_punct(Punct::RBracket)
            || self.at_punct(Punct::Comma)
            || self.at_eof()
        {
            return Ok(SExpr::list(StaticSym::Yield, vec![], start));
        }
        let value = self.parse_assignment()?;
        let span = start.cover(value.span());
        Ok(SExpr::list(StaticSym::Yield, vec![value], span))
    }

    /// Detects and parses an arrow function at the cursor. Returns `None`
    /// when the cursor is not at an arrow head.
    fn try_parse_arrow(&mut self) -> Result<Option<SExpr>, ParseError> {
        let start = self.span_here();
        // Single identifier arrow: `x => ..`
        if let TokKind::Ident(sym) = self.peek().kind
            && matches!(self.peek_at(1).kind, TokKind::Punct(Punct::Arrow))
            && !self.peek_at(1).newline_before
        {
            let name_span = self.bump().span;
            self.bump();
            let params = SExpr::list(StaticSym::ArrayLiteral, vec![SExpr::Sym(sym, name_span)], name_span);
            return Ok(Some(self.parse_arrow_body(params, start)?));
        }

        // Parenthesized parameter list: scan to the matching `)` and check
        // for `=>`.
        if self.at_punct(Punct::LParen) && self.paren_starts_arrow() {
            let params = self.parse_params()?;
            if !self.at_punct(Punct::Arrow) {
                return Err(self.error("expected '=>' after arrow parameters"));
            }
            self.bump();
            return Ok(Some(self.parse_arrow_body(params, start)?));
        }
        Ok(None)
    }

    fn paren_starts_arrow(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
            let token = self.peek_at(offset);
            match token.kind {
                TokKind::Punct(Punct::LParen) => depth += 1,
                TokKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_at(offset + 1).kind, TokKind::Punct(Punct::Arrow));
                    }
                }
                TokKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn parse_arrow_body(&mut self, params: SExpr, start: CodeRange) -> Result<SExpr, ParseError> {
        let body = if self.at_punct(Punct::LBrace) {
            self.parse_block()?
        } else {
            self.parse_assignment()?
        };
        let span = start.cover(body.span());
        Ok(SExpr::list(StaticSym::Lambda, vec![params, body], span))
    }

    fn parse_conditional(&mut self) -> Result<SExpr, ParseError> {
        let test = self.parse_nullish()?;
        if !self.at_punct(Punct::Question) {
            return Ok(test);
        }
        self.bump();
        let cons = self.parse_assignment()?;
        self.expect_punct(Punct::Colon, "':' in conditional expression")?;
        let alt = self.parse_assignment()?;
        let span = test.span().cover(alt.span());
        Ok(SExpr::list(StaticSym::Conditional, vec![test, cons, alt], span))
    }

    fn parse_nullish(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_logical_or()?;
        while self.at_punct(Punct::QuestionQuestion) {
            self.bump();
            let right = self.parse_logical_or()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpNullish, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.at_punct(Punct::OrOr) {
            self.bump();
            let right = self.parse_logical_and()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpOr, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_bitor()?;
        while self.at_punct(Punct::AndAnd) {
            self.bump();
            let right = self.parse_bitor()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpAnd, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_bitxor()?;
        while self.at_punct(Punct::Pipe) {
            self.bump();
            let right = self.parse_bitxor()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpBitOr, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_bitand()?;
        while self.at_punct(Punct::Caret) {
            self.bump();
            let right = self.parse_bitand()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpBitXor, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.at_punct(Punct::Amp) {
            self.bump();
            let right = self.parse_equality()?;
            let span = left.span().cover(right.span());
            left = SExpr::list(StaticSym::OpBitAnd, vec![left, right], span);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Punct(Punct::EqEq) => StaticSym::OpEq,
                TokKind::Punct(Punct::NotEq) => StaticSym::OpNe,
                TokKind::Punct(Punct::EqEqEq) => StaticSym::OpStrictEq,
                TokKind::Punct(Punct::NotEqEq) => StaticSym::OpStrictNe,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_relational()?;
            let span = left.span().cover(right.span());
            left = SExpr::List {
                head: op.into(),
                items: vec![left, right],
                span,
            };
        }
    }

    fn parse_relational(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_shift()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Punct(Punct::Lt) => StaticSym::OpLt,
                TokKind::Punct(Punct::Le) => StaticSym::OpLe,
                TokKind::Punct(Punct::Gt) => StaticSym::OpGt,
                TokKind::Punct(Punct::Ge) => StaticSym::OpGe,
                TokKind::Keyword(Kw::In) => StaticSym::OpIn,
                TokKind::Keyword(Kw::InstanceOf) => StaticSym::OpInstanceOf,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_shift()?;
            let span = left.span().cover(right.span());
            left = SExpr::List {
                head: op.into(),
                items: vec![left, right],
                span,
            };
        }
    }

    fn parse_shift(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Punct(Punct::Shl) => StaticSym::OpShl,
                TokKind::Punct(Punct::Shr) => StaticSym::OpShr,
                TokKind::Punct(Punct::UShr) => StaticSym::OpUShr,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_additive()?;
            let span = left.span().cover(right.span());
            left = SExpr::List {
                head: op.into(),
                items: vec![left, right],
                span,
            };
        }
    }

    fn parse_additive(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Punct(Punct::Plus) => StaticSym::OpAdd,
                TokKind::Punct(Punct::Minus) => StaticSym::OpSub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            let span = left.span().cover(right.span());
            left = SExpr::List {
                head: op.into(),
                items: vec![left, right],
                span,
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<SExpr, ParseError> {
        let mut left = self.parse_exponent()?;
        loop {
            let op = match self.peek().kind {
                TokKind::Punct(Punct::Star) => StaticSym::OpMul,
                TokKind::Punct(Punct::Slash) => StaticSym::OpDiv,
                TokKind::Punct(Punct::Percent) => StaticSym::OpMod,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.parse_exponent()?;
            let span = left.span().cover(right.span());
            left = SExpr::List {
                head: op.into(),
                items: vec![left, right],
                span,
            };
        }
    }

    fn parse_exponent(&mut self) -> Result<SExpr, ParseError> {
        let base = self.parse_unary()?;
        if self.at_punct(Punct::StarStar) {
            self.bump();
            // Right-associative.
            let exp = self.parse_exponent()?;
            let span = base.span().cover(exp.span());
            return Ok(SExpr::list(StaticSym::OpPow, vec![base, exp], span));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<SExpr, ParseError> {
        self.enter()?;
        let result = self.parse_unary_inner();
        self.leave();
        result
    }

    fn parse_unary_inner(&mut self) -> Result<SExpr, ParseError> {
        let start = self.span_here();
        let head = match self.peek().kind {
            TokKind::Punct(Punct::Bang) => Some(StaticSym::Not),
            TokKind::Punct(Punct::Minus) => Some(StaticSym::Neg),
            TokKind::Punct(Punct::Plus) => Some(StaticSym::Pos),
            TokKind::Punct(Punct::Tilde) => Some(StaticSym::BitNot),
            TokKind::Keyword(Kw::TypeOf) => Some(StaticSym::TypeOf),
            TokKind::Keyword(Kw::Void) => Some(StaticSym::Void),
            TokKind::Keyword(Kw::Delete) => Some(StaticSym::Delete),
            TokKind::Keyword(Kw::Await) => Some(StaticSym::Await),
            TokKind::Punct(Punct::PlusPlus) => Some(StaticSym::PreInc),
            TokKind::Punct(Punct::MinusMinus) => Some(StaticSym::PreDec),
            _ => None,
        };
        if let Some(head) = head {
            self.bump();
            let operand = self.parse_unary()?;
            let span = start.cover(operand.span());
            return Ok(SExpr::List {
                head: head.into(),
                items: vec![operand],
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<SExpr, ParseError> {
        let mut expr = if self.at_kw(Kw::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        let mut has_optional = false;

        loop {
            match self.peek().kind {
                TokKind::Punct(Punct::Dot) => {
                    self.bump();
                    let key = self.parse_member_name()?;
                    let span = expr.span().cover(key.span());
                    expr = SExpr::list(StaticSym::GetProperty, vec![expr, key], span);
                }
                TokKind::Punct(Punct::QuestionDot) => {
                    self.bump();
                    has_optional = true;
                    if self.at_punct(Punct::LBracket) {
                        self.bump();
                        let index = self.parse_expression()?;
                        let end = self.expect_punct(Punct::RBracket, "']' after index")?;
                        let span = expr.span().cover(end);
                        expr = SExpr::list(StaticSym::GetIndexOpt, vec![expr, index], span);
                    } else if self.at_punct(Punct::LParen) {
                        let (args, end) = self.parse_args()?;
                        let span = expr.span().cover(end);
                        let mut items = vec![expr];
                        items.extend(args);
                        expr = SExpr::list(StaticSym::CallOpt, items, span);
                    } else {
                        let key = self.parse_member_name()?;
                        let span = expr.span().cover(key.span());
                        expr = SExpr::list(StaticSym::GetPropertyOpt, vec![expr, key], span);
                    }
                }
                TokKind::Punct(Punct::LBracket) => {
                    self.bump();
                    let index = self.parse_expression()?;
                    let end = self.expect_punct(Punct::RBracket, "']' after index")?;
                    let span = expr.span().cover(end);
                    expr = SExpr::list(StaticSym::GetIndex, vec![expr, index], span);
                }
                TokKind::Punct(Punct::LParen) => {
                    let (args, end) = self.parse_args()?;
                    let span = expr.span().cover(end);
                    let mut items = vec![expr];
                    items.extend(args);
                    expr = SExpr::list(StaticSym::Call, items, span);
                }
                TokKind::Punct(Punct::PlusPlus) if !self.peek().newline_before => {
                    let end = self.bump().span;
                    let span = expr.span().cover(end);
                    expr = SExpr::list(StaticSym::PostInc, vec![expr], span);
                }
                TokKind::Punct(Punct::MinusMinus) if !self.peek().newline_before => {
                    let end = self.bump().span;
                    let span = expr.span().cover(end);
                    expr = SExpr::list(StaticSym::PostDec, vec![expr], span);
                }
                _ => break,
            }
        }

        if has_optional {
            let span = expr.span();
            expr = SExpr::list(StaticSym::OptionalChain, vec![expr], span);
        }
        Ok(expr)
    }

    fn parse_member_name(&mut self) -> Result<SExpr, ParseError> {
        let span = self.span_here();
        match self.peek().kind.clone() {
            TokKind::Ident(sym) => {
                self.bump();
                Ok(SExpr::Sym(sym, span))
            }
            TokKind::Keyword(kw) => {
                self.bump();
                Ok(SExpr::Sym(self.interner.intern(keyword_text(kw)), span))
            }
            _ => Err(self.error("expected property name after '.'")),
        }
    }

    fn parse_new(&mut self) -> Result<SExpr, ParseError> {
        let start = self.bump().span;
        // `new` binds to the member expression, not to call results.
        let mut callee = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokKind::Punct(Punct::Dot) => {
                    self.bump();
                    let key = self.parse_member_name()?;
                    let span = callee.span().cover(key.span());
                    callee = SExpr::list(StaticSym::GetProperty, vec![callee, key], span);
                }
                TokKind::Punct(Punct::LBracket) => {
                    self.bump();
                    let index = self.parse_expression()?;
                    let end = self.expect_punct(Punct::RBracket, "']' after index")?;
                    let span = callee.span().cover(end);
                    callee = SExpr::list(StaticSym::GetIndex, vec![callee, index], span);
                }
                _ => break,
            }
        }
        let (args, end) = if self.at_punct(Punct::LParen) {
            self.parse_args()?
        } else {
            (vec![], callee.span())
        };
        let span = start.cover(end);
        let mut items = vec![callee];
        items.extend(args);
        Ok(SExpr::list(StaticSym::New, items, span))
    }

    /// Parses a parenthesized argument list, allowing spreads and a trailing
    /// comma.
    fn parse_args(&mut self) -> Result<(Vec<SExpr>, CodeRange), ParseError> {
        self.expect_punct(Punct::LParen, "'(' to open arguments")?;
        let mut args = Vec::new();
        while !self.at_punct(Punct::RParen) {
            if self.eat_punct(Punct::DotDotDot) {
                let value = self.parse_assignment()?;
                let span = value.span();
                args.push(SExpr::list(StaticSym::Spread, vec![value], span));
            } else {
                args.push(self.parse_assignment()?);
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.expect_punct(Punct::RParen, "')' to close arguments")?;
        Ok((args, end))
    }

    fn parse_primary(&mut self) -> Result<SExpr, ParseError> {
        let span = self.span_here();
        match self.peek().kind.clone() {
            TokKind::Num(n) => {
                self.bump();
                Ok(SExpr::Num(n, span))
            }
            TokKind::BigInt(b) => {
                self.bump();
                Ok(SExpr::BigInt(Rc::new(*b), span))
            }
            TokKind::Str(s) => {
                self.bump();
                Ok(SExpr::Str(s, span))
            }
            TokKind::Regex { pattern, flags } => {
                self.bump();
                Ok(SExpr::Regex { pattern, flags, span })
            }
            TokKind::Template(parts) => {
                self.bump();
                self.parse_template(parts, span)
            }
            TokKind::Keyword(Kw::True) => {
                self.bump();
                Ok(SExpr::Bool(true, span))
            }
            TokKind::Keyword(Kw::False) => {
                self.bump();
                Ok(SExpr::Bool(false, span))
            }
            TokKind::Keyword(Kw::Null) => {
                self.bump();
                Ok(SExpr::Null(span))
            }
            TokKind::Keyword(Kw::Undefined) => {
                self.bump();
                Ok(SExpr::Undefined(span))
            }
            TokKind::Keyword(Kw::This) => {
                self.bump();
                Ok(SExpr::list(StaticSym::This, vec![], span))
            }
            TokKind::Keyword(Kw::Super) => {
                self.bump();
                Ok(SExpr::list(StaticSym::Super, vec![], span))
            }
            TokKind::Keyword(Kw::Function) => {
                self.bump();
                self.parse_function_tail(FuncStyle::Expression, span)
            }
            TokKind::Keyword(Kw::Class) => self.parse_class(false),
            TokKind::Ident(sym) => {
                if sym.is(StaticSym::Async) && matches!(self.peek_at(1).kind, TokKind::Keyword(Kw::Function)) {
                    self.bump();
                    self.bump();
                    return self.parse_function_tail(FuncStyle::AsyncExpression, span);
                }
                self.bump();
                Ok(SExpr::Sym(sym, span))
            }
            TokKind::Punct(Punct::LParen) => {
                self.bump();
                let expr = self.parse_expression()?;
                self.expect_punct(Punct::RParen, "')'")?;
                Ok(expr)
            }
            TokKind::Punct(Punct::LBracket) => self.parse_array_literal(),
            TokKind::Punct(Punct::LBrace) => self.parse_object_literal(),
            _ => Err(self.error("unexpected token in expression")),
        }
    }

    fn parse_template(&mut self, parts: Vec<TplPart>, span: CodeRange) -> Result<SExpr, ParseError> {
        let mut items = Vec::new();
        for part in parts {
            match part {
                TplPart::Chunk(chunk) => items.push(SExpr::Str(chunk, span)),
                TplPart::Expr(tokens) => {
                    let mut sub = Parser::new(tokens, self.interner);
                    let expr = sub.parse_expression()?;
                    if !sub.at_eof() {
                        return Err(sub.error("unexpected token in template interpolation"));
                    }
                    items.push(expr);
                }
            }
        }
        Ok(SExpr::list(StaticSym::Template, items, span))
    }

    fn parse_array_literal(&mut self) -> Result<SExpr, ParseError> {
        let start = self.expect_punct(Punct::LBracket, "'['")?;
        let mut items = Vec::new();
        while !self.at_punct(Punct::RBracket) {
            if self.at_punct(Punct::Comma) {
                // Elision produces a hole.
                let span = self.bump().span;
                items.push(SExpr::list(StaticSym::Hole, vec![], span));
                continue;
            }
            if self.eat_punct(Punct::DotDotDot) {
                let value = self.parse_assignment()?;
                let span = value.span();
                items.push(SExpr::list(StaticSym::Spread, vec![value], span));
            } else {
                items.push(self.parse_assignment()?);
            }
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.expect_punct(Punct::RBracket, "']' to close array literal")?;
        Ok(SExpr::list(StaticSym::ArrayLiteral, items, start.cover(end)))
    }

    fn parse_object_literal(&mut self) -> Result<SExpr, ParseError> {
        let start = self.expect_punct(Punct::LBrace, "'{'")?;
        let mut props = Vec::new();
        while !self.at_punct(Punct::RBrace) {
            props.push(self.parse_object_member()?);
            if !self.eat_punct(Punct::Comma) {
                break;
            }
        }
        let end = self.expect_punct(Punct::RBrace, "'}' to close object literal")?;
        Ok(SExpr::list(StaticSym::ObjectLiteral, props, start.cover(end)))
    }

    fn parse_object_member(&mut self) -> Result<SExpr, ParseError> {
        let start = self.span_here();

        // Accessor or method shorthand.
        let next_is_key = |kind: &TokKind| {
            matches!(
                kind,
                TokKind::Ident(_) | TokKind::Keyword(_) | TokKind::Str(_) | TokKind::Num(_) | TokKind::Punct(Punct::LBracket)
            )
        };
        match self.peek().kind {
            TokKind::Ident(s)
                if (s.is(StaticSym::Get) || s.is(StaticSym::Set)) && next_is_key(&self.peek_at(1).kind) =>
            {
                return self.parse_method_like();
            }
            _ => {}
        }

        let key = self.parse_property_key()?;

        if self.at_punct(Punct::LParen) {
            // Method shorthand: `{ m() { .. } }`
            let func = self.parse_function_tail(FuncStyle::Method, start)?;
            let span = start.cover(func.span());
            return Ok(SExpr::list(StaticSym::Method, vec![key, func], span));
        }

        if self.at_punct(Punct::Colon) {
            self.bump();
            let value = self.parse_assignment()?;
            let span = start.cover(value.span());
            return Ok(SExpr::list(StaticSym::Property, vec![key, value], span));
        }

        // Shorthand `{ a }` - the key doubles as an identifier reference.
        if let SExpr::Sym(sym, key_span) = key {
            let value = SExpr::Sym(sym, key_span);
            return Ok(SExpr::list(StaticSym::Property, vec![SExpr::Sym(sym, key_span), value], key_span));
        }
        Err(self.error("expected ':' after property key"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuncStyle {
    Declaration,
    Expression,
    AsyncDeclaration,
    AsyncExpression,
    Method,
}

/// The source spelling of a reserved word used as a property name.
fn keyword_text(kw: Kw) -> &'static str {
    match kw {
        Kw::Let => "let",
        Kw::Const => "const",
        Kw::Var => "var",
        Kw::If => "if",
        Kw::Else => "else",
        Kw::While => "while",
        Kw::Do => "do",
        Kw::For => "for",
        Kw::Function => "function",
        Kw::Return => "return",
        Kw::New => "new",
        Kw::Class => "class",
        Kw::Extends => "extends",
        Kw::Super => "super",
        Kw::This => "this",
        Kw::Try => "try",
        Kw::Catch => "catch",
        Kw::Finally => "finally",
        Kw::Throw => "throw",
        Kw::Switch => "switch",
        Kw::Case => "case",
        Kw::Default => "default",
        Kw::Break => "break",
        Kw::Continue => "continue",
        Kw::Yield => "yield",
        Kw::Await => "await",
        Kw::TypeOf => "typeof",
        Kw::Delete => "delete",
        Kw::Void => "void",
        Kw::InstanceOf => "instanceof",
        Kw::In => "in",
        Kw::Null => "null",
        Kw::True => "true",
        Kw::False => "false",
        Kw::Undefined => "undefined",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(source: &str) -> String {
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        tree.snapshot(&interner)
    }

    #[test]
    fn parses_let_with_multiple_declarators() {
        assert_eq!(
            snapshot("let a = 1, b;"),
            "(Program (Let (Assign a 1) (Assign b (Uninitialized))))"
        );
    }

    #[test]
    fn asi_inserts_statement_boundaries() {
        let mut interner = Interner::new();
        let implicit = parse("let a = 1\nlet b = 2", &mut interner).unwrap();
        let explicit = parse("let a = 1; let b = 2;", &mut interner).unwrap();
        assert!(implicit.structural_eq(&explicit));
    }

    #[test]
    fn asi_return_is_a_restricted_production() {
        let mut interner = Interner::new();
        let tree = parse("function f() { return\n1; }", &mut interner).unwrap();
        let expected = parse("function f() { return; 1; }", &mut interner).unwrap();
        assert!(tree.structural_eq(&expected));
    }

    #[test]
    fn parses_arrow_functions() {
        assert_eq!(
            snapshot("let f = x => x + 1;"),
            "(Program (Let (Assign f (Lambda (ArrayLiteral x) (+ x 1)))))"
        );
        assert_eq!(
            snapshot("let g = (a, b) => { return a; };"),
            "(Program (Let (Assign g (Lambda (ArrayLiteral a b) (Block (Return a))))))"
        );
    }

    #[test]
    fn parses_optional_chaining_and_nullish() {
        assert_eq!(
            snapshot("a?.b ?? c;"),
            "(Program (?? (OptionalChain (GetPropertyOpt a b)) c))"
        );
    }

    #[test]
    fn parses_labeled_break() {
        assert_eq!(
            snapshot("outer: while (true) { break outer; }"),
            "(Program (Label outer (While true (Block (Break outer)))))"
        );
    }

    #[test]
    fn parses_generator_and_async_functions() {
        assert_eq!(
            snapshot("function* g() { yield 1; }"),
            "(Program (Generator g (ArrayLiteral) (Block (Yield 1))))"
        );
        assert_eq!(
            snapshot("async function f() { return await p; }"),
            "(Program (Async f (ArrayLiteral) (Block (Return (Await p)))))"
        );
    }

    #[test]
    fn parses_for_await_of() {
        assert_eq!(
            snapshot("async function f(it) { for await (const x of it) { use(x); } }"),
            "(Program (Async f (ArrayLiteral it) (Block (ForAwaitOf Const x it (Block (Call use x))))))"
        );
    }

    #[test]
    fn parses_class_with_inheritance() {
        assert_eq!(
            snapshot("class B extends A { constructor() { super(); } get x() { return 1; } }"),
            "(Program (Class B (Extends A) \
             (Method constructor (Function (Empty) (ArrayLiteral) (Block (Call (Super))))) \
             (Getter x (Function (Empty) (ArrayLiteral) (Block (Return 1))))))"
        );
    }

    #[test]
    fn parse_error_carries_position() {
        let mut interner = Interner::new();
        let err = parse("let = 5;", &mut interner).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("variable name"));
    }

    #[test]
    fn template_literals_interpolate() {
        assert_eq!(
            snapshot("`a${x}b`;"),
            "(Program (Template \"a\" x \"b\"))"
        );
    }

    #[test]
    fn trailing_commas_allowed() {
        assert_eq!(snapshot("f(1, 2,);"), "(Program (Call f 1 2))");
        assert_eq!(snapshot("[1, 2,];"), "(Program (ArrayLiteral 1 2))");
        assert_eq!(snapshot("({a: 1,});"), "(Program (ObjectLiteral (Property a 1)))");
    }
}
