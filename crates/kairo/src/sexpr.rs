//! The symbolic list form produced by the parser.
//!
//! Early passes (constant folding) work on this representation: a recursively
//! nested `(head arg .. arg)` structure whose head is a reserved symbol. The
//! typed AST is built from it afterwards. Every node carries its source span,
//! and spans survive folding untouched.

use std::rc::Rc;

use num_bigint::BigInt;

use crate::{
    intern::{Interner, StaticSym, Symbol},
    lexer::CodeRange,
};

#[derive(Debug, Clone)]
pub(crate) enum SExpr {
    /// An identifier reference (or a bare symbol argument inside a form).
    Sym(Symbol, CodeRange),
    Num(f64, CodeRange),
    BigInt(Rc<BigInt>, CodeRange),
    Str(Rc<str>, CodeRange),
    Bool(bool, CodeRange),
    Null(CodeRange),
    Undefined(CodeRange),
    Regex {
        pattern: Rc<str>,
        flags: Rc<str>,
        span: CodeRange,
    },
    /// A `(head item ..)` form. The head is always a reserved symbol.
    List {
        head: Symbol,
        items: Vec<SExpr>,
        span: CodeRange,
    },
}

impl SExpr {
    pub fn list(head: StaticSym, items: Vec<SExpr>, span: CodeRange) -> Self {
        Self::List {
            head: head.into(),
            items,
            span,
        }
    }

    pub fn span(&self) -> CodeRange {
        match self {
            Self::Sym(_, span)
            | Self::Num(_, span)
            | Self::BigInt(_, span)
            | Self::Str(_, span)
            | Self::Bool(_, span)
            | Self::Null(span)
            | Self::Undefined(span)
            | Self::Regex { span, .. }
            | Self::List { span, .. } => *span,
        }
    }

    /// The reserved head symbol, when this node is a list form.
    pub fn head(&self) -> Option<StaticSym> {
        match self {
            Self::List { head, .. } => head.as_static(),
            _ => None,
        }
    }

    /// Whether this node is a literal atom (foldable leaf).
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Self::Num(..) | Self::BigInt(..) | Self::Str(..) | Self::Bool(..) | Self::Null(_) | Self::Undefined(_)
        )
    }

    /// Structural equality ignoring source spans.
    ///
    /// Used by the ASI-equivalence and folding tests, where two parses of
    /// semantically identical programs differ only in positions.
    pub fn structural_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Sym(a, _), Self::Sym(b, _)) => a == b,
            (Self::Num(a, _), Self::Num(b, _)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::BigInt(a, _), Self::BigInt(b, _)) => a == b,
            (Self::Str(a, _), Self::Str(b, _)) => a == b,
            (Self::Bool(a, _), Self::Bool(b, _)) => a == b,
            (Self::Null(_), Self::Null(_)) | (Self::Undefined(_), Self::Undefined(_)) => true,
            (
                Self::Regex { pattern: p1, flags: f1, .. },
                Self::Regex { pattern: p2, flags: f2, .. },
            ) => p1 == p2 && f1 == f2,
            (
                Self::List { head: h1, items: i1, .. },
                Self::List { head: h2, items: i2, .. },
            ) => h1 == h2 && i1.len() == i2.len() && i1.iter().zip(i2).all(|(a, b)| a.structural_eq(b)),
            _ => false,
        }
    }

    /// Renders a stable textual snapshot of the tree, used by transformation
    /// tests. Spans are omitted so snapshots are insensitive to formatting.
    pub fn snapshot(&self, interner: &Interner) -> String {
        let mut out = String::new();
        self.write_snapshot(interner, &mut out);
        out
    }

    fn write_snapshot(&self, interner: &Interner, out: &mut String) {
        match self {
            Self::Sym(sym, _) => out.push_str(interner.resolve(*sym)),
            Self::Num(n, _) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    out.push_str(&format!("{}", *n as i64));
                } else {
                    out.push_str(ryu::Buffer::new().format(*n));
                }
            }
            Self::BigInt(b, _) => {
                out.push_str(&b.to_string());
                out.push('n');
            }
            Self::Str(s, _) => {
                out.push('"');
                out.push_str(s);
                out.push('"');
            }
            Self::Bool(b, _) => out.push_str(if *b { "true" } else { "false" }),
            Self::Null(_) => out.push_str("null"),
            Self::Undefined(_) => out.push_str("undefined"),
            Self::Regex { pattern, flags, .. } => {
                out.push('/');
                out.push_str(pattern);
                out.push('/');
                out.push_str(flags);
            }
            Self::List { head, items, .. } => {
                out.push('(');
                out.push_str(interner.resolve(*head));
                for item in items {
                    out.push(' ');
                    item.write_snapshot(interner, out);
                }
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_renders_nested_forms() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let span = CodeRange::default();
        let tree = SExpr::list(
            StaticSym::Let,
            vec![SExpr::Sym(x, span), SExpr::Num(5.0, span)],
            span,
        );
        assert_eq!(tree.snapshot(&interner), "(Let x 5)");
    }

    #[test]
    fn structural_eq_ignores_spans() {
        let span_a = CodeRange::default();
        let span_b = CodeRange {
            start: crate::lexer::CodeLoc { line: 9, column: 9 },
            end: crate::lexer::CodeLoc { line: 9, column: 12 },
        };
        let a = SExpr::Num(1.0, span_a);
        let b = SExpr::Num(1.0, span_b);
        assert!(a.structural_eq(&b));
    }
}
