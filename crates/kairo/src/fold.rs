//! Constant folding over the symbolic list form.
//!
//! Folds expressions whose operands are literals and whose operator is pure:
//! arithmetic, logical, string concatenation, comparisons between literals,
//! and `typeof` of a literal. Folding never crosses an observable side effect
//! (operands must themselves have folded to literals first) and the folded
//! node keeps the span of the expression it replaces.
//!
//! BigInt operations that raise at runtime (division by zero, mixed
//! BigInt/Number arithmetic) are deliberately left unfolded so the evaluator
//! reports them with its usual errors.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    intern::StaticSym,
    sexpr::SExpr,
    value::number_to_string,
};

/// Folds a whole program tree, bottom-up.
pub(crate) fn fold(tree: SExpr) -> SExpr {
    match tree {
        SExpr::List { head, items, span } => {
            let items: Vec<SExpr> = items.into_iter().map(fold).collect();
            let folded = SExpr::List { head, items, span };
            try_fold_node(folded)
        }
        leaf => leaf,
    }
}

fn try_fold_node(node: SExpr) -> SExpr {
    let SExpr::List { head, items, span } = &node else {
        return node;
    };
    let Some(sym) = head.as_static() else {
        return node;
    };
    let span = *span;

    match sym {
        StaticSym::OpAdd
        | StaticSym::OpSub
        | StaticSym::OpMul
        | StaticSym::OpDiv
        | StaticSym::OpMod
        | StaticSym::OpPow
        | StaticSym::OpEq
        | StaticSym::OpNe
        | StaticSym::OpStrictEq
        | StaticSym::OpStrictNe
        | StaticSym::OpLt
        | StaticSym::OpLe
        | StaticSym::OpGt
        | StaticSym::OpGe => {
            if items.len() == 2 && items[0].is_literal() && items[1].is_literal() {
                fold_binary(sym, &items[0], &items[1], span).unwrap_or(node)
            } else {
                node
            }
        }
        StaticSym::OpAnd | StaticSym::OpOr | StaticSym::OpNullish => {
            if items.len() == 2 && items[0].is_literal() {
                fold_logical(sym, &items[0], &items[1], span)
            } else {
                node
            }
        }
        StaticSym::Not | StaticSym::Neg | StaticSym::Pos | StaticSym::BitNot | StaticSym::TypeOf => {
            if items.len() == 1 && items[0].is_literal() {
                fold_unary(sym, &items[0], span).unwrap_or(node)
            } else {
                node
            }
        }
        _ => node,
    }
}

fn literal_truthy(lit: &SExpr) -> bool {
    match lit {
        SExpr::Num(n, _) => *n != 0.0 && !n.is_nan(),
        SExpr::BigInt(b, _) => !b.is_zero(),
        SExpr::Str(s, _) => !s.is_empty(),
        SExpr::Bool(b, _) => *b,
        SExpr::Null(_) | SExpr::Undefined(_) => false,
        _ => true,
    }
}

fn literal_nullish(lit: &SExpr) -> bool {
    matches!(lit, SExpr::Null(_) | SExpr::Undefined(_))
}

/// Renders a literal the way `String()` would, for folding `+` with a string
/// operand.
fn literal_to_string(lit: &SExpr) -> Option<String> {
    match lit {
        SExpr::Num(n, _) => Some(number_to_string(*n)),
        SExpr::BigInt(b, _) => Some(b.to_string()),
        SExpr::Str(s, _) => Some(s.to_string()),
        SExpr::Bool(b, _) => Some(if *b { "true" } else { "false" }.to_owned()),
        SExpr::Null(_) => Some("null".to_owned()),
        SExpr::Undefined(_) => Some("undefined".to_owned()),
        _ => None,
    }
}

/// Numeric coercion of a literal, following `ToNumber`.
fn literal_to_number(lit: &SExpr) -> Option<f64> {
    match lit {
        SExpr::Num(n, _) => Some(*n),
        SExpr::Bool(b, _) => Some(f64::from(u8::from(*b))),
        SExpr::Null(_) => Some(0.0),
        SExpr::Undefined(_) => Some(f64::NAN),
        SExpr::Str(s, _) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        // BigInt never silently coerces to number.
        _ => None,
    }
}

fn fold_binary(op: StaticSym, left: &SExpr, right: &SExpr, span: crate::lexer::CodeRange) -> Option<SExpr> {
    use StaticSym::*;

    // BigInt arithmetic folds only when both sides are bigints.
    if let (SExpr::BigInt(a, _), SExpr::BigInt(b, _)) = (left, right) {
        return fold_bigint_binary(op, a, b, span);
    }
    // A bigint mixed with anything else: leave for the runtime error paths
    // (arithmetic) or the loose-comparison rules (not folded, keeps the
    // folding pass simple and observably equivalent).
    if matches!(left, SExpr::BigInt(..)) || matches!(right, SExpr::BigInt(..)) {
        return None;
    }

    match op {
        OpAdd => {
            if let (SExpr::Str(..), _) | (_, SExpr::Str(..)) = (left, right) {
                let a = literal_to_string(left)?;
                let b = literal_to_string(right)?;
                return Some(SExpr::Str(format!("{a}{b}").into(), span));
            }
            let a = literal_to_number(left)?;
            let b = literal_to_number(right)?;
            Some(SExpr::Num(a + b, span))
        }
        OpSub | OpMul | OpDiv | OpMod | OpPow => {
            let a = literal_to_number(left)?;
            let b = literal_to_number(right)?;
            let v = match op {
                OpSub => a - b,
                OpMul => a * b,
                OpDiv => a / b,
                OpMod => a % b,
                OpPow => a.powf(b),
                _ => unreachable!(),
            };
            Some(SExpr::Num(v, span))
        }
        OpStrictEq | OpStrictNe => {
            let eq = strict_literal_eq(left, right);
            Some(SExpr::Bool(if op == OpStrictEq { eq } else { !eq }, span))
        }
        OpEq | OpNe => {
            let eq = loose_literal_eq(left, right)?;
            Some(SExpr::Bool(if op == OpEq { eq } else { !eq }, span))
        }
        OpLt | OpLe | OpGt | OpGe => {
            if let (SExpr::Str(a, _), SExpr::Str(b, _)) = (left, right) {
                let r = match op {
                    OpLt => a < b,
                    OpLe => a <= b,
                    OpGt => a > b,
                    OpGe => a >= b,
                    _ => unreachable!(),
                };
                return Some(SExpr::Bool(r, span));
            }
            let a = literal_to_number(left)?;
            let b = literal_to_number(right)?;
            let r = match op {
                OpLt => a < b,
                OpLe => a <= b,
                OpGt => a > b,
                OpGe => a >= b,
                _ => unreachable!(),
            };
            Some(SExpr::Bool(r, span))
        }
        _ => None,
    }
}

fn fold_bigint_binary(op: StaticSym, a: &Rc<BigInt>, b: &Rc<BigInt>, span: crate::lexer::CodeRange) -> Option<SExpr> {
    use StaticSym::*;
    let v = match op {
        OpAdd => &**a + &**b,
        OpSub => &**a - &**b,
        OpMul => &**a * &**b,
        // Division and modulo by zero raise at runtime; don't fold them away.
        OpDiv if !b.is_zero() => &**a / &**b,
        OpMod if !b.is_zero() => &**a % &**b,
        OpPow => {
            let exp = b.to_u32()?;
            a.pow(exp)
        }
        OpEq | OpStrictEq => return Some(SExpr::Bool(a == b, span)),
        OpNe | OpStrictNe => return Some(SExpr::Bool(a != b, span)),
        OpLt => return Some(SExpr::Bool(a < b, span)),
        OpLe => return Some(SExpr::Bool(a <= b, span)),
        OpGt => return Some(SExpr::Bool(a > b, span)),
        OpGe => return Some(SExpr::Bool(a >= b, span)),
        _ => return None,
    };
    Some(SExpr::BigInt(Rc::new(v), span))
}

fn strict_literal_eq(left: &SExpr, right: &SExpr) -> bool {
    match (left, right) {
        (SExpr::Num(a, _), SExpr::Num(b, _)) => a == b,
        (SExpr::Str(a, _), SExpr::Str(b, _)) => a == b,
        (SExpr::Bool(a, _), SExpr::Bool(b, _)) => a == b,
        (SExpr::Null(_), SExpr::Null(_)) | (SExpr::Undefined(_), SExpr::Undefined(_)) => true,
        _ => false,
    }
}

/// Loose equality between literals. Returns `None` for pairs whose coercion
/// is not worth replicating here; those stay for the evaluator.
fn loose_literal_eq(left: &SExpr, right: &SExpr) -> Option<bool> {
    match (left, right) {
        (SExpr::Null(_) | SExpr::Undefined(_), SExpr::Null(_) | SExpr::Undefined(_)) => Some(true),
        (SExpr::Null(_) | SExpr::Undefined(_), _) | (_, SExpr::Null(_) | SExpr::Undefined(_)) => Some(false),
        (SExpr::Str(a, _), SExpr::Str(b, _)) => Some(a == b),
        _ => {
            let a = literal_to_number(left)?;
            let b = literal_to_number(right)?;
            Some(a == b)
        }
    }
}

fn fold_logical(op: StaticSym, left: &SExpr, right: &SExpr, span: crate::lexer::CodeRange) -> SExpr {
    let pick_right = match op {
        StaticSym::OpAnd => literal_truthy(left),
        StaticSym::OpOr => !literal_truthy(left),
        StaticSym::OpNullish => literal_nullish(left),
        _ => unreachable!("fold_logical called with non-logical op"),
    };
    if pick_right {
        right.clone()
    } else {
        let mut result = left.clone();
        set_span(&mut result, span);
        result
    }
}

fn fold_unary(op: StaticSym, operand: &SExpr, span: crate::lexer::CodeRange) -> Option<SExpr> {
    match op {
        StaticSym::Not => Some(SExpr::Bool(!literal_truthy(operand), span)),
        StaticSym::Neg => {
            if let SExpr::BigInt(b, _) = operand {
                return Some(SExpr::BigInt(Rc::new(-&**b), span));
            }
            Some(SExpr::Num(-literal_to_number(operand)?, span))
        }
        StaticSym::Pos => Some(SExpr::Num(literal_to_number(operand)?, span)),
        StaticSym::BitNot => {
            let n = literal_to_number(operand)?;
            Some(SExpr::Num(f64::from(!to_int32(n)), span))
        }
        StaticSym::TypeOf => {
            let name = match operand {
                SExpr::Num(..) => "number",
                SExpr::BigInt(..) => "bigint",
                SExpr::Str(..) => "string",
                SExpr::Bool(..) => "boolean",
                SExpr::Undefined(_) => "undefined",
                SExpr::Null(_) => "object",
                _ => return None,
            };
            Some(SExpr::Str(name.into(), span))
        }
        _ => None,
    }
}

fn set_span(node: &mut SExpr, new_span: crate::lexer::CodeRange) {
    match node {
        SExpr::Sym(_, span)
        | SExpr::Num(_, span)
        | SExpr::BigInt(_, span)
        | SExpr::Str(_, span)
        | SExpr::Bool(_, span)
        | SExpr::Null(span)
        | SExpr::Undefined(span)
        | SExpr::Regex { span, .. }
        | SExpr::List { span, .. } => *span = new_span,
    }
}

/// `ToInt32` truncation used by the bitwise operators.
pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc() as i64;
    (m & 0xffff_ffff) as u32 as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{intern::Interner, parse::parse};

    fn folded(source: &str) -> String {
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        fold(tree).snapshot(&interner)
    }

    #[test]
    fn folds_pure_arithmetic() {
        assert_eq!(folded("1 + 2 * 3;"), "(Program 7)");
        assert_eq!(folded("'a' + 1;"), "(Program \"a1\")");
        assert_eq!(folded("10n + 5n;"), "(Program 15n)");
    }

    #[test]
    fn folds_comparisons_and_logic() {
        assert_eq!(folded("1 < 2;"), "(Program true)");
        assert_eq!(folded("true && x;"), "(Program x)");
        assert_eq!(folded("null ?? 3;"), "(Program 3)");
        assert_eq!(folded("typeof null;"), "(Program \"object\")");
    }

    #[test]
    fn does_not_fold_impure_or_failing_operations() {
        // Calls are side effects; bigint division by zero raises at runtime.
        assert_eq!(folded("f() + 1;"), "(Program (+ (Call f) 1))");
        assert_eq!(folded("1n / 0n;"), "(Program (/ 1n 0n))");
        assert_eq!(folded("1n + 2;"), "(Program (+ 1n 2))");
    }

    #[test]
    fn folds_nested_subtrees() {
        assert_eq!(folded("f(1 + 2);"), "(Program (Call f 3))");
    }
}
