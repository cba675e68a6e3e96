//! Builds the typed AST from the symbolic list form.
//!
//! This pass is total: every head symbol the parser can produce has a mapping
//! here. An unknown head is an internal fault (a parser/prepare mismatch) and
//! is reported as an internal error rather than a user-facing syntax error.

use std::rc::Rc;

use crate::{
    ast::{
        CatchClause, ClassDef, ClassMember, ClassMemberKind, DeclKind, Expr, ExprLoc, FuncDef, FuncKind, Literal,
        MemberProp, Param, PropInit, PropKeyAst, PropValue, Stmt, SwitchCase, VarDecl, VarDeclarator,
    },
    exception::ParseError,
    intern::StaticSym,
    sexpr::SExpr,
};

type PrepResult<T> = Result<T, ParseError>;

/// Converts a parsed `(Program ..)` tree into a typed statement list.
pub(crate) fn prepare(tree: &SExpr) -> PrepResult<Vec<Stmt>> {
    let SExpr::List { head, items, .. } = tree else {
        return Err(internal(tree, "expected Program form"));
    };
    if !head.is(StaticSym::Program) {
        return Err(internal(tree, "expected Program form"));
    }
    items.iter().map(prepare_stmt).collect()
}

fn internal(node: &SExpr, what: &str) -> ParseError {
    ParseError::new(format!("internal: {what}"), node.span().start)
}

fn syntax(node: &SExpr, what: &str) -> ParseError {
    ParseError::new(what.to_owned(), node.span().start)
}

fn prepare_stmt(node: &SExpr) -> PrepResult<Stmt> {
    let span = node.span();
    let Some(head) = node.head() else {
        // Bare atoms at statement position are expression statements.
        return Ok(Stmt::Expr(prepare_expr(node)?));
    };
    let SExpr::List { items, .. } = node else {
        unreachable!("head() implies List");
    };

    match head {
        StaticSym::Let => prepare_var_decl(DeclKind::Let, items, span, node),
        StaticSym::Const => prepare_var_decl(DeclKind::Const, items, span, node),
        StaticSym::Var => prepare_var_decl(DeclKind::Var, items, span, node),
        StaticSym::Block => Ok(Stmt::Block(items.iter().map(prepare_stmt).collect::<PrepResult<_>>()?, span)),
        StaticSym::Empty => Ok(Stmt::Empty),
        StaticSym::If => {
            let test = prepare_expr(&items[0])?;
            let cons = Box::new(prepare_stmt(&items[1])?);
            let alt = match items.get(2) {
                Some(alt) => Some(Box::new(prepare_stmt(alt)?)),
                None => None,
            };
            Ok(Stmt::If { test, cons, alt })
        }
        StaticSym::While => Ok(Stmt::While {
            test: prepare_expr(&items[0])?,
            body: Box::new(prepare_stmt(&items[1])?),
        }),
        StaticSym::DoWhile => Ok(Stmt::DoWhile {
            body: Box::new(prepare_stmt(&items[0])?),
            test: prepare_expr(&items[1])?,
        }),
        StaticSym::For => {
            let init = match items[0].head() {
                Some(StaticSym::Empty) => None,
                Some(StaticSym::Let | StaticSym::Const | StaticSym::Var) => Some(Box::new(prepare_stmt(&items[0])?)),
                _ => Some(Box::new(Stmt::Expr(prepare_expr(&items[0])?))),
            };
            let test = match items[1].head() {
                Some(StaticSym::Empty) => None,
                _ => Some(prepare_expr(&items[1])?),
            };
            let update = match items[2].head() {
                Some(StaticSym::Empty) => None,
                _ => Some(prepare_expr(&items[2])?),
            };
            Ok(Stmt::For {
                init,
                test,
                update,
                body: Box::new(prepare_stmt(&items[3])?),
            })
        }
        StaticSym::ForIn | StaticSym::ForOf | StaticSym::ForAwaitOf => {
            let decl = match &items[0] {
                SExpr::Sym(sym, _) => match sym.as_static() {
                    Some(StaticSym::Let) => Some(DeclKind::Let),
                    Some(StaticSym::Const) => Some(DeclKind::Const),
                    Some(StaticSym::Var) => Some(DeclKind::Var),
                    _ => return Err(internal(node, "bad loop decl kind")),
                },
                _ => None,
            };
            let SExpr::Sym(target, _) = items[1] else {
                return Err(internal(node, "bad loop target"));
            };
            let object = prepare_expr(&items[2])?;
            let body = Box::new(prepare_stmt(&items[3])?);
            if head == StaticSym::ForIn {
                Ok(Stmt::ForIn {
                    decl,
                    target,
                    object,
                    body,
                })
            } else {
                Ok(Stmt::ForOf {
                    decl,
                    target,
                    iterable: object,
                    body,
                    is_await: head == StaticSym::ForAwaitOf,
                })
            }
        }
        StaticSym::Function | StaticSym::Generator | StaticSym::Async => {
            let func = prepare_func(head, items, span)?;
            if func.name.is_some() {
                Ok(Stmt::FuncDecl(Rc::new(func)))
            } else {
                Ok(Stmt::Expr(ExprLoc::new(span, Expr::Function(Rc::new(func)))))
            }
        }
        StaticSym::Class => Ok(Stmt::ClassDecl(Box::new(prepare_class(items, span)?))),
        StaticSym::Return => Ok(Stmt::Return {
            value: match items.first() {
                Some(v) => Some(prepare_expr(v)?),
                None => None,
            },
            span,
        }),
        StaticSym::Throw => Ok(Stmt::Throw {
            value: prepare_expr(&items[0])?,
            span,
        }),
        StaticSym::Break => Ok(Stmt::Break {
            label: match items.first() {
                Some(SExpr::Sym(sym, _)) => Some(*sym),
                _ => None,
            },
            span,
        }),
        StaticSym::Continue => Ok(Stmt::Continue {
            label: match items.first() {
                Some(SExpr::Sym(sym, _)) => Some(*sym),
                _ => None,
            },
            span,
        }),
        StaticSym::Label => {
            let SExpr::Sym(label, _) = items[0] else {
                return Err(internal(node, "bad label"));
            };
            Ok(Stmt::Labeled {
                label,
                body: Box::new(prepare_stmt(&items[1])?),
            })
        }
        StaticSym::Try => {
            let block = prepare_block_stmts(&items[0])?;
            let catch = match items[1].head() {
                Some(StaticSym::Catch) => {
                    let SExpr::List { items: catch_items, .. } = &items[1] else {
                        unreachable!("catch head implies list");
                    };
                    let param = match &catch_items[0] {
                        SExpr::Sym(sym, _) => Some(*sym),
                        _ => None,
                    };
                    Some(CatchClause {
                        param,
                        body: prepare_block_stmts(&catch_items[1])?,
                    })
                }
                _ => None,
            };
            let finally = match items[2].head() {
                Some(StaticSym::Block) => Some(prepare_block_stmts(&items[2])?),
                _ => None,
            };
            Ok(Stmt::Try {
                block,
                catch,
                finally,
                span,
            })
        }
        StaticSym::Switch => {
            let disc = prepare_expr(&items[0])?;
            let mut cases = Vec::new();
            for case in &items[1..] {
                let SExpr::List { items: case_items, .. } = case else {
                    return Err(internal(node, "bad switch case"));
                };
                match case.head() {
                    Some(StaticSym::Case) => {
                        let test = prepare_expr(&case_items[0])?;
                        let body = case_items[1..].iter().map(prepare_stmt).collect::<PrepResult<_>>()?;
                        cases.push(SwitchCase { test: Some(test), body });
                    }
                    Some(StaticSym::Default) => {
                        let body = case_items.iter().map(prepare_stmt).collect::<PrepResult<_>>()?;
                        cases.push(SwitchCase { test: None, body });
                    }
                    _ => return Err(internal(node, "bad switch case head")),
                }
            }
            Ok(Stmt::Switch { disc, cases, span })
        }
        _ => Ok(Stmt::Expr(prepare_expr(node)?)),
    }
}

fn prepare_block_stmts(node: &SExpr) -> PrepResult<Vec<Stmt>> {
    match node {
        SExpr::List { head, items, .. } if head.is(StaticSym::Block) => items.iter().map(prepare_stmt).collect(),
        other => Ok(vec![prepare_stmt(other)?]),
    }
}

fn prepare_var_decl(kind: DeclKind, items: &[SExpr], span: crate::lexer::CodeRange, node: &SExpr) -> PrepResult<Stmt> {
    let mut decls = Vec::with_capacity(items.len());
    for decl in items {
        let SExpr::List { head, items: parts, .. } = decl else {
            return Err(internal(node, "bad declarator"));
        };
        if !head.is(StaticSym::Assign) {
            return Err(internal(node, "bad declarator head"));
        }
        let SExpr::Sym(name, _) = parts[0] else {
            return Err(internal(node, "bad declarator name"));
        };
        let init = match parts[1].head() {
            Some(StaticSym::Uninitialized) => {
                if kind == DeclKind::Const {
                    return Err(syntax(decl, "missing initializer in const declaration"));
                }
                None
            }
            _ => Some(prepare_expr(&parts[1])?),
        };
        decls.push(VarDeclarator { name, init });
    }
    Ok(Stmt::VarDecl(VarDecl { kind, decls, span }))
}

fn prepare_func(head: StaticSym, items: &[SExpr], span: crate::lexer::CodeRange) -> PrepResult<FuncDef> {
    let name = match &items[0] {
        SExpr::Sym(sym, _) => Some(*sym),
        _ => None,
    };
    let params = prepare_params(&items[1])?;
    let body = prepare_block_stmts(&items[2])?;
    let kind = match head {
        StaticSym::Generator => FuncKind::Generator,
        StaticSym::Async => FuncKind::Async,
        _ => FuncKind::Plain,
    };
    Ok(FuncDef {
        name,
        params,
        body,
        kind,
        span,
    })
}

fn prepare_params(node: &SExpr) -> PrepResult<Vec<Param>> {
    let SExpr::List { items, .. } = node else {
        return Err(internal(node, "bad parameter list"));
    };
    let mut params = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SExpr::Sym(sym, _) => params.push(Param { name: *sym, rest: false }),
            SExpr::List { head, items: rest, .. } if head.is(StaticSym::Rest) => {
                let SExpr::Sym(sym, _) = rest[0] else {
                    return Err(internal(node, "bad rest parameter"));
                };
                params.push(Param { name: sym, rest: true });
            }
            _ => return Err(internal(node, "bad parameter")),
        }
    }
    Ok(params)
}

/// Converts a lambda body: a `(Block ..)` runs as statements, anything else
/// is an implicit return of the expression.
fn prepare_lambda_body(node: &SExpr) -> PrepResult<Vec<Stmt>> {
    match node.head() {
        Some(StaticSym::Block) => prepare_block_stmts(node),
        _ => {
            let value = prepare_expr(node)?;
            let span = value.span;
            Ok(vec![Stmt::Return {
                value: Some(value),
                span,
            }])
        }
    }
}

fn prepare_class(items: &[SExpr], span: crate::lexer::CodeRange) -> PrepResult<ClassDef> {
    let name = match &items[0] {
        SExpr::Sym(sym, _) => Some(*sym),
        _ => None,
    };
    let parent = match items[1].head() {
        Some(StaticSym::Extends) => {
            let SExpr::List { items: parent_items, .. } = &items[1] else {
                unreachable!("extends head implies list");
            };
            Some(prepare_expr(&parent_items[0])?)
        }
        _ => None,
    };

    let mut ctor = None;
    let mut members = Vec::new();
    for member in &items[2..] {
        let (member_node, is_static) = match member.head() {
            Some(StaticSym::Static) => {
                let SExpr::List { items: inner, .. } = member else {
                    unreachable!("static head implies list");
                };
                (&inner[0], true)
            }
            _ => (member, false),
        };
        let SExpr::List { items: parts, .. } = member_node else {
            return Err(internal(member, "bad class member"));
        };
        let kind = match member_node.head() {
            Some(StaticSym::Method) => ClassMemberKind::Method,
            Some(StaticSym::Getter) => ClassMemberKind::Getter,
            Some(StaticSym::Setter) => ClassMemberKind::Setter,
            _ => return Err(internal(member, "bad class member head")),
        };
        let key = prepare_prop_key(&parts[0])?;
        let SExpr::List { head, items: func_items, .. } = &parts[1] else {
            return Err(internal(member, "bad class method"));
        };
        let Some(func_head) = head.as_static() else {
            return Err(internal(member, "bad class method head"));
        };
        let mut func = prepare_func(func_head, func_items, parts[1].span())?;

        let is_ctor = !is_static
            && kind == ClassMemberKind::Method
            && matches!(&key, PropKeyAst::Ident(sym) if sym.is(StaticSym::Constructor));
        if is_ctor {
            func.kind = FuncKind::Ctor;
            ctor = Some(Rc::new(func));
        } else {
            if func.kind == FuncKind::Plain {
                func.kind = FuncKind::Method;
            }
            members.push(ClassMember {
                key,
                kind,
                is_static,
                func: Rc::new(func),
            });
        }
    }

    Ok(ClassDef {
        name,
        parent,
        ctor,
        members,
        span,
    })
}

fn prepare_prop_key(node: &SExpr) -> PrepResult<PropKeyAst> {
    match node {
        SExpr::Sym(sym, _) => Ok(PropKeyAst::Ident(*sym)),
        SExpr::Str(s, _) => Ok(PropKeyAst::Str(s.clone())),
        SExpr::Num(n, _) => Ok(PropKeyAst::Num(*n)),
        SExpr::List { head, items, .. } if head.is(StaticSym::Computed) => {
            Ok(PropKeyAst::Computed(Box::new(prepare_expr(&items[0])?)))
        }
        _ => Err(internal(node, "bad property key")),
    }
}

fn prepare_expr(node: &SExpr) -> PrepResult<ExprLoc> {
    let span = node.span();
    match node {
        SExpr::Sym(sym, _) => Ok(ExprLoc::new(span, Expr::Ident(*sym))),
        SExpr::Num(n, _) => Ok(ExprLoc::new(span, Expr::Literal(Literal::Num(*n)))),
        SExpr::BigInt(b, _) => Ok(ExprLoc::new(span, Expr::Literal(Literal::BigInt(b.clone())))),
        SExpr::Str(s, _) => Ok(ExprLoc::new(span, Expr::Literal(Literal::Str(s.clone())))),
        SExpr::Bool(b, _) => Ok(ExprLoc::new(span, Expr::Literal(Literal::Bool(*b)))),
        SExpr::Null(_) => Ok(ExprLoc::new(span, Expr::Literal(Literal::Null))),
        SExpr::Undefined(_) => Ok(ExprLoc::new(span, Expr::Literal(Literal::Undefined))),
        SExpr::Regex { pattern, flags, .. } => Ok(ExprLoc::new(
            span,
            Expr::Regex {
                pattern: pattern.clone(),
                flags: flags.clone(),
            },
        )),
        SExpr::List { head, items, .. } => {
            let Some(head) = head.as_static() else {
                return Err(internal(node, "unknown head symbol"));
            };
            prepare_form(head, items, span, node)
        }
    }
}

fn prepare_form(
    head: StaticSym,
    items: &[SExpr],
    span: crate::lexer::CodeRange,
    node: &SExpr,
) -> PrepResult<ExprLoc> {
    use crate::ast::{BinOp, CmpOp, LogicalOp, UnaryOp, UpdateOp};

    let bin = |op: BinOp, items: &[SExpr]| -> PrepResult<ExprLoc> {
        Ok(ExprLoc::new(
            span,
            Expr::Binary {
                op,
                left: Box::new(prepare_expr(&items[0])?),
                right: Box::new(prepare_expr(&items[1])?),
            },
        ))
    };
    let cmp = |op: CmpOp, items: &[SExpr]| -> PrepResult<ExprLoc> {
        Ok(ExprLoc::new(
            span,
            Expr::Cmp {
                op,
                left: Box::new(prepare_expr(&items[0])?),
                right: Box::new(prepare_expr(&items[1])?),
            },
        ))
    };
    let logical = |op: LogicalOp, items: &[SExpr]| -> PrepResult<ExprLoc> {
        Ok(ExprLoc::new(
            span,
            Expr::Logical {
                op,
                left: Box::new(prepare_expr(&items[0])?),
                right: Box::new(prepare_expr(&items[1])?),
            },
        ))
    };
    let unary = |op: UnaryOp, items: &[SExpr]| -> PrepResult<ExprLoc> {
        Ok(ExprLoc::new(
            span,
            Expr::Unary {
                op,
                operand: Box::new(prepare_expr(&items[0])?),
            },
        ))
    };
    let update = |op: UpdateOp, prefix: bool, items: &[SExpr]| -> PrepResult<ExprLoc> {
        let target = prepare_expr(&items[0])?;
        check_assign_target(&target, node)?;
        Ok(ExprLoc::new(
            span,
            Expr::Update {
                op,
                prefix,
                target: Box::new(target),
            },
        ))
    };

    match head {
        StaticSym::OpAdd => bin(BinOp::Add, items),
        StaticSym::OpSub => bin(BinOp::Sub, items),
        StaticSym::OpMul => bin(BinOp::Mul, items),
        StaticSym::OpDiv => bin(BinOp::Div, items),
        StaticSym::OpMod => bin(BinOp::Mod, items),
        StaticSym::OpPow => bin(BinOp::Pow, items),
        StaticSym::OpBitAnd => bin(BinOp::BitAnd, items),
        StaticSym::OpBitOr => bin(BinOp::BitOr, items),
        StaticSym::OpBitXor => bin(BinOp::BitXor, items),
        StaticSym::OpShl => bin(BinOp::Shl, items),
        StaticSym::OpShr => bin(BinOp::Shr, items),
        StaticSym::OpUShr => bin(BinOp::UShr, items),
        StaticSym::OpEq => cmp(CmpOp::Eq, items),
        StaticSym::OpNe => cmp(CmpOp::Ne, items),
        StaticSym::OpStrictEq => cmp(CmpOp::StrictEq, items),
        StaticSym::OpStrictNe => cmp(CmpOp::StrictNe, items),
        StaticSym::OpLt => cmp(CmpOp::Lt, items),
        StaticSym::OpLe => cmp(CmpOp::Le, items),
        StaticSym::OpGt => cmp(CmpOp::Gt, items),
        StaticSym::OpGe => cmp(CmpOp::Ge, items),
        StaticSym::OpIn => cmp(CmpOp::In, items),
        StaticSym::OpInstanceOf => cmp(CmpOp::InstanceOf, items),
        StaticSym::OpAnd => logical(LogicalOp::And, items),
        StaticSym::OpOr => logical(LogicalOp::Or, items),
        StaticSym::OpNullish => logical(LogicalOp::Nullish, items),
        StaticSym::Not => unary(UnaryOp::Not, items),
        StaticSym::Neg => unary(UnaryOp::Neg, items),
        StaticSym::Pos => unary(UnaryOp::Pos, items),
        StaticSym::BitNot => unary(UnaryOp::BitNot, items),
        StaticSym::TypeOf => unary(UnaryOp::TypeOf, items),
        StaticSym::Void => unary(UnaryOp::Void, items),
        StaticSym::Delete => unary(UnaryOp::Delete, items),
        StaticSym::PreInc => update(UpdateOp::Inc, true, items),
        StaticSym::PreDec => update(UpdateOp::Dec, true, items),
        StaticSym::PostInc => update(UpdateOp::Inc, false, items),
        StaticSym::PostDec => update(UpdateOp::Dec, false, items),
        StaticSym::Assign => {
            let SExpr::Sym(target, target_span) = items[0] else {
                return Err(internal(node, "bad assignment target"));
            };
            Ok(ExprLoc::new(
                span,
                Expr::Assign {
                    op: None,
                    target: Box::new(ExprLoc::ident(target, target_span)),
                    value: Box::new(prepare_expr(&items[1])?),
                },
            ))
        }
        StaticSym::OpAssign => {
            let SExpr::Sym(op_sym, _) = items[0] else {
                return Err(internal(node, "bad compound assignment operator"));
            };
            let target = prepare_expr(&items[1])?;
            check_assign_target(&target, node)?;
            let value = Box::new(prepare_expr(&items[2])?);
            let target = Box::new(target);
            match op_sym.as_static() {
                Some(StaticSym::OpAnd) => Ok(ExprLoc::new(span, Expr::LogicalAssign { op: LogicalOp::And, target, value })),
                Some(StaticSym::OpOr) => Ok(ExprLoc::new(span, Expr::LogicalAssign { op: LogicalOp::Or, target, value })),
                Some(StaticSym::OpNullish) => {
                    Ok(ExprLoc::new(span, Expr::LogicalAssign { op: LogicalOp::Nullish, target, value }))
                }
                Some(op_head) => {
                    let op = match op_head {
                        StaticSym::OpAdd => BinOp::Add,
                        StaticSym::OpSub => BinOp::Sub,
                        StaticSym::OpMul => BinOp::Mul,
                        StaticSym::OpDiv => BinOp::Div,
                        StaticSym::OpMod => BinOp::Mod,
                        StaticSym::OpPow => BinOp::Pow,
                        StaticSym::OpBitAnd => BinOp::BitAnd,
                        StaticSym::OpBitOr => BinOp::BitOr,
                        StaticSym::OpBitXor => BinOp::BitXor,
                        StaticSym::OpShl => BinOp::Shl,
                        StaticSym::OpShr => BinOp::Shr,
                        StaticSym::OpUShr => BinOp::UShr,
                        _ => return Err(internal(node, "bad compound assignment operator")),
                    };
                    Ok(ExprLoc::new(span, Expr::Assign { op: Some(op), target, value }))
                }
                None => Err(internal(node, "bad compound assignment operator")),
            }
        }
        StaticSym::SetProperty => {
            let object = prepare_expr(&items[0])?;
            let SExpr::Sym(name, _) = items[1] else {
                return Err(internal(node, "bad property name"));
            };
            let target = ExprLoc::new(
                span,
                Expr::Member {
                    object: Box::new(object),
                    prop: MemberProp::Ident(name),
                    optional: false,
                },
            );
            Ok(ExprLoc::new(
                span,
                Expr::Assign {
                    op: None,
                    target: Box::new(target),
                    value: Box::new(prepare_expr(&items[2])?),
                },
            ))
        }
        StaticSym::SetIndex => {
            let object = prepare_expr(&items[0])?;
            let index = prepare_expr(&items[1])?;
            let target = ExprLoc::new(
                span,
                Expr::Member {
                    object: Box::new(object),
                    prop: MemberProp::Computed(Box::new(index)),
                    optional: false,
                },
            );
            Ok(ExprLoc::new(
                span,
                Expr::Assign {
                    op: None,
                    target: Box::new(target),
                    value: Box::new(prepare_expr(&items[2])?),
                },
            ))
        }
        StaticSym::GetProperty | StaticSym::GetPropertyOpt => {
            let object = prepare_expr(&items[0])?;
            let SExpr::Sym(name, _) = items[1] else {
                return Err(internal(node, "bad property name"));
            };
            Ok(ExprLoc::new(
                span,
                Expr::Member {
                    object: Box::new(object),
                    prop: MemberProp::Ident(name),
                    optional: head == StaticSym::GetPropertyOpt,
                },
            ))
        }
        StaticSym::GetIndex | StaticSym::GetIndexOpt => {
            let object = prepare_expr(&items[0])?;
            let index = prepare_expr(&items[1])?;
            Ok(ExprLoc::new(
                span,
                Expr::Member {
                    object: Box::new(object),
                    prop: MemberProp::Computed(Box::new(index)),
                    optional: head == StaticSym::GetIndexOpt,
                },
            ))
        }
        StaticSym::Call | StaticSym::CallOpt => {
            let callee = prepare_expr(&items[0])?;
            let args = prepare_args(&items[1..])?;
            Ok(ExprLoc::new(
                span,
                Expr::Call {
                    callee: Box::new(callee),
                    args,
                    optional: head == StaticSym::CallOpt,
                },
            ))
        }
        StaticSym::New => {
            let callee = prepare_expr(&items[0])?;
            let args = prepare_args(&items[1..])?;
            Ok(ExprLoc::new(
                span,
                Expr::New {
                    callee: Box::new(callee),
                    args,
                },
            ))
        }
        StaticSym::OptionalChain => Ok(ExprLoc::new(
            span,
            Expr::OptionalChain(Box::new(prepare_expr(&items[0])?)),
        )),
        StaticSym::ArrayLiteral => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                match item.head() {
                    Some(StaticSym::Hole) => elements.push(None),
                    Some(StaticSym::Spread) => {
                        let SExpr::List { items: spread_items, .. } = item else {
                            unreachable!("spread head implies list");
                        };
                        let inner = prepare_expr(&spread_items[0])?;
                        let inner_span = inner.span;
                        elements.push(Some(ExprLoc::new(inner_span, Expr::Spread(Box::new(inner)))));
                    }
                    _ => elements.push(Some(prepare_expr(item)?)),
                }
            }
            Ok(ExprLoc::new(span, Expr::Array(elements)))
        }
        StaticSym::ObjectLiteral => {
            let mut props = Vec::with_capacity(items.len());
            for prop in items {
                let SExpr::List { items: parts, .. } = prop else {
                    return Err(internal(node, "bad object member"));
                };
                let key = prepare_prop_key(&parts[0])?;
                let value = match prop.head() {
                    Some(StaticSym::Property) => PropValue::Value(prepare_expr(&parts[1])?),
                    Some(StaticSym::Method | StaticSym::Getter | StaticSym::Setter) => {
                        let SExpr::List { head: func_head, items: func_items, .. } = &parts[1] else {
                            return Err(internal(node, "bad object method"));
                        };
                        let Some(func_head) = func_head.as_static() else {
                            return Err(internal(node, "bad object method head"));
                        };
                        let mut func = prepare_func(func_head, func_items, parts[1].span())?;
                        if func.kind == FuncKind::Plain {
                            func.kind = FuncKind::Method;
                        }
                        let func = Rc::new(func);
                        match prop.head() {
                            Some(StaticSym::Getter) => PropValue::Getter(func),
                            Some(StaticSym::Setter) => PropValue::Setter(func),
                            _ => PropValue::Method(func),
                        }
                    }
                    _ => return Err(internal(node, "bad object member head")),
                };
                props.push(PropInit { key, value });
            }
            Ok(ExprLoc::new(span, Expr::Object(props)))
        }
        StaticSym::Lambda => {
            let params = prepare_params(&items[0])?;
            let body = prepare_lambda_body(&items[1])?;
            Ok(ExprLoc::new(
                span,
                Expr::Function(Rc::new(FuncDef {
                    name: None,
                    params,
                    body,
                    kind: FuncKind::Arrow,
                    span,
                })),
            ))
        }
        StaticSym::Function | StaticSym::Generator | StaticSym::Async => {
            let func = prepare_func(head, items, span)?;
            Ok(ExprLoc::new(span, Expr::Function(Rc::new(func))))
        }
        StaticSym::Class => Ok(ExprLoc::new(span, Expr::Class(Box::new(prepare_class(items, span)?)))),
        StaticSym::Conditional => Ok(ExprLoc::new(
            span,
            Expr::Conditional {
                test: Box::new(prepare_expr(&items[0])?),
                cons: Box::new(prepare_expr(&items[1])?),
                alt: Box::new(prepare_expr(&items[2])?),
            },
        )),
        StaticSym::Sequence => Ok(ExprLoc::new(
            span,
            Expr::Sequence(items.iter().map(prepare_expr).collect::<PrepResult<_>>()?),
        )),
        StaticSym::Template => {
            let mut chunks = Vec::new();
            let mut exprs = Vec::new();
            for item in items {
                match item {
                    SExpr::Str(s, _) => chunks.push(s.clone()),
                    other => exprs.push(prepare_expr(other)?),
                }
            }
            Ok(ExprLoc::new(span, Expr::Template { chunks, exprs }))
        }
        StaticSym::Yield => Ok(ExprLoc::new(
            span,
            Expr::Yield {
                value: match items.first() {
                    Some(v) => Some(Box::new(prepare_expr(v)?)),
                    None => None,
                },
                delegated: false,
            },
        )),
        StaticSym::YieldStar => Ok(ExprLoc::new(
            span,
            Expr::Yield {
                value: Some(Box::new(prepare_expr(&items[0])?)),
                delegated: true,
            },
        )),
        StaticSym::Await => Ok(ExprLoc::new(span, Expr::Await(Box::new(prepare_expr(&items[0])?)))),
        StaticSym::Spread => {
            let inner = prepare_expr(&items[0])?;
            Ok(ExprLoc::new(span, Expr::Spread(Box::new(inner))))
        }
        StaticSym::This => Ok(ExprLoc::new(span, Expr::This)),
        StaticSym::Super => Ok(ExprLoc::new(span, Expr::Super)),
        _ => Err(internal(node, "unknown head symbol")),
    }
}

fn prepare_args(items: &[SExpr]) -> PrepResult<Vec<ExprLoc>> {
    items
        .iter()
        .map(|item| match item.head() {
            Some(StaticSym::Spread) => {
                let SExpr::List { items: spread_items, .. } = item else {
                    unreachable!("spread head implies list");
                };
                let inner = prepare_expr(&spread_items[0])?;
                Ok(ExprLoc::new(item.span(), Expr::Spread(Box::new(inner))))
            }
            _ => prepare_expr(item),
        })
        .collect()
}

fn check_assign_target(target: &ExprLoc, node: &SExpr) -> PrepResult<()> {
    match &target.expr {
        Expr::Ident(_) | Expr::Member { .. } => Ok(()),
        _ => Err(syntax(node, "invalid assignment target")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ast::snapshot_program, intern::Interner, parse::parse};

    fn prepared(source: &str) -> String {
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        snapshot_program(&prepare(&tree).unwrap(), &interner)
    }

    #[test]
    fn builds_typed_statements() {
        assert_eq!(prepared("let x = 1;"), "(let (x 1))");
        assert_eq!(prepared("if (a) b; else c;"), "(if a (expr b) (expr c))");
    }

    #[test]
    fn builds_member_assignments() {
        assert_eq!(prepared("a.b = 1;"), "(expr (= (get a b) 1))");
        assert_eq!(prepared("a[0] += 2;"), "(expr (+= (get a [0]) 2))");
    }

    #[test]
    fn const_requires_initializer() {
        let mut interner = Interner::new();
        let tree = parse("const x;", &mut interner).unwrap();
        let err = prepare(&tree).unwrap_err();
        assert!(err.message.contains("missing initializer"));
    }

    #[test]
    fn every_parser_head_has_a_mapping() {
        // A broad program touching each construct; prepare must be total.
        let source = r#"
            let a = [1, , ...rest];
            const o = { x: 1, m() { return 2; }, get g() { return 3; }, ["k"]: 4 };
            function f(p, ...q) { return p; }
            async function h() { for await (const v of xs) { await v; } }
            function* gen() { yield 1; yield* other; }
            class C extends B { constructor() { super(); } static s() {} set v(x) {} }
            outer: for (let i = 0; i < 3; i++) { continue outer; }
            for (const k in o) { delete o[k]; }
            for (const v of a) {}
            do { x ||= 1; } while (false);
            switch (a) { case 1: break; default: }
            try { throw 1; } catch (e) {} finally {}
            let t = `x${a}y`, r = /ab/g, c = a?.b?.[0], n = a ?? b, s = typeof a;
            this; new C(1); (x => x)(5);
        "#;
        let mut interner = Interner::new();
        let tree = parse(source, &mut interner).unwrap();
        prepare(&tree).unwrap();
    }
}
