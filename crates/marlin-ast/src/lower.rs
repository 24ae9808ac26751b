//! Lowering of the surface syntax into the core calculus.
//!
//! Every derived form is rewritten here: `fun` declarations become
//! `val rec` with curried lambdas over a tuple `case`, tuples become
//! records labelled `1..n`, list syntax becomes `::`-chains, sequencing
//! and conditionals become `case` (itself an application of `fn`), and
//! `while` becomes a recursive loop. Lowering is pure: it consults no
//! environment and produces a fresh tree.

use crate::core::*;
use crate::*;
use smol_str::SmolStr;
use std::rc::Rc;

/// Names invented by the lowering; the leading underscores keep them out
/// of the way of ordinary programs.
const ARG_PREFIX: &str = "__arg";
const LOOP_NAME: &str = "__loop";
const FIELD_NAME: &str = "__field";

pub fn lower_dec(tree: &SyntaxTree, dec: DecId) -> DecRc {
    let node = &tree.decs[dec];
    let span = node.span;
    let kind = match &node.kind {
        DecKind::Val {
            ty_vars,
            rec: false,
            binds,
        } => CDecKind::Val {
            ty_vars: ty_vars.clone(),
            binds: binds
                .iter()
                .map(|vb| (lower_pat(tree, vb.pat), lower_expr(tree, vb.expr)))
                .collect(),
        },
        DecKind::Val {
            ty_vars,
            rec: true,
            binds,
        } => CDecKind::ValRec {
            ty_vars: ty_vars.clone(),
            binds: binds
                .iter()
                .map(|vb| {
                    let name = match &tree.pats[vb.pat].kind {
                        PatKind::Ident { name, .. } => name.name.clone(),
                        // The parser rejects other patterns in `val rec`.
                        _ => unreachable!("non-identifier pattern in val rec"),
                    };
                    let arms = match &tree.exprs[vb.expr].kind {
                        ExprKind::Fn { arms } => lower_match(tree, arms, vb.span),
                        _ => unreachable!("non-lambda right-hand side in val rec"),
                    };
                    (name, arms)
                })
                .collect(),
        },
        DecKind::Fun { ty_vars, binds } => CDecKind::ValRec {
            ty_vars: ty_vars.clone(),
            binds: binds
                .iter()
                .map(|fb| (fb.name.clone(), lower_fun_bind(tree, fb)))
                .collect(),
        },
        DecKind::Type(binds) => CDecKind::Type(
            binds
                .iter()
                .map(|tb| CTypBind {
                    ty_vars: tb.ty_vars.clone(),
                    name: tb.name.clone(),
                    ty: lower_ty(tree, tb.ty),
                })
                .collect(),
        ),
        DecKind::Datatype(binds) => {
            CDecKind::Datatype(binds.iter().map(|db| lower_dat_bind(tree, db)).collect())
        }
        DecKind::Abstype { binds, body } => CDecKind::Abstype {
            binds: binds.iter().map(|db| lower_dat_bind(tree, db)).collect(),
            body: lower_dec(tree, *body),
        },
        DecKind::Exception(binds) => CDecKind::Exception(
            binds
                .iter()
                .map(|eb| match eb {
                    ExBind::New { name, arg, .. } => CExBind::New {
                        name: name.clone(),
                        arg: arg.map(|ty| lower_ty(tree, ty)),
                    },
                    ExBind::Alias { name, target, .. } => CExBind::Alias {
                        name: name.clone(),
                        target: target.clone(),
                    },
                })
                .collect(),
        ),
        DecKind::Local { outer, inner } => CDecKind::Local {
            outer: lower_dec(tree, *outer),
            inner: lower_dec(tree, *inner),
        },
        DecKind::Open(names) => CDecKind::Open(names.clone()),
        DecKind::Seq(decs) => {
            CDecKind::Seq(decs.iter().map(|&d| lower_dec(tree, d)).collect())
        }
        DecKind::Fixity { fixity, ids } => CDecKind::Fixity {
            fixity: *fixity,
            ids: ids.clone(),
        },
        DecKind::Empty => CDecKind::Empty,
    };
    Rc::new(CDec { kind, span })
}

/// `fun f p11 ... p1n = e1 | f p21 ... p2n = e2 | ...` becomes
/// `fn __arg1 => ... => fn __argn => case (__arg1, ..., __argn) of
/// (p11, ..., p1n) => e1 | ...`, collapsing to a plain `fn` match when
/// the arity is one.
fn lower_fun_bind(tree: &SyntaxTree, fb: &FunBind) -> Rc<CMatch> {
    let span = fb.span;
    let arity = fb.clauses[0].pats.len();

    if arity == 1 {
        let arms = fb
            .clauses
            .iter()
            .map(|cl| (lower_pat(tree, cl.pats[0]), lower_clause_body(tree, cl)))
            .collect();
        return Rc::new(CMatch { arms, span });
    }

    let case_arms: Vec<(PatRc, ExprRc)> = fb
        .clauses
        .iter()
        .map(|cl| {
            let rows = cl
                .pats
                .iter()
                .enumerate()
                .map(|(i, &p)| (tuple_label(i), lower_pat(tree, p)))
                .collect();
            let pat = CPat::new(
                CPatKind::Record {
                    rows,
                    flexible: false,
                },
                tree.pats[cl.pats[0]].span,
            );
            (pat, lower_clause_body(tree, cl))
        })
        .collect();

    let scrutinee = CExpr::new(
        CExprKind::Record(
            (0..arity)
                .map(|i| {
                    (
                        tuple_label(i),
                        CExpr::var(format!("{}{}", ARG_PREFIX, i + 1), span),
                    )
                })
                .collect(),
        ),
        span,
    );
    let mut body = CExpr::new(
        CExprKind::App {
            func: CExpr::new(
                CExprKind::Fn(Rc::new(CMatch {
                    arms: case_arms,
                    span,
                })),
                span,
            ),
            arg: scrutinee,
        },
        span,
    );

    // Innermost lambda binds the last argument.
    for i in (1..arity).rev() {
        let pat = CPat::new(
            CPatKind::Var(LongName::plain(format!("{}{}", ARG_PREFIX, i + 1))),
            span,
        );
        body = CExpr::new(
            CExprKind::Fn(Rc::new(CMatch {
                arms: vec![(pat, body)],
                span,
            })),
            span,
        );
    }
    let first = CPat::new(
        CPatKind::Var(LongName::plain(format!("{}1", ARG_PREFIX))),
        span,
    );
    Rc::new(CMatch {
        arms: vec![(first, body)],
        span,
    })
}

fn lower_clause_body(tree: &SyntaxTree, cl: &FunClause) -> ExprRc {
    let body = lower_expr(tree, cl.body);
    match cl.ret_ty {
        Some(ty) => {
            let span = body.span;
            CExpr::new(
                CExprKind::Typed {
                    expr: body,
                    ty: lower_ty(tree, ty),
                },
                span,
            )
        }
        None => body,
    }
}

fn lower_dat_bind(tree: &SyntaxTree, db: &DatBind) -> CDatBind {
    CDatBind {
        ty_vars: db.ty_vars.clone(),
        name: db.name.clone(),
        ctors: db
            .ctors
            .iter()
            .map(|cb| (cb.name.clone(), cb.arg.map(|ty| lower_ty(tree, ty))))
            .collect(),
    }
}

pub fn lower_match(tree: &SyntaxTree, arms: &[MatchArm], span: Span) -> Rc<CMatch> {
    Rc::new(CMatch {
        arms: arms
            .iter()
            .map(|arm| (lower_pat(tree, arm.pat), lower_expr(tree, arm.expr)))
            .collect(),
        span,
    })
}

pub fn lower_expr(tree: &SyntaxTree, expr: ExprId) -> ExprRc {
    let node = &tree.exprs[expr];
    let span = node.span;
    match &node.kind {
        ExprKind::Const(c) => CExpr::new(CExprKind::Const(c.clone()), span),
        ExprKind::Ident { name, .. } => CExpr::new(CExprKind::Var(name.clone()), span),
        ExprKind::Record(rows) => CExpr::new(
            CExprKind::Record(
                rows.iter()
                    .map(|(label, e)| (label.clone(), lower_expr(tree, *e)))
                    .collect(),
            ),
            span,
        ),
        ExprKind::Selector(label) => {
            // `#lab` is `fn {lab = x, ...} => x`.
            let rows = vec![(
                label.clone(),
                CPat::new(CPatKind::Var(LongName::plain(FIELD_NAME)), span),
            )];
            let pat = CPat::new(
                CPatKind::Record {
                    rows,
                    flexible: true,
                },
                span,
            );
            CExpr::new(
                CExprKind::Fn(Rc::new(CMatch {
                    arms: vec![(pat, CExpr::var(FIELD_NAME, span))],
                    span,
                })),
                span,
            )
        }
        ExprKind::Tuple(items) => CExpr::new(
            CExprKind::Record(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, &e)| (tuple_label(i), lower_expr(tree, e)))
                    .collect(),
            ),
            span,
        ),
        ExprKind::List(items) => {
            let mut out = CExpr::var("nil", span);
            for &item in items.iter().rev() {
                let head = lower_expr(tree, item);
                let pair = CExpr::new(
                    CExprKind::Record(vec![
                        (tuple_label(0), head),
                        (tuple_label(1), out),
                    ]),
                    span,
                );
                out = CExpr::new(
                    CExprKind::App {
                        func: CExpr::var("::", span),
                        arg: pair,
                    },
                    span,
                );
            }
            out
        }
        ExprKind::Vector(items) => CExpr::new(
            CExprKind::Vector(items.iter().map(|&e| lower_expr(tree, e)).collect()),
            span,
        ),
        ExprKind::Seq(items) => lower_seq(tree, items, span),
        ExprKind::Let { dec, body } => CExpr::new(
            CExprKind::Let {
                dec: lower_dec(tree, *dec),
                body: lower_seq(tree, body, span),
            },
            span,
        ),
        ExprKind::App { func, arg } => CExpr::new(
            CExprKind::App {
                func: lower_expr(tree, *func),
                arg: lower_expr(tree, *arg),
            },
            span,
        ),
        ExprKind::Typed { expr, ty } => CExpr::new(
            CExprKind::Typed {
                expr: lower_expr(tree, *expr),
                ty: lower_ty(tree, *ty),
            },
            span,
        ),
        ExprKind::Handle { expr, arms } => CExpr::new(
            CExprKind::Handle {
                expr: lower_expr(tree, *expr),
                arms: lower_match(tree, arms, span),
            },
            span,
        ),
        ExprKind::Raise(e) => CExpr::new(CExprKind::Raise(lower_expr(tree, *e)), span),
        ExprKind::Fn { arms } => {
            CExpr::new(CExprKind::Fn(lower_match(tree, arms, span)), span)
        }
        ExprKind::Case { scrutinee, arms } => case_of(
            lower_expr(tree, *scrutinee),
            lower_match(tree, arms, span),
            span,
        ),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => lower_if(
            lower_expr(tree, *cond),
            lower_expr(tree, *then_branch),
            lower_expr(tree, *else_branch),
            span,
        ),
        ExprKind::AndAlso { lhs, rhs } => {
            let false_ = CExpr::var("false", span);
            lower_if(lower_expr(tree, *lhs), lower_expr(tree, *rhs), false_, span)
        }
        ExprKind::OrElse { lhs, rhs } => {
            let true_ = CExpr::var("true", span);
            lower_if(lower_expr(tree, *lhs), true_, lower_expr(tree, *rhs), span)
        }
        ExprKind::While { cond, body } => lower_while(tree, *cond, *body, span),
    }
}

/// `case scrutinee of arms` is `(fn arms) scrutinee`.
fn case_of(scrutinee: ExprRc, arms: Rc<CMatch>, span: Span) -> ExprRc {
    CExpr::new(
        CExprKind::App {
            func: CExpr::new(CExprKind::Fn(arms), span),
            arg: scrutinee,
        },
        span,
    )
}

/// `if c then t else e` is `case c of true => t | false => e`.
fn lower_if(cond: ExprRc, then_branch: ExprRc, else_branch: ExprRc, span: Span) -> ExprRc {
    let arms = Rc::new(CMatch {
        arms: vec![
            (
                CPat::new(CPatKind::Var(LongName::plain("true")), span),
                then_branch,
            ),
            (
                CPat::new(CPatKind::Var(LongName::plain("false")), span),
                else_branch,
            ),
        ],
        span,
    });
    case_of(cond, arms, span)
}

/// `(e1; ...; en)` evaluates left to right and keeps the last value:
/// `case e1 of _ => case e2 of _ => ... => en`.
fn lower_seq(tree: &SyntaxTree, items: &[ExprId], span: Span) -> ExprRc {
    let mut rest = lower_expr(tree, *items.last().expect("sequence never empty"));
    for &item in items[..items.len() - 1].iter().rev() {
        let arms = Rc::new(CMatch {
            arms: vec![(CPat::wildcard(span), rest)],
            span,
        });
        rest = case_of(lower_expr(tree, item), arms, span);
    }
    rest
}

/// `while c do b` becomes
/// `let val rec __loop = fn () => if c then (b; __loop ()) else ()
///  in __loop () end`.
fn lower_while(tree: &SyntaxTree, cond: ExprId, body: ExprId, span: Span) -> ExprRc {
    let call_loop = CExpr::new(
        CExprKind::App {
            func: CExpr::var(LOOP_NAME, span),
            arg: CExpr::unit(span),
        },
        span,
    );
    let body_then_loop = case_of(
        lower_expr(tree, body),
        Rc::new(CMatch {
            arms: vec![(CPat::wildcard(span), call_loop)],
            span,
        }),
        span,
    );
    let loop_body = lower_if(
        lower_expr(tree, cond),
        body_then_loop,
        CExpr::unit(span),
        span,
    );
    let loop_fn = Rc::new(CMatch {
        arms: vec![(CPat::unit(span), loop_body)],
        span,
    });
    let dec = Rc::new(CDec {
        kind: CDecKind::ValRec {
            ty_vars: Vec::new(),
            binds: vec![(SmolStr::new(LOOP_NAME), loop_fn)],
        },
        span,
    });
    CExpr::new(
        CExprKind::Let {
            dec,
            body: CExpr::new(
                CExprKind::App {
                    func: CExpr::var(LOOP_NAME, span),
                    arg: CExpr::unit(span),
                },
                span,
            ),
        },
        span,
    )
}

pub fn lower_pat(tree: &SyntaxTree, pat: PatId) -> PatRc {
    let node = &tree.pats[pat];
    let span = node.span;
    match &node.kind {
        PatKind::Wildcard => CPat::wildcard(span),
        PatKind::Const(c) => CPat::new(CPatKind::Const(c.clone()), span),
        PatKind::Ident { name, .. } => CPat::new(CPatKind::Var(name.clone()), span),
        PatKind::Record { rows, flexible } => CPat::new(
            CPatKind::Record {
                rows: rows
                    .iter()
                    .map(|(label, p)| (label.clone(), lower_pat(tree, *p)))
                    .collect(),
                flexible: *flexible,
            },
            span,
        ),
        PatKind::Tuple(items) => CPat::new(
            CPatKind::Record {
                rows: items
                    .iter()
                    .enumerate()
                    .map(|(i, &p)| (tuple_label(i), lower_pat(tree, p)))
                    .collect(),
                flexible: false,
            },
            span,
        ),
        PatKind::List(items) => {
            let mut out = CPat::new(CPatKind::Var(LongName::plain("nil")), span);
            for &item in items.iter().rev() {
                let pair = CPat::new(
                    CPatKind::Record {
                        rows: vec![
                            (tuple_label(0), lower_pat(tree, item)),
                            (tuple_label(1), out),
                        ],
                        flexible: false,
                    },
                    span,
                );
                out = CPat::new(
                    CPatKind::Con {
                        name: LongName::plain("::"),
                        arg: pair,
                    },
                    span,
                );
            }
            out
        }
        PatKind::Con { name, arg, .. } => CPat::new(
            CPatKind::Con {
                name: name.clone(),
                arg: lower_pat(tree, *arg),
            },
            span,
        ),
        PatKind::Typed { pat, ty } => CPat::new(
            CPatKind::Typed {
                pat: lower_pat(tree, *pat),
                ty: lower_ty(tree, *ty),
            },
            span,
        ),
        PatKind::Layered { var, ty, pat } => CPat::new(
            CPatKind::Layered {
                var: var.clone(),
                ty: ty.map(|t| lower_ty(tree, t)),
                pat: lower_pat(tree, *pat),
            },
            span,
        ),
    }
}

pub fn lower_ty(tree: &SyntaxTree, ty: TyId) -> TyRc {
    let node = &tree.tys[ty];
    let span = node.span;
    let kind = match &node.kind {
        TyExprKind::Var(name) => CTyKind::Var(name.clone()),
        TyExprKind::Record(rows) => CTyKind::Record(
            rows.iter()
                .map(|(label, t)| (label.clone(), lower_ty(tree, *t)))
                .collect(),
        ),
        TyExprKind::Tuple(items) => CTyKind::Record(
            items
                .iter()
                .enumerate()
                .map(|(i, &t)| (tuple_label(i), lower_ty(tree, t)))
                .collect(),
        ),
        TyExprKind::Fun(dom, cod) => {
            CTyKind::Fun(lower_ty(tree, *dom), lower_ty(tree, *cod))
        }
        TyExprKind::Con { name, args } => CTyKind::Con {
            name: name.clone(),
            args: args.iter().map(|&t| lower_ty(tree, t)).collect(),
        },
    };
    Rc::new(CTy { kind, span })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree() -> SyntaxTree {
        SyntaxTree::new()
    }

    fn int(tree: &mut SyntaxTree, value: i64) -> ExprId {
        tree.exprs.alloc(Expr {
            kind: ExprKind::Const(Constant::Int(value)),
            span: Span::SYNTHETIC,
        })
    }

    #[test]
    fn tuple_becomes_numbered_record() {
        let mut t = tree();
        let one = int(&mut t, 1);
        let two = int(&mut t, 2);
        let tuple = t.exprs.alloc(Expr {
            kind: ExprKind::Tuple(vec![one, two]),
            span: Span::SYNTHETIC,
        });
        let core = lower_expr(&t, tuple);
        match &core.kind {
            CExprKind::Record(rows) => {
                let labels: Vec<&str> = rows.iter().map(|(l, _)| l.as_str()).collect();
                assert_eq!(labels, vec!["1", "2"]);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn list_becomes_cons_chain() {
        let mut t = tree();
        let one = int(&mut t, 1);
        let list = t.exprs.alloc(Expr {
            kind: ExprKind::List(vec![one]),
            span: Span::SYNTHETIC,
        });
        let core = lower_expr(&t, list);
        match &core.kind {
            CExprKind::App { func, arg } => {
                assert!(
                    matches!(&func.kind, CExprKind::Var(n) if n.name.as_str() == "::")
                );
                match &arg.kind {
                    CExprKind::Record(rows) => {
                        assert!(matches!(
                            &rows[1].1.kind,
                            CExprKind::Var(n) if n.name.as_str() == "nil"
                        ));
                    }
                    other => panic!("expected pair, got {:?}", other),
                }
            }
            other => panic!("expected cons application, got {:?}", other),
        }
    }

    #[test]
    fn if_becomes_boolean_case() {
        let mut t = tree();
        let cond = t.exprs.alloc(Expr {
            kind: ExprKind::Ident {
                name: LongName::plain("c"),
                op: false,
            },
            span: Span::SYNTHETIC,
        });
        let one = int(&mut t, 1);
        let two = int(&mut t, 2);
        let if_ = t.exprs.alloc(Expr {
            kind: ExprKind::If {
                cond,
                then_branch: one,
                else_branch: two,
            },
            span: Span::SYNTHETIC,
        });
        let core = lower_expr(&t, if_);
        match &core.kind {
            CExprKind::App { func, .. } => match &func.kind {
                CExprKind::Fn(m) => {
                    assert_eq!(m.arms.len(), 2);
                    assert!(matches!(
                        &m.arms[0].0.kind,
                        CPatKind::Var(n) if n.name.as_str() == "true"
                    ));
                }
                other => panic!("expected fn, got {:?}", other),
            },
            other => panic!("expected case application, got {:?}", other),
        }
    }

    #[test]
    fn sequence_preserves_order() {
        let mut t = tree();
        let one = int(&mut t, 1);
        let two = int(&mut t, 2);
        let three = int(&mut t, 3);
        let seq = t.exprs.alloc(Expr {
            kind: ExprKind::Seq(vec![one, two, three]),
            span: Span::SYNTHETIC,
        });
        let core = lower_expr(&t, seq);
        // case 1 of _ => (case 2 of _ => 3): the first evaluated
        // expression is the outermost application argument.
        match &core.kind {
            CExprKind::App { arg, .. } => {
                assert!(matches!(&arg.kind, CExprKind::Const(Constant::Int(1))));
            }
            other => panic!("expected application, got {:?}", other),
        }
    }
}
