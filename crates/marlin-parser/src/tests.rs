use super::*;
use marlin_lexer::{lex, LexerOptions};
use pretty_assertions::assert_eq;

/// The fixity table every Marlin session starts with.
fn std_fixity() -> FixityTable {
    let mut table = FixityTable::new();
    for name in ["*", "/", "div", "mod"] {
        table.declare(name.into(), Some(Fixity::left(7)));
    }
    for name in ["+", "-", "^"] {
        table.declare(name.into(), Some(Fixity::left(6)));
    }
    for name in ["::", "@"] {
        table.declare(name.into(), Some(Fixity::right(5)));
    }
    for name in ["=", "<>", "<", "<=", ">", ">="] {
        table.declare(name.into(), Some(Fixity::left(4)));
    }
    for name in [":=", "o"] {
        table.declare(name.into(), Some(Fixity::left(3)));
    }
    table.declare("before".into(), Some(Fixity::left(0)));
    table
}

fn parse_src(source: &str) -> Parsed {
    try_parse(source).expect("unexpected parse error")
}

fn try_parse(source: &str) -> Result<Parsed> {
    let tokens = lex(source, &LexerOptions::default()).expect("lex error");
    parse(&tokens, &std_fixity(), &ParserOptions::default())
}

fn parse_err(source: &str) -> ParseError {
    try_parse(source).expect_err("expected a parse error")
}

/// Follows `val <name> = <expr>` shape and returns the bound expression.
fn single_val_expr(parsed: &Parsed) -> ExprId {
    assert_eq!(parsed.decs.len(), 1);
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Val { binds, .. } => binds[0].expr,
        other => panic!("expected val, got {:?}", other),
    }
}

fn ident_name(tree: &SyntaxTree, expr: ExprId) -> &str {
    match &tree.exprs[expr].kind {
        ExprKind::Ident { name, .. } => name.name.as_str(),
        other => panic!("expected identifier, got {:?}", other),
    }
}

/// Unpacks `op (lhs, rhs)` built by infix resolution.
fn infix_parts(tree: &SyntaxTree, expr: ExprId) -> (&str, ExprId, ExprId) {
    match &tree.exprs[expr].kind {
        ExprKind::App { func, arg } => match &tree.exprs[*arg].kind {
            ExprKind::Tuple(items) if items.len() == 2 => {
                (ident_name(tree, *func), items[0], items[1])
            }
            other => panic!("expected pair argument, got {:?}", other),
        },
        other => panic!("expected application, got {:?}", other),
    }
}

// ── Expressions and fixity ──────────────────────────────────────

#[test]
fn application_binds_tighter_than_infix() {
    let parsed = parse_src("val x = f 1 + g 2");
    let expr = single_val_expr(&parsed);
    let (op, lhs, rhs) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "+");
    assert!(matches!(parsed.tree.exprs[lhs].kind, ExprKind::App { .. }));
    assert!(matches!(parsed.tree.exprs[rhs].kind, ExprKind::App { .. }));
}

#[test]
fn left_associative_operators_fold_left() {
    let parsed = parse_src("val x = 1 - 2 - 3");
    let expr = single_val_expr(&parsed);
    let (op, lhs, _) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "-");
    let (inner_op, _, _) = infix_parts(&parsed.tree, lhs);
    assert_eq!(inner_op, "-");
}

#[test]
fn right_associative_operators_fold_right() {
    let parsed = parse_src("val x = 1 :: 2 :: nil");
    let expr = single_val_expr(&parsed);
    let (op, _, rhs) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "::");
    let (inner_op, _, _) = infix_parts(&parsed.tree, rhs);
    assert_eq!(inner_op, "::");
}

#[test]
fn precedence_orders_the_fold() {
    let parsed = parse_src("val x = 1 + 2 * 3");
    let expr = single_val_expr(&parsed);
    let (op, _, rhs) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "+");
    let (inner_op, _, _) = infix_parts(&parsed.tree, rhs);
    assert_eq!(inner_op, "*");
}

#[test]
fn colliding_associativities_are_rejected() {
    let err = parse_err("infix 5 ++ infixr 5 ** val x = 1 ++ 2 ** 3");
    assert!(err.message.contains("colliding associativities"));
}

#[test]
fn user_fixity_applies_to_later_source() {
    let parsed = parse_src("infix 5 ++ val x = 2 ++ 3 ++ 4");
    assert_eq!(parsed.decs.len(), 2);
    match &parsed.tree.decs[parsed.decs[1]].kind {
        DecKind::Val { binds, .. } => {
            let (op, lhs, _) = infix_parts(&parsed.tree, binds[0].expr);
            assert_eq!(op, "++");
            let (inner, _, _) = infix_parts(&parsed.tree, lhs);
            assert_eq!(inner, "++");
        }
        other => panic!("expected val, got {:?}", other),
    }
}

#[test]
fn nonfix_inside_let_is_restored_on_exit() {
    // Inside the let `+` is prefix, so `+ (1, 2)` is an application;
    // outside it is infix again.
    let parsed = parse_src("val a = let nonfix + in + (1, 2) end + 3");
    let expr = single_val_expr(&parsed);
    let (op, lhs, _) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "+");
    assert!(matches!(parsed.tree.exprs[lhs].kind, ExprKind::Let { .. }));
}

#[test]
fn op_prefix_suppresses_infix_status() {
    let parsed = parse_src("val x = op+ (1, 2)");
    let expr = single_val_expr(&parsed);
    match &parsed.tree.exprs[expr].kind {
        ExprKind::App { func, .. } => {
            assert!(matches!(
                &parsed.tree.exprs[*func].kind,
                ExprKind::Ident { op: true, name } if name.name.as_str() == "+"
            ));
        }
        other => panic!("expected application, got {:?}", other),
    }
}

#[test]
fn equals_is_an_operator_in_expressions() {
    let parsed = parse_src("val x = 1 = 2");
    let expr = single_val_expr(&parsed);
    let (op, _, _) = infix_parts(&parsed.tree, expr);
    assert_eq!(op, "=");
}

#[test]
fn handle_orelse_andalso_typed_layering() {
    let parsed = parse_src("val x = a andalso b orelse c");
    let expr = single_val_expr(&parsed);
    assert!(matches!(
        parsed.tree.exprs[expr].kind,
        ExprKind::OrElse { .. }
    ));

    let parsed = parse_src("val x = (f y) handle Bad => 0");
    let expr = single_val_expr(&parsed);
    assert!(matches!(
        parsed.tree.exprs[expr].kind,
        ExprKind::Handle { .. }
    ));
}

#[test]
fn sequence_and_tuple_and_unit() {
    let parsed = parse_src("val x = (1; 2; 3)");
    let expr = single_val_expr(&parsed);
    assert!(
        matches!(&parsed.tree.exprs[expr].kind, ExprKind::Seq(items) if items.len() == 3)
    );

    let parsed = parse_src("val x = (1, 2)");
    let expr = single_val_expr(&parsed);
    assert!(
        matches!(&parsed.tree.exprs[expr].kind, ExprKind::Tuple(items) if items.len() == 2)
    );

    let parsed = parse_src("val x = ()");
    let expr = single_val_expr(&parsed);
    assert!(
        matches!(&parsed.tree.exprs[expr].kind, ExprKind::Tuple(items) if items.is_empty())
    );
}

#[test]
fn trailing_semicolon_in_sequence_is_an_error() {
    let err = parse_err("val x = (1; 2;)");
    assert!(err.message.contains("expected an expression"));
}

#[test]
fn selector_and_record() {
    let parsed = parse_src("val x = #name {name = 1}");
    let expr = single_val_expr(&parsed);
    match &parsed.tree.exprs[expr].kind {
        ExprKind::App { func, arg } => {
            assert!(matches!(
                &parsed.tree.exprs[*func].kind,
                ExprKind::Selector(label) if label.as_str() == "name"
            ));
            assert!(matches!(&parsed.tree.exprs[*arg].kind, ExprKind::Record(_)));
        }
        other => panic!("expected application, got {:?}", other),
    }
}

#[test]
fn numeric_record_labels_reject_leading_zero() {
    assert!(parse_err("val x = {0 = 1}").message.contains("label"));
    assert!(parse_err("val x = {01 = 1}").message.contains("label"));
    let parsed = parse_src("val x = {1 = true, 2 = false}");
    let expr = single_val_expr(&parsed);
    assert!(matches!(&parsed.tree.exprs[expr].kind, ExprKind::Record(_)));
}

#[test]
fn equals_is_not_a_record_label() {
    assert!(parse_err("val x = {= = 1}").message.contains("label"));
}

#[test]
fn top_level_expression_binds_it() {
    let parsed = parse_src("1 + 2;");
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Val { binds, .. } => {
            assert!(matches!(
                &parsed.tree.pats[binds[0].pat].kind,
                PatKind::Ident { name, .. } if name.name.as_str() == "it"
            ));
        }
        other => panic!("expected val it, got {:?}", other),
    }
}

// ── Patterns ────────────────────────────────────────────────────

#[test]
fn cons_pattern_resolves_with_fixity() {
    let parsed = parse_src("val (x :: xs) = ys");
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Val { binds, .. } => match &parsed.tree.pats[binds[0].pat].kind {
            PatKind::Con { name, arg, .. } => {
                assert_eq!(name.name.as_str(), "::");
                assert!(matches!(
                    &parsed.tree.pats[*arg].kind,
                    PatKind::Tuple(items) if items.len() == 2
                ));
            }
            other => panic!("expected cons pattern, got {:?}", other),
        },
        other => panic!("expected val, got {:?}", other),
    }
}

#[test]
fn flexible_record_pattern_and_punning() {
    let parsed = parse_src("val {name, age = a, ...} = person");
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Val { binds, .. } => match &parsed.tree.pats[binds[0].pat].kind {
            PatKind::Record { rows, flexible } => {
                assert!(*flexible);
                assert_eq!(rows.len(), 2);
                assert!(matches!(
                    &parsed.tree.pats[rows[0].1].kind,
                    PatKind::Ident { name, .. } if name.name.as_str() == "name"
                ));
            }
            other => panic!("expected record pattern, got {:?}", other),
        },
        other => panic!("expected val, got {:?}", other),
    }
}

#[test]
fn layered_pattern() {
    let parsed = parse_src("val (all as (x, y)) = p");
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Val { binds, .. } => {
            assert!(matches!(
                &parsed.tree.pats[binds[0].pat].kind,
                PatKind::Layered { var, .. } if var.as_str() == "all"
            ));
        }
        other => panic!("expected val, got {:?}", other),
    }
}

// ── Declarations ────────────────────────────────────────────────

#[test]
fn fun_clauses_must_agree() {
    let err = parse_err("fun f 0 = 0 | f 1 2 = 1");
    assert!(err.message.contains("arguments"));
    let err = parse_err("fun f 0 = 0 | g 1 = 1");
    assert!(err.message.contains("clause names differ"));
}

#[test]
fn infix_fun_clause_head() {
    let parsed = parse_src("infix 5 ++ fun a ++ b = 1");
    match &parsed.tree.decs[parsed.decs[1]].kind {
        DecKind::Fun { binds, .. } => {
            assert_eq!(binds[0].name.as_str(), "++");
            assert_eq!(binds[0].clauses[0].pats.len(), 1);
            assert!(matches!(
                &parsed.tree.pats[binds[0].clauses[0].pats[0]].kind,
                PatKind::Tuple(items) if items.len() == 2
            ));
        }
        other => panic!("expected fun, got {:?}", other),
    }
}

#[test]
fn val_rec_requires_a_lambda() {
    let err = parse_err("val rec f = 3");
    assert!(err.message.contains("fn"));
    assert!(try_parse("val rec f = fn x => x").is_ok());
}

#[test]
fn withtype_is_a_disabled_feature() {
    let err = parse_err("datatype t = T of int withtype u = int");
    assert_eq!(err.kind, ParseErrorKind::FeatureDisabled);
}

#[test]
fn fixity_precedence_literal_rules() {
    assert!(parse_err("infix 10 f").message.contains("single digit"));
    assert!(parse_err("infix ~1 f").message.contains("negative"));
    assert!(parse_err("infix 'a").message.contains("type variables"));
    assert!(try_parse("infix 9 f").is_ok());
    assert!(try_parse("infix f").is_ok());
}

#[test]
fn datatype_and_exception_declarations() {
    let parsed = parse_src("datatype 'a tree = Leaf | Node of 'a tree * 'a * 'a tree");
    match &parsed.tree.decs[parsed.decs[0]].kind {
        DecKind::Datatype(binds) => {
            assert_eq!(binds[0].name.as_str(), "tree");
            assert_eq!(binds[0].ty_vars, vec![SmolStr::new("'a")]);
            assert_eq!(binds[0].ctors.len(), 2);
            assert!(binds[0].ctors[0].arg.is_none());
            assert!(binds[0].ctors[1].arg.is_some());
        }
        other => panic!("expected datatype, got {:?}", other),
    }

    let parsed = parse_src("exception Bad of int and Worse exception Alias = Bad");
    assert_eq!(parsed.decs.len(), 2);
}

#[test]
fn local_and_open() {
    let parsed = parse_src("local val x = 1 in val y = x end");
    assert!(matches!(
        parsed.tree.decs[parsed.decs[0]].kind,
        DecKind::Local { .. }
    ));

    let parsed = parse_src("open Math");
    assert!(matches!(
        parsed.tree.decs[parsed.decs[0]].kind,
        DecKind::Open(_)
    ));
}

// ── Types ───────────────────────────────────────────────────────

#[test]
fn type_expressions() {
    let parsed = parse_src("val x = (nil : int list)");
    let expr = single_val_expr(&parsed);
    match &parsed.tree.exprs[expr].kind {
        ExprKind::Typed { ty, .. } => match &parsed.tree.tys[*ty].kind {
            TyExprKind::Con { name, args } => {
                assert_eq!(name.name.as_str(), "list");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected list type, got {:?}", other),
        },
        other => panic!("expected typed expression, got {:?}", other),
    }
}

#[test]
fn function_types_are_right_associative() {
    let parsed = parse_src("val f = (g : int -> int -> int)");
    let expr = single_val_expr(&parsed);
    match &parsed.tree.exprs[expr].kind {
        ExprKind::Typed { ty, .. } => match &parsed.tree.tys[*ty].kind {
            TyExprKind::Fun(_, cod) => {
                assert!(matches!(parsed.tree.tys[*cod].kind, TyExprKind::Fun(_, _)));
            }
            other => panic!("expected function type, got {:?}", other),
        },
        other => panic!("expected typed expression, got {:?}", other),
    }
}

#[test]
fn tuple_types_and_multi_arg_constructors() {
    let parsed = parse_src("val x = (y : int * bool)");
    let expr = single_val_expr(&parsed);
    match &parsed.tree.exprs[expr].kind {
        ExprKind::Typed { ty, .. } => {
            assert!(matches!(
                &parsed.tree.tys[*ty].kind,
                TyExprKind::Tuple(items) if items.len() == 2
            ));
        }
        other => panic!("expected typed expression, got {:?}", other),
    }

    assert!(try_parse("type ('a, 'b) pair = 'a * 'b").is_ok());
    let err = parse_err("val x = (y : (int, bool))");
    assert!(err.message.contains("type constructor"));
}

#[test]
fn vector_literals_are_gated() {
    let err = parse_err("val v = #[1, 2]");
    assert_eq!(err.kind, ParseErrorKind::FeatureDisabled);

    let tokens = lex("val v = #[1, 2]", &LexerOptions::default()).unwrap();
    let parsed = parse(
        &tokens,
        &std_fixity(),
        &ParserOptions { allow_vector: true },
    )
    .unwrap();
    let expr = single_val_expr(&parsed);
    assert!(matches!(
        &parsed.tree.exprs[expr].kind,
        ExprKind::Vector(items) if items.len() == 2
    ));
}
