use super::*;
use pretty_assertions::assert_eq;

fn session() -> Rc<State> {
    initial_state(&InterpreterOptions::default())
}

/// Runs a chunk that must succeed, advancing the state.
fn ok(state: &mut Rc<State>, source: &str) -> InterpretResult {
    let result = interpret(source, state, &InterpreterOptions::default());
    assert!(
        result.error.is_none(),
        "unexpected error for `{}`: {}",
        source,
        result.error.unwrap()
    );
    assert!(
        !result.evaluation_errored,
        "unexpected uncaught exception for `{}`: {:?}",
        source, result.uncaught
    );
    *state = result.state.clone();
    result
}

/// Runs a chunk that must fail with a hard error; the state is unchanged.
fn err(state: &Rc<State>, source: &str) -> InterpreterError {
    let result = interpret(source, state, &InterpreterOptions::default());
    let error = result.error.expect("expected an error");
    assert!(Rc::ptr_eq(&result.state, state), "state must be unchanged");
    error
}

/// Runs a chunk whose evaluation must end in an uncaught SML exception.
fn uncaught(state: &Rc<State>, source: &str) -> Value {
    let result = interpret(source, state, &InterpreterOptions::default());
    assert!(result.error.is_none(), "error: {:?}", result.error);
    assert!(result.evaluation_errored, "expected an uncaught exception");
    assert!(Rc::ptr_eq(&result.state, state), "state must be unchanged");
    result.uncaught.expect("uncaught exception value")
}

fn dyn_value(state: &Rc<State>, name: &str) -> Value {
    state
        .lookup_dyn(name)
        .unwrap_or_else(|| panic!("`{}` is not bound", name))
}

fn it_value(state: &Rc<State>) -> Value {
    dyn_value(state, "it")
}

fn scheme_string(state: &Rc<State>, name: &str) -> String {
    let (scheme, _) = state
        .lookup_value(name)
        .unwrap_or_else(|| panic!("`{}` has no static binding", name));
    scheme.to_string()
}

fn exn_name(value: &Value) -> &str {
    match value {
        Value::ExnVal { name, .. } => name.as_str(),
        other => panic!("expected an exception value, got {}", other),
    }
}

// ── End-to-end scenarios ────────────────────────────────────────

#[test]
fn arithmetic_binding() {
    let mut state = session();
    ok(&mut state, "val x = 4*7+3;");
    assert_eq!(dyn_value(&state, "x"), Value::Int(31));
    assert_eq!(scheme_string(&state, "x"), "int");
}

#[test]
fn recursive_factorial_and_overflow() {
    let mut state = session();
    ok(
        &mut state,
        "val rec fac = fn n => if n < 1 then 1 else n * fac (n - 1);",
    );
    assert_eq!(scheme_string(&state, "fac"), "int -> int");
    ok(&mut state, "fac 10;");
    assert_eq!(it_value(&state), Value::Int(3628800));
    let exn = uncaught(&state, "fac 14;");
    assert_eq!(exn_name(&exn), "Overflow");
}

#[test]
fn polymorphic_swap() {
    let mut state = session();
    ok(&mut state, "fun swap (x, y) = (y, x);");
    assert_eq!(scheme_string(&state, "swap"), "'a * 'b -> 'b * 'a");
    ok(&mut state, "swap (3, true);");
    assert_eq!(
        it_value(&state),
        Value::pair(Value::Bool(true), Value::Int(3))
    );
}

#[test]
fn tree_datatype_and_size() {
    let mut state = session();
    ok(
        &mut state,
        "datatype 'a tree = Leaf | Node of 'a tree * 'a * 'a tree;",
    );
    ok(
        &mut state,
        "fun size Leaf = 0 | size (Node (l, _, r)) = 1 + size l + size r;",
    );
    ok(&mut state, "size (Node (Leaf, 1, Node (Leaf, 2, Leaf)));");
    assert_eq!(it_value(&state), Value::Int(2));
}

#[test]
fn user_exception_raise_and_handle() {
    let mut state = session();
    ok(&mut state, "exception Bad of int;");
    ok(&mut state, "(raise Bad 7) handle Bad n => n;");
    assert_eq!(it_value(&state), Value::Int(7));
}

#[test]
fn user_infix_operator() {
    let mut state = session();
    ok(&mut state, "infix 5 ++ fun a ++ b = a + b + 1;");
    ok(&mut state, "2 ++ 3 ++ 4;");
    assert_eq!(it_value(&state), Value::Int(11));

    let mut state = session();
    ok(&mut state, "infixr 5 ++ fun a ++ b = a + b + 1;");
    ok(&mut state, "2 ++ 3 ++ 4;");
    assert_eq!(it_value(&state), Value::Int(11));
}

#[test]
fn colliding_associativities_reject_the_chunk() {
    let mut state = session();
    ok(&mut state, "infix 5 ++ infixr 5 **");
    let error = err(&state, "1 ++ 2 ** 3;");
    assert!(matches!(error, InterpreterError::Parser { .. }));
}

// ── Round-trip laws ─────────────────────────────────────────────

#[test]
fn explode_implode_round_trip() {
    let mut state = session();
    ok(&mut state, "implode (explode \"hello\") = \"hello\";");
    assert_eq!(it_value(&state), Value::Bool(true));
}

#[test]
fn rev_round_trip_and_append_length() {
    let mut state = session();
    ok(&mut state, "rev (rev [1, 2, 3]) = [1, 2, 3];");
    assert_eq!(it_value(&state), Value::Bool(true));
    ok(
        &mut state,
        "length ([1, 2] @ [3]) = length [1, 2] + length [3];",
    );
    assert_eq!(it_value(&state), Value::Bool(true));
}

#[test]
fn foldl_foldr_agree_for_addition() {
    let mut state = session();
    ok(
        &mut state,
        "foldl op+ 0 [1, 2, 3] = foldr op+ 0 (rev [1, 2, 3]);",
    );
    assert_eq!(it_value(&state), Value::Bool(true));
}

// ── Static semantics ────────────────────────────────────────────

#[test]
fn let_polymorphism() {
    let mut state = session();
    ok(&mut state, "let val id = fn x => x in (id 1, id true) end;");
    assert_eq!(
        it_value(&state),
        Value::pair(Value::Int(1), Value::Bool(true))
    );
}

#[test]
fn value_restriction_prevents_generalization() {
    let mut state = session();
    ok(&mut state, "val f = (fn x => x) (fn y => y);");
    assert!(
        scheme_string(&state, "f").contains("'_"),
        "expansive binding must stay weak, got {}",
        scheme_string(&state, "f")
    );
    let error = err(&state, "f 1; f true;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::TypeMismatch,
            ..
        }
    ));
}

#[test]
fn equality_type_variables() {
    let mut state = session();
    ok(&mut state, "fun same (x, y) = x = y;");
    let scheme = scheme_string(&state, "same");
    assert!(scheme.contains("''"), "expected equality variable: {}", scheme);

    let error = err(&state, "(fn x => x) = (fn y => y);");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::EqualityRequired,
            ..
        }
    ));
}

#[test]
fn occurs_check() {
    let state = session();
    let error = err(&state, "fn x => x x;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::OccursCheck,
            ..
        }
    ));
}

#[test]
fn unbound_identifier() {
    let state = session();
    let error = err(&state, "val x = mystery;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::UnboundIdentifier,
            ..
        }
    ));
}

#[test]
fn annotation_mismatch() {
    let state = session();
    let error = err(&state, "val x : int = true;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::TypeMismatch,
            ..
        }
    ));
}

#[test]
fn type_constructor_arity() {
    let state = session();
    let error = err(&state, "val x = (nil : int int);");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::ArityMismatch,
            ..
        }
    ));
}

#[test]
fn unguarded_type_variable_in_exception() {
    let state = session();
    let error = err(&state, "exception E of 'a;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::UnguardedTypeVariable,
            ..
        }
    ));
}

#[test]
fn standalone_selector_needs_a_record_type() {
    let state = session();
    let error = err(&state, "val get = #name;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::RecordLabelMismatch,
            ..
        }
    ));
}

#[test]
fn selector_on_a_known_record() {
    let mut state = session();
    ok(&mut state, "val r = {name = 1, flag = true};");
    ok(&mut state, "#name r;");
    assert_eq!(it_value(&state), Value::Int(1));
    let error = err(&state, "#age r;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::RecordLabelMismatch,
            ..
        }
    ));
}

#[test]
fn flexible_record_pattern_with_annotation() {
    let mut state = session();
    ok(
        &mut state,
        "fun getx ({x, ...} : {x : int, y : bool}) = x;",
    );
    ok(&mut state, "getx {x = 4, y = false};");
    assert_eq!(it_value(&state), Value::Int(4));
}

#[test]
fn type_aliases_expand() {
    let mut state = session();
    ok(&mut state, "type point = int * int;");
    ok(&mut state, "val p = (1, 2) : point;");
    assert_eq!(
        dyn_value(&state, "p"),
        Value::pair(Value::Int(1), Value::Int(2))
    );
}

#[test]
fn option_and_order_types() {
    let mut state = session();
    ok(&mut state, "SOME 1;");
    assert_eq!(scheme_string(&state, "it"), "int option");
    ok(&mut state, "LESS;");
    assert_eq!(scheme_string(&state, "it"), "order");
}

// ── Dynamic semantics ───────────────────────────────────────────

#[test]
fn match_exception_for_uncovered_case() {
    let mut state = session();
    let result = interpret("case 1 of 2 => 0;", &state, &InterpreterOptions::default());
    assert!(result.evaluation_errored);
    assert_eq!(exn_name(&result.uncaught.unwrap()), "Match");
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.message.contains("nonexhaustive")),
        "expected a nonexhaustive warning"
    );
    // And the state is untouched: `it` stays unbound.
    ok(&mut state, "val probe = 1;");
    assert!(state.lookup_dyn("it").is_none());
}

#[test]
fn bind_exception_for_failed_val_pattern() {
    let state = session();
    let result = interpret(
        "val SOME x = NONE;",
        &state,
        &InterpreterOptions::default(),
    );
    assert!(result.evaluation_errored);
    assert_eq!(exn_name(&result.uncaught.unwrap()), "Bind");
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("not exhaustive")));
}

#[test]
fn handle_only_catches_matching_exceptions() {
    let state = session();
    let exn = uncaught(&state, "(raise Div) handle Overflow => 1;");
    assert_eq!(exn_name(&exn), "Div");
}

#[test]
fn exception_alias_shares_identity() {
    let mut state = session();
    ok(&mut state, "exception Mine = Div;");
    ok(&mut state, "(1 div 0) handle Mine => 5;");
    assert_eq!(it_value(&state), Value::Int(5));
}

#[test]
fn local_exceptions_are_generative() {
    let mut state = session();
    ok(
        &mut state,
        "fun mk () = let exception E in (fn () => raise E, \
         fn g => ((g (); 0) handle E => 1)) end;",
    );
    ok(&mut state, "val (raise1, catch1) = mk ();");
    ok(&mut state, "val (raise2, catch2) = mk ();");
    ok(&mut state, "catch1 raise1;");
    assert_eq!(it_value(&state), Value::Int(1));
    // A different instantiation's exception slips through.
    let exn = uncaught(&state, "catch1 raise2;");
    assert_eq!(exn_name(&exn), "E");
}

#[test]
fn division_and_chr_exceptions() {
    let state = session();
    assert_eq!(exn_name(&uncaught(&state, "1 div 0;")), "Div");
    assert_eq!(exn_name(&uncaught(&state, "chr 300;")), "Chr");
    assert_eq!(exn_name(&uncaught(&state, "hd nil;")), "Empty");
}

#[test]
fn real_arithmetic_uses_ieee() {
    let mut state = session();
    ok(&mut state, "1.5 + 2.25;");
    assert_eq!(it_value(&state), Value::Real(3.75));
    ok(&mut state, "1.0 / 0.0;");
    assert_eq!(it_value(&state), Value::Real(f64::INFINITY));
    ok(&mut state, "Math.sqrt 2.0 < 1.5;");
    assert_eq!(it_value(&state), Value::Bool(true));
}

#[test]
fn word_arithmetic_wraps() {
    let mut state = session();
    ok(&mut state, "0w3 + 0w4;");
    assert_eq!(it_value(&state), Value::Word(7));
    ok(&mut state, "0w0 - 0w1;");
    assert_eq!(it_value(&state), Value::Word(1073741823));
}

#[test]
fn integer_division_rounds_toward_negative_infinity() {
    let mut state = session();
    ok(&mut state, "~7 div 2;");
    assert_eq!(it_value(&state), Value::Int(-4));
    ok(&mut state, "~7 mod 2;");
    assert_eq!(it_value(&state), Value::Int(1));
}

#[test]
fn while_loop_terminates_and_yields_unit() {
    let mut state = session();
    ok(&mut state, "while false do ();");
    assert_eq!(it_value(&state), Value::unit());
}

#[test]
fn sequencing_keeps_the_last_value() {
    let mut state = session();
    ok(&mut state, "(1; 2; 3);");
    assert_eq!(it_value(&state), Value::Int(3));
}

#[test]
fn string_escapes_flow_through() {
    let mut state = session();
    ok(&mut state, "size \"a\\nb\";");
    assert_eq!(it_value(&state), Value::Int(3));
}

// ── Scoping and state ───────────────────────────────────────────

#[test]
fn state_monotonicity_across_chunks() {
    let mut state = session();
    ok(&mut state, "val x = 1;");
    ok(&mut state, "val y = x + 1;");
    assert_eq!(dyn_value(&state, "x"), Value::Int(1));
    assert_eq!(dyn_value(&state, "y"), Value::Int(2));
    ok(&mut state, "val x = 10;");
    assert_eq!(dyn_value(&state, "x"), Value::Int(10));
}

#[test]
fn local_helpers_stay_hidden_but_captured() {
    let mut state = session();
    ok(
        &mut state,
        "local fun helper x = x + 1 in fun g y = helper y end;",
    );
    ok(&mut state, "g 5;");
    assert_eq!(it_value(&state), Value::Int(6));
    let error = err(&state, "helper 1;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::UnboundIdentifier,
            ..
        }
    ));
}

#[test]
fn abstype_hides_its_constructors() {
    let mut state = session();
    ok(
        &mut state,
        "abstype t = T of int with fun mk x = T x fun un (T x) = x end;",
    );
    ok(&mut state, "un (mk 3);");
    assert_eq!(it_value(&state), Value::Int(3));
    let error = err(&state, "T 1;");
    assert!(matches!(
        error,
        InterpreterError::Elaboration {
            kind: ElabErrorKind::UnboundIdentifier,
            ..
        }
    ));
}

#[test]
fn qualified_names_and_open() {
    let mut state = session();
    ok(&mut state, "Math.sqrt 4.0;");
    assert_eq!(it_value(&state), Value::Real(2.0));
    ok(&mut state, "open Math;");
    ok(&mut state, "sqrt 9.0;");
    assert_eq!(it_value(&state), Value::Real(3.0));
}

#[test]
fn fixity_persists_across_chunks() {
    let mut state = session();
    ok(&mut state, "infix 6 <+> fun a <+> b = a + b;");
    ok(&mut state, "1 <+> 2;");
    assert_eq!(it_value(&state), Value::Int(3));
}

#[test]
fn rebind_protection() {
    let state = session();
    for source in [
        "val true = false;",
        "val nil = 3;",
        "datatype t = nil;",
        "exception ref;",
        "fun op :: (x, y) = x;",
    ] {
        let error = err(&state, source);
        assert!(
            matches!(error, InterpreterError::Evaluation { .. }),
            "`{}` should hit rebind protection, got {:?}",
            source,
            error
        );
    }
}

#[test]
fn lax_mode_downgrades_rebind_protection() {
    let state = session();
    let options = InterpreterOptions {
        strict_mode: false,
        ..InterpreterOptions::default()
    };
    let result = interpret("datatype t = nil;", &state, &options);
    assert!(result.error.is_none());
    assert!(result
        .warnings
        .iter()
        .any(|w| w.message.contains("rebinding")));
}

#[test]
fn step_limit_stops_divergence() {
    let state = session();
    let options = InterpreterOptions {
        step_limit: Some(10_000),
        ..InterpreterOptions::default()
    };
    let result = interpret(
        "val rec loop = fn x => loop x; loop 0;",
        &state,
        &options,
    );
    match result.error {
        Some(InterpreterError::Evaluation { message, .. }) => {
            assert!(message.contains("step limit"));
        }
        other => panic!("expected a step-limit error, got {:?}", other),
    }
}

#[test]
fn incomplete_input_is_distinguished() {
    let state = session();
    let error = err(&state, "val s = \"oops");
    assert!(matches!(error, InterpreterError::Incomplete { .. }));
    let error = err(&state, "(* never closed");
    assert!(matches!(error, InterpreterError::Incomplete { .. }));
}

#[test]
fn withtype_is_reported_as_a_disabled_feature() {
    let state = session();
    let error = err(&state, "datatype t = T of int withtype u = int;");
    assert!(matches!(error, InterpreterError::FeatureDisabled { .. }));
}

#[test]
fn vectors_are_gated_by_an_option() {
    let state = session();
    let error = err(&state, "#[1, 2];");
    assert!(matches!(error, InterpreterError::FeatureDisabled { .. }));

    let options = InterpreterOptions {
        allow_vector: true,
        ..InterpreterOptions::default()
    };
    let result = interpret("#[1, 2];", &state, &options);
    assert!(result.error.is_none());
    assert_eq!(
        result.state.lookup_dyn("it"),
        Some(Value::Vector(vec![Value::Int(1), Value::Int(2)]))
    );
}

#[test]
fn bindings_report() {
    let mut state = session();
    let before = state.id;
    ok(&mut state, "val x = 4*7+3; fun inc n = n + 1;");
    let report = state.bindings_since(before);
    assert!(report.contains("val x = 31 : int"), "report: {}", report);
    assert!(
        report.contains("val inc = fn : int -> int"),
        "report: {}",
        report
    );
}

#[test]
fn shadowing_builtins_in_a_new_chunk_is_allowed() {
    let mut state = session();
    ok(&mut state, "fun size nil = 0 | size (_ :: xs) = 1 + size xs;");
    ok(&mut state, "size [1, 2, 3];");
    assert_eq!(it_value(&state), Value::Int(3));
}
