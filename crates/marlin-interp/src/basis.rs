//! The initial basis: built-in types, constructors, exceptions, the
//! standard fixity table, host-implemented operators, and a small
//! interpreted prelude.

use crate::state::{IdStatus, State};
use crate::types::{Scheme, Ty, TypeDef};
use crate::value::{PredefinedFn, Value};
use crate::InterpreterOptions;
use marlin_ast::fixity::Fixity;
use marlin_lexer::{MAXINT, MININT};
use smol_str::SmolStr;
use std::rc::Rc;

/// List helpers and other functions that are ordinary SML code.
const PRELUDE_SOURCE: &str = include_str!("prelude.sml");

/// Builds the primordial environment. The result is the parent of every
/// state the interpreter will ever hand out.
pub fn initial_state(options: &InterpreterOptions) -> Rc<State> {
    let root = State::root();

    register_types(&root);
    register_constructors(&root);
    register_exceptions(&root);
    register_fixity(&root);
    register_operators(&root);

    for name in ["true", "false", "nil", "::", "ref"] {
        root.protect(name.into());
    }

    let mut prelude_options = options.clone();
    prelude_options.disable_elaboration = false;
    prelude_options.disable_evaluation = false;
    let result = crate::interpret(PRELUDE_SOURCE, &root, &prelude_options);
    debug_assert!(
        result.error.is_none() && !result.evaluation_errored,
        "prelude must interpret cleanly: {:?}",
        result.error
    );
    result.state
}

/// Gives the state a `print : string -> unit` that writes through `sink`.
pub fn register_print(state: &Rc<State>, sink: Rc<dyn Fn(&str)>) {
    state.define_value(
        "print".into(),
        Scheme::mono(Ty::fun(Ty::string(), Ty::unit())),
        IdStatus::Value,
    );
    state.define_dyn(
        "print".into(),
        Value::Predefined(PredefinedFn {
            name: "print".into(),
            f: Rc::new(move |value| {
                match value {
                    Value::Str(s) => sink(&s),
                    other => sink(&other.to_string()),
                }
                Ok(Value::unit())
            }),
        }),
    );
}

// ── Types ────────────────────────────────────────────────────────

fn register_types(root: &Rc<State>) {
    let eq_prims = ["int", "word", "char", "string", "real"];
    for name in eq_prims {
        root.define_type(
            name.into(),
            TypeDef::Abstract {
                arity: 0,
                equality: true,
            },
        );
    }
    root.define_type(
        "exn".into(),
        TypeDef::Abstract {
            arity: 0,
            equality: false,
        },
    );
    root.define_type(
        "vector".into(),
        TypeDef::Abstract {
            arity: 1,
            equality: true,
        },
    );
    root.define_type(
        "unit".into(),
        TypeDef::Alias {
            ty_vars: Vec::new(),
            ty: Ty::unit(),
        },
    );
}

// ── Datatypes and constructors ───────────────────────────────────

fn datatype(
    root: &Rc<State>,
    name: &str,
    arity: usize,
    constructors: &[&str],
) {
    root.define_type(
        name.into(),
        TypeDef::Datatype {
            arity,
            constructors: constructors.iter().map(|c| SmolStr::new(c)).collect(),
            equality: true,
        },
    );
    root.define_dyn_type(
        name.into(),
        constructors.iter().map(|c| SmolStr::new(c)).collect(),
    );
}

fn nullary_ctor(root: &Rc<State>, name: &str, scheme: Scheme) -> Value {
    let id = root.fresh_ctor_id();
    let value = Value::ConVal {
        name: name.into(),
        arg: None,
        id,
    };
    root.define_value(name.into(), scheme, IdStatus::Constructor { has_arg: false });
    root.define_dyn(name.into(), value.clone());
    value
}

fn unary_ctor(root: &Rc<State>, name: &str, scheme: Scheme) {
    let id = root.fresh_ctor_id();
    root.define_value(name.into(), scheme, IdStatus::Constructor { has_arg: true });
    root.define_dyn(name.into(), Value::Con { name: name.into(), id });
}

fn register_constructors(root: &Rc<State>) {
    // bool is a datatype whose values are the primitive booleans.
    datatype(root, "bool", 0, &["true", "false"]);
    for (name, value) in [("true", true), ("false", false)] {
        root.define_value(
            name.into(),
            Scheme::mono(Ty::bool()),
            IdStatus::Constructor { has_arg: false },
        );
        root.define_dyn(name.into(), Value::Bool(value));
    }

    datatype(root, "list", 1, &["nil", "::"]);
    let elem = || Ty::Var(SmolStr::new("'a"));
    nullary_ctor(
        root,
        "nil",
        Scheme {
            quantified: vec!["'a".into()],
            ty: Ty::list(elem()),
        },
    );
    unary_ctor(
        root,
        "::",
        Scheme {
            quantified: vec!["'a".into()],
            ty: Ty::fun(Ty::pair(elem(), Ty::list(elem())), Ty::list(elem())),
        },
    );

    datatype(root, "option", 1, &["NONE", "SOME"]);
    let option = |t: Ty| Ty::Con {
        name: "option".into(),
        args: vec![t],
    };
    nullary_ctor(
        root,
        "NONE",
        Scheme {
            quantified: vec!["'a".into()],
            ty: option(elem()),
        },
    );
    unary_ctor(
        root,
        "SOME",
        Scheme {
            quantified: vec!["'a".into()],
            ty: Ty::fun(elem(), option(elem())),
        },
    );

    datatype(root, "order", 0, &["LESS", "EQUAL", "GREATER"]);
    for name in ["LESS", "EQUAL", "GREATER"] {
        nullary_ctor(root, name, Scheme::mono(Ty::con0("order")));
    }

    datatype(root, "ref", 1, &["ref"]);
    let ref_ty = |t: Ty| Ty::Con {
        name: "ref".into(),
        args: vec![t],
    };
    unary_ctor(
        root,
        "ref",
        Scheme {
            quantified: vec!["'a".into()],
            ty: Ty::fun(elem(), ref_ty(elem())),
        },
    );
}

// ── Exceptions ───────────────────────────────────────────────────

fn register_exceptions(root: &Rc<State>) {
    for name in [
        "Bind",
        "Match",
        "Div",
        "Overflow",
        "Chr",
        "Size",
        "Subscript",
        "Empty",
        "Domain",
    ] {
        let id = root.fresh_ctor_id();
        root.define_value(
            name.into(),
            Scheme::mono(Ty::exn()),
            IdStatus::Exception { has_arg: false },
        );
        root.define_dyn(
            name.into(),
            Value::ExnVal {
                name: name.into(),
                arg: None,
                id,
            },
        );
    }
    let id = root.fresh_ctor_id();
    root.define_value(
        "Fail".into(),
        Scheme::mono(Ty::fun(Ty::string(), Ty::exn())),
        IdStatus::Exception { has_arg: true },
    );
    root.define_dyn(
        "Fail".into(),
        Value::ExnCon {
            name: "Fail".into(),
            id,
        },
    );
}

fn builtin_exn(root: &Rc<State>, name: &str) -> Value {
    root.lookup_dyn(name).expect("registered above")
}

// ── Fixity ───────────────────────────────────────────────────────

fn register_fixity(root: &Rc<State>) {
    for name in ["*", "/", "div", "mod"] {
        root.declare_fixity(name.into(), Some(Fixity::left(7)));
    }
    for name in ["+", "-", "^"] {
        root.declare_fixity(name.into(), Some(Fixity::left(6)));
    }
    for name in ["::", "@"] {
        root.declare_fixity(name.into(), Some(Fixity::right(5)));
    }
    for name in ["=", "<>", "<", "<=", ">", ">="] {
        root.declare_fixity(name.into(), Some(Fixity::left(4)));
    }
    for name in ["o", ":="] {
        root.declare_fixity(name.into(), Some(Fixity::left(3)));
    }
    root.declare_fixity("before".into(), Some(Fixity::left(0)));
}

// ── Operators and functions ──────────────────────────────────────

/// Registers a host-implemented function with the given type. The
/// callback either returns a value or an exception value to raise; this
/// is also the hook embedders use to extend the environment.
pub fn register_function(
    root: &Rc<State>,
    name: &str,
    scheme: Scheme,
    f: impl Fn(Value) -> Result<Value, Value> + 'static,
) {
    root.define_value(name.into(), scheme, IdStatus::Value);
    root.define_dyn(
        name.into(),
        Value::Predefined(PredefinedFn {
            name: name.into(),
            f: Rc::new(f),
        }),
    );
}

use self::register_function as predefined;

fn binop_scheme(var_name: &str, result_is_operand: bool) -> Scheme {
    let var = Ty::Var(var_name.into());
    let result = if result_is_operand {
        var.clone()
    } else {
        Ty::bool()
    };
    Scheme {
        quantified: vec![var_name.into()],
        ty: Ty::fun(Ty::pair(var.clone(), var), result),
    }
}

/// Division and remainder round toward negative infinity.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    a - floor_div(a, b) * b
}

const WORD_MODULUS: i64 = MAXINT + 1;

fn checked_int(value: i64, overflow: &Value) -> Result<Value, Value> {
    if (MININT..=MAXINT).contains(&value) {
        Ok(Value::Int(value))
    } else {
        Err(overflow.clone())
    }
}

fn internal_fail(root: &Rc<State>, what: &str) -> Value {
    match root.lookup_dyn("Fail") {
        Some(Value::ExnCon { name, id }) => Value::ExnVal {
            name,
            arg: Some(Box::new(Value::Str(format!("internal: {}", what)))),
            id,
        },
        _ => Value::ExnVal {
            name: "Fail".into(),
            arg: Some(Box::new(Value::Str(format!("internal: {}", what)))),
            id: u64::MAX,
        },
    }
}

fn register_operators(root: &Rc<State>) {
    let overflow = builtin_exn(root, "Overflow");
    let div_exn = builtin_exn(root, "Div");
    let chr_exn = builtin_exn(root, "Chr");
    let domain_exn = builtin_exn(root, "Domain");

    // `+ - *` over int, word, and real.
    macro_rules! num_binop {
        ($name:literal, $int:expr, $real:expr) => {{
            let overflow = overflow.clone();
            let bad = internal_fail(root, "arithmetic on non-numbers");
            predefined(
                root,
                $name,
                binop_scheme("'#num", true),
                move |arg: Value| {
                    let (a, b) = match arg.as_pair() {
                        Some(pair) => pair,
                        None => return Err(bad.clone()),
                    };
                    match (a, b) {
                        (Value::Int(x), Value::Int(y)) => match $int(*x, *y) {
                            Some(v) => checked_int(v, &overflow),
                            None => Err(overflow.clone()),
                        },
                        (Value::Word(x), Value::Word(y)) => match $int(*x, *y) {
                            Some(v) => Ok(Value::Word(v.rem_euclid(WORD_MODULUS))),
                            None => Err(overflow.clone()),
                        },
                        (Value::Real(x), Value::Real(y)) => {
                            Ok(Value::Real($real(*x, *y)))
                        }
                        _ => Err(bad.clone()),
                    }
                },
            );
        }};
    }

    num_binop!("+", |x: i64, y: i64| x.checked_add(y), |x: f64, y: f64| x + y);
    num_binop!("-", |x: i64, y: i64| x.checked_sub(y), |x: f64, y: f64| x - y);
    num_binop!("*", |x: i64, y: i64| x.checked_mul(y), |x: f64, y: f64| x * y);

    // `div` and `mod` over int and word, raising Div on zero.
    macro_rules! int_divop {
        ($name:literal, $op:expr) => {{
            let overflow = overflow.clone();
            let div_exn = div_exn.clone();
            let bad = internal_fail(root, "div on non-integers");
            predefined(
                root,
                $name,
                binop_scheme("'#wordint", true),
                move |arg: Value| {
                    let (a, b) = match arg.as_pair() {
                        Some(pair) => pair,
                        None => return Err(bad.clone()),
                    };
                    match (a, b) {
                        (Value::Int(x), Value::Int(y)) => {
                            if *y == 0 {
                                Err(div_exn.clone())
                            } else {
                                checked_int($op(*x, *y), &overflow)
                            }
                        }
                        (Value::Word(x), Value::Word(y)) => {
                            if *y == 0 {
                                Err(div_exn.clone())
                            } else {
                                Ok(Value::Word($op(*x, *y)))
                            }
                        }
                        _ => Err(bad.clone()),
                    }
                },
            );
        }};
    }

    int_divop!("div", floor_div);
    int_divop!("mod", floor_mod);

    {
        let bad = internal_fail(root, "real division on non-reals");
        predefined(
            root,
            "/",
            Scheme::mono(Ty::fun(Ty::pair(Ty::real(), Ty::real()), Ty::real())),
            move |arg| match arg.as_pair() {
                Some((Value::Real(x), Value::Real(y))) => Ok(Value::Real(x / y)),
                _ => Err(bad.clone()),
            },
        );
    }

    // Negation and absolute value over int and real.
    {
        let overflow = overflow.clone();
        let bad = internal_fail(root, "negation on non-numbers");
        predefined(
            root,
            "~",
            Scheme {
                quantified: vec!["'#realint".into()],
                ty: Ty::fun(Ty::Var("'#realint".into()), Ty::Var("'#realint".into())),
            },
            move |arg| match arg {
                Value::Int(x) => checked_int(-x, &overflow),
                Value::Real(x) => Ok(Value::Real(-x)),
                _ => Err(bad.clone()),
            },
        );
    }
    {
        let overflow = overflow.clone();
        let bad = internal_fail(root, "abs on non-numbers");
        predefined(
            root,
            "abs",
            Scheme {
                quantified: vec!["'#realint".into()],
                ty: Ty::fun(Ty::Var("'#realint".into()), Ty::Var("'#realint".into())),
            },
            move |arg| match arg {
                Value::Int(x) => checked_int(x.abs(), &overflow),
                Value::Real(x) => Ok(Value::Real(x.abs())),
                _ => Err(bad.clone()),
            },
        );
    }

    // Comparisons over the numeric and textual primitives.
    macro_rules! compare {
        ($name:literal, $cmp:expr) => {{
            let bad = internal_fail(root, "comparison on incompatible values");
            predefined(
                root,
                $name,
                binop_scheme("'#numtxt", false),
                move |arg: Value| {
                    let (a, b) = match arg.as_pair() {
                        Some(pair) => pair,
                        None => return Err(bad.clone()),
                    };
                    let ordering = match (a, b) {
                        (Value::Int(x), Value::Int(y)) => x.cmp(y),
                        (Value::Word(x), Value::Word(y)) => x.cmp(y),
                        (Value::Char(x), Value::Char(y)) => x.cmp(y),
                        (Value::Str(x), Value::Str(y)) => x.cmp(y),
                        (Value::Real(x), Value::Real(y)) => {
                            match x.partial_cmp(y) {
                                Some(o) => o,
                                None => return Ok(Value::Bool(false)),
                            }
                        }
                        _ => return Err(bad.clone()),
                    };
                    Ok(Value::Bool($cmp(ordering)))
                },
            );
        }};
    }

    compare!("<", |o: std::cmp::Ordering| o.is_lt());
    compare!("<=", |o: std::cmp::Ordering| o.is_le());
    compare!(">", |o: std::cmp::Ordering| o.is_gt());
    compare!(">=", |o: std::cmp::Ordering| o.is_ge());

    // Polymorphic equality over equality types.
    predefined(root, "=", binop_scheme("''a", false), move |arg| {
        match arg.as_pair() {
            Some((a, b)) => Ok(Value::Bool(a == b)),
            None => Ok(Value::Bool(false)),
        }
    });
    predefined(root, "<>", binop_scheme("''a", false), move |arg| {
        match arg.as_pair() {
            Some((a, b)) => Ok(Value::Bool(a != b)),
            None => Ok(Value::Bool(true)),
        }
    });

    // Strings and characters.
    {
        let bad = internal_fail(root, "string concatenation on non-strings");
        predefined(
            root,
            "^",
            Scheme::mono(Ty::fun(
                Ty::pair(Ty::string(), Ty::string()),
                Ty::string(),
            )),
            move |arg| match arg.as_pair() {
                Some((Value::Str(a), Value::Str(b))) => {
                    Ok(Value::Str(format!("{}{}", a, b)))
                }
                _ => Err(bad.clone()),
            },
        );
    }
    predefined(
        root,
        "size",
        Scheme::mono(Ty::fun(Ty::string(), Ty::int())),
        move |arg| match arg {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            _ => Ok(Value::Int(0)),
        },
    );
    predefined(
        root,
        "str",
        Scheme::mono(Ty::fun(Ty::char(), Ty::string())),
        move |arg| match arg {
            Value::Char(c) => Ok(Value::Str(c.to_string())),
            other => Ok(Value::Str(other.to_string())),
        },
    );
    predefined(
        root,
        "ord",
        Scheme::mono(Ty::fun(Ty::char(), Ty::int())),
        move |arg| match arg {
            Value::Char(c) => Ok(Value::Int(c as i64)),
            _ => Ok(Value::Int(0)),
        },
    );
    {
        let chr_exn = chr_exn.clone();
        predefined(
            root,
            "chr",
            Scheme::mono(Ty::fun(Ty::int(), Ty::char())),
            move |arg| match arg {
                Value::Int(n) if (0..=255).contains(&n) => {
                    Ok(Value::Char(char::from(n as u8)))
                }
                _ => Err(chr_exn.clone()),
            },
        );
    }
    predefined(
        root,
        "not",
        Scheme::mono(Ty::fun(Ty::bool(), Ty::bool())),
        move |arg| match arg {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Ok(other),
        },
    );

    // explode/implode between strings and char lists.
    {
        let nil = root.lookup_dyn("nil").expect("nil registered");
        let cons = root.lookup_dyn("::").expect(":: registered");
        let cons_id = match &cons {
            Value::Con { id, .. } => *id,
            _ => unreachable!("`::` is a unary constructor"),
        };
        predefined(
            root,
            "explode",
            Scheme::mono(Ty::fun(Ty::string(), Ty::list(Ty::char()))),
            move |arg| match arg {
                Value::Str(s) => {
                    let mut out = nil.clone();
                    for c in s.chars().rev() {
                        out = Value::ConVal {
                            name: "::".into(),
                            arg: Some(Box::new(Value::pair(Value::Char(c), out))),
                            id: cons_id,
                        };
                    }
                    Ok(out)
                }
                other => Ok(other),
            },
        );
    }
    {
        let bad = internal_fail(root, "implode on a non-list");
        predefined(
            root,
            "implode",
            Scheme::mono(Ty::fun(Ty::list(Ty::char()), Ty::string())),
            move |arg| {
                let items = match arg.list_elements() {
                    Some(items) => items,
                    None => return Err(bad.clone()),
                };
                let mut out = String::new();
                for item in items {
                    match item {
                        Value::Char(c) => out.push(*c),
                        _ => return Err(bad.clone()),
                    }
                }
                Ok(Value::Str(out))
            },
        );
    }

    // Conversions between int and real.
    predefined(
        root,
        "real",
        Scheme::mono(Ty::fun(Ty::int(), Ty::real())),
        move |arg| match arg {
            Value::Int(n) => Ok(Value::Real(n as f64)),
            other => Ok(other),
        },
    );
    macro_rules! real_to_int {
        ($name:literal, $round:expr) => {{
            let overflow = overflow.clone();
            let domain = domain_exn.clone();
            predefined(
                root,
                $name,
                Scheme::mono(Ty::fun(Ty::real(), Ty::int())),
                move |arg| match arg {
                    Value::Real(r) if r.is_nan() => Err(domain.clone()),
                    Value::Real(r) => {
                        let rounded = $round(r);
                        if rounded < MININT as f64 || rounded > MAXINT as f64 {
                            Err(overflow.clone())
                        } else {
                            Ok(Value::Int(rounded as i64))
                        }
                    }
                    other => Ok(other),
                },
            );
        }};
    }
    real_to_int!("floor", |r: f64| r.floor());
    real_to_int!("ceil", |r: f64| r.ceil());
    real_to_int!("round", |r: f64| r.round());
    real_to_int!("trunc", |r: f64| r.trunc());

    // Dereference for the immutable `ref` box.
    {
        let bad = internal_fail(root, "dereference of a non-ref");
        let a = || Ty::Var(SmolStr::new("'a"));
        predefined(
            root,
            "!",
            Scheme {
                quantified: vec!["'a".into()],
                ty: Ty::fun(
                    Ty::Con {
                        name: "ref".into(),
                        args: vec![a()],
                    },
                    a(),
                ),
            },
            move |arg| match arg {
                Value::ConVal {
                    arg: Some(inner), ..
                } => Ok(*inner),
                _ => Err(bad.clone()),
            },
        );
    }

    predefined(
        root,
        "Int.toString",
        Scheme::mono(Ty::fun(Ty::int(), Ty::string())),
        move |arg| Ok(Value::Str(arg.to_string())),
    );

    register_math(root);
}

fn register_math(root: &Rc<State>) {
    root.define_value("Math.pi".into(), Scheme::mono(Ty::real()), IdStatus::Value);
    root.define_dyn("Math.pi".into(), Value::Real(std::f64::consts::PI));
    root.define_value("Math.e".into(), Scheme::mono(Ty::real()), IdStatus::Value);
    root.define_dyn("Math.e".into(), Value::Real(std::f64::consts::E));

    macro_rules! math_fn {
        ($name:literal, $f:expr) => {{
            predefined(
                root,
                $name,
                Scheme::mono(Ty::fun(Ty::real(), Ty::real())),
                move |arg| match arg {
                    Value::Real(r) => Ok(Value::Real($f(r))),
                    other => Ok(other),
                },
            );
        }};
    }

    math_fn!("Math.sqrt", |r: f64| r.sqrt());
    math_fn!("Math.sin", |r: f64| r.sin());
    math_fn!("Math.cos", |r: f64| r.cos());
    math_fn!("Math.tan", |r: f64| r.tan());
    math_fn!("Math.ln", |r: f64| r.ln());
    math_fn!("Math.exp", |r: f64| r.exp());
    math_fn!("Math.atan", |r: f64| r.atan());

    {
        predefined(
            root,
            "Math.pow",
            Scheme::mono(Ty::fun(Ty::pair(Ty::real(), Ty::real()), Ty::real())),
            move |arg| match arg.as_pair() {
                Some((Value::Real(x), Value::Real(y))) => Ok(Value::Real(x.powf(*y))),
                _ => Ok(Value::Real(f64::NAN)),
            },
        );
    }
}
