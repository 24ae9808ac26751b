//! The tree-walking evaluator.
//!
//! Evaluation returns `Result<Value, Halt>`: a raised SML exception
//! travels as `Halt::Raised` until a `handle` catches it, while
//! `Halt::Error` (rebind violations, internal breaches, step-limit
//! exhaustion) aborts the chunk and is never catchable from the
//! interpreted program.

use crate::elab::Warning;
use crate::state::{Rebind, State};
use crate::value::{Closure, RecGroup, Value};
use marlin_ast::core::*;
use marlin_ast::fixity::Fixity;
use marlin_ast::{FixityDecl, LongName, Span};
use smol_str::SmolStr;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct EvalError {
    pub message: String,
    pub span: Span,
}

#[derive(Debug)]
pub enum Halt {
    /// An SML exception in flight.
    Raised { exn: Value, span: Span },
    Error(EvalError),
}

type Result<T, E = Halt> = std::result::Result<T, E>;

pub struct Evaluator {
    steps: u64,
    step_limit: Option<u64>,
    strict_rebind: bool,
    pub warnings: Vec<Warning>,
}

impl Evaluator {
    pub fn new(step_limit: Option<u64>, strict_rebind: bool) -> Self {
        Self {
            steps: 0,
            step_limit,
            strict_rebind,
            warnings: Vec::new(),
        }
    }

    fn error<T>(&self, message: impl Into<String>, span: Span) -> Result<T> {
        Err(Halt::Error(EvalError {
            message: message.into(),
            span,
        }))
    }

    /// Raises one of the basis exceptions (`Match`, `Bind`, `Overflow`,
    /// ...) by looking its packet up in the state.
    fn raise_builtin<T>(&self, state: &State, name: &str, span: Span) -> Result<T> {
        match state.lookup_dyn(name) {
            Some(exn @ Value::ExnVal { .. }) => Err(Halt::Raised { exn, span }),
            _ => self.error(
                format!("internal: builtin exception `{}` is missing", name),
                span,
            ),
        }
    }

    fn tick(&mut self, span: Span) -> Result<()> {
        self.steps += 1;
        if let Some(limit) = self.step_limit {
            if self.steps > limit {
                return self.error("step limit exceeded", span);
            }
        }
        Ok(())
    }

    /// Rebind protection: identifiers like `true` and `::` from the
    /// initial basis may never be redefined.
    fn check_rebind(&mut self, state: &State, name: &str, span: Span) -> Result<()> {
        if state.rebind_status(name) == Rebind::Never {
            if self.strict_rebind {
                return self.error(
                    format!("builtin identifier `{}` may not be rebound", name),
                    span,
                );
            }
            self.warnings.push(Warning {
                message: format!("rebinding builtin identifier `{}`", name),
                span,
            });
        }
        Ok(())
    }

    /// Collects every identifier a `val` pattern would bind or overwrite,
    /// including constructor names written in binding position.
    fn pattern_names(pat: &CPat, out: &mut Vec<(SmolStr, Span)>) {
        match &pat.kind {
            CPatKind::Wildcard | CPatKind::Const(_) => {}
            CPatKind::Var(name) => {
                if !name.is_qualified() {
                    out.push((name.name.clone(), pat.span));
                }
            }
            CPatKind::Record { rows, .. } => {
                for (_, p) in rows {
                    Self::pattern_names(p, out);
                }
            }
            CPatKind::Con { arg, .. } => Self::pattern_names(arg, out),
            CPatKind::Typed { pat, .. } => Self::pattern_names(pat, out),
            CPatKind::Layered { var, pat, .. } => {
                out.push((var.clone(), pat.span));
                Self::pattern_names(pat, out);
            }
            CPatKind::Vector(items) => {
                for p in items {
                    Self::pattern_names(p, out);
                }
            }
        }
    }

    fn check_val_pattern_rebinds(&mut self, state: &Rc<State>, pat: &CPat) -> Result<()> {
        let mut names = Vec::new();
        Self::pattern_names(pat, &mut names);
        for (name, span) in names {
            self.check_rebind(state, &name, span)?;
        }
        Ok(())
    }

    /// Rebind check that runs before elaboration, so `val nil = 3` fails
    /// with an evaluation error rather than a type clash.
    pub fn pre_check_rebinds(&mut self, state: &Rc<State>, dec: &CDec) -> Result<()> {
        match &dec.kind {
            CDecKind::Val { binds, .. } => {
                for (pat, _) in binds {
                    self.check_val_pattern_rebinds(state, pat)?;
                }
                Ok(())
            }
            CDecKind::Seq(decs) => {
                for d in decs {
                    self.pre_check_rebinds(state, d)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ── Declarations ─────────────────────────────────────────────

    pub fn dec(&mut self, state: &Rc<State>, dec: &CDec) -> Result<()> {
        let span = dec.span;
        match &dec.kind {
            CDecKind::Val { binds, .. } => {
                for (pat, expr) in binds {
                    self.check_val_pattern_rebinds(state, pat)?;
                    let value = self.expr(state, expr)?;
                    let mut bound = Vec::new();
                    if !self.matches(state, pat, &value, &mut bound) {
                        return self.raise_builtin(state, "Bind", pat.span);
                    }
                    for (name, value) in bound {
                        self.check_rebind(state, &name, pat.span)?;
                        state.define_dyn(name, value);
                    }
                }
                Ok(())
            }
            CDecKind::ValRec { binds, .. } => {
                let group: Rc<RecGroup> = Rc::new(
                    binds
                        .iter()
                        .map(|(name, arms)| (name.clone(), arms.clone()))
                        .collect(),
                );
                for (name, arms) in binds {
                    self.check_rebind(state, name, span)?;
                    state.define_dyn(
                        name.clone(),
                        Value::Fn(Closure {
                            state: state.clone(),
                            recursives: group.clone(),
                            arms: arms.clone(),
                        }),
                    );
                }
                Ok(())
            }
            CDecKind::Datatype(binds) => {
                for db in binds {
                    self.eval_dat_bind(state, db, span)?;
                }
                Ok(())
            }
            CDecKind::Abstype { binds, body } => {
                // Constructors live in a detached frame: visible to the
                // body and to closures it creates, invisible afterwards.
                let ctor_frame = state.child();
                for db in binds {
                    self.eval_dat_bind(&ctor_frame, db, span)?;
                }
                let body_frame = ctor_frame.child();
                self.dec(&body_frame, body)?;
                for (name, value) in body_frame.dyn_bindings() {
                    state.define_dyn(name, value);
                }
                Ok(())
            }
            CDecKind::Exception(binds) => {
                for bind in binds {
                    match bind {
                        CExBind::New { name, arg } => {
                            self.check_rebind(state, name, span)?;
                            let id = state.fresh_ctor_id();
                            let value = if arg.is_some() {
                                Value::ExnCon {
                                    name: name.clone(),
                                    id,
                                }
                            } else {
                                Value::ExnVal {
                                    name: name.clone(),
                                    arg: None,
                                    id,
                                }
                            };
                            state.define_dyn(name.clone(), value);
                        }
                        CExBind::Alias { name, target } => {
                            self.check_rebind(state, name, span)?;
                            match state.lookup_dyn(&target.flat()) {
                                Some(
                                    value @ (Value::ExnCon { .. } | Value::ExnVal { .. }),
                                ) => {
                                    state.define_dyn(name.clone(), value);
                                }
                                _ => {
                                    return self.error(
                                        format!("`{}` is not an exception", target),
                                        span,
                                    )
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
            CDecKind::Local { outer, inner } => {
                let outer_frame = state.child();
                self.dec(&outer_frame, outer)?;
                let inner_frame = outer_frame.child();
                self.dec(&inner_frame, inner)?;
                for (name, value) in inner_frame.dyn_bindings() {
                    state.define_dyn(name, value);
                }
                Ok(())
            }
            CDecKind::Open(names) => {
                for name in names {
                    for (stripped, _, value) in state.visible_with_prefix(&name.flat()) {
                        if let Some(value) = value {
                            state.define_dyn(stripped, value);
                        }
                    }
                }
                Ok(())
            }
            CDecKind::Seq(decs) => {
                for d in decs {
                    self.dec(state, d)?;
                }
                Ok(())
            }
            CDecKind::Fixity { fixity, ids } => {
                let status = match fixity {
                    FixityDecl::Infix(p) => Some(Fixity::left(*p)),
                    FixityDecl::Infixr(p) => Some(Fixity::right(*p)),
                    FixityDecl::Nonfix => None,
                };
                for id in ids {
                    state.declare_fixity(id.clone(), status);
                }
                Ok(())
            }
            CDecKind::Type(_) | CDecKind::Empty => Ok(()),
        }
    }

    fn eval_dat_bind(&mut self, state: &Rc<State>, db: &CDatBind, span: Span) -> Result<()> {
        let mut ctor_names = Vec::new();
        for (name, arg) in &db.ctors {
            self.check_rebind(state, name, span)?;
            let id = state.fresh_ctor_id();
            let value = if arg.is_some() {
                Value::Con {
                    name: name.clone(),
                    id,
                }
            } else {
                Value::ConVal {
                    name: name.clone(),
                    arg: None,
                    id,
                }
            };
            state.define_dyn(name.clone(), value);
            ctor_names.push(name.clone());
        }
        state.define_dyn_type(db.name.clone(), ctor_names);
        Ok(())
    }

    // ── Expressions ──────────────────────────────────────────────

    pub fn expr(&mut self, state: &Rc<State>, expr: &CExpr) -> Result<Value> {
        let span = expr.span;
        self.tick(span)?;
        match &expr.kind {
            CExprKind::Const(c) => Ok(constant_value(c)),
            CExprKind::Var(name) => match state.lookup_dyn(&name.flat()) {
                Some(value) => Ok(value),
                None => self.error(format!("internal: unbound `{}`", name), span),
            },
            CExprKind::Record(rows) => {
                let mut out = Vec::with_capacity(rows.len());
                for (label, e) in rows {
                    out.push((label.clone(), self.expr(state, e)?));
                }
                Ok(Value::Record(out))
            }
            CExprKind::Fn(arms) => Ok(Value::Fn(Closure {
                state: state.clone(),
                recursives: Rc::new(Vec::new()),
                arms: arms.clone(),
            })),
            CExprKind::App { func, arg } => {
                let func_value = self.expr(state, func)?;
                let arg_value = self.expr(state, arg)?;
                self.apply(state, func_value, arg_value, span)
            }
            CExprKind::Typed { expr, .. } => self.expr(state, expr),
            CExprKind::Raise(inner) => {
                let value = self.expr(state, inner)?;
                match value {
                    exn @ Value::ExnVal { .. } => Err(Halt::Raised { exn, span }),
                    other => self.error(
                        format!("internal: raising a non-exception value {}", other),
                        span,
                    ),
                }
            }
            CExprKind::Handle { expr, arms } => match self.expr(state, expr) {
                Ok(value) => Ok(value),
                Err(Halt::Raised { exn, span: raise_span }) => {
                    for (pat, body) in &arms.arms {
                        let mut bound = Vec::new();
                        if self.matches(state, pat, &exn, &mut bound) {
                            let frame = state.child();
                            for (name, value) in bound {
                                frame.define_dyn(name, value);
                            }
                            return self.expr(&frame, body);
                        }
                    }
                    Err(Halt::Raised {
                        exn,
                        span: raise_span,
                    })
                }
                Err(halt) => Err(halt),
            },
            CExprKind::Let { dec, body } => {
                let frame = state.child();
                self.dec(&frame, dec)?;
                self.expr(&frame, body)
            }
            CExprKind::Vector(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.expr(state, item)?);
                }
                Ok(Value::Vector(out))
            }
        }
    }

    pub fn apply(
        &mut self,
        state: &Rc<State>,
        func: Value,
        arg: Value,
        span: Span,
    ) -> Result<Value> {
        match func {
            Value::Fn(closure) => {
                for (pat, body) in &closure.arms.arms {
                    let mut bound = Vec::new();
                    if self.matches(&closure.state, pat, &arg, &mut bound) {
                        let frame = closure.state.child();
                        // Re-adjoin the recursive group so siblings can
                        // resolve each other from this application on.
                        for (name, arms) in closure.recursives.iter() {
                            frame.define_dyn(
                                name.clone(),
                                Value::Fn(Closure {
                                    state: closure.state.clone(),
                                    recursives: closure.recursives.clone(),
                                    arms: arms.clone(),
                                }),
                            );
                        }
                        for (name, value) in bound {
                            frame.define_dyn(name, value);
                        }
                        return self.expr(&frame, body);
                    }
                }
                self.raise_builtin(state, "Match", span)
            }
            Value::Predefined(host) => match (host.f)(arg) {
                Ok(value) => Ok(value),
                Err(exn) => Err(Halt::Raised { exn, span }),
            },
            Value::Con { name, id } => Ok(Value::ConVal {
                name,
                arg: Some(Box::new(arg)),
                id,
            }),
            Value::ExnCon { name, id } => Ok(Value::ExnVal {
                name,
                arg: Some(Box::new(arg)),
                id,
            }),
            other => self.error(
                format!("internal: value {} cannot be applied", other),
                span,
            ),
        }
    }

    // ── Pattern matching ─────────────────────────────────────────

    /// Tries `pat` against `value`; on success pushes the variable
    /// bindings. Constructor identity is by id, not by name.
    pub fn matches(
        &self,
        state: &Rc<State>,
        pat: &CPat,
        value: &Value,
        bound: &mut Vec<(SmolStr, Value)>,
    ) -> bool {
        match &pat.kind {
            CPatKind::Wildcard => true,
            CPatKind::Const(c) => constant_value(c) == *value,
            CPatKind::Var(name) => match self.constructor_lookup(state, name) {
                Some(ctor) => ctor == *value,
                None => {
                    bound.push((name.name.clone(), value.clone()));
                    true
                }
            },
            CPatKind::Record { rows, flexible } => match value {
                Value::Record(fields) => {
                    if !flexible && fields.len() != rows.len() {
                        return false;
                    }
                    rows.iter().all(|(label, sub)| {
                        fields
                            .iter()
                            .find(|(l, _)| l == label)
                            .is_some_and(|(_, v)| self.matches(state, sub, v, bound))
                    })
                }
                _ => false,
            },
            CPatKind::Con { name, arg } => {
                let ctor = match state.lookup_dyn(&name.flat()) {
                    Some(v) => v,
                    None => return false,
                };
                match (ctor, value) {
                    (
                        Value::Con { id: ctor_id, .. },
                        Value::ConVal {
                            arg: Some(payload),
                            id,
                            ..
                        },
                    ) if *id == ctor_id => self.matches(state, arg, payload, bound),
                    (
                        Value::ExnCon { id: ctor_id, .. },
                        Value::ExnVal {
                            arg: Some(payload),
                            id,
                            ..
                        },
                    ) if *id == ctor_id => self.matches(state, arg, payload, bound),
                    _ => false,
                }
            }
            CPatKind::Typed { pat, .. } => self.matches(state, pat, value, bound),
            CPatKind::Layered { var, pat, .. } => {
                if self.matches(state, pat, value, bound) {
                    bound.push((var.clone(), value.clone()));
                    true
                } else {
                    false
                }
            }
            CPatKind::Vector(items) => match value {
                Value::Vector(values) => {
                    items.len() == values.len()
                        && items
                            .iter()
                            .zip(values.iter())
                            .all(|(p, v)| self.matches(state, p, v, bound))
                }
                _ => false,
            },
        }
    }

    /// The constructor value a pattern identifier refers to, if it is
    /// one. Nullary constructors match by comparing against this value.
    fn constructor_lookup(&self, state: &Rc<State>, name: &LongName) -> Option<Value> {
        let value = state.lookup_dyn(&name.flat())?;
        match &value {
            Value::ConVal { arg: None, .. }
            | Value::ExnVal { arg: None, .. }
            | Value::Bool(_) => {
                // Only identifiers with constructor status count; plain
                // values shadowing is decided statically, but the dynamic
                // check keeps `disableElaboration` runs coherent.
                match state.lookup_value(&name.flat()) {
                    Some((_, status)) if status.is_constructor() => Some(value),
                    Some(_) => None,
                    None => Some(value),
                }
            }
            _ => {
                match state.lookup_value(&name.flat()) {
                    // A unary constructor used without an argument can
                    // only reach here unelaborated; treat as non-match.
                    Some((_, status)) if status.is_constructor() => Some(value),
                    _ => None,
                }
            }
        }
    }
}

fn constant_value(c: &marlin_ast::Constant) -> Value {
    use marlin_ast::Constant;
    match c {
        Constant::Int(n) => Value::Int(*n),
        Constant::Word(w) => Value::Word(*w),
        Constant::Real(r) => Value::Real(*r),
        Constant::Char(c) => Value::Char(*c),
        Constant::Str(s) => Value::Str(s.clone()),
    }
}
