//! The type elaborator: Hindley–Milner inference over the core calculus.
//!
//! Inference variables live in a substitution vector owned by one
//! `Elaborator`, which handles a single top-level declaration; every
//! `val` binding generalizes (subject to the value restriction), so the
//! schemes written into the state never mention inference variables.

use crate::state::{IdStatus, State};
use crate::types::{Scheme, Ty, TypeDef, UVarId};
use marlin_ast::core::*;
use marlin_ast::Span;
use smol_str::SmolStr;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElabErrorKind {
    TypeMismatch,
    OccursCheck,
    UnboundIdentifier,
    UnboundConstructor,
    EqualityRequired,
    UnguardedTypeVariable,
    ArityMismatch,
    RecordLabelMismatch,
}

#[derive(Debug, Clone)]
pub struct ElabError {
    pub kind: ElabErrorKind,
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ElabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.span.start, self.span.end, self.message)
    }
}

impl std::error::Error for ElabError {}

#[derive(Debug, Clone)]
pub struct Warning {
    pub message: String,
    pub span: Span,
}

type Result<T, E = ElabError> = std::result::Result<T, E>;

/// Elaborate one top-level declaration, writing static bindings into the
/// state's innermost frame. On error nothing useful was written; the
/// caller discards the frame.
pub fn elaborate_dec(state: &Rc<State>, dec: &CDec) -> Result<Vec<Warning>> {
    let mut elab = Elaborator::new(state);
    elab.elaborate(dec)?;
    Ok(elab.take_warnings())
}

// Overload classes as bitmasks over the primitive types.
const C_INT: u8 = 1;
const C_WORD: u8 = 2;
const C_REAL: u8 = 4;
const C_CHAR: u8 = 8;
const C_STRING: u8 = 16;

const MASK_NUM: u8 = C_INT | C_WORD | C_REAL;
const MASK_NUMTXT: u8 = C_INT | C_WORD | C_REAL | C_CHAR | C_STRING;
const MASK_WORDINT: u8 = C_INT | C_WORD;
const MASK_REALINT: u8 = C_INT | C_REAL;

fn prim_mask_bit(name: &str) -> u8 {
    match name {
        "int" => C_INT,
        "word" => C_WORD,
        "real" => C_REAL,
        "char" => C_CHAR,
        "string" => C_STRING,
        _ => 0,
    }
}

/// Quantifier spellings in basis schemes that instantiate to constrained
/// variables (`'#num`, `'#numtxt`, `'#wordint`, `'#realint`).
fn overload_mask(name: &str) -> Option<u8> {
    match name {
        "'#num" => Some(MASK_NUM),
        "'#numtxt" => Some(MASK_NUMTXT),
        "'#wordint" => Some(MASK_WORDINT),
        "'#realint" => Some(MASK_REALINT),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct UVarInfo {
    /// `None` is unrestricted; `Some(mask)` restricts to primitive types.
    mask: Option<u8>,
    equality: bool,
}

#[derive(Default)]
struct Scope {
    values: Vec<(SmolStr, (Scheme, IdStatus))>,
    types: Vec<(SmolStr, TypeDef)>,
}

/// One elaboration context. It lives for a whole chunk so that the weak
/// type variables of earlier declarations can still be resolved by later
/// ones.
pub struct Elaborator<'a> {
    state: &'a Rc<State>,
    subst: Vec<Option<Ty>>,
    uvars: Vec<UVarInfo>,
    scopes: Vec<Scope>,
    warnings: Vec<Warning>,
    /// Weak variable name → the inference variable it opens to in this
    /// chunk. Entries are never generalized.
    free_vars: HashMap<SmolStr, UVarId>,
}

impl<'a> Elaborator<'a> {
    pub fn new(state: &'a Rc<State>) -> Self {
        Self {
            state,
            subst: Vec::new(),
            uvars: Vec::new(),
            scopes: Vec::new(),
            warnings: Vec::new(),
            free_vars: HashMap::new(),
        }
    }

    pub fn elaborate(&mut self, dec: &CDec) -> Result<()> {
        self.dec(dec)
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    fn err<T>(&self, kind: ElabErrorKind, message: impl Into<String>, span: Span) -> Result<T> {
        Err(ElabError {
            kind,
            message: message.into(),
            span,
        })
    }

    fn warn(&mut self, message: impl Into<String>, span: Span) {
        self.warnings.push(Warning {
            message: message.into(),
            span,
        });
    }

    // ── Fresh variables and substitution ─────────────────────────

    fn fresh(&mut self) -> Ty {
        self.fresh_info(UVarInfo {
            mask: None,
            equality: false,
        })
    }

    fn fresh_info(&mut self, info: UVarInfo) -> Ty {
        let id = self.subst.len() as UVarId;
        self.subst.push(None);
        self.uvars.push(info);
        Ty::UVar(id)
    }

    fn apply(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::UVar(id) => match self.subst.get(*id as usize) {
                Some(Some(resolved)) => self.apply(resolved),
                _ => ty.clone(),
            },
            Ty::Flex { uvar, rows } => match self.subst.get(*uvar as usize) {
                Some(Some(resolved)) => self.apply(resolved),
                _ => Ty::Flex {
                    uvar: *uvar,
                    rows: rows
                        .iter()
                        .map(|(l, t)| (l.clone(), self.apply(t)))
                        .collect(),
                },
            },
            Ty::Var(_) => ty.clone(),
            Ty::Con { name, args } => Ty::Con {
                name: name.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            Ty::Record(rows) => Ty::Record(
                rows.iter()
                    .map(|(l, t)| (l.clone(), self.apply(t)))
                    .collect(),
            ),
            Ty::Fun(dom, cod) => Ty::fun(self.apply(dom), self.apply(cod)),
        }
    }

    fn occurs(&self, id: UVarId, ty: &Ty) -> bool {
        match self.apply(ty) {
            Ty::UVar(other) => other == id,
            Ty::Flex { uvar, rows } => {
                uvar == id || rows.iter().any(|(_, t)| self.occurs(id, t))
            }
            Ty::Var(_) => false,
            Ty::Con { args, .. } => args.iter().any(|a| self.occurs(id, a)),
            Ty::Record(rows) => rows.iter().any(|(_, t)| self.occurs(id, t)),
            Ty::Fun(dom, cod) => self.occurs(id, &dom) || self.occurs(id, &cod),
        }
    }

    // ── Unification ──────────────────────────────────────────────

    fn unify(&mut self, a: &Ty, b: &Ty, span: Span) -> Result<()> {
        let a = self.apply(a);
        let b = self.apply(b);
        if a == b {
            return Ok(());
        }
        match (&a, &b) {
            (Ty::UVar(id), _) => self.bind_uvar(*id, &b, span),
            (_, Ty::UVar(id)) => self.bind_uvar(*id, &a, span),

            (
                Ty::Flex {
                    uvar: u1,
                    rows: r1,
                },
                Ty::Flex {
                    uvar: u2,
                    rows: r2,
                },
            ) => {
                for (label, t1) in r1 {
                    if let Some((_, t2)) = r2.iter().find(|(l, _)| l == label) {
                        self.unify(t1, t2, span)?;
                    }
                }
                let mut rows: Vec<(SmolStr, Ty)> = r1.clone();
                for (label, t2) in r2 {
                    if !rows.iter().any(|(l, _)| l == label) {
                        rows.push((label.clone(), t2.clone()));
                    }
                }
                let equality = self.uvars[*u1 as usize].equality
                    || self.uvars[*u2 as usize].equality;
                let merged = self.fresh_info(UVarInfo {
                    mask: None,
                    equality,
                });
                let id = match merged {
                    Ty::UVar(id) => id,
                    _ => unreachable!(),
                };
                let rows: Vec<_> = rows
                    .iter()
                    .map(|(l, t)| (l.clone(), self.apply(t)))
                    .collect();
                let flex = Ty::Flex { uvar: id, rows };
                self.subst[*u1 as usize] = Some(flex.clone());
                self.subst[*u2 as usize] = Some(flex);
                Ok(())
            }

            (Ty::Flex { uvar, rows }, Ty::Record(full))
            | (Ty::Record(full), Ty::Flex { uvar, rows }) => {
                for (label, t) in rows {
                    match full.iter().find(|(l, _)| l == label) {
                        Some((_, ft)) => self.unify(t, ft, span)?,
                        None => {
                            return self.err(
                                ElabErrorKind::RecordLabelMismatch,
                                format!("record type has no field `{}`", label),
                                span,
                            )
                        }
                    }
                }
                let resolved = Ty::Record(
                    full.iter()
                        .map(|(l, t)| (l.clone(), self.apply(t)))
                        .collect(),
                );
                if self.uvars[*uvar as usize].equality {
                    self.require_equality(&resolved, span)?;
                }
                self.subst[*uvar as usize] = Some(resolved);
                Ok(())
            }

            (Ty::Record(r1), Ty::Record(r2)) => {
                if r1.len() != r2.len()
                    || !r1
                        .iter()
                        .all(|(l, _)| r2.iter().any(|(l2, _)| l2 == l))
                {
                    return self.err(
                        ElabErrorKind::RecordLabelMismatch,
                        format!("record types differ: {} vs {}", a, b),
                        span,
                    );
                }
                for (label, t1) in r1 {
                    let (_, t2) = r2.iter().find(|(l, _)| l == label).expect("checked");
                    self.unify(t1, t2, span)?;
                }
                Ok(())
            }

            (Ty::Fun(d1, c1), Ty::Fun(d2, c2)) => {
                self.unify(d1, d2, span)?;
                self.unify(c1, c2, span)
            }

            (
                Ty::Con {
                    name: n1,
                    args: a1,
                },
                Ty::Con {
                    name: n2,
                    args: a2,
                },
            ) if n1 == n2 && a1.len() == a2.len() => {
                for (x, y) in a1.iter().zip(a2.iter()) {
                    self.unify(x, y, span)?;
                }
                Ok(())
            }

            _ => self.err(
                ElabErrorKind::TypeMismatch,
                format!("type mismatch: expected {}, got {}", a, b),
                span,
            ),
        }
    }

    fn bind_uvar(&mut self, id: UVarId, ty: &Ty, span: Span) -> Result<()> {
        if let Ty::UVar(other) = ty {
            if *other == id {
                return Ok(());
            }
            let a = self.uvars[id as usize];
            let b = self.uvars[*other as usize];
            let mask = match (a.mask, b.mask) {
                (None, m) | (m, None) => m,
                (Some(x), Some(y)) => {
                    let merged = x & y;
                    if merged == 0 {
                        return self.err(
                            ElabErrorKind::TypeMismatch,
                            "incompatible overloaded operand types",
                            span,
                        );
                    }
                    Some(merged)
                }
            };
            self.uvars[*other as usize] = UVarInfo {
                mask,
                equality: a.equality || b.equality,
            };
            self.subst[id as usize] = Some(ty.clone());
            return Ok(());
        }
        if self.occurs(id, ty) {
            return self.err(
                ElabErrorKind::OccursCheck,
                format!("circular type: a type would contain itself ({})", self.apply(ty)),
                span,
            );
        }
        let info = self.uvars[id as usize];
        if let Some(mask) = info.mask {
            let ok = matches!(
                ty,
                Ty::Con { name, args } if args.is_empty() && prim_mask_bit(name) & mask != 0
            );
            if !ok {
                return self.err(
                    ElabErrorKind::TypeMismatch,
                    format!("type mismatch: an overloaded operator cannot take {}", ty),
                    span,
                );
            }
        }
        if info.equality {
            self.require_equality(ty, span)?;
        }
        self.subst[id as usize] = Some(ty.clone());
        Ok(())
    }

    /// Requires `ty` to admit equality, marking inference variables as
    /// equality variables along the way.
    fn require_equality(&mut self, ty: &Ty, span: Span) -> Result<()> {
        let ty = self.apply(ty);
        match &ty {
            Ty::UVar(id) => {
                self.uvars[*id as usize].equality = true;
                Ok(())
            }
            Ty::Flex { uvar, rows } => {
                self.uvars[*uvar as usize].equality = true;
                for (_, t) in rows {
                    self.require_equality(t, span)?;
                }
                Ok(())
            }
            Ty::Var(name) => {
                if Ty::is_equality_name(name) {
                    Ok(())
                } else {
                    self.err(
                        ElabErrorKind::EqualityRequired,
                        format!("{} is not an equality type", name),
                        span,
                    )
                }
            }
            Ty::Record(rows) => {
                for (_, t) in rows {
                    self.require_equality(t, span)?;
                }
                Ok(())
            }
            Ty::Fun(_, _) => self.err(
                ElabErrorKind::EqualityRequired,
                "function types never admit equality",
                span,
            ),
            Ty::Con { name, args } => {
                let admits = match name.as_str() {
                    "int" | "word" | "real" | "char" | "string" | "bool" => true,
                    "exn" => false,
                    "list" | "option" | "ref" | "vector" => true,
                    _ => match self.lookup_type(name) {
                        Some(TypeDef::Datatype { equality, .. }) => equality,
                        Some(TypeDef::Abstract { equality, .. }) => equality,
                        Some(TypeDef::Alias { .. }) | None => false,
                    },
                };
                if !admits {
                    return self.err(
                        ElabErrorKind::EqualityRequired,
                        format!("{} is not an equality type", ty),
                        span,
                    );
                }
                for arg in args {
                    self.require_equality(arg, span)?;
                }
                Ok(())
            }
        }
    }

    // ── Environment ──────────────────────────────────────────────

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().expect("scope stack never empty here")
    }

    fn lookup_value(&self, name: &str) -> Option<(Scheme, IdStatus)> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, entry)) = scope.values.iter().rev().find(|(n, _)| n == name) {
                return Some(entry.clone());
            }
        }
        self.state.lookup_value(name)
    }

    fn lookup_type(&self, name: &str) -> Option<TypeDef> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, def)) = scope.types.iter().rev().find(|(n, _)| n == name) {
                return Some(def.clone());
            }
        }
        self.state.lookup_type(name)
    }

    fn define_value(&mut self, name: SmolStr, scheme: Scheme, status: IdStatus) {
        match self.scopes.last_mut() {
            Some(scope) => scope.values.push((name, (scheme, status))),
            None => {
                if self.state.defines_value(&name) {
                    self.warn(format!("redefining `{}`", name), Span::SYNTHETIC);
                }
                self.state.define_value(name, scheme, status);
            }
        }
    }

    fn define_type(&mut self, name: SmolStr, def: TypeDef) {
        match self.scopes.last_mut() {
            Some(scope) => scope.types.push((name, def)),
            None => self.state.define_type(name, def),
        }
    }

    /// Free inference variables and named type variables visible in the
    /// current local scopes; those must not be generalized.
    fn env_free_vars(&self) -> (HashSet<UVarId>, HashSet<SmolStr>) {
        let mut uvars = HashSet::new();
        let mut names = HashSet::new();
        for scope in &self.scopes {
            for (_, (scheme, _)) in &scope.values {
                let ty = self.apply(&scheme.ty);
                let bound: HashSet<&SmolStr> = scheme.quantified.iter().collect();
                collect_free(&ty, &bound, &mut uvars, &mut names);
            }
        }
        (uvars, names)
    }

    // ── Instantiation and generalization ─────────────────────────

    fn instantiate(&mut self, scheme: &Scheme) -> Ty {
        let ty = if scheme.quantified.is_empty() {
            scheme.ty.clone()
        } else {
            let mut mapping: HashMap<SmolStr, Ty> = HashMap::new();
            for q in &scheme.quantified {
                let fresh = match overload_mask(q) {
                    Some(mask) => self.fresh_info(UVarInfo {
                        mask: Some(mask),
                        equality: false,
                    }),
                    None => self.fresh_info(UVarInfo {
                        mask: None,
                        equality: Ty::is_equality_name(q),
                    }),
                };
                mapping.insert(q.clone(), fresh);
            }
            subst_named(&scheme.ty, &mapping)
        };
        self.open_weak_vars(&ty)
    }

    /// Weak variables stay resolvable inside the chunk that sees them: a
    /// `'_a` in a looked-up scheme maps to one shared inference variable.
    fn open_weak_vars(&mut self, ty: &Ty) -> Ty {
        match ty {
            Ty::Var(name) if Ty::is_weak_name(name) => {
                let id = match self.free_vars.get(name) {
                    Some(id) => *id,
                    None => {
                        let fresh = self.fresh_info(UVarInfo {
                            mask: None,
                            equality: Ty::is_equality_name(name),
                        });
                        let id = match fresh {
                            Ty::UVar(id) => id,
                            _ => unreachable!(),
                        };
                        self.free_vars.insert(name.clone(), id);
                        id
                    }
                };
                Ty::UVar(id)
            }
            Ty::Var(_) | Ty::UVar(_) => ty.clone(),
            Ty::Con { name, args } => Ty::Con {
                name: name.clone(),
                args: args.iter().map(|a| self.open_weak_vars(a)).collect(),
            },
            Ty::Record(rows) => Ty::Record(
                rows.iter()
                    .map(|(l, t)| (l.clone(), self.open_weak_vars(t)))
                    .collect(),
            ),
            Ty::Flex { uvar, rows } => Ty::Flex {
                uvar: *uvar,
                rows: rows
                    .iter()
                    .map(|(l, t)| (l.clone(), self.open_weak_vars(t)))
                    .collect(),
            },
            Ty::Fun(dom, cod) => {
                Ty::fun(self.open_weak_vars(dom), self.open_weak_vars(cod))
            }
        }
    }

    /// The reverse direction, applied to a scheme being written into the
    /// state: a still-unresolved opened weak variable prints and stores
    /// under its original name.
    fn close_free_uvars(&self, ty: &Ty) -> Ty {
        match ty {
            Ty::UVar(id) => {
                for (name, free_id) in &self.free_vars {
                    if free_id == id && self.subst[*id as usize].is_none() {
                        return Ty::Var(name.clone());
                    }
                }
                ty.clone()
            }
            Ty::Var(_) => ty.clone(),
            Ty::Con { name, args } => Ty::Con {
                name: name.clone(),
                args: args.iter().map(|a| self.close_free_uvars(a)).collect(),
            },
            Ty::Record(rows) => Ty::Record(
                rows.iter()
                    .map(|(l, t)| (l.clone(), self.close_free_uvars(t)))
                    .collect(),
            ),
            Ty::Flex { uvar, rows } => Ty::Flex {
                uvar: *uvar,
                rows: rows
                    .iter()
                    .map(|(l, t)| (l.clone(), self.close_free_uvars(t)))
                    .collect(),
            },
            Ty::Fun(dom, cod) => {
                Ty::fun(self.close_free_uvars(dom), self.close_free_uvars(cod))
            }
        }
    }

    fn generalize(&mut self, ty: &Ty, non_expansive: bool, span: Span) -> Result<Scheme> {
        let ty = self.apply(ty);
        let (mut env_uvars, env_names) = self.env_free_vars();

        // Opened weak variables belong to the whole chunk; they are
        // resolved or carried, never quantified.
        for id in self.free_vars.values() {
            let resolved = self.apply(&Ty::UVar(*id));
            let mut names = HashSet::new();
            let empty = HashSet::new();
            collect_free(&resolved, &empty, &mut env_uvars, &mut names);
        }

        let mut free_uvars: Vec<UVarId> = Vec::new();
        let mut flex_left = false;
        collect_uvars(&ty, &mut free_uvars, &mut flex_left);

        let mut used_names: HashSet<SmolStr> = HashSet::new();
        {
            let empty = HashSet::new();
            let mut dummy = HashSet::new();
            let mut names = HashSet::new();
            collect_free(&ty, &empty, &mut dummy, &mut names);
            used_names.extend(names);
        }

        let mut quant_counter = 0usize;
        for id in free_uvars {
            if env_uvars.contains(&id) {
                continue;
            }
            if self.subst[id as usize].is_some() {
                continue;
            }
            let info = self.uvars[id as usize];
            if let Some(mask) = info.mask {
                // Unresolved overloading defaults, int first.
                let name = if mask & C_INT != 0 {
                    "int"
                } else if mask & C_WORD != 0 {
                    "word"
                } else if mask & C_REAL != 0 {
                    "real"
                } else if mask & C_CHAR != 0 {
                    "char"
                } else {
                    "string"
                };
                self.subst[id as usize] = Some(Ty::con0(name));
                continue;
            }
            if non_expansive {
                let name = next_name(&mut quant_counter, info.equality, &used_names);
                used_names.insert(name.clone());
                self.subst[id as usize] = Some(Ty::Var(name));
            } else {
                // Value restriction: the variable stays free (weak). The
                // name must be unique across chunks, so it draws on the
                // root state's id well.
                let prefix = if info.equality { "''_" } else { "'_" };
                let name = SmolStr::new(format!(
                    "{}{}",
                    prefix,
                    letters(self.state.fresh_ctor_id() as usize)
                ));
                self.subst[id as usize] = Some(Ty::Var(name));
            }
        }

        let ty = self.apply(&ty);
        if flex_left || has_flex(&ty) {
            return self.err(
                ElabErrorKind::RecordLabelMismatch,
                "unresolved flexible record type (cannot tell which fields exist)",
                span,
            );
        }
        let ty = self.close_free_uvars(&ty);

        let mut quantified = Vec::new();
        collect_quantifiable(&ty, &env_names, &mut quantified);
        Ok(Scheme { quantified, ty })
    }

    // ── Type expressions ─────────────────────────────────────────

    fn resolve_ty(&mut self, cty: &CTy) -> Result<Ty> {
        match &cty.kind {
            CTyKind::Var(name) => Ok(Ty::Var(name.clone())),
            CTyKind::Record(rows) => {
                let mut out: Vec<(SmolStr, Ty)> = Vec::new();
                for (label, t) in rows {
                    if out.iter().any(|(l, _)| l == label) {
                        return self.err(
                            ElabErrorKind::RecordLabelMismatch,
                            format!("duplicate record label `{}`", label),
                            cty.span,
                        );
                    }
                    out.push((label.clone(), self.resolve_ty(t)?));
                }
                Ok(Ty::Record(out))
            }
            CTyKind::Fun(dom, cod) => {
                Ok(Ty::fun(self.resolve_ty(dom)?, self.resolve_ty(cod)?))
            }
            CTyKind::Con { name, args } => {
                let mut resolved = Vec::new();
                for arg in args {
                    resolved.push(self.resolve_ty(arg)?);
                }
                let flat = name.flat();
                let def = match self.lookup_type(&flat) {
                    Some(def) => def,
                    None => {
                        return self.err(
                            ElabErrorKind::UnboundIdentifier,
                            format!("unbound type constructor `{}`", name),
                            cty.span,
                        )
                    }
                };
                if def.arity() != resolved.len() {
                    return self.err(
                        ElabErrorKind::ArityMismatch,
                        format!(
                            "type constructor `{}` expects {} arguments, got {}",
                            name,
                            def.arity(),
                            resolved.len()
                        ),
                        cty.span,
                    );
                }
                match def {
                    TypeDef::Alias { ty_vars, ty } => {
                        let mapping: HashMap<SmolStr, Ty> =
                            ty_vars.into_iter().zip(resolved).collect();
                        Ok(subst_named(&ty, &mapping))
                    }
                    _ => Ok(Ty::Con {
                        name: flat,
                        args: resolved,
                    }),
                }
            }
        }
    }

    // ── Declarations ─────────────────────────────────────────────

    fn dec(&mut self, dec: &CDec) -> Result<()> {
        match &dec.kind {
            CDecKind::Val { binds, .. } => {
                for (pat, expr) in binds {
                    let expr_ty = self.expr(expr)?;
                    let mut bound = Vec::new();
                    let pat_ty = self.pat(pat, &mut bound)?;
                    self.check_duplicate_bindings(&bound, pat.span)?;
                    self.unify(&pat_ty, &expr_ty, pat.span)?;
                    if !self.pat_irrefutable(pat) {
                        self.warn("binding not exhaustive", pat.span);
                    }
                    let non_expansive = self.is_non_expansive(expr);
                    for (name, ty) in bound {
                        let scheme = self.generalize(&ty, non_expansive, pat.span)?;
                        self.define_value(name, scheme, IdStatus::Value);
                    }
                }
                Ok(())
            }
            CDecKind::ValRec { binds, .. } => {
                self.push_scope();
                let pre: Vec<Ty> = binds.iter().map(|_| self.fresh()).collect();
                for ((name, _), ty) in binds.iter().zip(pre.iter()) {
                    let entry = (Scheme::mono(ty.clone()), IdStatus::Value);
                    self.scopes
                        .last_mut()
                        .expect("pushed")
                        .values
                        .push((name.clone(), entry));
                }
                for ((_, arms), ty) in binds.iter().zip(pre.iter()) {
                    let dom = self.fresh();
                    let cod = self.fresh();
                    self.elab_match(arms, &dom, &cod, true)?;
                    self.unify(ty, &Ty::fun(dom, cod), arms.span)?;
                }
                self.pop_scope();
                for ((name, arms), ty) in binds.iter().zip(pre.iter()) {
                    let scheme = self.generalize(ty, true, arms.span)?;
                    self.define_value(name.clone(), scheme, IdStatus::Value);
                }
                Ok(())
            }
            CDecKind::Type(binds) => {
                for tb in binds {
                    let ty = self.resolve_ty(&tb.ty)?;
                    self.define_type(
                        tb.name.clone(),
                        TypeDef::Alias {
                            ty_vars: tb.ty_vars.clone(),
                            ty,
                        },
                    );
                }
                Ok(())
            }
            CDecKind::Datatype(binds) => self.dat_binds(binds),
            CDecKind::Abstype { binds, body } => {
                self.push_scope();
                self.dat_binds(binds)?;
                self.push_scope();
                self.dec(body)?;
                let inner = self.pop_scope();
                self.pop_scope();
                // The type survives, abstract and without equality; the
                // constructors do not.
                for db in binds {
                    self.define_type(
                        db.name.clone(),
                        TypeDef::Abstract {
                            arity: db.ty_vars.len(),
                            equality: false,
                        },
                    );
                }
                for (name, def) in inner.types {
                    self.define_type(name, def);
                }
                for (name, (scheme, status)) in inner.values {
                    self.define_value(name, scheme, status);
                }
                Ok(())
            }
            CDecKind::Exception(binds) => {
                for bind in binds {
                    match bind {
                        CExBind::New { name, arg } => {
                            let (scheme, has_arg) = match arg {
                                Some(cty) => {
                                    let ty = self.resolve_ty(cty)?;
                                    let mut names = HashSet::new();
                                    let mut dummy = HashSet::new();
                                    let empty = HashSet::new();
                                    collect_free(&ty, &empty, &mut dummy, &mut names);
                                    if !names.is_empty() {
                                        return self.err(
                                            ElabErrorKind::UnguardedTypeVariable,
                                            format!(
                                                "free type variable in exception `{}`",
                                                name
                                            ),
                                            cty.span,
                                        );
                                    }
                                    (Scheme::mono(Ty::fun(ty, Ty::exn())), true)
                                }
                                None => (Scheme::mono(Ty::exn()), false),
                            };
                            self.define_value(
                                name.clone(),
                                scheme,
                                IdStatus::Exception { has_arg },
                            );
                        }
                        CExBind::Alias { name, target } => {
                            let flat = target.flat();
                            match self.lookup_value(&flat) {
                                Some((scheme, status @ IdStatus::Exception { .. })) => {
                                    self.define_value(name.clone(), scheme, status);
                                }
                                Some(_) => {
                                    return self.err(
                                        ElabErrorKind::UnboundConstructor,
                                        format!("`{}` is not an exception", target),
                                        dec.span,
                                    )
                                }
                                None => {
                                    return self.err(
                                        ElabErrorKind::UnboundConstructor,
                                        format!("unbound exception `{}`", target),
                                        dec.span,
                                    )
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
            CDecKind::Local { outer, inner } => {
                self.push_scope();
                self.dec(outer)?;
                self.push_scope();
                self.dec(inner)?;
                let kept = self.pop_scope();
                self.pop_scope();
                for (name, def) in kept.types {
                    self.define_type(name, def);
                }
                for (name, (scheme, status)) in kept.values {
                    self.define_value(name, scheme, status);
                }
                Ok(())
            }
            CDecKind::Open(names) => {
                for name in names {
                    let entries = self.state.visible_with_prefix(&name.flat());
                    if entries.is_empty() {
                        return self.err(
                            ElabErrorKind::UnboundIdentifier,
                            format!("unbound structure `{}`", name),
                            dec.span,
                        );
                    }
                    for (stripped, statics, _) in entries {
                        if let Some((scheme, status)) = statics {
                            self.define_value(stripped, scheme, status);
                        }
                    }
                }
                Ok(())
            }
            CDecKind::Seq(decs) => {
                for d in decs {
                    self.dec(d)?;
                }
                Ok(())
            }
            CDecKind::Fixity { .. } | CDecKind::Empty => Ok(()),
        }
    }

    fn dat_binds(&mut self, binds: &[CDatBind]) -> Result<()> {
        // Register the group first so constructor argument types can
        // reference any member, including themselves.
        for db in binds {
            self.define_type(
                db.name.clone(),
                TypeDef::Datatype {
                    arity: db.ty_vars.len(),
                    constructors: db.ctors.iter().map(|(n, _)| n.clone()).collect(),
                    equality: true,
                },
            );
        }
        let mut arg_tys: HashMap<SmolStr, Vec<Ty>> = HashMap::new();
        for db in binds {
            let vars: Vec<Ty> = db.ty_vars.iter().map(|v| Ty::Var(v.clone())).collect();
            let result = Ty::Con {
                name: db.name.clone(),
                args: vars,
            };
            let mut args_here = Vec::new();
            for (cname, arg) in &db.ctors {
                let (ty, has_arg) = match arg {
                    Some(cty) => {
                        let arg_ty = self.resolve_ty(cty)?;
                        args_here.push(arg_ty.clone());
                        (Ty::fun(arg_ty, result.clone()), true)
                    }
                    None => (result.clone(), false),
                };
                self.define_value(
                    cname.clone(),
                    Scheme {
                        quantified: db.ty_vars.clone(),
                        ty,
                    },
                    IdStatus::Constructor { has_arg },
                );
            }
            arg_tys.insert(db.name.clone(), args_here);
        }
        // Equality: a datatype admits it when every constructor argument
        // does, treating the whole group optimistically.
        let group: HashSet<SmolStr> = binds.iter().map(|db| db.name.clone()).collect();
        for db in binds {
            let equality = arg_tys[&db.name]
                .iter()
                .all(|ty| self.static_admits_equality(ty, &group));
            self.define_type(
                db.name.clone(),
                TypeDef::Datatype {
                    arity: db.ty_vars.len(),
                    constructors: db.ctors.iter().map(|(n, _)| n.clone()).collect(),
                    equality,
                },
            );
        }
        Ok(())
    }

    fn static_admits_equality(&self, ty: &Ty, assume: &HashSet<SmolStr>) -> bool {
        match ty {
            Ty::UVar(_) | Ty::Flex { .. } => false,
            Ty::Var(_) => true,
            Ty::Fun(_, _) => false,
            Ty::Record(rows) => rows
                .iter()
                .all(|(_, t)| self.static_admits_equality(t, assume)),
            Ty::Con { name, args } => {
                let head = match name.as_str() {
                    "int" | "word" | "real" | "char" | "string" | "bool" => true,
                    "exn" => false,
                    "list" | "option" | "ref" | "vector" => true,
                    _ if assume.contains(name.as_str()) => true,
                    _ => match self.lookup_type(name) {
                        Some(TypeDef::Datatype { equality, .. })
                        | Some(TypeDef::Abstract { equality, .. }) => equality,
                        _ => false,
                    },
                };
                head && args
                    .iter()
                    .all(|t| self.static_admits_equality(t, assume))
            }
        }
    }

    // ── Expressions ──────────────────────────────────────────────

    fn expr(&mut self, expr: &CExpr) -> Result<Ty> {
        let span = expr.span;
        match &expr.kind {
            CExprKind::Const(c) => Ok(constant_ty(c)),
            CExprKind::Var(name) => match self.lookup_value(&name.flat()) {
                Some((scheme, _)) => Ok(self.instantiate(&scheme)),
                None => self.err(
                    ElabErrorKind::UnboundIdentifier,
                    format!("unbound identifier `{}`", name),
                    span,
                ),
            },
            CExprKind::Record(rows) => {
                let mut out: Vec<(SmolStr, Ty)> = Vec::new();
                for (label, e) in rows {
                    if out.iter().any(|(l, _)| l == label) {
                        return self.err(
                            ElabErrorKind::RecordLabelMismatch,
                            format!("duplicate record label `{}`", label),
                            span,
                        );
                    }
                    out.push((label.clone(), self.expr(e)?));
                }
                Ok(Ty::Record(out))
            }
            CExprKind::Fn(arms) => {
                let dom = self.fresh();
                let cod = self.fresh();
                self.elab_match(arms, &dom, &cod, true)?;
                Ok(Ty::fun(dom, cod))
            }
            CExprKind::App { func, arg } => {
                let func_ty = self.expr(func)?;
                let arg_ty = self.expr(arg)?;
                let result = self.fresh();
                self.unify(
                    &func_ty,
                    &Ty::fun(arg_ty, result.clone()),
                    func.span,
                )?;
                Ok(self.apply(&result))
            }
            CExprKind::Typed { expr: inner, ty } => {
                let inferred = self.expr(inner)?;
                let annotated = self.resolve_ty(ty)?;
                self.unify(&annotated, &inferred, span)?;
                Ok(self.apply(&annotated))
            }
            CExprKind::Raise(inner) => {
                let ty = self.expr(inner)?;
                self.unify(&ty, &Ty::exn(), inner.span)?;
                Ok(self.fresh())
            }
            CExprKind::Handle { expr: inner, arms } => {
                let ty = self.expr(inner)?;
                self.elab_match(arms, &Ty::exn(), &ty, false)?;
                Ok(self.apply(&ty))
            }
            CExprKind::Let { dec, body } => {
                self.push_scope();
                self.dec(dec)?;
                let ty = self.expr(body)?;
                self.pop_scope();
                Ok(ty)
            }
            CExprKind::Vector(items) => {
                let elem = self.fresh();
                for item in items {
                    let t = self.expr(item)?;
                    self.unify(&elem, &t, item.span)?;
                }
                Ok(Ty::Con {
                    name: "vector".into(),
                    args: vec![self.apply(&elem)],
                })
            }
        }
    }

    fn elab_match(
        &mut self,
        arms: &CMatch,
        dom: &Ty,
        cod: &Ty,
        warn_inexhaustive: bool,
    ) -> Result<()> {
        for (pat, body) in &arms.arms {
            self.push_scope();
            let mut bound = Vec::new();
            let pat_ty = self.pat(pat, &mut bound)?;
            self.check_duplicate_bindings(&bound, pat.span)?;
            for (name, ty) in bound {
                let entry = (Scheme::mono(ty), IdStatus::Value);
                self.scopes
                    .last_mut()
                    .expect("pushed")
                    .values
                    .push((name, entry));
            }
            self.unify(&pat_ty, dom, pat.span)?;
            let body_ty = self.expr(body)?;
            self.unify(&body_ty, cod, body.span)?;
            self.pop_scope();
        }
        if warn_inexhaustive && !self.match_exhaustive(arms) {
            self.warn("match nonexhaustive", arms.span);
        }
        Ok(())
    }

    fn check_duplicate_bindings(
        &self,
        bound: &[(SmolStr, Ty)],
        span: Span,
    ) -> Result<()> {
        for (i, (name, _)) in bound.iter().enumerate() {
            if bound.iter().skip(i + 1).any(|(n, _)| n == name) {
                return self.err(
                    ElabErrorKind::TypeMismatch,
                    format!("variable `{}` is bound twice in one pattern", name),
                    span,
                );
            }
        }
        Ok(())
    }

    // ── Patterns ─────────────────────────────────────────────────

    fn pat(&mut self, pat: &CPat, bound: &mut Vec<(SmolStr, Ty)>) -> Result<Ty> {
        let span = pat.span;
        match &pat.kind {
            CPatKind::Wildcard => Ok(self.fresh()),
            CPatKind::Const(c) => Ok(constant_ty(c)),
            CPatKind::Var(name) => {
                let flat = name.flat();
                match self.lookup_value(&flat) {
                    Some((scheme, status)) if status.is_constructor() => {
                        let has_arg = matches!(
                            status,
                            IdStatus::Constructor { has_arg: true }
                                | IdStatus::Exception { has_arg: true }
                        );
                        if has_arg {
                            return self.err(
                                ElabErrorKind::ArityMismatch,
                                format!("constructor `{}` expects an argument", name),
                                span,
                            );
                        }
                        Ok(self.instantiate(&scheme))
                    }
                    _ if name.is_qualified() => self.err(
                        ElabErrorKind::UnboundConstructor,
                        format!("`{}` is not a constructor", name),
                        span,
                    ),
                    _ => {
                        let ty = self.fresh();
                        bound.push((name.name.clone(), ty.clone()));
                        Ok(ty)
                    }
                }
            }
            CPatKind::Record { rows, flexible } => {
                let mut out: Vec<(SmolStr, Ty)> = Vec::new();
                for (label, p) in rows {
                    if out.iter().any(|(l, _)| l == label) {
                        return self.err(
                            ElabErrorKind::RecordLabelMismatch,
                            format!("duplicate record label `{}`", label),
                            span,
                        );
                    }
                    out.push((label.clone(), self.pat(p, bound)?));
                }
                if *flexible {
                    let uvar = match self.fresh() {
                        Ty::UVar(id) => id,
                        _ => unreachable!(),
                    };
                    Ok(Ty::Flex { uvar, rows: out })
                } else {
                    Ok(Ty::Record(out))
                }
            }
            CPatKind::Con { name, arg } => {
                let flat = name.flat();
                let (scheme, status) = match self.lookup_value(&flat) {
                    Some(entry) => entry,
                    None => {
                        return self.err(
                            ElabErrorKind::UnboundConstructor,
                            format!("unbound constructor `{}`", name),
                            span,
                        )
                    }
                };
                let has_arg = match status {
                    IdStatus::Constructor { has_arg } | IdStatus::Exception { has_arg } => {
                        has_arg
                    }
                    IdStatus::Value => {
                        return self.err(
                            ElabErrorKind::UnboundConstructor,
                            format!("`{}` is not a constructor", name),
                            span,
                        )
                    }
                };
                if !has_arg {
                    return self.err(
                        ElabErrorKind::ArityMismatch,
                        format!("constructor `{}` takes no argument", name),
                        span,
                    );
                }
                let inst = self.instantiate(&scheme);
                let (arg_ty, result_ty) = match inst {
                    Ty::Fun(dom, cod) => (*dom, *cod),
                    other => {
                        return self.err(
                            ElabErrorKind::ArityMismatch,
                            format!("constructor `{}` has type {}", name, other),
                            span,
                        )
                    }
                };
                let pat_ty = self.pat(arg, bound)?;
                self.unify(&pat_ty, &arg_ty, arg.span)?;
                Ok(self.apply(&result_ty))
            }
            CPatKind::Typed { pat: inner, ty } => {
                let pat_ty = self.pat(inner, bound)?;
                let annotated = self.resolve_ty(ty)?;
                self.unify(&annotated, &pat_ty, span)?;
                Ok(self.apply(&annotated))
            }
            CPatKind::Layered { var, ty, pat: inner } => {
                if matches!(
                    self.lookup_value(var),
                    Some((_, status)) if status.is_constructor()
                ) {
                    return self.err(
                        ElabErrorKind::UnboundIdentifier,
                        format!("cannot bind constructor `{}` in a layered pattern", var),
                        span,
                    );
                }
                let pat_ty = self.pat(inner, bound)?;
                if let Some(cty) = ty {
                    let annotated = self.resolve_ty(cty)?;
                    self.unify(&annotated, &pat_ty, span)?;
                }
                let ty = self.apply(&pat_ty);
                bound.push((var.clone(), ty.clone()));
                Ok(ty)
            }
            CPatKind::Vector(items) => {
                let elem = self.fresh();
                for item in items {
                    let t = self.pat(item, bound)?;
                    self.unify(&elem, &t, item.span)?;
                }
                Ok(Ty::Con {
                    name: "vector".into(),
                    args: vec![self.apply(&elem)],
                })
            }
        }
    }

    // ── Value restriction ────────────────────────────────────────

    fn is_non_expansive(&self, expr: &CExpr) -> bool {
        match &expr.kind {
            CExprKind::Const(_) | CExprKind::Var(_) | CExprKind::Fn(_) => true,
            CExprKind::Typed { expr, .. } => self.is_non_expansive(expr),
            CExprKind::Record(rows) => {
                rows.iter().all(|(_, e)| self.is_non_expansive(e))
            }
            CExprKind::Vector(items) => {
                items.iter().all(|e| self.is_non_expansive(e))
            }
            CExprKind::App { func, arg } => {
                let is_ctor = match &func.kind {
                    CExprKind::Var(name) => {
                        let flat = name.flat();
                        flat != "ref"
                            && matches!(
                                self.lookup_value(&flat),
                                Some((_, status)) if status.is_constructor()
                            )
                    }
                    _ => false,
                };
                is_ctor && self.is_non_expansive(arg)
            }
            _ => false,
        }
    }

    // ── Exhaustiveness (best effort) ─────────────────────────────

    fn pat_irrefutable(&self, pat: &CPat) -> bool {
        match &pat.kind {
            CPatKind::Wildcard => true,
            CPatKind::Var(name) => !matches!(
                self.lookup_value(&name.flat()),
                Some((_, status)) if status.is_constructor()
            ),
            CPatKind::Record { rows, .. } => {
                rows.iter().all(|(_, p)| self.pat_irrefutable(p))
            }
            CPatKind::Typed { pat, .. } => self.pat_irrefutable(pat),
            CPatKind::Layered { pat, .. } => self.pat_irrefutable(pat),
            _ => false,
        }
    }

    fn match_exhaustive(&self, arms: &CMatch) -> bool {
        let pats: Vec<&CPat> = arms.arms.iter().map(|(pat, _)| pat.as_ref()).collect();
        self.pats_exhaustive(&pats)
    }

    /// Best-effort exhaustiveness over one column of patterns: either an
    /// irrefutable row exists, the column covers all constructors of one
    /// datatype, or some record field alone discriminates and its column
    /// is itself exhaustive.
    fn pats_exhaustive(&self, pats: &[&CPat]) -> bool {
        if pats.iter().any(|p| self.pat_irrefutable(p)) {
            return true;
        }
        let tops: Vec<&CPat> = pats.iter().map(|p| strip_pat(p)).collect();

        if tops
            .iter()
            .all(|p| matches!(p.kind, CPatKind::Record { .. }))
        {
            return self.record_column_exhaustive(&tops);
        }

        // Constructor coverage; arguments are checked column-wise per
        // constructor.
        let mut datatype: Option<SmolStr> = None;
        let mut nullary: HashSet<SmolStr> = HashSet::new();
        let mut unary: HashMap<SmolStr, Vec<&CPat>> = HashMap::new();
        for pat in &tops {
            let (name, arg) = match &pat.kind {
                CPatKind::Var(name) => (name.flat(), None),
                CPatKind::Con { name, arg } => (name.flat(), Some(arg.as_ref())),
                _ => return false,
            };
            let scheme = match self.lookup_value(&name) {
                Some((scheme, status)) if status.is_constructor() => scheme,
                _ => return false,
            };
            let result = match &scheme.ty {
                Ty::Fun(_, cod) => cod.as_ref(),
                ty => ty,
            };
            let ty_name = match result {
                Ty::Con { name, .. } => name.clone(),
                _ => return false,
            };
            match &datatype {
                None => datatype = Some(ty_name),
                Some(existing) if *existing == ty_name => {}
                Some(_) => return false,
            }
            match arg {
                None => {
                    nullary.insert(name);
                }
                Some(arg) => unary.entry(name).or_default().push(arg),
            }
        }
        let ty_name = match datatype {
            Some(name) => name,
            None => return false,
        };
        match self.lookup_type(&ty_name) {
            Some(TypeDef::Datatype { constructors, .. }) => {
                constructors.iter().all(|c| {
                    nullary.contains(c)
                        || unary
                            .get(c)
                            .is_some_and(|column| self.pats_exhaustive(column))
                })
            }
            _ => false,
        }
    }

    /// A record/tuple column is exhaustive when one field alone does the
    /// discriminating: every other field is irrefutable in every row and
    /// that field's column is exhaustive.
    fn record_column_exhaustive(&self, tops: &[&CPat]) -> bool {
        let first_rows = match &tops[0].kind {
            CPatKind::Record { rows, .. } => rows,
            _ => return false,
        };
        'labels: for (label, _) in first_rows {
            let mut column = Vec::new();
            for pat in tops {
                let rows = match &pat.kind {
                    CPatKind::Record { rows, .. } => rows,
                    _ => return false,
                };
                let mut this = None;
                for (l, p) in rows {
                    if l == label {
                        this = Some(p.as_ref());
                    } else if !self.pat_irrefutable(p) {
                        continue 'labels;
                    }
                }
                match this {
                    Some(p) => column.push(p),
                    None => continue 'labels,
                }
            }
            if self.pats_exhaustive(&column) {
                return true;
            }
        }
        false
    }
}

fn strip_pat(pat: &CPat) -> &CPat {
    match &pat.kind {
        CPatKind::Typed { pat, .. } => strip_pat(pat),
        CPatKind::Layered { pat, .. } => strip_pat(pat),
        _ => pat,
    }
}

// ── Free helpers ─────────────────────────────────────────────────

fn constant_ty(c: &marlin_ast::Constant) -> Ty {
    use marlin_ast::Constant;
    match c {
        Constant::Int(_) => Ty::int(),
        Constant::Word(_) => Ty::word(),
        Constant::Real(_) => Ty::real(),
        Constant::Char(_) => Ty::char(),
        Constant::Str(_) => Ty::string(),
    }
}

fn subst_named(ty: &Ty, mapping: &HashMap<SmolStr, Ty>) -> Ty {
    match ty {
        Ty::Var(name) => mapping.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Ty::UVar(_) => ty.clone(),
        Ty::Con { name, args } => Ty::Con {
            name: name.clone(),
            args: args.iter().map(|a| subst_named(a, mapping)).collect(),
        },
        Ty::Record(rows) => Ty::Record(
            rows.iter()
                .map(|(l, t)| (l.clone(), subst_named(t, mapping)))
                .collect(),
        ),
        Ty::Flex { uvar, rows } => Ty::Flex {
            uvar: *uvar,
            rows: rows
                .iter()
                .map(|(l, t)| (l.clone(), subst_named(t, mapping)))
                .collect(),
        },
        Ty::Fun(dom, cod) => Ty::fun(subst_named(dom, mapping), subst_named(cod, mapping)),
    }
}

fn collect_free(
    ty: &Ty,
    bound: &HashSet<&SmolStr>,
    uvars: &mut HashSet<UVarId>,
    names: &mut HashSet<SmolStr>,
) {
    match ty {
        Ty::UVar(id) => {
            uvars.insert(*id);
        }
        Ty::Flex { uvar, rows } => {
            uvars.insert(*uvar);
            for (_, t) in rows {
                collect_free(t, bound, uvars, names);
            }
        }
        Ty::Var(name) => {
            if !bound.contains(name) {
                names.insert(name.clone());
            }
        }
        Ty::Con { args, .. } => {
            for a in args {
                collect_free(a, bound, uvars, names);
            }
        }
        Ty::Record(rows) => {
            for (_, t) in rows {
                collect_free(t, bound, uvars, names);
            }
        }
        Ty::Fun(dom, cod) => {
            collect_free(dom, bound, uvars, names);
            collect_free(cod, bound, uvars, names);
        }
    }
}

fn collect_uvars(ty: &Ty, out: &mut Vec<UVarId>, flex: &mut bool) {
    match ty {
        Ty::UVar(id) => {
            if !out.contains(id) {
                out.push(*id);
            }
        }
        Ty::Flex { uvar, rows } => {
            *flex = true;
            if !out.contains(uvar) {
                out.push(*uvar);
            }
            for (_, t) in rows {
                collect_uvars(t, out, flex);
            }
        }
        Ty::Var(_) => {}
        Ty::Con { args, .. } => {
            for a in args {
                collect_uvars(a, out, flex);
            }
        }
        Ty::Record(rows) => {
            for (_, t) in rows {
                collect_uvars(t, out, flex);
            }
        }
        Ty::Fun(dom, cod) => {
            collect_uvars(dom, out, flex);
            collect_uvars(cod, out, flex);
        }
    }
}

fn has_flex(ty: &Ty) -> bool {
    match ty {
        Ty::Flex { .. } => true,
        Ty::UVar(_) | Ty::Var(_) => false,
        Ty::Con { args, .. } => args.iter().any(has_flex),
        Ty::Record(rows) => rows.iter().any(|(_, t)| has_flex(t)),
        Ty::Fun(dom, cod) => has_flex(dom) || has_flex(cod),
    }
}

/// Quantifiable named variables of `ty` in traversal order: everything
/// rigid except weak residues and names visible in the environment.
fn collect_quantifiable(ty: &Ty, env_names: &HashSet<SmolStr>, out: &mut Vec<SmolStr>) {
    match ty {
        Ty::Var(name) => {
            if !Ty::is_weak_name(name)
                && !env_names.contains(name)
                && !out.contains(name)
            {
                out.push(name.clone());
            }
        }
        Ty::UVar(_) => {}
        Ty::Flex { rows, .. } => {
            for (_, t) in rows {
                collect_quantifiable(t, env_names, out);
            }
        }
        Ty::Con { args, .. } => {
            for a in args {
                collect_quantifiable(a, env_names, out);
            }
        }
        Ty::Record(rows) => {
            for (_, t) in rows {
                collect_quantifiable(t, env_names, out);
            }
        }
        Ty::Fun(dom, cod) => {
            collect_quantifiable(dom, env_names, out);
            collect_quantifiable(cod, env_names, out);
        }
    }
}

fn letters(mut n: usize) -> String {
    let mut out = String::new();
    loop {
        out.insert(0, (b'a' + (n % 26) as u8) as char);
        n /= 26;
        if n == 0 {
            return out;
        }
        n -= 1;
    }
}

fn next_name(counter: &mut usize, equality: bool, used: &HashSet<SmolStr>) -> SmolStr {
    loop {
        let base = letters(*counter);
        *counter += 1;
        let name = if equality {
            SmolStr::new(format!("''{}", base))
        } else {
            SmolStr::new(format!("'{}", base))
        };
        if !used.contains(&name) {
            return name;
        }
    }
}
