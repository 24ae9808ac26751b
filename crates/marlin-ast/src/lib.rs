//! Surface abstract syntax for Marlin.
//!
//! The parser allocates every node into the arenas of a [`SyntaxTree`] and
//! hands back stable ids. Derived forms (tuples, lists, `if`, `case`,
//! sequences, `fun` clauses, ...) survive in the surface tree; the
//! [`lower`] module rewrites them into the core calculus before
//! elaboration and evaluation.

pub mod core;
pub mod fixity;
pub mod lower;

use la_arena::{Arena, Idx};
pub use marlin_lexer::Span;
use smol_str::SmolStr;

pub type ExprId = Idx<Expr>;
pub type PatId = Idx<Pat>;
pub type TyId = Idx<TyExpr>;
pub type DecId = Idx<Dec>;

/// Arena storage for one parsed chunk. Declarations own their nodes; the
/// simplifier produces a fresh core tree and the arenas can be dropped
/// once lowering is done.
#[derive(Debug, Default)]
pub struct SyntaxTree {
    pub exprs: Arena<Expr>,
    pub pats: Arena<Pat>,
    pub tys: Arena<TyExpr>,
    pub decs: Arena<Dec>,
}

impl SyntaxTree {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A possibly qualified name (`x`, `Math.sqrt`). Qualification is flat:
/// the full dotted text is the binding key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LongName {
    pub qualifiers: Vec<SmolStr>,
    pub name: SmolStr,
}

impl LongName {
    pub fn plain(name: impl Into<SmolStr>) -> Self {
        Self {
            qualifiers: Vec::new(),
            name: name.into(),
        }
    }

    pub fn qualified(qualifiers: Vec<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            qualifiers,
            name: name.into(),
        }
    }

    pub fn is_qualified(&self) -> bool {
        !self.qualifiers.is_empty()
    }

    /// The flat dotted spelling used as the environment key.
    pub fn flat(&self) -> SmolStr {
        if self.qualifiers.is_empty() {
            self.name.clone()
        } else {
            let mut out = String::new();
            for q in &self.qualifiers {
                out.push_str(q);
                out.push('.');
            }
            out.push_str(&self.name);
            SmolStr::new(out)
        }
    }
}

impl std::fmt::Display for LongName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for q in &self.qualifiers {
            write!(f, "{}.", q)?;
        }
        write!(f, "{}", self.name)
    }
}

/// Special constants. Booleans are not here; `true` and `false` are
/// constructors of the built-in `bool` datatype.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Word(i64),
    Real(f64),
    Char(char),
    Str(String),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Word(a), Constant::Word(b)) => a == b,
            // Reals compare bit-equal in patterns.
            (Constant::Real(a), Constant::Real(b)) => a.to_bits() == b.to_bits(),
            (Constant::Char(a), Constant::Char(b)) => a == b,
            (Constant::Str(a), Constant::Str(b)) => a == b,
            _ => false,
        }
    }
}

// ── Expressions ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum ExprKind {
    Const(Constant),
    /// Value identifier or constructor; `op` marks an explicit `op` prefix.
    Ident { name: LongName, op: bool },
    Record(Vec<(SmolStr, ExprId)>),
    /// Record selector `#lab`.
    Selector(SmolStr),
    Tuple(Vec<ExprId>),
    List(Vec<ExprId>),
    /// Vector literal `#[...]`, only parsed when enabled.
    Vector(Vec<ExprId>),
    /// `(e1; ...; en)` with at least two expressions.
    Seq(Vec<ExprId>),
    Let { dec: DecId, body: Vec<ExprId> },
    App { func: ExprId, arg: ExprId },
    Typed { expr: ExprId, ty: TyId },
    Handle { expr: ExprId, arms: Vec<MatchArm> },
    Raise(ExprId),
    Fn { arms: Vec<MatchArm> },
    Case { scrutinee: ExprId, arms: Vec<MatchArm> },
    If {
        cond: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    AndAlso { lhs: ExprId, rhs: ExprId },
    OrElse { lhs: ExprId, rhs: ExprId },
    While { cond: ExprId, body: ExprId },
}

#[derive(Debug, Clone, Copy)]
pub struct MatchArm {
    pub pat: PatId,
    pub expr: ExprId,
}

// ── Patterns ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Pat {
    pub kind: PatKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum PatKind {
    Wildcard,
    Const(Constant),
    /// Variable or nullary constructor; resolved against the environment.
    Ident { name: LongName, op: bool },
    Record {
        rows: Vec<(SmolStr, PatId)>,
        /// `...` present: the pattern matches records with extra fields.
        flexible: bool,
    },
    Tuple(Vec<PatId>),
    List(Vec<PatId>),
    /// Constructor application, including resolved infix (`x :: xs`).
    Con {
        name: LongName,
        op: bool,
        arg: PatId,
    },
    Typed { pat: PatId, ty: TyId },
    /// Layered pattern `x as p`, optionally `x : ty as p`.
    Layered {
        var: SmolStr,
        ty: Option<TyId>,
        pat: PatId,
    },
}

// ── Type expressions ──────────────────────────────────────────────

#[derive(Debug)]
pub struct TyExpr {
    pub kind: TyExprKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum TyExprKind {
    /// `'a` or `''a`; the prime count travels in the name.
    Var(SmolStr),
    Record(Vec<(SmolStr, TyId)>),
    Tuple(Vec<TyId>),
    Fun(TyId, TyId),
    Con { name: LongName, args: Vec<TyId> },
}

// ── Declarations ──────────────────────────────────────────────────

#[derive(Debug)]
pub struct Dec {
    pub kind: DecKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum DecKind {
    Val {
        ty_vars: Vec<SmolStr>,
        rec: bool,
        binds: Vec<ValBind>,
    },
    Fun {
        ty_vars: Vec<SmolStr>,
        binds: Vec<FunBind>,
    },
    Type(Vec<TypBind>),
    Datatype(Vec<DatBind>),
    Abstype {
        binds: Vec<DatBind>,
        body: DecId,
    },
    Exception(Vec<ExBind>),
    Local { outer: DecId, inner: DecId },
    Open(Vec<LongName>),
    Seq(Vec<DecId>),
    Fixity {
        fixity: FixityDecl,
        ids: Vec<SmolStr>,
    },
    Empty,
}

#[derive(Debug)]
pub struct ValBind {
    pub pat: PatId,
    pub expr: ExprId,
    pub span: Span,
}

#[derive(Debug)]
pub struct FunBind {
    pub name: SmolStr,
    pub clauses: Vec<FunClause>,
    pub span: Span,
}

#[derive(Debug)]
pub struct FunClause {
    pub pats: Vec<PatId>,
    pub ret_ty: Option<TyId>,
    pub body: ExprId,
    pub span: Span,
}

#[derive(Debug)]
pub struct TypBind {
    pub ty_vars: Vec<SmolStr>,
    pub name: SmolStr,
    pub ty: TyId,
    pub span: Span,
}

#[derive(Debug)]
pub struct DatBind {
    pub ty_vars: Vec<SmolStr>,
    pub name: SmolStr,
    pub ctors: Vec<ConBind>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ConBind {
    pub name: SmolStr,
    pub arg: Option<TyId>,
    pub span: Span,
}

#[derive(Debug)]
pub enum ExBind {
    New {
        name: SmolStr,
        arg: Option<TyId>,
        span: Span,
    },
    Alias {
        name: SmolStr,
        target: LongName,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixityDecl {
    Infix(u8),
    Infixr(u8),
    Nonfix,
}

/// Makes the `1..n` tuple labels.
pub fn tuple_label(index: usize) -> SmolStr {
    SmolStr::new(format!("{}", index + 1))
}

/// True when `rows` are exactly the labels `1..n` in some order, i.e. the
/// record is tuple sugar.
pub fn is_tuple_labels<T>(rows: &[(SmolStr, T)]) -> bool {
    if rows.len() < 2 {
        return false;
    }
    let mut seen = vec![false; rows.len()];
    for (label, _) in rows {
        match label.parse::<usize>() {
            Ok(n) if n >= 1 && n <= rows.len() && !seen[n - 1] => seen[n - 1] = true,
            _ => return false,
        }
    }
    true
}
