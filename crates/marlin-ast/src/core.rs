//! The core calculus.
//!
//! Nodes are `Rc`-shared plain data: closures created during evaluation
//! keep their match bodies alive across top-level chunks, long after the
//! surface arenas of the chunk that produced them are gone.

use crate::{Constant, FixityDecl, LongName, Span};
use smol_str::SmolStr;
use std::rc::Rc;

pub type ExprRc = Rc<CExpr>;
pub type PatRc = Rc<CPat>;
pub type TyRc = Rc<CTy>;
pub type DecRc = Rc<CDec>;

#[derive(Debug)]
pub struct CExpr {
    pub kind: CExprKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum CExprKind {
    Const(Constant),
    /// Value identifier or constructor.
    Var(LongName),
    Record(Vec<(SmolStr, ExprRc)>),
    Fn(Rc<CMatch>),
    App { func: ExprRc, arg: ExprRc },
    Typed { expr: ExprRc, ty: TyRc },
    Raise(ExprRc),
    Handle { expr: ExprRc, arms: Rc<CMatch> },
    Let { dec: DecRc, body: ExprRc },
    /// Vector literal, only present with vector support enabled.
    Vector(Vec<ExprRc>),
}

#[derive(Debug)]
pub struct CMatch {
    pub arms: Vec<(PatRc, ExprRc)>,
    pub span: Span,
}

#[derive(Debug)]
pub struct CPat {
    pub kind: CPatKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum CPatKind {
    Wildcard,
    Const(Constant),
    /// Variable or nullary constructor; which one is decided by the
    /// environment at elaboration/evaluation time.
    Var(LongName),
    Record {
        rows: Vec<(SmolStr, PatRc)>,
        flexible: bool,
    },
    Con { name: LongName, arg: PatRc },
    Typed { pat: PatRc, ty: TyRc },
    Layered {
        var: SmolStr,
        ty: Option<TyRc>,
        pat: PatRc,
    },
    Vector(Vec<PatRc>),
}

#[derive(Debug)]
pub struct CTy {
    pub kind: CTyKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum CTyKind {
    Var(SmolStr),
    Record(Vec<(SmolStr, TyRc)>),
    Fun(TyRc, TyRc),
    Con { name: LongName, args: Vec<TyRc> },
}

#[derive(Debug)]
pub struct CDec {
    pub kind: CDecKind,
    pub span: Span,
}

#[derive(Debug)]
pub enum CDecKind {
    Val {
        ty_vars: Vec<SmolStr>,
        binds: Vec<(PatRc, ExprRc)>,
    },
    ValRec {
        ty_vars: Vec<SmolStr>,
        binds: Vec<(SmolStr, Rc<CMatch>)>,
    },
    Type(Vec<CTypBind>),
    Datatype(Vec<CDatBind>),
    Abstype {
        binds: Vec<CDatBind>,
        body: DecRc,
    },
    Exception(Vec<CExBind>),
    Local { outer: DecRc, inner: DecRc },
    Open(Vec<LongName>),
    Seq(Vec<DecRc>),
    Fixity {
        fixity: FixityDecl,
        ids: Vec<SmolStr>,
    },
    Empty,
}

#[derive(Debug)]
pub struct CTypBind {
    pub ty_vars: Vec<SmolStr>,
    pub name: SmolStr,
    pub ty: TyRc,
}

#[derive(Debug)]
pub struct CDatBind {
    pub ty_vars: Vec<SmolStr>,
    pub name: SmolStr,
    pub ctors: Vec<(SmolStr, Option<TyRc>)>,
}

#[derive(Debug)]
pub enum CExBind {
    New { name: SmolStr, arg: Option<TyRc> },
    Alias { name: SmolStr, target: LongName },
}

impl CExpr {
    pub fn new(kind: CExprKind, span: Span) -> ExprRc {
        Rc::new(CExpr { kind, span })
    }

    /// A reference to a plain (unqualified) identifier.
    pub fn var(name: impl Into<SmolStr>, span: Span) -> ExprRc {
        CExpr::new(CExprKind::Var(LongName::plain(name)), span)
    }

    /// The unit value `()`.
    pub fn unit(span: Span) -> ExprRc {
        CExpr::new(CExprKind::Record(Vec::new()), span)
    }
}

impl CPat {
    pub fn new(kind: CPatKind, span: Span) -> PatRc {
        Rc::new(CPat { kind, span })
    }

    pub fn wildcard(span: Span) -> PatRc {
        CPat::new(CPatKind::Wildcard, span)
    }

    /// The unit pattern `()`.
    pub fn unit(span: Span) -> PatRc {
        CPat::new(
            CPatKind::Record {
                rows: Vec::new(),
                flexible: false,
            },
            span,
        )
    }
}
