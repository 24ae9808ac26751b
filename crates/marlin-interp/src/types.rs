//! Static types and type schemes.

use smol_str::SmolStr;
use std::fmt;

pub type UVarId = u32;

/// A static type. Tuples are records labelled `1..n`; the empty tuple is
/// the empty record and prints as `unit`.
#[derive(Clone, Debug, PartialEq)]
pub enum Ty {
    /// Unification variable, meaningful only inside one elaboration run.
    UVar(UVarId),
    /// Named (rigid) type variable: user-written `'a`, a quantifier, or a
    /// weak residue of the value restriction (`'_a`). Two leading primes
    /// mark an equality variable.
    Var(SmolStr),
    /// Applied type constructor: `int`, `'a list`, ...
    Con { name: SmolStr, args: Vec<Ty> },
    /// Complete record type.
    Record(Vec<(SmolStr, Ty)>),
    /// Record type of a `...` pattern: the known rows plus an identity
    /// variable that the full record type resolves through.
    Flex {
        uvar: UVarId,
        rows: Vec<(SmolStr, Ty)>,
    },
    Fun(Box<Ty>, Box<Ty>),
}

impl Ty {
    pub fn con0(name: impl Into<SmolStr>) -> Ty {
        Ty::Con {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn int() -> Ty {
        Ty::con0("int")
    }

    pub fn real() -> Ty {
        Ty::con0("real")
    }

    pub fn word() -> Ty {
        Ty::con0("word")
    }

    pub fn bool() -> Ty {
        Ty::con0("bool")
    }

    pub fn char() -> Ty {
        Ty::con0("char")
    }

    pub fn string() -> Ty {
        Ty::con0("string")
    }

    pub fn exn() -> Ty {
        Ty::con0("exn")
    }

    pub fn unit() -> Ty {
        Ty::Record(Vec::new())
    }

    pub fn list(elem: Ty) -> Ty {
        Ty::Con {
            name: "list".into(),
            args: vec![elem],
        }
    }

    pub fn fun(dom: Ty, cod: Ty) -> Ty {
        Ty::Fun(Box::new(dom), Box::new(cod))
    }

    pub fn pair(a: Ty, b: Ty) -> Ty {
        Ty::Record(vec![("1".into(), a), ("2".into(), b)])
    }

    /// Equality attribute of a named type variable.
    pub fn is_equality_name(name: &str) -> bool {
        name.starts_with("''")
    }

    /// Weak type variables are the un-generalized residue of expansive
    /// bindings; they are rigid but freshly invented.
    pub fn is_weak_name(name: &str) -> bool {
        name.trim_start_matches('\'').starts_with('_')
    }
}

/// A polymorphic type: `∀ quantified. ty`. Quantified entries are the
/// names of `Ty::Var`s inside `ty`.
#[derive(Clone, Debug)]
pub struct Scheme {
    pub quantified: Vec<SmolStr>,
    pub ty: Ty,
}

impl Scheme {
    pub fn mono(ty: Ty) -> Scheme {
        Scheme {
            quantified: Vec::new(),
            ty,
        }
    }
}

fn is_tuple_rows(rows: &[(SmolStr, Ty)]) -> bool {
    marlin_ast::is_tuple_labels(rows)
}

/// Precedence context for printing: 0 allows arrows, 1 is a tuple
/// component, 2 is a constructor argument.
fn fmt_prec(ty: &Ty, prec: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match ty {
        Ty::UVar(id) => write!(f, "'?{}", id),
        Ty::Var(name) => write!(f, "{}", name),
        Ty::Con { name, args } => {
            if args.is_empty() {
                return write!(f, "{}", name);
            }
            if args.len() == 1 {
                fmt_prec(&args[0], 2, f)?;
            } else {
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    fmt_prec(arg, 0, f)?;
                }
                write!(f, ")")?;
            }
            write!(f, " {}", name)
        }
        Ty::Record(rows) if rows.is_empty() => write!(f, "unit"),
        Ty::Record(rows) if is_tuple_rows(rows) => {
            if prec >= 2 {
                write!(f, "(")?;
            }
            let mut ordered: Vec<_> = rows.iter().collect();
            ordered.sort_by_key(|(label, _)| label.parse::<usize>().unwrap_or(0));
            for (i, (_, ty)) in ordered.iter().enumerate() {
                if i > 0 {
                    write!(f, " * ")?;
                }
                fmt_prec(ty, 2, f)?;
            }
            if prec >= 2 {
                write!(f, ")")?;
            }
            Ok(())
        }
        Ty::Record(rows) => {
            write!(f, "{{")?;
            for (i, (label, ty)) in rows.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{} : ", label)?;
                fmt_prec(ty, 0, f)?;
            }
            write!(f, "}}")
        }
        Ty::Flex { rows, .. } => {
            write!(f, "{{")?;
            for (label, ty) in rows.iter() {
                write!(f, "{} : ", label)?;
                fmt_prec(ty, 0, f)?;
                write!(f, ", ")?;
            }
            write!(f, "...}}")
        }
        Ty::Fun(dom, cod) => {
            if prec >= 1 {
                write!(f, "(")?;
            }
            fmt_prec(dom, 1, f)?;
            write!(f, " -> ")?;
            fmt_prec(cod, 0, f)?;
            if prec >= 1 {
                write!(f, ")")?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_prec(self, 0, f)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)
    }
}

/// How types were declared; drives arity checks, alias expansion, and
/// equality admission.
#[derive(Clone, Debug)]
pub enum TypeDef {
    Abstract { arity: usize, equality: bool },
    Datatype {
        arity: usize,
        constructors: Vec<SmolStr>,
        equality: bool,
    },
    Alias { ty_vars: Vec<SmolStr>, ty: Ty },
}

impl TypeDef {
    pub fn arity(&self) -> usize {
        match self {
            TypeDef::Abstract { arity, .. } => *arity,
            TypeDef::Datatype { arity, .. } => *arity,
            TypeDef::Alias { ty_vars, .. } => ty_vars.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_printing() {
        assert_eq!(Ty::int().to_string(), "int");
        assert_eq!(Ty::list(Ty::int()).to_string(), "int list");
        assert_eq!(
            Ty::fun(Ty::int(), Ty::fun(Ty::int(), Ty::int())).to_string(),
            "int -> int -> int"
        );
        assert_eq!(
            Ty::fun(Ty::fun(Ty::int(), Ty::int()), Ty::int()).to_string(),
            "(int -> int) -> int"
        );
        assert_eq!(Ty::pair(Ty::int(), Ty::bool()).to_string(), "int * bool");
        assert_eq!(
            Ty::pair(Ty::pair(Ty::int(), Ty::int()), Ty::bool()).to_string(),
            "(int * int) * bool"
        );
        assert_eq!(Ty::unit().to_string(), "unit");
        assert_eq!(
            Ty::fun(Ty::pair(Ty::int(), Ty::int()), Ty::int()).to_string(),
            "int * int -> int"
        );
        assert_eq!(
            Ty::Con {
                name: "pair".into(),
                args: vec![Ty::Var("'a".into()), Ty::Var("'b".into())],
            }
            .to_string(),
            "('a, 'b) pair"
        );
    }

    #[test]
    fn equality_and_weak_names() {
        assert!(Ty::is_equality_name("''a"));
        assert!(!Ty::is_equality_name("'a"));
        assert!(Ty::is_weak_name("'_a"));
        assert!(!Ty::is_weak_name("'a"));
    }
}
