//! Runtime values.

use crate::state::State;
use marlin_ast::core::CMatch;
use smol_str::SmolStr;
use std::fmt;
use std::rc::Rc;

/// The sibling bindings of one `val rec` group. Every closure of the
/// group carries the whole table and re-adjoins it when applied, so the
/// members can call each other without cyclic ownership.
pub type RecGroup = Vec<(SmolStr, Rc<CMatch>)>;

#[derive(Clone)]
pub struct Closure {
    pub state: Rc<State>,
    pub recursives: Rc<RecGroup>,
    pub arms: Rc<CMatch>,
}

/// Host-supplied function: `Value -> Result<Value, raised exception>`.
#[derive(Clone)]
pub struct PredefinedFn {
    pub name: SmolStr,
    pub f: Rc<dyn Fn(Value) -> Result<Value, Value>>,
}

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Word(i64),
    Real(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Record(Vec<(SmolStr, Value)>),
    Vector(Vec<Value>),
    Fn(Closure),
    Predefined(PredefinedFn),
    /// Unary value constructor awaiting its argument.
    Con { name: SmolStr, id: u64 },
    /// Constructed value; `arg` is `None` for nullary constructors.
    ConVal {
        name: SmolStr,
        arg: Option<Box<Value>>,
        id: u64,
    },
    /// Unary exception constructor awaiting its argument.
    ExnCon { name: SmolStr, id: u64 },
    /// Exception value (a raisable packet).
    ExnVal {
        name: SmolStr,
        arg: Option<Box<Value>>,
        id: u64,
    },
}

impl Value {
    pub fn unit() -> Value {
        Value::Record(Vec::new())
    }

    pub fn pair(a: Value, b: Value) -> Value {
        Value::Record(vec![("1".into(), a), ("2".into(), b)])
    }

    /// Unpacks a two-tuple; predefined operators take their operands this
    /// way.
    pub fn as_pair(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Record(rows) if rows.len() == 2 => {
                let first = rows.iter().find(|(l, _)| l == "1")?;
                let second = rows.iter().find(|(l, _)| l == "2")?;
                Some((&first.1, &second.1))
            }
            _ => None,
        }
    }

    /// Walks a `::`-chain into its elements, if this value is a list.
    pub fn list_elements(&self) -> Option<Vec<&Value>> {
        let mut out = Vec::new();
        let mut cursor = self;
        loop {
            match cursor {
                Value::ConVal {
                    name, arg: None, ..
                } if name == "nil" => return Some(out),
                Value::ConVal {
                    name,
                    arg: Some(pair),
                    ..
                } if name == "::" => match pair.as_pair() {
                    Some((head, tail)) => {
                        out.push(head);
                        cursor = tail;
                    }
                    None => return None,
                },
                _ => return None,
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Word(a), Value::Word(b)) => a == b,
            // Bit equality; the static semantics decides whether reals may
            // be compared at all.
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(label, value)| {
                        b.iter().any(|(l, v)| l == label && v == value)
                    })
            }
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (
                Value::ConVal {
                    name: an,
                    arg: aa,
                    id: ai,
                },
                Value::ConVal {
                    name: bn,
                    arg: ba,
                    id: bi,
                },
            ) => an == bn && ai == bi && aa == ba,
            (
                Value::ExnVal {
                    arg: aa, id: ai, ..
                },
                Value::ExnVal {
                    arg: ba, id: bi, ..
                },
            ) => ai == bi && aa == ba,
            // Functions are not comparable; elaboration rules this out.
            _ => false,
        }
    }
}

fn fmt_real(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = if value == value.trunc() && value.is_finite() {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    };
    write!(f, "{}", rendered.replace('-', "~"))
}

fn fmt_string(s: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            c if (c as u32) < 0x20 => write!(f, "\\^{}", char::from(c as u8 + 64))?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) if *n < 0 => write!(f, "~{}", n.unsigned_abs()),
            Value::Int(n) => write!(f, "{}", n),
            Value::Word(w) => write!(f, "0w{}", w),
            Value::Real(r) => fmt_real(*r, f),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "#\"{}\"", c),
            Value::Str(s) => fmt_string(s, f),
            Value::Record(rows) if rows.is_empty() => write!(f, "()"),
            Value::Record(rows) if marlin_ast::is_tuple_labels(rows) => {
                let mut ordered: Vec<_> = rows.iter().collect();
                ordered.sort_by_key(|(label, _)| label.parse::<usize>().unwrap_or(0));
                write!(f, "(")?;
                for (i, (_, value)) in ordered.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            Value::Record(rows) => {
                write!(f, "{{")?;
                for (i, (label, value)) in rows.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", label, value)?;
                }
                write!(f, "}}")
            }
            Value::Vector(items) => {
                write!(f, "#[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Fn(_) | Value::Predefined(_) => write!(f, "fn"),
            Value::Con { name, .. } | Value::ExnCon { name, .. } => write!(f, "{}", name),
            Value::ConVal { arg: None, name, .. } if name == "nil" => write!(f, "[]"),
            Value::ConVal { .. } if self.list_elements().is_some() => {
                let items = self.list_elements().expect("checked");
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::ConVal { name, arg, .. } | Value::ExnVal { name, arg, .. } => {
                match arg {
                    None => write!(f, "{}", name),
                    Some(arg) => {
                        write!(f, "{} ", name)?;
                        if arg.needs_parens() {
                            write!(f, "({})", arg)
                        } else {
                            write!(f, "{}", arg)
                        }
                    }
                }
            }
        }
    }
}

impl Value {
    fn needs_parens(&self) -> bool {
        matches!(
            self,
            Value::ConVal { arg: Some(_), .. } | Value::ExnVal { arg: Some(_), .. }
        ) && self.list_elements().is_none()
            || matches!(self, Value::Int(n) if *n < 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Fn(_) => write!(f, "Fn(<closure>)"),
            Value::Predefined(p) => write!(f, "Predefined({})", p.name),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_equality_ignores_row_order() {
        let a = Value::Record(vec![
            ("x".into(), Value::Int(1)),
            ("y".into(), Value::Int(2)),
        ]);
        let b = Value::Record(vec![
            ("y".into(), Value::Int(2)),
            ("x".into(), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn constructors_with_same_name_but_different_ids_differ() {
        let a = Value::ConVal {
            name: "C".into(),
            arg: None,
            id: 1,
        };
        let b = Value::ConVal {
            name: "C".into(),
            arg: None,
            id: 2,
        };
        assert_ne!(a, b);
    }

    #[test]
    fn value_printing() {
        assert_eq!(Value::Int(-3).to_string(), "~3");
        assert_eq!(Value::unit().to_string(), "()");
        assert_eq!(
            Value::pair(Value::Bool(true), Value::Int(3)).to_string(),
            "(true, 3)"
        );
        assert_eq!(Value::Str("a\nb".into()).to_string(), "\"a\\nb\"");

        let nil = Value::ConVal {
            name: "nil".into(),
            arg: None,
            id: 0,
        };
        let list = Value::ConVal {
            name: "::".into(),
            arg: Some(Box::new(Value::pair(Value::Int(1), nil.clone()))),
            id: 1,
        };
        assert_eq!(nil.to_string(), "[]");
        assert_eq!(list.to_string(), "[1]");
    }
}
