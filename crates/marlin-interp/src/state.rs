//! The interpreter state: parent-linked scope frames shared by the
//! static and dynamic semantics.
//!
//! A frame is immutable from the outside except for its innermost
//! binding maps; lookups walk the parent chain, writes always land in the
//! receiver's own frame. Top-level interpretation only ever adds child
//! frames, so closures holding an `Rc<State>` keep seeing exactly the
//! bindings they captured.

use crate::types::{Scheme, TypeDef};
use crate::value::Value;
use marlin_ast::fixity::{Fixity, FixityTable};
use smol_str::SmolStr;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

/// What kind of thing a value identifier is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStatus {
    Value,
    Constructor { has_arg: bool },
    Exception { has_arg: bool },
}

impl IdStatus {
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            IdStatus::Constructor { .. } | IdStatus::Exception { .. }
        )
    }
}

/// Rebind protection for identifiers the initial basis defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rebind {
    #[default]
    Allowed,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JournalKind {
    Val,
    Type,
    Datatype,
    Exception,
}

#[derive(Default)]
struct Frame {
    values: HashMap<SmolStr, (Scheme, IdStatus)>,
    types: HashMap<SmolStr, TypeDef>,
    dyn_values: HashMap<SmolStr, Value>,
    dyn_types: HashMap<SmolStr, Vec<SmolStr>>,
    fixity: FixityTable,
    rebind: HashMap<SmolStr, Rebind>,
    /// Binding order for reporting; one entry per printed line.
    journal: Vec<(JournalKind, SmolStr)>,
}

pub struct State {
    /// Generation marker; larger means newer.
    pub id: u64,
    parent: Option<Rc<State>>,
    frame: RefCell<Frame>,
    /// Constructor id counter; only the root's cell is used.
    ctor_ids: Cell<u64>,
}

impl State {
    pub fn root() -> Rc<State> {
        Rc::new(State {
            id: 0,
            parent: None,
            frame: RefCell::new(Frame::default()),
            ctor_ids: Cell::new(0),
        })
    }

    pub fn child(self: &Rc<State>) -> Rc<State> {
        Rc::new(State {
            id: self.id + 1,
            parent: Some(self.clone()),
            frame: RefCell::new(Frame::default()),
            ctor_ids: Cell::new(0),
        })
    }

    pub fn parent(&self) -> Option<&Rc<State>> {
        self.parent.as_ref()
    }

    /// Allocates a fresh constructor id from the root's counter.
    pub fn fresh_ctor_id(&self) -> u64 {
        match &self.parent {
            Some(parent) => parent.fresh_ctor_id(),
            None => {
                let id = self.ctor_ids.get();
                self.ctor_ids.set(id + 1);
                id
            }
        }
    }

    // ── Lookups (walk the chain) ─────────────────────────────────

    pub fn lookup_value(&self, name: &str) -> Option<(Scheme, IdStatus)> {
        if let Some(entry) = self.frame.borrow().values.get(name) {
            return Some(entry.clone());
        }
        self.parent.as_ref()?.lookup_value(name)
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeDef> {
        if let Some(def) = self.frame.borrow().types.get(name) {
            return Some(def.clone());
        }
        self.parent.as_ref()?.lookup_type(name)
    }

    pub fn lookup_dyn(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.frame.borrow().dyn_values.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref()?.lookup_dyn(name)
    }

    pub fn rebind_status(&self, name: &str) -> Rebind {
        if let Some(status) = self.frame.borrow().rebind.get(name) {
            return *status;
        }
        self.parent
            .as_ref()
            .map(|p| p.rebind_status(name))
            .unwrap_or_default()
    }

    /// The fixity environment visible from this frame, merged root-first
    /// so inner declarations shadow outer ones.
    pub fn fixity_snapshot(&self) -> FixityTable {
        let mut chain = Vec::new();
        let mut cursor = Some(self);
        while let Some(state) = cursor {
            chain.push(state);
            cursor = state.parent.as_deref();
        }
        let mut merged = FixityTable::new();
        for state in chain.into_iter().rev() {
            for (name, fixity) in state.frame.borrow().fixity.iter() {
                merged.declare(name.clone(), *fixity);
            }
        }
        merged
    }

    // ── Writes (innermost frame only) ────────────────────────────

    pub fn define_value(&self, name: SmolStr, scheme: Scheme, status: IdStatus) {
        let mut frame = self.frame.borrow_mut();
        if status == IdStatus::Value {
            Self::journal_push(&mut frame, JournalKind::Val, &name);
        } else if matches!(status, IdStatus::Exception { .. }) {
            Self::journal_push(&mut frame, JournalKind::Exception, &name);
        }
        frame.values.insert(name, (scheme, status));
    }

    /// True when the name was already statically bound in this frame
    /// (used for same-chunk redefinition warnings).
    pub fn defines_value(&self, name: &str) -> bool {
        self.frame.borrow().values.contains_key(name)
    }

    pub fn define_type(&self, name: SmolStr, def: TypeDef) {
        let mut frame = self.frame.borrow_mut();
        let kind = match &def {
            TypeDef::Datatype { .. } => JournalKind::Datatype,
            _ => JournalKind::Type,
        };
        Self::journal_push(&mut frame, kind, &name);
        frame.types.insert(name, def);
    }

    pub fn define_dyn(&self, name: SmolStr, value: Value) {
        self.frame.borrow_mut().dyn_values.insert(name, value);
    }

    pub fn define_dyn_type(&self, name: SmolStr, constructors: Vec<SmolStr>) {
        self.frame.borrow_mut().dyn_types.insert(name, constructors);
    }

    pub fn declare_fixity(&self, name: SmolStr, fixity: Option<Fixity>) {
        self.frame.borrow_mut().fixity.declare(name, fixity);
    }

    pub fn protect(&self, name: SmolStr) {
        self.frame.borrow_mut().rebind.insert(name, Rebind::Never);
    }

    fn journal_push(frame: &mut Frame, kind: JournalKind, name: &SmolStr) {
        if !frame.journal.iter().any(|(k, n)| *k == kind && n == name) {
            frame.journal.push((kind, name.clone()));
        }
    }

    /// Every visible dynamic binding whose name starts with `prefix.`,
    /// innermost occurrence winning, together with its static entry.
    pub fn visible_with_prefix(
        &self,
        prefix: &str,
    ) -> Vec<(SmolStr, Option<(Scheme, IdStatus)>, Option<Value>)> {
        let dotted = format!("{}.", prefix);
        let mut seen: HashMap<SmolStr, usize> = HashMap::new();
        let mut out: Vec<(SmolStr, Option<(Scheme, IdStatus)>, Option<Value>)> = Vec::new();
        let mut cursor = Some(self);
        while let Some(state) = cursor {
            let frame = state.frame.borrow();
            let mut names: Vec<&SmolStr> = frame
                .values
                .keys()
                .chain(frame.dyn_values.keys())
                .filter(|n| n.starts_with(&dotted))
                .collect();
            names.sort();
            names.dedup();
            for name in names {
                if seen.contains_key(name.as_str()) {
                    continue;
                }
                let stripped = SmolStr::new(&name[dotted.len()..]);
                seen.insert(name.clone(), out.len());
                out.push((
                    stripped,
                    frame.values.get(name).cloned(),
                    frame.dyn_values.get(name).cloned(),
                ));
            }
            cursor = state.parent.as_deref();
        }
        out
    }

    /// This frame's own dynamic bindings, name-sorted for determinism.
    /// Used to splice `local`/`abstype` results into an enclosing frame.
    pub fn dyn_bindings(&self) -> Vec<(SmolStr, Value)> {
        let frame = self.frame.borrow();
        let mut out: Vec<(SmolStr, Value)> = frame
            .dyn_values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    // ── Reporting ────────────────────────────────────────────────

    /// Pretty-prints the bindings introduced by frames newer than
    /// `stop_id`, oldest first.
    pub fn bindings_since(&self, stop_id: u64) -> String {
        let mut frames = Vec::new();
        let mut cursor = Some(self);
        while let Some(state) = cursor {
            if state.id <= stop_id {
                break;
            }
            frames.push(state);
            cursor = state.parent.as_deref();
        }
        let mut out = String::new();
        for state in frames.into_iter().rev() {
            let frame = state.frame.borrow();
            for (kind, name) in &frame.journal {
                match kind {
                    JournalKind::Val => {
                        let value = frame.dyn_values.get(name);
                        let scheme = frame.values.get(name).map(|(s, _)| s);
                        match (value, scheme) {
                            (Some(v), Some(s)) => {
                                let _ = writeln!(out, "val {} = {} : {}", name, v, s);
                            }
                            (Some(v), None) => {
                                let _ = writeln!(out, "val {} = {}", name, v);
                            }
                            (None, Some(s)) => {
                                let _ = writeln!(out, "val {} : {}", name, s);
                            }
                            (None, None) => {}
                        }
                    }
                    JournalKind::Type => {
                        let _ = writeln!(out, "type {}", name);
                    }
                    JournalKind::Datatype => {
                        let ctors = frame
                            .dyn_types
                            .get(name)
                            .cloned()
                            .or_else(|| match frame.types.get(name) {
                                Some(TypeDef::Datatype { constructors, .. }) => {
                                    Some(constructors.clone())
                                }
                                _ => None,
                            })
                            .unwrap_or_default();
                        if ctors.is_empty() {
                            let _ = writeln!(out, "datatype {}", name);
                        } else {
                            let _ = writeln!(
                                out,
                                "datatype {} = {}",
                                name,
                                ctors
                                    .iter()
                                    .map(|c| c.as_str())
                                    .collect::<Vec<_>>()
                                    .join(" | ")
                            );
                        }
                    }
                    JournalKind::Exception => {
                        match frame.values.get(name) {
                            Some((scheme, _)) => {
                                let _ =
                                    writeln!(out, "exception {} : {}", name, scheme);
                            }
                            None => {
                                let _ = writeln!(out, "exception {}", name);
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Ty;

    #[test]
    fn shadowing_keeps_parent_bindings() {
        let root = State::root();
        root.define_dyn("x".into(), Value::Int(1));
        let child = root.child();
        child.define_dyn("x".into(), Value::Int(2));
        assert_eq!(child.lookup_dyn("x"), Some(Value::Int(2)));
        assert_eq!(root.lookup_dyn("x"), Some(Value::Int(1)));
    }

    #[test]
    fn rebind_protection_is_visible_from_children() {
        let root = State::root();
        root.protect("nil".into());
        let child = root.child().child();
        assert_eq!(child.rebind_status("nil"), Rebind::Never);
        assert_eq!(child.rebind_status("x"), Rebind::Allowed);
    }

    #[test]
    fn ctor_ids_come_from_the_root() {
        let root = State::root();
        let child = root.child();
        let a = child.fresh_ctor_id();
        let b = root.fresh_ctor_id();
        assert_ne!(a, b);
    }

    #[test]
    fn bindings_report_stops_at_generation() {
        let root = State::root();
        let child = root.child();
        child.define_value("x".into(), Scheme::mono(Ty::int()), IdStatus::Value);
        child.define_dyn("x".into(), Value::Int(31));
        let report = child.bindings_since(root.id);
        assert_eq!(report, "val x = 31 : int\n");
        assert_eq!(child.bindings_since(child.id), "");
    }
}
