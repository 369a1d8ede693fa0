//! The attribute resolver: dotted expressions, inherited lookup, `super()`.
//!
//! `a.b.c` resolves left to right: the leftmost name through the scope
//! stack, every further segment through the scope record of the object
//! resolved so far. Lookup on a class falls back to its method resolution
//! order; lookup on builtin literal types (`"s".join`) lands in a synthetic
//! top-level namespace named after the type.
//!
//! `super()` is the one call whose result is resolved: it denotes the next
//! class in the lexically enclosing class's MRO. `str(x)`/`repr(x)` map to
//! `x.__str__`/`x.__repr__` as a narrow builtin special case.

use rustpython_ast::{self as ast, Expr};
use thiserror::Error;
use tracing::trace;

use callmap_core::graph::SymbolKind;

use crate::registry::SymbolId;
use crate::scope::Value;
use crate::visit::GraphVisitor;

/// Names of the builtin types literal constants evaluate to. Any attribute
/// on them is taken to exist.
const BUILTIN_TYPE_NAMES: &[&str] = &[
    "NoneType",
    "bool",
    "str",
    "bytes",
    "int",
    "float",
    "complex",
    "ellipsis",
    "tuple",
];

/// Signalled when an attribute chain or call cannot be resolved because of
/// an unresolvable `super()`; callers stay silent instead of recording a
/// wildcard.
#[derive(Debug, Error)]
pub(crate) enum AttrError {
    #[error("super() cannot be resolved here")]
    UnresolvedSuper,
}

pub(crate) type AttrResult<T> = Result<T, AttrError>;

/// Outcome of looking one attribute up on one object vertex.
struct AttrLookup {
    found: Vec<SymbolId>,
    /// The object was concrete enough to try.
    known: bool,
    /// A full MRO was searched without a hit; the attribute is genuinely
    /// absent rather than merely not-yet-seen.
    exhausted: bool,
}

impl GraphVisitor {
    /// The class vertex a literal constant evaluates to, in the top-level
    /// namespace.
    pub(crate) fn constant_class(&mut self, constant: &ast::Constant) -> SymbolId {
        let type_name = constant_type_name(constant);
        self.registry
            .get_or_create(Some(""), type_name, SymbolKind::Class, None)
    }

    /// Resolve the *base* of an attribute expression, returning the object
    /// value (when determinable) and the attribute name.
    ///
    /// Nested chains recurse; the leftmost position accepts names, literal
    /// constants, and calls (for `super().m` and friends).
    pub(crate) fn resolve_attribute(
        &mut self,
        attr: &ast::ExprAttribute,
    ) -> AttrResult<(Option<Value>, String)> {
        let attr_name = attr.attr.to_string();
        let obj = match attr.value.as_ref() {
            Expr::Attribute(inner) => {
                let (base, inner_name) = self.resolve_attribute(inner)?;
                match base {
                    Some(base_value) => {
                        let mut ids = Vec::new();
                        for &id in base_value.ids() {
                            let ns = {
                                let sym = self.registry.get(id);
                                if sym.namespace.is_none() {
                                    continue;
                                }
                                sym.qualified_name()
                            };
                            if let Some(value) = self.lookup_in_scope(&ns, &inner_name) {
                                ids.extend(value.ids().iter().copied());
                            }
                        }
                        Value::from_ids(ids)
                    }
                    None => None,
                }
            }
            Expr::Constant(constant) => Some(Value::One(self.constant_class(&constant.value))),
            // attribute of a call result: only the special calls resolve
            Expr::Call(call) => self.resolve_special_call(call)?,
            Expr::Name(name) => self.get_value(name.id.as_str()),
            _ => None,
        };
        trace!(attr = %attr_name, resolved = obj.is_some(), "attribute base");
        Ok((obj, attr_name))
    }

    /// Full load-context resolution of an attribute expression.
    ///
    /// Returns `(object, attribute)` values; either can be absent. The
    /// distinguished `(None, None)` answer after an exhausted MRO search
    /// tells the visitor not to fabricate an attribute vertex.
    pub(crate) fn get_attribute(
        &mut self,
        attr: &ast::ExprAttribute,
    ) -> AttrResult<(Option<Value>, Option<Value>)> {
        let (obj, attr_name) = self.resolve_attribute(attr)?;
        let Some(obj_value) = obj else {
            return Ok((None, None));
        };

        let mut found = Vec::new();
        let mut known = 0usize;
        let mut exhausted = 0usize;
        for &id in obj_value.ids() {
            let lookup = self.lookup_attr_ids(id, &attr_name);
            found.extend(lookup.found);
            if lookup.known {
                known += 1;
            }
            if lookup.exhausted {
                exhausted += 1;
            }
        }

        if let Some(value) = Value::from_ids(found) {
            return Ok((Some(obj_value), Some(value)));
        }
        if known > 0 && exhausted == known {
            return Ok((None, None));
        }
        Ok((Some(obj_value), None))
    }

    /// Assign `value` into the attribute named by `attr` on whatever its
    /// base resolves to. Returns whether anything was stored.
    pub(crate) fn set_attribute(
        &mut self,
        attr: &ast::ExprAttribute,
        value: Option<Value>,
    ) -> AttrResult<bool> {
        let Some(value) = value else { return Ok(false) };
        let (obj, attr_name) = self.resolve_attribute(attr)?;
        let Some(obj_value) = obj else { return Ok(false) };

        let mut stored = false;
        for &id in obj_value.ids() {
            let ns = {
                let sym = self.registry.get(id);
                if sym.namespace.is_none() {
                    continue;
                }
                sym.qualified_name()
            };
            if let Some(scope) = self.scopes.get_mut(&ns) {
                scope.defs.insert(attr_name.clone(), Some(value.clone()));
                stored = true;
            }
        }
        Ok(stored)
    }

    /// Look `attr_name` up on one object vertex: own scope first, then the
    /// MRO when the object is a linearized class.
    fn lookup_attr_ids(&mut self, id: SymbolId, attr_name: &str) -> AttrLookup {
        let (ns, name, is_wild, top_level) = {
            let sym = self.registry.get(id);
            (
                sym.qualified_name(),
                sym.name.clone(),
                sym.namespace.is_none(),
                sym.namespace.as_deref() == Some(""),
            )
        };
        if is_wild {
            return AttrLookup {
                found: Vec::new(),
                known: false,
                exhausted: false,
            };
        }
        if top_level && BUILTIN_TYPE_NAMES.contains(&name.as_str()) {
            let attr =
                self.registry
                    .get_or_create(Some(ns.as_str()), attr_name, SymbolKind::Attribute, None);
            return AttrLookup {
                found: vec![attr],
                known: true,
                exhausted: false,
            };
        }
        if let Some(value) = self.lookup_in_scope(&ns, attr_name) {
            return AttrLookup {
                found: value.ids().to_vec(),
                known: true,
                exhausted: false,
            };
        }
        if let Some(order) = self.mro.get(&id).cloned() {
            for &base in &order[1..] {
                let base_ns = self.registry.get(base).qualified_name();
                if let Some(value) = self.lookup_in_scope(&base_ns, attr_name) {
                    trace!(
                        attr = attr_name,
                        base = %base_ns,
                        "resolved through inherited lookup"
                    );
                    return AttrLookup {
                        found: value.ids().to_vec(),
                        known: true,
                        exhausted: false,
                    };
                }
            }
            return AttrLookup {
                found: Vec::new(),
                known: true,
                exhausted: true,
            };
        }
        AttrLookup {
            found: Vec::new(),
            known: true,
            exhausted: false,
        }
    }

    pub(crate) fn lookup_in_scope(&self, scope_key: &str, name: &str) -> Option<Value> {
        self.scopes
            .get(scope_key)
            .and_then(|scope| scope.defs.get(name))
            .and_then(|value| value.clone())
    }

    /// Resolve the calls whose results the analysis predicts: `super()` and
    /// single-argument `str()`/`repr()`.
    ///
    /// `super()` only resolves once the MRO is known (the second iteration);
    /// before that, or with no known bases, it errors so callers skip the
    /// chain instead of recording a wildcard.
    pub(crate) fn resolve_special_call(&mut self, call: &ast::ExprCall) -> AttrResult<Option<Value>> {
        let Expr::Name(func) = call.func.as_ref() else {
            return Ok(None);
        };
        match func.id.as_str() {
            "super" => {
                let Some(class_sym) = self.current_class() else {
                    return Err(AttrError::UnresolvedSuper);
                };
                // Only the static type of the lexically enclosing class is
                // considered; the dynamic receiver type is out of reach for
                // lexical analysis.
                match self.mro.get(&class_sym) {
                    Some(order) if order.len() > 1 => {
                        trace!(
                            class = %self.registry.get(class_sym).qualified_name(),
                            "super() resolved to the next class in the MRO"
                        );
                        Ok(Some(Value::One(order[1])))
                    }
                    _ => Err(AttrError::UnresolvedSuper),
                }
            }
            name @ ("str" | "repr") => {
                if call.args.len() != 1 {
                    return Ok(None);
                }
                let obj = match &call.args[0] {
                    Expr::Name(n) => self.get_value(n.id.as_str()),
                    Expr::Attribute(a) => self.get_attribute(a)?.1,
                    _ => None,
                };
                let Some(obj) = obj else { return Ok(None) };
                let dunder = format!("__{name}__");
                let mut ids = Vec::new();
                for &id in obj.ids() {
                    ids.extend(self.lookup_attr_ids(id, &dunder).found);
                }
                Ok(Value::from_ids(ids))
            }
            _ => Ok(None),
        }
    }
}

/// Python type name of a literal constant.
fn constant_type_name(constant: &ast::Constant) -> &'static str {
    match constant {
        ast::Constant::None => "NoneType",
        ast::Constant::Bool(_) => "bool",
        ast::Constant::Str(_) => "str",
        ast::Constant::Bytes(_) => "bytes",
        ast::Constant::Int(_) => "int",
        ast::Constant::Float(_) => "float",
        ast::Constant::Complex { .. } => "complex",
        ast::Constant::Ellipsis => "ellipsis",
        ast::Constant::Tuple(_) => "tuple",
    }
}
