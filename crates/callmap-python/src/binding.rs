//! The binding engine: assignment-like constructs update scope bindings.
//!
//! All binding forms funnel through [`GraphVisitor::analyze_binding`]:
//! ordinary/augmented/chained assignment, iteration variables, `with`
//! targets, walrus expressions, parameter defaults. Targets and values are
//! flattened tuple/list literals; matching is positional when a single
//! starred target makes that well-defined, and degrades to binding every
//! target to the union of all values otherwise.

use rustpython_ast::Expr;
use tracing::trace;

use crate::attr::AttrError;
use crate::registry::SymbolId;
use crate::scope::Value;
use crate::visit::GraphVisitor;

/// Flatten a tuple or list literal into its elements; anything else is a
/// single value.
pub(crate) fn flatten_exprs(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Tuple(tuple) => tuple.elts.iter().collect(),
        Expr::List(list) => list.elts.iter().collect(),
        _ => vec![expr],
    }
}

impl GraphVisitor {
    /// Evaluate `values` and bind them to `targets`.
    ///
    /// With as many values as targets, matching is positional. Otherwise,
    /// if exactly one target is starred and there are enough values for the
    /// non-starred targets, the starred target collects the remainder as a
    /// value set. In every other shape (no star, several stars, too few
    /// values) each target is bound to the union of all resolved values.
    pub(crate) fn analyze_binding(&mut self, targets: &[&Expr], values: &[&Expr]) {
        let captured: Vec<Option<Value>> = values.iter().map(|v| self.visit_expr(v)).collect();

        if targets.len() == captured.len() {
            for (target, value) in targets.iter().zip(captured) {
                self.bind_target(target, value);
            }
            return;
        }

        let mut star_idx = None;
        let mut multiple_stars = false;
        for (i, target) in targets.iter().enumerate() {
            if matches!(target, Expr::Starred(_)) {
                if star_idx.is_some() {
                    multiple_stars = true;
                    break;
                }
                star_idx = Some(i);
            }
        }

        if let (Some(star), false) = (star_idx, multiple_stars) {
            if captured.len() + 1 >= targets.len() {
                let n_before = star;
                let n_after = targets.len() - star - 1;
                for (target, value) in targets[..n_before].iter().zip(&captured[..n_before]) {
                    self.bind_target(target, value.clone());
                }
                if n_after > 0 {
                    let tail_targets = &targets[targets.len() - n_after..];
                    let tail_values = &captured[captured.len() - n_after..];
                    for (target, value) in tail_targets.iter().zip(tail_values) {
                        self.bind_target(target, value.clone());
                    }
                }
                let star_end = captured.len() - n_after;
                let remainder: Vec<SymbolId> = captured[n_before..star_end]
                    .iter()
                    .flatten()
                    .flat_map(|v| v.ids().iter().copied())
                    .collect();
                self.bind_target(targets[star], Value::from_ids(remainder));
                return;
            }
        }

        // Arity mismatch with no usable star: overapproximate with the
        // union of everything on the right.
        if captured.len() > 1 {
            trace!(
                targets = targets.len(),
                values = captured.len(),
                "arity mismatch; binding the union"
            );
        }
        let union: Vec<SymbolId> = captured
            .iter()
            .flatten()
            .flat_map(|v| v.ids().iter().copied())
            .collect();
        let union = Value::from_ids(union);
        for target in targets {
            self.bind_target(target, union.clone());
        }
    }

    /// Bind one target to a resolved value. Names bind in the scope chain,
    /// attribute targets annotate the owning object's scope, tuple/list
    /// targets recurse, starred targets unwrap.
    pub(crate) fn bind_target(&mut self, target: &Expr, value: Option<Value>) {
        match target {
            Expr::Name(name) => self.set_value(name.id.as_str(), value),
            Expr::Attribute(attr) => match self.set_attribute(attr, value) {
                Ok(true) => trace!(attr = attr.attr.as_str(), "attribute bound"),
                Ok(false) => {}
                // Unresolvable prefix: the binding is skipped silently.
                Err(AttrError::UnresolvedSuper) => {}
            },
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.bind_target(elt, value.clone());
                }
            }
            Expr::List(list) => {
                for elt in &list.elts {
                    self.bind_target(elt, value.clone());
                }
            }
            Expr::Starred(starred) => self.bind_target(&starred.value, value),
            _ => {}
        }
    }

    /// Innermost binding of `name` that actually has a value.
    pub(crate) fn get_value(&self, name: &str) -> Option<Value> {
        for key in self.scope_stack.iter().rev() {
            if let Some(scope) = self.scopes.get(key) {
                if let Some(Some(value)) = scope.defs.get(name) {
                    return Some(value.clone());
                }
            }
        }
        None
    }

    /// Set `name` in the innermost scope that knows it. Global/nonlocal
    /// names are absent from their declaring function's scope, so the write
    /// lands where the name actually lives. A `None` value leaves existing
    /// state untouched.
    pub(crate) fn set_value(&mut self, name: &str, value: Option<Value>) {
        let Some(value) = value else {
            trace!(name, "no value to bind");
            return;
        };
        let key = self
            .scope_stack
            .iter()
            .rev()
            .find(|key| {
                self.scopes
                    .get(*key)
                    .is_some_and(|scope| scope.defs.contains_key(name))
            })
            .cloned();
        match key {
            Some(key) => {
                if let Some(scope) = self.scopes.get_mut(&key) {
                    trace!(name, scope = %key, "bound");
                    scope.defs.insert(name.to_string(), Some(value));
                }
            }
            None => trace!(name, "name not in any scope"),
        }
    }
}
