//! The graph visitor: walks parsed modules and emits the defines/uses graph.
//!
//! One [`GraphVisitor`] is driven over every file in the analyzed set, twice.
//! The first iteration populates definitions and initial bindings; base
//! classes are resolved and linearized between iterations; the second
//! iteration re-walks everything against the fully populated namespace so
//! forward references resolve. Postprocessing and export live in
//! `postprocess`.
//!
//! Dispatch is a single `match` per syntactic category rather than a
//! callback hierarchy, so supporting a new construct is a local change.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rustpython_ast::text_size::TextRange;
use rustpython_ast::{self as ast, Expr, ExprContext, Pattern, Stmt};
use tracing::{debug, trace, warn};

use callmap_core::graph::{Location, SymbolKind};

use crate::attr::AttrError;
use crate::binding::flatten_exprs;
use crate::mro;
use crate::registry::{Symbol, SymbolId, SymbolRegistry};
use crate::scope::{Scope, Value};
use crate::text::LineIndex;

/// Placeholder value bound to function parameters. Not a valid identifier,
/// so it can never collide with a real name.
pub(crate) const PARAM_SENTINEL: &str = "<argument>";

/// Scope keys of inner constructs folded into their parent after analysis.
pub(crate) const INNER_SCOPE_NAMES: &[&str] =
    &["lambda", "listcomp", "setcomp", "dictcomp", "genexpr"];

/// What kind of compound construct the traversal is currently inside.
/// Decides whether a `def` is a function or a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeContext {
    Module,
    Class,
    Function,
}

/// Walks syntax trees and accumulates the graph.
///
/// All cross-references go through [`SymbolId`]s into the registry arena;
/// the per-scope binding state lives in `scopes`, keyed by dotted scope name.
pub struct GraphVisitor {
    pub(crate) registry: SymbolRegistry,
    pub(crate) scopes: HashMap<String, Scope>,
    pub(crate) module_to_file: HashMap<String, String>,
    pub(crate) defines: HashMap<SymbolId, BTreeSet<SymbolId>>,
    pub(crate) uses: HashMap<SymbolId, BTreeSet<SymbolId>>,

    /// Per class: base-class expressions as dotted paths (`None` for base
    /// expressions that cannot be named, e.g. subscripts). Recorded during
    /// the first iteration, resolved between iterations.
    class_bases: BTreeMap<SymbolId, Vec<Option<Vec<String>>>>,
    /// Per class: resolved direct bases, cut at the first unresolved one.
    resolved_bases: BTreeMap<SymbolId, Vec<SymbolId>>,
    /// Per class: method resolution order (class itself first).
    pub(crate) mro: BTreeMap<SymbolId, Vec<SymbolId>>,

    // Per-file traversal context.
    module_name: String,
    filename: String,
    line_index: Option<LineIndex>,

    name_stack: Vec<String>,
    pub(crate) scope_stack: Vec<String>,
    class_stack: Vec<SymbolId>,
    context_stack: Vec<ScopeContext>,
}

impl GraphVisitor {
    pub fn new(scopes: HashMap<String, Scope>, module_to_file: HashMap<String, String>) -> Self {
        GraphVisitor {
            registry: SymbolRegistry::new(),
            scopes,
            module_to_file,
            defines: HashMap::new(),
            uses: HashMap::new(),
            class_bases: BTreeMap::new(),
            resolved_bases: BTreeMap::new(),
            mro: BTreeMap::new(),
            module_name: String::new(),
            filename: String::new(),
            line_index: None,
            name_stack: Vec::new(),
            scope_stack: Vec::new(),
            class_stack: Vec::new(),
            context_stack: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Read access (postprocessing, export, tests)
    // ------------------------------------------------------------------

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        self.registry.get(id)
    }

    pub fn scope(&self, key: &str) -> Option<&Scope> {
        self.scopes.get(key)
    }

    pub fn defines_edges(&self) -> &HashMap<SymbolId, BTreeSet<SymbolId>> {
        &self.defines
    }

    pub fn uses_edges(&self) -> &HashMap<SymbolId, BTreeSet<SymbolId>> {
        &self.uses
    }

    /// Find a vertex by qualified name. `*.name` addresses a wildcard,
    /// `pkg.mod` a module, `pkg.mod.C.f` a nested definition.
    pub fn find_symbol(&self, qualified: &str) -> Option<SymbolId> {
        if let Some(name) = qualified.strip_prefix("*.") {
            return self.registry.lookup(None, name);
        }
        if let Some(id) = self.registry.lookup(Some(""), qualified) {
            return Some(id);
        }
        let (ns, name) = qualified.rsplit_once('.')?;
        self.registry.lookup(Some(ns), name)
    }

    /// Whether a uses edge exists between the vertices named by the given
    /// qualified names.
    pub fn has_uses_edge(&self, from: &str, to: &str) -> bool {
        match (self.find_symbol(from), self.find_symbol(to)) {
            (Some(f), Some(t)) => self.uses.get(&f).is_some_and(|set| set.contains(&t)),
            _ => false,
        }
    }

    /// Whether a defines edge exists between the vertices named by the given
    /// qualified names.
    pub fn has_defines_edge(&self, from: &str, to: &str) -> bool {
        match (self.find_symbol(from), self.find_symbol(to)) {
            (Some(f), Some(t)) => self.defines.get(&f).is_some_and(|set| set.contains(&t)),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Module entry
    // ------------------------------------------------------------------

    /// Walk one parsed module. Call once per file per iteration.
    pub fn visit_module_file(
        &mut self,
        module: &ast::ModModule,
        module_name: &str,
        filename: &str,
        source: &str,
    ) {
        debug!(module = module_name, file = filename, "module");
        self.module_name = module_name.to_string();
        self.filename = filename.to_string();
        self.line_index = Some(LineIndex::new(source));

        let module_sym =
            self.registry
                .get_or_create(Some(""), module_name, SymbolKind::Module, None);
        self.registry
            .set_location(module_sym, Location::new(filename, 1, 1));

        self.name_stack.push(module_name.to_string());
        self.scope_stack.push(module_name.to_string());
        self.context_stack.push(ScopeContext::Module);
        for stmt in &module.body {
            self.visit_stmt(stmt);
        }
        self.context_stack.pop();
        self.scope_stack.pop();
        self.name_stack.pop();

        self.add_defines_edge(module_sym, None);
    }

    // ------------------------------------------------------------------
    // Context helpers
    // ------------------------------------------------------------------

    /// The vertex of the innermost enclosing namespace; uses edges are
    /// attributed to it.
    pub(crate) fn current_ns_symbol(&mut self) -> SymbolId {
        debug_assert!(!self.name_stack.is_empty(), "name stack must not be empty");
        let name = self.name_stack.last().cloned().unwrap_or_default();
        let namespace = self.name_stack[..self.name_stack.len().saturating_sub(1)].join(".");
        self.registry
            .get_or_create(Some(namespace.as_str()), &name, SymbolKind::Namespace, None)
    }

    fn current_ns_key(&self) -> String {
        self.name_stack.join(".")
    }

    fn current_scope_has_local(&self, name: &str) -> bool {
        self.scope_stack
            .last()
            .and_then(|key| self.scopes.get(key))
            .is_some_and(|scope| scope.locals.contains(name))
    }

    pub(crate) fn current_class(&self) -> Option<SymbolId> {
        self.class_stack.last().copied()
    }

    fn loc(&self, range: TextRange) -> Option<Location> {
        let index = self.line_index.as_ref()?;
        let (line, col) = index.line_col(range.start().to_usize());
        Some(Location::new(&self.filename, line, col))
    }

    /// Enter a synthetic inner scope (`lambda`, comprehensions, type-alias
    /// values), run `f`, and record the inner vertex as defined by its
    /// parent namespace on the way out.
    fn with_inner_scope<R>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Self) -> R,
    ) -> (SymbolId, R) {
        let parent = self.current_ns_symbol();
        self.name_stack.push(label.to_string());
        let inner_key = self.current_ns_key();
        self.scopes
            .entry(inner_key.clone())
            .or_insert_with(|| Scope::new(label));
        let inner_sym = self.current_ns_symbol();
        self.scope_stack.push(inner_key);
        self.context_stack.push(ScopeContext::Function);
        let result = f(self);
        self.context_stack.pop();
        self.scope_stack.pop();
        self.name_stack.pop();
        self.add_defines_edge(parent, Some(inner_sym));
        (inner_sym, result)
    }

    // ------------------------------------------------------------------
    // Edge emission
    // ------------------------------------------------------------------

    /// Record `from defines to`, marking both endpoints defined.
    /// `to = None` only marks `from` as defined.
    pub(crate) fn add_defines_edge(&mut self, from: SymbolId, to: Option<SymbolId>) -> bool {
        let mut status = false;
        if !self.defines.contains_key(&from) {
            self.defines.insert(from, BTreeSet::new());
            status = true;
        }
        self.registry.mark_defined(from);
        let Some(to) = to else { return status };
        let inserted = self
            .defines
            .get_mut(&from)
            .is_some_and(|set| set.insert(to));
        if !inserted {
            return status;
        }
        self.registry.mark_defined(to);
        true
    }

    /// Record `from uses to`. Deduplicated; when `to` is concrete, a
    /// wildcard edge of the same terminal name from `from` is retired.
    pub(crate) fn add_uses_edge(&mut self, from: SymbolId, to: SymbolId) -> bool {
        if !self.uses.entry(from).or_default().insert(to) {
            return false;
        }
        trace!(
            from = %self.registry.get(from).qualified_name(),
            to = %self.registry.get(to).qualified_name(),
            "uses edge"
        );
        if self.registry.get(to).namespace.is_some() {
            let name = self.registry.get(to).name.clone();
            self.remove_wild(from, to, &name);
        }
        true
    }

    pub(crate) fn remove_uses_edge(&mut self, from: SymbolId, to: SymbolId) {
        if let Some(set) = self.uses.get_mut(&from) {
            set.remove(&to);
        }
    }

    /// Retire the wildcard `*.name` target of `from`, if any: a concrete
    /// resolution supersedes it. Kept when `from` and `to` coincide (the
    /// reference may be to an unanalyzed namesake rather than recursion)
    /// and for the parameter sentinel.
    pub(crate) fn remove_wild(&mut self, from: SymbolId, to: SymbolId, name: &str) {
        if to == from {
            return;
        }
        if self.registry.get(to).name == PARAM_SENTINEL {
            return;
        }
        let Some(set) = self.uses.get(&from) else {
            return;
        };
        let wild = set.iter().copied().find(|&id| {
            let sym = self.registry.get(id);
            sym.namespace.is_none() && sym.name == name
        });
        if let Some(wild) = wild {
            trace!(
                from = %self.registry.get(from).qualified_name(),
                wildcard = %self.registry.get(wild).qualified_name(),
                "wildcard resolved; removing"
            );
            self.remove_uses_edge(from, wild);
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn visit_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => self.visit_function_def(
                def.name.as_str(),
                &def.args,
                &def.body,
                &def.decorator_list,
                def.returns.as_deref(),
                def.range,
            ),
            Stmt::AsyncFunctionDef(def) => self.visit_function_def(
                def.name.as_str(),
                &def.args,
                &def.body,
                &def.decorator_list,
                def.returns.as_deref(),
                def.range,
            ),
            Stmt::ClassDef(def) => self.visit_class_def(def),
            Stmt::Assign(assign) => {
                let values = flatten_exprs(&assign.value);
                for target in &assign.targets {
                    // chained assignment: every target gets the same value
                    self.analyze_binding(&flatten_exprs(target), &values);
                }
            }
            Stmt::AugAssign(aug) => {
                self.analyze_binding(&flatten_exprs(&aug.target), &flatten_exprs(&aug.value));
            }
            Stmt::AnnAssign(ann) => {
                match &ann.value {
                    Some(value) => {
                        self.analyze_binding(&flatten_exprs(&ann.target), &flatten_exprs(value));
                    }
                    // bare declaration: the name is known, its value is not
                    None => self.bind_target(&ann.target, None),
                }
                self.visit_expr(&ann.annotation);
            }
            Stmt::For(stmt) => {
                self.visit_for(&stmt.target, &stmt.iter, &stmt.body, &stmt.orelse, false)
            }
            Stmt::AsyncFor(stmt) => {
                self.visit_for(&stmt.target, &stmt.iter, &stmt.body, &stmt.orelse, true)
            }
            Stmt::While(stmt) => {
                self.visit_expr(&stmt.test);
                self.visit_stmts(&stmt.body);
                self.visit_stmts(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.visit_expr(&stmt.test);
                self.visit_stmts(&stmt.body);
                self.visit_stmts(&stmt.orelse);
            }
            Stmt::With(stmt) => self.visit_with(&stmt.items, &stmt.body, "__enter__", "__exit__"),
            Stmt::AsyncWith(stmt) => {
                self.visit_with(&stmt.items, &stmt.body, "__aenter__", "__aexit__")
            }
            Stmt::Delete(del) => self.visit_delete(del),
            Stmt::Import(import) => {
                for alias in &import.names {
                    self.analyze_module_import(alias);
                }
            }
            Stmt::ImportFrom(import) => self.visit_import_from(import),
            Stmt::Global(_) | Stmt::Nonlocal(_) => {}
            Stmt::Try(stmt) => {
                self.visit_stmts(&stmt.body);
                for handler in &stmt.handlers {
                    self.visit_handler(handler);
                }
                self.visit_stmts(&stmt.orelse);
                self.visit_stmts(&stmt.finalbody);
            }
            Stmt::TryStar(stmt) => {
                self.visit_stmts(&stmt.body);
                for handler in &stmt.handlers {
                    self.visit_handler(handler);
                }
                self.visit_stmts(&stmt.orelse);
                self.visit_stmts(&stmt.finalbody);
            }
            Stmt::Match(stmt) => {
                self.visit_expr(&stmt.subject);
                for case in &stmt.cases {
                    self.visit_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard);
                    }
                    self.visit_stmts(&case.body);
                }
            }
            Stmt::TypeAlias(alias) => self.visit_type_alias(alias),
            Stmt::Return(stmt) => {
                if let Some(value) = &stmt.value {
                    self.visit_expr(value);
                }
            }
            Stmt::Raise(stmt) => {
                if let Some(exc) = &stmt.exc {
                    self.visit_expr(exc);
                }
                if let Some(cause) = &stmt.cause {
                    self.visit_expr(cause);
                }
            }
            Stmt::Assert(stmt) => {
                self.visit_expr(&stmt.test);
                if let Some(msg) = &stmt.msg {
                    self.visit_expr(msg);
                }
            }
            Stmt::Expr(stmt) => {
                self.visit_expr(&stmt.value);
            }
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn visit_handler(&mut self, handler: &ast::ExceptHandler) {
        let ast::ExceptHandler::ExceptHandler(h) = handler;
        if let Some(type_) = &h.type_ {
            self.visit_expr(type_);
        }
        self.visit_stmts(&h.body);
    }

    fn visit_function_def(
        &mut self,
        name: &str,
        args: &ast::Arguments,
        body: &[Stmt],
        decorator_list: &[Expr],
        returns: Option<&Expr>,
        range: TextRange,
    ) {
        debug!(name, file = %self.filename, "function definition");

        // Decorators belong to the enclosing scope; they also decide the
        // definition's kind.
        let mut deco_names: Vec<String> = Vec::new();
        for deco in decorator_list {
            if let Some(value) = self.visit_expr(deco) {
                for &id in value.ids() {
                    deco_names.push(self.registry.get(id).name.clone());
                }
            }
        }
        let in_class = matches!(self.context_stack.last(), Some(ScopeContext::Class));
        let kind = if !in_class {
            SymbolKind::Function
        } else if deco_names.iter().any(|n| n == "staticmethod") {
            SymbolKind::StaticMethod
        } else if deco_names.iter().any(|n| n == "classmethod") {
            SymbolKind::ClassMethod
        } else {
            SymbolKind::Method
        };
        // Instance and class methods receive the object type implicitly.
        let self_name = if matches!(kind, SymbolKind::Method | SymbolKind::ClassMethod) {
            args.posonlyargs
                .iter()
                .chain(&args.args)
                .next()
                .map(|a| a.def.arg.to_string())
        } else {
            None
        };

        let from_sym = self.current_ns_symbol();
        let ns = self.registry.get(from_sym).qualified_name();
        let location = self.loc(range);
        let to_sym = self
            .registry
            .get_or_create(Some(ns.as_str()), name, kind, location.clone());
        self.add_defines_edge(from_sym, Some(to_sym));
        // The vertex may predate this (a from-import site); the definition
        // is the authoritative location.
        if let Some(location) = location {
            self.registry.set_location(to_sym, location);
        }
        self.set_value(name, Some(Value::One(to_sym)));

        self.name_stack.push(name.to_string());
        let inner_key = self.current_ns_key();
        self.scope_stack.push(inner_key.clone());
        self.context_stack.push(ScopeContext::Function);

        self.seed_parameter_sentinels(args, &inner_key);
        if let Some(self_name) = self_name {
            if let Some(class_sym) = self.current_class() {
                if let Some(scope) = self.scopes.get_mut(&inner_key) {
                    trace!(name = %self_name, "binding receiver to enclosing class");
                    scope
                        .defs
                        .insert(self_name, Some(Value::One(class_sym)));
                }
            }
        }
        self.bind_parameter_defaults(args);
        if let Some(ret) = returns {
            self.visit_expr(ret);
        }
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(ann) = &arg.def.annotation {
                self.visit_expr(ann);
            }
        }
        if let Some(vararg) = &args.vararg {
            if let Some(ann) = &vararg.annotation {
                self.visit_expr(ann);
            }
        }
        if let Some(kwarg) = &args.kwarg {
            if let Some(ann) = &kwarg.annotation {
                self.visit_expr(ann);
            }
        }

        self.visit_stmts(body);

        self.context_stack.pop();
        self.scope_stack.pop();
        self.name_stack.pop();
    }

    /// Pre-bind every parameter to a sentinel so a same-named name from an
    /// enclosing scope cannot leak into the body.
    fn seed_parameter_sentinels(&mut self, args: &ast::Arguments, scope_key: &str) {
        let sentinel = self.registry.get_or_create(
            Some(scope_key),
            PARAM_SENTINEL,
            SymbolKind::Unspecified,
            None,
        );
        let Some(scope) = self.scopes.get_mut(scope_key) else {
            return;
        };
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            scope
                .defs
                .insert(arg.def.arg.to_string(), Some(Value::One(sentinel)));
        }
        if let Some(vararg) = &args.vararg {
            scope
                .defs
                .insert(vararg.arg.to_string(), Some(Value::One(sentinel)));
        }
        if let Some(kwarg) = &args.kwarg {
            scope
                .defs
                .insert(kwarg.arg.to_string(), Some(Value::One(sentinel)));
        }
    }

    /// Rebind parameters that carry default values to those values.
    fn bind_parameter_defaults(&mut self, args: &ast::Arguments) {
        for arg in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(default) = &arg.default {
                let value = self.visit_expr(default);
                self.set_value(arg.def.arg.as_str(), value);
            }
        }
    }

    fn visit_class_def(&mut self, def: &ast::StmtClassDef) {
        debug!(name = def.name.as_str(), file = %self.filename, "class definition");

        for deco in &def.decorator_list {
            self.visit_expr(deco);
        }

        let from_sym = self.current_ns_symbol();
        let ns = self.registry.get(from_sym).qualified_name();
        let location = self.loc(def.range);
        let class_sym = self.registry.get_or_create(
            Some(ns.as_str()),
            def.name.as_str(),
            SymbolKind::Class,
            location.clone(),
        );
        self.add_defines_edge(from_sym, Some(class_sym));
        if let Some(location) = location {
            self.registry.set_location(class_sym, location);
        }
        self.set_value(def.name.as_str(), Some(Value::One(class_sym)));

        self.class_stack.push(class_sym);
        self.name_stack.push(def.name.to_string());
        let inner_key = self.current_ns_key();
        self.scope_stack.push(inner_key);
        self.context_stack.push(ScopeContext::Class);

        // Bases are recorded for resolution between iterations; visiting
        // them also marks the derived-class -> base uses edges.
        let mut base_specs = Vec::new();
        for base in &def.bases {
            base_specs.push(dotted_path(base));
            self.visit_expr(base);
        }
        self.class_bases.insert(class_sym, base_specs);
        for kw in &def.keywords {
            self.visit_expr(&kw.value);
        }

        self.visit_stmts(&def.body);

        self.context_stack.pop();
        self.scope_stack.pop();
        self.name_stack.pop();
        self.class_stack.pop();
    }

    fn visit_for(
        &mut self,
        target: &Expr,
        iter: &Expr,
        body: &[Stmt],
        orelse: &[Stmt],
        is_async: bool,
    ) {
        // NOTE: iter is visited again inside analyze_binding; harmless, the
        // resolution is identical and edges deduplicate.
        let iter_value = self.visit_expr(iter);
        self.add_iterator_protocol_edges(iter_value.as_ref(), is_async);
        self.analyze_binding(&flatten_exprs(target), &flatten_exprs(iter));
        self.visit_stmts(body);
        self.visit_stmts(orelse);
    }

    /// Iteration goes through `__iter__`/`__next__` (async:
    /// `__aiter__`/`__anext__`) on the iterable's type.
    fn add_iterator_protocol_edges(&mut self, iter_value: Option<&Value>, is_async: bool) {
        let Some(value) = iter_value else { return };
        let from = self.current_ns_symbol();
        let methods: [&str; 2] = if is_async {
            ["__aiter__", "__anext__"]
        } else {
            ["__iter__", "__next__"]
        };
        for &id in value.ids() {
            let ns = self.registry.get(id).qualified_name();
            for method in methods {
                let to =
                    self.registry
                        .get_or_create(Some(ns.as_str()), method, SymbolKind::Method, None);
                self.add_uses_edge(from, to);
            }
        }
    }

    fn visit_with(&mut self, items: &[ast::WithItem], body: &[Stmt], enter: &str, exit: &str) {
        for item in items {
            // NOTE: the context expression is visited again when binding the
            // as-target below; resolves to the same vertex, edges dedupe.
            let cm_value = self.visit_expr(&item.context_expr);
            if let Some(value) = &cm_value {
                let from = self.current_ns_symbol();
                for &id in value.ids() {
                    let ns = self.registry.get(id).qualified_name();
                    for method in [enter, exit] {
                        let to = self.registry.get_or_create(
                            Some(ns.as_str()),
                            method,
                            SymbolKind::Method,
                            None,
                        );
                        self.add_uses_edge(from, to);
                    }
                }
            }
            if let Some(vars) = &item.optional_vars {
                if matches!(vars.as_ref(), Expr::Name(_)) {
                    // `with expr as name`: name gets the managed object,
                    // assuming its __enter__ returns self
                    self.analyze_binding(&flatten_exprs(vars), &flatten_exprs(&item.context_expr));
                } else {
                    self.visit_expr(vars);
                }
            }
        }
        self.visit_stmts(body);
    }

    /// `del obj.attr` goes through `__delattr__`, `del obj[key]` through
    /// `__delitem__`; `del name` only unbinds a local.
    ///
    /// The binding itself is left alone: flow-insensitive analysis cannot
    /// tell whether the `del` executes before or after the uses it would
    /// invalidate.
    fn visit_delete(&mut self, del: &ast::StmtDelete) {
        for target in &del.targets {
            match target {
                Expr::Attribute(attr) => {
                    let obj = self.visit_expr(&attr.value);
                    self.add_protocol_edge_on(obj.as_ref(), "__delattr__");
                }
                Expr::Subscript(sub) => {
                    let obj = self.visit_expr(&sub.value);
                    self.add_protocol_edge_on(obj.as_ref(), "__delitem__");
                    self.visit_expr(&sub.slice);
                }
                _ => {}
            }
        }
    }

    fn add_protocol_edge_on(&mut self, obj: Option<&Value>, method: &str) {
        let Some(value) = obj else { return };
        let from = self.current_ns_symbol();
        for &id in value.ids() {
            let ns = self.registry.get(id).qualified_name();
            let to = self
                .registry
                .get_or_create(Some(ns.as_str()), method, SymbolKind::Method, None);
            self.add_uses_edge(from, to);
        }
    }

    fn visit_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchValue(p) => {
                self.visit_expr(&p.value);
            }
            Pattern::MatchSingleton(_) => {}
            Pattern::MatchSequence(p) => {
                for sub in &p.patterns {
                    self.visit_pattern(sub);
                }
            }
            Pattern::MatchMapping(p) => {
                for key in &p.keys {
                    self.visit_expr(key);
                }
                for sub in &p.patterns {
                    self.visit_pattern(sub);
                }
            }
            // the class being matched against is a load reference
            Pattern::MatchClass(p) => {
                self.visit_expr(&p.cls);
                for sub in &p.patterns {
                    self.visit_pattern(sub);
                }
                for sub in &p.kwd_patterns {
                    self.visit_pattern(sub);
                }
            }
            Pattern::MatchStar(_) => {}
            Pattern::MatchAs(p) => {
                if let Some(sub) = &p.pattern {
                    self.visit_pattern(sub);
                }
            }
            Pattern::MatchOr(p) => {
                for sub in &p.patterns {
                    self.visit_pattern(sub);
                }
            }
        }
    }

    fn visit_type_alias(&mut self, alias: &ast::StmtTypeAlias) {
        let Expr::Name(name) = alias.name.as_ref() else {
            return;
        };
        debug!(name = name.id.as_str(), "type alias");
        let from_sym = self.current_ns_symbol();
        let ns = self.registry.get(from_sym).qualified_name();
        let location = self.loc(alias.range);
        let to_sym = self.registry.get_or_create(
            Some(ns.as_str()),
            name.id.as_str(),
            SymbolKind::Name,
            location.clone(),
        );
        self.add_defines_edge(from_sym, Some(to_sym));
        if let Some(location) = location {
            self.registry.set_location(to_sym, location);
        }
        self.set_value(name.id.as_str(), Some(Value::One(to_sym)));

        // A parameterized alias nests a type-parameter scope around the
        // alias value scope; both are named after the alias.
        let label = name.id.to_string();
        if alias.type_params.is_empty() {
            self.with_inner_scope(&label, |v| {
                v.visit_expr(&alias.value);
            });
        } else {
            self.with_inner_scope(&label, |v| {
                v.with_inner_scope(&label, |v| {
                    v.visit_expr(&alias.value);
                });
            });
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn analyze_module_import(&mut self, alias: &ast::Alias) {
        trace!(module = alias.name.as_str(), "import");
        let from = self.current_ns_symbol();
        let location = self.loc(alias.range);
        let mod_sym = self.registry.get_or_create(
            Some(""),
            alias.name.as_str(),
            SymbolKind::Module,
            location.clone(),
        );
        self.add_uses_edge(from, mod_sym);
        match &alias.asname {
            Some(asname) => self.set_value(asname.as_str(), Some(Value::One(mod_sym))),
            None => {
                // `import a.b` binds the root package name.
                let root = alias.name.split('.').next().unwrap_or_default();
                if root == alias.name.as_str() {
                    self.set_value(root, Some(Value::One(mod_sym)));
                } else {
                    let root_sym =
                        self.registry
                            .get_or_create(Some(""), root, SymbolKind::Module, location);
                    self.set_value(root, Some(Value::One(root_sym)));
                }
            }
        }
    }

    fn visit_import_from(&mut self, import: &ast::StmtImportFrom) {
        let from = self.current_ns_symbol();
        let level = import.level.map(|l| l.to_u32()).unwrap_or(0) as usize;
        // Relative imports resolve against the importing module's own
        // dotted name.
        let target_ns = if level > 0 {
            let base = strip_tail_segments(&self.module_name, level);
            match &import.module {
                Some(module) if base.is_empty() => module.to_string(),
                Some(module) => format!("{}.{}", base, module.as_str()),
                None => base,
            }
        } else {
            import
                .module
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default()
        };
        trace!(target = %target_ns, "from-import");

        for alias in &import.names {
            let location = self.loc(alias.range);
            let full = if target_ns.is_empty() {
                alias.name.to_string()
            } else {
                format!("{}.{}", target_ns, alias.name.as_str())
            };
            // A name that denotes an analyzed module is bound to the module
            // vertex itself; anything else becomes an imported item in the
            // source module's namespace.
            let to_sym = if self.module_to_file.contains_key(&full) {
                self.registry
                    .get_or_create(Some(""), &full, SymbolKind::Module, location)
            } else {
                self.registry.get_or_create(
                    Some(target_ns.as_str()),
                    alias.name.as_str(),
                    SymbolKind::ImportedItem,
                    location,
                )
            };
            let local = alias.asname.as_ref().unwrap_or(&alias.name);
            self.set_value(local.as_str(), Some(Value::One(to_sym)));
            self.add_uses_edge(from, to_sym);
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Walk an expression in load position and return the set of vertices it
    /// could denote, or `None` when that cannot be determined.
    pub(crate) fn visit_expr(&mut self, expr: &Expr) -> Option<Value> {
        match expr {
            Expr::Name(name) => match name.ctx {
                ExprContext::Load => self.visit_name_load(name),
                _ => None,
            },
            Expr::Attribute(attr) => match attr.ctx {
                ExprContext::Load => self.visit_attribute_load(attr),
                _ => None,
            },
            Expr::Call(call) => self.visit_call(call),
            Expr::NamedExpr(walrus) => {
                self.analyze_binding(&flatten_exprs(&walrus.target), &flatten_exprs(&walrus.value));
                match walrus.target.as_ref() {
                    Expr::Name(name) => self.get_value(name.id.as_str()),
                    _ => None,
                }
            }
            Expr::Lambda(lambda) => {
                debug!(file = %self.filename, "lambda");
                let (inner_sym, _) = self.with_inner_scope("lambda", |v| {
                    let key = v.current_ns_key();
                    v.seed_parameter_sentinels(&lambda.args, &key);
                    v.bind_parameter_defaults(&lambda.args);
                    v.visit_expr(&lambda.body);
                });
                Some(Value::One(inner_sym))
            }
            Expr::ListComp(comp) => {
                self.analyze_comprehension("listcomp", &comp.generators, &[comp.elt.as_ref()])
            }
            Expr::SetComp(comp) => {
                self.analyze_comprehension("setcomp", &comp.generators, &[comp.elt.as_ref()])
            }
            Expr::DictComp(comp) => {
                self.analyze_comprehension(
                "dictcomp",
                &comp.generators,
                &[comp.key.as_ref(), comp.value.as_ref()],
            )
            }
            Expr::GeneratorExp(comp) => {
                self.analyze_comprehension("genexpr", &comp.generators, &[comp.elt.as_ref()])
            }
            // Literals evaluate to their builtin type.
            Expr::Constant(constant) => Some(Value::One(self.constant_class(&constant.value))),
            Expr::BoolOp(e) => {
                for value in &e.values {
                    self.visit_expr(value);
                }
                None
            }
            Expr::BinOp(e) => {
                self.visit_expr(&e.left);
                self.visit_expr(&e.right);
                None
            }
            Expr::UnaryOp(e) => {
                self.visit_expr(&e.operand);
                None
            }
            Expr::IfExp(e) => {
                self.visit_expr(&e.test);
                self.visit_expr(&e.body);
                self.visit_expr(&e.orelse);
                None
            }
            Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.visit_expr(key);
                }
                for value in &e.values {
                    self.visit_expr(value);
                }
                None
            }
            Expr::Set(e) => {
                for elt in &e.elts {
                    self.visit_expr(elt);
                }
                None
            }
            Expr::Await(e) => self.visit_expr(&e.value),
            Expr::Yield(e) => {
                if let Some(value) = &e.value {
                    self.visit_expr(value);
                }
                None
            }
            Expr::YieldFrom(e) => {
                self.visit_expr(&e.value);
                None
            }
            Expr::Compare(e) => {
                self.visit_expr(&e.left);
                for cmp in &e.comparators {
                    self.visit_expr(cmp);
                }
                None
            }
            Expr::FormattedValue(e) => {
                self.visit_expr(&e.value);
                if let Some(spec) = &e.format_spec {
                    self.visit_expr(spec);
                }
                None
            }
            Expr::JoinedStr(e) => {
                for value in &e.values {
                    self.visit_expr(value);
                }
                None
            }
            Expr::Subscript(e) => {
                self.visit_expr(&e.value);
                self.visit_expr(&e.slice);
                None
            }
            Expr::Starred(e) => self.visit_expr(&e.value),
            Expr::List(e) => {
                for elt in &e.elts {
                    self.visit_expr(elt);
                }
                None
            }
            Expr::Tuple(e) => {
                for elt in &e.elts {
                    self.visit_expr(elt);
                }
                None
            }
            Expr::Slice(e) => {
                for part in [&e.lower, &e.upper, &e.step].into_iter().flatten() {
                    self.visit_expr(part);
                }
                None
            }
        }
    }

    fn visit_name_load(&mut self, name: &ast::ExprName) -> Option<Value> {
        let id_str = name.id.as_str();
        match self.get_value(id_str) {
            Some(value) => {
                // a reference to the receiver's own class is not a use
                if let (Some(class_sym), Value::One(v)) = (self.current_class(), &value) {
                    if *v == class_sym {
                        return Some(value);
                    }
                }
                let from = self.current_ns_symbol();
                for &id in value.ids() {
                    self.add_uses_edge(from, id);
                }
                Some(value)
            }
            None => {
                // A local that merely has no value yet carries no type
                // information; a wildcard for it would only pollute the
                // contraction step.
                if self.current_scope_has_local(id_str) {
                    return None;
                }
                let location = self.loc(name.range);
                let unknown =
                    self.registry
                        .get_or_create(None, id_str, SymbolKind::Unknown, location);
                let from = self.current_ns_symbol();
                self.add_uses_edge(from, unknown);
                Some(Value::One(unknown))
            }
        }
    }

    fn visit_attribute_load(&mut self, attr: &ast::ExprAttribute) -> Option<Value> {
        match self.get_attribute(attr) {
            // An unresolved super() in the chain: stay silent rather than
            // manufacture a wildcard.
            Err(AttrError::UnresolvedSuper) => None,
            Ok((_, Some(value))) => {
                let from = self.current_ns_symbol();
                for &id in value.ids() {
                    self.add_uses_edge(from, id);
                    if self.registry.get(id).namespace.is_some() {
                        self.remove_wild(from, id, attr.attr.as_str());
                    }
                }
                Some(value)
            }
            Ok((Some(obj_value), None)) => {
                // Object known, attribute not: record the attribute under
                // the object's namespace (forward reference or unanalyzed
                // import) and use that.
                let from = self.current_ns_symbol();
                let location = self.loc(attr.range);
                let mut created = Vec::new();
                for &obj_id in obj_value.ids() {
                    if self.registry.get(obj_id).namespace.is_none() {
                        continue;
                    }
                    let ns = self.registry.get(obj_id).qualified_name();
                    let to = self.registry.get_or_create(
                        Some(ns.as_str()),
                        attr.attr.as_str(),
                        SymbolKind::Attribute,
                        location.clone(),
                    );
                    self.add_uses_edge(from, to);
                    self.remove_wild(from, obj_id, attr.attr.as_str());
                    created.push(to);
                }
                match Value::from_ids(created) {
                    Some(value) => Some(value),
                    None => self.visit_expr(&attr.value),
                }
            }
            Ok((None, None)) => self.visit_expr(&attr.value),
        }
    }

    fn visit_call(&mut self, call: &ast::ExprCall) -> Option<Value> {
        for arg in &call.args {
            self.visit_expr(arg);
        }
        for kw in &call.keywords {
            self.visit_expr(&kw.value);
        }

        match self.resolve_special_call(call) {
            Ok(Some(result)) => {
                let from = self.current_ns_symbol();
                for &id in result.ids() {
                    self.add_uses_edge(from, id);
                }
                Some(result)
            }
            // General case; an unresolved super() degrades to it as well.
            Ok(None) | Err(AttrError::UnresolvedSuper) => {
                let func_value = self.visit_expr(&call.func);
                if let Some(value) = &func_value {
                    // calling a known class constructs an instance
                    let class_ids: Vec<SymbolId> = value
                        .ids()
                        .iter()
                        .copied()
                        .filter(|id| self.class_bases.contains_key(id))
                        .collect();
                    if !class_ids.is_empty() {
                        let from = self.current_ns_symbol();
                        for class_id in class_ids {
                            let ns = self.registry.get(class_id).qualified_name();
                            let init = self.registry.get_or_create(
                                Some(ns.as_str()),
                                "__init__",
                                SymbolKind::Method,
                                None,
                            );
                            self.add_uses_edge(from, init);
                        }
                    }
                }
                func_value
            }
        }
    }

    fn analyze_comprehension(
        &mut self,
        label: &str,
        generators: &[ast::Comprehension],
        elements: &[&Expr],
    ) -> Option<Value> {
        debug!(label, file = %self.filename, "comprehension");
        let outermost = generators.first()?;
        // The outermost iterable is evaluated in the enclosing scope;
        // everything else inside the comprehension's own scope.
        let iter_value = self.visit_expr(&outermost.iter);
        self.add_iterator_protocol_edges(iter_value.as_ref(), outermost.is_async);

        let rest = &generators[1..];
        let (inner_sym, _) = self.with_inner_scope(label, |v| {
            for target in flatten_exprs(&outermost.target) {
                v.bind_target(target, iter_value.clone());
            }
            for if_ in &outermost.ifs {
                v.visit_expr(if_);
            }
            for gen in rest {
                v.analyze_binding(&flatten_exprs(&gen.target), &flatten_exprs(&gen.iter));
                // NOTE: gen.iter was just visited by analyze_binding; the
                // repeat below only feeds the protocol edges.
                let inner_iter = v.visit_expr(&gen.iter);
                v.add_iterator_protocol_edges(inner_iter.as_ref(), gen.is_async);
                for if_ in &gen.ifs {
                    v.visit_expr(if_);
                }
            }
            for element in elements {
                v.visit_expr(element);
            }
        });
        Some(Value::One(inner_sym))
    }

    // ------------------------------------------------------------------
    // Base-class resolution (between the two iterations)
    // ------------------------------------------------------------------

    /// Resolve the recorded base-class expressions to class vertices and
    /// linearize every analyzed class. Must run with no file being visited.
    pub fn resolve_base_classes(&mut self) {
        debug_assert!(self.scope_stack.is_empty(), "only allowed between passes");
        debug!(classes = self.class_bases.len(), "resolving base classes");

        let class_specs: Vec<(SymbolId, Vec<Option<Vec<String>>>)> = self
            .class_bases
            .iter()
            .map(|(id, specs)| (*id, specs.clone()))
            .collect();
        let saved_stack = std::mem::take(&mut self.scope_stack);
        for (class_sym, specs) in class_specs {
            // base names resolve in the scope enclosing the class definition
            let ns = self
                .registry
                .get(class_sym)
                .namespace
                .clone()
                .unwrap_or_default();
            self.scope_stack = vec![ns];
            let mut resolved = Vec::new();
            for spec in specs {
                let value = spec
                    .as_deref()
                    .and_then(|path| self.resolve_dotted_path(path));
                match value {
                    Some(Value::One(id)) if self.registry.get(id).namespace.is_some() => {
                        resolved.push(id);
                    }
                    // Ancestry is opaque past an unresolved base; lookups
                    // through the missing slots stay unresolved.
                    _ => break,
                }
            }
            self.resolved_bases.insert(class_sym, resolved);
        }
        self.scope_stack = saved_stack;

        let hierarchy = self.resolved_bases.clone();
        for &class_sym in hierarchy.keys() {
            match mro::linearize(class_sym, &hierarchy) {
                Some(order) => {
                    trace!(
                        class = %self.registry.get(class_sym).qualified_name(),
                        depth = order.len(),
                        "linearized"
                    );
                    self.mro.insert(class_sym, order);
                }
                None => {
                    warn!(
                        class = %self.registry.get(class_sym).qualified_name(),
                        "no consistent linearization; falling back to the class alone"
                    );
                    self.mro.insert(class_sym, vec![class_sym]);
                }
            }
        }
    }

    /// Resolve `a.b.c` starting from the scope stack, walking scope `defs`
    /// for each further segment.
    fn resolve_dotted_path(&mut self, path: &[String]) -> Option<Value> {
        let mut value = self.get_value(path.first()?)?;
        for segment in &path[1..] {
            let mut ids = Vec::new();
            for &id in value.ids() {
                let sym = self.registry.get(id);
                if sym.namespace.is_none() {
                    continue;
                }
                let ns = sym.qualified_name();
                if let Some(scope) = self.scopes.get(&ns) {
                    if let Some(Some(v)) = scope.defs.get(segment) {
                        ids.extend(v.ids().iter().copied());
                    }
                }
            }
            value = Value::from_ids(ids)?;
        }
        Some(value)
    }
}

// ============================================================================
// Free helpers
// ============================================================================

/// Flatten `a.b.c` into `["a", "b", "c"]`; `None` for anything that is not a
/// name or a dotted chain of names.
fn dotted_path(expr: &Expr) -> Option<Vec<String>> {
    match expr {
        Expr::Name(name) => Some(vec![name.id.to_string()]),
        Expr::Attribute(attr) => {
            let mut path = dotted_path(&attr.value)?;
            path.push(attr.attr.to_string());
            Some(path)
        }
        _ => None,
    }
}

/// Drop the last `count` dotted segments: `strip_tail_segments("a.b.c", 1)`
/// is `"a.b"`.
fn strip_tail_segments(dotted: &str, count: usize) -> String {
    let segments: Vec<&str> = dotted.split('.').collect();
    segments[..segments.len().saturating_sub(count)].join(".")
}

// ============================================================================
// Tests
// ============================================================================
