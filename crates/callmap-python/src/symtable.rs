//! Symbol-table pre-scan.
//!
//! Before any graph traversal, every file gets a lightweight scan that
//! creates one [`Scope`] record per compound construct and collects the
//! names each scope binds: assignment targets, imports, function and class
//! definitions, parameters, iteration variables, match captures. Names
//! declared `global` or `nonlocal` are excluded from the scope's `defs` so
//! that lookup and assignment fall through to the declaring scope.
//!
//! Answering "is this bare identifier local here?" is a purely lexical
//! question; keeping it separate from the later value-tracking passes keeps
//! "where does this name resolve?" from getting tangled with "what does it
//! point to?".
//!
//! Comprehensions always get their own scope (`listcomp`, `setcomp`,
//! `dictcomp`, `genexpr`), with one caveat: walrus targets inside a
//! comprehension bind in the nearest enclosing non-comprehension scope.
//! Sibling comprehensions in one scope share a key and therefore a scope
//! record.

use std::collections::{HashMap, HashSet};

use rustpython_ast::{self as ast, Expr, Pattern, Stmt};

use crate::scope::Scope;

/// Build scope records for one parsed module into `scopes`.
///
/// Keys are dotted fully-qualified names rooted at `module_name`. Existing
/// entries (earlier files, duplicate definitions) are merged: new names are
/// added, values already tracked for known names are left alone.
pub fn build_scopes(
    module_name: &str,
    module: &ast::ModModule,
    scopes: &mut HashMap<String, Scope>,
) {
    let mut builder = ScopeBuilder {
        frames: Vec::new(),
        scopes,
    };
    builder.push_frame(module_name.to_string(), false);
    for stmt in &module.body {
        builder.walk_stmt(stmt);
    }
    builder.pop_frame();
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Default)]
struct Draft {
    bound: HashSet<String>,
    imported: HashSet<String>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
}

struct Frame {
    key: String,
    comprehension: bool,
    draft: Draft,
}

struct ScopeBuilder<'a> {
    frames: Vec<Frame>,
    scopes: &'a mut HashMap<String, Scope>,
}

impl ScopeBuilder<'_> {
    fn push_frame(&mut self, key: String, comprehension: bool) {
        self.frames.push(Frame {
            key,
            comprehension,
            draft: Draft::default(),
        });
    }

    /// Key for a child scope of the current frame.
    fn child_key(&self, name: &str) -> String {
        match self.frames.last() {
            Some(frame) => format!("{}.{}", frame.key, name),
            None => name.to_string(),
        }
    }

    fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let terminal = frame
            .key
            .rsplit('.')
            .next()
            .unwrap_or(frame.key.as_str())
            .to_string();
        let scope = self
            .scopes
            .entry(frame.key.clone())
            .or_insert_with(|| Scope::new(terminal));
        let draft = frame.draft;
        for name in &draft.bound {
            if draft.globals.contains(name) || draft.nonlocals.contains(name) {
                continue;
            }
            scope.defs.entry(name.clone()).or_insert(None);
            if !draft.imported.contains(name) {
                scope.locals.insert(name.clone());
            }
        }
    }

    fn bind(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.draft.bound.insert(name.to_string());
        }
    }

    fn bind_import(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.draft.bound.insert(name.to_string());
            frame.draft.imported.insert(name.to_string());
        }
    }

    /// Walrus targets skip comprehension frames and bind in the enclosing
    /// function, class, or module scope.
    fn bind_walrus(&mut self, name: &str) {
        if let Some(frame) = self
            .frames
            .iter_mut()
            .rev()
            .find(|frame| !frame.comprehension)
        {
            frame.draft.bound.insert(name.to_string());
        }
    }

    fn declare_global(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.draft.globals.insert(name.to_string());
        }
    }

    fn declare_nonlocal(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.draft.nonlocals.insert(name.to_string());
        }
    }

    // ------------------------------------------------------------------
    // Statement walk
    // ------------------------------------------------------------------

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::FunctionDef(def) => {
                self.walk_function(
                    &def.name,
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                    def.returns.as_deref(),
                );
            }
            Stmt::AsyncFunctionDef(def) => {
                self.walk_function(
                    &def.name,
                    &def.args,
                    &def.body,
                    &def.decorator_list,
                    def.returns.as_deref(),
                );
            }
            Stmt::ClassDef(def) => {
                self.bind(def.name.as_str());
                for deco in &def.decorator_list {
                    self.walk_expr(deco);
                }
                for base in &def.bases {
                    self.walk_expr(base);
                }
                for kw in &def.keywords {
                    self.walk_expr(&kw.value);
                }
                self.push_frame(self.child_key(def.name.as_str()), false);
                for stmt in &def.body {
                    self.walk_stmt(stmt);
                }
                self.pop_frame();
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.bind_target_names(target);
                }
                self.walk_expr(&assign.value);
            }
            Stmt::AugAssign(aug) => {
                self.bind_target_names(&aug.target);
                self.walk_expr(&aug.value);
            }
            Stmt::AnnAssign(ann) => {
                self.bind_target_names(&ann.target);
                self.walk_expr(&ann.annotation);
                if let Some(value) = &ann.value {
                    self.walk_expr(value);
                }
            }
            Stmt::For(stmt) => {
                self.bind_target_names(&stmt.target);
                self.walk_expr(&stmt.iter);
                self.walk_body(&stmt.body);
                self.walk_body(&stmt.orelse);
            }
            Stmt::AsyncFor(stmt) => {
                self.bind_target_names(&stmt.target);
                self.walk_expr(&stmt.iter);
                self.walk_body(&stmt.body);
                self.walk_body(&stmt.orelse);
            }
            Stmt::While(stmt) => {
                self.walk_expr(&stmt.test);
                self.walk_body(&stmt.body);
                self.walk_body(&stmt.orelse);
            }
            Stmt::If(stmt) => {
                self.walk_expr(&stmt.test);
                self.walk_body(&stmt.body);
                self.walk_body(&stmt.orelse);
            }
            Stmt::With(stmt) => {
                for item in &stmt.items {
                    self.walk_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target_names(vars);
                    }
                }
                self.walk_body(&stmt.body);
            }
            Stmt::AsyncWith(stmt) => {
                for item in &stmt.items {
                    self.walk_expr(&item.context_expr);
                    if let Some(vars) = &item.optional_vars {
                        self.bind_target_names(vars);
                    }
                }
                self.walk_body(&stmt.body);
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    match &alias.asname {
                        Some(asname) => self.bind_import(asname.as_str()),
                        // `import a.b` binds the root segment.
                        None => {
                            let root = alias.name.split('.').next().unwrap_or_default();
                            self.bind_import(root);
                        }
                    }
                }
            }
            Stmt::ImportFrom(import) => {
                for alias in &import.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let local = alias.asname.as_ref().unwrap_or(&alias.name);
                    self.bind_import(local.as_str());
                }
            }
            Stmt::Global(stmt) => {
                for name in &stmt.names {
                    self.declare_global(name.as_str());
                }
            }
            Stmt::Nonlocal(stmt) => {
                for name in &stmt.names {
                    self.declare_nonlocal(name.as_str());
                }
            }
            Stmt::Try(stmt) => {
                self.walk_body(&stmt.body);
                for handler in &stmt.handlers {
                    self.walk_handler(handler);
                }
                self.walk_body(&stmt.orelse);
                self.walk_body(&stmt.finalbody);
            }
            Stmt::TryStar(stmt) => {
                self.walk_body(&stmt.body);
                for handler in &stmt.handlers {
                    self.walk_handler(handler);
                }
                self.walk_body(&stmt.orelse);
                self.walk_body(&stmt.finalbody);
            }
            Stmt::Match(stmt) => {
                self.walk_expr(&stmt.subject);
                for case in &stmt.cases {
                    self.walk_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.walk_expr(guard);
                    }
                    self.walk_body(&case.body);
                }
            }
            Stmt::TypeAlias(alias) => {
                if let Expr::Name(name) = alias.name.as_ref() {
                    self.bind(name.id.as_str());
                    // Parameterized aliases get a type-parameter scope
                    // wrapping the alias scope; both carry the alias name.
                    let outer = self.child_key(name.id.as_str());
                    self.push_frame(outer, false);
                    if !alias.type_params.is_empty() {
                        let inner = self.child_key(name.id.as_str());
                        self.push_frame(inner, false);
                        self.walk_expr(&alias.value);
                        self.pop_frame();
                    } else {
                        self.walk_expr(&alias.value);
                    }
                    self.pop_frame();
                }
            }
            Stmt::Return(stmt) => {
                if let Some(value) = &stmt.value {
                    self.walk_expr(value);
                }
            }
            Stmt::Delete(stmt) => {
                for target in &stmt.targets {
                    self.walk_expr(target);
                }
            }
            Stmt::Raise(stmt) => {
                if let Some(exc) = &stmt.exc {
                    self.walk_expr(exc);
                }
                if let Some(cause) = &stmt.cause {
                    self.walk_expr(cause);
                }
            }
            Stmt::Assert(stmt) => {
                self.walk_expr(&stmt.test);
                if let Some(msg) = &stmt.msg {
                    self.walk_expr(msg);
                }
            }
            Stmt::Expr(stmt) => self.walk_expr(&stmt.value),
            Stmt::Pass(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn walk_body(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_handler(&mut self, handler: &ast::ExceptHandler) {
        let ast::ExceptHandler::ExceptHandler(h) = handler;
        if let Some(type_) = &h.type_ {
            self.walk_expr(type_);
        }
        if let Some(name) = &h.name {
            self.bind(name.as_str());
        }
        self.walk_body(&h.body);
    }

    fn walk_function(
        &mut self,
        name: &ast::Identifier,
        args: &ast::Arguments,
        body: &[Stmt],
        decorators: &[Expr],
        returns: Option<&Expr>,
    ) {
        self.bind(name.as_str());
        // Decorators, defaults, and annotations evaluate in the enclosing
        // scope.
        for deco in decorators {
            self.walk_expr(deco);
        }
        for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
            if let Some(default) = &arg.default {
                self.walk_expr(default);
            }
            if let Some(ann) = &arg.def.annotation {
                self.walk_expr(ann);
            }
        }
        if let Some(ret) = returns {
            self.walk_expr(ret);
        }
        self.push_frame(self.child_key(name.as_str()), false);
        self.bind_params(args);
        self.walk_body(body);
        self.pop_frame();
    }

    fn bind_params(&mut self, args: &ast::Arguments) {
        for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
            self.bind(arg.def.arg.as_str());
        }
        if let Some(vararg) = &args.vararg {
            self.bind(vararg.arg.as_str());
        }
        if let Some(kwarg) = &args.kwarg {
            self.bind(kwarg.arg.as_str());
        }
    }

    fn walk_pattern(&mut self, pattern: &Pattern) {
        match pattern {
            Pattern::MatchValue(p) => self.walk_expr(&p.value),
            Pattern::MatchSingleton(_) => {}
            Pattern::MatchSequence(p) => {
                for sub in &p.patterns {
                    self.walk_pattern(sub);
                }
            }
            Pattern::MatchMapping(p) => {
                for key in &p.keys {
                    self.walk_expr(key);
                }
                for sub in &p.patterns {
                    self.walk_pattern(sub);
                }
                if let Some(rest) = &p.rest {
                    self.bind(rest.as_str());
                }
            }
            Pattern::MatchClass(p) => {
                self.walk_expr(&p.cls);
                for sub in &p.patterns {
                    self.walk_pattern(sub);
                }
                for sub in &p.kwd_patterns {
                    self.walk_pattern(sub);
                }
            }
            Pattern::MatchStar(p) => {
                if let Some(name) = &p.name {
                    self.bind(name.as_str());
                }
            }
            Pattern::MatchAs(p) => {
                if let Some(sub) = &p.pattern {
                    self.walk_pattern(sub);
                }
                if let Some(name) = &p.name {
                    self.bind(name.as_str());
                }
            }
            Pattern::MatchOr(p) => {
                for sub in &p.patterns {
                    self.walk_pattern(sub);
                }
            }
        }
    }

    /// Collect binding names out of an assignment-like target.
    fn bind_target_names(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => self.bind(name.id.as_str()),
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.bind_target_names(elt);
                }
            }
            Expr::List(list) => {
                for elt in &list.elts {
                    self.bind_target_names(elt);
                }
            }
            Expr::Starred(starred) => self.bind_target_names(&starred.value),
            // Attribute and subscript targets bind no scope-level name.
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Expression walk (scope creation and walrus bindings only)
    // ------------------------------------------------------------------

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lambda(lambda) => {
                for arg in lambda
                    .args
                    .posonlyargs
                    .iter()
                    .chain(&lambda.args.args)
                    .chain(&lambda.args.kwonlyargs)
                {
                    if let Some(default) = &arg.default {
                        self.walk_expr(default);
                    }
                }
                self.push_frame(self.child_key("lambda"), false);
                self.bind_params(&lambda.args);
                self.walk_expr(&lambda.body);
                self.pop_frame();
            }
            Expr::ListComp(comp) => {
                self.walk_comprehension("listcomp", &comp.generators, &[comp.elt.as_ref()])
            }
            Expr::SetComp(comp) => {
                self.walk_comprehension("setcomp", &comp.generators, &[comp.elt.as_ref()])
            }
            Expr::DictComp(comp) => {
                self.walk_comprehension(
                "dictcomp",
                &comp.generators,
                &[comp.key.as_ref(), comp.value.as_ref()],
            )
            }
            Expr::GeneratorExp(comp) => {
                self.walk_comprehension("genexpr", &comp.generators, &[comp.elt.as_ref()])
            }
            Expr::NamedExpr(walrus) => {
                if let Expr::Name(name) = walrus.target.as_ref() {
                    self.bind_walrus(name.id.as_str());
                }
                self.walk_expr(&walrus.value);
            }
            Expr::BoolOp(e) => {
                for value in &e.values {
                    self.walk_expr(value);
                }
            }
            Expr::BinOp(e) => {
                self.walk_expr(&e.left);
                self.walk_expr(&e.right);
            }
            Expr::UnaryOp(e) => self.walk_expr(&e.operand),
            Expr::IfExp(e) => {
                self.walk_expr(&e.test);
                self.walk_expr(&e.body);
                self.walk_expr(&e.orelse);
            }
            Expr::Dict(e) => {
                for key in e.keys.iter().flatten() {
                    self.walk_expr(key);
                }
                for value in &e.values {
                    self.walk_expr(value);
                }
            }
            Expr::Set(e) => {
                for elt in &e.elts {
                    self.walk_expr(elt);
                }
            }
            Expr::Await(e) => self.walk_expr(&e.value),
            Expr::Yield(e) => {
                if let Some(value) = &e.value {
                    self.walk_expr(value);
                }
            }
            Expr::YieldFrom(e) => self.walk_expr(&e.value),
            Expr::Compare(e) => {
                self.walk_expr(&e.left);
                for cmp in &e.comparators {
                    self.walk_expr(cmp);
                }
            }
            Expr::Call(e) => {
                self.walk_expr(&e.func);
                for arg in &e.args {
                    self.walk_expr(arg);
                }
                for kw in &e.keywords {
                    self.walk_expr(&kw.value);
                }
            }
            Expr::FormattedValue(e) => {
                self.walk_expr(&e.value);
                if let Some(spec) = &e.format_spec {
                    self.walk_expr(spec);
                }
            }
            Expr::JoinedStr(e) => {
                for value in &e.values {
                    self.walk_expr(value);
                }
            }
            Expr::Attribute(e) => self.walk_expr(&e.value),
            Expr::Subscript(e) => {
                self.walk_expr(&e.value);
                self.walk_expr(&e.slice);
            }
            Expr::Starred(e) => self.walk_expr(&e.value),
            Expr::List(e) => {
                for elt in &e.elts {
                    self.walk_expr(elt);
                }
            }
            Expr::Tuple(e) => {
                for elt in &e.elts {
                    self.walk_expr(elt);
                }
            }
            Expr::Slice(e) => {
                for part in [&e.lower, &e.upper, &e.step].into_iter().flatten() {
                    self.walk_expr(part);
                }
            }
            Expr::Name(_) | Expr::Constant(_) => {}
        }
    }

    fn walk_comprehension(
        &mut self,
        label: &str,
        generators: &[ast::Comprehension],
        elements: &[&Expr],
    ) {
        // The outermost iterable evaluates in the enclosing scope.
        if let Some(outermost) = generators.first() {
            self.walk_expr(&outermost.iter);
        }
        self.push_frame(self.child_key(label), true);
        for (i, gen) in generators.iter().enumerate() {
            self.bind_target_names(&gen.target);
            if i > 0 {
                self.walk_expr(&gen.iter);
            }
            for if_ in &gen.ifs {
                self.walk_expr(if_);
            }
        }
        for element in elements {
            self.walk_expr(element);
        }
        self.pop_frame();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rustpython_parser::{parse, Mode};

    fn scopes_for(source: &str) -> HashMap<String, Scope> {
        let parsed = parse(source, Mode::Module, "test.py").expect("parse failed");
        let rustpython_ast::Mod::Module(module) = parsed else {
            panic!("expected module");
        };
        let mut scopes = HashMap::new();
        build_scopes("m", &module, &mut scopes);
        scopes
    }

    #[test]
    fn test_module_scope_binds_top_level_names() {
        let scopes = scopes_for("x = 1\ndef f(): pass\nclass C: pass\n");
        let module = &scopes["m"];
        assert!(module.defs.contains_key("x"));
        assert!(module.defs.contains_key("f"));
        assert!(module.defs.contains_key("C"));
        assert!(module.locals.contains("x"));
    }

    #[test]
    fn test_function_scope_has_params_and_locals() {
        let scopes = scopes_for("def f(a, b=1, *args, **kw):\n    tmp = a\n");
        let f = &scopes["m.f"];
        for name in ["a", "b", "args", "kw", "tmp"] {
            assert!(f.defs.contains_key(name), "missing {name}");
        }
        assert!(f.locals.contains("tmp"));
    }

    #[test]
    fn test_global_declaration_excluded_from_defs() {
        let scopes = scopes_for("counter = 0\ndef bump():\n    global counter\n    counter = 1\n");
        let bump = &scopes["m.bump"];
        assert!(!bump.defs.contains_key("counter"));
        assert!(!bump.locals.contains("counter"));
        assert!(scopes["m"].defs.contains_key("counter"));
    }

    #[test]
    fn test_imports_are_not_locals() {
        let scopes = scopes_for("import os.path\nfrom sys import argv as args\n");
        let module = &scopes["m"];
        assert!(module.defs.contains_key("os"));
        assert!(module.defs.contains_key("args"));
        assert!(!module.locals.contains("os"));
        assert!(!module.locals.contains("args"));
    }

    #[test]
    fn test_comprehension_gets_own_scope() {
        let scopes = scopes_for("def f(xs):\n    return [x for x in xs]\n");
        let comp = &scopes["m.f.listcomp"];
        assert!(comp.defs.contains_key("x"));
        assert!(!scopes["m.f"].defs.contains_key("x"));
    }

    #[test]
    fn test_walrus_in_comprehension_binds_in_function() {
        let scopes = scopes_for("def f(xs):\n    return [y for x in xs if (y := x)]\n");
        assert!(scopes["m.f"].defs.contains_key("y"));
        assert!(!scopes["m.f.listcomp"].defs.contains_key("y"));
    }

    #[test]
    fn test_lambda_scope() {
        let scopes = scopes_for("adder = lambda n: n + 1\n");
        assert!(scopes["m.lambda"].defs.contains_key("n"));
    }

    #[test]
    fn test_for_target_and_except_name_bind() {
        let scopes = scopes_for(
            "def f(xs):\n    for a, (b, c) in xs:\n        pass\n    try:\n        pass\n    except ValueError as err:\n        pass\n",
        );
        let f = &scopes["m.f"];
        for name in ["a", "b", "c", "err"] {
            assert!(f.defs.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn test_match_captures_bind() {
        let scopes = scopes_for(
            "def f(cmd):\n    match cmd:\n        case [first, *rest]:\n            pass\n        case {**mapping}:\n            pass\n        case str() as s:\n            pass\n",
        );
        let f = &scopes["m.f"];
        for name in ["first", "rest", "mapping", "s"] {
            assert!(f.defs.contains_key(name), "missing {name}");
        }
    }

    #[test]
    fn test_duplicate_scope_keys_merge() {
        let scopes = scopes_for("def f():\n    a = 1\ndef f():\n    b = 2\n");
        let f = &scopes["m.f"];
        assert!(f.defs.contains_key("a"));
        assert!(f.defs.contains_key("b"));
    }
}
