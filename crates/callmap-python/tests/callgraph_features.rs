//! Feature coverage for the analyzer: decorators, inheritance and MRO,
//! lambdas, closures, context managers, async functions, loop protocols,
//! walrus, match statements, delete protocols, annotations, super().
//!
//! Each test drives the full two-iteration pipeline over in-memory sources
//! and asserts on the visitor's edge state (wildcards included) or on
//! tracked bindings.

use callmap_core::graph::SymbolKind;
use callmap_python::scope::Value;
use callmap_python::{build_graph, GraphVisitor, SourceUnit};

fn analyze(sources: &[(&str, &str)]) -> GraphVisitor {
    let units: Vec<SourceUnit> = sources
        .iter()
        .map(|(module, source)| SourceUnit {
            module_name: module.to_string(),
            filename: format!("{}.py", module.replace('.', "/")),
            source: source.to_string(),
        })
        .collect();
    build_graph(&units)
}

fn analyze_one(source: &str) -> GraphVisitor {
    analyze(&[("m", source)])
}

fn kind_of(v: &GraphVisitor, qualified: &str) -> SymbolKind {
    let id = v
        .find_symbol(qualified)
        .unwrap_or_else(|| panic!("no symbol {qualified}"));
    v.symbol(id).kind
}

// --- Definitions ---

#[test]
fn module_defines_functions_and_classes() {
    let v = analyze_one("def f():\n    pass\n\nclass C:\n    def m(self):\n        pass\n");
    assert!(v.has_defines_edge("m", "m.f"));
    assert!(v.has_defines_edge("m", "m.C"));
    assert!(v.has_defines_edge("m.C", "m.C.m"));
    assert_eq!(kind_of(&v, "m.f"), SymbolKind::Function);
    assert_eq!(kind_of(&v, "m.C"), SymbolKind::Class);
    assert_eq!(kind_of(&v, "m.C.m"), SymbolKind::Method);
    assert_eq!(kind_of(&v, "m"), SymbolKind::Module);
}

#[test]
fn definition_locations_point_at_the_def_site() {
    let v = analyze_one("x = 1\n\ndef f():\n    pass\n");
    let id = v.find_symbol("m.f").expect("m.f");
    let loc = v.symbol(id).location.as_ref().expect("location");
    assert_eq!(loc.file, "m.py");
    assert_eq!(loc.line, 3);
}

// --- Decorators ---

#[test]
fn decorators_select_method_kinds() {
    let v = analyze_one(
        "class Decorated:\n    @staticmethod\n    def static_method():\n        pass\n\n    @classmethod\n    def class_method(cls):\n        pass\n\n    @property\n    def my_prop(self):\n        return self._x\n\n    def regular(self):\n        pass\n",
    );
    assert!(v.has_defines_edge("m.Decorated", "m.Decorated.static_method"));
    assert!(v.has_defines_edge("m.Decorated", "m.Decorated.class_method"));
    assert!(v.has_defines_edge("m.Decorated", "m.Decorated.my_prop"));
    assert!(v.has_defines_edge("m.Decorated", "m.Decorated.regular"));
    assert_eq!(
        kind_of(&v, "m.Decorated.static_method"),
        SymbolKind::StaticMethod
    );
    assert_eq!(
        kind_of(&v, "m.Decorated.class_method"),
        SymbolKind::ClassMethod
    );
    assert_eq!(kind_of(&v, "m.Decorated.regular"), SymbolKind::Method);

    // Builtin decorators stay wildcards; they are attributed to the class
    // because decorators evaluate in the enclosing scope.
    assert!(v.has_uses_edge("m.Decorated", "*.staticmethod"));
    assert!(v.has_uses_edge("m.Decorated", "*.classmethod"));
    assert!(v.has_uses_edge("m.Decorated", "*.property"));
}

// --- Inheritance ---

#[test]
fn inherited_methods_resolve_through_the_mro() {
    let v = analyze_one(
        "class Base:\n    def foo(self):\n        return 1\n\n    def bar(self):\n        return self.foo()\n\nclass Derived(Base):\n    def baz(self):\n        return self.foo() + self.bar()\n",
    );
    // the derived class references its base
    assert!(v.has_uses_edge("m.Derived", "m.Base"));
    // self-calls inside the base resolve locally
    assert!(v.has_uses_edge("m.Base.bar", "m.Base.foo"));
    // inherited lookups land on the base, not on a wildcard
    assert!(v.has_uses_edge("m.Derived.baz", "m.Base.foo"));
    assert!(v.has_uses_edge("m.Derived.baz", "m.Base.bar"));
    assert!(v.find_symbol("*.foo").is_none());
    assert!(v.find_symbol("*.bar").is_none());
}

#[test]
fn multiple_inheritance_marks_every_base() {
    let v = analyze_one(
        "class MixinA:\n    def shared(self):\n        pass\n\nclass MixinB:\n    def shared(self):\n        pass\n\nclass Combined(MixinA, MixinB):\n    pass\n",
    );
    assert!(v.has_uses_edge("m.Combined", "m.MixinA"));
    assert!(v.has_uses_edge("m.Combined", "m.MixinB"));
}

#[test]
fn unresolved_first_base_truncates_ancestry() {
    let v = analyze_one(
        "class LocalBase:\n    def helper(self):\n        pass\n\nclass Child(Missing, LocalBase):\n    def run(self):\n        self.helper()\n        super().helper()\n",
    );
    // ancestry is opaque past the unresolved base: the lookup neither
    // resolves to LocalBase nor fabricates a wildcard
    assert!(!v.has_uses_edge("m.Child.run", "m.LocalBase.helper"));
    assert!(v.find_symbol("*.helper").is_none());
    // the unresolved base itself is referenced as a wildcard
    assert!(v.has_uses_edge("m.Child", "*.Missing"));
}

// --- super() ---

#[test]
fn super_resolves_to_the_next_class_in_the_mro() {
    let v = analyze_one(
        "class A:\n    def m(self):\n        pass\n\nclass B(A):\n    def m(self):\n        super().m()\n",
    );
    assert!(v.has_uses_edge("m.B.m", "m.A.m"));
    assert!(!v.has_uses_edge("m.B.m", "m.B.m"));
}

#[test]
fn super_without_bases_stays_silent() {
    let v = analyze_one("class Alone:\n    def m(self):\n        super().m()\n");
    assert!(!v.has_uses_edge("m.Alone.m", "m.Alone.m"));
    assert!(v.find_symbol("*.m").is_none());
}

// --- Lambdas and closures ---

#[test]
fn lambda_is_defined_by_its_enclosing_function() {
    let v = analyze_one("def make_adder(n):\n    return lambda x: x + n\n");
    assert!(v.has_defines_edge("m.make_adder", "m.make_adder.lambda"));
}

#[test]
fn closure_definition_and_call() {
    let v = analyze_one("def outer():\n    def inner():\n        return 1\n    return inner()\n");
    assert!(v.has_defines_edge("m.outer", "m.outer.inner"));
    assert!(v.has_uses_edge("m.outer", "m.outer.inner"));
}

// --- Method capture ---

#[test]
fn attribute_bound_method_resolves_to_the_function() {
    let v = analyze_one(
        "def f():\n    pass\n\nclass C:\n    def __init__(self):\n        self.g = f\n\n    def h(self):\n        self.g()\n",
    );
    assert!(v.has_uses_edge("m.C.h", "m.f"));
}

// --- Context managers ---

#[test]
fn with_statement_uses_the_context_protocol() {
    let v = analyze_one(
        "class MyCtx:\n    def __enter__(self):\n        return self\n\n    def __exit__(self, *args):\n        pass\n\ndef use_ctx():\n    with MyCtx() as ctx:\n        pass\n",
    );
    assert!(v.has_uses_edge("m.use_ctx", "m.MyCtx"));
    assert!(v.has_uses_edge("m.use_ctx", "m.MyCtx.__enter__"));
    assert!(v.has_uses_edge("m.use_ctx", "m.MyCtx.__exit__"));
}

#[test]
fn async_with_uses_the_async_protocol() {
    let v = analyze_one(
        "class AsyncCM:\n    async def __aenter__(self):\n        return self\n\n    async def __aexit__(self, *args):\n        pass\n\nasync def use_async_cm():\n    async with AsyncCM() as cm:\n        pass\n",
    );
    assert!(v.has_uses_edge("m.use_async_cm", "m.AsyncCM.__aenter__"));
    assert!(v.has_uses_edge("m.use_async_cm", "m.AsyncCM.__aexit__"));
}

// --- Async calls ---

#[test]
fn awaited_calls_are_uses() {
    let v = analyze_one("async def fetch(url):\n    pass\n\nasync def process():\n    await fetch(\"x\")\n");
    assert!(v.has_uses_edge("m.process", "m.fetch"));
}

// --- Iteration protocol ---

#[test]
fn for_loop_uses_the_iterator_protocol() {
    let v = analyze_one(
        "class Bag:\n    def __iter__(self):\n        return self\n\n    def __next__(self):\n        raise StopIteration\n\ndef consume():\n    bag = Bag()\n    for x in bag:\n        x\n",
    );
    assert!(v.has_uses_edge("m.consume", "m.Bag.__iter__"));
    assert!(v.has_uses_edge("m.consume", "m.Bag.__next__"));
    // the loop counter is a known local; never a wildcard
    assert!(v.find_symbol("*.x").is_none());
}

#[test]
fn loop_counter_over_opaque_iterable_is_not_a_wildcard() {
    let v = analyze_one("def consume(xs):\n    for x in xs:\n        x\n");
    assert!(v.find_symbol("*.x").is_none());
    assert!(v.find_symbol("*.xs").is_none());
}

#[test]
fn calls_in_loop_bodies_are_uses() {
    let v = analyze_one(
        "def handle(x):\n    return x\n\ndef process_items(items):\n    for item in items:\n        handle(item)\n",
    );
    assert!(v.has_uses_edge("m.process_items", "m.handle"));
}

// --- Comprehensions ---

#[test]
fn comprehension_uses_fold_into_the_enclosing_function() {
    let v = analyze_one("def f(n):\n    return [[x for x in range(n)] for _ in range(n)]\n");
    assert!(v.has_uses_edge("m.f", "*.range"));
}

#[test]
fn comprehension_calls_resolve() {
    let v = analyze_one("def double(x):\n    return x\n\ndef f(xs):\n    return [double(x) for x in xs]\n");
    assert!(v.has_uses_edge("m.f", "m.double"));
}

// --- Walrus ---

#[test]
fn walrus_binds_and_its_uses_resolve() {
    let v = analyze_one(
        "def walrus_target(x):\n    pass\n\ndef walrus_caller(data):\n    if (n := len(data)) > 10:\n        walrus_target(n)\n",
    );
    assert!(v.has_uses_edge("m.walrus_caller", "m.walrus_target"));
    assert!(v.has_uses_edge("m.walrus_caller", "*.len"));
}

#[test]
fn walrus_bound_instance_resolves_method_calls() {
    let v = analyze_one(
        "class Result:\n    def process(self):\n        pass\n\ndef walrus_method():\n    if (r := Result()):\n        r.process()\n",
    );
    assert!(v.has_uses_edge("m.walrus_method", "m.Result.process"));
}

// --- Match statements ---

#[test]
fn match_class_patterns_use_the_matched_classes() {
    let v = analyze_one(
        "class Point:\n    def __init__(self, x, y):\n        pass\n\nclass Circle:\n    def __init__(self, r):\n        pass\n\ndef handle_point(px, py):\n    pass\n\ndef handle_default():\n    pass\n\ndef match_example(cmd):\n    match cmd:\n        case Point(x=px, y=py):\n            handle_point(px, py)\n        case Circle(r=cr):\n            pass\n        case [first, *others]:\n            pass\n        case {\"action\": action, **rest}:\n            pass\n        case _:\n            handle_default()\n",
    );
    assert!(v.has_uses_edge("m.match_example", "m.Point"));
    assert!(v.has_uses_edge("m.match_example", "m.Circle"));
    assert!(v.has_uses_edge("m.match_example", "m.handle_point"));
    assert!(v.has_uses_edge("m.match_example", "m.handle_default"));
    // captures are locals, not wildcards
    for name in ["*.px", "*.py", "*.first", "*.others", "*.action", "*.rest"] {
        assert!(v.find_symbol(name).is_none(), "unexpected wildcard {name}");
    }
}

// --- Delete protocols ---

#[test]
fn delete_goes_through_the_protocol_methods() {
    let v = analyze_one(
        "class Registry:\n    def __delattr__(self, name):\n        pass\n\n    def __delitem__(self, key):\n        pass\n\ndef clear_entry():\n    registry = Registry()\n    del registry.entry\n\ndef remove_item():\n    registry = Registry()\n    del registry[\"key\"]\n\ndef unbind_local():\n    tmp = 1\n    del tmp\n",
    );
    assert!(v.has_uses_edge("m.clear_entry", "m.Registry.__delattr__"));
    assert!(v.has_uses_edge("m.remove_item", "m.Registry.__delitem__"));
    assert!(v.find_symbol("*.tmp").is_none());
}

// --- Annotations ---

#[test]
fn annotations_are_uses() {
    let v = analyze_one(
        "class MyType:\n    pass\n\nclass ReturnType:\n    pass\n\ndef annotated_func(x: MyType) -> ReturnType:\n    result: MyType = None\n    return result\n\nclass Holder:\n    value: MyType\n",
    );
    assert!(v.has_uses_edge("m.annotated_func", "m.MyType"));
    assert!(v.has_uses_edge("m.annotated_func", "m.ReturnType"));
    assert!(v.has_uses_edge("m.Holder", "m.MyType"));
}

// --- Type aliases ---

#[test]
fn type_alias_defines_a_name_and_uses_its_value() {
    let v = analyze_one("class Target:\n    pass\n\ntype Alias = Target\n");
    assert!(v.has_defines_edge("m", "m.Alias"));
    assert_eq!(kind_of(&v, "m.Alias"), SymbolKind::Name);
    assert!(v.has_uses_edge("m.Alias", "m.Target"));
}

// --- Constructors ---

#[test]
fn calling_a_class_uses_its_init() {
    let v = analyze_one(
        "class Widget:\n    def __init__(self):\n        pass\n\ndef build():\n    return Widget()\n",
    );
    assert!(v.has_uses_edge("m.build", "m.Widget"));
    assert!(v.has_uses_edge("m.build", "m.Widget.__init__"));
}

// --- Builtin result resolution ---

#[test]
fn str_call_resolves_to_dunder_str() {
    let v = analyze_one(
        "class Printable:\n    def __str__(self):\n        return \"\"\n\ndef show():\n    p = Printable()\n    str(p)\n",
    );
    assert!(v.has_uses_edge("m.show", "m.Printable.__str__"));
}

#[test]
fn literal_attributes_land_in_the_builtin_namespace() {
    let v = analyze_one("def j(parts):\n    return \"--\".join(parts)\n");
    assert!(v.has_uses_edge("m.j", "str.join"));
    assert!(v.find_symbol("*.join").is_none());
}

// --- Bindings ---

#[test]
fn starred_unpacking_binds_positionally() {
    let v = analyze_one(
        "class X:\n    pass\n\nclass Y:\n    pass\n\nclass Z:\n    pass\n\nclass W:\n    pass\n\ndef unpack():\n    a, *b, c = X, Y, Z, W\n",
    );
    let scope = v.scope("m.unpack").expect("scope m.unpack");
    let x = v.find_symbol("m.X").unwrap();
    let y = v.find_symbol("m.Y").unwrap();
    let z = v.find_symbol("m.Z").unwrap();
    let w = v.find_symbol("m.W").unwrap();
    assert_eq!(scope.defs.get("a"), Some(&Some(Value::One(x))));
    assert_eq!(scope.defs.get("b"), Some(&Some(Value::Many(vec![y, z]))));
    assert_eq!(scope.defs.get("c"), Some(&Some(Value::One(w))));
}

#[test]
fn set_valued_bindings_emit_edges_to_every_member() {
    let v = analyze_one(
        "class Y:\n    def m(self):\n        pass\n\nclass Z:\n    def m(self):\n        pass\n\ndef unpack():\n    a, *b = Y, Z, Z\n    b.m()\n",
    );
    assert!(v.has_uses_edge("m.unpack", "m.Y.m") || v.has_uses_edge("m.unpack", "m.Z.m"));
    // b holds {Z} after dedup of the remainder (Z, Z)
    assert!(v.has_uses_edge("m.unpack", "m.Z.m"));
}

#[test]
fn chained_assignment_binds_every_target() {
    let v = analyze_one("class C:\n    pass\n\ndef f():\n    a = b = C\n");
    let scope = v.scope("m.f").expect("scope m.f");
    let c = v.find_symbol("m.C").unwrap();
    assert_eq!(scope.defs.get("a"), Some(&Some(Value::One(c))));
    assert_eq!(scope.defs.get("b"), Some(&Some(Value::One(c))));
}

#[test]
fn cartesian_fallback_binds_the_union() {
    // two targets, three values, no star: every target gets the union
    let v = analyze_one(
        "class P:\n    pass\n\nclass Q:\n    pass\n\nclass R:\n    pass\n\ndef f():\n    a, b = P, Q, R\n",
    );
    let scope = v.scope("m.f").expect("scope m.f");
    let p = v.find_symbol("m.P").unwrap();
    let q = v.find_symbol("m.Q").unwrap();
    let r = v.find_symbol("m.R").unwrap();
    let expected = Some(Value::Many(vec![p, q, r]));
    assert_eq!(scope.defs.get("a"), Some(&expected));
    assert_eq!(scope.defs.get("b"), Some(&expected));
}

#[test]
fn global_declaration_rebinds_the_module_name() {
    let v = analyze_one(
        "counter = 0\n\ndef bump():\n    global counter\n    counter = CounterClass()\n\nclass CounterClass:\n    pass\n",
    );
    let module_scope = v.scope("m").expect("module scope");
    let class_sym = v.find_symbol("m.CounterClass").unwrap();
    assert_eq!(
        module_scope.defs.get("counter"),
        Some(&Some(Value::One(class_sym)))
    );
    assert!(v.scope("m.bump").is_some_and(|s| !s.defs.contains_key("counter")));
}

// --- Recursion ---

#[test]
fn mutual_recursion_produces_both_edges() {
    let v = analyze_one("def ping():\n    pong()\n\ndef pong():\n    ping()\n");
    assert!(v.has_uses_edge("m.ping", "m.pong"));
    assert!(v.has_uses_edge("m.pong", "m.ping"));
}

#[test]
fn self_recursion_is_a_single_self_loop() {
    let v = analyze_one("def fact(n):\n    return fact(n - 1)\n");
    assert!(v.has_uses_edge("m.fact", "m.fact"));
}

// --- Forward references ---

#[test]
fn forward_references_resolve_on_the_second_iteration() {
    let v = analyze_one("def g():\n    f()\n\ndef f():\n    pass\n");
    assert!(v.has_uses_edge("m.g", "m.f"));
    // the first-iteration wildcard edge was retired by the resolution
    assert!(!v.has_uses_edge("m.g", "*.f"));
}

#[test]
fn forward_referenced_class_attribute_resolves() {
    let v = analyze_one(
        "def use():\n    helper = Late()\n    helper.run()\n\nclass Late:\n    def run(self):\n        pass\n",
    );
    assert!(v.has_uses_edge("m.use", "m.Late.run"));
}
