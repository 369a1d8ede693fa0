//! Pipeline-level behavior: cross-module imports and re-export chains,
//! relative imports, parse-failure recovery, export filtering and options,
//! and output determinism.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use callmap_core::graph::{CallGraph, SymbolKind};
use callmap_core::options::AnalysisOptions;
use callmap_python::{analyze_paths, analyze_sources, build_graph, AnalyzeError, GraphVisitor, SourceUnit};

fn units(sources: &[(&str, &str)]) -> Vec<SourceUnit> {
    sources
        .iter()
        .map(|(module, source)| SourceUnit {
            module_name: module.to_string(),
            filename: format!("{}.py", module.replace('.', "/")),
            source: source.to_string(),
        })
        .collect()
}

fn analyze(sources: &[(&str, &str)]) -> GraphVisitor {
    build_graph(&units(sources))
}

fn export(sources: &[(&str, &str)], options: &AnalysisOptions) -> CallGraph {
    analyze_sources(&units(sources), options)
}

fn assert_no_unknowns_no_dangling(graph: &CallGraph) {
    let names: HashSet<String> = graph.nodes.iter().map(|n| n.qualified_name()).collect();
    for node in &graph.nodes {
        assert_ne!(node.kind, SymbolKind::Unknown, "unknown in export: {:?}", node);
        assert!(
            !node.qualified_name().starts_with("*."),
            "wildcard in export: {:?}",
            node
        );
    }
    for edge in graph.defines_edges.iter().chain(&graph.uses_edges) {
        assert!(names.contains(&edge.source), "dangling source {}", edge.source);
        assert!(names.contains(&edge.target), "dangling target {}", edge.target);
    }
}

// --- Imports ---

#[test]
fn from_import_resolves_to_the_definition() {
    let v = analyze(&[
        ("m2", "def f():\n    pass\n"),
        ("m3", "from m2 import f\n\ndef caller():\n    f()\n"),
    ]);
    assert!(v.has_uses_edge("m3.caller", "m2.f"));
}

#[test]
fn reexport_chain_lands_on_the_definition() {
    let v = analyze(&[
        ("m1", "def f():\n    pass\n"),
        ("m2", "from m1 import f\n"),
        ("m3", "from m2 import f\n"),
        ("m4", "from m3 import f\n\ndef caller():\n    f()\n"),
    ]);
    assert!(v.has_uses_edge("m4.caller", "m1.f"));
}

#[test]
fn import_alias_resolves() {
    let v = analyze(&[
        ("m2", "def f():\n    pass\n"),
        ("m3", "from m2 import f as g\n\ndef caller():\n    g()\n"),
    ]);
    assert!(v.has_uses_edge("m3.caller", "m2.f"));
}

#[test]
fn imported_submodule_attribute_resolves() {
    let v = analyze(&[
        ("pkg", ""),
        ("pkg.mod", "def helper():\n    pass\n"),
        ("app", "from pkg import mod\n\ndef use():\n    mod.helper()\n"),
    ]);
    assert!(v.has_uses_edge("app.use", "pkg.mod.helper"));
}

#[test]
fn relative_import_resolves_against_the_package() {
    let v = analyze(&[
        ("pkg.a", "def fa():\n    pass\n"),
        ("pkg.b", "from . import a\n\ndef fb():\n    a.fa()\n"),
    ]);
    assert!(v.has_uses_edge("pkg.b.fb", "pkg.a.fa"));
}

#[test]
fn unanalyzed_imports_are_module_level_uses() {
    let v = analyze(&[(
        "meas",
        "import numpy\nfrom pandas.io import parsers\n\ndef compute(data):\n    return numpy.array(data)\n",
    )]);
    assert!(v.has_uses_edge("meas", "numpy"));
    assert!(v.has_uses_edge("meas", "pandas.io.parsers"));
    // the attribute is recorded under the module's namespace
    assert!(v.has_uses_edge("meas.compute", "numpy.array"));
}

#[test]
fn dotted_module_access_is_tracked() {
    let v = analyze(&[("m", "import os\n\ndef joiner():\n    os.path.join(\"a\")\n")]);
    assert!(v.has_uses_edge("m", "os"));
    assert!(v.has_uses_edge("m.joiner", "os.path"));
    assert!(v.find_symbol("*.join").is_none());
}

// --- Parse failures ---

#[test]
fn a_broken_file_is_skipped_and_the_rest_survives() {
    let graph = export(
        &[
            ("bad", "def broken(:\n"),
            ("good", "def ok():\n    pass\n\ndef caller():\n    ok()\n"),
        ],
        &AnalysisOptions::default(),
    );
    assert!(graph.node("bad").is_none());
    assert!(graph.node("good.ok").is_some());
    assert!(graph.has_uses_edge("good.caller", "good.ok"));
}

#[test]
fn references_into_a_broken_file_become_nothing() {
    let graph = export(
        &[
            ("bad", "def broken(:\n"),
            ("good", "from bad import broken\n\ndef caller():\n    broken()\n"),
        ],
        &AnalysisOptions::default(),
    );
    // the unresolvable import must not leave unknowns or dangling edges
    assert_no_unknowns_no_dangling(&graph);
    assert!(!graph.has_uses_edge("good.caller", "bad.broken"));
}

// --- Export invariants ---

#[test]
fn export_has_no_unknowns_and_no_dangling_edges() {
    let graph = export(
        &[(
            "m",
            "import numpy\n\ndef f(data):\n    unknown_call(data)\n    return numpy.array(data)\n",
        )],
        &AnalysisOptions::default(),
    );
    assert_no_unknowns_no_dangling(&graph);
}

#[test]
fn qualified_names_are_unique_in_the_export() {
    let graph = export(
        &[
            ("m1", "class C:\n    def f(self):\n        pass\n"),
            ("m2", "class C:\n    def f(self):\n        pass\n"),
        ],
        &AnalysisOptions::default(),
    );
    let mut seen = HashSet::new();
    for node in &graph.nodes {
        assert!(seen.insert(node.qualified_name()), "duplicate {:?}", node);
    }
    assert!(graph.node("m1.C.f").is_some());
    assert!(graph.node("m2.C.f").is_some());
}

#[test]
fn duplicate_references_produce_one_edge() {
    let graph = export(
        &[("m", "def f():\n    pass\n\ndef g():\n    f()\n    f()\n    f()\n")],
        &AnalysisOptions::default(),
    );
    let count = graph
        .uses_edges
        .iter()
        .filter(|e| e.source == "m.g" && e.target == "m.f")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn edges_are_sorted_by_source_then_target() {
    let graph = export(
        &[(
            "m",
            "def a():\n    c()\n    b()\n\ndef b():\n    c()\n\ndef c():\n    pass\n",
        )],
        &AnalysisOptions::default(),
    );
    let mut sorted = graph.uses_edges.clone();
    sorted.sort();
    assert_eq!(graph.uses_edges, sorted);
    let mut sorted = graph.defines_edges.clone();
    sorted.sort();
    assert_eq!(graph.defines_edges, sorted);
}

#[test]
fn lambdas_and_comprehensions_are_folded_out_of_the_export() {
    let graph = export(
        &[(
            "m",
            "def f(xs):\n    g = lambda x: helper(x)\n    return [helper(x) for x in xs]\n\ndef helper(x):\n    return x\n",
        )],
        &AnalysisOptions::default(),
    );
    assert!(graph.node("m.f.lambda").is_none());
    assert!(graph.node("m.f.listcomp").is_none());
    // their uses were reattached to the enclosing function
    assert!(graph.has_uses_edge("m.f", "m.helper"));
}

#[test]
fn deterministic_output_across_runs() {
    let sources = [
        ("pkg.a", "class A:\n    def m(self):\n        pass\n"),
        (
            "pkg.b",
            "from pkg.a import A\n\nclass B(A):\n    def speak(self):\n        self.m()\n",
        ),
    ];
    let first = serde_json::to_string(&export(&sources, &AnalysisOptions::default())).unwrap();
    let second = serde_json::to_string(&export(&sources, &AnalysisOptions::default())).unwrap();
    assert_eq!(first, second);
}

// --- Options ---

#[test]
fn draw_flags_filter_the_relations() {
    let sources = [("m", "def f():\n    pass\n\ndef g():\n    f()\n")];
    let no_defines = export(
        &sources,
        &AnalysisOptions {
            draw_defines: false,
            ..AnalysisOptions::default()
        },
    );
    assert!(no_defines.defines_edges.is_empty());
    assert!(!no_defines.uses_edges.is_empty());

    let no_uses = export(
        &sources,
        &AnalysisOptions {
            draw_uses: false,
            ..AnalysisOptions::default()
        },
    );
    assert!(no_uses.uses_edges.is_empty());
    assert!(!no_uses.defines_edges.is_empty());
}

#[test]
fn prune_orphans_drops_unconnected_vertices() {
    let graph = export(
        &[("m", "def used():\n    pass\n\ndef caller():\n    used()\n\ndef orphan():\n    pass\n")],
        &AnalysisOptions {
            draw_defines: false,
            prune_orphans: true,
            ..AnalysisOptions::default()
        },
    );
    assert!(graph.node("m.caller").is_some());
    assert!(graph.node("m.used").is_some());
    assert!(graph.node("m.orphan").is_none());
    assert!(graph.node("m").is_none());
}

#[test]
fn color_by_file_assigns_hues_in_file_order() {
    let graph = export(
        &[("m1", "def f():\n    pass\n"), ("m2", "def g():\n    pass\n")],
        &AnalysisOptions {
            color_by_file: true,
            ..AnalysisOptions::default()
        },
    );
    assert_eq!(graph.node("m1").and_then(|n| n.hue), Some(0.0));
    assert_eq!(graph.node("m2").and_then(|n| n.hue), Some(0.5));
    assert_eq!(graph.node("m1.f").and_then(|n| n.hue), Some(0.0));
}

#[test]
fn hues_are_absent_by_default() {
    let graph = export(&[("m", "def f():\n    pass\n")], &AnalysisOptions::default());
    assert!(graph.nodes.iter().all(|n| n.hue.is_none()));
}

// --- Disk entry point ---

#[test]
fn analyze_paths_walks_packages_and_prefixes_namespaces() {
    let dir = tempfile::tempdir().unwrap();
    let pkg = dir.path().join("pkg");
    fs::create_dir_all(&pkg).unwrap();
    fs::write(pkg.join("__init__.py"), "").unwrap();
    fs::write(pkg.join("core.py"), "def f():\n    pass\n\ndef g():\n    f()\n").unwrap();

    let graph = analyze_paths(
        &[dir.path().to_path_buf()],
        &AnalysisOptions::default(),
    )
    .expect("analysis");
    assert!(graph.node("pkg.core.f").is_some());
    assert!(graph.has_uses_edge("pkg.core.g", "pkg.core.f"));
    assert_no_unknowns_no_dangling(&graph);
}

#[test]
fn empty_input_set_is_an_error() {
    let err = analyze_paths(&[], &AnalysisOptions::default());
    assert!(matches!(err, Err(AnalyzeError::NoInput)));
}

#[test]
fn missing_input_is_surfaced_with_the_path() {
    let err = analyze_paths(
        &[PathBuf::from("/definitely/not/here")],
        &AnalysisOptions::default(),
    );
    let message = format!("{}", err.expect_err("should fail"));
    assert!(message.contains("/definitely/not/here"));
}
