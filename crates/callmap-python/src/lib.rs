//! Static call-graph analysis for Python source trees.
//!
//! Given a set of `.py` files, produces a directed graph whose vertices are
//! the modules, classes, and functions defined in them, and whose edges
//! record *defines* (syntactic containment) and *uses* (a body referencing a
//! callable or class). The analysis is deliberately approximate: names
//! resolve under lexical scoping, attribute bindings are tracked across
//! statements, inherited lookups go through a statically computed method
//! resolution order, and everything object-shaped is tracked as its class.
//! No control flow is interpreted.
//!
//! The pipeline: parse each file once, build scope tables, then drive one
//! [`visit::GraphVisitor`] over every tree twice — the second iteration
//! resolves forward references against the fully populated namespace — with
//! base classes linearized in between, and postprocess. [`analyze_paths`] is
//! the high-level entry point; [`analyze_sources`] and [`build_graph`] take
//! in-memory sources (the latter returns the visitor itself, with registry
//! and edge state observable).
//!
//! ```no_run
//! use callmap_core::options::AnalysisOptions;
//! use std::path::PathBuf;
//!
//! let options = AnalysisOptions::default();
//! let graph = callmap_python::analyze_paths(&[PathBuf::from("src/")], &options)?;
//! for edge in &graph.uses_edges {
//!     println!("{} -> {}", edge.source, edge.target);
//! }
//! # Ok::<(), callmap_python::AnalyzeError>(())
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use rustpython_ast as ast;
use rustpython_parser::Mode;
use thiserror::Error;
use tracing::{debug, warn};

use callmap_core::graph::CallGraph;
use callmap_core::options::AnalysisOptions;

mod attr;
mod binding;
pub mod files;
pub mod mro;
mod postprocess;
pub mod registry;
pub mod scope;
pub mod symtable;
pub mod text;
pub mod visit;

pub use visit::GraphVisitor;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that abort an analysis run.
///
/// Syntax errors in individual files do *not* abort: the file is skipped
/// with a warning and contributes nothing to the graph.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// An input file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Input collection failed.
    #[error(transparent)]
    File(#[from] files::FileError),

    /// Nothing to analyze.
    #[error("no Python sources found in the given inputs")]
    NoInput,
}

// ============================================================================
// Entry Points
// ============================================================================

/// One source file handed to the analyzer.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Dotted module name (decides the namespace prefix).
    pub module_name: String,
    /// Display path for locations and logs.
    pub filename: String,
    pub source: String,
}

/// Analyze files and directories from disk.
///
/// Directories are walked for `.py` files; the project root comes from
/// `options.root` or is inferred from the package structure. Unreadable
/// inputs abort; files that fail to parse are skipped.
pub fn analyze_paths(
    inputs: &[PathBuf],
    options: &AnalysisOptions,
) -> Result<CallGraph, AnalyzeError> {
    let collected = files::collect_python_files(inputs)?;
    if collected.is_empty() {
        return Err(AnalyzeError::NoInput);
    }
    let root = match &options.root {
        Some(root) => root.clone(),
        None => files::infer_root(&collected),
    };
    debug!(root = %root.display(), files = collected.len(), "starting analysis");

    let mut sources = Vec::with_capacity(collected.len());
    for file in &collected {
        let source = std::fs::read_to_string(file).map_err(|e| AnalyzeError::Read {
            path: file.display().to_string(),
            source: e,
        })?;
        let filename = file
            .strip_prefix(&root)
            .unwrap_or(file)
            .display()
            .to_string();
        sources.push(SourceUnit {
            module_name: files::module_name(file, &root),
            filename,
            source,
        });
    }
    Ok(analyze_sources(&sources, options))
}

/// Analyze in-memory sources and export the graph.
pub fn analyze_sources(sources: &[SourceUnit], options: &AnalysisOptions) -> CallGraph {
    let visitor = build_graph(sources);
    let file_order: Vec<String> = sources.iter().map(|s| s.filename.clone()).collect();
    visitor.export(options, &file_order)
}

/// Run the full pipeline and hand back the visitor itself, postprocessed
/// but not yet exported.
pub fn build_graph(sources: &[SourceUnit]) -> GraphVisitor {
    let mut parsed: Vec<(usize, ast::ModModule)> = Vec::new();
    for (i, unit) in sources.iter().enumerate() {
        match rustpython_parser::parse(&unit.source, Mode::Module, &unit.filename) {
            Ok(ast::Mod::Module(module)) => parsed.push((i, module)),
            Ok(_) => {}
            Err(err) => {
                let index = text::LineIndex::new(&unit.source);
                let (line, col) = index.line_col(err.offset.to_usize());
                warn!(
                    file = %unit.filename,
                    line,
                    col,
                    error = %err,
                    "parse failure; skipping file"
                );
            }
        }
    }

    let mut scopes = HashMap::new();
    for (i, module) in &parsed {
        symtable::build_scopes(&sources[*i].module_name, module, &mut scopes);
    }
    let module_to_file: HashMap<String, String> = sources
        .iter()
        .map(|s| (s.module_name.clone(), s.filename.clone()))
        .collect();

    let mut visitor = GraphVisitor::new(scopes, module_to_file);
    // Two iterations over the whole set: the second one re-resolves every
    // reference against everything the first one defined.
    for iteration in 0..2 {
        for (i, module) in &parsed {
            debug!(
                iteration = iteration + 1,
                file = %sources[*i].filename,
                "walking"
            );
            visitor.visit_module_file(
                module,
                &sources[*i].module_name,
                &sources[*i].filename,
                &sources[*i].source,
            );
        }
        if iteration == 0 {
            visitor.resolve_base_classes();
        }
    }
    visitor.postprocess();
    visitor
}
