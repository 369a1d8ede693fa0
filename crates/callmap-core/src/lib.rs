//! Shared vocabulary for the callmap workspace.
//!
//! This crate holds the types that cross the analyzer boundary: the kinds of
//! graph vertices, source locations, the exported [`graph::CallGraph`] model
//! consumed by writers, and the [`options::AnalysisOptions`] the caller uses
//! to steer an analysis run.

pub mod graph;
pub mod options;

pub use graph::{CallGraph, Edge, GraphNode, Location, SymbolKind};
pub use options::AnalysisOptions;
