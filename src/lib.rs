//! callmap: an offline static call-graph analyzer for Python source trees.
//!
//! The analyzer walks a set of parsed source files and emits a directed
//! graph of *defines* and *uses* relations between modules, classes, and
//! functions; this crate is the front door wiring the analyzer to a CLI and
//! to the Graphviz/JSON writers. Rendering beyond that is delegated to
//! external tools (`dot`, or anything that reads the JSON).

// Shared vocabulary - re-exported from callmap-core
pub use callmap_core::graph;
pub use callmap_core::options;

// The analyzer
pub use callmap_python as python;

// Front door and writers
pub mod cli;
pub mod output;
