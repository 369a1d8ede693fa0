//! Graph vocabulary: vertex kinds, source locations, and the exported graph.
//!
//! The analyzer works on an interned symbol arena internally; what crosses
//! the boundary to writers is the [`CallGraph`] defined here. Vertices are
//! identified by their qualified name (`namespace.name`), edges are pairs of
//! qualified names, and iteration order is stable: insertion order for
//! vertices, `(source, target)` order for edges.

use serde::{Deserialize, Serialize};

// ============================================================================
// Symbol Kinds
// ============================================================================

/// The kind of object a graph vertex stands for.
///
/// Kinds form a specificity lattice: a vertex created speculatively (e.g. as
/// `Unknown` for an unresolved reference, or `Attribute` for a dotted lookup)
/// is upgraded in place when a more specific kind is learned at a definition
/// site. Upgrades never go backwards; see [`SymbolKind::specificity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    /// Kind not yet determined.
    Unspecified,
    /// Placeholder for an unresolved reference (wildcard vertex).
    Unknown,
    /// A lexical namespace that is not itself a definition (lambda,
    /// comprehension, synthetic scope vertex).
    Namespace,
    /// An attribute observed on some object, not (yet) tied to a definition.
    Attribute,
    /// A name brought in by a `from`-import, pointing into another module.
    ImportedItem,
    /// A plain bound name (e.g. a type alias).
    Name,
    /// A module in the analyzed set.
    Module,
    /// A class definition.
    Class,
    /// A free function definition.
    Function,
    /// An instance method.
    Method,
    /// A method decorated as a static method.
    #[serde(rename = "staticmethod")]
    StaticMethod,
    /// A method decorated as a class method.
    #[serde(rename = "classmethod")]
    ClassMethod,
}

impl SymbolKind {
    /// How authoritative this kind is when two occurrences of the same
    /// qualified name disagree. Definition-site kinds win over reference-site
    /// kinds, which win over placeholders.
    pub fn specificity(self) -> u8 {
        match self {
            SymbolKind::Unspecified | SymbolKind::Unknown => 0,
            SymbolKind::Namespace | SymbolKind::Attribute => 1,
            SymbolKind::ImportedItem | SymbolKind::Name => 2,
            SymbolKind::Module
            | SymbolKind::Class
            | SymbolKind::Function
            | SymbolKind::Method
            | SymbolKind::StaticMethod
            | SymbolKind::ClassMethod => 3,
        }
    }

    /// Stable string form, used by writers and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolKind::Unspecified => "unspecified",
            SymbolKind::Unknown => "unknown",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Attribute => "attribute",
            SymbolKind::ImportedItem => "imported_item",
            SymbolKind::Name => "name",
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::StaticMethod => "staticmethod",
            SymbolKind::ClassMethod => "classmethod",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Location
// ============================================================================

/// Location of a definition in a source file.
///
/// Lines and columns are 1-indexed, matching editor conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Source file path as supplied by the caller.
    pub file: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub col: u32,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Location {
            file: file.into(),
            line,
            col,
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

// ============================================================================
// Exported Graph
// ============================================================================

/// A vertex of the exported graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Dotted path of the enclosing scope; empty for top-level modules.
    pub namespace: String,
    /// Terminal identifier.
    pub name: String,
    /// What kind of object this vertex stands for.
    pub kind: SymbolKind,
    /// Definition location, when one was seen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    /// Normalized per-file hue in `[0, 1)`, present when the analysis was
    /// run with `color_by_file`. Display-only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<f32>,
}

impl GraphNode {
    /// The vertex's unique key: `namespace.name`, or just `name` at top level.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }
}

/// A directed edge between two vertices, by qualified name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// The analyzer's output: vertices plus the defines and uses relations.
///
/// `nodes` preserves creation order; both edge lists are deduplicated and
/// sorted by `(source, target)`, so two runs over the same inputs produce
/// byte-identical output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraph {
    pub nodes: Vec<GraphNode>,
    pub defines_edges: Vec<Edge>,
    pub uses_edges: Vec<Edge>,
}

impl CallGraph {
    /// Find a vertex by qualified name.
    pub fn node(&self, qualified: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.qualified_name() == qualified)
    }

    /// Whether a defines edge `source -> target` is present.
    pub fn has_defines_edge(&self, source: &str, target: &str) -> bool {
        self.defines_edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    /// Whether a uses edge `source -> target` is present.
    pub fn has_uses_edge(&self, source: &str, target: &str) -> bool {
        self.uses_edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }
}

// ============================================================================
// Tests
// ============================================================================
