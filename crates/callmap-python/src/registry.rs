//! Interned graph vertices.
//!
//! Every vertex is identified by `(namespace, name)`; a `namespace` of `None`
//! marks a wildcard (a reference whose target scope is unknown). The registry
//! is an arena: vertices are referred to by [`SymbolId`] everywhere else, so
//! the arbitrary reference cycles of the graph never turn into ownership
//! cycles.

use std::collections::HashMap;

use callmap_core::graph::{Location, SymbolKind};

/// Index of a symbol in the registry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym_{}", self.0)
    }
}

/// A graph vertex.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// Dotted path of the enclosing scope. `Some("")` is the top level;
    /// `None` marks a wildcard.
    pub namespace: Option<String>,
    /// Terminal identifier.
    pub name: String,
    /// Most specific kind learned so far.
    pub kind: SymbolKind,
    /// Whether a definition site (or synthetic defining parent) was seen.
    /// Undefined vertices are dropped from the export.
    pub defined: bool,
    /// Location of the first sighting; re-pointed to the definition site
    /// when one is found.
    pub location: Option<Location>,
}

impl Symbol {
    /// `namespace.name`, `name` at top level, `*.name` for wildcards.
    pub fn qualified_name(&self) -> String {
        match self.namespace.as_deref() {
            None => format!("*.{}", self.name),
            Some("") => self.name.clone(),
            Some(ns) => format!("{}.{}", ns, self.name),
        }
    }

    /// Whether this vertex is a wildcard.
    pub fn is_unknown(&self) -> bool {
        self.namespace.is_none()
    }
}

/// The `(namespace, name) -> Symbol` interning map.
///
/// One registry lives for the duration of one analysis run and is discarded
/// with it; it is never shared between runs.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    symbols: Vec<Symbol>,
    index: HashMap<(Option<String>, String), SymbolId>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        SymbolRegistry::default()
    }

    /// Return the canonical vertex for `(namespace, name)`, creating it on
    /// first sight.
    ///
    /// For an existing vertex the kind is upgraded in place when `kind` is
    /// strictly more specific (an `Unknown` later seen at a definition site
    /// becomes that definition; edges already incident on it stay valid).
    /// `location` only takes effect on creation; definition sites re-point
    /// it via [`SymbolRegistry::set_location`].
    pub fn get_or_create(
        &mut self,
        namespace: Option<&str>,
        name: &str,
        kind: SymbolKind,
        location: Option<Location>,
    ) -> SymbolId {
        let key = (namespace.map(str::to_owned), name.to_owned());
        if let Some(&id) = self.index.get(&key) {
            let sym = &mut self.symbols[id.0 as usize];
            if kind.specificity() > sym.kind.specificity() {
                sym.kind = kind;
            }
            return id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            namespace: key.0.clone(),
            name: key.1.clone(),
            kind,
            defined: false,
            location,
        });
        self.index.insert(key, id);
        id
    }

    /// Look up a vertex without creating it.
    pub fn lookup(&self, namespace: Option<&str>, name: &str) -> Option<SymbolId> {
        self.index
            .get(&(namespace.map(str::to_owned), name.to_owned()))
            .copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Re-point a vertex at its definition site.
    pub fn set_location(&mut self, id: SymbolId, location: Location) {
        self.symbols[id.0 as usize].location = Some(location);
    }

    pub fn mark_defined(&mut self, id: SymbolId) {
        self.symbols[id.0 as usize].defined = true;
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All vertices in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }
}

// ============================================================================
// Tests
// ============================================================================
