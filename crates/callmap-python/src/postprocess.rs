//! Postprocessing and export.
//!
//! Runs once, after both iterations: imported-item vertices are remapped
//! onto the definitions they name, wildcards with exactly one concrete
//! candidate are contracted onto it, inner-scope vertices (lambdas,
//! comprehensions) fold into their parents, and the export filters out
//! everything undefined so the emitted graph has no unknown vertices and no
//! dangling edges.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, trace};

use callmap_core::graph::{CallGraph, Edge, GraphNode, SymbolKind};
use callmap_core::options::AnalysisOptions;

use crate::registry::SymbolId;
use crate::visit::{GraphVisitor, INNER_SCOPE_NAMES};

impl GraphVisitor {
    /// Finalize the analysis. Call after the second iteration.
    pub fn postprocess(&mut self) {
        self.resolve_imports();
        self.contract_wildcards();
        self.collapse_inner_scopes();
    }

    // ------------------------------------------------------------------
    // Import resolution
    // ------------------------------------------------------------------

    /// Remap imported-item vertices onto the definitions they name.
    ///
    /// An import like `from m2 import f` in `m1` leaves a `(m2, f)` vertex;
    /// when `m2` is in the analyzed set, that vertex was upgraded at the
    /// definition site and nothing needs doing. What remains are re-export
    /// chains (`m3` imports from `m1` which imports from `m2`): those are
    /// chased through each module's import edges to a fixed point, and every
    /// edge is rewritten through the resulting mapping. Undefined attribute
    /// vertices living under an imported alias namespace are remapped
    /// through the resolved module's defines edges.
    fn resolve_imports(&mut self) {
        let mut worklist: BTreeSet<SymbolId> = self
            .registry
            .iter()
            .filter(|(_, sym)| sym.kind == SymbolKind::ImportedItem)
            .map(|(id, _)| id)
            .collect();
        let mut mapping: BTreeMap<SymbolId, SymbolId> = BTreeMap::new();

        while let Some(&from) = worklist.iter().next() {
            worklist.remove(&from);
            if mapping.contains_key(&from) {
                continue;
            }
            // An alias vertex with exactly one outgoing edge stands for its
            // target; otherwise it stands for itself.
            let to = match self.uses.get(&from) {
                Some(set) if set.len() == 1 => set.iter().next().copied().unwrap_or(from),
                _ => from,
            };
            let ns = self.registry.get(to).namespace.clone();
            let module_sym = match ns.as_deref() {
                Some("") => to,
                Some(ns) => {
                    let ns = ns.to_string();
                    self.registry
                        .get_or_create(Some(""), &ns, SymbolKind::Unspecified, None)
                }
                None => continue,
            };
            let from_name = self.registry.get(from).name.clone();
            let candidate = self.uses.get(&module_sym).and_then(|set| {
                set.iter()
                    .copied()
                    .find(|&c| self.registry.get(c).name == from_name)
            });
            if let Some(candidate) = candidate {
                if candidate != from {
                    trace!(
                        from = %self.registry.get(from).qualified_name(),
                        to = %self.registry.get(candidate).qualified_name(),
                        "import resolved"
                    );
                    mapping.insert(from, candidate);
                    if self.registry.get(candidate).kind == SymbolKind::ImportedItem {
                        worklist.insert(candidate);
                    }
                }
            }
        }

        // `import m as q; q.f` leaves an undefined attribute vertex under
        // the alias namespace; point it at the resolved module's definition.
        let mapping_snapshot: Vec<(SymbolId, SymbolId)> =
            mapping.iter().map(|(a, b)| (*a, *b)).collect();
        let mut attr_mapping: BTreeMap<SymbolId, SymbolId> = BTreeMap::new();
        for (id, sym) in self.registry.iter() {
            if sym.defined || sym.kind != SymbolKind::Attribute {
                continue;
            }
            let Some(ns) = sym.namespace.as_deref() else {
                continue;
            };
            for &(from, to) in &mapping_snapshot {
                let from_sym = self.registry.get(from);
                if from_sym.kind != SymbolKind::ImportedItem || from_sym.qualified_name() != ns {
                    continue;
                }
                if let Some(defs) = self.defines.get(&to) {
                    if let Some(candidate) = defs
                        .iter()
                        .copied()
                        .find(|&c| self.registry.get(c).name == sym.name)
                    {
                        attr_mapping.insert(id, candidate);
                        break;
                    }
                }
            }
        }
        mapping.extend(attr_mapping);

        if mapping.is_empty() {
            return;
        }
        debug!(remapped = mapping.len(), "resolving imports");

        // Chase chains so re-exports land on the definition, not on the
        // next hop.
        let resolved: BTreeMap<SymbolId, SymbolId> = mapping
            .keys()
            .map(|&start| {
                let mut id = start;
                let mut seen = HashSet::new();
                while let Some(&next) = mapping.get(&id) {
                    if !seen.insert(id) {
                        break;
                    }
                    id = next;
                }
                (start, id)
            })
            .collect();

        self.uses = remap_edges(&self.uses, &resolved);
        self.defines = remap_edges(&self.defines, &resolved);
        for &absorbed in resolved.keys() {
            self.registry.get_mut(absorbed).defined = false;
        }
    }

    // ------------------------------------------------------------------
    // Wildcard contraction
    // ------------------------------------------------------------------

    /// Rewrite edges incident on a wildcard `*.name` onto the concrete
    /// vertex of that terminal name — only when exactly one defined
    /// candidate exists. Anything still wild is undefined and drops out at
    /// export.
    fn contract_wildcards(&mut self) {
        let unknowns: Vec<SymbolId> = self
            .registry
            .iter()
            .filter(|(_, sym)| sym.namespace.is_none())
            .map(|(id, _)| id)
            .collect();
        for unknown in unknowns {
            let name = self.registry.get(unknown).name.clone();
            let candidates: Vec<SymbolId> = self
                .registry
                .iter()
                .filter(|(_, sym)| sym.namespace.is_some() && sym.defined && sym.name == name)
                .map(|(id, _)| id)
                .collect();
            if candidates.len() != 1 {
                trace!(
                    wildcard = %self.registry.get(unknown).qualified_name(),
                    candidates = candidates.len(),
                    "left uncontracted"
                );
                continue;
            }
            debug!(
                wildcard = %self.registry.get(unknown).qualified_name(),
                target = %self.registry.get(candidates[0]).qualified_name(),
                "contracting wildcard"
            );
            let mut mapping = BTreeMap::new();
            mapping.insert(unknown, candidates[0]);
            self.uses = remap_edges(&self.uses, &mapping);
            self.defines = remap_edges(&self.defines, &mapping);
        }
    }

    // ------------------------------------------------------------------
    // Inner-scope collapse
    // ------------------------------------------------------------------

    /// Fold lambda/comprehension vertices into their parents: their
    /// outgoing uses edges reattach to the enclosing definition, and the
    /// inner vertices drop out of the export. Children are processed before
    /// parents so nested inner scopes chain up correctly.
    fn collapse_inner_scopes(&mut self) {
        let inner_ids: Vec<SymbolId> = self
            .registry
            .iter()
            .filter(|(_, sym)| {
                sym.namespace.as_deref().is_some_and(|ns| !ns.is_empty())
                    && INNER_SCOPE_NAMES.contains(&sym.name.as_str())
            })
            .map(|(id, _)| id)
            .collect();
        for id in inner_ids.into_iter().rev() {
            let Some(ns) = self.registry.get(id).namespace.clone() else {
                continue;
            };
            let (parent_ns, parent_name) = match ns.rsplit_once('.') {
                Some((head, tail)) => (head.to_string(), tail.to_string()),
                None => (String::new(), ns),
            };
            let parent = self.registry.get_or_create(
                Some(parent_ns.as_str()),
                &parent_name,
                SymbolKind::Unspecified,
                None,
            );
            if let Some(outgoing) = self.uses.get(&id).cloned() {
                for to in outgoing {
                    self.add_uses_edge(parent, to);
                }
            }
            self.uses.remove(&id);
            self.registry.get_mut(id).defined = false;
        }
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// Build the exported graph: defined concrete vertices in creation
    /// order, retained edges deduplicated and sorted by `(source, target)`.
    /// `file_order` drives hue assignment under `color_by_file`.
    pub fn export(&self, options: &AnalysisOptions, file_order: &[String]) -> CallGraph {
        let hue_for: HashMap<&str, f32> = if options.color_by_file {
            let total = file_order.len().max(1) as f32;
            file_order
                .iter()
                .enumerate()
                .map(|(i, file)| (file.as_str(), i as f32 / total))
                .collect()
        } else {
            HashMap::new()
        };

        let keep = |id: SymbolId| {
            let sym = self.registry.get(id);
            sym.defined && sym.namespace.is_some()
        };

        let mut nodes = Vec::new();
        for (id, sym) in self.registry.iter() {
            if !keep(id) {
                continue;
            }
            let hue = sym
                .location
                .as_ref()
                .and_then(|loc| hue_for.get(loc.file.as_str()).copied());
            nodes.push(GraphNode {
                namespace: sym.namespace.clone().unwrap_or_default(),
                name: sym.name.clone(),
                kind: sym.kind,
                location: sym.location.clone(),
                hue,
            });
        }

        let collect_edges = |edges: &HashMap<SymbolId, BTreeSet<SymbolId>>| {
            let mut out = Vec::new();
            for (&from, targets) in edges {
                if !keep(from) {
                    continue;
                }
                for &to in targets {
                    if !keep(to) {
                        continue;
                    }
                    out.push(Edge::new(
                        self.registry.get(from).qualified_name(),
                        self.registry.get(to).qualified_name(),
                    ));
                }
            }
            out.sort();
            out.dedup();
            out
        };

        let defines_edges = if options.draw_defines {
            collect_edges(&self.defines)
        } else {
            Vec::new()
        };
        let uses_edges = if options.draw_uses {
            collect_edges(&self.uses)
        } else {
            Vec::new()
        };

        if options.prune_orphans {
            let mut connected: HashSet<&str> = HashSet::new();
            for edge in defines_edges.iter().chain(&uses_edges) {
                connected.insert(edge.source.as_str());
                connected.insert(edge.target.as_str());
            }
            let connected: HashSet<String> = connected.into_iter().map(str::to_owned).collect();
            let nodes = nodes
                .into_iter()
                .filter(|n| connected.contains(&n.qualified_name()))
                .collect();
            return CallGraph {
                nodes,
                defines_edges,
                uses_edges,
            };
        }

        CallGraph {
            nodes,
            defines_edges,
            uses_edges,
        }
    }
}

/// Rewrite both endpoints of every edge through `mapping`.
fn remap_edges(
    edges: &HashMap<SymbolId, BTreeSet<SymbolId>>,
    mapping: &BTreeMap<SymbolId, SymbolId>,
) -> HashMap<SymbolId, BTreeSet<SymbolId>> {
    let mut out: HashMap<SymbolId, BTreeSet<SymbolId>> = HashMap::new();
    for (&from, targets) in edges {
        let from = mapping.get(&from).copied().unwrap_or(from);
        let entry = out.entry(from).or_default();
        for &to in targets {
            entry.insert(mapping.get(&to).copied().unwrap_or(to));
        }
    }
    out
}
