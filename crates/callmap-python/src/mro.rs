//! Method resolution order computation using C3 linearization.
//!
//! Inherited-attribute lookup walks each class's MRO: the class itself, then
//! its ancestors in C3 order. The linearization guarantees that children
//! precede their parents and that direct bases keep their declared
//! left-to-right order; an inconsistent hierarchy (or an inheritance cycle)
//! has no valid linearization and yields `None`, which callers degrade to
//! "the class alone".
//!
//! Bases that could not be resolved to analyzed classes are not present in
//! the hierarchy map at all; lookups through them come back unresolved.

use std::collections::{BTreeMap, HashSet};

use crate::registry::SymbolId;

/// Compute the MRO for `class_id` over a `class -> direct bases` map.
///
/// A class absent from the map is treated as having no bases. Returns
/// `None` when the hierarchy admits no consistent linearization.
pub fn linearize(
    class_id: SymbolId,
    hierarchy: &BTreeMap<SymbolId, Vec<SymbolId>>,
) -> Option<Vec<SymbolId>> {
    let mut visiting = HashSet::new();
    linearize_inner(class_id, hierarchy, &mut visiting)
}

fn linearize_inner(
    class_id: SymbolId,
    hierarchy: &BTreeMap<SymbolId, Vec<SymbolId>>,
    visiting: &mut HashSet<SymbolId>,
) -> Option<Vec<SymbolId>> {
    // An inheritance cycle has no linearization.
    if !visiting.insert(class_id) {
        return None;
    }

    let bases = match hierarchy.get(&class_id) {
        Some(bases) if !bases.is_empty() => bases,
        _ => {
            visiting.remove(&class_id);
            return Some(vec![class_id]);
        }
    };

    let mut seqs: Vec<Vec<SymbolId>> = Vec::new();
    for &base in bases {
        if hierarchy.contains_key(&base) {
            let base_mro = linearize_inner(base, hierarchy, visiting)?;
            seqs.push(base_mro);
        }
    }
    seqs.push(bases.clone());

    let mut mro = vec![class_id];
    mro.extend(merge(&mut seqs)?);

    visiting.remove(&class_id);
    Some(mro)
}

/// C3 merge: repeatedly take the first head that appears in no sequence
/// tail, until every sequence is consumed. `None` when no candidate exists.
fn merge(seqs: &mut Vec<Vec<SymbolId>>) -> Option<Vec<SymbolId>> {
    let mut result = Vec::new();

    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            return Some(result);
        }

        let mut candidate = None;
        for seq in seqs.iter() {
            let head = seq[0];
            let in_tail = seqs.iter().any(|s| s.len() > 1 && s[1..].contains(&head));
            if !in_tail {
                candidate = Some(head);
                break;
            }
        }
        let cand = candidate?;

        result.push(cand);
        for seq in seqs.iter_mut() {
            if seq.first() == Some(&cand) {
                seq.remove(0);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
