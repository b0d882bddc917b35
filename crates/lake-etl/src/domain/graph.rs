//! Dependency ordering of target tables.

use std::collections::{BTreeMap, BTreeSet};

use super::schema::TableDef;
use crate::error::{EtlError, Result};

/// Order tables so every table comes after the tables it depends on.
///
/// Kahn's algorithm over a sorted ready set, so the result is deterministic.
/// Self-references are ignored and edges to tables outside the input are
/// dropped. A cycle is an error naming the tables involved.
pub fn load_order<'a>(tables: &[&'a TableDef]) -> Result<Vec<&'a str>> {
    let names: BTreeSet<&str> = tables.iter().map(|t| t.name).collect();

    // table -> number of unresolved dependencies
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    // dependency -> tables waiting on it
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for table in tables {
        let deps: BTreeSet<&str> = table
            .depends_on
            .iter()
            .copied()
            .filter(|d| *d != table.name && names.contains(d))
            .collect();
        pending.insert(table.name, deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(table.name);
        }
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(tables.len());

    while let Some(name) = ready.pop_first() {
        order.push(name);
        if let Some(waiting) = dependents.get(name) {
            for dependent in waiting {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if order.len() != pending.len() {
        let stuck: Vec<&str> = pending
            .iter()
            .filter(|(name, _)| !order.contains(*name))
            .map(|(name, _)| *name)
            .collect();
        return Err(EtlError::Schema(format!(
            "dependency cycle among tables: {}",
            stuck.join(", ")
        )));
    }

    Ok(order)
}

/// Order for emptying tables: dependents before the tables they reference.
pub fn clearing_order<'a>(tables: &[&'a TableDef]) -> Result<Vec<&'a str>> {
    let mut order = load_order(tables)?;
    order.reverse();
    Ok(order)
}
