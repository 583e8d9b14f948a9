//! Dependency graph algorithms
//!
//! Pure functions over a snapshot of `name → references`. An edge
//! `a → b` means `a` references `b`: `b` must exist before `a` is applied
//! and must outlive it. References to names outside the graph are kept but
//! ignored by the orderings.
//!
//! Whenever several nodes are equally eligible, the lexicographically
//! smallest name goes first, so every ordering is deterministic.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing its references if already present
    pub fn insert(&mut self, name: impl Into<String>, references: Vec<String>) {
        self.edges.insert(name.into(), references);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    pub fn references(&self, name: &str) -> &[String] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Check whether giving `name` the references `proposed` would close a cycle.
    ///
    /// Returns the first proposed reference that is `name` itself or from
    /// which `name` is reachable over the current edges. The current edges of
    /// `name` are never walked, since `proposed` replaces them.
    pub fn find_cycle<'a>(&self, name: &str, proposed: &'a [String]) -> Option<&'a str> {
        let mut visited = BTreeSet::new();
        for reference in proposed {
            if self.reaches(reference.as_str(), name, &mut visited) {
                return Some(reference.as_str());
            }
        }
        None
    }

    fn reaches<'a>(&'a self, from: &'a str, target: &str, visited: &mut BTreeSet<&'a str>) -> bool {
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.references(current).iter().map(String::as_str));
        }
        false
    }

    /// Nodes that reference `name` directly, sorted
    pub fn direct_dependents(&self, name: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|(other, refs)| *other != name && refs.iter().any(|r| r == name))
            .map(|(other, _)| other.clone())
            .collect()
    }

    /// Every node from which `name` is reachable, excluding `name` itself
    pub fn dependents(&self, name: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![name.to_string()];
        while let Some(current) = stack.pop() {
            for dependent in self.direct_dependents(&current) {
                if dependent != name && found.insert(dependent.clone()) {
                    stack.push(dependent);
                }
            }
        }
        found
    }

    /// Order `subset` so every node comes before the nodes it references.
    ///
    /// Kahn's algorithm restricted to `subset`: nodes nothing in the subset
    /// depends on go first. Nodes left over because of a cycle are appended
    /// so the result always covers the whole subset. Names in `subset` that
    /// are not in the graph are treated as having no references.
    pub fn destroy_order(&self, subset: &BTreeSet<String>) -> Vec<String> {
        let mut depends_on: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> =
            subset.iter().map(|name| (name.as_str(), 0)).collect();
        for name in subset {
            let refs: BTreeSet<&str> = self
                .references(name)
                .iter()
                .map(String::as_str)
                .filter(|r| *r != name.as_str() && subset.contains(*r))
                .collect();
            for r in &refs {
                if let Some(degree) = in_degree.get_mut(r) {
                    *degree += 1;
                }
            }
            depends_on.insert(name.as_str(), refs);
        }
        kahn(in_degree, |name| {
            depends_on
                .get(&name)
                .map(|refs| refs.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Order every node after the nodes it references, cycles appended.
    pub fn apply_order(&self) -> Vec<String> {
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        for (name, refs) in &self.edges {
            let refs: BTreeSet<&str> = refs
                .iter()
                .map(String::as_str)
                .filter(|r| *r != name.as_str() && self.contains(r))
                .collect();
            pending.insert(name.as_str(), refs.len());
            for r in refs {
                dependents.entry(r).or_default().push(name.as_str());
            }
        }
        kahn(pending, |name| dependents.get(&name).cloned().unwrap_or_default())
    }
}

/// Kahn's algorithm over `degree`, releasing `next(name)` after each pop.
fn kahn<'a>(
    mut degree: BTreeMap<&'a str, usize>,
    next: impl Fn(&'a str) -> Vec<&'a str>,
) -> Vec<String> {
    let mut ready: BTreeSet<&str> = degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(degree.len());
    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for released in next(name) {
            if let Some(d) = degree.get_mut(&released) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    ready.insert(released);
                }
            }
        }
    }
    // residual cycle members, still in name order
    order.extend(
        degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(name, _)| name.to_string()),
    );
    order
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for DependencyGraph {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Self {
            edges: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
