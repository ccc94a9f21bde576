//! Parent-before-child ordering.
//!
//! Source systems list documents in arbitrary order, while a target needs a
//! parent's remote id before it can create a child. Units form a forest of
//! parent links; [`DependencyGraph`] plans publication as waves: wave 0 holds
//! every unit whose parent is already known, and each following wave holds
//! the units whose parent was placed in an earlier wave. Planning stops at
//! the first wave that places nothing; whatever is left is [`Unplaced`].

use std::collections::{HashMap, HashSet};

use crate::error::PublishError;
use crate::unit::PublishUnit;

/// Anything with a key and an optional parent key.
pub trait GraphNode {
    fn key(&self) -> &str;
    fn parent(&self) -> Option<&str>;
}

impl<B> GraphNode for PublishUnit<B> {
    fn key(&self) -> &str {
        &self.key
    }

    fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }
}

/// Why a unit was never published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnplacedReason {
    /// Its parent chain ends at a key that is neither a unit nor known remotely.
    MissingParent,
    /// Its parent chain loops.
    Cycle,
    /// An ancestor was attempted and failed.
    ParentFailed,
}

/// Unit that could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unplaced {
    pub key: String,
    pub parent: Option<String>,
    pub reason: UnplacedReason,
}

/// Static publication plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WavePlan {
    /// Unit indices per wave.
    pub waves: Vec<Vec<usize>>,
    pub unplaced: Vec<Unplaced>,
}

/// Parent links between units, by index.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    keys: Vec<String>,
    parents: Vec<Option<String>>,
    index: HashMap<String, usize>,
}

impl DependencyGraph {
    /// Build the graph.
    ///
    /// A unit without a parent hangs under `root_key`, except the root unit
    /// itself. Keys must be unique: a repeated key would publish one source
    /// document twice.
    pub fn build<N: GraphNode>(nodes: &[N], root_key: Option<&str>) -> Result<Self, PublishError> {
        let mut keys = Vec::with_capacity(nodes.len());
        let mut parents = Vec::with_capacity(nodes.len());
        let mut index = HashMap::with_capacity(nodes.len());

        for (i, node) in nodes.iter().enumerate() {
            let key = node.key();
            if index.insert(key.to_owned(), i).is_some() {
                return Err(PublishError::fatal(format!("duplicate unit key '{key}'")));
            }
            let parent = match (node.parent(), root_key) {
                (Some(parent), _) => Some(parent.to_owned()),
                (None, Some(root)) if root != key => Some(root.to_owned()),
                (None, _) => None,
            };
            keys.push(key.to_owned());
            parents.push(parent);
        }

        Ok(Self {
            keys,
            parents,
            index,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn key(&self, idx: usize) -> &str {
        &self.keys[idx]
    }

    /// Effective parent key of a unit, root default applied.
    #[must_use]
    pub fn parent(&self, idx: usize) -> Option<&str> {
        self.parents[idx].as_deref()
    }

    /// Parent keys that are not units of this graph, sorted.
    #[must_use]
    pub fn external_parents(&self) -> Vec<&str> {
        let mut external: Vec<&str> = self
            .parents
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|parent| !self.index.contains_key(*parent))
            .collect();
        external.sort_unstable();
        external.dedup();
        external
    }

    /// Whether a unit can be published given the keys placed so far.
    pub fn is_ready<V>(&self, idx: usize, placed: &HashMap<String, V>) -> bool {
        self.parent(idx).is_none_or(|parent| placed.contains_key(parent))
    }

    /// Plan waves assuming every unit succeeds.
    ///
    /// `known` holds external parent keys that already exist remotely.
    #[must_use]
    pub fn waves(&self, known: &HashSet<String>) -> WavePlan {
        let mut placed: HashMap<String, ()> = known.iter().map(|k| (k.clone(), ())).collect();
        let mut pending: Vec<usize> = (0..self.len()).collect();
        let mut plan = WavePlan::default();

        loop {
            let (ready, rest): (Vec<usize>, Vec<usize>) =
                pending.iter().partition(|&&idx| self.is_ready(idx, &placed));
            if ready.is_empty() {
                break;
            }
            for &idx in &ready {
                placed.insert(self.keys[idx].clone(), ());
            }
            plan.waves.push(ready);
            pending = rest;
        }

        plan.unplaced = pending
            .into_iter()
            .map(|idx| self.unplaced(idx, &HashSet::new()))
            .collect();
        plan
    }

    /// Explain why a unit was not placed.
    ///
    /// Walks up the parent chain: a failed ancestor wins, then a chain that
    /// leaves the graph, then a loop.
    #[must_use]
    pub fn unplaced(&self, idx: usize, failed: &HashSet<String>) -> Unplaced {
        let mut visited = HashSet::from([idx]);
        let mut current = idx;
        let reason = loop {
            let Some(parent) = self.parent(current) else {
                break UnplacedReason::MissingParent;
            };
            if failed.contains(parent) {
                break UnplacedReason::ParentFailed;
            }
            let Some(&parent_idx) = self.index.get(parent) else {
                break UnplacedReason::MissingParent;
            };
            if !visited.insert(parent_idx) {
                break UnplacedReason::Cycle;
            }
            current = parent_idx;
        };

        Unplaced {
            key: self.keys[idx].clone(),
            parent: self.parents[idx].clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Node {
        key: String,
        parent: Option<String>,
    }

    impl GraphNode for Node {
        fn key(&self) -> &str {
            &self.key
        }

        fn parent(&self) -> Option<&str> {
            self.parent.as_deref()
        }
    }

    fn node(key: &str, parent: Option<&str>) -> Node {
        Node {
            key: key.to_owned(),
            parent: parent.map(str::to_owned),
        }
    }

    fn keys(graph: &DependencyGraph, wave: &[usize]) -> Vec<String> {
        wave.iter().map(|&i| graph.key(i).to_owned()).collect()
    }

    #[test]
    fn test_children_listed_before_parents() {
        let nodes = vec![
            node("Grandchild", Some("Child")),
            node("Child", Some("Wiki")),
            node("Wiki", None),
        ];
        let graph = DependencyGraph::build(&nodes, None).unwrap();
        let plan = graph.waves(&HashSet::new());

        assert_eq!(plan.waves.len(), 3);
        assert_eq!(keys(&graph, &plan.waves[0]), vec!["Wiki"]);
        assert_eq!(keys(&graph, &plan.waves[1]), vec!["Child"]);
        assert_eq!(keys(&graph, &plan.waves[2]), vec!["Grandchild"]);
        assert!(plan.unplaced.is_empty());
    }

    #[test]
    fn test_orphans_hang_under_root() {
        let nodes = vec![node("Orphan", None), node("Wiki", None)];
        let graph = DependencyGraph::build(&nodes, Some("Wiki")).unwrap();

        assert_eq!(graph.parent(0), Some("Wiki"));
        assert_eq!(graph.parent(1), None);
        let plan = graph.waves(&HashSet::new());
        assert_eq!(keys(&graph, &plan.waves[0]), vec!["Wiki"]);
        assert_eq!(keys(&graph, &plan.waves[1]), vec!["Orphan"]);
    }

    #[test]
    fn test_missing_parent_reported() {
        let nodes = vec![
            node("A", None),
            node("B", Some("A")),
            node("C", Some("Ghost")),
            node("D", Some("C")),
        ];
        let graph = DependencyGraph::build(&nodes, None).unwrap();
        let plan = graph.waves(&HashSet::new());

        assert_eq!(
            plan.unplaced,
            vec![
                Unplaced {
                    key: "C".to_owned(),
                    parent: Some("Ghost".to_owned()),
                    reason: UnplacedReason::MissingParent,
                },
                Unplaced {
                    key: "D".to_owned(),
                    parent: Some("C".to_owned()),
                    reason: UnplacedReason::MissingParent,
                },
            ]
        );
        assert_eq!(graph.external_parents(), vec!["Ghost"]);
    }

    #[test]
    fn test_known_external_parent_places_child() {
        let nodes = vec![node("C", Some("Published Earlier"))];
        let graph = DependencyGraph::build(&nodes, None).unwrap();
        let known = HashSet::from(["Published Earlier".to_owned()]);
        let plan = graph.waves(&known);
        assert_eq!(plan.waves, vec![vec![0]]);
    }

    #[test]
    fn test_cycle_reported() {
        let nodes = vec![node("X", Some("Y")), node("Y", Some("X")), node("Z", Some("Z"))];
        let graph = DependencyGraph::build(&nodes, None).unwrap();
        let plan = graph.waves(&HashSet::new());

        assert!(plan.waves.is_empty());
        assert!(
            plan.unplaced
                .iter()
                .all(|u| u.reason == UnplacedReason::Cycle)
        );
        assert_eq!(plan.unplaced.len(), 3);
    }

    #[test]
    fn test_failed_ancestor() {
        let nodes = vec![node("A", None), node("B", Some("A")), node("C", Some("B"))];
        let graph = DependencyGraph::build(&nodes, None).unwrap();
        let failed = HashSet::from(["A".to_owned()]);

        assert_eq!(graph.unplaced(2, &failed).reason, UnplacedReason::ParentFailed);
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let nodes = vec![node("A", None), node("A", None)];
        let err = DependencyGraph::build(&nodes, None).unwrap_err();
        assert!(err.is_fatal());
    }
}
