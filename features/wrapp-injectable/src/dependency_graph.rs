use std::collections::{HashMap, HashSet};

use crate::errors::{Chain, InjectError};

/// Node of the dependency graph
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub(crate) enum Node {
    Container,
    Injectable(u64),
    Token(u64),
}

struct NodeInfo {
    id: String,
    cannot_cause_cycles: bool,
}

/// Graph of everything resolved so far.
///
/// Grows while resolutions happen: when `x` injects `y`, `x` is recorded as dependee of `y`.
/// Used to reject resolutions closing a cycle.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    dependees: HashMap<Node, Vec<Node>>,
    dependencies: HashMap<Node, Vec<Node>>,
    info: HashMap<Node, NodeInfo>,
}

impl DependencyGraph {
    /// Names a node for error messages
    pub fn describe(&mut self, node: Node, id: impl Into<String>, cannot_cause_cycles: bool) {
        self.info.insert(
            node,
            NodeInfo {
                id: id.into(),
                cannot_cause_cycles,
            },
        );
    }

    /// Records that `dependee` injected `dependency`
    pub fn link(&mut self, dependee: Node, dependency: Node) {
        let dependees = self.dependees.entry(dependency).or_default();
        if !dependees.contains(&dependee) {
            dependees.push(dependee);
        }

        let dependencies = self.dependencies.entry(dependee).or_default();
        if !dependencies.contains(&dependency) {
            dependencies.push(dependency);
        }
    }

    /// Forgets the node and every edge touching it
    pub fn remove(&mut self, node: Node) {
        for dependency in self.dependencies.remove(&node).unwrap_or_default() {
            if let Some(dependees) = self.dependees.get_mut(&dependency) {
                dependees.retain(|dependee| *dependee != node);
            }
        }
        for dependee in self.dependees.remove(&node).unwrap_or_default() {
            if let Some(dependencies) = self.dependencies.get_mut(&dependee) {
                dependencies.retain(|dependency| *dependency != node);
            }
        }
        self.info.remove(&node);
    }

    /// Fails if the root can reach itself through its dependees
    pub fn check(&self, root: Node) -> Result<(), InjectError> {
        match self.find_cycle(root) {
            Some(cycle) => Err(InjectError::CycleDetected {
                cycle: Chain(cycle.into_iter().map(|node| self.id_of(node)).collect()),
            }),
            None => Ok(()),
        }
    }

    /// Returns the cycle through `root` in injection order, starting and ending with `root`
    pub fn find_cycle(&self, root: Node) -> Option<Vec<Node>> {
        if self.is_exempt(root) {
            return None;
        }

        let mut visited = HashSet::new();
        let mut path = vec![root];
        return search(self, root, root, &mut path, &mut visited);

        fn search(
            graph: &DependencyGraph,
            root: Node,
            node: Node,
            path: &mut Vec<Node>,
            visited: &mut HashSet<Node>,
        ) -> Option<Vec<Node>> {
            // Skip nodes already explored during this check
            if !visited.insert(node) {
                return None;
            }

            let dependees = graph.dependees.get(&node)?;

            if dependees.contains(&root) {
                let mut cycle = vec![root];
                cycle.extend(path.iter().rev());
                return Some(cycle);
            }

            for dependee in dependees {
                if graph.is_exempt(*dependee) {
                    continue;
                }

                path.push(*dependee);
                if let Some(cycle) = search(graph, root, *dependee, path, visited) {
                    return Some(cycle);
                }
                path.pop();
            }

            None
        }
    }

    fn is_exempt(&self, node: Node) -> bool {
        self.info
            .get(&node)
            .is_some_and(|info| info.cannot_cause_cycles)
    }

    fn id_of(&self, node: Node) -> String {
        match self.info.get(&node) {
            Some(info) => info.id.clone(),
            None => format!("{node:?}"),
        }
    }
}
