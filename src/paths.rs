//! Path enumeration and topological listing.
//!
//! A diagram denotes the set of its paths from the root to `one`. These
//! iterators walk them explicitly. The number of paths can be exponential in
//! the size of the diagram, so use with caution on large diagrams.
//!
//! # Example
//!
//! ```
//! use ddd_rs::manager::Manager;
//! use ddd_rs::reference::Ddd;
//!
//! let mgr = Manager::new();
//! let a = mgr.ddd_path(&[(0, 1), (1, 2)]);
//! let b = mgr.ddd_path(&[(0, 3), (1, 4)]);
//! let f = mgr.ddd_union(a, b);
//!
//! let paths: Vec<_> = mgr.ddd_paths(f).collect();
//! assert_eq!(paths, vec![vec![(0, 1), (1, 2)], vec![(0, 3), (1, 4)]]);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use crate::diagram::Diagram;
use crate::label::Label;
use crate::manager::Manager;
use crate::reference::{Ddd, Sdd};
use crate::types::{Val, Var};

impl Manager {
    /// Iterate over all paths of a flat diagram, in arc order.
    pub fn ddd_paths(&self, d: Ddd) -> Paths<'_, Ddd> {
        Paths::new(self, d)
    }

    /// Iterate over all paths of a hierarchical diagram. Each step carries the
    /// arc label, itself a set.
    pub fn sdd_paths(&self, s: Sdd) -> Paths<'_, Sdd> {
        Paths::new(self, s)
    }

    /// Non-terminal nodes reachable from `roots`, each listed once, successors
    /// before predecessors.
    ///
    /// Diagrams nested in hierarchical labels are not followed.
    pub fn topological<N: Diagram>(&self, roots: impl IntoIterator<Item = N>) -> Vec<N> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        // (node, successors pushed)
        let mut stack: Vec<(N, bool)> = roots.into_iter().map(|r| (r, false)).collect();
        stack.reverse();

        while let Some((node, expanded)) = stack.pop() {
            if node.is_terminal() {
                continue;
            }
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            for (_, succ) in N::arcs(self, node).iter().rev() {
                if !visited.contains(succ) {
                    stack.push((*succ, false));
                }
            }
        }
        order
    }
}

/// Frame on the exploration stack.
struct Frame<N: Diagram> {
    var: Var,
    arcs: Arc<[(N::Value, N)]>,
    /// Next arc to explore.
    next: usize,
}

/// Depth-first iterator over the paths of a diagram.
///
/// Created by [`Manager::ddd_paths`] and [`Manager::sdd_paths`]. The current
/// path is kept in a single vector that grows and shrinks with the stack.
/// Paths through `top` are not reported.
pub struct Paths<'m, N: Diagram> {
    mgr: &'m Manager,
    stack: Vec<Frame<N>>,
    current: Vec<(Var, N::Value)>,
    /// Pending root when it is a terminal.
    root: Option<N>,
}

impl<'m, N: Diagram> Paths<'m, N> {
    fn new(mgr: &'m Manager, root: N) -> Self {
        let mut paths = Paths {
            mgr,
            stack: Vec::new(),
            current: Vec::new(),
            root: None,
        };
        if root.is_terminal() {
            paths.root = Some(root);
        } else {
            paths.push(root);
        }
        paths
    }

    fn push(&mut self, node: N) {
        self.stack.push(Frame {
            var: N::variable(self.mgr, node),
            arcs: N::arcs(self.mgr, node),
            next: 0,
        });
    }
}

impl<N: Diagram> Iterator for Paths<'_, N> {
    type Item = Vec<(Var, N::Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            return (root == N::ONE).then(Vec::new);
        }
        loop {
            let frame = self.stack.last_mut()?;
            if frame.next == frame.arcs.len() {
                // All arcs explored: backtrack.
                self.stack.pop();
                self.current.pop();
                continue;
            }
            let (value, succ) = frame.arcs[frame.next].clone();
            let var = frame.var;
            frame.next += 1;

            if succ == N::ONE {
                let mut path = self.current.clone();
                path.push((var, value));
                return Some(path);
            }
            if succ.is_terminal() {
                continue;
            }
            self.current.push((var, value));
            self.push(succ);
        }
    }
}

/// A path of a flat diagram.
pub type DddPath = Vec<(Var, Val)>;
/// A path of a hierarchical diagram.
pub type SddPath = Vec<(Var, Label)>;

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_paths_single() {
        let mgr = Manager::new();
        let d = mgr.ddd_path(&[(0, 1), (1, -2), (2, 3)]);
        let paths: Vec<DddPath> = mgr.ddd_paths(d).collect();
        assert_eq!(paths, vec![vec![(0, 1), (1, -2), (2, 3)]]);
    }

    #[test]
    fn test_paths_shared_suffix() {
        let mgr = Manager::new();
        let tail = mgr.ddd(1, 7, Ddd::ONE);
        let d = mgr.ddd_from_arcs(0, [(1, tail), (2, tail), (3, Ddd::ONE)]);
        let paths: Vec<DddPath> = mgr.ddd_paths(d).collect();
        assert_eq!(paths, vec![vec![(0, 1), (1, 7)], vec![(0, 2), (1, 7)], vec![(0, 3)]]);
        assert_eq!(mgr.ddd_nb_states(d), num_bigint::BigUint::from(paths.len()));
    }

    #[test]
    fn test_paths_terminals() {
        let mgr = Manager::new();
        assert_eq!(mgr.ddd_paths(Ddd::ONE).collect::<Vec<_>>(), vec![Vec::<(Var, Val)>::new()]);
        assert_eq!(mgr.ddd_paths(Ddd::NULL).count(), 0);
        assert_eq!(mgr.ddd_paths(Ddd::TOP).count(), 0);
    }

    #[test]
    fn test_sdd_paths() {
        let mgr = Manager::new();
        let s = mgr.sdd_path(&[(0, Label::ints([1, 2])), (1, Label::int(3))]);
        let paths: Vec<SddPath> = mgr.sdd_paths(s).collect();
        assert_eq!(paths, vec![vec![(0, Label::ints([1, 2])), (1, Label::int(3))]]);
    }

    #[test]
    fn test_topological() {
        let mgr = Manager::new();
        let c = mgr.ddd(2, 0, Ddd::ONE);
        let b = mgr.ddd_from_arcs(1, [(0, c), (1, Ddd::ONE)]);
        let a = mgr.ddd_from_arcs(0, [(0, b), (1, c)]);
        let order = mgr.topological([a]);
        assert_eq!(order, vec![c, b, a]);

        // Every successor comes before its predecessors.
        for (i, &node) in order.iter().enumerate() {
            for (_, succ) in mgr.ddd_arcs(node).iter() {
                if !succ.is_terminal() {
                    assert!(order[..i].contains(succ));
                }
            }
        }
    }

    #[test]
    fn test_topological_shared_roots() {
        let mgr = Manager::new();
        let c = mgr.ddd(1, 0, Ddd::ONE);
        let a = mgr.ddd(0, 1, c);
        let b = mgr.ddd(0, 2, c);
        let order = mgr.topological([a, b, Ddd::ONE]);
        assert_eq!(order, vec![c, a, b]);
    }
}
