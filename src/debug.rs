//! Debug utilities for inspecting diagrams and homomorphisms.
//!
//! These are primarily useful in tests and during development.

use std::fmt::{self, Write};

use crate::diagram::Diagram;
use crate::hom::HomNode;
use crate::manager::Manager;
use crate::reference::HomId;
use crate::types::Var;

/// Detailed information about a single node.
#[derive(Debug, Clone)]
pub struct NodeInfo<N: Diagram> {
    pub node: N,
    /// Variable at this node (None for terminals)
    pub variable: Option<Var>,
    pub arcs: Vec<(N::Value, N)>,
}

impl<N: Diagram> fmt::Display for NodeInfo<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.variable {
            None => write!(f, "{}", self.node),
            Some(var) => {
                write!(f, "{}(x{}", self.node, var)?;
                for (value, succ) in &self.arcs {
                    write!(f, " {}->{}", value, succ)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Every non-terminal node reachable from a root, root first.
#[derive(Debug, Clone)]
pub struct DiagramTree<N: Diagram> {
    pub root: N,
    pub nodes: Vec<NodeInfo<N>>,
}

impl<N: Diagram> fmt::Display for DiagramTree<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diagram {} (size={}):", self.root, self.nodes.len())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node)?;
        }
        Ok(())
    }
}

impl Manager {
    pub fn node_info<N: Diagram>(&self, node: N) -> NodeInfo<N> {
        if node.is_terminal() {
            return NodeInfo {
                node,
                variable: None,
                arcs: Vec::new(),
            };
        }
        NodeInfo {
            node,
            variable: Some(N::variable(self, node)),
            arcs: N::arcs(self, node).to_vec(),
        }
    }

    pub fn debug_tree<N: Diagram>(&self, root: N) -> DiagramTree<N> {
        let mut nodes: Vec<NodeInfo<N>> = self
            .topological([root])
            .into_iter()
            .map(|n| self.node_info(n))
            .collect();
        nodes.reverse();
        DiagramTree { root, nodes }
    }

    /// Nested rendering of a diagram, shared nodes repeated.
    ///
    /// Format: `(x<var> <value>:<succ> ...)`, terminals as `one`, `null`, `top`.
    pub fn to_bracket_string<N: Diagram>(&self, node: N) -> String {
        let mut out = String::new();
        self.write_bracket(&mut out, node);
        out
    }

    fn write_bracket<N: Diagram>(&self, out: &mut String, node: N) {
        if node.is_terminal() {
            let _ = write!(out, "{}", node);
            return;
        }
        let _ = write!(out, "(x{}", N::variable(self, node));
        for (value, succ) in N::arcs(self, node).iter() {
            let _ = write!(out, " {}:", value);
            self.write_bracket(out, *succ);
        }
        out.push(')');
    }

    /// Readable rendering of a homomorphism term.
    pub fn hom_to_string<N: Diagram>(&self, h: HomId<N>) -> String {
        let list = |hs: &[HomId<N>], sep: &str| {
            hs.iter()
                .map(|&x| self.hom_to_string(x))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match &*self.hom_node(h) {
            HomNode::Identity => "id".to_string(),
            HomNode::Constant(c) => format!("const({})", c),
            HomNode::Prefix { var, value, next } => format!("(x{}={} . {})", var, value, self.hom_to_string(*next)),
            HomNode::LeftConcat { left, hom } => format!("({} ^ {})", left, self.hom_to_string(*hom)),
            HomNode::RightConcat { hom, right } => format!("({} ^ {})", self.hom_to_string(*hom), right),
            HomNode::Compose { outer, inner } => {
                format!("({} o {})", self.hom_to_string(*outer), self.hom_to_string(*inner))
            }
            HomNode::Sum(hs) => format!("({})", list(&hs[..], " + ")),
            HomNode::And(hs) => format!("({})", list(&hs[..], " & ")),
            HomNode::Inter(hs) => format!("({})", list(&hs[..], " * ")),
            HomNode::Select { hom, filter } => format!("({} * {})", self.hom_to_string(*hom), filter),
            HomNode::Minus { hom, node } => format!("({} - {})", self.hom_to_string(*hom), node),
            HomNode::Difference { left, right } => {
                format!("({} - {})", self.hom_to_string(*left), self.hom_to_string(*right))
            }
            HomNode::Not(sel) => format!("!{}", self.hom_to_string(*sel)),
            HomNode::Fixpoint(inner) => format!("{}*", self.hom_to_string(*inner)),
            HomNode::Local { var, hom } => format!("local(x{}, {})", var, self.hom_to_string(*hom)),
            HomNode::User(u) => format!("{:?}", u),
        }
    }
}
