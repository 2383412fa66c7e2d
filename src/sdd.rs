//! Hierarchical (set) decision diagrams.
//!
//! An [`Sdd`] node is a variable plus arcs `(label, successor)` where each
//! label is a *set* of values (see [`Label`]). A canonical node satisfies:
//!
//! - every label is non-empty,
//! - labels are pairwise disjoint,
//! - successors are pairwise distinct (arcs sharing a successor are merged by
//!   uniting their labels, the *square union*),
//! - no successor is `null`,
//! - arcs are sorted by label.
//!
//! Operators therefore work on label sets, not single values: two arcs can
//! overlap partially, which splits them into up to three pieces.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::cache::Op;
use crate::label::Label;
use crate::manager::Manager;
use crate::reference::{Ddd, Sdd};
use crate::types::{is_user_var, Var, NULL_VAR, ONE_VAR, TOP_VAR};

/// A non-terminal hierarchical node, as stored in the unique table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SddNode {
    pub var: Var,
    pub arcs: Arc<[(Label, Sdd)]>,
}

/// Node counts of an [`Sdd`] and of the flat diagrams used as its labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SddSize {
    pub sdd: usize,
    pub ddd: usize,
}

// ---- construction --------------------------------------------------------

impl Manager {
    fn intern_sdd(&self, node: SddNode) -> Sdd {
        if let Some(index) = self.sdds.read().lookup(&node) {
            return Sdd::new(index);
        }
        Sdd::new(self.sdds.write().put(node))
    }

    /// Merge arcs sharing a successor by uniting their labels, then sort by label.
    fn square_union(&self, arcs: Vec<(Label, Sdd)>) -> Vec<(Label, Sdd)> {
        let mut by_succ: BTreeMap<Sdd, Label> = BTreeMap::new();
        for (label, succ) in arcs {
            let merged = match by_succ.remove(&succ) {
                Some(prev) => self.label_union(&prev, &label),
                None => label,
            };
            by_succ.insert(succ, merged);
        }
        let mut arcs: Vec<(Label, Sdd)> = by_succ.into_iter().map(|(succ, label)| (label, succ)).collect();
        arcs.sort_unstable();
        arcs
    }

    /// Canonical node from arcs with pairwise disjoint labels.
    ///
    /// Empty labels and arcs to `null` are dropped, arcs sharing a successor
    /// are merged. No arc left means `null`.
    pub(crate) fn mk_sdd(&self, var: Var, mut arcs: Vec<(Label, Sdd)>) -> Sdd {
        assert!(is_user_var(var), "Variable {} is reserved", var);

        arcs.retain(|(label, succ)| !succ.is_null() && !label.is_empty());
        if arcs.is_empty() {
            return Sdd::NULL;
        }
        let arcs = self.square_union(arcs);
        self.intern_sdd(SddNode {
            var,
            arcs: arcs.into(),
        })
    }

    /// The node `var ∈ label` followed by `succ`.
    pub fn sdd(&self, var: Var, label: impl Into<Label>, succ: Sdd) -> Sdd {
        self.mk_sdd(var, vec![(label.into(), succ)])
    }

    /// Node built from arbitrary, possibly overlapping arcs.
    pub fn sdd_from_arcs(&self, var: Var, arcs: impl IntoIterator<Item = (Label, Sdd)>) -> Sdd {
        let nodes: Vec<Sdd> = arcs
            .into_iter()
            .map(|(label, succ)| self.sdd(var, label, succ))
            .collect();
        self.sdd_union_all(nodes)
    }

    /// A single path `x0 ∈ l0 -> x1 ∈ l1 -> ... -> one`.
    pub fn sdd_path(&self, assignments: &[(Var, Label)]) -> Sdd {
        assignments
            .iter()
            .rev()
            .fold(Sdd::ONE, |succ, (var, label)| self.sdd(*var, label.clone(), succ))
    }
}

// ---- inspection ----------------------------------------------------------

impl Manager {
    pub fn sdd_variable(&self, s: Sdd) -> Var {
        match s {
            Sdd::ONE => ONE_VAR,
            Sdd::NULL => NULL_VAR,
            Sdd::TOP => TOP_VAR,
            _ => self.sdds.read().get(s.raw()).var,
        }
    }

    /// Arcs of a node, sorted by label. Terminals have none.
    pub fn sdd_arcs(&self, s: Sdd) -> Arc<[(Label, Sdd)]> {
        if s.is_terminal() {
            return Arc::from(Vec::new());
        }
        self.sdds.read().get(s.raw()).arcs.clone()
    }

    /// Number of hierarchical nodes reachable from `s`, and of flat nodes
    /// reachable through flat-diagram labels.
    pub fn sdd_size(&self, s: Sdd) -> SddSize {
        let mut visited = HashSet::new();
        let mut ddd_visited = HashSet::new();
        let mut ddd_stack: Vec<Ddd> = Vec::new();
        let mut stack = vec![s];

        while let Some(node) = stack.pop() {
            if node.is_terminal() || !visited.insert(node) {
                continue;
            }
            for (label, succ) in self.sdd_arcs(node).iter() {
                match label {
                    Label::Ddd(d) => ddd_stack.push(*d),
                    Label::Sdd(inner) => stack.push(*inner),
                    Label::Ints(_) => {}
                }
                stack.push(*succ);
            }
        }
        while let Some(d) = ddd_stack.pop() {
            if d.is_terminal() || !ddd_visited.insert(d) {
                continue;
            }
            ddd_stack.extend(self.ddd_arcs(d).iter().map(|&(_, succ)| succ));
        }

        SddSize {
            sdd: visited.len(),
            ddd: ddd_visited.len(),
        }
    }

    /// Number of states: each arc weighs the cardinality of its label.
    pub fn sdd_nb_states(&self, s: Sdd) -> BigUint {
        let mut memo = HashMap::new();
        self.sdd_nb_states_rec(s, &mut memo)
    }

    fn sdd_nb_states_rec(&self, s: Sdd, memo: &mut HashMap<Sdd, BigUint>) -> BigUint {
        match s {
            Sdd::ONE => return BigUint::from(1u32),
            Sdd::NULL | Sdd::TOP => return BigUint::ZERO,
            _ => {}
        }
        if let Some(count) = memo.get(&s) {
            return count.clone();
        }
        let mut count = BigUint::ZERO;
        for (label, succ) in self.sdd_arcs(s).iter() {
            count += self.label_cardinality(label) * self.sdd_nb_states_rec(*succ, memo);
        }
        memo.insert(s, count.clone());
        count
    }
}

// ---- operators -----------------------------------------------------------

impl Manager {
    fn sdd_memo(&self, op: Op<Sdd>) -> Sdd {
        if let Some(res) = self.sdd_ops.read().get(&op) {
            debug!("sdd cache hit: {} = {}", op, res);
            return res;
        }
        let res = match &op {
            Op::Union(operands) => self.sdd_union_rec(operands),
            &Op::Intersection(a, b) => self.sdd_intersection_rec(a, b),
            &Op::Difference(a, b) => self.sdd_difference_rec(a, b),
            &Op::Concat(a, b) => self.sdd_concat_rec(a, b),
        };
        self.sdd_ops.write().insert(op, res);
        res
    }

    pub fn sdd_union(&self, a: Sdd, b: Sdd) -> Sdd {
        self.sdd_union_all([a, b])
    }

    /// N-ary union.
    pub fn sdd_union_all(&self, operands: impl IntoIterator<Item = Sdd>) -> Sdd {
        let mut operands: Vec<Sdd> = operands.into_iter().filter(|s| !s.is_null()).collect();
        if operands.iter().any(|s| s.is_top()) {
            return Sdd::TOP;
        }
        operands.sort_unstable();
        operands.dedup();
        match operands.len() {
            0 => Sdd::NULL,
            1 => operands[0],
            _ => self.sdd_memo(Op::Union(operands.into())),
        }
    }

    /// Union by partition refinement.
    ///
    /// `parts` holds pairwise disjoint labels, each with the successors of
    /// every arc whose label covers it. Each incoming arc splits the parts it
    /// overlaps; the uncovered rest of its label becomes a new part.
    fn sdd_union_rec(&self, operands: &[Sdd]) -> Sdd {
        debug!("sdd_union({:?})", operands);

        let var = self.sdd_variable(operands[0]);
        if operands.iter().any(|&s| self.sdd_variable(s) != var) {
            warn!("sdd_union: mismatched variables in {:?}, answering top", operands);
            return Sdd::TOP;
        }

        let mut parts: Vec<(Label, Vec<Sdd>)> = Vec::new();
        for &s in operands {
            for (label, succ) in self.sdd_arcs(s).iter() {
                let mut rest = label.clone();
                let mut refined = Vec::with_capacity(parts.len() + 1);
                for (part, succs) in parts {
                    if rest.is_empty() {
                        refined.push((part, succs));
                        continue;
                    }
                    let common = self.label_intersection(&part, &rest);
                    if common.is_empty() {
                        refined.push((part, succs));
                        continue;
                    }
                    let only_part = self.label_difference(&part, &common);
                    rest = self.label_difference(&rest, &common);
                    let mut with_succ = succs.clone();
                    with_succ.push(*succ);
                    if !only_part.is_empty() {
                        refined.push((only_part, succs));
                    }
                    refined.push((common, with_succ));
                }
                if !rest.is_empty() {
                    refined.push((rest, vec![*succ]));
                }
                parts = refined;
            }
        }

        let arcs = parts
            .into_iter()
            .map(|(label, succs)| (label, self.sdd_union_all(succs)))
            .collect();
        self.mk_sdd(var, arcs)
    }

    pub fn sdd_intersection(&self, a: Sdd, b: Sdd) -> Sdd {
        if a == b {
            return a;
        }
        if a.is_null() || b.is_null() {
            return Sdd::NULL;
        }
        if a.is_top() || b.is_top() {
            return Sdd::TOP;
        }
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        self.sdd_memo(Op::Intersection(a, b))
    }

    fn sdd_intersection_rec(&self, a: Sdd, b: Sdd) -> Sdd {
        debug!("sdd_intersection({}, {})", a, b);

        let var = self.sdd_variable(a);
        if var != self.sdd_variable(b) {
            return Sdd::NULL;
        }

        let ys = self.sdd_arcs(b);
        let mut arcs = Vec::new();
        for (lx, sx) in self.sdd_arcs(a).iter() {
            for (ly, sy) in ys.iter() {
                let common = self.label_intersection(lx, ly);
                if common.is_empty() {
                    continue;
                }
                arcs.push((common, self.sdd_intersection(*sx, *sy)));
            }
        }
        self.mk_sdd(var, arcs)
    }

    pub fn sdd_difference(&self, a: Sdd, b: Sdd) -> Sdd {
        if a == b || a.is_null() {
            return Sdd::NULL;
        }
        if b.is_null() {
            return a;
        }
        if a.is_top() || b.is_top() {
            return Sdd::TOP;
        }
        self.sdd_memo(Op::Difference(a, b))
    }

    fn sdd_difference_rec(&self, a: Sdd, b: Sdd) -> Sdd {
        debug!("sdd_difference({}, {})", a, b);

        let var = self.sdd_variable(a);
        if var != self.sdd_variable(b) {
            warn!("sdd_difference: mismatched variables in {} - {}, answering top", a, b);
            return Sdd::TOP;
        }

        let ys = self.sdd_arcs(b);
        let mut arcs = Vec::new();
        for (lx, sx) in self.sdd_arcs(a).iter() {
            let mut rest = lx.clone();
            for (ly, sy) in ys.iter() {
                let common = self.label_intersection(lx, ly);
                if common.is_empty() {
                    continue;
                }
                rest = self.label_difference(&rest, &common);
                arcs.push((common, self.sdd_difference(*sx, *sy)));
            }
            if !rest.is_empty() {
                arcs.push((rest, *sx));
            }
        }
        self.mk_sdd(var, arcs)
    }

    /// Concatenation: every `one` leaf of `a` is replaced by `b`.
    pub fn sdd_concat(&self, a: Sdd, b: Sdd) -> Sdd {
        if a.is_null() || b.is_null() {
            return Sdd::NULL;
        }
        if a.is_one() {
            return b;
        }
        if b.is_one() {
            return a;
        }
        if a.is_top() || b.is_top() {
            return Sdd::TOP;
        }
        self.sdd_memo(Op::Concat(a, b))
    }

    fn sdd_concat_rec(&self, a: Sdd, b: Sdd) -> Sdd {
        debug!("sdd_concat({}, {})", a, b);

        let var = self.sdd_variable(a);
        let arcs = self
            .sdd_arcs(a)
            .iter()
            .map(|(label, succ)| (label.clone(), self.sdd_concat(*succ, b)))
            .collect();
        self.mk_sdd(var, arcs)
    }
}
