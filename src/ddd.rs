//! Flat (data) decision diagrams.
//!
//! A [`Ddd`] node is a variable plus a list of arcs `(value, successor)`,
//! sorted by value. A diagram denotes a set of sequences of assignments: each
//! path from the root to `one` is one sequence. Arcs to `null` are never
//! stored, so `null` is the empty set and `one` the set holding the empty
//! sequence.
//!
//! Operators are synchronized on variables: operands must agree on the
//! variable at each level. On mismatch, union and difference answer `top`,
//! intersection answers `null`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};
use num_bigint::BigUint;

use crate::cache::Op;
use crate::manager::Manager;
use crate::reference::Ddd;
use crate::types::{is_user_var, Val, Var, NULL_VAR, ONE_VAR, TOP_VAR};

/// A non-terminal flat node, as stored in the unique table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DddNode {
    pub var: Var,
    pub arcs: Arc<[(Val, Ddd)]>,
}

// ---- construction --------------------------------------------------------

impl Manager {
    fn intern_ddd(&self, node: DddNode) -> Ddd {
        if let Some(index) = self.ddds.read().lookup(&node) {
            return Ddd::new(index);
        }
        Ddd::new(self.ddds.write().put(node))
    }

    /// Canonical node from arcs sorted by strictly increasing value.
    ///
    /// Arcs to `null` are dropped; no arc left means `null`.
    pub(crate) fn mk_ddd(&self, var: Var, mut arcs: Vec<(Val, Ddd)>) -> Ddd {
        assert!(is_user_var(var), "Variable {} is reserved", var);
        debug_assert!(arcs.windows(2).all(|w| w[0].0 < w[1].0), "Unsorted arcs: {:?}", arcs);

        arcs.retain(|&(_, succ)| !succ.is_null());
        if arcs.is_empty() {
            return Ddd::NULL;
        }
        self.intern_ddd(DddNode {
            var,
            arcs: arcs.into(),
        })
    }

    /// The node `var = val` followed by `succ`.
    pub fn ddd(&self, var: Var, val: Val, succ: Ddd) -> Ddd {
        self.mk_ddd(var, vec![(val, succ)])
    }

    /// Node built from arbitrary arcs: sorted by value, successors sharing a value are united.
    pub fn ddd_from_arcs(&self, var: Var, arcs: impl IntoIterator<Item = (Val, Ddd)>) -> Ddd {
        let mut by_value: BTreeMap<Val, Vec<Ddd>> = BTreeMap::new();
        for (val, succ) in arcs {
            by_value.entry(val).or_default().push(succ);
        }
        let arcs = by_value
            .into_iter()
            .map(|(val, succs)| (val, self.ddd_union_all(succs)))
            .collect();
        self.mk_ddd(var, arcs)
    }

    /// A single path `x0 = v0 -> x1 = v1 -> ... -> one`.
    pub fn ddd_path(&self, assignments: &[(Var, Val)]) -> Ddd {
        assignments
            .iter()
            .rev()
            .fold(Ddd::ONE, |succ, &(var, val)| self.ddd(var, val, succ))
    }
}

// ---- inspection ----------------------------------------------------------

impl Manager {
    /// Variable of a node; terminals report their reserved negative variable.
    pub fn ddd_variable(&self, d: Ddd) -> Var {
        match d {
            Ddd::ONE => ONE_VAR,
            Ddd::NULL => NULL_VAR,
            Ddd::TOP => TOP_VAR,
            _ => self.ddds.read().get(d.raw()).var,
        }
    }

    /// Arcs of a node, sorted by value. Terminals have none.
    pub fn ddd_arcs(&self, d: Ddd) -> Arc<[(Val, Ddd)]> {
        if d.is_terminal() {
            return Arc::from(Vec::new());
        }
        self.ddds.read().get(d.raw()).arcs.clone()
    }

    /// Number of distinct non-terminal nodes reachable from `d`.
    pub fn ddd_size(&self, d: Ddd) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![d];
        while let Some(node) = stack.pop() {
            if node.is_terminal() || !visited.insert(node) {
                continue;
            }
            stack.extend(self.ddd_arcs(node).iter().map(|&(_, succ)| succ));
        }
        visited.len()
    }

    /// Number of paths to `one`. `null` and `top` count zero.
    pub fn ddd_nb_states(&self, d: Ddd) -> BigUint {
        let mut memo = HashMap::new();
        self.ddd_nb_states_rec(d, &mut memo)
    }

    fn ddd_nb_states_rec(&self, d: Ddd, memo: &mut HashMap<Ddd, BigUint>) -> BigUint {
        match d {
            Ddd::ONE => return BigUint::from(1u32),
            Ddd::NULL | Ddd::TOP => return BigUint::ZERO,
            _ => {}
        }
        if let Some(count) = memo.get(&d) {
            return count.clone();
        }
        let mut count = BigUint::ZERO;
        for &(_, succ) in self.ddd_arcs(d).iter() {
            count += self.ddd_nb_states_rec(succ, memo);
        }
        memo.insert(d, count.clone());
        count
    }
}

// ---- operators -----------------------------------------------------------

impl Manager {
    fn ddd_memo(&self, op: Op<Ddd>) -> Ddd {
        if let Some(res) = self.ddd_ops.read().get(&op) {
            debug!("ddd cache hit: {} = {}", op, res);
            return res;
        }
        let res = match &op {
            Op::Union(operands) => self.ddd_union_rec(operands),
            &Op::Intersection(a, b) => self.ddd_intersection_rec(a, b),
            &Op::Difference(a, b) => self.ddd_difference_rec(a, b),
            &Op::Concat(a, b) => self.ddd_concat_rec(a, b),
        };
        self.ddd_ops.write().insert(op, res);
        res
    }

    pub fn ddd_union(&self, a: Ddd, b: Ddd) -> Ddd {
        self.ddd_union_all([a, b])
    }

    /// N-ary union.
    pub fn ddd_union_all(&self, operands: impl IntoIterator<Item = Ddd>) -> Ddd {
        let mut operands: Vec<Ddd> = operands.into_iter().filter(|d| !d.is_null()).collect();
        if operands.iter().any(|d| d.is_top()) {
            return Ddd::TOP;
        }
        operands.sort_unstable();
        operands.dedup();
        match operands.len() {
            0 => Ddd::NULL,
            1 => operands[0],
            _ => self.ddd_memo(Op::Union(operands.into())),
        }
    }

    fn ddd_union_rec(&self, operands: &[Ddd]) -> Ddd {
        debug!("ddd_union({:?})", operands);

        let var = self.ddd_variable(operands[0]);
        if operands.iter().any(|&d| self.ddd_variable(d) != var) {
            warn!("ddd_union: mismatched variables in {:?}, answering top", operands);
            return Ddd::TOP;
        }

        let mut by_value: BTreeMap<Val, Vec<Ddd>> = BTreeMap::new();
        for &d in operands {
            for &(val, succ) in self.ddd_arcs(d).iter() {
                by_value.entry(val).or_default().push(succ);
            }
        }
        let arcs = by_value
            .into_iter()
            .map(|(val, succs)| (val, self.ddd_union_all(succs)))
            .collect();
        self.mk_ddd(var, arcs)
    }

    pub fn ddd_intersection(&self, a: Ddd, b: Ddd) -> Ddd {
        if a == b {
            return a;
        }
        if a.is_null() || b.is_null() {
            return Ddd::NULL;
        }
        if a.is_top() || b.is_top() {
            return Ddd::TOP;
        }
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        self.ddd_memo(Op::Intersection(a, b))
    }

    fn ddd_intersection_rec(&self, a: Ddd, b: Ddd) -> Ddd {
        debug!("ddd_intersection({}, {})", a, b);

        let var = self.ddd_variable(a);
        if var != self.ddd_variable(b) {
            return Ddd::NULL;
        }

        let (xs, ys) = (self.ddd_arcs(a), self.ddd_arcs(b));
        let mut arcs = Vec::with_capacity(xs.len().min(ys.len()));
        let (mut i, mut j) = (0, 0);
        while i < xs.len() && j < ys.len() {
            let (vx, sx) = xs[i];
            let (vy, sy) = ys[j];
            if vx < vy {
                i += 1;
            } else if vy < vx {
                j += 1;
            } else {
                arcs.push((vx, self.ddd_intersection(sx, sy)));
                i += 1;
                j += 1;
            }
        }
        self.mk_ddd(var, arcs)
    }

    pub fn ddd_difference(&self, a: Ddd, b: Ddd) -> Ddd {
        if a == b || a.is_null() {
            return Ddd::NULL;
        }
        if b.is_null() {
            return a;
        }
        if a.is_top() || b.is_top() {
            return Ddd::TOP;
        }
        self.ddd_memo(Op::Difference(a, b))
    }

    fn ddd_difference_rec(&self, a: Ddd, b: Ddd) -> Ddd {
        debug!("ddd_difference({}, {})", a, b);

        let var = self.ddd_variable(a);
        if var != self.ddd_variable(b) {
            warn!("ddd_difference: mismatched variables in {} - {}, answering top", a, b);
            return Ddd::TOP;
        }

        let ys = self.ddd_arcs(b);
        let arcs = self
            .ddd_arcs(a)
            .iter()
            .map(|&(val, sx)| match ys.binary_search_by_key(&val, |&(v, _)| v) {
                Ok(k) => (val, self.ddd_difference(sx, ys[k].1)),
                Err(_) => (val, sx),
            })
            .collect();
        self.mk_ddd(var, arcs)
    }

    /// Concatenation: every `one` leaf of `a` is replaced by `b`.
    pub fn ddd_concat(&self, a: Ddd, b: Ddd) -> Ddd {
        if a.is_null() || b.is_null() {
            return Ddd::NULL;
        }
        if a.is_one() {
            return b;
        }
        if b.is_one() {
            return a;
        }
        if a.is_top() || b.is_top() {
            return Ddd::TOP;
        }
        self.ddd_memo(Op::Concat(a, b))
    }

    fn ddd_concat_rec(&self, a: Ddd, b: Ddd) -> Ddd {
        debug!("ddd_concat({}, {})", a, b);

        let var = self.ddd_variable(a);
        let arcs = self
            .ddd_arcs(a)
            .iter()
            .map(|&(val, succ)| (val, self.ddd_concat(succ, b)))
            .collect();
        self.mk_ddd(var, arcs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_ddd_canonical() {
        let mgr = Manager::new();
        let a = mgr.ddd(0, 1, mgr.ddd(1, 2, Ddd::ONE));
        let b = mgr.ddd_path(&[(0, 1), (1, 2)]);
        assert_eq!(a, b);
        assert_eq!(mgr.ddd_variable(a), 0);
        assert_eq!(mgr.ddd_arcs(a).len(), 1);
        assert_eq!(mgr.ddd_size(a), 2);
    }

    #[test]
    fn test_ddd_null_successor() {
        let mgr = Manager::new();
        assert_eq!(mgr.ddd(0, 1, Ddd::NULL), Ddd::NULL);
        assert_eq!(mgr.ddd_from_arcs(0, []), Ddd::NULL);
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn test_ddd_reserved_var() {
        let mgr = Manager::new();
        mgr.ddd(-1, 0, Ddd::ONE);
    }

    #[test]
    fn test_ddd_terminal_vars() {
        let mgr = Manager::new();
        assert_eq!(mgr.ddd_variable(Ddd::ONE), ONE_VAR);
        assert_eq!(mgr.ddd_variable(Ddd::NULL), NULL_VAR);
        assert_eq!(mgr.ddd_variable(Ddd::TOP), TOP_VAR);
        assert!(mgr.ddd_arcs(Ddd::ONE).is_empty());
    }

    #[test]
    fn test_ddd_from_arcs_merges_values() {
        let mgr = Manager::new();
        let x = mgr.ddd(1, 0, Ddd::ONE);
        let y = mgr.ddd(1, 1, Ddd::ONE);
        let d = mgr.ddd_from_arcs(0, [(5, x), (3, y), (5, y)]);
        let arcs = mgr.ddd_arcs(d);
        assert_eq!(arcs.len(), 2);
        assert_eq!(arcs[0], (3, y));
        assert_eq!(arcs[1], (5, mgr.ddd_union(x, y)));
        assert_eq!(mgr.ddd_nb_states(d), BigUint::from(3u32));
    }

    #[test]
    fn test_ddd_union() {
        let mgr = Manager::new();
        let a = mgr.ddd_path(&[(0, 1), (1, 1)]);
        let b = mgr.ddd_path(&[(0, 1), (1, 2)]);
        let c = mgr.ddd_path(&[(0, 2), (1, 1)]);
        let ab = mgr.ddd_union(a, b);
        assert_eq!(mgr.ddd_nb_states(ab), BigUint::from(2u32));
        assert_eq!(mgr.ddd_union(ab, c), mgr.ddd_union_all([c, b, a]));
        assert_eq!(mgr.ddd_union(a, a), a);
        assert_eq!(mgr.ddd_union(Ddd::NULL, a), a);
        assert_eq!(mgr.ddd_union(Ddd::TOP, a), Ddd::TOP);
    }

    #[test]
    fn test_ddd_union_mismatch() {
        let mgr = Manager::new();
        let a = mgr.ddd(0, 1, Ddd::ONE);
        let b = mgr.ddd(1, 1, Ddd::ONE);
        assert_eq!(mgr.ddd_union(a, b), Ddd::TOP);
        assert_eq!(mgr.ddd_union(a, Ddd::ONE), Ddd::TOP);
    }

    #[test]
    fn test_ddd_intersection() {
        let mgr = Manager::new();
        let a = mgr.ddd_path(&[(0, 1), (1, 1)]);
        let b = mgr.ddd_path(&[(0, 1), (1, 2)]);
        let ab = mgr.ddd_union(a, b);
        assert_eq!(mgr.ddd_intersection(ab, a), a);
        assert_eq!(mgr.ddd_intersection(a, b), Ddd::NULL);
        assert_eq!(mgr.ddd_intersection(a, Ddd::NULL), Ddd::NULL);
        assert_eq!(mgr.ddd_intersection(a, mgr.ddd(3, 0, Ddd::ONE)), Ddd::NULL);
    }

    #[test]
    fn test_ddd_difference() {
        let mgr = Manager::new();
        let a = mgr.ddd_path(&[(0, 1), (1, 1)]);
        let b = mgr.ddd_path(&[(0, 1), (1, 2)]);
        let ab = mgr.ddd_union(a, b);
        assert_eq!(mgr.ddd_difference(ab, a), b);
        assert_eq!(mgr.ddd_difference(a, a), Ddd::NULL);
        assert_eq!(mgr.ddd_difference(a, Ddd::NULL), a);
        assert_eq!(mgr.ddd_difference(a, b), a);
        assert_eq!(mgr.ddd_difference(a, mgr.ddd(3, 0, Ddd::ONE)), Ddd::TOP);
    }

    #[test]
    fn test_ddd_concat() {
        let mgr = Manager::new();
        let a = mgr.ddd_path(&[(0, 1)]);
        let b = mgr.ddd_path(&[(1, 2)]);
        assert_eq!(mgr.ddd_concat(a, b), mgr.ddd_path(&[(0, 1), (1, 2)]));
        assert_eq!(mgr.ddd_concat(Ddd::ONE, b), b);
        assert_eq!(mgr.ddd_concat(a, Ddd::ONE), a);
        assert_eq!(mgr.ddd_concat(Ddd::NULL, b), Ddd::NULL);
    }

    #[test]
    fn test_ddd_nb_states_terminals() {
        let mgr = Manager::new();
        assert_eq!(mgr.ddd_nb_states(Ddd::ONE), BigUint::from(1u32));
        assert_eq!(mgr.ddd_nb_states(Ddd::NULL), BigUint::from(0u32));
        assert_eq!(mgr.ddd_nb_states(Ddd::TOP), BigUint::from(0u32));
    }
}
