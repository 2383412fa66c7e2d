//! Arc labels of hierarchical diagrams.
//!
//! An arc of an [`Sdd`] node carries a *set* of values rather than a single
//! value. Three kinds of sets are supported:
//!
//! - [`IntSet`]: a finite set of integers,
//! - a flat diagram ([`Ddd`]), i.e. a set of sequences,
//! - a hierarchical diagram ([`Sdd`]) itself, giving diagrams of diagrams.
//!
//! The set algebra on diagram labels is delegated to the [`Manager`]. All arcs
//! under one variable are expected to use the same kind of label; mixing them
//! is a contract violation and panics.

use std::fmt;

use num_bigint::BigUint;

use crate::manager::Manager;
use crate::reference::{Ddd, Sdd};
use crate::types::Val;

/// A finite set of integers, kept as a sorted vector without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntSet(Vec<Val>);

impl IntSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn singleton(value: Val) -> Self {
        Self(vec![value])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: Val) -> bool {
        self.0.binary_search(&value).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Val> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[Val] {
        &self.0
    }

    pub fn union(&self, other: &IntSet) -> IntSet {
        let (a, b) = (&self.0, &other.0);
        let mut res = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            if a[i] < b[j] {
                res.push(a[i]);
                i += 1;
            } else if b[j] < a[i] {
                res.push(b[j]);
                j += 1;
            } else {
                res.push(a[i]);
                i += 1;
                j += 1;
            }
        }
        res.extend_from_slice(&a[i..]);
        res.extend_from_slice(&b[j..]);
        IntSet(res)
    }

    pub fn intersection(&self, other: &IntSet) -> IntSet {
        IntSet(self.0.iter().copied().filter(|&v| other.contains(v)).collect())
    }

    pub fn difference(&self, other: &IntSet) -> IntSet {
        IntSet(self.0.iter().copied().filter(|&v| !other.contains(v)).collect())
    }
}

impl FromIterator<Val> for IntSet {
    fn from_iter<I: IntoIterator<Item = Val>>(iter: I) -> Self {
        let mut values: Vec<Val> = iter.into_iter().collect();
        values.sort_unstable();
        values.dedup();
        IntSet(values)
    }
}

impl From<Vec<Val>> for IntSet {
    fn from(values: Vec<Val>) -> Self {
        values.into_iter().collect()
    }
}

impl fmt::Display for IntSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "}}")
    }
}

/// Arc label of a hierarchical node.
///
/// The derived order (kind first, then contents) is the order in which arcs
/// of a canonical node are stored. For diagram labels it is the structural
/// slot order, which is stable within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Ints(IntSet),
    Ddd(Ddd),
    Sdd(Sdd),
}

impl Label {
    /// Label `{value}`.
    pub fn int(value: Val) -> Self {
        Label::Ints(IntSet::singleton(value))
    }

    pub fn ints(values: impl IntoIterator<Item = Val>) -> Self {
        Label::Ints(values.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Label::Ints(s) => s.is_empty(),
            Label::Ddd(d) => d.is_null(),
            Label::Sdd(s) => s.is_null(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Label::Ints(_) => "ints",
            Label::Ddd(_) => "ddd",
            Label::Sdd(_) => "sdd",
        }
    }
}

impl From<IntSet> for Label {
    fn from(s: IntSet) -> Self {
        Label::Ints(s)
    }
}

impl From<Ddd> for Label {
    fn from(d: Ddd) -> Self {
        Label::Ddd(d)
    }
}

impl From<Sdd> for Label {
    fn from(s: Sdd) -> Self {
        Label::Sdd(s)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Ints(s) => write!(f, "{}", s),
            Label::Ddd(d) => write!(f, "{}", d),
            Label::Sdd(s) => write!(f, "{}", s),
        }
    }
}

fn mismatch(a: &Label, b: &Label) -> ! {
    panic!("Label kind mismatch: {} ({}) vs {} ({})", a, a.kind(), b, b.kind())
}

impl Manager {
    pub fn label_union(&self, a: &Label, b: &Label) -> Label {
        match (a, b) {
            (Label::Ints(x), Label::Ints(y)) => Label::Ints(x.union(y)),
            (Label::Ddd(x), Label::Ddd(y)) => Label::Ddd(self.ddd_union(*x, *y)),
            (Label::Sdd(x), Label::Sdd(y)) => Label::Sdd(self.sdd_union(*x, *y)),
            _ => mismatch(a, b),
        }
    }

    pub fn label_intersection(&self, a: &Label, b: &Label) -> Label {
        match (a, b) {
            (Label::Ints(x), Label::Ints(y)) => Label::Ints(x.intersection(y)),
            (Label::Ddd(x), Label::Ddd(y)) => Label::Ddd(self.ddd_intersection(*x, *y)),
            (Label::Sdd(x), Label::Sdd(y)) => Label::Sdd(self.sdd_intersection(*x, *y)),
            _ => mismatch(a, b),
        }
    }

    pub fn label_difference(&self, a: &Label, b: &Label) -> Label {
        match (a, b) {
            (Label::Ints(x), Label::Ints(y)) => Label::Ints(x.difference(y)),
            (Label::Ddd(x), Label::Ddd(y)) => Label::Ddd(self.ddd_difference(*x, *y)),
            (Label::Sdd(x), Label::Sdd(y)) => Label::Sdd(self.sdd_difference(*x, *y)),
            _ => mismatch(a, b),
        }
    }

    /// Number of values in a label.
    pub fn label_cardinality(&self, label: &Label) -> BigUint {
        match label {
            Label::Ints(s) => BigUint::from(s.len()),
            Label::Ddd(d) => self.ddd_nb_states(*d),
            Label::Sdd(s) => self.sdd_nb_states(*s),
        }
    }
}
