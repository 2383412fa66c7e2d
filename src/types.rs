//! Variables, values and variable ranges.
//!
//! Diagrams in this crate are labelled by plain integers: a node carries a
//! *variable* and every outgoing arc carries a *value* (flat diagrams) or a
//! set of values (hierarchical diagrams). User variables are non-negative;
//! the negative space is reserved for the three terminals.

use std::collections::BTreeSet;
use std::fmt;

/// A variable (node label). User variables are `>= 0`.
pub type Var = i32;

/// A value carried by an arc of a flat diagram.
pub type Val = i32;

/// Variable reported by the `one` terminal.
pub const ONE_VAR: Var = -1;

/// Variable reported by the `null` terminal.
pub const NULL_VAR: Var = -2;

/// Variable reported by the `top` terminal.
pub const TOP_VAR: Var = -3;

/// Returns `true` if `var` may label a non-terminal node.
pub const fn is_user_var(var: Var) -> bool {
    var >= 0
}

/// The set of variables a homomorphism may read or modify.
///
/// Two homomorphisms whose ranges are both finite and disjoint commute.
/// `Full` is the conservative answer for anything that cannot tell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Range {
    /// Touches every variable.
    Full,
    /// Touches only the listed variables.
    Vars(BTreeSet<Var>),
}

impl Range {
    /// The range of a homomorphism that touches nothing (e.g. the identity).
    pub fn empty() -> Self {
        Range::Vars(BTreeSet::new())
    }

    /// A range made of a single variable.
    pub fn single(var: Var) -> Self {
        Range::Vars(BTreeSet::from([var]))
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Range::Full)
    }

    pub fn contains(&self, var: Var) -> bool {
        match self {
            Range::Full => true,
            Range::Vars(vars) => vars.contains(&var),
        }
    }

    /// Union of two ranges.
    pub fn union(&self, other: &Range) -> Range {
        match (self, other) {
            (Range::Vars(a), Range::Vars(b)) => Range::Vars(a.union(b).copied().collect()),
            _ => Range::Full,
        }
    }

    /// Returns `true` if both ranges are finite and share no variable.
    pub fn is_disjoint(&self, other: &Range) -> bool {
        match (self, other) {
            (Range::Vars(a), Range::Vars(b)) => a.is_disjoint(b),
            _ => false,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Range::Full => write!(f, "*"),
            Range::Vars(vars) => {
                write!(f, "{{")?;
                for (i, v) in vars.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "x{}", v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_vars() {
        assert!(is_user_var(0));
        assert!(is_user_var(42));
        assert!(!is_user_var(ONE_VAR));
        assert!(!is_user_var(NULL_VAR));
        assert!(!is_user_var(TOP_VAR));
    }

    #[test]
    fn test_range_union() {
        let a = Range::single(1);
        let b = Range::single(2);
        let ab = a.union(&b);
        assert!(ab.contains(1));
        assert!(ab.contains(2));
        assert!(!ab.contains(3));
        assert!(a.union(&Range::Full).is_full());
    }

    #[test]
    fn test_range_disjoint() {
        let a = Range::single(1);
        let b = Range::single(2);
        assert!(a.is_disjoint(&b));
        assert!(!a.is_disjoint(&a));
        assert!(!a.is_disjoint(&Range::Full));
        assert!(Range::empty().is_disjoint(&a));
    }

    #[test]
    fn test_range_display() {
        assert_eq!(Range::Full.to_string(), "*");
        assert_eq!(Range::single(1).union(&Range::single(3)).to_string(), "{x1,x3}");
    }
}
