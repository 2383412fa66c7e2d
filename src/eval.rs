//! Operator sugar.
//!
//! `a + b`, `a * b`, `a - b` and `a ^ b` on diagrams build deferred union,
//! intersection, difference and concatenation operations; [`Manager::eval`]
//! runs them. On homomorphisms `+` is the sum, `&` the composition, `*` the
//! intersection and `-` the difference, and [`HomId::on`] defers an
//! application.

use std::ops::{Add, BitAnd, BitXor, Mul, Sub};

use crate::diagram::Diagram;
use crate::manager::Manager;
use crate::reference::{Ddd, HomId, Sdd};

pub struct UnionOp<N> {
    a: N,
    b: N,
}

pub struct InterOp<N> {
    a: N,
    b: N,
}

pub struct DiffOp<N> {
    a: N,
    b: N,
}

pub struct ConcatOp<N> {
    a: N,
    b: N,
}

macro_rules! node_ops {
    ($t:ty) => {
        impl Add for $t {
            type Output = UnionOp<$t>;

            fn add(self, rhs: Self) -> Self::Output {
                UnionOp { a: self, b: rhs }
            }
        }

        impl Mul for $t {
            type Output = InterOp<$t>;

            fn mul(self, rhs: Self) -> Self::Output {
                InterOp { a: self, b: rhs }
            }
        }

        impl Sub for $t {
            type Output = DiffOp<$t>;

            fn sub(self, rhs: Self) -> Self::Output {
                DiffOp { a: self, b: rhs }
            }
        }

        impl BitXor for $t {
            type Output = ConcatOp<$t>;

            fn bitxor(self, rhs: Self) -> Self::Output {
                ConcatOp { a: self, b: rhs }
            }
        }

        impl Eval for $t {
            type Output = $t;

            fn eval(&self, _mgr: &Manager) -> $t {
                *self
            }
        }
    };
}

node_ops!(Ddd);
node_ops!(Sdd);

pub enum HomOp<N: Diagram> {
    Sum(HomId<N>, HomId<N>),
    Compose(HomId<N>, HomId<N>),
    Inter(HomId<N>, HomId<N>),
    Difference(HomId<N>, HomId<N>),
}

impl<N: Diagram> Add for HomId<N> {
    type Output = HomOp<N>;

    fn add(self, rhs: Self) -> Self::Output {
        HomOp::Sum(self, rhs)
    }
}

impl<N: Diagram> BitAnd for HomId<N> {
    type Output = HomOp<N>;

    fn bitand(self, rhs: Self) -> Self::Output {
        HomOp::Compose(self, rhs)
    }
}

impl<N: Diagram> Mul for HomId<N> {
    type Output = HomOp<N>;

    fn mul(self, rhs: Self) -> Self::Output {
        HomOp::Inter(self, rhs)
    }
}

impl<N: Diagram> Sub for HomId<N> {
    type Output = HomOp<N>;

    fn sub(self, rhs: Self) -> Self::Output {
        HomOp::Difference(self, rhs)
    }
}

pub struct ApplyOp<N: Diagram> {
    hom: HomId<N>,
    node: N,
}

impl<N: Diagram> HomId<N> {
    /// Deferred `self(node)`.
    pub fn on(self, node: N) -> ApplyOp<N> {
        ApplyOp { hom: self, node }
    }
}

pub trait Eval {
    type Output;

    fn eval(&self, mgr: &Manager) -> Self::Output;
}

impl Manager {
    pub fn eval<E: Eval>(&self, value: E) -> E::Output {
        value.eval(self)
    }
}

impl<N: Diagram> Eval for HomId<N> {
    type Output = HomId<N>;

    fn eval(&self, _mgr: &Manager) -> HomId<N> {
        *self
    }
}

impl<N: Diagram> Eval for UnionOp<N> {
    type Output = N;

    fn eval(&self, mgr: &Manager) -> N {
        N::union_all(mgr, vec![self.a, self.b])
    }
}

impl<N: Diagram> Eval for InterOp<N> {
    type Output = N;

    fn eval(&self, mgr: &Manager) -> N {
        N::intersection(mgr, self.a, self.b)
    }
}

impl<N: Diagram> Eval for DiffOp<N> {
    type Output = N;

    fn eval(&self, mgr: &Manager) -> N {
        N::difference(mgr, self.a, self.b)
    }
}

impl<N: Diagram> Eval for ConcatOp<N> {
    type Output = N;

    fn eval(&self, mgr: &Manager) -> N {
        N::concat(mgr, self.a, self.b)
    }
}

impl<N: Diagram> Eval for HomOp<N> {
    type Output = HomId<N>;

    fn eval(&self, mgr: &Manager) -> HomId<N> {
        match *self {
            HomOp::Sum(a, b) => mgr.hom_union(a, b),
            HomOp::Compose(a, b) => mgr.compose(a, b),
            HomOp::Inter(a, b) => mgr.hom_intersection(a, b),
            HomOp::Difference(a, b) => mgr.hom_difference(a, b),
        }
    }
}

impl<N: Diagram> Eval for ApplyOp<N> {
    type Output = N;

    fn eval(&self, mgr: &Manager) -> N {
        mgr.apply(self.hom, self.node)
    }
}
