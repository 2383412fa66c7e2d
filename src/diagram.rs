//! The two node kinds seen through a single interface.
//!
//! The homomorphism algebra ([`hom`](crate::hom)) is written once, generic
//! over [`Diagram`], and instantiated for flat ([`Ddd`]) and hierarchical
//! ([`Sdd`]) diagrams. The trait only exposes what the algebra needs: node
//! inspection, canonical reconstruction, the set operators, and access to the
//! per-kind homomorphism store and evaluation cache.

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use num_bigint::BigUint;

use crate::cache::Cache;
use crate::hom::HomStore;
use crate::label::Label;
use crate::manager::Manager;
use crate::reference::{Ddd, Handle, Hom, HomId, Sdd};
use crate::sync::Lock;
use crate::types::Var;

pub trait Diagram: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {
    /// What an arc carries: a single value, or a set of values.
    type Value: Clone + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static;

    const NULL: Self;
    const ONE: Self;
    const TOP: Self;

    fn is_terminal(self) -> bool;

    fn variable(mgr: &Manager, d: Self) -> Var;
    fn arcs(mgr: &Manager, d: Self) -> Arc<[(Self::Value, Self)]>;

    /// Single-arc node `var = value -> succ`.
    fn single(mgr: &Manager, var: Var, value: Self::Value, succ: Self) -> Self;

    /// Node from arcs whose values come from an existing canonical node, with
    /// possibly new successors (some may be `null`, some may coincide).
    fn rebuild(mgr: &Manager, var: Var, arcs: Vec<(Self::Value, Self)>) -> Self;

    fn union_all(mgr: &Manager, operands: Vec<Self>) -> Self;
    fn intersection(mgr: &Manager, a: Self, b: Self) -> Self;
    fn difference(mgr: &Manager, a: Self, b: Self) -> Self;
    fn concat(mgr: &Manager, a: Self, b: Self) -> Self;
    fn nb_states(mgr: &Manager, d: Self) -> BigUint;

    /// Apply a flat homomorphism to the flat diagram stored in an arc value.
    fn map_value(mgr: &Manager, value: &Self::Value, hom: Hom) -> Self::Value;

    fn handle(d: Self) -> Handle;
    fn hom_handle(h: HomId<Self>) -> Handle;
    /// Objects referenced from inside an arc value.
    fn value_handles(value: &Self::Value) -> Vec<Handle>;

    fn hom_store(mgr: &Manager) -> &HomStore<Self>;
    fn eval_cache(mgr: &Manager) -> &Lock<Cache<(HomId<Self>, Self), Self>>;
}

impl Diagram for Ddd {
    type Value = crate::types::Val;

    const NULL: Self = Ddd::NULL;
    const ONE: Self = Ddd::ONE;
    const TOP: Self = Ddd::TOP;

    fn is_terminal(self) -> bool {
        Ddd::is_terminal(self)
    }

    fn variable(mgr: &Manager, d: Self) -> Var {
        mgr.ddd_variable(d)
    }

    fn arcs(mgr: &Manager, d: Self) -> Arc<[(Self::Value, Self)]> {
        mgr.ddd_arcs(d)
    }

    fn single(mgr: &Manager, var: Var, value: Self::Value, succ: Self) -> Self {
        mgr.ddd(var, value, succ)
    }

    fn rebuild(mgr: &Manager, var: Var, arcs: Vec<(Self::Value, Self)>) -> Self {
        mgr.mk_ddd(var, arcs)
    }

    fn union_all(mgr: &Manager, operands: Vec<Self>) -> Self {
        mgr.ddd_union_all(operands)
    }

    fn intersection(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.ddd_intersection(a, b)
    }

    fn difference(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.ddd_difference(a, b)
    }

    fn concat(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.ddd_concat(a, b)
    }

    fn nb_states(mgr: &Manager, d: Self) -> BigUint {
        mgr.ddd_nb_states(d)
    }

    fn map_value(_mgr: &Manager, value: &Self::Value, hom: Hom) -> Self::Value {
        panic!("Cannot apply {} to the integer value {} of a flat arc", hom, value)
    }

    fn handle(d: Self) -> Handle {
        Handle::Ddd(d)
    }

    fn hom_handle(h: HomId<Self>) -> Handle {
        Handle::Hom(h)
    }

    fn value_handles(_value: &Self::Value) -> Vec<Handle> {
        Vec::new()
    }

    fn hom_store(mgr: &Manager) -> &HomStore<Self> {
        &mgr.homs
    }

    fn eval_cache(mgr: &Manager) -> &Lock<Cache<(HomId<Self>, Self), Self>> {
        &mgr.hom_cache
    }
}

impl Diagram for Sdd {
    type Value = Label;

    const NULL: Self = Sdd::NULL;
    const ONE: Self = Sdd::ONE;
    const TOP: Self = Sdd::TOP;

    fn is_terminal(self) -> bool {
        Sdd::is_terminal(self)
    }

    fn variable(mgr: &Manager, d: Self) -> Var {
        mgr.sdd_variable(d)
    }

    fn arcs(mgr: &Manager, d: Self) -> Arc<[(Self::Value, Self)]> {
        mgr.sdd_arcs(d)
    }

    fn single(mgr: &Manager, var: Var, value: Self::Value, succ: Self) -> Self {
        mgr.sdd(var, value, succ)
    }

    fn rebuild(mgr: &Manager, var: Var, arcs: Vec<(Self::Value, Self)>) -> Self {
        mgr.mk_sdd(var, arcs)
    }

    fn union_all(mgr: &Manager, operands: Vec<Self>) -> Self {
        mgr.sdd_union_all(operands)
    }

    fn intersection(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.sdd_intersection(a, b)
    }

    fn difference(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.sdd_difference(a, b)
    }

    fn concat(mgr: &Manager, a: Self, b: Self) -> Self {
        mgr.sdd_concat(a, b)
    }

    fn nb_states(mgr: &Manager, d: Self) -> BigUint {
        mgr.sdd_nb_states(d)
    }

    fn map_value(mgr: &Manager, value: &Self::Value, hom: Hom) -> Self::Value {
        match value {
            Label::Ddd(d) => Label::Ddd(mgr.apply(hom, *d)),
            other => panic!("Cannot apply {} to the non-flat label {}", hom, other),
        }
    }

    fn handle(d: Self) -> Handle {
        Handle::Sdd(d)
    }

    fn hom_handle(h: HomId<Self>) -> Handle {
        Handle::SHom(h)
    }

    fn value_handles(value: &Self::Value) -> Vec<Handle> {
        match value {
            Label::Ints(_) => Vec::new(),
            Label::Ddd(d) => vec![Handle::Ddd(*d)],
            Label::Sdd(s) => vec![Handle::Sdd(*s)],
        }
    }

    fn hom_store(mgr: &Manager) -> &HomStore<Self> {
        &mgr.shoms
    }

    fn eval_cache(mgr: &Manager) -> &Lock<Cache<(HomId<Self>, Self), Self>> {
        &mgr.shom_cache
    }
}
