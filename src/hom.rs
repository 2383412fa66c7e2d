//! Homomorphisms: canonical, hash-consed functions over diagrams.
//!
//! A homomorphism `h` maps a diagram to a diagram and distributes over union:
//! `h(a ∪ b) = h(a) ∪ h(b)`. Homomorphisms are built from a small set of
//! combinators ([`HomNode`]) plus user-defined state homomorphisms
//! ([`StateHom`]), and stored in a per-kind table just like nodes, so that two
//! structurally equal homomorphisms share one [`HomId`].
//!
//! Construction normalizes: identities are absorbed by composition, sums are
//! flattened and sorted, selectors and homomorphisms acting on disjoint
//! variables are composed through the commutative [`HomNode::And`], and so on.
//!
//! # Evaluation
//!
//! [`Manager::apply`] evaluates `h` on `d`:
//!
//! 1. `h(null) = null`; identity and constants answer immediately;
//!    `h(top) = top`.
//! 2. The evaluation cache is consulted with the key `(h, d)`.
//! 3. If `h` skips the variable of `d`, it is pushed to the successors and
//!    the node is rebuilt with its own variable and values.
//! 4. Otherwise the combinator's rule is applied.
//!
//! A fixpoint over `id + F + G`, where every homomorphism in `F` skips the
//! current variable, is evaluated by *saturation*: `(id + F)*` is pushed to
//! the successors first, and each step of `G` is followed by saturating again.
//!
//! # Example
//!
//! ```
//! use ddd_rs::manager::Manager;
//! use ddd_rs::reference::{Ddd, Hom};
//!
//! let mgr = Manager::new();
//! let d = mgr.ddd(0, 1, Ddd::ONE);
//!
//! // x0 = 1 -> x1 = 7 -> one
//! let id: Hom = mgr.identity();
//! let h = mgr.right_concat(id, mgr.ddd(1, 7, Ddd::ONE));
//! assert_eq!(mgr.apply(h, d), mgr.ddd_path(&[(0, 1), (1, 7)]));
//! ```

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::once;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::diagram::Diagram;
use crate::manager::{Manager, TableStats, HOM_PINNED};
use crate::reference::{Ddd, Handle, Hom, HomId, SHom};
use crate::sync::Lock;
use crate::table::UniqueTable;
use crate::types::{is_user_var, Range, Var};

/// Misuse of the homomorphism algebra by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HomError {
    #[error("homomorphism {hom} is not a selector")]
    NotASelector { hom: String },
    #[error("homomorphism {hom} cannot be inverted")]
    NotInvertible { hom: String },
}

// ---- user extension ------------------------------------------------------

/// A user-defined homomorphism, given by its action on each arc.
///
/// Applied to a node of variable `var`, the homomorphism evaluates to the
/// union, over every arc `(value, succ)`, of `phi(var, value)(succ)`.
/// Applied to `one`, it evaluates to `phi_one`.
///
/// Implementors also derive `Eq` and `Hash`: two state homomorphisms equal
/// under those are the same homomorphism.
///
/// [`references`](StateHom::references) must list every diagram or
/// homomorphism held inside `self`, so that the collector keeps them alive.
/// It is called while the tables are locked and must not use the manager.
pub trait StateHom<N: Diagram>: fmt::Debug + Send + Sync + 'static {
    fn phi(&self, mgr: &Manager, var: Var, value: &N::Value) -> HomId<N>;

    fn phi_one(&self, _mgr: &Manager) -> N {
        N::TOP
    }

    fn skip_variable(&self, _var: Var) -> bool {
        false
    }

    fn range(&self) -> Range {
        Range::Full
    }

    fn is_selector(&self) -> bool {
        false
    }

    /// Predecessor relation, restricted to `universe` if needed.
    fn invert(&self, _mgr: &Manager, _universe: N) -> Option<HomId<N>> {
        None
    }

    fn references(&self) -> Vec<Handle> {
        Vec::new()
    }
}

/// Object-safe equality and hashing for state homomorphisms.
pub trait DynStateHom<N: Diagram>: StateHom<N> {
    fn dyn_eq(&self, other: &dyn DynStateHom<N>) -> bool;
    fn dyn_hash(&self) -> u64;
    fn as_any(&self) -> &dyn Any;
}

impl<N, T> DynStateHom<N> for T
where
    N: Diagram,
    T: StateHom<N> + Eq + Hash,
{
    fn dyn_eq(&self, other: &dyn DynStateHom<N>) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn dyn_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
        hasher.finish()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
pub struct UserHom<N: Diagram>(pub(crate) Arc<dyn DynStateHom<N>>);

impl<N: Diagram> PartialEq for UserHom<N> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.dyn_eq(other.0.as_ref())
    }
}

impl<N: Diagram> Eq for UserHom<N> {}

impl<N: Diagram> Hash for UserHom<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.dyn_hash());
    }
}

impl<N: Diagram> fmt::Debug for UserHom<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---- nodes ---------------------------------------------------------------

/// A homomorphism, as stored in the homomorphism table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HomNode<N: Diagram> {
    Identity,
    Constant(N),
    /// `x ↦ (var = value) . next(x)`
    Prefix {
        var: Var,
        value: N::Value,
        next: HomId<N>,
    },
    /// `x ↦ left ^ hom(x)`
    LeftConcat { left: N, hom: HomId<N> },
    /// `x ↦ hom(x) ^ right`
    RightConcat { hom: HomId<N>, right: N },
    /// `x ↦ outer(inner(x))`
    Compose { outer: HomId<N>, inner: HomId<N> },
    /// Union, operands ordered by creation serial.
    Sum(Box<[HomId<N>]>),
    /// Composition of pairwise commuting homomorphisms.
    And(Box<[HomId<N>]>),
    /// Intersection of the images.
    Inter(Box<[HomId<N>]>),
    /// `x ↦ hom(x) ∩ filter`
    Select { hom: HomId<N>, filter: N },
    /// `x ↦ hom(x) - node`
    Minus { hom: HomId<N>, node: N },
    /// `x ↦ left(x) - right(x)`
    Difference { left: HomId<N>, right: HomId<N> },
    /// `x ↦ x - sel(x)`, for a selector `sel`.
    Not(HomId<N>),
    Fixpoint(HomId<N>),
    /// Apply a flat homomorphism to the flat-diagram labels of `var`.
    ///
    /// Built only by [`Manager::local`], so it only occurs in hierarchical
    /// homomorphisms. It lives in the shared enum to keep one store type.
    Local { var: Var, hom: Hom },
    User(UserHom<N>),
}

impl<N: Diagram> HomNode<N> {
    /// Objects this homomorphism keeps alive.
    pub(crate) fn children(&self) -> Vec<Handle> {
        match self {
            HomNode::Identity => Vec::new(),
            HomNode::Constant(c) => vec![N::handle(*c)],
            HomNode::Prefix { value, next, .. } => {
                let mut res = N::value_handles(value);
                res.push(N::hom_handle(*next));
                res
            }
            HomNode::LeftConcat { left: d, hom } | HomNode::RightConcat { hom, right: d } => {
                vec![N::handle(*d), N::hom_handle(*hom)]
            }
            HomNode::Compose { outer: a, inner: b } | HomNode::Difference { left: a, right: b } => {
                vec![N::hom_handle(*a), N::hom_handle(*b)]
            }
            HomNode::Sum(hs) | HomNode::And(hs) | HomNode::Inter(hs) => hs.iter().map(|&h| N::hom_handle(h)).collect(),
            HomNode::Select { hom, filter: d } | HomNode::Minus { hom, node: d } => {
                vec![N::hom_handle(*hom), N::handle(*d)]
            }
            HomNode::Not(h) | HomNode::Fixpoint(h) => vec![N::hom_handle(*h)],
            HomNode::Local { hom, .. } => vec![Handle::Hom(*hom)],
            HomNode::User(u) => u.0.references(),
        }
    }
}

/// Table entry: the node plus flags computed once at creation.
///
/// Equality and hashing only look at the node.
pub(crate) struct HomEntry<N: Diagram> {
    pub(crate) node: Arc<HomNode<N>>,
    serial: u64,
    selector: bool,
    range: Range,
}

impl<N: Diagram> PartialEq for HomEntry<N> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}

impl<N: Diagram> Eq for HomEntry<N> {}

impl<N: Diagram> Hash for HomEntry<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

/// Homomorphism table of one diagram kind.
pub struct HomStore<N: Diagram> {
    pub(crate) table: Lock<UniqueTable<HomEntry<N>>>,
    serial: AtomicU64,
}

impl<N: Diagram> HomStore<N> {
    pub(crate) fn new(bits: usize) -> Self {
        Self {
            table: Lock::new(UniqueTable::new(bits, HOM_PINNED)),
            serial: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn stats(&self) -> TableStats {
        let table = self.table.read();
        TableStats {
            live: table.len(),
            peak: table.peak(),
        }
    }
}

// ---- inspection ----------------------------------------------------------

impl Manager {
    fn intern_hom<N: Diagram>(&self, node: HomNode<N>) -> HomId<N> {
        let store = N::hom_store(self);
        let (selector, range) = self.hom_flags(&node);
        let entry = HomEntry {
            node: Arc::new(node),
            serial: store.serial.fetch_add(1, Ordering::Relaxed),
            selector,
            range,
        };
        if let Some(index) = store.table.read().lookup(&entry) {
            return HomId::new(index);
        }
        HomId::new(store.table.write().put(entry))
    }

    /// The combinator a homomorphism is made of.
    pub fn hom_node<N: Diagram>(&self, h: HomId<N>) -> Arc<HomNode<N>> {
        N::hom_store(self).table.read().get(h.raw()).node.clone()
    }

    /// Creation serial: the reproducible order between homomorphisms.
    pub fn hom_serial<N: Diagram>(&self, h: HomId<N>) -> u64 {
        N::hom_store(self).table.read().get(h.raw()).serial
    }

    /// `true` if `h(x) ⊆ x` for every `x`.
    pub fn is_selector<N: Diagram>(&self, h: HomId<N>) -> bool {
        N::hom_store(self).table.read().get(h.raw()).selector
    }

    /// Variables `h` may read or modify.
    pub fn hom_range<N: Diagram>(&self, h: HomId<N>) -> Range {
        N::hom_store(self).table.read().get(h.raw()).range.clone()
    }

    fn hom_flags<N: Diagram>(&self, node: &HomNode<N>) -> (bool, Range) {
        let all = |hs: &[HomId<N>]| hs.iter().all(|&h| self.is_selector(h));
        let ranges = |hs: &[HomId<N>]| {
            hs.iter()
                .fold(Range::empty(), |acc, &h| acc.union(&self.hom_range(h)))
        };
        match node {
            HomNode::Identity => (true, Range::empty()),
            HomNode::Constant(c) => (*c == N::NULL, Range::Full),
            HomNode::Prefix { .. } | HomNode::LeftConcat { .. } | HomNode::RightConcat { .. } => (false, Range::Full),
            HomNode::Compose { outer, inner } => (all(&[*outer, *inner]), ranges(&[*outer, *inner])),
            HomNode::Sum(hs) | HomNode::And(hs) => (all(&hs[..]), ranges(&hs[..])),
            HomNode::Inter(hs) => (hs.iter().any(|&h| self.is_selector(h)), ranges(&hs[..])),
            HomNode::Select { hom, .. } | HomNode::Minus { hom, .. } => (self.is_selector(*hom), Range::Full),
            HomNode::Difference { left, right } => (self.is_selector(*left), ranges(&[*left, *right])),
            HomNode::Not(h) => (true, self.hom_range(*h)),
            HomNode::Fixpoint(h) => (self.is_selector(*h), self.hom_range(*h)),
            HomNode::Local { var, hom } => (self.is_selector(*hom), Range::single(*var)),
            HomNode::User(u) => (u.0.is_selector(), u.0.range()),
        }
    }

    /// `true` if `h` acts as the identity on nodes of variable `var`, so that it
    /// can be pushed to their successors.
    pub fn skip_variable<N: Diagram>(&self, h: HomId<N>, var: Var) -> bool {
        match &*self.hom_node(h) {
            HomNode::Identity => true,
            HomNode::Constant(_)
            | HomNode::Prefix { .. }
            | HomNode::LeftConcat { .. }
            | HomNode::RightConcat { .. }
            | HomNode::Select { .. }
            | HomNode::Minus { .. } => false,
            HomNode::Compose { outer: a, inner: b } | HomNode::Difference { left: a, right: b } => {
                self.skip_variable(*a, var) && self.skip_variable(*b, var)
            }
            HomNode::Sum(hs) | HomNode::And(hs) | HomNode::Inter(hs) => hs.iter().all(|&h| self.skip_variable(h, var)),
            HomNode::Not(h) | HomNode::Fixpoint(h) => self.skip_variable(*h, var),
            HomNode::Local { var: own, .. } => *own != var,
            HomNode::User(u) => u.0.skip_variable(var),
        }
    }

    fn sort_by_serial<N: Diagram>(&self, hs: &mut Vec<HomId<N>>) {
        let mut keyed: Vec<(u64, HomId<N>)> = hs.iter().map(|&h| (self.hom_serial(h), h)).collect();
        keyed.sort_unstable_by_key(|&(serial, _)| serial);
        keyed.dedup_by_key(|&mut (serial, _)| serial);
        *hs = keyed.into_iter().map(|(_, h)| h).collect();
    }
}

// ---- combinators ---------------------------------------------------------

impl Manager {
    pub fn identity<N: Diagram>(&self) -> HomId<N> {
        self.intern_hom(HomNode::Identity)
    }

    /// `x ↦ c` (and `null ↦ null`).
    pub fn constant<N: Diagram>(&self, c: N) -> HomId<N> {
        self.intern_hom(HomNode::Constant(c))
    }

    /// `x ↦ (var = value) . next(x)`
    pub fn prefix<N: Diagram>(&self, var: Var, value: N::Value, next: HomId<N>) -> HomId<N> {
        assert!(is_user_var(var), "Variable {} is reserved", var);
        if let HomNode::Constant(c) = &*self.hom_node(next) {
            if *c == N::NULL {
                return next;
            }
        }
        self.intern_hom(HomNode::Prefix { var, value, next })
    }

    /// `x ↦ left ^ hom(x)`
    pub fn left_concat<N: Diagram>(&self, left: N, hom: HomId<N>) -> HomId<N> {
        if left == N::ONE {
            return hom;
        }
        if left == N::NULL {
            return self.constant(N::NULL);
        }
        self.intern_hom(HomNode::LeftConcat { left, hom })
    }

    /// `x ↦ hom(x) ^ right`
    pub fn right_concat<N: Diagram>(&self, hom: HomId<N>, right: N) -> HomId<N> {
        if right == N::ONE {
            return hom;
        }
        if right == N::NULL {
            return self.constant(N::NULL);
        }
        self.intern_hom(HomNode::RightConcat { hom, right })
    }

    /// `x ↦ outer(inner(x))`
    pub fn compose<N: Diagram>(&self, outer: HomId<N>, inner: HomId<N>) -> HomId<N> {
        let null = self.constant(N::NULL);
        match (&*self.hom_node(outer), &*self.hom_node(inner)) {
            (HomNode::Identity, _) => return inner,
            (_, HomNode::Identity) => return outer,
            _ => {}
        }
        if outer == null || inner == null {
            return null;
        }
        if self.is_selector(outer) && self.is_selector(inner) {
            debug!("compose({}, {}): selectors commute", outer, inner);
            return self.hom_and([outer, inner]);
        }
        if self.hom_range(outer).is_disjoint(&self.hom_range(inner)) {
            debug!("compose({}, {}): disjoint ranges commute", outer, inner);
            return self.hom_and([outer, inner]);
        }
        self.intern_hom(HomNode::Compose { outer, inner })
    }

    /// Composition of homomorphisms known to commute pairwise.
    pub fn hom_and<N: Diagram>(&self, hs: impl IntoIterator<Item = HomId<N>>) -> HomId<N> {
        let null = self.constant(N::NULL);
        let mut stack: Vec<HomId<N>> = hs.into_iter().collect();
        let mut parts = Vec::with_capacity(stack.len());
        while let Some(h) = stack.pop() {
            if h == null {
                return null;
            }
            match &*self.hom_node(h) {
                HomNode::Identity => {}
                HomNode::And(inner) => stack.extend(inner.iter().copied()),
                _ => parts.push(h),
            }
        }
        self.sort_by_serial(&mut parts);
        match parts.len() {
            0 => self.identity(),
            1 => parts[0],
            _ => self.intern_hom(HomNode::And(parts.into())),
        }
    }

    /// `x ↦ h1(x) ∪ h2(x) ∪ ...`
    pub fn sum<N: Diagram>(&self, hs: impl IntoIterator<Item = HomId<N>>) -> HomId<N> {
        let mut stack: Vec<HomId<N>> = hs.into_iter().collect();
        let mut parts = Vec::with_capacity(stack.len());
        let mut constants = Vec::new();
        while let Some(h) = stack.pop() {
            match &*self.hom_node(h) {
                HomNode::Sum(inner) => stack.extend(inner.iter().copied()),
                HomNode::Constant(c) => constants.push(*c),
                _ => parts.push(h),
            }
        }
        if !constants.is_empty() {
            let c = N::union_all(self, constants);
            if c != N::NULL {
                parts.push(self.constant(c));
            }
        }
        self.sort_by_serial(&mut parts);
        match parts.len() {
            0 => self.constant(N::NULL),
            1 => parts[0],
            _ => self.intern_hom(HomNode::Sum(parts.into())),
        }
    }

    pub fn hom_union<N: Diagram>(&self, a: HomId<N>, b: HomId<N>) -> HomId<N> {
        self.sum([a, b])
    }

    /// `x ↦ a(x) ∩ b(x)`
    pub fn hom_intersection<N: Diagram>(&self, a: HomId<N>, b: HomId<N>) -> HomId<N> {
        if a == b {
            return a;
        }
        let null = self.constant(N::NULL);
        if a == null || b == null {
            return null;
        }
        if self.is_selector(a) && self.is_selector(b) {
            return self.hom_and([a, b]);
        }
        let mut parts = Vec::new();
        for h in [a, b] {
            match &*self.hom_node(h) {
                HomNode::Inter(inner) => parts.extend(inner.iter().copied()),
                _ => parts.push(h),
            }
        }
        self.sort_by_serial(&mut parts);
        self.intern_hom(HomNode::Inter(parts.into()))
    }

    /// `x ↦ hom(x) ∩ filter`
    pub fn select<N: Diagram>(&self, hom: HomId<N>, filter: N) -> HomId<N> {
        if filter == N::NULL {
            return self.constant(N::NULL);
        }
        self.intern_hom(HomNode::Select { hom, filter })
    }

    /// `x ↦ hom(x) - node`
    pub fn minus<N: Diagram>(&self, hom: HomId<N>, node: N) -> HomId<N> {
        if node == N::NULL {
            return hom;
        }
        self.intern_hom(HomNode::Minus { hom, node })
    }

    /// `x ↦ left(x) - right(x)`
    pub fn hom_difference<N: Diagram>(&self, left: HomId<N>, right: HomId<N>) -> HomId<N> {
        let null = self.constant(N::NULL);
        if left == right || left == null {
            return null;
        }
        if right == null {
            return left;
        }
        self.intern_hom(HomNode::Difference { left, right })
    }

    /// Complement of a selector: `x ↦ x - sel(x)`.
    pub fn negate<N: Diagram>(&self, sel: HomId<N>) -> Result<HomId<N>, HomError> {
        if !self.is_selector(sel) {
            return Err(HomError::NotASelector {
                hom: self.hom_to_string(sel),
            });
        }
        let null = self.constant(N::NULL);
        if sel == null {
            return Ok(self.identity());
        }
        match &*self.hom_node(sel) {
            HomNode::Not(h) => Ok(*h),
            HomNode::Identity => Ok(null),
            _ => Ok(self.intern_hom(HomNode::Not(sel))),
        }
    }

    /// Least fixpoint of `h` from the argument: `h` is applied until the result is stable.
    pub fn fixpoint<N: Diagram>(&self, h: HomId<N>) -> HomId<N> {
        match &*self.hom_node(h) {
            HomNode::Fixpoint(_) | HomNode::Identity | HomNode::Constant(_) => h,
            _ => self.intern_hom(HomNode::Fixpoint(h)),
        }
    }

    /// `x ↦ then(cond(x)) ∪ otherwise(x - cond(x))`, for a selector `cond`.
    pub fn ite<N: Diagram>(&self, cond: HomId<N>, then: HomId<N>, otherwise: HomId<N>) -> Result<HomId<N>, HomError> {
        let not_cond = self.negate(cond)?;
        Ok(self.sum([self.compose(then, cond), self.compose(otherwise, not_cond)]))
    }

    /// Predecessor homomorphism of `h`, within `universe`.
    ///
    /// Selectors are their own inverse. Composition, sum, commutative
    /// composition and fixpoint are inverted piecewise; state homomorphisms
    /// through [`StateHom::invert`].
    pub fn invert<N: Diagram>(&self, h: HomId<N>, universe: N) -> Result<HomId<N>, HomError> {
        if self.is_selector(h) {
            return Ok(h);
        }
        let not_invertible = || HomError::NotInvertible {
            hom: self.hom_to_string(h),
        };
        match &*self.hom_node(h) {
            HomNode::Compose { outer, inner } => {
                let outer = self.invert(*outer, universe)?;
                let inner = self.invert(*inner, universe)?;
                Ok(self.compose(inner, outer))
            }
            HomNode::Sum(hs) => {
                let parts = hs
                    .iter()
                    .map(|&x| self.invert(x, universe))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.sum(parts))
            }
            HomNode::And(hs) => {
                let parts = hs
                    .iter()
                    .map(|&x| self.invert(x, universe))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.hom_and(parts))
            }
            HomNode::Fixpoint(x) => Ok(self.fixpoint(self.invert(*x, universe)?)),
            HomNode::Local { var, hom } => {
                let inner = self.invert(*hom, Ddd::TOP)?;
                if let HomNode::Identity = &*self.hom_node(inner) {
                    return Ok(self.identity());
                }
                Ok(self.intern_hom(HomNode::Local { var: *var, hom: inner }))
            }
            HomNode::User(u) => u.0.invert(self, universe).ok_or_else(not_invertible),
            _ => Err(not_invertible()),
        }
    }

    /// Register a user-defined homomorphism.
    pub fn state_hom<N, T>(&self, hom: T) -> HomId<N>
    where
        N: Diagram,
        T: StateHom<N> + Eq + Hash,
    {
        self.intern_hom(HomNode::User(UserHom(Arc::new(hom))))
    }

    /// Hierarchical homomorphism applying the flat `hom` to the labels of `var`.
    pub fn local(&self, var: Var, hom: Hom) -> SHom {
        assert!(is_user_var(var), "Variable {} is reserved", var);
        if let HomNode::Identity = &*self.hom_node(hom) {
            return self.identity();
        }
        self.intern_hom(HomNode::Local { var, hom })
    }
}

// ---- evaluation ----------------------------------------------------------

impl Manager {
    /// Evaluate `h` on `d`.
    pub fn apply<N: Diagram>(&self, h: HomId<N>, d: N) -> N {
        // A new outermost evaluation starts uninterrupted.
        if !self.is_evaluating() {
            self.clear_interrupted();
        }
        if d == N::NULL {
            return N::NULL;
        }
        let node = self.hom_node(h);
        match &*node {
            HomNode::Identity => return d,
            HomNode::Constant(c) => return *c,
            _ => {}
        }
        if d == N::TOP {
            return N::TOP;
        }

        let key = (h, d);
        if let Some(res) = N::eval_cache(self).read().get(&key) {
            return res;
        }

        let _guard = self.enter_eval();
        let res = if !d.is_terminal() && self.skip_variable(h, N::variable(self, d)) {
            let var = N::variable(self, d);
            let arcs = N::arcs(self, d)
                .iter()
                .map(|(value, succ)| (value.clone(), self.apply(h, *succ)))
                .collect();
            N::rebuild(self, var, arcs)
        } else {
            self.eval_hom(&node, d)
        };
        debug!("apply({}, {}) = {}", h, d, res);

        if !self.was_interrupted() {
            N::eval_cache(self).write().insert(key, res);
        }
        res
    }

    fn eval_hom<N: Diagram>(&self, node: &HomNode<N>, d: N) -> N {
        match node {
            HomNode::Identity => d,
            HomNode::Constant(c) => *c,
            HomNode::Prefix { var, value, next } => N::single(self, *var, value.clone(), self.apply(*next, d)),
            HomNode::LeftConcat { left, hom } => N::concat(self, *left, self.apply(*hom, d)),
            HomNode::RightConcat { hom, right } => N::concat(self, self.apply(*hom, d), *right),
            HomNode::Compose { outer, inner } => self.apply(*outer, self.apply(*inner, d)),
            HomNode::Sum(hs) => {
                let images = hs.iter().map(|&h| self.apply(h, d)).collect();
                N::union_all(self, images)
            }
            HomNode::And(hs) => hs.iter().fold(d, |acc, &h| self.apply(h, acc)),
            HomNode::Inter(hs) => {
                let mut res = self.apply(hs[0], d);
                for &h in &hs[1..] {
                    res = N::intersection(self, res, self.apply(h, d));
                }
                res
            }
            HomNode::Select { hom, filter } => N::intersection(self, self.apply(*hom, d), *filter),
            HomNode::Minus { hom, node } => N::difference(self, self.apply(*hom, d), *node),
            HomNode::Difference { left, right } => N::difference(self, self.apply(*left, d), self.apply(*right, d)),
            HomNode::Not(sel) => N::difference(self, d, self.apply(*sel, d)),
            HomNode::Fixpoint(h) => self.eval_fixpoint(*h, d),
            HomNode::Local { var, hom } => {
                if d == N::ONE {
                    warn!("local({}, {}) reached one without meeting its variable, answering top", var, hom);
                    return N::TOP;
                }
                debug_assert_eq!(N::variable(self, d), *var);
                let nodes = N::arcs(self, d)
                    .iter()
                    .map(|(value, succ)| N::single(self, *var, N::map_value(self, value, *hom), *succ))
                    .collect();
                N::union_all(self, nodes)
            }
            HomNode::User(u) => {
                if d == N::ONE {
                    return u.0.phi_one(self);
                }
                let var = N::variable(self, d);
                let images = N::arcs(self, d)
                    .iter()
                    .map(|(value, succ)| self.apply(u.0.phi(self, var, value), *succ))
                    .collect();
                N::union_all(self, images)
            }
        }
    }

    fn eval_fixpoint<N: Diagram>(&self, h: HomId<N>, d: N) -> N {
        if !d.is_terminal() {
            if let HomNode::Sum(parts) = &*self.hom_node(h) {
                let id = self.identity();
                if parts.contains(&id) {
                    let var = N::variable(self, d);
                    let (local, global): (Vec<_>, Vec<_>) = parts
                        .iter()
                        .copied()
                        .filter(|&p| p != id)
                        .partition(|&p| self.skip_variable(p, var));
                    if !local.is_empty() {
                        return self.saturate(local, global, d);
                    }
                }
            }
        }

        let mut d = d;
        let mut iteration = 0;
        loop {
            let next = self.apply(h, d);
            if next == d {
                return d;
            }
            d = next;
            iteration += 1;
            if self.check_interrupt(iteration) {
                return d;
            }
        }
    }

    /// Fixpoint of `id + local + global`, where every `local` skips the variable of `d`.
    fn saturate<N: Diagram>(&self, local: Vec<HomId<N>>, global: Vec<HomId<N>>, d: N) -> N {
        debug!("saturate({} local, {} global, {})", local.len(), global.len(), d);

        let id = self.identity();
        let inner = self.fixpoint(self.sum(once(id).chain(local)));

        let mut d = d;
        let mut iteration = 0;
        loop {
            let mut next = self.apply(inner, d);
            for &g in &global {
                next = N::union_all(self, vec![next, self.apply(g, next)]);
                next = self.apply(inner, next);
            }
            if next == d {
                return d;
            }
            d = next;
            iteration += 1;
            if self.check_interrupt(iteration) {
                return d;
            }
        }
    }
}

/// Flat-only shorthands.
impl Manager {
    /// `x ↦ (var = val) . x`
    pub fn hom_ddd_prefix(&self, var: Var, val: crate::types::Val) -> Hom {
        self.prefix(var, val, self.identity())
    }

    /// Hierarchical `x ↦ (var ∈ label) . x`
    pub fn hom_sdd_prefix(&self, var: Var, label: impl Into<crate::label::Label>) -> SHom {
        self.prefix(var, label.into(), self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use num_bigint::BigUint;
    use test_log::test;

    use crate::label::Label;
    use crate::reference::Sdd;
    use crate::types::Val;

    /// Increments `var` up to `max`.
    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Inc {
        var: Var,
        max: Val,
    }

    impl StateHom<Ddd> for Inc {
        fn phi(&self, mgr: &Manager, var: Var, value: &Val) -> Hom {
            if *value < self.max {
                mgr.hom_ddd_prefix(var, value + 1)
            } else {
                mgr.constant(Ddd::NULL)
            }
        }

        fn skip_variable(&self, var: Var) -> bool {
            var != self.var
        }

        fn range(&self) -> Range {
            Range::single(self.var)
        }
    }

    /// Keeps paths where `var` is even.
    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Even(Var);

    impl StateHom<Ddd> for Even {
        fn phi(&self, mgr: &Manager, var: Var, value: &Val) -> Hom {
            if value % 2 == 0 {
                mgr.hom_ddd_prefix(var, *value)
            } else {
                mgr.constant(Ddd::NULL)
            }
        }

        fn skip_variable(&self, var: Var) -> bool {
            var != self.0
        }

        fn range(&self) -> Range {
            Range::single(self.0)
        }

        fn is_selector(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_hom_canonical() {
        let mgr = Manager::new();
        let a: Hom = mgr.state_hom(Inc { var: 1, max: 3 });
        let b: Hom = mgr.state_hom(Inc { var: 1, max: 3 });
        let c: Hom = mgr.state_hom(Inc { var: 2, max: 3 });
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(mgr.identity::<Ddd>(), mgr.identity::<Ddd>());
    }

    #[test]
    fn test_compose_identity() {
        let mgr = Manager::new();
        let id: Hom = mgr.identity();
        let h = mgr.state_hom(Inc { var: 0, max: 3 });
        assert_eq!(mgr.compose(id, h), h);
        assert_eq!(mgr.compose(h, id), h);
        let null = mgr.constant(Ddd::NULL);
        assert_eq!(mgr.compose(null, h), null);
        assert_eq!(mgr.compose(h, null), null);
    }

    #[test]
    fn test_compose_disjoint_commutes() {
        let mgr = Manager::new();
        let a = mgr.state_hom(Inc { var: 0, max: 3 });
        let b = mgr.state_hom(Inc { var: 1, max: 3 });
        assert_eq!(mgr.compose(a, b), mgr.compose(b, a));
        assert!(matches!(&*mgr.hom_node(mgr.compose(a, b)), HomNode::And(_)));

        let c = mgr.state_hom(Inc { var: 0, max: 5 });
        assert_ne!(mgr.compose(a, c), mgr.compose(c, a));
    }

    #[test]
    fn test_sum_normalization() {
        let mgr = Manager::new();
        let a = mgr.state_hom(Inc { var: 0, max: 3 });
        let b = mgr.state_hom(Inc { var: 1, max: 3 });
        let null = mgr.constant(Ddd::NULL);
        assert_eq!(mgr.sum([a, b]), mgr.sum([b, a]));
        assert_eq!(mgr.sum([a, mgr.sum([b, a])]), mgr.sum([a, b]));
        assert_eq!(mgr.sum([a, null]), a);
        assert_eq!(mgr.sum::<Ddd>([]), null);

        let x = mgr.ddd(0, 1, Ddd::ONE);
        let y = mgr.ddd(0, 2, Ddd::ONE);
        let merged = mgr.sum([mgr.constant(x), mgr.constant(y)]);
        assert_eq!(merged, mgr.constant(mgr.ddd_union(x, y)));
    }

    #[test]
    fn test_apply_user() {
        let mgr = Manager::new();
        let d = mgr.ddd_path(&[(0, 0), (1, 0)]);
        let h = mgr.state_hom(Inc { var: 1, max: 2 });
        assert_eq!(mgr.apply(h, d), mgr.ddd_path(&[(0, 0), (1, 1)]));
        assert_eq!(mgr.apply(h, Ddd::NULL), Ddd::NULL);
        assert_eq!(mgr.apply(h, Ddd::TOP), Ddd::TOP);

        let stuck = mgr.ddd_path(&[(0, 0), (1, 2)]);
        assert_eq!(mgr.apply(h, stuck), Ddd::NULL);
    }

    #[test]
    fn test_apply_one_defaults_to_top() {
        let mgr = Manager::new();
        let h = mgr.state_hom(Inc { var: 1, max: 2 });
        assert_eq!(mgr.apply(h, Ddd::ONE), Ddd::TOP);
    }

    #[test]
    fn test_fixpoint_single_counter() {
        let mgr = Manager::new();
        let d = mgr.ddd_path(&[(0, 0), (1, 0)]);
        let h = mgr.state_hom(Inc { var: 1, max: 2 });
        let fix = mgr.fixpoint(mgr.sum([mgr.identity(), h]));
        let res = mgr.apply(fix, d);
        assert_eq!(mgr.ddd_nb_states(res), BigUint::from(3u32));
        assert_eq!(mgr.apply(fix, res), res);
    }

    #[test]
    fn test_saturation_two_counters() {
        let mgr = Manager::new();
        let d = mgr.ddd_path(&[(0, 0), (1, 0)]);
        let a = mgr.state_hom(Inc { var: 0, max: 2 });
        let b = mgr.state_hom(Inc { var: 1, max: 2 });
        let fix = mgr.fixpoint(mgr.sum([mgr.identity(), a, b]));
        let res = mgr.apply(fix, d);
        assert_eq!(mgr.ddd_nb_states(res), BigUint::from(9u32));
    }

    #[test]
    fn test_fixpoint_rewrites() {
        let mgr = Manager::new();
        let h = mgr.sum([mgr.identity(), mgr.state_hom(Inc { var: 0, max: 2 })]);
        let f = mgr.fixpoint(h);
        assert_eq!(mgr.fixpoint(f), f);
        let id: Hom = mgr.identity();
        assert_eq!(mgr.fixpoint(id), id);
        let c = mgr.constant(Ddd::ONE);
        assert_eq!(mgr.fixpoint(c), c);
    }

    #[test]
    fn test_negate() {
        let mgr = Manager::new();
        let even = mgr.state_hom(Even(0));
        assert!(mgr.is_selector(even));
        let odd = mgr.negate(even).unwrap();
        assert_eq!(mgr.negate(odd).unwrap(), even);

        let d = mgr.ddd_from_arcs(0, (0..4).map(|v| (v, Ddd::ONE)));
        assert_eq!(mgr.apply(even, d), mgr.ddd_from_arcs(0, [(0, Ddd::ONE), (2, Ddd::ONE)]));
        assert_eq!(mgr.apply(odd, d), mgr.ddd_from_arcs(0, [(1, Ddd::ONE), (3, Ddd::ONE)]));

        let id: Hom = mgr.identity();
        assert_eq!(mgr.negate(id).unwrap(), mgr.constant(Ddd::NULL));
        assert_eq!(mgr.negate(mgr.constant(Ddd::NULL)).unwrap(), id);
    }

    #[test]
    fn test_negate_non_selector() {
        let mgr = Manager::new();
        let h = mgr.state_hom(Inc { var: 0, max: 2 });
        let err = mgr.negate(h).unwrap_err();
        assert!(matches!(err, HomError::NotASelector { .. }));
        assert!(mgr.ite(h, h, h).is_err());
    }

    #[test]
    fn test_ite() {
        let mgr = Manager::new();
        let even = mgr.state_hom(Even(0));
        let inc = mgr.state_hom(Inc { var: 0, max: 10 });
        let id = mgr.identity();
        // Increment even values, keep odd ones.
        let h = mgr.ite(even, inc, id).unwrap();
        let d = mgr.ddd_from_arcs(0, (0..4).map(|v| (v, Ddd::ONE)));
        let expected = mgr.ddd_from_arcs(0, [(1, Ddd::ONE), (3, Ddd::ONE)]);
        assert_eq!(mgr.apply(h, d), expected);
    }

    #[test]
    fn test_selectors_and() {
        let mgr = Manager::new();
        let e0 = mgr.state_hom(Even(0));
        let e1 = mgr.state_hom(Even(1));
        let both = mgr.hom_intersection(e0, e1);
        assert_eq!(both, mgr.compose(e1, e0));
        assert!(mgr.is_selector(both));
        let d = mgr.ddd_from_arcs(0, [(0, mgr.ddd_from_arcs(1, [(0, Ddd::ONE), (1, Ddd::ONE)])), (1, mgr.ddd(1, 0, Ddd::ONE))]);
        assert_eq!(mgr.apply(both, d), mgr.ddd_path(&[(0, 0), (1, 0)]));
    }

    #[test]
    fn test_concat_homs() {
        let mgr = Manager::new();
        let d = mgr.ddd(1, 5, Ddd::ONE);
        let head = mgr.ddd(0, 1, Ddd::ONE);
        let tail = mgr.ddd(2, 9, Ddd::ONE);
        let id: Hom = mgr.identity();
        assert_eq!(mgr.apply(mgr.left_concat(head, id), d), mgr.ddd_path(&[(0, 1), (1, 5)]));
        assert_eq!(mgr.apply(mgr.right_concat(id, tail), d), mgr.ddd_path(&[(1, 5), (2, 9)]));
        assert_eq!(mgr.left_concat(Ddd::ONE, id), id);
    }

    #[test]
    fn test_select_minus_difference() {
        let mgr = Manager::new();
        let d = mgr.ddd_from_arcs(0, (0..3).map(|v| (v, Ddd::ONE)));
        let id: Hom = mgr.identity();
        let one = mgr.ddd(0, 1, Ddd::ONE);
        assert_eq!(mgr.apply(mgr.select(id, one), d), one);
        assert_eq!(mgr.apply(mgr.minus(id, one), d), mgr.ddd_from_arcs(0, [(0, Ddd::ONE), (2, Ddd::ONE)]));
        let even = mgr.state_hom(Even(0));
        assert_eq!(mgr.apply(mgr.hom_difference(id, even), d), one);
        assert_eq!(mgr.hom_difference(even, even), mgr.constant(Ddd::NULL));
    }

    #[test]
    fn test_invert() {
        let mgr = Manager::new();
        let even = mgr.state_hom(Even(0));
        assert_eq!(mgr.invert(even, Ddd::TOP).unwrap(), even);
        let inc = mgr.state_hom(Inc { var: 0, max: 2 });
        assert!(matches!(mgr.invert(inc, Ddd::TOP), Err(HomError::NotInvertible { .. })));
    }

    /// Adds `step` to `var`; inverted by the opposite step.
    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Add {
        var: Var,
        step: Val,
    }

    impl StateHom<Ddd> for Add {
        fn phi(&self, mgr: &Manager, var: Var, value: &Val) -> Hom {
            mgr.hom_ddd_prefix(var, value + self.step)
        }

        fn skip_variable(&self, var: Var) -> bool {
            var != self.var
        }

        fn range(&self) -> Range {
            Range::single(self.var)
        }

        fn invert(&self, mgr: &Manager, _universe: Ddd) -> Option<Hom> {
            Some(mgr.state_hom(Add {
                var: self.var,
                step: -self.step,
            }))
        }
    }

    fn add(mgr: &Manager, var: Var, step: Val) -> Hom {
        mgr.state_hom(Add { var, step })
    }

    #[test]
    fn test_invert_state_hom() {
        let mgr = Manager::new();
        let d = mgr.ddd_union(mgr.ddd_path(&[(0, 0), (1, 1)]), mgr.ddd_path(&[(0, 4), (1, 2)]));
        let a = add(&mgr, 0, 3);
        let inv = mgr.invert(a, Ddd::TOP).unwrap();
        assert_eq!(inv, add(&mgr, 0, -3));
        assert_eq!(mgr.apply(inv, mgr.apply(a, d)), d);
    }

    #[test]
    fn test_invert_compose() {
        let mgr = Manager::new();
        let d = mgr.ddd_union(mgr.ddd_path(&[(0, 0), (1, 1)]), mgr.ddd_path(&[(0, 4), (1, 2)]));

        // Same variable: a plain composition.
        let ab = mgr.compose(add(&mgr, 0, 3), add(&mgr, 0, -1));
        assert!(matches!(&*mgr.hom_node(ab), HomNode::Compose { .. }));
        let inv = mgr.invert(ab, Ddd::TOP).unwrap();
        assert_eq!(inv, mgr.compose(add(&mgr, 0, 1), add(&mgr, 0, -3)));
        assert_eq!(mgr.apply(inv, mgr.apply(ab, d)), d);

        // Disjoint variables: a commutative composition.
        let both = mgr.compose(add(&mgr, 0, 3), add(&mgr, 1, 2));
        assert!(matches!(&*mgr.hom_node(both), HomNode::And(_)));
        let inv = mgr.invert(both, Ddd::TOP).unwrap();
        assert!(matches!(&*mgr.hom_node(inv), HomNode::And(_)));
        assert_eq!(mgr.apply(inv, mgr.apply(both, d)), d);
    }

    #[test]
    fn test_invert_sum_and_fixpoint() {
        let mgr = Manager::new();
        let d = mgr.ddd_from_arcs(0, [(0, Ddd::ONE), (4, Ddd::ONE)]);
        let sum = mgr.sum([add(&mgr, 0, 1), add(&mgr, 0, 5)]);
        let inv = mgr.invert(sum, Ddd::TOP).unwrap();
        assert_eq!(inv, mgr.sum([add(&mgr, 0, -1), add(&mgr, 0, -5)]));

        // Every source is a predecessor of its images.
        let back = mgr.apply(inv, mgr.apply(sum, d));
        assert_eq!(mgr.ddd_union(back, d), back);

        let id = mgr.identity();
        let fix = mgr.fixpoint(mgr.sum([id, add(&mgr, 0, 1)]));
        let expected = mgr.fixpoint(mgr.sum([id, add(&mgr, 0, -1)]));
        assert_eq!(mgr.invert(fix, Ddd::TOP).unwrap(), expected);
    }

    #[test]
    fn test_invert_local() {
        let mgr = Manager::new();
        let inner = mgr.ddd(0, 2, Ddd::ONE);
        let s = mgr.sdd_path(&[(0, Label::int(7)), (1, Label::Ddd(inner))]);
        let h = mgr.local(1, add(&mgr, 0, 3));
        let inv = mgr.invert(h, Sdd::TOP).unwrap();
        assert_eq!(inv, mgr.local(1, add(&mgr, 0, -3)));
        assert_eq!(mgr.apply(inv, mgr.apply(h, s)), s);
    }

    #[test]
    fn test_intersection_keeps_common_images() {
        let mgr = Manager::new();
        let d = mgr.ddd_from_arcs(0, [(0, Ddd::ONE), (4, Ddd::ONE)]);
        let both = mgr.hom_intersection(add(&mgr, 0, 1), add(&mgr, 0, 5));
        assert!(matches!(&*mgr.hom_node(both), HomNode::Inter(_)));
        assert_eq!(mgr.apply(both, d), mgr.ddd(0, 5, Ddd::ONE));
    }

    #[test]
    fn test_local() {
        let mgr = Manager::new();
        let inner = mgr.ddd(0, 0, Ddd::ONE);
        let s = mgr.sdd_path(&[(0, Label::int(7)), (1, Label::Ddd(inner))]);
        let inc = mgr.state_hom(Inc { var: 0, max: 3 });
        let h = mgr.local(1, inc);
        assert!(mgr.skip_variable(h, 0));
        assert!(!mgr.skip_variable(h, 1));
        let res = mgr.apply(h, s);
        let expected = mgr.sdd_path(&[(0, Label::int(7)), (1, Label::Ddd(mgr.ddd(0, 1, Ddd::ONE)))]);
        assert_eq!(res, expected);
    }

    #[test]
    fn test_sdd_prefix() {
        let mgr = Manager::new();
        let h = mgr.hom_sdd_prefix(0, Label::ints([1, 2]));
        assert_eq!(mgr.apply(h, Sdd::ONE), mgr.sdd(0, Label::ints([1, 2]), Sdd::ONE));
    }

    #[test]
    fn test_interruption() {
        let mgr = Manager::new();
        let d = mgr.ddd(0, 0, Ddd::ONE);
        let h = mgr.state_hom(Inc { var: 0, max: 1000 });
        let fix = mgr.fixpoint(mgr.sum([mgr.identity(), h]));
        mgr.set_observer(|i: usize| i >= 5);
        let partial = mgr.apply(fix, d);
        assert!(mgr.was_interrupted());
        let count = mgr.ddd_nb_states(partial);
        assert!(count < BigUint::from(1001u32));
        assert!(count > BigUint::from(1u32));

        mgr.clear_observer();
        mgr.clear_interrupted();
        let full = mgr.apply(fix, d);
        assert!(!mgr.was_interrupted());
        assert_eq!(mgr.ddd_nb_states(full), BigUint::from(1001u32));
    }

    #[test]
    fn test_interruption_ends_with_evaluation() {
        let mgr = Manager::new();
        let d = mgr.ddd(0, 0, Ddd::ONE);
        let id = mgr.identity();
        let to_ten = mgr.fixpoint(mgr.sum([id, mgr.state_hom(Inc { var: 0, max: 10 })]));
        mgr.set_observer(|i: usize| i >= 2);
        let partial = mgr.apply(to_ten, d);
        assert!(mgr.was_interrupted());
        assert!(mgr.ddd_nb_states(partial) < BigUint::from(11u32));

        // No observer any more: an unrelated loop runs to convergence.
        mgr.clear_observer();
        let to_twenty = mgr.fixpoint(mgr.sum([id, mgr.state_hom(Inc { var: 0, max: 20 })]));
        let full = mgr.apply(to_twenty, d);
        assert!(!mgr.was_interrupted());
        assert_eq!(mgr.ddd_nb_states(full), BigUint::from(21u32));

        // The partial result was never cached.
        assert_eq!(mgr.ddd_nb_states(mgr.apply(to_ten, d)), BigUint::from(11u32));
    }
}
