//! Handles to canonical objects owned by the [`Manager`].
//!
//! All handles here are *non-owning*: a [`Ddd`], [`Sdd`] or [`HomId`] is a
//! plain 32-bit slot id, valid only while something keeps its target alive
//! across [`Manager::garbage`]. That something is either a [`Root`] (an RAII,
//! reference-counted handle) or another live object referencing it.
//!
//! Because objects are hash-consed, handle equality is semantic equality.
//!
//! [`Manager`]: crate::manager::Manager
//! [`Manager::garbage`]: crate::manager::Manager::garbage

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

use crate::manager::Manager;

/// Handle to a flat (data) decision diagram node.
///
/// # Terminals
///
/// - `Ddd::NULL`: the empty set of sequences
/// - `Ddd::ONE`: the set containing only the empty sequence
/// - `Ddd::TOP`: "don't know", a conservative over-approximation
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Ddd(u32);

impl Ddd {
    pub const NULL: Ddd = Ddd(0);
    pub const ONE: Ddd = Ddd(1);
    pub const TOP: Ddd = Ddd(2);

    pub(crate) const fn new(index: u32) -> Self {
        Ddd(index)
    }

    /// Returns the raw slot id.
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_terminal(self) -> bool {
        self.0 <= 2
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_one(self) -> bool {
        self.0 == 1
    }

    pub const fn is_top(self) -> bool {
        self.0 == 2
    }
}

impl fmt::Display for Ddd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "null"),
            1 => write!(f, "one"),
            2 => write!(f, "top"),
            i => write!(f, "d#{}", i),
        }
    }
}

/// Handle to a hierarchical (set) decision diagram node.
///
/// Same terminal layout as [`Ddd`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Sdd(u32);

impl Sdd {
    pub const NULL: Sdd = Sdd(0);
    pub const ONE: Sdd = Sdd(1);
    pub const TOP: Sdd = Sdd(2);

    pub(crate) const fn new(index: u32) -> Self {
        Sdd(index)
    }

    /// Returns the raw slot id.
    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_terminal(self) -> bool {
        self.0 <= 2
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_one(self) -> bool {
        self.0 == 1
    }

    pub const fn is_top(self) -> bool {
        self.0 == 2
    }
}

impl fmt::Display for Sdd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "null"),
            1 => write!(f, "one"),
            2 => write!(f, "top"),
            i => write!(f, "s#{}", i),
        }
    }
}

/// Handle to a canonical homomorphism over diagrams of kind `N`.
///
/// Equality and hashing are by slot id. There is no [`Ord`]: homomorphisms
/// are ordered by their creation serial, which only the manager knows.
#[repr(transparent)]
pub struct HomId<N> {
    id: u32,
    _kind: PhantomData<fn() -> N>,
}

/// Homomorphism over flat diagrams.
pub type Hom = HomId<Ddd>;

/// Homomorphism over hierarchical diagrams.
pub type SHom = HomId<Sdd>;

impl<N> HomId<N> {
    pub(crate) const fn new(id: u32) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    /// Returns the raw slot id.
    pub const fn raw(self) -> u32 {
        self.id
    }
}

impl<N> Clone for HomId<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for HomId<N> {}

impl<N> PartialEq for HomId<N> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<N> Eq for HomId<N> {}

impl<N> Hash for HomId<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<N> fmt::Debug for HomId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HomId({})", self.id)
    }
}

impl<N> fmt::Display for HomId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h#{}", self.id)
    }
}

/// Any object the collector knows how to reach.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Handle {
    Ddd(Ddd),
    Sdd(Sdd),
    Hom(Hom),
    SHom(SHom),
}

impl From<Ddd> for Handle {
    fn from(d: Ddd) -> Self {
        Handle::Ddd(d)
    }
}

impl From<Sdd> for Handle {
    fn from(s: Sdd) -> Self {
        Handle::Sdd(s)
    }
}

impl From<Hom> for Handle {
    fn from(h: Hom) -> Self {
        Handle::Hom(h)
    }
}

impl From<SHom> for Handle {
    fn from(h: SHom) -> Self {
        Handle::SHom(h)
    }
}

/// A reference-counted handle.
///
/// While a `Root` exists its target (and everything reachable from it)
/// survives [`Manager::garbage`]. Cloning increments the external count,
/// dropping decrements it.
pub struct Root<'m, H>
where
    H: Copy + Into<Handle>,
{
    mgr: &'m Manager,
    handle: H,
}

impl<'m, H> Root<'m, H>
where
    H: Copy + Into<Handle>,
{
    pub(crate) fn new(mgr: &'m Manager, handle: H) -> Self {
        mgr.protect(handle.into());
        Self { mgr, handle }
    }

    /// Returns the underlying non-owning handle.
    pub fn get(&self) -> H {
        self.handle
    }
}

impl<H> Clone for Root<'_, H>
where
    H: Copy + Into<Handle>,
{
    fn clone(&self) -> Self {
        Root::new(self.mgr, self.handle)
    }
}

impl<H> Drop for Root<'_, H>
where
    H: Copy + Into<Handle>,
{
    fn drop(&mut self) {
        self.mgr.unprotect(self.handle.into());
    }
}

impl<H> Deref for Root<'_, H>
where
    H: Copy + Into<Handle>,
{
    type Target = H;

    fn deref(&self) -> &H {
        &self.handle
    }
}

impl<H> fmt::Debug for Root<'_, H>
where
    H: Copy + Into<Handle> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.handle).finish()
    }
}

impl<H> PartialEq for Root<'_, H>
where
    H: Copy + Into<Handle> + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        assert!(Ddd::NULL.is_null());
        assert!(Ddd::NULL.is_terminal());
        assert!(!Ddd::NULL.is_one());

        assert!(Ddd::ONE.is_one());
        assert!(Ddd::ONE.is_terminal());

        assert!(Ddd::TOP.is_top());
        assert!(Ddd::TOP.is_terminal());

        assert!(Sdd::ONE.is_one());
        assert!(!Sdd::new(3).is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Ddd::NULL), "null");
        assert_eq!(format!("{}", Ddd::ONE), "one");
        assert_eq!(format!("{}", Ddd::TOP), "top");
        assert_eq!(format!("{}", Ddd::new(42)), "d#42");
        assert_eq!(format!("{}", Sdd::new(7)), "s#7");
        assert_eq!(format!("{}", Hom::new(5)), "h#5");
    }

    #[test]
    fn test_hom_id_copy_eq() {
        let a = SHom::new(3);
        let b = a;
        assert_eq!(a, b);
        assert_ne!(a, SHom::new(4));
        assert_eq!(Handle::from(a), Handle::SHom(SHom::new(3)));
    }
}
