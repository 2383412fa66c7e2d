//! Mark & sweep collection of every table.
//!
//! Roots are the objects with a non-zero external reference count (see
//! [`Root`](crate::reference::Root)). Marking follows node successors, the
//! flat or hierarchical diagrams held in labels, and everything a
//! homomorphism refers to. All memo tables are emptied first, since their
//! entries may name unmarked objects.

use std::fmt;

use log::{debug, info};

use crate::diagram::Diagram;
use crate::manager::Manager;
use crate::reference::{Ddd, Handle, HomId, Sdd};

/// Table sizes around one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub before: usize,
    pub after: usize,
}

impl Sweep {
    pub fn freed(&self) -> usize {
        self.before - self.after
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub ddd: Sweep,
    pub sdd: Sweep,
    pub hom: Sweep,
    pub shom: Sweep,
}

impl GcStats {
    /// Total number of released entries.
    pub fn freed(&self) -> usize {
        self.ddd.freed() + self.sdd.freed() + self.hom.freed() + self.shom.freed()
    }
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ddd {}->{}, sdd {}->{}, hom {}->{}, shom {}->{}",
            self.ddd.before,
            self.ddd.after,
            self.sdd.before,
            self.sdd.after,
            self.hom.before,
            self.hom.after,
            self.shom.before,
            self.shom.after
        )
    }
}

impl Manager {
    /// Release every object not reachable from a root.
    ///
    /// Handles that are not rooted, directly or through a rooted object, are
    /// invalid afterwards: their slots may be reused.
    ///
    /// # Panics
    ///
    /// Panics if called while a homomorphism is being evaluated.
    pub fn garbage(&self) -> GcStats {
        assert!(!self.is_evaluating(), "Cannot collect garbage during an evaluation");
        debug!("Collecting garbage...");

        self.ddd_ops.write().clear();
        self.sdd_ops.write().clear();
        self.hom_cache.write().clear();
        self.shom_cache.write().clear();

        let mut ddds = self.ddds.write();
        let mut sdds = self.sdds.write();
        let mut homs = self.homs.table.write();
        let mut shoms = self.shoms.table.write();

        let mut stats = GcStats {
            ddd: Sweep { before: ddds.len(), after: 0 },
            sdd: Sweep { before: sdds.len(), after: 0 },
            hom: Sweep { before: homs.len(), after: 0 },
            shom: Sweep { before: shoms.len(), after: 0 },
        };

        let mut stack: Vec<Handle> = Vec::new();
        stack.extend(ddds.roots().into_iter().map(|i| Handle::Ddd(Ddd::new(i))));
        stack.extend(sdds.roots().into_iter().map(|i| Handle::Sdd(Sdd::new(i))));
        stack.extend(homs.roots().into_iter().map(|i| Handle::Hom(HomId::new(i))));
        stack.extend(shoms.roots().into_iter().map(|i| Handle::SHom(HomId::new(i))));
        debug!("{} roots", stack.len());

        while let Some(handle) = stack.pop() {
            match handle {
                Handle::Ddd(d) => {
                    if ddds.mark(d.raw()) {
                        stack.extend(ddds.get(d.raw()).arcs.iter().map(|&(_, succ)| Handle::Ddd(succ)));
                    }
                }
                Handle::Sdd(s) => {
                    if sdds.mark(s.raw()) {
                        for (label, succ) in sdds.get(s.raw()).arcs.iter() {
                            stack.extend(Sdd::value_handles(label));
                            stack.push(Handle::Sdd(*succ));
                        }
                    }
                }
                Handle::Hom(h) => {
                    if homs.mark(h.raw()) {
                        stack.extend(homs.get(h.raw()).node.children());
                    }
                }
                Handle::SHom(h) => {
                    if shoms.mark(h.raw()) {
                        stack.extend(shoms.get(h.raw()).node.children());
                    }
                }
            }
        }

        ddds.update_peak();
        sdds.update_peak();
        homs.update_peak();
        shoms.update_peak();
        ddds.sweep();
        sdds.sweep();
        homs.sweep();
        shoms.sweep();

        stats.ddd.after = ddds.len();
        stats.sdd.after = sdds.len();
        stats.hom.after = homs.len();
        stats.shom.after = shoms.len();

        info!("garbage: freed {} entries ({})", stats.freed(), stats);
        stats
    }
}
