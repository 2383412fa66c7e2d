//! # ddd-rs: Data Decision Diagrams in Rust
//!
//! **`ddd-rs`** is a manager-centric library for symbolic state-space
//! exploration with **Data Decision Diagrams (DDDs)**, **hierarchical Set
//! Decision Diagrams (SDDs)** and **homomorphisms** over them.
//!
//! ## What is a DDD?
//!
//! A DDD represents a set of sequences of assignments `x0 = v0, x1 = v1, ...`
//! as a maximally shared, directed acyclic graph. Each node carries a
//! variable and arcs labelled by integer values. An SDD is the hierarchical
//! variant: arcs carry *sets* of values, or whole diagrams, so a model can be
//! encoded as diagrams of diagrams.
//!
//! Nodes are **hash-consed**: two structurally equal nodes are the same node,
//! so equality is a single integer comparison.
//!
//! Transitions of a model are written as **homomorphisms**, functions from
//! diagrams to diagrams that distribute over union. They are canonical too,
//! and evaluated with memoization. The reachable states of a model are the
//! fixpoint of `id + transitions`, computed by *saturation* when transitions
//! act on distinct variables.
//!
//! ## Basic Usage
//!
//! ```rust
//! use ddd_rs::manager::Manager;
//! use ddd_rs::reference::{Ddd, Hom};
//!
//! // 1. Initialize the manager
//! let mgr = Manager::new();
//!
//! // 2. Build the initial state: x0 = 0, x1 = 0
//! let init = mgr.ddd_path(&[(0, 0), (1, 0)]);
//!
//! // 3. A transition: set x0 to 1, keep the rest
//! let id: Hom = mgr.identity();
//! let tail = mgr.ddd(1, 0, Ddd::ONE);
//! let set = mgr.constant(mgr.ddd(0, 1, tail));
//!
//! // 4. Reachable states
//! let reach = mgr.apply(mgr.fixpoint(mgr.sum([id, set])), init);
//! assert_eq!(mgr.ddd_nb_states(reach), 2u32.into());
//!
//! // 5. Keep what matters, collect the rest
//! let reach = mgr.root(reach);
//! mgr.garbage();
//! assert_eq!(mgr.ddd_nb_states(*reach), 2u32.into());
//! ```
//!
//! ## Core Components
//!
//! - **[`manager`]**: The [`Manager`][crate::manager::Manager] context owning every table.
//! - **[`ddd`]** and **[`sdd`]**: Node construction and set operators.
//! - **[`hom`]**: The homomorphism algebra and the [`StateHom`][crate::hom::StateHom] extension point.
//! - **[`gc`]**: Mark & sweep collection driven by [`Root`][crate::reference::Root] handles.

pub mod cache;
pub mod ddd;
pub mod debug;
pub mod diagram;
pub mod eval;
pub mod gc;
pub mod hom;
pub mod label;
pub mod manager;
pub mod paths;
pub mod reference;
pub mod sdd;
pub mod sync;
pub mod table;
pub mod types;
pub mod utils;
