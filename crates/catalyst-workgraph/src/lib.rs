//! Catalyst Work Graph
//!
//! Work decomposes into a compound → molecule → atom hierarchy:
//!
//! - **Atom**: minimal independently verifiable unit of work, with a status
//!   state machine (`pending → in_progress ⇄ blocked`, `in_progress →
//!   complete → verified`) and a `requires` dependency set over other atoms.
//! - **Molecule**: named grouping of atoms serving one sub-goal; completed
//!   only when every contained atom is verified.
//! - **Compound**: top-level project container of molecules.
//!
//! # Design Principles
//!
//! 1. Dependency edges are acyclic by construction — an insertion that would
//!    create a cycle is rejected, never silently accepted.
//! 2. Transition guards read dependency state under the same serialization
//!    boundary as the status write, so a dependency cannot become
//!    unsatisfied between check and commit.
//! 3. `verified` is terminal and evidence-gated: automated criteria consume
//!    caller-supplied evidence, manual criteria require explicit human
//!    confirmation, and an optional coherence gate must report coherent.

#![deny(unsafe_code)]

mod errors;
mod graph;
mod types;

pub use errors::*;
pub use graph::*;
pub use types::*;
