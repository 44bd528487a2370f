//! Error types for the work graph

use crate::types::{AtomStatus, CompoundStatus};
use catalyst_coherence::CoherenceReading;
use catalyst_types::{AtomId, CompoundId, MoleculeId};

/// Errors that can occur in work graph operations
#[derive(Debug, thiserror::Error)]
pub enum WorkGraphError {
    #[error("Compound not found: {0}")]
    CompoundNotFound(CompoundId),

    #[error("Molecule not found: {0}")]
    MoleculeNotFound(MoleculeId),

    #[error("Atom not found: {0}")]
    AtomNotFound(AtomId),

    #[error("Invalid transition: {from:?} -> {to:?}")]
    InvalidTransition { from: AtomStatus, to: AtomStatus },

    #[error("Invalid compound transition: {from:?} -> {to:?}: {reason}")]
    InvalidCompoundTransition {
        from: CompoundStatus,
        to: CompoundStatus,
        reason: String,
    },

    #[error("Unsatisfied dependency: atom {atom} requires {dependency} to be verified")]
    UnsatisfiedDependency { atom: AtomId, dependency: AtomId },

    #[error("Dependency edge {atom} -> {dependency} would create a cycle")]
    CycleDetected { atom: AtomId, dependency: AtomId },

    #[error("Verification criterion not satisfied: {0}")]
    CriterionNotSatisfied(String),

    #[error(
        "Coherence gate failed: curl={curl:.3} divergence={divergence:.3} potential={potential:.3}",
        curl = .reading.curl,
        divergence = .reading.divergence,
        potential = .reading.potential
    )]
    CoherenceGateFailed { reading: CoherenceReading },

    #[error("Molecule {molecule} has unverified atoms; pass force to delete anyway")]
    MoleculeNotVerified { molecule: MoleculeId },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Lock error")]
    LockError,
}

/// Result type alias for work graph operations
pub type WorkGraphResult<T> = Result<T, WorkGraphError>;
