//! Entity types for the work graph

use catalyst_coherence::{CoherenceScorer, SignalSnapshot};
use catalyst_types::{AgentId, AtomId, CompoundId, MoleculeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Status of an atom. `Verified` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomStatus {
    Pending,
    InProgress,
    /// Reachable from `InProgress` only; returns to `InProgress` once the
    /// blocking condition clears. Never terminal.
    Blocked,
    Complete,
    Verified,
}

/// A named verification check an atom must pass before `Verified`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCriterion {
    pub name: String,
    /// Automated criteria consume caller-supplied evidence; manual ones
    /// require the explicit human confirmation flag.
    pub automated: bool,
}

impl VerificationCriterion {
    pub fn automated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            automated: true,
        }
    }

    pub fn manual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            automated: false,
        }
    }
}

/// Evidence supplied with a `Complete -> Verified` transition attempt.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VerificationEvidence {
    /// Per-criterion results from automated checkers, keyed by criterion name.
    pub automated_results: HashMap<String, bool>,
    /// Explicit confirmation covering every manual criterion.
    pub human_confirmed: bool,
}

impl VerificationEvidence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, criterion: impl Into<String>, passed: bool) -> Self {
        self.automated_results.insert(criterion.into(), passed);
        self
    }

    pub fn with_human_confirmation(mut self) -> Self {
        self.human_confirmed = true;
        self
    }
}

/// Coherence gate attached to a `Complete -> Verified` transition: the
/// scorer must report coherent on the supplied snapshot.
#[derive(Clone, Debug)]
pub struct CoherenceGate {
    pub scorer: CoherenceScorer,
    pub snapshot: SignalSnapshot,
}

/// Context threaded explicitly through a transition attempt — no ambient
/// process-wide state.
#[derive(Clone, Debug, Default)]
pub struct TransitionContext {
    pub evidence: VerificationEvidence,
    pub coherence_gate: Option<CoherenceGate>,
}

impl TransitionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_evidence(mut self, evidence: VerificationEvidence) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_coherence_gate(mut self, scorer: CoherenceScorer, snapshot: SignalSnapshot) -> Self {
        self.coherence_gate = Some(CoherenceGate { scorer, snapshot });
        self
    }
}

/// Minimal unit of work.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Atom {
    pub id: AtomId,
    pub name: String,
    pub molecule_id: MoleculeId,
    pub status: AtomStatus,
    pub criteria: Vec<VerificationCriterion>,
    /// Atom ids that must reach `Verified` before this atom may start.
    /// The inverse (`blocks`) is derived by query, never stored.
    pub requires: BTreeSet<AtomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

/// Named grouping of atoms under one compound.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Molecule {
    pub id: MoleculeId,
    pub compound_id: CompoundId,
    pub name: String,
    /// Informational, not structurally enforced.
    pub success_criteria: Vec<String>,
    pub atom_ids: Vec<AtomId>,
    pub created_at: DateTime<Utc>,
    /// Set only when every contained atom is `Verified`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Status of a compound. `Complete` is an explicit, validated caller action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompoundStatus {
    Planning,
    Active,
    Paused,
    Complete,
    Archived,
}

/// Top-level project container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Compound {
    pub id: CompoundId,
    pub name: String,
    pub status: CompoundStatus,
    pub molecule_ids: Vec<MoleculeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for atom list queries.
#[derive(Clone, Debug, Default)]
pub struct AtomFilter {
    pub molecule: Option<MoleculeId>,
    pub status: Option<AtomStatus>,
    pub assignee: Option<AgentId>,
}

impl AtomFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_molecule(mut self, molecule: MoleculeId) -> Self {
        self.molecule = Some(molecule);
        self
    }

    pub fn with_status(mut self, status: AtomStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn assigned_to(mut self, agent: AgentId) -> Self {
        self.assignee = Some(agent);
        self
    }

    pub(crate) fn matches(&self, atom: &Atom) -> bool {
        if let Some(ref molecule) = self.molecule {
            if atom.molecule_id != *molecule {
                return false;
            }
        }
        if let Some(status) = self.status {
            if atom.status != status {
                return false;
            }
        }
        if let Some(ref assignee) = self.assignee {
            if atom.assignee.as_ref() != Some(assignee) {
                return false;
            }
        }
        true
    }
}
