//! The authoritative work graph store and atom state machine
//!
//! All entities live behind one `RwLock`: dependency guards read the
//! dependency's current status under the same lock that commits the status
//! write, so two concurrent transition attempts on the same atom serialize
//! and cross-entity checks cannot race a concurrent mutation.

use crate::errors::{WorkGraphError, WorkGraphResult};
use crate::types::*;
use catalyst_types::{AgentId, AtomId, CompoundId, MoleculeId};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::RwLock;
use tracing::{info, warn};

#[derive(Default)]
struct GraphState {
    compounds: HashMap<CompoundId, Compound>,
    molecules: HashMap<MoleculeId, Molecule>,
    atoms: HashMap<AtomId, Atom>,
}

/// The work graph: compounds, molecules, atoms, and their dependency edges.
pub struct WorkGraph {
    state: RwLock<GraphState>,
}

impl WorkGraph {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
        }
    }

    // ── Construction ─────────────────────────────────────────────────

    pub fn create_compound(&self, name: impl Into<String>) -> WorkGraphResult<Compound> {
        let name = non_empty(name.into(), "compound name")?;
        let now = Utc::now();
        let compound = Compound {
            id: CompoundId::generate(),
            name,
            status: CompoundStatus::Planning,
            molecule_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let mut state = self.write()?;
        state.compounds.insert(compound.id.clone(), compound.clone());
        info!(compound_id = %compound.id, "compound created");
        Ok(compound)
    }

    pub fn create_molecule(
        &self,
        compound_id: &CompoundId,
        name: impl Into<String>,
        success_criteria: Vec<String>,
    ) -> WorkGraphResult<Molecule> {
        let name = non_empty(name.into(), "molecule name")?;
        let mut state = self.write()?;
        let compound = state
            .compounds
            .get_mut(compound_id)
            .ok_or_else(|| WorkGraphError::CompoundNotFound(compound_id.clone()))?;

        let molecule = Molecule {
            id: MoleculeId::generate(),
            compound_id: compound_id.clone(),
            name,
            success_criteria,
            atom_ids: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        };
        compound.molecule_ids.push(molecule.id.clone());
        compound.updated_at = Utc::now();
        state.molecules.insert(molecule.id.clone(), molecule.clone());
        info!(molecule_id = %molecule.id, compound_id = %compound_id, "molecule created");
        Ok(molecule)
    }

    pub fn create_atom(
        &self,
        molecule_id: &MoleculeId,
        name: impl Into<String>,
        criteria: Vec<VerificationCriterion>,
        assignee: Option<AgentId>,
    ) -> WorkGraphResult<Atom> {
        let name = non_empty(name.into(), "atom name")?;
        let mut state = self.write()?;
        let molecule = state
            .molecules
            .get_mut(molecule_id)
            .ok_or_else(|| WorkGraphError::MoleculeNotFound(molecule_id.clone()))?;

        let now = Utc::now();
        let atom = Atom {
            id: AtomId::generate(),
            name,
            molecule_id: molecule_id.clone(),
            status: AtomStatus::Pending,
            criteria,
            requires: BTreeSet::new(),
            assignee,
            created_at: now,
            updated_at: now,
            completed_at: None,
            verified_at: None,
        };
        molecule.atom_ids.push(atom.id.clone());
        // An unfinished atom re-opens its molecule.
        molecule.completed_at = None;
        state.atoms.insert(atom.id.clone(), atom.clone());
        info!(atom_id = %atom.id, molecule_id = %molecule_id, "atom created");
        Ok(atom)
    }

    // ── Dependencies ─────────────────────────────────────────────────

    /// Add a `requires` edge: `atom` may not start until `dependency` is
    /// verified. Rejected if either atom is unknown, the edge is a
    /// self-dependency, or it would create a cycle.
    pub fn add_dependency(
        &self,
        atom_id: &AtomId,
        dependency_id: &AtomId,
    ) -> WorkGraphResult<()> {
        let mut state = self.write()?;
        if !state.atoms.contains_key(atom_id) {
            return Err(WorkGraphError::AtomNotFound(atom_id.clone()));
        }
        if !state.atoms.contains_key(dependency_id) {
            return Err(WorkGraphError::AtomNotFound(dependency_id.clone()));
        }
        if atom_id == dependency_id || reaches(&state.atoms, dependency_id, atom_id) {
            return Err(WorkGraphError::CycleDetected {
                atom: atom_id.clone(),
                dependency: dependency_id.clone(),
            });
        }

        let atom = state.atoms.get_mut(atom_id).ok_or_else(|| {
            WorkGraphError::AtomNotFound(atom_id.clone())
        })?;
        atom.requires.insert(dependency_id.clone());
        atom.updated_at = Utc::now();
        Ok(())
    }

    /// Atoms whose `requires` set contains `atom_id` — the derived inverse
    /// of the dependency edges.
    pub fn blocked_by(&self, atom_id: &AtomId) -> WorkGraphResult<Vec<AtomId>> {
        let state = self.read()?;
        let mut dependents: Vec<AtomId> = state
            .atoms
            .values()
            .filter(|a| a.requires.contains(atom_id))
            .map(|a| a.id.clone())
            .collect();
        dependents.sort();
        Ok(dependents)
    }

    // ── Atom state machine ───────────────────────────────────────────

    /// Attempt a status transition on an atom.
    ///
    /// Guards run under the write lock, so the dependency states observed
    /// are the ones the transition commits against.
    pub fn transition(
        &self,
        atom_id: &AtomId,
        target: AtomStatus,
        ctx: &TransitionContext,
    ) -> WorkGraphResult<Atom> {
        let mut state = self.write()?;
        let current = state
            .atoms
            .get(atom_id)
            .ok_or_else(|| WorkGraphError::AtomNotFound(atom_id.clone()))?
            .status;

        match (current, target) {
            (AtomStatus::Pending, AtomStatus::InProgress) => {
                let atom = &state.atoms[atom_id];
                for dependency in &atom.requires {
                    let satisfied = state
                        .atoms
                        .get(dependency)
                        .map(|d| d.status == AtomStatus::Verified)
                        .unwrap_or(false);
                    if !satisfied {
                        return Err(WorkGraphError::UnsatisfiedDependency {
                            atom: atom_id.clone(),
                            dependency: dependency.clone(),
                        });
                    }
                }
            }
            (AtomStatus::InProgress, AtomStatus::Blocked) => {}
            (AtomStatus::Blocked, AtomStatus::InProgress) => {}
            (AtomStatus::InProgress, AtomStatus::Complete) => {}
            (AtomStatus::Complete, AtomStatus::Verified) => {
                let atom = &state.atoms[atom_id];
                check_criteria(atom, &ctx.evidence)?;
                if let Some(gate) = &ctx.coherence_gate {
                    let result = gate.scorer.score(&gate.snapshot);
                    if !result.reading.coherent {
                        warn!(atom_id = %atom_id, curl = result.reading.curl,
                            divergence = result.reading.divergence,
                            "coherence gate failed on verify");
                        return Err(WorkGraphError::CoherenceGateFailed {
                            reading: result.reading,
                        });
                    }
                }
            }
            (from, to) => {
                return Err(WorkGraphError::InvalidTransition { from, to });
            }
        }

        let now = Utc::now();
        let molecule_id = {
            let atom = state
                .atoms
                .get_mut(atom_id)
                .ok_or_else(|| WorkGraphError::AtomNotFound(atom_id.clone()))?;
            atom.status = target;
            atom.updated_at = now;
            match target {
                AtomStatus::Complete => atom.completed_at = Some(now),
                AtomStatus::Verified => atom.verified_at = Some(now),
                _ => {}
            }
            atom.molecule_id.clone()
        };

        if target == AtomStatus::Verified {
            refresh_molecule_completion(&mut state, &molecule_id);
        }

        let atom = state.atoms[atom_id].clone();
        info!(atom_id = %atom_id, status = ?target, "atom transitioned");
        Ok(atom)
    }

    // ── Molecule / compound lifecycle ────────────────────────────────

    /// Delete a molecule, cascading to its atoms. Allowed only when every
    /// atom is `Verified`, unless `force` is set; forced deletion is logged.
    pub fn delete_molecule(&self, molecule_id: &MoleculeId, force: bool) -> WorkGraphResult<()> {
        let mut state = self.write()?;
        let molecule = state
            .molecules
            .get(molecule_id)
            .ok_or_else(|| WorkGraphError::MoleculeNotFound(molecule_id.clone()))?;

        let all_verified = molecule.atom_ids.iter().all(|id| {
            state
                .atoms
                .get(id)
                .map(|a| a.status == AtomStatus::Verified)
                .unwrap_or(true)
        });
        if !all_verified && !force {
            return Err(WorkGraphError::MoleculeNotVerified {
                molecule: molecule_id.clone(),
            });
        }
        if !all_verified {
            warn!(molecule_id = %molecule_id, "forced deletion of molecule with unverified atoms");
        }

        let molecule = state
            .molecules
            .remove(molecule_id)
            .ok_or_else(|| WorkGraphError::MoleculeNotFound(molecule_id.clone()))?;
        let removed: HashSet<AtomId> = molecule.atom_ids.iter().cloned().collect();
        for atom_id in &molecule.atom_ids {
            state.atoms.remove(atom_id);
        }
        // Drop dangling requires edges pointing at the removed atoms.
        for atom in state.atoms.values_mut() {
            atom.requires.retain(|id| !removed.contains(id));
        }
        if let Some(compound) = state.compounds.get_mut(&molecule.compound_id) {
            compound.molecule_ids.retain(|id| id != molecule_id);
            compound.updated_at = Utc::now();
        }
        info!(molecule_id = %molecule_id, atoms = removed.len(), "molecule deleted");
        Ok(())
    }

    /// Explicitly set a compound's status. `Complete` is validated: every
    /// molecule must already be completed. Never auto-transitioned.
    pub fn set_compound_status(
        &self,
        compound_id: &CompoundId,
        target: CompoundStatus,
    ) -> WorkGraphResult<Compound> {
        let mut state = self.write()?;
        let current = state
            .compounds
            .get(compound_id)
            .ok_or_else(|| WorkGraphError::CompoundNotFound(compound_id.clone()))?
            .status;

        if target == CompoundStatus::Complete {
            let compound = &state.compounds[compound_id];
            let incomplete = compound.molecule_ids.iter().find(|id| {
                state
                    .molecules
                    .get(*id)
                    .map(|m| m.completed_at.is_none())
                    .unwrap_or(false)
            });
            if let Some(molecule) = incomplete {
                return Err(WorkGraphError::InvalidCompoundTransition {
                    from: current,
                    to: target,
                    reason: format!("molecule {} is not completed", molecule),
                });
            }
        }

        let compound = state
            .compounds
            .get_mut(compound_id)
            .ok_or_else(|| WorkGraphError::CompoundNotFound(compound_id.clone()))?;
        compound.status = target;
        compound.updated_at = Utc::now();
        info!(compound_id = %compound_id, status = ?target, "compound status set");
        Ok(compound.clone())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn atom(&self, atom_id: &AtomId) -> WorkGraphResult<Atom> {
        let state = self.read()?;
        state
            .atoms
            .get(atom_id)
            .cloned()
            .ok_or_else(|| WorkGraphError::AtomNotFound(atom_id.clone()))
    }

    pub fn list_atoms(&self, filter: &AtomFilter) -> WorkGraphResult<Vec<Atom>> {
        let state = self.read()?;
        let mut atoms: Vec<Atom> = state
            .atoms
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        atoms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(atoms)
    }

    pub fn molecule(&self, molecule_id: &MoleculeId) -> WorkGraphResult<Molecule> {
        let state = self.read()?;
        state
            .molecules
            .get(molecule_id)
            .cloned()
            .ok_or_else(|| WorkGraphError::MoleculeNotFound(molecule_id.clone()))
    }

    pub fn compound(&self, compound_id: &CompoundId) -> WorkGraphResult<Compound> {
        let state = self.read()?;
        state
            .compounds
            .get(compound_id)
            .cloned()
            .ok_or_else(|| WorkGraphError::CompoundNotFound(compound_id.clone()))
    }

    fn read(&self) -> WorkGraphResult<std::sync::RwLockReadGuard<'_, GraphState>> {
        self.state.read().map_err(|_| WorkGraphError::LockError)
    }

    fn write(&self) -> WorkGraphResult<std::sync::RwLockWriteGuard<'_, GraphState>> {
        self.state.write().map_err(|_| WorkGraphError::LockError)
    }
}

impl Default for WorkGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: String, what: &str) -> WorkGraphResult<String> {
    if value.trim().is_empty() {
        Err(WorkGraphError::ValidationError(format!(
            "{what} must be non-empty"
        )))
    } else {
        Ok(value)
    }
}

/// Depth-first reachability over `requires` edges: can `from` reach `to`?
fn reaches(atoms: &HashMap<AtomId, Atom>, from: &AtomId, to: &AtomId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![from.clone()];
    while let Some(current) = stack.pop() {
        if current == *to {
            return true;
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(atom) = atoms.get(&current) {
            stack.extend(atom.requires.iter().cloned());
        }
    }
    false
}

/// Every criterion must evaluate true: automated ones via supplied evidence,
/// manual ones via the explicit human confirmation flag.
fn check_criteria(atom: &Atom, evidence: &VerificationEvidence) -> WorkGraphResult<()> {
    for criterion in &atom.criteria {
        let passed = if criterion.automated {
            evidence
                .automated_results
                .get(&criterion.name)
                .copied()
                .unwrap_or(false)
        } else {
            evidence.human_confirmed
        };
        if !passed {
            return Err(WorkGraphError::CriterionNotSatisfied(criterion.name.clone()));
        }
    }
    Ok(())
}

/// Set or clear a molecule's `completed_at` from its atoms' statuses.
fn refresh_molecule_completion(state: &mut GraphState, molecule_id: &MoleculeId) {
    let all_verified = state
        .molecules
        .get(molecule_id)
        .map(|m| {
            !m.atom_ids.is_empty()
                && m.atom_ids.iter().all(|id| {
                    state
                        .atoms
                        .get(id)
                        .map(|a| a.status == AtomStatus::Verified)
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false);

    if let Some(molecule) = state.molecules.get_mut(molecule_id) {
        if all_verified {
            if molecule.completed_at.is_none() {
                molecule.completed_at = Some(Utc::now());
                info!(molecule_id = %molecule_id, "molecule completed");
            }
        } else {
            molecule.completed_at = None;
        }
    }
}
