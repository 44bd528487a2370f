//! Catalyst Orchestrator
//!
//! Composes the coherence scorer, grant ledger, work graph, and handoff
//! router into the operations the external CLI/API layer calls. No other
//! component mutates those entities directly.
//!
//! The orchestrator owns the only cross-component behavior in the system:
//! a `Complete -> Verified` transition that fails its coherence gate raises
//! exactly one BLOCK handoff addressed to the atom's assignee (or the
//! configured fallback on-call agent) before the failure is returned to the
//! caller. Nothing is retried silently.

#![deny(unsafe_code)]

use catalyst_coherence::{CoherenceScorer, CoherenceThresholds, ScoreResult, SignalSnapshot};
use catalyst_grants::{
    AuditOutcome, AuditRecord, Grant, GrantError, GrantLedger, GrantLevel, GrantScope,
    VerifyDecision,
};
use catalyst_handoff::{Handoff, HandoffError, HandoffKind, HandoffRouter, Resolver};
use catalyst_types::{AgentId, AtomId, CompoundId, GrantId, HandoffId, MoleculeId};
use catalyst_workgraph::{
    Atom, AtomFilter, AtomStatus, Compound, CompoundStatus, Molecule, TransitionContext,
    VerificationCriterion, VerificationEvidence, WorkGraph, WorkGraphError,
};
use chrono::Duration;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

/// Orchestrator configuration. Thresholds are configuration, not constants.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub thresholds: CoherenceThresholds,
    /// When set, `Complete -> Verified` transitions are coherence-gated.
    pub gate_verified_transitions: bool,
    /// Addressee for automatic BLOCK handoffs when an atom has no assignee.
    pub fallback_oncall: AgentId,
    /// `from_agent` used for automatically raised handoffs.
    pub system_agent: AgentId,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            thresholds: CoherenceThresholds::default(),
            gate_verified_transitions: true,
            fallback_oncall: AgentId::new("oncall"),
            system_agent: AgentId::new("system"),
        }
    }
}

/// Explicit authorization for an atom transition: the grant that permits it.
/// Threaded as a parameter — there is no ambient "current grant".
#[derive(Clone, Debug)]
pub struct TransitionAuth {
    pub grant_id: GrantId,
}

/// Orchestrator errors, wrapping the component errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Grant(#[from] GrantError),

    #[error(transparent)]
    WorkGraph(#[from] WorkGraphError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error("Transition not authorized: {outcome:?}: {reason}")]
    TransitionNotAuthorized {
        outcome: AuditOutcome,
        reason: String,
    },

    #[error("Coherence gate failed at grant issuance")]
    IssuanceGateFailed { result: ScoreResult },
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// The facade over the coherence-gated orchestration core.
pub struct Orchestrator {
    config: OrchestratorConfig,
    scorer: CoherenceScorer,
    grants: GrantLedger,
    graph: WorkGraph,
    handoffs: HandoffRouter,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let scorer = CoherenceScorer::new(config.thresholds);
        Self {
            config,
            scorer,
            grants: GrantLedger::new(),
            graph: WorkGraph::new(),
            handoffs: HandoffRouter::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(OrchestratorConfig::default())
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ── Coherence ────────────────────────────────────────────────────

    pub fn score(&self, snapshot: &SignalSnapshot) -> ScoreResult {
        self.scorer.score(snapshot)
    }

    // ── Grants ───────────────────────────────────────────────────────

    pub fn issue_grant(
        &self,
        intent: impl Into<String>,
        scope: GrantScope,
        level: GrantLevel,
        ttl: Duration,
        granted_by: Option<AgentId>,
    ) -> OrchestratorResult<Grant> {
        Ok(self.grants.issue(intent, scope, level, ttl, granted_by)?)
    }

    /// Issue a grant only if the supplied signal snapshot scores coherent.
    /// Nothing is persisted when the gate fails.
    pub fn issue_grant_gated(
        &self,
        intent: impl Into<String>,
        scope: GrantScope,
        level: GrantLevel,
        ttl: Duration,
        granted_by: Option<AgentId>,
        snapshot: &SignalSnapshot,
    ) -> OrchestratorResult<Grant> {
        let result = self.scorer.score(snapshot);
        if !result.reading.coherent {
            warn!(curl = result.reading.curl, divergence = result.reading.divergence,
                "grant issuance refused by coherence gate");
            return Err(OrchestratorError::IssuanceGateFailed { result });
        }
        Ok(self.grants.issue(intent, scope, level, ttl, granted_by)?)
    }

    pub fn verify_grant(
        &self,
        grant_id: &GrantId,
        action: &str,
        resource: &str,
    ) -> OrchestratorResult<VerifyDecision> {
        Ok(self.grants.verify(grant_id, action, resource)?)
    }

    pub fn revoke_grant(&self, grant_id: &GrantId) -> OrchestratorResult<()> {
        Ok(self.grants.revoke(grant_id)?)
    }

    pub fn expiring_grants(&self, within: Duration) -> OrchestratorResult<Vec<Grant>> {
        Ok(self.grants.list_expiring(within)?)
    }

    pub fn grant_audit(&self, grant_id: &GrantId) -> OrchestratorResult<Vec<AuditRecord>> {
        Ok(self.grants.audit_for(grant_id)?)
    }

    /// Periodic sweep: report grants expiring within `horizon`. Expiry
    /// itself stays lazy — it is evaluated at verify time, never cached.
    pub fn sweep_expiring(&self, horizon: Duration) -> OrchestratorResult<Vec<Grant>> {
        let expiring = self.grants.list_expiring(horizon)?;
        for grant in &expiring {
            info!(grant_id = %grant.id, expires_at = %grant.expires_at,
                "grant approaching expiry");
        }
        Ok(expiring)
    }

    // ── Work graph ───────────────────────────────────────────────────

    pub fn create_compound(&self, name: impl Into<String>) -> OrchestratorResult<Compound> {
        Ok(self.graph.create_compound(name)?)
    }

    pub fn create_molecule(
        &self,
        compound_id: &CompoundId,
        name: impl Into<String>,
        success_criteria: Vec<String>,
    ) -> OrchestratorResult<Molecule> {
        Ok(self.graph.create_molecule(compound_id, name, success_criteria)?)
    }

    pub fn create_atom(
        &self,
        molecule_id: &MoleculeId,
        name: impl Into<String>,
        criteria: Vec<VerificationCriterion>,
        assignee: Option<AgentId>,
    ) -> OrchestratorResult<Atom> {
        Ok(self.graph.create_atom(molecule_id, name, criteria, assignee)?)
    }

    pub fn add_dependency(
        &self,
        atom_id: &AtomId,
        dependency_id: &AtomId,
    ) -> OrchestratorResult<()> {
        Ok(self.graph.add_dependency(atom_id, dependency_id)?)
    }

    pub fn atom(&self, atom_id: &AtomId) -> OrchestratorResult<Atom> {
        Ok(self.graph.atom(atom_id)?)
    }

    pub fn list_atoms(&self, filter: &AtomFilter) -> OrchestratorResult<Vec<Atom>> {
        Ok(self.graph.list_atoms(filter)?)
    }

    pub fn molecule(&self, molecule_id: &MoleculeId) -> OrchestratorResult<Molecule> {
        Ok(self.graph.molecule(molecule_id)?)
    }

    pub fn compound(&self, compound_id: &CompoundId) -> OrchestratorResult<Compound> {
        Ok(self.graph.compound(compound_id)?)
    }

    pub fn set_compound_status(
        &self,
        compound_id: &CompoundId,
        target: CompoundStatus,
    ) -> OrchestratorResult<Compound> {
        Ok(self.graph.set_compound_status(compound_id, target)?)
    }

    pub fn delete_molecule(
        &self,
        molecule_id: &MoleculeId,
        force: bool,
    ) -> OrchestratorResult<()> {
        Ok(self.graph.delete_molecule(molecule_id, force)?)
    }

    /// Attempt an atom status transition.
    ///
    /// When `auth` names a grant, it must verify `allowed` for action
    /// `"transition"` on resource `atom:<id>` before the state machine runs;
    /// an in-progress atom whose grant no longer verifies is moved to
    /// `Blocked`. When the verified-transition coherence gate is enabled,
    /// `Complete -> Verified` scores the supplied snapshot; a gate failure
    /// raises exactly one BLOCK handoff to the assignee (or fallback
    /// on-call) and returns the error.
    pub fn transition_atom(
        &self,
        atom_id: &AtomId,
        target: AtomStatus,
        evidence: VerificationEvidence,
        snapshot: Option<&SignalSnapshot>,
        auth: Option<&TransitionAuth>,
    ) -> OrchestratorResult<Atom> {
        if let Some(auth) = auth {
            let resource = format!("atom:{atom_id}");
            let decision = self.grants.verify(&auth.grant_id, "transition", &resource)?;
            if !decision.allowed {
                self.block_if_in_progress(atom_id)?;
                return Err(OrchestratorError::TransitionNotAuthorized {
                    outcome: decision.outcome,
                    reason: decision.reason,
                });
            }
        }

        let mut ctx = TransitionContext::new().with_evidence(evidence);
        if target == AtomStatus::Verified && self.config.gate_verified_transitions {
            let gate_snapshot = snapshot.cloned().unwrap_or_default();
            ctx = ctx.with_coherence_gate(self.scorer.clone(), gate_snapshot);
        }

        match self.graph.transition(atom_id, target, &ctx) {
            Ok(atom) => Ok(atom),
            Err(WorkGraphError::CoherenceGateFailed { reading }) => {
                let addressee = self
                    .graph
                    .atom(atom_id)
                    .ok()
                    .and_then(|a| a.assignee)
                    .unwrap_or_else(|| self.config.fallback_oncall.clone());
                self.handoffs.raise(
                    HandoffKind::Block,
                    self.config.system_agent.clone(),
                    addressee,
                    "coherence-gate-failed",
                    json!({ "atom_id": atom_id, "reading": reading }),
                )?;
                Err(WorkGraphError::CoherenceGateFailed { reading }.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A grant that stopped verifying blocks its in-progress atom; other
    /// statuses are left alone.
    fn block_if_in_progress(&self, atom_id: &AtomId) -> OrchestratorResult<()> {
        let atom = match self.graph.atom(atom_id) {
            Ok(atom) => atom,
            Err(WorkGraphError::AtomNotFound(_)) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        if atom.status == AtomStatus::InProgress {
            warn!(atom_id = %atom_id, "blocking atom: transition grant no longer verifies");
            self.graph
                .transition(atom_id, AtomStatus::Blocked, &TransitionContext::new())?;
        }
        Ok(())
    }

    // ── Handoffs ─────────────────────────────────────────────────────

    pub fn raise_handoff(
        &self,
        kind: HandoffKind,
        from_agent: AgentId,
        to_agent: AgentId,
        state: impl Into<String>,
        context: serde_json::Value,
    ) -> OrchestratorResult<Handoff> {
        Ok(self.handoffs.raise(kind, from_agent, to_agent, state, context)?)
    }

    pub fn resolve_handoff(
        &self,
        handoff_id: &HandoffId,
        resolver: Resolver,
        notes: Option<String>,
    ) -> OrchestratorResult<()> {
        Ok(self.handoffs.resolve(handoff_id, resolver, notes)?)
    }

    pub fn pending_handoffs(&self, agent: &AgentId) -> OrchestratorResult<Vec<Handoff>> {
        Ok(self.handoffs.pending_for(agent)?)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
