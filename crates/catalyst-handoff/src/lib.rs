//! Catalyst Handoff Router
//!
//! A handoff is a directed event recording a control/attention transfer
//! between two named agents. The router records handoffs, tracks their
//! resolution, and answers "what is pending for this agent" in routing
//! priority order.
//!
//! Severity is an explicit total order over handoff kinds (never string
//! comparison): Wave < Pass < Ping < Sync < Block. Block always routes
//! first. Only the addressee — or an operator acting on its behalf — may
//! resolve a handoff, and resolving twice never overwrites the first
//! resolution.

#![deny(unsafe_code)]

use catalyst_types::{AgentId, HandoffId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::info;

/// Kind of handoff. Routing priority ascends with `severity()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandoffKind {
    /// Lightweight greeting / presence signal.
    Wave,
    /// Transfer of responsibility for a piece of work.
    Pass,
    /// Request for attention or a status check.
    Ping,
    /// Request to align state between agents.
    Sync,
    /// Something is blocked and needs intervention. Always highest priority.
    Block,
}

impl HandoffKind {
    /// Explicit severity table. Higher routes first.
    pub fn severity(&self) -> u8 {
        match self {
            Self::Wave => 0,
            Self::Pass => 1,
            Self::Ping => 2,
            Self::Sync => 3,
            Self::Block => 4,
        }
    }
}

impl std::fmt::Display for HandoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wave => write!(f, "WAVE"),
            Self::Pass => write!(f, "PASS"),
            Self::Ping => write!(f, "PING"),
            Self::Sync => write!(f, "SYNC"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// A directed handoff event between two agents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Handoff {
    pub id: HandoffId,
    pub kind: HandoffKind,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    /// Free-form label describing context at the moment of handoff.
    pub state: String,
    pub context: serde_json::Value,
    pub raised_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
}

/// Who is resolving a handoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolver {
    /// The addressee itself.
    Agent(AgentId),
    /// An operator acting on the addressee's behalf.
    Operator(AgentId),
}

/// Handoff router errors.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Handoff not found: {0}")]
    NotFound(HandoffId),

    #[error("Agent {resolver} is not the addressee of handoff {handoff} (addressed to {addressee})")]
    NotAddressee {
        handoff: HandoffId,
        resolver: AgentId,
        addressee: AgentId,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Lock error")]
    LockError,
}

pub type HandoffResult<T> = Result<T, HandoffError>;

/// Records and routes handoffs between agents.
pub struct HandoffRouter {
    handoffs: RwLock<HashMap<HandoffId, Handoff>>,
}

impl HandoffRouter {
    pub fn new() -> Self {
        Self {
            handoffs: RwLock::new(HashMap::new()),
        }
    }

    /// Record a new handoff. Succeeds whenever both agent names are
    /// non-empty; persists unresolved.
    pub fn raise(
        &self,
        kind: HandoffKind,
        from_agent: AgentId,
        to_agent: AgentId,
        state: impl Into<String>,
        context: serde_json::Value,
    ) -> HandoffResult<Handoff> {
        if from_agent.as_str().trim().is_empty() {
            return Err(HandoffError::ValidationError(
                "from_agent must be non-empty".into(),
            ));
        }
        if to_agent.as_str().trim().is_empty() {
            return Err(HandoffError::ValidationError(
                "to_agent must be non-empty".into(),
            ));
        }

        let handoff = Handoff {
            id: HandoffId::generate(),
            kind,
            from_agent,
            to_agent,
            state: state.into(),
            context,
            raised_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolution_notes: None,
        };

        let mut handoffs = self.handoffs.write().map_err(|_| HandoffError::LockError)?;
        handoffs.insert(handoff.id.clone(), handoff.clone());

        info!(handoff_id = %handoff.id, kind = %handoff.kind,
            from = %handoff.from_agent, to = %handoff.to_agent, "handoff raised");
        Ok(handoff)
    }

    /// Mark a handoff resolved.
    ///
    /// Only the addressee, or an operator on its behalf, may resolve.
    /// Resolving an already-resolved handoff is a no-op that preserves the
    /// original `resolved_at` and notes.
    pub fn resolve(
        &self,
        handoff_id: &HandoffId,
        resolver: Resolver,
        notes: Option<String>,
    ) -> HandoffResult<()> {
        let mut handoffs = self.handoffs.write().map_err(|_| HandoffError::LockError)?;
        let handoff = handoffs
            .get_mut(handoff_id)
            .ok_or_else(|| HandoffError::NotFound(handoff_id.clone()))?;

        match &resolver {
            Resolver::Agent(agent) if *agent != handoff.to_agent => {
                return Err(HandoffError::NotAddressee {
                    handoff: handoff_id.clone(),
                    resolver: agent.clone(),
                    addressee: handoff.to_agent.clone(),
                });
            }
            Resolver::Operator(operator) => {
                info!(handoff_id = %handoff_id, operator = %operator,
                    "handoff resolved by operator on addressee's behalf");
            }
            _ => {}
        }

        if handoff.resolved {
            return Ok(());
        }

        handoff.resolved = true;
        handoff.resolved_at = Some(Utc::now());
        handoff.resolution_notes = notes;
        info!(handoff_id = %handoff_id, "handoff resolved");
        Ok(())
    }

    /// Unresolved handoffs addressed to `agent`, ordered by severity
    /// descending (Block first) then `raised_at` ascending within equal
    /// severity.
    pub fn pending_for(&self, agent: &AgentId) -> HandoffResult<Vec<Handoff>> {
        let handoffs = self.handoffs.read().map_err(|_| HandoffError::LockError)?;
        let mut pending: Vec<Handoff> = handoffs
            .values()
            .filter(|h| !h.resolved && h.to_agent == *agent)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.kind
                .severity()
                .cmp(&a.kind.severity())
                .then(a.raised_at.cmp(&b.raised_at))
        });
        Ok(pending)
    }

    /// Fetch a handoff by id.
    pub fn get(&self, handoff_id: &HandoffId) -> HandoffResult<Option<Handoff>> {
        let handoffs = self.handoffs.read().map_err(|_| HandoffError::LockError)?;
        Ok(handoffs.get(handoff_id).cloned())
    }
}

impl Default for HandoffRouter {
    fn default() -> Self {
        Self::new()
    }
}
