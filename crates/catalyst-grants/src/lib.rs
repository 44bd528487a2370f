//! Catalyst Grant Ledger
//!
//! Grants are scoped, time-bounded, revocable permissions. The ledger is the
//! ONLY authority over them: it issues, verifies, expires, and revokes, and
//! it appends an audit record for every verification attempt — including
//! denials, so that denial patterns remain inspectable.
//!
//! Verification fails closed: an unknown, revoked, or expired grant yields a
//! denial decision, never a panic or an error the caller could mistake for a
//! transient fault. Expiry is evaluated at the moment of use, never assumed
//! from a cached flag. Revocation is terminal — a revoked grant cannot be
//! un-revoked; issue a new one instead.

#![deny(unsafe_code)]

use catalyst_types::{AgentId, AuditRecordId, GrantId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::{info, warn};

/// Resource/action scope of a grant.
///
/// Matching is exact string equality, with one explicit wildcard: a set
/// containing the literal `"*"` matches everything. There is no substring
/// or prefix matching.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GrantScope {
    pub resources: Vec<String>,
    pub actions: Vec<String>,
    /// Optional wall-clock budget in seconds, communicated to the grantee
    /// (informational).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<i64>,
    /// Optional impact ceiling communicated to the grantee (informational).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_limit: Option<String>,
}

impl GrantScope {
    pub fn new(
        resources: impl IntoIterator<Item = impl Into<String>>,
        actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            time_limit_secs: None,
            impact_limit: None,
        }
    }

    /// Scope matching every resource and action.
    pub fn global() -> Self {
        Self::new(["*"], ["*"])
    }

    pub fn is_empty(&self) -> bool {
        self.resources.iter().all(|r| r.trim().is_empty())
            && self.actions.iter().all(|a| a.trim().is_empty())
    }

    pub fn allows_action(&self, action: &str) -> bool {
        set_matches(&self.actions, action)
    }

    pub fn allows_resource(&self, resource: &str) -> bool {
        set_matches(&self.resources, resource)
    }
}

fn set_matches(granted: &[String], requested: &str) -> bool {
    granted.iter().any(|g| g == "*" || g == requested)
}

/// Authority level of a grant. Ordinal: authority increases monotonically.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GrantLevel {
    Observe = 0,
    Suggest = 1,
    Act = 2,
    Administer = 3,
    Sovereign = 4,
}

/// A scoped, time-bounded permission grant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    /// Why the grant exists. Required, non-empty.
    pub intent: String,
    pub scope: GrantScope,
    pub level: GrantLevel,
    pub granted_at: DateTime<Utc>,
    /// Strictly after `granted_at`.
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<AgentId>,
    /// Terminal once set — a revoked grant is never un-revoked.
    pub revoked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Grant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What happened to a verification or lifecycle attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Denied,
    Error,
    Expired,
}

/// Which ledger operation produced an audit record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    Issued,
    Verified,
    Revoked,
}

/// One entry in the append-only audit trail. Never mutated after append.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditRecordId,
    pub grant_id: GrantId,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_resource: Option<String>,
    pub outcome: AuditOutcome,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Result of verifying a grant against an action and resource.
///
/// Denial and expiry are decision values, not errors — the caller always
/// gets a decision back for a well-formed request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyDecision {
    pub allowed: bool,
    pub outcome: AuditOutcome,
    pub reason: String,
}

impl VerifyDecision {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            outcome: AuditOutcome::Success,
            reason: reason.into(),
        }
    }

    fn deny(outcome: AuditOutcome, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            outcome,
            reason: reason.into(),
        }
    }
}

/// Grant ledger errors. Verification denials are NOT here — they are
/// `VerifyDecision` values.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("Grant not found: {0}")]
    NotFound(GrantId),

    #[error("Invalid scope: resource and action sets are both empty")]
    InvalidScope,

    #[error("Invalid TTL: must be positive, got {0} seconds")]
    InvalidTtl(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Lock error")]
    LockError,
}

pub type GrantResult<T> = Result<T, GrantError>;

/// The authoritative store of grants and their audit trail.
pub struct GrantLedger {
    grants: RwLock<HashMap<GrantId, Grant>>,
    audit: RwLock<Vec<AuditRecord>>,
}

impl GrantLedger {
    pub fn new() -> Self {
        Self {
            grants: RwLock::new(HashMap::new()),
            audit: RwLock::new(Vec::new()),
        }
    }

    /// Issue a new grant with the given intent, scope, level, and TTL.
    pub fn issue(
        &self,
        intent: impl Into<String>,
        scope: GrantScope,
        level: GrantLevel,
        ttl: Duration,
        granted_by: Option<AgentId>,
    ) -> GrantResult<Grant> {
        let intent = intent.into();
        if intent.trim().is_empty() {
            return Err(GrantError::ValidationError(
                "grant intent must be non-empty".into(),
            ));
        }
        if scope.is_empty() {
            return Err(GrantError::InvalidScope);
        }
        if ttl <= Duration::zero() {
            return Err(GrantError::InvalidTtl(ttl.num_seconds()));
        }

        let now = Utc::now();
        let grant = Grant {
            id: GrantId::generate(),
            intent,
            scope,
            level,
            granted_at: now,
            expires_at: now + ttl,
            granted_by,
            revoked: false,
            revoked_at: None,
        };

        let mut grants = self.grants.write().map_err(|_| GrantError::LockError)?;
        grants.insert(grant.id.clone(), grant.clone());
        drop(grants);

        self.append_audit(AuditRecord {
            id: AuditRecordId::generate(),
            grant_id: grant.id.clone(),
            action: AuditAction::Issued,
            requested_action: None,
            requested_resource: None,
            outcome: AuditOutcome::Success,
            detail: format!("issued at level {:?}", grant.level),
            at: now,
        })?;

        info!(grant_id = %grant.id, level = ?grant.level, "grant issued");
        Ok(grant)
    }

    /// Verify a grant against an action and resource. Fails closed.
    ///
    /// An audit record is appended regardless of outcome. Expiry is checked
    /// against the clock at the moment of this call.
    pub fn verify(
        &self,
        grant_id: &GrantId,
        action: &str,
        resource: &str,
    ) -> GrantResult<VerifyDecision> {
        let now = Utc::now();
        let decision = {
            let grants = self.grants.read().map_err(|_| GrantError::LockError)?;
            match grants.get(grant_id) {
                None => VerifyDecision::deny(AuditOutcome::Denied, "grant not found"),
                Some(grant) if grant.revoked => {
                    VerifyDecision::deny(AuditOutcome::Denied, "grant revoked")
                }
                Some(grant) if grant.is_expired_at(now) => {
                    VerifyDecision::deny(AuditOutcome::Expired, "grant expired")
                }
                Some(grant) => {
                    if !grant.scope.allows_action(action) {
                        VerifyDecision::deny(
                            AuditOutcome::Denied,
                            format!("action '{}' not in scope", action),
                        )
                    } else if !grant.scope.allows_resource(resource) {
                        VerifyDecision::deny(
                            AuditOutcome::Denied,
                            format!("resource '{}' not in scope", resource),
                        )
                    } else {
                        VerifyDecision::allow("action and resource in scope")
                    }
                }
            }
        };

        self.append_audit(AuditRecord {
            id: AuditRecordId::generate(),
            grant_id: grant_id.clone(),
            action: AuditAction::Verified,
            requested_action: Some(action.to_string()),
            requested_resource: Some(resource.to_string()),
            outcome: decision.outcome,
            detail: decision.reason.clone(),
            at: now,
        })?;

        if !decision.allowed {
            warn!(grant_id = %grant_id, action, resource, outcome = ?decision.outcome,
                "grant verification denied");
        }
        Ok(decision)
    }

    /// Revoke a grant. Idempotent: re-revoking is a no-op that preserves the
    /// original `revoked_at`.
    pub fn revoke(&self, grant_id: &GrantId) -> GrantResult<()> {
        let now = Utc::now();
        let first_revocation = {
            let mut grants = self.grants.write().map_err(|_| GrantError::LockError)?;
            let grant = grants
                .get_mut(grant_id)
                .ok_or_else(|| GrantError::NotFound(grant_id.clone()))?;
            if grant.revoked {
                false
            } else {
                grant.revoked = true;
                grant.revoked_at = Some(now);
                true
            }
        };

        if first_revocation {
            self.append_audit(AuditRecord {
                id: AuditRecordId::generate(),
                grant_id: grant_id.clone(),
                action: AuditAction::Revoked,
                requested_action: None,
                requested_resource: None,
                outcome: AuditOutcome::Success,
                detail: "revoked".into(),
                at: now,
            })?;
            info!(grant_id = %grant_id, "grant revoked");
        }
        Ok(())
    }

    /// Non-revoked grants whose `expires_at` falls within `[now, now+within]`,
    /// ascending by `expires_at`.
    pub fn list_expiring(&self, within: Duration) -> GrantResult<Vec<Grant>> {
        let now = Utc::now();
        let horizon = now + within;
        let grants = self.grants.read().map_err(|_| GrantError::LockError)?;

        let mut expiring: Vec<Grant> = grants
            .values()
            .filter(|g| !g.revoked && g.expires_at >= now && g.expires_at <= horizon)
            .cloned()
            .collect();
        expiring.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        Ok(expiring)
    }

    /// Fetch a grant by id.
    pub fn get(&self, grant_id: &GrantId) -> GrantResult<Option<Grant>> {
        let grants = self.grants.read().map_err(|_| GrantError::LockError)?;
        Ok(grants.get(grant_id).cloned())
    }

    /// The audit trail for one grant, in append order.
    pub fn audit_for(&self, grant_id: &GrantId) -> GrantResult<Vec<AuditRecord>> {
        let audit = self.audit.read().map_err(|_| GrantError::LockError)?;
        Ok(audit
            .iter()
            .filter(|r| r.grant_id == *grant_id)
            .cloned()
            .collect())
    }

    fn append_audit(&self, record: AuditRecord) -> GrantResult<()> {
        let mut audit = self.audit.write().map_err(|_| GrantError::LockError)?;
        audit.push(record);
        Ok(())
    }
}

impl Default for GrantLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue_basic(ledger: &GrantLedger, ttl: Duration) -> Grant {
        ledger
            .issue(
                "deploy the release",
                GrantScope::new(["repo:core"], ["deploy"]),
                GrantLevel::Act,
                ttl,
                Some(AgentId::new("operator")),
            )
            .unwrap()
    }

    #[test]
    fn issue_rejects_empty_scope() {
        let ledger = GrantLedger::new();
        let err = ledger
            .issue(
                "something",
                GrantScope::default(),
                GrantLevel::Observe,
                Duration::hours(1),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidScope));
    }

    #[test]
    fn issue_rejects_empty_intent() {
        let ledger = GrantLedger::new();
        let err = ledger
            .issue(
                "   ",
                GrantScope::global(),
                GrantLevel::Observe,
                Duration::hours(1),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GrantError::ValidationError(_)));
    }

    #[test]
    fn issue_rejects_nonpositive_ttl() {
        let ledger = GrantLedger::new();
        let err = ledger
            .issue(
                "something",
                GrantScope::global(),
                GrantLevel::Observe,
                Duration::zero(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GrantError::InvalidTtl(_)));
    }

    #[test]
    fn verify_allows_in_scope_request() {
        let ledger = GrantLedger::new();
        let grant = issue_basic(&ledger, Duration::hours(1));

        let decision = ledger.verify(&grant.id, "deploy", "repo:core").unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.outcome, AuditOutcome::Success);
    }

    #[test]
    fn verify_denies_out_of_scope_action() {
        let ledger = GrantLedger::new();
        let grant = issue_basic(&ledger, Duration::hours(1));

        let decision = ledger.verify(&grant.id, "delete", "repo:core").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, AuditOutcome::Denied);
    }

    #[test]
    fn verify_fails_closed_on_unknown_grant() {
        let ledger = GrantLedger::new();
        let decision = ledger
            .verify(&GrantId::new("missing"), "deploy", "repo:core")
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, AuditOutcome::Denied);
    }

    #[test]
    fn verify_after_expiry_returns_expired_even_in_scope() {
        let ledger = GrantLedger::new();
        let grant = issue_basic(&ledger, Duration::hours(1));

        // Force the grant past its expiry rather than sleeping.
        {
            let mut grants = ledger.grants.write().unwrap();
            let g = grants.get_mut(&grant.id).unwrap();
            g.expires_at = Utc::now() - Duration::hours(1);
        }

        let decision = ledger.verify(&grant.id, "deploy", "repo:core").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, AuditOutcome::Expired);
    }

    #[test]
    fn wildcard_scope_is_explicit_star_only() {
        let ledger = GrantLedger::new();
        let grant = ledger
            .issue(
                "broad access",
                GrantScope::new(["repo:*"], ["*"]),
                GrantLevel::Act,
                Duration::hours(1),
                None,
            )
            .unwrap();

        // "repo:*" is a literal, not a prefix pattern
        let decision = ledger.verify(&grant.id, "deploy", "repo:core").unwrap();
        assert!(!decision.allowed);

        let decision = ledger.verify(&grant.id, "anything", "repo:*").unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn revoke_is_terminal_and_idempotent() {
        let ledger = GrantLedger::new();
        let grant = issue_basic(&ledger, Duration::hours(1));

        ledger.revoke(&grant.id).unwrap();
        let first = ledger.get(&grant.id).unwrap().unwrap();
        assert!(first.revoked);
        let first_at = first.revoked_at.unwrap();

        ledger.revoke(&grant.id).unwrap();
        let second = ledger.get(&grant.id).unwrap().unwrap();
        assert!(second.revoked);
        assert_eq!(second.revoked_at.unwrap(), first_at);

        // Exactly one Revoked audit record
        let records = ledger.audit_for(&grant.id).unwrap();
        let revocations = records
            .iter()
            .filter(|r| r.action == AuditAction::Revoked)
            .count();
        assert_eq!(revocations, 1);

        let decision = ledger.verify(&grant.id, "deploy", "repo:core").unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, AuditOutcome::Denied);
    }

    #[test]
    fn revoke_unknown_grant_is_not_found() {
        let ledger = GrantLedger::new();
        let err = ledger.revoke(&GrantId::new("missing")).unwrap_err();
        assert!(matches!(err, GrantError::NotFound(_)));
    }

    #[test]
    fn every_verify_appends_an_audit_record() {
        let ledger = GrantLedger::new();
        let grant = issue_basic(&ledger, Duration::hours(1));

        ledger.verify(&grant.id, "deploy", "repo:core").unwrap();
        ledger.verify(&grant.id, "delete", "repo:core").unwrap();

        let records = ledger.audit_for(&grant.id).unwrap();
        let verifies: Vec<_> = records
            .iter()
            .filter(|r| r.action == AuditAction::Verified)
            .collect();
        assert_eq!(verifies.len(), 2);
        assert_eq!(verifies[0].outcome, AuditOutcome::Success);
        assert_eq!(verifies[1].outcome, AuditOutcome::Denied);
    }

    #[test]
    fn list_expiring_orders_by_expiry_and_skips_revoked() {
        let ledger = GrantLedger::new();
        let soon = issue_basic(&ledger, Duration::minutes(10));
        let later = issue_basic(&ledger, Duration::minutes(30));
        let revoked = issue_basic(&ledger, Duration::minutes(5));
        let distant = issue_basic(&ledger, Duration::days(7));
        ledger.revoke(&revoked.id).unwrap();

        let expiring = ledger.list_expiring(Duration::hours(1)).unwrap();
        let ids: Vec<_> = expiring.iter().map(|g| g.id.clone()).collect();
        assert_eq!(ids, vec![soon.id, later.id]);
        assert!(!ids.contains(&distant.id));
    }

    #[test]
    fn level_ordering_is_monotonic() {
        assert!(GrantLevel::Observe < GrantLevel::Suggest);
        assert!(GrantLevel::Suggest < GrantLevel::Act);
        assert!(GrantLevel::Act < GrantLevel::Administer);
        assert!(GrantLevel::Administer < GrantLevel::Sovereign);
    }
}
