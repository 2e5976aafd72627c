//! Cost approval state machine.
//!
//! Approvals are resolved against [`APPROVAL_RULES`], an ordered table
//! evaluated top to bottom where the first row matching the request's current
//! status and the caller's permissions wins. A caller holding every approval
//! permission still advances a request by exactly one gate per call.
//! Rejection sits outside the table and applies from any status.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::{Permission, UserId};
use crate::domain::cost::{
    ApprovalRecord, CostRequest, CostStatus, PaymentRecord, RejectionRecord,
};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalGate {
    L1,
    L2,
    Final,
}

impl ApprovalGate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
            Self::Final => "final",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApprovalRule {
    pub from: CostStatus,
    pub permission: Permission,
    pub to: CostStatus,
    pub gate: ApprovalGate,
}

pub const APPROVAL_RULES: [ApprovalRule; 3] = [
    ApprovalRule {
        from: CostStatus::Pending,
        permission: Permission::ApproveCostL1,
        to: CostStatus::ApprovedL1,
        gate: ApprovalGate::L1,
    },
    ApprovalRule {
        from: CostStatus::ApprovedL1,
        permission: Permission::ApproveCostL2,
        to: CostStatus::ApprovedL2,
        gate: ApprovalGate::L2,
    },
    ApprovalRule {
        from: CostStatus::ApprovedL2,
        permission: Permission::ApproveCostFinal,
        to: CostStatus::ApprovedFinal,
        gate: ApprovalGate::Final,
    },
];

/// First rule whose source status and permission both match.
pub fn match_rule(
    status: CostStatus,
    permissions: &BTreeSet<Permission>,
) -> Option<&'static ApprovalRule> {
    APPROVAL_RULES
        .iter()
        .find(|rule| rule.from == status && permissions.contains(&rule.permission))
}

/// Status a given approval permission is allowed to act on, if any.
pub fn actionable_status(permission: Permission) -> Option<CostStatus> {
    APPROVAL_RULES.iter().find(|rule| rule.permission == permission).map(|rule| rule.from)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostEvent {
    Approved { gate: ApprovalGate },
    Rejected,
    CheckRecorded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTransition {
    pub from: CostStatus,
    pub to: CostStatus,
    pub event: CostEvent,
    /// Updated copy with the version already bumped.
    pub request: CostRequest,
    /// Version the stored row must still carry for the write to apply.
    pub expected_version: u32,
}

/// Pure transition logic. Never touches storage; the workflow persists the
/// returned copy with a version check.
#[derive(Clone, Debug, Default)]
pub struct CostApprovalEngine;

impl CostApprovalEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn approve(
        &self,
        request: &CostRequest,
        approver: &UserId,
        permissions: &BTreeSet<Permission>,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CostTransition, DomainError> {
        let rule = match_rule(request.status, permissions)
            .ok_or(DomainError::InvalidTransition { status: request.status })?;

        let record = ApprovalRecord {
            approved_by: approver.clone(),
            approved_at: now,
            comment: comment.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()),
        };

        let mut next = request.clone();
        match rule.gate {
            ApprovalGate::L1 => next.approved_by_l1 = Some(record),
            ApprovalGate::L2 => next.approved_by_l2 = Some(record),
            ApprovalGate::Final => next.approved_by_final = Some(record),
        }
        next.status = rule.to;

        Ok(self.finish(request, next, CostEvent::Approved { gate: rule.gate }, now))
    }

    /// Applies from every status, including APPROVED_FINAL and REJECTED.
    pub fn reject(
        &self,
        request: &CostRequest,
        rejecter: &UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CostTransition {
        let mut next = request.clone();
        next.status = CostStatus::Rejected;
        next.rejection = Some(RejectionRecord {
            rejected_by: rejecter.clone(),
            rejected_at: now,
            reason: reason.into(),
        });

        self.finish(request, next, CostEvent::Rejected, now)
    }

    pub fn record_check_number(
        &self,
        request: &CostRequest,
        check_number: &str,
        now: DateTime<Utc>,
    ) -> Result<CostTransition, DomainError> {
        if request.status != CostStatus::ApprovedFinal {
            return Err(DomainError::InvalidState {
                status: request.status,
                required: CostStatus::ApprovedFinal,
            });
        }

        let check_number = check_number.trim();
        if check_number.is_empty() {
            return Err(DomainError::InvariantViolation("check number is required".to_string()));
        }

        let mut next = request.clone();
        next.payment =
            Some(PaymentRecord { check_number: check_number.to_string(), check_date: now });

        Ok(self.finish(request, next, CostEvent::CheckRecorded, now))
    }

    fn finish(
        &self,
        previous: &CostRequest,
        mut next: CostRequest,
        event: CostEvent,
        now: DateTime<Utc>,
    ) -> CostTransition {
        next.version = previous.version.saturating_add(1);
        next.updated_at = now;
        CostTransition {
            from: previous.status,
            to: next.status,
            event,
            request: next,
            expected_version: previous.version,
        }
    }
}
