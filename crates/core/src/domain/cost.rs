use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::actor::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CostRequestId(pub String);

impl CostRequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CostRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostStatus {
    Pending,
    #[serde(rename = "APPROVED_L1")]
    ApprovedL1,
    #[serde(rename = "APPROVED_L2")]
    ApprovedL2,
    ApprovedFinal,
    Rejected,
}

impl CostStatus {
    pub const ALL: [CostStatus; 5] = [
        Self::Pending,
        Self::ApprovedL1,
        Self::ApprovedL2,
        Self::ApprovedFinal,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::ApprovedL1 => "APPROVED_L1",
            Self::ApprovedL2 => "APPROVED_L2",
            Self::ApprovedFinal => "APPROVED_FINAL",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "APPROVED_L1" => Some(Self::ApprovedL1),
            "APPROVED_L2" => Some(Self::ApprovedL2),
            "APPROVED_FINAL" => Some(Self::ApprovedFinal),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ApprovedFinal | Self::Rejected)
    }
}

impl fmt::Display for CostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub approved_by: UserId,
    pub approved_at: DateTime<Utc>,
    pub comment: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub rejected_by: UserId,
    pub rejected_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub check_number: String,
    pub check_date: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostRequest {
    pub id: CostRequestId,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub attachments: Vec<String>,
    pub created_by: UserId,
    pub status: CostStatus,
    pub approved_by_l1: Option<ApprovalRecord>,
    pub approved_by_l2: Option<ApprovalRecord>,
    pub approved_by_final: Option<ApprovalRecord>,
    pub rejection: Option<RejectionRecord>,
    pub payment: Option<PaymentRecord>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller supplied fields for a new cost request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCostRequest {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewCostRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::InvariantViolation("title is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation("description is required".to_string()));
        }
        if self.amount < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "amount must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

impl CostRequest {
    /// Builds a PENDING request at version 1. Callers validate `fields` first.
    pub fn open(fields: NewCostRequest, created_by: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: CostRequestId::generate(),
            title: fields.title.trim().to_string(),
            description: fields.description.trim().to_string(),
            amount: fields.amount,
            attachments: fields.attachments,
            created_by,
            status: CostStatus::Pending,
            approved_by_l1: None,
            approved_by_l2: None,
            approved_by_final: None,
            rejection: None,
            payment: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn check_number(&self) -> Option<&str> {
        self.payment.as_ref().map(|payment| payment.check_number.as_str())
    }

    /// True once the request is fully approved and carries a usable check number.
    pub fn is_ledger_ready(&self) -> bool {
        self.status == CostStatus::ApprovedFinal
            && self.check_number().is_some_and(|number| !number.trim().is_empty())
    }
}
