use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::cost::CostRequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerTransactionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INCOME" => Some(Self::Income),
            "EXPENSE" => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionCategory {
    CostManagement,
    /// Any other bookkeeping category, kept verbatim.
    Other(String),
}

impl From<String> for TransactionCategory {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TransactionCategory> for String {
    fn from(value: TransactionCategory) -> Self {
        value.as_str().to_string()
    }
}

impl TransactionCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::CostManagement => "COST_MANAGEMENT",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "COST_MANAGEMENT" => Self::CostManagement,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: LedgerTransactionId,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: TransactionCategory,
    pub date: DateTime<Utc>,
    pub added_by: UserId,
    pub proof_urls: Vec<String>,
    pub related_cost_request: Option<CostRequestId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerTransaction {
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: TransactionCategory,
    pub date: DateTime<Utc>,
    pub added_by: UserId,
    pub proof_urls: Vec<String>,
    pub related_cost_request: Option<CostRequestId>,
}

/// Fields that decide whether a ledger transaction already mirrors a cost request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMatchKey {
    pub title: String,
    pub amount: Decimal,
    pub category: TransactionCategory,
}

impl LedgerMatchKey {
    /// Decimal comparison is by value, so `500` matches `500.00`.
    pub fn matches(&self, transaction: &LedgerTransaction) -> bool {
        transaction.title == self.title
            && transaction.amount == self.amount
            && transaction.category == self.category
    }
}
