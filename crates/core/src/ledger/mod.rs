//! Mirroring approved cost requests into the bookkeeping ledger.
//!
//! A ledger transaction counts as "already synced" when one exists with the
//! synthesized title, the same amount and the COST_MANAGEMENT category. There
//! is no foreign key involved: two unrelated requests sharing a title and
//! amount are treated as one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::actor::UserId;
use crate::domain::cost::CostRequest;
use crate::domain::ledger::{
    LedgerMatchKey, NewLedgerTransaction, TransactionCategory, TransactionKind,
};

pub const LEDGER_TITLE_PREFIX: &str = "[Cost Request] ";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Right after a check number is recorded.
    CheckRecorded,
    /// Reconciliation sweep over every check-numbered final request.
    Sweep,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckRecorded => "check_recorded",
            Self::Sweep => "sweep",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

pub fn ledger_title(request: &CostRequest) -> String {
    format!("{LEDGER_TITLE_PREFIX}{}", request.title)
}

pub fn match_key(request: &CostRequest) -> LedgerMatchKey {
    LedgerMatchKey {
        title: ledger_title(request),
        amount: request.amount,
        category: TransactionCategory::CostManagement,
    }
}

/// Ledger entry for a fully approved, check-numbered request.
pub fn ledger_entry(
    request: &CostRequest,
    recorded_by: &UserId,
    trigger: SyncTrigger,
    now: DateTime<Utc>,
) -> NewLedgerTransaction {
    let check_number = request.check_number().unwrap_or_default();
    let (lead, date) = match trigger {
        SyncTrigger::CheckRecorded => ("Approved", now),
        SyncTrigger::Sweep => {
            ("Synced approved", request.payment.as_ref().map_or(now, |payment| payment.check_date))
        }
    };

    NewLedgerTransaction {
        title: ledger_title(request),
        description: format!(
            "{lead} cost request by {}: {} (Check No: {check_number})",
            request.created_by, request.description
        ),
        amount: request.amount,
        kind: TransactionKind::Expense,
        category: TransactionCategory::CostManagement,
        date,
        added_by: recorded_by.clone(),
        proof_urls: request.attachments.clone(),
        related_cost_request: Some(request.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{ledger_entry, ledger_title, match_key, SyncTrigger};
    use crate::domain::actor::UserId;
    use crate::domain::cost::{CostRequest, CostStatus, NewCostRequest, PaymentRecord};
    use crate::domain::ledger::{
        LedgerTransaction, LedgerTransactionId, TransactionCategory, TransactionKind,
    };

    fn printer_request() -> CostRequest {
        let mut request = CostRequest::open(
            NewCostRequest {
                title: "Printer".to_string(),
                description: "Lab printer".to_string(),
                amount: Decimal::new(500, 0),
                attachments: vec!["https://files.example/quote.pdf".to_string()],
            },
            UserId("u-rahim".to_string()),
            Utc::now(),
        );
        request.status = CostStatus::ApprovedFinal;
        request.payment = Some(PaymentRecord {
            check_number: "CHK-001".to_string(),
            check_date: Utc::now() - Duration::days(3),
        });
        request
    }

    #[test]
    fn inline_entry_uses_prefixed_title_and_current_date() {
        let request = printer_request();
        let now = Utc::now();
        let entry = ledger_entry(&request, &UserId("u-admin".into()), SyncTrigger::CheckRecorded, now);

        assert_eq!(entry.title, "[Cost Request] Printer");
        assert_eq!(entry.amount, Decimal::new(500, 0));
        assert_eq!(entry.kind, TransactionKind::Expense);
        assert_eq!(entry.category, TransactionCategory::CostManagement);
        assert_eq!(entry.date, now);
        assert_eq!(entry.added_by, UserId("u-admin".into()));
        assert_eq!(entry.proof_urls, request.attachments);
        assert_eq!(entry.related_cost_request.as_ref(), Some(&request.id));
        assert_eq!(entry.description, "Approved cost request by u-rahim: Lab printer (Check No: CHK-001)");
    }

    #[test]
    fn sweep_entry_is_dated_at_the_check_date() {
        let request = printer_request();
        let entry = ledger_entry(&request, &UserId("u-admin".into()), SyncTrigger::Sweep, Utc::now());

        assert_eq!(Some(entry.date), request.payment.as_ref().map(|p| p.check_date));
        assert!(entry.description.starts_with("Synced approved cost request by u-rahim"));
    }

    #[test]
    fn match_key_compares_amounts_by_value() {
        let request = printer_request();
        let key = match_key(&request);
        let existing = LedgerTransaction {
            id: LedgerTransactionId("tx-1".into()),
            title: "[Cost Request] Printer".into(),
            description: String::new(),
            amount: Decimal::new(50000, 2),
            kind: TransactionKind::Expense,
            category: TransactionCategory::CostManagement,
            date: Utc::now(),
            added_by: UserId("u-other".into()),
            proof_urls: Vec::new(),
            related_cost_request: None,
            created_at: Utc::now(),
        };
        assert!(key.matches(&existing));

        let other_category = LedgerTransaction {
            category: TransactionCategory::Other("EVENT".into()),
            ..existing.clone()
        };
        assert!(!key.matches(&other_category));

        let other_amount = LedgerTransaction { amount: Decimal::new(501, 0), ..existing };
        assert!(!key.matches(&other_amount));
    }

    #[test]
    fn padded_titles_share_the_ledger_key_of_the_stored_title() {
        let padded = CostRequest::open(
            NewCostRequest {
                title: "  Printer \t".to_string(),
                description: " Lab printer ".to_string(),
                amount: Decimal::new(500, 0),
                attachments: Vec::new(),
            },
            UserId("u-rahim".to_string()),
            Utc::now(),
        );

        assert_eq!(ledger_title(&padded), "[Cost Request] Printer");
        assert_eq!(match_key(&padded), match_key(&printer_request()));
    }
}
