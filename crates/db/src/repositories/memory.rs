use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use costgate_core::domain::actor::UserId;
use costgate_core::domain::cost::{CostRequest, CostRequestId, CostStatus};
use costgate_core::domain::ledger::{
    LedgerMatchKey, LedgerTransaction, LedgerTransactionId, NewLedgerTransaction,
};
use costgate_core::errors::ApplicationError;
use costgate_core::workflow::{CostRequestStore, LedgerBook};

#[derive(Default)]
pub struct InMemoryCostRequestStore {
    requests: RwLock<HashMap<String, CostRequest>>,
}

impl InMemoryCostRequestStore {
    async fn collect_sorted(
        &self,
        keep: impl Fn(&CostRequest) -> bool,
        newest_first: bool,
    ) -> Vec<CostRequest> {
        let requests = self.requests.read().await;
        let mut out: Vec<CostRequest> = requests.values().filter(|r| keep(*r)).cloned().collect();
        out.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        if newest_first {
            out.reverse();
        }
        out
    }
}

#[async_trait::async_trait]
impl CostRequestStore for InMemoryCostRequestStore {
    async fn insert(&self, request: &CostRequest) -> Result<(), ApplicationError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(ApplicationError::Conflict(format!(
                "cost request `{}` already exists",
                request.id
            )));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &CostRequestId,
    ) -> Result<Option<CostRequest>, ApplicationError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn update(
        &self,
        request: &CostRequest,
        expected_version: u32,
    ) -> Result<(), ApplicationError> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id.0) {
            Some(stored) if stored.version == expected_version => {
                *stored = request.clone();
                Ok(())
            }
            _ => Err(ApplicationError::Conflict(format!(
                "cost request `{}` is no longer at version {expected_version}",
                request.id
            ))),
        }
    }

    async fn list_by_status(
        &self,
        status: CostStatus,
    ) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self.collect_sorted(|r| r.status == status, false).await)
    }

    async fn list_by_creator(
        &self,
        creator: &UserId,
    ) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self.collect_sorted(|r| &r.created_by == creator, true).await)
    }

    async fn list_all(&self) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self.collect_sorted(|_| true, true).await)
    }

    async fn list_check_numbered_final(&self) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self.collect_sorted(CostRequest::is_ledger_ready, false).await)
    }
}

/// Ledger held behind one lock, so `create_if_absent` is atomic here too.
#[derive(Default)]
pub struct InMemoryLedgerBook {
    transactions: RwLock<Vec<LedgerTransaction>>,
}

impl InMemoryLedgerBook {
    pub async fn transactions(&self) -> Vec<LedgerTransaction> {
        self.transactions.read().await.clone()
    }
}

fn materialize(entry: NewLedgerTransaction) -> LedgerTransaction {
    LedgerTransaction {
        id: LedgerTransactionId(Uuid::new_v4().to_string()),
        title: entry.title,
        description: entry.description,
        amount: entry.amount,
        kind: entry.kind,
        category: entry.category,
        date: entry.date,
        added_by: entry.added_by,
        proof_urls: entry.proof_urls,
        related_cost_request: entry.related_cost_request,
        created_at: Utc::now(),
    }
}

#[async_trait::async_trait]
impl LedgerBook for InMemoryLedgerBook {
    async fn find_transaction(
        &self,
        key: &LedgerMatchKey,
    ) -> Result<Option<LedgerTransaction>, ApplicationError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().find(|tx| key.matches(tx)).cloned())
    }

    async fn create_transaction(
        &self,
        entry: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, ApplicationError> {
        let transaction = materialize(entry);
        self.transactions.write().await.push(transaction.clone());
        Ok(transaction)
    }

    async fn create_if_absent(
        &self,
        key: &LedgerMatchKey,
        entry: NewLedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, ApplicationError> {
        let mut transactions = self.transactions.write().await;
        if transactions.iter().any(|tx| key.matches(tx)) {
            return Ok(None);
        }
        let transaction = materialize(entry);
        transactions.push(transaction.clone());
        Ok(Some(transaction))
    }
}
