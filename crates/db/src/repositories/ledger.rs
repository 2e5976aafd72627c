use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use costgate_core::domain::actor::UserId;
use costgate_core::domain::cost::CostRequestId;
use costgate_core::domain::ledger::{
    LedgerMatchKey, LedgerTransaction, LedgerTransactionId, NewLedgerTransaction,
    TransactionCategory, TransactionKind,
};
use costgate_core::errors::ApplicationError;
use costgate_core::workflow::LedgerBook;

use super::{decode_amount, decode_json, encode_amount, encode_json, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlLedgerBook {
    pool: DbPool,
}

impl SqlLedgerBook {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn select_matching(
        &self,
        key: &LedgerMatchKey,
    ) -> Result<Option<LedgerTransaction>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                title,
                description,
                amount,
                kind,
                category,
                transaction_date,
                added_by,
                proof_urls_json,
                related_cost_request_id,
                created_at
             FROM ledger_transaction
             WHERE title = ? AND category = ? AND amount = ?
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(&key.title)
        .bind(key.category.as_str())
        .bind(encode_amount(key.amount))
        .fetch_optional(&self.pool)
        .await?;

        row.map(transaction_from_row).transpose()
    }

    pub async fn list_transactions(&self) -> Result<Vec<LedgerTransaction>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                title,
                description,
                amount,
                kind,
                category,
                transaction_date,
                added_by,
                proof_urls_json,
                related_cost_request_id,
                created_at
             FROM ledger_transaction
             ORDER BY transaction_date DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(transaction_from_row).collect()
    }

    /// Inserts `entry` unless `guard` is given and a transaction matching it
    /// already exists. The existence check and the insert are one statement.
    async fn insert_entry(
        &self,
        entry: NewLedgerTransaction,
        guard: Option<&LedgerMatchKey>,
    ) -> Result<Option<LedgerTransaction>, RepositoryError> {
        let transaction = LedgerTransaction {
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
        };

        let guard_clause = if guard.is_some() {
            "WHERE NOT EXISTS (
                SELECT 1 FROM ledger_transaction
                WHERE title = ? AND category = ? AND amount = ?
             )"
        } else {
            ""
        };
        let sql = format!(
            "INSERT INTO ledger_transaction (
                id,
                title,
                description,
                amount,
                kind,
                category,
                transaction_date,
                added_by,
                proof_urls_json,
                related_cost_request_id,
                created_at
             )
             SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
             {guard_clause}"
        );

        let mut query = sqlx::query(&sql)
            .bind(&transaction.id.0)
            .bind(&transaction.title)
            .bind(&transaction.description)
            .bind(encode_amount(transaction.amount))
            .bind(transaction.kind.as_str())
            .bind(transaction.category.as_str())
            .bind(transaction.date.to_rfc3339())
            .bind(&transaction.added_by.0)
            .bind(encode_json("proof_urls_json", &transaction.proof_urls)?)
            .bind(transaction.related_cost_request.as_ref().map(|id| id.0.clone()))
            .bind(transaction.created_at.to_rfc3339());
        if let Some(key) = guard {
            query = query
                .bind(key.title.clone())
                .bind(key.category.as_str().to_string())
                .bind(encode_amount(key.amount));
        }

        let result = query.execute(&self.pool).await?;
        Ok((result.rows_affected() > 0).then_some(transaction))
    }
}

#[async_trait]
impl LedgerBook for SqlLedgerBook {
    async fn find_transaction(
        &self,
        key: &LedgerMatchKey,
    ) -> Result<Option<LedgerTransaction>, ApplicationError> {
        Ok(self.select_matching(key).await?)
    }

    async fn create_transaction(
        &self,
        entry: NewLedgerTransaction,
    ) -> Result<LedgerTransaction, ApplicationError> {
        self.insert_entry(entry, None).await?.ok_or_else(|| {
            ApplicationError::Persistence("ledger insert affected no rows".to_string())
        })
    }

    async fn create_if_absent(
        &self,
        key: &LedgerMatchKey,
        entry: NewLedgerTransaction,
    ) -> Result<Option<LedgerTransaction>, ApplicationError> {
        Ok(self.insert_entry(entry, Some(key)).await?)
    }
}

fn transaction_from_row(row: SqliteRow) -> Result<LedgerTransaction, RepositoryError> {
    let kind_raw = row.try_get::<String, _>("kind")?;
    let kind = TransactionKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown transaction kind `{kind_raw}`")))?;
    let amount_raw = row.try_get::<String, _>("amount")?;
    let proof_urls_raw = row.try_get::<String, _>("proof_urls_json")?;

    Ok(LedgerTransaction {
        id: LedgerTransactionId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        amount: decode_amount("amount", &amount_raw)?,
        kind,
        category: TransactionCategory::parse(&row.try_get::<String, _>("category")?),
        date: parse_timestamp("transaction_date", row.try_get("transaction_date")?)?,
        added_by: UserId(row.try_get("added_by")?),
        proof_urls: decode_json("proof_urls_json", &proof_urls_raw)?,
        related_cost_request: row
            .try_get::<Option<String>, _>("related_cost_request_id")?
            .map(CostRequestId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
