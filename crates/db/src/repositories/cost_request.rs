use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use costgate_core::domain::actor::UserId;
use costgate_core::domain::cost::{
    ApprovalRecord, CostRequest, CostRequestId, CostStatus, PaymentRecord, RejectionRecord,
};
use costgate_core::errors::ApplicationError;
use costgate_core::workflow::CostRequestStore;

use super::{
    decode_amount, decode_json, encode_amount, encode_json, parse_optional_timestamp,
    parse_timestamp, parse_u32, RepositoryError,
};
use crate::DbPool;

const COST_REQUEST_COLUMNS: &str = "
    id,
    title,
    description,
    amount,
    attachments_json,
    created_by,
    status,
    approved_by_l1_json,
    approved_by_l2_json,
    approved_by_final_json,
    rejection_json,
    check_number,
    check_date,
    version,
    created_at,
    updated_at";

pub struct SqlCostRequestStore {
    pool: DbPool,
}

impl SqlCostRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_request(&self, request: &CostRequest) -> Result<(), RepositoryError> {
        let row = EncodedRow::from_request(request)?;
        sqlx::query(
            "INSERT INTO cost_request (
                id,
                title,
                description,
                amount,
                attachments_json,
                created_by,
                status,
                approved_by_l1_json,
                approved_by_l2_json,
                approved_by_final_json,
                rejection_json,
                check_number,
                check_date,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.title)
        .bind(&request.description)
        .bind(encode_amount(request.amount))
        .bind(row.attachments_json)
        .bind(&request.created_by.0)
        .bind(request.status.as_str())
        .bind(row.approved_by_l1_json)
        .bind(row.approved_by_l2_json)
        .bind(row.approved_by_final_json)
        .bind(row.rejection_json)
        .bind(request.payment.as_ref().map(|payment| payment.check_number.clone()))
        .bind(request.payment.as_ref().map(|payment| payment.check_date.to_rfc3339()))
        .bind(i64::from(request.version))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn select_by_id(
        &self,
        id: &CostRequestId,
    ) -> Result<Option<CostRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COST_REQUEST_COLUMNS} FROM cost_request WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    /// Single statement compare-and-swap on `version`. Zero affected rows means
    /// another writer got there first, or the row is gone.
    pub async fn update_versioned(
        &self,
        request: &CostRequest,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let row = EncodedRow::from_request(request)?;
        let result = sqlx::query(
            "UPDATE cost_request SET
                title = ?,
                description = ?,
                amount = ?,
                attachments_json = ?,
                status = ?,
                approved_by_l1_json = ?,
                approved_by_l2_json = ?,
                approved_by_final_json = ?,
                rejection_json = ?,
                check_number = ?,
                check_date = ?,
                version = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&request.title)
        .bind(&request.description)
        .bind(encode_amount(request.amount))
        .bind(row.attachments_json)
        .bind(request.status.as_str())
        .bind(row.approved_by_l1_json)
        .bind(row.approved_by_l2_json)
        .bind(row.approved_by_final_json)
        .bind(row.rejection_json)
        .bind(request.payment.as_ref().map(|payment| payment.check_number.clone()))
        .bind(request.payment.as_ref().map(|payment| payment.check_date.to_rfc3339()))
        .bind(i64::from(request.version))
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                id: request.id.0.clone(),
                expected: expected_version,
            });
        }
        Ok(())
    }

    async fn select_where(
        &self,
        clause: &str,
        bind: Option<&str>,
    ) -> Result<Vec<CostRequest>, RepositoryError> {
        let sql = format!("SELECT {COST_REQUEST_COLUMNS} FROM cost_request {clause}");
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(request_from_row).collect()
    }
}

#[async_trait]
impl CostRequestStore for SqlCostRequestStore {
    async fn insert(&self, request: &CostRequest) -> Result<(), ApplicationError> {
        Ok(self.insert_request(request).await?)
    }

    async fn find_by_id(
        &self,
        id: &CostRequestId,
    ) -> Result<Option<CostRequest>, ApplicationError> {
        Ok(self.select_by_id(id).await?)
    }

    async fn update(
        &self,
        request: &CostRequest,
        expected_version: u32,
    ) -> Result<(), ApplicationError> {
        Ok(self.update_versioned(request, expected_version).await?)
    }

    async fn list_by_status(
        &self,
        status: CostStatus,
    ) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self
            .select_where("WHERE status = ? ORDER BY created_at ASC, id ASC", Some(status.as_str()))
            .await?)
    }

    async fn list_by_creator(
        &self,
        creator: &UserId,
    ) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self
            .select_where("WHERE created_by = ? ORDER BY created_at DESC, id DESC", Some(&creator.0))
            .await?)
    }

    async fn list_all(&self) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self.select_where("ORDER BY created_at DESC, id DESC", None).await?)
    }

    async fn list_check_numbered_final(&self) -> Result<Vec<CostRequest>, ApplicationError> {
        Ok(self
            .select_where(
                "WHERE status = ?
                   AND check_number IS NOT NULL
                   AND TRIM(check_number) <> ''
                 ORDER BY created_at ASC, id ASC",
                Some(CostStatus::ApprovedFinal.as_str()),
            )
            .await?)
    }
}

struct EncodedRow {
    attachments_json: String,
    approved_by_l1_json: Option<String>,
    approved_by_l2_json: Option<String>,
    approved_by_final_json: Option<String>,
    rejection_json: Option<String>,
}

impl EncodedRow {
    fn from_request(request: &CostRequest) -> Result<Self, RepositoryError> {
        Ok(Self {
            attachments_json: encode_json("attachments_json", &request.attachments)?,
            approved_by_l1_json: encode_record("approved_by_l1_json", &request.approved_by_l1)?,
            approved_by_l2_json: encode_record("approved_by_l2_json", &request.approved_by_l2)?,
            approved_by_final_json: encode_record(
                "approved_by_final_json",
                &request.approved_by_final,
            )?,
            rejection_json: encode_record("rejection_json", &request.rejection)?,
        })
    }
}

fn encode_record<T: serde::Serialize>(
    column: &str,
    record: &Option<T>,
) -> Result<Option<String>, RepositoryError> {
    record.as_ref().map(|value| encode_json(column, value)).transpose()
}

fn decode_record<T: serde::de::DeserializeOwned>(
    column: &str,
    value: Option<String>,
) -> Result<Option<T>, RepositoryError> {
    value.map(|raw| decode_json(column, &raw)).transpose()
}

fn request_from_row(row: SqliteRow) -> Result<CostRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = CostStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown cost status `{status_raw}`")))?;

    let amount_raw = row.try_get::<String, _>("amount")?;
    let check_number = row.try_get::<Option<String>, _>("check_number")?;
    let check_date = parse_optional_timestamp("check_date", row.try_get("check_date")?)?;
    let payment = match (check_number, check_date) {
        (Some(check_number), Some(check_date)) => Some(PaymentRecord { check_number, check_date }),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "check_number and check_date must be set together".to_string(),
            ))
        }
    };

    Ok(CostRequest {
        id: CostRequestId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        amount: decode_amount("amount", &amount_raw)?,
        attachments: decode_json("attachments_json", &row.try_get::<String, _>("attachments_json")?)?,
        created_by: UserId(row.try_get("created_by")?),
        status,
        approved_by_l1: decode_record::<ApprovalRecord>(
            "approved_by_l1_json",
            row.try_get("approved_by_l1_json")?,
        )?,
        approved_by_l2: decode_record::<ApprovalRecord>(
            "approved_by_l2_json",
            row.try_get("approved_by_l2_json")?,
        )?,
        approved_by_final: decode_record::<ApprovalRecord>(
            "approved_by_final_json",
            row.try_get("approved_by_final_json")?,
        )?,
        rejection: decode_record::<RejectionRecord>("rejection_json", row.try_get("rejection_json")?)?,
        payment,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
