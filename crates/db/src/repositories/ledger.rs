use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::DocumentId;
use timebank_core::domain::grant::{
    CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
};
use timebank_core::domain::subject::SubjectId;
use timebank_core::domain::usage::{Usage, UsageId};

use super::{LedgerStore, RepositoryError};
use crate::DbPool;

pub struct SqlLedgerStore {
    pool: DbPool,
}

impl SqlLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_decimal(raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse().map_err(|_| RepositoryError::Decode(format!("invalid amount `{raw}`")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    raw.parse().map_err(|_| RepositoryError::Decode(format!("invalid date `{raw}`")))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_grant(row: &sqlx::sqlite::SqliteRow) -> Result<Grant, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let subject_id: String = decode(row.try_get("subject_id"))?;
    let kind_str: String = decode(row.try_get("kind"))?;
    let amount_str: String = decode(row.try_get("amount"))?;
    let granted_date_str: String = decode(row.try_get("granted_date"))?;
    let expiration_date_str: String = decode(row.try_get("expiration_date"))?;
    let approval_status_str: String = decode(row.try_get("approval_status"))?;
    let basis_json: String = decode(row.try_get("calculation_basis"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    let kind = GrantKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown grant kind `{kind_str}`")))?;
    let approval_status = GrantApprovalStatus::parse(&approval_status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown grant status `{approval_status_str}`"))
    })?;
    let calculation_basis: CalculationBasis = serde_json::from_str(&basis_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid calculation basis: {e}")))?;

    Ok(Grant {
        id: GrantId(id),
        subject: SubjectId(subject_id),
        kind,
        amount: parse_decimal(&amount_str)?,
        granted_date: parse_date(&granted_date_str)?,
        expiration_date: parse_date(&expiration_date_str)?,
        approval_status,
        calculation_basis,
        created_at: parse_datetime(&created_at_str)?,
    })
}

fn row_to_usage(row: &sqlx::sqlite::SqliteRow) -> Result<Usage, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let document_id: String = decode(row.try_get("document_id"))?;
    let grant_id: String = decode(row.try_get("grant_id"))?;
    let amount_str: String = decode(row.try_get("amount"))?;
    let used_date_str: String = decode(row.try_get("used_date"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;

    Ok(Usage {
        id: UsageId(id),
        document_id: DocumentId(document_id),
        grant_id: GrantId(grant_id),
        amount: parse_decimal(&amount_str)?,
        used_date: parse_date(&used_date_str)?,
        created_at: parse_datetime(&created_at_str)?,
    })
}

fn row_to_balance(row: &sqlx::sqlite::SqliteRow) -> Result<Balance, RepositoryError> {
    let subject_id: String = decode(row.try_get("subject_id"))?;
    let total_str: String = decode(row.try_get("total"))?;
    let used_str: String = decode(row.try_get("used"))?;
    let remaining_str: String = decode(row.try_get("remaining"))?;
    let computed_at_str: String = decode(row.try_get("computed_at"))?;

    Ok(Balance {
        subject: SubjectId(subject_id),
        total: parse_decimal(&total_str)?,
        used: parse_decimal(&used_str)?,
        remaining: parse_decimal(&remaining_str)?,
        computed_at: parse_datetime(&computed_at_str)?,
    })
}

async fn insert_usage(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    usage: &Usage,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO leave_usage (id, document_id, grant_id, amount, used_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&usage.id.0)
    .bind(&usage.document_id.0)
    .bind(&usage.grant_id.0)
    .bind(usage.amount.to_string())
    .bind(usage.used_date.to_string())
    .bind(usage.created_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_balance(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    balance: &Balance,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO balance_cache (subject_id, total, used, remaining, computed_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(subject_id) DO UPDATE SET
             total = excluded.total,
             used = excluded.used,
             remaining = excluded.remaining,
             computed_at = excluded.computed_at",
    )
    .bind(&balance.subject.0)
    .bind(balance.total.to_string())
    .bind(balance.used.to_string())
    .bind(balance.remaining.to_string())
    .bind(balance.computed_at.to_rfc3339())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait::async_trait]
impl LedgerStore for SqlLedgerStore {
    async fn insert_grant_if_absent(&self, grant: Grant) -> Result<bool, RepositoryError> {
        let basis_json = serde_json::to_string(&grant.calculation_basis)
            .map_err(|e| RepositoryError::Decode(format!("calculation basis encode: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO leave_grant (id, subject_id, kind, amount, granted_date,
                                      expiration_date, approval_status, calculation_basis,
                                      created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(subject_id, kind, granted_date) DO NOTHING",
        )
        .bind(&grant.id.0)
        .bind(&grant.subject.0)
        .bind(grant.kind.as_str())
        .bind(grant.amount.to_string())
        .bind(grant.granted_date.to_string())
        .bind(grant.expiration_date.to_string())
        .bind(grant.approval_status.as_str())
        .bind(basis_json)
        .bind(grant.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn grants_for(&self, subject: &SubjectId) -> Result<Vec<Grant>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, subject_id, kind, amount, granted_date, expiration_date,
                    approval_status, calculation_basis, created_at
             FROM leave_grant
             WHERE subject_id = ?
             ORDER BY expiration_date ASC, created_at ASC",
        )
        .bind(&subject.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_grant).collect()
    }

    async fn usages_for_subject(&self, subject: &SubjectId) -> Result<Vec<Usage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT u.id, u.document_id, u.grant_id, u.amount, u.used_date, u.created_at
             FROM leave_usage u
             JOIN leave_grant g ON g.id = u.grant_id
             WHERE g.subject_id = ?
             ORDER BY u.created_at ASC, u.id ASC",
        )
        .bind(&subject.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }

    async fn usages_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<Usage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, document_id, grant_id, amount, used_date, created_at
             FROM leave_usage
             WHERE document_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&document_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }

    async fn post_usages(
        &self,
        usages: Vec<Usage>,
        balance: Balance,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for usage in &usages {
            insert_usage(&mut tx, usage).await?;
        }
        upsert_balance(&mut tx, &balance).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn save_balance(&self, balance: Balance) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        upsert_balance(&mut tx, &balance).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_balance(&self, subject: &SubjectId) -> Result<Option<Balance>, RepositoryError> {
        let row = sqlx::query(
            "SELECT subject_id, total, used, remaining, computed_at
             FROM balance_cache WHERE subject_id = ?",
        )
        .bind(&subject.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_balance(r)?)),
            None => Ok(None),
        }
    }
}
