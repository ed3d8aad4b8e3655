use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentId;
use crate::domain::grant::GrantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageId(pub String);

/// Append-only posting that consumes part of a grant. The document id is
/// the idempotency key: the deduction routine writes at most one usage set
/// per document. Manual deductions carry a synthetic `manual:<uuid>` id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub id: UsageId,
    pub document_id: DocumentId,
    pub grant_id: GrantId,
    pub amount: Decimal,
    pub used_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Usage {
    pub fn synthetic_document_id() -> DocumentId {
        DocumentId(format!("manual:{}", uuid::Uuid::new_v4()))
    }
}
