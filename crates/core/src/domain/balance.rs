use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subject::SubjectId;

/// Derived read cache of one subject's entitlement position. Recomputed
/// after every grant or usage insertion; never the source of truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub subject: SubjectId,
    pub total: Decimal,
    pub used: Decimal,
    pub remaining: Decimal,
    pub computed_at: DateTime<Utc>,
}

impl Balance {
    pub fn empty(subject: SubjectId, computed_at: DateTime<Utc>) -> Self {
        Self {
            subject,
            total: Decimal::ZERO,
            used: Decimal::ZERO,
            remaining: Decimal::ZERO,
            computed_at,
        }
    }
}
