use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subject::SubjectId;
use crate::errors::LedgerError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    Monthly,
    FiscalAnnual,
    AttendanceAward,
    OvertimeAward,
    Manual,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::FiscalAnnual => "fiscal_annual",
            Self::AttendanceAward => "attendance_award",
            Self::OvertimeAward => "overtime_award",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "fiscal_annual" => Some(Self::FiscalAnnual),
            "attendance_award" => Some(Self::AttendanceAward),
            "overtime_award" => Some(Self::OvertimeAward),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Grants enter the ledger already approved; the status exists so that the
/// allocation filter matches the persisted shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantApprovalStatus {
    Approved,
}

impl GrantApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// Structured audit trail of how a grant amount was computed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationBasis {
    pub rule: String,
    pub inputs: BTreeMap<String, String>,
}

impl CalculationBasis {
    pub fn new(rule: impl Into<String>) -> Self {
        Self { rule: rule.into(), inputs: BTreeMap::new() }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inputs.insert(key.into(), value.into());
        self
    }
}

/// A time-bounded entitlement credit. Immutable after insertion; an expired
/// grant stays stored but is excluded from allocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub subject: SubjectId,
    pub kind: GrantKind,
    pub amount: Decimal,
    pub granted_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub approval_status: GrantApprovalStatus,
    pub calculation_basis: CalculationBasis,
    pub created_at: DateTime<Utc>,
}

impl Grant {
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expiration_date < as_of
    }

    pub fn is_allocatable(&self, as_of: NaiveDate) -> bool {
        !self.is_expired(as_of) && matches!(self.approval_status, GrantApprovalStatus::Approved)
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount {
                amount: self.amount,
                reason: "grant amount must be positive".to_string(),
            });
        }
        if !is_half_day_multiple(self.amount) {
            return Err(LedgerError::InvalidAmount {
                amount: self.amount,
                reason: "grant amount must be a multiple of 0.5 days".to_string(),
            });
        }
        if self.expiration_date < self.granted_date {
            return Err(LedgerError::InvalidAmount {
                amount: self.amount,
                reason: format!(
                    "expiration {} precedes granted date {}",
                    self.expiration_date, self.granted_date
                ),
            });
        }
        Ok(())
    }
}

/// Amounts carry 0.5-day granularity; everything else is a data error.
pub fn is_half_day_multiple(amount: Decimal) -> bool {
    (amount * Decimal::TWO).fract().is_zero()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use crate::domain::subject::SubjectId;
    use crate::errors::LedgerError;

    use super::{
        is_half_day_multiple, CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
    };

    fn grant(amount: Decimal, granted: NaiveDate, expires: NaiveDate) -> Grant {
        Grant {
            id: GrantId("GRT-1".to_string()),
            subject: SubjectId("emp-7".to_string()),
            kind: GrantKind::Monthly,
            amount,
            granted_date: granted,
            expiration_date: expires,
            approval_status: GrantApprovalStatus::Approved,
            calculation_basis: CalculationBasis::new("monthly_anniversary"),
            created_at: Utc::now(),
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn half_day_granularity_is_enforced() {
        assert!(is_half_day_multiple(Decimal::new(5, 1)));
        assert!(is_half_day_multiple(Decimal::new(10, 1)));
        assert!(is_half_day_multiple(Decimal::new(25, 1)));
        assert!(!is_half_day_multiple(Decimal::new(3, 1)));
        assert!(!is_half_day_multiple(Decimal::new(125, 2)));
    }

    #[test]
    fn expired_grants_are_not_allocatable() {
        let grant = grant(Decimal::ONE, date(2026, 1, 1), date(2026, 6, 30));
        assert!(grant.is_allocatable(date(2026, 6, 30)));
        assert!(!grant.is_allocatable(date(2026, 7, 1)));
    }

    #[test]
    fn validation_rejects_non_positive_amounts() {
        let grant = grant(Decimal::ZERO, date(2026, 1, 1), date(2026, 12, 31));
        assert!(matches!(grant.validate(), Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn validation_rejects_expiration_before_granted_date() {
        let grant = grant(Decimal::ONE, date(2026, 5, 1), date(2026, 4, 30));
        assert!(matches!(grant.validate(), Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn calculation_basis_keeps_ordered_inputs() {
        let basis = CalculationBasis::new("fiscal_annual_proration")
            .with_input("days_employed", "200")
            .with_input("base_days", "15");
        assert_eq!(basis.inputs.len(), 2);
        assert_eq!(basis.inputs.get("base_days").map(String::as_str), Some("15"));
    }

    #[test]
    fn kind_round_trips_from_storage_encoding() {
        for kind in [
            GrantKind::Monthly,
            GrantKind::FiscalAnnual,
            GrantKind::AttendanceAward,
            GrantKind::OvertimeAward,
            GrantKind::Manual,
        ] {
            assert_eq!(GrantKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(
            GrantApprovalStatus::parse(GrantApprovalStatus::Approved.as_str()),
            Some(GrantApprovalStatus::Approved)
        );
    }
}
