use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::subject::SubjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Leave,
    Overtime,
    RemoteWork,
    Expense,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leave => "leave",
            Self::Overtime => "overtime",
            Self::RemoteWork => "remote_work",
            Self::Expense => "expense",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "leave" => Some(Self::Leave),
            "overtime" => Some(Self::Overtime),
            "remote_work" => Some(Self::RemoteWork),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// An approvable request. Documents enter storage on submission (status
/// `Pending`, `current_step = Some(first order)`), are mutated only by the
/// approval engine, and are never deleted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub subject: SubjectId,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    pub current_step: Option<u32>,
    pub entitlement_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Terminal status and a cleared current step go together; a pending
    /// document always points at its active order.
    pub fn invariant_holds(&self) -> bool {
        match self.status {
            DocumentStatus::Approved | DocumentStatus::Rejected | DocumentStatus::Cancelled => {
                self.current_step.is_none()
            }
            DocumentStatus::Pending => self.current_step.is_some(),
            DocumentStatus::Draft => true,
        }
    }

    pub fn consumes_entitlement(&self) -> bool {
        self.entitlement_amount > Decimal::ZERO
    }
}
