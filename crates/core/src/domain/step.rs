use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::document::DocumentId;
use crate::domain::subject::SubjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    Single,
    Agreement,
}

impl StepMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Agreement => "agreement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Some(Self::Single),
            "agreement" => Some(Self::Agreement),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Waiting,
    Pending,
    Approved,
    Rejected,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waiting" => Some(Self::Waiting),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One approval checkpoint. Several steps may share an order: that order
/// resolves only when every step at it is approved (agreement mode). The
/// approver of record never changes; a delegate only swaps the effective
/// actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub document_id: DocumentId,
    pub order: u32,
    pub approver: SubjectId,
    pub delegate: Option<SubjectId>,
    pub mode: StepMode,
    pub status: StepStatus,
    pub is_last: bool,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn acts_for(&self, actor: &SubjectId) -> bool {
        &self.approver == actor || self.delegate.as_ref() == Some(actor)
    }
}

/// One rank in the submitted approver list. A rank with several approvers
/// requires unanimous agreement before the document advances past it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ApprovalRank {
    Single { approver: SubjectId },
    Agreement { approvers: Vec<SubjectId> },
}

impl ApprovalRank {
    pub fn mode(&self) -> StepMode {
        match self {
            Self::Single { .. } => StepMode::Single,
            Self::Agreement { .. } => StepMode::Agreement,
        }
    }

    pub fn approvers(&self) -> Vec<&SubjectId> {
        match self {
            Self::Single { approver } => vec![approver],
            Self::Agreement { approvers } => approvers.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::document::DocumentId;
    use crate::domain::subject::SubjectId;

    use super::{ApprovalRank, Step, StepId, StepMode, StepStatus};

    #[test]
    fn step_matches_approver_and_delegate() {
        let step = Step {
            id: StepId("STEP-1".to_string()),
            document_id: DocumentId("DOC-1".to_string()),
            order: 1,
            approver: SubjectId("mgr-1".to_string()),
            delegate: Some(SubjectId("mgr-2".to_string())),
            mode: StepMode::Single,
            status: StepStatus::Pending,
            is_last: false,
            approved_at: Some(Utc::now()),
        };

        assert!(step.acts_for(&SubjectId("mgr-1".to_string())));
        assert!(step.acts_for(&SubjectId("mgr-2".to_string())));
        assert!(!step.acts_for(&SubjectId("mgr-3".to_string())));
    }

    #[test]
    fn rank_exposes_mode_and_approvers() {
        let single = ApprovalRank::Single { approver: SubjectId("mgr-1".to_string()) };
        assert_eq!(single.mode(), StepMode::Single);
        assert_eq!(single.approvers().len(), 1);

        let agreement = ApprovalRank::Agreement {
            approvers: vec![SubjectId("hr-1".to_string()), SubjectId("hr-2".to_string())],
        };
        assert_eq!(agreement.mode(), StepMode::Agreement);
        assert_eq!(agreement.approvers().len(), 2);
    }

    #[test]
    fn status_round_trips_from_storage_encoding() {
        for status in
            [StepStatus::Waiting, StepStatus::Pending, StepStatus::Approved, StepStatus::Rejected]
        {
            assert_eq!(StepStatus::parse(status.as_str()), Some(status));
        }
        for mode in [StepMode::Single, StepMode::Agreement] {
            assert_eq!(StepMode::parse(mode.as_str()), Some(mode));
        }
    }
}
