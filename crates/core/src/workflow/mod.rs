//! Pure decision logic for the approval step machine. The engine crate
//! applies these decisions through conditional updates; nothing here
//! touches storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::step::{ApprovalRank, Step, StepMode, StepStatus};
use crate::domain::subject::SubjectId;
use crate::errors::WorkflowError;

/// Blueprint for one step row, produced at submission time before ids and
/// timestamps exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSeed {
    pub order: u32,
    pub approver: SubjectId,
    pub mode: StepMode,
    pub status: StepStatus,
    pub is_last: bool,
}

/// Expands the submitted rank list into step rows: orders run 1..N, the
/// first order starts pending and all later orders wait, and every step at
/// the maximum order is marked last.
pub fn plan_steps(ranks: &[ApprovalRank]) -> Result<Vec<StepSeed>, WorkflowError> {
    if ranks.is_empty() {
        return Err(WorkflowError::InvalidSubmission(
            "approver list must contain at least one rank".to_string(),
        ));
    }

    let last_order = ranks.len() as u32;
    let mut seeds = Vec::new();

    for (index, rank) in ranks.iter().enumerate() {
        let order = index as u32 + 1;
        let approvers = rank.approvers();
        if approvers.is_empty() {
            return Err(WorkflowError::InvalidSubmission(format!(
                "rank {order} has no approvers"
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for approver in &approvers {
            if !seen.insert(approver.0.as_str()) {
                return Err(WorkflowError::InvalidSubmission(format!(
                    "rank {order} lists approver `{}` twice",
                    approver.0
                )));
            }
        }

        for approver in approvers {
            seeds.push(StepSeed {
                order,
                approver: approver.clone(),
                mode: rank.mode(),
                status: if order == 1 { StepStatus::Pending } else { StepStatus::Waiting },
                is_last: order == last_order,
            });
        }
    }

    Ok(seeds)
}

/// What the document should do after one step at `order` was approved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepResolution {
    /// Agreement peers at the same order are still unresolved.
    AwaitingPeers,
    /// Every step at `order` is approved; activate the next order.
    Advance { next_order: u32 },
    /// The resolved order was the last one; the document is fully approved.
    Complete,
}

/// The agreement rule over a fresh snapshot of all steps: the document
/// moves past `order` only once every step at that order is approved. A
/// single-mode order trivially satisfies the rule with its one step.
pub fn resolve_after_approval(steps: &[Step], order: u32) -> StepResolution {
    let mut is_last = false;
    for step in steps.iter().filter(|step| step.order == order) {
        if step.status != StepStatus::Approved {
            return StepResolution::AwaitingPeers;
        }
        is_last |= step.is_last;
    }

    if is_last {
        return StepResolution::Complete;
    }

    match steps.iter().map(|step| step.order).filter(|&o| o > order).min() {
        Some(next_order) => StepResolution::Advance { next_order },
        None => StepResolution::Complete,
    }
}
