//! Pure allocation logic for the leave ledger: expiration-aware balance
//! computation and FIFO deduction planning. Posting the plan atomically is
//! the engine's job.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::balance::Balance;
use crate::domain::grant::{is_half_day_multiple, Grant, GrantId};
use crate::domain::subject::SubjectId;
use crate::domain::usage::Usage;
use crate::errors::LedgerError;

/// One planned posting against a specific grant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PostingPlan {
    pub grant_id: GrantId,
    pub amount: Decimal,
}

fn used_against(grant: &Grant, usages: &[Usage]) -> Decimal {
    usages
        .iter()
        .filter(|usage| usage.grant_id == grant.id)
        .map(|usage| usage.amount)
        .sum()
}

/// Unconsumed remainder of one grant, ignoring expiration.
pub fn grant_available(grant: &Grant, usages: &[Usage]) -> Decimal {
    grant.amount - used_against(grant, usages)
}

/// Sum over allocatable grants minus the usage posted against them.
/// Usage against expired grants drops out together with its grant.
pub fn available(grants: &[Grant], usages: &[Usage], as_of: NaiveDate) -> Decimal {
    grants
        .iter()
        .filter(|grant| grant.is_allocatable(as_of))
        .map(|grant| grant_available(grant, usages))
        .sum()
}

/// Candidates sorted for consumption: soonest expiration first, insertion
/// order as the tie-break.
fn fifo_candidates<'a>(grants: &'a [Grant], as_of: NaiveDate) -> Vec<&'a Grant> {
    let mut candidates: Vec<&Grant> =
        grants.iter().filter(|grant| grant.is_allocatable(as_of)).collect();
    candidates.sort_by(|left, right| {
        left.expiration_date
            .cmp(&right.expiration_date)
            .then_with(|| left.created_at.cmp(&right.created_at))
    });
    candidates
}

/// Greedy FIFO allocation of `amount` across the subject's grants.
/// All-or-nothing: a shortfall returns `InsufficientBalance` and plans no
/// postings at all.
pub fn plan_deduction(
    grants: &[Grant],
    usages: &[Usage],
    amount: Decimal,
    as_of: NaiveDate,
) -> Result<Vec<PostingPlan>, LedgerError> {
    if amount <= Decimal::ZERO || !is_half_day_multiple(amount) {
        return Err(LedgerError::InvalidAmount {
            amount,
            reason: "deduction must be a positive multiple of 0.5 days".to_string(),
        });
    }

    let mut remaining = amount;
    let mut plan = Vec::new();

    for grant in fifo_candidates(grants, as_of) {
        let available = grant_available(grant, usages);
        if available <= Decimal::ZERO {
            continue;
        }

        let take = remaining.min(available);
        plan.push(PostingPlan { grant_id: grant.id.clone(), amount: take });
        remaining -= take;
        if remaining.is_zero() {
            return Ok(plan);
        }
    }

    Err(LedgerError::InsufficientBalance {
        requested: amount,
        available: amount - remaining,
    })
}

/// Full balance snapshot for the cache row.
pub fn snapshot(
    subject: &SubjectId,
    grants: &[Grant],
    usages: &[Usage],
    as_of: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Balance {
    let mut total = Decimal::ZERO;
    let mut used = Decimal::ZERO;
    for grant in grants.iter().filter(|grant| grant.is_allocatable(as_of)) {
        total += grant.amount;
        used += used_against(grant, usages);
    }

    Balance { subject: subject.clone(), total, used, remaining: total - used, computed_at }
}
