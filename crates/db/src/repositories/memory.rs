use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::{Document, DocumentId, DocumentStatus};
use timebank_core::domain::grant::Grant;
use timebank_core::domain::job::JobRun;
use timebank_core::domain::step::{Step, StepId, StepStatus};
use timebank_core::domain::subject::SubjectId;
use timebank_core::domain::usage::Usage;

use super::{DocumentStore, JobRunStore, LedgerStore, RepositoryError};

/// Test double mirroring the SQL store's conditional-update semantics,
/// including `false` returns when the expected prior state is gone.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Document>>,
    steps: RwLock<Vec<Step>>,
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert_with_steps(
        &self,
        document: Document,
        steps: Vec<Step>,
    ) -> Result<(), RepositoryError> {
        let mut documents = self.documents.write().await;
        let mut all_steps = self.steps.write().await;
        documents.insert(document.id.0.clone(), document);
        all_steps.extend(steps);
        Ok(())
    }

    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&id.0).cloned())
    }

    async fn steps_for(&self, id: &DocumentId) -> Result<Vec<Step>, RepositoryError> {
        let steps = self.steps.read().await;
        let mut matching: Vec<Step> =
            steps.iter().filter(|step| &step.document_id == id).cloned().collect();
        matching.sort_by(|left, right| {
            left.order.cmp(&right.order).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(matching)
    }

    async fn pending_step_for(
        &self,
        id: &DocumentId,
        actor: &SubjectId,
    ) -> Result<Option<Step>, RepositoryError> {
        let steps = self.steps.read().await;
        Ok(steps
            .iter()
            .filter(|step| {
                &step.document_id == id
                    && step.status == StepStatus::Pending
                    && step.acts_for(actor)
            })
            .min_by_key(|step| step.order)
            .cloned())
    }

    async fn approve_step(
        &self,
        id: &StepId,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut steps = self.steps.write().await;
        match steps.iter_mut().find(|step| &step.id == id && step.status == StepStatus::Pending) {
            Some(step) => {
                step.status = StepStatus::Approved;
                step.approved_at = Some(approved_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reject_step(&self, id: &StepId) -> Result<bool, RepositoryError> {
        let mut steps = self.steps.write().await;
        match steps.iter_mut().find(|step| &step.id == id && step.status == StepStatus::Pending) {
            Some(step) => {
                step.status = StepStatus::Rejected;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_delegate(
        &self,
        id: &StepId,
        delegate: &SubjectId,
    ) -> Result<bool, RepositoryError> {
        let mut steps = self.steps.write().await;
        match steps.iter_mut().find(|step| &step.id == id && step.status == StepStatus::Pending) {
            Some(step) => {
                step.delegate = Some(delegate.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn advance_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        to_order: u32,
    ) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(&id.0) else {
            return Ok(false);
        };
        if document.status != DocumentStatus::Pending || document.current_step != Some(from_order) {
            return Ok(false);
        }

        document.current_step = Some(to_order);

        let mut steps = self.steps.write().await;
        for step in steps.iter_mut().filter(|step| {
            &step.document_id == id
                && step.order == to_order
                && step.status == StepStatus::Waiting
        }) {
            step.status = StepStatus::Pending;
        }
        Ok(true)
    }

    async fn complete_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(&id.0) else {
            return Ok(false);
        };
        if document.status != DocumentStatus::Pending || document.current_step != Some(from_order) {
            return Ok(false);
        }

        document.status = DocumentStatus::Approved;
        document.current_step = None;
        document.approved_at = Some(approved_at);
        Ok(true)
    }

    async fn reject_document(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(&id.0) else {
            return Ok(false);
        };
        if document.status != DocumentStatus::Pending {
            return Ok(false);
        }

        document.status = DocumentStatus::Rejected;
        document.current_step = None;
        Ok(true)
    }

    async fn cancel_document(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let mut documents = self.documents.write().await;
        let Some(document) = documents.get_mut(&id.0) else {
            return Ok(false);
        };
        if document.status != DocumentStatus::Pending {
            return Ok(false);
        }

        document.status = DocumentStatus::Cancelled;
        document.current_step = None;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    grants: RwLock<Vec<Grant>>,
    usages: RwLock<Vec<Usage>>,
    balances: RwLock<HashMap<String, Balance>>,
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_grant_if_absent(&self, grant: Grant) -> Result<bool, RepositoryError> {
        let mut grants = self.grants.write().await;
        let duplicate = grants.iter().any(|existing| {
            existing.subject == grant.subject
                && existing.kind == grant.kind
                && existing.granted_date == grant.granted_date
        });
        if duplicate {
            return Ok(false);
        }
        grants.push(grant);
        Ok(true)
    }

    async fn grants_for(&self, subject: &SubjectId) -> Result<Vec<Grant>, RepositoryError> {
        let grants = self.grants.read().await;
        let mut matching: Vec<Grant> =
            grants.iter().filter(|grant| &grant.subject == subject).cloned().collect();
        matching.sort_by(|left, right| {
            left.expiration_date
                .cmp(&right.expiration_date)
                .then_with(|| left.created_at.cmp(&right.created_at))
        });
        Ok(matching)
    }

    async fn usages_for_subject(&self, subject: &SubjectId) -> Result<Vec<Usage>, RepositoryError> {
        let grants = self.grants.read().await;
        let usages = self.usages.read().await;
        let grant_ids: Vec<&str> = grants
            .iter()
            .filter(|grant| &grant.subject == subject)
            .map(|grant| grant.id.0.as_str())
            .collect();
        Ok(usages
            .iter()
            .filter(|usage| grant_ids.contains(&usage.grant_id.0.as_str()))
            .cloned()
            .collect())
    }

    async fn usages_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<Usage>, RepositoryError> {
        let usages = self.usages.read().await;
        Ok(usages.iter().filter(|usage| &usage.document_id == document_id).cloned().collect())
    }

    async fn post_usages(
        &self,
        new_usages: Vec<Usage>,
        balance: Balance,
    ) -> Result<(), RepositoryError> {
        let mut usages = self.usages.write().await;
        for usage in &new_usages {
            let duplicate = usages.iter().any(|existing| {
                existing.document_id == usage.document_id && existing.grant_id == usage.grant_id
            });
            if duplicate {
                return Err(RepositoryError::Decode(format!(
                    "usage already posted for document `{}` against grant `{}`",
                    usage.document_id.0, usage.grant_id.0
                )));
            }
        }
        usages.extend(new_usages);

        let mut balances = self.balances.write().await;
        balances.insert(balance.subject.0.clone(), balance);
        Ok(())
    }

    async fn save_balance(&self, balance: Balance) -> Result<(), RepositoryError> {
        let mut balances = self.balances.write().await;
        balances.insert(balance.subject.0.clone(), balance);
        Ok(())
    }

    async fn find_balance(&self, subject: &SubjectId) -> Result<Option<Balance>, RepositoryError> {
        let balances = self.balances.read().await;
        Ok(balances.get(&subject.0).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryJobRunStore {
    runs: RwLock<Vec<JobRun>>,
}

#[async_trait::async_trait]
impl JobRunStore for InMemoryJobRunStore {
    async fn find_run(
        &self,
        job_name: &str,
        business_date: NaiveDate,
    ) -> Result<Option<JobRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs
            .iter()
            .find(|run| run.job_name == job_name && run.business_date == business_date)
            .cloned())
    }

    async fn insert_run(&self, run: JobRun) -> Result<bool, RepositoryError> {
        let mut runs = self.runs.write().await;
        let duplicate = runs
            .iter()
            .any(|existing| {
                existing.job_name == run.job_name && existing.business_date == run.business_date
            });
        if duplicate {
            return Ok(false);
        }
        runs.push(run);
        Ok(true)
    }
}
