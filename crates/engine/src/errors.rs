use thiserror::Error;

use timebank_core::errors::{LedgerError, WorkflowError};
use timebank_db::RepositoryError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("data integrity violation: {0}")]
    DataIntegrity(String),
    #[error("insufficient privilege: required {required}, actual {actual}")]
    InsufficientPrivilege { required: u8, actual: u8 },
}

impl From<RepositoryError> for EngineError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use timebank_core::errors::WorkflowError;
    use timebank_db::RepositoryError;

    use super::EngineError;

    #[test]
    fn repository_failures_map_to_persistence() {
        let error: EngineError = RepositoryError::Decode("bad row".to_string()).into();
        assert!(matches!(error, EngineError::Persistence(_)));
    }

    #[test]
    fn workflow_errors_pass_through_transparently() {
        let error: EngineError =
            EngineError::from(WorkflowError::DocumentNotFound("DOC-404".to_string()));
        assert_eq!(error.to_string(), "document not found: DOC-404");
    }
}
