pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::balance::Balance;
pub use domain::document::{Document, DocumentId, DocumentKind, DocumentStatus};
pub use domain::grant::{
    is_half_day_multiple, CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
};
pub use domain::job::{JobRun, JobRunId, SubjectOutcome};
pub use domain::step::{ApprovalRank, Step, StepId, StepMode, StepStatus};
pub use domain::subject::{
    AttendanceRecord, AttendanceSummary, EmploymentStatus, SubjectId, SubjectProfile,
};
pub use domain::usage::{Usage, UsageId};
pub use errors::{LedgerError, WorkflowError};
pub use ledger::PostingPlan;
pub use workflow::{StepResolution, StepSeed};
