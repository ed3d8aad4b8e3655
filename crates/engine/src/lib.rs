pub mod approval;
pub mod errors;
pub mod gateway;
pub mod ledger;
pub mod notify;

pub use approval::{ApprovalEngine, ApprovalOutcome, DeductionOutcome, SubmitRequest};
pub use errors::EngineError;
pub use gateway::{DocumentGateway, DocumentView, ManualDeductionRequest};
pub use ledger::{DeductionReceipt, LedgerService};
pub use notify::{NoopNotifier, Notification, NotificationDispatch, RecordingNotifier};
