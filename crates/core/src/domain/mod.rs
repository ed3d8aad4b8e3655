pub mod balance;
pub mod document;
pub mod grant;
pub mod job;
pub mod step;
pub mod subject;
pub mod usage;
