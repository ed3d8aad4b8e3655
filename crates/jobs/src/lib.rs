pub mod annual;
pub mod attendance;
pub mod calendar;
pub mod directory;
pub mod monthly;
pub mod runner;

pub use annual::{FiscalAnnualGrantJob, ANNUAL_JOB};
pub use attendance::{AttendanceAwardJob, ATTENDANCE_JOB};
pub use directory::{
    DateRange, DirectoryError, DirectoryFixture, InMemorySubjectDirectory, SubjectDirectory,
    SubjectFixture,
};
pub use monthly::{MonthlyGrantJob, MONTHLY_JOB};
pub use runner::{GrantJobContext, JobError};
