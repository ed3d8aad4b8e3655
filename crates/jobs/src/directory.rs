use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use timebank_core::domain::subject::{
    AttendanceRecord, AttendanceSummary, EmploymentStatus, SubjectId, SubjectProfile,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("subject directory unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view of the HR directory the jobs depend on. The directory is
/// an external collaborator; this trait is its full surface here.
#[async_trait]
pub trait SubjectDirectory: Send + Sync {
    async fn list_active(&self) -> Result<Vec<SubjectProfile>, DirectoryError>;

    async fn attendance(
        &self,
        subject: &SubjectId,
        period: DateRange,
    ) -> Result<AttendanceSummary, DirectoryError>;
}

/// Serialized directory snapshot, e.g. an export dropped next to the CLI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryFixture {
    pub subjects: Vec<SubjectFixture>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubjectFixture {
    pub id: SubjectId,
    pub hire_date: NaiveDate,
    pub status: EmploymentStatus,
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemorySubjectDirectory {
    profiles: Vec<SubjectProfile>,
    attendance: HashMap<String, Vec<AttendanceRecord>>,
}

impl InMemorySubjectDirectory {
    pub fn new(profiles: Vec<SubjectProfile>) -> Self {
        Self { profiles, attendance: HashMap::new() }
    }

    pub fn with_attendance(
        mut self,
        subject: &SubjectId,
        records: Vec<AttendanceRecord>,
    ) -> Self {
        self.attendance.entry(subject.0.clone()).or_default().extend(records);
        self
    }

    pub fn from_fixture(fixture: DirectoryFixture) -> Self {
        let mut directory = Self::default();
        for subject in fixture.subjects {
            directory.profiles.push(SubjectProfile {
                id: subject.id.clone(),
                hire_date: subject.hire_date,
                status: subject.status,
            });
            if !subject.attendance.is_empty() {
                directory.attendance.insert(subject.id.0, subject.attendance);
            }
        }
        directory
    }
}

#[async_trait]
impl SubjectDirectory for InMemorySubjectDirectory {
    async fn list_active(&self) -> Result<Vec<SubjectProfile>, DirectoryError> {
        Ok(self.profiles.iter().filter(|profile| profile.is_active()).cloned().collect())
    }

    async fn attendance(
        &self,
        subject: &SubjectId,
        period: DateRange,
    ) -> Result<AttendanceSummary, DirectoryError> {
        let records = self.attendance.get(&subject.0).map(Vec::as_slice).unwrap_or_default();
        Ok(AttendanceSummary::from_records(
            records.iter().filter(|record| period.contains(record.date)),
        ))
    }
}
