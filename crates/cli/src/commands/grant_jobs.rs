use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use timebank_core::config::{AppConfig, LoadOptions};
use timebank_db::{connect_with_settings, migrations, SqlAuditLog, SqlJobRunStore, SqlLedgerStore};
use timebank_engine::LedgerService;
use timebank_jobs::{
    AttendanceAwardJob, DirectoryFixture, FiscalAnnualGrantJob, GrantJobContext,
    InMemorySubjectDirectory, MonthlyGrantJob,
};

use crate::commands::CommandResult;
use crate::GrantJobKind;

pub fn run(job: GrantJobKind, subjects_path: &Path, date: Option<NaiveDate>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "grant-jobs",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let fixture_raw = match std::fs::read_to_string(subjects_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "grant-jobs",
                "subject_directory",
                format!("could not read subject export `{}`: {error}", subjects_path.display()),
                4,
            );
        }
    };
    let fixture: DirectoryFixture = match serde_json::from_str(&fixture_raw) {
        Ok(fixture) => fixture,
        Err(error) => {
            return CommandResult::failure(
                "grant-jobs",
                "subject_directory",
                format!("could not parse subject export: {error}"),
                4,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "grant-jobs",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let business_trigger = date.unwrap_or_else(|| Utc::now().date_naive());

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 5u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let ledger = LedgerService::new(
            Arc::new(SqlLedgerStore::new(pool.clone())),
            Arc::new(SqlAuditLog::new(pool.clone())),
        );
        let ctx = GrantJobContext {
            ledger,
            directory: Arc::new(InMemorySubjectDirectory::from_fixture(fixture)),
            runs: Arc::new(SqlJobRunStore::new(pool.clone())),
            config: config.jobs.clone(),
        };

        let run = match job {
            GrantJobKind::Monthly => MonthlyGrantJob::new(ctx).run(business_trigger).await,
            GrantJobKind::Annual => FiscalAnnualGrantJob::new(ctx).run(business_trigger).await,
            GrantJobKind::Attendance => AttendanceAwardJob::new(ctx).run(business_trigger).await,
        }
        .map_err(|error| ("job_execution", error.to_string(), 6u8))?;

        pool.close().await;
        serde_json::to_string(&run).map_err(|error| ("serialization", error.to_string(), 6u8))
    });

    match result {
        Ok(summary) => CommandResult { exit_code: 0, output: summary },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("grant-jobs", error_class, message, exit_code)
        }
    }
}
