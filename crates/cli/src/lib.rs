pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "timebank",
    about = "Timebank operator CLI",
    long_about = "Operate Timebank migrations, config inspection, readiness checks, and the \
                  entitlement grant jobs.",
    after_help = "Examples:\n  timebank doctor --json\n  timebank config\n  timebank grant-jobs monthly --subjects subjects.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum GrantJobKind {
    #[value(help = "Anniversary-day grants during the first year of tenure")]
    Monthly,
    #[value(help = "Fiscal-year proration of the annual entitlement")]
    Annual,
    #[value(help = "Quarterly attendance award")]
    Attendance,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values as JSON")]
    Config,
    #[command(about = "Validate config and database connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Run one of the entitlement grant jobs against a subject export")]
    GrantJobs {
        #[arg(value_enum, help = "Which grant job to run")]
        job: GrantJobKind,
        #[arg(long, help = "Path to the subject directory export (JSON)")]
        subjects: PathBuf,
        #[arg(long, help = "Business trigger date (YYYY-MM-DD); defaults to today")]
        date: Option<NaiveDate>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::GrantJobs { job, subjects, date } => {
            commands::grant_jobs::run(job, &subjects, date)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
