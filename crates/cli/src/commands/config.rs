use serde::Serialize;

use timebank_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    database: DatabaseSection,
    server: ServerSection,
    jobs: JobsSection,
    logging: LoggingSection,
}

#[derive(Debug, Serialize)]
struct DatabaseSection {
    url: String,
    max_connections: u32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ServerSection {
    bind_address: String,
    port: u16,
    graceful_shutdown_secs: u64,
}

#[derive(Debug, Serialize)]
struct JobsSection {
    batch_size: u32,
    monthly_late_limit: u32,
    annual_base_days: u32,
    manual_deduction_min_privilege: u8,
}

#[derive(Debug, Serialize)]
struct LoggingSection {
    level: String,
    format: &'static str,
}

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let effective = EffectiveConfig {
                database: DatabaseSection {
                    url: config.database.url,
                    max_connections: config.database.max_connections,
                    timeout_secs: config.database.timeout_secs,
                },
                server: ServerSection {
                    bind_address: config.server.bind_address,
                    port: config.server.port,
                    graceful_shutdown_secs: config.server.graceful_shutdown_secs,
                },
                jobs: JobsSection {
                    batch_size: config.jobs.batch_size,
                    monthly_late_limit: config.jobs.monthly_late_limit,
                    annual_base_days: config.jobs.annual_base_days,
                    manual_deduction_min_privilege: config.jobs.manual_deduction_min_privilege,
                },
                logging: LoggingSection {
                    level: config.logging.level,
                    format: match config.logging.format {
                        LogFormat::Compact => "compact",
                        LogFormat::Pretty => "pretty",
                        LogFormat::Json => "json",
                    },
                },
            };
            serde_json::to_string_pretty(&effective)
                .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
        }
        Err(error) => format!("{{\"error\":\"configuration issue: {error}\"}}"),
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn output_includes_all_sections() {
        let output = super::run();
        // Defaults validate, so the happy path renders every section.
        assert!(output.contains("\"database\""));
        assert!(output.contains("\"jobs\""));
        assert!(output.contains("\"logging\""));
    }
}
