use serde::Serialize;

use timebank_core::config::{AppConfig, LoadOptions};
use timebank_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: "pass", detail: detail.into() }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self { name, status: "fail", detail: detail.into() }
    }
}

pub fn run(json: bool) -> String {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config", "configuration loads and validates"));
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config", format!("configuration issue: {error}")));
            None
        }
    };

    if let Some(config) = config {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => {
                let check = runtime.block_on(async {
                    match connect_with_settings(
                        &config.database.url,
                        config.database.max_connections,
                        config.database.timeout_secs,
                    )
                    .await
                    {
                        Ok(pool) => {
                            let probe =
                                sqlx_probe(&pool).await.map(|_| {
                                    DoctorCheck::pass("database", "connection and query succeeded")
                                });
                            pool.close().await;
                            probe.unwrap_or_else(|error| {
                                DoctorCheck::fail("database", format!("query failed: {error}"))
                            })
                        }
                        Err(error) => {
                            DoctorCheck::fail("database", format!("connection failed: {error}"))
                        }
                    }
                });
                checks.push(check);
            }
            Err(error) => {
                checks.push(DoctorCheck::fail("runtime", format!("runtime init failed: {error}")));
            }
        }
    }

    let healthy = checks.iter().all(|check| check.status == "pass");
    let report = DoctorReport { status: if healthy { "ready" } else { "degraded" }, checks };

    if json {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"error\":\"{error}\"}}"))
    } else {
        let mut lines = vec![format!("timebank doctor: {}", report.status)];
        for check in &report.checks {
            lines.push(format!("  [{}] {} - {}", check.status, check.name, check.detail));
        }
        lines.join("\n")
    }
}

async fn sqlx_probe(pool: &timebank_db::DbPool) -> Result<(), String> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| ())
        .map_err(|error| error.to_string())
}
