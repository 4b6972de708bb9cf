use hrdesk_core::config::{AppConfig, LlmProvider, LoadOptions};
use hrdesk_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                format!("configuration loaded for environment `{}`", config.bot.environment),
            ));
            checks.push(check_routing(&config));
            checks.push(check_model(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            let details = error.to_string();
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, details));
            for name in ["approval_routing", "language_model", "database_connectivity", "schema"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_routing(config: &AppConfig) -> DoctorCheck {
    match config.bot.default_approver.as_deref() {
        Some(approver) => DoctorCheck::new(
            "approval_routing",
            CheckStatus::Pass,
            format!("requests without a manager go to `{approver}`"),
        ),
        None => DoctorCheck::new(
            "approval_routing",
            CheckStatus::Warn,
            "bot.default_approver is unset; employees without a manager cannot submit leave",
        ),
    }
}

fn check_model(config: &AppConfig) -> DoctorCheck {
    match config.llm.provider {
        LlmProvider::Disabled => DoctorCheck::new(
            "language_model",
            CheckStatus::Warn,
            "llm.provider is disabled; intents come from keyword shortcuts only",
        ),
        provider => DoctorCheck::new(
            "language_model",
            CheckStatus::Pass,
            format!("{provider:?} model `{}`", config.llm.model),
        ),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::new(
                        "database_connectivity",
                        CheckStatus::Fail,
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::new("schema", CheckStatus::Skipped, "database unreachable"),
                ];
            }
        };

        let checks = vec![
            DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            check_schema(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_schema(pool: &DbPool) -> DoctorCheck {
    let expected = migrations::latest_version();

    match migrations::applied_version(pool).await {
        Ok(Some(version)) if version >= expected => DoctorCheck::new(
            "schema",
            CheckStatus::Pass,
            format!("schema is at migration {version}"),
        ),
        Ok(Some(version)) => DoctorCheck::new(
            "schema",
            CheckStatus::Fail,
            format!("schema is at migration {version} of {expected}; run `hrdesk migrate`"),
        ),
        Ok(None) => DoctorCheck::new(
            "schema",
            CheckStatus::Fail,
            "no migrations applied; run `hrdesk migrate`",
        ),
        Err(error) => DoctorCheck::new(
            "schema",
            CheckStatus::Fail,
            format!("could not read migration history: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
