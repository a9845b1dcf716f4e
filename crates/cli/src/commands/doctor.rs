use haulquote_core::config::{AppConfig, LlmProvider, LoadOptions};
use haulquote_core::retrieval::SNAPSHOT_FILE;
use haulquote_db::{connect_with_settings, migrations};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_model_endpoint(&config));
            checks.push(check_database_schema(&config));
            checks.push(check_rule_index(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["model_endpoint", "database_schema", "rule_index"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_model_endpoint(config: &AppConfig) -> DoctorCheck {
    let provider = match config.llm.provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Ollama => "ollama",
    };
    if let Err(error) = config.llm.require_api_key() {
        return DoctorCheck {
            name: "model_endpoint",
            status: CheckStatus::Fail,
            details: format!("{provider} at {}: {error}", config.llm.endpoint()),
        };
    }
    DoctorCheck {
        name: "model_endpoint",
        status: CheckStatus::Pass,
        details: format!(
            "{provider} model `{}` at {}, embeddings `{}` at {}",
            config.llm.model,
            config.llm.endpoint(),
            config.embeddings.model,
            config.embeddings.endpoint(&config.llm)
        ),
    }
}

fn check_database_schema(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_schema",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        let applied = migrations::applied(&pool)
            .await
            .map_err(|error| format!("failed to read migration history: {error}"));
        pool.close().await;
        applied
    });

    let known = migrations::available();
    match result {
        Ok(applied) if applied >= known => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!(
                "connected using `{}`, {applied} migrations applied",
                config.database.url
            ),
        },
        Ok(applied) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!("{applied} of {known} migrations applied; run `haulquote migrate`"),
        },
        Err(error) => {
            DoctorCheck { name: "database_schema", status: CheckStatus::Fail, details: error }
        }
    }
}

fn check_rule_index(config: &AppConfig) -> DoctorCheck {
    let directory = &config.index.directory;
    if directory.join(SNAPSHOT_FILE).is_file() {
        DoctorCheck {
            name: "rule_index",
            status: CheckStatus::Pass,
            details: format!("index present at `{}`", directory.display()),
        }
    } else {
        DoctorCheck {
            name: "rule_index",
            status: CheckStatus::Fail,
            details: format!(
                "no index snapshot at `{}`; run `haulquote index` to build it",
                directory.display()
            ),
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
