//! The `assessor evaluate` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use assessor_core::assessment::{AssessmentId, AssessmentStatus};
use assessor_core::batch::CancelToken;
use assessor_core::engine::{BatchSummary, EvaluationEngine};
use assessor_core::parser;
use assessor_core::registry::StrategyRegistry;
use assessor_core::report::InterpretReport;
use assessor_core::traits::{AssessmentRepository, ReportRepository};
use assessor_store::config::load_config_from;
use assessor_store::{InMemoryStore, RecordingPublisher};

#[derive(Serialize)]
struct JsonOutput<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    summary: &'a BatchSummary,
    reports: Vec<InterpretReport>,
    events_published: usize,
}

pub async fn execute(
    fixture_path: PathBuf,
    ids_str: Option<String>,
    parallelism: Option<usize>,
    retry_failed: bool,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
        config.parallelism = p;
    }

    let fixture = parser::load_fixture(&fixture_path)?;
    let warnings = parser::validate_fixture(&fixture);
    if !warnings.is_empty() {
        eprintln!(
            "Warning: fixture has {} issue(s); run `assessor validate` for details.",
            warnings.len()
        );
    }

    let ids = match &ids_str {
        Some(s) => parse_ids(s)?,
        None => fixture.assessment_ids(),
    };
    anyhow::ensure!(!ids.is_empty(), "no assessments to evaluate");

    let store = Arc::new(InMemoryStore::from_fixture(fixture));
    if retry_failed {
        for id in &ids {
            retry_if_failed(&store, *id).await?;
        }
    }

    let publisher = Arc::new(RecordingPublisher::new());
    let engine = EvaluationEngine::new(
        store.repositories(),
        Arc::new(StrategyRegistry::with_defaults()),
        config.to_engine_config(),
    )
    .with_event_publisher(publisher.clone());

    let cancel = match config.batch_timeout_ms {
        Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
        None => CancelToken::new(),
    };

    eprintln!(
        "assessor v{}: evaluating {} assessments (parallelism {})",
        env!("CARGO_PKG_VERSION"),
        ids.len(),
        config.parallelism
    );

    let summary = engine.evaluate_batch(&ids, &cancel).await;

    let mut reports = Vec::new();
    for item in summary.items.iter().filter(|i| i.succeeded) {
        reports.push(
            ReportRepository::find_by_assessment_id(store.as_ref(), item.assessment_id)
                .await
                .with_context(|| format!("report missing for assessment {}", item.assessment_id))?,
        );
    }

    if format == "json" {
        let output = JsonOutput {
            generated_at: chrono::Utc::now(),
            summary: &summary,
            reports,
            events_published: publisher.events().len(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_summary(&ids, &summary, &reports);
        println!(
            "\n{} evaluated: {} succeeded, {} failed, {} skipped",
            summary.total,
            summary.succeeded,
            summary.failed,
            summary.skipped.len()
        );
    }

    Ok(())
}

fn parse_ids(s: &str) -> Result<Vec<AssessmentId>> {
    s.split(',')
        .map(|part| {
            let part = part.trim();
            let id: u64 = part
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid assessment id: '{part}'"))?;
            anyhow::ensure!(id != 0, "assessment id must be non-zero");
            Ok(AssessmentId(id))
        })
        .collect()
}

async fn retry_if_failed(store: &InMemoryStore, id: AssessmentId) -> Result<()> {
    let Ok(mut assessment) = AssessmentRepository::find_by_id(store, id).await else {
        return Ok(());
    };
    if assessment.status() != AssessmentStatus::Failed {
        return Ok(());
    }
    assessment.retry_from_failed()?;
    AssessmentRepository::save(store, &assessment).await?;
    tracing::info!("assessment {id} moved back to submitted");
    Ok(())
}

fn print_summary(ids: &[AssessmentId], summary: &BatchSummary, reports: &[InterpretReport]) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Assessment", "Result", "Total", "Risk", "Conclusion"]);

    for id in ids {
        let Some(item) = summary.item(*id) else {
            table.add_row(vec![
                Cell::new(id),
                Cell::new("SKIPPED"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(""),
            ]);
            continue;
        };
        let (result, detail) = if item.succeeded {
            let conclusion = reports
                .iter()
                .find(|r| r.assessment_id == *id)
                .map(|r| r.conclusion.clone())
                .unwrap_or_default();
            ("OK", conclusion)
        } else {
            ("FAIL", item.error.clone().unwrap_or_default())
        };
        table.add_row(vec![
            Cell::new(id),
            Cell::new(result),
            Cell::new(
                item.total_score
                    .map(|s| format!("{s:.1}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(
                item.risk_level
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(detail),
        ]);
    }

    println!("{table}");
}
