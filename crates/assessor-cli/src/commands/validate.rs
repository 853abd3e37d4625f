//! The `assessor validate` command.

use std::path::PathBuf;

use anyhow::Result;

use assessor_core::parser;
use assessor_core::validation::{tasks_for_sheet, BatchValidator};

pub fn execute(fixture_path: PathBuf) -> Result<()> {
    let fixture = parser::load_fixture(&fixture_path)?;

    println!(
        "Fixture: {} ({} scales, {} questionnaires, {} answer sheets, {} assessments)",
        fixture_path.display(),
        fixture.scales.len(),
        fixture.questionnaires.len(),
        fixture.answer_sheets.len(),
        fixture.assessments.len()
    );

    let warnings = parser::validate_fixture(&fixture);
    for w in &warnings {
        let prefix = w
            .subject
            .as_ref()
            .map(|s| format!("  [{s}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
    let mut total_warnings = warnings.len();

    let validator = BatchValidator;
    for sheet in &fixture.answer_sheets {
        let Some(questionnaire) =
            fixture.questionnaire(&sheet.questionnaire_code, &sheet.questionnaire_version)
        else {
            println!(
                "  [answer sheet {}] WARNING: unknown questionnaire {} v{}",
                sheet.id, sheet.questionnaire_code, sheet.questionnaire_version
            );
            total_warnings += 1;
            continue;
        };

        let results = validator.validate_all(&tasks_for_sheet(questionnaire, sheet));
        let aggregated = validator.aggregate(&results);
        if aggregated.valid {
            continue;
        }
        let mut failures: Vec<_> = aggregated.failures.iter().collect();
        failures.sort();
        for (question, messages) in failures {
            println!(
                "  [answer sheet {}] INVALID: {question}: {}",
                sheet.id,
                messages.join("; ")
            );
        }
        total_warnings += aggregated.failed_tasks;
    }

    if total_warnings == 0 {
        println!("All fixtures valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
