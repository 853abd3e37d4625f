//! TOML fixture parser.
//!
//! A fixture bundles scales, questionnaires, answer sheets, and assessments
//! in one document so a store can be seeded from disk.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::assessment::{AssessmentId, AssessmentSnapshot};
use crate::interpretation::{validate_ranges, ComparisonOperator, ScoreRange};
use crate::model::{AnswerSheet, MedicalScale, Questionnaire};
use crate::scoring::ScoringStrategyKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub scales: Vec<MedicalScale>,
    #[serde(default)]
    pub questionnaires: Vec<Questionnaire>,
    #[serde(default)]
    pub answer_sheets: Vec<AnswerSheet>,
    #[serde(default)]
    pub assessments: Vec<AssessmentSnapshot>,
}

impl Fixture {
    pub fn assessment_ids(&self) -> Vec<AssessmentId> {
        self.assessments.iter().map(|a| AssessmentId(a.id)).collect()
    }

    pub fn questionnaire(&self, code: &str, version: &str) -> Option<&Questionnaire> {
        self.questionnaires
            .iter()
            .find(|q| q.code == code && q.version == version)
    }

    /// Appends everything from `other`.
    pub fn merge(&mut self, other: Fixture) {
        self.scales.extend(other.scales);
        self.questionnaires.extend(other.questionnaires);
        self.answer_sheets.extend(other.answer_sheets);
        self.assessments.extend(other.assessments);
    }
}

/// Parse a single fixture file.
pub fn parse_fixture(path: &Path) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture file: {}", path.display()))?;

    parse_fixture_str(&content, path)
}

/// Parse fixture TOML from a string (useful for testing).
pub fn parse_fixture_str(content: &str, source_path: &Path) -> Result<Fixture> {
    toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
}

/// Recursively load and merge every `.toml` fixture in a directory.
/// Files that fail to parse are skipped with a warning.
pub fn load_fixture_directory(dir: &Path) -> Result<Fixture> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        paths.push(entry?.path());
    }
    paths.sort();

    let mut fixture = Fixture::default();
    for path in paths {
        if path.is_dir() {
            fixture.merge(load_fixture_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_fixture(&path) {
                Ok(parsed) => fixture.merge(parsed),
                Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
            }
        }
    }
    Ok(fixture)
}

/// Loads a fixture from a file or a directory of files.
pub fn load_fixture(path: &Path) -> Result<Fixture> {
    if path.is_dir() {
        load_fixture_directory(path)
    } else {
        parse_fixture(path)
    }
}

/// A warning from fixture validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// What the warning is about, e.g. `scale 'sas'`.
    pub subject: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            message: message.into(),
        }
    }
}

/// Validate a fixture for common issues.
pub fn validate_fixture(fixture: &Fixture) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Duplicate keys
    let mut seen = HashSet::new();
    for scale in &fixture.scales {
        if !seen.insert(scale.code.as_str()) {
            warnings.push(ValidationWarning::new(
                format!("scale '{}'", scale.code),
                format!("duplicate scale code: {}", scale.code),
            ));
        }
    }
    let mut seen = HashSet::new();
    for q in &fixture.questionnaires {
        if !seen.insert((q.code.as_str(), q.version.as_str())) {
            warnings.push(ValidationWarning::new(
                format!("questionnaire '{}'", q.code),
                format!("duplicate questionnaire: {} v{}", q.code, q.version),
            ));
        }
    }
    let mut seen = HashSet::new();
    for sheet in &fixture.answer_sheets {
        if !seen.insert(sheet.id) {
            warnings.push(ValidationWarning::new(
                format!("answer sheet {}", sheet.id),
                format!("duplicate answer sheet id: {}", sheet.id),
            ));
        }
        let mut answered = HashSet::new();
        for answer in &sheet.answers {
            if !answered.insert(answer.question_code.as_str()) {
                warnings.push(ValidationWarning::new(
                    format!("answer sheet {}", sheet.id),
                    format!(
                        "question '{}' answered more than once, only the first answer is scored",
                        answer.question_code
                    ),
                ));
            }
        }
    }
    let mut seen = HashSet::new();
    for a in &fixture.assessments {
        if a.id == 0 {
            warnings.push(ValidationWarning::new(
                "assessment 0",
                "assessment id must be non-zero",
            ));
        } else if !seen.insert(a.id) {
            warnings.push(ValidationWarning::new(
                format!("assessment {}", a.id),
                format!("duplicate assessment id: {}", a.id),
            ));
        }
    }

    for scale in &fixture.scales {
        validate_scale(scale, &mut warnings);
    }

    // Cross references
    for a in &fixture.assessments {
        let subject = format!("assessment {}", a.id);
        let questionnaire = fixture.questionnaire(&a.questionnaire.code, &a.questionnaire.version);
        if questionnaire.is_none() {
            warnings.push(ValidationWarning::new(
                &subject,
                format!(
                    "unknown questionnaire {} v{}",
                    a.questionnaire.code, a.questionnaire.version
                ),
            ));
        }
        if !fixture.answer_sheets.iter().any(|s| s.id == a.answer_sheet_id) {
            warnings.push(ValidationWarning::new(
                &subject,
                format!("unknown answer sheet {}", a.answer_sheet_id),
            ));
        }
        let Some(scale_ref) = &a.scale else {
            continue;
        };
        let Some(scale) = fixture.scales.iter().find(|s| s.code == scale_ref.code) else {
            warnings.push(ValidationWarning::new(
                &subject,
                format!("unknown medical scale {}", scale_ref.code),
            ));
            continue;
        };
        if let Some(questionnaire) = questionnaire {
            for factor in &scale.factors {
                for code in &factor.question_codes {
                    if questionnaire.question(code).is_none() {
                        warnings.push(ValidationWarning::new(
                            format!("scale '{}'", scale.code),
                            format!(
                                "factor '{}' references question '{}' missing from {} v{}",
                                factor.code, code, questionnaire.code, questionnaire.version
                            ),
                        ));
                    }
                }
            }
        }
    }

    warnings
}

fn validate_scale(scale: &MedicalScale, warnings: &mut Vec<ValidationWarning>) {
    let subject = format!("scale '{}'", scale.code);

    let totals = scale.factors.iter().filter(|f| f.is_total_score).count();
    if totals > 1 {
        warnings.push(ValidationWarning::new(
            &subject,
            format!("{totals} factors are marked as total score, expected at most one"),
        ));
    }

    let mut codes = HashSet::new();
    for factor in &scale.factors {
        if !codes.insert(factor.code.as_str()) {
            warnings.push(ValidationWarning::new(
                &subject,
                format!("duplicate factor code: {}", factor.code),
            ));
        }
        if factor.scoring_strategy.parse::<ScoringStrategyKind>().is_err() {
            warnings.push(ValidationWarning::new(
                &subject,
                format!(
                    "factor '{}' uses unknown scoring strategy '{}'",
                    factor.code, factor.scoring_strategy
                ),
            ));
        }
        for rule in &factor.interpret_rules {
            if rule.min > rule.max {
                warnings.push(ValidationWarning::new(
                    &subject,
                    format!(
                        "factor '{}' has interpret rule with min {} above max {}",
                        factor.code, rule.min, rule.max
                    ),
                ));
            }
        }
        if !factor.simple_rules.is_empty() {
            let mut rules_ok = true;
            for rule in &factor.simple_rules {
                if let Err(e) = rule.validate() {
                    rules_ok = false;
                    warnings.push(ValidationWarning::new(
                        &subject,
                        format!("factor '{}': {e}", factor.code),
                    ));
                }
            }
            if rules_ok {
                let ranges: Vec<ScoreRange> =
                    factor.simple_rules.iter().map(|r| r.range()).collect();
                if let Err(e) = validate_ranges(&ranges) {
                    warnings.push(ValidationWarning::new(
                        &subject,
                        format!("factor '{}': {e}", factor.code),
                    ));
                }
            }
        }
    }

    if let Some(composite) = &scale.composite {
        for (i, rule) in composite.rules.iter().enumerate() {
            if rule.conditions.is_empty() {
                warnings.push(ValidationWarning::new(
                    &subject,
                    format!("composite rule {i} has no conditions and never matches"),
                ));
            }
            for cond in &rule.conditions {
                if !codes.contains(cond.factor_code.as_str()) {
                    warnings.push(ValidationWarning::new(
                        &subject,
                        format!(
                            "composite rule {i} references unknown factor '{}'",
                            cond.factor_code
                        ),
                    ));
                }
                if cond.operator == ComparisonOperator::Between && cond.max_value.is_none() {
                    warnings.push(ValidationWarning::new(
                        &subject,
                        format!(
                            "composite rule {i}: 'between' on '{}' needs max_value",
                            cond.factor_code
                        ),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::AssessmentStatus;
    use crate::interpretation::RiskLevel;
    use crate::model::AnswerValue;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[[scales]]
id = 1
code = "sas"
title = "Self-rating Anxiety"

[[scales.factors]]
code = "total"
title = "Total"
is_total_score = true
question_codes = ["q1", "q2"]

[[scales.factors.interpret_rules]]
min = 0.0
max = 4.0
risk_level = "none"

[[scales.factors.interpret_rules]]
min = 5.0
max = 8.0
risk_level = "high"
description = "elevated anxiety"

[[scales.factors.simple_rules]]
min = 0.0
max = 5.0
content = "low band"

[[scales.factors.simple_rules]]
min = 5.0
max = 9.0
content = "high band"

[[questionnaires]]
code = "sas-q"
version = "1.0"

[[questionnaires.questions]]
code = "q1"
options = [{ code = "A", score = 1.0 }, { code = "B", score = 4.0 }]
validation = [{ rule = "required" }]

[[questionnaires.questions]]
code = "q2"
options = [{ code = "A", score = 1.0 }, { code = "B", score = 4.0 }]

[[answer_sheets]]
id = 11
questionnaire_code = "sas-q"
questionnaire_version = "1.0"
answers = [
    { question_code = "q1", value = { type = "single", value = "B" } },
    { question_code = "q2", value = { type = "single", value = "A" } },
]

[[assessments]]
id = 1
testee_id = 100
answer_sheet_id = 11
status = "submitted"
questionnaire = { code = "sas-q", version = "1.0" }
scale = { code = "sas", name = "Self-rating Anxiety" }
"#;

    #[test]
    fn parse_valid_toml() {
        let fixture = parse_fixture_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(fixture.scales.len(), 1);
        let factor = &fixture.scales[0].factors[0];
        assert!(factor.is_total_score);
        assert_eq!(factor.interpret_rules[1].risk_level, RiskLevel::High);
        assert_eq!(factor.simple_rules[1].content(), "high band");
        assert_eq!(
            fixture.answer_sheets[0].answers[0].value,
            AnswerValue::Single("B".into())
        );
        assert_eq!(fixture.assessments[0].status, AssessmentStatus::Submitted);
        assert_eq!(fixture.assessment_ids(), vec![AssessmentId(1)]);
        assert!(validate_fixture(&fixture).is_empty());
    }

    #[test]
    fn parse_missing_optional_fields() {
        let toml = r#"
[[assessments]]
id = 3
testee_id = 1
answer_sheet_id = 2
questionnaire = { code = "x", version = "1" }
"#;
        let fixture = parse_fixture_str(toml, &PathBuf::from("test.toml")).unwrap();
        let a = &fixture.assessments[0];
        assert_eq!(a.status, AssessmentStatus::Pending);
        assert!(a.scale.is_none());
        assert!(fixture.scales.is_empty());
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_fixture_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn validate_reports_broken_references() {
        let toml = r#"
[[scales]]
id = 1
code = "s"

[[scales.factors]]
code = "a"
is_total_score = true
scoring_strategy = "median"

[[scales.factors]]
code = "a"
is_total_score = true

[[scales.factors.simple_rules]]
min = 0.0
max = 5.0
content = "x"

[[scales.factors.simple_rules]]
min = 6.0
max = 9.0
content = "y"

[[scales.composite.rules]]
risk_level = "high"
conditions = [{ factor_code = "ghost", operator = "between", value = 1.0 }]

[[assessments]]
id = 1
testee_id = 1
answer_sheet_id = 99
questionnaire = { code = "nope", version = "1" }
scale = { code = "missing" }
"#;
        let fixture = parse_fixture_str(toml, &PathBuf::from("test.toml")).unwrap();
        let messages: Vec<String> = validate_fixture(&fixture)
            .into_iter()
            .map(|w| w.message)
            .collect();
        let has = |needle: &str| messages.iter().any(|m| m.contains(needle));

        assert!(has("2 factors are marked as total score"));
        assert!(has("duplicate factor code: a"));
        assert!(has("unknown scoring strategy 'median'"));
        assert!(has("gap between score ranges"));
        assert!(has("unknown factor 'ghost'"));
        assert!(has("needs max_value"));
        assert!(has("unknown questionnaire nope v1"));
        assert!(has("unknown answer sheet 99"));
        assert!(has("unknown medical scale missing"));
    }

    #[test]
    fn validate_duplicate_ids() {
        let mut fixture = parse_fixture_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let copy = fixture.clone();
        fixture.merge(copy);
        let warnings = validate_fixture(&fixture);
        assert!(warnings.iter().any(|w| w.message.contains("duplicate scale code")));
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("duplicate assessment id: 1")));
    }

    #[test]
    fn validate_repeated_answer() {
        let mut fixture = parse_fixture_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let sheet = &mut fixture.answer_sheets[0];
        let repeated = sheet.answers[0].clone();
        sheet.answers.push(repeated);
        let warnings = validate_fixture(&fixture);
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("answered more than once")));
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not = [valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let fixture = load_fixture_directory(dir.path()).unwrap();
        assert_eq!(fixture.scales.len(), 1);
        assert_eq!(fixture.assessments.len(), 1);

        let single = load_fixture(&dir.path().join("a.toml")).unwrap();
        assert_eq!(single, fixture);
    }
}
