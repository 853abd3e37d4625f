//! Answer validation rules and the batch validator.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::batch::{fan_out, to_map, CancelToken};
use crate::model::{AnswerSheet, AnswerValue, Questionnaire};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "snake_case")]
pub enum ValidationRule {
    Required,
    MinValue(f64),
    MaxValue(f64),
    MinSelections(usize),
    MaxSelections(usize),
    MinLength(usize),
    MaxLength(usize),
}

impl ValidationRule {
    pub fn name(&self) -> &'static str {
        match self {
            ValidationRule::Required => "required",
            ValidationRule::MinValue(_) => "min_value",
            ValidationRule::MaxValue(_) => "max_value",
            ValidationRule::MinSelections(_) => "min_selections",
            ValidationRule::MaxSelections(_) => "max_selections",
            ValidationRule::MinLength(_) => "min_length",
            ValidationRule::MaxLength(_) => "max_length",
        }
    }

    /// Returns a failure message, or `None` when the value passes.
    ///
    /// Only `Required` fails an empty answer; the other rules apply to
    /// answers of the kind they constrain and ignore the rest.
    pub fn check(&self, value: &AnswerValue) -> Option<String> {
        if let ValidationRule::Required = self {
            return value.is_empty().then(|| "answer is required".to_string());
        }
        if value.is_empty() {
            return None;
        }
        match *self {
            ValidationRule::Required => None,
            ValidationRule::MinValue(min) => value
                .as_number()
                .filter(|n| *n < min)
                .map(|n| format!("value {n} is below minimum {min}")),
            ValidationRule::MaxValue(max) => value
                .as_number()
                .filter(|n| *n > max)
                .map(|n| format!("value {n} exceeds maximum {max}")),
            ValidationRule::MinSelections(min) => value
                .selection_count()
                .filter(|c| *c < min)
                .map(|c| format!("{c} selections, at least {min} required")),
            ValidationRule::MaxSelections(max) => value
                .selection_count()
                .filter(|c| *c > max)
                .map(|c| format!("{c} selections, at most {max} allowed")),
            ValidationRule::MinLength(min) => value
                .text_len()
                .filter(|l| *l < min)
                .map(|l| format!("text length {l} is shorter than {min}")),
            ValidationRule::MaxLength(max) => value
                .text_len()
                .filter(|l| *l > max)
                .map(|l| format!("text length {l} is longer than {max}")),
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub rule: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

/// Checks one value against a rule list, collecting every failure.
pub fn validate_value(value: &AnswerValue, rules: &[ValidationRule]) -> ValidationResult {
    let errors = rules
        .iter()
        .filter_map(|rule| {
            rule.check(value).map(|message| ValidationError {
                rule: rule.name().to_string(),
                message,
            })
        })
        .collect();
    ValidationResult { errors }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationTask {
    pub id: String,
    pub value: AnswerValue,
    pub rules: Vec<ValidationRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub id: String,
    pub result: ValidationResult,
}

/// Summary over a batch of validation results.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregatedResult {
    pub valid: bool,
    pub total_tasks: usize,
    pub passed_tasks: usize,
    pub failed_tasks: usize,
    /// Task id to failure messages, for failed tasks only.
    pub failures: HashMap<String, Vec<String>>,
}

/// Builds one task per question that carries rules. Unanswered questions are
/// validated as empty answers.
pub fn tasks_for_sheet(questionnaire: &Questionnaire, sheet: &AnswerSheet) -> Vec<ValidationTask> {
    questionnaire
        .questions
        .iter()
        .filter(|q| !q.validation.is_empty())
        .map(|q| ValidationTask {
            id: q.code.clone(),
            value: sheet
                .answer(&q.code)
                .map(|a| a.value.clone())
                .unwrap_or_default(),
            rules: q.validation.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchValidator;

impl BatchValidator {
    fn validate_one(task: &ValidationTask) -> TaskResult {
        TaskResult {
            id: task.id.clone(),
            result: validate_value(&task.value, &task.rules),
        }
    }

    pub fn validate_all(&self, tasks: &[ValidationTask]) -> Vec<TaskResult> {
        tasks.iter().map(Self::validate_one).collect()
    }

    pub async fn validate_all_concurrent(
        &self,
        tasks: &[ValidationTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> Vec<TaskResult> {
        fan_out(tasks.to_vec(), workers, cancel, |task| async move {
            Self::validate_one(&task)
        })
        .await
    }

    pub fn validate_all_to_map(&self, tasks: &[ValidationTask]) -> HashMap<String, TaskResult> {
        to_map(self.validate_all(tasks), |r| &r.id)
    }

    pub async fn validate_all_concurrent_to_map(
        &self,
        tasks: &[ValidationTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> HashMap<String, TaskResult> {
        to_map(
            self.validate_all_concurrent(tasks, workers, cancel).await,
            |r| &r.id,
        )
    }

    pub fn aggregate(&self, results: &[TaskResult]) -> AggregatedResult {
        let mut aggregated = AggregatedResult {
            total_tasks: results.len(),
            ..AggregatedResult::default()
        };
        for task in results {
            if task.result.is_valid() {
                aggregated.passed_tasks += 1;
            } else {
                aggregated.failed_tasks += 1;
                aggregated.failures.insert(
                    task.id.clone(),
                    task.result
                        .errors()
                        .iter()
                        .map(|e| e.message.clone())
                        .collect(),
                );
            }
        }
        aggregated.valid = aggregated.failed_tasks == 0;
        aggregated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Answer, Question};

    fn task(id: &str, value: AnswerValue, rules: Vec<ValidationRule>) -> ValidationTask {
        ValidationTask {
            id: id.to_string(),
            value,
            rules,
        }
    }

    fn sample_tasks() -> Vec<ValidationTask> {
        vec![
            task("q1", AnswerValue::Empty, vec![ValidationRule::Required]),
            task(
                "q2",
                AnswerValue::Number(3.0),
                vec![ValidationRule::MinValue(1.0), ValidationRule::MaxValue(5.0)],
            ),
            task(
                "q3",
                AnswerValue::Multiple(vec!["a".into(), "b".into(), "c".into()]),
                vec![ValidationRule::MaxSelections(2)],
            ),
            task(
                "q4",
                AnswerValue::Text("hi".into()),
                vec![ValidationRule::Required, ValidationRule::MinLength(5)],
            ),
        ]
    }

    #[test]
    fn required_rejects_empty() {
        let result = validate_value(&AnswerValue::Empty, &[ValidationRule::Required]);
        assert!(!result.is_valid());
        assert_eq!(result.errors()[0].rule, "required");
    }

    #[test]
    fn non_required_rules_ignore_empty_answers() {
        let result = validate_value(
            &AnswerValue::Empty,
            &[ValidationRule::MinValue(1.0), ValidationRule::MinSelections(1)],
        );
        assert!(result.is_valid());
    }

    #[test]
    fn numeric_bounds() {
        let rules = [ValidationRule::MinValue(1.0), ValidationRule::MaxValue(5.0)];
        assert!(validate_value(&AnswerValue::Number(1.0), &rules).is_valid());
        assert!(validate_value(&AnswerValue::Number(5.0), &rules).is_valid());
        assert!(!validate_value(&AnswerValue::Number(0.5), &rules).is_valid());
        assert!(!validate_value(&AnswerValue::Number(5.5), &rules).is_valid());
    }

    #[test]
    fn aggregate_counts_and_failures() {
        let validator = BatchValidator;
        let results = validator.validate_all(&sample_tasks());
        let aggregated = validator.aggregate(&results);

        assert!(!aggregated.valid);
        assert_eq!(aggregated.total_tasks, 4);
        assert_eq!(aggregated.passed_tasks, 1);
        assert_eq!(aggregated.failed_tasks, 3);
        assert_eq!(aggregated.failures.len(), 3);
        assert!(aggregated.failures["q3"][0].contains("at most 2"));
        assert!(!aggregated.failures.contains_key("q2"));
    }

    #[test]
    fn aggregate_of_nothing_is_valid() {
        let aggregated = BatchValidator.aggregate(&[]);
        assert!(aggregated.valid);
        assert_eq!(aggregated.total_tasks, 0);
    }

    #[tokio::test]
    async fn concurrent_validation_matches_sequential() {
        let validator = BatchValidator;
        let tasks = sample_tasks();
        let sequential = validator.validate_all(&tasks);
        for workers in [0, 1, 3, 10] {
            let concurrent = validator
                .validate_all_concurrent(&tasks, workers, &CancelToken::new())
                .await;
            assert_eq!(concurrent, sequential, "workers={workers}");
        }
        let map = validator
            .validate_all_concurrent_to_map(&tasks, 2, &CancelToken::new())
            .await;
        assert!(map["q2"].result.is_valid());
    }

    #[test]
    fn sheet_tasks_cover_ruled_questions() {
        let questionnaire = Questionnaire {
            code: "q".into(),
            version: "1".into(),
            title: String::new(),
            questions: vec![
                Question {
                    code: "a".into(),
                    title: String::new(),
                    options: vec![],
                    validation: vec![ValidationRule::Required],
                },
                Question {
                    code: "b".into(),
                    title: String::new(),
                    options: vec![],
                    validation: vec![],
                },
            ],
        };
        let sheet = AnswerSheet {
            id: 1,
            questionnaire_code: "q".into(),
            questionnaire_version: "1".into(),
            answers: vec![Answer {
                question_code: "b".into(),
                value: AnswerValue::Single("x".into()),
            }],
        };
        let tasks = tasks_for_sheet(&questionnaire, &sheet);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "a");
        assert_eq!(tasks[0].value, AnswerValue::Empty);
    }

    #[test]
    fn rules_deserialize_from_tagged_tables() {
        #[derive(Deserialize)]
        struct Wrapper {
            validation: Vec<ValidationRule>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
validation = [
    { rule = "required" },
    { rule = "max_length", value = 10 },
]
"#,
        )
        .unwrap();
        assert_eq!(
            parsed.validation,
            vec![ValidationRule::Required, ValidationRule::MaxLength(10)]
        );
    }
}
