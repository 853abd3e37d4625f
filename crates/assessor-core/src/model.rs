//! Input data types: scales, questionnaires, and answer sheets.
//!
//! These are the read-only inputs the engine loads through the repository
//! ports. They deserialize directly from fixture TOML.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::interpretation::{
    CompositeConfig, InterpretConfig, InterpretRule, InterpretStrategyKind, SimpleInterpretRule,
};
use crate::validation::ValidationRule;

/// A respondent's answer to one question.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AnswerValue {
    /// A single selected option code.
    Single(String),
    /// Several selected option codes.
    Multiple(Vec<String>),
    /// A numeric answer, scored as itself when the question has no options.
    Number(f64),
    /// Free text. Never contributes a score.
    Text(String),
    #[default]
    Empty,
}

impl AnswerValue {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerValue::Empty => true,
            AnswerValue::Single(code) => code.is_empty(),
            AnswerValue::Multiple(codes) => codes.is_empty(),
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AnswerValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Number of selected options; a single choice counts as one.
    pub fn selection_count(&self) -> Option<usize> {
        match self {
            AnswerValue::Single(code) if !code.is_empty() => Some(1),
            AnswerValue::Single(_) => Some(0),
            AnswerValue::Multiple(codes) => Some(codes.len()),
            _ => None,
        }
    }

    pub fn text_len(&self) -> Option<usize> {
        match self {
            AnswerValue::Text(text) => Some(text.chars().count()),
            _ => None,
        }
    }
}

/// One selectable option of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub code: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    #[serde(default)]
    pub validation: Vec<ValidationRule>,
}

impl Question {
    /// Option code to score weight.
    pub fn option_scores(&self) -> HashMap<String, f64> {
        self.options
            .iter()
            .map(|o| (o.code.clone(), o.score))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Questionnaire {
    pub code: String,
    pub version: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Questionnaire {
    pub fn question(&self, code: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.code == code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_code: String,
    #[serde(default)]
    pub value: AnswerValue,
}

/// A submitted set of answers for one questionnaire version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub id: u64,
    pub questionnaire_code: String,
    pub questionnaire_version: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

impl AnswerSheet {
    pub fn answer(&self, question_code: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_code == question_code)
    }
}

fn default_scoring_strategy() -> String {
    "sum".to_string()
}

/// A named scoring dimension of a scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub code: String,
    #[serde(default)]
    pub title: String,
    /// At most one factor per scale carries the total score.
    #[serde(default)]
    pub is_total_score: bool,
    #[serde(default)]
    pub question_codes: Vec<String>,
    #[serde(default = "default_scoring_strategy")]
    pub scoring_strategy: String,
    #[serde(default)]
    pub scoring_params: HashMap<String, String>,
    #[serde(default)]
    pub interpret_strategy: InterpretStrategyKind,
    #[serde(default)]
    pub interpret_rules: Vec<InterpretRule>,
    /// Half-open narrative ranges consulted when no interpret rule matches.
    #[serde(default)]
    pub simple_rules: Vec<SimpleInterpretRule>,
    #[serde(default)]
    pub max_score: Option<f64>,
}

impl Factor {
    pub fn interpret_config(&self) -> InterpretConfig {
        InterpretConfig {
            factor_code: self.code.clone(),
            rules: self.interpret_rules.clone(),
            params: HashMap::new(),
        }
    }

    pub fn find_interpret_rule(&self, score: f64) -> Option<&InterpretRule> {
        self.interpret_rules.iter().find(|r| r.contains(score))
    }

    pub fn find_simple_rule(&self, score: f64) -> Option<&SimpleInterpretRule> {
        self.simple_rules.iter().find(|r| r.matches(score))
    }
}

/// A questionnaire's scoring and interpretation definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalScale {
    pub id: u64,
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub factors: Vec<Factor>,
    #[serde(default)]
    pub composite: Option<CompositeConfig>,
}

impl MedicalScale {
    pub fn factor(&self, code: &str) -> Option<&Factor> {
        self.factors.iter().find(|f| f.code == code)
    }

    pub fn total_score_factor(&self) -> Option<&Factor> {
        self.factors.iter().find(|f| f.is_total_score)
    }
}
