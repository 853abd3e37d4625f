//! Interpretation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::{Assessment, AssessmentId};
use crate::error::EngineError;
use crate::interpretation::RiskLevel;
use crate::model::MedicalScale;
use crate::score::EvaluationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    General,
    Factor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: SuggestionCategory,
    pub content: String,
    #[serde(default)]
    pub factor_code: Option<String>,
}

/// Per-factor section of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionInterpret {
    pub factor_code: String,
    pub factor_name: String,
    pub raw_score: f64,
    pub max_score: Option<f64>,
    pub risk_level: RiskLevel,
    pub description: String,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretReport {
    pub assessment_id: AssessmentId,
    pub scale_code: String,
    pub scale_name: String,
    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub conclusion: String,
    pub dimensions: Vec<DimensionInterpret>,
    pub suggestions: Vec<Suggestion>,
    pub created_at: DateTime<Utc>,
}

impl InterpretReport {
    pub fn dimension(&self, factor_code: &str) -> Option<&DimensionInterpret> {
        self.dimensions.iter().find(|d| d.factor_code == factor_code)
    }

    pub fn high_risk_dimensions(&self) -> Vec<&DimensionInterpret> {
        self.dimensions
            .iter()
            .filter(|d| d.risk_level.is_high())
            .collect()
    }
}

/// Builds a report from an evaluation result.
pub trait ReportBuilder: Send + Sync {
    fn build(
        &self,
        assessment: &Assessment,
        scale: &MedicalScale,
        result: &EvaluationResult,
    ) -> Result<InterpretReport, EngineError>;
}

/// Takes the conclusion from the overall result when a composite rule decided
/// it, then from the total-score factor, and from the overall result
/// otherwise. Every factor becomes a dimension; the
/// top-level suggestions are the overall one followed by one per high-risk
/// factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReportBuilder;

impl ReportBuilder for DefaultReportBuilder {
    fn build(
        &self,
        assessment: &Assessment,
        scale: &MedicalScale,
        result: &EvaluationResult,
    ) -> Result<InterpretReport, EngineError> {
        if assessment.id().is_zero() {
            return Err(EngineError::InvalidArgument(
                "cannot build a report for an unsaved assessment".to_string(),
            ));
        }

        let total_factor = result
            .factor_scores
            .iter()
            .find(|f| f.is_total_score && !f.conclusion.is_empty());
        let conclusion = match total_factor {
            Some(f) if result.composite_rule.is_none() => f.conclusion.clone(),
            _ => result.conclusion.clone(),
        };

        let dimensions = result
            .factor_scores
            .iter()
            .map(|f| DimensionInterpret {
                factor_code: f.factor_code.clone(),
                factor_name: f.factor_name.clone(),
                raw_score: f.raw_score,
                max_score: f
                    .max_score
                    .or_else(|| scale.factor(&f.factor_code).and_then(|sf| sf.max_score)),
                risk_level: f.risk_level,
                description: f.conclusion.clone(),
                suggestions: (!f.suggestion.is_empty())
                    .then(|| Suggestion {
                        category: SuggestionCategory::Factor,
                        content: f.suggestion.clone(),
                        factor_code: Some(f.factor_code.clone()),
                    })
                    .into_iter()
                    .collect(),
            })
            .collect();

        let mut suggestions = Vec::new();
        if !result.suggestion.is_empty() {
            suggestions.push(Suggestion {
                category: SuggestionCategory::General,
                content: result.suggestion.clone(),
                factor_code: None,
            });
        }
        for f in result.high_risk_factors() {
            if f.is_total_score || f.suggestion.is_empty() {
                continue;
            }
            suggestions.push(Suggestion {
                category: SuggestionCategory::Factor,
                content: f.suggestion.clone(),
                factor_code: Some(f.factor_code.clone()),
            });
        }

        Ok(InterpretReport {
            assessment_id: assessment.id(),
            scale_code: scale.code.clone(),
            scale_name: scale.title.clone(),
            total_score: result.total_score,
            risk_level: result.risk_level,
            conclusion,
            dimensions,
            suggestions,
            created_at: Utc::now(),
        })
    }
}
