//! Evaluation results and the persisted score aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::AssessmentId;
use crate::interpretation::RiskLevel;

/// Change rate, in percent, beyond which a trend is no longer stable.
pub const TREND_THRESHOLD_PERCENT: f64 = 5.0;

/// Per-factor output of the evaluation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScoreResult {
    pub factor_code: String,
    pub factor_name: String,
    pub raw_score: f64,
    pub max_score: Option<f64>,
    pub risk_level: RiskLevel,
    pub conclusion: String,
    pub suggestion: String,
    pub is_total_score: bool,
}

/// Full pipeline output for one assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub total_score: f64,
    pub risk_level: RiskLevel,
    pub conclusion: String,
    pub suggestion: String,
    pub factor_scores: Vec<FactorScoreResult>,
    /// Label of the composite rule that set the overall risk, if any.
    #[serde(default)]
    pub composite_rule: Option<String>,
}

impl EvaluationResult {
    pub fn factor_score(&self, code: &str) -> Option<&FactorScoreResult> {
        self.factor_scores.iter().find(|f| f.factor_code == code)
    }

    pub fn has_high_risk_factor(&self) -> bool {
        self.factor_scores.iter().any(|f| f.risk_level.is_high())
    }

    pub fn high_risk_factors(&self) -> Vec<&FactorScoreResult> {
        self.factor_scores
            .iter()
            .filter(|f| f.risk_level.is_high())
            .collect()
    }
}

/// Persisted per-factor score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor_code: String,
    pub factor_name: String,
    pub raw_score: f64,
    pub risk_level: RiskLevel,
    pub is_total_score: bool,
}

impl From<&FactorScoreResult> for FactorScore {
    fn from(result: &FactorScoreResult) -> Self {
        FactorScore {
            factor_code: result.factor_code.clone(),
            factor_name: result.factor_name.clone(),
            raw_score: result.raw_score,
            risk_level: result.risk_level,
            is_total_score: result.is_total_score,
        }
    }
}

/// Score record for one assessment. Replaced wholesale on re-evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentScore {
    assessment_id: AssessmentId,
    total_score: f64,
    risk_level: RiskLevel,
    factor_scores: Vec<FactorScore>,
    created_at: DateTime<Utc>,
}

impl AssessmentScore {
    pub fn from_evaluation_result(assessment_id: AssessmentId, result: &EvaluationResult) -> Self {
        Self {
            assessment_id,
            total_score: result.total_score,
            risk_level: result.risk_level,
            factor_scores: result.factor_scores.iter().map(FactorScore::from).collect(),
            created_at: Utc::now(),
        }
    }

    pub fn assessment_id(&self) -> AssessmentId {
        self.assessment_id
    }

    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn factor_scores(&self) -> &[FactorScore] {
        &self.factor_scores
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn factor_count(&self) -> usize {
        self.factor_scores.len()
    }

    pub fn factor(&self, code: &str) -> Option<&FactorScore> {
        self.factor_scores.iter().find(|f| f.factor_code == code)
    }

    pub fn total_score_factor(&self) -> Option<&FactorScore> {
        self.factor_scores.iter().find(|f| f.is_total_score)
    }

    pub fn high_risk_factors(&self) -> Vec<&FactorScore> {
        self.factor_scores
            .iter()
            .filter(|f| f.risk_level.is_high())
            .collect()
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk_level.is_high()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Stable,
    Worsening,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrend {
    pub direction: TrendDirection,
    /// Percent change from first to last score; absent when unknown.
    pub change_rate: Option<f64>,
    pub points: usize,
}

/// Trend over a chronological score series. Lower scores are better, so a
/// falling series is improving.
pub fn calculate_trend(scores: &[f64]) -> ScoreTrend {
    let unknown = ScoreTrend {
        direction: TrendDirection::Unknown,
        change_rate: None,
        points: scores.len(),
    };
    let (Some(&first), Some(&last)) = (scores.first(), scores.last()) else {
        return unknown;
    };
    if scores.len() < 2 || first == 0.0 {
        return unknown;
    }

    let change_rate = (last - first) / first * 100.0;
    let direction = if change_rate < -TREND_THRESHOLD_PERCENT {
        TrendDirection::Improving
    } else if change_rate > TREND_THRESHOLD_PERCENT {
        TrendDirection::Worsening
    } else {
        TrendDirection::Stable
    };
    ScoreTrend {
        direction,
        change_rate: Some(change_rate),
        points: scores.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(code: &str, raw: f64, risk: RiskLevel, total: bool) -> FactorScoreResult {
        FactorScoreResult {
            factor_code: code.into(),
            factor_name: code.to_uppercase(),
            raw_score: raw,
            max_score: None,
            risk_level: risk,
            conclusion: String::new(),
            suggestion: String::new(),
            is_total_score: total,
        }
    }

    fn result() -> EvaluationResult {
        EvaluationResult {
            total_score: 70.0,
            risk_level: RiskLevel::High,
            conclusion: String::new(),
            suggestion: String::new(),
            factor_scores: vec![
                factor("a", 30.0, RiskLevel::Low, false),
                factor("b", 40.0, RiskLevel::Severe, false),
                factor("total", 70.0, RiskLevel::High, true),
            ],
            composite_rule: None,
        }
    }

    #[test]
    fn evaluation_result_queries() {
        let r = result();
        assert_eq!(r.factor_score("b").unwrap().raw_score, 40.0);
        assert!(r.factor_score("zzz").is_none());
        assert!(r.has_high_risk_factor());
        let codes: Vec<_> = r.high_risk_factors().iter().map(|f| f.factor_code.as_str()).collect();
        assert_eq!(codes, vec!["b", "total"]);
    }

    #[test]
    fn assessment_score_from_result() {
        let score = AssessmentScore::from_evaluation_result(AssessmentId(9), &result());
        assert_eq!(score.assessment_id(), AssessmentId(9));
        assert_eq!(score.factor_count(), 3);
        assert_eq!(score.total_score_factor().unwrap().factor_code, "total");
        assert_eq!(score.factor("a").unwrap().raw_score, 30.0);
        assert_eq!(score.high_risk_factors().len(), 2);
        assert!(score.is_high_risk());
    }

    #[test]
    fn trend_needs_two_points_and_nonzero_start() {
        assert_eq!(calculate_trend(&[]).direction, TrendDirection::Unknown);
        assert_eq!(calculate_trend(&[10.0]).direction, TrendDirection::Unknown);
        assert_eq!(calculate_trend(&[0.0, 10.0]).direction, TrendDirection::Unknown);
    }

    #[test]
    fn trend_direction_thresholds() {
        let improving = calculate_trend(&[50.0, 45.0, 40.0]);
        assert_eq!(improving.direction, TrendDirection::Improving);
        assert!((improving.change_rate.unwrap() + 20.0).abs() < 1e-9);

        assert_eq!(
            calculate_trend(&[50.0, 52.0]).direction,
            TrendDirection::Stable
        );
        assert_eq!(
            calculate_trend(&[50.0, 60.0]).direction,
            TrendDirection::Worsening
        );
        assert_eq!(
            calculate_trend(&[100.0, 96.0]).direction,
            TrendDirection::Stable
        );
    }
}
