//! Scoring strategies and per-answer option scoring.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;
use crate::model::AnswerValue;

/// Reduces a list of answer scores to a single factor score.
pub trait ScoringStrategy: Send + Sync {
    /// Registry key for this strategy.
    fn name(&self) -> &str;

    fn calculate(&self, values: &[f64], params: &HashMap<String, String>)
        -> Result<f64, EngineError>;
}

/// The built-in reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringStrategyKind {
    Sum,
    Average,
    Max,
    Min,
    Count,
    First,
    Last,
}

impl ScoringStrategyKind {
    pub const ALL: [ScoringStrategyKind; 7] = [
        ScoringStrategyKind::Sum,
        ScoringStrategyKind::Average,
        ScoringStrategyKind::Max,
        ScoringStrategyKind::Min,
        ScoringStrategyKind::Count,
        ScoringStrategyKind::First,
        ScoringStrategyKind::Last,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringStrategyKind::Sum => "sum",
            ScoringStrategyKind::Average => "avg",
            ScoringStrategyKind::Max => "max",
            ScoringStrategyKind::Min => "min",
            ScoringStrategyKind::Count => "cnt",
            ScoringStrategyKind::First => "first",
            ScoringStrategyKind::Last => "last",
        }
    }

    fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            ScoringStrategyKind::Sum => values.iter().sum(),
            ScoringStrategyKind::Average => values.iter().sum::<f64>() / values.len() as f64,
            ScoringStrategyKind::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ScoringStrategyKind::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            ScoringStrategyKind::Count => values.len() as f64,
            ScoringStrategyKind::First => values[0],
            ScoringStrategyKind::Last => values[values.len() - 1],
        }
    }
}

impl fmt::Display for ScoringStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringStrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(ScoringStrategyKind::Sum),
            "avg" | "average" => Ok(ScoringStrategyKind::Average),
            "max" => Ok(ScoringStrategyKind::Max),
            "min" => Ok(ScoringStrategyKind::Min),
            "cnt" | "count" => Ok(ScoringStrategyKind::Count),
            "first" => Ok(ScoringStrategyKind::First),
            "last" => Ok(ScoringStrategyKind::Last),
            other => Err(EngineError::StrategyNotRegistered {
                family: crate::error::StrategyFamily::Scoring,
                name: other.to_string(),
            }),
        }
    }
}

impl ScoringStrategy for ScoringStrategyKind {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn calculate(
        &self,
        values: &[f64],
        params: &HashMap<String, String>,
    ) -> Result<f64, EngineError> {
        apply_rounding(self.reduce(values), params)
    }
}

/// Rounding applied when a `precision` parameter is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    #[default]
    HalfUp,
    Floor,
    Ceil,
}

impl FromStr for RoundingMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "half_up" | "round" => Ok(RoundingMode::HalfUp),
            "floor" => Ok(RoundingMode::Floor),
            "ceil" => Ok(RoundingMode::Ceil),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown rounding mode '{other}'"
            ))),
        }
    }
}

/// Applies the optional `precision` / `rounding` scoring parameters.
pub fn apply_rounding(value: f64, params: &HashMap<String, String>) -> Result<f64, EngineError> {
    let Some(precision) = params.get("precision") else {
        return Ok(value);
    };
    let digits: i32 = precision.trim().parse().map_err(|_| {
        EngineError::InvalidArgument(format!("precision must be an integer, got '{precision}'"))
    })?;
    let mode = match params.get("rounding") {
        Some(mode) => mode.parse()?,
        None => RoundingMode::default(),
    };
    let factor = 10f64.powi(digits);
    let scaled = value * factor;
    let rounded = match mode {
        RoundingMode::HalfUp => scaled.round(),
        RoundingMode::Floor => scaled.floor(),
        RoundingMode::Ceil => scaled.ceil(),
    };
    Ok(rounded / factor)
}

/// Maps an answer to its option weight.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionScorer;

impl OptionScorer {
    pub fn score(&self, value: &AnswerValue, option_scores: &HashMap<String, f64>) -> f64 {
        self.score_with_max(value, option_scores).0
    }

    /// Returns `(score, max_score)` where the maximum is the highest option
    /// weight. Unknown option codes score zero; a numeric answer to a question
    /// without options scores as itself.
    pub fn score_with_max(
        &self,
        value: &AnswerValue,
        option_scores: &HashMap<String, f64>,
    ) -> (f64, f64) {
        let max_score = option_scores
            .values()
            .copied()
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))
            .unwrap_or(0.0);

        let score = match value {
            AnswerValue::Single(code) => option_scores.get(code).copied().unwrap_or(0.0),
            AnswerValue::Multiple(codes) => codes
                .iter()
                .filter_map(|c| option_scores.get(c))
                .sum(),
            AnswerValue::Number(n) if option_scores.is_empty() => *n,
            AnswerValue::Number(_) | AnswerValue::Text(_) | AnswerValue::Empty => 0.0,
        };

        match value {
            AnswerValue::Number(n) if option_scores.is_empty() => (score, *n),
            _ => (score, max_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    fn calc(kind: ScoringStrategyKind, values: &[f64]) -> f64 {
        kind.calculate(values, &no_params()).unwrap()
    }

    #[test]
    fn sum_equals_average_times_len() {
        let values = [1.0, 2.0, 4.5, 0.5];
        let sum = calc(ScoringStrategyKind::Sum, &values);
        let avg = calc(ScoringStrategyKind::Average, &values);
        assert!((sum - avg * values.len() as f64).abs() < 1e-9);
    }

    #[test]
    fn max_and_min_bound_every_value() {
        let values = [3.0, -1.0, 7.0, 2.0];
        let max = calc(ScoringStrategyKind::Max, &values);
        let min = calc(ScoringStrategyKind::Min, &values);
        assert_eq!(max, 7.0);
        assert_eq!(min, -1.0);
        assert!(values.iter().all(|v| *v <= max && *v >= min));
    }

    #[test]
    fn count_is_len() {
        assert_eq!(calc(ScoringStrategyKind::Count, &[9.0, 0.0, 1.0]), 3.0);
    }

    #[test]
    fn first_and_last() {
        assert_eq!(calc(ScoringStrategyKind::First, &[5.0, 6.0]), 5.0);
        assert_eq!(calc(ScoringStrategyKind::Last, &[5.0, 6.0]), 6.0);
    }

    #[test]
    fn every_strategy_is_zero_on_empty_input() {
        for kind in ScoringStrategyKind::ALL {
            assert_eq!(calc(kind, &[]), 0.0, "{kind}");
        }
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(
            "average".parse::<ScoringStrategyKind>().unwrap(),
            ScoringStrategyKind::Average
        );
        assert_eq!(
            "CNT".parse::<ScoringStrategyKind>().unwrap(),
            ScoringStrategyKind::Count
        );
        let err = "median".parse::<ScoringStrategyKind>().unwrap_err();
        assert!(matches!(err, EngineError::StrategyNotRegistered { .. }));
    }

    #[test]
    fn precision_rounds_result() {
        let mut params = HashMap::new();
        params.insert("precision".to_string(), "1".to_string());
        let avg = ScoringStrategyKind::Average
            .calculate(&[1.0, 1.0, 2.0], &params)
            .unwrap();
        assert_eq!(avg, 1.3);

        params.insert("rounding".to_string(), "ceil".to_string());
        let avg = ScoringStrategyKind::Average
            .calculate(&[1.0, 1.0, 2.0], &params)
            .unwrap();
        assert_eq!(avg, 1.4);
    }

    #[test]
    fn invalid_precision_is_rejected() {
        let mut params = HashMap::new();
        params.insert("precision".to_string(), "two".to_string());
        assert!(ScoringStrategyKind::Sum.calculate(&[1.0], &params).is_err());
    }

    #[test]
    fn option_scorer_single_and_multiple() {
        let options = HashMap::from([
            ("A".to_string(), 1.0),
            ("B".to_string(), 2.0),
            ("C".to_string(), 4.0),
        ]);
        let scorer = OptionScorer;

        assert_eq!(
            scorer.score_with_max(&AnswerValue::Single("B".into()), &options),
            (2.0, 4.0)
        );
        assert_eq!(
            scorer.score(&AnswerValue::Multiple(vec!["A".into(), "C".into()]), &options),
            5.0
        );
        assert_eq!(scorer.score(&AnswerValue::Single("Z".into()), &options), 0.0);
        assert_eq!(scorer.score(&AnswerValue::Text("hello".into()), &options), 0.0);
    }

    #[test]
    fn numeric_answer_without_options_scores_as_itself() {
        let scorer = OptionScorer;
        assert_eq!(
            scorer.score_with_max(&AnswerValue::Number(7.5), &HashMap::new()),
            (7.5, 7.5)
        );
        assert_eq!(
            scorer.score_with_max(&AnswerValue::Empty, &HashMap::new()),
            (0.0, 0.0)
        );
    }
}
