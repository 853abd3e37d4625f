//! Interpretation: risk levels, rule tables, and the strategies that map
//! scores onto them.
//!
//! Two interval conventions live here on purpose. [`InterpretRule`] is a
//! closed interval `[min, max]` and drives risk classification.
//! [`ScoreRange`] is half-open `[min, max)` and backs the narrative-only
//! [`SimpleInterpretRule`] tables, which must tile a score span without
//! gaps or overlaps.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, StrategyFamily};
use crate::registry::StrategyRegistry;

// ---------------------------------------------------------------------------
// Risk level
// ---------------------------------------------------------------------------

/// Ordered severity classification. `None < Low < Medium < High < Severe`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Severe,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::None,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Severe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::None => "none",
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Severe => "severe",
        }
    }

    /// `High` and `Severe` count as high risk.
    pub fn is_high(&self) -> bool {
        *self >= RiskLevel::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RiskLevel::None),
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "severe" => Ok(RiskLevel::Severe),
            other => Err(EngineError::InvalidArgument(format!(
                "unknown risk level '{other}'"
            ))),
        }
    }
}

/// Fallback classification when no rule covers a score.
pub fn default_risk_level_by_score(score: f64) -> RiskLevel {
    if score >= 80.0 {
        RiskLevel::Severe
    } else if score >= 60.0 {
        RiskLevel::High
    } else if score >= 40.0 {
        RiskLevel::Medium
    } else if score >= 20.0 {
        RiskLevel::Low
    } else {
        RiskLevel::None
    }
}

// ---------------------------------------------------------------------------
// Single-factor rules
// ---------------------------------------------------------------------------

/// A closed score interval `[min, max]` mapped to a risk level and narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretRule {
    pub min: f64,
    pub max: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
}

impl InterpretRule {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterpretConfig {
    pub factor_code: String,
    #[serde(default)]
    pub rules: Vec<InterpretRule>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretResult {
    pub factor_code: String,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub label: String,
    pub description: String,
    pub suggestion: String,
}

impl InterpretResult {
    pub fn is_high_risk(&self) -> bool {
        self.risk_level.is_high()
    }

    fn from_rule(factor_code: &str, score: f64, rule: &InterpretRule) -> Self {
        InterpretResult {
            factor_code: factor_code.to_string(),
            score,
            risk_level: rule.risk_level,
            label: rule.label.clone(),
            description: rule.description.clone(),
            suggestion: rule.suggestion.clone(),
        }
    }
}

/// Applies one rule; `None` when the score falls outside it.
pub fn interpret_factor_with_rule(
    factor_code: &str,
    score: f64,
    rule: &InterpretRule,
) -> Option<InterpretResult> {
    rule.contains(score)
        .then(|| InterpretResult::from_rule(factor_code, score, rule))
}

// ---------------------------------------------------------------------------
// Half-open ranges
// ---------------------------------------------------------------------------

/// Half-open interval `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    min: f64,
    max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score < self.max
    }

    /// Ranges that only share an endpoint do not overlap.
    pub fn is_overlapping(&self, other: &ScoreRange) -> bool {
        self.min < other.max && other.min < self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min < self.max
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(EngineError::InvalidArgument(format!(
                "invalid score range {self}: min must be less than max"
            )))
        }
    }
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}, {:.2})", self.min, self.max)
    }
}

/// Checks that a set of ranges is non-empty, individually valid, and tiles
/// a span contiguously once sorted by `min`.
pub fn validate_ranges(ranges: &[ScoreRange]) -> Result<(), EngineError> {
    if ranges.is_empty() {
        return Err(EngineError::InvalidArgument(
            "score ranges must not be empty".to_string(),
        ));
    }
    for range in ranges {
        range.validate()?;
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_by(|a, b| a.min.total_cmp(&b.min));

    for pair in sorted.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.is_overlapping(next) {
            return Err(EngineError::InvalidArgument(format!(
                "score ranges {prev} and {next} overlap"
            )));
        }
        if prev.max != next.min {
            return Err(EngineError::InvalidArgument(format!(
                "gap between score ranges {prev} and {next}"
            )));
        }
    }
    Ok(())
}

/// Narrative-only rule over a half-open range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleInterpretRule {
    #[serde(flatten)]
    range: ScoreRange,
    content: String,
}

impl SimpleInterpretRule {
    pub fn new(range: ScoreRange, content: impl Into<String>) -> Result<Self, EngineError> {
        let rule = Self {
            range,
            content: content.into(),
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Re-checks a rule that was deserialized rather than constructed.
    pub fn validate(&self) -> Result<(), EngineError> {
        self.range.validate()?;
        if self.content.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "interpretation content must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn range(&self) -> ScoreRange {
        self.range
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn matches(&self, score: f64) -> bool {
        self.range.contains(score)
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpretStrategyKind {
    #[default]
    Threshold,
    Range,
    Composite,
}

impl InterpretStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpretStrategyKind::Threshold => "threshold",
            InterpretStrategyKind::Range => "range",
            InterpretStrategyKind::Composite => "composite",
        }
    }
}

impl fmt::Display for InterpretStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpretStrategyKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "threshold" => Ok(InterpretStrategyKind::Threshold),
            "range" => Ok(InterpretStrategyKind::Range),
            "composite" => Ok(InterpretStrategyKind::Composite),
            other => Err(EngineError::StrategyNotRegistered {
                family: StrategyFamily::Interpretation,
                name: other.to_string(),
            }),
        }
    }
}

/// Maps one factor score onto a rule table.
pub trait InterpretStrategy: Send + Sync {
    fn kind(&self) -> InterpretStrategyKind;

    fn interpret(&self, score: f64, config: &InterpretConfig)
        -> Result<InterpretResult, EngineError>;
}

/// Maps several factor scores onto composite rules.
pub trait CompositeStrategy: Send + Sync {
    fn kind(&self) -> InterpretStrategyKind;

    fn interpret_multiple(
        &self,
        scores: &[ScoredFactor],
        config: &CompositeConfig,
    ) -> Result<CompositeResult, EngineError>;
}

fn first_matching_rule(score: f64, config: &InterpretConfig) -> Result<InterpretResult, EngineError> {
    config
        .rules
        .iter()
        .find_map(|rule| interpret_factor_with_rule(&config.factor_code, score, rule))
        .ok_or_else(|| EngineError::NoMatch {
            factor_code: config.factor_code.clone(),
            score,
        })
}

/// Rules read as lower/upper thresholds; the first covering rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdStrategy;

impl InterpretStrategy for ThresholdStrategy {
    fn kind(&self) -> InterpretStrategyKind {
        InterpretStrategyKind::Threshold
    }

    fn interpret(&self, score: f64, config: &InterpretConfig) -> Result<InterpretResult, EngineError> {
        first_matching_rule(score, config)
    }
}

/// Rules read as explicit bands; matching is identical to thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeStrategy;

impl InterpretStrategy for RangeStrategy {
    fn kind(&self) -> InterpretStrategyKind {
        InterpretStrategyKind::Range
    }

    fn interpret(&self, score: f64, config: &InterpretConfig) -> Result<InterpretResult, EngineError> {
        first_matching_rule(score, config)
    }
}

// ---------------------------------------------------------------------------
// Composite rules
// ---------------------------------------------------------------------------

/// A factor's code together with its computed score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFactor {
    pub factor_code: String,
    pub score: f64,
}

impl ScoredFactor {
    pub fn new(factor_code: impl Into<String>, score: f64) -> Self {
        Self {
            factor_code: factor_code.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    /// Inclusive on both ends; requires `max_value`.
    #[serde(rename = "between")]
    Between,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorCondition {
    pub factor_code: String,
    pub operator: ComparisonOperator,
    pub value: f64,
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl FactorCondition {
    /// Evaluates against the score map. A missing factor never satisfies.
    pub fn evaluate(&self, scores: &HashMap<&str, f64>) -> bool {
        let Some(&score) = scores.get(self.factor_code.as_str()) else {
            return false;
        };
        match self.operator {
            ComparisonOperator::Gt => score > self.value,
            ComparisonOperator::Ge => score >= self.value,
            ComparisonOperator::Lt => score < self.value,
            ComparisonOperator::Le => score <= self.value,
            ComparisonOperator::Eq => (score - self.value).abs() < f64::EPSILON,
            ComparisonOperator::Between => match self.max_value {
                Some(max) => score >= self.value && score <= max,
                None => false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRule {
    #[serde(default)]
    pub conditions: Vec<FactorCondition>,
    #[serde(default)]
    pub operator: LogicalOperator,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
}

impl CompositeRule {
    /// An empty condition list never matches.
    pub fn matches(&self, scores: &HashMap<&str, f64>) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.operator {
            LogicalOperator::And => self.conditions.iter().all(|c| c.evaluate(scores)),
            LogicalOperator::Or => self.conditions.iter().any(|c| c.evaluate(scores)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeConfig {
    #[serde(default)]
    pub rules: Vec<CompositeRule>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub risk_level: RiskLevel,
    pub label: String,
    pub description: String,
    pub suggestion: String,
    /// One entry per factor referenced by the matched rule.
    pub details: Vec<InterpretResult>,
}

impl CompositeResult {
    pub fn is_high_risk(&self) -> bool {
        self.risk_level.is_high()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCompositeStrategy;

impl CompositeStrategy for DefaultCompositeStrategy {
    fn kind(&self) -> InterpretStrategyKind {
        InterpretStrategyKind::Composite
    }

    fn interpret_multiple(
        &self,
        scores: &[ScoredFactor],
        config: &CompositeConfig,
    ) -> Result<CompositeResult, EngineError> {
        let by_code: HashMap<&str, f64> = scores
            .iter()
            .map(|s| (s.factor_code.as_str(), s.score))
            .collect();

        let rule = config
            .rules
            .iter()
            .find(|rule| rule.matches(&by_code))
            .ok_or(EngineError::NoCompositeMatch {
                rule_count: config.rules.len(),
            })?;

        let mut details = Vec::new();
        for condition in &rule.conditions {
            let Some(&score) = by_code.get(condition.factor_code.as_str()) else {
                continue;
            };
            if details
                .iter()
                .any(|d: &InterpretResult| d.factor_code == condition.factor_code)
            {
                continue;
            }
            details.push(InterpretResult {
                factor_code: condition.factor_code.clone(),
                score,
                risk_level: rule.risk_level,
                label: rule.label.clone(),
                description: rule.description.clone(),
                suggestion: rule.suggestion.clone(),
            });
        }

        Ok(CompositeResult {
            risk_level: rule.risk_level,
            label: rule.label.clone(),
            description: rule.description.clone(),
            suggestion: rule.suggestion.clone(),
            details,
        })
    }
}

// ---------------------------------------------------------------------------
// Interpreter facade
// ---------------------------------------------------------------------------

/// Dispatches interpretation requests to the strategies in a registry.
#[derive(Clone)]
pub struct Interpreter {
    registry: Arc<StrategyRegistry>,
}

impl Interpreter {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn interpret_factor(
        &self,
        score: f64,
        config: &InterpretConfig,
        kind: InterpretStrategyKind,
    ) -> Result<InterpretResult, EngineError> {
        self.registry.interpret_strategy(kind)?.interpret(score, config)
    }

    pub fn interpret_multiple_factors(
        &self,
        scores: &[ScoredFactor],
        config: &CompositeConfig,
        kind: InterpretStrategyKind,
    ) -> Result<CompositeResult, EngineError> {
        self.registry
            .composite_strategy(kind)?
            .interpret_multiple(scores, config)
    }
}

// ---------------------------------------------------------------------------
// Default narratives
// ---------------------------------------------------------------------------

/// Canned labels and narratives used when a scale supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInterpretationProvider;

impl DefaultInterpretationProvider {
    pub fn label(&self, risk: RiskLevel) -> &'static str {
        match risk {
            RiskLevel::None => "Normal",
            RiskLevel::Low => "Mild",
            RiskLevel::Medium => "Moderate",
            RiskLevel::High => "Elevated",
            RiskLevel::Severe => "Severe",
        }
    }

    pub fn factor(&self, factor_code: &str, name: &str, score: f64, risk: RiskLevel) -> InterpretResult {
        let (level, suggestion) = match risk {
            RiskLevel::None => (
                "a normal",
                "No action needed. Keep up current habits.",
            ),
            RiskLevel::Low => (
                "a mild",
                "Monitor over time and consider self-care measures.",
            ),
            RiskLevel::Medium => (
                "a moderate",
                "Consider talking to a counselor about this area.",
            ),
            RiskLevel::High => (
                "an elevated",
                "Professional consultation is recommended.",
            ),
            RiskLevel::Severe => (
                "a severe",
                "Seek professional help as soon as possible.",
            ),
        };
        InterpretResult {
            factor_code: factor_code.to_string(),
            score,
            risk_level: risk,
            label: self.label(risk).to_string(),
            description: format!("{name} score {score:.1}, at {level} level."),
            suggestion: suggestion.to_string(),
        }
    }

    pub fn overall(&self, total_score: f64, risk: RiskLevel) -> InterpretResult {
        let (description, suggestion) = match risk {
            RiskLevel::None => (
                "Overall results are within the normal range.",
                "Maintain a healthy routine.",
            ),
            RiskLevel::Low => (
                "Overall results show mild concerns.",
                "Pay attention to the flagged areas and re-assess later.",
            ),
            RiskLevel::Medium => (
                "Overall results show moderate concerns.",
                "A follow-up conversation with a counselor is advised.",
            ),
            RiskLevel::High => (
                "Overall results show elevated risk.",
                "Arrange a professional consultation.",
            ),
            RiskLevel::Severe => (
                "Overall results show severe risk.",
                "Seek professional help promptly.",
            ),
        };
        InterpretResult {
            factor_code: String::new(),
            score: total_score,
            risk_level: risk,
            label: self.label(risk).to_string(),
            description: format!("Total score {total_score:.1}. {description}"),
            suggestion: suggestion.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min: f64, max: f64, risk: RiskLevel, label: &str) -> InterpretRule {
        InterpretRule {
            min,
            max,
            risk_level: risk,
            label: label.to_string(),
            description: format!("{label} description"),
            suggestion: format!("{label} suggestion"),
        }
    }

    fn two_band_config() -> InterpretConfig {
        InterpretConfig {
            factor_code: "f".to_string(),
            rules: vec![
                rule(0.0, 59.0, RiskLevel::Low, "low"),
                rule(60.0, 100.0, RiskLevel::High, "high"),
            ],
            params: HashMap::new(),
        }
    }

    fn interpreter() -> Interpreter {
        Interpreter::new(Arc::new(StrategyRegistry::with_defaults()))
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::None < RiskLevel::Low);
        assert!(RiskLevel::High < RiskLevel::Severe);
        assert_eq!(RiskLevel::ALL.iter().max(), Some(&RiskLevel::Severe));
        assert!(RiskLevel::High.is_high());
        assert!(RiskLevel::Severe.is_high());
        assert!(!RiskLevel::Medium.is_high());
    }

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert!("critical".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn default_thresholds() {
        assert_eq!(default_risk_level_by_score(80.0), RiskLevel::Severe);
        assert_eq!(default_risk_level_by_score(79.9), RiskLevel::High);
        assert_eq!(default_risk_level_by_score(60.0), RiskLevel::High);
        assert_eq!(default_risk_level_by_score(40.0), RiskLevel::Medium);
        assert_eq!(default_risk_level_by_score(20.0), RiskLevel::Low);
        assert_eq!(default_risk_level_by_score(19.9), RiskLevel::None);
    }

    #[test]
    fn interpret_rule_is_closed() {
        let r = rule(0.0, 10.0, RiskLevel::Low, "x");
        assert!(r.contains(0.0));
        assert!(r.contains(10.0));
        assert!(!r.contains(10.01));
    }

    #[test]
    fn score_range_is_half_open() {
        let range = ScoreRange::new(0.0, 10.0);
        assert!(range.contains(0.0));
        assert!(range.contains(9.999));
        assert!(!range.contains(10.0));
    }

    #[test]
    fn degenerate_range_is_invalid() {
        let err = ScoreRange::new(5.0, 5.0).validate().unwrap_err();
        assert!(err.to_string().contains("[5.00, 5.00)"));
        assert!(ScoreRange::new(6.0, 5.0).validate().is_err());
    }

    #[test]
    fn shared_endpoint_does_not_overlap() {
        let a = ScoreRange::new(0.0, 10.0);
        let b = ScoreRange::new(10.0, 20.0);
        assert!(!a.is_overlapping(&b));
        assert!(a.is_overlapping(&ScoreRange::new(9.0, 11.0)));
    }

    #[test]
    fn validate_ranges_checks_tiling() {
        let ok = [
            ScoreRange::new(10.0, 20.0),
            ScoreRange::new(0.0, 10.0),
            ScoreRange::new(20.0, 30.0),
        ];
        assert!(validate_ranges(&ok).is_ok());

        let gap = [ScoreRange::new(0.0, 10.0), ScoreRange::new(11.0, 20.0)];
        assert!(validate_ranges(&gap).unwrap_err().to_string().contains("gap"));

        let overlap = [ScoreRange::new(0.0, 10.0), ScoreRange::new(5.0, 20.0)];
        assert!(validate_ranges(&overlap)
            .unwrap_err()
            .to_string()
            .contains("overlap"));

        assert!(validate_ranges(&[]).is_err());
    }

    #[test]
    fn simple_rule_requires_content() {
        assert!(SimpleInterpretRule::new(ScoreRange::new(0.0, 1.0), "  ").is_err());
        let rule = SimpleInterpretRule::new(ScoreRange::new(0.0, 1.0), "fine").unwrap();
        assert!(rule.matches(0.5));
        assert!(!rule.matches(1.0));
        assert_eq!(rule.content(), "fine");
    }

    #[test]
    fn threshold_boundaries() {
        let interp = interpreter();
        let cfg = two_band_config();

        let at_60 = interp
            .interpret_factor(60.0, &cfg, InterpretStrategyKind::Threshold)
            .unwrap();
        assert_eq!(at_60.risk_level, RiskLevel::High);

        let at_59 = interp
            .interpret_factor(59.0, &cfg, InterpretStrategyKind::Threshold)
            .unwrap();
        assert_eq!(at_59.risk_level, RiskLevel::Low);
        assert_eq!(at_59.label, "low");

        let err = interp
            .interpret_factor(150.0, &cfg, InterpretStrategyKind::Threshold)
            .unwrap_err();
        assert!(matches!(err, EngineError::NoMatch { score, .. } if score == 150.0));
    }

    #[test]
    fn range_matches_threshold() {
        let interp = interpreter();
        let cfg = two_band_config();
        for score in [0.0, 30.0, 59.0, 60.0, 100.0] {
            assert_eq!(
                interp.interpret_factor(score, &cfg, InterpretStrategyKind::Range),
                interp.interpret_factor(score, &cfg, InterpretStrategyKind::Threshold),
            );
        }
    }

    #[test]
    fn composite_kind_is_not_a_single_factor_strategy() {
        let err = interpreter()
            .interpret_factor(1.0, &two_band_config(), InterpretStrategyKind::Composite)
            .unwrap_err();
        assert!(matches!(err, EngineError::StrategyNotRegistered { .. }));
    }

    #[test]
    fn interpret_factor_with_rule_outside_is_none() {
        let r = rule(0.0, 10.0, RiskLevel::Low, "x");
        assert!(interpret_factor_with_rule("f", 11.0, &r).is_none());
        let hit = interpret_factor_with_rule("f", 5.0, &r).unwrap();
        assert_eq!(hit.factor_code, "f");
        assert_eq!(hit.score, 5.0);
    }

    fn composite_config(operator: LogicalOperator) -> CompositeConfig {
        CompositeConfig {
            rules: vec![CompositeRule {
                conditions: vec![
                    FactorCondition {
                        factor_code: "a".into(),
                        operator: ComparisonOperator::Ge,
                        value: 10.0,
                        max_value: None,
                    },
                    FactorCondition {
                        factor_code: "b".into(),
                        operator: ComparisonOperator::Ge,
                        value: 10.0,
                        max_value: None,
                    },
                ],
                operator,
                risk_level: RiskLevel::High,
                label: "combined".into(),
                description: "both elevated".into(),
                suggestion: "follow up".into(),
            }],
            params: HashMap::new(),
        }
    }

    #[test]
    fn composite_truth_table() {
        let interp = interpreter();
        let cases = [
            (5.0, 5.0, false, false),
            (15.0, 5.0, false, true),
            (5.0, 15.0, false, true),
            (15.0, 15.0, true, true),
        ];
        for (a, b, and_expected, or_expected) in cases {
            let scores = [ScoredFactor::new("a", a), ScoredFactor::new("b", b)];
            let and = interp.interpret_multiple_factors(
                &scores,
                &composite_config(LogicalOperator::And),
                InterpretStrategyKind::Composite,
            );
            let or = interp.interpret_multiple_factors(
                &scores,
                &composite_config(LogicalOperator::Or),
                InterpretStrategyKind::Composite,
            );
            assert_eq!(and.is_ok(), and_expected, "and a={a} b={b}");
            assert_eq!(or.is_ok(), or_expected, "or a={a} b={b}");
            if let Err(e) = and {
                assert!(matches!(e, EngineError::NoCompositeMatch { rule_count: 1 }));
            }
        }
    }

    #[test]
    fn composite_details_cover_referenced_factors() {
        let scores = [
            ScoredFactor::new("a", 12.0),
            ScoredFactor::new("b", 11.0),
            ScoredFactor::new("c", 99.0),
        ];
        let result = DefaultCompositeStrategy
            .interpret_multiple(&scores, &composite_config(LogicalOperator::And))
            .unwrap();
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(result.is_high_risk());
        let codes: Vec<&str> = result.details.iter().map(|d| d.factor_code.as_str()).collect();
        assert_eq!(codes, vec!["a", "b"]);
    }

    #[test]
    fn missing_factor_fails_its_condition() {
        let scores = [ScoredFactor::new("a", 50.0)];
        assert!(DefaultCompositeStrategy
            .interpret_multiple(&scores, &composite_config(LogicalOperator::And))
            .is_err());
        assert!(DefaultCompositeStrategy
            .interpret_multiple(&scores, &composite_config(LogicalOperator::Or))
            .is_ok());
    }

    #[test]
    fn between_is_inclusive() {
        let cond = FactorCondition {
            factor_code: "a".into(),
            operator: ComparisonOperator::Between,
            value: 10.0,
            max_value: Some(20.0),
        };
        for (score, expected) in [(10.0, true), (20.0, true), (9.9, false), (20.1, false)] {
            let scores = HashMap::from([("a", score)]);
            assert_eq!(cond.evaluate(&scores), expected, "score={score}");
        }
    }

    #[test]
    fn comparison_operators_deserialize_from_symbols() {
        let cond: FactorCondition =
            toml::from_str("factor_code = \"a\"\noperator = \">=\"\nvalue = 3.0").unwrap();
        assert_eq!(cond.operator, ComparisonOperator::Ge);
    }

    #[test]
    fn default_narratives_mention_name_and_score() {
        let provider = DefaultInterpretationProvider;
        let result = provider.factor("anx", "Anxiety", 42.34, RiskLevel::Medium);
        assert_eq!(result.description, "Anxiety score 42.3, at a moderate level.");
        assert_eq!(result.label, "Moderate");
        assert!(!result.suggestion.is_empty());

        let overall = provider.overall(12.0, RiskLevel::None);
        assert!(overall.description.starts_with("Total score 12.0."));
    }
}
