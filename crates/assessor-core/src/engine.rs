//! Evaluation orchestrator.
//!
//! Loads an assessment with its scale, questionnaire, and answer sheet, then
//! scores and interprets every factor. It persists the score and report and
//! only then moves the assessment to `interpreted`. A failure after the
//! assessment is loaded moves it to `failed` instead, so nothing is left
//! stuck in `submitted`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::assessment::{Assessment, AssessmentId, AssessmentStatus};
use crate::batch::{
    fan_out, BatchInterpreter, BatchScorer, CancelToken, InterpretTask, ScoreTask,
};
use crate::error::EngineError;
use crate::interpretation::{
    default_risk_level_by_score, DefaultInterpretationProvider, InterpretResult,
    InterpretStrategyKind, Interpreter, RiskLevel, ScoredFactor,
};
use crate::model::{AnswerSheet, Factor, MedicalScale, Questionnaire};
use crate::registry::StrategyRegistry;
use crate::report::{DefaultReportBuilder, ReportBuilder};
use crate::score::{AssessmentScore, EvaluationResult, FactorScoreResult};
use crate::traits::{
    AnswerSheetRepository, AssessmentRepository, EventPublisher, NoopPublisher,
    QuestionnaireRepository, ReportRepository, ScaleRepository, ScoreRepository,
};

/// Configuration for the evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Workers for answer scoring; 0 picks a size from the batch length.
    pub scoring_workers: usize,
    /// Workers for factor interpretation; 0 picks a size from the batch length.
    pub interpret_workers: usize,
    /// Maximum assessments evaluated at once by `evaluate_batch`.
    pub batch_parallelism: usize,
    /// Scales with more factors than this are scored concurrently.
    pub concurrent_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring_workers: 0,
            interpret_workers: 0,
            batch_parallelism: 4,
            concurrent_threshold: 10,
        }
    }
}

/// The storage ports the engine reads from and writes to.
#[derive(Clone)]
pub struct Repositories {
    pub assessments: Arc<dyn AssessmentRepository>,
    pub scales: Arc<dyn ScaleRepository>,
    pub questionnaires: Arc<dyn QuestionnaireRepository>,
    pub answer_sheets: Arc<dyn AnswerSheetRepository>,
    pub scores: Arc<dyn ScoreRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    Interpreted(AssessmentScore),
    /// The pipeline failed and the assessment was moved to `failed`.
    Failed { reason: String },
}

impl EvaluationOutcome {
    pub fn is_interpreted(&self) -> bool {
        matches!(self, EvaluationOutcome::Interpreted(_))
    }
}

/// Per-id entry of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub assessment_id: AssessmentId,
    pub succeeded: bool,
    pub total_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Ids never started because the batch was cancelled.
    pub skipped: Vec<AssessmentId>,
    pub items: Vec<BatchItem>,
}

impl BatchSummary {
    pub fn failed_ids(&self) -> Vec<AssessmentId> {
        self.items
            .iter()
            .filter(|i| !i.succeeded)
            .map(|i| i.assessment_id)
            .collect()
    }

    pub fn item(&self, id: AssessmentId) -> Option<&BatchItem> {
        self.items.iter().find(|i| i.assessment_id == id)
    }
}

struct EvaluationInputs {
    scale: MedicalScale,
    questionnaire: Questionnaire,
    answer_sheet: AnswerSheet,
}

/// The evaluation engine. Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct EvaluationEngine {
    repos: Repositories,
    publisher: Arc<dyn EventPublisher>,
    report_builder: Arc<dyn ReportBuilder>,
    interpreter: Interpreter,
    scorer: BatchScorer,
    batch_interpreter: BatchInterpreter,
    narratives: DefaultInterpretationProvider,
    config: EngineConfig,
}

impl EvaluationEngine {
    pub fn new(repos: Repositories, registry: Arc<StrategyRegistry>, config: EngineConfig) -> Self {
        let interpreter = Interpreter::new(registry);
        Self {
            repos,
            publisher: Arc::new(NoopPublisher),
            report_builder: Arc::new(DefaultReportBuilder),
            batch_interpreter: BatchInterpreter::new(interpreter.clone()),
            interpreter,
            scorer: BatchScorer::new(),
            narratives: DefaultInterpretationProvider,
            config,
        }
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_report_builder(mut self, builder: Arc<dyn ReportBuilder>) -> Self {
        self.report_builder = builder;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluates one assessment.
    ///
    /// Returns `Err` when the assessment is missing, is not awaiting
    /// evaluation, or one of its inputs is missing. Any other failure is
    /// reported as [`EvaluationOutcome::Failed`] after the assessment has
    /// been moved to `failed`.
    pub async fn evaluate(&self, id: AssessmentId) -> Result<EvaluationOutcome, EngineError> {
        if id.is_zero() {
            return Err(EngineError::InvalidArgument(
                "assessment id must be set".to_string(),
            ));
        }
        let start = Instant::now();

        let mut assessment = self.repos.assessments.find_by_id(id).await?;
        if !assessment.needs_evaluation() {
            if assessment.status() == AssessmentStatus::Submitted {
                tracing::info!("assessment {id} has no medical scale bound, skipping");
            }
            return Err(EngineError::InvalidStatus {
                operation: "evaluate",
                status: assessment.status(),
            });
        }

        let inputs = match self.load_inputs(&assessment).await {
            Ok(inputs) => inputs,
            Err(err) => {
                self.fail(&mut assessment, format!("failed to load evaluation inputs: {err}"))
                    .await;
                return Err(err);
            }
        };

        match self.run_pipeline(assessment.clone(), &inputs).await {
            Ok((mut interpreted, score)) => {
                self.publish_events(&mut interpreted).await;
                tracing::info!(
                    assessment_id = %id,
                    scale_code = %inputs.scale.code,
                    total_score = score.total_score(),
                    risk_level = %score.risk_level(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "assessment interpreted"
                );
                Ok(EvaluationOutcome::Interpreted(score))
            }
            Err(err) => {
                let reason = format!("evaluation failed: {err}");
                tracing::warn!("assessment {id}: {reason}");
                self.fail(&mut assessment, reason.clone()).await;
                Ok(EvaluationOutcome::Failed { reason })
            }
        }
    }

    /// Evaluates many assessments with bounded parallelism. One assessment's
    /// failure never affects the others.
    pub async fn evaluate_batch(&self, ids: &[AssessmentId], cancel: &CancelToken) -> BatchSummary {
        let start = Instant::now();
        let engine = self.clone();
        let outcomes = fan_out(
            ids.to_vec(),
            self.config.batch_parallelism,
            cancel,
            move |id| {
                let engine = engine.clone();
                async move { (id, engine.evaluate(id).await) }
            },
        )
        .await;

        let mut summary = BatchSummary {
            total: ids.len(),
            ..BatchSummary::default()
        };
        for (id, outcome) in outcomes {
            let item = match outcome {
                Ok(EvaluationOutcome::Interpreted(score)) => BatchItem {
                    assessment_id: id,
                    succeeded: true,
                    total_score: Some(score.total_score()),
                    risk_level: Some(score.risk_level()),
                    error: None,
                },
                Ok(EvaluationOutcome::Failed { reason }) => BatchItem {
                    assessment_id: id,
                    succeeded: false,
                    total_score: None,
                    risk_level: None,
                    error: Some(reason),
                },
                Err(err) => {
                    tracing::warn!("assessment {id} not evaluated: {err}");
                    BatchItem {
                        assessment_id: id,
                        succeeded: false,
                        total_score: None,
                        risk_level: None,
                        error: Some(err.to_string()),
                    }
                }
            };
            if item.succeeded {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            summary.items.push(item);
        }
        summary.skipped = ids
            .iter()
            .filter(|id| summary.item(**id).is_none())
            .copied()
            .collect();

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "batch evaluation complete"
        );
        summary
    }

    async fn load_inputs(&self, assessment: &Assessment) -> Result<EvaluationInputs, EngineError> {
        let scale_code = assessment
            .scale()
            .map(|s| s.code.as_str())
            .ok_or_else(|| EngineError::not_found("medical scale", "<unbound>"))?;
        let scale = self.repos.scales.find_by_code(scale_code).await?;

        let q = assessment.questionnaire();
        let questionnaire = self
            .repos
            .questionnaires
            .find_by_code_version(&q.code, &q.version)
            .await?;

        let answer_sheet = self
            .repos
            .answer_sheets
            .find_by_id(assessment.answer_sheet_id())
            .await?;

        Ok(EvaluationInputs {
            scale,
            questionnaire,
            answer_sheet,
        })
    }

    /// Runs scoring through persistence. On success the returned assessment
    /// is interpreted and saved; the input aggregate is never modified.
    async fn run_pipeline(
        &self,
        mut assessment: Assessment,
        inputs: &EvaluationInputs,
    ) -> Result<(Assessment, AssessmentScore), EngineError> {
        let result = self.compute(inputs).await?;

        let score = AssessmentScore::from_evaluation_result(assessment.id(), &result);
        let report = self
            .report_builder
            .build(&assessment, &inputs.scale, &result)?;

        self.repos
            .scores
            .save_scores(std::slice::from_ref(&score))
            .await?;
        self.repos.reports.save(&report).await?;

        assessment.apply_evaluation(&result)?;
        self.repos.assessments.save(&assessment).await?;
        Ok((assessment, score))
    }

    /// Scores and interprets every factor of the scale.
    pub async fn compute_result(
        &self,
        scale: &MedicalScale,
        questionnaire: &Questionnaire,
        answer_sheet: &AnswerSheet,
    ) -> Result<EvaluationResult, EngineError> {
        let concurrent = scale.factors.len() > self.config.concurrent_threshold;
        let mut factor_scores = self
            .score_factors(scale, questionnaire, answer_sheet, concurrent)
            .await?;
        let matched = self
            .interpret_factors(scale, &mut factor_scores, concurrent)
            .await?;

        let total_index = factor_scores.iter().position(|f| f.is_total_score);
        let total_factor = total_index.map(|i| &factor_scores[i]);
        let total_score = match total_factor {
            Some(f) => f.raw_score,
            None => factor_scores.iter().map(|f| f.raw_score).sum(),
        };
        let mut risk_level = match total_factor {
            Some(f) => f.risk_level,
            None => factor_scores
                .iter()
                .map(|f| f.risk_level)
                .max()
                .unwrap_or_default(),
        };

        let total_rule = total_index.and_then(|i| matched[i].as_ref());
        let mut composite_rule = None;
        let (mut conclusion, mut suggestion) = match total_rule {
            Some(rule) => (rule.description.clone(), rule.suggestion.clone()),
            None => {
                let overall = self.narratives.overall(total_score, risk_level);
                (overall.description, overall.suggestion)
            }
        };

        if let Some(composite) = scale.composite.as_ref().filter(|c| !c.rules.is_empty()) {
            let scored: Vec<ScoredFactor> = factor_scores
                .iter()
                .map(|f| ScoredFactor::new(f.factor_code.clone(), f.raw_score))
                .collect();
            match self.interpreter.interpret_multiple_factors(
                &scored,
                composite,
                InterpretStrategyKind::Composite,
            ) {
                Ok(result) => {
                    tracing::debug!(
                        "composite rule '{}' matched for scale {}",
                        result.label,
                        scale.code
                    );
                    risk_level = result.risk_level;
                    composite_rule = Some(result.label);
                    if !result.description.is_empty() {
                        conclusion = result.description;
                    }
                    if !result.suggestion.is_empty() {
                        suggestion = result.suggestion;
                    }
                }
                Err(err) if err.is_no_match() => {
                    tracing::debug!("no composite rule matched for scale {}", scale.code);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(EvaluationResult {
            total_score,
            risk_level,
            conclusion,
            suggestion,
            factor_scores,
            composite_rule,
        })
    }

    async fn compute(&self, inputs: &EvaluationInputs) -> Result<EvaluationResult, EngineError> {
        self.compute_result(&inputs.scale, &inputs.questionnaire, &inputs.answer_sheet)
            .await
    }

    async fn score_factors(
        &self,
        scale: &MedicalScale,
        questionnaire: &Questionnaire,
        answer_sheet: &AnswerSheet,
        concurrent: bool,
    ) -> Result<Vec<FactorScoreResult>, EngineError> {
        let mut answered = HashSet::new();
        let tasks: Vec<ScoreTask> = answer_sheet
            .answers
            .iter()
            .filter_map(|answer| {
                if !answered.insert(answer.question_code.as_str()) {
                    tracing::debug!(
                        "repeated answer to question '{}' ignored",
                        answer.question_code
                    );
                    return None;
                }
                let Some(question) = questionnaire.question(&answer.question_code) else {
                    tracing::debug!(
                        "answer to unknown question '{}' ignored",
                        answer.question_code
                    );
                    return None;
                };
                Some(ScoreTask {
                    id: answer.question_code.clone(),
                    value: answer.value.clone(),
                    option_scores: question.option_scores(),
                })
            })
            .collect();

        let results = if concurrent {
            self.scorer
                .score_all_concurrent(&tasks, self.config.scoring_workers, &CancelToken::new())
                .await
        } else {
            self.scorer.score_all(&tasks)
        };
        if results.len() != tasks.len() {
            return Err(EngineError::InvalidArgument(format!(
                "scored {} of {} answers",
                results.len(),
                tasks.len()
            )));
        }
        let answer_scores: HashMap<String, (f64, f64)> = results
            .into_iter()
            .map(|r| (r.id, (r.score, r.max_score)))
            .collect();

        scale
            .factors
            .iter()
            .map(|factor| self.score_factor(factor, &answer_scores))
            .collect()
    }

    fn score_factor(
        &self,
        factor: &Factor,
        answer_scores: &HashMap<String, (f64, f64)>,
    ) -> Result<FactorScoreResult, EngineError> {
        let strategy = self.interpreter.registry().scoring(&factor.scoring_strategy)?;
        let (values, maxima): (Vec<f64>, Vec<f64>) = factor
            .question_codes
            .iter()
            .filter_map(|code| answer_scores.get(code).copied())
            .unzip();
        let raw_score = strategy.calculate(&values, &factor.scoring_params)?;
        let max_score = factor.max_score.or_else(|| {
            (!maxima.is_empty())
                .then(|| strategy.calculate(&maxima, &factor.scoring_params).ok())
                .flatten()
        });

        Ok(FactorScoreResult {
            factor_code: factor.code.clone(),
            factor_name: if factor.title.is_empty() {
                factor.code.clone()
            } else {
                factor.title.clone()
            },
            raw_score,
            max_score,
            risk_level: RiskLevel::None,
            conclusion: String::new(),
            suggestion: String::new(),
            is_total_score: factor.is_total_score,
        })
    }

    /// Fills in risk level and narrative for each factor. Returns one slot
    /// per factor, holding the rule result when the factor's rules matched.
    async fn interpret_factors(
        &self,
        scale: &MedicalScale,
        factor_scores: &mut [FactorScoreResult],
        concurrent: bool,
    ) -> Result<Vec<Option<InterpretResult>>, EngineError> {
        let tasks: Vec<InterpretTask> = scale
            .factors
            .iter()
            .zip(factor_scores.iter())
            .map(|(factor, score)| InterpretTask {
                id: factor.code.clone(),
                score: score.raw_score,
                config: factor.interpret_config(),
                strategy: factor.interpret_strategy,
            })
            .collect();

        let results = if concurrent {
            self.batch_interpreter
                .interpret_all_concurrent(&tasks, self.config.interpret_workers, &CancelToken::new())
                .await
        } else {
            self.batch_interpreter.interpret_all(&tasks)
        };
        if results.len() != tasks.len() {
            return Err(EngineError::InvalidArgument(format!(
                "interpreted {} of {} factors",
                results.len(),
                tasks.len()
            )));
        }

        let mut matched = Vec::with_capacity(results.len());
        for ((factor, score), task_result) in scale
            .factors
            .iter()
            .zip(factor_scores.iter_mut())
            .zip(results)
        {
            let outcome = task_result.into_result();

            match outcome {
                Ok(result) => {
                    score.risk_level = result.risk_level;
                    let fallback = self.narratives.factor(
                        &factor.code,
                        &score.factor_name,
                        score.raw_score,
                        result.risk_level,
                    );
                    score.conclusion = non_empty_or(&result.description, fallback.description);
                    score.suggestion = non_empty_or(&result.suggestion, fallback.suggestion);
                    matched.push(Some(result));
                }
                Err(err) if err.is_no_match() => {
                    let risk = default_risk_level_by_score(score.raw_score);
                    tracing::debug!(
                        "no rule for factor '{}' at {}, using default level {risk}",
                        factor.code,
                        score.raw_score
                    );
                    let fallback =
                        self.narratives
                            .factor(&factor.code, &score.factor_name, score.raw_score, risk);
                    score.risk_level = risk;
                    score.conclusion = match factor.find_simple_rule(score.raw_score) {
                        Some(rule) => rule.content().to_string(),
                        None => fallback.description,
                    };
                    score.suggestion = fallback.suggestion;
                    matched.push(None);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(matched)
    }

    async fn fail(&self, assessment: &mut Assessment, reason: String) {
        if let Err(e) = assessment.mark_as_failed(reason) {
            tracing::error!("could not mark assessment {} as failed: {e}", assessment.id());
            return;
        }
        if let Err(e) = self.repos.assessments.save(assessment).await {
            tracing::error!("could not save failed assessment {}: {e}", assessment.id());
        }
        self.publish_events(assessment).await;
    }

    async fn publish_events(&self, assessment: &mut Assessment) {
        for event in assessment.take_events() {
            if let Err(e) = self.publisher.publish(&event).await {
                tracing::warn!(
                    "failed to publish {} for assessment {}: {e:#}",
                    event.event_type(),
                    event.assessment_id()
                );
            }
        }
    }
}

fn non_empty_or(value: &str, fallback: String) -> String {
    if value.is_empty() {
        fallback
    } else {
        value.to_string()
    }
}
