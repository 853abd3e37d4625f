//! Bounded fan-out and the batch scoring / interpretation front-ends.
//!
//! Every batch entry point comes in a sequential and a concurrent flavour.
//! Both produce results in input order, and each task is independent: one
//! failing task never prevents the others from completing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use std::panic::AssertUnwindSafe;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::EngineError;
use crate::interpretation::{InterpretConfig, InterpretResult, InterpretStrategyKind, Interpreter};
use crate::model::AnswerValue;
use crate::scoring::OptionScorer;

/// Upper bound on the automatically chosen worker count.
pub const MAX_AUTO_WORKERS: usize = 100;

/// Cooperative cancellation signal shared across a batch.
///
/// Cancelling stops tasks that have not started yet; tasks already running
/// finish and their results are kept.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Resolves a requested worker count against the batch size.
///
/// Zero picks `len / 10` bounded to `1..=100`. The result never exceeds the
/// number of tasks and is at least one.
pub fn resolve_workers(requested: usize, len: usize) -> usize {
    let workers = if requested == 0 {
        (len / 10).clamp(1, MAX_AUTO_WORKERS)
    } else {
        requested
    };
    workers.clamp(1, len.max(1))
}

/// Runs `op` over every task with at most `workers` in flight at once and
/// returns the results in input order.
///
/// Tasks skipped because of cancellation, and tasks whose worker panicked,
/// are absent from the output, so a short result list means the batch was
/// cut off. Dropping the returned future stops every task that has not
/// finished.
pub async fn fan_out<T, R, F, Fut>(tasks: Vec<T>, workers: usize, cancel: &CancelToken, op: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(resolve_workers(workers, total)));
    let op = Arc::new(op);
    let mut futures = FuturesUnordered::new();

    for (index, task) in tasks.into_iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::debug!("batch cancelled after dispatching {index} of {total} tasks");
            break;
        }
        let semaphore = Arc::clone(&semaphore);
        let op = Arc::clone(&op);
        let cancel = cancel.clone();
        futures.push(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            if cancel.is_cancelled() {
                return None;
            }
            match AssertUnwindSafe((*op)(task)).catch_unwind().await {
                Ok(result) => Some((index, result)),
                Err(_) => {
                    tracing::error!("batch task {index} panicked");
                    None
                }
            }
        });
    }

    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    while let Some(finished) = futures.next().await {
        if let Some((index, result)) = finished {
            slots[index] = Some(result);
        }
    }

    slots.into_iter().flatten().collect()
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTask {
    pub id: String,
    pub value: AnswerValue,
    pub option_scores: HashMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    pub id: String,
    pub score: f64,
    pub max_score: f64,
}

/// Scores answers against their option weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchScorer {
    scorer: OptionScorer,
}

impl BatchScorer {
    pub fn new() -> Self {
        Self::default()
    }

    fn score_one(scorer: OptionScorer, task: &ScoreTask) -> ScoreResult {
        let (score, max_score) = scorer.score_with_max(&task.value, &task.option_scores);
        ScoreResult {
            id: task.id.clone(),
            score,
            max_score,
        }
    }

    pub fn score_all(&self, tasks: &[ScoreTask]) -> Vec<ScoreResult> {
        tasks
            .iter()
            .map(|task| Self::score_one(self.scorer, task))
            .collect()
    }

    pub async fn score_all_concurrent(
        &self,
        tasks: &[ScoreTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> Vec<ScoreResult> {
        let scorer = self.scorer;
        fan_out(tasks.to_vec(), workers, cancel, move |task| async move {
            Self::score_one(scorer, &task)
        })
        .await
    }

    pub fn score_all_to_map(&self, tasks: &[ScoreTask]) -> HashMap<String, ScoreResult> {
        to_map(self.score_all(tasks), |r| &r.id)
    }

    pub async fn score_all_concurrent_to_map(
        &self,
        tasks: &[ScoreTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> HashMap<String, ScoreResult> {
        to_map(self.score_all_concurrent(tasks, workers, cancel).await, |r| {
            &r.id
        })
    }
}

// ---------------------------------------------------------------------------
// Interpretation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct InterpretTask {
    pub id: String,
    pub score: f64,
    pub config: InterpretConfig,
    pub strategy: InterpretStrategyKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpretTaskResult {
    pub id: String,
    pub result: Option<InterpretResult>,
    pub error: Option<EngineError>,
}

impl InterpretTaskResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Converts back into a `Result`, consuming the task result.
    pub fn into_result(self) -> Result<InterpretResult, EngineError> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(err),
            (Some(result), None) => Ok(result),
            (None, None) => Err(EngineError::InvalidArgument(format!(
                "interpretation task '{}' produced no result",
                self.id
            ))),
        }
    }
}

/// Runs single-factor interpretation over many factors.
#[derive(Clone)]
pub struct BatchInterpreter {
    interpreter: Interpreter,
}

impl BatchInterpreter {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    fn interpret_one(interpreter: &Interpreter, task: &InterpretTask) -> InterpretTaskResult {
        match interpreter.interpret_factor(task.score, &task.config, task.strategy) {
            Ok(result) => InterpretTaskResult {
                id: task.id.clone(),
                result: Some(result),
                error: None,
            },
            Err(err) => InterpretTaskResult {
                id: task.id.clone(),
                result: None,
                error: Some(err),
            },
        }
    }

    pub fn interpret_all(&self, tasks: &[InterpretTask]) -> Vec<InterpretTaskResult> {
        tasks
            .iter()
            .map(|task| Self::interpret_one(&self.interpreter, task))
            .collect()
    }

    pub async fn interpret_all_concurrent(
        &self,
        tasks: &[InterpretTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> Vec<InterpretTaskResult> {
        let interpreter = self.interpreter.clone();
        fan_out(tasks.to_vec(), workers, cancel, move |task| {
            let interpreter = interpreter.clone();
            async move { Self::interpret_one(&interpreter, &task) }
        })
        .await
    }

    pub fn interpret_all_to_map(
        &self,
        tasks: &[InterpretTask],
    ) -> HashMap<String, InterpretTaskResult> {
        to_map(self.interpret_all(tasks), |r| &r.id)
    }

    pub async fn interpret_all_concurrent_to_map(
        &self,
        tasks: &[InterpretTask],
        workers: usize,
        cancel: &CancelToken,
    ) -> HashMap<String, InterpretTaskResult> {
        to_map(
            self.interpret_all_concurrent(tasks, workers, cancel).await,
            |r| &r.id,
        )
    }
}

/// Indexes results by id. Later duplicates replace earlier ones.
pub(crate) fn to_map<R>(results: Vec<R>, id: impl Fn(&R) -> &String) -> HashMap<String, R> {
    results.into_iter().map(|r| (id(&r).clone(), r)).collect()
}
