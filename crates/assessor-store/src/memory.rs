//! In-memory repositories.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::RwLock;

use assessor_core::assessment::{Assessment, AssessmentEvent, AssessmentId, AssessmentSnapshot};
use assessor_core::engine::Repositories;
use assessor_core::error::RepositoryError;
use assessor_core::model::{AnswerSheet, MedicalScale, Questionnaire};
use assessor_core::parser::Fixture;
use assessor_core::report::InterpretReport;
use assessor_core::score::AssessmentScore;
use assessor_core::traits::{
    AnswerSheetRepository, AssessmentRepository, EventPublisher, QuestionnaireRepository,
    ReportRepository, ScaleRepository, ScoreRepository,
};

/// Every repository the engine needs, backed by maps.
///
/// Assessments are held as snapshots, so a loaded aggregate never shares
/// pending events with the stored copy.
pub struct InMemoryStore {
    assessments: RwLock<HashMap<AssessmentId, AssessmentSnapshot>>,
    scales: RwLock<HashMap<String, MedicalScale>>,
    questionnaires: RwLock<HashMap<(String, String), Questionnaire>>,
    answer_sheets: RwLock<HashMap<u64, AnswerSheet>>,
    scores: RwLock<HashMap<AssessmentId, Vec<AssessmentScore>>>,
    reports: RwLock<HashMap<AssessmentId, InterpretReport>>,
    next_id: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::from_fixture(Fixture::default())
    }

    /// Seeds a store from a parsed fixture. Later entries win on duplicate keys.
    pub fn from_fixture(fixture: Fixture) -> Self {
        let max_id = fixture.assessments.iter().map(|a| a.id).max().unwrap_or(0);
        Self {
            assessments: RwLock::new(
                fixture
                    .assessments
                    .into_iter()
                    .map(|a| (AssessmentId(a.id), a))
                    .collect(),
            ),
            scales: RwLock::new(
                fixture
                    .scales
                    .into_iter()
                    .map(|s| (s.code.clone(), s))
                    .collect(),
            ),
            questionnaires: RwLock::new(
                fixture
                    .questionnaires
                    .into_iter()
                    .map(|q| ((q.code.clone(), q.version.clone()), q))
                    .collect(),
            ),
            answer_sheets: RwLock::new(
                fixture
                    .answer_sheets
                    .into_iter()
                    .map(|s| (s.id, s))
                    .collect(),
            ),
            scores: RwLock::default(),
            reports: RwLock::default(),
            next_id: AtomicU64::new(max_id + 1),
        }
    }

    /// Bundles this store as the engine's repositories.
    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            assessments: self.clone(),
            scales: self.clone(),
            questionnaires: self.clone(),
            answer_sheets: self.clone(),
            scores: self.clone(),
            reports: self.clone(),
        }
    }

    /// Stores a new assessment under the next free id and returns the id.
    pub async fn insert_new(&self, assessment: &mut Assessment) -> AssessmentId {
        let id = AssessmentId(self.next_id.fetch_add(1, Ordering::Relaxed));
        assessment.assign_id(id);
        self.assessments
            .write()
            .await
            .insert(id, assessment.to_snapshot());
        id
    }

    pub async fn insert_scale(&self, scale: MedicalScale) {
        self.scales.write().await.insert(scale.code.clone(), scale);
    }

    pub async fn insert_questionnaire(&self, questionnaire: Questionnaire) {
        self.questionnaires.write().await.insert(
            (questionnaire.code.clone(), questionnaire.version.clone()),
            questionnaire,
        );
    }

    pub async fn insert_answer_sheet(&self, sheet: AnswerSheet) {
        self.answer_sheets.write().await.insert(sheet.id, sheet);
    }

    pub async fn remove_scale(&self, code: &str) -> Option<MedicalScale> {
        self.scales.write().await.remove(code)
    }

    /// All stored assessment ids, ascending.
    pub async fn assessment_ids(&self) -> Vec<AssessmentId> {
        let mut ids: Vec<AssessmentId> = self.assessments.read().await.keys().copied().collect();
        ids.sort();
        ids
    }

    pub async fn snapshot(&self, id: AssessmentId) -> Option<AssessmentSnapshot> {
        self.assessments.read().await.get(&id).cloned()
    }

    pub async fn report_count(&self) -> usize {
        self.reports.read().await.len()
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryStore {
    async fn find_by_id(&self, id: AssessmentId) -> Result<Assessment, RepositoryError> {
        self.assessments
            .read()
            .await
            .get(&id)
            .cloned()
            .map(Assessment::from_snapshot)
            .ok_or_else(|| RepositoryError::not_found("assessment", id))
    }

    async fn save(&self, assessment: &Assessment) -> Result<(), RepositoryError> {
        if assessment.id().is_zero() {
            return Err(RepositoryError::Backend(
                "cannot save an assessment without an id".to_string(),
            ));
        }
        self.assessments
            .write()
            .await
            .insert(assessment.id(), assessment.to_snapshot());
        Ok(())
    }
}

#[async_trait]
impl ScaleRepository for InMemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<MedicalScale, RepositoryError> {
        self.scales
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("medical scale", code))
    }
}

#[async_trait]
impl QuestionnaireRepository for InMemoryStore {
    async fn find_by_code_version(
        &self,
        code: &str,
        version: &str,
    ) -> Result<Questionnaire, RepositoryError> {
        self.questionnaires
            .read()
            .await
            .get(&(code.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("questionnaire", format!("{code}@{version}")))
    }
}

#[async_trait]
impl AnswerSheetRepository for InMemoryStore {
    async fn find_by_id(&self, id: u64) -> Result<AnswerSheet, RepositoryError> {
        self.answer_sheets
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("answer sheet", id))
    }
}

#[async_trait]
impl ScoreRepository for InMemoryStore {
    async fn save_scores(&self, scores: &[AssessmentScore]) -> Result<(), RepositoryError> {
        let mut grouped: HashMap<AssessmentId, Vec<AssessmentScore>> = HashMap::new();
        for score in scores {
            grouped
                .entry(score.assessment_id())
                .or_default()
                .push(score.clone());
        }
        let mut stored = self.scores.write().await;
        for (id, scores) in grouped {
            stored.insert(id, scores);
        }
        Ok(())
    }

    async fn find_by_assessment_id(
        &self,
        id: AssessmentId,
    ) -> Result<Vec<AssessmentScore>, RepositoryError> {
        Ok(self
            .scores
            .read()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ReportRepository for InMemoryStore {
    async fn save(&self, report: &InterpretReport) -> Result<(), RepositoryError> {
        self.reports
            .write()
            .await
            .insert(report.assessment_id, report.clone());
        Ok(())
    }

    async fn find_by_assessment_id(
        &self,
        id: AssessmentId,
    ) -> Result<InterpretReport, RepositoryError> {
        self.reports
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("report", id))
    }
}

/// Publisher that keeps every event it receives.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<AssessmentEvent>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every `publish` call fails. Nothing is recorded.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn events(&self) -> Vec<AssessmentEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.event_type()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &AssessmentEvent) -> anyhow::Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            anyhow::bail!("publisher unavailable");
        }
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessor_core::assessment::{Origin, QuestionnaireRef};
    use assessor_core::score::EvaluationResult;
    use assessor_core::interpretation::RiskLevel;

    fn pending() -> Assessment {
        Assessment::new(
            1,
            7,
            QuestionnaireRef {
                code: "q".into(),
                version: "1".into(),
            },
            3,
            Origin::adhoc(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn insert_new_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let mut a = pending();
        let mut b = pending();
        assert_eq!(store.insert_new(&mut a).await, AssessmentId(1));
        assert_eq!(store.insert_new(&mut b).await, AssessmentId(2));
        assert_eq!(b.id(), AssessmentId(2));
        assert_eq!(store.assessment_ids().await, vec![AssessmentId(1), AssessmentId(2)]);
    }

    #[tokio::test]
    async fn default_store_starts_ids_at_one() {
        let store = InMemoryStore::default();
        let mut a = pending();
        let id = store.insert_new(&mut a).await;
        assert_eq!(id, AssessmentId(1));
        AssessmentRepository::save(&store, &a).await.unwrap();
    }

    #[tokio::test]
    async fn ids_continue_after_fixture_assessments() {
        let mut fixture = Fixture::default();
        let mut seeded = pending();
        seeded.assign_id(AssessmentId(41));
        fixture.assessments.push(seeded.to_snapshot());
        let store = InMemoryStore::from_fixture(fixture);

        let mut fresh = pending();
        assert_eq!(store.insert_new(&mut fresh).await, AssessmentId(42));
    }

    #[tokio::test]
    async fn find_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = AssessmentRepository::find_by_id(&store, AssessmentId(9))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.find_by_code("nope").await.unwrap_err().is_not_found());
        assert!(store
            .find_by_code_version("q", "2")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn unsaved_assessment_cannot_be_saved() {
        let store = InMemoryStore::new();
        let err = AssessmentRepository::save(&store, &pending()).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn loaded_assessment_has_no_events() {
        let store = InMemoryStore::new();
        let mut a = pending();
        let id = store.insert_new(&mut a).await;
        a.submit().unwrap();
        assert_eq!(a.pending_events().len(), 1);
        AssessmentRepository::save(&store, &a).await.unwrap();

        let loaded = AssessmentRepository::find_by_id(&store, id).await.unwrap();
        assert!(loaded.pending_events().is_empty());
        assert!(loaded.submitted_at().is_some());
    }

    #[tokio::test]
    async fn save_scores_replaces_previous() {
        let store = InMemoryStore::new();
        let result = |total: f64| EvaluationResult {
            total_score: total,
            risk_level: RiskLevel::Low,
            conclusion: String::new(),
            suggestion: String::new(),
            factor_scores: Vec::new(),
            composite_rule: None,
        };
        let id = AssessmentId(3);
        store
            .save_scores(&[AssessmentScore::from_evaluation_result(id, &result(1.0))])
            .await
            .unwrap();
        store
            .save_scores(&[AssessmentScore::from_evaluation_result(id, &result(2.0))])
            .await
            .unwrap();

        let scores = ScoreRepository::find_by_assessment_id(&store, id).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].total_score(), 2.0);
        assert!(ScoreRepository::find_by_assessment_id(&store, AssessmentId(4))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn recording_publisher_can_fail() {
        let publisher = RecordingPublisher::new();
        let mut a = pending();
        a.assign_id(AssessmentId(1));
        a.submit().unwrap();
        let event = a.take_events().remove(0);

        publisher.publish(&event).await.unwrap();
        publisher.set_failing(true);
        assert!(publisher.publish(&event).await.is_err());
        assert_eq!(publisher.event_types(), vec!["assessment.submitted"]);
    }
}
