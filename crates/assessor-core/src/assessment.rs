//! The assessment aggregate and its lifecycle.
//!
//! ```text
//! pending --submit--> submitted --apply_evaluation--> interpreted
//!                         |  ^
//!             mark_as_failed  retry_from_failed
//!                         v  |
//!                        failed
//! ```
//!
//! Every transition is checked; an illegal one returns
//! [`EngineError::InvalidStatus`] and leaves the aggregate untouched.
//! Transitions record domain events that the orchestrator drains with
//! [`Assessment::take_events`] and publishes after persisting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::interpretation::RiskLevel;
use crate::score::EvaluationResult;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssessmentId(pub u64);

impl AssessmentId {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AssessmentId {
    fn from(id: u64) -> Self {
        AssessmentId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    #[default]
    Pending,
    Submitted,
    Interpreted,
    Failed,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Pending => "pending",
            AssessmentStatus::Submitted => "submitted",
            AssessmentStatus::Interpreted => "interpreted",
            AssessmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssessmentStatus::Interpreted | AssessmentStatus::Failed)
    }
}

impl fmt::Display for AssessmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    #[default]
    Adhoc,
    Plan,
    Screening,
}

/// How the assessment came about. Plan and screening origins carry the id
/// of the originating entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Origin {
    #[serde(rename = "type", default)]
    pub kind: OriginType,
    #[serde(default)]
    pub id: Option<String>,
}

impl Origin {
    pub fn adhoc() -> Self {
        Self::default()
    }

    pub fn plan(id: impl Into<String>) -> Self {
        Self {
            kind: OriginType::Plan,
            id: Some(id.into()),
        }
    }

    pub fn screening(id: impl Into<String>) -> Self {
        Self {
            kind: OriginType::Screening,
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireRef {
    pub code: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalScaleRef {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

/// Domain events recorded by state transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentEvent {
    Submitted {
        event_id: Uuid,
        assessment_id: AssessmentId,
        testee_id: u64,
        questionnaire_code: String,
        questionnaire_version: String,
        answer_sheet_id: u64,
        scale_code: Option<String>,
        occurred_at: DateTime<Utc>,
    },
    Interpreted {
        event_id: Uuid,
        assessment_id: AssessmentId,
        testee_id: u64,
        scale_code: String,
        total_score: f64,
        risk_level: RiskLevel,
        occurred_at: DateTime<Utc>,
    },
    Failed {
        event_id: Uuid,
        assessment_id: AssessmentId,
        testee_id: u64,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl AssessmentEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AssessmentEvent::Submitted { .. } => "assessment.submitted",
            AssessmentEvent::Interpreted { .. } => "assessment.interpreted",
            AssessmentEvent::Failed { .. } => "assessment.failed",
        }
    }

    pub fn assessment_id(&self) -> AssessmentId {
        match self {
            AssessmentEvent::Submitted { assessment_id, .. }
            | AssessmentEvent::Interpreted { assessment_id, .. }
            | AssessmentEvent::Failed { assessment_id, .. } => *assessment_id,
        }
    }
}

/// Stored form of an assessment, as read from fixtures or a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentSnapshot {
    pub id: u64,
    #[serde(default)]
    pub org_id: i64,
    pub testee_id: u64,
    pub questionnaire: QuestionnaireRef,
    pub answer_sheet_id: u64,
    #[serde(default)]
    pub scale: Option<MedicalScaleRef>,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub status: AssessmentStatus,
    #[serde(default)]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub interpreted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    id: AssessmentId,
    org_id: i64,
    testee_id: u64,
    questionnaire: QuestionnaireRef,
    answer_sheet_id: u64,
    scale: Option<MedicalScaleRef>,
    origin: Origin,
    status: AssessmentStatus,
    total_score: Option<f64>,
    risk_level: Option<RiskLevel>,
    submitted_at: Option<DateTime<Utc>>,
    interpreted_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    events: Vec<AssessmentEvent>,
}

impl Assessment {
    /// Creates a pending assessment without an id.
    pub fn new(
        org_id: i64,
        testee_id: u64,
        questionnaire: QuestionnaireRef,
        answer_sheet_id: u64,
        origin: Origin,
    ) -> Result<Self, EngineError> {
        if testee_id == 0 {
            return Err(EngineError::InvalidArgument(
                "testee id must be set".to_string(),
            ));
        }
        if questionnaire.code.is_empty() {
            return Err(EngineError::InvalidArgument(
                "questionnaire code must be set".to_string(),
            ));
        }
        if answer_sheet_id == 0 {
            return Err(EngineError::InvalidArgument(
                "answer sheet id must be set".to_string(),
            ));
        }
        if origin.kind != OriginType::Adhoc && !matches!(origin.id.as_deref(), Some(id) if !id.is_empty()) {
            return Err(EngineError::InvalidArgument(format!(
                "{:?} origin requires an id",
                origin.kind
            )));
        }
        Ok(Self {
            id: AssessmentId::default(),
            org_id,
            testee_id,
            questionnaire,
            answer_sheet_id,
            scale: None,
            origin,
            status: AssessmentStatus::Pending,
            total_score: None,
            risk_level: None,
            submitted_at: None,
            interpreted_at: None,
            failed_at: None,
            failure_reason: None,
            events: Vec::new(),
        })
    }

    pub fn with_scale(mut self, scale: MedicalScaleRef) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Rebuilds an aggregate from storage. No events are recorded.
    pub fn from_snapshot(snapshot: AssessmentSnapshot) -> Self {
        Self {
            id: AssessmentId(snapshot.id),
            org_id: snapshot.org_id,
            testee_id: snapshot.testee_id,
            questionnaire: snapshot.questionnaire,
            answer_sheet_id: snapshot.answer_sheet_id,
            scale: snapshot.scale,
            origin: snapshot.origin,
            status: snapshot.status,
            total_score: snapshot.total_score,
            risk_level: snapshot.risk_level,
            submitted_at: snapshot.submitted_at,
            interpreted_at: snapshot.interpreted_at,
            failed_at: snapshot.failed_at,
            failure_reason: snapshot.failure_reason,
            events: Vec::new(),
        }
    }

    pub fn to_snapshot(&self) -> AssessmentSnapshot {
        AssessmentSnapshot {
            id: self.id.0,
            org_id: self.org_id,
            testee_id: self.testee_id,
            questionnaire: self.questionnaire.clone(),
            answer_sheet_id: self.answer_sheet_id,
            scale: self.scale.clone(),
            origin: self.origin.clone(),
            status: self.status,
            total_score: self.total_score,
            risk_level: self.risk_level,
            submitted_at: self.submitted_at,
            interpreted_at: self.interpreted_at,
            failed_at: self.failed_at,
            failure_reason: self.failure_reason.clone(),
        }
    }

    /// Sets the persistence id.
    ///
    /// # Panics
    ///
    /// Panics if an id is already assigned; reassigning identity is a
    /// programming error, not a runtime condition.
    pub fn assign_id(&mut self, id: AssessmentId) {
        assert!(
            self.id.is_zero(),
            "assessment already has id {}, cannot assign {id}",
            self.id
        );
        self.id = id;
    }

    pub fn submit(&mut self) -> Result<(), EngineError> {
        self.require_status("submit", AssessmentStatus::Pending)?;
        let now = Utc::now();
        self.status = AssessmentStatus::Submitted;
        self.submitted_at = Some(now);
        self.events.push(AssessmentEvent::Submitted {
            event_id: Uuid::new_v4(),
            assessment_id: self.id,
            testee_id: self.testee_id,
            questionnaire_code: self.questionnaire.code.clone(),
            questionnaire_version: self.questionnaire.version.clone(),
            answer_sheet_id: self.answer_sheet_id,
            scale_code: self.scale.as_ref().map(|s| s.code.clone()),
            occurred_at: now,
        });
        Ok(())
    }

    pub fn apply_evaluation(&mut self, result: &EvaluationResult) -> Result<(), EngineError> {
        self.require_status("apply evaluation", AssessmentStatus::Submitted)?;
        let Some(scale) = &self.scale else {
            return Err(EngineError::InvalidArgument(format!(
                "assessment {} has no medical scale bound",
                self.id
            )));
        };
        let now = Utc::now();
        let event = AssessmentEvent::Interpreted {
            event_id: Uuid::new_v4(),
            assessment_id: self.id,
            testee_id: self.testee_id,
            scale_code: scale.code.clone(),
            total_score: result.total_score,
            risk_level: result.risk_level,
            occurred_at: now,
        };
        self.status = AssessmentStatus::Interpreted;
        self.total_score = Some(result.total_score);
        self.risk_level = Some(result.risk_level);
        self.interpreted_at = Some(now);
        self.events.push(event);
        Ok(())
    }

    pub fn mark_as_failed(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        let reason = reason.into();
        self.require_status("mark as failed", AssessmentStatus::Submitted)?;
        if reason.trim().is_empty() {
            return Err(EngineError::InvalidArgument(
                "failure reason must not be empty".to_string(),
            ));
        }
        let now = Utc::now();
        self.status = AssessmentStatus::Failed;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason.clone());
        self.events.push(AssessmentEvent::Failed {
            event_id: Uuid::new_v4(),
            assessment_id: self.id,
            testee_id: self.testee_id,
            reason,
            occurred_at: now,
        });
        Ok(())
    }

    pub fn retry_from_failed(&mut self) -> Result<(), EngineError> {
        self.require_status("retry", AssessmentStatus::Failed)?;
        self.status = AssessmentStatus::Submitted;
        self.failed_at = None;
        self.failure_reason = None;
        Ok(())
    }

    fn require_status(
        &self,
        operation: &'static str,
        expected: AssessmentStatus,
    ) -> Result<(), EngineError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidStatus {
                operation,
                status: self.status,
            })
        }
    }

    /// Drains the recorded events.
    pub fn take_events(&mut self) -> Vec<AssessmentEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> &[AssessmentEvent] {
        &self.events
    }

    pub fn needs_evaluation(&self) -> bool {
        self.status == AssessmentStatus::Submitted && self.scale.is_some()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn id(&self) -> AssessmentId {
        self.id
    }

    pub fn org_id(&self) -> i64 {
        self.org_id
    }

    pub fn testee_id(&self) -> u64 {
        self.testee_id
    }

    pub fn questionnaire(&self) -> &QuestionnaireRef {
        &self.questionnaire
    }

    pub fn answer_sheet_id(&self) -> u64 {
        self.answer_sheet_id
    }

    pub fn scale(&self) -> Option<&MedicalScaleRef> {
        self.scale.as_ref()
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn status(&self) -> AssessmentStatus {
        self.status
    }

    pub fn total_score(&self) -> Option<f64> {
        self.total_score
    }

    pub fn risk_level(&self) -> Option<RiskLevel> {
        self.risk_level
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn interpreted_at(&self) -> Option<DateTime<Utc>> {
        self.interpreted_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Assessment {
        let mut a = Assessment::new(
            1,
            42,
            QuestionnaireRef {
                code: "sas".into(),
                version: "1.0".into(),
            },
            7,
            Origin::adhoc(),
        )
        .unwrap()
        .with_scale(MedicalScaleRef {
            code: "sas".into(),
            name: "Self-rating Anxiety".into(),
        });
        a.assign_id(AssessmentId(100));
        a
    }

    fn result() -> EvaluationResult {
        EvaluationResult {
            total_score: 55.0,
            risk_level: RiskLevel::Medium,
            conclusion: "moderate".into(),
            suggestion: "talk".into(),
            factor_scores: vec![],
            composite_rule: None,
        }
    }

    #[test]
    fn new_rejects_missing_references() {
        let q = QuestionnaireRef {
            code: "sas".into(),
            version: "1".into(),
        };
        assert!(Assessment::new(1, 0, q.clone(), 7, Origin::adhoc()).is_err());
        assert!(Assessment::new(1, 1, q.clone(), 0, Origin::adhoc()).is_err());
        let plan_without_id = Origin {
            kind: OriginType::Plan,
            id: None,
        };
        assert!(Assessment::new(1, 1, q.clone(), 7, plan_without_id).is_err());
        assert!(Assessment::new(1, 1, q, 7, Origin::plan("p-1")).is_ok());
    }

    #[test]
    fn happy_path_records_events() {
        let mut a = pending();
        a.submit().unwrap();
        assert!(a.needs_evaluation());
        a.apply_evaluation(&result()).unwrap();

        assert_eq!(a.status(), AssessmentStatus::Interpreted);
        assert!(a.is_terminal());
        assert_eq!(a.total_score(), Some(55.0));
        assert_eq!(a.risk_level(), Some(RiskLevel::Medium));
        assert!(a.interpreted_at().is_some());

        let events = a.take_events();
        let types: Vec<_> = events.iter().map(AssessmentEvent::event_type).collect();
        assert_eq!(types, vec!["assessment.submitted", "assessment.interpreted"]);
        assert!(events.iter().all(|e| e.assessment_id() == AssessmentId(100)));
        assert!(a.take_events().is_empty());
    }

    #[test]
    fn interpreting_pending_is_rejected_and_state_kept() {
        let mut a = pending();
        let err = a.apply_evaluation(&result()).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidStatus {
                operation: "apply evaluation",
                status: AssessmentStatus::Pending,
            }
        );
        assert_eq!(a.status(), AssessmentStatus::Pending);
        assert!(a.total_score().is_none());
        assert!(a.pending_events().is_empty());
    }

    #[test]
    fn apply_requires_bound_scale() {
        let mut a = Assessment::new(
            1,
            42,
            QuestionnaireRef {
                code: "sas".into(),
                version: "1".into(),
            },
            7,
            Origin::adhoc(),
        )
        .unwrap();
        a.submit().unwrap();
        assert!(!a.needs_evaluation());
        assert!(a.apply_evaluation(&result()).is_err());
        assert_eq!(a.status(), AssessmentStatus::Submitted);
    }

    #[test]
    fn submit_twice_is_rejected() {
        let mut a = pending();
        a.submit().unwrap();
        let err = a.submit().unwrap_err();
        assert!(err.is_invalid_status());
    }

    #[test]
    fn fail_and_retry() {
        let mut a = pending();
        a.submit().unwrap();
        assert!(a.mark_as_failed("").is_err());
        assert_eq!(a.status(), AssessmentStatus::Submitted);

        a.mark_as_failed("scale missing").unwrap();
        assert_eq!(a.status(), AssessmentStatus::Failed);
        assert_eq!(a.failure_reason(), Some("scale missing"));
        assert!(a.failed_at().is_some());
        assert!(a.is_terminal());

        a.retry_from_failed().unwrap();
        assert_eq!(a.status(), AssessmentStatus::Submitted);
        assert!(a.failure_reason().is_none());
        assert!(a.failed_at().is_none());
        assert!(a.needs_evaluation());
    }

    #[test]
    fn retry_only_from_failed() {
        let mut a = pending();
        assert!(a.retry_from_failed().is_err());
        a.submit().unwrap();
        assert!(a.retry_from_failed().is_err());
    }

    #[test]
    fn interpreted_cannot_fail() {
        let mut a = pending();
        a.submit().unwrap();
        a.apply_evaluation(&result()).unwrap();
        assert!(a.mark_as_failed("late").unwrap_err().is_invalid_status());
    }

    #[test]
    #[should_panic(expected = "already has id")]
    fn assign_id_twice_panics() {
        let mut a = pending();
        a.assign_id(AssessmentId(5));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let mut a = pending();
        a.submit().unwrap();
        let events = a.take_events();
        let json = serde_json::to_value(&events[0]).unwrap();
        assert_eq!(json["type"], "submitted");
        assert_eq!(json["assessment_id"], 100);
        assert_eq!(json["scale_code"], "sas");
    }

    #[test]
    fn snapshot_round_trip_keeps_state() {
        let mut a = pending();
        a.submit().unwrap();
        a.mark_as_failed("boom").unwrap();
        let restored = Assessment::from_snapshot(a.to_snapshot());
        assert_eq!(restored.status(), AssessmentStatus::Failed);
        assert_eq!(restored.failure_reason(), Some("boom"));
        assert!(restored.pending_events().is_empty());
    }
}
