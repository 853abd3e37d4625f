//! Storage and notification ports.
//!
//! The engine only talks to these traits; `assessor-store` provides the
//! in-memory implementations used by the CLI and the integration tests.

use async_trait::async_trait;

use crate::assessment::{Assessment, AssessmentEvent, AssessmentId};
use crate::error::RepositoryError;
use crate::model::{AnswerSheet, MedicalScale, Questionnaire};
use crate::report::InterpretReport;
use crate::score::AssessmentScore;

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    async fn find_by_id(&self, id: AssessmentId) -> Result<Assessment, RepositoryError>;

    async fn save(&self, assessment: &Assessment) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ScaleRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<MedicalScale, RepositoryError>;
}

#[async_trait]
pub trait QuestionnaireRepository: Send + Sync {
    async fn find_by_code_version(
        &self,
        code: &str,
        version: &str,
    ) -> Result<Questionnaire, RepositoryError>;
}

#[async_trait]
pub trait AnswerSheetRepository: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<AnswerSheet, RepositoryError>;
}

#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// Replaces any scores already stored for the same assessments.
    async fn save_scores(&self, scores: &[AssessmentScore]) -> Result<(), RepositoryError>;

    async fn find_by_assessment_id(
        &self,
        id: AssessmentId,
    ) -> Result<Vec<AssessmentScore>, RepositoryError>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn save(&self, report: &InterpretReport) -> Result<(), RepositoryError>;

    async fn find_by_assessment_id(
        &self,
        id: AssessmentId,
    ) -> Result<InterpretReport, RepositoryError>;
}

/// Receives domain events after they are persisted.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &AssessmentEvent) -> anyhow::Result<()>;
}

/// Publisher that drops every event.
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _: &AssessmentEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
