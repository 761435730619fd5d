// 🔌 Collaborators - the three blocking boundaries of an evaluation
// entity fetch -> shared-feature lookup -> score persistence
//
// Plus the progress observer that replaces process-wide counters.

use crate::entity::EntityDocument;
use crate::error::Result;
use crate::scorer::RiskAssessment;
use crate::tier::RiskScore;
use serde::{Deserialize, Serialize};

// ============================================================================
// ENTITY FETCH
// ============================================================================

pub trait EntitySource {
    /// `Ok(None)` means the engine no longer resolves this id; its score is deleted.
    fn get_entity(&self, entity_id: i64) -> Result<Option<EntityDocument>>;
}

// ============================================================================
// SHARED-FEATURE LOOKUP
// ============================================================================

/// Another entity holding one of the submitted feature ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFeatureRow {
    pub feature_id: i64,
    pub usage_type: Option<String>,
    pub other_entity_id: i64,
}

pub trait SharedFeatureLookup {
    /// Rows for `feature_ids` held by entities other than `exclude_entity_id`.
    /// Callers submit at most [`crate::extraction::LOOKUP_BATCH_SIZE`] ids per call.
    fn find_sharers(
        &self,
        feature_ids: &[i64],
        exclude_entity_id: i64,
        lens_id: i64,
    ) -> Result<Vec<SharedFeatureRow>>;
}

// ============================================================================
// PERSISTENCE
// ============================================================================

/// One row of RES_RISK_SCORE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub entity_id: i64,
    pub lens_id: i64,
    pub quality: RiskScore,
    pub collision: RiskScore,
    pub query_risk: RiskScore,

    /// Reason document as JSON text
    pub reason: String,
    pub query_reason: String,

    /// Set by the store when reading back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scored_at: Option<String>,
}

impl ScoreRecord {
    pub fn from_assessment(entity_id: i64, lens_id: i64, assessment: &RiskAssessment) -> Self {
        ScoreRecord {
            entity_id,
            lens_id,
            quality: assessment.quality,
            collision: assessment.collision,
            query_risk: assessment.query_risk,
            reason: assessment.reason.to_json(),
            query_reason: assessment.query_reason.clone(),
            scored_at: None,
        }
    }
}

pub trait ScoreSink {
    /// Insert or replace the record for (entity_id, lens_id).
    fn upsert_score(&self, record: &ScoreRecord) -> Result<()>;

    /// Remove any prior record for (entity_id, lens_id).
    fn delete_score(&self, entity_id: i64, lens_id: i64) -> Result<()>;
}

// ============================================================================
// PROGRESS
// ============================================================================

pub trait ProgressObserver: Send + Sync {
    /// Called once per entity that reached a terminal state (scored or deleted).
    fn entity_processed(&self);

    /// Called when the engine reported the entity as no longer resolvable.
    fn entity_missing(&self);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn entity_processed(&self) {}

    fn entity_missing(&self) {}
}
