// 🧭 Risk Scoring Service - the evaluation orchestrator
// fetch -> (not found: delete) -> extract -> score -> persist -> progress
//
// Failure handling per entity:
//   MalformedMatchKey        -> entity skipped, run continues
//   CollaboratorUnavailable  -> FailurePolicy (abort the run, or skip the entity)
//   anything else            -> surfaced to the caller

use crate::collaborators::{
    EntitySource, NoProgress, ProgressObserver, ScoreRecord, ScoreSink, SharedFeatureLookup,
};
use crate::entity::{AffectedEntitiesMessage, EntityDocument};
use crate::error::{Result, RiskError};
use crate::extraction::{evaluate, evaluate_entity, ScoringRules};
use crate::scorer::RiskAssessment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

pub const DEFAULT_LENS_ID: i64 = 1;

// ============================================================================
// FAILURE POLICY
// ============================================================================

/// What a collaborator failure (other than "entity not found") does to a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop processing and return the error
    #[default]
    Abort,

    /// Log the error, count the entity as skipped and continue
    Skip,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Abort => "abort",
            FailurePolicy::Skip => "skip",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" => Ok(FailurePolicy::Skip),
            other => Err(RiskError::config(format!(
                "Unknown collaborator failure policy: {} (expected abort or skip)",
                other
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityOutcome {
    Scored(RiskAssessment),

    /// Entity no longer resolvable; any stored score was removed
    Deleted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSummary {
    pub scored: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl ProcessSummary {
    pub fn merge(&mut self, other: ProcessSummary) {
        self.scored += other.scored;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.scored + self.deleted + self.skipped
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct RiskScoringService<S, D>
where
    S: EntitySource,
    D: SharedFeatureLookup + ScoreSink,
{
    rules: Arc<ScoringRules>,
    source: S,
    store: D,
    lens_id: i64,
    policy: FailurePolicy,
    progress: Arc<dyn ProgressObserver>,
}

impl<S, D> RiskScoringService<S, D>
where
    S: EntitySource,
    D: SharedFeatureLookup + ScoreSink,
{
    pub fn new(rules: Arc<ScoringRules>, source: S, store: D) -> Self {
        RiskScoringService {
            rules,
            source,
            store,
            lens_id: DEFAULT_LENS_ID,
            policy: FailurePolicy::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_lens(mut self, lens_id: i64) -> Self {
        self.lens_id = lens_id;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn lens_id(&self) -> i64 {
        self.lens_id
    }

    /// Score a document without persisting anything.
    pub fn assess(&self, doc: &EntityDocument) -> Result<RiskAssessment> {
        let scorer = evaluate(&self.rules, doc, &self.store, self.lens_id)?;
        Ok(scorer.assessment())
    }

    /// Fetch, score and persist one entity.
    pub fn process_entity(&self, entity_id: i64) -> Result<EntityOutcome> {
        let Some(doc) = self.source.get_entity(entity_id)? else {
            self.store.delete_score(entity_id, self.lens_id)?;
            self.progress.entity_missing();
            self.progress.entity_processed();
            debug!(entity_id, "Entity not resolvable, score deleted");
            return Ok(EntityOutcome::Deleted);
        };

        let scorer = evaluate_entity(&self.rules, entity_id, &doc, &self.store, self.lens_id)?;
        let assessment = scorer.assessment();
        let record = ScoreRecord::from_assessment(entity_id, self.lens_id, &assessment);
        self.store.upsert_score(&record)?;
        self.progress.entity_processed();

        debug!(
            entity_id,
            lens_id = self.lens_id,
            quality = %assessment.quality,
            collision = %assessment.collision,
            query_risk = %assessment.query_risk,
            "Scored entity"
        );

        Ok(EntityOutcome::Scored(assessment))
    }

    /// Process entities in order, applying the failure policy to each error.
    pub fn process_ids(&self, entity_ids: &[i64]) -> Result<ProcessSummary> {
        let mut summary = ProcessSummary::default();

        for &entity_id in entity_ids {
            match self.process_entity(entity_id) {
                Ok(EntityOutcome::Scored(_)) => summary.scored += 1,
                Ok(EntityOutcome::Deleted) => summary.deleted += 1,
                Err(e) if e.is_entity_scoped() => {
                    warn!(entity_id, error = %e, "Skipping entity");
                    summary.skipped += 1;
                }
                Err(e) if e.is_collaborator_failure() && self.policy == FailurePolicy::Skip => {
                    warn!(entity_id, error = %e, "Collaborator failed, skipping entity");
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!(entity_id, error = %e, "Entity processing failed");
                    return Err(e);
                }
            }
        }

        Ok(summary)
    }

    pub fn process_message(&self, message: &AffectedEntitiesMessage) -> Result<ProcessSummary> {
        self.process_ids(&message.entity_ids())
    }

    /// Parse and process one affected-entities message.
    pub fn process_message_json(&self, message: &str) -> Result<ProcessSummary> {
        let message: AffectedEntitiesMessage = serde_json::from_str(message)?;
        self.process_message(&message)
    }
}

// ============================================================================
// WORKER FAN-OUT
// ============================================================================

/// Process `entity_ids` over `workers` threads, each with its own service from `factory`.
///
/// Ids are dealt round-robin; per-entity ordering is preserved within a worker.
/// The first worker error is returned after all workers finish.
pub fn score_in_parallel<S, D, F>(
    entity_ids: &[i64],
    workers: usize,
    factory: F,
) -> Result<ProcessSummary>
where
    S: EntitySource,
    D: SharedFeatureLookup + ScoreSink,
    F: Fn() -> Result<RiskScoringService<S, D>> + Sync,
{
    let workers = workers.clamp(1, entity_ids.len().max(1));
    if workers == 1 {
        return factory()?.process_ids(entity_ids);
    }

    let mut partitions: Vec<Vec<i64>> = vec![Vec::new(); workers];
    for (i, id) in entity_ids.iter().enumerate() {
        partitions[i % workers].push(*id);
    }

    info!(entities = entity_ids.len(), workers, "Scoring in parallel");

    let factory = &factory;
    let results: Vec<Result<ProcessSummary>> = thread::scope(|scope| {
        let handles: Vec<_> = partitions
            .iter()
            .map(|ids| scope.spawn(move || factory()?.process_ids(ids)))
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(RiskError::Worker("worker thread panicked".to_string())))
            })
            .collect()
    });

    let mut summary = ProcessSummary::default();
    for result in results {
        summary.merge(result?);
    }
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
