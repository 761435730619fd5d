// Entity Risk Scoring - Core Library
// Classifies resolved entities into data-quality, collision and query-risk tiers
// Exposes all modules for use in the CLI, the HTTP server, and tests

pub mod error;
pub mod tier;
pub mod match_key;      // Match key tokenizer
pub mod query_risk;     // Query risk criteria
pub mod feature_types;  // Engine feature-type classification
pub mod entity;         // Resolved entity document model
pub mod scorer;         // Rule engine: tiers + reasons
pub mod extraction;     // Document -> findings
pub mod collaborators;  // Fetch / lookup / persistence / progress seams
pub mod source;
pub mod db;
pub mod progress;
pub mod service;        // Evaluation orchestrator
pub mod config;

// Re-export commonly used types
pub use error::{Result, RiskError};
pub use tier::RiskScore;
pub use match_key::parse_match_key;
pub use query_risk::{QueryRiskCriteria, QueryRiskCriterion, QueryRiskHit};
pub use feature_types::{
    classify, EngineConfig, FeatureFrequency, FeatureTypeClassification, UsageTypeOverride,
};
pub use entity::{
    AffectedEntitiesMessage, AffectedEntity, EntityDocument, EntityRecord, FeatureDescriptor,
    FeatureValue, RelatedEntity, ResolvedEntity,
};
pub use scorer::{bounded_dump, RiskAssessment, RiskReason, RiskScorer, SharedFeature, MAX_DUMP_LEN};
pub use extraction::{
    evaluate, evaluate_entity, parse_trusted_sources, FeatureExtractor, ScoringRules,
    LOOKUP_BATCH_SIZE,
};
pub use collaborators::{
    EntitySource, NoProgress, ProgressObserver, ScoreRecord, ScoreSink, SharedFeatureLookup,
    SharedFeatureRow,
};
pub use source::{InMemoryEntitySource, JsonDirEntitySource};
pub use db::{setup_database, SqliteStore};
pub use progress::{ProgressReporter, ProgressSnapshot};
pub use service::{
    score_in_parallel, EntityOutcome, FailurePolicy, ProcessSummary, RiskScoringService,
    DEFAULT_LENS_ID,
};
pub use config::{AppConfig, CliOverrides};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
