// 🔍 Feature Extractor
// Turns one resolved-entity document into the findings a RiskScorer consumes
//
// Pipeline per entity:
// 1. Quality counts        (SSN, DOB, ADDRESS)
// 2. Exclusive types       (multiple values -> Red, ids kept for sharing check)
// 3. Usage-type overrides  (same, counting only values with the override usage type)
// 4. Ordinary F1 types     (non-generic ids kept for sharing check)
// 5. Manual override       (RISK_SCORE_OVERRIDE values)
// 6. Shared-feature lookup (batched, excluding the entity itself)
// 7. Relationships         (ambiguity, possible matches)
// 8. Trusted sources
// 9. Query risk            (match keys against criteria)

use crate::collaborators::SharedFeatureLookup;
use crate::config::AppConfig;
use crate::entity::{EntityDocument, FeatureValue};
use crate::error::Result;
use crate::feature_types::FeatureTypeClassification;
use crate::query_risk::QueryRiskCriteria;
use crate::scorer::{RiskScorer, SharedFeature};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const SSN: &str = "SSN";
pub const DOB: &str = "DOB";
pub const ADDRESS: &str = "ADDRESS";
pub const RISK_SCORE_OVERRIDE: &str = "RISK_SCORE_OVERRIDE";

/// Match level code of a relationship the engine considers a possible match
pub const POSSIBLY_SAME: &str = "POSSIBLY_SAME";

/// Feature ids per shared-feature lookup call
pub const LOOKUP_BATCH_SIZE: usize = 10;

// ============================================================================
// SCORING RULES
// ============================================================================

/// Everything an evaluation reads but never changes. Built once, shared by all workers.
#[derive(Debug, Clone, Default)]
pub struct ScoringRules {
    classification: FeatureTypeClassification,
    trusted_sources: BTreeSet<String>,
    query_risk: QueryRiskCriteria,
}

impl ScoringRules {
    /// Build from a classification, a comma-separated trusted-source list and a
    /// criteria string. Malformed criteria are fatal.
    pub fn new(
        classification: FeatureTypeClassification,
        trusted_sources: &str,
        query_risk_criteria: &str,
    ) -> Result<Self> {
        let trusted_sources = parse_trusted_sources(trusted_sources);
        let query_risk = QueryRiskCriteria::parse(query_risk_criteria)?;

        if trusted_sources.is_empty() {
            warn!("No trusted sources configured: data quality can never be Green");
        }
        if query_risk.is_empty() {
            warn!("No query risk criteria configured: query risk is always Green");
        }

        Ok(ScoringRules {
            classification,
            trusted_sources,
            query_risk,
        })
    }

    /// Load the engine configuration file named by `config` and build the rules.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let classification = FeatureTypeClassification::from_file(&config.engine_config)?;

        info!(
            exclusive = classification.exclusive_types.len(),
            overrides = classification.usage_type_overrides.len(),
            f1 = classification.f1_types.len(),
            "Classified engine feature types"
        );

        Self::new(
            classification,
            &config.trusted_sources,
            &config.query_risk_criteria,
        )
    }

    pub fn classification(&self) -> &FeatureTypeClassification {
        &self.classification
    }

    pub fn trusted_sources(&self) -> &BTreeSet<String> {
        &self.trusted_sources
    }

    pub fn is_trusted(&self, source: &str) -> bool {
        self.trusted_sources.contains(source)
    }

    pub fn query_risk(&self) -> &QueryRiskCriteria {
        &self.query_risk
    }
}

/// "imdm, Watchlist ,," -> {"IMDM", "WATCHLIST"}
pub fn parse_trusted_sources(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|source| source.trim().to_uppercase())
        .filter(|source| !source.is_empty())
        .collect()
}

// ============================================================================
// FEATURE EXTRACTOR
// ============================================================================

pub struct FeatureExtractor<'a, L: SharedFeatureLookup + ?Sized> {
    rules: &'a ScoringRules,
    lookup: &'a L,
    lens_id: i64,
}

impl<'a, L: SharedFeatureLookup + ?Sized> FeatureExtractor<'a, L> {
    pub fn new(rules: &'a ScoringRules, lookup: &'a L, lens_id: i64) -> Self {
        FeatureExtractor {
            rules,
            lookup,
            lens_id,
        }
    }

    /// Record every finding for `doc` into `scorer`, treating the document's own id as self.
    pub fn extract(&self, doc: &EntityDocument, scorer: &mut RiskScorer) -> Result<()> {
        self.extract_for(doc.entity_id(), doc, scorer)
    }

    /// Record every finding for `doc`, scored as `entity_id`.
    ///
    /// Features held by `entity_id` never count as shared, whatever id the snapshot carries.
    pub fn extract_for(
        &self,
        entity_id: i64,
        doc: &EntityDocument,
        scorer: &mut RiskScorer,
    ) -> Result<()> {
        let entity = &doc.resolved_entity;

        // Data quality counts.
        scorer.set_one_or_less_ssn(entity.feature_count(SSN) <= 1);
        let dob_count = entity.feature_count(DOB);
        scorer.set_one_and_only_one_dob(dob_count == 1);
        scorer.set_multiple_dobs(dob_count > 1);
        scorer.set_one_or_more_address(entity.feature_count(ADDRESS) > 0);

        // Exclusive feature types.
        let mut exclusive_feats = BTreeMap::new();
        for feature_type in &self.rules.classification.exclusive_types {
            let values = entity.feature_values(feature_type);
            if values.len() > 1 {
                scorer.add_multiple_exclusives(feature_type.clone(), descriptions(values));
            }
            collect_features(feature_type, values, &mut exclusive_feats, true);
        }

        for ovr in &self.rules.classification.usage_type_overrides {
            let matching: Vec<FeatureValue> = entity
                .feature_values(&ovr.feature_type)
                .iter()
                .filter(|value| value.has_usage_type(&ovr.usage_type))
                .cloned()
                .collect();
            if matching.len() > 1 {
                scorer.add_multiple_exclusives(ovr.feature_type.clone(), descriptions(&matching));
            }
            collect_features(&ovr.feature_type, &matching, &mut exclusive_feats, true);
        }

        // Ordinary F1 types, generic values excluded.
        let mut f1_feats = BTreeMap::new();
        for feature_type in &self.rules.classification.f1_types {
            collect_features(
                feature_type,
                entity.feature_values(feature_type),
                &mut f1_feats,
                false,
            );
        }

        for value in entity.feature_values(RISK_SCORE_OVERRIDE) {
            scorer.set_score_override(&value.description);
        }

        // Shared features.
        let shared_exclusives = self.shared_features(&exclusive_feats, entity_id)?;
        if !shared_exclusives.is_empty() {
            scorer.add_shared_exclusives(&shared_exclusives);
            scorer.add_shared_f1s(&shared_exclusives);
        }
        let shared_f1s = self.shared_features(&f1_feats, entity_id)?;
        if !shared_f1s.is_empty() {
            scorer.add_shared_f1s(&shared_f1s);
        }

        // Relationships.
        let mut no_possible_match = true;
        for related in &doc.related_entities {
            if related.ambiguous() {
                scorer.set_ambiguous(true);
            }
            if related.match_level_code.as_deref() == Some(POSSIBLY_SAME) {
                no_possible_match = false;
            }
        }
        scorer.set_no_possible_match(no_possible_match);

        // Trusted sources.
        for record in &entity.records {
            let source = record.normalized_source();
            if self.rules.is_trusted(&source) {
                scorer.add_trusted_source(source);
            }
        }

        // Query risk.
        let match_keys = doc
            .related_entities
            .iter()
            .map(|related| related.match_key.as_deref().unwrap_or(""));
        for hit in self.rules.query_risk.evaluate(match_keys)? {
            scorer.add_query_risk(hit);
        }

        debug!(
            entity_id,
            shared_exclusives = shared_exclusives.len(),
            shared_f1s = scorer.shared_f1s().len(),
            query_risks = scorer.query_risks().len(),
            "Extracted findings"
        );

        Ok(())
    }

    /// Features from `features` held by some other entity, one entry per feature id.
    fn shared_features(
        &self,
        features: &BTreeMap<i64, SharedFeature>,
        entity_id: i64,
    ) -> Result<Vec<SharedFeature>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = features.keys().copied().collect();
        let mut shared_ids = BTreeSet::new();

        for batch in ids.chunks(LOOKUP_BATCH_SIZE) {
            let rows = self.lookup.find_sharers(batch, entity_id, self.lens_id)?;
            shared_ids.extend(
                rows.into_iter()
                    .filter(|row| row.other_entity_id != entity_id)
                    .map(|row| row.feature_id),
            );
        }

        Ok(shared_ids
            .iter()
            .filter_map(|id| features.get(id).cloned())
            .collect())
    }
}

fn descriptions(values: &[FeatureValue]) -> Vec<String> {
    values.iter().map(|value| value.description.clone()).collect()
}

fn collect_features(
    feature_type: &str,
    values: &[FeatureValue],
    into: &mut BTreeMap<i64, SharedFeature>,
    include_generic: bool,
) {
    for value in values {
        let Some(feature_id) = value.feature_id else {
            continue;
        };
        if include_generic || !value.is_generic() {
            into.insert(
                feature_id,
                SharedFeature::new(feature_type, value.description.clone()),
            );
        }
    }
}

// ============================================================================
// EVALUATE
// ============================================================================

/// Extract then score one entity. No persistence.
pub fn evaluate<L: SharedFeatureLookup + ?Sized>(
    rules: &ScoringRules,
    doc: &EntityDocument,
    lookup: &L,
    lens_id: i64,
) -> Result<RiskScorer> {
    let mut scorer = RiskScorer::new();
    FeatureExtractor::new(rules, lookup, lens_id).extract(doc, &mut scorer)?;
    Ok(scorer)
}

/// Like [`evaluate`], for a document fetched as `entity_id`.
pub fn evaluate_entity<L: SharedFeatureLookup + ?Sized>(
    rules: &ScoringRules,
    entity_id: i64,
    doc: &EntityDocument,
    lookup: &L,
    lens_id: i64,
) -> Result<RiskScorer> {
    let mut scorer = RiskScorer::new();
    FeatureExtractor::new(rules, lookup, lens_id).extract_for(entity_id, doc, &mut scorer)?;
    Ok(scorer)
}

// ============================================================================
// TESTS
// ============================================================================
