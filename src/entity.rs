// 🧬 Resolved Entity - the document exported by the resolution engine
//
// {
//   "RESOLVED_ENTITY": {
//     "ENTITY_ID": 5,
//     "FEATURES": { "SSN": [ { "FEAT_DESC": ..., "LIB_FEAT_ID": 70, "UTYPE_CODE": ..., "FEAT_DESC_VALUES": [...] } ] },
//     "RECORDS": [ { "DATA_SOURCE": "IMDM", ... } ]
//   },
//   "RELATED_ENTITIES": [ { "ENTITY_ID": 2001, "IS_AMBIGUOUS": 0, "MATCH_LEVEL_CODE": "POSSIBLY_SAME", "MATCH_KEY": "+NAME+ADDRESS" } ]
// }

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const CAP_REACHED: &str = "Y";

// ============================================================================
// ENTITY DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    #[serde(rename = "RESOLVED_ENTITY", default)]
    pub resolved_entity: ResolvedEntity,

    #[serde(rename = "RELATED_ENTITIES", default)]
    pub related_entities: Vec<RelatedEntity>,
}

impl EntityDocument {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn entity_id(&self) -> i64 {
        self.resolved_entity.entity_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    #[serde(rename = "ENTITY_ID", default)]
    pub entity_id: i64,

    /// Feature type -> values (e.g. "DOB" -> two dates)
    #[serde(rename = "FEATURES", default)]
    pub features: BTreeMap<String, Vec<FeatureValue>>,

    #[serde(rename = "RECORDS", default)]
    pub records: Vec<EntityRecord>,
}

impl ResolvedEntity {
    /// Values of one feature type, empty if the entity has none.
    pub fn feature_values(&self, feature_type: &str) -> &[FeatureValue] {
        self.features
            .get(feature_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn feature_count(&self, feature_type: &str) -> usize {
        self.feature_values(feature_type).len()
    }
}

// ============================================================================
// FEATURES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    #[serde(rename = "FEAT_DESC", default)]
    pub description: String,

    /// Engine-assigned id, unique within the resolution index
    #[serde(rename = "LIB_FEAT_ID", default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<i64>,

    #[serde(rename = "UTYPE_CODE", default, skip_serializing_if = "Option::is_none")]
    pub usage_type: Option<String>,

    #[serde(rename = "FEAT_DESC_VALUES", default, skip_serializing_if = "Vec::is_empty")]
    pub descriptors: Vec<FeatureDescriptor>,
}

impl FeatureValue {
    /// A value is generic when candidate generation or scoring was capped for
    /// any of its descriptors: it is too common to discriminate.
    pub fn is_generic(&self) -> bool {
        self.descriptors.iter().any(FeatureDescriptor::is_capped)
    }

    pub fn has_usage_type(&self, usage_type: &str) -> bool {
        self.usage_type.as_deref() == Some(usage_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    #[serde(rename = "FEAT_DESC", default)]
    pub description: String,

    #[serde(rename = "CANDIDATE_CAP_REACHED", default)]
    pub candidate_cap_reached: String,

    #[serde(rename = "SCORING_CAP_REACHED", default)]
    pub scoring_cap_reached: String,
}

impl FeatureDescriptor {
    pub fn is_capped(&self) -> bool {
        self.candidate_cap_reached == CAP_REACHED || self.scoring_cap_reached == CAP_REACHED
    }
}

// ============================================================================
// RECORDS + RELATIONSHIPS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "DATA_SOURCE", default)]
    pub data_source: String,

    #[serde(rename = "RECORD_ID", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl EntityRecord {
    /// Data source tag as compared against the trusted-source list.
    pub fn normalized_source(&self) -> String {
        self.data_source.trim().to_uppercase()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    #[serde(rename = "ENTITY_ID", default)]
    pub entity_id: i64,

    #[serde(rename = "IS_AMBIGUOUS", default)]
    pub is_ambiguous: i64,

    #[serde(rename = "MATCH_LEVEL_CODE", default, skip_serializing_if = "Option::is_none")]
    pub match_level_code: Option<String>,

    #[serde(rename = "MATCH_KEY", default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
}

impl RelatedEntity {
    pub fn ambiguous(&self) -> bool {
        self.is_ambiguous > 0
    }
}

// ============================================================================
// AFFECTED ENTITIES MESSAGE
// ============================================================================

/// Notification from the engine listing entities whose resolution changed:
/// `{"DATA_SOURCE":"TEST","RECORD_ID":"RECORD3","AFFECTED_ENTITIES":[{"ENTITY_ID":1,"LENS_CODE":"DEFAULT"}]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectedEntitiesMessage {
    #[serde(rename = "DATA_SOURCE", default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,

    #[serde(rename = "RECORD_ID", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(rename = "AFFECTED_ENTITIES", default)]
    pub affected_entities: Vec<AffectedEntity>,
}

impl AffectedEntitiesMessage {
    pub fn entity_ids(&self) -> Vec<i64> {
        self.affected_entities.iter().map(|e| e.entity_id).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffectedEntity {
    #[serde(rename = "ENTITY_ID")]
    pub entity_id: i64,

    #[serde(rename = "LENS_CODE", default, skip_serializing_if = "Option::is_none")]
    pub lens_code: Option<String>,
}

// ============================================================================
// TESTS
// ============================================================================
