// 🗂️ Feature Type Classifier
// One pass over the engine's exported configuration, computed once at startup
//
// G2_CONFIG.CFG_FTYPE  -> feature types with frequency (FTYPE_FREQ) and exclusivity (FTYPE_EXCL)
// G2_CONFIG.CFG_FBOVR  -> per-usage-type overrides of the same tags

use crate::error::{Result, RiskError};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const EXCLUSIVE_YES: &str = "YES";

// ============================================================================
// FREQUENCY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureFrequency {
    /// One value per subject, used as a general collision detector
    F1,

    /// F1 exclusive
    F1E,

    /// F1 exclusive, stable
    F1ES,

    /// Anything else (FF, FM, FVM, NAME, ...)
    Other(String),
}

impl FeatureFrequency {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_uppercase().as_str() {
            "F1" => FeatureFrequency::F1,
            "F1E" => FeatureFrequency::F1E,
            "F1ES" => FeatureFrequency::F1ES,
            other => FeatureFrequency::Other(other.to_string()),
        }
    }

    /// F1, F1E and F1ES may carry exclusivity.
    pub fn is_f1_family(&self) -> bool {
        !matches!(self, FeatureFrequency::Other(_))
    }
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Exclusive type whose values only count when they carry a given usage type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageTypeOverride {
    pub feature_type: String,
    pub usage_type: String,
}

/// Immutable after construction; safe to share across worker threads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTypeClassification {
    /// F1-family types flagged exclusive
    pub exclusive_types: Vec<String>,

    /// Exclusive only for values with a specific usage type
    pub usage_type_overrides: Vec<UsageTypeOverride>,

    /// Ordinary high-selectivity (F1, non-exclusive) types
    pub f1_types: Vec<String>,
}

impl FeatureTypeClassification {
    /// Read and classify an exported engine configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RiskError::config(format!(
                "Failed to read engine configuration {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfigDocument = serde_json::from_str(json)
            .map_err(|e| RiskError::config(format!("Failed to parse engine configuration: {}", e)))?;
        Ok(classify(&config.g2_config))
    }

    pub fn is_exclusive(&self, feature_type: &str) -> bool {
        self.exclusive_types.iter().any(|t| t == feature_type)
    }

    pub fn is_f1(&self, feature_type: &str) -> bool {
        self.f1_types.iter().any(|t| t == feature_type)
    }
}

/// Pure classification of the engine's feature-type tables.
pub fn classify(config: &EngineConfig) -> FeatureTypeClassification {
    let mut classification = FeatureTypeClassification::default();

    for ftype in &config.feature_types {
        let frequency = FeatureFrequency::parse(&ftype.frequency);
        if ftype.is_exclusive() && frequency.is_f1_family() {
            classification.exclusive_types.push(ftype.code.clone());
        } else if frequency == FeatureFrequency::F1 {
            classification.f1_types.push(ftype.code.clone());
        }
    }

    for ovr in &config.feature_overrides {
        let frequency = FeatureFrequency::parse(&ovr.frequency);
        if !(ovr.is_exclusive() && frequency.is_f1_family()) {
            continue;
        }
        if let Some(usage_type) = &ovr.usage_type {
            classification.usage_type_overrides.push(UsageTypeOverride {
                feature_type: ovr.code.clone(),
                usage_type: usage_type.clone(),
            });
        }
    }

    classification
}

// ============================================================================
// ENGINE CONFIGURATION DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfigDocument {
    #[serde(rename = "G2_CONFIG")]
    pub g2_config: EngineConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(rename = "CFG_FTYPE")]
    pub feature_types: Vec<FeatureTypeEntry>,

    #[serde(rename = "CFG_FBOVR", default)]
    pub feature_overrides: Vec<FeatureTypeEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureTypeEntry {
    #[serde(rename = "FTYPE_CODE")]
    pub code: String,

    #[serde(rename = "FTYPE_FREQ", default)]
    pub frequency: String,

    #[serde(rename = "FTYPE_EXCL", default)]
    pub exclusive: String,

    #[serde(rename = "UTYPE_CODE", default)]
    pub usage_type: Option<String>,
}

impl FeatureTypeEntry {
    fn is_exclusive(&self) -> bool {
        self.exclusive.trim().eq_ignore_ascii_case(EXCLUSIVE_YES)
    }
}
