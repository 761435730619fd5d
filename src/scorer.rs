// ⚖️ Risk Scorer - the rule engine
// Accumulates findings for ONE entity, then derives three tiers and their reasons
//
// Red quality (any of):
//   ambiguous relationship | multiple values of an exclusive type
//   | exclusive value shared with another entity | more than one DOB
// Green quality (all of):
//   record from a trusted source | exactly one DOB | at most one SSN | at least one address
// Red collision (any of):
//   red quality | manual override Red
// Green collision (all of):
//   green quality | no Red/Yellow override | no shared F1 values | no possible match
// Everything else is Yellow.

use crate::query_risk::QueryRiskHit;
use crate::tier::RiskScore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Upper bound for any single rendered findings dump (keeps REASON insertable).
pub const MAX_DUMP_LEN: usize = 250;

// Red quality reasons.
const IS_AMBIGUOUS: &str = "Ambiguous relationships";
const MULTIPLE_DOBS: &str = "More than one DOB";
const MULTIPLE_EXCLUSIVES: &str = "More than one F1E or F1ES of the same type";
const SHARED_EXCLUSIVES: &str = "F1E or F1ES shared with other entities";

// Red collision reasons.
const RED_DATA_QUALITY: &str = "Red data quality";
const MANUAL_RED: &str = "Manually flagged red";

// Green quality reasons.
const TRUSTED_SOURCE_EXISTS: &str = "At least 1 trusted source record";
const ONE_DOB: &str = "One and only one DOB";
const ONE_OR_LESS_SSN: &str = "One or less SSN";
const ONE_OR_MORE_ADDRESS: &str = "One or more addresses";

// Green collision reasons.
const GREEN_DATA_QUALITY: &str = "Green data quality";
const NO_POSSIBLE_MATCH: &str = "No possible match";
const NO_SHARED_F1: &str = "No shared F1 types with other entities";

// Yellow quality reasons.
const NO_TRUSTED_SOURCE: &str = "No record from trusted source";
const NOT_ONE_DOB: &str = "Not one and only one DOB";
const MORE_THAN_ONE_SSN: &str = "More than one SSN";
const NO_ADDRESS: &str = "No address";

// Yellow collision reasons.
const MANUAL_YELLOW: &str = "Manually flagged yellow";
const NOT_GREEN_DATA_QUALITY: &str = "Data quality not green";
const POSSIBLE_MATCH: &str = "Possible match exists";
const SHARES_F1: &str = "Shares F1 types with other entities";

// ============================================================================
// FINDING PAYLOADS
// ============================================================================

/// A feature value found on another entity as well
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFeature {
    pub feature_type: String,
    pub description: String,
}

impl SharedFeature {
    pub fn new(feature_type: impl Into<String>, description: impl Into<String>) -> Self {
        SharedFeature {
            feature_type: feature_type.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for SharedFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.feature_type, self.description)
    }
}

// ============================================================================
// BOUNDED DUMP
// ============================================================================

/// Render `open entry, entry, ... close`, appending entries while the result stays
/// within `max_len` bytes and stopping before the first entry that would overflow.
///
/// No truncation marker is added and entries are never cut, so the output is
/// always a well-formed dump of a prefix of `entries`. `max_len` below 2 cannot
/// hold the brackets themselves; the empty dump is returned in that case.
pub fn bounded_dump<I>(open: char, close: char, entries: I, max_len: usize) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut dump = String::new();
    dump.push(open);
    let closing = close.len_utf8();
    let mut first = true;

    for entry in entries {
        let separator = if first { 0 } else { 2 };
        if dump.len() + separator + entry.len() + closing > max_len {
            break;
        }
        if !first {
            dump.push_str(", ");
        }
        dump.push_str(&entry);
        first = false;
    }

    dump.push(close);
    dump
}

fn dump_feature_map(map: &BTreeMap<String, Vec<String>>) -> String {
    let entries = map
        .iter()
        .map(|(feature_type, values)| format!("{}=[{}]", feature_type, values.join(", ")));
    bounded_dump('{', '}', entries, MAX_DUMP_LEN)
}

fn dump_feature_list(features: &[SharedFeature]) -> String {
    bounded_dump('[', ']', features.iter().map(|f| f.to_string()), MAX_DUMP_LEN)
}

// ============================================================================
// REASONS
// ============================================================================

/// Justifications for each tier, one section per tier category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReason {
    #[serde(rename = "Quality")]
    pub quality: Vec<String>,

    #[serde(rename = "Collision")]
    pub collision: Vec<String>,

    #[serde(rename = "QueryRisk")]
    pub query_risk: Vec<String>,
}

impl RiskReason {
    /// Compact JSON document persisted in the REASON column.
    pub fn to_json(&self) -> String {
        // Only string lists; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn contains(&self, reason: &str) -> bool {
        self.quality
            .iter()
            .chain(&self.collision)
            .chain(&self.query_risk)
            .any(|r| r.contains(reason))
    }
}

/// Snapshot of everything the scorer derives for an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub quality: RiskScore,
    pub collision: RiskScore,
    pub query_risk: RiskScore,
    pub reason: RiskReason,
    pub query_reason: String,
}

// ============================================================================
// RISK SCORER
// ============================================================================

/// One instance per entity evaluation; never shared or reused.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    // Red quality.
    ambiguous: bool,
    multiple_dobs: bool,
    multiple_exclusives: BTreeMap<String, Vec<String>>,
    shared_exclusives: Vec<SharedFeature>,

    // Green collision.
    no_possible_match: bool,
    shared_f1s: Vec<SharedFeature>,

    // Green quality.
    one_and_only_one_dob: bool,
    one_or_less_ssn: bool,
    one_or_more_address: bool,
    trusted_sources: BTreeSet<String>,

    // Manual override, only ever moves toward Red.
    score_override: Option<RiskScore>,

    query_risks: Vec<QueryRiskHit>,
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Findings
    // ------------------------------------------------------------------------

    pub fn is_ambiguous(&self) -> bool {
        self.ambiguous
    }

    pub fn set_ambiguous(&mut self, ambiguous: bool) {
        self.ambiguous = ambiguous;
    }

    pub fn has_multiple_dobs(&self) -> bool {
        self.multiple_dobs
    }

    pub fn set_multiple_dobs(&mut self, multiple_dobs: bool) {
        self.multiple_dobs = multiple_dobs;
    }

    pub fn multiple_exclusives(&self) -> &BTreeMap<String, Vec<String>> {
        &self.multiple_exclusives
    }

    /// First finding recorded for a type is kept.
    pub fn add_multiple_exclusives(&mut self, feature_type: impl Into<String>, values: Vec<String>) {
        self.multiple_exclusives
            .entry(feature_type.into())
            .or_insert(values);
    }

    pub fn shared_exclusives(&self) -> &[SharedFeature] {
        &self.shared_exclusives
    }

    pub fn add_shared_exclusives(&mut self, shared: &[SharedFeature]) {
        self.shared_exclusives.extend_from_slice(shared);
    }

    pub fn has_no_possible_match(&self) -> bool {
        self.no_possible_match
    }

    pub fn set_no_possible_match(&mut self, no_possible_match: bool) {
        self.no_possible_match = no_possible_match;
    }

    pub fn shared_f1s(&self) -> &[SharedFeature] {
        &self.shared_f1s
    }

    pub fn add_shared_f1s(&mut self, shared: &[SharedFeature]) {
        self.shared_f1s.extend_from_slice(shared);
    }

    pub fn has_one_and_only_one_dob(&self) -> bool {
        self.one_and_only_one_dob
    }

    pub fn set_one_and_only_one_dob(&mut self, one_dob: bool) {
        self.one_and_only_one_dob = one_dob;
    }

    pub fn has_one_or_less_ssn(&self) -> bool {
        self.one_or_less_ssn
    }

    pub fn set_one_or_less_ssn(&mut self, one_or_less_ssn: bool) {
        self.one_or_less_ssn = one_or_less_ssn;
    }

    pub fn has_one_or_more_address(&self) -> bool {
        self.one_or_more_address
    }

    pub fn set_one_or_more_address(&mut self, one_or_more_address: bool) {
        self.one_or_more_address = one_or_more_address;
    }

    pub fn trusted_sources(&self) -> &BTreeSet<String> {
        &self.trusted_sources
    }

    pub fn add_trusted_source(&mut self, source: impl Into<String>) {
        self.trusted_sources.insert(source.into());
    }

    pub fn has_trusted_source(&self) -> bool {
        !self.trusted_sources.is_empty()
    }

    pub fn score_override(&self) -> Option<RiskScore> {
        self.score_override
    }

    /// Apply a manual override literal ("Red", "Yellow", "Green"; case-insensitive).
    ///
    /// The override only deteriorates: Green can become Yellow or Red, Yellow can
    /// become Red. Unrecognized literals are ignored.
    pub fn set_score_override(&mut self, literal: &str) {
        if let Some(tier) = RiskScore::from_literal(literal) {
            self.score_override = Some(match self.score_override {
                Some(current) => current.max(tier),
                None => tier,
            });
        }
    }

    pub fn query_risks(&self) -> &[QueryRiskHit] {
        &self.query_risks
    }

    pub fn add_query_risk(&mut self, hit: QueryRiskHit) {
        self.query_risks.push(hit);
    }

    // ------------------------------------------------------------------------
    // Tiers
    // ------------------------------------------------------------------------

    pub fn data_quality_score(&self) -> RiskScore {
        let is_red = self.ambiguous
            || !self.multiple_exclusives.is_empty()
            || !self.shared_exclusives.is_empty()
            || self.multiple_dobs;
        let is_green = self.has_trusted_source()
            && self.one_and_only_one_dob
            && self.one_or_less_ssn
            && self.one_or_more_address;

        if is_red {
            RiskScore::Red
        } else if is_green {
            RiskScore::Green
        } else {
            RiskScore::Yellow
        }
    }

    pub fn collision_score(&self) -> RiskScore {
        let quality = self.data_quality_score();
        let override_red = self.score_override == Some(RiskScore::Red);
        let override_yellow = self.score_override == Some(RiskScore::Yellow);

        let is_red = quality == RiskScore::Red || override_red;
        let is_green = quality == RiskScore::Green
            && !override_red
            && !override_yellow
            && self.shared_f1s.is_empty()
            && self.no_possible_match;

        if is_red {
            RiskScore::Red
        } else if is_green {
            RiskScore::Green
        } else {
            RiskScore::Yellow
        }
    }

    pub fn query_risk_score(&self) -> RiskScore {
        RiskScore::most_severe(self.query_risks.iter().map(|hit| hit.tier))
    }

    // ------------------------------------------------------------------------
    // Reasons
    // ------------------------------------------------------------------------

    pub fn reason(&self) -> RiskReason {
        RiskReason {
            quality: self.quality_reasons(),
            collision: self.collision_reasons(),
            query_risk: self.query_risks.iter().map(|hit| hit.pattern.clone()).collect(),
        }
    }

    /// Matched criteria patterns, e.g. `[+NAME+ADDRESS, +NAME+SSN]`.
    pub fn query_risk_reason(&self) -> String {
        let patterns: Vec<&str> = self.query_risks.iter().map(|hit| hit.pattern.as_str()).collect();
        format!("[{}]", patterns.join(", "))
    }

    pub fn assessment(&self) -> RiskAssessment {
        RiskAssessment {
            quality: self.data_quality_score(),
            collision: self.collision_score(),
            query_risk: self.query_risk_score(),
            reason: self.reason(),
            query_reason: self.query_risk_reason(),
        }
    }

    fn quality_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();

        match self.data_quality_score() {
            RiskScore::Red => {
                if self.ambiguous {
                    reasons.push(IS_AMBIGUOUS.to_string());
                }
                if self.multiple_dobs {
                    reasons.push(MULTIPLE_DOBS.to_string());
                }
                if !self.multiple_exclusives.is_empty() {
                    reasons.push(format!(
                        "{} - {}",
                        MULTIPLE_EXCLUSIVES,
                        dump_feature_map(&self.multiple_exclusives)
                    ));
                }
                if !self.shared_exclusives.is_empty() {
                    reasons.push(format!(
                        "{} - {}",
                        SHARED_EXCLUSIVES,
                        dump_feature_list(&self.shared_exclusives)
                    ));
                }
            }
            RiskScore::Green => {
                reasons.push(TRUSTED_SOURCE_EXISTS.to_string());
                reasons.push(ONE_DOB.to_string());
                reasons.push(ONE_OR_LESS_SSN.to_string());
                reasons.push(ONE_OR_MORE_ADDRESS.to_string());
            }
            RiskScore::Yellow => {
                if !self.has_trusted_source() {
                    reasons.push(NO_TRUSTED_SOURCE.to_string());
                }
                if !self.one_and_only_one_dob {
                    reasons.push(NOT_ONE_DOB.to_string());
                }
                if !self.one_or_less_ssn {
                    reasons.push(MORE_THAN_ONE_SSN.to_string());
                }
                if !self.one_or_more_address {
                    reasons.push(NO_ADDRESS.to_string());
                }
            }
        }

        reasons
    }

    fn collision_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        let quality = self.data_quality_score();

        match self.collision_score() {
            RiskScore::Red => {
                if quality == RiskScore::Red {
                    reasons.push(RED_DATA_QUALITY.to_string());
                }
                if self.score_override == Some(RiskScore::Red) {
                    reasons.push(MANUAL_RED.to_string());
                }
            }
            RiskScore::Green => {
                reasons.push(GREEN_DATA_QUALITY.to_string());
                reasons.push(NO_POSSIBLE_MATCH.to_string());
                reasons.push(NO_SHARED_F1.to_string());
            }
            RiskScore::Yellow => {
                if self.score_override == Some(RiskScore::Yellow) {
                    reasons.push(MANUAL_YELLOW.to_string());
                }
                if quality != RiskScore::Green {
                    reasons.push(NOT_GREEN_DATA_QUALITY.to_string());
                }
                if !self.no_possible_match {
                    reasons.push(POSSIBLE_MATCH.to_string());
                }
                if !self.shared_f1s.is_empty() {
                    reasons.push(format!("{} - {}", SHARES_F1, dump_feature_list(&self.shared_f1s)));
                }
            }
        }

        reasons
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn shared_features() -> Vec<SharedFeature> {
        vec![
            SharedFeature::new("CustID", "some data"),
            SharedFeature::new("MemberID", "some other data"),
        ]
    }

    fn green_scorer() -> RiskScorer {
        let mut scorer = RiskScorer::new();
        scorer.set_one_and_only_one_dob(true);
        scorer.set_one_or_less_ssn(true);
        scorer.set_one_or_more_address(true);
        scorer.add_trusted_source("GOODSOURCE");
        scorer.set_no_possible_match(true);
        scorer
    }

    #[test]
    fn test_setters_and_getters() {
        let mut scorer = RiskScorer::new();
        scorer.set_ambiguous(true);
        scorer.set_multiple_dobs(true);
        scorer.set_score_override("Yellow");
        scorer.add_multiple_exclusives(
            "SSN",
            vec!["123-45-6789".to_string(), "987-65-4321".to_string()],
        );
        scorer.add_shared_exclusives(&shared_features());
        scorer.add_shared_f1s(&shared_features());
        scorer.add_query_risk(QueryRiskHit {
            pattern: "+ADDRESS+NAME".to_string(),
            tier: RiskScore::Yellow,
        });

        assert!(scorer.is_ambiguous());
        assert!(scorer.has_multiple_dobs());
        assert!(scorer.trusted_sources().is_empty());
        assert_eq!(scorer.score_override(), Some(RiskScore::Yellow));
        assert_eq!(scorer.multiple_exclusives().len(), 1);
        assert_eq!(scorer.shared_exclusives().len(), 2);
        assert_eq!(scorer.shared_f1s().len(), 2);
        assert_eq!(scorer.query_risk_score(), RiskScore::Yellow);
        assert_eq!(scorer.query_risk_reason(), "[+ADDRESS+NAME]");

        scorer.add_trusted_source("GOODSOURCE");
        scorer.add_query_risk(QueryRiskHit {
            pattern: "+NAME+SSN".to_string(),
            tier: RiskScore::Red,
        });

        assert_eq!(scorer.trusted_sources().len(), 1);
        assert_eq!(scorer.query_risk_score(), RiskScore::Red);
        assert_eq!(scorer.query_risk_reason(), "[+ADDRESS+NAME, +NAME+SSN]");
    }

    #[test]
    fn test_override_only_changes_to_worse_score() {
        let mut scorer = RiskScorer::new();
        assert_eq!(scorer.score_override(), None);

        scorer.set_score_override("Green");
        assert_eq!(scorer.score_override(), Some(RiskScore::Green));

        scorer.set_score_override("Yellow");
        assert_eq!(scorer.score_override(), Some(RiskScore::Yellow));

        scorer.set_score_override("Green");
        assert_eq!(scorer.score_override(), Some(RiskScore::Yellow));

        scorer.set_score_override("red");
        assert_eq!(scorer.score_override(), Some(RiskScore::Red));

        scorer.set_score_override("YELLOW");
        assert_eq!(scorer.score_override(), Some(RiskScore::Red));

        scorer.set_score_override("Green");
        assert_eq!(scorer.score_override(), Some(RiskScore::Red));
    }

    #[test]
    fn test_unrecognized_override_is_ignored() {
        let mut scorer = RiskScorer::new();
        scorer.set_score_override("Amber");
        assert_eq!(scorer.score_override(), None);

        scorer.set_score_override("Yellow");
        scorer.set_score_override("");
        assert_eq!(scorer.score_override(), Some(RiskScore::Yellow));
    }

    #[test]
    fn test_green_data_quality_and_collision() {
        let scorer = green_scorer();

        assert_eq!(scorer.data_quality_score(), RiskScore::Green);
        assert_eq!(scorer.collision_score(), RiskScore::Green);

        let reason = scorer.reason();
        assert_eq!(
            reason.quality,
            vec![
                "At least 1 trusted source record",
                "One and only one DOB",
                "One or less SSN",
                "One or more addresses",
            ]
        );
        assert_eq!(
            reason.collision,
            vec![
                "Green data quality",
                "No possible match",
                "No shared F1 types with other entities",
            ]
        );
        assert!(reason.query_risk.is_empty());
    }

    #[test]
    fn test_red_data_quality_and_collision() {
        let mut scorer = RiskScorer::new();
        scorer.set_ambiguous(true);
        scorer.set_multiple_dobs(true);
        scorer.set_one_or_more_address(true);
        scorer.add_multiple_exclusives(
            "SSN",
            vec!["123-45-6789".to_string(), "987-65-4321".to_string()],
        );
        scorer.add_shared_exclusives(&shared_features());
        scorer.add_shared_f1s(&shared_features());

        assert_eq!(scorer.data_quality_score(), RiskScore::Red);
        assert_eq!(scorer.collision_score(), RiskScore::Red);

        let reason = scorer.reason();
        assert_eq!(
            reason.quality,
            vec![
                "Ambiguous relationships".to_string(),
                "More than one DOB".to_string(),
                "More than one F1E or F1ES of the same type - {SSN=[123-45-6789, 987-65-4321]}"
                    .to_string(),
                "F1E or F1ES shared with other entities - [(CustID:some data), (MemberID:some other data)]"
                    .to_string(),
            ]
        );
        assert_eq!(reason.collision, vec!["Red data quality"]);
    }

    #[test]
    fn test_yellow_data_quality_and_collision() {
        let mut scorer = RiskScorer::new();
        scorer.set_one_or_more_address(true);
        scorer.set_no_possible_match(true);
        scorer.add_shared_f1s(&shared_features());

        assert_eq!(scorer.data_quality_score(), RiskScore::Yellow);
        assert_eq!(scorer.collision_score(), RiskScore::Yellow);

        let reason = scorer.reason();
        assert_eq!(
            reason.quality,
            vec![
                "No record from trusted source",
                "Not one and only one DOB",
                "More than one SSN",
            ]
        );
        assert_eq!(
            reason.collision,
            vec![
                "Data quality not green".to_string(),
                "Shares F1 types with other entities - [(CustID:some data), (MemberID:some other data)]"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_ambiguity_dominates_green_preconditions() {
        let mut scorer = green_scorer();
        scorer.set_ambiguous(true);

        assert_eq!(scorer.data_quality_score(), RiskScore::Red);
        assert_eq!(scorer.collision_score(), RiskScore::Red);

        let reason = scorer.reason();
        assert_eq!(reason.quality, vec!["Ambiguous relationships"]);
        assert!(!reason.contains("One and only one DOB"));
        assert!(!reason.contains("Green data quality"));
    }

    #[test]
    fn test_multiple_dobs_is_red() {
        let mut scorer = green_scorer();
        scorer.set_one_and_only_one_dob(false);
        scorer.set_multiple_dobs(true);

        assert_eq!(scorer.data_quality_score(), RiskScore::Red);
        assert_eq!(scorer.collision_score(), RiskScore::Red);
        assert!(scorer.reason().quality.contains(&"More than one DOB".to_string()));
    }

    #[test]
    fn test_red_override_forces_red_collision() {
        let mut scorer = green_scorer();
        scorer.set_score_override("Red");
        scorer.set_score_override("Yellow");
        scorer.set_score_override("Green");

        assert_eq!(scorer.data_quality_score(), RiskScore::Green);
        assert_eq!(scorer.collision_score(), RiskScore::Red);

        let reason = scorer.reason();
        assert_eq!(reason.collision, vec!["Manually flagged red"]);
        assert_eq!(reason.quality.len(), 4);
    }

    #[test]
    fn test_yellow_override_blocks_green_collision() {
        let mut scorer = green_scorer();
        scorer.set_score_override("Yellow");

        assert_eq!(scorer.collision_score(), RiskScore::Yellow);
        assert_eq!(scorer.reason().collision, vec!["Manually flagged yellow"]);
    }

    #[test]
    fn test_green_override_keeps_green_collision() {
        let mut scorer = green_scorer();
        scorer.set_score_override("Green");
        assert_eq!(scorer.collision_score(), RiskScore::Green);
    }

    #[test]
    fn test_possible_match_blocks_green_collision() {
        let mut scorer = green_scorer();
        scorer.set_no_possible_match(false);

        assert_eq!(scorer.data_quality_score(), RiskScore::Green);
        assert_eq!(scorer.collision_score(), RiskScore::Yellow);
        assert_eq!(scorer.reason().collision, vec!["Possible match exists"]);
    }

    #[test]
    fn test_query_risk_defaults_to_green() {
        let scorer = RiskScorer::new();
        assert_eq!(scorer.query_risk_score(), RiskScore::Green);
        assert_eq!(scorer.query_risk_reason(), "[]");
    }

    #[test]
    fn test_reason_json_document() {
        let mut scorer = green_scorer();
        scorer.add_query_risk(QueryRiskHit {
            pattern: "+NAME+DOB".to_string(),
            tier: RiskScore::Red,
        });

        let json = scorer.reason().to_json();
        let parsed: RiskReason = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, scorer.reason());
        assert!(json.starts_with("{\"Quality\":[\"At least 1 trusted source record\""));
        assert_eq!(parsed.query_risk, vec!["+NAME+DOB"]);
    }

    #[test]
    fn test_shared_dump_is_capped() {
        let mut scorer = RiskScorer::new();
        let many: Vec<SharedFeature> = (0..40)
            .map(|i| SharedFeature::new("PHONE", format!("702-555-{:04}", i)))
            .collect();
        scorer.add_shared_exclusives(&many);

        let reason = scorer.reason();
        let line = &reason.quality[0];
        let dump = line.trim_start_matches("F1E or F1ES shared with other entities - ");

        assert!(dump.len() <= MAX_DUMP_LEN);
        assert!(dump.starts_with("[(PHONE:702-555-0000), (PHONE:702-555-0001)"));
        assert!(dump.ends_with(")]"));
        assert!(!dump.contains("..."));
    }

    #[test]
    fn test_multiple_exclusives_dump_is_capped() {
        let mut scorer = RiskScorer::new();
        for i in 0..30 {
            scorer.add_multiple_exclusives(
                format!("TYPE_{:02}", i),
                vec![format!("111-11-{:04}", i), format!("222-22-{:04}", i)],
            );
        }

        let reason = scorer.reason();
        let line = &reason.quality[0];
        let dump = line.trim_start_matches("More than one F1E or F1ES of the same type - ");

        assert!(dump.len() <= MAX_DUMP_LEN);
        assert!(dump.starts_with("{TYPE_00=[111-11-0000, 222-22-0000], TYPE_01=["));
        assert!(dump.ends_with("]}"));
        assert!(!dump.contains("TYPE_29"));
        assert!(!dump.contains("..."));
    }

    #[test]
    fn test_bounded_dump_stops_before_first_overflow() {
        let entries = vec!["aaaa".to_string(), "bbbb".to_string(), "c".to_string()];

        assert_eq!(bounded_dump('[', ']', entries.clone(), 100), "[aaaa, bbbb, c]");
        assert_eq!(bounded_dump('[', ']', entries.clone(), 12), "[aaaa, bbbb]");
        assert_eq!(bounded_dump('[', ']', entries.clone(), 11), "[aaaa]");
        assert_eq!(bounded_dump('[', ']', entries.clone(), 6), "[aaaa]");
        assert_eq!(bounded_dump('[', ']', entries, 5), "[]");
    }

    #[test]
    fn test_idempotent_scoring() {
        let build = || {
            let mut scorer = RiskScorer::new();
            scorer.add_multiple_exclusives("SSN", vec!["1".to_string(), "2".to_string()]);
            scorer.add_multiple_exclusives("DRLIC", vec!["A".to_string(), "B".to_string()]);
            scorer.add_shared_f1s(&shared_features());
            scorer
        };

        assert_eq!(build().assessment(), build().assessment());
        assert_eq!(build().reason().to_json(), build().reason().to_json());
    }

    fn tier_literal() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("Green"), Just("Yellow"), Just("Red"), Just("red"), Just("GREEN")]
    }

    proptest! {
        #[test]
        fn override_settles_on_most_severe_applied(literals in proptest::collection::vec(tier_literal(), 1..12)) {
            let mut scorer = RiskScorer::new();
            for literal in &literals {
                scorer.set_score_override(literal);
            }

            let expected = literals
                .iter()
                .filter_map(|l| RiskScore::from_literal(l))
                .max();
            prop_assert_eq!(scorer.score_override(), expected);
        }

        #[test]
        fn bounded_dump_is_within_cap_and_a_prefix(
            entries in proptest::collection::vec("[a-zA-Z0-9 ]{0,40}", 0..30),
            max_len in 2usize..300,
        ) {
            let dump = bounded_dump('[', ']', entries.clone(), max_len);
            prop_assert!(dump.len() <= max_len);
            prop_assert!(dump.starts_with('['));
            prop_assert!(dump.ends_with(']'));

            let full = format!("[{}]", entries.join(", "));
            if full.len() <= max_len {
                prop_assert_eq!(dump, full);
            } else {
                let inner = &dump[1..dump.len() - 1];
                prop_assert!(full[1..].starts_with(inner));
            }
        }

        #[test]
        fn query_risk_is_most_severe_hit(red_hits in proptest::collection::vec(any::<bool>(), 0..10)) {
            let mut scorer = RiskScorer::new();
            for (i, red) in red_hits.iter().enumerate() {
                scorer.add_query_risk(QueryRiskHit {
                    pattern: format!("+NAME+F{}", i),
                    tier: if *red { RiskScore::Red } else { RiskScore::Yellow },
                });
            }

            let expected = if red_hits.is_empty() {
                RiskScore::Green
            } else if red_hits.iter().any(|red| *red) {
                RiskScore::Red
            } else {
                RiskScore::Yellow
            };
            prop_assert_eq!(scorer.query_risk_score(), expected);
            prop_assert_eq!(scorer.reason().query_risk.len(), red_hits.len());
        }

        #[test]
        fn tiers_respect_red_precedence(
            ambiguous in any::<bool>(),
            multiple_dobs in any::<bool>(),
            one_dob in any::<bool>(),
            ssn_ok in any::<bool>(),
            address in any::<bool>(),
            trusted in any::<bool>(),
            no_possible_match in any::<bool>(),
        ) {
            let mut scorer = RiskScorer::new();
            scorer.set_ambiguous(ambiguous);
            scorer.set_multiple_dobs(multiple_dobs);
            scorer.set_one_and_only_one_dob(one_dob);
            scorer.set_one_or_less_ssn(ssn_ok);
            scorer.set_one_or_more_address(address);
            scorer.set_no_possible_match(no_possible_match);
            if trusted {
                scorer.add_trusted_source("TRUSTED");
            }

            let quality = scorer.data_quality_score();
            let collision = scorer.collision_score();

            prop_assert_eq!(quality == RiskScore::Red, ambiguous || multiple_dobs);
            prop_assert!(collision >= quality);
            if quality == RiskScore::Red {
                prop_assert_eq!(collision, RiskScore::Red);
            }
        }
    }
}
