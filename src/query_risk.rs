// 🎯 Query Risk - Criteria as Data
// Flags relationships whose match key contains a configured token combination
//
// Criteria string format: "+NAME+DOB:R;+NAME+ADDRESS:Y;+NAME+PHONE:Y;+NAME+SSN:R"

use crate::error::{Result, RiskError};
use crate::match_key::parse_match_key;
use crate::tier::RiskScore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// CRITERION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRiskCriterion {
    /// Pattern as configured (trimmed), reported back in reasons
    pub pattern: String,

    /// Tokens a match key must contain for this criterion to hit
    pub required_tokens: Vec<String>,

    /// Red or Yellow
    pub tier: RiskScore,
}

impl QueryRiskCriterion {
    /// True if every required token appears among the parsed match-key tokens.
    pub fn matches(&self, tokens: &HashSet<&str>) -> bool {
        self.required_tokens
            .iter()
            .all(|required| tokens.contains(required.as_str()))
    }
}

/// One criterion hit recorded against an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRiskHit {
    pub pattern: String,
    pub tier: RiskScore,
}

// ============================================================================
// CRITERIA SET
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct QueryRiskCriteria {
    criteria: Vec<QueryRiskCriterion>,
}

impl QueryRiskCriteria {
    /// Parse a `<pattern>:<level>;...` string. Any malformed entry fails the whole load.
    ///
    /// Blank segments (such as a trailing `;`) are skipped.
    pub fn parse(criteria: &str) -> Result<Self> {
        let mut parsed = Vec::new();

        for entry in criteria.split(';') {
            if entry.trim().is_empty() {
                continue;
            }

            let segments: Vec<&str> = entry.split(':').collect();
            if segments.len() != 2 {
                return Err(badly_formed(criteria));
            }

            let tier = RiskScore::from_level_code(segments[1]).ok_or_else(|| badly_formed(criteria))?;

            let pattern = segments[0].trim().to_string();
            let required_tokens =
                parse_match_key(&pattern).map_err(|_| badly_formed(criteria))?;
            if required_tokens.is_empty() {
                return Err(badly_formed(criteria));
            }

            parsed.push(QueryRiskCriterion {
                pattern,
                required_tokens,
                tier,
            });
        }

        Ok(QueryRiskCriteria { criteria: parsed })
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn criteria(&self) -> &[QueryRiskCriterion] {
        &self.criteria
    }

    /// Hits for a single match key, in criteria order.
    pub fn hits_for_key(&self, match_key: &str) -> Result<Vec<QueryRiskHit>> {
        let tokens = parse_match_key(match_key)?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let token_set: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        Ok(self
            .criteria
            .iter()
            .filter(|criterion| criterion.matches(&token_set))
            .map(|criterion| QueryRiskHit {
                pattern: criterion.pattern.clone(),
                tier: criterion.tier,
            })
            .collect())
    }

    /// Hits across every relationship match key, duplicates kept in encounter order.
    pub fn evaluate<'a, I>(&self, match_keys: I) -> Result<Vec<QueryRiskHit>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hits = Vec::new();
        for key in match_keys {
            hits.extend(self.hits_for_key(key)?);
        }
        Ok(hits)
    }
}

fn badly_formed(criteria: &str) -> RiskError {
    RiskError::config(format!("Badly formed query risk criteria: {}", criteria))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_criteria() {
        let criteria = QueryRiskCriteria::parse("+NAME+DOB:R;+NAME+ADDRESS:y").unwrap();

        assert_eq!(criteria.len(), 2);
        assert_eq!(criteria.criteria()[0].pattern, "+NAME+DOB");
        assert_eq!(criteria.criteria()[0].tier, RiskScore::Red);
        assert_eq!(criteria.criteria()[1].tier, RiskScore::Yellow);
    }

    #[test]
    fn test_empty_criteria() {
        assert!(QueryRiskCriteria::parse("").unwrap().is_empty());
        assert!(QueryRiskCriteria::parse("  ").unwrap().is_empty());
    }

    #[test]
    fn test_trailing_separator_allowed() {
        let criteria = QueryRiskCriteria::parse("+NAME+SSN:R;").unwrap();
        assert_eq!(criteria.len(), 1);
    }

    #[test]
    fn test_malformed_entries_are_fatal() {
        for bad in [
            "+NAME+DOB",
            "+NAME+DOB:R:Y",
            "+NAME+DOB:G",
            "NAME:R",
            ":R",
            "+NAME+DOB:R;+NAME+SSN",
        ] {
            let err = QueryRiskCriteria::parse(bad).unwrap_err();
            assert!(matches!(err, RiskError::Config(_)), "expected config error for {}", bad);
        }
    }

    #[test]
    fn test_subset_match_with_ambiguous_suffix() {
        let criteria = QueryRiskCriteria::parse("+NAME+ADDRESS:Y").unwrap();
        let hits = criteria.hits_for_key("+NAME+ADDRESS (Ambiguous)").unwrap();

        assert_eq!(
            hits,
            vec![QueryRiskHit {
                pattern: "+NAME+ADDRESS".to_string(),
                tier: RiskScore::Yellow,
            }]
        );
    }

    #[test]
    fn test_token_order_is_irrelevant() {
        let criteria = QueryRiskCriteria::parse("+ADDRESS+NAME:R").unwrap();
        assert_eq!(criteria.hits_for_key("+NAME+PHONE+ADDRESS").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_token_does_not_match() {
        let criteria = QueryRiskCriteria::parse("+NAME+SSN:R").unwrap();
        assert!(criteria.hits_for_key("+NAME+ADDRESS").unwrap().is_empty());
    }

    #[test]
    fn test_negative_token_is_distinct() {
        let criteria = QueryRiskCriteria::parse("+NAME+DOB:R").unwrap();
        assert!(criteria.hits_for_key("+NAME-DOB").unwrap().is_empty());
    }

    #[test]
    fn test_evaluate_keeps_duplicates_in_order() {
        let criteria = QueryRiskCriteria::parse("+NAME+ADDRESS:Y;+NAME:R").unwrap();
        let hits = criteria
            .evaluate(vec!["+NAME+ADDRESS", "+NAME+ADDRESS+DOB"])
            .unwrap();

        let patterns: Vec<&str> = hits.iter().map(|h| h.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["+NAME+ADDRESS", "+NAME", "+NAME+ADDRESS", "+NAME"]);
    }

    #[test]
    fn test_evaluate_propagates_bad_key() {
        let criteria = QueryRiskCriteria::parse("+NAME:R").unwrap();
        let err = criteria.evaluate(vec!["+NAME", "BROKEN"]).unwrap_err();
        assert!(err.is_entity_scoped());
    }

    proptest! {
        #[test]
        fn criterion_hits_whenever_its_tokens_are_present(
            extra in proptest::collection::vec("[A-Z_]{1,8}", 0..4)
        ) {
            let criteria = QueryRiskCriteria::parse("+NAME+DOB:R").unwrap();
            let mut key = String::from("+DOB");
            for feature in &extra {
                key.push('+');
                key.push_str(feature);
            }
            key.push_str("+NAME");

            let hits = criteria.hits_for_key(&key).unwrap();
            prop_assert_eq!(hits.len(), 1);
            prop_assert_eq!(hits[0].tier, RiskScore::Red);
        }
    }
}
