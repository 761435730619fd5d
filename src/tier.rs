// 🚦 Risk tiers - Green < Yellow < Red
// Every score the system produces is one of these three values

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// RISK SCORE
// ============================================================================

/// Totally ordered by severity: `Green < Yellow < Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskScore {
    /// Evidence is strong and clean
    Green,

    /// Weak or incomplete evidence
    Yellow,

    /// Likely merged incorrectly or built on conflicting evidence
    Red,
}

impl RiskScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskScore::Green => "Green",
            RiskScore::Yellow => "Yellow",
            RiskScore::Red => "Red",
        }
    }

    /// Parse a full tier name, case-insensitive ("red", "YELLOW", "Green").
    pub fn from_literal(literal: &str) -> Option<Self> {
        match literal.trim().to_uppercase().as_str() {
            "RED" => Some(RiskScore::Red),
            "YELLOW" => Some(RiskScore::Yellow),
            "GREEN" => Some(RiskScore::Green),
            _ => None,
        }
    }

    /// Parse the single-letter level used by query-risk criteria (R or Y).
    pub fn from_level_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "R" => Some(RiskScore::Red),
            "Y" => Some(RiskScore::Yellow),
            _ => None,
        }
    }

    /// Most severe of the given tiers, Green when empty.
    pub fn most_severe<I: IntoIterator<Item = RiskScore>>(tiers: I) -> RiskScore {
        tiers.into_iter().max().unwrap_or(RiskScore::Green)
    }
}

impl fmt::Display for RiskScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(RiskScore::Green < RiskScore::Yellow);
        assert!(RiskScore::Yellow < RiskScore::Red);
        assert!(RiskScore::Green < RiskScore::Red);
    }

    #[test]
    fn test_literal_parsing() {
        assert_eq!(RiskScore::from_literal("red"), Some(RiskScore::Red));
        assert_eq!(RiskScore::from_literal(" Yellow "), Some(RiskScore::Yellow));
        assert_eq!(RiskScore::from_literal("GREEN"), Some(RiskScore::Green));
        assert_eq!(RiskScore::from_literal("amber"), None);
        assert_eq!(RiskScore::from_literal("R"), None);
    }

    #[test]
    fn test_level_codes() {
        assert_eq!(RiskScore::from_level_code("r"), Some(RiskScore::Red));
        assert_eq!(RiskScore::from_level_code("Y"), Some(RiskScore::Yellow));
        assert_eq!(RiskScore::from_level_code("G"), None);
    }

    #[test]
    fn test_most_severe() {
        assert_eq!(RiskScore::most_severe(Vec::new()), RiskScore::Green);
        assert_eq!(
            RiskScore::most_severe(vec![RiskScore::Yellow, RiskScore::Red, RiskScore::Yellow]),
            RiskScore::Red
        );
    }

    #[test]
    fn test_display_matches_persisted_form() {
        assert_eq!(RiskScore::Red.to_string(), "Red");
        assert_eq!(RiskScore::Green.to_string(), "Green");
    }
}
