// 🔑 Match Key Parser
// Splits a relationship match key (e.g. "+NAME+ADDRESS-DOB") into feature-type tokens

use crate::error::{Result, RiskError};

const TOKEN_DELIMITERS: [char; 3] = ['+', '-', '('];

/// Tokenize a match key, scanning from its end toward its start.
///
/// Each token starts at the nearest preceding `+`, `-` or `(` and keeps that
/// delimiter; tokens are trimmed of surrounding whitespace. The `(` case covers
/// keys such as `+NAME+ADDRESS (Ambiguous)`.
///
/// Tokens come back in right-to-left discovery order. Callers only test set
/// membership, so the order carries no meaning.
pub fn parse_match_key(match_key: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut token_end = match_key.len();

    while token_end > 0 {
        let token_begin = match_key[..token_end]
            .rfind(&TOKEN_DELIMITERS[..])
            .ok_or_else(|| RiskError::MalformedMatchKey(match_key.to_string()))?;

        tokens.push(match_key[token_begin..token_end].trim().to_string());
        token_end = token_begin;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plus_tokens() {
        let tokens = parse_match_key("+NAME+PHONE_NUMBER+ADDRESS").unwrap();
        assert_eq!(tokens, vec!["+ADDRESS", "+PHONE_NUMBER", "+NAME"]);
    }

    #[test]
    fn test_minus_token_keeps_delimiter() {
        let tokens = parse_match_key("+NAME+ADDRESS-DOB").unwrap();
        assert_eq!(tokens, vec!["-DOB", "+ADDRESS", "+NAME"]);
    }

    #[test]
    fn test_parenthesized_suffix_is_trimmed() {
        let tokens = parse_match_key("+NAME+ADDRESS (Ambiguous)").unwrap();
        assert_eq!(tokens, vec!["(Ambiguous)", "+ADDRESS", "+NAME"]);
    }

    #[test]
    fn test_empty_key_has_no_tokens() {
        assert!(parse_match_key("").unwrap().is_empty());
    }

    #[test]
    fn test_leading_text_without_delimiter_fails() {
        let err = parse_match_key("NAME+DOB").unwrap_err();
        assert!(matches!(err, RiskError::MalformedMatchKey(ref key) if key == "NAME+DOB"));
    }

    #[test]
    fn test_key_without_any_delimiter_fails() {
        assert!(parse_match_key("NAME").is_err());
    }
}
