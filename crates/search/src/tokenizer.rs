//! Code-aware tokenizer
//!
//! Splits text into identifier tokens and decomposes identifiers into their
//! subtokens, keeping the whole identifier alongside its parts so both
//! `calculateDistance` and `distance` match a document containing
//! `calculateDistance`:
//!
//! - camelCase: `calculateDistance` -> {calculatedistance, calculate, distance}
//! - snake_case: `process_analytics_data` -> {process_analytics_data, process, analytics, data}
//!
//! All tokens are lowercased. Subtokens shorter than 2 characters are
//! dropped; the full identifier is always kept.

use std::collections::HashSet;

/// Tokenize text into searchable terms, identifiers plus subtokens
///
/// # Example
///
/// ```
/// use agrama_search::tokenizer::tokenize;
///
/// let tokens = tokenize("fn calculateDistance(p, q)");
/// assert!(tokens.contains(&"calculatedistance".to_string()));
/// assert!(tokens.contains(&"calculate".to_string()));
/// assert!(tokens.contains(&"distance".to_string()));
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for identifier in text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
    {
        let whole = identifier.to_lowercase();
        let parts = split_identifier(identifier);
        // Keep the identifier itself when it decomposes or is long enough
        // to be a useful term on its own.
        if whole.len() >= 2 {
            tokens.push(whole.clone());
        }
        for part in parts {
            if part.len() >= 2 && part != whole {
                tokens.push(part);
            }
        }
    }
    tokens
}

/// Tokenize and deduplicate, preserving first-seen order (query processing)
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Decompose one identifier into lowercased subtokens
///
/// Boundaries are underscores, digit runs, and lower-to-upper transitions.
/// Acronym runs stay together until a case transition: `HTTPServer` splits
/// into `http` and `server`.
fn split_identifier(identifier: &str) -> Vec<String> {
    let chars: Vec<char> = identifier.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;

    for i in 0..=chars.len() {
        let boundary = if i == chars.len() {
            true
        } else if chars[i] == '_' {
            true
        } else if i > 0 {
            let prev = chars[i - 1];
            let cur = chars[i];
            // lower|digit -> Upper, or acronym-end: "PSer" in HTTPServer
            (prev.is_lowercase() || prev.is_numeric()) && cur.is_uppercase()
                || (prev.is_uppercase()
                    && cur.is_uppercase()
                    && chars.get(i + 1).is_some_and(|n| n.is_lowercase()))
        } else {
            false
        };

        if boundary {
            if start < i {
                parts.push(chars[start..i].iter().collect::<String>().to_lowercase());
            }
            start = if i < chars.len() && chars[i] == '_' {
                i + 1
            } else {
                i
            };
        }
    }
    parts
}
