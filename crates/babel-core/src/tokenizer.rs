use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

// Universal name tokenizer. Naming conventions are formatting, not
// content: getUserProfile, user_profile, UserProfile, user-profile and
// USER_PROFILE all carry the same two tokens. This single normalization
// boundary serves code symbols, free-text queries and topic refs.

static CSS_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[#.]+").unwrap());
static METHOD_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(get_|set_|is_|has_|on_)").unwrap());
static ACRONYM_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").unwrap());
static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"([a-z])([A-Z])").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());

/// Tokenize a single identifier into lowercase semantic tokens.
///
/// Steps: strip semantic-free prefixes (`#`, `.`, `get_`, `set_`,
/// `is_`, `has_`, `on_`, leading/trailing `_`), insert boundaries at
/// acronym ends and lower-to-upper transitions, split on any
/// non-alphanumeric run, lowercase, drop tokens shorter than 2 chars.
///
/// Consecutive acronyms like `XMLHTTPRequest` yield `[xmlhttp, request]`;
/// splitting them further would need dictionary knowledge, which
/// substring scoring compensates for.
pub fn tokenize_name(name: &str) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }

    let cleaned = CSS_PREFIX.replace(name, "");
    let cleaned = METHOD_PREFIX.replace(&cleaned, "");
    let cleaned = cleaned.trim_matches('_');

    let cleaned = ACRONYM_BOUNDARY.replace_all(cleaned, "${1}_${2}");
    let cleaned = CAMEL_BOUNDARY.replace_all(&cleaned, "${1}_${2}");

    SEPARATORS
        .split(&cleaned)
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Tokenize free-form text (queries, descriptions) into a token set.
pub fn tokenize_text(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .flat_map(tokenize_name)
        .collect()
}

/// Count overlapping tokens between two sets.
pub fn tokens_overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// Score a name against query tokens: exact token hit 1.0, substring
/// hit (either direction) 0.5.
pub fn token_match_score(query_tokens: &HashSet<String>, name: &str) -> f64 {
    let name_tokens: HashSet<String> = tokenize_name(name).into_iter().collect();

    let mut score = 0.0;
    for qt in query_tokens {
        if name_tokens.contains(qt) {
            score += 1.0;
        } else if name_tokens
            .iter()
            .any(|nt| nt.contains(qt.as_str()) || qt.contains(nt.as_str()))
        {
            score += 0.5;
        }
    }
    score
}
