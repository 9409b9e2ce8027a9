use crate::codec::IdCodec;
use crate::tokenizer::{token_match_score, tokenize_text};

/// Outcome status of a reference resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Resolved,
    Ambiguous,
    None,
}

/// Result of resolving a user-supplied reference.
#[derive(Debug, Clone)]
pub struct ResolveResult {
    pub status: ResolveStatus,
    /// Matching ids, best first. Exactly one when `Resolved`.
    pub matches: Vec<String>,
}

impl ResolveResult {
    fn none() -> Self {
        Self {
            status: ResolveStatus::None,
            matches: Vec::new(),
        }
    }

    fn resolved(id: String) -> Self {
        Self {
            status: ResolveStatus::Resolved,
            matches: vec![id],
        }
    }

    fn ambiguous(matches: Vec<String>) -> Self {
        Self {
            status: ResolveStatus::Ambiguous,
            matches,
        }
    }
}

/// Resolves user references to node ids.
///
/// Resolution order: exact id, AA-BB short code, token-scored fuzzy
/// match against summaries. Ambiguity is reported, never guessed away.
#[derive(Debug, Default)]
pub struct IdResolver {
    codec: IdCodec,
}

impl IdResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `reference` against known `(id, summary)` candidates.
    pub fn resolve(&self, reference: &str, candidates: &[(String, String)]) -> ResolveResult {
        if reference.is_empty() || candidates.is_empty() {
            return ResolveResult::none();
        }

        // 1. Exact id
        if candidates.iter().any(|(id, _)| id == reference) {
            return ResolveResult::resolved(reference.to_string());
        }

        // 2. Short code
        if self.codec.is_short_code(reference) {
            let ids: Vec<String> = candidates.iter().map(|(id, _)| id.clone()).collect();
            let decoded = self.codec.decode(reference, &ids);
            if decoded != reference && !self.codec.is_short_code(&decoded) {
                return ResolveResult::resolved(decoded);
            }
            // A well-formed code that matches nothing resolves to nothing;
            // falling through to fuzzy would misread the code as words.
            return ResolveResult::none();
        }

        // 3. Fuzzy match on summaries
        let query_tokens = tokenize_text(reference);
        if query_tokens.is_empty() {
            return ResolveResult::none();
        }

        let mut scored: Vec<(String, f64)> = candidates
            .iter()
            .map(|(id, summary)| (id.clone(), token_match_score(&query_tokens, summary)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        if scored.is_empty() {
            return ResolveResult::none();
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let best = scored[0].1;
        let mut top: Vec<String> = scored
            .iter()
            .take_while(|(_, score)| (*score - best).abs() < f64::EPSILON)
            .map(|(id, _)| id.clone())
            .collect();

        if top.len() == 1 {
            ResolveResult::resolved(top.remove(0))
        } else {
            ResolveResult::ambiguous(top)
        }
    }
}
