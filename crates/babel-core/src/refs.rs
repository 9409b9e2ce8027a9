use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::tokenizer::{tokenize_name, tokenize_text};
use babel_types::{Event, EventPayload};

/// One entry in the reverse topic index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ref {
    pub topic: String,
    pub event_id: String,
    pub weight: f64,
}

/// Reverse index from normalized topic tokens to events.
///
/// Indexing is incremental on append; the index is derived state and is
/// rebuilt from the journals, never persisted as history.
#[derive(Debug, Default)]
pub struct RefIndex {
    by_topic: HashMap<String, Vec<(String, f64)>>,
    indexed: HashSet<String>,
}

impl RefIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index one event's topics. Indexing the same event twice is a
    /// no-op.
    pub fn index_event(&mut self, event: &Event) {
        if !self.indexed.insert(event.id.clone()) {
            return;
        }

        for (topic, weight) in extract_topics(event) {
            self.by_topic
                .entry(topic)
                .or_default()
                .push((event.id.clone(), weight));
        }
    }

    /// Exact lookup for one normalized token.
    pub fn lookup(&self, topic: &str) -> &[(String, f64)] {
        self.by_topic
            .get(topic)
            .map(|refs| refs.as_slice())
            .unwrap_or(&[])
    }

    /// Score events against a free-text query. Exact token hit scores
    /// the ref's weight; substring hit scores half. Results are sorted
    /// by descending score, ties broken by event id for determinism.
    pub fn query(&self, text: &str) -> Vec<(String, f64)> {
        let query_tokens = tokenize_text(text);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut scores: HashMap<String, f64> = HashMap::new();
        for qt in &query_tokens {
            for (topic, refs) in &self.by_topic {
                let factor = if topic == qt {
                    1.0
                } else if topic.contains(qt.as_str()) || qt.contains(topic.as_str()) {
                    0.5
                } else {
                    continue;
                };
                for (event_id, weight) in refs {
                    *scores.entry(event_id.clone()).or_insert(0.0) += weight * factor;
                }
            }
        }

        let mut ranked: Vec<(String, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    pub fn topic_count(&self) -> usize {
        self.by_topic.len()
    }

    pub fn event_count(&self) -> usize {
        self.indexed.len()
    }

    /// Drop all derived state (used before a rebuild).
    pub fn clear(&mut self) {
        self.by_topic.clear();
        self.indexed.clear();
    }
}

/// Pull topic tokens out of an event's payload.
///
/// Free text fields are tokenized through the universal tokenizer;
/// every token gets weight 1.0.
pub fn extract_topics(event: &Event) -> Vec<(String, f64)> {
    let mut texts: Vec<String> = Vec::new();

    match event.payload() {
        EventPayload::ProjectCreated { need } => texts.push(need),
        EventPayload::PurposeDeclared { what, why } => {
            texts.push(what);
            texts.extend(why);
        }
        EventPayload::Captured { text } => texts.push(text),
        EventPayload::StructureProposed { content, .. }
        | EventPayload::ArtifactConfirmed { content, .. } => {
            texts.push(content.summary);
            texts.extend(content.what);
            texts.extend(content.why);
            texts.extend(content.domain);
        }
        EventPayload::QuestionRaised { question } => texts.push(question),
        EventPayload::QuestionResolved { resolution, .. } => texts.push(resolution),
        EventPayload::ChallengeRaised { challenge, .. } => texts.push(challenge),
        EventPayload::EvidenceAttached { evidence, .. } => texts.push(evidence),
        EventPayload::Deprecated { reason, .. } => texts.extend(reason),
        EventPayload::CommitCaptured { message, .. } => texts.push(message),
        EventPayload::Endorsed { .. }
        | EventPayload::LinkCreated { .. }
        | EventPayload::Unknown { .. } => {}
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut topics = Vec::new();
    for text in texts {
        for part in text.split_whitespace() {
            for token in tokenize_name(part) {
                if seen.insert(token.clone()) {
                    topics.push((token, 1.0));
                }
            }
        }
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_types::{EventType, Scope};
    use serde_json::json;

    fn captured(text: &str) -> Event {
        Event::new(EventType::Captured, json!({ "text": text }), Scope::Shared)
    }

    #[test]
    fn test_index_and_lookup() {
        let mut index = RefIndex::new();
        let event = captured("UserProfile handles auth");
        index.index_event(&event);

        assert_eq!(index.lookup("user").len(), 1);
        assert_eq!(index.lookup("profile").len(), 1);
        assert_eq!(index.lookup("auth").len(), 1);
        assert!(index.lookup("missing").is_empty());
    }

    #[test]
    fn test_index_is_idempotent() {
        let mut index = RefIndex::new();
        let event = captured("caching layer");
        index.index_event(&event);
        index.index_event(&event);

        assert_eq!(index.lookup("caching").len(), 1);
    }

    #[test]
    fn test_query_ranks_by_overlap() {
        let mut index = RefIndex::new();
        let rich = captured("user profile auth flow");
        let poor = captured("profile picture upload");
        index.index_event(&rich);
        index.index_event(&poor);

        let ranked = index.query("UserProfile");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, rich.id);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_clear_drops_state() {
        let mut index = RefIndex::new();
        index.index_event(&captured("something"));
        index.clear();
        assert_eq!(index.event_count(), 0);
        assert_eq!(index.topic_count(), 0);
    }
}
