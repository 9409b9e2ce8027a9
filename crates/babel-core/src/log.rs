use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{Error, Result};
use babel_types::{Event, Scope, sanitize_control_chars};

// NOTE: Journal Design
//
// One JSON object per line, UTF-8, self-delimiting. The journal is the
// source of truth; everything else (graph, refs, caches) is derived and
// rebuildable. There is no update and no delete anywhere in this file.
//
// Appends are serialized by an in-process mutex per journal and the file
// is opened in append mode, so each record lands as one contiguous
// write. Cross-thread exclusivity beyond that is the aggregator's job:
// a single logical writer drains worker results into each journal.
//
// Reads never take the append lock. A torn trailing line (crash or
// concurrent tail write) reads as EOF, not corruption.

/// Append-only journal for one scope.
pub struct EventLog {
    scope: Scope,
    path: PathBuf,
    append_lock: Mutex<()>,
    /// id -> payload fingerprint, for duplicate detection
    known: Mutex<HashMap<String, String>>,
}

impl EventLog {
    /// Open (or create) the journal backing `scope` at `path`.
    pub fn open(path: impl Into<PathBuf>, scope: Scope) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let log = Self {
            scope,
            path,
            append_lock: Mutex::new(()),
            known: Mutex::new(HashMap::new()),
        };

        // Prime the duplicate index from existing records
        if log.path.exists() {
            let mut known = log.known.lock().unwrap();
            for event in log.read_all()? {
                known.insert(event.id.clone(), fingerprint(&event));
            }
        }

        Ok(log)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. Returns its id.
    ///
    /// Re-appending an identical event is a no-op; the same id with a
    /// different payload is rejected, never overwritten.
    pub fn append(&self, event: &Event) -> Result<String> {
        if event.scope != self.scope {
            return Err(Error::ScopeMismatch {
                expected: self.scope.to_string(),
                actual: event.scope.to_string(),
            });
        }

        let mut sanitized = event.clone();
        sanitize_value(&mut sanitized.data);
        let print = fingerprint(&sanitized);

        {
            let known = self.known.lock().unwrap();
            if let Some(existing) = known.get(&sanitized.id) {
                if *existing == print {
                    return Ok(sanitized.id);
                }
                return Err(Error::DuplicateEventId(sanitized.id));
            }
        }

        let line = serde_json::to_string(&sanitized).map_err(babel_types::Error::from)?;

        let _guard = self.append_lock.lock().unwrap();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;

        self.known.lock().unwrap().insert(sanitized.id.clone(), print);
        debug!(id = %sanitized.id, scope = %self.scope, "event appended");
        Ok(sanitized.id)
    }

    /// Stream events in append order.
    pub fn stream(&self) -> Result<EventStream> {
        EventStream::open(&self.path)
    }

    /// Check whether an id is present in this journal.
    pub fn exists(&self, id: &str) -> bool {
        self.known.lock().unwrap().contains_key(id)
    }

    /// Number of records in this journal.
    pub fn len(&self) -> usize {
        self.known.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect the full journal into memory, in append order.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        self.stream()?.collect()
    }
}

/// Lazy reader over one journal file.
///
/// Yields events in append order. A malformed line that is not the last
/// line of the file is corruption; a malformed trailing line is treated
/// as EOF.
pub struct EventStream {
    path: String,
    /// None when the journal file does not exist yet (empty stream)
    lines: Option<std::iter::Peekable<std::io::Lines<BufReader<std::fs::File>>>>,
    line_no: usize,
}

impl EventStream {
    fn open(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let lines = match std::fs::File::open(path) {
            Ok(file) => Some(BufReader::new(file).lines().peekable()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: display,
            lines,
            line_no: 0,
        })
    }
}

impl Iterator for EventStream {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err.into())),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Event>(&line) {
                Ok(event) => return Some(Ok(event)),
                Err(_) => {
                    // Torn trailing record reads as EOF; anything earlier
                    // is real corruption.
                    let has_more = lines
                        .peek()
                        .map(|next| match next {
                            Ok(text) => !text.trim().is_empty(),
                            Err(_) => true,
                        })
                        .unwrap_or(false);
                    if has_more {
                        return Some(Err(Error::JournalCorruption {
                            path: self.path.clone(),
                            line: self.line_no,
                        }));
                    }
                    return None;
                }
            }
        }
    }
}

/// Both journals of one project.
pub struct DualEventLog {
    shared: EventLog,
    local: EventLog,
}

impl DualEventLog {
    pub fn open(shared_path: impl Into<PathBuf>, local_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            shared: EventLog::open(shared_path, Scope::Shared)?,
            local: EventLog::open(local_path, Scope::Local)?,
        })
    }

    pub fn open_in(paths: &crate::BabelPaths) -> Result<Self> {
        Self::open(
            paths.journal_path(Scope::Shared),
            paths.journal_path(Scope::Local),
        )
    }

    pub fn journal(&self, scope: Scope) -> &EventLog {
        match scope {
            Scope::Shared => &self.shared,
            Scope::Local => &self.local,
        }
    }

    /// Append, routed by the event's own scope.
    pub fn append(&self, event: &Event) -> Result<String> {
        self.journal(event.scope).append(event)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.shared.exists(id) || self.local.exists(id)
    }

    /// Stream one scope in append order.
    pub fn stream(&self, scope: Scope) -> Result<EventStream> {
        self.journal(scope).stream()
    }

    /// Both scopes merged under the canonical replay ordering:
    /// per-journal append order, cross-journal merge by (created_at, id).
    pub fn stream_ordered(&self) -> Result<Vec<Event>> {
        let mut events = self.shared.read_all()?;
        events.extend(self.local.read_all()?);
        events.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }
}

fn fingerprint(event: &Event) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event.event_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(event.data.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Recursively sanitize control characters in every string of a payload.
fn sanitize_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
                *s = sanitize_control_chars(s);
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_value(item);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_value(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_types::EventType;
    use serde_json::json;
    use tempfile::TempDir;

    fn event(text: &str, scope: Scope) -> Event {
        Event::new(EventType::Captured, json!({ "text": text }), scope)
    }

    #[test]
    fn test_append_then_stream_round_trip() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::open(temp.path().join("events.jsonl"), Scope::Shared).unwrap();

        let a = event("first", Scope::Shared);
        let b = event("second", Scope::Shared);
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let streamed = log.read_all().unwrap();
        assert_eq!(streamed.len(), 2);
        assert_eq!(streamed[0].id, a.id);
        assert_eq!(streamed[1].id, b.id);
    }

    #[test]
    fn test_append_scope_mismatch() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::open(temp.path().join("events.jsonl"), Scope::Shared).unwrap();

        let err = log.append(&event("x", Scope::Local)).unwrap_err();
        assert!(matches!(err, Error::ScopeMismatch { .. }));
    }

    #[test]
    fn test_duplicate_same_payload_is_noop() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::open(temp.path().join("events.jsonl"), Scope::Shared).unwrap();

        let a = event("same", Scope::Shared);
        log.append(&a).unwrap();
        log.append(&a).unwrap();

        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_conflicting_payload_rejected() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::open(temp.path().join("events.jsonl"), Scope::Shared).unwrap();

        let a = event("original", Scope::Shared);
        log.append(&a).unwrap();

        let mut conflicting = a.clone();
        conflicting.data = json!({ "text": "tampered" });
        let err = log.append(&conflicting).unwrap_err();
        assert!(matches!(err, Error::DuplicateEventId(_)));

        // Original record untouched
        let streamed = log.read_all().unwrap();
        assert_eq!(streamed.len(), 1);
        assert_eq!(streamed[0].data["text"], "original");
    }

    #[test]
    fn test_torn_trailing_line_is_eof() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.jsonl");
        let log = EventLog::open(&path, Scope::Shared).unwrap();
        log.append(&event("whole", Scope::Shared)).unwrap();

        // Simulate a crash mid-append
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"id\":\"deadbeef\",\"type\":\"CAPT").unwrap();

        let reopened = EventLog::open(&path, Scope::Shared).unwrap();
        let streamed = reopened.read_all().unwrap();
        assert_eq!(streamed.len(), 1);
        assert_eq!(streamed[0].data["text"], "whole");
    }

    #[test]
    fn test_corrupt_middle_line_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("events.jsonl");
        {
            let log = EventLog::open(&path, Scope::Shared).unwrap();
            log.append(&event("one", Scope::Shared)).unwrap();
        }
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"not json at all\n").unwrap();
        }
        {
            // Valid record after the corrupt one
            let good = serde_json::to_string(&event("two", Scope::Shared)).unwrap();
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(good.as_bytes()).unwrap();
            file.write_all(b"\n").unwrap();
        }

        let stream = EventStream::open(&path).unwrap();
        let results: Vec<_> = stream.collect();
        assert!(results.iter().any(|r| matches!(
            r,
            Err(Error::JournalCorruption { .. })
        )));
    }

    #[test]
    fn test_control_chars_sanitized_before_write() {
        let temp = TempDir::new().unwrap();
        let log = EventLog::open(temp.path().join("events.jsonl"), Scope::Shared).unwrap();

        log.append(&event("bad\u{0000}text", Scope::Shared)).unwrap();
        let streamed = log.read_all().unwrap();
        assert_eq!(streamed[0].data["text"], "badtext");
    }

    #[test]
    fn test_scope_isolation() {
        let temp = TempDir::new().unwrap();
        let dual = DualEventLog::open(
            temp.path().join("shared/events.jsonl"),
            temp.path().join("local/events.jsonl"),
        )
        .unwrap();

        dual.append(&event("team", Scope::Shared)).unwrap();
        dual.append(&event("mine", Scope::Local)).unwrap();

        let shared: Vec<_> = dual
            .stream(Scope::Shared)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let local: Vec<_> = dual
            .stream(Scope::Local)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(shared.len(), 1);
        assert_eq!(local.len(), 1);
        assert_eq!(shared[0].data["text"], "team");
        assert_eq!(local[0].data["text"], "mine");
    }

    #[test]
    fn test_stream_ordered_merges_scopes() {
        let temp = TempDir::new().unwrap();
        let dual = DualEventLog::open(
            temp.path().join("shared/events.jsonl"),
            temp.path().join("local/events.jsonl"),
        )
        .unwrap();

        dual.append(&event("a", Scope::Shared)).unwrap();
        dual.append(&event("b", Scope::Local)).unwrap();
        dual.append(&event("c", Scope::Shared)).unwrap();

        let merged = dual.stream_ordered().unwrap();
        assert_eq!(merged.len(), 3);
        // Sorted by (created_at, id): never out of timestamp order
        for pair in merged.windows(2) {
            assert!(
                (pair[0].created_at, &pair[0].id) <= (pair[1].created_at, &pair[1].id)
            );
        }
    }
}
