use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static CODE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}-[A-Z]{2}$").unwrap());

const CODE_SPACE: u32 = 26 * 26 * 26 * 26;

/// Deterministic hash-based id aliasing with the AA-BB format.
///
/// Encoding is a pure function of the full id: no storage, no state,
/// stable across processes and runs. The full id (including any type
/// prefix such as `decision_`) feeds the hash, so `decision_<h>` and
/// `constraint_<h>` always receive distinct codes. Decoding scans a
/// caller-supplied candidate list and is a passthrough otherwise.
///
/// Code space: 26^4 = 456,976 combinations.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdCodec;

impl IdCodec {
    pub fn new() -> Self {
        Self
    }

    /// Generate the deterministic AA-BB code for an id.
    pub fn encode(&self, full_id: &str) -> String {
        if full_id.is_empty() {
            return String::new();
        }
        hash_to_code(full_id)
    }

    /// Resolve a code back to a full id by scanning candidates.
    ///
    /// Input is case-insensitive. Without candidates, or when nothing
    /// matches, the input comes back unchanged.
    pub fn decode(&self, code: &str, candidate_ids: &[String]) -> String {
        if code.is_empty() {
            return code.to_string();
        }

        let code_upper = code.to_uppercase();
        if !self.is_short_code(&code_upper) {
            return code.to_string();
        }

        for candidate in candidate_ids {
            if self.encode(candidate) == code_upper {
                return candidate.clone();
            }
        }

        code.to_string()
    }

    /// Check whether a value matches the AA-BB format.
    pub fn is_short_code(&self, value: &str) -> bool {
        !value.is_empty() && CODE_PATTERN.is_match(&value.to_uppercase())
    }

    /// Format display text prefixed with the code: `[AA-BB] text`.
    pub fn format_with_code(&self, full_id: &str, display_text: &str) -> String {
        format!("[{}] {}", self.encode(full_id), display_text)
    }
}

fn hash_to_code(id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();

    let h = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    let n = h % CODE_SPACE;

    let c0 = (n % 26) as u8;
    let c1 = ((n / 26) % 26) as u8;
    let c2 = ((n / 676) % 26) as u8;
    let c3 = ((n / 17576) % 26) as u8;

    format!(
        "{}{}-{}{}",
        (b'A' + c3) as char,
        (b'A' + c2) as char,
        (b'A' + c1) as char,
        (b'A' + c0) as char
    )
}
