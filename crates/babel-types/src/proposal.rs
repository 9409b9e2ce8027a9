use serde::{Deserialize, Serialize};

use crate::payload::{ArtifactContent, ArtifactType};

/// Candidate artifact produced by an extractor.
///
/// Proposals never touch the journals directly; they become artifacts
/// only through a confirming event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Event id of the captured text this proposal came from
    pub source_id: String,
    pub artifact_type: ArtifactType,
    pub content: ArtifactContent,
    /// Extractor confidence in [0, 1]
    pub confidence: f64,
    pub rationale: String,
}
