mod broker;
mod error;
mod functions;
mod gatherer;
mod plan;
mod result;
mod safety;
mod template;

pub use broker::{Chunk, ChunkBroker, ChunkStrategy, DEFAULT_CONTEXT_LIMIT_KB};
pub use error::{Error, Result};
pub use functions::{
    estimate_file_size, estimate_grep_size, gather_bash, gather_file, gather_glob, gather_grep,
    gather_symbol,
};
pub use gatherer::ContextGatherer;
pub use plan::{GatherPlan, GatherSource, SourceParams, SourcePriority, SourceType};
pub use result::GatherResult;
pub use safety::{CommandSafety, SafetyCategory, SafetyRegistry, SafetyViolation};
pub use template::{ContextTemplate, get_language_hint, render_context, render_json};
