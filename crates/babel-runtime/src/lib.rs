mod config;
mod error;
mod extractor;
mod memo;
mod providers;
mod query;
mod workspace;

pub use config::{ActiveLlm, BabelConfig, LlmConfig, LlmEndpoint};
pub use error::{Error, Result};
pub use extractor::{Extractor, ExistingArtifact, MockExtractor, OfflineQueue, QueuedExtraction};
pub use memo::{Memo, MemoStore};
pub use providers::{LlmProvider, LlmResponse, MockProvider};
pub use query::{StatusReport, WhyMatch, WhyResult};
pub use workspace::Workspace;
