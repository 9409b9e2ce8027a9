mod codec;
mod error;
mod loader;
mod log;
mod path;
mod refs;
mod resolver;
mod tokenizer;

pub use codec::IdCodec;
pub use error::{Error, Result};
pub use loader::{LoadResult, Loader, TokenBudget};
pub use log::{DualEventLog, EventLog};
pub use path::BabelPaths;
pub use refs::{Ref, RefIndex, extract_topics};
pub use resolver::{IdResolver, ResolveResult, ResolveStatus};
pub use tokenizer::{token_match_score, tokenize_name, tokenize_text, tokens_overlap};
