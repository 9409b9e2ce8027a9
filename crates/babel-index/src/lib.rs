mod cache;
mod config;
mod error;
mod exclusions;
mod extractor;
mod languages;
mod markdown;
mod registry;
mod store;

pub use cache::SymbolCache;
pub use config::{LanguageConfig, SymbolQuery};
pub use error::{Error, Result};
pub use exclusions::ExclusionRegistry;
pub use extractor::TreeSitterExtractor;
pub use languages::{
    javascript_config, markdown_config, python_config, rust_config, typescript_config,
};
pub use registry::ParserRegistry;
pub use store::SymbolIndex;

/// Registry preloaded with every built-in language.
pub fn default_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register(python_config()).expect("builtin config");
    registry
        .register(javascript_config())
        .expect("builtin config");
    registry
        .register(typescript_config())
        .expect("builtin config");
    registry.register(rust_config()).expect("builtin config");
    registry.register(markdown_config()).expect("builtin config");
    registry
}
