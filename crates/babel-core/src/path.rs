use std::path::{Path, PathBuf};

use crate::{Error, Result};
use babel_types::Scope;

/// On-disk layout of a project's `.babel` directory.
///
/// ```text
/// <project>/.babel/
///   shared/events.jsonl   append-only, tracked in VCS
///   local/events.jsonl    append-only, NOT tracked
///   graph.db              derived projection cache
///   symbol_cache.json     symbol index cache
///   config.yaml           optional project override
///   memos.json            user preference store
/// ```
#[derive(Debug, Clone)]
pub struct BabelPaths {
    project_root: PathBuf,
    babel_dir: PathBuf,
}

impl BabelPaths {
    pub const DIR_NAME: &'static str = ".babel";

    /// Search upward from `start` for an existing `.babel` directory.
    /// Looks at most five levels up, matching symbol lookup behavior.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut search = start.to_path_buf();
        for _ in 0..5 {
            let candidate = search.join(Self::DIR_NAME);
            if candidate.is_dir() {
                return Ok(Self {
                    project_root: search,
                    babel_dir: candidate,
                });
            }
            match search.parent() {
                Some(parent) => search = parent.to_path_buf(),
                None => break,
            }
        }
        Err(Error::NotInitialized(format!(
            "no {} directory found from {}",
            Self::DIR_NAME,
            start.display()
        )))
    }

    /// Create the `.babel` layout under `project_root` (idempotent).
    pub fn init(project_root: &Path) -> Result<Self> {
        let babel_dir = project_root.join(Self::DIR_NAME);
        std::fs::create_dir_all(babel_dir.join(Scope::Shared.dir_name()))?;
        std::fs::create_dir_all(babel_dir.join(Scope::Local.dir_name()))?;
        Ok(Self {
            project_root: project_root.to_path_buf(),
            babel_dir,
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn babel_dir(&self) -> &Path {
        &self.babel_dir
    }

    pub fn journal_path(&self, scope: Scope) -> PathBuf {
        self.babel_dir.join(scope.dir_name()).join("events.jsonl")
    }

    pub fn graph_db_path(&self) -> PathBuf {
        self.babel_dir.join("graph.db")
    }

    pub fn symbol_cache_path(&self) -> PathBuf {
        self.babel_dir.join("symbol_cache.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.babel_dir.join("config.yaml")
    }

    pub fn memos_path(&self) -> PathBuf {
        self.babel_dir.join("memos.json")
    }

    pub fn extraction_queue_path(&self) -> PathBuf {
        self.babel_dir.join("extraction_queue.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let temp = TempDir::new().unwrap();
        let paths = BabelPaths::init(temp.path()).unwrap();

        assert!(paths.babel_dir().is_dir());
        assert!(paths.babel_dir().join("shared").is_dir());
        assert!(paths.babel_dir().join("local").is_dir());
        assert!(paths.journal_path(Scope::Shared).ends_with("shared/events.jsonl"));
    }

    #[test]
    fn test_discover_walks_up() {
        let temp = TempDir::new().unwrap();
        BabelPaths::init(temp.path()).unwrap();

        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let found = BabelPaths::discover(&nested).unwrap();
        assert_eq!(
            found.babel_dir().canonicalize().unwrap(),
            temp.path().join(".babel").canonicalize().unwrap()
        );
    }

    #[test]
    fn test_discover_missing_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(BabelPaths::discover(temp.path()).is_err());
    }
}
