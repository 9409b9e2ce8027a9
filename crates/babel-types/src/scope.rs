use serde::{Deserialize, Serialize};
use std::fmt;

/// Event scope: which journal an event belongs to.
///
/// `Shared` events are intended for version control and travel with the
/// team; `Local` events stay on one machine. The two streams are
/// disjoint; projection reads both but preserves scope on derived nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Shared,
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Shared => "shared",
            Scope::Local => "local",
        }
    }

    /// Journal directory name under `.babel/`
    pub fn dir_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(Scope::Shared),
            "local" => Ok(Scope::Local),
            other => Err(crate::Error::InvalidEvent(format!(
                "unknown scope: {}",
                other
            ))),
        }
    }
}
