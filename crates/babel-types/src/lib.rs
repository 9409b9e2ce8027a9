mod error;
mod event;
mod graph;
mod payload;
mod proposal;
mod scope;
mod symbol;
mod util;

pub use error::{Error, Result};
pub use event::{Event, EventType};
pub use graph::{Edge, EdgeRelation, Node, NodeContent, NodeStatus, NodeType};
pub use payload::{ArtifactContent, ArtifactType, EventPayload};
pub use proposal::Proposal;
pub use scope::Scope;
pub use symbol::{Symbol, SymbolType};
pub use util::{event_id, sanitize_control_chars};
