use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::config::BabelConfig;
use crate::query::{StatusReport, WhyMatch, WhyResult};
use crate::{Error, Result};
use babel_core::{
    BabelPaths, DualEventLog, IdCodec, IdResolver, LoadResult, Loader, RefIndex, ResolveResult,
    TokenBudget,
};
use babel_engine::{GraphCache, GraphProjector, SyncOutcome, sync_journal};
use babel_gather::ContextGatherer;
use babel_index::{SymbolIndex, default_registry};
use babel_orchestrator::TaskOrchestrator;
use babel_types::{
    EdgeRelation, Event, EventPayload, EventType, NodeStatus, NodeType, Proposal, Scope,
};

/// One project's full runtime context: journals, projection, refs,
/// orchestrator and configuration, passed explicitly wherever needed.
/// There are no process-wide singletons to reset between tests.
pub struct Workspace {
    paths: BabelPaths,
    log: DualEventLog,
    projector: GraphProjector,
    refs: RefIndex,
    loader: Loader,
    orchestrator: Arc<TaskOrchestrator>,
    config: BabelConfig,
    codec: IdCodec,
    resolver: IdResolver,
}

impl Workspace {
    /// Create the `.babel` layout and record the founding events:
    /// PROJECT_CREATED followed by PURPOSE_DECLARED, both shared.
    pub fn init(project_root: &Path, need: &str, purpose: &str) -> Result<Self> {
        let paths = BabelPaths::init(project_root)?;
        let mut workspace = Self::from_paths(paths)?;

        workspace.record(Event::new(
            EventType::ProjectCreated,
            json!({ "need": need }),
            Scope::Shared,
        ))?;
        workspace.record(Event::new(
            EventType::PurposeDeclared,
            json!({ "what": purpose, "why": need }),
            Scope::Shared,
        ))?;

        Ok(workspace)
    }

    /// Open an existing project, replaying both journals into the
    /// derived graph.
    pub fn open(start: &Path) -> Result<Self> {
        let paths = BabelPaths::discover(start)?;
        let mut workspace = Self::from_paths(paths)?;
        workspace.rebuild()?;
        Ok(workspace)
    }

    fn from_paths(paths: BabelPaths) -> Result<Self> {
        let log = DualEventLog::open_in(&paths)?;
        let config = BabelConfig::load(Some(&paths))?;
        let orchestrator = Arc::new(TaskOrchestrator::new(config.parallel.clone())?);

        Ok(Self {
            paths,
            log,
            projector: GraphProjector::new(),
            refs: RefIndex::new(),
            loader: Loader::new(TokenBudget::default()),
            orchestrator,
            config,
            codec: IdCodec::new(),
            resolver: IdResolver::new(),
        })
    }

    pub fn paths(&self) -> &BabelPaths {
        &self.paths
    }

    pub fn config(&self) -> &BabelConfig {
        &self.config
    }

    pub fn log(&self) -> &DualEventLog {
        &self.log
    }

    pub fn graph(&self) -> &babel_engine::KnowledgeGraph {
        self.projector.graph()
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.orchestrator
    }

    pub fn codec(&self) -> &IdCodec {
        &self.codec
    }

    pub fn with_budget(mut self, budget: TokenBudget) -> Self {
        self.loader = Loader::new(budget);
        self
    }

    /// The single funnel for new history: append to the journal, fold
    /// into the graph, index topics. Returns the event id.
    pub fn record(&mut self, event: Event) -> Result<String> {
        let id = self.log.append(&event)?;
        self.projector.project(&event);
        self.refs.index_event(&event);
        debug!(id = %id, event_type = %event.event_type.as_str(), "event recorded");
        Ok(id)
    }

    /// Capture raw reasoning text.
    pub fn capture(&mut self, text: &str, scope: Scope) -> Result<String> {
        self.record(Event::new(EventType::Captured, json!({ "text": text }), scope))
    }

    /// Record an extractor proposal as a STRUCTURE_PROPOSED event.
    pub fn propose(&mut self, proposal: &Proposal, scope: Scope) -> Result<String> {
        let data = serde_json::to_value(proposal)?;
        self.record(Event::with_parents(
            EventType::StructureProposed,
            data,
            scope,
            vec![proposal.source_id.clone()],
        ))
    }

    /// Confirm a pending proposal, promoting it to an artifact linked
    /// to the active purpose. Returns the confirming event id; the
    /// artifact node id is `<type>_<event id>`.
    pub fn confirm(&mut self, proposal_event_id: &str) -> Result<String> {
        let proposal_event = self
            .find_event(proposal_event_id)?
            .ok_or_else(|| {
                Error::InvalidOperation(format!("no such proposal event: {}", proposal_event_id))
            })?;

        let EventPayload::StructureProposed {
            artifact_type,
            content,
            ..
        } = proposal_event.payload()
        else {
            return Err(Error::InvalidOperation(format!(
                "event {} is not a proposal",
                proposal_event_id
            )));
        };

        let data = json!({
            "proposal_id": proposal_event_id,
            "artifact_type": artifact_type,
            "content": content,
            "purpose_id": self.projector.active_purpose(),
        });

        self.record(Event::with_parents(
            EventType::ArtifactConfirmed,
            data,
            proposal_event.scope,
            vec![proposal_event_id.to_string()],
        ))
    }

    pub fn link(
        &mut self,
        source_id: &str,
        target_id: &str,
        relation: EdgeRelation,
    ) -> Result<String> {
        self.record(Event::new(
            EventType::LinkCreated,
            json!({
                "source_id": source_id,
                "target_id": target_id,
                "relation": relation,
            }),
            Scope::Shared,
        ))
    }

    pub fn endorse(&mut self, artifact_id: &str) -> Result<String> {
        self.record(Event::new(
            EventType::Endorsed,
            json!({ "artifact_id": artifact_id }),
            Scope::Shared,
        ))
    }

    pub fn attach_evidence(&mut self, artifact_id: &str, evidence: &str) -> Result<String> {
        self.record(Event::new(
            EventType::EvidenceAttached,
            json!({ "artifact_id": artifact_id, "evidence": evidence }),
            Scope::Shared,
        ))
    }

    pub fn challenge(&mut self, target_id: &str, challenge: &str) -> Result<String> {
        self.record(Event::new(
            EventType::ChallengeRaised,
            json!({ "target_id": target_id, "challenge": challenge }),
            Scope::Shared,
        ))
    }

    pub fn raise_question(&mut self, question: &str, scope: Scope) -> Result<String> {
        self.record(Event::new(
            EventType::QuestionRaised,
            json!({ "question": question }),
            scope,
        ))
    }

    pub fn resolve_question(&mut self, question_node_id: &str, resolution: &str) -> Result<String> {
        self.record(Event::new(
            EventType::QuestionResolved,
            json!({ "question_id": question_node_id, "resolution": resolution }),
            Scope::Shared,
        ))
    }

    /// Deprecation is a status transition; the confirming history
    /// stays in the journal untouched.
    pub fn deprecate(&mut self, target_id: &str, reason: Option<&str>) -> Result<String> {
        self.record(Event::new(
            EventType::Deprecated,
            json!({ "target_id": target_id, "reason": reason }),
            Scope::Shared,
        ))
    }

    pub fn capture_commit(
        &mut self,
        commit_hash: &str,
        message: &str,
        artifact_ids: &[String],
    ) -> Result<String> {
        self.record(Event::new(
            EventType::CommitCaptured,
            json!({
                "commit_hash": commit_hash,
                "message": message,
                "artifact_ids": artifact_ids,
            }),
            Scope::Shared,
        ))
    }

    /// Answer "why": tokenize the query, hit the topic index, hydrate
    /// the ranked events within the loader's budget.
    pub fn why(&self, query: &str) -> Result<WhyResult> {
        let ranked = self.refs.query(query);
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();

        let LoadResult {
            events, complete, ..
        } = self.loader.load_events(&self.log, &ids)?;

        let matches = events
            .into_iter()
            .map(|event| {
                let score = ranked
                    .iter()
                    .find(|(id, _)| *id == event.id)
                    .map(|(_, score)| *score)
                    .unwrap_or(0.0);
                WhyMatch { event, score }
            })
            .collect();

        Ok(WhyResult { matches, complete })
    }

    /// Project reasoning snapshot: counts, open questions, tensions.
    pub fn status(&self) -> StatusReport {
        let graph = self.projector.graph();
        let mut report = StatusReport {
            event_count: self.log.journal(Scope::Shared).len()
                + self.log.journal(Scope::Local).len(),
            ..StatusReport::default()
        };

        for node in graph.nodes() {
            *report
                .nodes_by_type
                .entry(node.node_type.as_str().to_string())
                .or_insert(0) += 1;

            match node.node_type {
                NodeType::Question if node.status == NodeStatus::Active => {
                    report.open_questions += 1;
                }
                NodeType::Tension if node.status == NodeStatus::Active => {
                    report.open_tensions += 1;
                }
                _ => {}
            }
            if node.status == NodeStatus::Deprecated {
                report.deprecated += 1;
            }
        }

        report.purpose = self
            .projector
            .active_purpose()
            .and_then(|id| graph.get_node(id))
            .map(|node| node.content.summary.clone());

        report
    }

    /// Re-read the shared journal after a third-party merge. New
    /// events replay; conflicting duplicates quarantine as tensions.
    pub fn sync(&mut self) -> Result<SyncOutcome> {
        let outcome = sync_journal(self.log.journal(Scope::Shared), &mut self.projector)?;

        // Topic index catches up on whatever arrived
        for event in self.log.stream_ordered()? {
            self.refs.index_event(&event);
        }

        Ok(outcome)
    }

    /// Wipe derived state and refold both journals under the canonical
    /// ordering.
    pub fn rebuild(&mut self) -> Result<()> {
        let events = self.log.stream_ordered()?;
        self.projector.rebuild(events.iter());
        self.refs.clear();
        for event in &events {
            self.refs.index_event(event);
        }
        Ok(())
    }

    /// Persist the projection to `graph.db`.
    pub fn save_graph_cache(&self) -> Result<()> {
        let mut cache = GraphCache::open(&self.paths.graph_db_path())?;
        let applied = self.log.journal(Scope::Shared).len() + self.log.journal(Scope::Local).len();
        cache.save(self.projector.graph(), applied)?;
        Ok(())
    }

    /// Resolve a user-supplied reference (id, AA-BB code, or fuzzy
    /// text) against the graph's nodes.
    pub fn resolve_reference(&self, reference: &str) -> ResolveResult {
        let candidates: Vec<(String, String)> = self
            .projector
            .graph()
            .nodes()
            .map(|node| (node.id.clone(), node.content.summary.clone()))
            .collect();
        self.resolver.resolve(reference, &candidates)
    }

    /// Artifact summaries for extractor context injection.
    pub fn existing_artifacts(&self) -> Vec<crate::ExistingArtifact> {
        self.projector
            .graph()
            .nodes()
            .filter(|node| node.node_type.is_artifact() && node.status == NodeStatus::Active)
            .filter_map(|node| {
                let artifact_type = match node.node_type {
                    NodeType::Decision => babel_types::ArtifactType::Decision,
                    NodeType::Constraint => babel_types::ArtifactType::Constraint,
                    NodeType::Principle => babel_types::ArtifactType::Principle,
                    NodeType::Requirement => babel_types::ArtifactType::Requirement,
                    _ => return None,
                };
                Some(crate::ExistingArtifact {
                    artifact_id: node.id.clone(),
                    artifact_type,
                    summary: node.content.summary.clone(),
                })
            })
            .collect()
    }

    /// Context gatherer wired to this workspace's orchestrator.
    pub fn gatherer(&self) -> ContextGatherer {
        ContextGatherer::new(Some(Arc::clone(&self.orchestrator)))
    }

    /// Symbol index backed by this project's cache file.
    pub fn symbol_index(&self) -> Result<SymbolIndex> {
        SymbolIndex::open(self.paths.symbol_cache_path(), default_registry())
            .map_err(|err| Error::InvalidOperation(err.to_string()))
    }

    /// User preference store; mutable, not history.
    pub fn memos(&self) -> Result<crate::MemoStore> {
        crate::MemoStore::open(self.paths.memos_path())
    }

    /// Offline extraction queue.
    pub fn offline_queue(&self) -> Result<crate::OfflineQueue> {
        crate::OfflineQueue::open(self.paths.extraction_queue_path())
    }

    fn find_event(&self, event_id: &str) -> Result<Option<Event>> {
        Ok(self
            .log
            .stream_ordered()?
            .into_iter()
            .find(|event| event.id == event_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout_and_founding_events() {
        let temp = TempDir::new().unwrap();
        let workspace =
            Workspace::init(temp.path(), "answer why later", "preserve intent").unwrap();

        assert!(workspace.paths().journal_path(Scope::Shared).exists());
        let status = workspace.status();
        assert_eq!(status.purpose.as_deref(), Some("preserve intent"));
        assert_eq!(status.event_count, 2);
    }

    #[test]
    fn test_open_replays_history() {
        let temp = TempDir::new().unwrap();
        {
            let mut workspace = Workspace::init(temp.path(), "need", "purpose").unwrap();
            workspace.capture("we chose jsonl", Scope::Shared).unwrap();
        }

        let reopened = Workspace::open(temp.path()).unwrap();
        assert_eq!(reopened.status().event_count, 3);
        assert_eq!(reopened.status().purpose.as_deref(), Some("purpose"));
    }

    #[test]
    fn test_capture_routes_scope() {
        let temp = TempDir::new().unwrap();
        let mut workspace = Workspace::init(temp.path(), "n", "p").unwrap();

        workspace.capture("private note", Scope::Local).unwrap();

        assert_eq!(workspace.log().journal(Scope::Local).len(), 1);
        assert_eq!(workspace.log().journal(Scope::Shared).len(), 2);
    }

    #[test]
    fn test_resolve_reference_by_code() {
        let temp = TempDir::new().unwrap();
        let mut workspace = Workspace::init(temp.path(), "n", "p").unwrap();
        let question_event = workspace
            .raise_question("why sqlite?", Scope::Shared)
            .unwrap();
        let node_id = format!("question_{}", question_event);

        let code = workspace.codec().encode(&node_id);
        let resolved = workspace.resolve_reference(&code);
        assert_eq!(resolved.matches, vec![node_id]);
    }
}
