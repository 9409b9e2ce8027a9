use babel_engine::{Direction, GraphProjector};
use babel_types::{EdgeRelation, Event, EventType, NodeType, Scope};
use serde_json::json;

fn canonical_order(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    events
}

fn sample_events() -> Vec<Event> {
    vec![
        Event::new(
            EventType::ProjectCreated,
            json!({"need": "answer why later"}),
            Scope::Shared,
        ),
        Event::new(
            EventType::PurposeDeclared,
            json!({"what": "preserve intent"}),
            Scope::Shared,
        ),
        Event::new(
            EventType::StructureProposed,
            json!({
                "artifact_type": "decision",
                "content": {"summary": "use sqlite"},
                "confidence": 0.9,
                "rationale": "zero ops storage"
            }),
            Scope::Shared,
        ),
        Event::new(
            EventType::QuestionRaised,
            json!({"question": "how do merges behave?"}),
            Scope::Local,
        ),
        Event::new(
            EventType::LinkCreated,
            json!({"source_id": "a", "target_id": "b", "relation": "supports"}),
            Scope::Shared,
        ),
    ]
}

#[test]
fn test_projection_deterministic_across_permutations() {
    let events = sample_events();

    // Any permutation of the same multiset, replayed under the
    // canonical ordering, produces a byte-identical graph.
    let permutations: Vec<Vec<Event>> = vec![
        events.clone(),
        events.iter().rev().cloned().collect(),
        {
            let mut shuffled = events.clone();
            shuffled.swap(0, 3);
            shuffled.swap(1, 4);
            shuffled
        },
    ];

    let mut snapshots = Vec::new();
    for permutation in permutations {
        let ordered = canonical_order(permutation);
        let mut projector = GraphProjector::new();
        projector.rebuild(ordered.iter());
        snapshots.push(projector.graph().snapshot());
    }

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);
}

#[test]
fn test_proposal_confirmation_flow() {
    // Proposal then confirmation: exactly one decision node, informs
    // edge to the active purpose, proposal superseded.
    let purpose = Event::new(
        EventType::PurposeDeclared,
        json!({"what": "preserve intent"}),
        Scope::Shared,
    );
    let proposed = Event::new(
        EventType::StructureProposed,
        json!({
            "artifact_type": "decision",
            "content": {"summary": "use sqlite"},
            "confidence": 0.8,
            "rationale": "local-first storage"
        }),
        Scope::Shared,
    );
    let confirmed = Event::new(
        EventType::ArtifactConfirmed,
        json!({
            "proposal_id": proposed.id,
            "artifact_type": "decision",
            "content": {"summary": "use sqlite"}
        }),
        Scope::Shared,
    );

    let mut projector = GraphProjector::new();
    projector.project(&purpose);
    projector.project(&proposed);
    projector.project(&confirmed);

    let decisions = projector.graph().get_nodes_by_type(NodeType::Decision);
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].content.summary, "use sqlite");

    let informs = projector
        .graph()
        .get_edges(&decisions[0].id, Direction::Outgoing);
    assert_eq!(informs.len(), 1);
    assert_eq!(informs[0].relation, EdgeRelation::Informs);
    assert_eq!(
        informs[0].target_id,
        format!("purpose_{}", purpose.id)
    );

    let proposal_node = projector
        .graph()
        .get_node(&format!("proposal_{}", proposed.id))
        .unwrap();
    assert_eq!(proposal_node.status, babel_types::NodeStatus::Superseded);
}

#[test]
fn test_scope_preserved_on_nodes() {
    let mut projector = GraphProjector::new();
    projector.project(&Event::new(
        EventType::QuestionRaised,
        json!({"question": "personal note"}),
        Scope::Local,
    ));

    let questions = projector.graph().get_nodes_by_type(NodeType::Question);
    assert_eq!(questions[0].scope, Scope::Local);
}

#[test]
fn test_dropping_local_journal_leaves_shared_graph_unchanged() {
    let shared_events = vec![
        Event::new(
            EventType::PurposeDeclared,
            json!({"what": "preserve intent"}),
            Scope::Shared,
        ),
        Event::new(
            EventType::QuestionRaised,
            json!({"question": "shared question"}),
            Scope::Shared,
        ),
    ];
    let local_event = Event::new(
        EventType::QuestionRaised,
        json!({"question": "local question"}),
        Scope::Local,
    );

    let mut with_local = GraphProjector::new();
    let mut all: Vec<Event> = shared_events.clone();
    all.push(local_event);
    with_local.rebuild(canonical_order(all).iter());

    let mut without_local = GraphProjector::new();
    without_local.rebuild(canonical_order(shared_events).iter());

    // Shared-scoped nodes are identical in both projections
    let shared_nodes = |projector: &GraphProjector| -> Vec<String> {
        let mut ids: Vec<String> = projector
            .graph()
            .nodes()
            .filter(|n| n.scope == Scope::Shared)
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    };
    assert_eq!(shared_nodes(&with_local), shared_nodes(&without_local));
}

#[test]
fn test_neighbors_bounded_by_depth_and_relation() {
    let purpose = Event::new(
        EventType::PurposeDeclared,
        json!({"what": "preserve intent"}),
        Scope::Shared,
    );
    let confirm = Event::new(
        EventType::ArtifactConfirmed,
        json!({
            "proposal_id": "none",
            "artifact_type": "decision",
            "content": {"summary": "use sqlite"}
        }),
        Scope::Shared,
    );
    let challenge_data = |target: &str| {
        json!({"target_id": target, "challenge": "write amplification"})
    };

    let mut projector = GraphProjector::new();
    projector.project(&purpose);
    let decision_id = projector.project(&confirm).nodes_added[0].clone();
    projector.project(&Event::new(
        EventType::ChallengeRaised,
        challenge_data(&decision_id),
        Scope::Shared,
    ));

    let purpose_id = format!("purpose_{}", purpose.id);

    // Depth 1 from the purpose reaches only the decision
    let one_hop = projector.graph().neighbors(&purpose_id, &[], 1);
    assert_eq!(one_hop.len(), 1);
    assert_eq!(one_hop[0].id, decision_id);

    // Depth 2 also reaches the tension challenging it
    let two_hops = projector.graph().neighbors(&purpose_id, &[], 2);
    assert_eq!(two_hops.len(), 2);

    // Relation filter drops the challenge edge
    let informs_only = projector
        .graph()
        .neighbors(&purpose_id, &[EdgeRelation::Informs], 2);
    assert_eq!(informs_only.len(), 1);
}

#[test]
fn test_commit_capture_links_artifacts() {
    let confirm = Event::new(
        EventType::ArtifactConfirmed,
        json!({
            "proposal_id": "none",
            "artifact_type": "decision",
            "content": {"summary": "batch writes"}
        }),
        Scope::Shared,
    );

    let mut projector = GraphProjector::new();
    let decision_id = projector.project(&confirm).nodes_added[0].clone();

    let commit = Event::new(
        EventType::CommitCaptured,
        json!({
            "commit_hash": "abc1234",
            "message": "implement batching",
            "artifact_ids": [decision_id]
        }),
        Scope::Shared,
    );
    projector.project(&commit);

    let commits = projector.graph().get_nodes_by_type(NodeType::Commit);
    assert_eq!(commits.len(), 1);

    let links = projector
        .graph()
        .get_edges(&commits[0].id, Direction::Incoming);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].relation, EdgeRelation::LinksToCommit);
}
