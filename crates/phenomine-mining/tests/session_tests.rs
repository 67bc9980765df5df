//! Curation sessions driven by a mock miner over a small ontology.

use std::sync::Arc;

use parking_lot::Mutex;
use phenomine_core::{
    ConceptId, GraphQuery, MemoryOntology, PhenotypeTerm, Span, Term,
};
use phenomine_mining::{
    CurationSession, MiningError, MockMiner, SessionEvent, Signal,
};

const QUERY: &str = "Patient has myopathy and hypotonia but no seizures.";

const PAYLOAD: &str = r#"[
    {"token":{"id":"HP:0003198","categories":["Phenotype"],"terms":["myopathy"]},"start":12,"end":20},
    {"token":{"id":"MP:0000751","categories":["Phenotype"],"terms":["myopathy"]},"start":12,"end":20},
    {"token":{"id":"HP:0001252","categories":["Phenotype"],"terms":["hypotonia","floppy"]},"start":25,"end":34},
    {"token":{"id":"HP:0001250","categories":["Phenotype"],"terms":["seizures"]},"start":42,"end":50}
]"#;

fn ontology() -> Arc<dyn GraphQuery> {
    let graph = MemoryOntology::builder()
        .term(Term::new("HP:0000001", "All"))
        .term(Term::new("HP:0000118", "Phenotypic abnormality"))
        .term(Term::new("HP:0003011", "Abnormality of the musculature"))
        .term(Term::new("HP:0003198", "Myopathy"))
        .term(Term::new("HP:0001252", "Hypotonia"))
        .term(Term::new("HP:0000707", "Abnormality of the nervous system"))
        .term(Term::new("HP:0001250", "Seizure"))
        .is_a("HP:0000118", "HP:0000001")
        .is_a("HP:0003011", "HP:0000118")
        .is_a("HP:0003198", "HP:0003011")
        .is_a("HP:0001252", "HP:0003011")
        .is_a("HP:0000707", "HP:0000118")
        .is_a("HP:0001250", "HP:0000707")
        .build("HP:0000001")
        .unwrap();
    Arc::new(graph)
}

fn seeded() -> PhenotypeTerm {
    PhenotypeTerm::new(
        Arc::new(Term::new("HP:0001252", "Hypotonia")),
        Span::empty(),
        true,
    )
}

fn session(miner: MockMiner) -> CurationSession {
    CurationSession::new(Arc::new(miner), "HP")
        .with_ontology(ontology())
        .unwrap()
        .with_curated(vec![seeded()])
}

#[tokio::test]
async fn failed_round_keeps_curated_set_and_allows_resubmission() {
    let miner = MockMiner::sequence(vec![
        Err(MiningError::Transport("connection refused".into())),
        Ok(PAYLOAD.to_string()),
    ]);
    let mut session = session(miner);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.on_event(Box::new(move |event| sink.lock().push(event)));

    let before = session.curated().clone();
    let token = session.submit(QUERY).unwrap();
    let outcome = session.next_completion().await.unwrap();
    assert_eq!(outcome, Err(MiningError::Transport("connection refused".into())));
    assert_eq!(session.curated(), &before);
    assert!(!session.is_busy());
    assert!(session.review().is_none());
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, SessionEvent::RoundFailed { token: t, .. } if *t == token)));

    let retry = session.submit(QUERY).unwrap();
    assert_ne!(retry, token);
    assert_eq!(session.next_completion().await, Some(Ok(retry)));
}

#[tokio::test]
async fn review_round_uses_ontology_names_and_curated_terms() {
    let mut session = session(MockMiner::always(PAYLOAD));
    session.submit(QUERY).unwrap();
    session.next_completion().await.unwrap().unwrap();

    let review = session.review_mut().unwrap();
    let names: Vec<_> = review
        .entries()
        .map(|(t, ticked)| (t.term.name.clone(), ticked))
        .collect();
    assert_eq!(
        names,
        vec![
            ("Hypotonia".to_string(), true),
            ("Myopathy".to_string(), false),
            ("Seizure".to_string(), false),
        ]
    );

    let markup = review.markup();
    assert!(markup.starts_with("Patient has <span"));
    assert!(markup.contains("onclick=\"focusOnTerm('HP:0003198')\">myopathy<span"));
    assert!(!markup.contains("MP:0000751"));

    let seizure = ConceptId::new("HP:0001250");
    review.reclassify(&seizure, false);
    review.set_approved(&seizure, false, true);

    let approved = session.finish(Signal::Done).unwrap();
    assert_eq!(approved.len(), 2);
    let keys: Vec<_> = session
        .curated()
        .iter()
        .map(|t| (t.id().to_string(), t.present))
        .collect();
    assert!(keys.contains(&("HP:0001252".to_string(), true)));
    assert!(keys.contains(&("HP:0001250".to_string(), false)));
    assert!(!keys.iter().any(|(id, _)| id == "HP:0003198"));
}

#[tokio::test]
async fn clicking_a_highlight_moves_the_tree() {
    let mut session = session(MockMiner::always(PAYLOAD));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.on_event(Box::new(move |event| sink.lock().push(event)));

    let nav = session.request_focus("HP:0003198").unwrap();
    assert!(nav.complete);
    let navigator = session.navigator().unwrap();
    assert_eq!(
        navigator.selected_term().map(|t| t.name.as_str()),
        Some("Myopathy")
    );

    assert!(session.request_focus("not an id").is_none());
    assert!(session.request_focus("HP:9999999").is_none());
    assert_eq!(
        session.navigator().unwrap().selected_term().map(|t| t.name.as_str()),
        Some("Myopathy")
    );
    assert_eq!(
        events.lock().as_slice(),
        &[
            SessionEvent::FocusRequested(ConceptId::new("HP:0003198")),
            SessionEvent::FocusRequested(ConceptId::new("HP:9999999")),
        ]
    );

    assert!(session.add_selected(false));
    assert!(!session.add_selected(false));
    assert_eq!(session.curated().len(), 2);
    assert_eq!(session.remove_curated(&ConceptId::new("HP:0003198"), false), 1);
}

#[tokio::test]
async fn unknown_search_has_no_effect() {
    let mut session = session(MockMiner::always("[]"));
    let navigator = session.navigator_mut().unwrap();
    navigator.search("Hypotonia").unwrap();
    let selected = navigator.selected();

    assert!(navigator.search("no such phenotype").is_none());
    assert_eq!(navigator.selected(), selected);
}
