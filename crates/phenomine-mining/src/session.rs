//! Curation session: one dialog's worth of mining rounds.
//!
//! ```text
//!   submit ──► tokio::spawn(mine + decode) ──► mpsc (RoundToken, outcome)
//!                                                   │
//!   next_completion / try_process ◄─────────────────┘
//!        │ token == current round?
//!        ├─ no  ──► discarded
//!        └─ yes ──► Reviewing(ReviewRound) ──finish(Signal)──► Idle
//! ```
//!
//! The session owns every piece of interactive state: the curated set, the
//! tree navigator and the current round. The background task only ever
//! talks back through the channel, tagged with the token of the round that
//! spawned it, so a late answer for a cancelled round cannot touch state.

use std::fmt;
use std::sync::Arc;

use phenomine_core::{
    resolve_focus, AnnotationSet, ConceptId, GraphQuery, MinedConcept, Navigation,
    NavigationError, ParentPolicy, PhenotypeTerm, Span, TreeNavigator,
};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use crate::client::{Miner, MiningClient};
use crate::config::MiningConfig;
use crate::decode::decode;
use crate::error::{MiningError, SessionError};
use crate::review::{ReviewRound, Signal};

/// Identifies one mining round within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoundToken(u64);

impl RoundToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round-{}", self.0)
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RoundStarted { token: RoundToken },
    /// Mining succeeded and the round is under review.
    RoundCompleted { token: RoundToken, concepts: usize },
    RoundFailed { token: RoundToken, error: MiningError },
    ReviewFinished(Signal),
    /// A highlighted concept was clicked.
    FocusRequested(ConceptId),
}

pub type SessionEventHandler = Box<dyn Fn(SessionEvent) + Send + Sync>;

/// What the background task sends back.
#[derive(Debug)]
pub struct RoundMessage {
    pub token: RoundToken,
    pub outcome: Result<Vec<MinedConcept>, MiningError>,
}

enum RoundState {
    Idle,
    Mining {
        token: RoundToken,
        query: String,
        handle: JoinHandle<()>,
    },
    Reviewing(ReviewRound),
}

async fn mine_round(
    miner: Arc<dyn Miner>,
    query: String,
    vocabulary: String,
) -> Result<Vec<MinedConcept>, MiningError> {
    let payload = miner.mine(&query).await?;
    decode(&payload, &query, &vocabulary)
}

/// Aborts the mining work when the round's task is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ============================================================================
// Session
// ============================================================================

pub struct CurationSession {
    miner: Arc<dyn Miner>,
    vocabulary: String,
    policy: ParentPolicy,
    navigator: Option<TreeNavigator>,
    curated: AnnotationSet,
    state: RoundState,
    next_token: u64,
    tx: mpsc::UnboundedSender<RoundMessage>,
    rx: mpsc::UnboundedReceiver<RoundMessage>,
    handlers: Vec<SessionEventHandler>,
    closed: bool,
}

impl CurationSession {
    pub fn new(miner: Arc<dyn Miner>, vocabulary: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            miner,
            vocabulary: vocabulary.into(),
            policy: ParentPolicy::default(),
            navigator: None,
            curated: AnnotationSet::new(),
            state: RoundState::Idle,
            next_token: 1,
            tx,
            rx,
            handlers: Vec::new(),
            closed: false,
        }
    }

    /// HTTP-backed session using the configured endpoint, vocabulary and
    /// parent policy.
    pub fn from_config(config: &MiningConfig) -> Result<Self, MiningError> {
        let client = MiningClient::new(config)?;
        Ok(Self::new(Arc::new(client), config.vocabulary_prefix.clone())
            .with_parent_policy(config.parent_policy))
    }

    /// Applies to the attached ontology and to any attached later.
    pub fn with_parent_policy(mut self, policy: ParentPolicy) -> Self {
        self.policy = policy;
        if let Some(navigator) = self.navigator.as_mut() {
            navigator.set_policy(policy);
        }
        self
    }

    pub fn with_ontology(mut self, graph: Arc<dyn GraphQuery>) -> Result<Self, NavigationError> {
        self.navigator = Some(TreeNavigator::with_policy(graph, self.policy)?);
        Ok(self)
    }

    /// Pre-seed the curated set.
    pub fn with_curated(mut self, terms: impl IntoIterator<Item = PhenotypeTerm>) -> Self {
        self.curated.extend(terms);
        self
    }

    pub fn on_event(&mut self, handler: SessionEventHandler) {
        self.handlers.push(handler);
    }

    fn emit(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }

    // ========================================================================
    // Round control
    // ========================================================================

    /// True while a mining request is in flight. Callers disable
    /// re-submission while busy.
    pub fn is_busy(&self) -> bool {
        matches!(self.state, RoundState::Mining { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn current_round(&self) -> Option<RoundToken> {
        match &self.state {
            RoundState::Idle => None,
            RoundState::Mining { token, .. } => Some(*token),
            RoundState::Reviewing(round) => Some(round.token()),
        }
    }

    /// The query text of the round in flight.
    pub fn pending_query(&self) -> Option<&str> {
        match &self.state {
            RoundState::Mining { query, .. } => Some(query),
            _ => None,
        }
    }

    /// Start a mining round in the background. Must be called from within a
    /// Tokio runtime.
    pub fn submit(&mut self, query: impl Into<String>) -> Result<RoundToken, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        match self.state {
            RoundState::Idle => {}
            RoundState::Mining { .. } => return Err(SessionError::Busy),
            RoundState::Reviewing(_) => return Err(SessionError::ReviewPending),
        }

        let token = RoundToken(self.next_token);
        self.next_token += 1;
        let query = query.into();

        let miner = Arc::clone(&self.miner);
        let vocabulary = self.vocabulary.clone();
        let tx = self.tx.clone();
        let task_query = query.clone();
        let handle = tokio::spawn(async move {
            let work = tokio::spawn(mine_round(miner, task_query, vocabulary));
            let _guard = AbortOnDrop(work.abort_handle());
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(%token, error = %err, "mining task died");
                    Err(MiningError::Transport(format!("mining task failed: {err}")))
                }
            };
            // The receiver is gone once the session is dropped.
            let _ = tx.send(RoundMessage { token, outcome });
        });

        tracing::info!(%token, chars = query.chars().count(), "mining round started");
        self.state = RoundState::Mining {
            token,
            query,
            handle,
        };
        self.emit(SessionEvent::RoundStarted { token });
        Ok(token)
    }

    /// Wait for the round in flight to complete. Returns `None` when nothing
    /// is in flight.
    pub async fn next_completion(&mut self) -> Option<Result<RoundToken, MiningError>> {
        while self.is_busy() {
            let message = self.rx.recv().await?;
            if let Some(result) = self.handle(message) {
                return Some(result);
            }
        }
        None
    }

    /// Apply whatever messages have already arrived without waiting.
    /// Returns how many messages were consumed, stale ones included.
    pub fn try_process(&mut self) -> usize {
        let mut consumed = 0;
        while let Ok(message) = self.rx.try_recv() {
            consumed += 1;
            self.handle(message);
        }
        consumed
    }

    /// Apply one background message. Messages for anything but the round in
    /// flight are discarded and yield `None`.
    pub fn handle(&mut self, message: RoundMessage) -> Option<Result<RoundToken, MiningError>> {
        let current = match &self.state {
            RoundState::Mining { token, .. } if !self.closed => *token,
            _ => {
                tracing::debug!(token = %message.token, "discarding message for inactive round");
                return None;
            }
        };
        if message.token != current {
            tracing::debug!(
                token = %message.token,
                current = %current,
                "discarding stale round message"
            );
            return None;
        }

        let query = match std::mem::replace(&mut self.state, RoundState::Idle) {
            RoundState::Mining { query, .. } => query,
            _ => String::new(),
        };

        match message.outcome {
            Ok(concepts) => {
                let count = concepts.len();
                let mined: Vec<PhenotypeTerm> =
                    concepts.into_iter().map(|c| self.resolve(c)).collect();
                // Curated spans belong to the texts they were mined from.
                let carried = self
                    .curated
                    .iter()
                    .map(|t| PhenotypeTerm::new(Arc::clone(&t.term), Span::empty(), t.present));
                let annotations = AnnotationSet::merge(mined, carried);
                let preapproved: Vec<(ConceptId, bool)> = self
                    .curated
                    .iter()
                    .map(|t| (t.id().clone(), t.present))
                    .collect();

                tracing::info!(token = %current, concepts = count, "mining round ready for review");
                self.state = RoundState::Reviewing(ReviewRound::new(
                    current,
                    query,
                    annotations,
                    preapproved,
                ));
                self.emit(SessionEvent::RoundCompleted {
                    token: current,
                    concepts: count,
                });
                Some(Ok(current))
            }
            Err(error) => {
                tracing::warn!(token = %current, error = %error, "mining round failed");
                self.emit(SessionEvent::RoundFailed {
                    token: current,
                    error: error.clone(),
                });
                Some(Err(error))
            }
        }
    }

    /// Use the ontology's term when it knows the id, so names match the tree.
    fn resolve(&self, concept: MinedConcept) -> PhenotypeTerm {
        let known = self
            .navigator
            .as_ref()
            .and_then(|nav| nav.graph().term_for_id(&concept.term.id));
        match known {
            Some(term) => PhenotypeTerm::new(term, concept.span, true),
            None => PhenotypeTerm::from(concept),
        }
    }

    // ========================================================================
    // Review
    // ========================================================================

    pub fn review(&self) -> Option<&ReviewRound> {
        match &self.state {
            RoundState::Reviewing(round) => Some(round),
            _ => None,
        }
    }

    pub fn review_mut(&mut self) -> Option<&mut ReviewRound> {
        match &mut self.state {
            RoundState::Reviewing(round) => Some(round),
            _ => None,
        }
    }

    /// End the round under review. `Done` adds the ticked terms not already
    /// curated to the curated set and returns every ticked term; `Cancelled`
    /// discards the round.
    pub fn finish(&mut self, signal: Signal) -> Result<Vec<PhenotypeTerm>, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let round = match std::mem::replace(&mut self.state, RoundState::Idle) {
            RoundState::Reviewing(round) => round,
            other => {
                self.state = other;
                return Err(SessionError::NoActiveReview);
            }
        };

        let approved = match signal {
            Signal::Done => {
                let approved = round.approved();
                for term in &approved {
                    if !self.curated.contains_key(term.id(), term.present) {
                        self.curated.insert(term.clone());
                    }
                }
                approved
            }
            Signal::Cancelled => Vec::new(),
        };
        tracing::info!(
            token = %round.token(),
            ?signal,
            approved = approved.len(),
            "review finished"
        );
        self.emit(SessionEvent::ReviewFinished(signal));
        Ok(approved)
    }

    /// Drop the current round, whether in flight or under review. Returns
    /// false when there was nothing to cancel.
    pub fn cancel_round(&mut self) -> bool {
        match std::mem::replace(&mut self.state, RoundState::Idle) {
            RoundState::Idle => false,
            RoundState::Mining { token, handle, .. } => {
                handle.abort();
                tracing::info!(%token, "mining round cancelled");
                self.emit(SessionEvent::ReviewFinished(Signal::Cancelled));
                true
            }
            RoundState::Reviewing(round) => {
                tracing::info!(token = %round.token(), "review cancelled");
                self.emit(SessionEvent::ReviewFinished(Signal::Cancelled));
                true
            }
        }
    }

    /// Tear the session down. Any round is aborted, the tree cache is
    /// released and later messages are ignored. The curated set stays
    /// readable.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.cancel_round();
        self.navigator = None;
        self.closed = true;
        while self.rx.try_recv().is_ok() {}
        tracing::debug!("curation session closed");
    }

    // ========================================================================
    // Navigation and curated set
    // ========================================================================

    pub fn navigator(&self) -> Option<&TreeNavigator> {
        self.navigator.as_ref()
    }

    pub fn navigator_mut(&mut self) -> Option<&mut TreeNavigator> {
        self.navigator.as_mut()
    }

    /// Handle a click on a highlighted concept: tell listeners and move the
    /// tree to the term. Malformed ids and unreachable terms are logged and
    /// leave the selection alone.
    pub fn request_focus(&mut self, raw: &str) -> Option<Navigation> {
        let id = resolve_focus(raw)?;
        self.emit(SessionEvent::FocusRequested(id.clone()));
        self.navigator.as_mut()?.focus(&id).ok()
    }

    pub fn curated(&self) -> &AnnotationSet {
        &self.curated
    }

    pub fn add_curated(&mut self, term: PhenotypeTerm) -> bool {
        self.curated.insert(term)
    }

    pub fn remove_curated(&mut self, id: &ConceptId, present: bool) -> usize {
        self.curated.remove(id, present)
    }

    /// Add the term selected in the tree to the curated set.
    pub fn add_selected(&mut self, present: bool) -> bool {
        let term = self
            .navigator
            .as_ref()
            .and_then(|nav| nav.selected_phenotype(present));
        match term {
            Some(term) => self.curated.insert(term),
            None => false,
        }
    }
}

impl Drop for CurationSession {
    fn drop(&mut self) {
        if let RoundState::Mining { handle, .. } = &self.state {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMiner;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use phenomine_core::{MemoryOntology, Span, Term};
    use std::time::Duration;

    struct Crashing;

    #[async_trait]
    impl Miner for Crashing {
        async fn mine(&self, _query: &str) -> Result<String, MiningError> {
            panic!("miner crashed");
        }
    }

    const QUERY: &str = "Patient has myopathy.";
    const PAYLOAD: &str =
        r#"[{"token":{"id":"HP:0003198","terms":["myopathy"]},"start":12,"end":20}]"#;

    fn mined(id: &str, start: usize, end: usize) -> MinedConcept {
        MinedConcept {
            span: Span::new(start, end).unwrap(),
            term: Term::new(id, "mined"),
            matched_text: String::new(),
        }
    }

    fn recording(session: &mut CurationSession) -> Arc<Mutex<Vec<SessionEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.on_event(Box::new(move |event| sink.lock().push(event)));
        events
    }

    #[tokio::test]
    async fn stale_messages_are_discarded() {
        let miner = Arc::new(MockMiner::always("[]").with_delay(Duration::from_secs(30)));
        let mut session = CurationSession::new(miner, "HP");

        let first = session.submit(QUERY).unwrap();
        assert!(session.cancel_round());
        let second = session.submit(QUERY).unwrap();
        assert_ne!(first, second);

        let late = RoundMessage {
            token: first,
            outcome: Ok(vec![mined("HP:1", 0, 7)]),
        };
        assert_eq!(session.handle(late), None);
        assert!(session.is_busy());
        assert_eq!(session.current_round(), Some(second));

        let current = RoundMessage {
            token: second,
            outcome: Ok(vec![mined("HP:2", 0, 7)]),
        };
        assert_eq!(session.handle(current), Some(Ok(second)));
        let ids: Vec<_> = session
            .review()
            .unwrap()
            .annotations()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["HP:2"]);
    }

    #[tokio::test]
    async fn busy_and_review_block_resubmission() {
        let miner = Arc::new(MockMiner::always(PAYLOAD).with_delay(Duration::from_millis(20)));
        let mut session = CurationSession::new(miner, "HP");

        session.submit(QUERY).unwrap();
        assert_eq!(session.submit(QUERY), Err(SessionError::Busy));
        assert_eq!(session.pending_query(), Some(QUERY));

        let token = session.next_completion().await.unwrap().unwrap();
        assert_eq!(session.submit(QUERY), Err(SessionError::ReviewPending));
        assert_eq!(session.review().unwrap().token(), token);

        session.finish(Signal::Cancelled).unwrap();
        assert!(session.submit(QUERY).is_ok());
    }

    #[tokio::test]
    async fn done_merges_ticked_terms_into_curated_set() {
        let miner = Arc::new(MockMiner::always(PAYLOAD));
        let mut session = CurationSession::new(miner, "HP");
        let events = recording(&mut session);

        let token = session.submit(QUERY).unwrap();
        assert_eq!(session.next_completion().await, Some(Ok(token)));

        let review = session.review_mut().unwrap();
        assert_eq!(review.toggle(&ConceptId::new("HP:0003198"), true), Some(true));

        let approved = session.finish(Signal::Done).unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(session.curated().len(), 1);
        assert_eq!(session.finish(Signal::Done), Err(SessionError::NoActiveReview));

        assert_eq!(
            *events.lock(),
            vec![
                SessionEvent::RoundStarted { token },
                SessionEvent::RoundCompleted { token, concepts: 1 },
                SessionEvent::ReviewFinished(Signal::Done),
            ]
        );
    }

    #[tokio::test]
    async fn closed_session_ignores_everything() {
        let miner = Arc::new(MockMiner::always(PAYLOAD).with_delay(Duration::from_secs(30)));
        let mut session = CurationSession::new(miner, "HP").with_curated(vec![PhenotypeTerm::new(
            Arc::new(Term::new("HP:0001252", "Hypotonia")),
            Span::empty(),
            true,
        )]);

        let token = session.submit(QUERY).unwrap();
        session.close();
        assert!(session.is_closed());
        assert!(!session.is_busy());
        assert_eq!(session.submit(QUERY), Err(SessionError::Closed));
        assert_eq!(
            session.handle(RoundMessage {
                token,
                outcome: Ok(Vec::new())
            }),
            None
        );
        assert_eq!(session.curated().len(), 1);
        assert_eq!(session.next_completion().await, None);
    }

    #[tokio::test]
    async fn panicking_miner_fails_the_round() {
        let mut session = CurationSession::new(Arc::new(Crashing), "HP");
        let token = session.submit(QUERY).unwrap();

        let outcome = session.next_completion().await;
        assert!(matches!(outcome, Some(Err(MiningError::Transport(_)))), "{outcome:?}");
        assert!(!session.is_busy());
        assert!(session.submit(QUERY).unwrap() > token);
    }

    #[test]
    fn parent_policy_reaches_attached_navigator() {
        let graph = MemoryOntology::builder()
            .term(Term::new("HP:0000001", "All"))
            .build("HP:0000001")
            .unwrap();
        let session = CurationSession::new(Arc::new(MockMiner::always("[]")), "HP")
            .with_ontology(Arc::new(graph))
            .unwrap()
            .with_parent_policy(ParentPolicy::LowestId);
        assert_eq!(session.navigator().unwrap().policy(), ParentPolicy::LowestId);
    }
}
