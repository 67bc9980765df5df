//! Mining service clients.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use url::Url;

use crate::config::MiningConfig;
use crate::error::MiningError;

pub const REQUEST_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// One request per call: query text in, raw payload out.
#[async_trait]
pub trait Miner: Send + Sync {
    async fn mine(&self, query: &str) -> Result<String, MiningError>;
}

// ============================================================================
// HTTP client
// ============================================================================

pub struct MiningClient {
    client: Client,
    endpoint: Url,
}

impl MiningClient {
    pub fn new(config: &MiningConfig) -> Result<Self, MiningError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| MiningError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Miner for MiningClient {
    async fn mine(&self, query: &str) -> Result<String, MiningError> {
        tracing::debug!(endpoint = %self.endpoint, chars = query.chars().count(), "mining request");

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, REQUEST_CONTENT_TYPE)
            .header(ACCEPT, "application/json")
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| MiningError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MiningError::Protocol {
                status: Some(status.as_u16()),
                message: truncate(&body, 200),
            });
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default();
            if !content_type.to_ascii_lowercase().contains("json") {
                return Err(MiningError::Protocol {
                    status: Some(status.as_u16()),
                    message: format!("unexpected content type {content_type:?}"),
                });
            }
        }

        response
            .text()
            .await
            .map_err(|e| MiningError::Transport(e.to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ============================================================================
// Mock
// ============================================================================

/// Canned miner for tests. Replies are served in order; the last one repeats
/// once the queue is down to a single entry.
pub struct MockMiner {
    replies: Mutex<VecDeque<Result<String, MiningError>>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockMiner {
    pub fn sequence(replies: Vec<Result<String, MiningError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn always(payload: &str) -> Self {
        Self::sequence(vec![Ok(payload.to_string())])
    }

    pub fn failing(error: MiningError) -> Self {
        Self::sequence(vec![Err(error)])
    }

    /// Sleep before answering, so a round stays in flight for a while.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Miner for MockMiner {
    async fn mine(&self, query: &str) -> Result<String, MiningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut replies = self.replies.lock();
        match replies.len() {
            0 => Ok("[]".to_string()),
            1 => replies[0].clone(),
            _ => replies.pop_front().unwrap_or_else(|| Ok("[]".to_string())),
        }
    }
}
