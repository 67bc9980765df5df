/// Terminal failures of one mining round. Any of these ends the round with
/// no annotations; the curated set is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MiningError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected response from mining service (status {status:?}): {message}")]
    Protocol { status: Option<u16>, message: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a mining round is already in flight")]
    Busy,
    #[error("the previous round is still under review")]
    ReviewPending,
    #[error("no round is under review")]
    NoActiveReview,
    #[error("the session has been closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
