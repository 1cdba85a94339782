use thiserror::Error;

/// Transport-level failures. These invalidate all subscriptions and surface a
/// `Failed` connection state; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("heartbeat timed out after {0} ms of silence")]
    HeartbeatTimeout(u64),
    #[error("websocket error: {0}")]
    Io(String),
    #[error("server error frame: {0}")]
    Rejected(String),
}

/// A frame that could not be turned into a `ChatMessage`. The frame is
/// dropped and logged; the pipeline keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized destination {0:?}")]
    UnknownDestination(String),
    #[error("malformed STOMP frame: {0}")]
    MalformedFrame(String),
    #[error("malformed message payload: {0}")]
    BadPayload(#[from] serde_json::Error),
}

/// Server rejected a subscription. The registry entry is discarded; the
/// caller re-issues the join the next time the relevant screen activates.
#[derive(Debug, Error)]
#[error("subscription {subscription_id} rejected: {reason}")]
pub struct SubscriptionError {
    pub subscription_id: String,
    pub reason: String,
}

/// REST collaborator failures.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("api returned code {code}: {message}")]
    Server { code: i32, message: String },
    #[error("api response missing data payload")]
    MissingData,
}
