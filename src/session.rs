use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    session_state::{SessionState, TOKEN_FIELD, TTL_FIELD},
    session_store::{SessionToken, StoreError},
};

/// Upper bound for a session lifetime, about 68 years.
pub const MAX_TTL_SECONDS: u64 = i32::MAX as u64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Bad creation key, or a session token that is missing, expired or unknown.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(#[from] StoreError),
}

/// A caller-supplied body, split into the reserved fields it may carry and
/// the remaining session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionPayload {
    token: Option<SessionToken>,
    ttl_seconds: Option<u64>,
    state: SessionState,
}

impl SessionPayload {
    pub fn token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn ttl_seconds(&self) -> Option<u64> {
        self.ttl_seconds
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub(crate) fn into_parts(self) -> (Option<SessionToken>, Option<u64>, SessionState) {
        (self.token, self.ttl_seconds, self.state)
    }
}

impl From<Map<String, Value>> for SessionPayload {
    fn from(fields: Map<String, Value>) -> Self {
        let token = fields
            .get(TOKEN_FIELD)
            .and_then(Value::as_str)
            .and_then(SessionToken::parse);
        let ttl_seconds = fields.get(TTL_FIELD).and_then(parse_ttl_seconds);
        Self {
            token,
            ttl_seconds,
            state: SessionState::from(fields),
        }
    }
}

/// Positive integers, or strings holding one. Anything else counts as absent.
fn parse_ttl_seconds(value: &Value) -> Option<u64> {
    let seconds = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    (seconds > 0).then(|| seconds.min(MAX_TTL_SECONDS))
}

/// A stored session. Serializes as one flat object: the state fields next to
/// `token`, `ttlSeconds` and `expiresAt`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    token: SessionToken,
    ttl_seconds: u64,
    expires_at: DateTime<Utc>,
    #[serde(flatten)]
    state: SessionState,
}

impl SessionRecord {
    pub(crate) fn new(
        token: SessionToken,
        ttl_seconds: u64,
        state: SessionState,
        now: DateTime<Utc>,
    ) -> Self {
        let ttl_seconds = ttl_seconds.clamp(1, MAX_TTL_SECONDS);
        Self {
            token,
            ttl_seconds,
            expires_at: expiry_from(now, ttl_seconds),
            state,
        }
    }

    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_seconds)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Restarts the expiry window from `now`.
    pub(crate) fn renew(&mut self, now: DateTime<Utc>) {
        self.expires_at = expiry_from(now, self.ttl_seconds);
    }

    /// Moves the session under a fresh token, used when a generated token
    /// turns out to be taken.
    pub(crate) fn reissue(&mut self, token: SessionToken, now: DateTime<Utc>) {
        self.token = token;
        self.renew(now);
    }

    pub(crate) fn set_ttl_seconds(&mut self, ttl_seconds: u64) {
        self.ttl_seconds = ttl_seconds.clamp(1, MAX_TTL_SECONDS);
    }

    pub(crate) fn replace_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn merge_state(&mut self, state: SessionState) {
        self.state.merge(state);
    }

    pub fn validity(&self) -> SessionValidity {
        SessionValidity {
            is_valid: true,
            expires_at: self.expires_at,
            ttl_seconds: self.ttl_seconds,
        }
    }
}

fn expiry_from(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(ttl_seconds as i64)
}

/// What `validate` reports: liveness and timing, never the payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidity {
    pub is_valid: bool,
    pub expires_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}
