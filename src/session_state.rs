use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) const TOKEN_FIELD: &str = "token";
pub(crate) const TTL_FIELD: &str = "ttlSeconds";
pub(crate) const EXPIRES_AT_FIELD: &str = "expiresAt";

const RESERVED_FIELDS: [&str; 3] = [TOKEN_FIELD, TTL_FIELD, EXPIRES_AT_FIELD];

/// Caller-owned fields of a session. Never holds a reserved field.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionState(Map<String, Value>);

impl SessionState {
    pub fn is_reserved(key: &str) -> bool {
        RESERVED_FIELDS.contains(&key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies every field of `other` onto `self`; fields of `other` win.
    pub fn merge(&mut self, other: SessionState) {
        self.0.extend(other.0);
    }
}

impl From<Map<String, Value>> for SessionState {
    fn from(mut fields: Map<String, Value>) -> Self {
        for key in RESERVED_FIELDS {
            fields.remove(key);
        }
        Self(fields)
    }
}

impl From<SessionState> for Map<String, Value> {
    fn from(state: SessionState) -> Self {
        state.0
    }
}
