use std::fmt::{Display, Formatter};

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

const TOKEN_LENGTH: usize = 64;

/// Opaque identifier of a session record. Doubles as the bearer credential
/// for every operation after creation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl Display for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SessionToken {
    pub fn generate() -> Self {
        let value = std::iter::repeat(())
            .map(|()| OsRng.sample(Alphanumeric))
            .map(char::from)
            .take(TOKEN_LENGTH)
            .collect::<String>();
        Self(value)
    }

    /// Accepts a caller-supplied token verbatim. Empty strings are refused.
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() {
            None
        } else {
            Some(Self(value.to_owned()))
        }
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}
