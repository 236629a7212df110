use crate::SessionToken;

type KeyGen = dyn Fn(&SessionToken) -> String + Send + Sync;

/// Maps session tokens onto keys of the backing store.
pub struct StoreConfiguration {
    key_gen: Box<KeyGen>,
}

impl StoreConfiguration {
    pub fn with_key_prefix(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            key_gen: Box::new(move |v| format!("{}{}", prefix, v.as_ref())),
        }
    }

    pub fn key_gen(&self) -> &KeyGen {
        &self.key_gen
    }
}

impl Default for StoreConfiguration {
    fn default() -> Self {
        Self {
            key_gen: Box::new(|v| v.as_ref().to_owned()),
        }
    }
}
