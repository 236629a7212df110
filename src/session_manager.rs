use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    session::{SessionError, SessionPayload, SessionRecord, SessionValidity},
    session_store::{SessionToken, SetMode, Store, StoreError},
    settings::SessionSettings,
};

const MAX_TOKEN_ATTEMPTS: usize = 3;
const INVALID_TOKEN: &str = "Invalid or expired session token";

/// Owns the session lifecycle rules on top of an injected TTL store.
///
/// Creation is guarded by a creation key; every later operation is guarded by
/// the session token itself. Missing, expired and never-issued tokens all fail
/// the same way so callers cannot tell which tokens once existed.
pub struct SessionManager<S: Store> {
    store: S,
    settings: SessionSettings,
}

impl<S: Store> SessionManager<S> {
    pub fn new(store: S, settings: SessionSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn authorize(&self, creation_key: Option<&str>) -> Result<(), SessionError> {
        match creation_key {
            None | Some("") => Err(SessionError::Unauthorized(
                "Missing creation key".to_string(),
            )),
            Some(key) if self.settings.accepts(key) => Ok(()),
            Some(_) => Err(SessionError::Unauthorized(
                "Invalid creation key".to_string(),
            )),
        }
    }

    /// Issues a new session. A token carried in the payload is used verbatim
    /// but never replaces a live session.
    pub async fn create(
        &self,
        creation_key: Option<&str>,
        payload: SessionPayload,
    ) -> Result<SessionRecord, SessionError> {
        self.authorize(creation_key)?;

        let (token, ttl_seconds, state) = payload.into_parts();
        let ttl_seconds = ttl_seconds.unwrap_or(self.settings.default_ttl_seconds);

        if let Some(token) = token {
            let record = SessionRecord::new(token, ttl_seconds, state, Utc::now());
            if !self.write(&record, SetMode::IfAbsent).await? {
                warn!("Refused to create a session over a live caller-supplied token");
                return Err(SessionError::Unauthorized(
                    "Session token already in use".to_string(),
                ));
            }
            debug!(ttl_seconds = record.ttl_seconds(), "Session created");
            return Ok(record);
        }

        let mut record =
            SessionRecord::new(SessionToken::generate(), ttl_seconds, state, Utc::now());
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            if self.write(&record, SetMode::IfAbsent).await? {
                debug!(ttl_seconds = record.ttl_seconds(), "Session created");
                return Ok(record);
            }
            warn!(attempt, "Generated session token collided with a live session");
            record.reissue(SessionToken::generate(), Utc::now());
        }
        Err(SessionError::Internal(StoreError::BackendError(
            "Unable to allocate a unique session token".to_string(),
        )))
    }

    /// Returns the live session and slides its expiry window forward.
    pub async fn get(&self, token: &SessionToken) -> Result<SessionRecord, SessionError> {
        let mut record = self.load_live(token).await?;
        record.renew(Utc::now());
        self.rewrite(record).await
    }

    pub async fn validate(&self, token: &SessionToken) -> Result<SessionValidity, SessionError> {
        let record = self.get(token).await?;
        Ok(record.validity())
    }

    /// Replaces the whole state. `ttlSeconds` carries over unless given.
    pub async fn update(
        &self,
        token: &SessionToken,
        payload: SessionPayload,
    ) -> Result<SessionRecord, SessionError> {
        let mut record = self.load_live(token).await?;
        let (_, ttl_seconds, state) = payload.into_parts();
        record.replace_state(state);
        if let Some(ttl_seconds) = ttl_seconds {
            record.set_ttl_seconds(ttl_seconds);
        }
        record.renew(Utc::now());
        debug!(ttl_seconds = record.ttl_seconds(), "Session updated");
        self.rewrite(record).await
    }

    /// Merges the given fields onto the state; fields not given are kept.
    pub async fn patch(
        &self,
        token: &SessionToken,
        payload: SessionPayload,
    ) -> Result<SessionRecord, SessionError> {
        let mut record = self.load_live(token).await?;
        let (_, ttl_seconds, state) = payload.into_parts();
        record.merge_state(state);
        if let Some(ttl_seconds) = ttl_seconds {
            record.set_ttl_seconds(ttl_seconds);
        }
        record.renew(Utc::now());
        debug!(ttl_seconds = record.ttl_seconds(), "Session patched");
        self.rewrite(record).await
    }

    pub async fn delete(&self, token: &SessionToken) -> Result<(), SessionError> {
        if self.store.delete(token).await? {
            debug!("Session deleted");
            Ok(())
        } else {
            Err(SessionError::NotFound("Session not found".to_string()))
        }
    }

    async fn load_live(&self, token: &SessionToken) -> Result<SessionRecord, SessionError> {
        let body = self
            .store
            .get(token)
            .await?
            .ok_or_else(|| SessionError::Unauthorized(INVALID_TOKEN.to_string()))?;
        let record: SessionRecord = serde_json::from_str(&body).map_err(StoreError::from)?;
        if record.is_expired(Utc::now()) {
            debug!("Store returned a session past its expiry");
            return Err(SessionError::Unauthorized(INVALID_TOKEN.to_string()));
        }
        Ok(record)
    }

    /// Writes back a record that must still exist. A session deleted or
    /// expired in the meantime is not brought back.
    async fn rewrite(&self, record: SessionRecord) -> Result<SessionRecord, SessionError> {
        if self.write(&record, SetMode::IfPresent).await? {
            Ok(record)
        } else {
            Err(SessionError::Unauthorized(INVALID_TOKEN.to_string()))
        }
    }

    async fn write(&self, record: &SessionRecord, mode: SetMode) -> Result<bool, SessionError> {
        let body = serde_json::to_string(record).map_err(StoreError::from)?;
        let written = self
            .store
            .set(record.token(), body, record.ttl(), mode)
            .await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use serde_json::{json, Value};

    use super::*;
    use crate::{memory_store::MemoryStore, session_state::SessionState};

    const CREATION_KEY: &str = "test-creation-key";
    const DEFAULT_TTL: u64 = 60;

    fn manager() -> SessionManager<Arc<MemoryStore>> {
        SessionManager::new(
            Arc::new(MemoryStore::new()),
            SessionSettings::new([CREATION_KEY], DEFAULT_TTL),
        )
    }

    fn payload(value: Value) -> SessionPayload {
        match value {
            Value::Object(fields) => SessionPayload::from(fields),
            _ => panic!("expected a JSON object"),
        }
    }

    async fn create(manager: &SessionManager<Arc<MemoryStore>>, value: Value) -> SessionRecord {
        manager
            .create(Some(CREATION_KEY), payload(value))
            .await
            .expect("Unable to create session")
    }

    #[tokio::test]
    async fn create_then_get_returns_the_payload() {
        let manager = manager();
        let created = create(&manager, json!({"value": "x", "user": {"id": 7}})).await;

        let loaded = manager.get(created.token()).await.expect("Unable to get session");

        assert!(!loaded.token().as_ref().is_empty());
        assert_eq!(loaded.token(), created.token());
        assert_eq!(loaded.state(), created.state());
        assert_eq!(loaded.state().get("value"), Some(&json!("x")));
        assert_eq!(loaded.state().get("user"), Some(&json!({"id": 7})));
    }

    #[tokio::test]
    async fn create_issues_unique_tokens() {
        let manager = manager();
        let a = create(&manager, json!({})).await;
        let b = create(&manager, json!({})).await;
        assert_ne!(a.token(), b.token());
    }

    #[tokio::test]
    async fn create_with_invalid_creation_key_persists_nothing() {
        let manager = manager();

        let err = manager
            .create(Some("wrong-key"), payload(json!({"token": "guessed", "value": "x"})))
            .await
            .expect_err("expected create to fail");
        assert!(matches!(err, SessionError::Unauthorized(_)));

        let err = manager
            .create(None, payload(json!({"value": "x"})))
            .await
            .expect_err("expected create to fail");
        assert!(matches!(err, SessionError::Unauthorized(_)));

        let err = manager
            .create(Some(""), payload(json!({"value": "x"})))
            .await
            .expect_err("expected create to fail");
        assert!(matches!(err, SessionError::Unauthorized(_)));

        assert!(manager.store().is_empty());
        let err = manager
            .get(&SessionToken::from("guessed".to_string()))
            .await
            .expect_err("expected no session");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn create_does_not_echo_the_rejected_creation_key() {
        let manager = manager();
        let err = manager
            .create(Some("secret-guess"), SessionPayload::default())
            .await
            .expect_err("expected create to fail");
        assert!(!err.to_string().contains("secret-guess"));
    }

    #[tokio::test]
    async fn create_honours_the_given_ttl() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 10, "value": "x"})).await;

        let loaded = manager.get(created.token()).await.expect("Unable to get session");

        assert_eq!(loaded.ttl_seconds(), 10);
        assert_eq!(loaded.state().get("value"), Some(&json!("x")));
        assert!(!loaded.state().contains_key("ttlSeconds"));
    }

    #[tokio::test]
    async fn create_without_ttl_uses_the_default() {
        let manager = manager();
        let created = create(&manager, json!({"value": "x"})).await;
        assert_eq!(created.ttl_seconds(), DEFAULT_TTL);

        let expected = Utc::now() + chrono::Duration::seconds(DEFAULT_TTL as i64);
        let drift = (expected - created.expires_at()).num_seconds().abs();
        assert!(drift <= 1);
    }

    #[tokio::test]
    async fn create_ignores_a_caller_supplied_expiry() {
        let manager = manager();
        let created = create(&manager, json!({"expiresAt": "2000-01-01T00:00:00Z"})).await;
        assert!(created.expires_at() > Utc::now());
        assert!(!created.state().contains_key("expiresAt"));
    }

    #[tokio::test]
    async fn create_accepts_a_caller_supplied_token_once() {
        let manager = manager();
        let created = create(&manager, json!({"token": "my-token", "value": "first"})).await;
        assert_eq!(created.token().as_ref(), "my-token");

        let err = manager
            .create(
                Some(CREATION_KEY),
                payload(json!({"token": "my-token", "value": "second"})),
            )
            .await
            .expect_err("expected the live token to be refused");
        assert!(matches!(err, SessionError::Unauthorized(_)));

        let loaded = manager.get(created.token()).await.expect("Unable to get session");
        assert_eq!(loaded.state().get("value"), Some(&json!("first")));
    }

    #[tokio::test]
    async fn get_fails_once_the_ttl_has_passed() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 1})).await;

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let err = manager
            .get(created.token())
            .await
            .expect_err("expected the session to be expired");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn get_keeps_renewing_the_session() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 1, "value": "x"})).await;

        tokio::time::sleep(Duration::from_millis(600)).await;
        let first = manager.get(created.token()).await.expect("Unable to get session");
        assert!(first.expires_at() > created.expires_at());

        tokio::time::sleep(Duration::from_millis(600)).await;
        let second = manager.get(created.token()).await.expect("Unable to get session");
        assert_eq!(second.state().get("value"), Some(&json!("x")));
    }

    #[tokio::test]
    async fn get_treats_a_stale_record_as_missing() {
        let manager = manager();
        let token = SessionToken::generate();
        let stale = SessionRecord::new(
            token.clone(),
            5,
            SessionState::default(),
            Utc::now() - chrono::Duration::seconds(60),
        );
        manager
            .store()
            .set(
                &token,
                serde_json::to_string(&stale).unwrap(),
                Duration::from_secs(60),
                SetMode::Always,
            )
            .await
            .unwrap();

        let err = manager.get(&token).await.expect_err("expected stale record");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn validate_reports_timing_without_the_payload() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 30, "secret": "x"})).await;

        let validity = manager
            .validate(created.token())
            .await
            .expect("Unable to validate session");

        assert!(validity.is_valid);
        assert_eq!(validity.ttl_seconds, 30);
        assert!(validity.expires_at >= created.expires_at());
        let body = serde_json::to_value(&validity).unwrap();
        assert!(body.get("secret").is_none());
        assert_eq!(body["isValid"], json!(true));
    }

    #[tokio::test]
    async fn update_replaces_the_state_and_keeps_the_token() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 30, "a": 1, "b": 2})).await;

        let updated = manager
            .update(
                created.token(),
                payload(json!({"token": "hijacked", "c": 3})),
            )
            .await
            .expect("Unable to update session");

        assert_eq!(updated.token(), created.token());
        assert_eq!(updated.ttl_seconds(), 30);
        assert!(!updated.state().contains_key("a"));
        assert_eq!(updated.state().get("c"), Some(&json!(3)));

        let loaded = manager.get(created.token()).await.expect("Unable to get session");
        assert_eq!(loaded.token(), created.token());
        assert_eq!(loaded.state(), updated.state());
        let err = manager
            .get(&SessionToken::from("hijacked".to_string()))
            .await
            .expect_err("expected no hijacked session");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn update_can_shorten_the_ttl() {
        let manager = manager();
        let created = create(&manager, json!({"ttlSeconds": 600})).await;

        let updated = manager
            .update(created.token(), payload(json!({"ttlSeconds": 5})))
            .await
            .expect("Unable to update session");

        assert_eq!(updated.ttl_seconds(), 5);
        assert!(updated.expires_at() < created.expires_at());
    }

    #[tokio::test]
    async fn patch_merges_onto_the_existing_state() {
        let manager = manager();
        let created = create(&manager, json!({"b": 2})).await;

        let patched = manager
            .patch(created.token(), payload(json!({"a": 1})))
            .await
            .expect("Unable to patch session");

        assert_eq!(patched.state().get("a"), Some(&json!(1)));
        assert_eq!(patched.state().get("b"), Some(&json!(2)));
        assert_eq!(patched.ttl_seconds(), DEFAULT_TTL);
    }

    #[tokio::test]
    async fn patch_overrides_ttl_and_keeps_the_token() {
        let manager = manager();
        let created = create(&manager, json!({"a": 0})).await;

        let patched = manager
            .patch(
                created.token(),
                payload(json!({"a": 1, "ttlSeconds": "15", "token": "other"})),
            )
            .await
            .expect("Unable to patch session");

        assert_eq!(patched.token(), created.token());
        assert_eq!(patched.ttl_seconds(), 15);
        assert_eq!(patched.state().get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn delete_removes_the_session() {
        let manager = manager();
        let created = create(&manager, json!({"value": "x"})).await;

        manager
            .delete(created.token())
            .await
            .expect("Unable to delete session");

        let err = manager
            .get(created.token())
            .await
            .expect_err("expected the session to be gone");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_fail_alike() {
        let manager = manager();
        let expired = create(&manager, json!({"ttlSeconds": 1})).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let unknown = SessionToken::generate();

        for token in [expired.token(), &unknown] {
            let get = manager.get(token).await.expect_err("get");
            let validate = manager.validate(token).await.expect_err("validate");
            let update = manager
                .update(token, SessionPayload::default())
                .await
                .expect_err("update");
            let patch = manager
                .patch(token, SessionPayload::default())
                .await
                .expect_err("patch");
            let delete = manager.delete(token).await.expect_err("delete");

            for err in [get, validate, update, patch] {
                assert!(matches!(err, SessionError::Unauthorized(_)));
                assert_eq!(err.to_string(), format!("Unauthorized: {}", INVALID_TOKEN));
            }
            assert!(matches!(delete, SessionError::NotFound(_)));
        }
    }

    /// Drops the entry right after handing it out, like a delete landing
    /// between the read and the write-back.
    struct VanishingStore(MemoryStore);

    #[async_trait::async_trait]
    impl Store for VanishingStore {
        async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError> {
            let value = self.0.get(token).await?;
            self.0.delete(token).await?;
            Ok(value)
        }

        async fn set(
            &self,
            token: &SessionToken,
            value: String,
            ttl: Duration,
            mode: SetMode,
        ) -> Result<bool, StoreError> {
            self.0.set(token, value, ttl, mode).await
        }

        async fn refresh_expiry(
            &self,
            token: &SessionToken,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.0.refresh_expiry(token, ttl).await
        }

        async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError> {
            self.0.delete(token).await
        }
    }

    #[tokio::test]
    async fn renewal_does_not_resurrect_a_deleted_session() {
        let manager = SessionManager::new(
            VanishingStore(MemoryStore::new()),
            SessionSettings::new([CREATION_KEY], DEFAULT_TTL),
        );
        let created = manager
            .create(Some(CREATION_KEY), payload(json!({"value": "x"})))
            .await
            .expect("Unable to create session");

        let err = manager
            .get(created.token())
            .await
            .expect_err("expected the session to be gone");

        assert!(matches!(err, SessionError::Unauthorized(_)));
        assert!(manager.store().0.is_empty());
    }

    /// Reports the first `refusals` set-if-absent writes as taken keys.
    struct CollidingStore {
        inner: MemoryStore,
        refusals: AtomicUsize,
    }

    impl CollidingStore {
        fn new(refusals: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                refusals: AtomicUsize::new(refusals),
            }
        }
    }

    #[async_trait::async_trait]
    impl Store for CollidingStore {
        async fn get(&self, token: &SessionToken) -> Result<Option<String>, StoreError> {
            self.inner.get(token).await
        }

        async fn set(
            &self,
            token: &SessionToken,
            value: String,
            ttl: Duration,
            mode: SetMode,
        ) -> Result<bool, StoreError> {
            let refused = mode == SetMode::IfAbsent
                && self
                    .refusals
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if refused {
                return Ok(false);
            }
            self.inner.set(token, value, ttl, mode).await
        }

        async fn refresh_expiry(
            &self,
            token: &SessionToken,
            ttl: Duration,
        ) -> Result<bool, StoreError> {
            self.inner.refresh_expiry(token, ttl).await
        }

        async fn delete(&self, token: &SessionToken) -> Result<bool, StoreError> {
            self.inner.delete(token).await
        }
    }

    #[tokio::test]
    async fn create_retries_a_colliding_generated_token() {
        let manager = SessionManager::new(
            CollidingStore::new(MAX_TOKEN_ATTEMPTS - 1),
            SessionSettings::new([CREATION_KEY], DEFAULT_TTL),
        );

        let created = manager
            .create(Some(CREATION_KEY), payload(json!({"value": "x"})))
            .await
            .expect("Unable to create session");

        assert_eq!(manager.store().inner.len(), 1);
        let stored = manager
            .store()
            .get(created.token())
            .await
            .unwrap()
            .expect("expected the returned token to be stored");
        let stored: SessionRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.token(), created.token());
        assert_eq!(stored.state().get("value"), Some(&json!("x")));
    }

    #[tokio::test]
    async fn create_gives_up_after_repeated_token_collisions() {
        let manager = SessionManager::new(
            CollidingStore::new(MAX_TOKEN_ATTEMPTS),
            SessionSettings::new([CREATION_KEY], DEFAULT_TTL),
        );

        let err = manager
            .create(Some(CREATION_KEY), payload(json!({"value": "x"})))
            .await
            .expect_err("expected create to give up");

        assert!(matches!(err, SessionError::Internal(_)));
        assert!(manager.store().inner.is_empty());
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl Store for FailingStore {
        async fn get(&self, _token: &SessionToken) -> Result<Option<String>, StoreError> {
            Err(StoreError::BackendError("connection refused".to_string()))
        }

        async fn set(
            &self,
            _token: &SessionToken,
            _value: String,
            _ttl: Duration,
            _mode: SetMode,
        ) -> Result<bool, StoreError> {
            Err(StoreError::BackendError("connection refused".to_string()))
        }

        async fn refresh_expiry(
            &self,
            _token: &SessionToken,
            _ttl: Duration,
        ) -> Result<bool, StoreError> {
            Err(StoreError::BackendError("connection refused".to_string()))
        }

        async fn delete(&self, _token: &SessionToken) -> Result<bool, StoreError> {
            Err(StoreError::BackendError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failures_surface_as_internal() {
        let manager =
            SessionManager::new(FailingStore, SessionSettings::new([CREATION_KEY], DEFAULT_TTL));
        let token = SessionToken::generate();

        let create = manager
            .create(Some(CREATION_KEY), SessionPayload::default())
            .await
            .expect_err("create");
        let get = manager.get(&token).await.expect_err("get");
        let delete = manager.delete(&token).await.expect_err("delete");

        for err in [create, get, delete] {
            assert!(matches!(err, SessionError::Internal(_)));
        }
    }

    #[tokio::test]
    async fn invalid_creation_key_is_checked_before_the_store() {
        let manager =
            SessionManager::new(FailingStore, SessionSettings::new([CREATION_KEY], DEFAULT_TTL));
        let err = manager
            .create(Some("nope"), SessionPayload::default())
            .await
            .expect_err("expected create to fail");
        assert!(matches!(err, SessionError::Unauthorized(_)));
    }
}
