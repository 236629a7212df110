//! Token-based session service.
//!
//! A caller holding a creation key opens a session and receives an opaque
//! token; the token then reads, replaces, patches, validates or deletes the
//! session. Every successful access slides the expiry window forward. Expiry
//! itself is left to the backing [`Store`].

pub mod http;
pub mod memory_store;
pub mod redis_store;
mod session;
mod session_manager;
mod session_state;
mod session_store;
pub mod settings;

pub use memory_store::MemoryStore;
pub use redis_store::{RedisDatabase, RedisError};
pub use session::{SessionError, SessionPayload, SessionRecord, SessionValidity, MAX_TTL_SECONDS};
pub use session_manager::SessionManager;
pub use session_state::SessionState;
pub use session_store::{SessionToken, SetMode, Store, StoreConfiguration, StoreError};
pub use settings::{SessionSettings, Settings, SettingsError};
