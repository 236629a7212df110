mod configuration;
mod session_token;
mod store;

pub use configuration::StoreConfiguration;
pub use session_token::SessionToken;
pub use store::{SetMode, Store, StoreError};
