pub mod json_store;
pub mod schema;
pub mod session_store;

pub use json_store::JsonStore;
pub use session_store::{InMemorySessionStore, SessionError, SessionStore};
