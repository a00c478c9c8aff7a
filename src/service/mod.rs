//! Persistence engine and read side over a request-scoped [`Session`].

pub mod graph;
pub mod query;
mod session;

pub use session::{EntryId, EntryState, Session};
