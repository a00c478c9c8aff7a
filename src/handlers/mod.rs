//! HTTP handlers for entity CRUD and declared operations.

pub mod entity;
pub mod operation;

pub use operation::{FnHandler, HandlerRegistry, OperationHandler, OperationRequest};
