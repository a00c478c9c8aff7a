//! Route table and router assembly.

pub mod binder;
mod common;

pub use binder::{build_router, describe_routes, RouteDescriptor, RouteTarget};
pub use common::common_routes;
