//! Safe parameterized SQL for the PostgreSQL store.

mod builder;
mod params;

pub use builder::*;
pub use params::PgBindValue;
