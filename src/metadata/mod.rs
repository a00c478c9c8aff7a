pub mod model;
pub mod resolver;

pub use model::*;
pub use resolver::{AutoGenerate, MetadataResolver};
