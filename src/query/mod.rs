pub mod filter;
pub mod options;
pub mod request;

pub use filter::{parse_filter, CompareOp, FilterExpr};
pub use options::{resolve_denied, QueryDefaults, QueryOptions};
pub use request::{OrderBy, QueryRequest};
