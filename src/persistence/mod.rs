//! Persistence Layer (C1): pooled connections to an embedded SQL store, with
//! schemas for messages, tool errors, and summaries (§4.1).

pub mod models;
pub mod pool;
pub mod store;

pub use models::{Message, Role, SessionSummary, SummaryRecord, ToolErrorRecord};
pub use pool::ConnectionPool;
pub use store::Store;
