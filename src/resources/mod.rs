//! Resource adapters: the third Capability Entry kind (§3, §4.2).

pub mod builtin;
pub mod traits;

pub use builtin::{ConversationResource, ErrorsResource, SchemaResource};
pub use traits::{ResourceAdapter, ResourceMeta};
