//! Canonical per-request types
//!
//! Everything the pipeline passes between stages after the inbound payload
//! has been normalized. No value here outlives a single request.

pub mod message;
pub mod request;
pub mod response;

pub use message::{Message, Role};
pub use request::{ChatRequest, OpenRouterOptions};
pub use response::{Reply, ReplyOrigin, ReplyShape};
