//! Types shared between the parley feature crates and the server layer

mod context;
mod error;

pub use context::{GUEST_USER, RequestContext, decode_hint};
pub use error::HttpError;
