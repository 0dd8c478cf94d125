//! Chat completion pipeline for parley
//!
//! Normalizes loosely shaped chat requests from a roleplay front-end,
//! enriches the prompt with persona, character and world-info context,
//! and forwards it to Gemini, OpenAI-compatible or OpenRouter upstreams.
//! Replies come back in the shape the caller declared, either as one body
//! or as a re-chunked event stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod assemble;
pub mod diagnostics;
pub mod error;
pub mod intent;
pub mod math;
pub mod normalize;
pub mod protocol;
pub mod provider;
pub mod respond;
#[cfg(feature = "http")]
pub mod router;
pub mod secrets;
pub mod state;
pub mod store;
pub mod transport;
pub mod types;

pub use error::{ChatError, UpstreamFailure};
#[cfg(feature = "http")]
pub use router::{GENERATE_PATH, OPENAI_PATH, chat_router};
pub use state::{ChatOutcome, ChatSettings, ChatState, Stores};
pub use types::{ChatRequest, Message, Reply, Role};
