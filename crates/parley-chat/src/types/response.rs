/// Wire shape of the reply sent back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// `chat.completion` and `chat.completion.chunk` objects
    OpenAi,
    /// Gemini `candidates` objects
    Google,
}

/// Where the reply text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOrigin {
    Upstream,
    Demo,
    /// Local arithmetic, no upstream call
    ShortCircuit,
    /// Local arithmetic after the upstream failed
    LastResort,
    /// Upstream answered with nothing usable
    BlankFallback,
}

/// Final reply before rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub model: String,
    pub shape: ReplyShape,
    pub origin: ReplyOrigin,
    /// Characters sent upstream, for usage approximation
    pub prompt_chars: usize,
}
