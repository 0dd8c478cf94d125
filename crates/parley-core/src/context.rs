use http::HeaderMap;

/// Scope used when the auth layer did not identify a user
pub const GUEST_USER: &str = "guest";

/// Runtime context for a single chat request
///
/// Built by the server middleware from the inbound HTTP request. Carries
/// only values the auth layer or caller put on the wire; nothing here is
/// shared between requests.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// User identified by the external auth layer
    pub user_id: Option<String>,
    /// Out-of-band copy of the freshest user utterance
    pub latest_hint: Option<String>,
}

impl RequestContext {
    /// Create a minimal context for embedded (non-HTTP) use
    ///
    /// Contains empty headers, no user and no hint
    ///
    /// # Panics
    ///
    /// Panics if the static request parts fail to build (should never happen).
    pub fn empty() -> Self {
        let (parts, ()) = http::Request::builder()
            .method(http::Method::POST)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self {
            parts,
            user_id: None,
            latest_hint: None,
        }
    }

    /// Attach a user id
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Attach an out-of-band latest-user hint
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.latest_hint = Some(hint.into());
        self
    }

    /// Access request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// User scope for store lookups, falling back to `guest`
    pub fn user_scope<'a>(&'a self, guest: &'a str) -> &'a str {
        self.user_id.as_deref().filter(|u| !u.is_empty()).unwrap_or(guest)
    }

    /// Primary language tag from `Accept-Language`, if any
    pub fn accept_language(&self) -> Option<&str> {
        let raw = self.headers().get(http::header::ACCEPT_LANGUAGE)?.to_str().ok()?;
        raw.split(',')
            .next()
            .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
            .filter(|tag| !tag.is_empty())
    }
}

/// Decode a percent-encoded hint header value
///
/// Clients send the hint through `encodeURIComponent`, so the value
/// never contains a literal `&` or `+`. Blank results are dropped.
pub fn decode_hint(raw: &str) -> Option<String> {
    let query = format!("h={raw}");
    let decoded = url::form_urlencoded::parse(query.as_bytes())
        .next()
        .map(|(_, value)| value.trim().to_owned())?;

    if decoded.is_empty() { None } else { Some(decoded) }
}
