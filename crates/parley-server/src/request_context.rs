use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use http::{HeaderMap, HeaderName};
use parley_core::{RequestContext, decode_hint};

/// Inbound header names the middleware reads
#[derive(Debug, Clone)]
pub struct ContextHeaders {
    pub user: HeaderName,
    pub hint: HeaderName,
}

impl ContextHeaders {
    /// Parse the configured header names
    ///
    /// # Errors
    ///
    /// Returns an error if either name is not a valid HTTP header name
    pub fn new(user: &str, hint: &str) -> anyhow::Result<Self> {
        Ok(Self {
            user: HeaderName::try_from(user)?,
            hint: HeaderName::try_from(hint)?,
        })
    }
}

/// Middleware that constructs a `RequestContext` from the incoming request
///
/// The user id comes from the header set by the external auth layer; the
/// hint header carries a percent-encoded copy of the latest user utterance.
pub async fn request_context_middleware(headers: Arc<ContextHeaders>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    let user_id = header_text(&parts.headers, &headers.user).map(str::to_owned);
    let latest_hint = header_text(&parts.headers, &headers.hint).and_then(decode_hint);

    let context = RequestContext {
        parts: parts.clone(),
        user_id,
        latest_hint,
    };

    let mut request = Request::from_parts(parts, body);
    request.extensions_mut().insert(context);

    next.run(request).await
}

fn header_text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn blank_header_reads_as_absent() {
        let name = HeaderName::from_static("x-parley-user");
        let mut headers = HeaderMap::new();
        assert_eq!(header_text(&headers, &name), None);

        headers.insert(name.clone(), HeaderValue::from_static("  "));
        assert_eq!(header_text(&headers, &name), None);

        headers.insert(name.clone(), HeaderValue::from_static(" alice "));
        assert_eq!(header_text(&headers, &name), Some("alice"));
    }

    #[test]
    fn invalid_header_name_is_rejected() {
        assert!(ContextHeaders::new("x-user", "bad header").is_err());
        assert!(ContextHeaders::new("x-user", "x-hint").is_ok());
    }
}
