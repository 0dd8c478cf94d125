//! Per-response diagnostic headers
//!
//! Record which branch served the request, which fragments were injected and
//! why a fallback happened. They carry no secrets and no message text.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{
    assemble::{AssemblyPlan, FragmentKind},
    provider::{Branch, FallbackReason},
};

pub const BRANCH: &str = "x-parley-branch";
pub const FALLBACK_REASON: &str = "x-parley-fallback-reason";
pub const INJECT_LANGUAGE: &str = "x-parley-inject-language";
pub const INJECT_CARD: &str = "x-parley-inject-card";
pub const INJECT_WORLD: &str = "x-parley-inject-world";
pub const INJECT_ANCHOR: &str = "x-parley-inject-anchor";
pub const USER_PRIORITY: &str = "x-parley-user-priority";
pub const HARD_APPEND: &str = "x-parley-hard-append";
pub const LATEST_APPENDED: &str = "x-parley-latest-appended";
pub const STRICT_LATEST: &str = "x-parley-strict-latest";
pub const SHORT_CIRCUIT: &str = "x-parley-short-circuit";
pub const MAX_OUTPUT_TOKENS: &str = "x-parley-max-output-tokens";
pub const UPSTREAM_ATTEMPTS: &str = "x-parley-upstream-attempts";

/// What happened while serving one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub branch: Option<Branch>,
    pub fallback: Option<FallbackReason>,
    pub language: bool,
    pub card: bool,
    pub world: bool,
    pub anchor: bool,
    pub user_priority: bool,
    pub hard_append: bool,
    pub latest_appended: bool,
    pub strict_latest: bool,
    pub short_circuit: bool,
    pub max_output_tokens: Option<u32>,
    pub attempts: u32,
}

impl Diagnostics {
    pub fn from_plan(plan: &AssemblyPlan) -> Self {
        Self {
            language: plan.has(FragmentKind::Language),
            card: plan.has(FragmentKind::CharacterCard),
            world: plan.has(FragmentKind::WorldInfo),
            anchor: plan.has(FragmentKind::Anchor),
            user_priority: plan.has(FragmentKind::UserPriority),
            hard_append: plan.hard_appended,
            latest_appended: plan.latest_appended,
            strict_latest: plan.strict_latest,
            ..Self::default()
        }
    }

    /// Render as response headers
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let mut put = |name: &'static str, value: HeaderValue| {
            headers.insert(HeaderName::from_static(name), value);
        };

        if let Some(branch) = self.branch {
            put(BRANCH, HeaderValue::from_static(branch.as_str()));
        }
        if let Some(reason) = self.fallback {
            put(FALLBACK_REASON, HeaderValue::from_static(reason.as_str()));
        }

        for (name, flag) in [
            (INJECT_LANGUAGE, self.language),
            (INJECT_CARD, self.card),
            (INJECT_WORLD, self.world),
            (INJECT_ANCHOR, self.anchor),
            (USER_PRIORITY, self.user_priority),
            (HARD_APPEND, self.hard_append),
            (LATEST_APPENDED, self.latest_appended),
            (STRICT_LATEST, self.strict_latest),
        ] {
            put(name, HeaderValue::from_static(if flag { "1" } else { "0" }));
        }

        if self.short_circuit {
            put(SHORT_CIRCUIT, HeaderValue::from_static("math"));
        }
        if let Some(tokens) = self.max_output_tokens {
            put(MAX_OUTPUT_TOKENS, HeaderValue::from(tokens));
        }
        put(UPSTREAM_ATTEMPTS, HeaderValue::from(self.attempts));

        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_flags_and_reasons() {
        let diagnostics = Diagnostics {
            branch: Some(Branch::Demo),
            fallback: Some(FallbackReason::MissingCredential),
            anchor: true,
            max_output_tokens: Some(1024),
            ..Diagnostics::default()
        };

        let headers = diagnostics.headers();

        assert_eq!(headers[BRANCH], "demo");
        assert_eq!(headers[FALLBACK_REASON], "missing_credential");
        assert_eq!(headers[INJECT_ANCHOR], "1");
        assert_eq!(headers[INJECT_CARD], "0");
        assert_eq!(headers[MAX_OUTPUT_TOKENS], "1024");
        assert_eq!(headers[UPSTREAM_ATTEMPTS], "0");
        assert!(headers.get(SHORT_CIRCUIT).is_none());
    }

    #[test]
    fn short_circuit_is_marked() {
        let diagnostics = Diagnostics {
            short_circuit: true,
            ..Diagnostics::default()
        };
        assert_eq!(diagnostics.headers()[SHORT_CIRCUIT], "math");
    }
}
