//! Local echo used when no real upstream is available

use super::{Completion, UpstreamCall};

/// Model name reported on demo replies
pub const DEMO_MODEL: &str = "parley-demo";

const DEMO_PREFIX: &str = "[demo]";

/// Canned reply that echoes the freshest user text
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoAdapter;

impl DemoAdapter {
    pub fn reply_text(call: UpstreamCall<'_>) -> String {
        let plan = call.plan;
        let echo = plan
            .latest_user
            .as_deref()
            .or(plan.anchor.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty());

        match echo {
            Some(text) => format!("{DEMO_PREFIX} You said: {text}"),
            None => format!("{DEMO_PREFIX} No upstream is configured for this request."),
        }
    }

    pub fn complete(self, call: UpstreamCall<'_>) -> Completion {
        Completion {
            text: Self::reply_text(call),
            model: DEMO_MODEL.to_owned(),
            attempts: 0,
        }
    }
}
