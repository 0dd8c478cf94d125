//! Intent detection over the freshest user text
//!
//! Two intents are recognized. A math intent asks for a single arithmetic
//! answer and gets a numbers-only directive (and possibly a local answer).
//! A story intent asks the model to advance the narrative.

use std::sync::OnceLock;

use regex::Regex;

use crate::math;

/// Intents detected for one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intents {
    pub math: bool,
    pub story: bool,
}

impl Intents {
    /// Classify the freshest user text and the anchor together
    pub fn detect<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        texts.into_iter().fold(Self::default(), |acc, text| Self {
            math: acc.math || is_math(text),
            story: acc.story || is_story(text),
        })
    }
}

fn numbers_only_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)numbers?\s+only|only\s+(?:output\s+|give\s+|reply\s+with\s+)?(?:the\s+)?(?:number|digits?|result)|just\s+the\s+(?:number|answer|result)|answer\s+with\s+(?:a|the)\s+number|只(?:输出|回答|给|要|写)(?:出)?(?:数字|结果|答案)|仅(?:输出|回答)(?:数字|结果)|直接给出?(?:数字|结果|答案)|只輸出數字",
        )
        .expect("valid regex")
    })
}

fn story_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:continue|go\s+on|keep\s+going|carry\s+on)\b|what\s+happens\s+next|(?:advance|move|push)\s+the\s+(?:plot|story)|继续|繼續|接着(?:写|说|讲)|推进剧情|推進劇情|然后呢|后来呢",
        )
        .expect("valid regex")
    })
}

/// Whether the text asks for an arithmetic answer
pub fn is_math(text: &str) -> bool {
    asks_for_number(text) || math::extract(text).is_some()
}

/// Whether the text carries an explicit numbers-only instruction
pub fn asks_for_number(text: &str) -> bool {
    numbers_only_pattern().is_match(text)
}

/// Whether the text asks the model to advance the story
pub fn is_story(text: &str) -> bool {
    story_pattern().is_match(text)
}
