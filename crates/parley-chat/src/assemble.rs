//! Prompt assembly
//!
//! Turns a normalized request plus a snapshot of the caller's character and
//! world-info data into the system instruction and the outgoing turn list.
//! The same inputs always produce the same plan.

use std::sync::OnceLock;

use indoc::indoc;
use parley_config::ChatConfig;
use regex::Regex;

use crate::{
    intent::Intents,
    normalize::normalize_whitespace,
    store::{CharacterCard, WorldEntry},
    types::{ChatRequest, Message, Role},
};

const SIMPLIFIED_CHINESE: &str =
    "Always reply in Simplified Chinese (简体中文), whatever language earlier messages use.";

const TRADITIONAL_CHINESE: &str =
    "Always reply in Traditional Chinese (繁體中文), whatever language earlier messages use.";

const ROLEPLAY: &str = indoc! {"
    You are {{char}} in an ongoing roleplay with {{user}}.
    Stay in character. Write only {{char}}'s words and actions and never speak or act for {{user}}."};

const USER_PRIORITY: &str = indoc! {"
    The most recent message from {{user}} takes priority over everything above.
    Respond to it directly instead of repeating or summarizing earlier replies."};

const MATH_RULE: &str =
    "The user asked an arithmetic question. Reply with the final number only, without words, units or working.";

const STORY_RULE: &str =
    "The user wants the story to move forward. Advance the plot with new events instead of recapping what already happened.";

const DEFAULT_USER_NAME: &str = "User";

/// Kind of system-instruction fragment, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FragmentKind {
    Persona,
    Language,
    CharacterCard,
    WorldInfo,
    Roleplay,
    UserPriority,
    IntentRule,
    Anchor,
}

/// One piece of the system instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub text: String,
}

/// Snapshot of the caller's stored data, taken once per request
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub card: Option<CharacterCard>,
    pub world: Vec<WorldEntry>,
}

/// Everything assembly reads for one request
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    pub request: &'a ChatRequest,
    /// Latest-user-text hint from the request header
    pub hint: Option<&'a str>,
    /// Effective locale (request field, then `Accept-Language`)
    pub locale: Option<&'a str>,
    pub enrichment: &'a Enrichment,
}

/// Result of assembly, ready for a provider adapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyPlan {
    pub fragments: Vec<Fragment>,
    /// Outgoing user and assistant turns
    pub messages: Vec<Message>,
    /// Freshest user text (last user turn, then the header hint)
    pub latest_user: Option<String>,
    /// Text the reply must address
    pub anchor: Option<String>,
    pub intents: Intents,
    pub strict_latest: bool,
    /// Freshest user text was missing from the history and appended
    pub latest_appended: bool,
    pub hard_appended: bool,
}

impl AssemblyPlan {
    /// Fragments joined into one instruction, empty when none fired
    pub fn system_instruction(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has(&self, kind: FragmentKind) -> bool {
        self.fragments.iter().any(|f| f.kind == kind)
    }

    /// System instruction as a leading system turn, followed by the turns
    pub fn chat_messages(&self) -> Vec<Message> {
        let system = self.system_instruction();

        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(self.messages.iter().cloned());
        messages
    }

    /// Characters sent upstream
    pub fn prompt_chars(&self) -> usize {
        self.system_instruction().chars().count() + self.messages.iter().map(Message::char_len).sum::<usize>()
    }
}

/// Build the assembly plan
pub fn assemble(input: AssemblyInput<'_>, config: &ChatConfig) -> AssemblyPlan {
    let request = input.request;
    let hint = input.hint.map(str::trim).filter(|h| !h.is_empty());

    let latest_user = request.last_user_text().or(hint).map(str::to_owned);
    let anchor = request
        .last_user_text()
        .or_else(|| request.last_text())
        .or(hint)
        .map(str::to_owned);

    let intents = if config.intent_rules {
        Intents::detect(latest_user.iter().chain(anchor.iter()).map(String::as_str))
    } else {
        Intents::default()
    };

    let strict_latest = request.strict_latest.unwrap_or(config.strict_latest);
    if strict_latest {
        return AssemblyPlan {
            messages: anchor.iter().map(Message::user).collect(),
            latest_user,
            anchor,
            intents,
            strict_latest,
            ..AssemblyPlan::default()
        };
    }

    let names = Names::new(request, input.enrichment.card.as_ref());
    let fragments = build_fragments(&input, config, &names, intents, anchor.as_deref());

    let mut messages = history_window(&request.messages, config.history_window());

    let mut latest_appended = false;
    if let Some(latest) = latest_user.as_deref() {
        let present = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .is_some_and(|m| m.content.trim() == latest.trim());

        if !present {
            messages.push(Message::user(latest));
            latest_appended = true;
        }
    }

    let mut hard_appended = false;
    if config.hard_append
        && !intents.math
        && let Some(anchor) = anchor.as_deref()
    {
        messages.push(Message::user(format!("{anchor}{}", config.hard_append_suffix)));
        hard_appended = true;
    }

    AssemblyPlan {
        fragments,
        messages,
        latest_user,
        anchor,
        intents,
        strict_latest,
        latest_appended,
        hard_appended,
    }
}

struct Names {
    char_name: Option<String>,
    user_name: String,
}

impl Names {
    fn new(request: &ChatRequest, card: Option<&CharacterCard>) -> Self {
        let char_name = request
            .char_name
            .clone()
            .or_else(|| card.map(|c| c.name.trim().to_owned()).filter(|n| !n.is_empty()));

        Self {
            char_name,
            user_name: request
                .user_name
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_owned()),
        }
    }

    fn substitute(&self, text: &str) -> String {
        substitute_macros(text, self.char_name.as_deref(), &self.user_name)
    }
}

fn macro_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\{\{\s*(char|user)\s*\}\}").expect("valid regex"))
}

/// Replace `{{char}}` and `{{user}}` macros
///
/// `{{char}}` is left alone when no character name is known.
pub fn substitute_macros(text: &str, char_name: Option<&str>, user_name: &str) -> String {
    macro_pattern()
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let whole = &captures[0];
            if captures[1].eq_ignore_ascii_case("user") {
                user_name.to_owned()
            } else {
                char_name.map_or_else(|| whole.to_owned(), str::to_owned)
            }
        })
        .into_owned()
}

fn build_fragments(
    input: &AssemblyInput<'_>,
    config: &ChatConfig,
    names: &Names,
    intents: Intents,
    anchor: Option<&str>,
) -> Vec<Fragment> {
    let mut fragments = Vec::new();
    let mut push = |kind: FragmentKind, text: String| {
        let text = normalize_whitespace(&names.substitute(&text));
        if !text.is_empty() {
            fragments.push(Fragment { kind, text });
        }
    };

    if !config.strict_drop_persona {
        push(FragmentKind::Persona, input.request.system_text());
    }

    if config.language_directive
        && let Some(script) = input.locale.and_then(ChineseScript::from_locale)
    {
        push(FragmentKind::Language, script.directive().to_owned());
    }

    if config.character_card
        && let Some(card) = input.enrichment.card.as_ref().filter(|c| c.has_brief())
    {
        push(FragmentKind::CharacterCard, render_card(card, names.char_name.as_deref()));
    }

    if config.world_info && !input.enrichment.world.is_empty() {
        push(
            FragmentKind::WorldInfo,
            render_world(&input.enrichment.world, config.world_max_entries, config.world_max_chars),
        );
    }

    if config.roleplay_enforcer && names.char_name.is_some() {
        push(FragmentKind::Roleplay, ROLEPLAY.to_owned());
    }

    if config.user_priority {
        push(FragmentKind::UserPriority, USER_PRIORITY.to_owned());
    }

    if intents.math {
        push(FragmentKind::IntentRule, MATH_RULE.to_owned());
    }
    if intents.story {
        push(FragmentKind::IntentRule, STORY_RULE.to_owned());
    }

    if config.intent_anchor
        && !intents.math
        && let Some(anchor) = anchor
    {
        let clamped = clamp_chars(anchor.trim(), config.anchor_max_chars);
        push(
            FragmentKind::Anchor,
            format!("Reply directly to this latest message from {{{{user}}}}:\n{clamped}"),
        );
    }

    fragments
}

/// Chinese script requested by a locale tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChineseScript {
    Simplified,
    Traditional,
}

impl ChineseScript {
    pub fn from_locale(locale: &str) -> Option<Self> {
        let tag = locale.trim().to_ascii_lowercase().replace('_', "-");
        if tag != "zh" && !tag.starts_with("zh-") {
            return None;
        }

        let traditional = tag
            .split('-')
            .skip(1)
            .any(|subtag| matches!(subtag, "hant" | "tw" | "hk" | "mo"));

        Some(if traditional {
            Self::Traditional
        } else {
            Self::Simplified
        })
    }

    const fn directive(self) -> &'static str {
        match self {
            Self::Simplified => SIMPLIFIED_CHINESE,
            Self::Traditional => TRADITIONAL_CHINESE,
        }
    }
}

fn render_card(card: &CharacterCard, char_name: Option<&str>) -> String {
    let name = char_name.unwrap_or(card.name.as_str());
    let mut lines = vec![format!("[Character: {name}]")];

    for (label, value) in [
        ("Description", &card.description),
        ("Personality", &card.personality),
        ("Scenario", &card.scenario),
        ("Opening line", &card.first_mes),
    ] {
        let value = value.trim();
        if !value.is_empty() {
            lines.push(format!("{label}: {value}"));
        }
    }

    lines.join("\n")
}

fn render_world(entries: &[WorldEntry], max_entries: usize, max_chars: usize) -> String {
    let mut block = String::from("[World info]");

    for entry in entries
        .iter()
        .filter(|e| !e.content.trim().is_empty())
        .take(max_entries)
    {
        let content = normalize_whitespace(&entry.content);
        let line = if entry.title.is_empty() {
            format!("\n- {content}")
        } else {
            format!("\n- {}: {content}", entry.title)
        };
        block.push_str(&line);
    }

    clamp_chars(&block, max_chars)
}

/// Last `window` non-empty, non-system turns
fn history_window(messages: &[Message], window: usize) -> Vec<Message> {
    let turns = messages
        .iter()
        .filter(|m| m.role != Role::System && m.has_text())
        .collect::<Vec<_>>();

    let skip = turns.len().saturating_sub(window);
    turns.into_iter().skip(skip).cloned().collect()
}

/// Truncate to at most `max` characters on a char boundary
pub fn clamp_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((index, _)) => text[..index].trim_end().to_owned(),
        None => text.to_owned(),
    }
}
