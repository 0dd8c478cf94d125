//! Request pipeline
//!
//! Normalized request in, reply or error out. Each request reads a snapshot
//! of the stores, assembles its prompt, picks an adapter and calls the
//! upstream at most once (plus retries). Nothing is shared between requests
//! except the read-only settings and the HTTP client.

use std::sync::Arc;

use parley_config::{ChatConfig, ProvidersConfig, StoreConfig, UpstreamConfig};
use parley_core::RequestContext;
use serde_json::Value;

use crate::{
    assemble::{AssemblyInput, AssemblyPlan, Enrichment, assemble},
    diagnostics::Diagnostics,
    error::ChatError,
    math,
    normalize::{NormalizeOptions, normalize},
    provider::{Adapter, Branch, DemoAdapter, FallbackReason, UpstreamCall, resolve_adapter, select_branch},
    respond,
    secrets::SecretResolver,
    store::{CharacterStore, FileStore, MemoryStore, SecretStore, WorldInfoStore},
    transport::Transport,
    types::{ChatRequest, Reply, ReplyOrigin},
};

/// Model reported on locally computed replies
pub const LOCAL_MODEL: &str = "parley-local";

/// Read-only settings for the pipeline
#[derive(Debug, Default)]
pub struct ChatSettings {
    pub chat: ChatConfig,
    pub upstream: UpstreamConfig,
    pub providers: ProvidersConfig,
    /// Shared fallback scope for credentials
    pub guest_user: String,
}

/// Store handles used by the pipeline
#[derive(Clone)]
pub struct Stores {
    pub secrets: Arc<dyn SecretStore>,
    pub characters: Arc<dyn CharacterStore>,
    pub worlds: Arc<dyn WorldInfoStore>,
}

impl Stores {
    /// All three stores backed by the data directory
    pub fn file(config: &StoreConfig) -> Self {
        let store = Arc::new(FileStore::new(config.data_root.clone()));
        Self {
            secrets: store.clone(),
            characters: store.clone(),
            worlds: store,
        }
    }

    /// All three stores backed by one in-memory store
    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            secrets: store.clone(),
            characters: store.clone(),
            worlds: store,
        }
    }
}

/// Result of serving one request
#[derive(Debug)]
pub struct ChatOutcome {
    pub diagnostics: Diagnostics,
    pub result: Result<Reply, ChatError>,
}

/// Shared state for chat route handlers
#[derive(Clone)]
pub struct ChatState {
    inner: Arc<ChatStateInner>,
}

struct ChatStateInner {
    settings: ChatSettings,
    secrets: SecretResolver,
    characters: Arc<dyn CharacterStore>,
    worlds: Arc<dyn WorldInfoStore>,
    transport: Transport,
}

impl ChatState {
    /// Build the state and its upstream HTTP client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(settings: ChatSettings, stores: Stores) -> Result<Self, ChatError> {
        let transport = Transport::new(&settings.upstream)?;
        let secrets = SecretResolver::new(stores.secrets, settings.guest_user.clone());

        Ok(Self {
            inner: Arc::new(ChatStateInner {
                settings,
                secrets,
                characters: stores.characters,
                worlds: stores.worlds,
                transport,
            }),
        })
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.inner.settings
    }

    /// Upstream calls made so far, retries included
    pub fn upstream_calls(&self) -> u64 {
        self.inner.transport.calls()
    }

    /// Normalize an inbound payload with the configured options
    pub fn normalize(&self, payload: &Value) -> ChatRequest {
        normalize(
            payload,
            NormalizeOptions {
                scrub_meta_brackets: self.inner.settings.chat.scrub_meta_brackets,
            },
        )
    }

    /// Serve one normalized request
    pub async fn respond(&self, request: &ChatRequest, context: &RequestContext) -> ChatOutcome {
        let settings = &self.inner.settings;
        let user = context.user_scope(&settings.guest_user);
        let locale = request.locale.as_deref().or_else(|| context.accept_language());

        let selection = select_branch(
            request.source.as_deref(),
            request.model.as_deref(),
            &settings.upstream.gemini_model_prefix,
        );

        let enrichment = self.enrichment(request, user).await;
        let plan = assemble(
            AssemblyInput {
                request,
                hint: context.latest_hint.as_deref(),
                locale,
                enrichment: &enrichment,
            },
            &settings.chat,
        );

        let mut diagnostics = Diagnostics::from_plan(&plan);
        diagnostics.fallback = selection.fallback;
        diagnostics.max_output_tokens = Some(settings.upstream.clamp_max_tokens(request.max_tokens));

        let local = |text: String, origin: ReplyOrigin| Reply {
            text,
            model: request.model.clone().unwrap_or_else(|| LOCAL_MODEL.to_owned()),
            shape: selection.branch.reply_shape(),
            origin,
            prompt_chars: plan.prompt_chars(),
        };

        if settings.chat.math_short_circuit
            && plan.intents.math
            && let Some(answer) = arithmetic_answer(&plan)
        {
            tracing::debug!(user, "answered arithmetic locally");
            diagnostics.branch = Some(selection.branch);
            diagnostics.short_circuit = true;

            return ChatOutcome {
                diagnostics,
                result: Ok(local(answer, ReplyOrigin::ShortCircuit)),
            };
        }

        let adapter = match resolve_adapter(selection.branch, request, user, &self.inner.secrets, &settings.providers).await {
            Ok(adapter) => adapter,
            Err(unavailable) => {
                tracing::info!(
                    user,
                    branch = selection.branch.as_str(),
                    "upstream unavailable, serving demo reply: {unavailable}"
                );
                diagnostics.fallback = Some(unavailable.reason());
                Adapter::Demo(DemoAdapter)
            }
        };
        diagnostics.branch = Some(adapter.branch());

        tracing::debug!(
            user,
            branch = adapter.branch().as_str(),
            model = adapter.model(),
            fragments = plan.fragments.len(),
            "calling upstream"
        );

        let call = UpstreamCall {
            plan: &plan,
            request,
            upstream: &settings.upstream,
            preserve_structure: settings.chat.preserve_structure,
        };

        let result = match adapter.complete(call, &self.inner.transport).await {
            Ok(completion) => {
                diagnostics.attempts = completion.attempts;

                let last_user = request.last_user_text().or(plan.latest_user.as_deref());
                let (text, blank) = respond::ensure_text(completion.text, last_user);

                let origin = if blank {
                    tracing::warn!(user, branch = adapter.branch().as_str(), "upstream returned a blank reply");
                    diagnostics.fallback = Some(FallbackReason::BlankReply);
                    ReplyOrigin::BlankFallback
                } else if adapter.branch() == Branch::Demo {
                    ReplyOrigin::Demo
                } else {
                    ReplyOrigin::Upstream
                };

                Ok(Reply {
                    text,
                    model: completion.model,
                    shape: selection.branch.reply_shape(),
                    origin,
                    prompt_chars: plan.prompt_chars(),
                })
            }
            Err(failure) => {
                diagnostics.attempts = failure.attempts;

                match plan.intents.math.then(|| arithmetic_answer(&plan)).flatten() {
                    Some(answer) => {
                        tracing::warn!(user, "upstream failed, answered arithmetic locally: {failure}");
                        diagnostics.fallback = Some(FallbackReason::LocalArithmetic);
                        Ok(local(answer, ReplyOrigin::LastResort))
                    }
                    None => {
                        tracing::warn!(
                            user,
                            status = failure.status.map(|s| s.as_u16()),
                            detail = %failure.detail,
                            "upstream failed: {failure}"
                        );
                        Err(ChatError::Upstream(failure))
                    }
                }
            }
        };

        tracing::info!(
            user,
            branch = diagnostics.branch.map(Branch::as_str),
            fallback = diagnostics.fallback.map(FallbackReason::as_str),
            attempts = diagnostics.attempts,
            ok = result.is_ok(),
            "chat completion served"
        );

        ChatOutcome { diagnostics, result }
    }

    /// Card and world-info snapshot for this request
    ///
    /// Lookup failures are logged and treated as absent.
    async fn enrichment(&self, request: &ChatRequest, user: &str) -> Enrichment {
        let chat = &self.inner.settings.chat;
        if request.strict_latest.unwrap_or(chat.strict_latest) {
            return Enrichment::default();
        }

        let card = async {
            let name = request.char_name.as_deref().filter(|_| chat.character_card)?;
            match self.inner.characters.find_by_name(user, name).await {
                Ok(card) => card,
                Err(error) => {
                    tracing::warn!(user, "character lookup failed: {error}");
                    None
                }
            }
        };

        let world = async {
            if !chat.world_info {
                return Vec::new();
            }
            self.inner.worlds.entries(user).await.unwrap_or_else(|error| {
                tracing::warn!(user, "world-info lookup failed: {error}");
                Vec::new()
            })
        };

        let (card, world) = futures::join!(card, world);
        Enrichment { card, world }
    }
}

/// Arithmetic in the freshest user text, then in the anchor
fn arithmetic_answer(plan: &AssemblyPlan) -> Option<String> {
    plan.latest_user
        .as_deref()
        .and_then(math::answer)
        .or_else(|| plan.anchor.as_deref().and_then(math::answer))
}
