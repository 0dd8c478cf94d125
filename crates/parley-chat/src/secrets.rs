use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::store::SecretStore;

/// Credential keys as stored by the front-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKey {
    Gemini,
    OpenAi,
    Custom,
    OpenRouter,
}

impl SecretKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "api_key_makersuite",
            Self::OpenAi => "api_key_openai",
            Self::Custom => "api_key_custom",
            Self::OpenRouter => "api_key_openrouter",
        }
    }
}

/// Scope a credential was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretScope {
    User,
    Guest,
    Config,
}

impl SecretScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Guest => "guest",
            Self::Config => "config",
        }
    }
}

/// Credential plus where it came from
#[derive(Debug, Clone)]
pub struct ResolvedSecret {
    pub value: SecretString,
    pub scope: SecretScope,
}

/// Resolves credentials for a user, falling back to the guest scope and
/// then to the configured default
#[derive(Clone)]
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    guest: String,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>, guest: impl Into<String>) -> Self {
        Self {
            store,
            guest: guest.into(),
        }
    }

    pub fn guest(&self) -> &str {
        &self.guest
    }

    /// Resolve a credential. Store failures are logged and treated as absent.
    pub async fn resolve(
        &self,
        user: &str,
        key: SecretKey,
        default: Option<&SecretString>,
    ) -> Option<ResolvedSecret> {
        let mut scopes = vec![(user, SecretScope::User)];
        if user != self.guest {
            scopes.push((self.guest.as_str(), SecretScope::Guest));
        }

        for (scope_user, scope) in scopes {
            match self.store.find(scope_user, key.as_str()).await {
                Ok(Some(value)) => {
                    tracing::debug!(key = key.as_str(), scope = scope.as_str(), "resolved credential");
                    return Some(ResolvedSecret {
                        value: SecretString::from(value),
                        scope,
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(key = key.as_str(), scope = scope.as_str(), "credential lookup failed: {error}");
                }
            }
        }

        default
            .filter(|secret| !secret.expose_secret().trim().is_empty())
            .map(|secret| ResolvedSecret {
                value: secret.clone(),
                scope: SecretScope::Config,
            })
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::store::MemoryStore;

    fn resolver(store: MemoryStore) -> SecretResolver {
        SecretResolver::new(Arc::new(store), "guest")
    }

    #[tokio::test]
    async fn user_scope_wins() {
        let resolver = resolver(
            MemoryStore::new()
                .with_secret("alice", "api_key_openai", "sk-alice")
                .with_secret("guest", "api_key_openai", "sk-guest"),
        );

        let secret = resolver.resolve("alice", SecretKey::OpenAi, None).await.unwrap();
        assert_eq!(secret.value.expose_secret(), "sk-alice");
        assert_eq!(secret.scope, SecretScope::User);
    }

    #[tokio::test]
    async fn falls_back_to_guest_then_config() {
        let resolver = resolver(MemoryStore::new().with_secret("guest", "api_key_openai", "sk-guest"));
        let default = SecretString::from("sk-config");

        let secret = resolver
            .resolve("alice", SecretKey::OpenAi, Some(&default))
            .await
            .unwrap();
        assert_eq!(secret.scope, SecretScope::Guest);

        let secret = resolver
            .resolve("alice", SecretKey::Gemini, Some(&default))
            .await
            .unwrap();
        assert_eq!(secret.value.expose_secret(), "sk-config");
        assert_eq!(secret.scope, SecretScope::Config);
    }

    #[tokio::test]
    async fn missing_everywhere_is_none() {
        let resolver = resolver(MemoryStore::new());
        let blank = SecretString::from("  ");

        assert!(resolver.resolve("alice", SecretKey::OpenRouter, None).await.is_none());
        assert!(resolver.resolve("alice", SecretKey::OpenRouter, Some(&blank)).await.is_none());
    }
}
