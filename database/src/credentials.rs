use feedfilter_core::{CoreError, KeyValueStore, CREDENTIAL_KEY};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const PROMPT_MESSAGE: &str = "Please enter your OpenRouter API key:";
const OPENROUTER_KEY_PREFIX: &str = "sk-or-";

/// Interactive source of the credential when none is stored.
pub trait CredentialPrompt {
    /// Blocks until the user answers. `None` means the prompt was declined.
    fn prompt(&self, message: &str) -> Option<String>;
}

/// Answers every prompt with the same value. Useful for non-interactive hosts.
#[derive(Debug, Clone, Default)]
pub struct FixedPrompt(pub Option<String>);

impl CredentialPrompt for FixedPrompt {
    fn prompt(&self, _message: &str) -> Option<String> {
        self.0.clone()
    }
}

pub fn looks_like_openrouter_key(key: &str) -> bool {
    key.starts_with(OPENROUTER_KEY_PREFIX)
}

#[derive(Debug)]
pub struct KeyStore<S, P> {
    store: Arc<S>,
    prompt: P,
}

impl<S: KeyValueStore, P: CredentialPrompt> KeyStore<S, P> {
    pub fn new(store: Arc<S>, prompt: P) -> Self {
        Self { store, prompt }
    }

    /// Stored credential, or one obtained from the prompt and persisted.
    pub async fn get_credential(&self) -> Result<Option<String>, CoreError> {
        if let Some(existing) = self.stored_credential().await? {
            return Ok(Some(existing));
        }

        let answer = self
            .prompt
            .prompt(PROMPT_MESSAGE)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        match answer {
            Some(key) => {
                self.set_credential(&key).await?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    pub async fn set_credential(&self, key: &str) -> Result<(), CoreError> {
        if !looks_like_openrouter_key(key) {
            warn!(
                "API key does not start with {}; storing it anyway",
                OPENROUTER_KEY_PREFIX
            );
        }
        self.store
            .set_one(CREDENTIAL_KEY, Value::String(key.to_string()))
            .await?;
        info!("API key saved");
        Ok(())
    }

    pub async fn clear_credential(&self) -> Result<(), CoreError> {
        self.store.remove(&[CREDENTIAL_KEY.to_string()]).await?;
        info!("API key removed");
        Ok(())
    }

    pub async fn has_credential(&self) -> Result<bool, CoreError> {
        Ok(self.stored_credential().await?.is_some())
    }

    async fn stored_credential(&self) -> Result<Option<String>, CoreError> {
        Ok(self
            .store
            .get_one(CREDENTIAL_KEY)
            .await?
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|key| !key.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedfilter_core::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingPrompt {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    impl CredentialPrompt for &CountingPrompt {
        fn prompt(&self, message: &str) -> Option<String> {
            assert!(message.contains("OpenRouter"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    #[tokio::test]
    async fn test_prompt_once_then_reuse() {
        let store = Arc::new(MemoryStore::new());
        let prompt = CountingPrompt {
            answer: Some("  sk-or-abc  ".to_string()),
            calls: AtomicUsize::new(0),
        };
        let keys = KeyStore::new(store.clone(), &prompt);

        assert_eq!(keys.get_credential().await.unwrap().as_deref(), Some("sk-or-abc"));
        assert_eq!(keys.get_credential().await.unwrap().as_deref(), Some("sk-or-abc"));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get_one(CREDENTIAL_KEY).await.unwrap(),
            Some(Value::String("sk-or-abc".to_string()))
        );
    }

    #[tokio::test]
    async fn test_declined_prompt_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let keys = KeyStore::new(store.clone(), FixedPrompt(None));
        assert_eq!(keys.get_credential().await.unwrap(), None);

        let blank = KeyStore::new(store.clone(), FixedPrompt(Some("   ".to_string())));
        assert_eq!(blank.get_credential().await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_credential() {
        let store = Arc::new(MemoryStore::new());
        let keys = KeyStore::new(store, FixedPrompt(None));
        keys.set_credential("sk-or-xyz").await.unwrap();
        assert!(keys.has_credential().await.unwrap());

        keys.clear_credential().await.unwrap();
        assert!(!keys.has_credential().await.unwrap());
    }

    #[test]
    fn test_key_format() {
        assert!(looks_like_openrouter_key("sk-or-v1-123"));
        assert!(!looks_like_openrouter_key("sk-123"));
    }
}
