use feedfilter_core::{
    validate_topics, ConfigError, CoreError, ErrorExt, KeyValueStore, TopicRule, TOPICS_KEY,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Reads and edits the topic list stored under `topicsConfig`.
pub struct TopicRegistry<S> {
    store: Arc<S>,
    defaults: Vec<TopicRule>,
}

impl<S: KeyValueStore> TopicRegistry<S> {
    pub fn new(store: Arc<S>, defaults: Vec<TopicRule>) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &[TopicRule] {
        &self.defaults
    }

    /// The stored list, or the defaults when nothing usable is stored.
    pub async fn load(&self) -> Vec<TopicRule> {
        let stored = match self.store.get_one(TOPICS_KEY).await {
            Ok(stored) => stored,
            Err(e) => {
                e.log_warn();
                None
            }
        };

        match stored.map(serde_json::from_value::<Vec<TopicRule>>) {
            Some(Ok(topics)) => topics,
            Some(Err(e)) => {
                warn!("Stored topic list is unreadable, using defaults: {}", e);
                self.defaults.clone()
            }
            None => self.defaults.clone(),
        }
    }

    pub async fn save(&self, topics: &[TopicRule]) -> Result<(), CoreError> {
        validate_topics(topics)?;
        let value = serde_json::to_value(topics)?;
        self.store.set_one(TOPICS_KEY, value).await?;
        info!("Saved {} topics", topics.len());
        Ok(())
    }

    pub async fn add(&self, rule: TopicRule) -> Result<Vec<TopicRule>, CoreError> {
        let mut topics = self.load().await;
        if topics.iter().any(|t| t.name == rule.name) {
            return Err(ConfigError::DuplicateTopic { name: rule.name }.into());
        }
        topics.push(rule);
        self.save(&topics).await?;
        Ok(topics)
    }

    pub async fn remove(&self, name: &str) -> Result<Vec<TopicRule>, CoreError> {
        let mut topics = self.load().await;
        let before = topics.len();
        topics.retain(|t| t.name != name);
        if topics.len() == before {
            return Err(unknown_topic(name));
        }
        if self.defaults.iter().any(|t| t.name == name) {
            info!("Removing default topic {}", name);
        }
        self.save(&topics).await?;
        Ok(topics)
    }

    /// Flips the enabled flag and returns the new value.
    pub async fn toggle(&self, name: &str) -> Result<bool, CoreError> {
        let mut topics = self.load().await;
        let rule = topics
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| unknown_topic(name))?;
        rule.enabled = !rule.enabled;
        let enabled = rule.enabled;
        self.save(&topics).await?;
        Ok(enabled)
    }

    pub async fn set_threshold(&self, name: &str, threshold: f64) -> Result<(), CoreError> {
        let mut topics = self.load().await;
        let rule = topics
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| unknown_topic(name))?;
        rule.threshold = threshold;
        self.save(&topics).await
    }
}

fn unknown_topic(name: &str) -> CoreError {
    CoreError::InvalidInput {
        message: format!("no topic named '{}'", name),
    }
}
