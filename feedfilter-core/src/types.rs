use crate::error::{ConfigError, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Storage key prefix shared by every cached analysis.
pub const ANALYSIS_PREFIX: &str = "analysis_";
pub const CREDENTIAL_KEY: &str = "OPENROUTER_API_KEY";
pub const TOPICS_KEY: &str = "topicsConfig";

const PERMALINK_BASE: &str = "https://x.com/user/status/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRule {
    #[serde(rename = "topic")]
    pub name: String,
    pub description: String,
    pub threshold: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl TopicRule {
    pub fn new(name: impl Into<String>, description: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            threshold,
            enabled: true,
        }
    }

    /// Score for this topic when it is strictly above the threshold.
    pub fn exceeded_by(&self, result: &AnalysisResult) -> Option<f64> {
        result
            .score(&self.name)
            .filter(|score| *score > self.threshold)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "topic".to_string(),
            }
            .into());
        }
        if self.name != self.name.trim().to_lowercase() {
            return Err(ConfigError::InvalidValue {
                field: "topic".to_string(),
                value: self.name.clone(),
            }
            .into());
        }
        if self.description.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: format!("{}.description", self.name),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.threshold", self.name),
                value: self.threshold.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

pub fn default_topics() -> Vec<TopicRule> {
    vec![
        TopicRule::new("politics", "posts about political subjects", 0.8),
        TopicRule::new("negativity", "posts with overly negative sentiment", 0.9),
    ]
}

pub fn validate_topics(topics: &[TopicRule]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for topic in topics {
        topic.validate()?;
        if !seen.insert(topic.name.as_str()) {
            return Err(ConfigError::DuplicateTopic {
                name: topic.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// The enabled topic rules captured once for a scan cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSnapshot {
    rules: Arc<[TopicRule]>,
}

impl TopicSnapshot {
    pub fn capture(rules: &[TopicRule]) -> Self {
        let enabled: Vec<TopicRule> = rules.iter().filter(|r| r.enabled).cloned().collect();
        Self {
            rules: enabled.into(),
        }
    }

    pub fn rules(&self) -> &[TopicRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Topic name to score. Empty means the post was classified but inconclusive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(BTreeMap<String, f64>);

impl AnalysisResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scores<I, K>(scores: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self(scores.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn score(&self, topic: &str) -> Option<f64> {
        self.0.get(topic).copied()
    }

    pub fn insert(&mut self, topic: impl Into<String>, score: f64) {
        self.0.insert(topic.into(), score);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// A stored or freshly returned classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    Scores(AnalysisResult),
    /// The value was valid JSON but not an object.
    Malformed(Value),
}

impl Analysis {
    pub fn empty() -> Self {
        Analysis::Scores(AnalysisResult::new())
    }

    /// Interprets a JSON value. Scores may be numbers or numeric strings;
    /// other entries of an object are ignored.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Analysis::Scores(AnalysisResult(
                map.into_iter()
                    .filter_map(|(k, v)| score_of(&v).map(|score| (k, score)))
                    .collect(),
            )),
            other => Analysis::Malformed(other),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Analysis::Scores(result) => Value::Object(
                result
                    .0
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect(),
            ),
            Analysis::Malformed(value) => value.clone(),
        }
    }

    pub fn scores(&self) -> Option<&AnalysisResult> {
        match self {
            Analysis::Scores(result) => Some(result),
            Analysis::Malformed(_) => None,
        }
    }

    pub fn is_inconclusive(&self) -> bool {
        self.scores().map_or(true, AnalysisResult::is_empty)
    }
}

fn score_of(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str()?.trim().parse().ok())
        .filter(|score: &f64| score.is_finite())
}

/// Re-query handle for a post container. Never holds the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostLocator {
    identifier: String,
}

impl PostLocator {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Selector matching the permalink inside the post's container.
    pub fn link_selector(&self) -> String {
        format!("a[href*=\"/status/{}\"]", self.identifier)
    }

    pub fn permalink(&self) -> String {
        permalink(&self.identifier)
    }
}

pub fn permalink(identifier: &str) -> String {
    format!("{}{}", PERMALINK_BASE, identifier)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub identifier: String,
    pub primary_text: String,
    pub quoted_text: Option<String>,
    pub locator: PostLocator,
}

impl PostRecord {
    pub fn new(
        identifier: impl Into<String>,
        primary_text: impl Into<String>,
        quoted_text: Option<String>,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            locator: PostLocator::new(identifier.clone()),
            identifier,
            primary_text: primary_text.into(),
            quoted_text,
        }
    }

    pub fn has_text(&self) -> bool {
        !self.primary_text.is_empty() || self.quoted_text.is_some()
    }
}
