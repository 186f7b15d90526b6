use feedfilter_core::TopicRule;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Instruction listing every topic with a `0.0` placeholder and its description.
pub fn build_system_prompt(topics: &[TopicRule]) -> String {
    let skeleton = topics
        .iter()
        .map(|topic| format!("    \"{}\": 0.0", topic.name))
        .collect::<Vec<_>>()
        .join(",\n");
    let descriptions = topics
        .iter()
        .map(|topic| format!("{}: {}", topic.name, topic.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Your task is to evaluate Tweets/X posts. Always respond in JSON. Follow this format:\n\n\
         {{\n{}\n}}\n\n\
         Rate the provided post from 0.0 to 1.0 for each topic. Here are the descriptions for each topic:\n\n{}",
        skeleton, descriptions
    )
}

pub fn build_messages(topics: &[TopicRule], post_text: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(build_system_prompt(topics)),
        ChatMessage::user(post_text),
    ]
}
