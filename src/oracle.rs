//! Text-generation oracle boundary
//!
//! The language model is treated as an opaque text-completion oracle. The
//! core consumes only the non-streaming form; prompt construction and
//! response JSON extraction live here so that callers deal in typed values.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Difficulty;

/// Opaque text-completion oracle
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Complete a prompt, returning the raw response text
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// An oracle-suggested learning topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicSuggestion {
    /// Topic title
    pub title: String,
    /// Difficulty assigned by the oracle
    pub difficulty: Difficulty,
}

/// A concept extracted from a single message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedConcept {
    /// Short title, 2-6 words
    pub title: String,
    /// One-sentence summary
    pub summary: String,
}

/// Extract the first balanced-looking JSON object from oracle output.
/// Models wrap JSON in prose often enough that this is load-bearing.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Extract the first JSON array from oracle output
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Parse topic suggestions from an oracle response. Entries with missing
/// fields or out-of-enum difficulties are dropped; titles are truncated to
/// 200 characters; at most `cap` suggestions are kept.
pub fn parse_topic_suggestions(response: &str, cap: usize) -> Vec<TopicSuggestion> {
    #[derive(Deserialize)]
    struct Raw {
        title: String,
        difficulty_level: String,
    }

    let Some(json) = extract_json_array(response) else {
        return Vec::new();
    };
    let Ok(raw) = serde_json::from_str::<Vec<Raw>>(json) else {
        return Vec::new();
    };

    raw.into_iter()
        .filter_map(|t| {
            let difficulty = t.difficulty_level.parse::<Difficulty>().ok()?;
            let mut title = t.title.trim().to_string();
            if title.is_empty() {
                return None;
            }
            if title.chars().count() > 200 {
                title = title.chars().take(200).collect();
            }
            Some(TopicSuggestion { title, difficulty })
        })
        .take(cap)
        .collect()
}

/// Parse extracted concepts from a concept-extraction response
pub fn parse_extracted_concepts(response: &str) -> Vec<ExtractedConcept> {
    #[derive(Deserialize)]
    struct Raw {
        #[serde(default)]
        concepts: Vec<ExtractedConcept>,
    }

    let Some(json) = extract_json_object(response) else {
        return Vec::new();
    };
    serde_json::from_str::<Raw>(json)
        .map(|r| {
            r.concepts
                .into_iter()
                .filter(|c| !c.title.trim().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Prompt builders for the oracle calls the pipeline makes
pub mod prompts {
    /// Prompt asking for a study-guide title and description for a cluster
    pub fn cluster_label_prompt(key_concepts: &[String], samples: &[String]) -> String {
        let concepts_text = key_concepts
            .iter()
            .take(8)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        let samples_text = if samples.is_empty() {
            String::new()
        } else {
            format!(
                "\nRepresentative messages from the cluster:\n{}\n",
                samples
                    .iter()
                    .map(|s| format!("- {}", s))
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        };

        format!(
            r#"You are analyzing clusters of professional conversations where people use AI for work assistance.

Here are the top technical concepts from a cluster:
{concepts_text}
{samples_text}
Create a study guide title and description:
- Title: 3-5 words describing the technical domain
- Description: 2 sentences explaining what professionals would learn from this cluster

Format as JSON: {{"title": "...", "description": "..."}}"#
        )
    }

    /// Prompt asking for 0-3 key concepts in a single message
    pub fn concept_extraction_prompt(message: &str) -> String {
        format!(
            r#"You are an assistant that extracts 0-3 key concepts from a single message in a conversation.
A concept is a short, self-contained description of a distinct subject, theme, or problem discussed.
Do not include chit-chat, pleasantries, or unrelated text.

Guidelines:
- Each concept must have both a title and a one-sentence summary.
- The title must be 2-6 words.
- Use plain language, no hashtags.
- Prefer combining closely related details into one clear concept.
- If no meaningful concept is present, return an empty list.

Output:
- Return JSON only. No extra text, no code fences, no markdown.
- Use exactly this schema and field names:

{{
  "concepts": [
    {{
      "title": "short title (2-6 words)",
      "summary": "one-sentence summary of the concept"
    }}
  ]
}}

If none, return: {{"concepts": []}}

Message: {message}"#
        )
    }

    /// Prompt asking for 5-8 topics adjacent to a course's existing concepts
    pub fn related_topics_prompt(
        existing_concepts: &[String],
        course_title: &str,
        course_description: &str,
    ) -> String {
        let concepts_text = existing_concepts
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You are an AI learning assistant that identifies related concepts for educational courses.

Given a course and its existing topics, suggest 5-8 related topics that would complement the learning journey. These should be:
1. Related to the existing topics but not duplicates
2. At appropriate difficulty levels (beginner, medium, advanced)
3. Valuable for deepening understanding of the subject area
4. Practical and actionable learning topics

Respond with ONLY a valid JSON array in this format:
[
  {{
    "title": "Related Topic Title",
    "difficulty_level": "beginner|medium|advanced"
  }}
]

Do not include any explanations or additional text outside the JSON.

Course: {course_title}
Description: {course_description}

Existing Topics:
{concepts_text}

Generate 5-8 related topics that would complement this learning path:"#
        )
    }
}

/// Anthropic Messages API client
///
/// Requires the `anthropic` feature to be enabled.
#[cfg(feature = "anthropic")]
pub struct AnthropicOracle {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[cfg(feature = "anthropic")]
impl AnthropicOracle {
    /// Create a client with default settings
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 800,
        }
    }

    /// Create a client with custom settings
    pub fn with_config(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model: model.unwrap_or_else(|| "claude-3-5-sonnet-20241022".to_string()),
            max_tokens: max_tokens.unwrap_or(800),
        }
    }
}

#[cfg(feature = "anthropic")]
#[async_trait]
impl Oracle for AnthropicOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        use crate::error::MasteryError;

        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "temperature": 0.1,
                "messages": [{"role": "user", "content": prompt}],
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MasteryError::Oracle(format!(
                "Messages API error {}: {}",
                status, body
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let text = data["content"][0]["text"]
            .as_str()
            .ok_or_else(|| MasteryError::Oracle("Invalid response format".to_string()))?;

        Ok(text.trim().to_string())
    }
}

/// Test doubles for the oracle boundary
pub mod testing {
    use super::Oracle;
    use crate::error::{MasteryError, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    enum Behavior {
        Respond(String),
        RespondMany(Mutex<VecDeque<String>>),
        Delayed(String, std::time::Duration),
        Fail(String),
        Hang,
    }

    /// Scriptable oracle for tests; records every prompt it receives
    pub struct MockOracle {
        behavior: Behavior,
        prompts: Mutex<Vec<String>>,
    }

    impl MockOracle {
        /// Always return the same response
        pub fn returning(response: &str) -> Self {
            Self {
                behavior: Behavior::Respond(response.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Return responses in order, then repeat the last one
        pub fn sequence(responses: Vec<String>) -> Self {
            Self {
                behavior: Behavior::RespondMany(Mutex::new(responses.into())),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Return a response after a fixed delay; exercises single-flight
        pub fn delayed(response: &str, delay: std::time::Duration) -> Self {
            Self {
                behavior: Behavior::Delayed(response.to_string(), delay),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Always fail with an oracle error
        pub fn failing(message: &str) -> Self {
            Self {
                behavior: Behavior::Fail(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Never resolve; exercises timeout handling
        pub fn hanging() -> Self {
            Self {
                behavior: Behavior::Hang,
                prompts: Mutex::new(Vec::new()),
            }
        }

        /// Prompts received so far
        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().clone()
        }
    }

    #[async_trait]
    impl Oracle for MockOracle {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().push(prompt.to_string());
            match &self.behavior {
                Behavior::Respond(r) => Ok(r.clone()),
                Behavior::RespondMany(queue) => {
                    let mut q = queue.lock();
                    if q.len() > 1 {
                        Ok(q.pop_front().unwrap())
                    } else {
                        q.front()
                            .cloned()
                            .ok_or_else(|| MasteryError::Oracle("Mock queue empty".into()))
                    }
                }
                Behavior::Delayed(r, delay) => {
                    tokio::time::sleep(*delay).await;
                    Ok(r.clone())
                }
                Behavior::Fail(m) => Err(MasteryError::Oracle(m.clone())),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }
}
