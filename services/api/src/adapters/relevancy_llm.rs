//! services/api/src/adapters/relevancy_llm.rs
//!
//! This module contains the adapter for the relevancy-scoring LLM.
//! It implements the `RelevancyScoringService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You rate how relevant a paper is to a systematic review.

Read the research question, the review keywords and the paper's title and abstract.
Answer with a single number between 0 and 1:
- 1.0 means the paper clearly addresses the research question.
- 0.0 means it is unrelated.
Respond with ONLY the number."#;

const USER_INPUT_TEMPLATE: &str = r#"RESEARCH QUESTION:
{question}

KEYWORDS:
{keywords}

TITLE:
{title}

ABSTRACT:
{abstract}"#;

/// Abstracts longer than this are cut before they are sent.
const MAX_ABSTRACT_CHARS: usize = 4000;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use rapid_review_core::ports::{PortError, PortResult, RelevancyScoringService};
use rapid_review_core::{Paper, Project};
use tracing::{debug, warn};

pub struct OpenAiRelevancyAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiRelevancyAdapter {
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

/// Reads the first number in the reply and checks it lies in `[0, 1]`.
pub fn parse_score(content: &str) -> PortResult<f64> {
    let token = content
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|t| !t.is_empty() && t.chars().any(|c| c.is_ascii_digit()))
        .ok_or_else(|| {
            PortError::Unexpected(format!("Relevancy LLM returned no score: '{}'", content.trim()))
        })?;

    let score: f64 = token
        .trim_end_matches('.')
        .parse()
        .map_err(|_| PortError::Unexpected(format!("Unreadable relevancy score '{}'", token)))?;

    if !(0.0..=1.0).contains(&score) {
        return Err(PortError::Unexpected(format!(
            "Relevancy score {} is outside [0, 1]",
            score
        )));
    }
    Ok(score)
}

fn render_user_input(project: &Project, paper: &Paper) -> String {
    let abstract_text: String = paper.abstract_text.chars().take(MAX_ABSTRACT_CHARS).collect();
    USER_INPUT_TEMPLATE
        .replace("{question}", &project.research_question)
        .replace("{keywords}", &project.keywords.join(", "))
        .replace("{title}", &paper.title)
        .replace("{abstract}", &abstract_text)
}

#[async_trait]
impl RelevancyScoringService for OpenAiRelevancyAdapter {
    async fn score_paper(&self, project: &Project, paper: &Paper) -> PortResult<f64> {
        let client = self.client.as_ref().ok_or_else(|| {
            warn!("Relevancy scoring requested but OPENAI_API_KEY is not set");
            PortError::Unexpected("Relevancy scoring is not configured".to_string())
        })?;

        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_INSTRUCTIONS)
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(render_user_input(project, paper))
                    .build()
                    .map_err(|e| PortError::Unexpected(e.to_string()))?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(8u32)
            .temperature(0.0)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| PortError::Unexpected("No relevancy score generated".to_string()))?;

        let score = parse_score(&content)?;
        debug!(paper_id = %paper.id, score, "Relevancy score generated");
        Ok(score)
    }
}
