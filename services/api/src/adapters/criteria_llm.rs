//! services/api/src/adapters/criteria_llm.rs
//!
//! This module contains the adapter for the criteria-generating LLM.
//! It implements the `CriteriaGenerationService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You help researchers plan systematic literature reviews.

Given a research question, its keywords and the screening criteria the team already has,
propose additional inclusion and exclusion criteria for abstract screening.

Rules:
- Each criterion is one short, testable sentence a reviewer can apply to an abstract.
- Do NOT repeat or rephrase a criterion that already exists.
- Group criteria with a short category such as "Population", "Intervention", "Outcome",
  "Study design" or "Language". Use null when no category fits.
- Propose at most 8 criteria in total.

Respond with ONLY a JSON object of this shape, no prose and no code fences:
{"criteria": [{"text": "...", "category": "..." , "is_inclusion": true}]}"#;

const USER_INPUT_TEMPLATE: &str = r#"RESEARCH QUESTION:
{question}

KEYWORDS:
{keywords}

EXISTING CRITERIA:
{existing}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use rapid_review_core::ports::{CriteriaGenerationService, PortError, PortResult};
use rapid_review_core::{Criterion, CriterionDraft, Project};
use serde::Deserialize;
use tracing::{info, warn};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CriteriaGenerationService` using an OpenAI-compatible LLM.
///
/// Without a client every call fails with `PortError::Unexpected`, so the rest
/// of the service keeps working when no API key is configured.
#[derive(Clone)]
pub struct OpenAiCriteriaAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiCriteriaAdapter {
    /// Creates a new `OpenAiCriteriaAdapter`.
    pub fn new(client: Option<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Deserialize)]
struct GeneratedCriteria {
    criteria: Vec<GeneratedCriterion>,
}

#[derive(Deserialize)]
struct GeneratedCriterion {
    text: String,
    #[serde(default)]
    category: Option<String>,
    is_inclusion: bool,
}

/// Parses the model's JSON reply, tolerating a surrounding Markdown code fence.
pub fn parse_criteria_response(content: &str) -> PortResult<Vec<CriterionDraft>> {
    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let parsed: GeneratedCriteria = serde_json::from_str(json).map_err(|e| {
        PortError::Unexpected(format!("Criteria LLM returned malformed JSON: {}", e))
    })?;

    Ok(parsed
        .criteria
        .into_iter()
        .map(|c| CriterionDraft {
            text: c.text,
            category: c.category,
            is_inclusion: c.is_inclusion,
        })
        .collect())
}

fn render_user_input(project: &Project, existing: &[Criterion]) -> String {
    let keywords = if project.keywords.is_empty() {
        "(none)".to_string()
    } else {
        project.keywords.join(", ")
    };
    let existing = if existing.is_empty() {
        "(none)".to_string()
    } else {
        existing
            .iter()
            .map(|c| {
                format!(
                    "- [{}] {}{}",
                    if c.is_inclusion { "include" } else { "exclude" },
                    c.category
                        .as_deref()
                        .map(|cat| format!("{}: ", cat))
                        .unwrap_or_default(),
                    c.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    USER_INPUT_TEMPLATE
        .replace("{question}", &project.research_question)
        .replace("{keywords}", &keywords)
        .replace("{existing}", &existing)
}

//=========================================================================================
// `CriteriaGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CriteriaGenerationService for OpenAiCriteriaAdapter {
    async fn generate_criteria(
        &self,
        project: &Project,
        existing: &[Criterion],
    ) -> PortResult<Vec<CriterionDraft>> {
        let client = self.client.as_ref().ok_or_else(|| {
            warn!("Criteria generation requested but OPENAI_API_KEY is not set");
            PortError::Unexpected("Criteria generation is not configured".to_string())
        })?;

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(render_user_input(project, existing))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Criteria LLM response contained no text content.".to_string())
            })?;

        let drafts = parse_criteria_response(&content)?;
        info!(project_id = %project.id, proposed = drafts.len(), "Criteria generated");
        Ok(drafts)
    }
}
