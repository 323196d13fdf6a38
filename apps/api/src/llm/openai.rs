//! OpenAI-compatible implementation of the gateway, speaking the
//! `/chat/completions` wire protocol over reqwest.

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::prompts::{EXTRACTION_SYSTEM, INTERVIEWER_SYSTEM, MAPPING_SYSTEM};
use super::{
    ChatTurn, GatewayError, GatewayReply, LanguageModelGateway, PhraseCandidates, PhraseMapping,
    SkillPhrase,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExtractionOutput {
    skills: Vec<SkillPhrase>,
}

#[derive(Debug, Deserialize)]
struct MappingOutput {
    mappings: Vec<PhraseMapping>,
}

/// Gateway implementation for any OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiGateway {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGateway {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    /// Constructor with an explicit base URL, used in production (config
    /// carries the URL) and in tests to point at a mock server.
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    /// Makes one chat-completions call. No retries: a throttled or failed
    /// call surfaces immediately and the caller decides what degrades.
    async fn call(
        &self,
        messages: Vec<WireMessage>,
        temperature: Option<f32>,
    ) -> Result<GatewayReply, GatewayError> {
        let request_body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(GatewayError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Try to parse the provider's error envelope
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(GatewayError::Provider(format!(
                "API error (status {status}): {message}"
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let token_usage = completion.usage.map(|u| u.total_tokens).unwrap_or(0);
        let model_name = completion.model.unwrap_or_else(|| self.model.clone());

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                GatewayError::MalformedResponse("provider returned empty content".to_string())
            })?;

        debug!("LLM call succeeded: total_tokens={token_usage}, model={model_name}");

        Ok(GatewayReply {
            content,
            token_usage,
            model_name,
        })
    }

    /// Calls the model with a structured prompt and deserializes the text
    /// reply as JSON. The prompt must instruct the model to return valid
    /// JSON.
    async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user_content: String,
    ) -> Result<T, GatewayError> {
        let reply = self
            .call(
                vec![
                    WireMessage {
                        role: "system".to_string(),
                        content: system.to_string(),
                    },
                    WireMessage {
                        role: "user".to_string(),
                        content: user_content,
                    },
                ],
                Some(0.0),
            )
            .await?;

        let text = strip_json_fences(&reply.content);
        serde_json::from_str(text).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl LanguageModelGateway for OpenAiGateway {
    async fn generate_reply(&self, history: &[ChatTurn]) -> Result<GatewayReply, GatewayError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: INTERVIEWER_SYSTEM.to_string(),
        });
        for turn in history {
            messages.push(WireMessage {
                role: turn.role.as_str().to_string(),
                content: turn.content.clone(),
            });
        }

        self.call(messages, None).await
    }

    async fn extract_skill_phrases(
        &self,
        message_text: &str,
    ) -> Result<Vec<SkillPhrase>, GatewayError> {
        let output: ExtractionOutput = self
            .call_json(EXTRACTION_SYSTEM, message_text.to_string())
            .await?;
        Ok(output.skills)
    }

    async fn map_phrases(
        &self,
        batch: &[PhraseCandidates],
    ) -> Result<Vec<PhraseMapping>, GatewayError> {
        // Compact payload: the model only needs the phrase and each
        // candidate's uri/title/description to choose.
        let payload: Vec<_> = batch
            .iter()
            .map(|pc| {
                json!({
                    "phrase": pc.phrase.phrase,
                    "candidates": pc.candidates.iter().map(|c| {
                        json!({
                            "uri": c.uri,
                            "title": c.title,
                            "description": c.description.get(&c.reference_language),
                        })
                    }).collect::<Vec<_>>(),
                })
            })
            .collect();

        let user_content = serde_json::to_string(&payload)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let output: MappingOutput = self.call_json(MAPPING_SYSTEM, user_content).await?;
        Ok(output.mappings)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
