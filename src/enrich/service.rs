use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::client::{ChatClient, ChatClientConfig, ChatMessage};
use crate::config::EnrichmentSettings;
use crate::error::{ArchError, Result};

/// One unresolved slot sent for inference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    /// `Class.member` or `Class.method.param`, unique within a run
    pub slot: String,
    pub class_name: String,
    pub member: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InferenceResponse {
    pub slot: String,
    /// `None` or `"unresolved"` when the service could not decide
    pub type_name: Option<String>,
    pub confidence: f32,
}

impl InferenceResponse {
    /// The usable type name, if this answer clears `min_confidence`.
    pub fn accepted_type(&self, min_confidence: f32) -> Option<&str> {
        if self.confidence < min_confidence {
            return None;
        }
        let name = self.type_name.as_deref()?.trim();
        if name.is_empty()
            || name.contains('\n')
            || name.eq_ignore_ascii_case("unresolved")
            || name == "Unknown"
        {
            return None;
        }
        Some(name)
    }
}

/// External type-inference backend.
#[async_trait]
pub trait TypeInferenceService: Send + Sync {
    /// May answer a subset of the batch; missing slots stay unresolved.
    async fn infer(&self, batch: &[InferenceRequest]) -> Result<Vec<InferenceResponse>>;
}

/// Confidence assigned when the model answers with a bare type string.
const BARE_ANSWER_CONFIDENCE: f32 = 0.75;

const SYSTEM_PROMPT: &str = "You infer static types for class members in a code base. \
Answer with one JSON object and nothing else. Keys are the slot ids you were given; \
each value is {\"type\": \"<TypeName>\", \"confidence\": <0..1>}. \
Use a single type name, e.g. \"UserRepository\" or \"list[str]\". \
If you cannot tell, use {\"type\": \"unresolved\", \"confidence\": 0}.";

/// Inference over an OpenAI-compatible chat-completions endpoint.
pub struct ChatInferenceService {
    client: ChatClient,
}

impl ChatInferenceService {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &EnrichmentSettings) -> Result<Self> {
        let endpoint = settings.endpoint.clone().ok_or_else(|| {
            ArchError::Config("enrichment.endpoint is required when enrichment is enabled".to_string())
        })?;
        let client = ChatClient::new(ChatClientConfig {
            model: settings.model.clone(),
            endpoint,
            api_key: settings.resolve_api_key(),
            timeout: settings.request_timeout(),
        })?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl TypeInferenceService for ChatInferenceService {
    async fn infer(&self, batch: &[InferenceRequest]) -> Result<Vec<InferenceResponse>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(build_prompt(batch))];
        let content = self.client.complete(&messages).await?;
        parse_answers(&content, batch)
    }
}

fn build_prompt(batch: &[InferenceRequest]) -> String {
    let mut prompt = String::from("Infer the type of each slot.\n");
    for request in batch {
        prompt.push_str(&format!(
            "\nslot: {}\nclass: {}\nmember: {}\ncontext:\n{}\n",
            request.slot, request.class_name, request.member, request.snippet
        ));
    }
    prompt
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SlotAnswer {
    Detailed {
        #[serde(rename = "type")]
        type_name: Option<String>,
        #[serde(default)]
        confidence: Option<f32>,
    },
    Bare(String),
}

/// Reads the model's JSON object, tolerating a surrounding code fence.
fn parse_answers(content: &str, batch: &[InferenceRequest]) -> Result<Vec<InferenceResponse>> {
    let json = strip_code_fences(content);
    let answers: HashMap<String, SlotAnswer> = serde_json::from_str(json)
        .map_err(|e| ArchError::Enrichment(format!("unparseable inference answer: {}", e)))?;

    Ok(batch
        .iter()
        .filter_map(|request| {
            let answer = answers.get(&request.slot)?;
            let (type_name, confidence) = match answer {
                SlotAnswer::Detailed { type_name, confidence } => {
                    (type_name.clone(), confidence.unwrap_or(BARE_ANSWER_CONFIDENCE))
                }
                SlotAnswer::Bare(name) => (Some(name.clone()), BARE_ANSWER_CONFIDENCE),
            };
            Some(InferenceResponse {
                slot: request.slot.clone(),
                type_name,
                confidence,
            })
        })
        .collect())
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the language tag line, e.g. ```json
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}
