//! Named-entity extraction
//!
//! Sends cleaned document text to a hosted language model and validates the
//! JSON it returns against the `{text, type}` entity shape.

use crate::errors::IngestionError;
use async_trait::async_trait;
use deepsearch_common::config::ExtractionConfig;
use deepsearch_common::db::models::{EntityType, NamedEntity};
use deepsearch_common::errors::AppError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Trait for entity extraction backends
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract entities from already-normalized text.
    ///
    /// Makes at most one outbound call; failures are returned, never retried.
    async fn extract(&self, text: &str) -> Result<Vec<NamedEntity>, IngestionError>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini `generateContent` client
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
    model: String,
    max_chars: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn entity_schema() -> Value {
    let types: Vec<&str> = EntityType::ALL.iter().map(EntityType::as_str).collect();
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "text": { "type": "STRING" },
                "type": { "type": "STRING", "enum": types }
            },
            "propertyOrdering": ["text", "type"]
        }
    })
}

fn build_prompt(text: &str) -> String {
    format!(
        "Extract named entities (PERSON, ORG, LOCATION) from the following text.\n\
         Provide the output as a JSON array where each object has 'text' (the entity name) \
         and 'type' (one of PERSON, ORG, LOCATION). If no entities are found, return an empty array.\n\n\
         Text: \"{}\"",
        text
    )
}

/// First `max_chars` characters of `text`
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Validate model output: a JSON array of `{text, type}` objects.
///
/// Items with a non-string `text` or a `type` outside the known set are
/// dropped. Anything that is not an array is malformed.
pub fn parse_entities(raw: &str) -> Result<Vec<NamedEntity>, IngestionError> {
    let value: Value = serde_json::from_str(raw)?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(IngestionError::MalformedResponse(format!(
                "expected a JSON array of entities, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let entities: Vec<NamedEntity> = items
        .into_iter()
        .filter_map(|item| {
            let text = item.get("text")?.as_str()?;
            let entity_type = item.get("type")?.as_str()?.parse::<EntityType>().ok()?;
            Some(NamedEntity::new(text, entity_type))
        })
        .collect();

    if entities.len() < total {
        debug!(dropped = total - entities.len(), "Discarded invalid entities");
    }

    Ok(entities)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl GeminiExtractor {
    /// Create a new Gemini extractor
    pub fn new(config: &ExtractionConfig) -> Result<Self, IngestionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_chars: config.max_chars,
        })
    }

    async fn make_request(&self, api_key: &str, text: &str) -> Result<Vec<NamedEntity>, IngestionError> {
        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);

        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: build_prompt(text) }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: entity_schema(),
            },
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::EntityApi { status, body });
        }

        let result: GenerateContentResponse = response.json().await?;

        let output = result
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| {
                IngestionError::MalformedResponse("response carried no candidate text".to_string())
            })?;

        parse_entities(&output)
    }
}

#[async_trait]
impl EntityExtractor for GeminiExtractor {
    #[instrument(skip(self, text), fields(model = %self.model, chars = text.len()))]
    async fn extract(&self, text: &str) -> Result<Vec<NamedEntity>, IngestionError> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("No extraction API key configured, skipping entity extraction");
            return Ok(Vec::new());
        };

        let text = truncate_chars(text, self.max_chars);
        let entities = self.make_request(api_key, text).await?;

        debug!(count = entities.len(), "Entities extracted");
        Ok(entities)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Build the configured entity extractor
pub fn create_extractor(config: &ExtractionConfig) -> Result<Arc<dyn EntityExtractor>, AppError> {
    match config.provider.as_str() {
        "gemini" => {
            let extractor = GeminiExtractor::new(config).map_err(|e| AppError::Configuration {
                message: format!("Failed to build extraction client: {}", e),
            })?;
            if extractor.api_key.is_none() {
                warn!("Extraction API key not set; documents will be stored without entities");
            }
            Ok(Arc::new(extractor))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown extraction provider: {}", other),
        }),
    }
}
