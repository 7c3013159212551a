//! OpenAI-compatible HTTP adapter
//!
//! Works with any server exposing the OpenAI chat and embeddings routes
//! (Ollama, llama.cpp server, vLLM and hosted providers).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::PortError;
use crate::ports::{EmbedDocuments, EmbedQuery, Embedder, JsonSchema, StructuredCompletion, TextCompletion};
use crate::types::{ChatRequest, CompletionRequest};

const DEFAULT_CHAT_MODEL: &str = "llama3.1";
const DEFAULT_EMBEDDING_MODEL: &str = "multilingual-e5-small";

/// Client for an OpenAI-compatible server
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    /// HTTP client for API requests
    http_client: reqwest::Client,
    /// Base URL without trailing slash, e.g. `http://127.0.0.1:11434`
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the server answers the model listing route
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.authorized(self.http_client.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn chat_request(&self, request: &CompletionRequest, response_format: Option<Value>) -> ChatRequest {
        ChatRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.chat_model.clone()),
            messages: request.messages(),
            stream: false,
            temperature: request.temperature,
            response_format,
        }
    }

    async fn post_json(&self, route: &str, body: &impl serde::Serialize) -> Result<Value, PortError> {
        let url = format!("{}{}", self.base_url, route);
        let response = self
            .authorized(self.http_client.post(&url))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Request(format!("API error {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| PortError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, PortError> {
        let expected = input.len();
        let body = json!({
            "input": input,
            "model": self.embedding_model,
        });
        let response = self.post_json("/v1/embeddings", &body).await?;
        let vectors = parse_embeddings(&response)?;
        if vectors.len() != expected {
            return Err(PortError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl TextCompletion for OpenAiCompatibleClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PortError> {
        let body = self.chat_request(request, None);
        let response = self.post_json("/v1/chat/completions", &body).await?;
        parse_chat_content(&response)
    }
}

#[async_trait]
impl StructuredCompletion for OpenAiCompatibleClient {
    async fn complete_json(
        &self,
        schema: &JsonSchema,
        request: &CompletionRequest,
    ) -> Result<Value, PortError> {
        let format = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        });
        let body = self.chat_request(request, Some(format));
        let response = self.post_json("/v1/chat/completions", &body).await?;
        let content = parse_chat_content(&response)?;
        serde_json::from_str(strip_code_fence(&content)).map_err(|e| {
            PortError::InvalidResponse(format!("'{}' response is not JSON: {}", schema.name, e))
        })
    }
}

#[async_trait]
impl EmbedDocuments for OpenAiCompatibleClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts.to_vec()).await
    }
}

#[async_trait]
impl EmbedQuery for OpenAiCompatibleClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PortError> {
        self.embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| PortError::InvalidResponse("empty embedding response".to_string()))
    }
}

impl Embedder for OpenAiCompatibleClient {
    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

/// Extract `choices[0].message.content`
fn parse_chat_content(response: &Value) -> Result<String, PortError> {
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| PortError::InvalidResponse("Missing message content".to_string()))
}

/// Extract embedding vectors ordered by their `index` field
fn parse_embeddings(response: &Value) -> Result<Vec<Vec<f32>>, PortError> {
    let data = response
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| PortError::InvalidResponse("Invalid embedding response format".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| PortError::InvalidResponse("Missing embedding vector".to_string()))?;

        let vector: Vec<f32> = embedding
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Some servers wrap JSON output in a markdown fence
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
