//! Capability port traits
//!
//! Each port is an async trait object so the pipeline can hold
//! `Arc<dyn Port>` and tests can swap in hand-written mocks.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PortError;
use crate::types::CompletionRequest;

/// Free-text completion
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, PortError>;
}

/// Named JSON schema sent as a response format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl JsonSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Completion constrained to a JSON schema
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    /// Return a JSON value conforming to `schema`.
    async fn complete_json(
        &self,
        schema: &JsonSchema,
        request: &CompletionRequest,
    ) -> Result<serde_json::Value, PortError>;
}

/// A type that can be requested from a [`StructuredCompletion`] port.
pub trait StructuredOutput: DeserializeOwned + Send {
    fn schema() -> JsonSchema;
}

/// Request a typed structured response
///
/// A value that does not deserialize into `T` is an `InvalidResponse`.
pub async fn complete_structured<T: StructuredOutput>(
    port: &dyn StructuredCompletion,
    request: &CompletionRequest,
) -> Result<T, PortError> {
    let schema = T::schema();
    let value = port.complete_json(&schema, request).await?;
    serde_json::from_value(value).map_err(|e| {
        PortError::InvalidResponse(format!("'{}' did not match its schema: {}", schema.name, e))
    })
}

/// Embeds passages for indexing
#[async_trait]
pub trait EmbedDocuments: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PortError>;
}

/// Embeds a search query
#[async_trait]
pub trait EmbedQuery: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, PortError>;
}

/// Both embedding roles for a single model
pub trait Embedder: EmbedDocuments + EmbedQuery {
    /// Identifier recorded alongside every index built with this model
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Verdict {
        run: bool,
        reason: String,
    }

    impl StructuredOutput for Verdict {
        fn schema() -> JsonSchema {
            JsonSchema::new(
                "verdict",
                json!({
                    "type": "object",
                    "properties": {"run": {"type": "boolean"}, "reason": {"type": "string"}},
                    "required": ["run", "reason"]
                }),
            )
        }
    }

    struct FixedJson(serde_json::Value);

    #[async_trait]
    impl StructuredCompletion for FixedJson {
        async fn complete_json(
            &self,
            schema: &JsonSchema,
            _request: &CompletionRequest,
        ) -> Result<serde_json::Value, PortError> {
            assert_eq!(schema.name, "verdict");
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_complete_structured_deserializes() {
        let port = FixedJson(json!({"run": true, "reason": "missing values"}));
        let verdict: Verdict = complete_structured(&port, &CompletionRequest::new("q"))
            .await
            .unwrap();
        assert!(verdict.run);
        assert_eq!(verdict.reason, "missing values");
    }

    #[tokio::test]
    async fn test_complete_structured_rejects_mismatch() {
        let port = FixedJson(json!({"run": "maybe"}));
        let result = complete_structured::<Verdict>(&port, &CompletionRequest::new("q")).await;
        assert!(matches!(result, Err(PortError::InvalidResponse(_))));
    }
}
