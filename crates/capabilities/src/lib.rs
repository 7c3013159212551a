//! Capability ports for the analysis pipeline
//!
//! Nodes never talk to a model server, a file or a database directly. They
//! go through the narrow async traits defined here:
//! - **Completion**: free text and schema-constrained JSON
//! - **Embedding**: document and query vectors for one model
//! - **Tabular**: bounded CSV sample reads and writes
//! - **Registry**: dataset id to source id and storage path
//!
//! `OpenAiCompatibleClient` implements the completion and embedding ports
//! against any server exposing `/v1/chat/completions` and `/v1/embeddings`.
//!
//! # Example
//!
//! ```rust,ignore
//! use capabilities::{CompletionRequest, OpenAiCompatibleClient, TextCompletion};
//!
//! let client = OpenAiCompatibleClient::new("http://127.0.0.1:11434")
//!     .with_chat_model("llama3.1")
//!     .with_embedding_model("multilingual-e5-small");
//!
//! let answer = client.complete(&CompletionRequest::new("Hello")).await?;
//! ```

pub mod backend;
pub mod embedding;
pub mod error;
pub mod ports;
pub mod registry;
pub mod tabular;
pub mod types;

pub use backend::OpenAiCompatibleClient;
pub use embedding::{l2_normalize, PrefixedEmbedder};
pub use error::PortError;
pub use ports::{
    complete_structured, EmbedDocuments, EmbedQuery, Embedder, JsonSchema, StructuredCompletion,
    StructuredOutput, TextCompletion,
};
pub use registry::{DatasetRecord, DatasetRegistry, InMemoryDatasetRegistry};
pub use tabular::{parse_number, write_csv, CsvSampleReader, ReadTabularSample, Table};
pub use types::{ChatMessage, ChatRequest, CompletionRequest};
