//! Retrieval subsystem
//!
//! Each source (one dataset file) gets its own directory under the store
//! root holding a flat inner-product index, the chunk texts and a source
//! record. Rebuilds are skipped when the file checksum is unchanged and are
//! swapped into place as a whole, so readers never see a half-written
//! index.

pub mod checksum;
pub mod chunker;
pub mod error;
pub mod index;
pub mod service;
pub mod store;

pub use checksum::file_checksum;
pub use chunker::{chunk_text, ChunkConfig};
pub use error::{Result, RetrievalError};
pub use index::FlatIndex;
pub use service::{build_context, IndexOutcome, RetrievalService, RetrievedChunk};
pub use store::{ChunkRecord, IndexStore, SourceRecord};
