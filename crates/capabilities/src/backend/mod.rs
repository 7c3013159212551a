//! Provider adapters implementing the capability ports

pub mod openai;

pub use openai::OpenAiCompatibleClient;
