//! Schema RAG: retrieval of relevant table context for SQL generation.

pub mod embedder;
pub mod retriever;

pub use embedder::{Embedding, SchemaEmbedder};
pub use retriever::{ContextRetriever, RetrievedContext};
