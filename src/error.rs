use std::time::Duration;

use thiserror::Error;

use crate::validator::Rejection;

#[derive(Error, Debug)]
pub enum NsqlError {
    #[error("Schema load error: {0}")]
    SchemaLoad(String),

    #[error("Schema descriptor error: {0}")]
    SchemaDescriptor(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    #[error("No safe SQL after {attempts} generation attempts; last rejection: {last}")]
    RetriesExhausted {
        attempts: usize,
        last: Rejection,
        rejections: Vec<Rejection>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Execution timed out after {0:?}")]
    ExecutionTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NsqlError>;
