//! Query orchestrator: retrieve schema context once, then drive a bounded
//! generate/validate loop and execute the first accepted statement.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::catalog::SchemaCatalog;
use crate::config::AgentConfig;
use crate::db::executor::{QueryExecutor, QueryResult};
use crate::error::{NsqlError, Result};
use crate::llm::SqlGenerator;
use crate::schema_rag::ContextRetriever;
use crate::validator::{Rejection, SqlValidator, ValidationOutcome};

/// Final outcome of one processed query.
#[derive(Debug)]
pub struct AgentResponse {
    /// The normalized SQL that was executed.
    pub sql: String,
    pub result: QueryResult,
    /// Generation attempts consumed, including the successful one.
    pub attempts: usize,
}

pub struct NsqlAgent {
    catalog: Arc<SchemaCatalog>,
    retriever: ContextRetriever,
    generator: Arc<dyn SqlGenerator>,
    executor: Arc<dyn QueryExecutor>,
    validator: SqlValidator,
    config: AgentConfig,
}

impl NsqlAgent {
    pub fn new(
        catalog: Arc<SchemaCatalog>,
        retriever: ContextRetriever,
        generator: Arc<dyn SqlGenerator>,
        executor: Arc<dyn QueryExecutor>,
        config: AgentConfig,
    ) -> Self {
        Self {
            catalog,
            retriever,
            generator,
            executor,
            validator: SqlValidator::new(),
            config,
        }
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Drive one query through retrieval, generation, validation and
    /// execution. Rejections are fed back into the prompt and retried up
    /// to the configured budget; execution failures are terminal.
    pub async fn process_query(&self, natural_query: &str) -> Result<AgentResponse> {
        info!("Processing natural language query: {}", natural_query);

        // Retrieval runs once; the schema context does not change between
        // generation attempts.
        let context = self
            .retriever
            .retrieve(natural_query, &self.catalog, self.config.top_k)
            .await;
        if context.is_empty() {
            return Err(NsqlError::Retrieval(
                "no relevant tables found for the query".to_string(),
            ));
        }
        debug!(tables = context.len(), "retrieved schema context");

        let max_attempts = self.config.retry_budget + 1;
        let mut attempts = 0;
        let mut timeouts = 0;
        let mut feedback: Option<String> = None;
        let mut rejections: Vec<Rejection> = Vec::new();

        loop {
            let generated = timeout(
                self.config.generation_timeout,
                self.generator
                    .generate_sql(natural_query, &context, feedback.as_deref()),
            )
            .await;

            let candidate = match generated {
                Err(_) => {
                    // A timeout is a distinct failure, not a rejection; it
                    // does not consume the retry budget but is bounded.
                    if timeouts < self.config.max_timeout_retries {
                        timeouts += 1;
                        warn!("generation timed out, retrying");
                        continue;
                    }
                    return Err(NsqlError::GenerationTimeout(self.config.generation_timeout));
                }
                Ok(Err(e)) => {
                    attempts += 1;
                    warn!(attempt = attempts, "generation failed: {}", e);
                    if attempts >= max_attempts {
                        return Err(NsqlError::Generation(format!(
                            "LLM failed after {} attempts: {}",
                            attempts, e
                        )));
                    }
                    continue;
                }
                Ok(Ok(sql)) => sql,
            };

            attempts += 1;
            debug!(attempt = attempts, candidate = %candidate, "validating candidate SQL");

            match self.validator.validate(&candidate, Some(self.catalog.as_ref())) {
                ValidationOutcome::Accepted { normalized_sql } => {
                    info!(attempt = attempts, "accepted SQL: {}", normalized_sql);
                    let result = self.execute(&normalized_sql).await?;
                    return Ok(AgentResponse {
                        sql: normalized_sql,
                        result,
                        attempts,
                    });
                }
                ValidationOutcome::Rejected(rejection) => {
                    warn!(attempt = attempts, "rejected SQL: {}", rejection);
                    feedback = Some(rejection.to_string());
                    rejections.push(rejection.clone());
                    if attempts >= max_attempts {
                        return Err(NsqlError::RetriesExhausted {
                            attempts,
                            last: rejection,
                            rejections,
                        });
                    }
                }
            }
        }
    }

    /// Execution failures are never routed back into the generation loop:
    /// the SQL was already judged valid, so a retry would not help.
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        match timeout(self.config.execution_timeout, self.executor.execute(sql)).await {
            Err(_) => Err(NsqlError::ExecutionTimeout(self.config.execution_timeout)),
            Ok(result) => result,
        }
    }
}
