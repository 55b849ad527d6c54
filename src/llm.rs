//! LLM collaborator: turns a natural-language query plus retrieved schema
//! context into a candidate SQL string.
//!
//! The model is treated as an untrusted text generator; nothing it returns
//! is executed without passing the validator first.

use async_trait::async_trait;
use itertools::Itertools;
use tracing::debug;

use crate::error::{NsqlError, Result};
use crate::schema_rag::RetrievedContext;

/// The orchestrator's only view of the language model. `feedback` carries
/// the previous rejection reason so the model can self-correct on retry.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        query: &str,
        context: &RetrievedContext,
        feedback: Option<&str>,
    ) -> Result<String>;
}

pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "You are an expert SQL developer. Always respond with a single SQL query and no other text."},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
            "max_tokens": 1000
        });

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NsqlError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NsqlError::Generation(format!(
                "LLM API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NsqlError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| NsqlError::Generation("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate_sql(
        &self,
        query: &str,
        context: &RetrievedContext,
        feedback: Option<&str>,
    ) -> Result<String> {
        // Dummy mode keeps the pipeline runnable without credentials: a
        // trivially valid query over the top-ranked table.
        if self.api_key == "dummy-api-key" {
            return Ok(match context.tables.first() {
                Some(table) => format!("SELECT * FROM {}", table.name),
                None => "SELECT 1".to_string(),
            });
        }

        let prompt = build_prompt(query, context, feedback);
        let response = self.call_llm(&prompt).await?;
        debug!("LLM response: {}", response);
        Ok(extract_sql(&response))
    }
}

/// Render the retrieved tables as a structure listing for the prompt.
pub fn render_schema_context(context: &RetrievedContext) -> String {
    context
        .tables
        .iter()
        .map(|table| {
            let mut out = format!("### Table: `{}`\nColumns:\n", table.name);
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let pk = if col.primary_key { " (PRIMARY KEY)" } else { "" };
                let fk = if col.foreign_key { " (FOREIGN KEY)" } else { "" };
                out.push_str(&format!(
                    "- `{}`: {} [{}{}{}]\n",
                    col.name, col.data_type, nullable, pk, fk
                ));
            }
            if !table.primary_keys.is_empty() {
                out.push_str(&format!(
                    "Primary keys: {}\n",
                    table.primary_keys.iter().map(|k| format!("`{}`", k)).join(", ")
                ));
            }
            for fk in &table.foreign_keys {
                out.push_str(&format!(
                    "Foreign key: `{}` references `{}.{}`\n",
                    fk.constrained_columns.join(", "),
                    fk.referred_table,
                    fk.referred_columns.join(", ")
                ));
            }
            out
        })
        .join("\n")
}

pub fn build_prompt(query: &str, context: &RetrievedContext, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "Convert the natural language query below into a single, correct, executable SQL query.\n\
         \n\
         Instructions:\n\
         1. Use only the table structures provided.\n\
         2. Generate exactly one SELECT statement; never modify data or schema.\n\
         3. If multiple tables are relevant, join them on their primary/foreign key relationships.\n\
         4. Follow standard SQL syntax; output only the SQL query, no explanations.\n\
         \n\
         Natural language query:\n\"{}\"\n\
         \n\
         Relevant tables:\n\n{}",
        query,
        render_schema_context(context)
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\nA previous attempt was rejected by the SQL validator:\n{}\n\
             Generate a corrected query that avoids this problem.\n",
            feedback
        ));
    }

    prompt
}

/// Strip markdown code fences from a model response, returning the bare SQL.
pub fn extract_sql(response_text: &str) -> String {
    let cleaned = response_text.trim();

    if let Some(start) = cleaned.find("```sql") {
        let start = start + "```sql".len();
        let end = cleaned[start..]
            .find("```")
            .map(|e| start + e)
            .unwrap_or(cleaned.len());
        return cleaned[start..end].trim().to_string();
    }

    if let Some(start) = cleaned.find("```") {
        let mut start = start + 3;
        // Skip a language identifier like ```postgres
        if let Some(newline) = cleaned[start..].find('\n') {
            let first_line = &cleaned[start..start + newline];
            if !first_line.trim().is_empty() && first_line.chars().all(|c| c.is_alphanumeric()) {
                start += newline;
            }
        }
        let end = cleaned[start..]
            .find("```")
            .map(|e| start + e)
            .unwrap_or(cleaned.len());
        return cleaned[start..end].trim().to_string();
    }

    cleaned.to_string()
}
