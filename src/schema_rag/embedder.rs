//! Schema Embedder
//!
//! Embeds queries and serialized table descriptions using an
//! OpenAI-compatible embeddings API.

use crate::catalog::TableDescription;
use crate::error::{NsqlError, Result};

/// Vector embedding (simple f32 vector)
pub type Embedding = Vec<f32>;

/// Embedding client using an OpenAI-compatible API
pub struct SchemaEmbedder {
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
}

impl SchemaEmbedder {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
        }
    }

    /// Embed a table's serialized description
    pub async fn embed_table(&self, table: &TableDescription) -> Result<Embedding> {
        let text = table_to_text(table);
        self.embed_text(&text).await
    }

    /// Embed arbitrary text
    pub async fn embed_text(&self, text: &str) -> Result<Embedding> {
        // Handle dummy mode
        if self.api_key == "dummy-api-key" {
            // Deterministic dummy embedding (1536 dims for text-embedding-3-small)
            return Ok(vec![0.1; 1536]);
        }

        let client = reqwest::Client::new();

        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NsqlError::Retrieval(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NsqlError::Retrieval(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NsqlError::Retrieval(format!("Failed to parse embedding response: {}", e)))?;

        let data = response_json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| NsqlError::Retrieval("No embedding data in response".to_string()))?;

        let embedding: Vec<f32> = data
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| NsqlError::Retrieval("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        Ok(embedding)
    }
}

/// Serialize a table description into searchable text: name, columns with
/// types and key markers, foreign-key relationships.
pub fn table_to_text(table: &TableDescription) -> String {
    let mut parts = Vec::new();
    parts.push(format!("Table '{}' has {} columns:", table.name, table.columns.len()));

    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let mut s = format!("{} of type {}", c.name, c.data_type);
            if c.primary_key {
                s.push_str(" (primary key)");
            }
            if !c.nullable {
                s.push_str(" (not null)");
            }
            s
        })
        .collect();
    parts.push(columns.join(", "));

    if !table.primary_keys.is_empty() {
        parts.push(format!("Primary keys: {}", table.primary_keys.join(", ")));
    }

    for fk in &table.foreign_keys {
        parts.push(format!(
            "Foreign key: {} references {}.{}",
            fk.constrained_columns.join(", "),
            fk.referred_table,
            fk.referred_columns.join(", ")
        ));
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;

    #[test]
    fn test_table_to_text() {
        let json = r#"[
            {
                "name": "orders",
                "columns": [
                    {"name": "id", "type": "INTEGER", "nullable": false, "primary_key": true},
                    {"name": "customer_id", "type": "INTEGER", "nullable": false}
                ],
                "primary_keys": ["id"],
                "foreign_keys": [
                    {"constrained_columns": ["customer_id"], "referred_table": "orders", "referred_columns": ["id"]}
                ]
            }
        ]"#;
        let catalog = SchemaCatalog::from_descriptor_json(json).unwrap();
        let text = table_to_text(catalog.get("orders").unwrap());
        assert!(text.contains("Table 'orders'"));
        assert!(text.contains("id of type INTEGER (primary key) (not null)"));
        assert!(text.contains("customer_id references orders.id"));
    }

    #[tokio::test]
    async fn test_dummy_mode_is_offline() {
        let embedder = SchemaEmbedder::new(
            "dummy-api-key".to_string(),
            "http://localhost:0".to_string(),
            "text-embedding-3-small".to_string(),
        );
        let embedding = embedder.embed_text("anything").await.unwrap();
        assert_eq!(embedding.len(), 1536);
    }
}
