//! Context Retriever
//!
//! Ranks catalog tables against a natural-language query and returns the
//! top-K as context for SQL generation. Scoring combines lexical overlap
//! with (optional) embedding similarity; without an embedding backend the
//! retriever degrades to lexical-only and never fails.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use strsim::jaro_winkler;
use tracing::{debug, warn};

use crate::catalog::{SchemaCatalog, TableDescription};
use crate::config::RetrieverConfig;
use crate::schema_rag::embedder::{Embedding, SchemaEmbedder};

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"[a-z0-9]+").unwrap();
}

/// Similarity above which a fuzzy token match earns credit.
const FUZZY_THRESHOLD: f64 = 0.85;

/// Relevance-ordered schema context, bounded to at most K tables.
/// Ephemeral: produced per query, never cached across queries.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub tables: Vec<TableDescription>,
}

impl RetrievedContext {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

pub struct ContextRetriever {
    config: RetrieverConfig,
    embedder: Option<SchemaEmbedder>,
    // Table embeddings are computed once per table and reused across
    // queries; keyed by lowercased table name.
    embedding_cache: RwLock<HashMap<String, Embedding>>,
}

impl ContextRetriever {
    /// Lexical-only retriever.
    pub fn new(config: RetrieverConfig) -> Self {
        Self {
            config,
            embedder: None,
            embedding_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Retriever with an embedding backend for the semantic signal.
    pub fn with_embedder(config: RetrieverConfig, embedder: SchemaEmbedder) -> Self {
        Self {
            config,
            embedder: Some(embedder),
            embedding_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Select the `k` tables most relevant to `query`, most relevant first.
    ///
    /// Deterministic for identical inputs: stable ranking with ties broken
    /// by catalog declaration order. An empty catalog or `k == 0` yields an
    /// empty context. Tables referenced by foreign key from a selected
    /// table are pulled in (one hop) while slots remain.
    pub async fn retrieve(
        &self,
        query: &str,
        catalog: &SchemaCatalog,
        k: usize,
    ) -> RetrievedContext {
        if catalog.is_empty() || k == 0 {
            return RetrievedContext::default();
        }

        let tables = catalog.tables();
        let query_tokens: Vec<String> = tokenize(query);

        let lexical: Vec<f32> = tables
            .iter()
            .map(|t| lexical_score(&query_tokens, t))
            .collect();

        let semantic = self.semantic_scores(query, tables).await;

        let scores: Vec<f32> = match semantic {
            Some(sem) => lexical
                .iter()
                .zip(sem.iter())
                .map(|(l, s)| self.config.lexical_weight * l + self.config.semantic_weight * s)
                .collect(),
            None => lexical,
        };

        // Rank by score; sort is stable, so equal scores keep declaration order.
        let mut order: Vec<usize> = (0..tables.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // Fill the K slots in rank order, pulling in foreign-key targets of
        // each selected table (one hop) while budget remains.
        let mut seen: HashSet<usize> = HashSet::new();
        let mut selected: Vec<usize> = Vec::new();
        for &idx in &order {
            if selected.len() >= k {
                break;
            }
            if !seen.insert(idx) {
                continue;
            }
            selected.push(idx);
            for fk in &tables[idx].foreign_keys {
                if selected.len() >= k {
                    break;
                }
                if let Some(pos) = tables
                    .iter()
                    .position(|t| t.name.eq_ignore_ascii_case(&fk.referred_table))
                {
                    if seen.insert(pos) {
                        selected.push(pos);
                    }
                }
            }
        }

        // Final context is ordered by relevance regardless of how a table
        // got in, with declaration order as the tie-break.
        selected.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        debug!(
            query,
            selected = selected.len(),
            "retrieved schema context"
        );

        RetrievedContext {
            tables: selected.iter().map(|&i| tables[i].clone()).collect(),
        }
    }

    /// Cosine similarity of the query embedding against each table's cached
    /// embedding. Returns `None` when no backend is configured or the query
    /// cannot be embedded; individual table failures score 0.0.
    async fn semantic_scores(&self, query: &str, tables: &[TableDescription]) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;

        let query_embedding = match embedder.embed_text(query).await {
            Ok(e) => e,
            Err(e) => {
                warn!("query embedding failed, using lexical-only scoring: {}", e);
                return None;
            }
        };

        let mut scores = Vec::with_capacity(tables.len());
        for table in tables {
            let key = table.name.to_lowercase();
            let cached = self.embedding_cache.read().ok()?.get(&key).cloned();
            let embedding = match cached {
                Some(e) => Some(e),
                None => match embedder.embed_table(table).await {
                    Ok(e) => {
                        if let Ok(mut cache) = self.embedding_cache.write() {
                            cache.insert(key, e.clone());
                        }
                        Some(e)
                    }
                    Err(err) => {
                        warn!(table = %table.name, "table embedding failed: {}", err);
                        None
                    }
                },
            };
            scores.push(
                embedding
                    .map(|e| cosine_similarity(&query_embedding, &e))
                    .unwrap_or(0.0),
            );
        }
        Some(scores)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_RE
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() >= 2)
        .unique()
        .collect()
}

/// Fraction of query tokens that match the table name or a column name,
/// with partial credit for substring and fuzzy matches.
fn lexical_score(query_tokens: &[String], table: &TableDescription) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }

    let mut table_tokens: Vec<String> = tokenize(&table.name);
    for name in table.column_names() {
        table_tokens.extend(tokenize(name));
    }
    if table_tokens.is_empty() {
        return 0.0;
    }

    let total: f64 = query_tokens
        .iter()
        .map(|qt| {
            table_tokens
                .iter()
                .map(|tt| token_credit(qt, tt))
                .fold(0.0, f64::max)
        })
        .sum();

    (total / query_tokens.len() as f64) as f32
}

fn token_credit(query_token: &str, table_token: &str) -> f64 {
    if query_token == table_token {
        return 1.0;
    }
    // "customer" vs "customers", "order" vs "order_id"
    if query_token.len() >= 3
        && (table_token.contains(query_token) || query_token.contains(table_token))
    {
        return 0.7;
    }
    let jw = jaro_winkler(query_token, table_token);
    if jw >= FUZZY_THRESHOLD {
        jw * 0.9
    } else {
        0.0
    }
}

/// Compute cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;

    fn shop_catalog() -> SchemaCatalog {
        SchemaCatalog::from_descriptor_json(
            r#"[
            {
                "name": "products",
                "columns": [
                    {"name": "id", "type": "INTEGER", "nullable": false, "primary_key": true},
                    {"name": "title", "type": "TEXT", "nullable": false}
                ],
                "primary_keys": ["id"]
            },
            {
                "name": "customers",
                "columns": [
                    {"name": "id", "type": "INTEGER", "nullable": false, "primary_key": true},
                    {"name": "name", "type": "TEXT", "nullable": false},
                    {"name": "email", "type": "TEXT", "nullable": true}
                ],
                "primary_keys": ["id"]
            },
            {
                "name": "orders",
                "columns": [
                    {"name": "id", "type": "INTEGER", "nullable": false, "primary_key": true},
                    {"name": "customer_id", "type": "INTEGER", "nullable": false},
                    {"name": "total", "type": "NUMERIC", "nullable": false}
                ],
                "primary_keys": ["id"],
                "foreign_keys": [
                    {"constrained_columns": ["customer_id"], "referred_table": "customers", "referred_columns": ["id"]}
                ]
            }
        ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 1.0);

        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Show all customers!"), vec!["show", "all", "customers"]);
        assert_eq!(tokenize("customer_id"), vec!["customer", "id"]);
    }

    #[tokio::test]
    async fn test_bounded_by_k_and_catalog_size() {
        let catalog = shop_catalog();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        for k in 0..6 {
            let context = retriever.retrieve("show all customers", &catalog, k).await;
            assert!(context.len() <= k.min(catalog.len()));
        }
    }

    #[tokio::test]
    async fn test_deterministic() {
        let catalog = shop_catalog();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        let a = retriever.retrieve("orders by customer", &catalog, 2).await;
        let b = retriever.retrieve("orders by customer", &catalog, 2).await;
        let names = |c: &RetrievedContext| {
            c.tables.iter().map(|t| t.name.clone()).collect::<Vec<_>>()
        };
        assert_eq!(names(&a), names(&b));
    }

    #[tokio::test]
    async fn test_empty_catalog_returns_empty() {
        let catalog = SchemaCatalog::from_tables(Vec::new()).unwrap();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        let context = retriever.retrieve("anything", &catalog, 3).await;
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn test_k_exceeding_catalog_returns_all() {
        let catalog = shop_catalog();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        let context = retriever.retrieve("customers", &catalog, 10).await;
        assert_eq!(context.len(), catalog.len());
        // Best match still leads.
        assert_eq!(context.tables[0].name, "customers");
    }

    #[tokio::test]
    async fn test_most_relevant_table_first() {
        let catalog = shop_catalog();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        let context = retriever.retrieve("Show all customers", &catalog, 1).await;
        assert_eq!(context.tables[0].name, "customers");
    }

    #[tokio::test]
    async fn test_foreign_key_target_pulled_in() {
        let catalog = shop_catalog();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        // "orders" ranks first; its FK target (customers) should claim the
        // second slot ahead of the lexically irrelevant products table.
        let context = retriever.retrieve("total of orders", &catalog, 2).await;
        let names: Vec<_> = context.tables.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"orders"));
        assert!(names.contains(&"customers"));
        assert!(!names.contains(&"products"));
    }

    #[tokio::test]
    async fn test_tie_break_is_declaration_order() {
        let catalog = SchemaCatalog::from_descriptor_json(
            r#"[
            {"name": "alpha", "columns": [{"name": "x", "type": "TEXT", "nullable": true}], "primary_keys": []},
            {"name": "beta", "columns": [{"name": "x", "type": "TEXT", "nullable": true}], "primary_keys": []}
        ]"#,
        )
        .unwrap();
        let retriever = ContextRetriever::new(RetrieverConfig::default());
        // No token matches either table: both score zero, declaration order wins.
        let context = retriever.retrieve("unrelated words", &catalog, 2).await;
        let names: Vec<_> = context.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_dummy_embedder_keeps_ranking_stable() {
        let catalog = shop_catalog();
        let embedder = SchemaEmbedder::new(
            "dummy-api-key".to_string(),
            "http://localhost:0".to_string(),
            "text-embedding-3-small".to_string(),
        );
        let retriever = ContextRetriever::with_embedder(RetrieverConfig::default(), embedder);
        let context = retriever.retrieve("Show all customers", &catalog, 1).await;
        assert_eq!(context.tables[0].name, "customers");
    }
}
