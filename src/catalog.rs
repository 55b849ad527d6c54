//! Schema catalog: validated table/column/key metadata for one database.
//!
//! Built once at session setup (from a descriptor file or live
//! introspection) and immutable afterwards, so it can be shared read-only
//! across concurrent agent instances.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{NsqlError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub foreign_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyDescription {
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescription>,
}

impl TableDescription {
    /// Case-insensitive column lookup (SQL identifier semantics).
    pub fn column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable mapping from table name to its description.
///
/// Declaration order of the input is preserved; `tables()` iterates in that
/// order, which the retriever relies on for deterministic tie-breaking.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableDescription>,
    by_name: HashMap<String, usize>,
}

impl SchemaCatalog {
    /// Build a catalog from already-parsed table descriptions, validating
    /// cross-references and normalizing per-column key flags.
    pub fn from_tables(mut tables: Vec<TableDescription>) -> Result<Self> {
        let known: HashSet<String> = tables.iter().map(|t| t.name.to_lowercase()).collect();

        let mut by_name = HashMap::new();
        for (idx, table) in tables.iter_mut().enumerate() {
            if by_name.insert(table.name.to_lowercase(), idx).is_some() {
                return Err(NsqlError::SchemaDescriptor(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
            validate_table(table, &known)?;
            normalize_key_flags(table);
        }

        Ok(Self { tables, by_name })
    }

    /// Parse a JSON descriptor file: an array of table records in the shape
    /// produced by SQLAlchemy-style introspection (name, columns,
    /// primary_keys, foreign_keys). Unknown or missing fields are errors,
    /// never coerced.
    pub fn from_descriptor_json(json: &str) -> Result<Self> {
        let tables: Vec<TableDescription> = serde_json::from_str(json)
            .map_err(|e| NsqlError::SchemaDescriptor(format!("malformed descriptor: {}", e)))?;
        Self::from_tables(tables)
    }

    /// Case-insensitive table lookup.
    pub fn get(&self, name: &str) -> Option<&TableDescription> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&idx| &self.tables[idx])
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[TableDescription] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn validate_table(table: &TableDescription, known_tables: &HashSet<String>) -> Result<()> {
    for pk in &table.primary_keys {
        if table.column(pk).is_none() {
            return Err(NsqlError::SchemaDescriptor(format!(
                "table '{}': primary key '{}' is not a declared column",
                table.name, pk
            )));
        }
    }

    for fk in &table.foreign_keys {
        if fk.constrained_columns.is_empty() {
            return Err(NsqlError::SchemaDescriptor(format!(
                "table '{}': foreign key to '{}' has no constrained columns",
                table.name, fk.referred_table
            )));
        }
        if fk.constrained_columns.len() != fk.referred_columns.len() {
            return Err(NsqlError::SchemaDescriptor(format!(
                "table '{}': foreign key to '{}' has {} constrained columns but {} referred columns",
                table.name,
                fk.referred_table,
                fk.constrained_columns.len(),
                fk.referred_columns.len()
            )));
        }
        for col in &fk.constrained_columns {
            if table.column(col).is_none() {
                return Err(NsqlError::SchemaDescriptor(format!(
                    "table '{}': foreign key column '{}' is not a declared column",
                    table.name, col
                )));
            }
        }
        if !known_tables.contains(&fk.referred_table.to_lowercase()) {
            return Err(NsqlError::SchemaDescriptor(format!(
                "table '{}': foreign key refers to unknown table '{}'",
                table.name, fk.referred_table
            )));
        }
    }

    Ok(())
}

/// Make the per-column flags and the table-level key sets agree: a column
/// flagged `primary_key` must appear in `primary_keys` and vice versa, and
/// `foreign_key` mirrors membership in any FK's constrained columns.
fn normalize_key_flags(table: &mut TableDescription) {
    let mut primary: HashSet<String> = table.primary_keys.iter().map(|k| k.to_lowercase()).collect();
    for col in &table.columns {
        if col.primary_key {
            primary.insert(col.name.to_lowercase());
        }
    }
    let constrained: HashSet<String> = table
        .foreign_keys
        .iter()
        .flat_map(|fk| fk.constrained_columns.iter())
        .map(|c| c.to_lowercase())
        .collect();

    for col in &mut table.columns {
        let lower = col.name.to_lowercase();
        col.primary_key = primary.contains(&lower);
        if constrained.contains(&lower) {
            col.foreign_key = true;
        }
        if col.primary_key && !table.primary_keys.iter().any(|k| k.eq_ignore_ascii_case(&col.name)) {
            table.primary_keys.push(col.name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customers_orders_json() -> &'static str {
        r#"[
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
        ]"#
    }

    #[test]
    fn test_load_descriptor() {
        let catalog = SchemaCatalog::from_descriptor_json(customers_orders_json()).unwrap();
        assert_eq!(catalog.len(), 2);
        let orders = catalog.get("orders").unwrap();
        assert_eq!(orders.columns.len(), 3);
        assert_eq!(orders.foreign_keys[0].referred_table, "customers");
    }

    #[test]
    fn test_get_is_case_insensitive() {
        let catalog = SchemaCatalog::from_descriptor_json(customers_orders_json()).unwrap();
        assert!(catalog.get("CUSTOMERS").is_some());
        assert!(catalog.get("Orders").is_some());
        assert!(catalog.get("invoices").is_none());
    }

    #[test]
    fn test_key_flags_are_normalized() {
        let catalog = SchemaCatalog::from_descriptor_json(customers_orders_json()).unwrap();
        let orders = catalog.get("orders").unwrap();
        assert!(orders.column("id").unwrap().primary_key);
        assert!(orders.column("customer_id").unwrap().foreign_key);
        assert!(!orders.column("total").unwrap().foreign_key);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"[{"name": "t", "columns": [], "primary_keys": [], "sharding": "hash"}]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(matches!(err, NsqlError::SchemaDescriptor(_)));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let json = r#"[{"name": "t", "columns": [{"name": "a", "nullable": true}]}]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(matches!(err, NsqlError::SchemaDescriptor(_)));
    }

    #[test]
    fn test_primary_key_must_exist() {
        let json = r#"[{
            "name": "t",
            "columns": [{"name": "a", "type": "TEXT", "nullable": true}],
            "primary_keys": ["missing"]
        }]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_foreign_key_target_must_exist() {
        let json = r#"[{
            "name": "orders",
            "columns": [{"name": "customer_id", "type": "INTEGER", "nullable": false}],
            "primary_keys": [],
            "foreign_keys": [
                {"constrained_columns": ["customer_id"], "referred_table": "customers", "referred_columns": ["id"]}
            ]
        }]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(err.to_string().contains("customers"));
    }

    #[test]
    fn test_foreign_key_arity_checked() {
        let json = r#"[{
            "name": "t",
            "columns": [{"name": "a", "type": "INTEGER", "nullable": false}],
            "primary_keys": [],
            "foreign_keys": [
                {"constrained_columns": ["a"], "referred_table": "t", "referred_columns": ["x", "y"]}
            ]
        }]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(matches!(err, NsqlError::SchemaDescriptor(_)));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let json = r#"[
            {"name": "t", "columns": [], "primary_keys": []},
            {"name": "T", "columns": [], "primary_keys": []}
        ]"#;
        let err = SchemaCatalog::from_descriptor_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}
