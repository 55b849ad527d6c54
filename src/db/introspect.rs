//! Schema introspection: build a SchemaCatalog from a live database.

use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::catalog::{ColumnDescription, ForeignKeyDescription, SchemaCatalog, TableDescription};
use crate::error::{NsqlError, Result};

/// Introspect tables, columns, primary keys and foreign keys of the
/// `public` schema. Fails with a schema-load error when introspection
/// fails or the schema holds no tables.
pub async fn introspect_catalog(pool: &PgPool) -> Result<SchemaCatalog> {
    let table_names = load_table_names(pool).await?;
    if table_names.is_empty() {
        return Err(NsqlError::SchemaLoad(
            "introspection returned zero tables".to_string(),
        ));
    }

    let known: std::collections::HashSet<String> = table_names.iter().cloned().collect();
    let mut columns = load_columns(pool).await?;
    let mut primary_keys = load_primary_keys(pool).await?;
    let mut foreign_keys = load_foreign_keys(pool).await?;

    let mut tables = Vec::with_capacity(table_names.len());
    for name in table_names {
        let mut fks = foreign_keys.remove(&name).unwrap_or_default();
        // A target outside the introspected schema cannot be described;
        // drop the constraint rather than fail the whole load.
        fks.retain(|fk: &ForeignKeyDescription| {
            let keep = known.contains(&fk.referred_table);
            if !keep {
                warn!(
                    table = %name,
                    referred = %fk.referred_table,
                    "dropping foreign key to table outside the schema"
                );
            }
            keep
        });

        tables.push(TableDescription {
            columns: columns.remove(&name).unwrap_or_default(),
            primary_keys: primary_keys.remove(&name).unwrap_or_default(),
            foreign_keys: fks,
            name,
        });
    }

    info!(tables = tables.len(), "introspected database schema");
    SchemaCatalog::from_tables(tables)
}

async fn load_table_names(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| NsqlError::SchemaLoad(format!("Failed to list tables: {}", e)))?;

    rows.into_iter()
        .map(|row| {
            row.try_get("table_name")
                .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read table name: {}", e)))
        })
        .collect()
}

async fn load_columns(pool: &PgPool) -> Result<HashMap<String, Vec<ColumnDescription>>> {
    let rows = sqlx::query(
        r#"
        SELECT table_name, column_name, data_type, is_nullable
        FROM information_schema.columns
        WHERE table_schema = 'public'
        ORDER BY table_name, ordinal_position
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| NsqlError::SchemaLoad(format!("Failed to list columns: {}", e)))?;

    let mut columns: HashMap<String, Vec<ColumnDescription>> = HashMap::new();
    for row in rows {
        let table: String = row
            .try_get("table_name")
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read column row: {}", e)))?;
        let name: String = row
            .try_get("column_name")
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read column row: {}", e)))?;
        let data_type: String = row.try_get("data_type").unwrap_or_default();
        let is_nullable: String = row.try_get("is_nullable").unwrap_or_default();

        columns.entry(table).or_default().push(ColumnDescription {
            name,
            data_type,
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            primary_key: false,
            foreign_key: false,
        });
    }
    Ok(columns)
}

async fn load_primary_keys(pool: &PgPool) -> Result<HashMap<String, Vec<String>>> {
    let rows = sqlx::query(
        r#"
        SELECT tc.table_name, kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        WHERE tc.table_schema = 'public' AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY tc.table_name, kcu.ordinal_position
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| NsqlError::SchemaLoad(format!("Failed to list primary keys: {}", e)))?;

    let mut keys: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let table: String = row
            .try_get("table_name")
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read key row: {}", e)))?;
        let column: String = row
            .try_get("column_name")
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read key row: {}", e)))?;
        keys.entry(table).or_default().push(column);
    }
    Ok(keys)
}

async fn load_foreign_keys(pool: &PgPool) -> Result<HashMap<String, Vec<ForeignKeyDescription>>> {
    let rows = sqlx::query(
        r#"
        SELECT tc.table_name,
               tc.constraint_name,
               kcu.column_name,
               ccu.table_name AS referred_table,
               ccu.column_name AS referred_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
          ON tc.constraint_name = ccu.constraint_name
         AND tc.table_schema = ccu.table_schema
        WHERE tc.table_schema = 'public' AND tc.constraint_type = 'FOREIGN KEY'
        ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| NsqlError::SchemaLoad(format!("Failed to list foreign keys: {}", e)))?;

    // Rows arrive one per (constraint, column); fold consecutive rows of
    // the same constraint into one multi-column foreign key.
    let mut fks: HashMap<String, Vec<(String, ForeignKeyDescription)>> = HashMap::new();
    for row in rows {
        let table: String = row
            .try_get("table_name")
            .map_err(|e| NsqlError::SchemaLoad(format!("Failed to read foreign key row: {}", e)))?;
        let constraint: String = row.try_get("constraint_name").unwrap_or_default();
        let column: String = row.try_get("column_name").unwrap_or_default();
        let referred_table: String = row.try_get("referred_table").unwrap_or_default();
        let referred_column: String = row.try_get("referred_column").unwrap_or_default();

        let entries = fks.entry(table).or_default();
        match entries.last_mut() {
            Some((name, fk)) if *name == constraint => {
                fk.constrained_columns.push(column);
                fk.referred_columns.push(referred_column);
            }
            _ => entries.push((
                constraint,
                ForeignKeyDescription {
                    constrained_columns: vec![column],
                    referred_table,
                    referred_columns: vec![referred_column],
                },
            )),
        }
    }

    Ok(fks
        .into_iter()
        .map(|(table, entries)| (table, entries.into_iter().map(|(_, fk)| fk).collect()))
        .collect())
}
