//! SQL safety validator.
//!
//! Accepts only a single, syntactically valid, SELECT-shaped statement and
//! rejects everything else with a machine-readable reason. When a catalog
//! is supplied, table and column references are resolved against it. Pure
//! function of its inputs; the generated SQL is never trusted until it has
//! passed here.

use std::collections::HashSet;
use std::fmt;

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, GroupByExpr, JoinConstraint, JoinOperator, OrderByExpr,
    Query, Select, SelectItem, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::catalog::{SchemaCatalog, TableDescription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SyntaxError,
    ForbiddenOperation,
    MultipleStatements,
    SuspiciousTrailingContent,
    UnknownTable,
    UnknownColumn,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::SyntaxError => "syntax error",
            RejectReason::ForbiddenOperation => "forbidden operation",
            RejectReason::MultipleStatements => "multiple statements",
            RejectReason::SuspiciousTrailingContent => "suspicious trailing content",
            RejectReason::UnknownTable => "unknown table",
            RejectReason::UnknownColumn => "unknown column",
        };
        f.write_str(name)
    }
}

/// A typed refusal to execute a candidate statement.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub reason: RejectReason,
    pub message: String,
}

impl Rejection {
    fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Accepted { normalized_sql: String },
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted { .. })
    }
}

#[derive(Debug, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, candidate: &str, catalog: Option<&SchemaCatalog>) -> ValidationOutcome {
        let dialect = GenericDialect {};
        let statements = match Parser::parse_sql(&dialect, candidate) {
            Ok(statements) => statements,
            Err(e) => {
                return rejected(RejectReason::SyntaxError, e.to_string());
            }
        };

        if statements.is_empty() {
            return rejected(RejectReason::SyntaxError, "empty input");
        }
        if statements.len() > 1 {
            return rejected(
                RejectReason::MultipleStatements,
                format!("{} statements found, expected exactly one", statements.len()),
            );
        }

        let statement = &statements[0];
        let query = match statement {
            Statement::Query(query) => query,
            other => {
                return rejected(RejectReason::ForbiddenOperation, statement_kind(other));
            }
        };

        if let Err(rejection) = check_read_only(query) {
            return ValidationOutcome::Rejected(rejection);
        }
        if let Err(rejection) = check_trailing_content(candidate) {
            return ValidationOutcome::Rejected(rejection);
        }
        if let Some(catalog) = catalog {
            let scope = Scope::default();
            let ctes = HashSet::new();
            if let Err(rejection) = check_query(query, catalog, &scope, &ctes) {
                return ValidationOutcome::Rejected(rejection);
            }
        }

        ValidationOutcome::Accepted {
            normalized_sql: statement.to_string(),
        }
    }
}

fn rejected(reason: RejectReason, message: impl Into<String>) -> ValidationOutcome {
    ValidationOutcome::Rejected(Rejection::new(reason, message))
}

fn statement_kind(statement: &Statement) -> &'static str {
    match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::CreateView { .. } => "CREATE VIEW",
        Statement::CreateIndex { .. } => "CREATE INDEX",
        Statement::CreateSchema { .. } => "CREATE SCHEMA",
        Statement::CreateDatabase { .. } => "CREATE DATABASE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::AlterIndex { .. } => "ALTER INDEX",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Merge { .. } => "MERGE",
        Statement::StartTransaction { .. } => "START TRANSACTION",
        Statement::Commit { .. } => "COMMIT",
        Statement::Rollback { .. } => "ROLLBACK",
        _ => "non-SELECT statement",
    }
}

/// The statement parsed as a query; make sure no DML hides inside a set
/// expression (`WITH x AS (INSERT ...)`-style constructions).
fn check_read_only(query: &Query) -> Result<(), Rejection> {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_read_only(&cte.query)?;
        }
    }
    check_set_expr_read_only(&query.body)
}

fn check_set_expr_read_only(body: &SetExpr) -> Result<(), Rejection> {
    match body {
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(query) => check_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr_read_only(left)?;
            check_set_expr_read_only(right)
        }
        SetExpr::Insert(statement) | SetExpr::Update(statement) => Err(Rejection::new(
            RejectReason::ForbiddenOperation,
            statement_kind(statement),
        )),
    }
}

/// Scan the raw text for comment sequences and statement separators that
/// survive a lenient parse: `--`/`/*` after the statement head, or a `;`
/// followed by anything. String literals are skipped; comments before the
/// statement begins are tolerated.
fn check_trailing_content(sql: &str) -> Result<(), Rejection> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statement_started = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                statement_started = true;
                let quote = c;
                i += 1;
                while i < chars.len() {
                    if chars[i] == quote {
                        // Doubled quote is an escaped quote inside the literal.
                        if chars.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                if statement_started {
                    return Err(Rejection::new(
                        RejectReason::SuspiciousTrailingContent,
                        "comment sequence '--' after statement",
                    ));
                }
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                if statement_started {
                    return Err(Rejection::new(
                        RejectReason::SuspiciousTrailingContent,
                        "comment sequence '/*' after statement",
                    ));
                }
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i += 1;
            }
            ';' => {
                if chars[i + 1..].iter().any(|c| !c.is_whitespace()) {
                    return Err(Rejection::new(
                        RejectReason::SuspiciousTrailingContent,
                        "content after statement separator ';'",
                    ));
                }
            }
            c if !c.is_whitespace() => statement_started = true,
            _ => {}
        }
        i += 1;
    }

    Ok(())
}

/// Tables visible to column references at one query level. A `None` table
/// is an opaque binding (CTE, derived table, table function) whose columns
/// cannot be checked. Projection aliases are legal bare identifiers in
/// ORDER BY / GROUP BY / HAVING, so they are tracked alongside.
#[derive(Clone, Default)]
struct Scope<'a> {
    bindings: Vec<(String, Option<&'a TableDescription>)>,
    column_aliases: HashSet<String>,
}

impl<'a> Scope<'a> {
    fn bind(&mut self, key: &str, table: Option<&'a TableDescription>) {
        self.bindings.push((key.to_lowercase(), table));
    }

    fn resolve(&self, qualifier: &str) -> Option<&(String, Option<&'a TableDescription>)> {
        let lower = qualifier.to_lowercase();
        self.bindings.iter().rev().find(|(key, _)| *key == lower)
    }

    /// The sole table of the scope, when column resolution is unambiguous.
    fn single_table(&self) -> Option<&'a TableDescription> {
        match self.bindings.as_slice() {
            [(_, Some(table))] => Some(*table),
            _ => None,
        }
    }
}

fn check_query<'a>(
    query: &Query,
    catalog: &'a SchemaCatalog,
    outer: &Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    let mut ctes = ctes.clone();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query, catalog, outer, &ctes)?;
            ctes.insert(cte.alias.name.value.to_lowercase());
        }
    }
    check_set_expr(&query.body, &query.order_by, catalog, outer, &ctes)
}

fn check_set_expr<'a>(
    body: &SetExpr,
    order_by: &[OrderByExpr],
    catalog: &'a SchemaCatalog,
    outer: &Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    match body {
        SetExpr::Select(select) => check_select(select, order_by, catalog, outer, ctes),
        SetExpr::Query(query) => check_query(query, catalog, outer, ctes),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left, &[], catalog, outer, ctes)?;
            check_set_expr(right, &[], catalog, outer, ctes)
        }
        // Values and the rest carry no table references to resolve.
        _ => Ok(()),
    }
}

fn check_select<'a>(
    select: &Select,
    order_by: &[OrderByExpr],
    catalog: &'a SchemaCatalog,
    outer: &Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    let mut scope = outer.clone();
    for table_with_joins in &select.from {
        collect_table_refs(table_with_joins, catalog, &mut scope, ctes)?;
    }

    for item in &select.projection {
        if let SelectItem::ExprWithAlias { alias, .. } = item {
            scope.column_aliases.insert(alias.value.to_lowercase());
        }
    }

    // ON constraints see the full scope, so check them after collection.
    for table_with_joins in &select.from {
        for join in &table_with_joins.joins {
            if let Some(on) = join_on_expr(&join.join_operator) {
                check_expr(on, catalog, &scope, ctes)?;
            }
        }
    }

    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                check_expr(expr, catalog, &scope, ctes)?;
            }
            SelectItem::QualifiedWildcard(..) | SelectItem::Wildcard(..) => {}
        }
    }
    if let Some(selection) = &select.selection {
        check_expr(selection, catalog, &scope, ctes)?;
    }
    if let GroupByExpr::Expressions(exprs) = &select.group_by {
        for expr in exprs {
            check_expr(expr, catalog, &scope, ctes)?;
        }
    }
    if let Some(having) = &select.having {
        check_expr(having, catalog, &scope, ctes)?;
    }
    for expr in &select.sort_by {
        check_expr(expr, catalog, &scope, ctes)?;
    }
    for order in order_by {
        check_expr(&order.expr, catalog, &scope, ctes)?;
    }

    Ok(())
}

fn join_on_expr(operator: &JoinOperator) -> Option<&Expr> {
    let constraint = match operator {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c) => c,
        _ => return None,
    };
    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

fn collect_table_refs<'a>(
    table_with_joins: &TableWithJoins,
    catalog: &'a SchemaCatalog,
    scope: &mut Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    collect_factor(&table_with_joins.relation, catalog, scope, ctes)?;
    for join in &table_with_joins.joins {
        collect_factor(&join.relation, catalog, scope, ctes)?;
    }
    Ok(())
}

fn collect_factor<'a>(
    factor: &TableFactor,
    catalog: &'a SchemaCatalog,
    scope: &mut Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            // Lookup by the unqualified name; a schema prefix is not part
            // of the catalog's key space.
            let table_name = name
                .0
                .last()
                .map(|ident| ident.value.as_str())
                .unwrap_or_default();
            let key = alias
                .as_ref()
                .map(|a| a.name.value.as_str())
                .unwrap_or(table_name);

            if ctes.contains(&table_name.to_lowercase()) {
                scope.bind(key, None);
            } else if let Some(table) = catalog.get(table_name) {
                scope.bind(key, Some(table));
            } else {
                return Err(Rejection::new(
                    RejectReason::UnknownTable,
                    format!("table '{}' does not exist in the schema", name),
                ));
            }
        }
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            check_query(subquery, catalog, scope, ctes)?;
            if let Some(alias) = alias {
                scope.bind(&alias.name.value, None);
            }
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_table_refs(table_with_joins, catalog, scope, ctes)?;
        }
        other => {
            // Table functions, UNNEST and friends: columns are opaque.
            if let TableFactor::TableFunction { alias: Some(alias), .. } = other {
                scope.bind(&alias.name.value, None);
            }
        }
    }
    Ok(())
}

fn check_expr<'a>(
    expr: &Expr,
    catalog: &'a SchemaCatalog,
    scope: &Scope<'a>,
    ctes: &HashSet<String>,
) -> Result<(), Rejection> {
    match expr {
        Expr::Identifier(ident) => {
            // A bare column is only checkable when exactly one concrete
            // table is in scope and the name is not a projection alias.
            if scope.column_aliases.contains(&ident.value.to_lowercase()) {
                return Ok(());
            }
            if let Some(table) = scope.single_table() {
                if table.column(&ident.value).is_none() {
                    return Err(unknown_column(&table.name, &ident.value));
                }
            }
            Ok(())
        }
        Expr::CompoundIdentifier(idents) => {
            if idents.len() >= 2 {
                let qualifier = &idents[idents.len() - 2].value;
                let column = &idents[idents.len() - 1].value;
                if let Some((_, Some(table))) = scope.resolve(qualifier) {
                    if table.column(column).is_none() {
                        return Err(unknown_column(&table.name, column));
                    }
                }
            }
            Ok(())
        }
        Expr::BinaryOp { left, right, .. } => {
            check_expr(left, catalog, scope, ctes)?;
            check_expr(right, catalog, scope, ctes)
        }
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) => check_expr(expr, catalog, scope, ctes),
        Expr::IsNull(expr)
        | Expr::IsNotNull(expr)
        | Expr::IsTrue(expr)
        | Expr::IsNotTrue(expr)
        | Expr::IsFalse(expr)
        | Expr::IsNotFalse(expr) => check_expr(expr, catalog, scope, ctes),
        Expr::IsDistinctFrom(left, right) | Expr::IsNotDistinctFrom(left, right) => {
            check_expr(left, catalog, scope, ctes)?;
            check_expr(right, catalog, scope, ctes)
        }
        Expr::InList { expr, list, .. } => {
            check_expr(expr, catalog, scope, ctes)?;
            for item in list {
                check_expr(item, catalog, scope, ctes)?;
            }
            Ok(())
        }
        Expr::InSubquery { expr, subquery, .. } => {
            check_expr(expr, catalog, scope, ctes)?;
            check_query(subquery, catalog, scope, ctes)
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            check_expr(expr, catalog, scope, ctes)?;
            check_expr(low, catalog, scope, ctes)?;
            check_expr(high, catalog, scope, ctes)
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            check_expr(expr, catalog, scope, ctes)?;
            check_expr(pattern, catalog, scope, ctes)
        }
        Expr::Cast { expr, .. } | Expr::TryCast { expr, .. } => {
            check_expr(expr, catalog, scope, ctes)
        }
        Expr::Function(func) => {
            for arg in &func.args {
                let arg_expr = match arg {
                    FunctionArg::Named { arg, .. } => arg,
                    FunctionArg::Unnamed(arg) => arg,
                };
                if let FunctionArgExpr::Expr(expr) = arg_expr {
                    check_expr(expr, catalog, scope, ctes)?;
                }
            }
            if let Some(filter) = &func.filter {
                check_expr(filter, catalog, scope, ctes)?;
            }
            Ok(())
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                check_expr(operand, catalog, scope, ctes)?;
            }
            for expr in conditions.iter().chain(results.iter()) {
                check_expr(expr, catalog, scope, ctes)?;
            }
            if let Some(else_result) = else_result {
                check_expr(else_result, catalog, scope, ctes)?;
            }
            Ok(())
        }
        Expr::Exists { subquery, .. } | Expr::Subquery(subquery) => {
            check_query(subquery, catalog, scope, ctes)
        }
        Expr::Tuple(exprs) => {
            for expr in exprs {
                check_expr(expr, catalog, scope, ctes)?;
            }
            Ok(())
        }
        // Literals and exotic expression forms carry nothing to resolve.
        _ => Ok(()),
    }
}

fn unknown_column(table: &str, column: &str) -> Rejection {
    Rejection::new(
        RejectReason::UnknownColumn,
        format!("column '{}' does not exist on table '{}'", column, table),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_descriptor_json(
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
        ]"#,
        )
        .unwrap()
    }

    fn reason(outcome: ValidationOutcome) -> RejectReason {
        match outcome {
            ValidationOutcome::Rejected(rejection) => rejection.reason,
            ValidationOutcome::Accepted { normalized_sql } => {
                panic!("expected rejection, got accepted: {}", normalized_sql)
            }
        }
    }

    #[test]
    fn test_accepts_plain_select() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT * FROM customers", None);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn test_accepts_joins_and_ctes() {
        let validator = SqlValidator::new();
        let sql = "WITH big AS (SELECT customer_id FROM orders WHERE total > 100) \
                   SELECT c.name FROM customers c JOIN big ON c.id = big.customer_id";
        assert!(validator.validate(sql, Some(&catalog())).is_accepted());
    }

    #[test]
    fn test_accepts_union() {
        let validator = SqlValidator::new();
        let sql = "SELECT name FROM customers UNION SELECT name FROM customers";
        assert!(validator.validate(sql, Some(&catalog())).is_accepted());
    }

    #[test]
    fn test_rejects_dml_and_ddl() {
        let validator = SqlValidator::new();
        for sql in [
            "INSERT INTO customers (name) VALUES ('x')",
            "UPDATE customers SET name = 'x'",
            "DELETE FROM customers",
            "DROP TABLE customers",
            "TRUNCATE TABLE customers",
            "CREATE TABLE t (id INT)",
            "ALTER TABLE customers ADD COLUMN age INT",
        ] {
            assert_eq!(
                reason(validator.validate(sql, None)),
                RejectReason::ForbiddenOperation,
                "{}",
                sql
            );
        }
    }

    #[test]
    fn test_forbidden_message_names_the_kind() {
        let validator = SqlValidator::new();
        match validator.validate("DELETE FROM customers", None) {
            ValidationOutcome::Rejected(rejection) => assert_eq!(rejection.message, "DELETE"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT * FROM customers; DROP TABLE customers;", None);
        assert_eq!(reason(outcome), RejectReason::MultipleStatements);
    }

    #[test]
    fn test_rejects_syntax_error() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELEC * FORM customers", None);
        assert_eq!(reason(outcome), RejectReason::SyntaxError);
    }

    #[test]
    fn test_rejects_trailing_comment() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT * FROM customers -- AND more", None);
        assert_eq!(reason(outcome), RejectReason::SuspiciousTrailingContent);
    }

    #[test]
    fn test_rejects_separator_followed_by_comment() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT * FROM customers; --", None);
        assert_eq!(reason(outcome), RejectReason::SuspiciousTrailingContent);
    }

    #[test]
    fn test_allows_leading_comment_and_trailing_semicolon() {
        let validator = SqlValidator::new();
        assert!(validator
            .validate("-- all customers\nSELECT * FROM customers;", None)
            .is_accepted());
    }

    #[test]
    fn test_comment_sequence_inside_string_literal_is_fine() {
        let validator = SqlValidator::new();
        let sql = "SELECT * FROM customers WHERE name = 'a--b;c'";
        assert!(validator.validate(sql, Some(&catalog())).is_accepted());
    }

    #[test]
    fn test_rejects_unknown_table() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT * FROM invoices", Some(&catalog()));
        assert_eq!(reason(outcome), RejectReason::UnknownTable);
    }

    #[test]
    fn test_rejects_unknown_qualified_column() {
        let validator = SqlValidator::new();
        let sql = "SELECT c.age FROM customers c";
        let outcome = validator.validate(sql, Some(&catalog()));
        assert_eq!(reason(outcome), RejectReason::UnknownColumn);
    }

    #[test]
    fn test_rejects_unknown_bare_column_on_single_table() {
        let validator = SqlValidator::new();
        let outcome = validator.validate("SELECT age FROM customers", Some(&catalog()));
        assert_eq!(reason(outcome), RejectReason::UnknownColumn);
    }

    #[test]
    fn test_ambiguous_bare_column_is_not_checked() {
        let validator = SqlValidator::new();
        // Two tables in scope: resolution is ambiguous, so no column check.
        let sql = "SELECT whatever FROM customers, orders";
        assert!(validator.validate(sql, Some(&catalog())).is_accepted());
    }

    #[test]
    fn test_order_by_projection_alias_is_fine() {
        let validator = SqlValidator::new();
        let sql = "SELECT total AS amount FROM orders ORDER BY amount DESC";
        assert!(validator.validate(sql, Some(&catalog())).is_accepted());
    }

    #[test]
    fn test_subquery_tables_are_checked() {
        let validator = SqlValidator::new();
        let sql = "SELECT name FROM customers WHERE id IN (SELECT customer_id FROM invoices)";
        let outcome = validator.validate(sql, Some(&catalog()));
        assert_eq!(reason(outcome), RejectReason::UnknownTable);
    }

    #[test]
    fn test_normalization_round_trip() {
        let validator = SqlValidator::new();
        let sql = "select   c.name , c.email\nfrom customers   c\nwhere c.id = 1";
        let normalized = match validator.validate(sql, Some(&catalog())) {
            ValidationOutcome::Accepted { normalized_sql } => normalized_sql,
            other => panic!("unexpected: {:?}", other),
        };
        // Re-parsing the normalized form yields the same statement kind and
        // references.
        let reparsed = validator.validate(&normalized, Some(&catalog()));
        match reparsed {
            ValidationOutcome::Accepted { normalized_sql } => {
                assert_eq!(normalized_sql, normalized);
                assert!(normalized.to_lowercase().contains("from customers"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
