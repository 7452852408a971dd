//! ABOUTME: Allow-listed SQL builder for dynamic table and column access
//! ABOUTME: Identifiers are checked before SQL is built; values are always bound

use sqlx::{query::Query, sqlite::SqliteArguments, Sqlite, SqlitePool};
use vb_core::{Error, Result};

/// A table reachable through [`TableQuery`] and the columns it exposes
#[derive(Debug)]
pub struct AllowedTable {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Tables and columns that may appear in dynamically built SQL
pub const ALLOWED_TABLES: &[AllowedTable] = &[
    AllowedTable {
        name: "audit_logs",
        columns: &[
            "id",
            "tool",
            "target",
            "command_line",
            "success",
            "exit_code",
            "duration_ms",
            "client_ip",
            "details",
            "created_at",
        ],
    },
    AllowedTable {
        name: "firewall_configs",
        columns: &[
            "id",
            "name",
            "device_type",
            "description",
            "rules",
            "is_active",
            "created_at",
            "updated_at",
        ],
    },
    AllowedTable {
        name: "system_scans",
        columns: &[
            "id",
            "target",
            "checks",
            "status",
            "results",
            "veriscore",
            "error",
            "created_at",
            "started_at",
            "completed_at",
        ],
    },
    AllowedTable {
        name: "webhooks",
        columns: &[
            "id",
            "url",
            "secret",
            "events",
            "is_active",
            "failure_count",
            "last_status",
            "last_delivery_at",
            "created_at",
        ],
    },
];

/// Validates that an identifier contains only safe SQL identifier characters:
/// a leading letter or underscore followed by alphanumerics or underscores
pub fn is_safe_sql_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A bound parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl BuiltQuery {
    /// Bind every parameter onto a sqlx query
    pub fn bind(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                SqlValue::Null => query.bind(None::<String>),
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.clone()),
                SqlValue::Bool(v) => query.bind(*v),
            };
        }
        query
    }

    /// Run a statement and return the number of affected rows
    pub async fn execute(&self, pool: &SqlitePool) -> Result<u64> {
        let result = self
            .bind()
            .execute(pool)
            .await
            .map_err(|e| Error::Database(format!("Query failed: {}", e)))?;
        Ok(result.rows_affected())
    }

    /// Run a `COUNT(*)` query built by [`TableQuery::count`]
    pub async fn fetch_count(&self, pool: &SqlitePool) -> Result<i64> {
        use sqlx::Row;

        let row = self
            .bind()
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Database(format!("Count failed: {}", e)))?;
        row.try_get::<i64, _>(0)
            .map_err(|e| Error::Database(format!("Count failed: {}", e)))
    }
}

/// Builder for parameterized statements against one allow-listed table
#[derive(Debug, Clone, Copy)]
pub struct TableQuery {
    table: &'static AllowedTable,
}

impl TableQuery {
    /// Look up `table` in [`ALLOWED_TABLES`]
    pub fn new(table: &str) -> Result<Self> {
        ALLOWED_TABLES
            .iter()
            .find(|t| t.name == table && is_safe_sql_identifier(t.name))
            .map(|table| Self { table })
            .ok_or_else(|| Error::Validation(format!("Table not allowed: {:?}", table)))
    }

    pub fn table(&self) -> &'static str {
        self.table.name
    }

    fn column(&self, column: &str) -> Result<&'static str> {
        self.table
            .columns
            .iter()
            .copied()
            .find(|c| *c == column && is_safe_sql_identifier(c))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "Column not allowed on {}: {:?}",
                    self.table.name, column
                ))
            })
    }

    /// Render `col = ?N AND ...` for each filter, pushing values into `params`
    fn where_clause(
        &self,
        filters: &[(&str, SqlValue)],
        params: &mut Vec<SqlValue>,
    ) -> Result<String> {
        if filters.is_empty() {
            return Ok(String::new());
        }
        let mut parts = Vec::with_capacity(filters.len());
        for (column, value) in filters {
            let column = self.column(column)?;
            if *value == SqlValue::Null {
                parts.push(format!("{} IS NULL", column));
            } else {
                params.push(value.clone());
                parts.push(format!("{} = ?{}", column, params.len()));
            }
        }
        Ok(format!(" WHERE {}", parts.join(" AND ")))
    }

    /// `SELECT cols FROM table [WHERE ...] [LIMIT n]`; empty `columns` means `*`
    pub fn select(
        &self,
        columns: &[&str],
        filters: &[(&str, SqlValue)],
        limit: Option<i64>,
    ) -> Result<BuiltQuery> {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| self.column(c))
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection, self.table.name);
        sql.push_str(&self.where_clause(filters, &mut params)?);
        if let Some(limit) = limit {
            params.push(SqlValue::Integer(limit));
            sql.push_str(&format!(" LIMIT ?{}", params.len()));
        }
        Ok(BuiltQuery { sql, params })
    }

    pub fn insert(&self, values: &[(&str, SqlValue)]) -> Result<BuiltQuery> {
        if values.is_empty() {
            return Err(Error::Validation("Insert requires at least one column".to_string()));
        }
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        let mut params = Vec::with_capacity(values.len());
        for (column, value) in values {
            columns.push(self.column(column)?);
            params.push(value.clone());
            placeholders.push(format!("?{}", params.len()));
        }
        Ok(BuiltQuery {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table.name,
                columns.join(", "),
                placeholders.join(", ")
            ),
            params,
        })
    }

    /// `UPDATE table SET ... WHERE ...`; refuses to run without a filter
    pub fn update(
        &self,
        set: &[(&str, SqlValue)],
        filters: &[(&str, SqlValue)],
    ) -> Result<BuiltQuery> {
        if set.is_empty() {
            return Err(Error::Validation("Update requires at least one column".to_string()));
        }
        if filters.is_empty() {
            return Err(Error::Validation("Update requires a filter".to_string()));
        }
        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(set.len());
        for (column, value) in set {
            let column = self.column(column)?;
            params.push(value.clone());
            assignments.push(format!("{} = ?{}", column, params.len()));
        }
        let mut sql = format!("UPDATE {} SET {}", self.table.name, assignments.join(", "));
        sql.push_str(&self.where_clause(filters, &mut params)?);
        Ok(BuiltQuery { sql, params })
    }

    /// `DELETE FROM table WHERE ...`; refuses to run without a filter
    pub fn delete(&self, filters: &[(&str, SqlValue)]) -> Result<BuiltQuery> {
        if filters.is_empty() {
            return Err(Error::Validation("Delete requires a filter".to_string()));
        }
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table.name);
        sql.push_str(&self.where_clause(filters, &mut params)?);
        Ok(BuiltQuery { sql, params })
    }

    pub fn count(&self, filters: &[(&str, SqlValue)]) -> Result<BuiltQuery> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) AS count FROM {}", self.table.name);
        sql.push_str(&self.where_clause(filters, &mut params)?);
        Ok(BuiltQuery { sql, params })
    }
}
