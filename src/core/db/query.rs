/// Query Execution Module
///
/// This module turns SQL templates plus positional parameters into executed
/// statements. Parameter values are always bound through placeholders and
/// never spliced into the SQL text; only validated identifiers (table and
/// column names declared by schema descriptors) are.

use crate::core::db::value::{bind_types, Value};
use crate::core::{RecordError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, error};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles"));

static SQL_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?$").expect("type pattern compiles")
});

/// Checks that `name` is a plain SQL identifier.
///
/// # Errors
///
/// Returns `RecordError::InvalidIdentifier` for anything else, before any
/// statement is prepared.
pub fn identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(RecordError::InvalidIdentifier(name.to_string()))
    }
}

/// Checks that `sql_type` is a column type such as `INTEGER` or `VARCHAR(255)`.
pub fn sql_type(sql_type: &str) -> Result<&str> {
    if SQL_TYPE.is_match(sql_type) {
        Ok(sql_type)
    } else {
        Err(RecordError::InvalidIdentifier(sql_type.to_string()))
    }
}

/// Represents the result of a statement execution
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    /// Column names from the query result
    pub columns: Vec<String>,
    /// Rows of data in column order
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned
    pub row_count: usize,
    /// Rows changed by a data-modifying statement
    pub affected_rows: usize,
}

impl ResultSet {
    /// Creates a new ResultSet from column names and row data
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        ResultSet {
            columns,
            rows,
            row_count,
            affected_rows: 0,
        }
    }

    fn affected(affected_rows: usize) -> Self {
        ResultSet {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            affected_rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value of `column` in row `row`.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(index)
    }

    /// Iterates over the rows as `(column, value)` pairs.
    pub fn iter_rows<'s>(
        &'s self,
    ) -> impl Iterator<Item = impl Iterator<Item = (&'s str, &'s Value)> + 's> + 's {
        self.rows
            .iter()
            .map(move |row| self.columns.iter().map(String::as_str).zip(row.iter()))
    }
}

/// Query execution service that operates on a database connection
pub struct QueryExecutor<'a> {
    connection: &'a Connection,
}

impl<'a> QueryExecutor<'a> {
    /// Creates a new QueryExecutor for the given connection
    pub fn new(connection: &'a Connection) -> Self {
        QueryExecutor { connection }
    }

    /// Executes a SQL template with positional parameters.
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL text with `?` placeholders
    /// * `params` - values bound to the placeholders, in order
    ///
    /// # Returns
    ///
    /// Rows for statements that produce columns, otherwise an empty
    /// `ResultSet` carrying the affected row count.
    ///
    /// # Errors
    ///
    /// `ExecutionKind::Prepare` when the statement cannot be prepared and
    /// `ExecutionKind::Execute` when binding or stepping fails. Every failure
    /// is logged with the SQL text.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        debug!(sql, types = %bind_types(params), "executing statement");

        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| log_failure(sql, RecordError::prepare(e)))?;

        if stmt.column_count() == 0 {
            let affected = stmt
                .execute(params_from_iter(params.iter()))
                .map_err(|e| log_failure(sql, RecordError::execute(e)))?;
            return Ok(ResultSet::affected(affected));
        }

        // Get column names
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(Value::from_value_ref(row.get_ref(i)?));
                }
                Ok(values)
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| log_failure(sql, RecordError::execute(e)))?;

        Ok(ResultSet::new(columns, rows))
    }

    /// `SELECT * FROM <table>`
    pub fn all(&self, table: &str) -> Result<ResultSet> {
        let sql = format!("SELECT * FROM {}", identifier(table)?);
        self.execute(&sql, &[])
    }

    /// `SELECT * FROM <table> WHERE <column> = ?` with `value` bound.
    pub fn filter(&self, table: &str, column: &str, value: impl Into<Value>) -> Result<ResultSet> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            identifier(table)?,
            identifier(column)?
        );
        self.execute(&sql, &[value.into()])
    }

    /// Inserts one row and returns its generated row identifier.
    pub fn insert<S: AsRef<str>>(&self, table: &str, fields: &[(S, Value)]) -> Result<i64> {
        let columns = field_names(fields)?;
        let sql = insert_sql(identifier(table)?, &columns);
        let params: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();

        self.execute(&sql, &params)?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Updates `fields`, optionally restricted by a where clause.
    ///
    /// `where_clause` is appended verbatim and must be a statically built
    /// fragment; values that come from callers belong in `update_where`.
    pub fn update<S: AsRef<str>>(
        &self,
        table: &str,
        fields: &[(S, Value)],
        where_clause: Option<&str>,
    ) -> Result<usize> {
        let columns = field_names(fields)?;
        let sql = update_sql(identifier(table)?, &columns, where_clause)?;
        let params: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();

        Ok(self.execute(&sql, &params)?.affected_rows)
    }

    /// Updates `fields` on rows where `column = value`, all values bound.
    pub fn update_where<S: AsRef<str>>(
        &self,
        table: &str,
        fields: &[(S, Value)],
        column: &str,
        value: impl Into<Value>,
    ) -> Result<usize> {
        let clause = format!("{} = ?", identifier(column)?);
        let columns = field_names(fields)?;
        let sql = update_sql(identifier(table)?, &columns, Some(&clause))?;

        let mut params: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
        params.push(value.into());

        Ok(self.execute(&sql, &params)?.affected_rows)
    }

    /// Clears `column` on every row of `table`.
    pub fn soft_delete(&self, table: &str, column: &str) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET {} = NULL",
            identifier(table)?,
            identifier(column)?
        );
        Ok(self.execute(&sql, &[])?.affected_rows)
    }

    /// Clears `column` on rows where `key_column = key_value`.
    pub fn soft_delete_where(
        &self,
        table: &str,
        column: &str,
        key_column: &str,
        key_value: impl Into<Value>,
    ) -> Result<usize> {
        let sql = format!(
            "UPDATE {} SET {} = NULL WHERE {} = ?",
            identifier(table)?,
            identifier(column)?,
            identifier(key_column)?
        );
        Ok(self.execute(&sql, &[key_value.into()])?.affected_rows)
    }

    /// `ALTER TABLE <table> ADD <column> <type>`. Adding a column that
    /// already exists is an execution error.
    pub fn add_column(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} ADD {} {}",
            identifier(table)?,
            identifier(column)?,
            sql_type(column_type)?
        );
        self.execute(&sql, &[]).map(|_| ())
    }
}

fn log_failure(sql: &str, err: RecordError) -> RecordError {
    error!(sql, "statement failed: {}", err);
    err
}

fn field_names<S: AsRef<str>>(fields: &[(S, Value)]) -> Result<Vec<&str>> {
    fields.iter().map(|(name, _)| identifier(name.as_ref())).collect()
}

pub(crate) fn insert_sql(table: &str, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", table);
    }

    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

pub(crate) fn update_sql(table: &str, columns: &[&str], where_clause: Option<&str>) -> Result<String> {
    if columns.is_empty() {
        return Err(RecordError::prepare(format!("UPDATE {} has no fields to set", table)));
    }

    let assignments: Vec<String> = columns.iter().map(|c| format!("{} = ?", c)).collect();
    let mut sql = format!("UPDATE {} SET {}", table, assignments.join(", "));
    if let Some(clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionKind;
    use rusqlite::Connection;

    fn setup_test_table(conn: &Connection) {
        conn.execute_batch(
            "
            CREATE TABLE test (
                id INTEGER PRIMARY KEY,
                name TEXT,
                value REAL,
                deleted_at TEXT
            );
            INSERT INTO test (name, value, deleted_at) VALUES ('Alice', 123.45, '2024-01-01 00:00:00');
            INSERT INTO test (name, value, deleted_at) VALUES ('Bob', 678.90, '2024-01-02 00:00:00');
            INSERT INTO test (name, value) VALUES (NULL, NULL);
        ",
        )
        .unwrap();
    }

    #[test]
    fn test_all() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let result = QueryExecutor::new(&conn).all("test").unwrap();

        assert_eq!(result.columns, vec!["id", "name", "value", "deleted_at"]);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.value(0, "name"), Some(&Value::from("Alice")));
        // Check NULL handling
        assert_eq!(result.value(2, "name"), Some(&Value::Null));
    }

    #[test]
    fn test_filter_binds_value() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let result = executor.filter("test", "name", "Bob").unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.value(0, "value"), Some(&Value::Real(678.90)));

        let result = executor.filter("test", "name", "' OR '1'='1").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_boolean_column_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);
        executor.add_column("test", "active", "BOOLEAN").unwrap();

        let id = executor
            .insert("test", &[("name", Value::from("Dana")), ("active", Value::from(true))])
            .unwrap();

        let result = executor.filter("test", "active", true).unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.value(0, "id"), Some(&Value::Integer(id)));
        assert_eq!(result.value(0, "active"), Some(&Value::Integer(1)));
        assert!(executor.filter("test", "active", false).unwrap().is_empty());
    }

    #[test]
    fn test_prepare_failure_is_distinct_from_empty_result() {
        let conn = Connection::open_in_memory().unwrap();
        let executor = QueryExecutor::new(&conn);

        let err = executor.all("nonexistent_table").unwrap_err();
        assert_eq!(err.execution_kind(), Some(ExecutionKind::Prepare));
        assert!(err.to_string().contains("no such table"));

        setup_test_table(&conn);
        let empty = executor.filter("test", "name", "nobody").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_execute_failure_kind() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE strict_names (name TEXT NOT NULL)").unwrap();
        let executor = QueryExecutor::new(&conn);

        let err = executor
            .insert("strict_names", &[("name", Value::Null)])
            .unwrap_err();
        assert_eq!(err.execution_kind(), Some(ExecutionKind::Execute));
    }

    #[test]
    fn test_insert_returns_row_id() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let id = executor
            .insert("test", &[("name", Value::from("Carol")), ("value", Value::from(1.5))])
            .unwrap();
        assert_eq!(id, 4);

        let result = executor.filter("test", "id", id).unwrap();
        assert_eq!(result.value(0, "name"), Some(&Value::from("Carol")));
    }

    #[test]
    fn test_update_with_and_without_where() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        let changed = executor
            .update("test", &[("value", Value::from(1.0))], Some("name IS NOT NULL"))
            .unwrap();
        assert_eq!(changed, 2);

        let changed = executor
            .update("test", &[("value", Value::from(0.0))], None)
            .unwrap();
        assert_eq!(changed, 3);

        let changed = executor
            .update_where("test", &[("name", Value::from("Dora"))], "id", 3)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            executor.filter("test", "id", 3).unwrap().value(0, "name"),
            Some(&Value::from("Dora"))
        );
    }

    #[test]
    fn test_update_requires_fields() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let fields: [(&str, Value); 0] = [];
        let err = QueryExecutor::new(&conn).update("test", &fields, None).unwrap_err();
        assert_eq!(err.execution_kind(), Some(ExecutionKind::Prepare));
    }

    #[test]
    fn test_soft_delete_clears_every_row() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        assert_eq!(executor.soft_delete("test", "deleted_at").unwrap(), 3);
        let result = executor.all("test").unwrap();
        assert!(result.rows.iter().all(|row| row[3].is_null()));
        // The rows themselves stay
        assert_eq!(result.row_count, 3);
    }

    #[test]
    fn test_soft_delete_where_is_row_scoped() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        assert_eq!(executor.soft_delete_where("test", "deleted_at", "id", 1).unwrap(), 1);
        assert!(executor.filter("test", "id", 1).unwrap().value(0, "deleted_at").unwrap().is_null());
        assert!(!executor.filter("test", "id", 2).unwrap().value(0, "deleted_at").unwrap().is_null());
    }

    #[test]
    fn test_add_column_twice_fails() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        executor.add_column("test", "email", "VARCHAR(255)").unwrap();
        let err = executor.add_column("test", "email", "VARCHAR(255)").unwrap_err();
        assert!(err.execution_kind().is_some());
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_identifiers_are_validated() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);
        let executor = QueryExecutor::new(&conn);

        assert!(matches!(
            executor.all("test; DROP TABLE test"),
            Err(RecordError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            executor.filter("test", "name = name OR 1", "x"),
            Err(RecordError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            executor.add_column("test", "age", "INT; DROP TABLE test"),
            Err(RecordError::InvalidIdentifier(_))
        ));
        assert_eq!(sql_type("DECIMAL(10, 2)").unwrap(), "DECIMAL(10, 2)");
    }

    #[test]
    fn test_generated_sql() {
        insta::assert_snapshot!(
            insert_sql("users", &["name", "age"]),
            @"INSERT INTO users (name, age) VALUES (?, ?)"
        );
        insta::assert_snapshot!(insert_sql("users", &[]), @"INSERT INTO users DEFAULT VALUES");
        insta::assert_snapshot!(
            update_sql("users", &["name", "age"], Some("id = ?")).unwrap(),
            @"UPDATE users SET name = ?, age = ? WHERE id = ?"
        );
    }

    #[test]
    fn test_iter_rows() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_table(&conn);

        let result = QueryExecutor::new(&conn).filter("test", "id", 1).unwrap();
        let first: Vec<(&str, &Value)> = result.iter_rows().next().unwrap().collect();
        assert_eq!(first[1], ("name", &Value::from("Alice")));
    }
}
