/// Schema Module
///
/// This module provides schema introspection (columns and foreign keys of a
/// table) and the schema operator that materializes a `SchemaDescriptor`:
/// the table, its missing columns, and its foreign-key relations.

use crate::core::db::descriptor::{Relation, RelationKind, SchemaDescriptor, ID_COLUMN};
use crate::core::db::query::{identifier, QueryExecutor};
use crate::core::{RecordError, Result};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, error, info, warn};

/// Represents a foreign key relationship
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// The table this foreign key references
    pub referenced_table: String,
    /// The column in this table that is the foreign key
    pub from_column: String,
    /// The referenced column in the foreign table
    pub to_column: String,
    /// ON DELETE action (`NO ACTION`, `CASCADE`, ...)
    pub on_delete: String,
}

/// Represents a database column with its metadata
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Declared type name (e.g., "INTEGER", "VARCHAR(255)", "DATETIME")
    pub type_name: String,
    /// Whether the column rejects NULL values
    pub notnull: bool,
    /// Whether this column is part of the primary key
    pub pk: bool,
    /// Default value expression (if any)
    pub dflt_value: Option<String>,
}

impl Column {
    /// Creates a Column from a `pragma_table_info` row
    fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Column {
            name: row.get(1)?,
            type_name: row.get(2)?,
            notnull: row.get(3)?,
            pk: row.get::<_, i64>(5)? > 0,
            dflt_value: row.get(4)?,
        })
    }
}

/// Represents a database table with its structure and metadata
#[derive(Debug, Clone)]
pub struct Table {
    /// Table name
    pub name: String,
    /// List of columns in this table
    pub columns: Vec<Column>,
    /// List of foreign key relationships
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Creates a Table by introspecting the database for the given table name
    pub fn from_database(conn: &Connection, table_name: &str) -> Result<Self> {
        let columns = get_table_columns(conn, table_name)?;
        let foreign_keys = get_table_foreign_keys(conn, table_name)?;

        Ok(Table {
            name: table_name.to_string(),
            columns,
            foreign_keys,
        })
    }

    /// Column names compare case-insensitively, as the engine does.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn has_foreign_key(&self, relation: &Relation) -> bool {
        self.foreign_keys.iter().any(|fk| {
            fk.from_column.eq_ignore_ascii_case(&relation.column)
                && fk.referenced_table.eq_ignore_ascii_case(&relation.target_table)
                && fk.to_column.eq_ignore_ascii_case(&relation.target_column)
        })
    }
}

/// Helper function to retrieve column information for a specific table
fn get_table_columns(conn: &Connection, table_name: &str) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare("SELECT * FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table_name], |row| Column::from_pragma_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(columns)
}

/// Helper function to retrieve foreign key information for a specific table
fn get_table_foreign_keys(conn: &Connection, table_name: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn.prepare("SELECT * FROM pragma_foreign_key_list(?1)")?;
    let foreign_keys = stmt
        .query_map([table_name], |row| {
            Ok(ForeignKey {
                referenced_table: row.get(2)?,
                from_column: row.get(3)?,
                // NULL when the key implicitly targets the primary key
                to_column: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                on_delete: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(foreign_keys)
}

/// What a `materialize` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// The table did not exist and was created
    pub table_created: bool,
    /// Columns added, in declaration order
    pub columns_added: Vec<String>,
    /// Foreign keys added
    pub relations_added: usize,
}

/// Issues structural statements derived from schema descriptors.
pub struct SchemaOperator<'a> {
    connection: &'a Connection,
}

impl<'a> SchemaOperator<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        SchemaOperator { connection }
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found: Option<String> = self
            .connection
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Introspects `table`.
    pub fn table(&self, table: &str) -> Result<Table> {
        Table::from_database(self.connection, identifier(table)?)
    }

    /// Creates `table` with only its identifier column when it is missing.
    ///
    /// Returns whether the table was created.
    pub fn ensure_table(&self, table: &str) -> Result<bool> {
        if self.table_exists(identifier(table)?)? {
            return Ok(false);
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} INTEGER PRIMARY KEY AUTOINCREMENT)",
            table, ID_COLUMN
        );
        QueryExecutor::new(self.connection).execute(&sql, &[])?;
        info!(table, "created table");
        Ok(true)
    }

    /// Materializes `descriptor`: table, missing columns, then relations.
    ///
    /// Columns that already exist are skipped, so repeated calls converge.
    /// The first failing step aborts the rest; earlier steps stay applied.
    ///
    /// # Errors
    ///
    /// Any execution or introspection failure, and `Unsupported` when the
    /// descriptor declares many-to-many relations (after the other steps).
    pub fn materialize(&self, descriptor: &SchemaDescriptor) -> Result<MaterializeReport> {
        let table = descriptor.table();
        let mut report = MaterializeReport {
            table_created: self.ensure_table(table)?,
            ..MaterializeReport::default()
        };

        let existing = self.table(table)?;
        let executor = QueryExecutor::new(self.connection);
        for column in descriptor.columns() {
            if existing.has_column(&column.name) {
                continue;
            }
            executor.add_column(table, &column.name, column.ty.sql_type())?;
            report.columns_added.push(column.name.clone());
        }

        for kind in [RelationKind::OneToOne, RelationKind::OneToMany] {
            report.relations_added += self.build_relations(table, kind, descriptor.relations(kind))?;
        }

        let many_to_many = descriptor.relations(RelationKind::ManyToMany);
        if !many_to_many.is_empty() {
            self.build_relations(table, RelationKind::ManyToMany, many_to_many)?;
        }

        debug!(
            table,
            created = report.table_created,
            columns = report.columns_added.len(),
            relations = report.relations_added,
            "materialized schema"
        );
        Ok(report)
    }

    /// Adds one foreign key per relation; one-to-many relations cascade
    /// deletes.
    ///
    /// Returns how many keys were added (existing keys are skipped). The
    /// first failure stops the loop. Many-to-many always fails with
    /// `Unsupported` and creates no join table.
    pub fn build_relations(&self, table: &str, kind: RelationKind, relations: &[Relation]) -> Result<usize> {
        if kind == RelationKind::ManyToMany {
            warn!(table, "many-to-many relations are not supported");
            return Err(RecordError::Unsupported(format!(
                "{} relations on table `{}`",
                kind, table
            )));
        }

        let mut added = 0;
        for relation in relations {
            match self.add_foreign_key(table, relation, kind == RelationKind::OneToMany) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        table,
                        column = %relation.column,
                        target = %relation.target_table,
                        "{} relation failed: {}",
                        kind,
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(added)
    }

    /// Adds `FOREIGN KEY (<column>) REFERENCES <target>(<key>)` to `table`.
    ///
    /// The engine cannot add a constraint to an existing table in place, so
    /// the table is rebuilt with the extra constraint: copied into a new
    /// table, dropped, renamed back, and its indexes and triggers restored.
    /// The rebuild runs in one transaction with foreign-key enforcement
    /// suspended, and is rejected if existing rows violate the new key.
    ///
    /// Returns `false` when an identical key already exists.
    pub fn add_foreign_key(&self, table: &str, relation: &Relation, cascade_delete: bool) -> Result<bool> {
        identifier(table)?;
        identifier(&relation.column)?;
        identifier(&relation.target_table)?;
        identifier(&relation.target_column)?;

        let current = self.table(table)?;
        if current.has_foreign_key(relation) {
            debug!(table, column = %relation.column, "foreign key already present");
            return Ok(false);
        }
        if !current.has_column(&relation.column) {
            return Err(RecordError::Schema(format!(
                "no such column: {}.{}",
                table, relation.column
            )));
        }
        let target = self.table(&relation.target_table)?;
        if !target.has_column(&relation.target_column) {
            return Err(RecordError::Schema(format!(
                "no such key column: {}.{}",
                relation.target_table, relation.target_column
            )));
        }

        let create_sql: String = self.connection.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        let rebuild_sql = rebuilt_table_sql(&create_sql, &rebuild_name(table), relation, cascade_delete)?;

        let dependents = {
            let mut stmt = self.connection.prepare(
                "SELECT sql FROM sqlite_master
                 WHERE type IN ('index', 'trigger') AND tbl_name = ?1 AND sql IS NOT NULL",
            )?;
            let sql = stmt
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            sql
        };

        self.connection.pragma_update(None, "foreign_keys", false)?;
        let rebuilt = self.rebuild(table, &rebuild_sql, &dependents);
        let restored = self.connection.pragma_update(None, "foreign_keys", true);

        if let Err(e) = rebuilt {
            error!(sql = %rebuild_sql, "foreign key rebuild failed: {}", e);
            return Err(e);
        }
        restored?;

        info!(
            table,
            column = %relation.column,
            target = %relation.target_table,
            cascade_delete,
            "added foreign key"
        );
        Ok(true)
    }

    fn rebuild(&self, table: &str, create_sql: &str, dependents: &[String]) -> Result<()> {
        let temp = rebuild_name(table);
        let tx = self.connection.unchecked_transaction()?;

        tx.execute_batch(&format!(
            "{create_sql};
             INSERT INTO {temp} SELECT * FROM {table};
             DROP TABLE {table};
             ALTER TABLE {temp} RENAME TO {table};"
        ))
        .map_err(RecordError::execute)?;

        for sql in dependents {
            tx.execute_batch(sql).map_err(RecordError::execute)?;
        }

        let violations: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pragma_foreign_key_check(?1)",
            [table],
            |row| row.get(0),
        )?;
        if violations > 0 {
            return Err(RecordError::execute(format!(
                "{} existing row(s) in `{}` violate the new foreign key",
                violations, table
            )));
        }

        tx.commit()?;
        Ok(())
    }
}

fn rebuild_name(table: &str) -> String {
    format!("{}__rebuild", table)
}

fn foreign_key_clause(relation: &Relation, cascade_delete: bool) -> String {
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {}({})",
        relation.column, relation.target_table, relation.target_column
    );
    if cascade_delete {
        clause.push_str(" ON DELETE CASCADE");
    }
    clause
}

/// Rewrites a stored `CREATE TABLE` statement under `new_name` with one more
/// table constraint appended.
fn rebuilt_table_sql(create_sql: &str, new_name: &str, relation: &Relation, cascade_delete: bool) -> Result<String> {
    let malformed = || RecordError::Schema(format!("unrecognized table definition: {}", create_sql));
    let open = create_sql.find('(').ok_or_else(malformed)?;
    let close = create_sql.rfind(')').ok_or_else(malformed)?;
    if close < open {
        return Err(malformed());
    }

    Ok(format!(
        "CREATE TABLE {} {}, {}){}",
        new_name,
        &create_sql[open..close],
        foreign_key_clause(relation, cascade_delete),
        &create_sql[close + 1..]
    ))
}
