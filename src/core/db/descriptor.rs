/// Schema Descriptor Module
///
/// Static, per-entity-type metadata: the backing table, its ordered columns
/// with their declared types, and the relation maps used when materializing
/// foreign keys.

use crate::core::db::query::{identifier, sql_type};
use crate::core::db::value::{Value, DATETIME_FORMAT};
use crate::core::{RecordError, Result};
use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Name of the identifier column every entity table carries
pub const ID_COLUMN: &str = "id";

/// Declared type of a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    String,
    Text,
    DateTime,
    Bool,
    /// Any other SQL type, emitted verbatim
    Custom(String),
}

impl ColumnType {
    /// Parses a type tag such as `int`, `string` or `datetime`.
    ///
    /// Unknown tags become `Custom` when they are syntactically valid SQL
    /// types.
    pub fn from_tag(tag: &str) -> Result<Self> {
        let ty = match tag.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => ColumnType::Int,
            "float" | "double" | "real" => ColumnType::Float,
            "string" | "varchar" => ColumnType::String,
            "text" => ColumnType::Text,
            "datetime" | "timestamp" => ColumnType::DateTime,
            "bool" | "boolean" => ColumnType::Bool,
            _ => ColumnType::Custom(sql_type(tag.trim())?.to_string()),
        };
        Ok(ty)
    }

    /// SQL type used in `ALTER TABLE ... ADD`.
    pub fn sql_type(&self) -> &str {
        match self {
            ColumnType::Int => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::Custom(ty) => ty,
        }
    }

    /// Converts a stored value back into the declared type where storage
    /// loses it (date/times come back as text, whole floats as integers).
    pub(crate) fn hydrate(&self, value: Value) -> Value {
        match (self, value) {
            (ColumnType::DateTime, Value::Text(text)) => {
                match NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT) {
                    Ok(dt) => Value::DateTime(dt),
                    Err(_) => Value::Text(text),
                }
            }
            (ColumnType::Float, Value::Integer(i)) => Value::Real(i as f64),
            (_, value) => value,
        }
    }
}

impl FromStr for ColumnType {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        ColumnType::from_tag(s)
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

/// Relation kinds a descriptor can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    /// Declarable, but building it always fails
    ManyToMany,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationKind::OneToOne => "one_to_one",
            RelationKind::OneToMany => "one_to_many",
            RelationKind::ManyToMany => "many_to_many",
        };
        f.write_str(name)
    }
}

/// A local column referencing a key column of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub column: String,
    pub target_table: String,
    pub target_column: String,
}

impl Relation {
    /// Relation from `column` to `target_table.id`.
    pub fn new(column: impl Into<String>, target_table: impl Into<String>) -> Self {
        Relation {
            column: column.into(),
            target_table: target_table.into(),
            target_column: ID_COLUMN.to_string(),
        }
    }

    /// Overrides the referenced key column.
    pub fn references(mut self, target_column: impl Into<String>) -> Self {
        self.target_column = target_column.into();
        self
    }
}

/// Table name, columns and relations of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    table: String,
    columns: Vec<ColumnDef>,
    one_to_one: Vec<Relation>,
    one_to_many: Vec<Relation>,
    many_to_many: Vec<Relation>,
}

impl SchemaDescriptor {
    pub fn builder(table: impl Into<String>) -> SchemaDescriptorBuilder {
        SchemaDescriptorBuilder {
            table: table.into(),
            columns: Vec::new(),
            one_to_one: Vec::new(),
            one_to_many: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Declaration index of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn relations(&self, kind: RelationKind) -> &[Relation] {
        match kind {
            RelationKind::OneToOne => &self.one_to_one,
            RelationKind::OneToMany => &self.one_to_many,
            RelationKind::ManyToMany => &self.many_to_many,
        }
    }
}

/// Builder for [`SchemaDescriptor`].
#[derive(Debug)]
pub struct SchemaDescriptorBuilder {
    table: String,
    columns: Vec<ColumnDef>,
    one_to_one: Vec<Relation>,
    one_to_many: Vec<Relation>,
    many_to_many: Vec<Relation>,
}

impl SchemaDescriptorBuilder {
    pub fn column(mut self, name: impl Into<String>, ty: ColumnType) -> Self {
        self.columns.push(ColumnDef { name: name.into(), ty });
        self
    }

    pub fn one_to_one(mut self, relation: Relation) -> Self {
        self.one_to_one.push(relation);
        self
    }

    pub fn one_to_many(mut self, relation: Relation) -> Self {
        self.one_to_many.push(relation);
        self
    }

    pub fn many_to_many(mut self, relation: Relation) -> Self {
        self.many_to_many.push(relation);
        self
    }

    /// Validates and freezes the descriptor.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier` for malformed names, `Schema` for duplicate
    /// columns, a missing integer `id` column, or relations on undeclared
    /// columns.
    pub fn build(self) -> Result<SchemaDescriptor> {
        identifier(&self.table)?;

        let mut seen = HashSet::new();
        for column in &self.columns {
            identifier(&column.name)?;
            if !seen.insert(column.name.as_str()) {
                return Err(RecordError::Schema(format!(
                    "duplicate column `{}` on table `{}`",
                    column.name, self.table
                )));
            }
        }

        match self.columns.iter().find(|c| c.name == ID_COLUMN) {
            Some(ColumnDef { ty: ColumnType::Int, .. }) => {}
            Some(_) => {
                return Err(RecordError::Schema(format!(
                    "`{}.{}` must be declared as int",
                    self.table, ID_COLUMN
                )))
            }
            None => {
                return Err(RecordError::Schema(format!(
                    "table `{}` does not declare an `{}` column",
                    self.table, ID_COLUMN
                )))
            }
        }

        for relation in self
            .one_to_one
            .iter()
            .chain(&self.one_to_many)
            .chain(&self.many_to_many)
        {
            identifier(&relation.target_table)?;
            identifier(&relation.target_column)?;
            if !seen.contains(relation.column.as_str()) {
                return Err(RecordError::Schema(format!(
                    "relation column `{}` is not declared on table `{}`",
                    relation.column, self.table
                )));
            }
        }

        Ok(SchemaDescriptor {
            table: self.table,
            columns: self.columns,
            one_to_one: self.one_to_one,
            one_to_many: self.one_to_many,
            many_to_many: self.many_to_many,
        })
    }
}
