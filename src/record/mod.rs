//! Active-record facade.
//!
//! An entity type declares its [`SchemaDescriptor`] once through the
//! [`Entity`] trait; a [`Record`] of that type holds one slot per declared
//! column and persists itself through the query executor of a [`Database`].

pub mod registry;

pub use registry::{SchemaRegistry, SchemaRegistryBuilder};

use crate::core::db::{Database, ResultSet, SchemaDescriptor, Value, ID_COLUMN};
use crate::core::{RecordError, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use tracing::warn;

/// A type backed by a table.
///
/// Implementations return a descriptor held in a static, typically a
/// `once_cell::sync::Lazy`, so there is exactly one per type.
pub trait Entity: 'static {
    fn schema() -> &'static SchemaDescriptor;
}

/// Advisory lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Freshly constructed, every field absent
    Uninitialized,
    /// At least one field set, never saved or loaded
    Populated,
    /// Saved or loaded from the database
    Persisted,
}

/// Which statement `save` issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted { id: i64 },
    Updated { rows: usize },
}

/// One row of an entity's table.
pub struct Record<E: Entity> {
    /// Indexed like the descriptor's columns; `None` is absent
    values: Vec<Option<Value>>,
    persisted: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Record<E> {
    /// Creates a record with every field absent.
    pub fn new() -> Self {
        Record {
            values: vec![None; E::schema().columns().len()],
            persisted: false,
            _entity: PhantomData,
        }
    }

    /// Materializes the entity's schema on `db`, then returns a new record.
    ///
    /// Existing columns and foreign keys are left alone, so calling this
    /// repeatedly is safe.
    pub fn init(db: &Database) -> Result<Self> {
        db.schema().materialize(E::schema())?;
        Ok(Self::new())
    }

    pub fn schema() -> &'static SchemaDescriptor {
        E::schema()
    }

    /// Sets `field` if the schema declares it; undeclared names are ignored.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        match E::schema().position(field) {
            Some(index) => self.values[index] = Some(value.into()),
            None => warn!(table = E::schema().table(), field, "ignoring undeclared field"),
        }
        self
    }

    /// Sets `field`, failing with `UnknownField` if the schema does not
    /// declare it.
    pub fn try_set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let index = E::schema()
            .position(field)
            .ok_or_else(|| RecordError::UnknownField {
                table: E::schema().table().to_string(),
                field: field.to_string(),
            })?;
        self.values[index] = Some(value.into());
        Ok(())
    }

    /// Makes `field` absent again, returning its previous value.
    pub fn clear(&mut self, field: &str) -> Option<Value> {
        let index = E::schema().position(field)?;
        self.values[index].take()
    }

    /// Value of `field`, `None` when absent or undeclared.
    pub fn field(&self, field: &str) -> Option<&Value> {
        let index = E::schema().position(field)?;
        self.values[index].as_ref()
    }

    pub fn id(&self) -> Option<i64> {
        self.field(ID_COLUMN).and_then(Value::as_i64)
    }

    /// The identifier as stored, whatever its type; `None` when absent or null.
    fn key(&self) -> Option<Value> {
        self.field(ID_COLUMN).filter(|v| !v.is_null()).cloned()
    }

    pub fn state(&self) -> RecordState {
        if self.persisted {
            RecordState::Persisted
        } else if self.values.iter().any(Option::is_some) {
            RecordState::Populated
        } else {
            RecordState::Uninitialized
        }
    }

    /// Updates the row when the identifier is present, inserts otherwise.
    ///
    /// Every present field except the identifier is written. After an
    /// insert the generated identifier is stored on the record, so a later
    /// `save` updates the same row.
    pub fn save(&mut self, db: &Database) -> Result<SaveOutcome> {
        let schema = E::schema();
        let fields = self.present_fields();
        let executor = db.executor();

        let outcome = match self.key() {
            // Nothing but the identifier to write
            Some(_) if fields.is_empty() => SaveOutcome::Updated { rows: 0 },
            Some(key) => SaveOutcome::Updated {
                rows: executor.update_where(schema.table(), &fields, ID_COLUMN, key)?,
            },
            None => {
                let id = executor.insert(schema.table(), &fields)?;
                if let Some(index) = schema.position(ID_COLUMN) {
                    self.values[index] = Some(Value::Integer(id));
                }
                SaveOutcome::Inserted { id }
            }
        };

        // An update that matched nothing leaves no row behind the record
        if !matches!(outcome, SaveOutcome::Updated { rows: 0 }) {
            self.persisted = true;
        }
        Ok(outcome)
    }

    /// Loads the row with identifier `id`.
    ///
    /// When no row matches, returns `Err(RecordError::NoResult)` if the
    /// database handle was opened with the debug flag and `Ok(None)`
    /// otherwise.
    pub fn get(db: &Database, id: i64) -> Result<Option<Self>> {
        let result = db.executor().filter(E::schema().table(), ID_COLUMN, id)?;

        if result.is_empty() {
            if db.debug() {
                return Err(RecordError::NoResult);
            }
            return Ok(None);
        }

        Ok(Some(Self::from_result(&result, 0)))
    }

    /// Loads every row of the entity's table.
    pub fn all(db: &Database) -> Result<Vec<Self>> {
        let result = db.executor().all(E::schema().table())?;
        Ok((0..result.row_count).map(|row| Self::from_result(&result, row)).collect())
    }

    /// Clears `column` on this record's row only.
    pub fn soft_delete(&mut self, db: &Database, column: &str) -> Result<usize> {
        let schema = E::schema();
        let index = schema.position(column).ok_or_else(|| RecordError::UnknownField {
            table: schema.table().to_string(),
            field: column.to_string(),
        })?;
        let key = self.key().ok_or_else(|| {
            RecordError::Schema(format!("cannot soft delete an unsaved `{}` record", schema.table()))
        })?;

        let rows = db
            .executor()
            .soft_delete_where(schema.table(), column, ID_COLUMN, key)?;
        self.values[index] = Some(Value::Null);
        Ok(rows)
    }

    /// All declared fields as a JSON object, absent fields as `null`.
    pub fn readable(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn present_fields(&self) -> Vec<(&'static str, Value)> {
        E::schema()
            .columns()
            .iter()
            .zip(&self.values)
            .filter(|(column, _)| column.name != ID_COLUMN)
            .filter_map(|(column, value)| value.as_ref().map(|v| (column.name.as_str(), v.clone())))
            .collect()
    }

    fn from_result(result: &ResultSet, row: usize) -> Self {
        let schema = E::schema();
        let mut record = Self::new();

        for (index, column) in schema.columns().iter().enumerate() {
            if let Some(value) = result.value(row, &column.name) {
                record.values[index] = Some(column.ty.hydrate(value.clone()));
            }
        }

        record.persisted = true;
        record
    }
}

impl<E: Entity> Default for Record<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Record<E> {
    fn clone(&self) -> Self {
        Record {
            values: self.values.clone(),
            persisted: self.persisted,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Record<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (column, value) in E::schema().columns().iter().zip(&self.values) {
            map.entry(&column.name, value);
        }
        map.finish()
    }
}

impl<E: Entity> Serialize for Record<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let columns = E::schema().columns();
        let mut map = serializer.serialize_map(Some(columns.len()))?;
        for (column, value) in columns.iter().zip(&self.values) {
            map.serialize_entry(&column.name, value.as_ref().unwrap_or(&Value::Null))?;
        }
        map.end()
    }
}
