/// Database Module
///
/// This module provides the data-access layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): credentials and the `Database` handle owning one connection
/// - **Query Execution** (`query.rs`): parameterized statements and the CRUD operations built on them
/// - **Schema** (`schema.rs`): introspection and materialization of schema descriptors
/// - **Descriptors** (`descriptor.rs`): static table/column/relation metadata
/// - **Values** (`value.rs`): bound parameter and result values
///
/// ## Error Handling
///
/// All operations use the standardized `RecordError` type.
pub mod connection;
pub mod descriptor;
pub mod query;
pub mod schema;
pub mod value;

pub use connection::*;
pub use descriptor::*;
pub use query::*;
pub use schema::*;
pub use value::*;
