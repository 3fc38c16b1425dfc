/// # Test Utilities Module
///
/// Shared fixtures for unit tests: an isolated in-memory database and a pair
/// of related sample entities.

use crate::core::db::{ColumnType, Database, Relation, SchemaDescriptor, Value};
use crate::core::Result;
use crate::record::Entity;
use once_cell::sync::Lazy;

static USERS: Lazy<SchemaDescriptor> = Lazy::new(|| {
    SchemaDescriptor::builder("users")
        .column("id", ColumnType::Int)
        .column("name", ColumnType::String)
        .column("age", ColumnType::Int)
        .build()
        .unwrap()
});

static POSTS: Lazy<SchemaDescriptor> = Lazy::new(|| {
    SchemaDescriptor::builder("posts")
        .column("id", ColumnType::Int)
        .column("user_id", ColumnType::Int)
        .column("title", ColumnType::String)
        .column("published_at", ColumnType::DateTime)
        .one_to_many(Relation::new("user_id", "users"))
        .build()
        .unwrap()
});

/// `users { id:int, name:string, age:int }`
pub struct User;

impl Entity for User {
    fn schema() -> &'static SchemaDescriptor {
        &USERS
    }
}

/// `posts { id, user_id -> users.id (cascade), title, published_at }`
pub struct Post;

impl Entity for Post {
    fn schema() -> &'static SchemaDescriptor {
        &POSTS
    }
}

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub db: Database,
}

impl DatabaseFixture {
    /// Create a new in-memory database; `debug` selects the absence policy
    /// of `Record::get`.
    pub fn new(debug: bool) -> Result<Self> {
        Ok(DatabaseFixture {
            db: Database::open_in_memory(debug)?,
        })
    }

    /// Create fixture with both sample tables materialized and three users
    pub fn with_sample_data(debug: bool) -> Result<Self> {
        let fixture = Self::new(debug)?;
        let schema = fixture.db.schema();
        schema.materialize(User::schema())?;
        schema.materialize(Post::schema())?;

        let executor = fixture.db.executor();
        for (name, age) in [("alice", 28), ("bob", 32), ("charlie", 25)] {
            executor.insert("users", &[("name", Value::from(name)), ("age", Value::from(age))])?;
        }

        Ok(fixture)
    }
}
