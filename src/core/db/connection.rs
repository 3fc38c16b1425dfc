/// Connection Management Module
///
/// This module opens the single connection owned by each `Database` handle.
/// The connection lives exactly as long as the handle and is closed when the
/// handle is dropped, on every exit path.

use crate::core::db::query::QueryExecutor;
use crate::core::db::schema::SchemaOperator;
use crate::core::{RecordError, Result};
use rusqlite::{Connection, OpenFlags};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Database name that selects a private in-memory database
pub const MEMORY_DATABASE: &str = ":memory:";

/// Hosts an embedded engine can be reached on
const LOCAL_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Credentials identifying the database to open.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    /// May be empty
    pub pass: String,
    pub db_name: String,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        pass: impl Into<String>,
        db_name: impl Into<String>,
    ) -> Self {
        Credentials {
            host: host.into(),
            user: user.into(),
            pass: pass.into(),
            db_name: db_name.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (label, value) in [("host", &self.host), ("user", &self.user), ("database name", &self.db_name)] {
            if value.trim().is_empty() {
                return Err(RecordError::Connection(format!("{} must not be empty", label)));
            }
        }

        if !LOCAL_HOSTS.contains(&self.host.as_str()) {
            return Err(RecordError::Connection(format!(
                "host unreachable: {} (only local hosts serve an embedded database)",
                self.host
            )));
        }

        Ok(())
    }
}

/// Options controlling how credentials resolve to a database.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Directory holding `<db_name>.db`; defaults to the platform data directory
    pub data_dir: Option<PathBuf>,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
    /// Whether `get` on a missing identifier fails instead of returning `None`
    pub debug: bool,
}

/// Returns the directory used when no data directory is configured.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("recordkit"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Data-access handle owning one database connection.
#[derive(Debug)]
pub struct Database {
    connection: Connection,
    /// Path to the database file (None for in-memory databases)
    path: Option<PathBuf>,
    debug: bool,
}

impl Database {
    /// Opens the database named by `credentials`.
    ///
    /// # Arguments
    ///
    /// * `credentials` - host, user, password and database name
    /// * `options` - data directory, creation policy and debug flag
    ///
    /// # Returns
    ///
    /// A handle with foreign-key enforcement enabled, or
    /// `RecordError::Connection` carrying the driver message. Both outcomes
    /// are logged.
    pub fn open(credentials: &Credentials, options: &ConnectOptions) -> Result<Self> {
        let opened = Self::connect(credentials, options);

        match &opened {
            Ok(db) => info!(
                user = %credentials.user,
                database = %credentials.db_name,
                path = ?db.path,
                "Connected successfully"
            ),
            Err(e) => error!(
                user = %credentials.user,
                database = %credentials.db_name,
                "Connection failed: {}",
                e
            ),
        }

        opened
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory(debug: bool) -> Result<Self> {
        let options = ConnectOptions {
            debug,
            ..ConnectOptions::default()
        };
        Self::open(&Credentials::new("localhost", "root", "", MEMORY_DATABASE), &options)
    }

    fn connect(credentials: &Credentials, options: &ConnectOptions) -> Result<Self> {
        credentials.validate()?;

        let (connection, path) = if credentials.db_name == MEMORY_DATABASE {
            let conn = Connection::open_in_memory().map_err(|e| RecordError::Connection(e.to_string()))?;
            (conn, None)
        } else {
            let dir = options.data_dir.clone().unwrap_or_else(default_data_dir);
            let path = dir.join(format!("{}.db", credentials.db_name));

            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if options.create_if_missing {
                fs::create_dir_all(&dir)
                    .map_err(|e| RecordError::Connection(format!("{}: {}", dir.display(), e)))?;
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            } else if !path.exists() {
                return Err(RecordError::Connection(format!(
                    "database missing: {}",
                    path.display()
                )));
            }

            let conn = Connection::open_with_flags(&path, flags)
                .map_err(|e| RecordError::Connection(e.to_string()))?;
            (conn, Some(path))
        };

        connection
            .pragma_update(None, "foreign_keys", true)
            .map_err(|e| RecordError::Connection(e.to_string()))?;

        Ok(Database {
            connection,
            path,
            debug: options.debug,
        })
    }

    /// Whether absence on `get` is reported as `RecordError::NoResult`.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Path of the database file, `None` for in-memory databases.
    pub fn current_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Query executor bound to this handle's connection.
    pub fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.connection)
    }

    /// Schema operator bound to this handle's connection.
    pub fn schema(&self) -> SchemaOperator<'_> {
        SchemaOperator::new(&self.connection)
    }
}
