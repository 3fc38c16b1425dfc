use once_cell::sync::Lazy;
use recordkit::config::{load_config, Config};
use recordkit::core::db::{ColumnType, SchemaDescriptor};
use recordkit::logging;
use recordkit::record::{Entity, Record};
use std::process::ExitCode;
use tracing::{error, info};

static DB_TEST_TABLE: Lazy<SchemaDescriptor> = Lazy::new(|| {
    SchemaDescriptor::builder("db_test_table")
        .column("id", ColumnType::Int)
        .column("name", ColumnType::String)
        .column("age", ColumnType::Int)
        .column("created_at", ColumnType::DateTime)
        .column("updated_at", ColumnType::DateTime)
        .build()
        .expect("db_test_table schema is valid")
});

/// Entity exercised by the database self-test
struct DbTestRecord;

impl Entity for DbTestRecord {
    fn schema() -> &'static SchemaDescriptor {
        &DB_TEST_TABLE
    }
}

fn main() -> ExitCode {
    // Parse CLI arguments
    let config = match std::env::args().nth(1) {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    if let Err(e) = logging::init(&config.log) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting recordkit...");

    match run_database_test(&config) {
        Ok(true) => {
            println!("Database Test: Test Passed");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            println!("Database Test: Test Failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("database test aborted: {}", e);
            println!("Database Test: Test Failed ({})", e);
            ExitCode::FAILURE
        }
    }
}

/// Saves a record, reloads it and compares the readable fields.
fn run_database_test(config: &Config) -> recordkit::Result<bool> {
    let db = config.open_database()?;

    let now = chrono::Local::now().naive_local();
    let mut test = Record::<DbTestRecord>::init(&db)?;
    test.set("name", "John Doe")
        .set("age", 25)
        .set("created_at", now)
        .set("updated_at", now);
    test.save(&db)?;

    let Some(id) = test.id() else {
        return Ok(false);
    };
    let Some(loaded) = Record::<DbTestRecord>::get(&db, id)? else {
        return Ok(false);
    };

    let readable = loaded.readable()?;
    Ok(readable["name"] == "John Doe" && readable["age"] == 25)
}
