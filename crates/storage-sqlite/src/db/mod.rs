//! Database setup: file location, connection pool, migrations.

pub mod write_actor;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use northstar_core::Result;

use crate::errors::StorageError;

pub use write_actor::{spawn_writer, WriteHandle};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const DB_FILE_NAME: &str = "northstar.db";
const POOL_MAX_SIZE: u32 = 8;
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = {};",
            BUSY_TIMEOUT_MS
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Ensures the data directory exists and returns the database file path.
pub fn init(app_data_dir: &str) -> Result<String> {
    std::fs::create_dir_all(app_data_dir).map_err(StorageError::from)?;
    let db_path = Path::new(app_data_dir).join(DB_FILE_NAME);
    Ok(db_path.to_string_lossy().to_string())
}

pub fn create_pool(db_path: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = Pool::builder()
        .max_size(POOL_MAX_SIZE)
        .connection_timeout(Duration::from_secs(10))
        .connection_customizer(Box::new(ConnectionOptions))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    Ok(pool.get().map_err(StorageError::from)?)
}

pub fn run_migrations(db_path: &str) -> Result<()> {
    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    if !applied.is_empty() {
        info!("[Storage] Applied {} migration(s)", applied.len());
    }
    Ok(())
}
