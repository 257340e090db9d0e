use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::config::DatabaseSettings;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("failed to build connection pool: {0}")]
    Build(#[from] r2d2::Error),

    #[error("failed to run migrations: {0}")]
    Migration(String),
}

/// Per-connection pragmas. SQLite needs them set on every new handle.
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    busy_timeout: Duration,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout.as_millis()
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn init_pool(settings: &DatabaseSettings) -> Result<DbPool, PoolError> {
    let timeout = Duration::from_secs(settings.timeout_seconds);
    let manager = ConnectionManager::<SqliteConnection>::new(&settings.url);
    let pool = Pool::builder()
        .max_size(settings.pool_size)
        .connection_timeout(timeout)
        .connection_customizer(Box::new(SqlitePragmas { busy_timeout: timeout }))
        .build(manager)?;

    run_migrations(&pool)?;
    info!(url = %settings.url, pool_size = settings.pool_size, "database ready");
    Ok(pool)
}

fn run_migrations(pool: &DbPool) -> Result<(), PoolError> {
    let mut conn = pool.get().map_err(|e| PoolError::Migration(e.to_string()))?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| PoolError::Migration(e.to_string()))?;
    for version in applied {
        info!(%version, "applied migration");
    }
    Ok(())
}
