//! Pooled SQLite connection

use crate::config::Settings;
use di::{Ref, inject, injectable};
use log::info;
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Pool installed by tests in place of the configured database.
static TEST_POOL: RwLock<Option<SqlitePool>> = parking_lot::const_rwlock(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> DatabaseConnection {
        if let Some(pool) = TEST_POOL.read().clone() {
            return DatabaseConnection::from_pool(pool);
        }

        let options = SqliteConnectOptions::from_str(&settings.database_url)
            .expect("DATABASE_URL must be a valid sqlite url")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.database_max_connections)
            .connect_lazy_with(options);

        info!("database pool configured for {}", settings.database_url);
        DatabaseConnection::from_pool(pool)
    }
}

impl DatabaseConnection {
    pub fn from_pool(pool: SqlitePool) -> DatabaseConnection {
        DatabaseConnection {
            connection: pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Makes every `DatabaseConnection` created afterwards use `pool`.
    pub fn set_test_pool(pool: SqlitePool) {
        *TEST_POOL.write() = Some(pool);
    }

    pub fn clear_test_pool() {
        TEST_POOL.write().take();
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.connection).await
    }

    /// Starts a unit of work.
    ///
    /// SQLite admits a single writer, so units of work queue on a gate before opening
    /// their transaction instead of failing with `SQLITE_BUSY` halfway through.
    pub async fn begin(&self) -> Result<UnitOfWork, sqlx::Error> {
        let gate = self.write_gate.clone().lock_owned().await;
        let transaction = self.connection.begin().await?;

        Ok(UnitOfWork {
            transaction,
            _gate: gate,
        })
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

/// One atomic write against the store.
///
/// Dropping it without [`UnitOfWork::commit`] rolls everything back, which is also what
/// happens when the request future is cancelled.
pub struct UnitOfWork {
    // declared first so the rollback is queued before the gate opens
    transaction: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

impl UnitOfWork {
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.transaction.commit().await
    }
}

impl Deref for UnitOfWork {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
