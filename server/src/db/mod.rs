//! Database Layer
//!
//! A single `SQLite` connection guarded by an async mutex. Every read and
//! every transaction holds the connection exclusively, so a transaction
//! never interleaves with other statements and at most one is open at a
//! time. Acquisition is bounded by the configured lock timeout.

mod models;
mod queries;


use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use models::*;
pub use queries::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// The connection lock was not acquired in time. Also the outcome of
    /// beginning a second transaction while one is still held.
    #[error("storage busy: connection not acquired within {0:?}")]
    Busy(Duration),
}

struct Slot {
    conn: SqliteConnection,
    /// Set when a transaction was dropped without commit or rollback.
    rollback_pending: bool,
}

/// Handle to the shared connection. Cheap to clone.
#[derive(Clone)]
pub struct Storage {
    slot: Arc<Mutex<Slot>>,
    lock_timeout: Duration,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Open the database. File databases are created if missing.
    pub async fn connect(database_url: &str, lock_timeout: Duration) -> Result<Self, StorageError> {
        let conn = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .connect()
            .await?;

        info!("Connected to SQLite");
        Ok(Self {
            slot: Arc::new(Mutex::new(Slot {
                conn,
                rollback_pending: false,
            })),
            lock_timeout,
        })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        let mut conn = self.acquire().await?;
        sqlx::migrate!("./migrations").run(&mut *conn).await?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Exclusive access for plain reads and single statements.
    pub async fn acquire(&self) -> Result<Conn, StorageError> {
        Ok(Conn {
            slot: self.lock().await?,
        })
    }

    /// Open a write transaction (`BEGIN IMMEDIATE`).
    ///
    /// The connection stays locked until the transaction is committed,
    /// rolled back or dropped. Dropping it unfinished rolls it back before
    /// the connection is next handed out.
    pub async fn begin(&self) -> Result<Transaction, StorageError> {
        let mut slot = self.lock().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut slot.conn).await?;
        Ok(Transaction {
            slot,
            finished: false,
        })
    }

    async fn lock(&self) -> Result<OwnedMutexGuard<Slot>, StorageError> {
        let mut slot = tokio::time::timeout(self.lock_timeout, self.slot.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.lock_timeout, "Storage lock acquisition timed out");
                StorageError::Busy(self.lock_timeout)
            })?;

        if slot.rollback_pending {
            slot.rollback_pending = false;
            if let Err(e) = sqlx::query("ROLLBACK").execute(&mut slot.conn).await {
                // Nothing to roll back if SQLite already ended the transaction.
                debug!(error = %e, "Deferred rollback failed");
            }
        }

        Ok(slot)
    }
}

/// Exclusive non-transactional connection.
pub struct Conn {
    slot: OwnedMutexGuard<Slot>,
}

impl Deref for Conn {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.slot.conn
    }
}

impl DerefMut for Conn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.conn
    }
}

/// An open write transaction.
pub struct Transaction {
    slot: OwnedMutexGuard<Slot>,
    finished: bool,
}

impl Transaction {
    pub async fn commit(mut self) -> Result<(), StorageError> {
        self.finish("COMMIT").await
    }

    pub async fn rollback(mut self) -> Result<(), StorageError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, statement: &'static str) -> Result<(), StorageError> {
        let result = sqlx::query(statement).execute(&mut self.slot.conn).await;
        self.finished = true;
        if result.is_err() {
            self.slot.rollback_pending = true;
        }
        result.map(|_| ()).map_err(StorageError::from)
    }
}

impl Deref for Transaction {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.slot.conn
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.conn
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.finished {
            self.slot.rollback_pending = true;
        }
    }
}
