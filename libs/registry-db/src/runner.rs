//! Database handle and runners.
//!
//! [`Db`] wraps the connection pool. Operations execute through a runner:
//! [`RepoConn`] outside transactions, [`RepoTx`] inside. The transactional
//! runner reports `locking() == true`, which makes every `find` issued through
//! it carry `FOR UPDATE` so nested reads honor the row locks the transaction
//! already relies on.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};

use crate::error::{DbError, TxError};

pub trait Runner: Send + Sync {
    type Conn: ConnectionTrait;

    fn conn(&self) -> &Self::Conn;

    /// Whether point reads issued through this runner take row locks.
    fn locking(&self) -> bool {
        false
    }
}

/// Owning database handle. Cheap to clone; one per process.
#[derive(Clone)]
pub struct Db {
    conn: DatabaseConnection,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    /// Connect using a DSN.
    ///
    /// # Errors
    /// Returns `DbError` when the pool cannot be established.
    pub async fn connect(dsn: &str) -> Result<Self, DbError> {
        let mut opts = ConnectOptions::new(dsn.to_owned());
        opts.sqlx_logging(false)
            .connect_timeout(Duration::from_secs(10));
        let conn = Database::connect(opts).await?;
        Ok(Self { conn })
    }

    /// Wrap an already-open connection (tests).
    #[must_use]
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    #[must_use]
    pub fn conn(&self) -> RepoConn<'_> {
        RepoConn { conn: &self.conn }
    }

    /// Raw connection for infrastructure code (migrations).
    #[must_use]
    pub fn sea(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Run `f` inside a transaction; commit iff it returns `Ok`.
    ///
    /// # Errors
    /// Domain errors from the closure come back as `TxError::Domain` after the
    /// rollback; begin/commit failures as `TxError::Db`.
    pub async fn transaction<T, E, F>(&self, f: F) -> Result<T, TxError<E>>
    where
        T: Send,
        E: Send,
        F: for<'a> FnOnce(
                &'a RepoTx<'a>,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>
            + Send,
    {
        let txn = self
            .conn
            .begin()
            .await
            .map_err(|e| TxError::Db(DbError::from(e)))?;
        let tx = RepoTx { tx: &txn };

        match f(&tx).await {
            Ok(v) => {
                txn.commit()
                    .await
                    .map_err(|e| TxError::Db(DbError::from(e)))?;
                Ok(v)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(TxError::Domain(e))
            }
        }
    }

    /// [`Db::transaction`] bounded by `deadline`. An elapsed timer aborts the
    /// transaction (dropping it rolls back) and surfaces
    /// [`DbError::DeadlineExceeded`].
    ///
    /// # Errors
    /// As [`Db::transaction`], plus `TxError::Db(DbError::DeadlineExceeded)`.
    pub async fn transaction_with_timeout<T, E, F>(
        &self,
        deadline: Duration,
        f: F,
    ) -> Result<T, TxError<E>>
    where
        T: Send,
        E: Send,
        F: for<'a> FnOnce(
                &'a RepoTx<'a>,
            ) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>
            + Send,
    {
        match tokio::time::timeout(deadline, self.transaction(f)).await {
            Ok(res) => res,
            Err(_) => Err(TxError::Db(DbError::DeadlineExceeded)),
        }
    }
}

/// Non-transactional runner borrowing from [`Db`].
pub struct RepoConn<'a> {
    conn: &'a DatabaseConnection,
}

impl Runner for RepoConn<'_> {
    type Conn = DatabaseConnection;

    fn conn(&self) -> &Self::Conn {
        self.conn
    }
}

/// Transactional runner; only obtainable inside [`Db::transaction`].
pub struct RepoTx<'a> {
    tx: &'a DatabaseTransaction,
}

impl Runner for RepoTx<'_> {
    type Conn = DatabaseTransaction;

    fn conn(&self) -> &Self::Conn {
        self.tx
    }

    fn locking(&self) -> bool {
        true
    }
}
