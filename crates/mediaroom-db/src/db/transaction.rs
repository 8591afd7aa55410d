//! Database transaction utilities
//!
//! Multi-statement registry operations run inside a [`TransactionGuard`] so
//! they either apply completely or not at all.

use mediaroom_core::AppError;
use sqlx::{PgPool, Postgres, Transaction};
use std::ops::{Deref, DerefMut};

/// A database transaction wrapper with explicit commit/rollback.
///
/// A guard dropped without `commit` rolls back: sqlx issues the rollback
/// when the underlying transaction is dropped.
///
/// ```ignore
/// let mut tx = TransactionGuard::begin(&pool, "replace_relations").await?;
/// sqlx::query("DELETE FROM ...").execute(&mut **tx).await?;
/// tx.commit().await?;
/// ```
pub struct TransactionGuard<'a> {
    transaction: Transaction<'a, Postgres>,
    operation: &'static str,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a new database transaction
    pub async fn begin(pool: &'a PgPool, operation: &'static str) -> Result<Self, AppError> {
        let transaction = pool.begin().await.map_err(|e| {
            tracing::error!(error = %e, operation, "Failed to begin database transaction");
            AppError::Database(e)
        })?;

        Ok(Self {
            transaction,
            operation,
        })
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<(), AppError> {
        let operation = self.operation;
        self.transaction.commit().await.map_err(|e| {
            tracing::error!(error = %e, operation, "Failed to commit database transaction");
            AppError::Database(e)
        })
    }

    /// Roll the transaction back
    pub async fn rollback(self) -> Result<(), AppError> {
        let operation = self.operation;
        tracing::debug!(operation, "Rolling back database transaction");
        self.transaction.rollback().await.map_err(AppError::Database)
    }
}

impl<'a> Deref for TransactionGuard<'a> {
    type Target = Transaction<'a, Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl<'a> DerefMut for TransactionGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}
