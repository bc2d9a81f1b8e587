//! Database transaction utilities

use opentube_core::AppError;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// A transaction that must be finished with `commit` or `rollback`.
///
/// Dropping it unfinished rolls back (sqlx issues the rollback when the
/// connection returns to the pool) and logs a warning.
pub struct TransactionGuard<'a> {
    transaction: Option<Transaction<'a, Postgres>>,
    operation: &'static str,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a new database transaction
    pub async fn begin(pool: &'a PgPool, operation: &'static str) -> Result<Self, AppError> {
        let transaction = pool.begin().await?;
        Ok(Self {
            transaction: Some(transaction),
            operation,
        })
    }

    /// Connection to run statements on inside the transaction.
    pub fn conn(&mut self) -> Result<&mut PgConnection, AppError> {
        let operation = self.operation;
        self.transaction.as_deref_mut().ok_or_else(|| {
            AppError::Internal(format!("Transaction for {} already finished", operation))
        })
    }

    pub async fn commit(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.transaction.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            tracing::warn!(
                operation = self.operation,
                "Transaction dropped without commit or rollback - rolling back"
            );
        }
    }
}
