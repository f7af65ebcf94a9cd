//! Named transaction scopes over an [`ExecutionStorage`].

use std::sync::Arc;

use super::{ExecutionStorage, StorageError, StorageTransaction};

/// Runs closures inside named storage transactions.
///
/// The transaction commits when the closure returns `Ok` and rolls back when
/// it returns `Err`. The closure is synchronous, so no transaction is ever
/// held open across an `.await` of the caller's own work.
pub struct TransactionalGateway<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: ExecutionStorage + ?Sized> TransactionalGateway<S> {
    /// Create a gateway over shared storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// The underlying storage.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Run `f` inside a transaction named `name`.
    pub async fn with_transaction<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn StorageTransaction) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut tx = self.storage.begin(name).await?;
        let tx_id = tx.id();
        tracing::trace!(tx = %tx_id, name, "Transaction opened");

        match f(tx.as_mut()) {
            Ok(value) => {
                tx.commit()?;
                tracing::trace!(tx = %tx_id, name, "Transaction committed");
                Ok(value)
            }
            Err(e) => {
                drop(tx);
                tracing::debug!(tx = %tx_id, name, "Transaction rolled back");
                Err(e)
            }
        }
    }
}

impl<S: ?Sized> Clone for TransactionalGateway<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}
