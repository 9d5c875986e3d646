use super::order::Order;
use super::status::ReconciliationStatus;
use super::transaction::BankTransaction;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence for both reconciliation aggregates.
///
/// Reads on the store itself see committed state only. Every mutation goes
/// through a [`UnitOfWork`], which serializes writers and applies its staged
/// rows all-or-nothing on [`UnitOfWork::commit`].
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Opens a unit of work, waiting for any other writer to finish.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<BankTransaction>>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;

    /// Transactions sorted by hash, optionally filtered by status.
    async fn list_transactions(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<Vec<BankTransaction>>;

    /// Orders sorted by id, optionally filtered by status.
    async fn list_orders(&self, status: Option<ReconciliationStatus>) -> Result<Vec<Order>>;
}

/// An open, exclusive write scope over the store.
///
/// Reads reflect rows staged earlier in the same unit. Dropping the unit
/// without committing discards everything staged.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn transaction(&self, hash: &str) -> Result<Option<BankTransaction>>;
    async fn order(&self, order_id: &str) -> Result<Option<Order>>;
    async fn transactions_with_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<BankTransaction>>;
    async fn orders_with_status(&self, status: ReconciliationStatus) -> Result<Vec<Order>>;

    /// Highest batch id carried by any transaction or order.
    async fn max_batch_id(&self) -> Result<Option<u64>>;

    fn put_transaction(&mut self, tx: BankTransaction);
    fn put_order(&mut self, order: Order);
    fn delete_transaction(&mut self, hash: &str);

    async fn commit(self: Box<Self>) -> Result<()>;
}

pub type ReconciliationStoreRef = Arc<dyn ReconciliationStore>;
