use super::staging::StagedWrites;
use crate::domain::order::Order;
use crate::domain::ports::{ReconciliationStore, UnitOfWork};
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
struct Tables {
    transactions: BTreeMap<String, BankTransaction>,
    orders: BTreeMap<String, Order>,
}

/// A thread-safe in-memory store for both reconciliation aggregates.
///
/// Committed rows live behind an `Arc<RwLock<..>>`; a separate writer mutex
/// is held by each open unit of work so that writers run one at a time.
/// `Clone` shares the same underlying tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryUnit {
            _guard: guard,
            tables: self.tables.clone(),
            staged: StagedWrites::default(),
        }))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<BankTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(hash).cloned())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn list_transactions(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<Vec<BankTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .values()
            .filter(|tx| status.is_none_or(|s| tx.reconciliation_status == s))
            .cloned()
            .collect())
    }

    async fn list_orders(&self, status: Option<ReconciliationStatus>) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|order| status.is_none_or(|s| order.reconciliation_status == s))
            .cloned()
            .collect())
    }
}

struct InMemoryUnit {
    _guard: OwnedMutexGuard<()>,
    tables: Arc<RwLock<Tables>>,
    staged: StagedWrites,
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn transaction(&self, hash: &str) -> Result<Option<BankTransaction>> {
        if let Some(staged) = self.staged.transaction(hash) {
            return Ok(staged);
        }
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(hash).cloned())
    }

    async fn order(&self, order_id: &str) -> Result<Option<Order>> {
        if let Some(staged) = self.staged.order(order_id) {
            return Ok(Some(staged));
        }
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn transactions_with_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<BankTransaction>> {
        let tables = self.tables.read().await;
        Ok(self
            .staged
            .transactions_with_status(tables.transactions.values().cloned(), status))
    }

    async fn orders_with_status(&self, status: ReconciliationStatus) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(self
            .staged
            .orders_with_status(tables.orders.values().cloned(), status))
    }

    async fn max_batch_id(&self) -> Result<Option<u64>> {
        let tables = self.tables.read().await;
        Ok(self.staged.max_batch_id(
            tables.transactions.values().cloned(),
            tables.orders.values().cloned(),
        ))
    }

    fn put_transaction(&mut self, tx: BankTransaction) {
        self.staged
            .transactions
            .insert(tx.transaction_hash.clone(), Some(tx));
    }

    fn put_order(&mut self, order: Order) {
        self.staged.orders.insert(order.order_id.clone(), order);
    }

    fn delete_transaction(&mut self, hash: &str) {
        self.staged.transactions.insert(hash.to_string(), None);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnit {
            _guard,
            tables,
            staged,
        } = *self;
        if staged.is_empty() {
            return Ok(());
        }
        let mut tables = tables.write().await;
        for (hash, row) in staged.transactions {
            match row {
                Some(tx) => {
                    tables.transactions.insert(hash, tx);
                }
                None => {
                    tables.transactions.remove(&hash);
                }
            }
        }
        for (order_id, order) in staged.orders {
            tables.orders.insert(order_id, order);
        }
        Ok(())
    }
}
