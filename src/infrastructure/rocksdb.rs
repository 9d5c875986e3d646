use super::staging::StagedWrites;
use crate::domain::order::Order;
use crate::domain::ports::{ReconciliationStore, UnitOfWork};
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for bank transactions, keyed by transaction hash.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for orders, keyed by order id.
pub const CF_ORDERS: &str = "orders";

/// A persistent store implementation using RocksDB.
///
/// Each aggregate lives in its own Column Family with JSON values. A unit of
/// work stages rows in memory and commits them through a single
/// `WriteBatch`, so both aggregates change together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("transactions" and "orders") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_transactions, cf_orders])?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

fn column<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| ReconError::Persistence(format!("{name} column family not found")))
}

fn read_row<T: DeserializeOwned>(db: &DB, cf_name: &str, key: &str) -> Result<Option<T>> {
    let cf = column(db, cf_name)?;
    match db.get_pinned_cf(cf, key.as_bytes())? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn scan<T: DeserializeOwned>(db: &DB, cf_name: &str) -> Result<Vec<T>> {
    let cf = column(db, cf_name)?;
    let mut rows = Vec::new();
    for item in db.iterator_cf(cf, IteratorMode::Start) {
        let (_key, value) = item?;
        rows.push(serde_json::from_slice(&value)?);
    }
    Ok(rows)
}

#[async_trait]
impl ReconciliationStore for RocksDBStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDBUnit {
            _guard: guard,
            db: self.db.clone(),
            staged: StagedWrites::default(),
        }))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<BankTransaction>> {
        read_row(&self.db, CF_TRANSACTIONS, hash)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        read_row(&self.db, CF_ORDERS, order_id)
    }

    async fn list_transactions(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<Vec<BankTransaction>> {
        let rows: Vec<BankTransaction> = scan(&self.db, CF_TRANSACTIONS)?;
        Ok(rows
            .into_iter()
            .filter(|tx| status.is_none_or(|s| tx.reconciliation_status == s))
            .collect())
    }

    async fn list_orders(&self, status: Option<ReconciliationStatus>) -> Result<Vec<Order>> {
        let rows: Vec<Order> = scan(&self.db, CF_ORDERS)?;
        Ok(rows
            .into_iter()
            .filter(|order| status.is_none_or(|s| order.reconciliation_status == s))
            .collect())
    }
}

struct RocksDBUnit {
    _guard: OwnedMutexGuard<()>,
    db: Arc<DB>,
    staged: StagedWrites,
}

#[async_trait]
impl UnitOfWork for RocksDBUnit {
    async fn transaction(&self, hash: &str) -> Result<Option<BankTransaction>> {
        match self.staged.transaction(hash) {
            Some(staged) => Ok(staged),
            None => read_row(&self.db, CF_TRANSACTIONS, hash),
        }
    }

    async fn order(&self, order_id: &str) -> Result<Option<Order>> {
        match self.staged.order(order_id) {
            Some(staged) => Ok(Some(staged)),
            None => read_row(&self.db, CF_ORDERS, order_id),
        }
    }

    async fn transactions_with_status(
        &self,
        status: ReconciliationStatus,
    ) -> Result<Vec<BankTransaction>> {
        let committed: Vec<BankTransaction> = scan(&self.db, CF_TRANSACTIONS)?;
        Ok(self.staged.transactions_with_status(committed, status))
    }

    async fn orders_with_status(&self, status: ReconciliationStatus) -> Result<Vec<Order>> {
        let committed: Vec<Order> = scan(&self.db, CF_ORDERS)?;
        Ok(self.staged.orders_with_status(committed, status))
    }

    async fn max_batch_id(&self) -> Result<Option<u64>> {
        let transactions: Vec<BankTransaction> = scan(&self.db, CF_TRANSACTIONS)?;
        let orders: Vec<Order> = scan(&self.db, CF_ORDERS)?;
        Ok(self.staged.max_batch_id(transactions, orders))
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
        if self.staged.is_empty() {
            return Ok(());
        }
        let cf_transactions = column(&self.db, CF_TRANSACTIONS)?;
        let cf_orders = column(&self.db, CF_ORDERS)?;

        let mut batch = WriteBatch::default();
        for (hash, row) in &self.staged.transactions {
            match row {
                Some(tx) => batch.put_cf(cf_transactions, hash.as_bytes(), serde_json::to_vec(tx)?),
                None => batch.delete_cf(cf_transactions, hash.as_bytes()),
            }
        }
        for (order_id, order) in &self.staged.orders {
            batch.put_cf(cf_orders, order_id.as_bytes(), serde_json::to_vec(order)?);
        }
        self.db.write(batch)?;
        Ok(())
    }
}
