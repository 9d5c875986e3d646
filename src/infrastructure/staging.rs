use crate::domain::order::Order;
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use std::collections::BTreeMap;

/// Rows written inside a unit of work but not yet committed.
///
/// A `None` transaction entry is a staged delete.
#[derive(Debug, Default)]
pub struct StagedWrites {
    pub transactions: BTreeMap<String, Option<BankTransaction>>,
    pub orders: BTreeMap<String, Order>,
}

impl StagedWrites {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty() && self.orders.is_empty()
    }

    /// `Some(row)` when the unit has staged this hash (a staged delete yields
    /// `Some(None)`), `None` when the committed row should be consulted.
    pub fn transaction(&self, hash: &str) -> Option<Option<BankTransaction>> {
        self.transactions.get(hash).cloned()
    }

    pub fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.get(order_id).cloned()
    }

    /// Committed transactions with staged rows laid over them, sorted by hash.
    pub fn overlay_transactions(
        &self,
        committed: impl IntoIterator<Item = BankTransaction>,
    ) -> Vec<BankTransaction> {
        let mut merged: BTreeMap<String, BankTransaction> = committed
            .into_iter()
            .filter(|tx| !self.transactions.contains_key(&tx.transaction_hash))
            .map(|tx| (tx.transaction_hash.clone(), tx))
            .collect();
        for (hash, staged) in &self.transactions {
            if let Some(tx) = staged {
                merged.insert(hash.clone(), tx.clone());
            }
        }
        merged.into_values().collect()
    }

    /// Committed orders with staged rows laid over them, sorted by id.
    pub fn overlay_orders(&self, committed: impl IntoIterator<Item = Order>) -> Vec<Order> {
        let mut merged: BTreeMap<String, Order> = committed
            .into_iter()
            .map(|order| (order.order_id.clone(), order))
            .collect();
        for (order_id, order) in &self.orders {
            merged.insert(order_id.clone(), order.clone());
        }
        merged.into_values().collect()
    }

    pub fn transactions_with_status(
        &self,
        committed: impl IntoIterator<Item = BankTransaction>,
        status: ReconciliationStatus,
    ) -> Vec<BankTransaction> {
        self.overlay_transactions(committed)
            .into_iter()
            .filter(|tx| tx.reconciliation_status == status)
            .collect()
    }

    pub fn orders_with_status(
        &self,
        committed: impl IntoIterator<Item = Order>,
        status: ReconciliationStatus,
    ) -> Vec<Order> {
        self.overlay_orders(committed)
            .into_iter()
            .filter(|order| order.reconciliation_status == status)
            .collect()
    }

    pub fn max_batch_id(
        &self,
        committed_transactions: impl IntoIterator<Item = BankTransaction>,
        committed_orders: impl IntoIterator<Item = Order>,
    ) -> Option<u64> {
        let tx_max = self
            .overlay_transactions(committed_transactions)
            .iter()
            .filter_map(|tx| tx.batch_id)
            .max();
        let order_max = self
            .overlay_orders(committed_orders)
            .iter()
            .filter_map(|order| order.batch_id)
            .max();
        tx_max.max(order_max)
    }
}
