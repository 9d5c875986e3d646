use super::ledger::{ConsistencyViolation, ImportSummary, MatchGroup, ReconciliationLedger};
use super::policy::MatchPolicy;
use super::suggestions::{Suggestion, SuggestionEngine};
use crate::domain::actor::Actor;
use crate::domain::order::Order;
use crate::domain::ports::ReconciliationStoreRef;
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct SuggestionReport {
    pub suggestions_count: usize,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
pub struct BatchReceipt {
    pub batch_id: u64,
}

/// Everything stamped with one batch id.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct BatchSummary {
    pub batch_id: u64,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub reconciled_by: Option<String>,
    pub orders: Vec<Order>,
    pub transactions: Vec<BankTransaction>,
}

impl BatchSummary {
    pub fn total_credited(&self) -> Decimal {
        self.transactions.iter().map(|tx| tx.credit_amount).sum()
    }

    pub fn total_ordered(&self) -> Decimal {
        self.orders.iter().map(|order| order.amount_total_fee).sum()
    }
}

/// The main entry point for reconciliation.
///
/// `ReconciliationEngine` owns one shared store and exposes the suggestion
/// run, the ledger operations and the read accessors the API layer needs.
/// It is `Send + Sync`; wrap it in an `Arc` to share it between tasks.
pub struct ReconciliationEngine {
    store: ReconciliationStoreRef,
    suggestions: SuggestionEngine,
    ledger: ReconciliationLedger,
}

impl ReconciliationEngine {
    /// Creates a new `ReconciliationEngine` over `store`.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistence for transactions and orders.
    /// * `policy` - Suggestion thresholds and the approval tolerance.
    pub fn new(store: ReconciliationStoreRef, policy: MatchPolicy) -> Self {
        Self {
            suggestions: SuggestionEngine::new(store.clone(), policy.clone()),
            ledger: ReconciliationLedger::new(store.clone(), policy),
            store,
        }
    }

    pub fn policy(&self) -> &MatchPolicy {
        self.ledger.policy()
    }

    pub async fn run_suggestions(&self) -> Result<SuggestionReport> {
        self.run_suggestions_with_cancel(&AtomicBool::new(false))
            .await
    }

    pub async fn run_suggestions_with_cancel(&self, cancel: &AtomicBool) -> Result<SuggestionReport> {
        let suggestions = self.suggestions.run_with_cancel(cancel).await?;
        Ok(SuggestionReport {
            suggestions_count: suggestions.len(),
            suggestions,
        })
    }

    pub async fn approve_match(
        &self,
        actor: &Actor,
        transaction_hashes: &[String],
        order_id: &str,
        override_reason: Option<&str>,
    ) -> Result<()> {
        self.ledger
            .approve_match(actor, transaction_hashes, order_id, override_reason)
            .await
    }

    pub async fn reject_suggestion(
        &self,
        actor: &Actor,
        transaction_hash: &str,
        order_id: &str,
    ) -> Result<()> {
        self.ledger
            .reject_suggestion(actor, transaction_hash, order_id)
            .await
    }

    pub async fn unmatch(&self, actor: &Actor, transaction_hash: &str) -> Result<()> {
        self.ledger.unmatch(actor, transaction_hash).await
    }

    pub async fn reconcile_batch(&self, actor: &Actor, matches: &[MatchGroup]) -> Result<BatchReceipt> {
        let batch_id = self.ledger.reconcile_batch(actor, matches).await?;
        Ok(BatchReceipt { batch_id })
    }

    pub async fn unconciliate(
        &self,
        actor: &Actor,
        transaction_hashes: &[String],
        order_id: &str,
    ) -> Result<()> {
        self.ledger
            .unconciliate(actor, transaction_hashes, order_id)
            .await
    }

    /// Returns the number of orders released.
    pub async fn undo_batch(&self, actor: &Actor, batch_id: u64) -> Result<usize> {
        self.ledger.undo_batch(actor, batch_id).await
    }

    pub async fn remove_transaction(&self, actor: &Actor, transaction_hash: &str) -> Result<()> {
        self.ledger.remove_transaction(actor, transaction_hash).await
    }

    pub async fn register_transactions(
        &self,
        records: Vec<BankTransaction>,
    ) -> Result<ImportSummary> {
        self.ledger.register_transactions(records).await
    }

    pub async fn upsert_orders(&self, records: Vec<Order>) -> Result<ImportSummary> {
        self.ledger.upsert_orders(records).await
    }

    pub async fn check_consistency(&self) -> Result<Vec<ConsistencyViolation>> {
        self.ledger.check_consistency().await
    }

    pub async fn get_transaction(&self, transaction_hash: &str) -> Result<Option<BankTransaction>> {
        self.store.get_transaction(transaction_hash).await
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.store.get_order(order_id).await
    }

    pub async fn list_transactions(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<Vec<BankTransaction>> {
        self.store.list_transactions(status).await
    }

    pub async fn list_orders(&self, status: Option<ReconciliationStatus>) -> Result<Vec<Order>> {
        self.store.list_orders(status).await
    }

    /// Reconciled records grouped by batch id, oldest batch first.
    ///
    /// Only records still `reconciled` are listed. After a partial
    /// unconciliate the order is back to `unmatched`, so its batch shows the
    /// remaining transactions without the order until they are unconciliated
    /// or the batch is undone.
    pub async fn reconciled_batches(&self) -> Result<Vec<BatchSummary>> {
        let mut batches: BTreeMap<u64, BatchSummary> = BTreeMap::new();

        for order in self
            .store
            .list_orders(Some(ReconciliationStatus::Reconciled))
            .await?
        {
            let Some(batch_id) = order.batch_id else {
                continue;
            };
            let summary = batches
                .entry(batch_id)
                .or_insert_with(|| BatchSummary {
                    batch_id,
                    reconciled_at: order.reconciled_at,
                    reconciled_by: order.reconciled_by.clone(),
                    orders: Vec::new(),
                    transactions: Vec::new(),
                });
            summary.orders.push(order);
        }
        for tx in self
            .store
            .list_transactions(Some(ReconciliationStatus::Reconciled))
            .await?
        {
            let Some(batch_id) = tx.batch_id else {
                continue;
            };
            let summary = batches
                .entry(batch_id)
                .or_insert_with(|| BatchSummary {
                    batch_id,
                    reconciled_at: tx.reconciled_at,
                    reconciled_by: tx.reconciled_by.clone(),
                    orders: Vec::new(),
                    transactions: Vec::new(),
                });
            summary.transactions.push(tx);
        }

        Ok(batches.into_values().collect())
    }

    pub async fn batch(&self, batch_id: u64) -> Result<Option<BatchSummary>> {
        Ok(self
            .reconciled_batches()
            .await?
            .into_iter()
            .find(|batch| batch.batch_id == batch_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn day(d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2024, 8, d)
    }

    async fn seeded_engine() -> ReconciliationEngine {
        let engine = ReconciliationEngine::new(Arc::new(InMemoryStore::new()), MatchPolicy::default());
        engine
            .register_transactions(vec![
                BankTransaction::new("h1", "ACME CORP", day(2), dec!(500.00)).with_reference("AB123456"),
                BankTransaction::new("h2", "Globex", day(5), dec!(80.00)),
            ])
            .await
            .unwrap();
        engine
            .upsert_orders(vec![
                Order::new("o1", "ACME CORP", day(1), dec!(500.00)).with_reference("AB123456"),
                Order::new("o2", "Globex", day(5), dec!(80.00)),
            ])
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_batches_group_orders_and_transactions() {
        let engine = seeded_engine().await;
        let actor = Actor::operator("carol");

        let first = engine
            .reconcile_batch(&actor, &[MatchGroup::new("o1", vec!["h1".into()])])
            .await
            .unwrap();
        let second = engine
            .reconcile_batch(&actor, &[MatchGroup::new("o2", vec!["h2".into()])])
            .await
            .unwrap();
        assert_eq!(first.batch_id, 1);
        assert_eq!(second.batch_id, 2);

        let batches = engine.reconciled_batches().await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].orders[0].order_id, "o1");
        assert_eq!(batches[0].total_credited(), dec!(500.00));
        assert_eq!(batches[1].total_ordered(), dec!(80.00));
        assert_eq!(batches[1].reconciled_by.as_deref(), Some("carol"));

        assert!(engine.batch(2).await.unwrap().is_some());
        assert!(engine.batch(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_unconciliate_leaves_order_out_of_batch() {
        let engine = ReconciliationEngine::new(Arc::new(InMemoryStore::new()), MatchPolicy::default());
        engine
            .register_transactions(vec![
                BankTransaction::new("h1", "ACME", day(3), dec!(60.00)),
                BankTransaction::new("h2", "ACME", day(3), dec!(40.00)),
            ])
            .await
            .unwrap();
        engine
            .upsert_orders(vec![Order::new("o1", "ACME", day(3), dec!(100.00))])
            .await
            .unwrap();
        let actor = Actor::operator("carol");
        engine
            .reconcile_batch(&actor, &[MatchGroup::new("o1", vec!["h1".into(), "h2".into()])])
            .await
            .unwrap();

        engine.unconciliate(&actor, &["h1".to_string()], "o1").await.unwrap();

        let batch = engine.batch(1).await.unwrap().unwrap();
        assert!(batch.orders.is_empty());
        assert_eq!(batch.transactions.len(), 1);
        assert_eq!(batch.transactions[0].transaction_hash, "h2");
        assert_eq!(batch.total_credited(), dec!(40.00));

        engine.undo_batch(&actor, 1).await.unwrap();
        assert!(engine.reconciled_batches().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_commits_nothing() {
        let engine = seeded_engine().await;
        let cancel = AtomicBool::new(true);

        let err = engine.run_suggestions_with_cancel(&cancel).await.unwrap_err();
        assert!(matches!(err, crate::error::ReconError::Cancelled));
        assert_eq!(
            engine
                .list_transactions(Some(ReconciliationStatus::SuggestedMatch))
                .await
                .unwrap()
                .len(),
            0
        );

        cancel.store(false, Ordering::Relaxed);
        let report = engine.run_suggestions_with_cancel(&cancel).await.unwrap();
        assert_eq!(report.suggestions_count, 2);
    }
}
