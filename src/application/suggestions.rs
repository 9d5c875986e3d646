use super::policy::MatchPolicy;
use super::scorer;
use crate::domain::matching::MatchStats;
use crate::domain::order::Order;
use crate::domain::ports::ReconciliationStoreRef;
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::{ReconError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

const YIELD_EVERY: usize = 64;

/// A proposed, unconfirmed 1-to-1 pairing.
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
pub struct Suggestion {
    pub transaction_hash: String,
    pub order_id: String,
    pub stats: MatchStats,
}

type Rank = (bool, u8, Reverse<Decimal>, Reverse<i64>);

fn rank(stats: &MatchStats) -> Rank {
    (
        stats.reference_match,
        stats.name_similarity,
        Reverse(stats.amount_diff.abs()),
        Reverse(stats.date_diff_days.abs()),
    )
}

/// Best accepted partner seen so far for every transaction and every order.
///
/// Candidates are visited in sort order and only a strictly better rank
/// replaces the current pick, so ties keep the first candidate.
struct Scan {
    best_order: Vec<Option<(usize, Rank, MatchStats)>>,
    best_transaction: Vec<Option<(usize, Rank)>>,
}

impl Scan {
    fn new(transactions: usize, orders: usize) -> Self {
        Self {
            best_order: vec![None; transactions],
            best_transaction: vec![None; orders],
        }
    }

    fn visit(&mut self, ti: usize, tx: &BankTransaction, orders: &[Order], policy: &MatchPolicy) {
        for (oi, order) in orders.iter().enumerate() {
            let stats = scorer::score(tx, order);
            let dated = tx.transaction_date.is_some() && order.order_date.is_some();
            if !policy.accepts(&stats, dated) {
                continue;
            }
            let r = rank(&stats);
            if self.best_order[ti].as_ref().is_none_or(|(_, best, _)| r > *best) {
                self.best_order[ti] = Some((oi, r, stats));
            }
            if self.best_transaction[oi]
                .as_ref()
                .is_none_or(|(_, best)| r > *best)
            {
                self.best_transaction[oi] = Some((ti, r));
            }
        }
    }

    fn into_suggestions(self, transactions: &[BankTransaction], orders: &[Order]) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        for (ti, pick) in self.best_order.into_iter().enumerate() {
            let Some((oi, _, stats)) = pick else {
                continue;
            };
            if matches!(self.best_transaction[oi], Some((back, _)) if back == ti) {
                suggestions.push(Suggestion {
                    transaction_hash: transactions[ti].transaction_hash.clone(),
                    order_id: orders[oi].order_id.clone(),
                    stats,
                });
            }
        }
        suggestions
    }
}

/// Computes mutual-best suggestions without touching any store.
///
/// Inputs are sorted by hash and order id first, so the result does not
/// depend on the order the caller supplies them in.
pub fn plan(
    transactions: &[BankTransaction],
    orders: &[Order],
    policy: &MatchPolicy,
) -> Vec<Suggestion> {
    let mut transactions = transactions.to_vec();
    let mut orders = orders.to_vec();
    transactions.sort_by(|a, b| a.transaction_hash.cmp(&b.transaction_hash));
    orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));

    let mut scan = Scan::new(transactions.len(), orders.len());
    for (ti, tx) in transactions.iter().enumerate() {
        scan.visit(ti, tx, &orders, policy);
    }
    scan.into_suggestions(&transactions, &orders)
}

/// Regenerates the full set of suggestions from the unmatched pools.
pub struct SuggestionEngine {
    store: ReconciliationStoreRef,
    policy: MatchPolicy,
}

impl SuggestionEngine {
    pub fn new(store: ReconciliationStoreRef, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn run(&self) -> Result<Vec<Suggestion>> {
        self.run_with_cancel(&AtomicBool::new(false)).await
    }

    /// Clears existing suggestions and writes a fresh set in one unit of work.
    ///
    /// Setting `cancel` stops the scan before the next transaction and
    /// returns [`ReconError::Cancelled`]; nothing is committed in that case,
    /// nor when the future is dropped mid-scan.
    pub async fn run_with_cancel(&self, cancel: &AtomicBool) -> Result<Vec<Suggestion>> {
        let mut unit = self.store.begin().await?;

        let stale_transactions = unit
            .transactions_with_status(ReconciliationStatus::SuggestedMatch)
            .await?;
        let stale_orders = unit
            .orders_with_status(ReconciliationStatus::SuggestedMatch)
            .await?;
        debug!(
            transactions = stale_transactions.len(),
            orders = stale_orders.len(),
            "Clearing previous suggestions"
        );
        for mut tx in stale_transactions {
            tx.clear_suggestion();
            unit.put_transaction(tx);
        }
        for mut order in stale_orders {
            order.clear_suggestion();
            unit.put_order(order);
        }

        let transactions = unit
            .transactions_with_status(ReconciliationStatus::Unmatched)
            .await?;
        // Unmatched orders that still list transactions are partially
        // unconciliated and cannot take a new match.
        let orders: Vec<Order> = unit
            .orders_with_status(ReconciliationStatus::Unmatched)
            .await?
            .into_iter()
            .filter(|order| order.transaction_ids.is_empty())
            .collect();
        debug!(
            transactions = transactions.len(),
            orders = orders.len(),
            "Scanning unmatched pools"
        );

        let mut scan = Scan::new(transactions.len(), orders.len());
        for (ti, tx) in transactions.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                warn!(scanned = ti, "Suggestion run cancelled, discarding partial state");
                return Err(ReconError::Cancelled);
            }
            scan.visit(ti, tx, &orders, &self.policy);
            if ti % YIELD_EVERY == YIELD_EVERY - 1 {
                tokio::task::yield_now().await;
            }
        }
        let suggestions = scan.into_suggestions(&transactions, &orders);

        for suggestion in &suggestions {
            let Some(mut tx) = unit.transaction(&suggestion.transaction_hash).await? else {
                return Err(ReconError::transaction_not_found(&suggestion.transaction_hash));
            };
            let Some(mut order) = unit.order(&suggestion.order_id).await? else {
                return Err(ReconError::order_not_found(&suggestion.order_id));
            };
            tx.reconciliation_status = ReconciliationStatus::SuggestedMatch;
            tx.candidate_order_id = Some(order.order_id.clone());
            tx.match_stats = Some(suggestion.stats);
            order.reconciliation_status = ReconciliationStatus::SuggestedMatch;
            order.match_stats = Some(suggestion.stats);
            debug!(
                transaction = %tx.transaction_hash,
                order = %order.order_id,
                reference_match = suggestion.stats.reference_match,
                name_similarity = suggestion.stats.name_similarity,
                "Suggested match"
            );
            unit.put_transaction(tx);
            unit.put_order(order);
        }

        unit.commit().await?;
        info!(suggestions = suggestions.len(), "Suggestion run committed");
        Ok(suggestions)
    }
}
