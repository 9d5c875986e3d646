use super::batch::BatchAllocator;
use super::policy::MatchPolicy;
use crate::domain::actor::Actor;
use crate::domain::order::Order;
use crate::domain::ports::{ReconciliationStoreRef, UnitOfWork};
use crate::domain::status::ReconciliationStatus;
use crate::domain::transaction::BankTransaction;
use crate::error::{Entity, ReconError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// One order and the bank transactions that pay it, reconciled together.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct MatchGroup {
    pub order_id: String,
    pub transaction_hashes: Vec<String>,
}

impl MatchGroup {
    pub fn new(order_id: impl Into<String>, transaction_hashes: Vec<String>) -> Self {
        Self {
            order_id: order_id.into(),
            transaction_hashes,
        }
    }
}

/// Row counts from registering transactions or upserting orders.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// A broken link between the two aggregates found by
/// [`ReconciliationLedger::check_consistency`].
#[derive(Debug, Serialize, PartialEq, Eq, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyViolation {
    /// The order lists a hash that has no transaction.
    MissingTransaction {
        order_id: String,
        transaction_hash: String,
    },
    /// The order lists a transaction that points somewhere else.
    ForeignTransaction {
        order_id: String,
        transaction_hash: String,
        linked_to: Option<String>,
    },
    /// The transaction points at an order that does not exist.
    MissingOrder {
        transaction_hash: String,
        order_id: String,
    },
    /// The transaction points at an order that does not list it.
    NotHeldByOrder {
        transaction_hash: String,
        order_id: String,
    },
    /// The same hash appears in more than one order's list.
    SharedTransaction {
        transaction_hash: String,
        order_ids: Vec<String>,
    },
    /// `order_id` is set without a linked status, or the other way round.
    StatusMismatch {
        transaction_hash: String,
        status: ReconciliationStatus,
    },
}

/// The transactional state machine over bank transactions and orders.
///
/// Every operation opens exactly one unit of work and either commits all of
/// its writes or none of them.
pub struct ReconciliationLedger {
    store: ReconciliationStoreRef,
    policy: MatchPolicy,
}

async fn load_transaction(unit: &dyn UnitOfWork, hash: &str) -> Result<BankTransaction> {
    unit.transaction(hash)
        .await?
        .ok_or_else(|| ReconError::transaction_not_found(hash))
}

async fn load_order(unit: &dyn UnitOfWork, order_id: &str) -> Result<Order> {
    unit.order(order_id)
        .await?
        .ok_or_else(|| ReconError::order_not_found(order_id))
}

fn require_unique(hashes: &[String]) -> Result<()> {
    if hashes.is_empty() {
        return Err(ReconError::policy("at least one transaction hash is required"));
    }
    let mut seen = HashSet::new();
    for hash in hashes {
        if !seen.insert(hash.as_str()) {
            return Err(ReconError::policy(format!(
                "transaction {hash} is listed more than once"
            )));
        }
    }
    Ok(())
}

/// A partially unconciliated order still lists reconciled transactions; it
/// cannot be matched again until they are unconciliated too.
fn still_reconciled(order_id: &str, hash: &str) -> ReconError {
    ReconError::policy(format!(
        "order {order_id} still lists reconciled transaction {hash}; \
         unconciliate the remaining transactions first"
    ))
}

/// Clears pending suggestions that would dangle once `hashes` are committed
/// to `order_id`: other transactions proposed for this order, and orders the
/// committed transactions had been proposed for.
async fn clear_competing_suggestions(
    unit: &mut dyn UnitOfWork,
    order_id: &str,
    hashes: &[String],
) -> Result<()> {
    for mut suggested in unit
        .transactions_with_status(ReconciliationStatus::SuggestedMatch)
        .await?
    {
        let candidate = suggested.candidate_order_id.clone();
        let committed_here = hashes.contains(&suggested.transaction_hash);
        if committed_here {
            if let Some(other) = candidate.filter(|other| other != order_id)
                && let Some(mut other_order) = unit.order(&other).await?
                && other_order.reconciliation_status == ReconciliationStatus::SuggestedMatch
            {
                other_order.clear_suggestion();
                unit.put_order(other_order);
            }
        } else if candidate.as_deref() == Some(order_id) {
            suggested.clear_suggestion();
            unit.put_transaction(suggested);
        }
    }
    Ok(())
}

impl ReconciliationLedger {
    pub fn new(store: ReconciliationStoreRef, policy: MatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Commits a manual or approved match of `hashes` to `order_id`.
    ///
    /// An order shortfall above the approval tolerance is only accepted with
    /// a non-empty `override_reason` from a privileged actor; the reason is
    /// recorded on every transaction in the call.
    pub async fn approve_match(
        &self,
        actor: &Actor,
        hashes: &[String],
        order_id: &str,
        override_reason: Option<&str>,
    ) -> Result<()> {
        require_unique(hashes)?;
        let mut unit = self.store.begin().await?;

        let mut order = load_order(unit.as_ref(), order_id).await?;
        if order.reconciliation_status == ReconciliationStatus::Reconciled {
            return Err(ReconError::policy(format!(
                "order {order_id} is already reconciled"
            )));
        }

        let mut transactions = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let tx = load_transaction(unit.as_ref(), hash).await?;
            if tx.reconciliation_status == ReconciliationStatus::Reconciled {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is already reconciled"
                )));
            }
            if let Some(linked) = tx.order_id.as_deref()
                && linked != order_id
            {
                warn!(actor = %actor.id, transaction = %hash, linked, order_id, "Rejected double link");
                return Err(ReconError::policy(format!(
                    "transaction {hash} is already matched to order {linked}"
                )));
            }
            transactions.push(tx);
        }

        let mut matched: Decimal = transactions.iter().map(|tx| tx.credit_amount).sum();
        for linked in order.transaction_ids.iter().filter(|h| !hashes.contains(h)) {
            if let Some(tx) = unit.transaction(linked).await? {
                if tx.reconciliation_status == ReconciliationStatus::Reconciled {
                    return Err(still_reconciled(order_id, linked));
                }
                matched += tx.credit_amount;
            }
        }
        let shortfall = order.amount_total_fee - matched;
        let reason = override_reason.map(str::trim).filter(|r| !r.is_empty());
        if self.policy.requires_override(shortfall) {
            match reason {
                None => {
                    warn!(actor = %actor.id, order_id, %shortfall, "Approval exceeds tolerance");
                    return Err(ReconError::policy(format!(
                        "order {order_id} exceeds the matched amount by {shortfall} \
                         (tolerance {}); an override reason is required",
                        self.policy.approval_tolerance
                    )));
                }
                Some(_) if !actor.privileged => {
                    warn!(actor = %actor.id, order_id, "Unprivileged override attempt");
                    return Err(ReconError::policy(format!(
                        "actor {} may not override an amount mismatch",
                        actor.id
                    )));
                }
                Some(_) => {}
            }
        }

        clear_competing_suggestions(unit.as_mut(), order_id, hashes).await?;

        for mut tx in transactions {
            tx.reconciliation_status = ReconciliationStatus::TemporarilyMatched;
            tx.order_id = Some(order_id.to_string());
            tx.candidate_order_id = None;
            if let Some(reason) = reason {
                tx.reason_to_override = Some(reason.to_string());
                tx.overridden_by = Some(actor.id.clone());
            }
            order.link(&tx.transaction_hash);
            unit.put_transaction(tx);
        }
        order.reconciliation_status = ReconciliationStatus::TemporarilyMatched;
        unit.put_order(order);

        unit.commit().await?;
        info!(actor = %actor.id, order_id, transactions = hashes.len(), %shortfall, "Match approved");
        Ok(())
    }

    /// Turns down a suggestion, returning both records to `unmatched`.
    ///
    /// Rejecting a suggestion that is already gone is a no-op.
    pub async fn reject_suggestion(&self, actor: &Actor, hash: &str, order_id: &str) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let mut tx = load_transaction(unit.as_ref(), hash).await?;
        let mut order = load_order(unit.as_ref(), order_id).await?;

        match tx.reconciliation_status {
            ReconciliationStatus::SuggestedMatch => {
                if tx.candidate_order_id.as_deref() != Some(order_id) {
                    return Err(ReconError::policy(format!(
                        "transaction {hash} is not suggested for order {order_id}"
                    )));
                }
                tx.clear_suggestion();
                unit.put_transaction(tx);
            }
            ReconciliationStatus::Unmatched => {}
            status => {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is {status}; only suggestions can be rejected"
                )));
            }
        }

        if order.reconciliation_status == ReconciliationStatus::SuggestedMatch {
            let still_proposed = unit
                .transactions_with_status(ReconciliationStatus::SuggestedMatch)
                .await?
                .iter()
                .any(|other| other.candidate_order_id.as_deref() == Some(order_id));
            if !still_proposed {
                order.clear_suggestion();
                unit.put_order(order);
            }
        }

        unit.commit().await?;
        info!(actor = %actor.id, transaction = %hash, order_id, "Suggestion rejected");
        Ok(())
    }

    /// Undoes a temporary match.
    ///
    /// The order always returns to `unmatched`; every other transaction still
    /// temporarily matched to it is released in the same unit so that no
    /// transaction is left pointing at an unmatched order.
    pub async fn unmatch(&self, actor: &Actor, hash: &str) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let mut tx = load_transaction(unit.as_ref(), hash).await?;

        match tx.reconciliation_status {
            ReconciliationStatus::TemporarilyMatched => {}
            ReconciliationStatus::Reconciled => {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is reconciled; unconciliate it instead"
                )));
            }
            ReconciliationStatus::SuggestedMatch => {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is only suggested; reject the suggestion instead"
                )));
            }
            ReconciliationStatus::Unmatched => {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is not matched"
                )));
            }
        }

        let order_id = tx.order_id.clone();
        tx.release();
        unit.put_transaction(tx);

        let mut released = 1;
        if let Some(order_id) = order_id.as_deref() {
            match unit.order(order_id).await? {
                Some(mut order) => {
                    order.unlink(hash);
                    let linked = std::mem::take(&mut order.transaction_ids);
                    for other in linked {
                        match unit.transaction(&other).await? {
                            Some(mut sibling)
                                if sibling.order_id.as_deref() == Some(order_id)
                                    && sibling.reconciliation_status
                                        == ReconciliationStatus::TemporarilyMatched =>
                            {
                                sibling.release();
                                unit.put_transaction(sibling);
                                released += 1;
                            }
                            Some(_) => order.transaction_ids.push(other),
                            None => {}
                        }
                    }
                    order.reset();
                    unit.put_order(order);
                }
                None => {
                    warn!(transaction = %hash, order_id, "Unmatched transaction pointed at a missing order");
                }
            }
        }

        unit.commit().await?;
        info!(actor = %actor.id, transaction = %hash, order_id = ?order_id, released, "Match undone");
        Ok(())
    }

    /// Reconciles every group under one freshly allocated batch id.
    ///
    /// Each order's `transaction_ids` becomes exactly the supplied list;
    /// transactions it previously listed but that are not in the group are
    /// released.
    pub async fn reconcile_batch(&self, actor: &Actor, groups: &[MatchGroup]) -> Result<u64> {
        if groups.is_empty() {
            return Err(ReconError::policy("a batch needs at least one match group"));
        }
        let mut seen_orders = HashSet::new();
        let mut seen_hashes = HashSet::new();
        for group in groups {
            if !seen_orders.insert(group.order_id.as_str()) {
                return Err(ReconError::policy(format!(
                    "order {} appears in more than one group",
                    group.order_id
                )));
            }
            require_unique(&group.transaction_hashes)?;
            for hash in &group.transaction_hashes {
                if !seen_hashes.insert(hash.as_str()) {
                    return Err(ReconError::policy(format!(
                        "transaction {hash} appears in more than one group"
                    )));
                }
            }
        }

        let mut unit = self.store.begin().await?;
        let batch_id = BatchAllocator::next_batch_id(unit.as_ref()).await?;
        let now = Utc::now();

        for group in groups {
            let order_id = group.order_id.as_str();
            let mut order = load_order(unit.as_ref(), order_id).await?;
            if order.reconciliation_status == ReconciliationStatus::Reconciled {
                return Err(ReconError::policy(format!(
                    "order {order_id} is already reconciled in batch {}",
                    order.batch_id.unwrap_or_default()
                )));
            }

            let mut transactions = Vec::with_capacity(group.transaction_hashes.len());
            for hash in &group.transaction_hashes {
                let tx = load_transaction(unit.as_ref(), hash).await?;
                if tx.reconciliation_status == ReconciliationStatus::Reconciled {
                    return Err(ReconError::policy(format!(
                        "transaction {hash} is already reconciled"
                    )));
                }
                if let Some(linked) = tx.order_id.as_deref()
                    && linked != order_id
                {
                    return Err(ReconError::policy(format!(
                        "transaction {hash} is matched to order {linked}, not {order_id}"
                    )));
                }
                transactions.push(tx);
            }

            for displaced in order
                .transaction_ids
                .iter()
                .filter(|h| !group.transaction_hashes.contains(h))
            {
                if let Some(mut tx) = unit.transaction(displaced).await?
                    && tx.order_id.as_deref() == Some(order_id)
                {
                    if tx.reconciliation_status == ReconciliationStatus::Reconciled {
                        return Err(still_reconciled(order_id, displaced));
                    }
                    tx.release();
                    unit.put_transaction(tx);
                }
            }
            clear_competing_suggestions(unit.as_mut(), order_id, &group.transaction_hashes)
                .await?;

            for mut tx in transactions {
                tx.reconciliation_status = ReconciliationStatus::Reconciled;
                tx.order_id = Some(order_id.to_string());
                tx.candidate_order_id = None;
                tx.batch_id = Some(batch_id);
                tx.reconciled_at = Some(now);
                tx.reconciled_by = Some(actor.id.clone());
                unit.put_transaction(tx);
            }
            order.transaction_ids = group.transaction_hashes.clone();
            order.reconciliation_status = ReconciliationStatus::Reconciled;
            order.batch_id = Some(batch_id);
            order.reconciled_at = Some(now);
            order.reconciled_by = Some(actor.id.clone());
            unit.put_order(order);
        }

        unit.commit().await?;
        info!(actor = %actor.id, batch_id, groups = groups.len(), "Batch reconciled");
        Ok(batch_id)
    }

    /// Reverses reconciliation for some transactions of an order.
    ///
    /// The order is reset to `unmatched` even when other reconciled
    /// transactions remain in its list, forcing a full re-review.
    pub async fn unconciliate(&self, actor: &Actor, hashes: &[String], order_id: &str) -> Result<()> {
        require_unique(hashes)?;
        let mut unit = self.store.begin().await?;
        let mut order = load_order(unit.as_ref(), order_id).await?;

        for hash in hashes {
            let mut tx = load_transaction(unit.as_ref(), hash).await?;
            if tx.reconciliation_status != ReconciliationStatus::Reconciled
                || tx.order_id.as_deref() != Some(order_id)
            {
                return Err(ReconError::policy(format!(
                    "transaction {hash} is not reconciled against order {order_id}"
                )));
            }
            tx.release();
            unit.put_transaction(tx);
            order.unlink(hash);
        }
        order.reset();
        unit.put_order(order);

        unit.commit().await?;
        info!(actor = %actor.id, order_id, transactions = hashes.len(), "Reconciliation undone");
        Ok(())
    }

    /// Unconciliates every group stamped with `batch_id`.
    pub async fn undo_batch(&self, actor: &Actor, batch_id: u64) -> Result<usize> {
        let mut unit = self.store.begin().await?;
        let transactions: Vec<BankTransaction> = unit
            .transactions_with_status(ReconciliationStatus::Reconciled)
            .await?
            .into_iter()
            .filter(|tx| tx.batch_id == Some(batch_id))
            .collect();
        let orders: Vec<Order> = unit
            .orders_with_status(ReconciliationStatus::Reconciled)
            .await?
            .into_iter()
            .filter(|order| order.batch_id == Some(batch_id))
            .collect();
        if transactions.is_empty() && orders.is_empty() {
            return Err(ReconError::NotFound {
                entity: Entity::Batch,
                id: batch_id.to_string(),
            });
        }

        let released: HashSet<String> = transactions
            .iter()
            .map(|tx| tx.transaction_hash.clone())
            .collect();

        // A partially unconciliated order is no longer stamped with the batch
        // but still lists the transactions released here.
        let mut touched: BTreeMap<String, Order> = orders
            .into_iter()
            .map(|order| (order.order_id.clone(), order))
            .collect();
        for tx in &transactions {
            if let Some(order_id) = tx.order_id.as_deref()
                && !touched.contains_key(order_id)
            {
                match unit.order(order_id).await? {
                    Some(order) => {
                        touched.insert(order_id.to_string(), order);
                    }
                    None => {
                        warn!(transaction = %tx.transaction_hash, order_id, "Batch transaction pointed at a missing order");
                    }
                }
            }
        }

        for mut tx in transactions {
            tx.release();
            unit.put_transaction(tx);
        }
        let order_count = touched.len();
        for mut order in touched.into_values() {
            order.transaction_ids.retain(|h| !released.contains(h));
            order.reset();
            unit.put_order(order);
        }

        unit.commit().await?;
        info!(actor = %actor.id, batch_id, orders = order_count, transactions = released.len(), "Batch undone");
        Ok(order_count)
    }

    /// Deletes a transaction that is not reconciled, severing its order link.
    pub async fn remove_transaction(&self, actor: &Actor, hash: &str) -> Result<()> {
        let mut unit = self.store.begin().await?;
        let tx = load_transaction(unit.as_ref(), hash).await?;
        if tx.reconciliation_status == ReconciliationStatus::Reconciled {
            return Err(ReconError::policy(format!(
                "transaction {hash} is reconciled; unconciliate it before deleting"
            )));
        }

        if let Some(order_id) = tx.order_id.as_deref()
            && let Some(mut order) = unit.order(order_id).await?
        {
            order.unlink(hash);
            if order.transaction_ids.is_empty() {
                order.reset();
            }
            unit.put_order(order);
        }
        if tx.reconciliation_status == ReconciliationStatus::SuggestedMatch
            && let Some(candidate) = tx.candidate_order_id.as_deref()
            && let Some(mut order) = unit.order(candidate).await?
        {
            order.clear_suggestion();
            unit.put_order(order);
        }
        unit.delete_transaction(hash);

        unit.commit().await?;
        info!(actor = %actor.id, transaction = %hash, "Transaction removed");
        Ok(())
    }

    /// Inserts clean transaction records as `unmatched`. Hashes already known
    /// are skipped.
    pub async fn register_transactions(
        &self,
        records: Vec<BankTransaction>,
    ) -> Result<ImportSummary> {
        let mut unit = self.store.begin().await?;
        let mut summary = ImportSummary::default();
        for mut tx in records {
            if unit.transaction(&tx.transaction_hash).await?.is_some() {
                summary.skipped += 1;
                continue;
            }
            tx.release();
            tx.reason_to_override = None;
            tx.overridden_by = None;
            unit.put_transaction(tx);
            summary.inserted += 1;
        }
        unit.commit().await?;
        info!(
            inserted = summary.inserted,
            skipped = summary.skipped,
            "Bank transactions registered"
        );
        Ok(summary)
    }

    /// Applies an order feed. Existing orders only take new feed attributes
    /// while they are still `unmatched`.
    pub async fn upsert_orders(&self, records: Vec<Order>) -> Result<ImportSummary> {
        let mut unit = self.store.begin().await?;
        let mut summary = ImportSummary::default();
        for mut incoming in records {
            match unit.order(&incoming.order_id).await? {
                None => {
                    incoming.reset();
                    incoming.transaction_ids.clear();
                    unit.put_order(incoming);
                    summary.inserted += 1;
                }
                Some(mut existing)
                    if existing.reconciliation_status == ReconciliationStatus::Unmatched =>
                {
                    existing.order_bank_reference = incoming.order_bank_reference;
                    existing.customer_name = incoming.customer_name;
                    existing.amount_total_fee = incoming.amount_total_fee;
                    existing.order_date = incoming.order_date;
                    existing.remitec_status = incoming.remitec_status;
                    unit.put_order(existing);
                    summary.updated += 1;
                }
                Some(_) => summary.skipped += 1,
            }
        }
        unit.commit().await?;
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Orders upserted"
        );
        Ok(summary)
    }

    /// Audits committed state for broken links between the two aggregates.
    pub async fn check_consistency(&self) -> Result<Vec<ConsistencyViolation>> {
        let transactions: BTreeMap<String, BankTransaction> = self
            .store
            .list_transactions(None)
            .await?
            .into_iter()
            .map(|tx| (tx.transaction_hash.clone(), tx))
            .collect();
        let orders = self.store.list_orders(None).await?;
        let orders_by_id: BTreeMap<&str, &Order> =
            orders.iter().map(|o| (o.order_id.as_str(), o)).collect();

        let mut violations = Vec::new();
        let mut holders: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for order in &orders {
            for hash in &order.transaction_ids {
                holders
                    .entry(hash.as_str())
                    .or_default()
                    .push(order.order_id.clone());
                match transactions.get(hash) {
                    None => violations.push(ConsistencyViolation::MissingTransaction {
                        order_id: order.order_id.clone(),
                        transaction_hash: hash.clone(),
                    }),
                    Some(tx) if tx.order_id.as_deref() != Some(order.order_id.as_str()) => {
                        violations.push(ConsistencyViolation::ForeignTransaction {
                            order_id: order.order_id.clone(),
                            transaction_hash: hash.clone(),
                            linked_to: tx.order_id.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        for (hash, order_ids) in holders {
            if order_ids.len() > 1 {
                violations.push(ConsistencyViolation::SharedTransaction {
                    transaction_hash: hash.to_string(),
                    order_ids,
                });
            }
        }

        for tx in transactions.values() {
            if tx.reconciliation_status.is_linked() != tx.order_id.is_some() {
                violations.push(ConsistencyViolation::StatusMismatch {
                    transaction_hash: tx.transaction_hash.clone(),
                    status: tx.reconciliation_status,
                });
            }
            if let Some(order_id) = tx.order_id.as_deref() {
                match orders_by_id.get(order_id) {
                    None => violations.push(ConsistencyViolation::MissingOrder {
                        transaction_hash: tx.transaction_hash.clone(),
                        order_id: order_id.to_string(),
                    }),
                    Some(order) if !order.holds(&tx.transaction_hash) => {
                        violations.push(ConsistencyViolation::NotHeldByOrder {
                            transaction_hash: tx.transaction_hash.clone(),
                            order_id: order_id.to_string(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        if !violations.is_empty() {
            warn!(violations = violations.len(), "Consistency check found broken links");
        }
        Ok(violations)
    }
}
