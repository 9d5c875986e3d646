use super::matching::MatchStats;
use super::status::{ReconciliationStatus, RemitecStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One outstanding remittance awaiting payment from the bank.
///
/// `transaction_ids` is the authoritative list of linked bank transactions.
/// Many transactions may pay one order; each transaction pays at most one.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub order_id: String,
    #[serde(default)]
    pub order_bank_reference: String,
    pub customer_name: String,
    pub amount_total_fee: Decimal,
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub reconciliation_status: ReconciliationStatus,
    #[serde(default)]
    pub transaction_ids: Vec<String>,
    #[serde(default)]
    pub batch_id: Option<u64>,
    #[serde(default)]
    pub reconciled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reconciled_by: Option<String>,
    #[serde(default)]
    pub remitec_status: RemitecStatus,
    #[serde(default)]
    pub match_stats: Option<MatchStats>,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        customer_name: impl Into<String>,
        order_date: Option<NaiveDate>,
        amount_total_fee: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            order_bank_reference: String::new(),
            customer_name: customer_name.into(),
            amount_total_fee,
            order_date,
            reconciliation_status: ReconciliationStatus::Unmatched,
            transaction_ids: Vec::new(),
            batch_id: None,
            reconciled_at: None,
            reconciled_by: None,
            remitec_status: RemitecStatus::Unknown,
            match_stats: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.order_bank_reference = reference.into();
        self
    }

    pub fn with_remitec_status(mut self, status: RemitecStatus) -> Self {
        self.remitec_status = status;
        self
    }

    pub fn holds(&self, transaction_hash: &str) -> bool {
        self.transaction_ids.iter().any(|h| h == transaction_hash)
    }

    /// Appends the hash unless it is already linked.
    pub fn link(&mut self, transaction_hash: &str) {
        if !self.holds(transaction_hash) {
            self.transaction_ids.push(transaction_hash.to_string());
        }
    }

    pub fn unlink(&mut self, transaction_hash: &str) {
        self.transaction_ids.retain(|h| h != transaction_hash);
    }

    pub fn clear_suggestion(&mut self) {
        self.match_stats = None;
        if self.reconciliation_status == ReconciliationStatus::SuggestedMatch {
            self.reconciliation_status = ReconciliationStatus::Unmatched;
        }
    }

    /// Resets status and reconciliation stamps. `transaction_ids` is left to
    /// the caller, which must release or unlink the transactions it names.
    pub fn reset(&mut self) {
        self.reconciliation_status = ReconciliationStatus::Unmatched;
        self.batch_id = None;
        self.reconciled_at = None;
        self.reconciled_by = None;
        self.match_stats = None;
    }
}
