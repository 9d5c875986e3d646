use super::matching::MatchStats;
use super::status::ReconciliationStatus;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One imported bank credit.
///
/// `order_id` is the committed link and is only set while the transaction is
/// temporarily matched or reconciled. A suggestion only fills
/// `candidate_order_id`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct BankTransaction {
    pub transaction_hash: String,
    pub payer_sender: String,
    pub transaction_date: Option<NaiveDate>,
    pub credit_amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub extracted_reference: Option<String>,
    #[serde(default)]
    pub reconciliation_status: ReconciliationStatus,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub candidate_order_id: Option<String>,
    #[serde(default)]
    pub batch_id: Option<u64>,
    #[serde(default)]
    pub reconciled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reconciled_by: Option<String>,
    #[serde(default)]
    pub reason_to_override: Option<String>,
    #[serde(default)]
    pub overridden_by: Option<String>,
    #[serde(default)]
    pub match_stats: Option<MatchStats>,
}

impl BankTransaction {
    pub fn new(
        transaction_hash: impl Into<String>,
        payer_sender: impl Into<String>,
        transaction_date: Option<NaiveDate>,
        credit_amount: Decimal,
    ) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            payer_sender: payer_sender.into(),
            transaction_date,
            credit_amount,
            description: String::new(),
            extracted_reference: None,
            reconciliation_status: ReconciliationStatus::Unmatched,
            order_id: None,
            candidate_order_id: None,
            batch_id: None,
            reconciled_at: None,
            reconciled_by: None,
            reason_to_override: None,
            overridden_by: None,
            match_stats: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.extracted_reference = Some(reference.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Drops a pending suggestion, leaving committed fields alone.
    pub fn clear_suggestion(&mut self) {
        self.candidate_order_id = None;
        self.match_stats = None;
        if self.reconciliation_status == ReconciliationStatus::SuggestedMatch {
            self.reconciliation_status = ReconciliationStatus::Unmatched;
        }
    }

    /// Returns the transaction to `unmatched`, severing every link and
    /// clearing reconciliation stamps.
    pub fn release(&mut self) {
        self.reconciliation_status = ReconciliationStatus::Unmatched;
        self.order_id = None;
        self.candidate_order_id = None;
        self.batch_id = None;
        self.reconciled_at = None;
        self.reconciled_by = None;
        self.match_stats = None;
    }
}
