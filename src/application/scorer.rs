use crate::domain::matching::MatchStats;
use crate::domain::order::Order;
use crate::domain::transaction::BankTransaction;
use std::collections::BTreeSet;

/// Scores one bank transaction against one order.
///
/// Pure and infallible: missing references, names or dates degrade to
/// `false` / `0` instead of failing.
pub fn score(tx: &BankTransaction, order: &Order) -> MatchStats {
    MatchStats {
        reference_match: reference_match(
            tx.extracted_reference.as_deref().unwrap_or_default(),
            &order.order_bank_reference,
        ),
        name_similarity: name_similarity(&tx.payer_sender, &order.customer_name),
        date_diff_days: match (tx.transaction_date, order.order_date) {
            (Some(bank), Some(ordered)) => (bank - ordered).num_days(),
            _ => 0,
        },
        amount_diff: (tx.credit_amount - order.amount_total_fee).round_dp(2),
    }
}

/// Either reference contains the other after trimming and lowercasing.
///
/// Upstream systems truncate references, so a partial reference still counts.
pub fn reference_match(bank_reference: &str, order_reference: &str) -> bool {
    let bank = bank_reference.trim().to_lowercase();
    let order = order_reference.trim().to_lowercase();
    if bank.is_empty() || order.is_empty() {
        return false;
    }
    bank.contains(&order) || order.contains(&bank)
}

/// Jaccard similarity of the two names' character sets, as a rounded
/// percentage.
pub fn name_similarity(payer: &str, customer: &str) -> u8 {
    let payer: BTreeSet<char> = payer.trim().to_lowercase().chars().collect();
    let customer: BTreeSet<char> = customer.trim().to_lowercase().chars().collect();
    if payer.is_empty() || customer.is_empty() {
        return 0;
    }
    let intersection = payer.intersection(&customer).count();
    let union = payer.union(&customer).count();
    ((intersection as f64 / union as f64) * 100.0).round() as u8
}
