use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Similarity between one bank transaction and one order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct MatchStats {
    /// One reference contains the other, case-insensitively.
    pub reference_match: bool,
    /// Character-set Jaccard similarity of the two names, 0..=100.
    pub name_similarity: u8,
    /// Bank date minus order date, in days. Positive when the credit lags.
    pub date_diff_days: i64,
    /// Bank amount minus order amount, two decimal places.
    pub amount_diff: Decimal,
}
