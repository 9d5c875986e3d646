use crate::domain::matching::MatchStats;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds for automatic suggestions and manual approvals.
///
/// Every field has a default, so a partial JSON document is a valid policy.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(default)]
pub struct MatchPolicy {
    /// Largest `|amount_diff|` a suggestion may carry.
    pub max_amount_diff: Decimal,
    /// Largest `|date_diff_days|` a suggestion may carry.
    pub max_date_diff_days: i64,
    /// Name similarity must be strictly above this to stand in for a
    /// reference match.
    pub min_name_similarity: u8,
    /// Largest order shortfall an approval accepts without an override.
    pub approval_tolerance: Decimal,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_amount_diff: dec!(0.99),
            max_date_diff_days: 2,
            min_name_similarity: 70,
            approval_tolerance: dec!(1.00),
        }
    }
}

impl MatchPolicy {
    /// Whether a scored pair qualifies for a suggestion. `dated` is false when
    /// either record is missing its date.
    pub fn accepts(&self, stats: &MatchStats, dated: bool) -> bool {
        if stats.amount_diff.abs() > self.max_amount_diff {
            return false;
        }
        if !dated || stats.date_diff_days.abs() > self.max_date_diff_days {
            return false;
        }
        stats.reference_match || stats.name_similarity > self.min_name_similarity
    }

    /// Whether an order shortfall needs an override reason.
    pub fn requires_override(&self, shortfall: Decimal) -> bool {
        shortfall > self.approval_tolerance
    }
}
