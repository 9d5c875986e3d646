use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a bank transaction or order sits in the reconciliation lifecycle.
///
/// `Unmatched -> SuggestedMatch -> TemporarilyMatched -> Reconciled`, with
/// `Unmatched` reachable again through reject, unmatch and unconciliate.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    #[default]
    Unmatched,
    SuggestedMatch,
    TemporarilyMatched,
    Reconciled,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unmatched => "unmatched",
            Self::SuggestedMatch => "suggested_match",
            Self::TemporarilyMatched => "temporarily_matched",
            Self::Reconciled => "reconciled",
        }
    }

    /// Statuses that carry a committed `order_id` link.
    pub fn is_linked(&self) -> bool {
        matches!(self, Self::TemporarilyMatched | Self::Reconciled)
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconciliationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unmatched" => Ok(Self::Unmatched),
            "suggested_match" => Ok(Self::SuggestedMatch),
            "temporarily_matched" => Ok(Self::TemporarilyMatched),
            "reconciled" => Ok(Self::Reconciled),
            other => Err(format!("unknown reconciliation status '{other}'")),
        }
    }
}

/// Lifecycle tag coming from the order feed. Orthogonal to reconciliation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemitecStatus {
    Holding,
    Paid,
    Canceled,
    #[default]
    Unknown,
}

impl RemitecStatus {
    /// Maps a raw feed status code by its first letter (`H`, `P`, `C`).
    pub fn from_code(code: &str) -> Self {
        match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('H') => Self::Holding,
            Some('P') => Self::Paid,
            Some('C') => Self::Canceled,
            _ => Self::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            ReconciliationStatus::Unmatched,
            ReconciliationStatus::SuggestedMatch,
            ReconciliationStatus::TemporarilyMatched,
            ReconciliationStatus::Reconciled,
        ] {
            assert_eq!(status.as_str().parse::<ReconciliationStatus>(), Ok(status));
        }
        assert!("matched".parse::<ReconciliationStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ReconciliationStatus::TemporarilyMatched).unwrap();
        assert_eq!(json, "\"temporarily_matched\"");
    }

    #[test]
    fn test_remitec_status_from_code() {
        assert_eq!(RemitecStatus::from_code("HOLD"), RemitecStatus::Holding);
        assert_eq!(RemitecStatus::from_code("p"), RemitecStatus::Paid);
        assert_eq!(RemitecStatus::from_code("Cancelled"), RemitecStatus::Canceled);
        assert_eq!(RemitecStatus::from_code(""), RemitecStatus::Unknown);
        assert_eq!(RemitecStatus::from_code("X"), RemitecStatus::Unknown);
    }
}
