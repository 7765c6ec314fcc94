use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Probability (percent) at or above which an incident is confirmed outright
pub const CONFIRM_THRESHOLD: f64 = 85.0;
/// Probability (percent) below which an incident is discarded as noise
pub const TRASH_THRESHOLD: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Pending,
    Confirmed,
    Trash,
}

impl IncidentStatus {
    /// Status assigned at creation time from the detection probability
    pub fn classify(probability: f64) -> Self {
        if probability >= CONFIRM_THRESHOLD {
            IncidentStatus::Confirmed
        } else if probability < TRASH_THRESHOLD {
            IncidentStatus::Trash
        } else {
            IncidentStatus::Pending
        }
    }

    /// Whether incidents in this status are pushed to alert subscribers
    pub fn is_alertable(&self) -> bool {
        matches!(self, IncidentStatus::Pending | IncidentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::Confirmed => "confirmed",
            IncidentStatus::Trash => "trash",
        }
    }

    /// Reviewer verdicts (confirmed/trash) may replace any status; nothing
    /// returns to pending once a verdict exists.
    pub fn validate_transition(&self, to: IncidentStatus) -> Result<(), StoreError> {
        match (self, to) {
            (_, IncidentStatus::Confirmed | IncidentStatus::Trash) => Ok(()),
            (IncidentStatus::Pending, IncidentStatus::Pending) => Ok(()),
            (from, IncidentStatus::Pending) => Err(StoreError::InvalidUpdate {
                details: format!("cannot move a {} incident back to pending", from),
            }),
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(IncidentStatus::Pending),
            "confirmed" => Ok(IncidentStatus::Confirmed),
            "trash" => Ok(IncidentStatus::Trash),
            _ => Err(StoreError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}
