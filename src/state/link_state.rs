/// Link state definitions for tracking ingestion progress
use std::fmt;

/// Number of listing-issue failures after which a link is never attempted again
pub const MAX_ATTEMPTS: u32 = 3;

/// Represents the persisted state of a discovered link
///
/// ```text
/// Pending → Processed
///         → FailedRetryable → Processed | FailedRetryable | FailedTerminal
/// ```
///
/// A link being extracted has no state of its own: it stays in its eligible state until
/// the ledger records the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Discovered, never attempted
    Pending,

    /// Extracted and persisted
    Processed,

    /// Failed with a listing issue; still below the attempt ceiling
    FailedRetryable,

    /// Failed with a listing issue `MAX_ATTEMPTS` times; excluded from future runs
    FailedTerminal,
}

impl LinkState {
    /// Returns true if a link in this state may be picked up for extraction
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Pending | Self::FailedRetryable)
    }

    /// State after a listing-issue failure brings the attempt counter to `attempts`
    pub fn after_listing_issue(attempts: u32) -> Self {
        if attempts >= MAX_ATTEMPTS {
            Self::FailedTerminal
        } else {
            Self::FailedRetryable
        }
    }

    /// Converts the link state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::FailedRetryable => "failed_retryable",
            Self::FailedTerminal => "failed_terminal",
        }
    }

    /// Parses a link state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processed" => Some(Self::Processed),
            "failed_retryable" => Some(Self::FailedRetryable),
            "failed_terminal" => Some(Self::FailedTerminal),
            _ => None,
        }
    }

    /// Returns every state, in lifecycle order
    pub fn persisted_states() -> [Self; 4] {
        [
            Self::Pending,
            Self::Processed,
            Self::FailedRetryable,
            Self::FailedTerminal,
        ]
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
