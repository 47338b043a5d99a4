//! Extraction results and the parsers shared by every site strategy
//!
//! Extraction never signals expected outcomes through errors. A strategy returns an
//! [`ExtractionOutcome`]: a full [`AuctionRecord`], a deliberate skip, or a classified
//! [`ExtractionFailure`].

pub mod dom;
pub mod fields;

pub use fields::ListingIssue;

use crate::sites::Site;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Optional vehicle attributes
///
/// Each field degrades to `None` when the page is missing or garbles it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    pub vin: Option<String>,
    pub mileage: Option<u32>,
    pub title_status: Option<String>,
    pub location: Option<String>,
    pub seller: Option<String>,
    pub engine: Option<String>,
    pub drivetrain: Option<String>,
    pub transmission: Option<String>,
    pub body_style: Option<String>,
    pub exterior_color: Option<String>,
    pub interior_color: Option<String>,
    pub seller_type: Option<String>,
}

/// A fully extracted auction, one-to-one with its link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRecord {
    pub link_id: Uuid,
    pub site: Site,
    pub url: String,
    pub year: i32,
    pub make: String,
    pub model: String,
    pub price: Decimal,
    pub end_date: Option<NaiveDateTime>,
    /// `None` when the site does not say whether bidding has closed
    pub ended: Option<bool>,
    pub status_text: Option<String>,
    pub attributes: VehicleAttributes,
    /// Everything the page labelled that the schema does not model explicitly
    pub raw_parameters: BTreeMap<String, String>,
}

/// Why an extraction attempt did not produce a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// This one listing is malformed, stale, relisted, or missing a required field
    ListingIssue(String),
    /// The shared rendering session is unusable
    SessionFailure(String),
    /// Network trouble fetching the page; says nothing about the listing itself
    Transport(String),
}

impl ExtractionFailure {
    pub fn listing_issue(message: impl Into<String>) -> Self {
        Self::ListingIssue(message.into())
    }
}

impl From<ListingIssue> for ExtractionFailure {
    fn from(issue: ListingIssue) -> Self {
        Self::ListingIssue(issue.0)
    }
}

/// Result of one extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(Box<AuctionRecord>),
    /// Not enough data to build a record (no usable year); not an error
    Skipped { reason: String },
    Failed(ExtractionFailure),
}

impl ExtractionOutcome {
    pub fn extracted(record: AuctionRecord) -> Self {
        Self::Extracted(Box::new(record))
    }
}

impl From<ListingIssue> for ExtractionOutcome {
    fn from(issue: ListingIssue) -> Self {
        Self::Failed(issue.into())
    }
}

impl From<ExtractionFailure> for ExtractionOutcome {
    fn from(failure: ExtractionFailure) -> Self {
        Self::Failed(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_issue_converts_to_failed_outcome() {
        let outcome: ExtractionOutcome = ListingIssue::new("Could not parse price").into();
        assert_eq!(
            outcome,
            ExtractionOutcome::Failed(ExtractionFailure::ListingIssue(
                "Could not parse price".to_string()
            ))
        );
    }
}
