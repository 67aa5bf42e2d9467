//! Utility functions shared across the pipeline.
//!
//! - **URL validation**: refuses subscription endpoints that would make the
//!   sync job request localhost or private networks
//! - **Timestamps**: one parser for entry dates and stored cutoffs

mod timestamp;
mod url_validator;

pub use timestamp::parse_timestamp;
pub use url_validator::{validate_endpoint, UrlValidationError};
