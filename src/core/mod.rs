//! Rule–annotation reconciliation
//!
//! - [`rule`]: Rule data structures and ufw argument serialization
//! - [`parse`]: Parser for `ufw status numbered`
//! - [`source`]: The [`RuleSource`](source::RuleSource) seam and mutations
//! - [`ufw`]: RuleSource backed by the ufw binary
//! - [`metadata`]: Persisted service/note annotations
//! - [`reindex`]: Pure position bookkeeping after deletes
//! - [`reconciler`]: Joins rules and annotations, single writer of metadata
//! - [`error`]: Error types and ufw error translation

pub mod error;
pub mod metadata;
pub mod parse;
pub mod reconciler;
pub mod reindex;
pub mod rule;
pub mod source;
pub mod ufw;

#[cfg(test)]
pub mod test_helpers;
