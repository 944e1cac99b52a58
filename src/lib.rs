//! ufwm - terminal manager for ufw rules
//!
//! Lists the firewall's numbered rules next to a locally stored service label
//! and note for each one, and keeps those annotations attached to the right
//! rule while ufw renumbers around adds, edits, deletes and resets.
//!
//! # Architecture
//!
//! - [`core`] - Rule model, ufw parsing, annotation storage and the reconciler
//! - [`app`] - Interactive session state machine and rendering
//! - [`tui`] / [`event`] - Terminal setup and the input thread
//! - [`elevation`] - Running ufw through sudo/run0/pkexec
//! - [`audit`] - Audit log of every privileged mutation
//! - [`validators`] - Form input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - XDG directories and string helpers
//!
//! # Consistency
//!
//! - ufw owns the rules; annotations are keyed by rule position
//! - Deletes shift later annotations down, resets clear them
//! - Annotations for positions ufw no longer reports are pruned
//! - Annotation files are replaced atomically

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod event;
pub mod tui;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::reconciler::{AnnotatedRule, Reconciler, Snapshot};
pub use core::rule::{Action, Direction, Protocol, Rule, RuleSpec};
