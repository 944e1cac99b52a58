//! Shared test utilities for core module tests
//!
//! Provides an in-memory [`RuleSource`] that renumbers like ufw, plus helpers
//! for temp metadata directories.
//! This module is only compiled in test mode.

use crate::core::error::{Error, Result};
use crate::core::metadata::MetadataStore;
use crate::core::reconciler::Reconciler;
use crate::core::rule::{Action, Direction, FirewallStatus, Protocol, Rule, RuleSpec};
use crate::core::source::{Listing, Mutation, RuleSource};
use std::sync::Mutex;

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("UFWM_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("UFWM_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// Inbound allow rule for `port`/tcp from anywhere.
pub fn tcp_spec(port: u16) -> RuleSpec {
    RuleSpec {
        action: Action::Allow,
        direction: Direction::In,
        protocol: Protocol::Tcp,
        port: port.to_string(),
        endpoint: "any".to_string(),
    }
}

#[derive(Debug, Default)]
struct FakeState {
    rules: Vec<RuleSpec>,
    inactive: bool,
    unavailable: bool,
    fail_when: Option<fn(&Mutation) -> bool>,
    applied: Vec<Mutation>,
}

/// In-memory stand-in for ufw
///
/// Positions are dense and renumber on delete. Adds append and inserts shift
/// later rules up; either one is a silent no-op for a duplicate. While
/// inactive the listing shows no rows. Reset clears all.
#[derive(Debug, Default)]
pub struct FakeRuleSource {
    state: Mutex<FakeState>,
}

impl FakeRuleSource {
    pub fn with_rules(rules: Vec<RuleSpec>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                rules,
                ..FakeState::default()
            }),
        }
    }

    /// Makes every later `apply` matching `pred` fail with a tool error.
    pub fn fail_when(&self, pred: fn(&Mutation) -> bool) {
        self.state.lock().unwrap().fail_when = Some(pred);
    }

    /// Disables or enables the firewall without touching its rules.
    pub fn set_inactive(&self, inactive: bool) {
        self.state.lock().unwrap().inactive = inactive;
    }

    /// Makes every call fail as if the binary had disappeared.
    pub fn set_unavailable(&self) {
        self.state.lock().unwrap().unavailable = true;
    }

    /// Deletes a rule behind the reconciler's back.
    pub fn external_delete(&self, position: u32) {
        self.state.lock().unwrap().rules.remove(position as usize - 1);
    }

    pub fn specs(&self) -> Vec<RuleSpec> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn applied(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().applied.clone()
    }
}

fn invalid_position(position: u32) -> Error {
    Error::Tool {
        exit_code: Some(1),
        message: format!("ERROR: Invalid position '{position}'"),
    }
}

impl RuleSource for FakeRuleSource {
    async fn list(&self) -> Result<Listing> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(Error::ToolUnavailable("ufw: No such file or directory".into()));
        }
        if state.inactive {
            return Ok(Listing {
                status: FirewallStatus::Inactive,
                ..Listing::default()
            });
        }
        let rules: Vec<Rule> = state
            .rules
            .iter()
            .enumerate()
            .map(|(idx, spec)| Rule {
                position: idx as u32 + 1,
                spec: spec.clone(),
                v6: false,
                comment: None,
            })
            .collect();
        Ok(Listing {
            status: FirewallStatus::Active,
            reported: rules.len() as u32,
            rules,
        })
    }

    async fn apply(&self, mutation: &Mutation) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(Error::ToolUnavailable("ufw: No such file or directory".into()));
        }
        if state.fail_when.is_some_and(|pred| pred(mutation)) {
            return Err(Error::Tool {
                exit_code: Some(1),
                message: format!("ERROR: injected failure for {}", mutation.describe()),
            });
        }

        match mutation {
            Mutation::Add(spec) => {
                if !state.rules.contains(spec) {
                    state.rules.push(spec.clone());
                }
            }
            Mutation::Insert { position, spec } => {
                let idx = *position as usize;
                if idx == 0 || idx > state.rules.len() {
                    return Err(invalid_position(*position));
                }
                if !state.rules.contains(spec) {
                    state.rules.insert(idx - 1, spec.clone());
                }
            }
            Mutation::Delete(position) => {
                let idx = *position as usize;
                if idx == 0 || idx > state.rules.len() {
                    return Err(invalid_position(*position));
                }
                state.rules.remove(idx - 1);
            }
            Mutation::Reload => {}
            Mutation::ResetAll => {
                state.rules.clear();
                state.inactive = true;
            }
        }
        state.applied.push(mutation.clone());
        Ok(())
    }
}

/// Reconciler over a fake source with `ports` as rules 1..=N and an empty
/// metadata directory.
pub fn fake_reconciler(ports: &[u16]) -> (Reconciler<FakeRuleSource>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeRuleSource::with_rules(ports.iter().map(|p| tcp_spec(*p)).collect());
    let reconciler = Reconciler::new(source, MetadataStore::new(dir.path()));
    (reconciler, dir)
}
