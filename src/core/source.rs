//! The seam between the reconciler and whatever produces the live rule list
//!
//! [`Ufw`](crate::core::ufw::Ufw) is the production implementation; tests
//! inject an in-memory source that mimics ufw's renumbering.

use crate::core::error::Result;
use crate::core::rule::{FirewallStatus, Rule, RuleSpec};

/// One observation of the firewall's rule list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Firewall state; an inactive firewall lists no rows
    pub status: FirewallStatus,
    /// Rules that decoded, in position order
    pub rules: Vec<Rule>,
    /// Highest position the tool reported, including rows that did not decode
    pub reported: u32,
}

impl Listing {
    /// Number of rule positions currently occupied in the firewall.
    pub fn rule_count(&self) -> usize {
        (self.reported as usize).max(self.rules.len())
    }

    pub fn find(&self, position: u32) -> Option<&Rule> {
        self.rules.iter().find(|r| r.position == position)
    }
}

/// A state-changing request to the firewall tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Append a rule; the tool picks its position
    Add(RuleSpec),
    /// Insert a rule at a position, shifting that position and later ones up
    Insert { position: u32, spec: RuleSpec },
    /// Delete the rule at a position; later rules shift down by one
    Delete(u32),
    /// Reload the firewall from its own configuration
    Reload,
    /// Remove every rule and disable the firewall
    ResetAll,
}

impl Mutation {
    /// Arguments passed to `ufw`.
    pub fn to_ufw_args(&self) -> Vec<String> {
        match self {
            Mutation::Add(spec) => spec.to_ufw_args(),
            Mutation::Insert { position, spec } => {
                let mut args = vec!["insert".to_string(), position.to_string()];
                args.extend(spec.to_ufw_args());
                args
            }
            Mutation::Delete(position) => {
                vec!["--force".into(), "delete".into(), position.to_string()]
            }
            Mutation::Reload => vec!["reload".into()],
            Mutation::ResetAll => vec!["--force".into(), "reset".into()],
        }
    }

    /// Short description for logs and the audit trail.
    pub fn describe(&self) -> String {
        match self {
            Mutation::Add(spec) => format!("add {spec}"),
            Mutation::Insert { position, spec } => format!("insert {position} {spec}"),
            Mutation::Delete(position) => format!("delete {position}"),
            Mutation::Reload => "reload".to_string(),
            Mutation::ResetAll => "reset".to_string(),
        }
    }
}

/// Produces the live rule list and applies mutations.
///
/// Every mutation takes effect immediately and is never rolled back.
#[allow(async_fn_in_trait)]
pub trait RuleSource {
    /// Lists the current rules.
    ///
    /// # Errors
    ///
    /// `ToolUnavailable` if the tool cannot be started, `Tool`/`Permission` on
    /// non-zero exit, `Parse` if numbered rows exist but none decode.
    async fn list(&self) -> Result<Listing>;

    /// Applies a single mutation.
    async fn apply(&self, mutation: &Mutation) -> Result<()>;
}
