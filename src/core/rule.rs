//! Firewall rule data structures and ufw argument generation
//!
//! A [`Rule`] is one numbered entry of `ufw status numbered`. Its
//! [`position`](Rule::position) is assigned by ufw, is dense (`1..=N`) and is
//! reassigned whenever a lower-numbered rule is deleted, so it is never used
//! as a stable identity beyond a single observation.
//!
//! A [`RuleSpec`] is the part of a rule the operator controls: action,
//! direction, protocol, port and endpoint. It serializes to the ufw command
//! grammar via [`RuleSpec::to_ufw_args`].
//!
//! # Example
//!
//! ```
//! use ufwm::core::rule::{Action, Direction, Protocol, RuleSpec};
//!
//! let spec = RuleSpec {
//!     action: Action::Allow,
//!     direction: Direction::In,
//!     protocol: Protocol::Tcp,
//!     port: "22".to_string(),
//!     endpoint: "10.0.0.0/8".to_string(),
//! };
//! assert_eq!(
//!     spec.to_ufw_args(),
//!     ["allow", "in", "from", "10.0.0.0/8", "to", "any", "port", "22", "proto", "tcp"]
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token used by ufw forms and by this crate for "no restriction".
pub const ANY: &str = "any";

/// What ufw does with a matching packet
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Action {
    #[default]
    #[strum(serialize = "allow")]
    Allow,
    #[strum(serialize = "deny")]
    Deny,
    #[strum(serialize = "reject")]
    Reject,
    /// Allow, but rate limit repeated connections
    #[strum(serialize = "limit")]
    Limit,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
            Action::Reject => "reject",
            Action::Limit => "limit",
        }
    }
}

/// Traffic direction the rule applies to
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Direction {
    #[default]
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "out")]
    Out,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Transport protocol filter
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    #[default]
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    /// No protocol restriction
    #[strum(serialize = "any")]
    Any,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Any => "any",
        }
    }
}

/// Overall firewall state from the `Status:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
pub enum FirewallStatus {
    #[strum(serialize = "active")]
    Active,
    #[strum(serialize = "inactive")]
    Inactive,
    #[default]
    #[strum(serialize = "unknown")]
    Unknown,
}

/// Operator-controlled fields of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleSpec {
    pub action: Action,
    pub direction: Direction,
    pub protocol: Protocol,
    /// Port, port range (`lo:hi`), port list, or [`ANY`]
    pub port: String,
    /// IP literal, CIDR network, or [`ANY`]
    pub endpoint: String,
}

impl Default for RuleSpec {
    fn default() -> Self {
        Self {
            action: Action::Allow,
            direction: Direction::In,
            protocol: Protocol::Tcp,
            port: String::new(),
            endpoint: ANY.to_string(),
        }
    }
}

impl RuleSpec {
    /// Serializes the spec into ufw's rule grammar.
    ///
    /// The endpoint is the remote side: the source for inbound rules and the
    /// destination for outbound rules.
    pub fn to_ufw_args(&self) -> Vec<String> {
        let mut args = vec![
            self.action.as_str().to_string(),
            self.direction.as_str().to_string(),
        ];

        let endpoint = if self.endpoint.is_empty() {
            ANY
        } else {
            self.endpoint.as_str()
        };

        match self.direction {
            Direction::In => {
                if !endpoint.eq_ignore_ascii_case(ANY) {
                    args.push("from".into());
                    args.push(endpoint.to_string());
                }
                args.push("to".into());
                args.push(ANY.into());
            }
            Direction::Out => {
                args.push("to".into());
                args.push(endpoint.to_string());
            }
        }

        if !self.port.is_empty() && !self.port.eq_ignore_ascii_case(ANY) {
            args.push("port".into());
            args.push(self.port.clone());
        }

        if self.protocol != Protocol::Any {
            args.push("proto".into());
            args.push(self.protocol.as_str().into());
        }

        args
    }
}

impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ufw_args().join(" "))
    }
}

/// A rule as currently reported by ufw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// 1-based position assigned by ufw at the time of listing
    pub position: u32,
    pub spec: RuleSpec,
    /// ufw lists IPv6 twins of rules separately, tagged `(v6)`
    pub v6: bool,
    /// Trailing `# comment` from the listing, if any
    pub comment: Option<String>,
}

impl Rule {
    /// Port and protocol as ufw prints them in the `To` column (`22/tcp`).
    pub fn port_display(&self) -> String {
        let port = if self.spec.port.is_empty() {
            ANY
        } else {
            self.spec.port.as_str()
        };
        match self.spec.protocol {
            Protocol::Any => port.to_string(),
            proto => format!("{port}/{proto}"),
        }
    }

    /// Action and direction the way ufw prints them (`ALLOW IN`).
    pub fn action_display(&self) -> String {
        format!(
            "{} {}",
            self.spec.action.as_str().to_uppercase(),
            self.spec.direction.as_str().to_uppercase()
        )
    }

    pub fn endpoint_display(&self) -> String {
        let mut endpoint = if self.spec.endpoint.eq_ignore_ascii_case(ANY) {
            "Anywhere".to_string()
        } else {
            self.spec.endpoint.clone()
        };
        if self.v6 {
            endpoint.push_str(" (v6)");
        }
        endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn spec(direction: Direction, protocol: Protocol, port: &str, endpoint: &str) -> RuleSpec {
        RuleSpec {
            action: Action::Allow,
            direction,
            protocol,
            port: port.to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    #[test]
    fn test_inbound_any_endpoint_omits_from() {
        let args = spec(Direction::In, Protocol::Tcp, "22", "any").to_ufw_args();
        assert_eq!(args, ["allow", "in", "to", "any", "port", "22", "proto", "tcp"]);
    }

    #[test]
    fn test_outbound_uses_endpoint_as_destination() {
        let args = spec(Direction::Out, Protocol::Udp, "53", "1.1.1.1").to_ufw_args();
        assert_eq!(args, ["allow", "out", "to", "1.1.1.1", "port", "53", "proto", "udp"]);
    }

    #[test]
    fn test_any_protocol_and_any_port_are_omitted() {
        let args = spec(Direction::In, Protocol::Any, "any", "10.0.0.1").to_ufw_args();
        assert_eq!(args, ["allow", "in", "from", "10.0.0.1", "to", "any"]);
    }

    #[test]
    fn test_enum_parsing_is_case_insensitive() {
        assert_eq!(Action::from_str("LIMIT").unwrap(), Action::Limit);
        assert_eq!(Direction::from_str("OUT").unwrap(), Direction::Out);
        assert_eq!(Protocol::from_str("Udp").unwrap(), Protocol::Udp);
        assert!(Action::from_str("accept").is_err());
    }

    #[test]
    fn test_display_helpers() {
        let rule = Rule {
            position: 3,
            spec: RuleSpec {
                action: Action::Deny,
                direction: Direction::Out,
                protocol: Protocol::Tcp,
                port: "443".into(),
                endpoint: "any".into(),
            },
            v6: true,
            comment: None,
        };
        assert_eq!(rule.port_display(), "443/tcp");
        assert_eq!(rule.action_display(), "DENY OUT");
        assert_eq!(rule.endpoint_display(), "Anywhere (v6)");
    }
}
