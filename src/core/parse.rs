//! Parser for `ufw status numbered` output
//!
//! The listing looks like:
//!
//! ```text
//! Status: active
//!
//!      To                         Action      From
//!      --                         ------      ----
//! [ 1] 22/tcp                     ALLOW IN    Anywhere
//! [ 2] 10.0.0.5 443/tcp           ALLOW OUT   Anywhere (out)
//! [ 3] 22/tcp (v6)                LIMIT IN    Anywhere (v6)              # ssh
//! ```
//!
//! Column widths vary with content, so rows are tokenized on whitespace and
//! split around the action keyword. Header, separator and blank lines are
//! ignored. A numbered row that cannot be decoded is skipped with a warning;
//! only when every numbered row fails does parsing return [`Error::Parse`].

use crate::core::error::{Error, Result};
use crate::core::rule::{ANY, Action, Direction, FirewallStatus, Protocol, Rule, RuleSpec};
use crate::core::source::Listing;
use crate::validators::is_ip_or_network;
use std::str::FromStr;
use tracing::{debug, warn};

/// Parses the full output of `ufw status numbered`.
pub fn parse_status(output: &str) -> Result<Listing> {
    let mut status = FirewallStatus::Unknown;
    let mut rules = Vec::new();
    let mut reported = 0u32;
    let mut first_rejected: Option<&str> = None;

    for raw in output.lines() {
        let line = raw.trim();

        if let Some(value) = line.strip_prefix("Status:") {
            status = match value.trim().to_lowercase().as_str() {
                "active" => FirewallStatus::Active,
                "inactive" => FirewallStatus::Inactive,
                _ => FirewallStatus::Unknown,
            };
            continue;
        }

        let Some((position, body)) = split_numbered(line) else {
            continue;
        };
        reported = reported.max(position);

        match parse_rule_body(position, body) {
            Some(rule) => rules.push(rule),
            None => {
                warn!("Skipping undecodable ufw rule line: {line}");
                first_rejected.get_or_insert(line);
            }
        }
    }

    if rules.is_empty()
        && let Some(line) = first_rejected
    {
        return Err(Error::Parse {
            line: line.to_string(),
        });
    }

    debug!("Parsed {} of {reported} ufw rules", rules.len());
    Ok(Listing {
        status,
        rules,
        reported,
    })
}

/// Splits `[ 12] rest` into `(12, "rest")`.
fn split_numbered(line: &str) -> Option<(u32, &str)> {
    let inner = line.strip_prefix('[')?;
    let (number, rest) = inner.split_once(']')?;
    let position = number.trim().parse::<u32>().ok().filter(|p| *p >= 1)?;
    Some((position, rest.trim()))
}

#[derive(Debug, Default)]
struct Side {
    address: Option<String>,
    port: Option<String>,
    protocol: Option<Protocol>,
}

fn parse_rule_body(position: u32, body: &str) -> Option<Rule> {
    let (body, comment) = match body.split_once('#') {
        Some((head, tail)) => {
            let comment = tail.trim();
            (head, (!comment.is_empty()).then(|| comment.to_string()))
        }
        None => (body, None),
    };

    let tokens: Vec<&str> = body.split_whitespace().collect();
    let action_idx = tokens.iter().position(|t| is_action_token(t))?;
    let action = Action::from_str(tokens[action_idx]).ok()?;

    let mut from_start = action_idx + 1;
    let direction = match tokens.get(from_start) {
        Some(t) if t.eq_ignore_ascii_case("fwd") => {
            debug!("Ignoring routed rule at position {position}");
            return None;
        }
        Some(t) => match Direction::from_str(t) {
            Ok(direction) => {
                from_start += 1;
                direction
            }
            Err(_) => Direction::In,
        },
        None => return None,
    };

    let to_tokens = &tokens[..action_idx];
    let from_tokens = &tokens[from_start..];
    if to_tokens.is_empty() || from_tokens.is_empty() {
        return None;
    }

    let v6 = tokens.contains(&"(v6)");
    let to = parse_side(to_tokens)?;
    let from = parse_side(from_tokens)?;

    let endpoint = match direction {
        Direction::In => from.address,
        Direction::Out => to.address,
    }
    .unwrap_or_else(|| ANY.to_string());

    let port = to
        .port
        .or(from.port)
        .unwrap_or_else(|| ANY.to_string());
    let protocol = to.protocol.or(from.protocol).unwrap_or(Protocol::Any);

    Some(Rule {
        position,
        spec: RuleSpec {
            action,
            direction,
            protocol,
            port,
            endpoint,
        },
        v6,
        comment,
    })
}

fn is_action_token(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_uppercase()) && Action::from_str(token).is_ok()
}

/// Decodes one column (`To` or `From`) into address / port / protocol.
fn parse_side(tokens: &[&str]) -> Option<Side> {
    let mut side = Side::default();
    let mut iter = tokens.iter();

    while let Some(&token) = iter.next() {
        match token {
            "(v6)" | "(out)" => {}
            // Interface qualifier: "on eth0"
            "on" => {
                iter.next()?;
            }
            "Anywhere" => side.address = Some(ANY.to_string()),
            _ if is_ip_or_network(token) => side.address = Some(token.to_string()),
            _ => {
                let (port, protocol) = split_port_token(token)?;
                if let Some(port) = port {
                    if side.port.is_some() {
                        return None;
                    }
                    side.port = Some(port);
                }
                if protocol.is_some() {
                    side.protocol = protocol;
                }
            }
        }
    }

    Some(side)
}

/// Splits `22/tcp`, `Anywhere/udp`, `8000:8100/tcp` or `80`.
fn split_port_token(token: &str) -> Option<(Option<String>, Option<Protocol>)> {
    let (head, protocol) = match token.split_once('/') {
        Some((head, tail)) => {
            let protocol = Protocol::from_str(tail).ok().filter(|p| *p != Protocol::Any)?;
            (head, Some(protocol))
        }
        None => (token, None),
    };

    if head.is_empty() {
        return None;
    }
    if head == "Anywhere" {
        return Some((None, protocol));
    }
    Some((Some(head.to_string()), protocol))
}
