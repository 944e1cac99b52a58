//! Input validation and sanitization functions for ufwm
//!
//! Everything typed into the rule form passes through here before it is
//! serialized into ufw arguments or written to the annotation tables.

use crate::core::rule::{ANY, Protocol};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Maximum lengths of the form fields.
pub const MAX_PORT_LEN: usize = 11;
pub const MAX_ENDPOINT_LEN: usize = 43;
pub const MAX_SERVICE_LEN: usize = 18;
pub const MAX_NOTE_LEN: usize = 43;

/// Returns true for a strict IP literal or CIDR network.
///
/// `ipnetwork` alone accepts truncated IPv4 forms such as `80` (= 80.0.0.0),
/// which would swallow port numbers, so the address part is checked with the
/// standard library parser first.
pub fn is_ip_or_network(token: &str) -> bool {
    let address = token.split_once('/').map_or(token, |(addr, _)| addr);
    address.parse::<IpAddr>().is_ok() && token.parse::<IpNetwork>().is_ok()
}

/// Validates a single port number.
///
/// # Errors
///
/// Returns `Err` if port is 0 (reserved).
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a port range.
///
/// # Errors
///
/// Returns `Err` if:
/// - Either port is 0
/// - Start port is greater than end port
pub fn validate_port_range(start: u16, end: u16) -> Result<(u16, u16), String> {
    validate_port(start)?;
    validate_port(end)?;

    if start > end {
        Err("Start port must be less than or equal to end port".to_string())
    } else {
        Ok((start, end))
    }
}

/// Validates the port field of the rule form.
///
/// Accepts a single port (`22`) or a range (`6000:6007`). ufw only accepts
/// ranges together with an explicit tcp/udp protocol.
///
/// # Errors
///
/// Returns a user-facing message describing the problem.
pub fn validate_port_field(input: &str, protocol: Protocol) -> Result<String, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Port is required".to_string());
    }

    let parse = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| "Port must be a number between 1 and 65535".to_string())
    };

    match input.split_once(':') {
        Some((start, end)) => {
            if protocol == Protocol::Any {
                return Err("Port ranges require tcp or udp".to_string());
            }
            let (start, end) = validate_port_range(parse(start)?, parse(end)?)?;
            Ok(format!("{start}:{end}"))
        }
        None => Ok(validate_port(parse(input)?)?.to_string()),
    }
}

/// Validates the endpoint field: `any`, an IP address, or a CIDR network.
///
/// # Errors
///
/// Returns a user-facing message if the endpoint is neither.
pub fn validate_endpoint(input: &str) -> Result<String, String> {
    let input = input.trim();
    if input.is_empty() || input.eq_ignore_ascii_case(ANY) {
        return Ok(ANY.to_string());
    }
    if input.len() > MAX_ENDPOINT_LEN {
        return Err("Address too long".to_string());
    }
    if is_ip_or_network(input) {
        Ok(input.to_string())
    } else {
        Err("Use 'any', an IP address, or a network like 10.0.0.0/8".to_string())
    }
}

/// Sanitizes annotation text (service label or note) for the flat tables.
///
/// Control characters become spaces, surrounding whitespace is trimmed and
/// the result is truncated to `max_chars`. A value that passed through this
/// function round-trips through the annotation tables exactly.
///
/// # Examples
///
/// ```
/// use ufwm::validators::sanitize_annotation;
///
/// assert_eq!(sanitize_annotation("  ssh\n", 18), "ssh");
/// assert_eq!(sanitize_annotation("a\tb", 18), "a b");
/// ```
pub fn sanitize_annotation(input: &str, max_chars: usize) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let truncated: String = replaced.trim().chars().take(max_chars).collect();
    truncated.trim_end().to_string()
}
