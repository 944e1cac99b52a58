use thiserror::Error;

/// Core error types for ufwm
#[derive(Debug, Error)]
pub enum Error {
    /// The ufw binary (or the elevation helper) could not be started
    #[error("ufw is not available: {0}")]
    ToolUnavailable(String),

    /// ufw ran but exited non-zero
    #[error("ufw error (exit code {exit_code:?}): {message}")]
    Tool {
        exit_code: Option<i32>,
        message: String,
    },

    /// ufw reported numbered rules but none of them could be decoded
    #[error("Could not parse ufw output: {line}")]
    Parse { line: String },

    /// ufw refused to run because it lacked privileges
    #[error("Requires elevated privileges: {0}")]
    Permission(String),

    /// No usable elevation helper (sudo/run0/pkexec) was found
    #[error("Privilege elevation failed: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// Annotation tables could not be written
    #[error("Annotation not saved: {0}")]
    Persistence(String),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Builds the error for a ufw invocation that exited non-zero.
    ///
    /// Privilege failures are reported by ufw itself ("You need to be root")
    /// or by the elevation helper (`sudo -n`), both on stderr.
    pub fn from_tool_failure(exit_code: Option<i32>, stderr: &str) -> Self {
        let message = stderr.trim().to_string();
        if is_permission_message(&message) {
            Error::Permission(message)
        } else {
            Error::Tool { exit_code, message }
        }
    }

    /// One-line message suitable for the status bar.
    pub fn user_message(&self) -> String {
        match self {
            Error::ToolUnavailable(_) => "ufw not found - mutations disabled".to_string(),
            Error::Permission(_) => "Operation requires elevated privileges".to_string(),
            Error::Elevation(e) => format!("Privilege elevation failed: {e}"),
            Error::Tool { message, .. } => UfwErrorPattern::match_error(message).user_message,
            Error::Parse { .. } => "Could not read ufw rule list".to_string(),
            Error::Persistence(msg) => format!("Rule applied, but annotation was not saved: {msg}"),
            Error::Validation { field, message } => format!("{field}: {message}"),
            Error::Io(e) => format!("I/O error: {e}"),
            Error::Serialization(e) => format!("JSON error: {e}"),
        }
    }

    /// Full translation with suggestions (printed by the CLI).
    pub fn translate(&self) -> ErrorTranslation {
        match self {
            Error::Tool { message, .. } => UfwErrorPattern::match_error(message),
            Error::Permission(msg) => UfwErrorPattern::match_error(msg),
            Error::ToolUnavailable(msg) => UfwErrorPattern::match_error(&format!(
                "command not found: {msg}"
            )),
            other => ErrorTranslation::new(other.user_message()),
        }
    }
}

fn is_permission_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("need to be root")
        || lower.contains("permission denied")
        || lower.contains("operation not permitted")
        || lower.contains("a password is required")
        || lower.contains("not in the sudoers")
        || lower.contains("not authorized")
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Database of ufw/sudo error patterns and their translations
pub struct UfwErrorPattern;

impl UfwErrorPattern {
    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("a password is required") {
            return ErrorTranslation::new("Operation requires elevated privileges")
                .with_suggestion("Run `sudo -v` before starting ufwm to cache credentials")
                .with_suggestion("Or start ufwm as root");
        }

        if is_permission_message(msg) {
            return ErrorTranslation::new("Operation requires elevated privileges")
                .with_suggestion("Start ufwm with sudo, or set UFWM_ELEVATION_METHOD")
                .with_suggestion("Check that your user may run ufw via sudo");
        }

        if lower.contains("no such file") || lower.contains("command not found") {
            return ErrorTranslation::new("ufw is not installed or not found in PATH")
                .with_suggestion("Install ufw: sudo apt install ufw  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install ufw  (Fedora)")
                .with_suggestion("Or: sudo pacman -S ufw  (Arch)")
                .with_suggestion("Or point `ufw_command` in config.json at the binary");
        }

        if lower.contains("invalid position") {
            return ErrorTranslation::new("Rule position no longer exists")
                .with_suggestion("The rule list changed underneath; press R to reload");
        }

        if lower.contains("could not find a profile") || lower.contains("wrong number of arguments")
        {
            return ErrorTranslation::new("ufw rejected the rule syntax")
                .with_suggestion("Check the port and endpoint fields");
        }

        if lower.contains("bad port") || lower.contains("invalid port") {
            return ErrorTranslation::new("Invalid port")
                .with_suggestion("Port numbers must be between 1 and 65535")
                .with_suggestion("Port ranges need a protocol (tcp or udp)");
        }

        if lower.contains("bad source address")
            || lower.contains("bad destination address")
            || lower.contains("invalid address")
        {
            return ErrorTranslation::new("Invalid IP address or network")
                .with_suggestion("Use proper IP format: 192.168.1.1 or 192.168.1.0/24")
                .with_suggestion("For IPv6: 2001:db8::1 or 2001:db8::/32");
        }

        if lower.contains("couldn't get lock") || lower.contains("resource busy") {
            return ErrorTranslation::new("ufw is busy")
                .with_suggestion("Another process may be modifying the firewall")
                .with_suggestion("Wait a moment and try again");
        }

        if lower.contains("skipping") && lower.contains("existing") {
            return ErrorTranslation::new("Rule already exists");
        }

        ErrorTranslation::new(format!("Firewall error: {}", first_line(msg)))
            .with_suggestion("Verify ufw is working: sudo ufw status numbered")
    }
}

fn first_line(msg: &str) -> &str {
    msg.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_message_is_permission_error() {
        let err = Error::from_tool_failure(Some(1), "ERROR: You need to be root to run this script\n");
        assert!(matches!(err, Error::Permission(_)));
        assert_eq!(err.user_message(), "Operation requires elevated privileges");
    }

    #[test]
    fn test_sudo_noninteractive_is_permission_error() {
        let err = Error::from_tool_failure(Some(1), "sudo: a password is required");
        assert!(matches!(err, Error::Permission(_)));
        assert!(err.translate().suggestions.iter().any(|s| s.contains("sudo -v")));
    }

    #[test]
    fn test_other_failure_is_tool_error() {
        let err = Error::from_tool_failure(Some(1), "ERROR: Invalid position '9'\n");
        match &err {
            Error::Tool { exit_code, message } => {
                assert_eq!(*exit_code, Some(1));
                assert_eq!(message, "ERROR: Invalid position '9'");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.user_message().contains("no longer exists"));
    }

    #[test]
    fn test_missing_tool_translation() {
        let translation = UfwErrorPattern::match_error("command not found: ufw");
        assert!(translation.user_message.contains("not installed"));
        assert!(translation.suggestions.len() >= 3);
    }

    #[test]
    fn test_bad_port_translation() {
        let translation = UfwErrorPattern::match_error("ERROR: Bad port '70000'");
        assert!(translation.suggestions.iter().any(|s| s.contains("65535")));
    }

    #[test]
    fn test_generic_fallback_uses_first_line() {
        let translation = UfwErrorPattern::match_error("\nsomething odd\nmore detail");
        assert_eq!(translation.user_message, "Firewall error: something odd");
    }

    #[test]
    fn test_persistence_message_mentions_rule_applied() {
        let err = Error::Persistence("disk full".into());
        assert!(err.user_message().starts_with("Rule applied"));
    }
}
