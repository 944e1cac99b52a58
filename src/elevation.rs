//! Privilege elevation for ufw invocations
//!
//! ufwm runs as an unprivileged user and elevates only the `ufw` process
//! itself. Annotation tables stay in the invoking user's home directory.
//!
//! # Elevation Strategy
//!
//! - **Root**: run `ufw` directly
//! - **Preferred**: `sudo -n`, after credentials were primed with `sudo -v`
//!   before the terminal switched to raw mode
//! - **Fallbacks**: `run0`, then `pkexec` (both authenticate through polkit)
//!
//! The TUI owns the terminal while ufw runs, so the elevated process must
//! never prompt on the tty. That is why sudo runs with `-n` and stdin is
//! always closed.
//!
//! # Environment Variables
//!
//! - `UFWM_ELEVATION_METHOD`: Force a specific method (`sudo`, `run0`, or `pkexec`).
//! - `UFWM_TEST_NO_ELEVATION`: Bypass elevation entirely (for testing only).
//!
//! # Example
//!
//! ```no_run
//! use ufwm::elevation::create_elevated_ufw_command;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let args = vec!["status".to_string(), "numbered".to_string()];
//! let mut cmd = create_elevated_ufw_command("ufw", &args)?;
//! let output = cmd.output().await?;
//! # Ok(())
//! # }
//! ```

use std::io;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// No elevation helper found in PATH
    #[error("no elevation helper found - install sudo, or run ufwm as root")]
    NoHelper,

    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `UFWM_ELEVATION_METHOD`
    #[error("Invalid UFWM_ELEVATION_METHOD '{0}'. Valid options: sudo, run0, pkexec")]
    InvalidMethod(String),

    /// `sudo -v` was cancelled or rejected
    #[error("sudo authentication failed")]
    AuthenticationFailed,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// How ufw gets its privileges
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ElevationMethod {
    #[strum(serialize = "direct")]
    Direct,
    #[strum(serialize = "sudo")]
    Sudo,
    #[strum(serialize = "run0")]
    Run0,
    #[strum(serialize = "pkexec")]
    Pkexec,
}

/// Checks if a binary exists in PATH
fn binary_exists(name: &str) -> bool {
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths).find_map(|dir| {
                let full_path = dir.join(name);
                if full_path.is_file() {
                    Some(full_path)
                } else {
                    None
                }
            })
        })
        .is_some()
}

/// Picks the elevation method for this process.
///
/// # Errors
///
/// Returns `Err` if the forced method is unknown or missing, or if no
/// helper exists at all.
pub fn resolve_method() -> Result<ElevationMethod, ElevationError> {
    // 1. Strict Test Mode Override (Highest Priority)
    if std::env::var("UFWM_TEST_NO_ELEVATION").is_ok() {
        return Ok(ElevationMethod::Direct);
    }

    // 2. Direct Root Execution (No prompt needed)
    if nix::unistd::getuid().is_root() {
        return Ok(ElevationMethod::Direct);
    }

    // 3. Explicit elevation method override
    if let Ok(method) = std::env::var("UFWM_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            let (resolved, binary) = match method.as_str() {
                "sudo" => (ElevationMethod::Sudo, "sudo"),
                "run0" => (ElevationMethod::Run0, "run0"),
                "pkexec" => (ElevationMethod::Pkexec, "pkexec"),
                _ => return Err(ElevationError::InvalidMethod(method)),
            };
            if !binary_exists(binary) {
                return Err(ElevationError::MethodNotAvailable(binary.into()));
            }
            return Ok(resolved);
        }
    }

    // 4. Automatic detection
    if binary_exists("sudo") {
        Ok(ElevationMethod::Sudo)
    } else if binary_exists("run0") {
        Ok(ElevationMethod::Run0)
    } else if binary_exists("pkexec") {
        Ok(ElevationMethod::Pkexec)
    } else {
        Err(ElevationError::NoHelper)
    }
}

fn build_elevated_command(
    method: ElevationMethod,
    program: &str,
    args: &[String],
) -> Command {
    let mut cmd = match method {
        ElevationMethod::Direct => Command::new(program),
        ElevationMethod::Sudo => {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(program);
            cmd
        }
        ElevationMethod::Run0 => {
            let mut cmd = Command::new("run0");
            cmd.arg(program);
            cmd
        }
        ElevationMethod::Pkexec => {
            let mut cmd = Command::new("pkexec");
            cmd.arg(program);
            cmd
        }
    };
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Creates an elevated `ufw` command with the specified arguments
///
/// Arguments are passed directly without shell interpretation.
///
/// # Testing
///
/// Set `UFWM_TEST_NO_ELEVATION=1` to run `program` directly.
pub fn create_elevated_ufw_command(
    program: &str,
    args: &[String],
) -> Result<Command, ElevationError> {
    let method = resolve_method()?;
    debug!("Running {program} {} via {method}", args.join(" "));
    Ok(build_elevated_command(method, program, args))
}

/// Caches sudo credentials while the terminal is still in cooked mode.
///
/// A no-op for every method other than sudo.
pub async fn prime_credentials() -> Result<ElevationMethod, ElevationError> {
    let method = resolve_method()?;
    if method != ElevationMethod::Sudo {
        return Ok(method);
    }

    // Already cached: nothing to prompt for
    let cached = Command::new("sudo")
        .args(["-n", "-v"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    if cached.success() {
        return Ok(method);
    }

    info!("Priming sudo credentials");
    let status = Command::new("sudo").arg("-v").status().await?;
    if status.success() {
        Ok(method)
    } else {
        Err(ElevationError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_helpers::ENV_VAR_MUTEX;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_binary_exists() {
        assert!(binary_exists("sh"));
        assert!(!binary_exists("ufwm_nonexistent_binary_xyz"));
    }

    #[test]
    fn test_direct_command_has_no_wrapper() {
        let cmd = build_elevated_command(ElevationMethod::Direct, "ufw", &args(&["reload"]));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "ufw");
        assert_eq!(std_cmd.get_args().collect::<Vec<_>>(), ["reload"]);
    }

    #[test]
    fn test_sudo_command_is_non_interactive() {
        let cmd = build_elevated_command(
            ElevationMethod::Sudo,
            "ufw",
            &args(&["--force", "delete", "3"]),
        );
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "sudo");
        assert_eq!(
            std_cmd.get_args().collect::<Vec<_>>(),
            ["-n", "ufw", "--force", "delete", "3"]
        );
    }

    #[test]
    fn test_test_mode_is_direct() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        unsafe {
            std::env::set_var("UFWM_TEST_NO_ELEVATION", "1");
        }
        assert_eq!(resolve_method().unwrap(), ElevationMethod::Direct);
    }

    #[test]
    fn test_invalid_elevation_method() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();
        if nix::unistd::getuid().is_root() {
            return;
        }

        unsafe {
            std::env::remove_var("UFWM_TEST_NO_ELEVATION");
            std::env::set_var("UFWM_ELEVATION_METHOD", "invalid_method");
        }

        let result = resolve_method();

        unsafe {
            std::env::set_var("UFWM_TEST_NO_ELEVATION", "1");
            std::env::remove_var("UFWM_ELEVATION_METHOD");
        }

        assert!(matches!(result, Err(ElevationError::InvalidMethod(_))));
    }

    #[test]
    fn test_elevation_method_case_insensitive() {
        let _guard = ENV_VAR_MUTEX.lock().unwrap();

        unsafe {
            std::env::remove_var("UFWM_TEST_NO_ELEVATION");
            std::env::set_var("UFWM_ELEVATION_METHOD", "SUDO");
        }

        let result = resolve_method();

        unsafe {
            std::env::set_var("UFWM_TEST_NO_ELEVATION", "1");
            std::env::remove_var("UFWM_ELEVATION_METHOD");
        }

        // Succeeds or reports sudo missing, but never rejects the spelling
        assert!(!matches!(result, Err(ElevationError::InvalidMethod(_))));
    }
}
