//! Identity of the operator running the converter.
//!
//! Every audit record and directory usage entry is tagged with the operating
//! system user name and the machine name. Both are resolved once per process.

use std::fmt;
use std::process::Command;
use std::sync::OnceLock;

/// Placeholder used when a user or host name cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// User and host pair identifying who performed an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Actor {
    pub user: String,
    pub host: String,
}

impl Actor {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// Identity of the current process, resolved on first use.
    pub fn current() -> &'static Actor {
        static CURRENT: OnceLock<Actor> = OnceLock::new();
        CURRENT.get_or_init(|| {
            let actor = Actor::new(
                detect_user().unwrap_or_else(|| UNKNOWN.to_string()),
                detect_hostname().unwrap_or_else(|| UNKNOWN.to_string()),
            );
            tracing::info!("User: {}, PC: {}", actor.user, actor.host);
            actor
        })
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user, self.host)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn detect_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .find_map(non_empty_env)
}

fn detect_hostname() -> Option<String> {
    if let Some(host) = ["HOSTNAME", "COMPUTERNAME"].into_iter().find_map(non_empty_env) {
        return Some(host);
    }

    let output = Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())?;

    let hostname = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_is_stable() {
        let first = Actor::current();
        let second = Actor::current();
        assert!(std::ptr::eq(first, second));
        assert!(!first.user.is_empty());
        assert!(!first.host.is_empty());
    }

    #[test]
    fn test_display() {
        let actor = Actor::new("anna", "ws-01");
        assert_eq!(actor.to_string(), "anna (ws-01)");
    }
}
