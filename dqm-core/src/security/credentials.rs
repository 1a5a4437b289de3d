//! Secure credential container with automatic memory zeroing.
//!
//! # Security
//! - Credentials are stored in `Zeroizing<T>` containers
//! - Memory is cleared when credentials go out of scope
//! - Passwords never appear in debug output or logs

use zeroize::{Zeroize, Zeroizing};

/// Database username and optional password, zeroed on drop.
///
/// # Example
///
/// ```rust
/// use dqm_core::security::Credentials;
///
/// let creds = Credentials::new("analyst".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "analyst");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Credentials with no username and no password (SQLite files).
    pub fn anonymous() -> Self {
        Self::new(String::new(), None)
    }

    /// Gets the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks if a password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Exposes the password for building a connection URL.
    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = Credentials::new("testuser".to_string(), Some("testpass".to_string()));
        assert_eq!(creds.username(), "testuser");
        assert!(creds.has_password());
        assert_eq!(creds.password(), Some("testpass"));
    }

    #[test]
    fn test_credentials_no_password() {
        let creds = Credentials::new("testuser".to_string(), None);
        assert!(!creds.has_password());
        assert_eq!(creds.password(), None);
    }

    #[test]
    fn test_debug_masks_password() {
        let creds = Credentials::new("dq".to_string(), Some("p@ssw0rd!".to_string()));
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("p@ssw0rd!"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_anonymous() {
        let creds = Credentials::anonymous();
        assert_eq!(creds.username(), "");
        assert!(!creds.has_password());
    }
}
