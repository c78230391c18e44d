use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secure wrapper for sensitive string data that automatically zeroes memory on drop.
///
/// Passwords are kept in this wrapper for the whole lifetime of the session,
/// so they never leak through `Debug` or `Display` output, and therefore never
/// reach the logs.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Creates a new secure string from the provided value.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns a reference to the inner string value.
    ///
    /// # Security Note
    /// The returned reference should not be stored for extended periods
    /// to minimize exposure time of sensitive data.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the secret is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// NTLM security attached to a SOAP client or a descriptor download.
///
/// Carries the credentials used for the NTLM challenge/response handshake and
/// the TLS-verification bypass flag of the session.
#[derive(Clone, PartialEq, Eq)]
pub struct NtlmSecurity {
    username: String,
    password: SecureString,
    ignore_ssl: bool,
}

impl NtlmSecurity {
    /// Creates the NTLM security from the session credentials.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<SecureString>,
        ignore_ssl: bool,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ignore_ssl,
        }
    }

    /// The username, possibly qualified as `DOMAIN\user` or `user@domain`.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password.
    pub fn password(&self) -> &SecureString {
        &self.password
    }

    /// Whether TLS certificate verification is disabled.
    pub fn ignore_ssl(&self) -> bool {
        self.ignore_ssl
    }
}

impl fmt::Debug for NtlmSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NtlmSecurity")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ignore_ssl", &self.ignore_ssl)
            .finish()
    }
}

impl fmt::Display for NtlmSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NTLM (username: {})", self.username)
    }
}
