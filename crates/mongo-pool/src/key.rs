//! Endpoint identity.
//!
//! Every distinct `(host, port, database, username, password)` tuple gets its
//! own pool. Credentials are part of the identity: a connection authenticated
//! for one user cannot serve another.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Default MongoDB port.
pub const DEFAULT_PORT: u16 = 27017;

/// A logical connection target.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database to authenticate against.
    pub database: Option<String>,
    /// User name, if the server requires authentication.
    pub username: Option<String>,
    /// Password for `username`.
    pub password: Option<String>,
}

impl Endpoint {
    /// Create an endpoint without credentials.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: None,
            username: None,
            password: None,
        }
    }

    /// Set the database.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the credentials used for the authentication handshake.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Whether a dial to this endpoint must authenticate.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
    }

    /// The `host:port` address to dial.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Derive the pool identity for this endpoint.
    #[must_use]
    pub fn key(&self) -> ConnectionKey {
        ConnectionKey::from_endpoint(self)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose the password in debug output
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Pool identity of an [`Endpoint`].
///
/// Renders as `host:port.database.username.password`, with missing
/// components as empty strings. Equality and hashing use the components
/// themselves, so endpoints whose joined strings collide (`.` inside a
/// database or user name) still get separate monitors.
/// [`Display`](fmt::Display) prints a redacted form suitable for logs;
/// [`as_str`](Self::as_str) returns the full identity.
#[derive(Clone)]
pub struct ConnectionKey {
    parts: Arc<KeyParts>,
    id: Arc<str>,
    redacted: Arc<str>,
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct KeyParts {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
}

impl ConnectionKey {
    /// Build the key for an endpoint.
    #[must_use]
    pub fn from_endpoint(endpoint: &Endpoint) -> Self {
        let parts = KeyParts {
            host: endpoint.host.clone(),
            port: endpoint.port,
            database: endpoint.database.clone().unwrap_or_default(),
            username: endpoint.username.clone().unwrap_or_default(),
            password: endpoint.password.clone().unwrap_or_default(),
        };
        let prefix = format!(
            "{}:{}.{}.{}",
            parts.host, parts.port, parts.database, parts.username
        );
        let redacted = if parts.password.is_empty() {
            format!("{prefix}.")
        } else {
            format!("{prefix}.***")
        };

        Self {
            id: Arc::from(format!("{prefix}.{}", parts.password)),
            redacted: Arc::from(redacted),
            parts: Arc::new(parts),
        }
    }

    /// The full identity string, credentials included.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The identity with the password masked.
    #[must_use]
    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl PartialEq for ConnectionKey {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for ConnectionKey {}

impl Hash for ConnectionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl PartialOrd for ConnectionKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ConnectionKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Identity string first so snapshots list keys as they print
        self.id.cmp(&other.id).then_with(|| self.parts.cmp(&other.parts))
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionKey").field(&&*self.redacted).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let endpoint = Endpoint::new("db.example.com", 27017)
            .database("admin")
            .credentials("alice", "s3cret");

        assert_eq!(endpoint.key().as_str(), "db.example.com:27017.admin.alice.s3cret");
    }

    #[test]
    fn test_key_missing_components() {
        let endpoint = Endpoint::new("localhost", DEFAULT_PORT);
        assert_eq!(endpoint.key().as_str(), "localhost:27017...");
        assert_eq!(endpoint.key().redacted(), "localhost:27017...");
    }

    #[test]
    fn test_dotted_components_do_not_collide() {
        let a = Endpoint::new("h", 1).database("a.b").credentials("c", "p");
        let b = Endpoint::new("h", 1).database("a").credentials("b.c", "p");
        assert_eq!(a.key().as_str(), b.key().as_str());
        assert_ne!(a.key(), b.key());

        let mut set = std::collections::HashSet::new();
        set.insert(a.key());
        set.insert(b.key());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_absent_and_empty_components_match() {
        let a = Endpoint::new("h", 1);
        let b = Endpoint::new("h", 1).database("");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_identical_endpoints_share_key() {
        let a = Endpoint::new("h", 1).database("d").credentials("u", "p");
        let b = Endpoint::new("h", 1).database("d").credentials("u", "p");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_credentials_are_part_of_identity() {
        let a = Endpoint::new("h", 1).credentials("alice", "p");
        let b = Endpoint::new("h", 1).credentials("bob", "p");
        let c = Endpoint::new("h", 1).credentials("alice", "q");
        assert_ne!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_key_display_is_redacted() {
        let key = Endpoint::new("h", 1).database("d").credentials("u", "hunter2").key();
        assert_eq!(key.to_string(), "h:1.d.u.***");
        assert!(!format!("{key:?}").contains("hunter2"));
    }

    #[test]
    fn test_endpoint_debug_redacts_password() {
        let endpoint = Endpoint::new("h", 1).credentials("u", "hunter2");
        let debug = format!("{endpoint:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_has_credentials() {
        assert!(!Endpoint::new("h", 1).has_credentials());
        assert!(Endpoint::new("h", 1).credentials("u", "p").has_credentials());
        assert_eq!(Endpoint::new("h", 1).address(), "h:1");
    }
}
