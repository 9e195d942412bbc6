//! MongoDB container support via testcontainers.

use testcontainers::Image;
use testcontainers::core::{ContainerPort, WaitFor};

/// Port MongoDB listens on inside the container.
pub const MONGO_PORT: u16 = 27017;

/// MongoDB container image.
///
/// Uses the official `mongo` image. Authentication is enabled only when a
/// root username is set.
#[derive(Debug, Clone)]
pub struct MongoContainer {
    /// Container tag (version).
    pub tag: String,
    /// Root username, if authentication should be enabled.
    pub root_username: Option<String>,
    /// Root password.
    pub root_password: String,
}

impl Default for MongoContainer {
    fn default() -> Self {
        Self {
            tag: "7.0".to_string(),
            root_username: None,
            root_password: "Password123".to_string(),
        }
    }
}

impl MongoContainer {
    /// Create a new MongoDB container configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the container tag (MongoDB version).
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Enable authentication with the given root user.
    #[must_use]
    pub fn with_root_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.root_username = Some(username.into());
        self.root_password = password.into();
        self
    }
}

impl Image for MongoContainer {
    fn name(&self) -> &str {
        "mongo"
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn ready_conditions(&self) -> Vec<WaitFor> {
        vec![WaitFor::message_on_stdout("Waiting for connections")]
    }

    fn env_vars(
        &self,
    ) -> impl IntoIterator<
        Item = (
            impl Into<std::borrow::Cow<'_, str>>,
            impl Into<std::borrow::Cow<'_, str>>,
        ),
    > {
        match &self.root_username {
            Some(username) => vec![
                ("MONGO_INITDB_ROOT_USERNAME", username.as_str()),
                ("MONGO_INITDB_ROOT_PASSWORD", self.root_password.as_str()),
            ],
            None => Vec::new(),
        }
    }

    fn expose_ports(&self) -> &[ContainerPort] {
        &[ContainerPort::Tcp(MONGO_PORT)]
    }
}
