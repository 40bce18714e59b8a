use serde::{Deserialize, Serialize};

/// Who is using the tracker, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
}

pub trait IdentityProvider {
    /// The signed-in identity, or `None` for an anonymous session.
    fn current(&self) -> Option<Identity>;
}

/// Identity taken from configuration (config file or `JOBTRACK_USER_*`).
#[derive(Debug, Clone, Default)]
pub struct ConfiguredIdentity {
    identity: Option<Identity>,
}

impl ConfiguredIdentity {
    pub fn new(identity: Option<Identity>) -> Self {
        // A blank user id is treated as signed out
        let identity = identity.filter(|i| !i.user_id.trim().is_empty());
        Self { identity }
    }
}

impl IdentityProvider for ConfiguredIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity.clone()
    }
}
