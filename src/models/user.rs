use crate::stores::collection::Record;
use serde::{Deserialize, Serialize};

/// A public key granted to a user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshKey {
    /// Comment trailing the key material (usually `user@host`)
    pub comment: String,
    /// `SHA256:` fingerprint of the key blob
    pub fingerprint: String,
    /// The full OpenSSH public key line
    pub public_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct User {
    /// User ID
    pub id: u32,
    /// System admins are granted on every newly registered server
    pub is_system_admin: bool,
    /// Inactive users never receive key material
    pub is_active: bool,
    /// Display name, also used as the key entry name on servers
    pub name: String,
    pub ssh_keys: Vec<SshKey>,
}

impl User {
    pub fn new(id: u32, name: impl Into<String>, is_system_admin: bool, is_active: bool) -> Self {
        Self {
            id,
            is_system_admin,
            is_active,
            name: name.into(),
            ssh_keys: Vec::new(),
        }
    }

    pub fn public_keys(&self) -> Vec<String> {
        self.ssh_keys.iter().map(|key| key.public_key.clone()).collect()
    }

    pub fn has_fingerprint(&self, fingerprint: &str) -> bool {
        self.ssh_keys.iter().any(|key| key.fingerprint == fingerprint)
    }
}

impl Record for User {
    const KIND: &'static str = "user";

    fn id(&self) -> u32 {
        self.id
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("user {} has an empty name", self.id));
        }
        Ok(())
    }
}

/// Partial update for a user; absent fields are left untouched
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserPatch {
    pub is_system_admin: Option<bool>,
    pub is_active: Option<bool>,
    pub name: Option<String>,
    pub ssh_keys: Option<Vec<SshKey>>,
}

impl UserPatch {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.is_system_admin.is_none()
            && self.is_active.is_none()
            && self.name.is_none()
            && self.ssh_keys.is_none()
    }

    pub fn apply(self, user: &mut User) {
        if let Some(is_system_admin) = self.is_system_admin {
            user.is_system_admin = is_system_admin;
        }
        if let Some(is_active) = self.is_active {
            user.is_active = is_active;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(ssh_keys) = self.ssh_keys {
            user.ssh_keys = ssh_keys;
        }
    }
}
