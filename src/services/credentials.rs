use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::permissions::Role;

/// An authenticated account as the credential backend reports it.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub role: Role,
}

/// Credential verification seam. The real user database lives outside this
/// gateway; it is consumed through this single call.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verify username/password, returning the account on success.
    async fn authenticate(&self, username: &str, password: &str) -> Option<UserRecord>;
}

/// In-memory credential table with SHA-256 password digests. Used for
/// development and tests; production wires a real backend behind the trait.
pub struct StaticCredentials {
    users: HashMap<String, (String, UserRecord)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self { users: HashMap::new() }
    }

    /// Development accounts, one per role.
    pub fn seeded() -> Self {
        let mut creds = Self::new();
        creds.add("admin", "admin", Role::Admin);
        creds.add("morgan", "manager-pass", Role::Manager);
        creds.add("alice", "user-pass", Role::User);
        creds.add("visitor", "guest-pass", Role::Guest);
        creds
    }

    pub fn add(&mut self, username: &str, password: &str, role: Role) {
        let record = UserRecord {
            id: format!("u-{}", username),
            username: username.to_string(),
            role,
        };
        self.users
            .insert(username.to_string(), (digest(password), record));
    }
}

impl Default for StaticCredentials {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn authenticate(&self, username: &str, password: &str) -> Option<UserRecord> {
        let (stored, record) = self.users.get(username)?;
        if *stored == digest(password) {
            Some(record.clone())
        } else {
            None
        }
    }
}

fn digest(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}
