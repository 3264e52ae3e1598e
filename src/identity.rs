//! Resolution of conversation owners.
//!
//! Summaries are generated on behalf of the conversation owner. An owner id
//! that the directory does not know is a configuration problem and skips
//! summarization for that turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, owner_id: &str) -> Option<User>;
}

/// Fixed set of known users.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, User>,
}

impl StaticUserDirectory {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user(&self, owner_id: &str) -> Option<User> {
        self.users.get(owner_id).cloned()
    }
}

/// Accepts every owner id as-is. Used when the host does its own auth.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughUserDirectory;

#[async_trait]
impl UserDirectory for PassthroughUserDirectory {
    async fn get_user(&self, owner_id: &str) -> Option<User> {
        (!owner_id.trim().is_empty()).then(|| User::new(owner_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_directory_lookup() {
        let dir = StaticUserDirectory::new(vec![User {
            id: "u1".into(),
            name: Some("Ada".into()),
        }]);
        assert_eq!(dir.get_user("u1").await.unwrap().name.as_deref(), Some("Ada"));
        assert!(dir.get_user("u2").await.is_none());
    }

    #[tokio::test]
    async fn test_passthrough_directory() {
        let dir = PassthroughUserDirectory;
        assert_eq!(dir.get_user("anyone").await, Some(User::new("anyone")));
        assert!(dir.get_user("  ").await.is_none());
    }
}
