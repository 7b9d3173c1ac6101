//! Collaborator seams for identity and bans.
//!
//! Credential verification and ban persistence live outside this server. The
//! core consumes their outcomes through these two traits; the shipped
//! implementations are thin stand-ins suitable for deployments where a
//! trusted proxy has already verified the handshake.

use crate::error::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Verified identity, immutable for the lifetime of a connection.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Resolves a connection handshake to a verified identity, or rejects it.
/// Invoked once per connection before any event is processed.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        handshake: &HashMap<String, String>,
    ) -> Result<UserIdentity, AuthError>;
}

/// Answers whether a user is currently banned. Consulted on every join.
#[async_trait]
pub trait BanList: Send + Sync {
    async fn is_banned(&self, user_id: &str) -> bool;
}

/// Trusts identity fields placed on the handshake by the upstream verifier.
pub struct HandshakeAuthenticator;

#[async_trait]
impl Authenticator for HandshakeAuthenticator {
    async fn authenticate(
        &self,
        handshake: &HashMap<String, String>,
    ) -> Result<UserIdentity, AuthError> {
        let user_id = handshake
            .get("user_id")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError("missing user_id".to_string()))?;
        let username = handshake
            .get("username")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError("missing username".to_string()))?;

        Ok(UserIdentity {
            user_id: user_id.clone(),
            username: username.clone(),
            avatar_url: handshake.get("avatar_url").cloned(),
        })
    }
}

/// Static ban list loaded from configuration.
pub struct EnvBanList {
    banned: std::collections::HashSet<String>,
}

impl EnvBanList {
    pub fn new(banned: Vec<String>) -> Self {
        Self {
            banned: banned.into_iter().collect(),
        }
    }
}

#[async_trait]
impl BanList for EnvBanList {
    async fn is_banned(&self, user_id: &str) -> bool {
        self.banned.contains(user_id)
    }
}
