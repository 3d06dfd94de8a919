//! In-process session registry.
//!
//! A login hands out a random opaque token. The token carries no data; the
//! registry maps it to the account and an expiry.

use crate::error::{ParkingError, Result};
use crate::types::AccountId;
use chrono::{DateTime, Duration, Utc};
use easypark_core::environment::Entropy;
use std::collections::HashMap;
use tokio::sync::RwLock;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LENGTH: usize = 32;
const TOKEN_ATTEMPTS: usize = 32;

/// An issued session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Bearer token
    pub token: String,
    /// Account the token acts for
    pub account_id: AccountId,
    /// When the token stops resolving
    pub expires_at: DateTime<Utc>,
}

/// Token → session map
#[derive(Debug)]
pub struct SessionRegistry {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    /// Creates an empty registry whose sessions last `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn token(entropy: &dyn Entropy) -> String {
        (0..TOKEN_LENGTH)
            .map(|_| char::from(TOKEN_ALPHABET[entropy.pick(TOKEN_ALPHABET.len())]))
            .collect()
    }

    /// Issues a fresh token for an account
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Conflict`] when every draw collides with a
    /// live token.
    pub async fn issue(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
        entropy: &dyn Entropy,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > now);

        let token = (0..TOKEN_ATTEMPTS)
            .map(|_| Self::token(entropy))
            .find(|token| !sessions.contains_key(token))
            .ok_or_else(|| {
                ParkingError::Conflict(format!(
                    "no unique session token after {TOKEN_ATTEMPTS} attempts"
                ))
            })?;

        let session = Session {
            token: token.clone(),
            account_id,
            expires_at: now + self.ttl,
        };
        sessions.insert(token, session.clone());
        Ok(session)
    }

    /// Resolves a token to its account
    ///
    /// # Errors
    ///
    /// Returns [`ParkingError::Unauthenticated`] for unknown or expired tokens.
    /// An expired token is forgotten.
    pub async fn resolve(&self, token: &str, now: DateTime<Utc>) -> Result<AccountId> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Ok(session.account_id.clone()),
            Some(_) => {
                sessions.remove(token);
                Err(ParkingError::Unauthenticated)
            }
            None => Err(ParkingError::Unauthenticated),
        }
    }

    /// Forgets a token; returns whether it was known
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Forgets every token of an account; returns how many were dropped
    pub async fn revoke_account(&self, account_id: &AccountId) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.account_id.as_str() != account_id.as_str());
        before - sessions.len()
    }

    /// Number of live entries (expired ones may linger until touched)
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the registry holds no entries
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use easypark_core::environment::Clock;
    use easypark_testing::{ScriptedEntropy, test_clock};

    #[tokio::test]
    async fn issued_tokens_resolve_until_expiry() {
        let clock = test_clock();
        let registry = SessionRegistry::new(Duration::hours(1));
        let session = registry
            .issue(AccountId::from("1"), clock.now(), &ScriptedEntropy::new(vec![3, 40, 61]))
            .await
            .unwrap();

        assert_eq!(session.token.len(), 32);
        assert!(session.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(
            registry.resolve(&session.token, clock.now()).await.unwrap(),
            AccountId::from("1")
        );

        clock.advance(Duration::hours(1));
        assert_eq!(
            registry.resolve(&session.token, clock.now()).await,
            Err(ParkingError::Unauthenticated)
        );
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn colliding_tokens_are_redrawn() {
        let clock = test_clock();
        let registry = SessionRegistry::new(Duration::hours(1));
        let entropy = ScriptedEntropy::new([vec![0; 64], vec![1; 32]].concat());

        let first = registry.issue(AccountId::from("1"), clock.now(), &entropy).await.unwrap();
        let second = registry.issue(AccountId::from("2"), clock.now(), &entropy).await.unwrap();

        assert_eq!(first.token, "A".repeat(32));
        assert_eq!(second.token, "B".repeat(32));
        assert_eq!(entropy.picks(), 96);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn degenerate_entropy_gives_up() {
        let clock = test_clock();
        let registry = SessionRegistry::new(Duration::hours(1));
        let entropy = ScriptedEntropy::constant(7);

        registry.issue(AccountId::from("1"), clock.now(), &entropy).await.unwrap();
        let result = registry.issue(AccountId::from("2"), clock.now(), &entropy).await;

        assert!(matches!(result, Err(ParkingError::Conflict(_))));
        assert_eq!(entropy.picks(), TOKEN_LENGTH * (1 + TOKEN_ATTEMPTS));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn revoke() {
        let clock = test_clock();
        let registry = SessionRegistry::new(Duration::hours(1));
        let entropy = ScriptedEntropy::new((0..96).collect());
        let a = registry.issue(AccountId::from("1"), clock.now(), &entropy).await.unwrap();
        registry.issue(AccountId::from("1"), clock.now(), &entropy).await.unwrap();
        registry.issue(AccountId::from("2"), clock.now(), &entropy).await.unwrap();

        assert!(registry.revoke(&a.token).await);
        assert!(!registry.revoke(&a.token).await);
        assert_eq!(registry.revoke_account(&AccountId::from("1")).await, 1);
        assert_eq!(registry.len().await, 1);
    }
}
