//! External service seams: identity resolution and result persistence
//!
//! Both are trait objects injected into the orchestrator so the service can
//! run against real backends in production and in-memory doubles in tests.

use crate::error::Result;
use crate::types::{FinishedRace, Identity, IdentityCredentials};
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Resolves presented credentials to a participant identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve credentials to an identity. Implementations must not panic on
    /// malformed input; they return an error or a guest fallback instead.
    async fn resolve(&self, credentials: &IdentityCredentials) -> Result<Identity>;
}

/// Identity provider that trusts the presented token as an opaque stable id
/// and falls back to a fresh guest identity when no token is given.
///
/// Guests are excluded from public online counts and their results are not
/// persisted under a durable account.
#[derive(Debug, Default)]
pub struct GuestIdentityProvider;

impl GuestIdentityProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IdentityProvider for GuestIdentityProvider {
    async fn resolve(&self, credentials: &IdentityCredentials) -> Result<Identity> {
        match credentials.token.as_deref() {
            Some(token) if !token.trim().is_empty() => {
                let token = token.trim();
                let short: String = token.chars().take(6).collect();
                Ok(Identity {
                    participant_id: token.to_string(),
                    display_name: credentials
                        .display_name
                        .clone()
                        .unwrap_or_else(|| format!("player-{short}")),
                    guest: false,
                })
            }
            _ => {
                let suffix = Uuid::new_v4().simple().to_string();
                Ok(Identity {
                    participant_id: format!("guest-{}", &suffix[..8]),
                    display_name: credentials
                        .display_name
                        .clone()
                        .unwrap_or_else(|| format!("guest-{}", &suffix[..4])),
                    guest: true,
                })
            }
        }
    }
}

/// Persists a finished race record
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Save one finished race. Failures must not affect race completion;
    /// callers log and continue.
    async fn save(&self, race: &FinishedRace) -> Result<()>;
}

/// Result store that only logs the outcome. Used when no persistence
/// backend is configured.
#[derive(Debug, Default)]
pub struct LoggingResultStore;

impl LoggingResultStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResultStore for LoggingResultStore {
    async fn save(&self, race: &FinishedRace) -> Result<()> {
        if race.results.is_empty() {
            warn!(room_id = %race.room_id, "Finished race with empty results");
            return Ok(());
        }
        info!(
            room_id = %race.room_id,
            cause = race.cause.as_str(),
            players = race.results.len(),
            winner = %race.results[0].display_name,
            "Race result recorded"
        );
        Ok(())
    }
}

/// In-memory result store for tests
#[derive(Debug, Default)]
pub struct RecordingResultStore {
    saved: Mutex<Vec<FinishedRace>>,
}

impl RecordingResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_races(&self) -> Vec<FinishedRace> {
        self.saved
            .lock()
            .map(|saved| saved.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResultStore for RecordingResultStore {
    async fn save(&self, race: &FinishedRace) -> Result<()> {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(race.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guest_provider_resolves_token_holders() {
        let provider = GuestIdentityProvider::new();
        let identity = provider
            .resolve(&IdentityCredentials {
                token: Some("user-123".to_string()),
                display_name: Some("Alice".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(identity.participant_id, "user-123");
        assert_eq!(identity.display_name, "Alice");
        assert!(!identity.guest);
    }

    #[tokio::test]
    async fn test_guest_provider_falls_back_to_guest() {
        let provider = GuestIdentityProvider::new();
        let identity = provider
            .resolve(&IdentityCredentials {
                token: None,
                display_name: None,
            })
            .await
            .unwrap();

        assert!(identity.guest);
        assert!(identity.participant_id.starts_with("guest-"));
    }

    #[tokio::test]
    async fn test_guest_identities_are_unique() {
        let provider = GuestIdentityProvider::new();
        let credentials = IdentityCredentials {
            token: Some("   ".to_string()),
            display_name: None,
        };

        let first = provider.resolve(&credentials).await.unwrap();
        let second = provider.resolve(&credentials).await.unwrap();
        assert_ne!(first.participant_id, second.participant_id);
    }
}
