use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::provider::{IdentityProvider, SignOutScope};
use crate::session::CURRENT_SESSION_KEY;
use crate::storage::Storage;

/// Any cache key containing one of these substrings is session material and
/// gets removed by the sweep.
pub const TOKEN_KEY_PATTERNS: &[&str] = &[
    "auth-token",
    "sb-",
    "token",
    "session",
    "refresh",
    "access",
    "gotrue",
];

/// Keys that are always removed by the forced clean, whether or not the
/// sweep saw them.
pub const WELL_KNOWN_KEYS: &[&str] = &[
    CURRENT_SESSION_KEY,
    "sb-access-token",
    "sb-refresh-token",
    "gotrue-persist",
];

/// Best-effort sweep of local session material.
///
/// Idempotent and order-independent; a failed removal is logged and skipped,
/// never rolled back.
#[derive(Clone)]
pub struct SessionCleaner {
    storage: Arc<dyn Storage>,
    provider: Arc<dyn IdentityProvider>,
}

impl SessionCleaner {
    pub fn new(storage: Arc<dyn Storage>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { storage, provider }
    }

    /// Remove every cached key that looks like session material.
    pub async fn clear_local_session(&self) {
        let keys = match self.storage.list_keys("").await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(%err, "Could not enumerate cache keys for cleanup");
                return;
            }
        };

        let mut removed = 0usize;
        for key in keys {
            if !TOKEN_KEY_PATTERNS.iter().any(|p| key.contains(p)) {
                continue;
            }
            match self.storage.delete(&key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!(key, %err, "Failed to remove session key"),
            }
        }
        debug!(removed, "Local session sweep finished");
    }

    /// Escape hatch for corrupted token state: local-scope provider
    /// sign-out (errors swallowed), the sweep, and the well-known keys.
    pub async fn force_clean_corrupted_tokens(&self, access_token: Option<&str>) {
        if let Some(token) = access_token {
            if let Err(err) = self.provider.sign_out(token, SignOutScope::Local).await {
                debug!(%err, "Provider sign-out during forced clean failed");
            }
        }

        self.clear_local_session().await;

        for key in WELL_KNOWN_KEYS {
            if let Err(err) = self.storage.delete(key).await {
                debug!(key, %err, "Well-known key removal failed");
            }
        }

        info!("Forced token cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SignOutScope;
    use crate::storage::MemoryStorage;
    use crate::test_support::FakeIdentityProvider;

    async fn seeded_storage() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        for key in [
            "sb-current-session",
            "auth-token-backup",
            "my-refresh-material",
            "course-progress", // unrelated, must survive
            "ui-theme",        // unrelated, must survive
        ] {
            storage.set(key, b"x").await.unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn sweep_removes_only_session_material() {
        let storage = seeded_storage().await;
        let cleaner = SessionCleaner::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::new(FakeIdentityProvider::new()),
        );

        cleaner.clear_local_session().await;

        assert!(!storage.exists("sb-current-session").await.unwrap());
        assert!(!storage.exists("auth-token-backup").await.unwrap());
        assert!(!storage.exists("my-refresh-material").await.unwrap());
        assert!(storage.exists("course-progress").await.unwrap());
        assert!(storage.exists("ui-theme").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let storage = seeded_storage().await;
        let cleaner = SessionCleaner::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::new(FakeIdentityProvider::new()),
        );

        cleaner.clear_local_session().await;
        cleaner.clear_local_session().await;
        assert!(storage.exists("ui-theme").await.unwrap());
    }

    #[tokio::test]
    async fn forced_clean_signs_out_locally_when_token_given() {
        let storage = seeded_storage().await;
        let provider = Arc::new(FakeIdentityProvider::new());
        provider.add_account("u@example.com", "pw");
        let cleaner = SessionCleaner::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        );

        cleaner
            .force_clean_corrupted_tokens(Some("access-u@example.com"))
            .await;

        assert_eq!(provider.recorded_sign_outs(), vec![SignOutScope::Local]);
        assert!(!storage.exists("sb-current-session").await.unwrap());
    }

    #[tokio::test]
    async fn forced_clean_without_token_skips_provider() {
        let storage = seeded_storage().await;
        let provider = Arc::new(FakeIdentityProvider::new());
        let cleaner = SessionCleaner::new(
            Arc::clone(&storage) as Arc<dyn Storage>,
            Arc::clone(&provider) as Arc<dyn IdentityProvider>,
        );

        cleaner.force_clean_corrupted_tokens(None).await;
        assert!(provider.recorded_sign_outs().is_empty());
    }
}
