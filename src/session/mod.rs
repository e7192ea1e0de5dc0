use std::sync::Arc;

use tracing::debug;

use crate::primitives::Session;
use crate::storage::{deserialize, serialize, Storage, StorageError};

pub mod cleanup;
pub mod monitor;
pub mod recovery;
pub mod validation;

pub use validation::{SessionCheck, SessionValidator};

/// Key the current session is cached under. The name deliberately matches
/// the cleanup sweep's patterns so a sweep always removes it.
pub const CURRENT_SESSION_KEY: &str = "sb-current-session";

/// Local cache of the current session.
///
/// A transient, non-authoritative copy; the identity provider owns the
/// session. Multiple services read and write this without coordination.
#[derive(Clone)]
pub struct SessionCache {
    storage: Arc<dyn Storage>,
}

impl SessionCache {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Cache a session as the current one.
    pub async fn store(&self, session: &Session) -> Result<(), StorageError> {
        let bytes = serialize(session)?;
        self.storage.set(CURRENT_SESSION_KEY, &bytes).await
    }

    /// Load the cached current session, if any. A corrupted cache entry is
    /// treated as absent and removed.
    pub async fn load(&self) -> Result<Option<Session>, StorageError> {
        match self.storage.get(CURRENT_SESSION_KEY).await? {
            Some(bytes) => match deserialize::<Session>(&bytes) {
                Ok(session) => Ok(Some(session)),
                Err(err) => {
                    debug!(%err, "Dropping undecodable cached session");
                    let _ = self.storage.delete(CURRENT_SESSION_KEY).await;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    /// Remove the cached current session.
    pub async fn remove(&self) -> Result<(), StorageError> {
        self.storage.delete(CURRENT_SESSION_KEY).await
    }
}
