//! Durable credential/profile persistence.

use crate::{Credential, Profile};
use chrono::{DateTime, Utc};
use console_storage::{SecureStorage, StorageError, StorageKeys, StorageResult};
use tracing::{debug, warn};

/// What survived the last process.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub credential: Credential,
    /// `None` when no profile was cached or the cached one could not be decoded.
    pub profile: Option<Profile>,
    /// Advisory only, never used for expiry decisions.
    pub last_verified: Option<DateTime<Utc>>,
}

/// Persists the credential and its profile as one unit.
pub struct CredentialStore {
    storage: Box<dyn SecureStorage>,
}

impl CredentialStore {
    pub fn new(storage: Box<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Read the persisted session, if any.
    ///
    /// A corrupt cached profile is dropped here and reported as a cache miss;
    /// the credential is still returned so the server can decide.
    pub fn load(&self) -> StorageResult<Option<StoredSession>> {
        let token = match self.storage.get(StorageKeys::AUTH_TOKEN)? {
            Some(token) if !token.is_empty() => token,
            _ => return Ok(None),
        };

        let profile = match self.storage.get(StorageKeys::AUTH_USER)? {
            Some(raw) => match serde_json::from_str::<Profile>(&raw) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(error = %e, "Cached profile is corrupt, ignoring it");
                    None
                }
            },
            None => None,
        };

        let last_verified = self
            .storage
            .get(StorageKeys::AUTH_LAST_VERIFIED)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Some(StoredSession {
            credential: Credential::new(token),
            profile,
            last_verified,
        }))
    }

    /// Persist a freshly verified pair in a single batch.
    pub fn save(&self, credential: &Credential, profile: &Profile) -> StorageResult<()> {
        let profile_json =
            serde_json::to_string(profile).map_err(|e| StorageError::Encoding(e.to_string()))?;
        let verified_at = Utc::now().to_rfc3339();

        self.storage.set_many(&[
            (StorageKeys::AUTH_TOKEN, credential.as_str()),
            (StorageKeys::AUTH_USER, &profile_json),
            (StorageKeys::AUTH_LAST_VERIFIED, &verified_at),
        ])?;

        debug!(user_id = %profile.id, "Session persisted");
        Ok(())
    }

    /// Remove every session key in a single batch.
    pub fn clear(&self) -> StorageResult<()> {
        self.storage.delete_many(&StorageKeys::SESSION_KEYS)?;
        debug!("Session cleared from storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use console_storage::{FileStorage, MemoryStorage};
    use serde_json::json;
    use std::sync::Arc;

    fn sample_profile() -> Profile {
        serde_json::from_value(json!({
            "id": 1,
            "username": "alice",
            "email": "alice@example.com",
            "preferences": { "theme": "dark" }
        }))
        .unwrap()
    }

    fn create_test_store() -> (CredentialStore, Arc<MemoryStorage>) {
        let memory = Arc::new(MemoryStorage::new());
        let store = CredentialStore::new(Box::new(memory.clone()));
        (store, memory)
    }

    #[test]
    fn test_empty_store_loads_nothing() {
        let (store, _) = create_test_store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let (store, memory) = create_test_store();
        let credential = Credential::new("tok-1");

        store.save(&credential, &sample_profile()).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.credential, credential);
        assert_eq!(loaded.profile, Some(sample_profile()));
        assert!(loaded.last_verified.is_some());

        let entries = memory.entries();
        assert_eq!(entries.get("auth_token").map(String::as_str), Some("tok-1"));
        assert!(entries.contains_key("auth_user"));
        assert!(entries.contains_key("auth_last_verified"));
    }

    #[test]
    fn test_clear_removes_every_key() {
        let (store, memory) = create_test_store();
        store.save(&Credential::new("tok"), &sample_profile()).unwrap();
        memory.set("unrelated", "keep").unwrap();

        store.clear().unwrap();

        assert!(store.load().unwrap().is_none());
        for key in StorageKeys::SESSION_KEYS {
            assert!(!memory.has(key).unwrap());
        }
        assert!(memory.has("unrelated").unwrap());
    }

    #[test]
    fn test_corrupt_profile_keeps_credential() {
        let (store, memory) = create_test_store();
        memory.set("auth_token", "tok").unwrap();
        memory.set("auth_user", "{\"id\": ").unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.credential.as_str(), "tok");
        assert!(loaded.profile.is_none());
        // Nothing is rewritten on load.
        assert_eq!(memory.get("auth_user").unwrap().as_deref(), Some("{\"id\": "));
    }

    #[test]
    fn test_empty_token_counts_as_absent() {
        let (store, memory) = create_test_store();
        memory.set("auth_token", "").unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_pair_survives_restart_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = CredentialStore::new(Box::new(FileStorage::open(&path).unwrap()));
        store.save(&Credential::new("tok-disk"), &sample_profile()).unwrap();
        drop(store);

        let reopened = CredentialStore::new(Box::new(FileStorage::open(&path).unwrap()));
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded.credential.as_str(), "tok-disk");
        assert_eq!(loaded.profile.unwrap().username, "alice");

        reopened.clear().unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw, json!({}));
    }
}
