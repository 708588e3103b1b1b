//! User store: persistence for registered identities.
//!
//! The [`UserStore`] trait abstracts over storage backends:
//!
//! - [`InMemoryUserStore`]: a `DashMap` keyed by email, lost on restart.
//! - [`FileUserStore`]: a JSON document on disk, rewritten atomically on every
//!   signup.
//!
//! Both make check-then-insert atomic, so two concurrent signups with the same
//! email can never both succeed.

use std::collections::HashMap;
use std::path::PathBuf;

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Identity;
use crate::Error;

/// Failure to create an identity
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An identity with this email already exists
    #[error("email already registered")]
    DuplicateEmail,

    /// The backend itself failed
    #[error(transparent)]
    Backend(#[from] Error),
}

/// Trait abstracting the user storage backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request tasks.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Insert `identity` unless its email is taken. Atomic with respect to
    /// other `create` calls.
    async fn create(&self, identity: Identity) -> Result<Identity, StoreError>;

    /// Look up an identity by exact email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error>;

    /// Number of stored identities.
    async fn len(&self) -> Result<usize, Error>;
}

/// In-memory user store backed by a `DashMap` keyed by email.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    by_email: DashMap<String, Identity>,
}

impl InMemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        // The entry guard holds the shard lock across check and insert
        match self.by_email.entry(identity.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(identity.clone());
                Ok(identity)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        Ok(self.by_email.get(email).map(|entry| entry.value().clone()))
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.by_email.len())
    }
}

/// File-backed user store.
///
/// The whole document is held in memory and rewritten on each insert via a
/// temp file + rename, so a crash mid-write leaves the previous version intact.
#[derive(Debug)]
pub struct FileUserStore {
    path: PathBuf,
    users: Mutex<HashMap<String, Identity>>,
}

impl FileUserStore {
    /// Open (or start) the document at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();

        let users: HashMap<String, Identity> = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Identity> = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Store(format!("Corrupt user document {}: {e}", path.display()))
                })?;
                list.into_iter().map(|u| (u.email.clone(), u)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "User document not found, starting empty");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), users = users.len(), "Opened file user store");

        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    async fn persist(&self, users: &HashMap<String, Identity>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut list: Vec<&Identity> = users.values().collect();
        list.sort_by(|a, b| a.email.cmp(&b.email));
        let bytes = serde_json::to_vec_pretty(&list)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UserStore for FileUserStore {
    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&identity.email) {
            return Err(StoreError::DuplicateEmail);
        }

        users.insert(identity.email.clone(), identity.clone());
        if let Err(e) = self.persist(&users).await {
            users.remove(&identity.email);
            return Err(e.into());
        }
        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, Error> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn len(&self) -> Result<usize, Error> {
        Ok(self.users.lock().await.len())
    }
}
