//! Credential store: signup and password verification on top of a [`UserStore`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::password::{is_valid_email, unmet_password_rules};
use super::store::{StoreError, UserStore};
use super::{Identity, Role};
use crate::{ApiError, Error};

/// Compared against when the email is unknown so both paths pay for one bcrypt run
const DUMMY_PASSWORD: &str = "dummy-password-for-timing";

/// Signup or login failure
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Input rejected; `details` lists every unmet rule
    #[error("{message}")]
    Validation {
        /// Summary message
        message: String,
        /// Unmet rules (may be empty)
        details: Vec<String>,
    },

    /// Email is already registered
    #[error("User already exists with this email")]
    DuplicateEmail,

    /// Unknown email or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Hashing or storage failed
    #[error(transparent)]
    Internal(#[from] Error),
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::DuplicateEmail,
            StoreError::Backend(e) => Self::Internal(e),
        }
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Validation { message, details } => {
                Self::Validation { message, details }
            }
            CredentialError::DuplicateEmail => Self::DuplicateEmail,
            CredentialError::InvalidCredentials => Self::InvalidCredentials,
            CredentialError::Internal(e) => Self::from(e),
        }
    }
}

/// Identity registry with bcrypt-hashed passwords.
///
/// Plaintext passwords only live for the duration of a call.
pub struct CredentialStore {
    store: Arc<dyn UserStore>,
    cost: u32,
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Create a credential store hashing with bcrypt work factor `cost`.
    ///
    /// Computes the dummy hash up front, so this blocks for one bcrypt run.
    pub fn new(store: Arc<dyn UserStore>, cost: u32) -> crate::Result<Self> {
        let dummy_hash = bcrypt::hash(DUMMY_PASSWORD, cost)
            .map_err(|e| Error::Internal(format!("bcrypt setup failed: {e}")))?;
        Ok(Self {
            store,
            cost,
            dummy_hash,
        })
    }

    /// Register a new identity.
    ///
    /// # Errors
    ///
    /// [`CredentialError::Validation`] for a malformed email or weak password,
    /// [`CredentialError::DuplicateEmail`] if the email is taken.
    pub async fn create(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, CredentialError> {
        if !is_valid_email(email) {
            return Err(CredentialError::Validation {
                message: "Invalid email format".to_string(),
                details: Vec::new(),
            });
        }

        let unmet = unmet_password_rules(password);
        if !unmet.is_empty() {
            return Err(CredentialError::Validation {
                message: "Password validation failed".to_string(),
                details: unmet,
            });
        }

        // Cheap pre-check; the store re-checks atomically on insert
        if self.store.find_by_email(email).await?.is_some() {
            return Err(CredentialError::DuplicateEmail);
        }

        let password_hash = hash_blocking(password.to_string(), self.cost).await?;
        let identity = Identity {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash,
            role,
        };

        let identity = self.store.create(identity).await?;
        info!(user_id = %identity.id, role = %identity.role, "User registered");
        Ok(identity)
    }

    /// Check `password` against the identity registered under `email`.
    ///
    /// # Errors
    ///
    /// [`CredentialError::InvalidCredentials`] for an unknown email or wrong
    /// password; the two are indistinguishable to the caller.
    pub async fn verify(&self, email: &str, password: &str) -> Result<Identity, CredentialError> {
        let Some(identity) = self.store.find_by_email(email).await? else {
            // Burn the same bcrypt time as a real comparison
            let _ = verify_blocking(password.to_string(), self.dummy_hash.clone()).await;
            debug!("Login for unknown email");
            return Err(CredentialError::InvalidCredentials);
        };

        if verify_blocking(password.to_string(), identity.password_hash.clone()).await? {
            Ok(identity)
        } else {
            warn!(user_id = %identity.id, "Login with wrong password");
            Err(CredentialError::InvalidCredentials)
        }
    }

    /// Number of registered identities
    pub async fn len(&self) -> crate::Result<usize> {
        self.store.len().await
    }
}

async fn hash_blocking(password: String, cost: u32) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| Error::Internal(format!("hash task failed: {e}")))?
        .map_err(|e| Error::Internal(format!("bcrypt hash failed: {e}")))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| Error::Internal(format!("verify task failed: {e}")))?
        .map_err(|e| Error::Internal(format!("bcrypt verify failed: {e}")))
}
