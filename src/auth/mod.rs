//! Authentication and authorization core.
//!
//! # Flow
//!
//! ```text
//! POST /login
//!   -> CredentialStore::verify (bcrypt, constant-ish time)
//!   -> TokenIssuer::issue (RS256, kid in header, exp = now + ttl)
//!   -> client holds the token
//!
//! Protected request
//!   -> AccessGate: extract bearer token
//!   -> TokenVerifier: kid from header, cached JWKS key, pinned RS256, exp
//!   -> role check
//!   -> handler receives VerifiedIdentity
//! ```
//!
//! Tokens are stateless: nothing is stored server-side and expiry is the only
//! way a token stops working.

pub mod credentials;
pub mod gate;
pub mod handler;
pub mod issuer;
pub mod keys;
pub mod limiter;
pub mod password;
pub mod store;
pub mod verifier;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use credentials::{CredentialError, CredentialStore};
pub use gate::{AccessGate, RoleGuard};
pub use issuer::TokenIssuer;
pub use keys::KeyProvider;
pub use limiter::AttemptLimiter;
pub use store::{FileUserStore, InMemoryUserStore, StoreError, UserStore};
pub use verifier::{HttpJwksSource, JwksSource, TokenVerifier, VerifyError};

/// Role of a team member. Closed set: anything else fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Creates check-ins and reads reports
    Manager,
    /// Answers check-ins
    Member,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized role string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid role. Must be 'manager' or 'member'")]
pub struct InvalidRole;

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manager" => Ok(Self::Manager),
            "member" => Ok(Self::Member),
            _ => Err(InvalidRole),
        }
    }
}

/// A registered user. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque unique id (UUID v4)
    pub id: String,
    /// Unique login email
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
    /// Role fixed at signup
    pub role: Role,
}

/// Public view of an [`Identity`], safe to return to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// User id
    pub id: String,
    /// Email
    pub email: String,
    /// Role
    pub role: Role,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role,
        }
    }
}

/// Signed token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id
    pub sub: String,
    /// Identity email at issuance
    pub email: String,
    /// Identity role at issuance
    pub role: Role,
    /// Issued-at (Unix epoch seconds)
    pub iat: u64,
    /// Expires-at (Unix epoch seconds)
    pub exp: u64,
}

/// Verified caller identity handed to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    /// Token subject (identity id)
    pub subject: String,
    /// Email claim
    pub email: String,
    /// Role claim
    pub role: Role,
}

impl From<Claims> for VerifiedIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_wire_names() {
        assert_eq!("manager".parse::<Role>(), Ok(Role::Manager));
        assert_eq!("member".parse::<Role>(), Ok(Role::Member));
        assert_eq!(Role::Manager.to_string(), "manager");
        assert_eq!(serde_json::to_string(&Role::Member).unwrap(), "\"member\"");
    }

    #[test]
    fn role_rejects_anything_else() {
        assert!("admin".parse::<Role>().is_err());
        assert!("Manager".parse::<Role>().is_err());
        assert!(serde_json::from_str::<Role>("\"owner\"").is_err());
    }

    #[test]
    fn user_view_omits_password_hash() {
        let identity = Identity {
            id: "u1".into(),
            email: "m@x.com".into(),
            password_hash: "$2b$04$secret".into(),
            role: Role::Manager,
        };
        let json = serde_json::to_string(&UserView::from(&identity)).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("m@x.com"));
    }
}
