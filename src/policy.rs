//! Authorization rules applied after authentication and input decoding.
//!
//! Each rule answers `ApiError::Forbidden` on violation, except
//! [`reauthenticate`] which answers `ApiError::WrongCredential`.

use crate::core::errors::ApiError;
use crate::crypt::{verify_password, HashError};
pub use crate::models::models::Identity;

/// Stored password hash for an identity.
pub trait CredentialStore {
    fn password_hash(&self, identity: &Identity) -> Result<String, ApiError>;
}

/// Owner of a stored resource.
pub trait ResourceOwners {
    fn owner(&self, resource_id: &str) -> Result<Identity, ApiError>;
}

/// The authenticated caller may only act on their own account.
pub fn require_self(authenticated: &Identity, target: &Identity) -> Result<(), ApiError> {
    if authenticated != target {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub fn require_owner(authenticated: &Identity, owner: &Identity) -> Result<(), ApiError> {
    if authenticated != owner {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Reads the owner of `resource_id` and checks it against the caller. A
/// missing resource surfaces as the lookup's `NotFound`.
pub fn authorize_post_mutation<O: ResourceOwners + ?Sized>(
    owners: &O,
    authenticated: &Identity,
    resource_id: &str,
) -> Result<(), ApiError> {
    let owner = owners.owner(resource_id)?;
    require_owner(authenticated, &owner)
}

/// A user can neither follow nor unfollow themselves.
pub fn deny_self_reference(target: &Identity, follower: &Identity) -> Result<(), ApiError> {
    if target == follower {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

/// Confirms `current` is the identity's password before a sensitive change.
pub fn reauthenticate<S: CredentialStore + ?Sized>(
    store: &S,
    identity: &Identity,
    current: &str,
) -> Result<(), ApiError> {
    let hash = store.password_hash(identity)?;
    verify_password(&hash, current).map_err(|err| match err {
        HashError::Mismatch => ApiError::WrongCredential,
        other => ApiError::Unexpected(other.to_string()),
    })
}
