//! Operations on root metadata: bootstrapping the root of trust and managing
//! the keys it delegates to.

use crate::error::GitTufError;
use crate::time::{format_rfc3339, TimeSource};
use crate::tuf::{Key, Role, RootMetadata, ROOT_ROLE_NAME, TARGETS_ROLE_NAME};

const EXPIRY_SECONDS: u64 = 365 * 86400;

/// Create root metadata at version 1, trusting `root_key` for the root role
/// with a threshold of 1. Expiration is one year from the clock's now.
pub fn initialize_root_metadata(
    root_key: &Key,
    clock: &dyn TimeSource,
) -> Result<RootMetadata, GitTufError> {
    let expires = format_rfc3339(clock.now_unix()? + EXPIRY_SECONDS);
    let mut root = RootMetadata::new(1, expires);
    root.keys.insert(root_key.key_id.clone(), root_key.clone());
    root.roles.insert(
        ROOT_ROLE_NAME.to_string(),
        Role {
            key_ids: vec![root_key.key_id.clone()],
            threshold: 1,
        },
    );
    Ok(root)
}

/// Add a key authorized to sign future root metadata.
pub fn add_root_key(root: &mut RootMetadata, key: &Key) {
    root.keys.insert(key.key_id.clone(), key.clone());
    let role = root
        .roles
        .entry(ROOT_ROLE_NAME.to_string())
        .or_insert_with(|| Role {
            key_ids: Vec::new(),
            threshold: 1,
        });
    if !role.key_ids.contains(&key.key_id) {
        role.key_ids.push(key.key_id.clone());
    }
}

/// Remove a key from the root role. The key itself stays in the key map, as
/// other roles may still reference it.
///
/// # Errors
///
/// `CannotMeetThreshold` if removing the key would leave the role below its
/// signature threshold; the metadata is left unchanged.
pub fn remove_root_key(root: &mut RootMetadata, key_id: &str) -> Result<(), GitTufError> {
    remove_key_from_role(root, ROOT_ROLE_NAME, key_id)
}

/// Add a key authorized to sign the top-level targets metadata, creating the
/// targets role on first use.
pub fn add_targets_key(root: &mut RootMetadata, key: &Key) {
    root.keys.insert(key.key_id.clone(), key.clone());
    let role = root
        .roles
        .entry(TARGETS_ROLE_NAME.to_string())
        .or_insert_with(|| Role {
            key_ids: Vec::new(),
            threshold: 1,
        });
    if !role.key_ids.contains(&key.key_id) {
        role.key_ids.push(key.key_id.clone());
    }
}

/// Remove a key from the targets role.
///
/// # Errors
///
/// `CannotMeetThreshold` if removing the key would leave the role below its
/// signature threshold; the metadata is left unchanged.
pub fn delete_targets_key(root: &mut RootMetadata, key_id: &str) -> Result<(), GitTufError> {
    remove_key_from_role(root, TARGETS_ROLE_NAME, key_id)
}

fn remove_key_from_role(
    root: &mut RootMetadata,
    role_name: &str,
    key_id: &str,
) -> Result<(), GitTufError> {
    let role = root
        .roles
        .get_mut(role_name)
        .ok_or_else(|| GitTufError::DelegationNotFound(role_name.to_string()))?;
    if !role.key_ids.iter().any(|id| id == key_id) {
        return Err(GitTufError::InvalidMetadata(format!(
            "key {key_id} is not part of the {role_name} role"
        )));
    }
    if role.key_ids.len() <= role.threshold {
        return Err(GitTufError::CannotMeetThreshold);
    }
    role.key_ids.retain(|id| id != key_id);
    Ok(())
}
