//! Operations on targets metadata: managing delegations.

use crate::error::GitTufError;
use crate::time::{format_rfc3339, TimeSource};
use crate::tuf::{Delegation, Delegations, Key, TargetsMetadata, ALLOW_RULE_NAME};

const EXPIRY_SECONDS: u64 = 365 * 86400;

fn allow_rule() -> Delegation {
    Delegation {
        name: ALLOW_RULE_NAME.to_string(),
        key_ids: Vec::new(),
        threshold: 1,
        paths: vec!["*".to_string()],
        terminating: false,
    }
}

/// Create targets metadata at version 1 carrying only the trailing
/// allow-rule. Expiration is one year from the clock's now.
pub fn initialize_targets_metadata(
    clock: &dyn TimeSource,
) -> Result<TargetsMetadata, GitTufError> {
    let expires = format_rfc3339(clock.now_unix()? + EXPIRY_SECONDS);
    let mut targets = TargetsMetadata::new(1, expires);
    targets
        .delegations
        .get_or_insert_with(Delegations::new)
        .roles
        .push(allow_rule());
    Ok(targets)
}

/// Add a delegation mapping `paths` to `authorized_keys`, or replace the
/// delegation of the same name. New delegations are inserted ahead of the
/// trailing allow-rule.
pub fn add_or_update_delegation(
    targets: &mut TargetsMetadata,
    name: &str,
    authorized_keys: &[Key],
    paths: Vec<String>,
) -> Result<(), GitTufError> {
    if name == ALLOW_RULE_NAME {
        return Err(GitTufError::InvalidMetadata(format!(
            "{ALLOW_RULE_NAME} is reserved"
        )));
    }

    let delegations = targets.delegations.get_or_insert_with(Delegations::new);
    for key in authorized_keys {
        delegations.keys.insert(key.key_id.clone(), key.clone());
    }

    let delegation = Delegation {
        name: name.to_string(),
        key_ids: authorized_keys.iter().map(|k| k.key_id.clone()).collect(),
        threshold: 1,
        paths,
        terminating: false,
    };

    if let Some(existing) = delegations.roles.iter_mut().find(|d| d.name == name) {
        *existing = delegation;
        return Ok(());
    }

    let insert_at = match delegations.roles.last() {
        Some(last) if last.name == ALLOW_RULE_NAME => delegations.roles.len() - 1,
        _ => delegations.roles.len(),
    };
    delegations.roles.insert(insert_at, delegation);
    Ok(())
}

/// Remove a delegation by name. The allow-rule itself cannot be removed.
pub fn remove_delegation(targets: &mut TargetsMetadata, name: &str) -> Result<(), GitTufError> {
    if name == ALLOW_RULE_NAME {
        return Err(GitTufError::InvalidMetadata(format!(
            "{ALLOW_RULE_NAME} is reserved"
        )));
    }
    let delegations = targets
        .delegations
        .as_mut()
        .ok_or_else(|| GitTufError::DelegationNotFound(name.to_string()))?;
    let before = delegations.roles.len();
    delegations.roles.retain(|d| d.name != name);
    if delegations.roles.len() == before {
        return Err(GitTufError::DelegationNotFound(name.to_string()));
    }
    Ok(())
}
