//! Policy state: the verified bundle of trust metadata at a point in the RSL.
//!
//! Policy state is persisted as a commit on `refs/gittuf/policy` whose tree
//! has exactly two subtrees: `metadata/` with one envelope per document and
//! `keys/` with one blob per bootstrapped root public key. State is immutable
//! once committed; updates publish a new commit and record it in the RSL,
//! which acts as the commit point for the update.

mod root;
mod targets;

pub use root::{
    add_root_key, add_targets_key, delete_targets_key, initialize_root_metadata, remove_root_key,
};
pub use targets::{add_or_update_delegation, initialize_targets_metadata, remove_delegation};

use crate::cancel::CancelToken;
use crate::dsse::Envelope;
use crate::error::GitTufError;
use crate::git::{FileMode, Hash, Repository, TreeEntry};
use crate::rsl;
use crate::sign::{verifier_for_key, Signer, Verifier};
use crate::tuf::{
    Delegation, Key, RootMetadata, TargetsMetadata, ALLOW_RULE_NAME, ROOT_ROLE_NAME,
    TARGETS_ROLE_NAME,
};
use std::collections::{BTreeMap, VecDeque};

/// The Git namespace of the policy state.
pub const POLICY_REF: &str = "refs/gittuf/policy";

/// Reserved staging namespace for in-progress policy updates.
pub const POLICY_STAGING_REF: &str = "refs/gittuf/policy-staging";

/// Fallback message for policy commits without an action-specific one.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update policy state";

const METADATA_TREE_NAME: &str = "metadata";
const KEYS_TREE_NAME: &str = "keys";

/// Create the policy ref at the zero hash.
///
/// A second call against a still-zero ref is a no-op; any non-zero value, even
/// a transient one, makes later initialization fail with `PolicyExists`. The
/// zero hash alone marks the namespace as uninitialized.
pub fn initialize_namespace(repo: &mut Repository) -> Result<(), GitTufError> {
    match repo.reference(POLICY_REF) {
        Ok(hash) if !hash.is_zero() => return Err(GitTufError::PolicyExists),
        Ok(_) => {}
        Err(GitTufError::ReferenceNotFound(_)) => {}
        Err(err) => return Err(err),
    }
    repo.set_reference(POLICY_REF, Hash::ZERO);
    Ok(())
}

/// The full set of metadata envelopes and root keys of one policy state.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub root_envelope: Envelope,
    pub targets_envelope: Option<Envelope>,
    pub delegation_envelopes: BTreeMap<String, Envelope>,
    pub root_public_keys: Vec<Key>,
}

/// Load the state recorded by the RSL entry with the given ID.
pub fn load_state(
    repo: &Repository,
    rsl_entry_id: Hash,
) -> Result<State, GitTufError> {
    let entry = rsl::get_entry(repo, rsl_entry_id)?;
    load_state_for_entry(repo, &entry)
}

/// Load the currently active state: the one recorded by the latest RSL entry
/// for the policy ref.
pub fn load_current_state(
    repo: &Repository,
    token: &CancelToken,
) -> Result<State, GitTufError> {
    let (entry, _) = rsl::get_latest_reference_entry_for_ref(repo, POLICY_REF, token)?;
    load_state_for_entry(repo, &rsl::Entry::Reference(entry))
}

/// Load the state recorded by a specific RSL entry for the policy namespace.
pub fn load_state_for_entry(
    repo: &Repository,
    entry: &rsl::Entry,
) -> Result<State, GitTufError> {
    let entry = match entry {
        rsl::Entry::Reference(entry) => entry,
        rsl::Entry::Annotation(_) => return Err(GitTufError::NotRslEntry),
    };
    if entry.ref_name != POLICY_REF {
        return Err(GitTufError::RslEntryDoesNotMatchRef);
    }

    let policy_commit = repo.read_commit(entry.target_id)?;
    let root_tree = repo.read_tree(policy_commit.tree)?;

    let mut metadata_tree_id = None;
    let mut keys_tree_id = None;
    for tree_entry in &root_tree {
        match (tree_entry.name.as_str(), tree_entry.mode) {
            (METADATA_TREE_NAME, FileMode::Dir) => metadata_tree_id = Some(tree_entry.hash),
            (KEYS_TREE_NAME, FileMode::Dir) => keys_tree_id = Some(tree_entry.hash),
            _ => return Err(GitTufError::InvalidPolicyTree),
        }
    }
    let (Some(metadata_tree_id), Some(keys_tree_id)) = (metadata_tree_id, keys_tree_id) else {
        return Err(GitTufError::InvalidPolicyTree);
    };

    let mut root_envelope = None;
    let mut targets_envelope = None;
    let mut delegation_envelopes = BTreeMap::new();
    for tree_entry in repo.read_tree(metadata_tree_id)? {
        let contents = repo.read_blob(tree_entry.hash)?;
        let envelope: Envelope = serde_json::from_slice(&contents)?;
        match tree_entry.name.as_str() {
            "root.json" => root_envelope = Some(envelope),
            "targets.json" => targets_envelope = Some(envelope),
            name => {
                let name = name.strip_suffix(".json").unwrap_or(name);
                delegation_envelopes.insert(name.to_string(), envelope);
            }
        }
    }

    let mut root_public_keys = Vec::new();
    for tree_entry in repo.read_tree(keys_tree_id)? {
        let contents = repo.read_blob(tree_entry.hash)?;
        root_public_keys.push(Key::from_bytes(&contents)?);
    }

    let state = State {
        root_envelope: root_envelope
            .ok_or_else(|| GitTufError::MetadataNotFound("root.json".to_string()))?,
        targets_envelope,
        delegation_envelopes,
        root_public_keys,
    };
    state.verify()?;
    Ok(state)
}

/// Identify the policy that was in effect when `commit` was first recorded in
/// the RSL. Returns `Ok(None)` when the commit has never been recorded; which
/// policy applies then is the caller's decision, not an error.
pub fn get_state_for_commit(
    repo: &Repository,
    commit: Hash,
    token: &CancelToken,
) -> Result<Option<State>, GitTufError> {
    let first_seen = match rsl::get_first_reference_entry_for_commit(repo, commit, token) {
        Ok((entry, _)) => entry,
        Err(GitTufError::NoRecordOfCommit) => return Ok(None),
        Err(err) => return Err(err),
    };

    let (policy_entry, _) =
        rsl::get_latest_reference_entry_for_ref_before(repo, POLICY_REF, first_seen.id, token)?;
    load_state_for_entry(repo, &rsl::Entry::Reference(policy_entry)).map(Some)
}

impl State {
    /// Deserialized payload of the root envelope.
    pub fn get_root_metadata(&self) -> Result<RootMetadata, GitTufError> {
        self.root_envelope.decode_metadata()
    }

    /// Deserialized targets metadata for the top-level role or a delegation.
    pub fn get_targets_metadata(&self, role_name: &str) -> Result<TargetsMetadata, GitTufError> {
        let envelope = if role_name == TARGETS_ROLE_NAME {
            self.targets_envelope
                .as_ref()
                .ok_or_else(|| GitTufError::MetadataNotFound(role_name.to_string()))?
        } else {
            self.delegation_envelopes
                .get(role_name)
                .ok_or_else(|| GitTufError::MetadataNotFound(role_name.to_string()))?
        };
        envelope.decode_metadata()
    }

    /// Return true if the state carries metadata for the named targets role.
    pub fn has_targets_role(&self, role_name: &str) -> bool {
        if role_name == TARGETS_ROLE_NAME {
            return self.targets_envelope.is_some();
        }
        self.delegation_envelopes.contains_key(role_name)
    }

    /// All public keys declared anywhere in the state, keyed by ID.
    pub fn public_keys(&self) -> Result<BTreeMap<String, Key>, GitTufError> {
        let mut all_keys = BTreeMap::new();
        for key in &self.root_public_keys {
            all_keys.insert(key.key_id.clone(), key.clone());
        }
        for (key_id, key) in self.get_root_metadata()?.keys {
            all_keys.insert(key_id, key);
        }
        if self.targets_envelope.is_none() {
            return Ok(all_keys);
        }
        let mut role_names = vec![TARGETS_ROLE_NAME.to_string()];
        role_names.extend(self.delegation_envelopes.keys().cloned());
        for role_name in role_names {
            let metadata = self.get_targets_metadata(&role_name)?;
            if let Some(delegations) = metadata.delegations {
                for (key_id, key) in delegations.keys {
                    all_keys.insert(key_id, key);
                }
            }
        }
        Ok(all_keys)
    }

    fn verifiers_for_key_ids(
        key_ids: &[String],
        keys_by_id: &BTreeMap<String, Key>,
    ) -> Result<Vec<Box<dyn Verifier>>, GitTufError> {
        let mut verifiers = Vec::with_capacity(key_ids.len());
        for key_id in key_ids {
            let key = keys_by_id.get(key_id).ok_or_else(|| {
                GitTufError::InvalidMetadata(format!("undeclared key {key_id}"))
            })?;
            verifiers.push(verifier_for_key(key)?);
        }
        Ok(verifiers)
    }

    /// Self-contained verification of all metadata, starting from the root.
    ///
    /// 1. The root envelope must be signed by every bootstrapped root key.
    /// 2. The targets envelope must satisfy the root-declared targets role.
    /// 3. Every delegation envelope must satisfy the threshold its parent
    ///    declares, walking breadth-first with an accumulated key arena.
    ///
    /// A delegation envelope never reached by the walk is an error: metadata
    /// no delegation vouches for must not ride along in the policy tree.
    ///
    /// Verification reads the state and nothing else; it is idempotent.
    pub fn verify(&self) -> Result<(), GitTufError> {
        let mut root_verifiers = Vec::with_capacity(self.root_public_keys.len());
        for key in &self.root_public_keys {
            root_verifiers.push(verifier_for_key(key)?);
        }
        self.root_envelope
            .verify(&root_verifiers, self.root_public_keys.len())?;

        let Some(targets_envelope) = &self.targets_envelope else {
            return Ok(());
        };

        let root_metadata = self.get_root_metadata()?;
        root_metadata.validate()?;
        let targets_role = root_metadata
            .roles
            .get(TARGETS_ROLE_NAME)
            .ok_or_else(|| GitTufError::DelegationNotFound(TARGETS_ROLE_NAME.to_string()))?;
        let targets_verifiers =
            Self::verifiers_for_key_ids(&targets_role.key_ids, &root_metadata.keys)?;
        targets_envelope.verify(&targets_verifiers, targets_role.threshold)?;

        let targets_metadata: TargetsMetadata = targets_envelope.decode_metadata()?;
        targets_metadata.validate()?;

        if self.delegation_envelopes.is_empty() {
            return Ok(());
        }

        let Some(delegations) = &targets_metadata.delegations else {
            return Err(GitTufError::DanglingDelegationMetadata);
        };

        let mut remaining = self.delegation_envelopes.clone();
        let mut keys_by_id = delegations.keys.clone();
        let mut queue: VecDeque<Delegation> = delegations.roles.iter().cloned().collect();

        while let Some(delegation) = queue.pop_front() {
            let Some(envelope) = remaining.remove(&delegation.name) else {
                continue;
            };

            let verifiers = Self::verifiers_for_key_ids(&delegation.key_ids, &keys_by_id)?;
            envelope.verify(&verifiers, delegation.threshold)?;

            let metadata: TargetsMetadata = envelope.decode_metadata()?;
            metadata.validate()?;
            if let Some(sub) = metadata.delegations {
                for (key_id, key) in sub.keys {
                    keys_by_id.insert(key_id, key);
                }
                queue.extend(sub.roles);
            }
        }

        if !remaining.is_empty() {
            return Err(GitTufError::DanglingDelegationMetadata);
        }
        Ok(())
    }

    /// Resolve the keys trusted for a scoped path by walking the delegation
    /// tree in pre-order: a matching terminating delegation prunes its
    /// siblings, a matching non-terminating one splices its children ahead of
    /// the remaining siblings. An unprotected path resolves to no keys.
    pub fn find_public_keys_for_path(&self, path: &str) -> Result<Vec<Key>, GitTufError> {
        self.verify()?;

        let targets_metadata = self.get_targets_metadata(TARGETS_ROLE_NAME)?;
        let Some(delegations) = targets_metadata.delegations else {
            return Ok(Vec::new());
        };

        let mut keys_by_id = delegations.keys.clone();
        let mut queue: VecDeque<Delegation> =
            delegations.traversal_roles().iter().cloned().collect();
        let mut trusted = Vec::new();

        while let Some(delegation) = queue.pop_front() {
            if delegation.name == ALLOW_RULE_NAME {
                break;
            }
            if !delegation.matches(path) {
                continue;
            }

            for key_id in &delegation.key_ids {
                match keys_by_id.get(key_id) {
                    Some(key) => trusted.push(key.clone()),
                    None => log::warn!(
                        "delegation {} references undeclared key {key_id}",
                        delegation.name
                    ),
                }
            }

            if self.has_targets_role(&delegation.name) {
                let sub = self.get_targets_metadata(&delegation.name)?;
                if let Some(sub_delegations) = sub.delegations {
                    for (key_id, key) in sub_delegations.keys.clone() {
                        keys_by_id.insert(key_id, key);
                    }
                    let children = sub_delegations.traversal_roles().to_vec();
                    if delegation.terminating {
                        queue = children.into();
                    } else {
                        for child in children.into_iter().rev() {
                            queue.push_front(child);
                        }
                    }
                }
            }
        }

        Ok(trusted)
    }

    /// Identify the key IDs trusted to sign for a role: the root-declared sets
    /// for the top-level roles, a breadth-first search over delegation names
    /// otherwise.
    pub fn find_authorized_signing_key_ids(
        &self,
        role_name: &str,
    ) -> Result<Vec<String>, GitTufError> {
        self.verify()?;

        let root_metadata = self.get_root_metadata()?;
        if role_name == ROOT_ROLE_NAME || role_name == TARGETS_ROLE_NAME {
            return root_metadata
                .roles
                .get(role_name)
                .map(|role| role.key_ids.clone())
                .ok_or_else(|| GitTufError::DelegationNotFound(role_name.to_string()));
        }

        let targets_metadata = self.get_targets_metadata(TARGETS_ROLE_NAME)?;
        let Some(delegations) = targets_metadata.delegations else {
            return Err(GitTufError::DelegationNotFound(role_name.to_string()));
        };

        let mut queue: VecDeque<Delegation> = delegations.roles.iter().cloned().collect();
        while let Some(delegation) = queue.pop_front() {
            if delegation.name == role_name {
                return Ok(delegation.key_ids);
            }
            if self.has_targets_role(&delegation.name) {
                let sub = self.get_targets_metadata(&delegation.name)?;
                if let Some(sub_delegations) = sub.delegations {
                    queue.extend(sub_delegations.roles);
                }
            }
        }
        Err(GitTufError::DelegationNotFound(role_name.to_string()))
    }

    /// Verify and persist the state on the policy ref, then record the new
    /// tip in the RSL. The RSL append is the commit point: if it fails, the
    /// policy ref is reset to its prior value and the error propagates.
    pub fn commit(
        &self,
        repo: &mut Repository,
        message: &str,
        signer: Option<&dyn Signer>,
    ) -> Result<Hash, GitTufError> {
        self.verify()?;

        let message = if message.is_empty() {
            DEFAULT_COMMIT_MESSAGE
        } else {
            message
        };

        let mut metadata: BTreeMap<String, &Envelope> = BTreeMap::new();
        metadata.insert(ROOT_ROLE_NAME.to_string(), &self.root_envelope);
        if let Some(targets_envelope) = &self.targets_envelope {
            metadata.insert(TARGETS_ROLE_NAME.to_string(), targets_envelope);
        }
        for (name, envelope) in &self.delegation_envelopes {
            metadata.insert(name.clone(), envelope);
        }

        let mut metadata_entries = Vec::with_capacity(metadata.len());
        for (name, envelope) in metadata {
            let blob = repo.write_blob(&serde_json::to_vec(envelope)?);
            metadata_entries.push(TreeEntry::blob(format!("{name}.json"), blob));
        }
        let metadata_tree = repo.write_tree(metadata_entries)?;

        let mut keys_entries = Vec::with_capacity(self.root_public_keys.len());
        for key in &self.root_public_keys {
            let blob = repo.write_blob(&key.to_bytes()?);
            keys_entries.push(TreeEntry::blob(key.key_id.clone(), blob));
        }
        let keys_tree = repo.write_tree(keys_entries)?;

        let policy_tree = repo.write_tree(vec![
            TreeEntry::dir(METADATA_TREE_NAME, metadata_tree),
            TreeEntry::dir(KEYS_TREE_NAME, keys_tree),
        ])?;

        let original = match repo.reference(POLICY_REF) {
            Ok(hash) => hash,
            Err(GitTufError::ReferenceNotFound(_)) => Hash::ZERO,
            Err(err) => return Err(err),
        };

        let commit_id = repo.commit(policy_tree, POLICY_REF, message, signer)?;

        if let Err(err) = rsl::ReferenceEntry::new(POLICY_REF, commit_id).commit(repo, signer) {
            log::warn!("RSL append failed, resetting {POLICY_REF}");
            repo.set_reference(POLICY_REF, original);
            return Err(err);
        }

        Ok(commit_id)
    }
}
