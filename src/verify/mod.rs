//! The verification engine.
//!
//! Given a reference and its current target, verification walks the RSL chain
//! for the reference and checks, for every recorded advancement, that each
//! commit introduced by it was signed by a key the then-active policy trusts
//! for every path the commit changed. Each entry is judged against the policy
//! in effect when it was recorded, never a later one.
//!
//! Failures are typed and identify, in order of specificity, the reference,
//! the RSL entry, the commit, and the path that failed, together with the
//! cause.

use crate::cancel::CancelToken;
use crate::error::{FailureCause, GitTufError};
use crate::git::{Hash, Repository};
use crate::policy;
use crate::rsl;
use crate::rsl::{AnnotationEntry, ReferenceEntry};

fn failure(
    ref_name: &str,
    entry_id: Hash,
    commit_id: Hash,
    path: Option<String>,
    cause: FailureCause,
) -> GitTufError {
    GitTufError::UnauthorizedSignature {
        ref_name: ref_name.to_string(),
        entry_id: entry_id.to_hex(),
        commit_id: commit_id.to_hex(),
        path,
        cause,
    }
}

/// Verify that the current state of `ref_name` is justified by the RSL and
/// the policy.
///
/// The reference's target must match its latest RSL entry. With `full`, every
/// unskipped entry for the reference is verified back to the bootstrap of the
/// log; otherwise only the advancement recorded by the latest entry is.
pub fn verify_ref(
    repo: &Repository,
    ref_name: &str,
    full: bool,
    token: &CancelToken,
) -> Result<(), GitTufError> {
    let target = repo.reference(ref_name)?;

    let (latest_entry, annotations) =
        match rsl::get_latest_reference_entry_for_ref(repo, ref_name, token) {
            Ok(found) => found,
            Err(GitTufError::RslEntryNotFound) => {
                return Err(failure(
                    ref_name,
                    Hash::ZERO,
                    target,
                    None,
                    FailureCause::MissingRslEntry,
                ))
            }
            Err(err) => return Err(err),
        };
    if latest_entry.target_id != target {
        return Err(GitTufError::RslEntryDoesNotMatchRef);
    }
    if latest_entry.is_skipped(&annotations) {
        return Err(failure(
            ref_name,
            latest_entry.id,
            target,
            None,
            FailureCause::SkippedEntryReferenced,
        ));
    }

    if full {
        let first = rsl::get_first_entry(repo, token)?;
        verify_relative_for_ref(repo, first.id(), latest_entry.id, ref_name, token)
    } else {
        let prev_target = previous_unskipped_target(repo, ref_name, latest_entry.id, token)?;
        verify_entry(repo, ref_name, prev_target, &latest_entry, token)
    }
}

/// Verify every unskipped entry for `ref_name` in the inclusive RSL range
/// `first..=last`, oldest first. Each advancement is checked with the policy
/// in effect at its own entry.
pub fn verify_relative_for_ref(
    repo: &Repository,
    first: Hash,
    last: Hash,
    ref_name: &str,
    token: &CancelToken,
) -> Result<(), GitTufError> {
    let range = rsl::get_reference_entries_in_range(repo, first, last, token)?;
    let mut prev_target: Option<Hash> = None;
    for (entry, annotations) in &range {
        token.check()?;
        if entry.ref_name != ref_name {
            continue;
        }
        if entry.is_skipped(annotations) {
            log::debug!("skipping RSL entry {} for {ref_name}", entry.id.to_hex());
            continue;
        }
        verify_entry(repo, ref_name, prev_target, entry, token)?;
        prev_target = Some(entry.target_id);
    }
    Ok(())
}

fn previous_unskipped_target(
    repo: &Repository,
    ref_name: &str,
    from: Hash,
    token: &CancelToken,
) -> Result<Option<Hash>, GitTufError> {
    let mut cursor = from;
    loop {
        match rsl::get_latest_reference_entry_for_ref_before(repo, ref_name, cursor, token) {
            Ok((entry, annotations)) => {
                if entry.is_skipped(&annotations) {
                    cursor = entry.id;
                    continue;
                }
                return Ok(Some(entry.target_id));
            }
            Err(GitTufError::RslEntryNotFound) => return Ok(None),
            Err(err) => return Err(err),
        }
    }
}

/// Verify one recorded advancement of `ref_name`: every commit between the
/// previous recorded target and the entry's target, judged with the policy in
/// effect at the entry, plus the entry-level authorization for the reference
/// itself.
fn verify_entry(
    repo: &Repository,
    ref_name: &str,
    prev_target: Option<Hash>,
    entry: &ReferenceEntry,
    token: &CancelToken,
) -> Result<(), GitTufError> {
    let state = match policy_state_for_entry(repo, entry, token) {
        Ok(state) => state,
        Err(GitTufError::RslEntryNotFound) => {
            return Err(failure(
                ref_name,
                entry.id,
                entry.target_id,
                None,
                FailureCause::PolicyVerificationFailed,
            ))
        }
        Err(err) => return Err(err),
    };

    verify_entry_authorization(repo, ref_name, entry, &state)?;

    for commit_id in repo.commits_between(entry.target_id, prev_target)? {
        token.check()?;
        let commit = repo.read_commit(commit_id)?;
        for path in repo.changed_paths(commit_id)? {
            let trusted = state.find_public_keys_for_path(&format!("file:{path}"))?;
            if trusted.is_empty() {
                continue;
            }
            if commit.signature.is_none() {
                return Err(failure(
                    ref_name,
                    entry.id,
                    commit_id,
                    Some(path),
                    FailureCause::Unsigned,
                ));
            }
            let accepted = trusted
                .iter()
                .any(|key| repo.verify_commit_signature(&commit, key).is_ok());
            if !accepted {
                return Err(failure(
                    ref_name,
                    entry.id,
                    commit_id,
                    Some(path),
                    FailureCause::UnauthorizedPath,
                ));
            }
        }
    }
    Ok(())
}

/// The RSL entry itself must be signed by a key trusted for `git:<ref>`, when
/// the policy protects the reference.
fn verify_entry_authorization(
    repo: &Repository,
    ref_name: &str,
    entry: &ReferenceEntry,
    state: &policy::State,
) -> Result<(), GitTufError> {
    let trusted = state.find_public_keys_for_path(&format!("git:{ref_name}"))?;
    if trusted.is_empty() {
        return Ok(());
    }

    let entry_commit = repo.read_commit(entry.id)?;
    if entry_commit.signature.is_none() {
        return Err(failure(
            ref_name,
            entry.id,
            entry.target_id,
            None,
            FailureCause::Unsigned,
        ));
    }
    let accepted = trusted
        .iter()
        .any(|key| repo.verify_commit_signature(&entry_commit, key).is_ok());
    if !accepted {
        return Err(failure(
            ref_name,
            entry.id,
            entry.target_id,
            None,
            FailureCause::WrongKey,
        ));
    }
    Ok(())
}

/// The policy state in effect at `entry`: the latest policy-ref entry
/// strictly before it.
fn policy_state_for_entry(
    repo: &Repository,
    entry: &ReferenceEntry,
    token: &CancelToken,
) -> Result<policy::State, GitTufError> {
    let (policy_entry, _): (ReferenceEntry, Vec<AnnotationEntry>) =
        rsl::get_latest_reference_entry_for_ref_before(repo, policy::POLICY_REF, entry.id, token)?;
    policy::load_state_for_entry(repo, &rsl::Entry::Reference(policy_entry))
}
