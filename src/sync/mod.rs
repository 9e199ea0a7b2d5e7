//! Remote synchronization: moving objects and references between
//! repositories, gittuf refs included.
//!
//! Transfers are closure-complete: advertising a reference transfers every
//! object reachable from it that the peer lacks. Content-addressed objects
//! are safe to copy in any order; references move last, under fast-forward
//! and compare-and-set discipline on the receiving side.

use crate::cancel::CancelToken;
use crate::error::GitTufError;
use crate::git::{Hash, ObjectKind, Repository};
use crate::policy::POLICY_REF;
use crate::rsl::RSL_REF;
use crate::verify::verify_ref;

fn copy_reachable(
    src: &Repository,
    dst: &mut Repository,
    root: Hash,
) -> Result<(), GitTufError> {
    let mut queue = vec![root];
    while let Some(id) = queue.pop() {
        if dst.contains(id) {
            continue;
        }
        let raw = src
            .raw_object(id)
            .ok_or_else(|| GitTufError::ObjectNotFound(id.to_hex()))?;
        match raw.kind {
            ObjectKind::Commit => {
                let commit = src.read_commit(id)?;
                queue.push(commit.tree);
                queue.extend(commit.parents);
            }
            ObjectKind::Tree => {
                for entry in src.read_tree(id)? {
                    queue.push(entry.hash);
                }
            }
            ObjectKind::Blob => {}
        }
        dst.put_raw_object(raw.clone());
    }
    Ok(())
}

/// Fetch the given references and their object closure from `remote`,
/// updating the local references to the remote values.
pub fn fetch(
    local: &mut Repository,
    remote: &Repository,
    refs: &[&str],
) -> Result<(), GitTufError> {
    for name in refs {
        let target = remote.reference(name)?;
        if !target.is_zero() {
            copy_reachable(remote, local, target)?;
        }
        local.set_reference(name, target);
        log::debug!("fetched {name} at {}", target.to_hex());
    }
    Ok(())
}

/// Push the given references and their object closure to `remote`.
///
/// A reference that would not fast-forward on the remote is rejected with
/// `ConcurrentUpdate`; references already up to date are skipped without
/// error. The remote reference moves under compare-and-set against the value
/// observed at the start of the push.
pub fn push(
    local: &Repository,
    remote: &mut Repository,
    refs: &[&str],
) -> Result<(), GitTufError> {
    for name in refs {
        let target = local.reference(name)?;
        let remote_current = match remote.reference(name) {
            Ok(hash) => hash,
            Err(GitTufError::ReferenceNotFound(_)) => Hash::ZERO,
            Err(err) => return Err(err),
        };
        if remote_current == target {
            continue;
        }
        if !remote_current.is_zero() {
            let fast_forward = match local.is_ancestor(remote_current, target) {
                Ok(fast_forward) => fast_forward,
                Err(GitTufError::ObjectNotFound(_)) => false,
                Err(err) => return Err(err),
            };
            if !fast_forward {
                return Err(GitTufError::ConcurrentUpdate(name.to_string()));
            }
        }
        if !target.is_zero() {
            copy_reachable(local, remote, target)?;
        }
        remote.check_and_set_reference(name, target, remote_current)?;
        log::debug!("pushed {name} at {}", target.to_hex());
    }
    Ok(())
}

/// Push a branch together with the RSL and policy refs.
pub fn push_with_policy(
    local: &Repository,
    remote: &mut Repository,
    branch: &str,
) -> Result<(), GitTufError> {
    push(local, remote, &[branch, RSL_REF, POLICY_REF])
}

/// Fetch a branch together with the RSL and policy refs.
pub fn fetch_with_policy(
    local: &mut Repository,
    remote: &Repository,
    branch: &str,
) -> Result<(), GitTufError> {
    fetch(local, remote, &[branch, RSL_REF, POLICY_REF])
}

/// Clone-equivalent: build a fresh repository from `remote`, fetch the
/// initial branch plus the two gittuf refs, and fully verify the branch
/// before handing the repository out.
pub fn clone_and_verify(
    remote: &Repository,
    initial_branch: &str,
    token: &CancelToken,
) -> Result<Repository, GitTufError> {
    let mut local = Repository::new();
    fetch_with_policy(&mut local, remote, initial_branch)
        .map_err(|err| GitTufError::CloningFailed(err.to_string()))?;
    verify_ref(&local, initial_branch, true, token)?;
    Ok(local)
}
