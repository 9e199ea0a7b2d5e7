//! End-to-end exercises of the RSL, policy, verification, and sync pipeline.

use gittuf::cancel::CancelToken;
use gittuf::dsse::Envelope;
use gittuf::git::{Hash, Repository, TreeEntry};
use gittuf::policy::{
    add_or_update_delegation, add_targets_key, delete_targets_key, initialize_namespace,
    initialize_root_metadata, initialize_targets_metadata, State, POLICY_REF,
};
use gittuf::rsl;
use gittuf::sign::{Ed25519Signer, Signer};
use gittuf::sync;
use gittuf::time::FixedTimeSource;
use gittuf::tuf::{RootMetadata, ROOT_ROLE_NAME, TARGETS_ROLE_NAME};
use gittuf::verify::verify_ref;
use gittuf::{FailureCause, GitTufError};
use std::collections::BTreeMap;

const MAIN: &str = "refs/heads/main";

fn root_signer() -> Ed25519Signer {
    Ed25519Signer::from_seed(&[21u8; 32]).unwrap()
}

fn dev_signer() -> Ed25519Signer {
    Ed25519Signer::from_seed(&[22u8; 32]).unwrap()
}

fn second_dev_signer() -> Ed25519Signer {
    Ed25519Signer::from_seed(&[23u8; 32]).unwrap()
}

fn new_repo() -> Repository {
    Repository::new().with_clock(FixedTimeSource::from_unix_secs(1704067200))
}

/// Build and commit a policy protecting the main branch and src/** with the
/// given developer key.
fn commit_policy(repo: &mut Repository, dev: &Ed25519Signer) -> State {
    let root = root_signer();
    let mut root_metadata: RootMetadata =
        initialize_root_metadata(&root.public_key(), repo.clock()).unwrap();
    add_targets_key(&mut root_metadata, &root.public_key());
    let mut root_envelope = Envelope::from_metadata(&root_metadata).unwrap();
    root_envelope.sign(&root).unwrap();

    let mut targets_metadata = initialize_targets_metadata(repo.clock()).unwrap();
    add_or_update_delegation(
        &mut targets_metadata,
        "protect-main",
        &[dev.public_key()],
        vec![format!("git:{MAIN}")],
    )
    .unwrap();
    add_or_update_delegation(
        &mut targets_metadata,
        "protect-src",
        &[dev.public_key()],
        vec!["file:src/**".to_string()],
    )
    .unwrap();
    let mut targets_envelope = Envelope::from_metadata(&targets_metadata).unwrap();
    targets_envelope.sign(&root).unwrap();

    let state = State {
        root_envelope,
        targets_envelope: Some(targets_envelope),
        delegation_envelopes: BTreeMap::new(),
        root_public_keys: vec![root.public_key()],
    };
    state.commit(repo, "Update policy", None).unwrap();
    state
}

fn commit_file(
    repo: &mut Repository,
    path: &str,
    content: &str,
    signer: Option<&Ed25519Signer>,
) -> Hash {
    let blob = repo.write_blob(content.as_bytes());
    let tree = match path.split_once('/') {
        Some((dir, file)) => {
            let sub = repo.write_tree(vec![TreeEntry::blob(file, blob)]).unwrap();
            repo.write_tree(vec![TreeEntry::dir(dir, sub)]).unwrap()
        }
        None => repo.write_tree(vec![TreeEntry::blob(path, blob)]).unwrap(),
    };
    repo.commit(
        tree,
        MAIN,
        &format!("Update {path}"),
        signer.map(|s| s as &dyn Signer),
    )
    .unwrap()
}

fn record_main(repo: &mut Repository, target: Hash, signer: Option<&Ed25519Signer>) -> Hash {
    rsl::ReferenceEntry::new(MAIN, target)
        .commit(repo, signer.map(|s| s as &dyn Signer))
        .unwrap()
}

#[test]
fn test_root_key_bootstrap_lifecycle() {
    let clock = FixedTimeSource::from_unix_secs(1704067200);
    let root_key = root_signer().public_key();
    let t1 = dev_signer().public_key();
    let t2 = second_dev_signer().public_key();

    let mut root = initialize_root_metadata(&root_key, &clock).unwrap();
    assert_eq!(root.version, 1);
    assert_eq!(root.roles[ROOT_ROLE_NAME].key_ids, vec![root_key.key_id.clone()]);
    assert_eq!(root.roles[ROOT_ROLE_NAME].threshold, 1);

    add_targets_key(&mut root, &t1);
    add_targets_key(&mut root, &t2);
    assert_eq!(
        root.roles[TARGETS_ROLE_NAME].key_ids,
        vec![t1.key_id.clone(), t2.key_id.clone()]
    );

    delete_targets_key(&mut root, &t1.key_id).unwrap();
    let before = root.clone();
    let result = delete_targets_key(&mut root, &t2.key_id);
    assert!(matches!(result, Err(GitTufError::CannotMeetThreshold)));
    assert_eq!(root, before);
}

#[test]
fn test_policy_namespace_initialization() {
    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    assert!(repo.reference(POLICY_REF).unwrap().is_zero());

    // Re-initializing a still-zero namespace is a no-op.
    initialize_namespace(&mut repo).unwrap();

    commit_policy(&mut repo, &dev_signer());
    assert!(matches!(
        initialize_namespace(&mut repo),
        Err(GitTufError::PolicyExists)
    ));
}

#[test]
fn test_rsl_chain_queries() {
    let token = CancelToken::new();
    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    commit_policy(&mut repo, &dev_signer());

    let c1 = commit_file(&mut repo, "src/lib.rs", "one", Some(&dev_signer()));
    let e1 = record_main(&mut repo, c1, Some(&dev_signer()));
    let c2 = commit_file(&mut repo, "src/lib.rs", "two", Some(&dev_signer()));
    let e2 = record_main(&mut repo, c2, Some(&dev_signer()));

    let (latest, _) = rsl::get_latest_reference_entry_for_ref(&repo, MAIN, &token).unwrap();
    assert_eq!(latest.id, e2);
    assert_eq!(latest.target_id, c2);

    // c2 is a child of c1: c2 is not reachable from e1's target, so e2 is
    // the entry that first recorded it. c1 itself was first recorded by e1.
    let (first_for_c2, _) =
        rsl::get_first_reference_entry_for_commit(&repo, c2, &token).unwrap();
    assert_eq!(first_for_c2.id, e2);
    let (first_for_c1, _) =
        rsl::get_first_reference_entry_for_commit(&repo, c1, &token).unwrap();
    assert_eq!(first_for_c1.id, e1);
}

#[test]
fn test_policy_commit_linkage() {
    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    commit_policy(&mut repo, &dev_signer());

    let policy_commit = repo.reference(POLICY_REF).unwrap();
    let rsl_head = repo.reference(rsl::RSL_REF).unwrap();
    match rsl::get_entry(&repo, rsl_head).unwrap() {
        rsl::Entry::Reference(entry) => {
            assert_eq!(entry.ref_name, POLICY_REF);
            assert_eq!(entry.target_id, policy_commit);
        }
        rsl::Entry::Annotation(_) => panic!("expected reference entry"),
    }
}

#[test]
fn test_lifecycle_verify_push_clone() {
    let token = CancelToken::new();
    let dev = dev_signer();

    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    commit_policy(&mut repo, &dev);

    let c1 = commit_file(&mut repo, "src/lib.rs", "fn lib() {}", Some(&dev));
    record_main(&mut repo, c1, Some(&dev));
    let c2 = commit_file(&mut repo, "src/main.rs", "fn main() {}", Some(&dev));
    record_main(&mut repo, c2, Some(&dev));

    verify_ref(&repo, MAIN, true, &token).unwrap();

    // Publish to a remote, then clone-and-verify from it.
    let mut origin = new_repo();
    sync::push_with_policy(&repo, &mut origin, MAIN).unwrap();
    let clone = sync::clone_and_verify(&origin, MAIN, &token).unwrap();
    assert_eq!(clone.reference(MAIN).unwrap(), c2);
    verify_ref(&clone, MAIN, true, &token).unwrap();

    // An unauthorized update on the origin is caught by the next clone.
    let rogue = second_dev_signer();
    let mut tampered = sync::clone_and_verify(&origin, MAIN, &token).unwrap();
    let c3 = commit_file(&mut tampered, "src/evil.rs", "fn evil() {}", Some(&rogue));
    record_main(&mut tampered, c3, Some(&rogue));
    sync::push_with_policy(&tampered, &mut origin, MAIN).unwrap();

    // The rogue key signed the RSL entry for a protected ref; entry-level
    // authorization rejects it before any commit is inspected.
    let result = sync::clone_and_verify(&origin, MAIN, &token);
    match result {
        Err(GitTufError::UnauthorizedSignature { cause, .. }) => {
            assert_eq!(cause, FailureCause::WrongKey);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_policy_rotation_keeps_first_seen_semantics() {
    let token = CancelToken::new();
    let dev1 = dev_signer();
    let dev2 = second_dev_signer();

    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    let first_state = commit_policy(&mut repo, &dev1);

    // Work recorded under the first policy.
    let c1 = commit_file(&mut repo, "src/lib.rs", "era one", Some(&dev1));
    record_main(&mut repo, c1, Some(&dev1));

    // Rotate the developer key.
    let root = root_signer();
    let mut second_state = first_state.clone();
    let mut targets_metadata = second_state
        .get_targets_metadata(TARGETS_ROLE_NAME)
        .unwrap();
    add_or_update_delegation(
        &mut targets_metadata,
        "protect-main",
        &[dev2.public_key()],
        vec![format!("git:{MAIN}")],
    )
    .unwrap();
    add_or_update_delegation(
        &mut targets_metadata,
        "protect-src",
        &[dev2.public_key()],
        vec!["file:src/**".to_string()],
    )
    .unwrap();
    let mut targets_envelope = Envelope::from_metadata(&targets_metadata).unwrap();
    targets_envelope.sign(&root).unwrap();
    second_state.targets_envelope = Some(targets_envelope);
    second_state.commit(&mut repo, "Rotate keys", None).unwrap();

    // Work recorded under the second policy, by the new key.
    let c2 = commit_file(&mut repo, "src/lib.rs", "era two", Some(&dev2));
    record_main(&mut repo, c2, Some(&dev2));

    // Full verification spans both eras: the old commit is judged with the
    // policy in effect when it was recorded, the new one with the rotated
    // policy.
    verify_ref(&repo, MAIN, true, &token).unwrap();

    // First-seen semantics: c1's state is still the first policy.
    let state = gittuf::policy::get_state_for_commit(&repo, c1, &token)
        .unwrap()
        .unwrap();
    assert_eq!(state, first_state);
    let state = gittuf::policy::get_state_for_commit(&repo, c2, &token)
        .unwrap()
        .unwrap();
    assert_eq!(state, second_state);
}

#[test]
fn test_skip_annotation_heals_history() {
    let token = CancelToken::new();
    let dev = dev_signer();

    let mut repo = new_repo();
    initialize_namespace(&mut repo).unwrap();
    commit_policy(&mut repo, &dev);

    let good = commit_file(&mut repo, "src/lib.rs", "good", Some(&dev));
    record_main(&mut repo, good, Some(&dev));

    // An unauthorized advancement slips in.
    let rogue = second_dev_signer();
    let bad = commit_file(&mut repo, "src/lib.rs", "bad", Some(&rogue));
    let bad_entry = record_main(&mut repo, bad, Some(&rogue));
    assert!(verify_ref(&repo, MAIN, true, &token).is_err());

    // Skip the bad entry and rewind the branch to the good state.
    rsl::AnnotationEntry::new(vec![bad_entry], true, "unauthorized push")
        .commit(&mut repo, Some(&dev))
        .unwrap();
    repo.set_reference(MAIN, good);
    record_main(&mut repo, good, Some(&dev));

    verify_ref(&repo, MAIN, true, &token).unwrap();
}
