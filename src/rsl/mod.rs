//! The Reference State Log.
//!
//! The RSL is an append-only ledger recording every authorized update to
//! every watched reference. Entries are ordinary Git commits on a dedicated
//! ref: each commit's single parent is the previous entry, its tree is always
//! the empty tree, and its message carries the entry in a stable key/value
//! form. Any Git client can replicate the log with a normal fetch or push.
//!
//! Two entry kinds exist: a [`ReferenceEntry`] records that a ref moved to a
//! target, an [`AnnotationEntry`] attaches a note to earlier entries and may
//! mark them as skipped. Skips are additive: once an entry is skipped, every
//! later verification ignores it.

use crate::cancel::CancelToken;
use crate::error::GitTufError;
use crate::git::{Commit, Hash, Repository};
use crate::sign::Signer;
use base64::Engine;
use std::collections::HashMap;

/// The Git namespace of the reference state log.
pub const RSL_REF: &str = "refs/gittuf/reference-state-log";

const REFERENCE_ENTRY_HEADER: &str = "RSL Reference Entry";
const ANNOTATION_ENTRY_HEADER: &str = "RSL Annotation Entry";
const BEGIN_MESSAGE: &str = "-----BEGIN MESSAGE-----";
const END_MESSAGE: &str = "-----END MESSAGE-----";

/// An entry in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Reference(ReferenceEntry),
    Annotation(AnnotationEntry),
}

impl Entry {
    /// The ID of the commit storing this entry.
    pub fn id(&self) -> Hash {
        match self {
            Entry::Reference(e) => e.id,
            Entry::Annotation(e) => e.id,
        }
    }
}

/// Records that a reference now points to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    /// Commit hash of the entry itself; zero until committed.
    pub id: Hash,
    pub ref_name: String,
    pub target_id: Hash,
}

impl ReferenceEntry {
    /// Stage a new reference entry. It only becomes part of the log on
    /// [`ReferenceEntry::commit`].
    pub fn new(ref_name: impl Into<String>, target_id: Hash) -> Self {
        ReferenceEntry {
            id: Hash::ZERO,
            ref_name: ref_name.into(),
            target_id,
        }
    }

    /// Append this entry to the log. The entry commit's single parent is the
    /// current head of the log; the log ref advances under compare-and-set.
    pub fn commit(
        &self,
        repo: &mut Repository,
        signer: Option<&dyn Signer>,
    ) -> Result<Hash, GitTufError> {
        let message = self.to_message();
        let tree = repo.empty_tree();
        repo.commit(tree, RSL_REF, &message, signer)
    }

    fn to_message(&self) -> String {
        format!(
            "{REFERENCE_ENTRY_HEADER}\n\nref: {}\ntarget: {}\n",
            self.ref_name,
            self.target_id.to_hex()
        )
    }

    /// Return true if any of the annotations marks this entry as skipped.
    pub fn is_skipped(&self, annotations: &[AnnotationEntry]) -> bool {
        annotations
            .iter()
            .any(|a| a.skip && a.refers_to(self.id))
    }
}

/// Attaches a note to one or more earlier entries, optionally marking them as
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    /// Commit hash of the entry itself; zero until committed.
    pub id: Hash,
    pub rsl_entry_ids: Vec<Hash>,
    pub skip: bool,
    pub message: String,
}

impl AnnotationEntry {
    /// Stage a new annotation for the given entries.
    pub fn new(rsl_entry_ids: Vec<Hash>, skip: bool, message: impl Into<String>) -> Self {
        AnnotationEntry {
            id: Hash::ZERO,
            rsl_entry_ids,
            skip,
            message: message.into(),
        }
    }

    /// Append this annotation to the log.
    ///
    /// # Errors
    ///
    /// An annotation referencing an ID that is not an existing RSL entry is
    /// invalid and is rejected before anything is written.
    pub fn commit(
        &self,
        repo: &mut Repository,
        signer: Option<&dyn Signer>,
    ) -> Result<Hash, GitTufError> {
        if self.rsl_entry_ids.is_empty() {
            return Err(GitTufError::InvalidMetadata(
                "annotation must reference at least one entry".to_string(),
            ));
        }
        for id in &self.rsl_entry_ids {
            get_entry(repo, *id)?;
        }
        let message = self.to_message();
        let tree = repo.empty_tree();
        repo.commit(tree, RSL_REF, &message, signer)
    }

    fn to_message(&self) -> String {
        let mut out = format!("{ANNOTATION_ENTRY_HEADER}\n\n");
        for id in &self.rsl_entry_ids {
            out.push_str(&format!("entry: {}\n", id.to_hex()));
        }
        out.push_str(&format!("skip: {}\n", self.skip));
        if !self.message.is_empty() {
            out.push_str(BEGIN_MESSAGE);
            out.push('\n');
            out.push_str(
                &base64::engine::general_purpose::STANDARD.encode(self.message.as_bytes()),
            );
            out.push('\n');
            out.push_str(END_MESSAGE);
            out.push('\n');
        }
        out
    }

    /// Return true if this annotation references the given entry.
    pub fn refers_to(&self, id: Hash) -> bool {
        self.rsl_entry_ids.contains(&id)
    }
}

fn parse_reference_entry(id: Hash, lines: &[&str]) -> Result<Entry, GitTufError> {
    let mut ref_name = None;
    let mut target_id = None;
    for line in lines {
        if let Some(rest) = line.strip_prefix("ref: ") {
            ref_name = Some(rest.to_string());
        } else if let Some(rest) = line.strip_prefix("target: ") {
            target_id = Some(Hash::from_hex(rest)?);
        } else if ref_name.is_some() && target_id.is_some() {
            // Known fields are terminated; tolerate unknown trailing fields.
            break;
        } else if !line.is_empty() {
            return Err(GitTufError::NotRslEntry);
        }
    }
    match (ref_name, target_id) {
        (Some(ref_name), Some(target_id)) => Ok(Entry::Reference(ReferenceEntry {
            id,
            ref_name,
            target_id,
        })),
        _ => Err(GitTufError::NotRslEntry),
    }
}

fn parse_annotation_entry(id: Hash, lines: &[&str]) -> Result<Entry, GitTufError> {
    let mut rsl_entry_ids = Vec::new();
    let mut skip = None;
    let mut message = String::new();

    let mut iter = lines.iter();
    while let Some(line) = iter.next() {
        if let Some(rest) = line.strip_prefix("entry: ") {
            rsl_entry_ids.push(Hash::from_hex(rest)?);
        } else if let Some(rest) = line.strip_prefix("skip: ") {
            skip = Some(match rest {
                "true" => true,
                "false" => false,
                _ => return Err(GitTufError::NotRslEntry),
            });
        } else if *line == BEGIN_MESSAGE {
            let mut encoded = String::new();
            for body in iter.by_ref() {
                if *body == END_MESSAGE {
                    break;
                }
                encoded.push_str(body);
            }
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|_| GitTufError::NotRslEntry)?;
            message = String::from_utf8(decoded).map_err(|_| GitTufError::NotRslEntry)?;
        } else if skip.is_some() {
            break;
        } else if !line.is_empty() {
            return Err(GitTufError::NotRslEntry);
        }
    }

    match skip {
        Some(skip) if !rsl_entry_ids.is_empty() => Ok(Entry::Annotation(AnnotationEntry {
            id,
            rsl_entry_ids,
            skip,
            message,
        })),
        _ => Err(GitTufError::NotRslEntry),
    }
}

fn parse_entry(id: Hash, commit: &Commit) -> Result<Entry, GitTufError> {
    let lines: Vec<&str> = commit.message.lines().collect();
    match lines.first() {
        Some(&REFERENCE_ENTRY_HEADER) => parse_reference_entry(id, &lines[1..]),
        Some(&ANNOTATION_ENTRY_HEADER) => parse_annotation_entry(id, &lines[1..]),
        _ => Err(GitTufError::NotRslEntry),
    }
}

/// Parse the commit at `id` into its entry variant.
pub fn get_entry(repo: &Repository, id: Hash) -> Result<Entry, GitTufError> {
    let commit = repo.read_commit(id)?;
    parse_entry(id, &commit)
}

/// The most recent entry in the log.
pub fn get_latest_entry(repo: &Repository) -> Result<Entry, GitTufError> {
    let head = repo.reference(RSL_REF)?;
    if head.is_zero() {
        return Err(GitTufError::RslEntryNotFound);
    }
    get_entry(repo, head)
}

/// The bootstrap entry: the oldest entry in the log.
pub fn get_first_entry(repo: &Repository, token: &CancelToken) -> Result<Entry, GitTufError> {
    let head = repo.reference(RSL_REF)?;
    if head.is_zero() {
        return Err(GitTufError::RslEntryNotFound);
    }
    let mut cursor = head;
    loop {
        token.check()?;
        match repo.read_commit(cursor)?.parents.first() {
            Some(parent) => cursor = *parent,
            None => return get_entry(repo, cursor),
        }
    }
}

/// The parent entry of the entry at `id`, or `None` for the bootstrap entry.
pub fn get_parent_entry(repo: &Repository, id: Hash) -> Result<Option<Entry>, GitTufError> {
    let commit = repo.read_commit(id)?;
    match commit.parents.first() {
        Some(parent) => Ok(Some(get_entry(repo, *parent)?)),
        None => Ok(None),
    }
}

fn walk_for_reference_entry(
    repo: &Repository,
    start: Hash,
    ref_name: &str,
    token: &CancelToken,
) -> Result<(ReferenceEntry, Vec<AnnotationEntry>), GitTufError> {
    let mut annotations: Vec<AnnotationEntry> = Vec::new();
    let mut cursor = Some(start);
    while let Some(id) = cursor {
        token.check()?;
        match get_entry(repo, id)? {
            Entry::Reference(entry) if entry.ref_name == ref_name => {
                let relevant = annotations
                    .into_iter()
                    .filter(|a| a.refers_to(entry.id))
                    .collect();
                return Ok((entry, relevant));
            }
            Entry::Reference(_) => {}
            Entry::Annotation(annotation) => annotations.push(annotation),
        }
        cursor = repo.read_commit(id)?.parents.first().copied();
    }
    Err(GitTufError::RslEntryNotFound)
}

/// Walk from the head of the log toward the bootstrap entry, returning the
/// first reference entry for `ref_name` along with the annotations that
/// reference it.
pub fn get_latest_reference_entry_for_ref(
    repo: &Repository,
    ref_name: &str,
    token: &CancelToken,
) -> Result<(ReferenceEntry, Vec<AnnotationEntry>), GitTufError> {
    let head = repo.reference(RSL_REF)?;
    if head.is_zero() {
        return Err(GitTufError::RslEntryNotFound);
    }
    walk_for_reference_entry(repo, head, ref_name, token)
}

/// Like [`get_latest_reference_entry_for_ref`], but start walking from the
/// parent of the entry at `before`.
pub fn get_latest_reference_entry_for_ref_before(
    repo: &Repository,
    ref_name: &str,
    before: Hash,
    token: &CancelToken,
) -> Result<(ReferenceEntry, Vec<AnnotationEntry>), GitTufError> {
    let commit = repo.read_commit(before)?;
    let start = commit
        .parents
        .first()
        .copied()
        .ok_or(GitTufError::RslEntryNotFound)?;
    walk_for_reference_entry(repo, start, ref_name, token)
}

fn all_entries_oldest_first(
    repo: &Repository,
    token: &CancelToken,
) -> Result<Vec<Entry>, GitTufError> {
    let head = repo.reference(RSL_REF)?;
    if head.is_zero() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    let mut cursor = Some(head);
    while let Some(id) = cursor {
        token.check()?;
        entries.push(get_entry(repo, id)?);
        cursor = repo.read_commit(id)?.parents.first().copied();
    }
    entries.reverse();
    Ok(entries)
}

fn annotation_index(entries: &[Entry]) -> HashMap<Hash, Vec<AnnotationEntry>> {
    let mut index: HashMap<Hash, Vec<AnnotationEntry>> = HashMap::new();
    for entry in entries {
        if let Entry::Annotation(annotation) = entry {
            for target in &annotation.rsl_entry_ids {
                index.entry(*target).or_default().push(annotation.clone());
            }
        }
    }
    index
}

/// Find the oldest reference entry whose target is `commit` or an ancestor of
/// it: the entry that first recorded the commit in the repository.
///
/// # Errors
///
/// `NoRecordOfCommit` when no entry records the commit.
pub fn get_first_reference_entry_for_commit(
    repo: &Repository,
    commit: Hash,
    token: &CancelToken,
) -> Result<(ReferenceEntry, Vec<AnnotationEntry>), GitTufError> {
    let entries = all_entries_oldest_first(repo, token)?;
    let annotations = annotation_index(&entries);
    for entry in &entries {
        token.check()?;
        if let Entry::Reference(reference) = entry {
            // A target object can be absent in a partial clone; an entry
            // whose history cannot be walked does not record the commit.
            let knows = match repo.knows_commit(reference.target_id, commit) {
                Ok(knows) => knows,
                Err(GitTufError::ObjectNotFound(_)) => false,
                Err(err) => return Err(err),
            };
            if knows {
                let relevant = annotations.get(&reference.id).cloned().unwrap_or_default();
                return Ok((reference.clone(), relevant));
            }
        }
    }
    Err(GitTufError::NoRecordOfCommit)
}

/// Return the reference entries between `first` and `last` inclusive, oldest
/// first, each with the annotations that reference it (wherever in the log
/// those annotations appear).
pub fn get_reference_entries_in_range(
    repo: &Repository,
    first: Hash,
    last: Hash,
    token: &CancelToken,
) -> Result<Vec<(ReferenceEntry, Vec<AnnotationEntry>)>, GitTufError> {
    let entries = all_entries_oldest_first(repo, token)?;
    let annotations = annotation_index(&entries);

    let first_idx = entries
        .iter()
        .position(|e| e.id() == first)
        .ok_or(GitTufError::RslEntryNotFound)?;
    let last_idx = entries
        .iter()
        .position(|e| e.id() == last)
        .ok_or(GitTufError::RslEntryNotFound)?;
    if last_idx < first_idx {
        return Err(GitTufError::RslEntryNotFound);
    }

    let mut result = Vec::new();
    for entry in &entries[first_idx..=last_idx] {
        if let Entry::Reference(reference) = entry {
            let relevant = annotations.get(&reference.id).cloned().unwrap_or_default();
            result.push((reference.clone(), relevant));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedTimeSource;

    fn test_repo() -> Repository {
        Repository::new().with_clock(FixedTimeSource::from_unix_secs(1704067200))
    }

    fn branch_commit(repo: &mut Repository, ref_name: &str, message: &str) -> Hash {
        let tree = repo.empty_tree();
        repo.commit(tree, ref_name, message, None).unwrap()
    }

    #[test]
    fn test_reference_entry_round_trip() {
        let mut repo = test_repo();
        let target = branch_commit(&mut repo, "refs/heads/main", "one");
        let id = ReferenceEntry::new("refs/heads/main", target)
            .commit(&mut repo, None)
            .unwrap();

        let entry = get_entry(&repo, id).unwrap();
        match entry {
            Entry::Reference(entry) => {
                assert_eq!(entry.id, id);
                assert_eq!(entry.ref_name, "refs/heads/main");
                assert_eq!(entry.target_id, target);
            }
            Entry::Annotation(_) => panic!("expected reference entry"),
        }
    }

    #[test]
    fn test_annotation_entry_round_trip() {
        let mut repo = test_repo();
        let target = branch_commit(&mut repo, "refs/heads/main", "one");
        let entry_id = ReferenceEntry::new("refs/heads/main", target)
            .commit(&mut repo, None)
            .unwrap();
        let annotation_id = AnnotationEntry::new(vec![entry_id], true, "bad entry")
            .commit(&mut repo, None)
            .unwrap();

        match get_entry(&repo, annotation_id).unwrap() {
            Entry::Annotation(annotation) => {
                assert_eq!(annotation.rsl_entry_ids, vec![entry_id]);
                assert!(annotation.skip);
                assert_eq!(annotation.message, "bad entry");
            }
            Entry::Reference(_) => panic!("expected annotation entry"),
        }
    }

    #[test]
    fn test_annotation_without_message() {
        let mut repo = test_repo();
        let target = branch_commit(&mut repo, "refs/heads/main", "one");
        let entry_id = ReferenceEntry::new("refs/heads/main", target)
            .commit(&mut repo, None)
            .unwrap();
        let annotation_id = AnnotationEntry::new(vec![entry_id], false, "")
            .commit(&mut repo, None)
            .unwrap();

        match get_entry(&repo, annotation_id).unwrap() {
            Entry::Annotation(annotation) => {
                assert!(!annotation.skip);
                assert!(annotation.message.is_empty());
            }
            Entry::Reference(_) => panic!("expected annotation entry"),
        }
    }

    #[test]
    fn test_annotation_rejects_unknown_entry() {
        let mut repo = test_repo();
        let bogus = branch_commit(&mut repo, "refs/heads/main", "not an rsl entry");
        let result = AnnotationEntry::new(vec![bogus], true, "").commit(&mut repo, None);
        assert!(matches!(result, Err(GitTufError::NotRslEntry)));
    }

    #[test]
    fn test_entries_form_linear_chain() {
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        let c2 = branch_commit(&mut repo, "refs/heads/main", "two");
        let e2 = ReferenceEntry::new("refs/heads/main", c2)
            .commit(&mut repo, None)
            .unwrap();

        // Bootstrap entry has no parent, every other entry exactly one.
        assert!(repo.read_commit(e1).unwrap().parents.is_empty());
        assert_eq!(repo.read_commit(e2).unwrap().parents, vec![e1]);

        match get_parent_entry(&repo, e2).unwrap() {
            Some(Entry::Reference(parent)) => assert_eq!(parent.id, e1),
            _ => panic!("expected parent reference entry"),
        }
        assert!(get_parent_entry(&repo, e1).unwrap().is_none());
    }

    #[test]
    fn test_non_rsl_commit_is_rejected() {
        let mut repo = test_repo();
        let ordinary = branch_commit(&mut repo, "refs/heads/main", "just a commit");
        assert!(matches!(
            get_entry(&repo, ordinary),
            Err(GitTufError::NotRslEntry)
        ));
    }

    #[test]
    fn test_parser_tolerates_unknown_trailing_fields() {
        let message = format!(
            "RSL Reference Entry\n\nref: refs/heads/main\ntarget: {}\nnumber: 7\n",
            Hash::ZERO.to_hex()
        );
        let mut repo = test_repo();
        let tree = repo.empty_tree();
        let id = repo.commit(tree, RSL_REF, &message, None).unwrap();
        match get_entry(&repo, id).unwrap() {
            Entry::Reference(entry) => assert_eq!(entry.ref_name, "refs/heads/main"),
            Entry::Annotation(_) => panic!("expected reference entry"),
        }
    }

    #[test]
    fn test_parser_rejects_unknown_leading_fields() {
        let message = "RSL Reference Entry\n\nnumber: 7\nref: refs/heads/main\n";
        let mut repo = test_repo();
        let tree = repo.empty_tree();
        let id = repo.commit(tree, RSL_REF, message, None).unwrap();
        assert!(matches!(
            get_entry(&repo, id),
            Err(GitTufError::NotRslEntry)
        ));
    }

    #[test]
    fn test_get_latest_entry() {
        let mut repo = test_repo();
        assert!(matches!(
            get_latest_entry(&repo),
            Err(GitTufError::ReferenceNotFound(_))
        ));

        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        assert_eq!(get_latest_entry(&repo).unwrap().id(), e1);
    }

    #[test]
    fn test_latest_reference_entry_for_ref() {
        let token = CancelToken::new();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        let c2 = branch_commit(&mut repo, "refs/heads/main", "two");
        let e2 = ReferenceEntry::new("refs/heads/main", c2)
            .commit(&mut repo, None)
            .unwrap();
        let feature = branch_commit(&mut repo, "refs/heads/feature", "feature work");
        ReferenceEntry::new("refs/heads/feature", feature)
            .commit(&mut repo, None)
            .unwrap();

        let (latest, annotations) =
            get_latest_reference_entry_for_ref(&repo, "refs/heads/main", &token).unwrap();
        assert_eq!(latest.id, e2);
        assert!(annotations.is_empty());

        let (before, _) =
            get_latest_reference_entry_for_ref_before(&repo, "refs/heads/main", e2, &token)
                .unwrap();
        assert_eq!(before.id, e1);

        let missing =
            get_latest_reference_entry_for_ref(&repo, "refs/heads/unknown", &token);
        assert!(matches!(missing, Err(GitTufError::RslEntryNotFound)));
    }

    #[test]
    fn test_annotations_attach_to_walked_entry() {
        let token = CancelToken::new();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        AnnotationEntry::new(vec![e1], true, "revoked")
            .commit(&mut repo, None)
            .unwrap();

        let (entry, annotations) =
            get_latest_reference_entry_for_ref(&repo, "refs/heads/main", &token).unwrap();
        assert_eq!(entry.id, e1);
        assert_eq!(annotations.len(), 1);
        assert!(entry.is_skipped(&annotations));
    }

    #[test]
    fn test_first_reference_entry_for_commit() {
        let token = CancelToken::new();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        let c2 = branch_commit(&mut repo, "refs/heads/main", "two");
        ReferenceEntry::new("refs/heads/main", c2)
            .commit(&mut repo, None)
            .unwrap();

        // c1 was first recorded by e1; c2 is a descendant of c1, so its first
        // record is the entry whose target knows it.
        let (first, _) = get_first_reference_entry_for_commit(&repo, c1, &token).unwrap();
        assert_eq!(first.id, e1);

        let unrecorded = branch_commit(&mut repo, "refs/heads/other", "dangling");
        let result = get_first_reference_entry_for_commit(&repo, unrecorded, &token);
        assert!(matches!(result, Err(GitTufError::NoRecordOfCommit)));
    }

    #[test]
    fn test_entries_in_range() {
        let token = CancelToken::new();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        let c2 = branch_commit(&mut repo, "refs/heads/main", "two");
        let e2 = ReferenceEntry::new("refs/heads/main", c2)
            .commit(&mut repo, None)
            .unwrap();
        let c3 = branch_commit(&mut repo, "refs/heads/main", "three");
        let e3 = ReferenceEntry::new("refs/heads/main", c3)
            .commit(&mut repo, None)
            .unwrap();
        // An annotation outside the range still attaches to e2.
        AnnotationEntry::new(vec![e2], true, "skip it")
            .commit(&mut repo, None)
            .unwrap();

        let range = get_reference_entries_in_range(&repo, e1, e3, &token).unwrap();
        assert_eq!(range.len(), 3);
        assert_eq!(range[0].0.id, e1);
        assert_eq!(range[1].0.id, e2);
        assert_eq!(range[2].0.id, e3);
        assert!(range[1].0.is_skipped(&range[1].1));
        assert!(!range[0].0.is_skipped(&range[0].1));
    }

    #[test]
    fn test_walks_respect_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();

        let result = get_latest_reference_entry_for_ref(&repo, "refs/heads/main", &token);
        assert!(matches!(result, Err(GitTufError::Cancelled)));
    }

    #[test]
    fn test_redundant_entry_is_appended() {
        // Appending an entry for a target the log already records is not an
        // error; the log simply grows by one redundant entry.
        let token = CancelToken::new();
        let mut repo = test_repo();
        let c1 = branch_commit(&mut repo, "refs/heads/main", "one");
        let e1 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        let e2 = ReferenceEntry::new("refs/heads/main", c1)
            .commit(&mut repo, None)
            .unwrap();
        assert_ne!(e1, e2);

        let (latest, _) =
            get_latest_reference_entry_for_ref(&repo, "refs/heads/main", &token).unwrap();
        assert_eq!(latest.id, e2);
        assert_eq!(latest.target_id, c1);
    }
}
