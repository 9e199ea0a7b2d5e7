//! Git object store primitives.
//!
//! The verification engine treats Git as an external primitive: object lookup
//! by hash, references with compare-and-set semantics, blob/tree/commit
//! creation, and ancestry queries. [`Repository`] is the in-memory
//! implementation every higher layer goes through; content-addressed objects
//! are append-only, references are the only mutable state.

mod changes;
mod object;

pub use changes::changed_paths_between;
pub use object::{
    decode_tree, encode_tree, hash_object, Commit, FileMode, Hash, Identity, ObjectKind, TreeEntry,
};

use crate::error::GitTufError;
use crate::sign::Signer;
use crate::time::{SystemTimeSource, TimeSource};
use crate::tuf::Key;
use std::collections::{BTreeMap, HashMap};

/// Committer identity used for commits created by this repository handle.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub user_name: String,
    pub user_email: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            user_name: "gittuf".to_string(),
            user_email: "gittuf@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

/// An in-memory Git repository: a content-addressed object store plus named
/// references.
pub struct Repository {
    config: RepositoryConfig,
    clock: Box<dyn TimeSource>,
    objects: HashMap<Hash, RawObject>,
    refs: BTreeMap<String, Hash>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("objects", &self.objects)
            .field("refs", &self.refs)
            .finish()
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository {
    /// Create an empty repository with the default identity and system clock.
    pub fn new() -> Self {
        Repository {
            config: RepositoryConfig::default(),
            clock: Box::new(SystemTimeSource),
            objects: HashMap::new(),
            refs: BTreeMap::new(),
        }
    }

    /// Create an empty repository with the given committer identity.
    pub fn with_config(config: RepositoryConfig) -> Self {
        Repository {
            config,
            ..Self::new()
        }
    }

    /// Replace the injected clock. Commit timestamps and metadata expirations
    /// are derived from it.
    pub fn with_clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The repository's clock.
    pub fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    fn write_object(&mut self, kind: ObjectKind, data: Vec<u8>) -> Hash {
        let id = hash_object(kind, &data);
        self.objects.entry(id).or_insert(RawObject { kind, data });
        id
    }

    fn read_object(&self, id: Hash, kind: ObjectKind) -> Result<&RawObject, GitTufError> {
        let obj = self
            .objects
            .get(&id)
            .ok_or_else(|| GitTufError::ObjectNotFound(id.to_hex()))?;
        if obj.kind != kind {
            return Err(GitTufError::MalformedObject(format!(
                "object {} is a {}, expected {}",
                id.to_hex(),
                obj.kind.as_str(),
                kind.as_str()
            )));
        }
        Ok(obj)
    }

    /// Return true if the object exists in the store.
    pub fn contains(&self, id: Hash) -> bool {
        self.objects.contains_key(&id)
    }

    /// Store a blob, returning its ID.
    pub fn write_blob(&mut self, data: &[u8]) -> Hash {
        self.write_object(ObjectKind::Blob, data.to_vec())
    }

    /// Read a blob's contents.
    pub fn read_blob(&self, id: Hash) -> Result<Vec<u8>, GitTufError> {
        Ok(self.read_object(id, ObjectKind::Blob)?.data.clone())
    }

    /// Store a tree from the given entries, returning its ID.
    pub fn write_tree(&mut self, entries: Vec<TreeEntry>) -> Result<Hash, GitTufError> {
        let body = encode_tree(entries)?;
        Ok(self.write_object(ObjectKind::Tree, body))
    }

    /// Read a tree's entries, in Git order.
    pub fn read_tree(&self, id: Hash) -> Result<Vec<TreeEntry>, GitTufError> {
        decode_tree(&self.read_object(id, ObjectKind::Tree)?.data)
    }

    /// Store the empty tree, returning its well-known ID.
    pub fn empty_tree(&mut self) -> Hash {
        self.write_tree(Vec::new()).expect("empty tree is valid")
    }

    /// Store a commit object, returning its ID. The commit's references must
    /// already exist in the store.
    pub fn write_commit(&mut self, commit: &Commit) -> Result<Hash, GitTufError> {
        if !self.objects.contains_key(&commit.tree) {
            return Err(GitTufError::ObjectNotFound(commit.tree.to_hex()));
        }
        for parent in &commit.parents {
            if !self.objects.contains_key(parent) {
                return Err(GitTufError::ObjectNotFound(parent.to_hex()));
            }
        }
        Ok(self.write_object(ObjectKind::Commit, commit.encode()))
    }

    /// Read a commit object.
    pub fn read_commit(&self, id: Hash) -> Result<Commit, GitTufError> {
        Commit::decode(&self.read_object(id, ObjectKind::Commit)?.data)
    }

    pub(crate) fn raw_object(&self, id: Hash) -> Option<&RawObject> {
        self.objects.get(&id)
    }

    pub(crate) fn put_raw_object(&mut self, obj: RawObject) -> Hash {
        self.write_object(obj.kind, obj.data)
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Resolve a reference to its target hash.
    pub fn reference(&self, name: &str) -> Result<Hash, GitTufError> {
        self.refs
            .get(name)
            .copied()
            .ok_or_else(|| GitTufError::ReferenceNotFound(name.to_string()))
    }

    /// Set a reference unconditionally.
    pub fn set_reference(&mut self, name: &str, target: Hash) {
        self.refs.insert(name.to_string(), target);
    }

    /// Set a reference only if its current value matches `expected`. A missing
    /// reference compares equal to the zero hash.
    pub fn check_and_set_reference(
        &mut self,
        name: &str,
        target: Hash,
        expected: Hash,
    ) -> Result<(), GitTufError> {
        let current = self.refs.get(name).copied().unwrap_or(Hash::ZERO);
        if current != expected {
            return Err(GitTufError::ConcurrentUpdate(name.to_string()));
        }
        self.refs.insert(name.to_string(), target);
        Ok(())
    }

    /// Iterate over all references.
    pub fn references(&self) -> impl Iterator<Item = (&str, Hash)> {
        self.refs.iter().map(|(name, hash)| (name.as_str(), *hash))
    }

    // ------------------------------------------------------------------
    // Commit creation and verification
    // ------------------------------------------------------------------

    /// Create a commit on `target_ref` with the given tree and message,
    /// advancing the reference under compare-and-set semantics. A missing
    /// reference is bootstrapped at the zero hash.
    ///
    /// When `signer` is set, the canonical commit bytes are signed and the
    /// signature is attached before the object is written.
    pub fn commit(
        &mut self,
        tree: Hash,
        target_ref: &str,
        message: &str,
        signer: Option<&dyn Signer>,
    ) -> Result<Hash, GitTufError> {
        let current = match self.reference(target_ref) {
            Ok(hash) => hash,
            Err(GitTufError::ReferenceNotFound(_)) => {
                self.set_reference(target_ref, Hash::ZERO);
                Hash::ZERO
            }
            Err(err) => return Err(err),
        };

        let identity = Identity {
            name: self.config.user_name.clone(),
            email: self.config.user_email.clone(),
            timestamp: self.clock.now_unix()?,
        };
        let mut commit = Commit {
            tree,
            parents: if current.is_zero() {
                Vec::new()
            } else {
                vec![current]
            },
            author: identity.clone(),
            committer: identity,
            message: message.to_string(),
            signature: None,
        };

        if let Some(signer) = signer {
            let signature = signer.sign(&commit.canonical_bytes())?;
            commit.signature = Some(encode_signature(&signature));
        }

        let id = self.write_commit(&commit)?;
        self.check_and_set_reference(target_ref, id, current)?;
        Ok(id)
    }

    /// Verify the detached signature of a commit against a policy key.
    ///
    /// # Errors
    ///
    /// `MalformedSignature` if the commit is unsigned or undecodable,
    /// `BadSignature`/`ExpiredIdentity` per the verifier contract, and
    /// `UnknownSigningMethod` for key types without a wired verifier.
    pub fn verify_commit_signature(
        &self,
        commit: &Commit,
        key: &Key,
    ) -> Result<(), GitTufError> {
        let encoded = commit.signature.as_ref().ok_or_else(|| {
            GitTufError::MalformedSignature("commit carries no signature".to_string())
        })?;
        let signature = decode_signature(encoded)?;
        let verifier = crate::sign::verifier_for_key(key)?;
        verifier.verify(&commit.canonical_bytes(), &signature)
    }

    // ------------------------------------------------------------------
    // Ancestry
    // ------------------------------------------------------------------

    /// Return true if `ancestor` is `descendant` or reachable from it by
    /// following parents.
    pub fn is_ancestor(&self, ancestor: Hash, descendant: Hash) -> Result<bool, GitTufError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let mut queue = vec![descendant];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = queue.pop() {
            if !seen.insert(id) {
                continue;
            }
            let commit = self.read_commit(id)?;
            for parent in commit.parents {
                if parent == ancestor {
                    return Ok(true);
                }
                queue.push(parent);
            }
        }
        Ok(false)
    }

    /// Return true if `commit_id` has a path to `commit`: either they are the
    /// same commit or `commit` is an ancestor of `commit_id`.
    pub fn knows_commit(&self, commit_id: Hash, commit: Hash) -> Result<bool, GitTufError> {
        self.is_ancestor(commit, commit_id)
    }

    /// Collect every commit reachable from `newer` that is not reachable from
    /// `older` (when given), `newer` included. The result is ordered oldest
    /// first by commit timestamp, ties broken by ID.
    pub fn commits_between(
        &self,
        newer: Hash,
        older: Option<Hash>,
    ) -> Result<Vec<Hash>, GitTufError> {
        let mut excluded = std::collections::HashSet::new();
        if let Some(older) = older {
            let mut queue = vec![older];
            while let Some(id) = queue.pop() {
                if !excluded.insert(id) {
                    continue;
                }
                queue.extend(self.read_commit(id)?.parents);
            }
        }

        let mut result = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut queue = vec![newer];
        while let Some(id) = queue.pop() {
            if excluded.contains(&id) || !seen.insert(id) {
                continue;
            }
            let commit = self.read_commit(id)?;
            queue.extend(commit.parents.iter().copied());
            result.push((commit.committer.timestamp, id));
        }

        result.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(result.into_iter().map(|(_, id)| id).collect())
    }

    /// Enumerate the repository-relative paths changed by a commit, relative
    /// to its first parent. A parentless commit changes every path it carries.
    pub fn changed_paths(&self, commit_id: Hash) -> Result<Vec<String>, GitTufError> {
        let commit = self.read_commit(commit_id)?;
        let parent_tree = match commit.parents.first() {
            Some(parent) => Some(self.read_commit(*parent)?.tree),
            None => None,
        };
        changed_paths_between(self, parent_tree, commit.tree)
    }
}

/// Encode raw signature bytes into the form stored under the commit's
/// signature header.
pub fn encode_signature(signature: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(signature)
}

/// Decode a stored commit signature back into raw bytes.
pub fn decode_signature(encoded: &str) -> Result<Vec<u8>, GitTufError> {
    use base64::Engine;
    let joined: String = encoded.split_whitespace().collect();
    base64::engine::general_purpose::STANDARD
        .decode(joined.as_bytes())
        .map_err(|e| GitTufError::MalformedSignature(e.to_string()))
}
