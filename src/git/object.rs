//! Git object model: hashes, trees, commits, and their wire encodings.
//!
//! Objects are encoded exactly the way Git encodes them (`<kind> <len>\0` +
//! body, SHA-1 object IDs) so a log or policy ref written here can be
//! replicated by any Git client. The commit codec is also the single point
//! that defines what gets signed: [`Commit::canonical_bytes`] returns the
//! commit body with the signature header stripped.

use crate::error::GitTufError;
use sha1::{Digest, Sha1};
use std::fmt;

/// Identifier of an object in the repository: a 20-byte SHA-1.
///
/// The all-zero value is reserved; it marks an uninitialized reference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 20]);

impl Hash {
    /// The distinguished zero hash.
    pub const ZERO: Hash = Hash([0u8; 20]);

    /// Return true if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Hash(bytes)
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, GitTufError> {
        let decoded = hex::decode(s)
            .map_err(|_| GitTufError::MalformedObject(format!("invalid object ID '{s}'")))?;
        let bytes: [u8; 20] = decoded
            .try_into()
            .map_err(|_| GitTufError::MalformedObject(format!("invalid object ID '{s}'")))?;
        Ok(Hash(bytes))
    }

    /// Hex representation of the hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes of the hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

/// The kind of an object in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

/// Compute the object ID of a body under the given kind.
pub fn hash_object(kind: ObjectKind, body: &[u8]) -> Hash {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(body.len().to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest);
    Hash(bytes)
}

/// File mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    Dir,
}

impl FileMode {
    fn as_octal(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Dir => "40000",
        }
    }

    fn from_octal(s: &str) -> Result<Self, GitTufError> {
        match s {
            "100644" => Ok(FileMode::Regular),
            "40000" => Ok(FileMode::Dir),
            other => Err(GitTufError::MalformedObject(format!(
                "unsupported tree entry mode '{other}'"
            ))),
        }
    }
}

/// A single row of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub mode: FileMode,
    pub hash: Hash,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, hash: Hash) -> Self {
        TreeEntry {
            name: name.into(),
            mode: FileMode::Regular,
            hash,
        }
    }

    pub fn dir(name: impl Into<String>, hash: Hash) -> Self {
        TreeEntry {
            name: name.into(),
            mode: FileMode::Dir,
            hash,
        }
    }

    // Git orders tree entries as if directory names carried a trailing slash.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode == FileMode::Dir {
            key.push(b'/');
        }
        key
    }
}

/// Encode tree entries into the tree object body. Entries are sorted into Git
/// order; duplicate names are rejected.
pub fn encode_tree(mut entries: Vec<TreeEntry>) -> Result<Vec<u8>, GitTufError> {
    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    for pair in entries.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(GitTufError::MalformedObject(format!(
                "duplicate tree entry '{}'",
                pair[0].name
            )));
        }
    }

    let mut body = Vec::new();
    for entry in &entries {
        if entry.name.is_empty() || entry.name.contains('\0') || entry.name.contains('/') {
            return Err(GitTufError::MalformedObject(format!(
                "invalid tree entry name '{}'",
                entry.name
            )));
        }
        body.extend_from_slice(entry.mode.as_octal().as_bytes());
        body.push(b' ');
        body.extend_from_slice(entry.name.as_bytes());
        body.push(0);
        body.extend_from_slice(entry.hash.as_bytes());
    }
    Ok(body)
}

/// Decode a tree object body.
pub fn decode_tree(body: &[u8]) -> Result<Vec<TreeEntry>, GitTufError> {
    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| GitTufError::MalformedObject("truncated tree entry".to_string()))?;
        let mode = std::str::from_utf8(&rest[..space])
            .map_err(|_| GitTufError::MalformedObject("non-UTF-8 tree mode".to_string()))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitTufError::MalformedObject("truncated tree entry".to_string()))?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| GitTufError::MalformedObject("non-UTF-8 tree entry name".to_string()))?
            .to_string();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            return Err(GitTufError::MalformedObject(
                "truncated tree entry hash".to_string(),
            ));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&rest[..20]);
        rest = &rest[20..];

        entries.push(TreeEntry {
            name,
            mode: FileMode::from_octal(mode)?,
            hash: Hash::from_bytes(hash),
        });
    }
    Ok(entries)
}

/// Author or committer identity line of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    /// Unix timestamp, seconds. The timezone is always recorded as +0000.
    pub timestamp: u64,
}

impl Identity {
    fn encode(&self) -> String {
        format!("{} <{}> {} +0000", self.name, self.email, self.timestamp)
    }

    fn decode(line: &str) -> Result<Self, GitTufError> {
        let open = line
            .rfind(" <")
            .ok_or_else(|| GitTufError::MalformedObject(format!("invalid identity '{line}'")))?;
        let close = line
            .rfind("> ")
            .ok_or_else(|| GitTufError::MalformedObject(format!("invalid identity '{line}'")))?;
        if close < open {
            return Err(GitTufError::MalformedObject(format!(
                "invalid identity '{line}'"
            )));
        }

        let name = line[..open].to_string();
        let email = line[open + 2..close].to_string();
        let mut when = line[close + 2..].split_whitespace();
        let timestamp: u64 = when
            .next()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| GitTufError::MalformedObject(format!("invalid identity '{line}'")))?;

        Ok(Identity {
            name,
            email,
            timestamp,
        })
    }
}

/// A commit object.
///
/// `signature` holds the detached signature over [`Commit::canonical_bytes`],
/// stored under the `gpgsig` header the way Git stores commit signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Hash,
    pub parents: Vec<Hash>,
    pub author: Identity,
    pub committer: Identity,
    pub message: String,
    pub signature: Option<String>,
}

impl Commit {
    /// Encode the full commit body, including the signature header if present.
    pub fn encode(&self) -> Vec<u8> {
        self.encode_inner(true)
    }

    /// The canonical signed bytes: the commit body with the signature header
    /// stripped. Attaching or removing a signature never changes this value.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.encode_inner(false)
    }

    fn encode_inner(&self, with_signature: bool) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree.to_hex()));
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent.to_hex()));
        }
        out.push_str(&format!("author {}\n", self.author.encode()));
        out.push_str(&format!("committer {}\n", self.committer.encode()));
        if with_signature {
            if let Some(sig) = &self.signature {
                out.push_str("gpgsig");
                for line in sig.lines() {
                    out.push(' ');
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// Decode a commit object body.
    pub fn decode(body: &[u8]) -> Result<Self, GitTufError> {
        let text = std::str::from_utf8(body)
            .map_err(|_| GitTufError::MalformedObject("non-UTF-8 commit".to_string()))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut signature: Option<String> = None;

        let mut lines = text.lines();
        let mut message_offset = None;

        // Header section runs until the first empty line.
        let mut consumed = 0usize;
        while let Some(line) = lines.next() {
            consumed += line.len() + 1;
            if line.is_empty() {
                message_offset = Some(consumed);
                break;
            }

            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(Hash::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(Hash::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Identity::decode(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Identity::decode(rest)?);
            } else if let Some(rest) = line.strip_prefix("gpgsig ") {
                // Continuation lines are prefixed with a single space.
                let mut sig = rest.to_string();
                for cont in lines.by_ref() {
                    consumed += cont.len() + 1;
                    if let Some(more) = cont.strip_prefix(' ') {
                        sig.push('\n');
                        sig.push_str(more);
                    } else if cont.is_empty() {
                        message_offset = Some(consumed);
                        break;
                    } else {
                        return Err(GitTufError::MalformedObject(
                            "malformed signature header".to_string(),
                        ));
                    }
                }
                signature = Some(sig);
                if message_offset.is_some() {
                    break;
                }
            } else {
                return Err(GitTufError::MalformedObject(format!(
                    "unknown commit header in '{line}'"
                )));
            }
        }

        let message = match message_offset {
            Some(offset) if offset <= text.len() => text[offset..].to_string(),
            _ => String::new(),
        };

        Ok(Commit {
            tree: tree
                .ok_or_else(|| GitTufError::MalformedObject("commit without tree".to_string()))?,
            parents,
            author: author
                .ok_or_else(|| GitTufError::MalformedObject("commit without author".to_string()))?,
            committer: committer.ok_or_else(|| {
                GitTufError::MalformedObject("commit without committer".to_string())
            })?,
            message,
            signature,
        })
    }

    /// Object ID of this commit.
    pub fn id(&self) -> Hash {
        hash_object(ObjectKind::Commit, &self.encode())
    }
}
