//! Tree diffing: enumerate the paths changed between two commits.

use super::{FileMode, Hash, Repository};
use crate::error::GitTufError;
use std::collections::BTreeMap;

fn flatten_tree(
    repo: &Repository,
    tree: Hash,
    prefix: &str,
    out: &mut BTreeMap<String, Hash>,
) -> Result<(), GitTufError> {
    for entry in repo.read_tree(tree)? {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        match entry.mode {
            FileMode::Dir => flatten_tree(repo, entry.hash, &path, out)?,
            FileMode::Regular => {
                out.insert(path, entry.hash);
            }
        }
    }
    Ok(())
}

/// Enumerate the repository-relative paths whose contents differ between two
/// trees. `before` is `None` for a parentless commit, in which case every path
/// in `after` is reported. Paths are returned sorted.
pub fn changed_paths_between(
    repo: &Repository,
    before: Option<Hash>,
    after: Hash,
) -> Result<Vec<String>, GitTufError> {
    let mut before_paths = BTreeMap::new();
    if let Some(before) = before {
        flatten_tree(repo, before, "", &mut before_paths)?;
    }
    let mut after_paths = BTreeMap::new();
    flatten_tree(repo, after, "", &mut after_paths)?;

    let mut changed = Vec::new();
    for (path, hash) in &after_paths {
        if before_paths.get(path) != Some(hash) {
            changed.push(path.clone());
        }
    }
    for path in before_paths.keys() {
        if !after_paths.contains_key(path) {
            changed.push(path.clone());
        }
    }
    changed.sort();
    Ok(changed)
}
