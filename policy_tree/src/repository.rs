//! A local stand-in for the policy decision service.
//!
//! [`LocalRepository`] keeps one policy tree and a table of registered
//! identities, optionally persisted as JSON so successive CLI invocations see
//! each other's changes:
//!
//! ```json
//! {
//!   "tree": { "name": "root", "children": { "web": {} } },
//!   "identities": { "256": ["k8s:role=frontend"] }
//! }
//! ```
//!
//! Paths are dot-separated node names starting at the root node's name, so
//! `root.web` is the child `web` of the root node `root`.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::error::ServiceError;
use crate::identity::{IdentitySet, reserved_labels};
use crate::node::{MergeStrategy, PolicyNode};
use crate::service::{ConsumptionQuery, ConsumptionReply, IdentityService, PolicyService};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RepositoryState {
    #[serde(default)]
    tree: Option<PolicyNode>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    identities: BTreeMap<u32, IdentitySet>,
}

/// Policy tree and identity storage backed by an optional state file.
#[derive(Debug, Clone, Default)]
pub struct LocalRepository {
    state: RepositoryState,
    path: Option<PathBuf>,
    merge: MergeStrategy,
}

impl LocalRepository {
    /// Creates an empty repository that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the repository stored at `path`, starting empty if the file does
    /// not exist yet. Every successful mutation is written back.
    #[instrument(level = Level::TRACE)]
    pub fn open(path: &Path) -> Result<Self, ServiceError> {
        let state = match fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|source| ServiceError::StateParse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => RepositoryState::default(),
            Err(source) => {
                return Err(ServiceError::StateRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Ok(Self {
            state,
            path: Some(path.to_path_buf()),
            merge: MergeStrategy::default(),
        })
    }

    pub fn with_merge_strategy(mut self, merge: MergeStrategy) -> Self {
        self.merge = merge;
        self
    }

    /// Returns the whole tree, if any.
    pub fn tree(&self) -> Option<&PolicyNode> {
        self.state.tree.as_ref()
    }

    /// Records the labels behind a security ID.
    pub fn register_identity(&mut self, id: u32, labels: IdentitySet) -> Result<(), ServiceError> {
        self.state.identities.insert(id, labels);
        self.persist()
    }

    fn persist(&self) -> Result<(), ServiceError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|source| ServiceError::StateWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(&self.state)?;
        fs::write(path, content).map_err(|source| ServiceError::StateWrite {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "repository state written");
        Ok(())
    }
}

/// Splits a dot-separated policy path into node names.
fn split_path(path: &str) -> Result<Vec<&str>, ServiceError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ServiceError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Walks from `root` along `segments`, the first of which names the root.
fn find<'a>(root: &'a PolicyNode, segments: &[&str]) -> Option<&'a PolicyNode> {
    let (first, rest) = segments.split_first()?;
    if root.name() != *first {
        return None;
    }
    rest.iter().try_fold(root, |node, name| node.child(name))
}

fn find_mut<'a>(root: &'a mut PolicyNode, segments: &[&str]) -> Option<&'a mut PolicyNode> {
    let (first, rest) = segments.split_first()?;
    if root.name() != *first {
        return None;
    }
    rest.iter().try_fold(root, |node, name| node.child_mut(name))
}

impl PolicyService for LocalRepository {
    #[instrument(level = Level::TRACE, skip(self, node))]
    fn policy_add(&mut self, path: &str, node: PolicyNode) -> Result<(), ServiceError> {
        let segments = split_path(path)?;
        let merge = self.merge;

        match self.state.tree.as_mut() {
            None => {
                if segments.len() > 1 {
                    return Err(ServiceError::NotFound(
                        segments[..segments.len() - 1].join("."),
                    ));
                }
                self.state.tree = Some(PolicyNode::new(segments[0]).merge_with(&node, merge)?);
            }
            Some(root) if segments.len() == 1 => {
                if root.name() != segments[0] {
                    return Err(ServiceError::NotFound(path.to_string()));
                }
                *root = root.merge_with(&node, merge)?;
            }
            Some(root) => {
                let (last, parents) = segments
                    .split_last()
                    .ok_or_else(|| ServiceError::InvalidPath(path.to_string()))?;
                let parent = find_mut(root, parents)
                    .ok_or_else(|| ServiceError::NotFound(parents.join(".")))?;
                match parent.child_mut(last) {
                    Some(existing) => *existing = existing.merge_with(&node, merge)?,
                    None => {
                        let node = PolicyNode::new(*last).merge_with(&node, merge)?;
                        parent.add_child(*last, node)?;
                    }
                }
            }
        }

        debug!(path, "policy added");
        self.persist()
    }

    #[instrument(level = Level::TRACE, skip(self))]
    fn policy_get(&self, path: &str) -> Result<Option<PolicyNode>, ServiceError> {
        let segments = split_path(path)?;
        Ok(self
            .state
            .tree
            .as_ref()
            .and_then(|root| find(root, &segments))
            .cloned())
    }

    #[instrument(level = Level::TRACE, skip(self))]
    fn policy_delete(&mut self, path: &str) -> Result<(), ServiceError> {
        let segments = split_path(path)?;
        let not_found = || ServiceError::NotFound(path.to_string());
        let root = self.state.tree.as_mut().ok_or_else(not_found)?;

        match segments.split_last() {
            Some((last, [])) if root.name() == *last => self.state.tree = None,
            Some((last, parents)) if !parents.is_empty() => {
                find_mut(root, parents)
                    .and_then(|parent| parent.remove_child(last))
                    .ok_or_else(not_found)?;
            }
            _ => return Err(not_found()),
        }

        debug!(path, "policy deleted");
        self.persist()
    }

    fn query_consumption(
        &self,
        _query: &ConsumptionQuery,
    ) -> Result<ConsumptionReply, ServiceError> {
        Err(ServiceError::Unsupported("consumption queries are"))
    }
}

impl IdentityService for LocalRepository {
    fn resolve_identity_labels(&self, id: u32) -> Result<Option<IdentitySet>, ServiceError> {
        Ok(reserved_labels(id).or_else(|| self.state.identities.get(&id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::error::NodeError;
    use crate::label::Label;

    fn tree() -> LocalRepository {
        let mut repo = LocalRepository::in_memory();
        repo.policy_add("root", PolicyNode::new("").with_rule("a", json!(1)))
            .unwrap();
        repo.policy_add("root.web", PolicyNode::new("").with_rule("b", json!(2)))
            .unwrap();
        repo
    }

    #[test]
    fn test_first_add_creates_root() {
        let repo = tree();
        let root = repo.policy_get("root").unwrap().unwrap();
        assert_eq!(root.name(), "root");
        assert_eq!(root.child("web").unwrap().rule("b"), Some(&json!(2)));
    }

    #[test]
    fn test_add_into_empty_tree_needs_single_segment() {
        let mut repo = LocalRepository::in_memory();
        let err = repo
            .policy_add("root.web", PolicyNode::new(""))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(p) if p == "root"));
    }

    #[test]
    fn test_add_merges_existing_node() {
        let mut repo = tree();
        repo.policy_add("root.web", PolicyNode::new("").with_rule("c", json!(3)))
            .unwrap();
        let web = repo.policy_get("root.web").unwrap().unwrap();
        assert_eq!(web.rules().len(), 2);

        let err = repo
            .policy_add("root", PolicyNode::new("").with_rule("a", json!("other")))
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Node(NodeError::RuleConflict { .. })
        ));
    }

    #[test]
    fn test_add_rejects_misnamed_node() {
        let mut repo = tree();
        let err = repo
            .policy_add("root.db", PolicyNode::new("cache"))
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Node(NodeError::NameMismatch { .. })
        ));
        assert_eq!(repo.policy_get("root.db").unwrap(), None);
    }

    #[test]
    fn test_add_under_missing_parent() {
        let mut repo = tree();
        let err = repo
            .policy_add("root.db.replica", PolicyNode::new(""))
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(p) if p == "root.db"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let repo = tree();
        assert_eq!(repo.policy_get("root.nope").unwrap(), None);
        assert_eq!(repo.policy_get("other").unwrap(), None);
        assert_eq!(LocalRepository::in_memory().policy_get("root").unwrap(), None);
    }

    #[test]
    fn test_invalid_paths() {
        let repo = tree();
        assert!(matches!(repo.policy_get(""), Err(ServiceError::InvalidPath(_))));
        assert!(matches!(
            repo.policy_get("root..web"),
            Err(ServiceError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_delete_subtree_and_root() {
        let mut repo = tree();
        repo.policy_delete("root.web").unwrap();
        assert_eq!(repo.policy_get("root.web").unwrap(), None);
        assert!(matches!(
            repo.policy_delete("root.web"),
            Err(ServiceError::NotFound(_))
        ));

        repo.policy_delete("root").unwrap();
        assert!(repo.tree().is_none());
        assert!(matches!(
            repo.policy_delete("root"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_identities() {
        let mut repo = LocalRepository::in_memory();
        let labels: IdentitySet = [Label::parse("k8s:role=frontend").unwrap()]
            .into_iter()
            .collect();
        repo.register_identity(256, labels.clone()).unwrap();

        assert_eq!(repo.resolve_identity_labels(256).unwrap(), Some(labels));
        assert!(repo.resolve_identity_labels(1).unwrap().is_some());
        assert_eq!(repo.resolve_identity_labels(999).unwrap(), None);
    }

    #[test]
    fn test_consumption_queries_are_unsupported() {
        let query = ConsumptionQuery {
            from: IdentitySet::new(),
            to: IdentitySet::new(),
            trace: true,
        };
        assert!(matches!(
            tree().query_consumption(&query),
            Err(ServiceError::Unsupported(_))
        ));
    }

    #[test]
    fn test_state_persists_across_opens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/state.json");

        let mut repo = LocalRepository::open(&path).unwrap();
        assert!(repo.tree().is_none());
        repo.policy_add("root", PolicyNode::new("").with_rule("a", json!(1)))
            .unwrap();
        repo.register_identity(300, IdentitySet::new()).unwrap();

        let reopened = LocalRepository::open(&path).unwrap();
        assert_eq!(reopened.tree(), repo.tree());
        assert_eq!(
            reopened.resolve_identity_labels(300).unwrap(),
            Some(IdentitySet::new())
        );
    }

    #[test]
    fn test_serialization_failure_is_its_own_error() {
        let json_err = serde_json::from_str::<u32>("x").unwrap_err();
        let err = ServiceError::from(json_err);
        assert!(matches!(err, ServiceError::Serialize(_)));
        assert!(err.to_string().starts_with("failed to serialize repository state"));
    }

    #[test]
    fn test_corrupt_state_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            LocalRepository::open(&path),
            Err(ServiceError::StateParse { .. })
        ));
    }
}
