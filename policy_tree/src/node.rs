//! Policy tree nodes.
//!
//! A node holds opaque named rules and named children. Rule values are never
//! interpreted here; the only question this module answers about them is
//! whether two definitions of the same rule can coexist.
//!
//! Fragment files deserialize directly into a node:
//!
//! ```json
//! {
//!   "name": "root",
//!   "rules": { "allow-dns": { "to": "reserved:world", "port": 53 } },
//!   "children": { "frontend": { "rules": { "allow-web": { "port": 80 } } } }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NodeError;

/// How rule definitions that appear on both sides of a merge are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Identical definitions of a rule collapse into one; different ones conflict.
    #[default]
    Union,
    /// Every rule may be defined exactly once.
    Strict,
}

/// One policy fragment or composite subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyNode {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    rules: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, PolicyNode>,
}

impl PolicyNode {
    /// Creates an empty node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Returns this node with a rule added, replacing any previous definition.
    pub fn with_rule(mut self, name: impl Into<String>, rule: Value) -> Self {
        self.rules.insert(name.into(), rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &BTreeMap<String, Value> {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Value> {
        self.rules.get(name)
    }

    pub fn children(&self) -> &BTreeMap<String, PolicyNode> {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&PolicyNode> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut PolicyNode> {
        self.children.get_mut(name)
    }

    /// Detaches and returns the named child.
    pub fn remove_child(&mut self, name: &str) -> Option<PolicyNode> {
        self.children.remove(name)
    }

    /// Merges with the default [`MergeStrategy`].
    pub fn merge(&self, other: &PolicyNode) -> Result<PolicyNode, NodeError> {
        self.merge_with(other, MergeStrategy::default())
    }

    /// Returns the union of `self` and `other`.
    ///
    /// An empty name adopts the other side's name, and two different names
    /// conflict. Rules are unioned according to `strategy`. Children present
    /// on both sides are merged recursively. Neither input is modified, so a
    /// failed merge leaves nothing half-applied. The outcome does not depend
    /// on which side is `self`.
    pub fn merge_with(
        &self,
        other: &PolicyNode,
        strategy: MergeStrategy,
    ) -> Result<PolicyNode, NodeError> {
        let name = if other.name.is_empty() || self.name == other.name {
            self.name.clone()
        } else if self.name.is_empty() {
            other.name.clone()
        } else {
            return Err(NodeError::NameMismatch {
                ours: self.name.clone(),
                theirs: other.name.clone(),
            });
        };

        let mut rules = self.rules.clone();
        for (rule, value) in &other.rules {
            match rules.get(rule) {
                Some(existing) if strategy == MergeStrategy::Union && existing == value => {}
                Some(_) => {
                    return Err(NodeError::RuleConflict {
                        node: name,
                        rule: rule.clone(),
                    });
                }
                None => {
                    rules.insert(rule.clone(), value.clone());
                }
            }
        }

        let mut children = self.children.clone();
        for (key, child) in &other.children {
            let merged = match children.get(key) {
                Some(existing) => existing.merge_with(child, strategy)?,
                None => child.clone(),
            };
            children.insert(key.clone(), merged);
        }

        Ok(PolicyNode {
            name,
            rules,
            children,
        })
    }

    /// Attaches `child` under `name`; the child takes that name.
    ///
    /// Replacing an existing child is refused so a sibling subtree is never
    /// silently discarded.
    pub fn add_child(
        &mut self,
        name: impl Into<String>,
        mut child: PolicyNode,
    ) -> Result<(), NodeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NodeError::EmptyChildName);
        }
        if self.children.contains_key(&name) {
            return Err(NodeError::DuplicateChildName {
                parent: self.name.clone(),
                name,
            });
        }
        child.name.clone_from(&name);
        self.children.insert(name, child);
        Ok(())
    }

    /// Gives unnamed inline children their map key as name, recursively.
    ///
    /// A child that names itself differently from its key is rejected.
    pub fn normalize_children(&mut self) -> Result<(), NodeError> {
        for (key, child) in &mut self.children {
            if child.name.is_empty() {
                child.name.clone_from(key);
            } else if child.name != *key {
                return Err(NodeError::NameMismatch {
                    ours: key.clone(),
                    theirs: child.name.clone(),
                });
            }
            child.normalize_children()?;
        }
        Ok(())
    }
}
