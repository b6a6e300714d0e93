//! Interfaces to the policy decision service and identity table.
//!
//! This crate never evaluates policy. It prepares trees and identity sets and
//! hands them to an implementation of these traits: a remote daemon client in
//! production, or [`LocalRepository`](crate::LocalRepository) for offline use.

use crate::error::ServiceError;
use crate::identity::IdentitySet;
use crate::node::PolicyNode;

/// A request asking whether `from` may consume `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionQuery {
    pub from: IdentitySet,
    pub to: IdentitySet,
    /// Ask the service to log how it reached its verdict.
    pub trace: bool,
}

/// The decision service's answer to a [`ConsumptionQuery`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionReply {
    pub trace_log: Vec<u8>,
}

/// Storage and evaluation of the authoritative policy tree.
pub trait PolicyService {
    /// Adds `node` to the tree at the dot-separated `path`.
    fn policy_add(&mut self, path: &str, node: PolicyNode) -> Result<(), ServiceError>;

    /// Returns the subtree at `path`, or `None` if nothing is loaded there.
    fn policy_get(&self, path: &str) -> Result<Option<PolicyNode>, ServiceError>;

    /// Removes the subtree at `path`.
    fn policy_delete(&mut self, path: &str) -> Result<(), ServiceError>;

    fn query_consumption(&self, query: &ConsumptionQuery)
    -> Result<ConsumptionReply, ServiceError>;
}

/// Lookup of the labels behind a numeric security ID.
pub trait IdentityService {
    /// Returns the identity's labels, or `None` if the ID is unknown.
    fn resolve_identity_labels(&self, id: u32) -> Result<Option<IdentitySet>, ServiceError>;
}
