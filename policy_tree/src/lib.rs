//! # Policy Tree
//!
//! Composition of hierarchical network access policy from a directory of JSON
//! fragments, plus the label and identity plumbing needed to ask a policy
//! decision service questions about it.
//!
//! ## Overview
//!
//! A policy tree is assembled from the filesystem:
//!
//! 1. Every fragment file in a directory is parsed into a [`PolicyNode`]
//! 2. The fragments of one directory are merged into a single node
//! 3. Each subdirectory is loaded the same way and attached as a child
//!
//! Identities are sets of [`Label`]s written as `SOURCE:KEY[=VALUE]`, or a
//! numeric security ID that an [`IdentityService`] expands into labels.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use policy_tree::{
//!     IdentityResolver, LoaderConfig, LocalRepository, PolicyLoader, PolicyService,
//! };
//!
//! let loader = PolicyLoader::new(LoaderConfig::default());
//! let mut repo = LocalRepository::in_memory();
//!
//! if let Some(tree) = loader.load(Path::new("policy/")).unwrap() {
//!     let name = tree.name().to_string();
//!     repo.policy_add(&name, tree).unwrap();
//! }
//!
//! let frontend = IdentityResolver::new(&repo)
//!     .resolve(&["k8s:role=frontend", "k8s:env=prod"])
//!     .unwrap();
//! println!("{frontend}");
//! ```
//!
//! ## Merging
//!
//! Fragments merge by union. Two fragments may carry the same rule only if
//! both definitions are identical, unless [`MergeStrategy::Strict`] is used,
//! in which case every rule may appear exactly once. Merging never mutates
//! its inputs.

pub mod error;
pub mod identity;
pub mod label;
pub mod loader;
pub mod location;
pub mod node;
pub mod print;
pub mod repository;
pub mod service;

pub use error::{IdentityError, LabelError, LoadError, LocateError, NodeError, ServiceError};
pub use identity::{
    IdentityResolver, IdentitySet, reserved_id, reserved_identities, reserved_labels, validate_tokens,
};
pub use label::Label;
pub use loader::{LoaderConfig, PolicyLoader, parse_fragment};
pub use location::{SourceLocation, locate};
pub use node::{MergeStrategy, PolicyNode};
pub use print::print_tree;
pub use repository::LocalRepository;
pub use service::{ConsumptionQuery, ConsumptionReply, IdentityService, PolicyService};
