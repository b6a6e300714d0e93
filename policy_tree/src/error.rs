//! Error types for policy tree loading and identity resolution.

use std::path::PathBuf;

use thiserror::Error;

/// A byte offset that does not fall inside the content it refers to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("offset {offset} is out of bounds 0..{len}")]
    OffsetOutOfBounds { offset: i64, len: usize },
}

/// Errors produced while parsing a `SOURCE:KEY[=VALUE]` label.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label '{0}' has no ':' separator")]
    MissingSeparator(String),

    #[error("label '{0}' has an empty source")]
    EmptySource(String),

    #[error("label '{0}' has an empty key")]
    EmptyKey(String),
}

impl LabelError {
    /// Return a help message suggesting how to fix this error.
    pub fn help(&self) -> Option<String> {
        Some("labels are written as SOURCE:KEY[=VALUE], e.g. k8s:role=frontend".into())
    }
}

/// Structural errors raised by policy node merge and attachment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("child name must not be empty")]
    EmptyChildName,

    #[error("node '{parent}' already has a child named '{name}'")]
    DuplicateChildName { parent: String, name: String },

    #[error("node name mismatch: '{ours}' != '{theirs}'")]
    NameMismatch { ours: String, theirs: String },

    #[error("conflicting definitions of rule '{rule}' in node '{node}'")]
    RuleConflict { node: String, rule: String },
}

/// Errors raised while loading a policy tree from the filesystem.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The fragment is not well-formed JSON.
    #[error("{file}:{line}: syntax error at column {column}: {message}\n{context}\n{marker}")]
    FragmentSyntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
        context: String,
        marker: String,
    },

    /// A JSON value does not fit the field it was assigned to.
    #[error("{file}:{line}: unable to assign value '{value}' to type '{expected}':\n{context}\n{marker}")]
    FragmentTypeMismatch {
        file: String,
        line: usize,
        value: String,
        expected: String,
        context: String,
        marker: String,
    },

    /// Any other read or decode failure.
    #[error("{file}: unknown error: {message}")]
    FragmentUnknown { file: String, message: String },

    /// The fragment parsed but its inline children are inconsistent.
    #[error("{file}: {source}")]
    InvalidFragment {
        file: String,
        #[source]
        source: NodeError,
    },

    /// A sibling fragment could not be merged into the directory's node.
    #[error("{file}: {source}")]
    MergeConflict {
        file: String,
        #[source]
        source: NodeError,
    },

    #[error("policy node import from {} did not derive a name", path.display())]
    UnnamedSubtree { path: PathBuf },

    #[error("cannot attach policy subtree {}: {source}", path.display())]
    Attach {
        path: PathBuf,
        #[source]
        source: NodeError,
    },

    #[error("{} contains policy subdirectories but no fragment to attach them to", path.display())]
    NoParentNode { path: PathBuf },

    #[error("{} is not a file or a directory", path.display())]
    PathNotFileOrDirectory { path: PathBuf },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            LoadError::UnnamedSubtree { .. } => Some(
                "give one of the fragments in the subdirectory a \"name\" field".into(),
            ),
            LoadError::NoParentNode { .. } => Some(
                "add a fragment file next to the subdirectories so they have a parent node".into(),
            ),
            LoadError::MergeConflict {
                source: NodeError::RuleConflict { .. },
                ..
            } => Some("a rule may only be defined once per policy node".into()),
            LoadError::Attach {
                source: NodeError::DuplicateChildName { .. },
                ..
            } => Some("two subdirectories derive the same node name; rename one of them".into()),
            _ => None,
        }
    }
}

/// Errors raised by the policy decision and identity services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no policy node at '{0}'")]
    NotFound(String),

    #[error("invalid policy path '{0}'")]
    InvalidPath(String),

    #[error("{0} not supported by the local repository")]
    Unsupported(&'static str),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("failed to read repository state from {}: {source}", path.display())]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse repository state from {}: {source}", path.display())]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write repository state to {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize repository state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ServiceError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            ServiceError::InvalidPath(_) => {
                Some("policy paths are dot-separated node names, e.g. root.frontend".into())
            }
            ServiceError::Unsupported(_) => {
                Some("consumption queries need a policy decision service".into())
            }
            _ => None,
        }
    }
}

/// Errors raised while turning command-line tokens into an identity set.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error(transparent)]
    InvalidLabel(#[from] LabelError),

    #[error("more than one security ID provided")]
    MultipleIdentitiesProvided,

    #[error("value '{token}': must be only one unsigned number or label(s) in format of SOURCE:KEY[=VALUE]")]
    IdentityNotFirst { token: String },

    #[error("you may only specify either an ID or labels")]
    MixedIdentitySpecification,

    #[error("no label or security ID provided")]
    NoIdentityProvided,

    #[error("ID {0} not found")]
    UnknownIdentityId(u32),

    #[error("unable to retrieve labels for ID {id}: {source}")]
    Lookup {
        id: u32,
        #[source]
        source: ServiceError,
    },
}

impl IdentityError {
    /// Return a help message suggesting how to fix this error, if applicable.
    pub fn help(&self) -> Option<String> {
        match self {
            IdentityError::InvalidLabel(e) => e.help(),
            IdentityError::MixedIdentitySpecification | IdentityError::IdentityNotFirst { .. } => {
                Some("pass either a single numeric security ID or one or more labels".into())
            }
            _ => None,
        }
    }
}
