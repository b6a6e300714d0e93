//! Identity sets and command-line identity resolution.
//!
//! One side of a consumption query is given as a list of tokens. Each token is
//! either a numeric security ID or a `SOURCE:KEY[=VALUE]` label, and a list
//! holds exactly one ID or one or more labels, never both.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

use crate::error::IdentityError;
use crate::label::Label;
use crate::service::IdentityService;

/// Label source used by the reserved identities.
pub const RESERVED_SOURCE: &str = "reserved";

/// Identities that exist independently of any workload.
pub const RESERVED_IDENTITIES: &[(&str, u32)] = &[("host", 1), ("world", 2)];

/// A canonical, ordered set of distinct labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentitySet(BTreeSet<Label>);

impl IdentitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a label. Returns false if it was already present.
    pub fn insert(&mut self, label: Label) -> bool {
        self.0.insert(label)
    }

    /// Returns true if the exact label is in the set.
    pub fn contains(&self, label: &Label) -> bool {
        self.0.contains(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.0.iter()
    }
}

impl FromIterator<Label> for IdentitySet {
    fn from_iter<T: IntoIterator<Item = Label>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for IdentitySet {
    type Item = Label;
    type IntoIter = std::collections::btree_set::IntoIter<Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for IdentitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.0.iter().map(Label::to_string).collect();
        write!(f, "[{}]", labels.join(", "))
    }
}

/// Lists the reserved identities as `(name, id)` pairs.
pub fn reserved_identities() -> impl Iterator<Item = (&'static str, u32)> {
    RESERVED_IDENTITIES.iter().copied()
}

/// Looks up a reserved identity by name (`host` or `reserved:host`).
pub fn reserved_id(name: &str) -> Option<u32> {
    let name = name
        .strip_prefix(RESERVED_SOURCE)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(name);
    RESERVED_IDENTITIES
        .iter()
        .find(|(reserved, _)| *reserved == name)
        .map(|(_, id)| *id)
}

/// Returns the labels of a reserved identity.
pub fn reserved_labels(id: u32) -> Option<IdentitySet> {
    RESERVED_IDENTITIES
        .iter()
        .find(|(_, reserved)| *reserved == id)
        .map(|(name, _)| std::iter::once(Label::new(RESERVED_SOURCE, *name)).collect())
}

/// Parses a token as a security ID: a plain decimal unsigned 32-bit number.
fn parse_security_id(token: &str) -> Option<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Checks the shape of a token list without resolving anything.
///
/// Every non-numeric token must parse as a label, and a numeric token is only
/// accepted as the first element. This runs before any service connection is
/// made.
#[instrument(level = Level::TRACE, skip(tokens))]
pub fn validate_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<(), IdentityError> {
    if tokens.is_empty() {
        return Err(IdentityError::NoIdentityProvided);
    }

    for (i, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        if parse_security_id(token).is_none() {
            Label::parse(token)?;
        } else if i != 0 {
            return Err(IdentityError::IdentityNotFirst {
                token: token.to_string(),
            });
        }
    }

    Ok(())
}

/// Resolves token lists into identity sets, consulting `service` for IDs.
#[derive(Debug)]
pub struct IdentityResolver<'a, S: ?Sized> {
    service: &'a S,
}

impl<'a, S: IdentityService + ?Sized> IdentityResolver<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Resolves one side of a consumption query.
    ///
    /// A single numeric ID resolves to that identity's labels; otherwise the
    /// labels given are returned as a set.
    #[instrument(level = Level::TRACE, skip(self, tokens))]
    pub fn resolve<T: AsRef<str>>(&self, tokens: &[T]) -> Result<IdentitySet, IdentityError> {
        let mut id: Option<u32> = None;
        let mut labels = IdentitySet::new();

        for token in tokens {
            let token = token.as_ref();
            match parse_security_id(token) {
                Some(_) if id.is_some() => return Err(IdentityError::MultipleIdentitiesProvided),
                Some(n) => id = Some(n),
                None => {
                    labels.insert(Label::parse(token)?);
                }
            }
        }

        match id {
            Some(_) if !labels.is_empty() => Err(IdentityError::MixedIdentitySpecification),
            Some(id) => {
                debug!(id, "resolving security ID");
                self.service
                    .resolve_identity_labels(id)
                    .map_err(|source| IdentityError::Lookup { id, source })?
                    .ok_or(IdentityError::UnknownIdentityId(id))
            }
            None if labels.is_empty() => Err(IdentityError::NoIdentityProvided),
            None => Ok(labels),
        }
    }
}
