// Copyright (c) 2025 - Cowboy AI, Inc.
//! Logical Identifier Value Object
//!
//! Every declared resource is addressed by a logical identifier such as
//! `dev-Bastion-SecurityGroup`. Logical identifiers are what operators see in
//! errors and logs, and what predecessor edges point at.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Logical identifier validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogicalIdError {
    #[error("Logical identifier is empty")]
    Empty,

    #[error("Logical identifier exceeds maximum length of 255 characters: {0}")]
    TooLong(usize),

    #[error("Invalid character in logical identifier: {0}")]
    InvalidCharacter(char),

    #[error("Logical identifier cannot start or end with a hyphen: {0}")]
    InvalidFormat(String),
}

/// Logical identifier of a declared resource
///
/// Invariants:
/// - Non-empty, at most 255 characters
/// - ASCII alphanumerics, hyphens and underscores only
/// - Does not start or end with a hyphen
///
/// Case is preserved; `dev-WebServer` and `dev-webserver` are distinct.
///
/// # Examples
///
/// ```rust
/// use layered_stack::domain::LogicalId;
///
/// let id = LogicalId::new("dev-WebServer").unwrap();
/// let instance = id.child("Instance").unwrap();
/// assert_eq!(instance.as_str(), "dev-WebServer-Instance");
///
/// assert!(LogicalId::new("").is_err());
/// assert!(LogicalId::new("-dev").is_err());
/// assert!(LogicalId::new("dev VPC").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalId(String);

impl LogicalId {
    /// Maximum total length
    pub const MAX_LENGTH: usize = 255;

    /// Create a new logical identifier with validation
    pub fn new(id: impl Into<String>) -> Result<Self, LogicalIdError> {
        let id = id.into();

        if id.is_empty() {
            return Err(LogicalIdError::Empty);
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(LogicalIdError::TooLong(id.len()));
        }

        if let Some(ch) = id
            .chars()
            .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '-' && *ch != '_')
        {
            return Err(LogicalIdError::InvalidCharacter(ch));
        }

        if id.starts_with('-') || id.ends_with('-') {
            return Err(LogicalIdError::InvalidFormat(id));
        }

        Ok(Self(id))
    }

    /// Derive a child identifier (`<self>-<suffix>`)
    pub fn child(&self, suffix: &str) -> Result<Self, LogicalIdError> {
        Self::new(format!("{}-{}", self.0, suffix))
    }

    /// Get the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LogicalId {
    type Error = LogicalIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Declared dependency chain leading to a resource
///
/// Ordered from the earliest transitive predecessor to the resource itself.
/// Carried by every fatal provisioning error so an operator can locate the
/// conflicting declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyChain(Vec<LogicalId>);

impl DependencyChain {
    /// Chain consisting of a single resource with no predecessors
    pub fn single(id: LogicalId) -> Self {
        Self(vec![id])
    }

    /// Build a chain from an ordered list of identifiers
    pub fn from_ids(ids: Vec<LogicalId>) -> Self {
        Self(ids)
    }

    /// Identifiers in chain order
    pub fn ids(&self) -> &[LogicalId] {
        &self.0
    }

    /// Whether the chain mentions `id`
    pub fn contains(&self, id: &LogicalId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DependencyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<&str> = self.0.iter().map(LogicalId::as_str).collect();
        write!(f, "{}", rendered.join(" → "))
    }
}
