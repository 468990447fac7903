//! Caller identifiers and counter keys.

use std::fmt;

use super::policy::Category;
use crate::error::{QuotaError, Result};

/// Opaque caller identifier (user id, tenant id, API key hash, ...).
///
/// The only check is that it is not empty: an empty identifier would make
/// every anonymous caller share one quota. Whitespace and case are kept as is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a caller-supplied identifier.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(QuotaError::EmptyIdentifier);
        }
        Ok(Self(id))
    }

    /// The identifier as given by the caller.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = QuotaError;

    fn try_from(id: &str) -> Result<Self> {
        Identifier::new(id)
    }
}

/// A key that uniquely identifies one counter: `(category, identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// The category being limited
    pub category: Category,
    /// The caller the counter belongs to
    pub identifier: Identifier,
}

impl CounterKey {
    /// Create a new counter key.
    pub fn new(category: Category, identifier: &Identifier) -> Self {
        Self {
            category,
            identifier: identifier.clone(),
        }
    }

    /// The `category:identifier` form used for storage keys and logging.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}", self.category.as_str(), self.identifier.as_str())
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.identifier)
    }
}
