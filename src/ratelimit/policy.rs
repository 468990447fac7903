//! Policy registry: operation categories and their quotas.
//!
//! The table is compiled in. Each category maps to a quota and a window
//! specifier reflecting the cost of the gated operation; anything the
//! registry does not recognise resolves to [`Category::Default`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use super::window::{parse_window, try_parse_window};
use crate::error::{QuotaError, Result};

/// Version of the compiled policy table. Bump when a quota or window changes.
pub const POLICY_TABLE_VERSION: u32 = 1;

/// Category of a gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Fallback for unrecognised categories
    Default,
    /// Cheap metadata reads
    Read,
    /// AI content generation
    Generate,
    /// Media transcription
    Transcribe,
    /// Calls that consume a third-party API quota
    ExternalApi,
    /// Outbound webhook delivery
    Webhook,
    /// Sign-in and credential operations
    Auth,
}

impl Category {
    /// Every category, in table order.
    pub const ALL: [Category; 7] = [
        Category::Default,
        Category::Read,
        Category::Generate,
        Category::Transcribe,
        Category::ExternalApi,
        Category::Webhook,
        Category::Auth,
    ];

    /// Resolve a category name. Unknown names resolve to [`Category::Default`].
    pub fn from_name(name: &str) -> Self {
        Self::parse(name).unwrap_or(Category::Default)
    }

    /// Resolve a category name, returning `None` for unknown names.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Canonical name, also used in counter keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Default => "default",
            Category::Read => "read",
            Category::Generate => "generate",
            Category::Transcribe => "transcribe",
            Category::ExternalApi => "external-api",
            Category::Webhook => "webhook",
            Category::Auth => "auth",
        }
    }

    /// The compiled `(quota, window specifier)` pair for this category.
    pub fn limits(&self) -> (u64, &'static str) {
        match self {
            Category::Default => (60, "1m"),
            Category::Read => (300, "1m"),
            Category::Generate => (10, "1m"),
            Category::Transcribe => (20, "1h"),
            Category::ExternalApi => (30, "1m"),
            Category::Webhook => (100, "1m"),
            Category::Auth => (5, "15m"),
        }
    }

    /// The compiled policy for this category.
    pub fn policy(&self) -> Policy {
        let (quota, window) = self.limits();
        Policy {
            category: *self,
            quota,
            window: parse_window(window),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quota and window for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Policy {
    /// The category this policy applies to
    pub category: Category,
    /// Maximum admissions per identifier per window
    pub quota: u64,
    /// Window length
    #[serde(rename = "window_ms", serialize_with = "serialize_millis")]
    pub window: Duration,
}

impl Policy {
    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

fn serialize_millis<S: serde::Serializer>(
    window: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(window.as_millis() as u64)
}

/// A deploy-time override for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    /// Number of admissions per window
    pub quota: u64,
    /// Window specifier, e.g. `"1m"`
    pub window: String,
}

/// Read-only lookup table from category to policy.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<Category, Policy>,
}

impl PolicyRegistry {
    /// Build the registry from the compiled table.
    pub fn new() -> Self {
        let policies = Category::ALL
            .into_iter()
            .map(|category| (category, category.policy()))
            .collect();
        Self { policies }
    }

    /// Build the registry from the compiled table with per-category overrides.
    ///
    /// Override keys must name a known category and quotas must be positive.
    /// A malformed window specifier is accepted but logged, and degrades to
    /// the default window like the compiled table would.
    pub fn with_overrides(overrides: &HashMap<String, PolicyOverride>) -> Result<Self> {
        let mut registry = Self::new();

        for (name, over) in overrides {
            let category = Category::parse(name).ok_or_else(|| {
                QuotaError::Config(format!("unknown policy category '{}'", name))
            })?;
            if over.quota == 0 {
                return Err(QuotaError::Config(format!(
                    "policy '{}' must have a quota greater than zero",
                    name
                )));
            }
            if try_parse_window(&over.window).is_none() {
                warn!(
                    category = %category,
                    window = %over.window,
                    "Malformed window specifier, using default window"
                );
            }

            let policy = Policy {
                category,
                quota: over.quota,
                window: parse_window(&over.window),
            };
            info!(
                category = %category,
                quota = policy.quota,
                window_ms = policy.window_ms(),
                "Policy override applied"
            );
            registry.policies.insert(category, policy);
        }

        Ok(registry)
    }

    /// Look up the policy for a category.
    pub fn lookup(&self, category: Category) -> Policy {
        self.policies
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.policy())
    }

    /// Look up the policy for a category name; unknown names get the default policy.
    pub fn lookup_name(&self, name: &str) -> Policy {
        self.lookup(Category::from_name(name))
    }

    /// All effective policies, in table order.
    pub fn policies(&self) -> Vec<Policy> {
        Category::ALL.into_iter().map(|c| self.lookup(c)).collect()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
