//! Rewrite system options: debug flags and resource limits.
//!
//! Options deserialize from TOML with kebab-case keys:
//!
//! ```toml
//! debug = ["concretize-nested-types", "conditional-requirements"]
//! max-rule-count = 4000
//! max-passes = 16
//! max-concrete-nesting = 30
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error loading options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid options file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown debug flag `{0}`")]
    UnknownDebugFlag(String),
}

/// A category of trace events.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DebugFlag {
    /// Term simplification.
    Simplify,
    /// Rule insertion.
    Add,
    /// Property map construction.
    PropertyMap,
    /// Nested type concretization.
    ConcretizeNestedTypes,
    /// Conditional requirement inference.
    ConditionalRequirements,
}

impl DebugFlag {
    pub const ALL: [DebugFlag; 5] = [
        DebugFlag::Simplify,
        DebugFlag::Add,
        DebugFlag::PropertyMap,
        DebugFlag::ConcretizeNestedTypes,
        DebugFlag::ConditionalRequirements,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DebugFlag::Simplify => "simplify",
            DebugFlag::Add => "add",
            DebugFlag::PropertyMap => "property-map",
            DebugFlag::ConcretizeNestedTypes => "concretize-nested-types",
            DebugFlag::ConditionalRequirements => "conditional-requirements",
        }
    }
}

impl fmt::Display for DebugFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DebugFlag {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DebugFlag::ALL
            .into_iter()
            .find(|flag| flag.name() == s)
            .ok_or_else(|| OptionsError::UnknownDebugFlag(s.to_string()))
    }
}

/// A set of enabled debug flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugFlags(BTreeSet<DebugFlag>);

impl DebugFlags {
    pub fn none() -> Self {
        Self::default()
    }

    /// Parse a comma-separated flag list such as
    /// `"concretize-nested-types,conditional-requirements"`.
    pub fn parse(s: &str) -> Result<Self, OptionsError> {
        s.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(DebugFlag::from_str)
            .collect::<Result<BTreeSet<_>, _>>()
            .map(DebugFlags)
    }

    pub fn with(mut self, flag: DebugFlag) -> Self {
        self.0.insert(flag);
        self
    }

    pub fn contains(&self, flag: DebugFlag) -> bool {
        self.0.contains(&flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn default_max_rule_count() -> usize {
    4000
}

fn default_max_passes() -> usize {
    16
}

fn default_max_concrete_nesting() -> usize {
    30
}

/// Options for a rewrite system and the machine driving it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RewriteOptions {
    #[serde(default)]
    pub debug: DebugFlags,
    /// Stop once the system has more rules than this.
    #[serde(default = "default_max_rule_count")]
    pub max_rule_count: usize,
    /// Stop after this many property map passes without a fixpoint.
    #[serde(default = "default_max_passes")]
    pub max_passes: usize,
    /// Stop once a concrete type nests deeper than this.
    #[serde(default = "default_max_concrete_nesting")]
    pub max_concrete_nesting: usize,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        RewriteOptions {
            debug: DebugFlags::none(),
            max_rule_count: default_max_rule_count(),
            max_passes: default_max_passes(),
            max_concrete_nesting: default_max_concrete_nesting(),
        }
    }
}

impl RewriteOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, OptionsError> {
        Ok(toml::from_str(s)?)
    }

    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }
}
