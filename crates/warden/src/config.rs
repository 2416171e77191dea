//! Ability options.
//!
//! Options are plain data with defaults suitable for most applications.
//! They can be deserialized from a config file or read from environment
//! variables; the core never reads the environment on its own.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aliases::ActionAliases;
use crate::detect::TypeNameDetector;
use crate::error::{AbilityError, AbilityResult};

/// Options controlling how an [`Ability`](crate::Ability) is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityOptions {
    /// Stage rules without ingesting them until `initialize()` or the first
    /// query.
    pub deferred: bool,

    /// Strip module paths from Rust type names during subject detection.
    pub strip_module_prefix: bool,

    /// Action aliases (alias → covered actions).
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl Default for AbilityOptions {
    fn default() -> Self {
        Self {
            deferred: false,
            strip_module_prefix: true,
            aliases: BTreeMap::new(),
        }
    }
}

impl AbilityOptions {
    /// Load options from environment variables.
    ///
    /// Environment variables:
    /// - `WARDEN_DEFERRED`: stage rules until first use (default: false)
    /// - `WARDEN_STRIP_MODULE_PREFIX`: short type names in detection (default: true)
    ///
    /// Aliases are not read from the environment.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            deferred: std::env::var("WARDEN_DEFERRED")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(default.deferred),
            strip_module_prefix: std::env::var("WARDEN_STRIP_MODULE_PREFIX")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(default.strip_module_prefix),
            aliases: default.aliases,
        }
    }

    /// Deferred construction, builder style.
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    /// Add an action alias, builder style.
    pub fn alias<I, S>(mut self, alias: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases
            .entry(alias.into())
            .or_default()
            .extend(actions.into_iter().map(Into::into));
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> AbilityResult<()> {
        self.action_aliases().map(|_| ())
    }

    /// The validated alias table.
    pub fn action_aliases(&self) -> AbilityResult<ActionAliases> {
        ActionAliases::from_map(&self.aliases)
    }

    /// The default subject-type detector for these options.
    pub fn detector(&self) -> TypeNameDetector {
        TypeNameDetector::new(self.strip_module_prefix)
    }
}

impl TryFrom<&AbilityOptions> for ActionAliases {
    type Error = AbilityError;

    fn try_from(options: &AbilityOptions) -> AbilityResult<Self> {
        options.action_aliases()
    }
}
