//! mudobj - HemiMUD object model
//!
//! Prototype-style definitions with multiple inheritance, compile-time
//! conflict detection, runtime composition through attached auxiliary
//! objects, and ownership-gated destruction.

pub mod objects;
pub mod permissions;

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub use objects::AmbiguityPolicy;

/// Object model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Method run once on every new instance
    pub init_method: String,
    /// Method run on each instance of a teardown while it is pending destruction
    pub destroy_hook: Option<String>,
    /// Definition attached to every new instance during initialization
    pub base_auxiliary: Option<String>,
    /// Binding of `::method()` when several direct ancestors implement it
    pub ambiguous_calls: AmbiguityPolicy,
    /// Maximum length of an ancestor chain
    pub max_inheritance_depth: usize,
    /// Directory holding `.toml` definition sources
    pub source_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            init_method: "create".to_string(),
            destroy_hook: Some("on_destroy".to_string()),
            base_auxiliary: None,
            ambiguous_calls: AmbiguityPolicy::FirstContributor,
            max_inheritance_depth: 32,
            source_root: None,
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file (if given), then
    /// `MUDOBJ_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("MUDOBJ_")).extract()
    }
}
