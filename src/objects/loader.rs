//! Definition source loading
//!
//! The registry asks a `SourceLoader` for any definition it has no source
//! for. `FileSource` maps `/std/room` to `<root>/std/room.toml`:
//!
//! ```toml
//! inherits = ["/std/thing"]
//! auxiliaries = ["/std/light"]
//!
//! [fields.exits]
//! type = "mapping"
//! default = {}
//!
//! [methods.create]
//! calls = [{ method = "create" }]
//! returns = true
//!
//! [methods.create.assign]
//! short = "An empty room"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::providers::{Format, Toml};
use figment::Figment;
use serde::Deserialize;

use super::class::{Definition, FieldDecl, MethodDef, QualifiedCall, ScriptedBody};
use super::error::ResolveError;
use super::path::DefinitionId;

/// External facility supplying definition sources
pub trait SourceLoader: Send + Sync {
    /// Load the source of `id`, or `Ok(None)` if it does not exist
    fn load(&self, id: &DefinitionId) -> Result<Option<Definition>, ResolveError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionFile {
    #[serde(default)]
    inherits: Vec<DefinitionId>,
    #[serde(default)]
    prototype: bool,
    #[serde(default)]
    auxiliaries: Vec<DefinitionId>,
    #[serde(default)]
    fields: BTreeMap<String, FieldDecl>,
    #[serde(default)]
    methods: BTreeMap<String, MethodFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodFile {
    #[serde(default)]
    calls: Vec<QualifiedCall>,
    #[serde(default)]
    assign: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    returns: serde_json::Value,
}

impl DefinitionFile {
    fn into_definition(self, id: DefinitionId) -> Definition {
        let mut definition = Definition::with_id(id);
        definition.ancestors = self.inherits;
        definition.prototype = self.prototype;
        definition.auxiliaries = self.auxiliaries;
        definition.fields = self.fields;
        for (name, method) in self.methods {
            let body = ScriptedBody {
                assign: method.assign,
                returns: method.returns,
            };
            let mut def = MethodDef::scripted(&name, body);
            def.calls = method.calls;
            definition.add_method(def);
        }
        definition
    }
}

/// Parse a TOML definition source
pub fn parse_definition(id: DefinitionId, source: &str) -> Result<Definition, ResolveError> {
    let file: DefinitionFile = Figment::from(Toml::string(source))
        .extract()
        .map_err(|e| ResolveError::Source {
            definition: id.clone(),
            message: e.to_string(),
        })?;
    Ok(file.into_definition(id))
}

/// Loads definitions from TOML files under a root directory
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List every definition with a source file under the root, sorted
    pub fn discover(&self) -> std::io::Result<Vec<DefinitionId>> {
        let mut ids = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                    continue;
                }
                let Ok(relative) = path.with_extension("").strip_prefix(&self.root).map(Path::to_path_buf) else {
                    continue;
                };
                let segments: Vec<&str> = relative
                    .components()
                    .filter_map(|c| c.as_os_str().to_str())
                    .collect();
                if let Ok(id) = DefinitionId::new(&format!("/{}", segments.join("/"))) {
                    ids.push(id);
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

impl SourceLoader for FileSource {
    fn load(&self, id: &DefinitionId) -> Result<Option<Definition>, ResolveError> {
        let path = self.root.join(id.source_file());
        if !path.is_file() {
            return Ok(None);
        }

        let source = std::fs::read_to_string(&path).map_err(|e| ResolveError::Source {
            definition: id.clone(),
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        parse_definition(id.clone(), &source).map(Some)
    }
}
