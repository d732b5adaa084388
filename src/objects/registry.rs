//! Process-wide registry of definition sources and their flattened tables
//!
//! Readers take the cache's read lock. Resolution, insertion and
//! invalidation run under a single resolution lock, so no reader ever sees
//! a half-built table and a failed resolution caches nothing for the
//! failing definition.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::class::Definition;
use super::error::ResolveError;
use super::loader::SourceLoader;
use super::path::DefinitionId;
use super::resolve::{link, AmbiguityPolicy};
use super::table::FlattenedTable;
use crate::Config;

/// Registry of definitions and memoized flattened tables
pub struct DefinitionRegistry {
    sources: RwLock<HashMap<DefinitionId, Arc<Definition>>>,
    tables: RwLock<HashMap<DefinitionId, Arc<FlattenedTable>>>,
    resolve_lock: Mutex<()>,
    loader: Option<Box<dyn SourceLoader>>,
    policy: AmbiguityPolicy,
    max_depth: usize,
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("sources", &self.sources.read().len())
            .field("tables", &self.tables.read().len())
            .field("loader", &self.loader.is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl DefinitionRegistry {
    /// Create an empty registry using the resolution settings of `config`
    pub fn new(config: &Config) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
            resolve_lock: Mutex::new(()),
            loader: None,
            policy: config.ambiguous_calls,
            max_depth: config.max_inheritance_depth,
        }
    }

    /// Load unknown definitions on demand through `loader`
    pub fn with_loader(mut self, loader: impl SourceLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Create a shared instance
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Store a definition source without resolving it.
    ///
    /// Any cached table embedding the previous version is dropped.
    pub fn register(&self, definition: Definition) {
        let _guard = self.resolve_lock.lock();
        self.replace_source(definition);
    }

    /// Register a definition and resolve it immediately.
    ///
    /// On failure the previous source (if any) is restored, so the registry
    /// keeps describing the last definition that compiled. Recompiling an
    /// unchanged declarative source keeps the cached table.
    pub fn compile(&self, definition: Definition) -> Result<Arc<FlattenedTable>, ResolveError> {
        let _guard = self.resolve_lock.lock();
        let id = definition.id.clone();

        if let Some(fingerprint) = definition.fingerprint() {
            if let Some(table) = self.tables.read().get(&id) {
                if table.fingerprint.as_deref() == Some(fingerprint.as_str()) {
                    debug!("{} unchanged, keeping cached table", id);
                    return Ok(table.clone());
                }
            }
        }

        let previous = self.replace_source(definition);
        match self.resolve_locked(&id, &mut Vec::new()) {
            Ok(table) => {
                info!(
                    "Compiled {} ({} fields, {} methods)",
                    id,
                    table.fields.len(),
                    table.methods.len()
                );
                Ok(table)
            }
            Err(e) => {
                let mut sources = self.sources.write();
                match previous {
                    Some(old) => {
                        sources.insert(id.clone(), old);
                    }
                    None => {
                        sources.remove(&id);
                    }
                }
                debug!("Compile of {} failed: {}", id, e);
                Err(e)
            }
        }
    }

    /// Get the flattened table for a definition, resolving it if needed
    pub fn get(&self, id: &DefinitionId) -> Result<Arc<FlattenedTable>, ResolveError> {
        if let Some(table) = self.tables.read().get(id) {
            return Ok(table.clone());
        }

        let _guard = self.resolve_lock.lock();
        self.resolve_locked(id, &mut Vec::new())
    }

    /// Get a table by path
    pub fn get_path(&self, path: &str) -> Result<Arc<FlattenedTable>, ResolveError> {
        self.get(&DefinitionId::new(path)?)
    }

    /// Drop the cached table of `id` and of every definition that embeds it.
    ///
    /// Returns the ids whose tables were dropped. Live instances keep the
    /// table they were created with.
    pub fn invalidate(&self, id: &DefinitionId) -> Vec<DefinitionId> {
        let _guard = self.resolve_lock.lock();
        self.invalidate_locked(id)
    }

    /// Remove a definition's source and every cached table depending on it
    pub fn unload(&self, id: &DefinitionId) -> bool {
        let _guard = self.resolve_lock.lock();
        self.invalidate_locked(id);
        let removed = self.sources.write().remove(id).is_some();
        if removed {
            info!("Unloaded {}", id);
        }
        removed
    }

    pub fn is_cached(&self, id: &DefinitionId) -> bool {
        self.tables.read().contains_key(id)
    }

    pub fn source(&self, id: &DefinitionId) -> Option<Arc<Definition>> {
        self.sources.read().get(id).cloned()
    }

    /// Ids of all registered sources, sorted
    pub fn definitions(&self) -> Vec<DefinitionId> {
        let mut ids: Vec<DefinitionId> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn replace_source(&self, definition: Definition) -> Option<Arc<Definition>> {
        let id = definition.id.clone();
        self.invalidate_locked(&id);
        self.sources.write().insert(id, Arc::new(definition))
    }

    fn invalidate_locked(&self, id: &DefinitionId) -> Vec<DefinitionId> {
        let mut tables = self.tables.write();
        let dropped: Vec<DefinitionId> = tables
            .iter()
            .filter(|(key, table)| *key == id || table.depends_on(id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dropped {
            tables.remove(key);
        }
        if !dropped.is_empty() {
            debug!("Invalidated {} table(s) depending on {}", dropped.len(), id);
        }
        dropped
    }

    /// Depth-first resolution; the caller holds `resolve_lock`
    fn resolve_locked(
        &self,
        id: &DefinitionId,
        visiting: &mut Vec<DefinitionId>,
    ) -> Result<Arc<FlattenedTable>, ResolveError> {
        if let Some(table) = self.tables.read().get(id) {
            return Ok(table.clone());
        }

        if visiting.contains(id) {
            let mut chain = visiting.clone();
            chain.push(id.clone());
            return Err(ResolveError::InheritanceCycle(chain));
        }

        // descendants already on the stack put `id` at least this deep
        if visiting.len() > self.max_depth {
            return Err(ResolveError::TooDeep {
                definition: visiting[0].clone(),
                limit: self.max_depth,
            });
        }

        let definition = self.load_source(id)?;

        visiting.push(id.clone());
        let parents = definition
            .ancestors
            .iter()
            .map(|ancestor| self.resolve_locked(ancestor, visiting))
            .collect::<Result<Vec<_>, _>>();
        visiting.pop();

        let table = link(&definition, &parents?, self.policy)?;
        if table.depth > self.max_depth {
            return Err(ResolveError::TooDeep {
                definition: id.clone(),
                limit: self.max_depth,
            });
        }

        let table = Arc::new(table);
        self.tables.write().insert(id.clone(), table.clone());
        debug!("Resolved {}", id);
        Ok(table)
    }

    fn load_source(&self, id: &DefinitionId) -> Result<Arc<Definition>, ResolveError> {
        if let Some(definition) = self.sources.read().get(id) {
            return Ok(definition.clone());
        }

        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| ResolveError::UnknownDefinition(id.clone()))?;
        let definition = loader
            .load(id)?
            .ok_or_else(|| ResolveError::UnknownDefinition(id.clone()))?;
        if &definition.id != id {
            return Err(ResolveError::Source {
                definition: id.clone(),
                message: format!("source declares {}", definition.id),
            });
        }

        let definition = Arc::new(definition);
        self.sources.write().insert(id.clone(), definition.clone());
        debug!("Loaded source for {}", id);
        Ok(definition)
    }
}
