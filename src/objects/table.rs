//! Flattened symbol tables: a definition merged with all of its ancestors

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::class::{FieldType, MethodBody, QualifiedCall};
use super::path::DefinitionId;

/// A field as seen by instances, tagged with the definition that declared it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSlot {
    pub owner: DefinitionId,
    #[serde(rename = "type")]
    pub ty: FieldType,
    pub default: serde_json::Value,
}

/// A method implementation after linkage.
///
/// Every qualified call declared by the body is already bound to the
/// implementation it will run.
#[derive(Debug)]
pub struct CompiledMethod {
    pub owner: DefinitionId,
    pub name: String,
    pub body: MethodBody,
    pub calls: Vec<BoundCall>,
}

impl CompiledMethod {
    /// Find the binding for a qualified call made by this body
    pub fn bound(&self, call: &QualifiedCall) -> Option<&Arc<CompiledMethod>> {
        self.calls
            .iter()
            .find(|b| &b.call == call)
            .map(|b| &b.target)
    }
}

#[derive(Debug)]
pub struct BoundCall {
    pub call: QualifiedCall,
    pub target: Arc<CompiledMethod>,
}

/// All implementations of one method name, oldest contributor first
#[derive(Debug, Clone)]
pub struct MethodSlot {
    pub implementations: Vec<Arc<CompiledMethod>>,
    /// Index of the implementation an unqualified invocation runs
    pub default: usize,
}

impl MethodSlot {
    pub fn default_impl(&self) -> &Arc<CompiledMethod> {
        &self.implementations[self.default]
    }

    /// Implementation contributed by `owner`, if any
    pub fn from_owner(&self, owner: &DefinitionId) -> Option<&Arc<CompiledMethod>> {
        self.implementations.iter().find(|m| &m.owner == owner)
    }

    /// Owners of every implementation, in list order
    pub fn owners(&self) -> Vec<&DefinitionId> {
        self.implementations.iter().map(|m| &m.owner).collect()
    }
}

/// The merged, conflict-checked view of a definition and its ancestors
#[derive(Debug, Clone)]
pub struct FlattenedTable {
    pub id: DefinitionId,
    /// Direct ancestors in declaration order
    pub ancestors: Vec<DefinitionId>,
    /// Every ancestor, depth-first in declaration order, without duplicates
    pub lineage: Vec<DefinitionId>,
    /// Longest ancestor chain above this definition (0 for a root)
    pub depth: usize,
    pub fields: BTreeMap<String, FieldSlot>,
    pub methods: BTreeMap<String, MethodSlot>,
    pub prototype: bool,
    /// Inherited auxiliaries first, then local ones
    pub auxiliaries: Vec<DefinitionId>,
    pub fingerprint: Option<String>,
}

impl FlattenedTable {
    /// Default implementation of `name`
    pub fn method(&self, name: &str) -> Option<&Arc<CompiledMethod>> {
        self.methods.get(name).map(MethodSlot::default_impl)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSlot> {
        self.fields.get(name)
    }

    /// Check if this definition is `ancestor` or inherits from it
    pub fn is_a(&self, ancestor: &DefinitionId) -> bool {
        &self.id == ancestor || self.lineage.contains(ancestor)
    }

    /// Whether the table embeds contributions of `id`
    pub fn depends_on(&self, id: &DefinitionId) -> bool {
        self.lineage.contains(id)
    }

    /// Initial field storage for a new instance
    pub fn default_fields(&self) -> super::Properties {
        self.fields
            .iter()
            .map(|(name, slot)| (name.clone(), slot.default.clone()))
            .collect()
    }

    /// Serializable summary, used by the CLI
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.clone(),
            ancestors: self.ancestors.clone(),
            lineage: self.lineage.clone(),
            fields: self.fields.clone(),
            methods: self
                .methods
                .iter()
                .map(|(name, slot)| {
                    let summary = MethodSummary {
                        implementations: slot.owners().into_iter().cloned().collect(),
                        default: slot.default_impl().owner.clone(),
                    };
                    (name.clone(), summary)
                })
                .collect(),
            prototype: self.prototype,
            auxiliaries: self.auxiliaries.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub id: DefinitionId,
    pub ancestors: Vec<DefinitionId>,
    pub lineage: Vec<DefinitionId>,
    pub fields: BTreeMap<String, FieldSlot>,
    pub methods: BTreeMap<String, MethodSummary>,
    pub prototype: bool,
    pub auxiliaries: Vec<DefinitionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub implementations: Vec<DefinitionId>,
    pub default: DefinitionId,
}
