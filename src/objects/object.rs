//! Instances and their per-object state

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::path::DefinitionId;
use super::table::FlattenedTable;
use crate::permissions::{ObjectContext, Principal};

/// Field storage is JSON-compatible key-value pairs
pub type Properties = HashMap<String, serde_json::Value>;

/// Unique instance identifier within an object space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Encode as a field value (`object` typed fields store the raw id)
    pub fn to_value(self) -> serde_json::Value {
        serde_json::Value::from(self.0)
    }

    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        value.as_u64().map(InstanceId)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of an instance: `Live -> PendingDestroy -> Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Live,
    PendingDestroy,
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Live => f.write_str("live"),
            LifecycleState::PendingDestroy => f.write_str("pending destroy"),
            LifecycleState::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// A live allocation conforming to one definition's flattened table.
///
/// The table is captured at creation; recompiling the definition later
/// does not reshape existing instances.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: InstanceId,
    pub(crate) table: Arc<FlattenedTable>,
    /// Entity that caused the creation (non-owning back-reference)
    pub owner: Principal,
    pub(crate) privileged: bool,
    pub(crate) state: LifecycleState,
    pub(crate) fields: Properties,
    /// Exclusively owned auxiliaries, in attachment order
    pub(crate) attachments: Vec<InstanceId>,
    pub(crate) host: Option<InstanceId>,
    pub(crate) prototype: bool,
    pub created_at: String,
}

impl Object {
    pub(crate) fn new(
        id: InstanceId,
        table: Arc<FlattenedTable>,
        owner: Principal,
        privileged: bool,
    ) -> Self {
        Self {
            id,
            fields: table.default_fields(),
            prototype: table.prototype,
            table,
            owner,
            privileged,
            state: LifecycleState::Live,
            attachments: Vec::new(),
            host: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn definition(&self) -> &DefinitionId {
        &self.table.id
    }

    pub fn table(&self) -> &Arc<FlattenedTable> {
        &self.table
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Whether this is the template instance of a prototype definition
    pub fn is_prototype(&self) -> bool {
        self.prototype
    }

    pub fn attachments(&self) -> &[InstanceId] {
        &self.attachments
    }

    pub fn host(&self) -> Option<InstanceId> {
        self.host
    }

    pub fn get_field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    /// Context for permission checks
    pub fn context(&self) -> ObjectContext {
        ObjectContext {
            object_id: self.id,
            owner: self.owner.clone(),
        }
    }

    /// Drop field storage and attachments; the id stays as a tombstone
    pub(crate) fn release(&mut self) {
        self.fields = Properties::new();
        self.attachments.clear();
        self.host = None;
        self.state = LifecycleState::Destroyed;
    }

    pub fn describe(&self) -> InstanceInfo {
        InstanceInfo {
            id: self.id,
            definition: self.table.id.clone(),
            owner: self.owner.clone(),
            state: self.state,
            privileged: self.privileged,
            prototype: self.prototype,
            host: self.host,
            attachments: self.attachments.clone(),
            fields: self.fields.clone(),
            created_at: self.created_at.clone(),
        }
    }
}

/// Serializable snapshot of an instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    pub id: InstanceId,
    pub definition: DefinitionId,
    pub owner: Principal,
    pub state: LifecycleState,
    pub privileged: bool,
    pub prototype: bool,
    pub host: Option<InstanceId>,
    pub attachments: Vec<InstanceId>,
    pub fields: Properties,
    pub created_at: String,
}
