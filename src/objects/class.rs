//! Definition sources: the locally declared symbols of one definition

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::context::CallContext;
use super::error::RuntimeError;
use super::path::{DefinitionId, PathValidationError};

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    String,
    Bool,
    /// Reference to another instance, stored as its numeric id
    Object,
    Mapping,
    Array,
    Mixed,
}

impl FieldType {
    /// Check whether a value may be stored in a field of this type.
    /// `null` is accepted for every type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        if value.is_null() {
            return true;
        }
        match self {
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::String => value.is_string(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Object => value.is_u64(),
            FieldType::Mapping => matches!(value, Value::Object(_)),
            FieldType::Array => value.is_array(),
            FieldType::Mixed => true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Object => "object",
            FieldType::Mapping => "mapping",
            FieldType::Array => "array",
            FieldType::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

/// A locally declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    #[serde(rename = "type")]
    pub ty: FieldType,
    #[serde(default)]
    pub default: serde_json::Value,
}

/// An explicit "call the ancestor's version" expression inside a method body.
///
/// Without `ancestor` the call targets whichever direct ancestor provides
/// `method`; with it, the named direct ancestor's chain is used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<DefinitionId>,
    pub method: String,
}

impl QualifiedCall {
    pub fn new(method: &str) -> Self {
        Self {
            ancestor: None,
            method: method.to_string(),
        }
    }

    pub fn of(ancestor: DefinitionId, method: &str) -> Self {
        Self {
            ancestor: Some(ancestor),
            method: method.to_string(),
        }
    }
}

impl fmt::Display for QualifiedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ancestor {
            Some(a) => write!(f, "{}::{}", a, self.method),
            None => write!(f, "::{}", self.method),
        }
    }
}

/// Signature of a native method body
pub type NativeFn =
    dyn Fn(&mut CallContext<'_>, &[serde_json::Value]) -> Result<serde_json::Value, RuntimeError>
        + Send
        + Sync;

/// A declarative method body: runs its qualified calls in order, assigns
/// fields on `this`, then returns a fixed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedBody {
    #[serde(default)]
    pub assign: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub returns: serde_json::Value,
}

/// Executable part of a method
#[derive(Clone)]
pub enum MethodBody {
    Native(Arc<NativeFn>),
    Scripted(ScriptedBody),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::Native(_) => f.write_str("Native(..)"),
            MethodBody::Scripted(body) => f.debug_tuple("Scripted").field(body).finish(),
        }
    }
}

/// A locally declared method
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub body: MethodBody,
    /// Qualified calls the body may make, bound at compile time
    pub calls: Vec<QualifiedCall>,
}

impl MethodDef {
    /// Create a method backed by a Rust closure
    pub fn native<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, &[serde_json::Value]) -> Result<serde_json::Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.to_string(),
            body: MethodBody::Native(Arc::new(body)),
            calls: Vec::new(),
        }
    }

    /// Create a declarative method
    pub fn scripted(name: &str, body: ScriptedBody) -> Self {
        Self {
            name: name.to_string(),
            body: MethodBody::Scripted(body),
            calls: Vec::new(),
        }
    }

    /// Declare an undisambiguated ancestor call (`::method()`)
    pub fn calls_ancestor(mut self, method: &str) -> Self {
        self.calls.push(QualifiedCall::new(method));
        self
    }

    /// Declare a call into a specific direct ancestor's chain (`ancestor::method()`)
    pub fn calls_ancestor_of(
        mut self,
        ancestor: &str,
        method: &str,
    ) -> Result<Self, PathValidationError> {
        self.calls
            .push(QualifiedCall::of(DefinitionId::new(ancestor)?, method));
        Ok(self)
    }
}

/// Source-level description of one definition: what it declares itself,
/// before any ancestor is merged in.
#[derive(Debug, Clone)]
pub struct Definition {
    pub id: DefinitionId,
    /// Declared ancestors, in declaration order
    pub ancestors: Vec<DefinitionId>,
    pub fields: BTreeMap<String, FieldDecl>,
    pub methods: BTreeMap<String, MethodDef>,
    /// Template only; instances are never destroyed through the normal path
    pub prototype: bool,
    /// Definitions instantiated and attached to every new instance
    pub auxiliaries: Vec<DefinitionId>,
}

impl Definition {
    /// Create an empty definition
    pub fn new(path: &str) -> Result<Self, PathValidationError> {
        Ok(Self::with_id(DefinitionId::new(path)?))
    }

    pub fn with_id(id: DefinitionId) -> Self {
        Self {
            id,
            ancestors: Vec::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
            prototype: false,
            auxiliaries: Vec::new(),
        }
    }

    /// Append an ancestor to the inheritance list
    pub fn add_ancestor(&mut self, path: &str) -> Result<(), PathValidationError> {
        let id = DefinitionId::new(path)?;
        if !self.ancestors.contains(&id) {
            self.ancestors.push(id);
        }
        Ok(())
    }

    /// Declare a field with its type and default value
    pub fn add_field(&mut self, name: &str, ty: FieldType, default: serde_json::Value) {
        self.fields
            .insert(name.to_string(), FieldDecl { ty, default });
    }

    /// Declare a method, replacing any local method of the same name
    pub fn add_method(&mut self, method: MethodDef) {
        self.methods.insert(method.name.clone(), method);
    }

    /// Declare an auxiliary attached during initialization
    pub fn add_auxiliary(&mut self, path: &str) -> Result<(), PathValidationError> {
        let id = DefinitionId::new(path)?;
        if !self.auxiliaries.contains(&id) {
            self.auxiliaries.push(id);
        }
        Ok(())
    }

    pub fn set_prototype(&mut self, prototype: bool) {
        self.prototype = prototype;
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// SHA-256 over the declaration, or `None` when a native body makes the
    /// source impossible to compare.
    pub fn fingerprint(&self) -> Option<String> {
        let mut methods = BTreeMap::new();
        for (name, method) in &self.methods {
            let MethodBody::Scripted(body) = &method.body else {
                return None;
            };
            methods.insert(
                name.clone(),
                serde_json::json!({ "calls": method.calls, "body": body }),
            );
        }

        let declaration = serde_json::json!({
            "id": self.id,
            "ancestors": self.ancestors,
            "fields": self.fields,
            "methods": methods,
            "prototype": self.prototype,
            "auxiliaries": self.auxiliaries,
        });
        let bytes = serde_json::to_vec(&declaration).ok()?;
        Some(hex::encode(Sha256::digest(&bytes)))
    }
}
