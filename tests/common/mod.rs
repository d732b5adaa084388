//! Common test utilities - ObjectTest harness for object model scenarios

#![allow(dead_code)]

use std::sync::Arc;

use mudobj::objects::{
    CallContext, Definition, DefinitionRegistry, FieldType, FlattenedTable, InstanceId,
    MethodDef, ObjectSpace, RuntimeError,
};
use mudobj::permissions::{AccessLevel, Principal};
use mudobj::Config;
use serde_json::{json, Value};

/// A registry plus an object space sharing it
pub struct ObjectTest {
    pub registry: Arc<DefinitionRegistry>,
    pub space: ObjectSpace,
}

impl ObjectTest {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let registry = DefinitionRegistry::new(&config).shared();
        let space = ObjectSpace::new(registry.clone(), &config).expect("valid config");
        Self { registry, space }
    }

    /// Compile a definition, panicking on any resolution error
    pub fn define(&self, definition: Definition) -> Arc<FlattenedTable> {
        let id = definition.id.clone();
        self.registry
            .compile(definition)
            .unwrap_or_else(|e| panic!("failed to compile {}: {}", id, e))
    }

    /// Instantiate as the system
    pub fn spawn(&mut self, path: &str) -> InstanceId {
        self.spawn_as(path, Principal::System)
    }

    pub fn spawn_as(&mut self, path: &str, owner: Principal) -> InstanceId {
        self.space
            .instantiate_path(path, owner)
            .unwrap_or_else(|e| panic!("failed to instantiate {}: {}", path, e))
    }

    pub fn call(&mut self, id: InstanceId, method: &str) -> Result<Value, RuntimeError> {
        self.space.invoke(id, method, &[], &Principal::System)
    }
}

pub fn alice() -> Principal {
    Principal::account("alice", AccessLevel::Player)
}

pub fn bob() -> Principal {
    Principal::account("bob", AccessLevel::Player)
}

pub fn wizard() -> Principal {
    Principal::account("merlin", AccessLevel::Wizard)
}

pub fn definition(path: &str, ancestors: &[&str]) -> Definition {
    let mut def = Definition::new(path).expect("valid path");
    for ancestor in ancestors {
        def.add_ancestor(ancestor).expect("valid ancestor path");
    }
    def
}

/// Push `entry` onto the `log` array field of `this`
pub fn append_log(ctx: &mut CallContext<'_>, entry: &str) -> Result<Value, RuntimeError> {
    let mut log = ctx.get("log")?;
    match log.as_array_mut() {
        Some(items) => items.push(json!(entry)),
        None => log = json!([entry]),
    }
    ctx.set("log", log)?;
    Ok(Value::Null)
}

/// `/std/base`: declares `log` and appends "base" on creation
pub fn logged_base() -> Definition {
    let mut def = definition("/std/base", &[]);
    def.add_field("log", FieldType::Array, json!([]));
    def.add_method(MethodDef::native("create", |ctx, _| append_log(ctx, "base")));
    def
}

/// A definition whose `create` runs the inherited `create` first, then
/// appends its own name
pub fn logged_child(path: &str, ancestors: &[&str], entry: &'static str) -> Definition {
    let mut def = definition(path, ancestors);
    def.add_method(
        MethodDef::native("create", move |ctx, args| {
            ctx.call_ancestor("create", args)?;
            append_log(ctx, entry)
        })
        .calls_ancestor("create"),
    );
    def
}
