//! Object space: instance creation, invocation and field access

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::class::MethodBody;
use super::error::{ResolveError, RuntimeError};
use super::object::{InstanceId, LifecycleState, Object};
use super::path::DefinitionId;
use super::registry::DefinitionRegistry;
use super::table::{CompiledMethod, FlattenedTable};
use crate::permissions::{check_permission, Action, CallerContext, PermissionResult, Principal};
use crate::Config;

/// All instances of one world, backed by a shared definition registry.
///
/// Single-threaded: every operation runs to completion before the next.
pub struct ObjectSpace {
    pub(super) registry: Arc<DefinitionRegistry>,
    pub(super) objects: HashMap<InstanceId, Object>,
    pub(super) prototypes: HashMap<DefinitionId, InstanceId>,
    next_id: u64,
    init_method: String,
    pub(super) destroy_hook: Option<String>,
    base_auxiliary: Option<DefinitionId>,
    /// Definitions currently attaching their auxiliaries, outermost first
    auxiliary_chain: Vec<DefinitionId>,
}

impl std::fmt::Debug for ObjectSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectSpace")
            .field("objects", &self.objects.len())
            .field("init_method", &self.init_method)
            .field("base_auxiliary", &self.base_auxiliary)
            .finish()
    }
}

impl ObjectSpace {
    /// Create an empty object space
    pub fn new(registry: Arc<DefinitionRegistry>, config: &Config) -> Result<Self, ResolveError> {
        let base_auxiliary = config
            .base_auxiliary
            .as_deref()
            .map(DefinitionId::new)
            .transpose()?;

        Ok(Self {
            registry,
            objects: HashMap::new(),
            prototypes: HashMap::new(),
            next_id: 1,
            init_method: config.init_method.clone(),
            destroy_hook: config.destroy_hook.clone(),
            base_auxiliary,
            auxiliary_chain: Vec::new(),
        })
    }

    pub fn registry(&self) -> &Arc<DefinitionRegistry> {
        &self.registry
    }

    /// Look up an instance in any state
    pub fn get(&self, id: InstanceId) -> Option<&Object> {
        self.objects.get(&id)
    }

    /// Number of instances that are not destroyed
    pub fn live_count(&self) -> usize {
        self.objects
            .values()
            .filter(|o| o.state != LifecycleState::Destroyed)
            .count()
    }

    /// Create an instance of `definition` owned by `owner`.
    ///
    /// Auxiliaries are attached and the init method has run by the time
    /// the id is returned.
    pub fn instantiate(
        &mut self,
        definition: &DefinitionId,
        owner: Principal,
    ) -> Result<InstanceId, RuntimeError> {
        self.create(definition, owner, false, false)
    }

    /// Create an instance from a definition path
    pub fn instantiate_path(
        &mut self,
        path: &str,
        owner: Principal,
    ) -> Result<InstanceId, RuntimeError> {
        let id = DefinitionId::new(path).map_err(ResolveError::from)?;
        self.instantiate(&id, owner)
    }

    /// Create an instance carrying the privilege flag.
    ///
    /// Only a privileged caller may do this; the flag cannot be set later.
    pub fn instantiate_privileged(
        &mut self,
        definition: &DefinitionId,
        owner: Principal,
        caller: &Principal,
    ) -> Result<InstanceId, RuntimeError> {
        self.require_privileged(caller, definition.as_str())?;
        self.create(definition, owner, true, false)
    }

    /// Create (or return) the template instance of a prototype definition
    pub fn load_prototype(
        &mut self,
        definition: &DefinitionId,
        caller: &Principal,
    ) -> Result<InstanceId, RuntimeError> {
        self.require_privileged(caller, definition.as_str())?;

        if let Some(id) = self.prototypes.get(definition) {
            if self.is_live(*id) {
                return Ok(*id);
            }
        }

        let id = self.create(definition, caller.clone(), false, true)?;
        self.prototypes.insert(definition.clone(), id);
        Ok(id)
    }

    /// Definition an instance conforms to
    pub fn query_type(&self, id: InstanceId) -> Result<DefinitionId, RuntimeError> {
        Ok(self.invokable(id)?.definition().clone())
    }

    /// Check whether an instance's definition is or inherits `ancestor`
    pub fn is_a(&self, id: InstanceId, ancestor: &DefinitionId) -> Result<bool, RuntimeError> {
        Ok(self.invokable(id)?.table.is_a(ancestor))
    }

    /// Invoke a method: the instance's own table first, then its attachments
    pub fn invoke(
        &mut self,
        id: InstanceId,
        method: &str,
        args: &[serde_json::Value],
        caller: &Principal,
    ) -> Result<serde_json::Value, RuntimeError> {
        let (target, compiled) = self.dispatch(id, method)?;
        if target != id {
            debug!("{}: '{}' forwarded to {}", id, method, target);
        }
        self.call_method(target, compiled, args, caller)
    }

    /// Read a field
    pub fn get_field(&self, id: InstanceId, field: &str) -> Result<serde_json::Value, RuntimeError> {
        let obj = self.invokable(id)?;
        obj.get_field(field)
            .cloned()
            .ok_or_else(|| RuntimeError::NoSuchField {
                instance: id,
                field: field.to_string(),
            })
    }

    /// Assign a field from outside the instance; the caller must own it or be privileged
    pub fn set_field(
        &mut self,
        id: InstanceId,
        field: &str,
        value: serde_json::Value,
        caller: &Principal,
    ) -> Result<(), RuntimeError> {
        let context = self.invokable(id)?.context();
        self.authorize(caller, Action::Modify, &context)?;
        self.assign(id, field, value)
    }

    pub(super) fn create(
        &mut self,
        definition: &DefinitionId,
        owner: Principal,
        privileged: bool,
        allow_prototype: bool,
    ) -> Result<InstanceId, RuntimeError> {
        let table = self.registry.get(definition)?;
        if table.prototype && !allow_prototype {
            return Err(RuntimeError::CannotInstantiatePrototype(definition.clone()));
        }

        let id = InstanceId(self.next_id);
        self.next_id += 1;
        self.objects
            .insert(id, Object::new(id, table.clone(), owner, privileged));
        debug!("Created {} ({})", id, definition);

        if let Err(e) = self.initialize(id, &table) {
            warn!("Initialization of {} ({}) failed: {}", id, definition, e);
            self.teardown(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Attach auxiliaries, then run the init method exactly once
    fn initialize(&mut self, id: InstanceId, table: &FlattenedTable) -> Result<(), RuntimeError> {
        if self.auxiliary_chain.contains(&table.id) {
            return Err(RuntimeError::AuxiliaryCycle(table.id.clone()));
        }

        let mut auxiliaries = Vec::new();
        if let Some(base) = &self.base_auxiliary {
            if !table.is_a(base) {
                auxiliaries.push(base.clone());
            }
        }
        for aux in &table.auxiliaries {
            if !auxiliaries.contains(aux) {
                auxiliaries.push(aux.clone());
            }
        }

        self.auxiliary_chain.push(table.id.clone());
        let attached = auxiliaries.iter().try_for_each(|aux| {
            let aux_id = self.create(aux, Principal::Object(id), false, false)?;
            self.link_attachment(id, aux_id);
            Ok::<(), RuntimeError>(())
        });
        self.auxiliary_chain.pop();
        attached?;

        if let Some(init) = table.method(&self.init_method).cloned() {
            let owner = self.objects[&id].owner.clone();
            self.call_method(id, init, &[], &owner)?;
        }
        Ok(())
    }

    /// Run one compiled implementation with `this` bound to `id`
    pub(super) fn call_method(
        &mut self,
        id: InstanceId,
        method: Arc<CompiledMethod>,
        args: &[serde_json::Value],
        caller: &Principal,
    ) -> Result<serde_json::Value, RuntimeError> {
        match &method.body {
            MethodBody::Native(body) => {
                let body = body.clone();
                let mut ctx = super::CallContext::new(self, id, caller.clone(), method.clone());
                (*body)(&mut ctx, args)
            }
            MethodBody::Scripted(body) => {
                for bound in &method.calls {
                    self.call_method(id, bound.target.clone(), args, caller)?;
                }
                for (field, value) in &body.assign {
                    self.assign(id, field, value.clone())?;
                }
                Ok(body.returns.clone())
            }
        }
    }

    /// Type-checked field assignment without authorization
    pub(super) fn assign(
        &mut self,
        id: InstanceId,
        field: &str,
        value: serde_json::Value,
    ) -> Result<(), RuntimeError> {
        let obj = self.invokable_mut(id)?;
        let slot = obj.table.field(field).ok_or_else(|| RuntimeError::NoSuchField {
            instance: id,
            field: field.to_string(),
        })?;
        if !slot.ty.accepts(&value) {
            return Err(RuntimeError::TypeMismatch {
                instance: id,
                field: field.to_string(),
                expected: slot.ty.to_string(),
            });
        }
        obj.fields.insert(field.to_string(), value);
        Ok(())
    }

    pub(super) fn is_live(&self, id: InstanceId) -> bool {
        self.objects
            .get(&id)
            .is_some_and(|o| o.state == LifecycleState::Live)
    }

    /// An instance that may still run methods (live or pending destruction)
    pub(super) fn invokable(&self, id: InstanceId) -> Result<&Object, RuntimeError> {
        match self.objects.get(&id) {
            None => Err(RuntimeError::NoSuchInstance(id)),
            Some(o) if o.state == LifecycleState::Destroyed => Err(RuntimeError::UseAfterDestroy(id)),
            Some(o) => Ok(o),
        }
    }

    fn invokable_mut(&mut self, id: InstanceId) -> Result<&mut Object, RuntimeError> {
        match self.objects.get_mut(&id) {
            None => Err(RuntimeError::NoSuchInstance(id)),
            Some(o) if o.state == LifecycleState::Destroyed => Err(RuntimeError::UseAfterDestroy(id)),
            Some(o) => Ok(o),
        }
    }

    /// An instance in the `Live` state
    pub(super) fn live(&self, id: InstanceId) -> Result<&Object, RuntimeError> {
        let obj = self.invokable(id)?;
        if obj.state != LifecycleState::Live {
            return Err(RuntimeError::NotLive {
                instance: id,
                state: obj.state,
            });
        }
        Ok(obj)
    }

    /// Resolve the caller's privilege from explicit identity
    pub(super) fn caller_context(&self, caller: &Principal) -> CallerContext {
        let privileged = match caller {
            Principal::System => true,
            Principal::Account { level, .. } => level.is_privileged(),
            Principal::Object(id) => self
                .objects
                .get(id)
                .is_some_and(|o| o.state != LifecycleState::Destroyed && o.privileged),
        };
        CallerContext {
            principal: caller.clone(),
            privileged,
        }
    }

    pub(super) fn authorize(
        &self,
        caller: &Principal,
        action: Action,
        target: &crate::permissions::ObjectContext,
    ) -> Result<(), RuntimeError> {
        match check_permission(&self.caller_context(caller), action, target) {
            PermissionResult::Allowed => Ok(()),
            PermissionResult::Denied(reason) => {
                warn!("Refused {:?} on {} for {}: {}", action, target.object_id, caller, reason);
                Err(RuntimeError::Unauthorized {
                    target: target.object_id.to_string(),
                    reason,
                })
            }
        }
    }

    fn require_privileged(&self, caller: &Principal, target: &str) -> Result<(), RuntimeError> {
        if self.caller_context(caller).privileged {
            return Ok(());
        }
        warn!("Refused privileged operation on {} for {}", target, caller);
        Err(RuntimeError::Unauthorized {
            target: target.to_string(),
            reason: format!("{} is not privileged", caller),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::class::{Definition, FieldType, MethodDef, ScriptedBody};
    use crate::permissions::AccessLevel;
    use serde_json::json;

    fn space(defs: Vec<Definition>) -> ObjectSpace {
        let registry = DefinitionRegistry::default().shared();
        for def in defs {
            registry.register(def);
        }
        ObjectSpace::new(registry, &Config::default()).unwrap()
    }

    fn item() -> Definition {
        let mut def = Definition::new("/std/item").unwrap();
        def.add_field("weight", FieldType::Int, json!(1));
        def.add_field("short", FieldType::String, json!(""));
        let mut body = ScriptedBody::default();
        body.assign.insert("short".to_string(), json!("an item"));
        def.add_method(MethodDef::scripted("create", body));
        def
    }

    #[test]
    fn test_instantiate_runs_init() {
        let mut space = space(vec![item()]);
        let id = space
            .instantiate_path("/std/item", Principal::System)
            .unwrap();

        assert_eq!(space.get_field(id, "short").unwrap(), json!("an item"));
        assert_eq!(space.get_field(id, "weight").unwrap(), json!(1));
        assert_eq!(space.query_type(id).unwrap().as_str(), "/std/item");
        assert_eq!(space.live_count(), 1);
    }

    #[test]
    fn test_unknown_definition() {
        let mut space = space(vec![]);
        let err = space
            .instantiate_path("/std/item", Principal::System)
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Compile(ResolveError::UnknownDefinition(_))
        ));
        assert_eq!(space.live_count(), 0);
    }

    #[test]
    fn test_set_field_checks_owner_and_type() {
        let mut space = space(vec![item()]);
        let alice = Principal::account("alice", AccessLevel::Player);
        let bob = Principal::account("bob", AccessLevel::Player);
        let id = space.instantiate_path("/std/item", alice.clone()).unwrap();

        space.set_field(id, "weight", json!(5), &alice).unwrap();
        assert_eq!(space.get_field(id, "weight").unwrap(), json!(5));

        assert!(matches!(
            space.set_field(id, "weight", json!(6), &bob),
            Err(RuntimeError::Unauthorized { .. })
        ));
        assert!(matches!(
            space.set_field(id, "weight", json!("heavy"), &alice),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            space.set_field(id, "colour", json!("red"), &alice),
            Err(RuntimeError::NoSuchField { .. })
        ));
        assert_eq!(space.get_field(id, "weight").unwrap(), json!(5));
    }

    #[test]
    fn test_privileged_instantiation() {
        let mut space = space(vec![item()]);
        let def = DefinitionId::new("/std/item").unwrap();
        let player = Principal::account("alice", AccessLevel::Player);
        let wizard = Principal::account("merlin", AccessLevel::Wizard);

        assert!(matches!(
            space.instantiate_privileged(&def, player.clone(), &player),
            Err(RuntimeError::Unauthorized { .. })
        ));
        let id = space
            .instantiate_privileged(&def, wizard.clone(), &wizard)
            .unwrap();
        assert!(space.get(id).unwrap().is_privileged());
        assert!(space.caller_context(&Principal::Object(id)).privileged);
    }

    #[test]
    fn test_failed_init_leaves_nothing_live() {
        let mut def = item();
        def.add_method(MethodDef::native("create", |_, _| {
            Err(RuntimeError::method("create", "refusing to exist"))
        }));
        let mut space = space(vec![def]);

        let err = space
            .instantiate_path("/std/item", Principal::System)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Method { .. }));
        assert_eq!(space.live_count(), 0);
    }

    #[test]
    fn test_invalid_base_auxiliary() {
        let config = Config {
            base_auxiliary: Some("not a path".to_string()),
            ..Config::default()
        };
        assert!(ObjectSpace::new(DefinitionRegistry::default().shared(), &config).is_err());
    }

    #[test]
    fn test_auxiliary_cycle_refused() {
        let mut lantern = Definition::new("/obj/lantern").unwrap();
        lantern.add_auxiliary("/obj/wick").unwrap();
        let mut wick = Definition::new("/obj/wick").unwrap();
        wick.add_auxiliary("/obj/lantern").unwrap();
        let mut space = space(vec![lantern, wick]);

        let err = space
            .instantiate_path("/obj/lantern", Principal::System)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::AuxiliaryCycle(def) if def.as_str() == "/obj/lantern"));
        assert_eq!(space.live_count(), 0);
    }

    #[test]
    fn test_create_may_spawn_its_own_definition() {
        let mut egg = Definition::new("/obj/egg").unwrap();
        egg.add_field("twin", FieldType::Object, json!(null));
        egg.add_method(MethodDef::native("create", |ctx, _| {
            if matches!(ctx.caller(), Principal::Object(_)) {
                return Ok(json!(null));
            }
            let twin = ctx.spawn("/obj/egg")?;
            ctx.set("twin", twin.to_value())?;
            Ok(json!(null))
        }));
        let mut space = space(vec![egg]);

        let id = space.instantiate_path("/obj/egg", Principal::System).unwrap();
        let twin = InstanceId::from_value(&space.get_field(id, "twin").unwrap()).unwrap();
        assert_eq!(space.query_type(twin).unwrap().as_str(), "/obj/egg");
        assert_eq!(space.get(twin).unwrap().owner, Principal::Object(id));
        assert_eq!(space.live_count(), 2);
    }
}
