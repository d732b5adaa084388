//! Execution context handed to native method bodies

use std::sync::Arc;

use serde_json::Value;

use super::class::QualifiedCall;
use super::error::{ResolveError, RuntimeError};
use super::object::InstanceId;
use super::path::DefinitionId;
use super::store::ObjectSpace;
use super::table::CompiledMethod;
use crate::permissions::Principal;

/// `this`, the caller and the running implementation, plus access to the
/// object space for the duration of one method call.
///
/// Operations issued through the context act as the running instance:
/// the caller seen by their permission checks is `Principal::Object(this)`.
pub struct CallContext<'a> {
    space: &'a mut ObjectSpace,
    this: InstanceId,
    caller: Principal,
    method: Arc<CompiledMethod>,
}

impl<'a> CallContext<'a> {
    pub(super) fn new(
        space: &'a mut ObjectSpace,
        this: InstanceId,
        caller: Principal,
        method: Arc<CompiledMethod>,
    ) -> Self {
        Self {
            space,
            this,
            caller,
            method,
        }
    }

    pub fn this(&self) -> InstanceId {
        self.this
    }

    /// Principal that invoked the method
    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// Definition that contributed the running implementation
    pub fn definition(&self) -> &DefinitionId {
        &self.method.owner
    }

    /// Read-only view of the object space; mutations go through the
    /// methods below so they are checked as `this`
    pub fn space(&self) -> &ObjectSpace {
        self.space
    }

    /// Read a field of `this`
    pub fn get(&self, field: &str) -> Result<Value, RuntimeError> {
        self.space.get_field(self.this, field)
    }

    /// Assign a field of `this`
    pub fn set(&mut self, field: &str, value: Value) -> Result<(), RuntimeError> {
        self.space.assign(self.this, field, value)
    }

    /// Run the ancestor implementation bound to `::method()`
    pub fn call_ancestor(&mut self, method: &str, args: &[Value]) -> Result<Value, RuntimeError> {
        self.call_bound(&QualifiedCall::new(method), args)
    }

    /// Run the implementation bound to `ancestor::method()`
    pub fn call_ancestor_of(
        &mut self,
        ancestor: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let ancestor = DefinitionId::new(ancestor).map_err(ResolveError::from)?;
        self.call_bound(&QualifiedCall::of(ancestor, method), args)
    }

    fn call_bound(&mut self, call: &QualifiedCall, args: &[Value]) -> Result<Value, RuntimeError> {
        let target = self
            .method
            .bound(call)
            .cloned()
            .ok_or_else(|| RuntimeError::UnboundAncestorCall {
                method: self.method.name.clone(),
                call: call.to_string(),
            })?;
        let caller = self.caller.clone();
        self.space.call_method(self.this, target, args, &caller)
    }

    /// Invoke a method on another instance as `this`
    pub fn invoke(
        &mut self,
        target: InstanceId,
        method: &str,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        self.space
            .invoke(target, method, args, &Principal::Object(self.this))
    }

    /// Create an instance owned by `this`
    pub fn spawn(&mut self, path: &str) -> Result<InstanceId, RuntimeError> {
        self.space
            .instantiate_path(path, Principal::Object(self.this))
    }

    /// Attach `auxiliary` to `this`
    pub fn attach(&mut self, auxiliary: InstanceId) -> Result<(), RuntimeError> {
        self.space
            .attach(self.this, auxiliary, &Principal::Object(self.this))
    }

    /// Detach `auxiliary` from `this`; it stays live
    pub fn detach(&mut self, auxiliary: InstanceId) -> Result<(), RuntimeError> {
        self.space
            .detach(self.this, auxiliary, &Principal::Object(self.this))
    }

    /// Request destruction of another instance
    pub fn destroy(&mut self, target: InstanceId) -> Result<(), RuntimeError> {
        self.space
            .request_destroy(target, &Principal::Object(self.this))
    }
}
