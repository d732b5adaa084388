//! Runtime composition: attached auxiliaries and forwarded dispatch
//!
//! An operation is looked up in two levels. The instance's own flattened
//! table answers first; failing that, each attachment is asked in
//! attachment order, and the first that responds runs the method with
//! itself as `this`.

use std::sync::Arc;

use tracing::debug;

use super::error::RuntimeError;
use super::object::{InstanceId, LifecycleState};
use super::store::ObjectSpace;
use super::table::{CompiledMethod, FlattenedTable};
use crate::permissions::{Action, Principal};

/// Anything that can answer "which implementation runs `name`?"
pub trait Responder {
    fn respond(&self, name: &str) -> Option<&Arc<CompiledMethod>>;
}

impl Responder for FlattenedTable {
    fn respond(&self, name: &str) -> Option<&Arc<CompiledMethod>> {
        self.method(name)
    }
}

impl ObjectSpace {
    /// Find the instance and implementation that satisfy `method` on `id`
    pub(super) fn dispatch(
        &self,
        id: InstanceId,
        method: &str,
    ) -> Result<(InstanceId, Arc<CompiledMethod>), RuntimeError> {
        let obj = self.invokable(id)?;
        if let Some(found) = obj.table.respond(method) {
            return Ok((id, found.clone()));
        }

        for aux in &obj.attachments {
            match self.dispatch(*aux, method) {
                Ok(found) => return Ok(found),
                Err(RuntimeError::NoSuchMethod { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(RuntimeError::NoSuchMethod {
            instance: id,
            method: method.to_string(),
        })
    }

    /// Whether invoking `method` on `id` would find an implementation
    pub fn responds_to(&self, id: InstanceId, method: &str) -> bool {
        self.dispatch(id, method).is_ok()
    }

    /// Give `host` exclusive ownership of `auxiliary`.
    ///
    /// The caller must control both instances.
    pub fn attach(
        &mut self,
        host: InstanceId,
        auxiliary: InstanceId,
        caller: &Principal,
    ) -> Result<(), RuntimeError> {
        let host_context = self.live(host)?.context();
        let aux = self.live(auxiliary)?;
        let aux_context = aux.context();
        let (aux_prototype, aux_host) = (aux.prototype, aux.host);

        self.authorize(caller, Action::Attach, &host_context)?;
        self.authorize(caller, Action::Attach, &aux_context)?;

        if host == auxiliary {
            return Err(RuntimeError::AttachmentCycle { auxiliary, host });
        }
        if aux_prototype {
            return Err(RuntimeError::PrototypeAttachment(auxiliary));
        }
        if let Some(current) = aux_host {
            return Err(RuntimeError::AlreadyAttached {
                auxiliary,
                host: current,
            });
        }

        // auxiliary must not already (transitively) host `host`
        let mut cursor = self.objects.get(&host).and_then(|o| o.host);
        while let Some(above) = cursor {
            if above == auxiliary {
                return Err(RuntimeError::AttachmentCycle { auxiliary, host });
            }
            cursor = self.objects.get(&above).and_then(|o| o.host);
        }

        self.link_attachment(host, auxiliary);
        Ok(())
    }

    /// Relinquish `auxiliary` without destroying it
    pub fn detach(
        &mut self,
        host: InstanceId,
        auxiliary: InstanceId,
        caller: &Principal,
    ) -> Result<(), RuntimeError> {
        let host_obj = self.live(host)?;
        if !host_obj.attachments.contains(&auxiliary) {
            return Err(RuntimeError::NotAttached { auxiliary, host });
        }
        let host_context = host_obj.context();
        let aux_context = self.invokable(auxiliary)?.context();

        self.authorize(caller, Action::Attach, &host_context)?;
        self.authorize(caller, Action::Attach, &aux_context)?;

        self.unlink_attachment(host, auxiliary);
        Ok(())
    }

    pub(super) fn link_attachment(&mut self, host: InstanceId, auxiliary: InstanceId) {
        if let Some(obj) = self.objects.get_mut(&auxiliary) {
            obj.host = Some(host);
        }
        if let Some(obj) = self.objects.get_mut(&host) {
            obj.attachments.push(auxiliary);
        }
        debug!("Attached {} to {}", auxiliary, host);
    }

    pub(super) fn unlink_attachment(&mut self, host: InstanceId, auxiliary: InstanceId) {
        if let Some(obj) = self.objects.get_mut(&host) {
            obj.attachments.retain(|a| *a != auxiliary);
        }
        if let Some(obj) = self.objects.get_mut(&auxiliary) {
            if obj.host == Some(host) {
                obj.host = None;
            }
        }
        debug!("Detached {} from {}", auxiliary, host);
    }

    /// Live attachments of `id` and all of theirs, post-order (deepest first, `id` last).
    ///
    /// Instances already pending destruction belong to an outer teardown
    /// and are left out.
    pub(super) fn attachment_tree(&self, id: InstanceId) -> Vec<InstanceId> {
        let mut order = Vec::new();
        self.collect_tree(id, &mut order);
        order
    }

    fn collect_tree(&self, id: InstanceId, order: &mut Vec<InstanceId>) {
        let Some(obj) = self.objects.get(&id) else {
            return;
        };
        if obj.state != LifecycleState::Live || order.contains(&id) {
            return;
        }
        for aux in &obj.attachments {
            self.collect_tree(*aux, order);
        }
        order.push(id);
    }
}
