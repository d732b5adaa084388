//! Lifecycle authority: gated, cascading destruction

use tracing::{info, warn};

use super::error::RuntimeError;
use super::object::{InstanceId, LifecycleState};
use super::store::ObjectSpace;
use crate::permissions::{Action, Principal};

impl ObjectSpace {
    /// Destroy `id` and everything attached to it.
    ///
    /// Only the recorded owner or a privileged caller may do this, and
    /// prototype instances are never destroyed. On refusal nothing changes.
    pub fn request_destroy(
        &mut self,
        id: InstanceId,
        caller: &Principal,
    ) -> Result<(), RuntimeError> {
        let obj = self
            .objects
            .get(&id)
            .ok_or(RuntimeError::NoSuchInstance(id))?;
        match obj.state {
            LifecycleState::Destroyed => return Err(RuntimeError::UseAfterDestroy(id)),
            LifecycleState::PendingDestroy => {
                return Err(RuntimeError::DestroyInProgress { instance: id })
            }
            LifecycleState::Live => {}
        }

        let context = obj.context();
        let prototype = obj.prototype;
        let definition = obj.definition().clone();

        self.authorize(caller, Action::Destroy, &context)?;
        if prototype {
            warn!("Refused to destroy prototype {} ({})", id, definition);
            return Err(RuntimeError::CannotDestroyPrototype {
                instance: id,
                definition,
            });
        }

        self.destroy_tree(id, true);
        Ok(())
    }

    /// Release a partially initialized instance without running hooks
    pub(super) fn teardown(&mut self, id: InstanceId) {
        self.destroy_tree(id, false);
    }

    fn destroy_tree(&mut self, id: InstanceId, run_hooks: bool) {
        let order = self.attachment_tree(id);
        for target in &order {
            if let Some(obj) = self.objects.get_mut(target) {
                obj.state = LifecycleState::PendingDestroy;
            }
        }

        if let Some(hook) = self.destroy_hook.clone().filter(|_| run_hooks) {
            for target in &order {
                let Some(method) = self
                    .objects
                    .get(target)
                    .and_then(|o| o.table.method(&hook).cloned())
                else {
                    continue;
                };
                if let Err(e) = self.call_method(*target, method, &[], &Principal::System) {
                    warn!("{} hook of {} failed: {}", hook, target, e);
                }
            }
        }

        if let Some(host) = self.objects.get(&id).and_then(|o| o.host) {
            self.unlink_attachment(host, id);
        }

        for target in &order {
            if let Some(obj) = self.objects.get_mut(target) {
                obj.release();
                info!("Destroyed {} ({})", target, obj.definition());
            }
        }
    }
}
