//! Compile-time and runtime errors of the object model

use thiserror::Error;

use super::object::{InstanceId, LifecycleState};
use super::path::{DefinitionId, PathValidationError};

/// Errors raised while linking a definition against its ancestors.
///
/// All are fatal to the affected definition: nothing is cached for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{definition}: field '{field}' is declared by both {first} and {second}")]
    FieldConflict {
        definition: DefinitionId,
        field: String,
        first: DefinitionId,
        second: DefinitionId,
    },

    #[error("{definition}: field '{field}' shadows the one declared by {ancestor}")]
    ShadowConflict {
        definition: DefinitionId,
        field: String,
        ancestor: DefinitionId,
    },

    #[error("{definition}: no ancestor implements '{method}'")]
    NoSuchAncestorMethod {
        definition: DefinitionId,
        method: String,
    },

    #[error("{definition}: call to ::{method} is ambiguous between {candidates:?}")]
    AmbiguousAncestorCall {
        definition: DefinitionId,
        method: String,
        candidates: Vec<DefinitionId>,
    },

    #[error("{definition}: {ancestor} is not a direct ancestor")]
    NotAnAncestor {
        definition: DefinitionId,
        ancestor: DefinitionId,
    },

    #[error("unknown definition {0}")]
    UnknownDefinition(DefinitionId),

    #[error("inheritance cycle: {}", format_chain(.0))]
    InheritanceCycle(Vec<DefinitionId>),

    #[error("{definition}: inheritance deeper than {limit} levels")]
    TooDeep {
        definition: DefinitionId,
        limit: usize,
    },

    #[error("invalid definition path: {0}")]
    InvalidPath(#[from] PathValidationError),

    #[error("{definition}: failed to load source: {message}")]
    Source {
        definition: DefinitionId,
        message: String,
    },
}

fn format_chain(chain: &[DefinitionId]) -> String {
    chain
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised by operations on live instances.
///
/// None of these leave the instance graph modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("{instance} has no method '{method}'")]
    NoSuchMethod { instance: InstanceId, method: String },

    #[error("{0} has been destroyed")]
    UseAfterDestroy(InstanceId),

    #[error("not authorized on {target}: {reason}")]
    Unauthorized { target: String, reason: String },

    #[error("{instance} is a prototype of {definition} and cannot be destroyed")]
    CannotDestroyPrototype {
        instance: InstanceId,
        definition: DefinitionId,
    },

    #[error("{0} is a prototype and cannot be instantiated")]
    CannotInstantiatePrototype(DefinitionId),

    #[error("no such instance {0}")]
    NoSuchInstance(InstanceId),

    #[error("{instance} has no field '{field}'")]
    NoSuchField { instance: InstanceId, field: String },

    #[error("field '{field}' of {instance} expects {expected}")]
    TypeMismatch {
        instance: InstanceId,
        field: String,
        expected: String,
    },

    #[error("{auxiliary} is already attached to {host}")]
    AlreadyAttached {
        auxiliary: InstanceId,
        host: InstanceId,
    },

    #[error("{auxiliary} is not attached to {host}")]
    NotAttached {
        auxiliary: InstanceId,
        host: InstanceId,
    },

    #[error("attaching {auxiliary} to {host} would create a cycle")]
    AttachmentCycle {
        auxiliary: InstanceId,
        host: InstanceId,
    },

    #[error("{instance} is {state}")]
    NotLive {
        instance: InstanceId,
        state: LifecycleState,
    },

    #[error("{instance} is already being destroyed")]
    DestroyInProgress { instance: InstanceId },

    #[error("{0} is a prototype and cannot be attached")]
    PrototypeAttachment(InstanceId),

    #[error("{0} is reachable from its own auxiliaries")]
    AuxiliaryCycle(DefinitionId),

    #[error("'{method}' did not declare ancestor call {call}")]
    UnboundAncestorCall { method: String, call: String },

    #[error("{method}: {message}")]
    Method { method: String, message: String },

    #[error(transparent)]
    Compile(#[from] ResolveError),
}

impl RuntimeError {
    /// Build a failure raised by a method body
    pub fn method(method: &str, message: impl Into<String>) -> Self {
        RuntimeError::Method {
            method: method.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> DefinitionId {
        DefinitionId::new(path).unwrap()
    }

    #[test]
    fn test_resolve_error_messages() {
        let err = ResolveError::FieldConflict {
            definition: id("/c"),
            field: "hp".to_string(),
            first: id("/a"),
            second: id("/b"),
        };
        assert_eq!(err.to_string(), "/c: field 'hp' is declared by both /a and /b");

        let err = ResolveError::InheritanceCycle(vec![id("/a"), id("/b"), id("/a")]);
        assert_eq!(err.to_string(), "inheritance cycle: /a -> /b -> /a");
    }

    #[test]
    fn test_runtime_error_wraps_compile_error() {
        let err: RuntimeError = ResolveError::UnknownDefinition(id("/missing")).into();
        assert_eq!(err.to_string(), "unknown definition /missing");
    }
}
