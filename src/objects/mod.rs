//! Object system - LPC-style definitions, instances and their lifecycle

mod class;
mod compose;
mod context;
mod error;
mod lifecycle;
mod loader;
mod object;
mod path;
mod registry;
mod resolve;
mod store;
mod table;

pub use class::{
    Definition, FieldDecl, FieldType, MethodBody, MethodDef, NativeFn, QualifiedCall,
    ScriptedBody,
};
pub use compose::Responder;
pub use context::CallContext;
pub use error::{ResolveError, RuntimeError};
pub use loader::{parse_definition, FileSource, SourceLoader};
pub use object::{InstanceId, InstanceInfo, LifecycleState, Object, Properties};
pub use path::{validate_definition_path, DefinitionId, PathValidationError};
pub use registry::DefinitionRegistry;
pub use resolve::{link, resolve_qualified_call, AmbiguityPolicy};
pub use store::ObjectSpace;
pub use table::{
    BoundCall, CompiledMethod, FieldSlot, FlattenedTable, MethodSlot, MethodSummary, TableSummary,
};
