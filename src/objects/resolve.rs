//! Ancestor linkage
//!
//! Merges the already-flattened tables of a definition's ancestors left to
//! right, then layers the definition's own symbols on top:
//! - the same field reaching the table from two different declaring
//!   definitions is a `FieldConflict`; reaching it twice through a shared
//!   common ancestor is not
//! - methods never conflict; each name keeps an ordered list of every
//!   contributing implementation
//! - a local field whose name is already inherited is a `ShadowConflict`
//! - a local method becomes the default target without erasing the
//!   inherited implementations
//!
//! Qualified calls in local method bodies are bound here as well, so an
//! invalid `::method()` fails the compile instead of the call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::class::{Definition, MethodDef, QualifiedCall};
use super::error::ResolveError;
use super::path::DefinitionId;
use super::table::{BoundCall, CompiledMethod, FieldSlot, FlattenedTable, MethodSlot};

/// What an undisambiguated qualified call does when several direct
/// ancestors implement the method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Bind to the first provider in declaration order
    #[default]
    FirstContributor,
    /// Refuse to compile
    Reject,
}

/// Link `def` against the flattened tables of its direct ancestors.
///
/// `parents` must be in the same order as `def.ancestors`.
pub fn link(
    def: &Definition,
    parents: &[Arc<FlattenedTable>],
    policy: AmbiguityPolicy,
) -> Result<FlattenedTable, ResolveError> {
    let mut lineage: Vec<DefinitionId> = Vec::new();
    let mut fields: BTreeMap<String, FieldSlot> = BTreeMap::new();
    let mut methods: BTreeMap<String, MethodSlot> = BTreeMap::new();
    let mut auxiliaries: Vec<DefinitionId> = Vec::new();

    for parent in parents {
        for id in std::iter::once(&parent.id).chain(parent.lineage.iter()) {
            if !lineage.contains(id) {
                lineage.push(id.clone());
            }
        }

        for (name, slot) in &parent.fields {
            match fields.get(name) {
                Some(existing) if existing.owner != slot.owner => {
                    return Err(ResolveError::FieldConflict {
                        definition: def.id.clone(),
                        field: name.clone(),
                        first: existing.owner.clone(),
                        second: slot.owner.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    fields.insert(name.clone(), slot.clone());
                }
            }
        }

        for (name, slot) in &parent.methods {
            merge_method(&mut methods, name, slot);
        }

        for aux in &parent.auxiliaries {
            if !auxiliaries.contains(aux) {
                auxiliaries.push(aux.clone());
            }
        }
    }

    for (name, decl) in &def.fields {
        if let Some(existing) = fields.get(name) {
            return Err(ResolveError::ShadowConflict {
                definition: def.id.clone(),
                field: name.clone(),
                ancestor: existing.owner.clone(),
            });
        }
        fields.insert(
            name.clone(),
            FieldSlot {
                owner: def.id.clone(),
                ty: decl.ty,
                default: decl.default.clone(),
            },
        );
    }

    for method in def.methods.values() {
        let compiled = Arc::new(compile_method(def, method, parents, policy)?);
        let slot = methods.entry(method.name.clone()).or_insert(MethodSlot {
            implementations: Vec::new(),
            default: 0,
        });
        slot.implementations.push(compiled);
        slot.default = slot.implementations.len() - 1;
    }

    for aux in &def.auxiliaries {
        if !auxiliaries.contains(aux) {
            auxiliaries.push(aux.clone());
        }
    }

    Ok(FlattenedTable {
        id: def.id.clone(),
        ancestors: def.ancestors.clone(),
        lineage,
        depth: parents.iter().map(|p| p.depth + 1).max().unwrap_or(0),
        fields,
        methods,
        prototype: def.prototype,
        auxiliaries,
        fingerprint: def.fingerprint(),
    })
}

/// Append a parent's implementations of one method, skipping any that
/// already arrived through another path of a diamond.
fn merge_method(methods: &mut BTreeMap<String, MethodSlot>, name: &str, incoming: &MethodSlot) {
    let default_owner = &incoming.default_impl().owner;

    match methods.get_mut(name) {
        Some(slot) => {
            for implementation in &incoming.implementations {
                if slot.from_owner(&implementation.owner).is_none() {
                    slot.implementations.push(implementation.clone());
                }
            }
        }
        None => {
            let implementations = incoming.implementations.clone();
            let default = implementations
                .iter()
                .position(|m| &m.owner == default_owner)
                .unwrap_or(incoming.default);
            methods.insert(
                name.to_string(),
                MethodSlot {
                    implementations,
                    default,
                },
            );
        }
    }
}

fn compile_method(
    def: &Definition,
    method: &MethodDef,
    parents: &[Arc<FlattenedTable>],
    policy: AmbiguityPolicy,
) -> Result<CompiledMethod, ResolveError> {
    let mut calls = Vec::with_capacity(method.calls.len());
    for call in &method.calls {
        let target = resolve_qualified_call(def, call, parents, policy)?;
        debug!(
            "{}: {} in '{}' binds to {}",
            def.id, call, method.name, target.owner
        );
        calls.push(BoundCall {
            call: call.clone(),
            target,
        });
    }

    Ok(CompiledMethod {
        owner: def.id.clone(),
        name: method.name.clone(),
        body: method.body.clone(),
        calls,
    })
}

/// Bind one qualified call to the implementation it runs.
///
/// The target is the default implementation in a direct ancestor's table,
/// which is the next-older implementation relative to the calling body.
pub fn resolve_qualified_call(
    def: &Definition,
    call: &QualifiedCall,
    parents: &[Arc<FlattenedTable>],
    policy: AmbiguityPolicy,
) -> Result<Arc<CompiledMethod>, ResolveError> {
    let no_such_method = || ResolveError::NoSuchAncestorMethod {
        definition: def.id.clone(),
        method: call.method.clone(),
    };

    if let Some(ancestor) = &call.ancestor {
        let parent = parents
            .iter()
            .find(|p| &p.id == ancestor)
            .ok_or_else(|| ResolveError::NotAnAncestor {
                definition: def.id.clone(),
                ancestor: ancestor.clone(),
            })?;
        return parent.method(&call.method).cloned().ok_or_else(no_such_method);
    }

    let providers: Vec<&Arc<FlattenedTable>> = parents
        .iter()
        .filter(|p| p.has_method(&call.method))
        .collect();

    // ancestors sharing one implementation through a diamond are one provider
    let mut defaults: Vec<&Arc<CompiledMethod>> = Vec::new();
    for implementation in providers.iter().filter_map(|p| p.method(&call.method)) {
        if !defaults.iter().any(|d| Arc::ptr_eq(*d, implementation)) {
            defaults.push(implementation);
        }
    }
    if defaults.len() == 1 {
        return Ok(defaults[0].clone());
    }

    match providers.as_slice() {
        [] => Err(no_such_method()),
        [only] => only.method(&call.method).cloned().ok_or_else(no_such_method),
        [first, ..] => match policy {
            AmbiguityPolicy::FirstContributor => {
                debug!(
                    "{}: ::{} is ambiguous, using first contributor {}",
                    def.id, call.method, first.id
                );
                first.method(&call.method).cloned().ok_or_else(no_such_method)
            }
            AmbiguityPolicy::Reject => Err(ResolveError::AmbiguousAncestorCall {
                definition: def.id.clone(),
                method: call.method.clone(),
                candidates: providers.iter().map(|p| p.id.clone()).collect(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::class::{FieldType, ScriptedBody};
    use serde_json::json;

    fn flat(def: &Definition, parents: &[Arc<FlattenedTable>]) -> Arc<FlattenedTable> {
        Arc::new(link(def, parents, AmbiguityPolicy::FirstContributor).unwrap())
    }

    fn id(path: &str) -> DefinitionId {
        DefinitionId::new(path).unwrap()
    }

    fn create() -> MethodDef {
        MethodDef::scripted("create", ScriptedBody::default())
    }

    fn thing() -> Arc<FlattenedTable> {
        let mut def = Definition::new("/std/thing").unwrap();
        def.add_field("name", FieldType::String, json!(""));
        def.add_method(create());
        flat(&def, &[])
    }

    #[test]
    fn test_single_inheritance() {
        let thing = thing();
        let mut item = Definition::new("/std/item").unwrap();
        item.add_ancestor("/std/thing").unwrap();
        item.add_field("weight", FieldType::Int, json!(0));
        item.add_method(create().calls_ancestor("create"));

        let table = link(&item, &[thing], AmbiguityPolicy::FirstContributor).unwrap();

        assert_eq!(table.lineage, vec![id("/std/thing")]);
        assert_eq!(table.fields["name"].owner, id("/std/thing"));
        assert_eq!(table.fields["weight"].owner, id("/std/item"));

        let slot = &table.methods["create"];
        assert_eq!(slot.owners(), vec![&id("/std/thing"), &id("/std/item")]);
        assert_eq!(slot.default_impl().owner, id("/std/item"));

        let bound = slot.default_impl().bound(&QualifiedCall::new("create")).unwrap();
        assert_eq!(bound.owner, id("/std/thing"));
    }

    #[test]
    fn test_field_conflict_names_both_ancestors() {
        let mut a = Definition::new("/a").unwrap();
        a.add_field("hp", FieldType::Int, json!(10));
        let mut b = Definition::new("/b").unwrap();
        b.add_field("hp", FieldType::Int, json!(20));
        let mut c = Definition::new("/c").unwrap();
        c.add_ancestor("/a").unwrap();
        c.add_ancestor("/b").unwrap();

        let err = link(&c, &[flat(&a, &[]), flat(&b, &[])], AmbiguityPolicy::default())
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::FieldConflict {
                definition: id("/c"),
                field: "hp".to_string(),
                first: id("/a"),
                second: id("/b"),
            }
        );
    }

    #[test]
    fn test_diamond_is_not_a_conflict() {
        let thing = thing();
        let mut left = Definition::new("/left").unwrap();
        left.add_ancestor("/std/thing").unwrap();
        let mut right = Definition::new("/right").unwrap();
        right.add_ancestor("/std/thing").unwrap();
        let left = flat(&left, &[thing.clone()]);
        let right = flat(&right, &[thing]);

        let mut bottom = Definition::new("/bottom").unwrap();
        bottom.add_ancestor("/left").unwrap();
        bottom.add_ancestor("/right").unwrap();
        let parents = [left, right];
        let table = link(&bottom, &parents, AmbiguityPolicy::default()).unwrap();

        assert_eq!(table.fields.len(), 1);
        assert_eq!(table.methods["create"].implementations.len(), 1);
        assert_eq!(
            table.lineage,
            vec![id("/left"), id("/std/thing"), id("/right")]
        );

        // both sides reach the same implementation, so nothing is ambiguous
        bottom.add_method(create().calls_ancestor("create"));
        let table = link(&bottom, &parents, AmbiguityPolicy::Reject).unwrap();
        let bound = table
            .method("create")
            .unwrap()
            .bound(&QualifiedCall::new("create"))
            .unwrap();
        assert_eq!(bound.owner, id("/std/thing"));
    }

    #[test]
    fn test_shadow_conflict() {
        let thing = thing();
        let mut room = Definition::new("/std/room").unwrap();
        room.add_ancestor("/std/thing").unwrap();
        room.add_field("name", FieldType::String, json!("room"));

        let err = link(&room, &[thing], AmbiguityPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::ShadowConflict {
                definition: id("/std/room"),
                field: "name".to_string(),
                ancestor: id("/std/thing"),
            }
        );
    }

    #[test]
    fn test_sibling_methods_append() {
        let mut a = Definition::new("/a").unwrap();
        a.add_method(create());
        let mut b = Definition::new("/b").unwrap();
        b.add_method(create());
        let mut c = Definition::new("/c").unwrap();
        c.add_ancestor("/a").unwrap();
        c.add_ancestor("/b").unwrap();

        let table = link(&c, &[flat(&a, &[]), flat(&b, &[])], AmbiguityPolicy::default())
            .unwrap();
        let slot = &table.methods["create"];
        assert_eq!(slot.owners(), vec![&id("/a"), &id("/b")]);
        assert_eq!(slot.default_impl().owner, id("/a"));
    }

    #[test]
    fn test_ambiguous_call_policy() {
        let mut a = Definition::new("/a").unwrap();
        a.add_method(create());
        let mut b = Definition::new("/b").unwrap();
        b.add_method(create());
        let parents = [flat(&a, &[]), flat(&b, &[])];

        let mut c = Definition::new("/c").unwrap();
        c.add_ancestor("/a").unwrap();
        c.add_ancestor("/b").unwrap();
        c.add_method(create().calls_ancestor("create"));

        let table = link(&c, &parents, AmbiguityPolicy::FirstContributor).unwrap();
        let bound = table
            .method("create")
            .unwrap()
            .bound(&QualifiedCall::new("create"))
            .unwrap();
        assert_eq!(bound.owner, id("/a"));

        let err = link(&c, &parents, AmbiguityPolicy::Reject).unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousAncestorCall { candidates, .. }
            if candidates == vec![id("/a"), id("/b")]));

        // Disambiguation is accepted under either policy
        let mut d = Definition::new("/c").unwrap();
        d.add_ancestor("/a").unwrap();
        d.add_ancestor("/b").unwrap();
        d.add_method(create().calls_ancestor_of("/b", "create").unwrap());
        let table = link(&d, &parents, AmbiguityPolicy::Reject).unwrap();
        let call = QualifiedCall::of(id("/b"), "create");
        assert_eq!(table.method("create").unwrap().bound(&call).unwrap().owner, id("/b"));
    }

    #[test]
    fn test_qualified_call_errors() {
        let thing = thing();
        let mut room = Definition::new("/std/room").unwrap();
        room.add_ancestor("/std/thing").unwrap();
        room.add_method(MethodDef::scripted("reset", ScriptedBody::default()).calls_ancestor("reset"));

        let err = link(&room, &[thing.clone()], AmbiguityPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NoSuchAncestorMethod {
                definition: id("/std/room"),
                method: "reset".to_string(),
            }
        );

        let mut room = Definition::new("/std/room").unwrap();
        room.add_ancestor("/std/thing").unwrap();
        room.add_method(create().calls_ancestor_of("/std/item", "create").unwrap());
        let err = link(&room, &[thing], AmbiguityPolicy::default()).unwrap_err();
        assert!(matches!(err, ResolveError::NotAnAncestor { .. }));
    }

    #[test]
    fn test_inherited_default_follows_most_derived() {
        let thing = thing();
        let mut item = Definition::new("/std/item").unwrap();
        item.add_ancestor("/std/thing").unwrap();
        item.add_method(create().calls_ancestor("create"));
        let item = flat(&item, &[thing]);

        let mut weapon = Definition::new("/std/weapon").unwrap();
        weapon.add_ancestor("/std/item").unwrap();
        let table = link(&weapon, &[item], AmbiguityPolicy::default()).unwrap();

        assert_eq!(table.method("create").unwrap().owner, id("/std/item"));
        assert_eq!(table.methods["create"].implementations.len(), 2);
    }

    #[test]
    fn test_auxiliaries_merge() {
        let mut a = Definition::new("/a").unwrap();
        a.add_auxiliary("/std/shadow").unwrap();
        let mut c = Definition::new("/c").unwrap();
        c.add_ancestor("/a").unwrap();
        c.add_auxiliary("/std/shadow").unwrap();
        c.add_auxiliary("/std/light").unwrap();

        let table = link(&c, &[flat(&a, &[])], AmbiguityPolicy::default()).unwrap();
        assert_eq!(table.auxiliaries, vec![id("/std/shadow"), id("/std/light")]);
    }
}
