//! The immutable object graph: objects plus typed dependency edge groups.
//!
//! Built once per load through [`ObjectGraphBuilder`] (register objects,
//! attach dependency groups, declare root-accessible objects, then
//! [`ObjectGraphBuilder::finish`]). Shape problems found at finish time are
//! collected and returned, never fatal: a group with a dangling member is
//! disabled so the dependent object degrades to inaccessible instead of
//! crashing downstream passes.

use crate::id::ObjectId;
use crate::object::{GameObject, Ingredient, ObjectPayload, Product};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that abort graph construction. Shape problems that can be
/// degraded instead are collected as [`GraphProblem`]s.
#[derive(Debug, thiserror::Error)]
pub enum GraphBuildError {
    #[error("duplicate object name: {0}")]
    DuplicateName(String),
    #[error("unknown object id: {0:?}")]
    UnknownObject(ObjectId),
}

/// A non-fatal shape problem found while finishing the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphProblem {
    /// A dependency group member id does not resolve to any object.
    /// The whole group was disabled.
    DanglingMember {
        object: ObjectId,
        kind: DependencyKind,
        member: ObjectId,
    },
    /// A name reference could not be resolved while loading data.
    UnresolvedName { object: ObjectId, name: String },
}

// ---------------------------------------------------------------------------
// Dependency edges
// ---------------------------------------------------------------------------

/// What relation a dependency group expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    Ingredient,
    IngredientVariant,
    Fuel,
    CraftingEntity,
    Source,
    TechnologyUnlock,
    TechnologyPrerequisite,
    ItemToPlace,
    SourceEntity,
    Location,
    /// Never satisfiable. Used to degrade groups with shape problems.
    Disabled,
}

/// A typed, directed relation from a dependent object to a group of
/// alternative prerequisites.
///
/// By default the group is disjunctive: at least one accessible member
/// satisfies it. With `require_everything` the group is conjunctive: all
/// members must be accessible. Member order is preserved exactly as
/// supplied; downstream tie-breaks rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyGroup {
    pub kind: DependencyKind,
    pub require_everything: bool,
    pub members: Vec<ObjectId>,
}

impl DependencyGroup {
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.kind == DependencyKind::Disabled
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for an [`ObjectGraph`]. Two-phase lifecycle: registration, then
/// a finish step that validates shape and freezes the graph.
#[derive(Debug, Default)]
pub struct ObjectGraphBuilder {
    objects: Vec<GameObject>,
    name_to_id: HashMap<String, ObjectId>,
    groups: Vec<Vec<DependencyGroup>>,
    roots: Vec<bool>,
    problems: Vec<GraphProblem>,
}

impl ObjectGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. Names must be unique; ids are assigned densely
    /// in registration order.
    pub fn add_object(
        &mut self,
        name: &str,
        payload: ObjectPayload,
    ) -> Result<ObjectId, GraphBuildError> {
        if self.name_to_id.contains_key(name) {
            return Err(GraphBuildError::DuplicateName(name.to_string()));
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(GameObject {
            id,
            name: name.to_string(),
            payload,
        });
        self.name_to_id.insert(name.to_string(), id);
        self.groups.push(Vec::new());
        self.roots.push(false);
        Ok(id)
    }

    /// Look up a registered object's id by name.
    pub fn id_of(&self, name: &str) -> Option<ObjectId> {
        self.name_to_id.get(name).copied()
    }

    /// Attach a dependency group to `object`. Group order and member order
    /// are preserved.
    pub fn add_group(
        &mut self,
        object: ObjectId,
        kind: DependencyKind,
        require_everything: bool,
        members: Vec<ObjectId>,
    ) -> Result<(), GraphBuildError> {
        let slot = self
            .groups
            .get_mut(object.index())
            .ok_or(GraphBuildError::UnknownObject(object))?;
        slot.push(DependencyGroup {
            kind,
            require_everything,
            members,
        });
        Ok(())
    }

    /// Mark an object as accessible with no prerequisites.
    pub fn mark_root(&mut self, object: ObjectId) -> Result<(), GraphBuildError> {
        let slot = self
            .roots
            .get_mut(object.index())
            .ok_or(GraphBuildError::UnknownObject(object))?;
        *slot = true;
        Ok(())
    }

    /// Record a problem observed while assembling build input (used by the
    /// data loader for unresolved name references).
    pub fn record_problem(&mut self, problem: GraphProblem) {
        self.problems.push(problem);
    }

    /// Fill a recipe payload's io lists after all referenced goods are
    /// registered. No-op on non-recipe payloads.
    pub fn set_recipe_io(
        &mut self,
        object: ObjectId,
        ingredients: Vec<Ingredient>,
        products: Vec<Product>,
    ) -> Result<(), GraphBuildError> {
        let obj = self
            .objects
            .get_mut(object.index())
            .ok_or(GraphBuildError::UnknownObject(object))?;
        if let ObjectPayload::Recipe(spec) = &mut obj.payload {
            spec.ingredients = ingredients;
            spec.products = products;
        }
        Ok(())
    }

    /// Fill a technology payload's research ingredient list. No-op on
    /// non-technology payloads.
    pub fn set_technology_ingredients(
        &mut self,
        object: ObjectId,
        ingredients: Vec<Ingredient>,
    ) -> Result<(), GraphBuildError> {
        let obj = self
            .objects
            .get_mut(object.index())
            .ok_or(GraphBuildError::UnknownObject(object))?;
        if let ObjectPayload::Technology(spec) = &mut obj.payload {
            spec.ingredients = ingredients;
        }
        Ok(())
    }

    /// Validate shape and freeze. Groups with dangling members are replaced
    /// by `Disabled` groups and reported; the graph itself is always built.
    pub fn finish(mut self) -> (ObjectGraph, Vec<GraphProblem>) {
        let count = self.objects.len() as u32;
        for (index, groups) in self.groups.iter_mut().enumerate() {
            let object = ObjectId(index as u32);
            for group in groups.iter_mut() {
                let dangling = group.members.iter().copied().find(|m| m.0 >= count);
                if let Some(member) = dangling {
                    self.problems.push(GraphProblem::DanglingMember {
                        object,
                        kind: group.kind,
                        member,
                    });
                    group.kind = DependencyKind::Disabled;
                    group.members.clear();
                }
            }
        }
        (
            ObjectGraph {
                objects: self.objects,
                name_to_id: self.name_to_id,
                groups: self.groups,
                roots: self.roots,
            },
            self.problems,
        )
    }
}

// ---------------------------------------------------------------------------
// ObjectGraph
// ---------------------------------------------------------------------------

/// The finished, immutable object graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectGraph {
    objects: Vec<GameObject>,
    name_to_id: HashMap<String, ObjectId>,
    groups: Vec<Vec<DependencyGroup>>,
    roots: Vec<bool>,
}

impl ObjectGraph {
    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        id.index() < self.objects.len()
    }

    pub fn object(&self, id: ObjectId) -> Option<&GameObject> {
        self.objects.get(id.index())
    }

    pub fn object_by_name(&self, name: &str) -> Option<&GameObject> {
        self.name_to_id
            .get(name)
            .and_then(|id| self.objects.get(id.index()))
    }

    /// Dependency groups of `id`, in the order they were supplied.
    pub fn groups(&self, id: ObjectId) -> &[DependencyGroup] {
        self.groups
            .get(id.index())
            .map(|g| g.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_root(&self, id: ObjectId) -> bool {
        self.roots.get(id.index()).copied().unwrap_or(false)
    }

    /// Iterate all object ids in id order.
    pub fn ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        (0..self.objects.len() as u32).map(ObjectId)
    }

    /// Iterate all objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter()
    }
}
