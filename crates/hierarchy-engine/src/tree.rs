//! Tree Engine
//!
//! Creates, reads, updates, moves, and deletes entity nodes while keeping
//! the ancestor-path invariant:
//!
//! ```text
//! path(root)  = []
//! path(child) = path(parent) + [parent.id]
//! ```
//!
//! Every mutation runs in one store transaction. All checks read inside that
//! transaction before the first write, and a failed mutation drops the
//! transaction, so no partial change is ever committed.

use chrono::Utc;
use hierarchy_model::{
    Entity, EntityDefinition, EntityPatch, ManagerSlot, NewEntity, SchemaError, TreeLimits,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::remove_assets_for_entities;
use crate::definitions::{governing_definition, resolve_definition};
use crate::error::{HierarchyError, HierarchyResult};
use crate::store::{HierarchyStore, StoreTransaction};

/// Counts of what a cascading delete removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    /// Entities removed, including the target
    pub entities_deleted: usize,
    /// Assets removed from those entities
    pub assets_deleted: usize,
}

/// A node's manager slot together with the designation its type declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerAssignment {
    /// Entity owning the slot
    pub entity_id: Uuid,
    /// Slot contents
    pub manager: ManagerSlot,
    /// Designation of the entity's type, when its definition declares one
    pub designation: Option<String>,
}

/// Kind of structural invariant a node breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Stored path disagrees with the parent's path
    Path,
    /// Parent belongs to another company
    Scope,
    /// Path length at or above the maximum depth
    Depth,
    /// Parent does not exist
    Orphan,
}

/// One broken invariant found by [`TreeEngine::verify_company`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Offending entity
    pub entity_id: Uuid,
    /// Which invariant
    pub kind: ViolationKind,
    /// Human-readable detail
    pub detail: String,
}

/// Tree operations over a hierarchy store.
///
/// # Examples
///
/// ```rust,no_run
/// use hierarchy_engine::store::MemoryHierarchyStore;
/// use hierarchy_engine::TreeEngine;
/// use hierarchy_model::{NewEntity, TreeLimits};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # async fn example() -> hierarchy_engine::HierarchyResult<()> {
/// let tree = TreeEngine::new(Arc::new(MemoryHierarchyStore::new()), TreeLimits::default());
/// let company_id = Uuid::now_v7();
///
/// let plant = tree.create_entity(NewEntity::new(company_id, "Mumbai", "plant")).await?;
/// let dept = tree
///     .create_entity(NewEntity::new(company_id, "Production", "department").with_parent(plant.id))
///     .await?;
///
/// assert_eq!(dept.path, vec![plant.id]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TreeEngine {
    store: Arc<dyn HierarchyStore>,
    limits: TreeLimits,
}

impl TreeEngine {
    /// Create a tree engine enforcing `limits`, lowered to the hard caps.
    pub fn new(store: Arc<dyn HierarchyStore>, limits: TreeLimits) -> Self {
        Self {
            store,
            limits: limits.capped(),
        }
    }

    /// Limits this engine enforces.
    pub fn limits(&self) -> &TreeLimits {
        &self.limits
    }

    /// Create an entity.
    ///
    /// Fails with `NotFound` when the parent or an explicitly requested
    /// definition does not resolve within the company, `Validation` for a bad
    /// name, oversized metadata, an unknown type, or failed attribute rules,
    /// and `ConstraintViolation` for a disallowed pairing, a full parent, or
    /// excessive depth.
    pub async fn create_entity(&self, request: NewEntity) -> HierarchyResult<Entity> {
        let mut tx = self.store.begin().await?;

        let parent = match request.parent_id {
            Some(parent_id) => Some(load_in_company(&*tx, request.company_id, parent_id).await?),
            None => None,
        };
        let name = self.check_name(&request.name)?;

        let definition = resolve_definition(&*tx, request.company_id, request.definition_id).await?;
        if let Some(definition) = &definition {
            check_type(definition, &request.entity_type, &request.attributes)?;
            if let Some(parent) = &parent {
                check_pairing(&*tx, definition, parent, &request.entity_type).await?;
            }
        }

        let path = parent.as_ref().map(Entity::child_path).unwrap_or_default();
        if !self.limits.depth_allows(path.len()) {
            return Err(HierarchyError::ConstraintViolation(format!(
                "maximum depth of {} reached",
                self.limits.max_depth
            )));
        }
        if let Some(parent) = &parent {
            self.check_fan_out(&*tx, parent).await?;
        }
        self.check_metadata(&request.metadata)?;

        let mut entity = Entity::new(request.company_id, name, request.entity_type);
        entity.definition_id = definition.map(|d| d.id);
        entity.parent_id = request.parent_id;
        entity.path = path;
        entity.attributes = request.attributes;
        entity.metadata = request.metadata;
        entity.tags = request.tags;

        tx.put_entity(entity.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            entity_id = %entity.id,
            company_id = %entity.company_id,
            entity_type = %entity.entity_type,
            depth = entity.depth(),
            "Entity created"
        );
        Ok(entity)
    }

    /// Get an entity by id.
    pub async fn get_entity(&self, id: Uuid) -> HierarchyResult<Entity> {
        let tx = self.store.begin().await?;
        load(&*tx, id).await
    }

    /// Direct children of `id`, oldest first, optionally of one type.
    pub async fn get_children(&self, id: Uuid, entity_type: Option<&str>) -> HierarchyResult<Vec<Entity>> {
        let tx = self.store.begin().await?;
        load(&*tx, id).await?;
        Ok(tx.children(id, entity_type).await?)
    }

    /// Every node under `id`, shallowest first, optionally of one type.
    pub async fn get_descendants(&self, id: Uuid, entity_type: Option<&str>) -> HierarchyResult<Vec<Entity>> {
        let tx = self.store.begin().await?;
        load(&*tx, id).await?;
        let mut descendants = tx.descendants(id).await?;
        if let Some(entity_type) = entity_type {
            descendants.retain(|e| e.entity_type == entity_type);
        }
        Ok(descendants)
    }

    /// Every entity of a company, shallowest first.
    pub async fn list_company_entities(&self, company_id: Uuid) -> HierarchyResult<Vec<Entity>> {
        let tx = self.store.begin().await?;
        Ok(tx.company_entities(company_id).await?)
    }

    /// Ancestors of `id` from the root down to the immediate parent.
    pub async fn get_ancestors(&self, id: Uuid) -> HierarchyResult<Vec<Entity>> {
        let tx = self.store.begin().await?;
        let entity = load(&*tx, id).await?;

        let mut ancestors = Vec::with_capacity(entity.path.len());
        for ancestor_id in &entity.path {
            match tx.get_entity(*ancestor_id).await? {
                Some(ancestor) => ancestors.push(ancestor),
                None => {
                    return Err(HierarchyError::Internal(format!(
                        "entity {} lists missing ancestor {}",
                        id, ancestor_id
                    )))
                }
            }
        }
        Ok(ancestors)
    }

    /// Apply a partial update.
    ///
    /// Name, attributes, metadata, and tags change in place. A `parent_id`
    /// in the patch re-parents the node exactly like [`move_entity`], in the
    /// same transaction as the field changes.
    ///
    /// [`move_entity`]: TreeEngine::move_entity
    pub async fn update_entity(&self, id: Uuid, patch: EntityPatch) -> HierarchyResult<Entity> {
        let name = patch.name.as_deref().map(|n| self.check_name(n)).transpose()?;
        if let Some(metadata) = &patch.metadata {
            self.check_metadata(metadata)?;
        }

        let mut tx = self.store.begin().await?;
        let mut entity = load(&*tx, id).await?;

        if let Some(attributes) = &patch.attributes {
            let definition = governing_definition(&*tx, entity.company_id, entity.definition_id).await?;
            if let Some(definition) = &definition {
                check_type(definition, &entity.entity_type, attributes)?;
            }
        }

        let moved = match patch.parent_id {
            Some(new_parent_id) => Some(self.reparent(tx.as_mut(), &mut entity, new_parent_id).await?),
            None => None,
        };

        if let Some(name) = name {
            entity.name = name;
        }
        if let Some(attributes) = patch.attributes {
            entity.attributes = attributes;
        }
        if let Some(metadata) = patch.metadata {
            entity.metadata = metadata;
        }
        if let Some(tags) = patch.tags {
            entity.tags = tags;
        }
        entity.updated_at = Utc::now();

        tx.put_entity(entity.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            entity_id = %id,
            rewritten_descendants = moved.unwrap_or(0),
            "Entity updated"
        );
        Ok(entity)
    }

    /// Re-parent `id` under `new_parent_id`, or make it a root with `None`.
    ///
    /// The node's path and the path of every descendant are recomputed. Fails
    /// with `NotFound` when the new parent is missing or in another company,
    /// and `ConstraintViolation` when the move creates a cycle, breaks a
    /// pairing or child limit, or pushes any descendant past the maximum
    /// depth. On failure no path changes.
    pub async fn move_entity(&self, id: Uuid, new_parent_id: Option<Uuid>) -> HierarchyResult<Entity> {
        let mut tx = self.store.begin().await?;
        let mut entity = load(&*tx, id).await?;

        let rewritten = self.reparent(tx.as_mut(), &mut entity, new_parent_id).await?;
        tx.put_entity(entity.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            entity_id = %id,
            new_parent_id = ?new_parent_id,
            rewritten_descendants = rewritten,
            "Entity moved"
        );
        Ok(entity)
    }

    /// Delete `id`, every descendant, and every asset bound to any of them.
    ///
    /// The whole subtree disappears in one commit. Deleting a missing id
    /// succeeds with an empty summary.
    pub async fn delete_entity(&self, id: Uuid) -> HierarchyResult<DeleteSummary> {
        let mut tx = self.store.begin().await?;
        if tx.get_entity(id).await?.is_none() {
            return Ok(DeleteSummary::default());
        }

        let descendants = tx.descendants(id).await?;
        let mut ids = Vec::with_capacity(descendants.len() + 1);
        ids.push(id);
        ids.extend(descendants.iter().map(|e| e.id));

        let assets_deleted = remove_assets_for_entities(tx.as_mut(), &ids).await?;

        // Deepest first, the target last
        for descendant_id in ids.iter().rev() {
            tx.delete_entity(*descendant_id).await?;
        }
        tx.commit().await?;

        let summary = DeleteSummary {
            entities_deleted: ids.len(),
            assets_deleted,
        };
        tracing::info!(
            entity_id = %id,
            entities_deleted = summary.entities_deleted,
            assets_deleted = summary.assets_deleted,
            "Entity subtree deleted"
        );
        Ok(summary)
    }

    /// Fill the manager slot of `id` with `employee_id`.
    ///
    /// Returns the slot with the designation the entity's type declares.
    pub async fn assign_manager(&self, id: Uuid, employee_id: &str) -> HierarchyResult<ManagerAssignment> {
        if employee_id.trim().is_empty() {
            return Err(SchemaError::EmptyField("employee_id").into());
        }

        let mut tx = self.store.begin().await?;
        let mut entity = load(&*tx, id).await?;
        entity.manager = ManagerSlot::filled(employee_id.trim());
        entity.updated_at = Utc::now();

        let designation = designation_of(&*tx, &entity).await?;
        tx.put_entity(entity.clone()).await?;
        tx.commit().await?;

        tracing::info!(entity_id = %id, employee_id, "Manager assigned");
        Ok(ManagerAssignment {
            entity_id: id,
            manager: entity.manager,
            designation,
        })
    }

    /// Vacate the manager slot of `id`.
    pub async fn remove_manager(&self, id: Uuid) -> HierarchyResult<Entity> {
        let mut tx = self.store.begin().await?;
        let mut entity = load(&*tx, id).await?;
        if !entity.manager.is_filled() {
            return Ok(entity);
        }

        entity.manager = ManagerSlot::default();
        entity.updated_at = Utc::now();
        tx.put_entity(entity.clone()).await?;
        tx.commit().await?;

        tracing::info!(entity_id = %id, "Manager removed");
        Ok(entity)
    }

    /// Read the manager slot of `id`.
    pub async fn get_manager(&self, id: Uuid) -> HierarchyResult<ManagerAssignment> {
        let tx = self.store.begin().await?;
        let entity = load(&*tx, id).await?;
        let designation = designation_of(&*tx, &entity).await?;
        Ok(ManagerAssignment {
            entity_id: id,
            manager: entity.manager,
            designation,
        })
    }

    /// Check every entity of a company against the structural invariants.
    ///
    /// Returns one entry per broken invariant; an empty list means the tree
    /// is consistent. Definition rules are not re-checked.
    pub async fn verify_company(&self, company_id: Uuid) -> HierarchyResult<Vec<InvariantViolation>> {
        let tx = self.store.begin().await?;
        let entities = tx.company_entities(company_id).await?;
        let by_id: HashMap<Uuid, &Entity> = entities.iter().map(|e| (e.id, e)).collect();

        let mut violations = Vec::new();
        for entity in &entities {
            let mut report = |kind, detail: String| {
                violations.push(InvariantViolation {
                    entity_id: entity.id,
                    kind,
                    detail,
                })
            };

            if !self.limits.depth_allows(entity.path.len()) {
                report(
                    ViolationKind::Depth,
                    format!("path length {} reaches the limit {}", entity.path.len(), self.limits.max_depth),
                );
            }

            let Some(parent_id) = entity.parent_id else {
                if !entity.path.is_empty() {
                    report(ViolationKind::Path, "root has a non-empty path".to_string());
                }
                continue;
            };

            let parent = match by_id.get(&parent_id) {
                Some(parent) => Some((*parent).clone()),
                None => tx.get_entity(parent_id).await?,
            };
            match parent {
                None => report(ViolationKind::Orphan, format!("parent {} does not exist", parent_id)),
                Some(parent) if parent.company_id != company_id => report(
                    ViolationKind::Scope,
                    format!("parent {} belongs to company {}", parent_id, parent.company_id),
                ),
                Some(parent) if !entity.path_consistent_with(&parent) => report(
                    ViolationKind::Path,
                    format!("path does not extend the path of parent {}", parent_id),
                ),
                Some(_) => {}
            }
        }

        if !violations.is_empty() {
            tracing::warn!(company_id = %company_id, violations = violations.len(), "Tree invariants broken");
        }
        Ok(violations)
    }

    /// Move `entity` under `new_parent_id` inside `tx`, rewriting descendant
    /// paths. The caller persists `entity` itself.
    ///
    /// Returns the number of descendants rewritten.
    async fn reparent(
        &self,
        tx: &mut dyn StoreTransaction,
        entity: &mut Entity,
        new_parent_id: Option<Uuid>,
    ) -> HierarchyResult<usize> {
        if new_parent_id == entity.parent_id {
            return Ok(0);
        }

        let new_parent = match new_parent_id {
            Some(parent_id) => {
                if parent_id == entity.id {
                    return Err(HierarchyError::ConstraintViolation(format!(
                        "entity {} cannot be its own parent",
                        entity.id
                    )));
                }
                let parent = load_in_company(tx, entity.company_id, parent_id).await?;
                if parent.descends_from(entity.id) {
                    return Err(HierarchyError::ConstraintViolation(format!(
                        "cannot move entity {} under its descendant {}",
                        entity.id, parent_id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        if let Some(parent) = &new_parent {
            let definition = governing_definition(tx, entity.company_id, entity.definition_id).await?;
            if let Some(definition) = &definition {
                check_pairing(tx, definition, parent, &entity.entity_type).await?;
            }
            self.check_fan_out(tx, parent).await?;
        }

        let new_path = new_parent.as_ref().map(Entity::child_path).unwrap_or_default();
        let descendants = tx.descendants(entity.id).await?;
        let subtree_height = descendants
            .iter()
            .map(|d| d.path.len().saturating_sub(entity.path.len()))
            .max()
            .unwrap_or(0);
        if !self.limits.depth_allows(new_path.len() + subtree_height) {
            return Err(HierarchyError::ConstraintViolation(format!(
                "move would place nodes at depth {}, limit is {}",
                new_path.len() + subtree_height,
                self.limits.max_depth
            )));
        }

        entity.parent_id = new_parent_id;
        entity.path = new_path;
        entity.updated_at = Utc::now();
        tx.put_entity(entity.clone()).await?;

        // Parents are rewritten before their children
        let mut rewritten = 0;
        let mut worklist = VecDeque::from([(entity.id, entity.child_path())]);
        while let Some((parent_id, child_path)) = worklist.pop_front() {
            for mut child in tx.children(parent_id, None).await? {
                child.path = child_path.clone();
                child.updated_at = Utc::now();
                worklist.push_back((child.id, child.child_path()));
                tx.put_entity(child).await?;
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }

    fn check_name(&self, name: &str) -> HierarchyResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SchemaError::EmptyField("name").into());
        }
        let length = name.chars().count();
        if length > self.limits.max_name_len {
            return Err(HierarchyError::Validation(format!(
                "name is {} characters, limit is {}",
                length, self.limits.max_name_len
            )));
        }
        Ok(name.to_string())
    }

    fn check_metadata(&self, metadata: &HashMap<String, Value>) -> HierarchyResult<()> {
        let size = serde_json::to_vec(metadata)
            .map_err(|e| HierarchyError::Internal(format!("metadata serialization failed: {}", e)))?
            .len();
        if size > self.limits.max_metadata_bytes {
            return Err(HierarchyError::Validation(format!(
                "metadata is {} bytes, limit is {}",
                size, self.limits.max_metadata_bytes
            )));
        }
        Ok(())
    }

    async fn check_fan_out(&self, tx: &dyn StoreTransaction, parent: &Entity) -> HierarchyResult<()> {
        let count = tx.count_children(parent.id).await?;
        if !self.limits.fan_out_allows(count) {
            return Err(HierarchyError::ConstraintViolation(format!(
                "entity {} already has the maximum of {} children",
                parent.id, self.limits.max_children
            )));
        }
        Ok(())
    }
}

async fn load(tx: &dyn StoreTransaction, id: Uuid) -> HierarchyResult<Entity> {
    tx.get_entity(id)
        .await?
        .ok_or_else(|| HierarchyError::entity_not_found(id))
}

/// Load `id`, treating an entity of another company as missing.
pub(crate) async fn load_in_company(tx: &dyn StoreTransaction, company_id: Uuid, id: Uuid) -> HierarchyResult<Entity> {
    tx.get_entity(id)
        .await?
        .filter(|e| e.company_id == company_id)
        .ok_or_else(|| HierarchyError::entity_not_found(id))
}

fn check_type(
    definition: &EntityDefinition,
    entity_type: &str,
    attributes: &HashMap<String, Value>,
) -> HierarchyResult<()> {
    let spec = definition
        .entity_type(entity_type)
        .ok_or_else(|| SchemaError::UnknownEntityType(entity_type.to_string()))?;
    spec.validate_attributes(attributes)?;
    Ok(())
}

/// Check that a `child_type` node may join `parent` under `definition`.
async fn check_pairing(
    tx: &dyn StoreTransaction,
    definition: &EntityDefinition,
    parent: &Entity,
    child_type: &str,
) -> HierarchyResult<()> {
    if !definition.declares_relationships() {
        return Ok(());
    }

    let relationship = definition
        .relationship(&parent.entity_type, child_type)
        .ok_or_else(|| {
            HierarchyError::ConstraintViolation(format!(
                "a {} cannot be placed under a {}",
                child_type, parent.entity_type
            ))
        })?;

    if let Some(max) = relationship.constraints.max_children {
        let siblings = tx.children(parent.id, Some(child_type)).await?.len();
        if siblings >= max as usize {
            return Err(HierarchyError::ConstraintViolation(format!(
                "{} {} already has {} of at most {} {} children",
                parent.entity_type, parent.id, siblings, max, child_type
            )));
        }
    }
    Ok(())
}

async fn designation_of(tx: &dyn StoreTransaction, entity: &Entity) -> HierarchyResult<Option<String>> {
    let definition = governing_definition(tx, entity.company_id, entity.definition_id).await?;
    Ok(definition
        .as_ref()
        .and_then(|d| d.entity_type(&entity.entity_type))
        .and_then(|t| t.designation.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHierarchyStore;
    use hierarchy_model::{EntityTypeSpec, Relationship};
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryHierarchyStore>,
        tree: TreeEngine,
        company_id: Uuid,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_limits(TreeLimits::default())
        }

        fn with_limits(limits: TreeLimits) -> Self {
            let store = Arc::new(MemoryHierarchyStore::new());
            Self {
                tree: TreeEngine::new(store.clone(), limits),
                store,
                company_id: Uuid::now_v7(),
            }
        }

        async fn install(&self, definition: EntityDefinition) -> EntityDefinition {
            let mut tx = self.store.begin().await.unwrap();
            tx.put_definition(definition.clone()).await.unwrap();
            tx.commit().await.unwrap();
            definition
        }

        async fn root(&self, name: &str, entity_type: &str) -> Entity {
            self.tree
                .create_entity(NewEntity::new(self.company_id, name, entity_type))
                .await
                .unwrap()
        }

        async fn child(&self, parent: &Entity, name: &str, entity_type: &str) -> HierarchyResult<Entity> {
            self.tree
                .create_entity(NewEntity::new(self.company_id, name, entity_type).with_parent(parent.id))
                .await
        }
    }

    fn plants(company_id: Uuid) -> EntityDefinition {
        EntityDefinition::new(Some(company_id), "Plants")
            .with_type(EntityTypeSpec::new("plant").with_designation("PLANT_HEAD"))
            .with_type(EntityTypeSpec::new("department"))
            .with_type(EntityTypeSpec::new("line").require("lineCode"))
            .with_relationship(Relationship::new("plant", "department").with_max_children(2))
            .with_relationship(Relationship::new("department", "line"))
    }

    #[tokio::test]
    async fn test_child_path_extends_parent_path() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();
        let c = fx.child(&b, "C", "zone").await.unwrap();

        assert_eq!(c.path, vec![a.id, b.id]);
        assert_eq!(fx.tree.get_children(a.id, None).await.unwrap().len(), 1);
        assert_eq!(fx.tree.get_descendants(a.id, None).await.unwrap().len(), 2);
        let ancestors: Vec<Uuid> = fx.tree.get_ancestors(c.id).await.unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ancestors, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_parent_in_other_company_is_not_found() {
        let fx = Fixture::new();
        let foreign = fx
            .tree
            .create_entity(NewEntity::new(Uuid::now_v7(), "Elsewhere", "plant"))
            .await
            .unwrap();

        let err = fx.child(&foreign, "Mine", "department").await.unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_foreign_parent_checked_before_payload() {
        let fx = Fixture::new();
        let foreign = fx
            .tree
            .create_entity(NewEntity::new(Uuid::now_v7(), "Elsewhere", "plant"))
            .await
            .unwrap();

        let err = fx
            .tree
            .create_entity(
                NewEntity::new(fx.company_id, "x".repeat(101), "department")
                    .with_parent(foreign.id)
                    .with_metadata("blob", "y".repeat(17 * 1024)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_max_children_per_type() {
        let fx = Fixture::new();
        fx.install(plants(fx.company_id)).await;
        let plant = fx.root("Mumbai", "plant").await;

        fx.child(&plant, "Production", "department").await.unwrap();
        fx.child(&plant, "Quality", "department").await.unwrap();
        let err = fx.child(&plant, "Maintenance", "department").await.unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_disallowed_pair_and_unknown_type() {
        let fx = Fixture::new();
        fx.install(plants(fx.company_id)).await;
        let plant = fx.root("Mumbai", "plant").await;

        let err = fx
            .tree
            .create_entity(
                NewEntity::new(fx.company_id, "Line 1", "line")
                    .with_parent(plant.id)
                    .with_attribute("lineCode", "LN001"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));

        let err = fx.child(&plant, "Dock", "warehouse").await.unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_attribute_rules_enforced() {
        let fx = Fixture::new();
        fx.install(plants(fx.company_id)).await;
        let plant = fx.root("Mumbai", "plant").await;
        let dept = fx.child(&plant, "Production", "department").await.unwrap();

        let err = fx.child(&dept, "Line 1", "line").await.unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));

        let line = fx
            .tree
            .create_entity(
                NewEntity::new(fx.company_id, "Line 1", "line")
                    .with_parent(dept.id)
                    .with_attribute("lineCode", "LN001"),
            )
            .await
            .unwrap();
        assert_eq!(line.attributes["lineCode"], json!("LN001"));
    }

    #[tokio::test]
    async fn test_name_and_metadata_limits() {
        let fx = Fixture::new();
        let long_name = "x".repeat(101);
        let err = fx
            .tree
            .create_entity(NewEntity::new(fx.company_id, long_name, "zone"))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));

        let blob = "y".repeat(17 * 1024);
        let err = fx
            .tree
            .create_entity(NewEntity::new(fx.company_id, "Blob", "zone").with_metadata("blob", blob))
            .await
            .unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let fx = Fixture::with_limits(TreeLimits {
            max_depth: 3,
            ..TreeLimits::default()
        });
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();
        let c = fx.child(&b, "C", "zone").await.unwrap();
        assert_eq!(c.depth(), 2);

        let err = fx.child(&c, "D", "zone").await.unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_loosened_limits_fall_back_to_hard_caps() {
        let fx = Fixture::with_limits(TreeLimits {
            max_depth: 80,
            ..TreeLimits::default()
        });
        assert_eq!(fx.tree.limits().max_depth, hierarchy_model::MAX_DEPTH);

        // A chain one level past the cap, written straight to the store
        let mut tx = fx.store.begin().await.unwrap();
        let mut parent: Option<Entity> = None;
        for level in 0..=hierarchy_model::MAX_DEPTH {
            let mut entity = Entity::new(fx.company_id, format!("Level {}", level), "zone");
            if let Some(parent) = &parent {
                entity.parent_id = Some(parent.id);
                entity.path = parent.child_path();
            }
            tx.put_entity(entity.clone()).await.unwrap();
            parent = Some(entity);
        }
        tx.commit().await.unwrap();
        let deepest = parent.unwrap();
        assert_eq!(deepest.path.len(), hierarchy_model::MAX_DEPTH);

        let violations = fx.tree.verify_company(fx.company_id).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id, deepest.id);
        assert_eq!(violations[0].kind, ViolationKind::Depth);

        let too_deep = fx.child(&deepest, "Too Deep", "zone").await.unwrap_err();
        assert!(matches!(too_deep, HierarchyError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_fan_out_limit() {
        let fx = Fixture::with_limits(TreeLimits {
            max_children: 2,
            ..TreeLimits::default()
        });
        let root = fx.root("Root", "zone").await;
        fx.child(&root, "1", "zone").await.unwrap();
        fx.child(&root, "2", "zone").await.unwrap();
        assert!(matches!(
            fx.child(&root, "3", "zone").await,
            Err(HierarchyError::ConstraintViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_move_rewrites_descendant_paths() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.root("B", "zone").await;
        let c = fx.child(&a, "C", "zone").await.unwrap();
        let d = fx.child(&c, "D", "zone").await.unwrap();

        let moved = fx.tree.move_entity(c.id, Some(b.id)).await.unwrap();
        assert_eq!(moved.path, vec![b.id]);
        assert_eq!(fx.tree.get_entity(d.id).await.unwrap().path, vec![b.id, c.id]);
        assert!(fx.tree.get_descendants(a.id, None).await.unwrap().is_empty());

        let rooted = fx.tree.move_entity(c.id, None).await.unwrap();
        assert!(rooted.is_root());
        assert_eq!(fx.tree.get_entity(d.id).await.unwrap().path, vec![c.id]);
        assert!(fx.tree.verify_company(fx.company_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_move_into_descendant_rejected() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();
        let c = fx.child(&b, "C", "zone").await.unwrap();

        let err = fx.tree.move_entity(a.id, Some(c.id)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));
        let err = fx.tree.move_entity(a.id, Some(a.id)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));

        assert_eq!(fx.tree.get_entity(c.id).await.unwrap().path, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_move_past_depth_leaves_paths_untouched() {
        let fx = Fixture::with_limits(TreeLimits {
            max_depth: 4,
            ..TreeLimits::default()
        });
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();
        let c = fx.child(&b, "C", "zone").await.unwrap();
        let x = fx.root("X", "zone").await;
        let y = fx.child(&x, "Y", "zone").await.unwrap();

        // a's subtree has height 2, so under y its leaf would sit at depth 4
        let err = fx.tree.move_entity(a.id, Some(y.id)).await.unwrap_err();
        assert!(matches!(err, HierarchyError::ConstraintViolation(_)));
        assert_eq!(fx.tree.get_entity(c.id).await.unwrap().path, vec![a.id, b.id]);
        fx.tree.move_entity(y.id, Some(c.id)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_with_parent_change() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.root("B", "zone").await;
        let c = fx.child(&a, "C", "zone").await.unwrap();

        let patch = EntityPatch {
            name: Some("  Renamed  ".to_string()),
            parent_id: Some(Some(b.id)),
            ..EntityPatch::default()
        };
        let updated = fx.tree.update_entity(c.id, patch).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.path, vec![b.id]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_cascades() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();
        let c = fx.child(&b, "C", "zone").await.unwrap();
        let sibling = fx.root("S", "zone").await;

        let summary = fx.tree.delete_entity(b.id).await.unwrap();
        assert_eq!(summary.entities_deleted, 2);
        assert!(matches!(fx.tree.get_entity(c.id).await, Err(HierarchyError::NotFound(_))));
        assert!(fx.tree.get_entity(a.id).await.is_ok());
        assert!(fx.tree.get_entity(sibling.id).await.is_ok());

        assert_eq!(fx.tree.delete_entity(b.id).await.unwrap(), DeleteSummary::default());
    }

    #[tokio::test]
    async fn test_manager_slot_reports_designation() {
        let fx = Fixture::new();
        fx.install(plants(fx.company_id)).await;
        let plant = fx.root("Mumbai", "plant").await;

        let assignment = fx.tree.assign_manager(plant.id, "EMP-7").await.unwrap();
        assert_eq!(assignment.designation.as_deref(), Some("PLANT_HEAD"));
        assert!(assignment.manager.is_filled());

        let entity = fx.tree.remove_manager(plant.id).await.unwrap();
        assert!(!entity.manager.is_filled());
        assert!(!fx.tree.get_manager(plant.id).await.unwrap().manager.is_filled());
        assert!(fx.tree.assign_manager(plant.id, " ").await.is_err());
    }

    #[tokio::test]
    async fn test_verify_company_reports_corrupted_path() {
        let fx = Fixture::new();
        let a = fx.root("A", "zone").await;
        let b = fx.child(&a, "B", "zone").await.unwrap();

        let mut corrupted = b.clone();
        corrupted.path = vec![Uuid::now_v7()];
        let mut tx = fx.store.begin().await.unwrap();
        tx.put_entity(corrupted).await.unwrap();
        tx.commit().await.unwrap();

        let violations = fx.tree.verify_company(fx.company_id).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity_id, b.id);
        assert_eq!(violations[0].kind, ViolationKind::Path);
    }
}
