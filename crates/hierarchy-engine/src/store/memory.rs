//! In-memory store
//!
//! A single-process backend for development, tests, and embedding. One
//! transaction runs at a time; each keeps an undo log of the rows it
//! replaced and replays it in reverse when dropped without a commit.

use async_trait::async_trait;
use hierarchy_model::{Asset, Entity, EntityDefinition};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

use super::{HierarchyStore, StoreError, StoreResult, StoreTransaction};

/// Rows and indexes.
#[derive(Debug, Default)]
struct MemoryState {
    definitions: HashMap<Uuid, EntityDefinition>,
    template_keys: HashMap<String, Uuid>,

    entities: HashMap<Uuid, Entity>,
    children: HashMap<Uuid, BTreeSet<Uuid>>,
    descendants: HashMap<Uuid, BTreeSet<Uuid>>,
    by_company: HashMap<Uuid, BTreeSet<Uuid>>,

    assets: HashMap<Uuid, Asset>,
    assets_by_entity: HashMap<Uuid, BTreeSet<Uuid>>,
    employees: HashMap<(Uuid, String), Uuid>,
}

impl MemoryState {
    /// Replace the definition row `id`, returning the previous row.
    fn set_definition(&mut self, id: Uuid, row: Option<EntityDefinition>) -> Option<EntityDefinition> {
        let previous = self.definitions.remove(&id);
        if let Some(key) = previous.as_ref().and_then(|d| d.template_key.as_ref()) {
            if self.template_keys.get(key) == Some(&id) {
                self.template_keys.remove(key);
            }
        }
        if let Some(definition) = row {
            if let Some(key) = &definition.template_key {
                self.template_keys.insert(key.clone(), id);
            }
            self.definitions.insert(id, definition);
        }
        previous
    }

    /// Replace the entity row `id`, returning the previous row.
    fn set_entity(&mut self, id: Uuid, row: Option<Entity>) -> Option<Entity> {
        let previous = self.entities.remove(&id);
        if let Some(old) = &previous {
            if let Some(parent_id) = old.parent_id {
                remove_from(&mut self.children, parent_id, &id);
            }
            for ancestor in &old.path {
                remove_from(&mut self.descendants, *ancestor, &id);
            }
            remove_from(&mut self.by_company, old.company_id, &id);
        }
        if let Some(entity) = row {
            if let Some(parent_id) = entity.parent_id {
                self.children.entry(parent_id).or_default().insert(id);
            }
            for ancestor in &entity.path {
                self.descendants.entry(*ancestor).or_default().insert(id);
            }
            self.by_company.entry(entity.company_id).or_default().insert(id);
            self.entities.insert(id, entity);
        }
        previous
    }

    /// Replace the asset row `id`, returning the previous row.
    fn set_asset(&mut self, id: Uuid, row: Option<Asset>) -> Option<Asset> {
        let previous = self.assets.remove(&id);
        if let Some(old) = &previous {
            remove_from(&mut self.assets_by_entity, old.entity_id, &id);
            if let Some(employee_id) = old.employee_id() {
                self.employees.remove(&(old.company_id, employee_id.to_string()));
            }
        }
        if let Some(asset) = row {
            self.assets_by_entity.entry(asset.entity_id).or_default().insert(id);
            if let Some(employee_id) = asset.employee_id() {
                self.employees.insert((asset.company_id, employee_id.to_string()), id);
            }
            self.assets.insert(id, asset);
        }
        previous
    }

    fn entities_sorted<'a>(&self, ids: impl Iterator<Item = &'a Uuid>) -> Vec<Entity> {
        let mut entities: Vec<Entity> = ids.filter_map(|id| self.entities.get(id).cloned()).collect();
        entities.sort_by(|a, b| {
            a.path
                .len()
                .cmp(&b.path.len())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        entities
    }
}

fn remove_from(index: &mut HashMap<Uuid, BTreeSet<Uuid>>, key: Uuid, id: &Uuid) {
    if let Some(set) = index.get_mut(&key) {
        set.remove(id);
        if set.is_empty() {
            index.remove(&key);
        }
    }
}

/// A row as it was before a transaction touched it.
#[derive(Debug)]
enum Undo {
    Definition {
        id: Uuid,
        previous: Option<EntityDefinition>,
    },
    Entity {
        id: Uuid,
        previous: Option<Entity>,
    },
    Asset {
        id: Uuid,
        previous: Option<Asset>,
    },
}

/// In-memory hierarchy store.
///
/// Cloning is cheap; clones share the same data.
///
/// # Examples
///
/// ```rust,no_run
/// use hierarchy_engine::store::{HierarchyStore, MemoryHierarchyStore};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryHierarchyStore::new().with_lock_timeout(Duration::from_secs(1));
/// let tx = store.begin().await?;
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryHierarchyStore {
    state: Arc<RwLock<MemoryState>>,
    lock_timeout: Duration,
}

impl Default for MemoryHierarchyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHierarchyStore {
    /// Create an empty store with a 5 second transaction wait.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            lock_timeout: Duration::from_secs(5),
        }
    }

    /// Set how long `begin` waits before failing with `Busy`.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

#[async_trait]
impl HierarchyStore for MemoryHierarchyStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let state = tokio::time::timeout(self.lock_timeout, self.state.clone().write_owned())
            .await
            .map_err(|_| {
                StoreError::Busy(format!(
                    "no transaction slot within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;

        Ok(Box::new(MemoryTransaction {
            state,
            undo: Vec::new(),
            committed: false,
        }))
    }
}

/// Transaction over [`MemoryHierarchyStore`].
pub struct MemoryTransaction {
    state: OwnedRwLockWriteGuard<MemoryState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }

        tracing::debug!(writes = self.undo.len(), "Rolling back uncommitted transaction");

        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Definition { id, previous } => {
                    self.state.set_definition(id, previous);
                }
                Undo::Entity { id, previous } => {
                    self.state.set_entity(id, previous);
                }
                Undo::Asset { id, previous } => {
                    self.state.set_asset(id, previous);
                }
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get_definition(&self, id: Uuid) -> StoreResult<Option<EntityDefinition>> {
        Ok(self.state.definitions.get(&id).cloned())
    }

    async fn find_template(&self, key: &str) -> StoreResult<Option<EntityDefinition>> {
        Ok(self
            .state
            .template_keys
            .get(key)
            .and_then(|id| self.state.definitions.get(id))
            .cloned())
    }

    async fn list_definitions(&self) -> StoreResult<Vec<EntityDefinition>> {
        let mut definitions: Vec<EntityDefinition> = self.state.definitions.values().cloned().collect();
        definitions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(definitions)
    }

    async fn put_definition(&mut self, definition: EntityDefinition) -> StoreResult<()> {
        if let Some(key) = &definition.template_key {
            if let Some(holder) = self.state.template_keys.get(key) {
                if *holder != definition.id {
                    return Err(StoreError::UniqueViolation {
                        index: "definitions.template_key".to_string(),
                        key: key.clone(),
                    });
                }
            }
        }

        let id = definition.id;
        let previous = self.state.set_definition(id, Some(definition));
        self.undo.push(Undo::Definition { id, previous });
        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> StoreResult<Option<Entity>> {
        Ok(self.state.entities.get(&id).cloned())
    }

    async fn children(&self, parent_id: Uuid, entity_type: Option<&str>) -> StoreResult<Vec<Entity>> {
        let Some(ids) = self.state.children.get(&parent_id) else {
            return Ok(Vec::new());
        };
        let mut children = self.state.entities_sorted(ids.iter());
        if let Some(entity_type) = entity_type {
            children.retain(|e| e.entity_type == entity_type);
        }
        Ok(children)
    }

    async fn count_children(&self, parent_id: Uuid) -> StoreResult<usize> {
        Ok(self.state.children.get(&parent_id).map_or(0, |ids| ids.len()))
    }

    async fn descendants(&self, ancestor_id: Uuid) -> StoreResult<Vec<Entity>> {
        Ok(self
            .state
            .descendants
            .get(&ancestor_id)
            .map(|ids| self.state.entities_sorted(ids.iter()))
            .unwrap_or_default())
    }

    async fn company_entities(&self, company_id: Uuid) -> StoreResult<Vec<Entity>> {
        Ok(self
            .state
            .by_company
            .get(&company_id)
            .map(|ids| self.state.entities_sorted(ids.iter()))
            .unwrap_or_default())
    }

    async fn put_entity(&mut self, entity: Entity) -> StoreResult<()> {
        let id = entity.id;
        let previous = self.state.set_entity(id, Some(entity));
        self.undo.push(Undo::Entity { id, previous });
        Ok(())
    }

    async fn delete_entity(&mut self, id: Uuid) -> StoreResult<Option<Entity>> {
        let previous = self.state.set_entity(id, None);
        if previous.is_some() {
            self.undo.push(Undo::Entity {
                id,
                previous: previous.clone(),
            });
        }
        Ok(previous)
    }

    async fn get_asset(&self, id: Uuid) -> StoreResult<Option<Asset>> {
        Ok(self.state.assets.get(&id).cloned())
    }

    async fn assets_for_entities(
        &self,
        entity_ids: &[Uuid],
        asset_type: Option<&str>,
    ) -> StoreResult<Vec<Asset>> {
        let mut assets: Vec<Asset> = entity_ids
            .iter()
            .filter_map(|entity_id| self.state.assets_by_entity.get(entity_id))
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.state.assets.get(id))
            .filter(|asset| asset_type.map_or(true, |t| asset.asset_type == t))
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(assets)
    }

    async fn find_employee_asset(&self, company_id: Uuid, employee_id: &str) -> StoreResult<Option<Asset>> {
        Ok(self
            .state
            .employees
            .get(&(company_id, employee_id.to_string()))
            .and_then(|id| self.state.assets.get(id))
            .cloned())
    }

    async fn insert_asset(&mut self, asset: Asset) -> StoreResult<()> {
        if self.state.assets.contains_key(&asset.id) {
            return Err(StoreError::UniqueViolation {
                index: "assets.id".to_string(),
                key: asset.id.to_string(),
            });
        }
        if let Some(employee_id) = asset.employee_id() {
            if self
                .state
                .employees
                .contains_key(&(asset.company_id, employee_id.to_string()))
            {
                return Err(StoreError::UniqueViolation {
                    index: "assets.company_employee".to_string(),
                    key: format!("{}/{}", asset.company_id, employee_id),
                });
            }
        }

        let id = asset.id;
        self.state.set_asset(id, Some(asset));
        self.undo.push(Undo::Asset { id, previous: None });
        Ok(())
    }

    async fn delete_asset(&mut self, id: Uuid) -> StoreResult<Option<Asset>> {
        let previous = self.state.set_asset(id, None);
        if previous.is_some() {
            self.undo.push(Undo::Asset {
                id,
                previous: previous.clone(),
            });
        }
        Ok(previous)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tx = self;
        tx.committed = true;
        tx.undo.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hierarchy_model::EmployeeSnapshot;

    #[tokio::test]
    async fn test_commit_persists_writes() {
        let store = MemoryHierarchyStore::new();
        let company_id = Uuid::now_v7();
        let root = Entity::new(company_id, "HQ", "building");

        let mut tx = store.begin().await.unwrap();
        tx.put_entity(root.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let tx = store.begin().await.unwrap();
        assert_eq!(tx.get_entity(root.id).await.unwrap(), Some(root));
    }

    #[tokio::test]
    async fn test_drop_rolls_back_every_write() {
        let store = MemoryHierarchyStore::new();
        let company_id = Uuid::now_v7();
        let root = Entity::new(company_id, "HQ", "building");

        let mut tx = store.begin().await.unwrap();
        tx.put_entity(root.clone()).await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let child = Entity::new(company_id, "Floor 1", "floor").under(&root);
            tx.put_entity(child).await.unwrap();
            let mut renamed = root.clone();
            renamed.name = "Renamed".to_string();
            tx.put_entity(renamed).await.unwrap();
            tx.delete_entity(root.id).await.unwrap();
        }

        let tx = store.begin().await.unwrap();
        assert_eq!(tx.get_entity(root.id).await.unwrap().unwrap().name, "HQ");
        assert_eq!(tx.count_children(root.id).await.unwrap(), 0);
        assert!(tx.descendants(root.id).await.unwrap().is_empty());
        assert_eq!(tx.company_entities(company_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deleting_last_rows_drops_empty_index_entries() {
        let store = MemoryHierarchyStore::new();
        let company_id = Uuid::now_v7();
        let root = Entity::new(company_id, "HQ", "building");
        let child = Entity::new(company_id, "Floor 1", "floor").under(&root);

        let mut tx = store.begin().await.unwrap();
        tx.put_entity(root.clone()).await.unwrap();
        tx.put_entity(child.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete_entity(child.id).await.unwrap();
        tx.delete_entity(root.id).await.unwrap();
        tx.commit().await.unwrap();

        let state = store.state.read().await;
        assert!(state.entities.is_empty());
        assert!(state.children.is_empty());
        assert!(state.descendants.is_empty());
        assert!(state.by_company.is_empty());
    }

    #[tokio::test]
    async fn test_path_index_follows_reparent() {
        let store = MemoryHierarchyStore::new();
        let company_id = Uuid::now_v7();
        let a = Entity::new(company_id, "A", "zone");
        let b = Entity::new(company_id, "B", "zone");
        let child = Entity::new(company_id, "C", "desk").under(&a);

        let mut tx = store.begin().await.unwrap();
        tx.put_entity(a.clone()).await.unwrap();
        tx.put_entity(b.clone()).await.unwrap();
        tx.put_entity(child.clone()).await.unwrap();
        assert_eq!(tx.descendants(a.id).await.unwrap().len(), 1);

        tx.put_entity(child.clone().under(&b)).await.unwrap();
        assert!(tx.descendants(a.id).await.unwrap().is_empty());
        assert_eq!(tx.children(b.id, None).await.unwrap()[0].id, child.id);
        assert_eq!(tx.children(b.id, Some("floor")).await.unwrap().len(), 0);
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_employee_index_is_unique() {
        let store = MemoryHierarchyStore::new();
        let company_id = Uuid::now_v7();
        let first = Asset::employee(company_id, Uuid::now_v7(), EmployeeSnapshot::new("EMP-1", "r1"));
        let second = Asset::employee(company_id, Uuid::now_v7(), EmployeeSnapshot::new("EMP-1", "r1"));
        let other_company = Asset::employee(Uuid::now_v7(), Uuid::now_v7(), EmployeeSnapshot::new("EMP-1", "r1"));

        let mut tx = store.begin().await.unwrap();
        tx.insert_asset(first.clone()).await.unwrap();
        assert!(matches!(
            tx.insert_asset(second).await,
            Err(StoreError::UniqueViolation { .. })
        ));
        tx.insert_asset(other_company).await.unwrap();

        assert_eq!(
            tx.find_employee_asset(company_id, "EMP-1").await.unwrap().map(|a| a.id),
            Some(first.id)
        );
        tx.delete_asset(first.id).await.unwrap();
        assert!(tx.find_employee_asset(company_id, "EMP-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_template_key_is_unique() {
        let store = MemoryHierarchyStore::new();
        let first = EntityDefinition::new(None, "A").with_template_key("plants");
        let second = EntityDefinition::new(None, "B").with_template_key("plants");

        let mut tx = store.begin().await.unwrap();
        tx.put_definition(first.clone()).await.unwrap();
        assert!(tx.put_definition(second).await.is_err());
        // Re-putting the holder is fine
        tx.put_definition(first.clone()).await.unwrap();
        assert_eq!(tx.find_template("plants").await.unwrap().map(|d| d.id), Some(first.id));
    }

    #[tokio::test]
    async fn test_begin_times_out_while_held() {
        let store = MemoryHierarchyStore::new().with_lock_timeout(Duration::from_millis(20));
        let _held = store.begin().await.unwrap();

        match store.begin().await {
            Err(StoreError::Busy(_)) => {}
            other => panic!("expected Busy, got {:?}", other.map(|_| ())),
        }
    }
}
