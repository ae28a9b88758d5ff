//! Entity (tree node) models
//!
//! Entities are the nodes of a company's hierarchy. Each node stores the
//! ordered ids of its ancestors (`path`, root first, immediate parent last),
//! which turns a descendant query into a single index lookup and keeps depth checks
//! constant-time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// One node of a company hierarchy.
///
/// # Invariants
///
/// - `path == parent.path + [parent.id]`, empty for a root
/// - `company_id == parent.company_id`
/// - `path.len()` stays below the configured maximum depth
///
/// # Examples
///
/// ```
/// use uuid::Uuid;
/// use hierarchy_model::Entity;
///
/// let company_id = Uuid::now_v7();
/// let plant = Entity::new(company_id, "Mumbai Plant", "plant");
/// let dept = Entity::new(company_id, "Production", "department").under(&plant);
///
/// assert!(plant.is_root());
/// assert_eq!(dept.parent_id, Some(plant.id));
/// assert_eq!(dept.path, vec![plant.id]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    /// Unique identifier
    pub id: Uuid,

    /// Owning company; never changes once set
    pub company_id: Uuid,

    /// Definition governing type and attribute validation
    pub definition_id: Option<Uuid>,

    /// Display name
    pub name: String,

    /// Entity type, a type name of the governing definition
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Parent node; `None` marks a root
    pub parent_id: Option<Uuid>,

    /// Ancestor ids from the root down to the immediate parent
    #[serde(default)]
    pub path: Vec<Uuid>,

    /// Schema-validated attributes
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Tags for filtering
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Manager slot
    #[serde(default)]
    pub manager: ManagerSlot,

    /// When the entity was created
    pub created_at: DateTime<Utc>,

    /// When the entity was last updated
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates a root entity with no definition, attributes, or metadata.
    pub fn new(company_id: Uuid, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            company_id,
            definition_id: None,
            name: name.into(),
            entity_type: entity_type.into(),
            parent_id: None,
            path: Vec::new(),
            attributes: HashMap::new(),
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
            manager: ManagerSlot::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Place this entity directly under `parent`, deriving its path.
    pub fn under(mut self, parent: &Entity) -> Self {
        self.parent_id = Some(parent.id);
        self.path = parent.child_path();
        self
    }

    /// The path a direct child of this entity has.
    pub fn child_path(&self) -> Vec<Uuid> {
        let mut path = Vec::with_capacity(self.path.len() + 1);
        path.extend_from_slice(&self.path);
        path.push(self.id);
        path
    }

    /// Whether this entity is a root.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Number of ancestors.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Whether `ancestor_id` appears on this entity's path.
    pub fn descends_from(&self, ancestor_id: Uuid) -> bool {
        self.path.contains(&ancestor_id)
    }

    /// Whether the stored path agrees with `parent`.
    pub fn path_consistent_with(&self, parent: &Entity) -> bool {
        self.parent_id == Some(parent.id) && self.path == parent.child_path()
    }
}

/// Occupancy of an entity's manager position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    /// No manager assigned
    #[default]
    Vacant,

    /// A manager is assigned
    Filled,
}

/// The manager position of an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ManagerSlot {
    /// Assigned employee, if any
    pub employee_id: Option<String>,

    /// When the assignment happened
    pub assigned_at: Option<DateTime<Utc>>,

    /// Occupancy
    pub status: ManagerStatus,
}

impl ManagerSlot {
    /// A filled slot for `employee_id`, assigned now.
    pub fn filled(employee_id: impl Into<String>) -> Self {
        Self {
            employee_id: Some(employee_id.into()),
            assigned_at: Some(Utc::now()),
            status: ManagerStatus::Filled,
        }
    }

    /// Whether a manager is assigned.
    pub fn is_filled(&self) -> bool {
        self.status == ManagerStatus::Filled
    }
}

/// Request to create an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    /// Owning company
    pub company_id: Uuid,

    /// Display name
    pub name: String,

    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Parent node; `None` creates a root
    #[serde(default)]
    pub parent_id: Option<Uuid>,

    /// Governing definition; defaults to the company's active definition
    #[serde(default)]
    pub definition_id: Option<Uuid>,

    /// Schema-validated attributes
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Free-form metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Tags
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl NewEntity {
    /// A root creation request.
    pub fn new(company_id: Uuid, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            company_id,
            name: name.into(),
            entity_type: entity_type.into(),
            parent_id: None,
            definition_id: None,
            attributes: HashMap::new(),
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Set the parent.
    pub fn with_parent(mut self, parent_id: Uuid) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Pin the governing definition.
    pub fn with_definition(mut self, definition_id: Uuid) -> Self {
        self.definition_id = Some(definition_id);
        self
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Replace all attributes.
    pub fn with_attributes(mut self, attributes: HashMap<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

/// Partial update of an entity.
///
/// `parent_id` is a re-parent request: `Some(Some(id))` moves under `id`,
/// `Some(None)` makes the node a root, `None` leaves placement alone.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntityPatch {
    /// New name
    pub name: Option<String>,
    /// Replacement attributes
    pub attributes: Option<HashMap<String, Value>>,
    /// Replacement metadata
    pub metadata: Option<HashMap<String, Value>>,
    /// Replacement tags
    pub tags: Option<BTreeSet<String>>,
    /// Re-parent request
    pub parent_id: Option<Option<Uuid>>,
}

impl EntityPatch {
    /// Whether the patch asks for a re-parent.
    pub fn moves(&self) -> bool {
        self.parent_id.is_some()
    }
}
