//! Entity definition models
//!
//! An entity definition is the schema of a company's hierarchy: which entity
//! types exist, which attributes each type carries, and which parent/child
//! type pairings are allowed (with optional cardinality limits).
//!
//! Definitions are validated as whole documents. Entities are checked against
//! the definition as it reads at mutation time, so editing a definition never
//! rewrites existing nodes.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

use crate::structure::StructureNode;

/// Version assigned to definitions created without one.
pub const DEFAULT_DEFINITION_VERSION: &str = "1.0";

/// Schema validation errors.
///
/// Raised when a definition document is malformed, or when an entity's type
/// or attributes do not satisfy the definition that governs it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    /// A required field is empty
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// Two entity types share a name
    #[error("Entity type '{0}' is declared more than once")]
    DuplicateType(String),

    /// A relationship or structure node references an undeclared type
    #[error("{context} references undeclared entity type '{type_name}'")]
    UndeclaredType {
        /// Where the reference was found
        context: String,
        /// The missing type
        type_name: String,
    },

    /// The same parent/child pairing is declared twice
    #[error("Relationship {parent_type} -> {child_type} is declared more than once")]
    DuplicateRelationship {
        /// Parent type
        parent_type: String,
        /// Child type
        child_type: String,
    },

    /// Cardinality constraints are contradictory
    #[error("Relationship {parent_type} -> {child_type}: {reason}")]
    InvalidConstraint {
        /// Parent type
        parent_type: String,
        /// Child type
        child_type: String,
        /// What is wrong
        reason: String,
    },

    /// An attribute pattern is not a valid regular expression
    #[error("Invalid pattern for attribute '{attribute}' of type '{type_name}': {reason}")]
    InvalidPattern {
        /// Entity type declaring the pattern
        type_name: String,
        /// Attribute name
        attribute: String,
        /// Regex compiler message
        reason: String,
    },

    /// An entity's type is not declared in its definition
    #[error("Entity type '{0}' is not declared in the definition")]
    UnknownEntityType(String),

    /// A required attribute is missing
    #[error("Required attribute '{attribute}' missing for type '{type_name}'")]
    MissingAttribute {
        /// Entity type
        type_name: String,
        /// Attribute name
        attribute: String,
    },

    /// An attribute value is not in the allowed set
    #[error("Invalid value for attribute '{attribute}': {value} is not one of the allowed values")]
    DisallowedValue {
        /// Attribute name
        attribute: String,
        /// Offending value
        value: Value,
    },

    /// An attribute value has the wrong JSON kind
    #[error("Attribute '{attribute}' must be of kind {expected:?}")]
    KindMismatch {
        /// Attribute name
        attribute: String,
        /// Declared kind
        expected: AttributeKind,
    },

    /// An attribute value does not match its pattern
    #[error("Attribute '{attribute}' does not match pattern '{pattern}'")]
    PatternMismatch {
        /// Attribute name
        attribute: String,
        /// Pattern source
        pattern: String,
    },

    /// The declared structure is inconsistent with the definition
    #[error("Invalid structure: {0}")]
    Structure(String),
}

/// Lifecycle status of a definition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Usable for validation and seeding
    #[default]
    Active,

    /// Retained but ignored when resolving a company's definition
    Inactive,
}

/// JSON kind expected for an attribute value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// JSON number without a fractional part
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
    /// No kind check
    #[default]
    Any,
}

impl AttributeKind {
    /// Check whether a value is of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            AttributeKind::String => value.is_string(),
            AttributeKind::Number => value.is_number(),
            AttributeKind::Integer => value.is_i64() || value.is_u64(),
            AttributeKind::Boolean => value.is_boolean(),
            AttributeKind::Object => value.is_object(),
            AttributeKind::Array => value.is_array(),
            AttributeKind::Any => true,
        }
    }
}

/// A declared attribute of an entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributeSpec {
    /// Attribute name
    pub name: String,

    /// Expected value kind
    #[serde(rename = "type", default)]
    pub kind: AttributeKind,
}

/// One entity type of a definition, with its attribute rules.
///
/// # Examples
///
/// ```
/// use hierarchy_model::{AttributeKind, EntityTypeSpec};
/// use serde_json::json;
///
/// let plant = EntityTypeSpec::new("plant")
///     .with_designation("PLANT_HEAD")
///     .with_attribute("plantCode", AttributeKind::String)
///     .require("plantCode")
///     .with_pattern("plantCode", r"^PLT\d{3}$");
///
/// let mut attrs = std::collections::HashMap::new();
/// attrs.insert("plantCode".to_string(), json!("PLT001"));
/// assert!(plant.validate_attributes(&attrs).is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityTypeSpec {
    /// Type name, unique within the definition
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Designation given to the manager of a node of this type
    #[serde(default)]
    pub designation: Option<String>,

    /// Declared attributes and their kinds
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,

    /// Attributes every node of this type must carry
    #[serde(default)]
    pub required_attributes: Vec<String>,

    /// Closed value sets per attribute
    #[serde(default)]
    pub allowed_values: HashMap<String, Vec<Value>>,

    /// Regular expressions string values must match, per attribute
    #[serde(default)]
    pub patterns: HashMap<String, String>,
}

impl EntityTypeSpec {
    /// Creates an entity type with no attribute rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the manager designation.
    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = Some(designation.into());
        self
    }

    /// Declare an attribute with a value kind.
    pub fn with_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            kind,
        });
        self
    }

    /// Mark an attribute as required.
    pub fn require(mut self, attribute: impl Into<String>) -> Self {
        self.required_attributes.push(attribute.into());
        self
    }

    /// Restrict an attribute to a closed set of values.
    pub fn allow_values<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values
            .insert(attribute.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Require string values of an attribute to match a regular expression.
    pub fn with_pattern(mut self, attribute: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.patterns.insert(attribute.into(), pattern.into());
        self
    }

    /// Check that every declared pattern compiles.
    pub fn validate_patterns(&self) -> Result<(), SchemaError> {
        for (attribute, pattern) in &self.patterns {
            Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                type_name: self.name.clone(),
                attribute: attribute.clone(),
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    /// Validate an attribute map against this type's rules.
    ///
    /// Attributes that no rule mentions are accepted as-is.
    pub fn validate_attributes(&self, attributes: &HashMap<String, Value>) -> Result<(), SchemaError> {
        for required in &self.required_attributes {
            if !attributes.contains_key(required) {
                return Err(SchemaError::MissingAttribute {
                    type_name: self.name.clone(),
                    attribute: required.clone(),
                });
            }
        }

        for (name, value) in attributes {
            if let Some(allowed) = self.allowed_values.get(name) {
                if !allowed.contains(value) {
                    return Err(SchemaError::DisallowedValue {
                        attribute: name.clone(),
                        value: value.clone(),
                    });
                }
            }

            if let Some(spec) = self.attributes.iter().find(|a| &a.name == name) {
                if !spec.kind.matches(value) {
                    return Err(SchemaError::KindMismatch {
                        attribute: name.clone(),
                        expected: spec.kind,
                    });
                }
            }

            if let Some(pattern) = self.patterns.get(name) {
                let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                    type_name: self.name.clone(),
                    attribute: name.clone(),
                    reason: e.to_string(),
                })?;
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => {
                        return Err(SchemaError::PatternMismatch {
                            attribute: name.clone(),
                            pattern: pattern.clone(),
                        })
                    }
                };
                if !regex.is_match(&text) {
                    return Err(SchemaError::PatternMismatch {
                        attribute: name.clone(),
                        pattern: pattern.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Cardinality limits for a parent/child pairing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RelationshipConstraints {
    /// Informational lower bound on children of this type
    #[serde(default)]
    pub min_children: u32,

    /// Upper bound on children of this type; `None` means unbounded
    #[serde(default)]
    pub max_children: Option<u32>,
}

/// An allowed `(parentType, childType)` pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    /// Type of the parent node
    pub parent_type: String,

    /// Type of the child node
    pub child_type: String,

    /// Cardinality limits
    #[serde(default)]
    pub constraints: RelationshipConstraints,
}

impl Relationship {
    /// Creates an unbounded pairing.
    pub fn new(parent_type: impl Into<String>, child_type: impl Into<String>) -> Self {
        Self {
            parent_type: parent_type.into(),
            child_type: child_type.into(),
            constraints: RelationshipConstraints::default(),
        }
    }

    /// Cap the number of children of `child_type` under one parent.
    pub fn with_max_children(mut self, max: u32) -> Self {
        self.constraints.max_children = Some(max);
        self
    }

    /// Set the informational lower bound.
    pub fn with_min_children(mut self, min: u32) -> Self {
        self.constraints.min_children = min;
        self
    }

    /// Label such as `0..2` or `1..∞`.
    pub fn cardinality_label(&self) -> String {
        match self.constraints.max_children {
            Some(max) => format!("{}..{}", self.constraints.min_children, max),
            None => format!("{}..∞", self.constraints.min_children),
        }
    }
}

/// The schema of a company's (or template's) hierarchy.
///
/// # Examples
///
/// ```
/// use hierarchy_model::{EntityDefinition, EntityTypeSpec, Relationship};
/// use uuid::Uuid;
///
/// let def = EntityDefinition::new(Some(Uuid::now_v7()), "Plants")
///     .with_type(EntityTypeSpec::new("plant"))
///     .with_type(EntityTypeSpec::new("department"))
///     .with_relationship(Relationship::new("plant", "department").with_max_children(2));
///
/// assert!(def.validate().is_ok());
/// assert!(def.allows("plant", "department"));
/// assert!(!def.allows("department", "plant"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityDefinition {
    /// Unique identifier
    pub id: Uuid,

    /// Owning company; `None` for global templates
    pub company_id: Option<Uuid>,

    /// Human-readable name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Document version
    #[serde(default = "default_version")]
    pub version: String,

    /// Version this document replaced, when upgraded in place
    #[serde(default)]
    pub previous_version: Option<String>,

    /// Lifecycle status
    #[serde(default)]
    pub status: DefinitionStatus,

    /// Declared entity types, in declaration order
    #[serde(default)]
    pub entity_types: Vec<EntityTypeSpec>,

    /// Allowed parent/child pairings
    #[serde(default)]
    pub relationships: Vec<Relationship>,

    /// Declared structural nodes used when seeding a tree
    #[serde(default)]
    pub structure: Vec<StructureNode>,

    /// Catalog key when this definition is listed as a template
    #[serde(default)]
    pub template_key: Option<String>,

    /// Template this definition was copied from
    #[serde(default)]
    pub template_ref: Option<Uuid>,

    /// When the definition was created
    pub created_at: DateTime<Utc>,

    /// When the definition was last updated
    pub updated_at: DateTime<Utc>,
}

fn default_version() -> String {
    DEFAULT_DEFINITION_VERSION.to_string()
}

impl EntityDefinition {
    /// Creates an empty, active definition at version `1.0`.
    pub fn new(company_id: Option<Uuid>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            company_id,
            name: name.into(),
            description: String::new(),
            version: default_version(),
            previous_version: None,
            status: DefinitionStatus::Active,
            entity_types: Vec::new(),
            relationships: Vec::new(),
            structure: Vec::new(),
            template_key: None,
            template_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Declare an entity type.
    pub fn with_type(mut self, entity_type: EntityTypeSpec) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    /// Declare a relationship.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Add a root node to the declared structure.
    pub fn with_structure(mut self, node: StructureNode) -> Self {
        self.structure.push(node);
        self
    }

    /// List this definition in the template catalog under `key`.
    pub fn with_template_key(mut self, key: impl Into<String>) -> Self {
        self.template_key = Some(key.into());
        self
    }

    /// Whether the definition is active.
    pub fn is_active(&self) -> bool {
        self.status == DefinitionStatus::Active
    }

    /// Whether the definition is listed in the template catalog.
    pub fn is_template(&self) -> bool {
        self.template_key.is_some()
    }

    /// Look up an entity type by name.
    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeSpec> {
        self.entity_types.iter().find(|t| t.name == name)
    }

    /// Look up the relationship for a pairing.
    pub fn relationship(&self, parent_type: &str, child_type: &str) -> Option<&Relationship> {
        self.relationships
            .iter()
            .find(|r| r.parent_type == parent_type && r.child_type == child_type)
    }

    /// Whether any relationship is declared. Pairing checks only apply when true.
    pub fn declares_relationships(&self) -> bool {
        !self.relationships.is_empty()
    }

    /// Whether a child of `child_type` may sit under a parent of `parent_type`.
    pub fn allows(&self, parent_type: &str, child_type: &str) -> bool {
        !self.declares_relationships() || self.relationship(parent_type, child_type).is_some()
    }

    /// Types that never appear as a child type, in declaration order.
    pub fn root_types(&self) -> Vec<&str> {
        let children: HashSet<&str> = self
            .relationships
            .iter()
            .map(|r| r.child_type.as_str())
            .collect();
        self.entity_types
            .iter()
            .map(|t| t.name.as_str())
            .filter(|name| !children.contains(name))
            .collect()
    }

    /// Validate the whole document.
    ///
    /// Checks type name uniqueness, that every relationship references
    /// declared types, that constraints are coherent, that patterns compile,
    /// and that the declared structure fits the types and relationships.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyField("name"));
        }

        let mut seen = HashSet::new();
        for entity_type in &self.entity_types {
            if entity_type.name.trim().is_empty() {
                return Err(SchemaError::EmptyField("entity_types.name"));
            }
            if !seen.insert(entity_type.name.as_str()) {
                return Err(SchemaError::DuplicateType(entity_type.name.clone()));
            }
            entity_type.validate_patterns()?;
        }

        let mut pairs = HashSet::new();
        for rel in &self.relationships {
            for type_name in [&rel.parent_type, &rel.child_type] {
                if !seen.contains(type_name.as_str()) {
                    return Err(SchemaError::UndeclaredType {
                        context: format!("Relationship {} -> {}", rel.parent_type, rel.child_type),
                        type_name: type_name.clone(),
                    });
                }
            }
            if !pairs.insert((rel.parent_type.as_str(), rel.child_type.as_str())) {
                return Err(SchemaError::DuplicateRelationship {
                    parent_type: rel.parent_type.clone(),
                    child_type: rel.child_type.clone(),
                });
            }
            if let Some(max) = rel.constraints.max_children {
                if max < rel.constraints.min_children {
                    return Err(SchemaError::InvalidConstraint {
                        parent_type: rel.parent_type.clone(),
                        child_type: rel.child_type.clone(),
                        reason: format!(
                            "maxChildren {} is below minChildren {}",
                            max, rel.constraints.min_children
                        ),
                    });
                }
            }
        }

        crate::structure::validate_structure(self)
    }

    /// Merge a partial update into this definition.
    ///
    /// Only the fields present in the patch change. The result is not
    /// validated here; callers validate before persisting.
    pub fn apply(&mut self, patch: DefinitionPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(version) = patch.version {
            self.version = version;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(entity_types) = patch.entity_types {
            self.entity_types = entity_types;
        }
        if let Some(relationships) = patch.relationships {
            self.relationships = relationships;
        }
        if let Some(structure) = patch.structure {
            self.structure = structure;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update of a definition.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DefinitionPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New version
    pub version: Option<String>,
    /// New status
    pub status: Option<DefinitionStatus>,
    /// Replacement entity types
    pub entity_types: Option<Vec<EntityTypeSpec>>,
    /// Replacement relationships
    pub relationships: Option<Vec<Relationship>>,
    /// Replacement structure
    pub structure: Option<Vec<StructureNode>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plant_definition() -> EntityDefinition {
        EntityDefinition::new(Some(Uuid::now_v7()), "Plants")
            .with_type(EntityTypeSpec::new("plant"))
            .with_type(EntityTypeSpec::new("department"))
            .with_relationship(Relationship::new("plant", "department").with_max_children(2))
    }

    #[test]
    fn test_new_definition_defaults() {
        let def = EntityDefinition::new(None, "Global");
        assert_eq!(def.version, "1.0");
        assert!(def.is_active());
        assert!(!def.is_template());
        assert!(!def.declares_relationships());
    }

    #[test]
    fn test_relationship_referencing_unknown_type_rejected() {
        let def = plant_definition().with_relationship(Relationship::new("department", "line"));
        match def.validate() {
            Err(SchemaError::UndeclaredType { type_name, .. }) => assert_eq!(type_name, "line"),
            other => panic!("expected UndeclaredType, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let def = plant_definition().with_type(EntityTypeSpec::new("plant"));
        assert_eq!(
            def.validate(),
            Err(SchemaError::DuplicateType("plant".to_string()))
        );
    }

    #[test]
    fn test_max_below_min_rejected() {
        let def = EntityDefinition::new(None, "Bad")
            .with_type(EntityTypeSpec::new("a"))
            .with_type(EntityTypeSpec::new("b"))
            .with_relationship(Relationship::new("a", "b").with_min_children(3).with_max_children(1));
        assert!(matches!(def.validate(), Err(SchemaError::InvalidConstraint { .. })));
    }

    #[test]
    fn test_allows_without_relationships() {
        let def = EntityDefinition::new(None, "Flat")
            .with_type(EntityTypeSpec::new("team"))
            .with_type(EntityTypeSpec::new("squad"));
        assert!(def.allows("team", "squad"));
        assert!(def.allows("squad", "team"));
    }

    #[test]
    fn test_root_types() {
        let def = plant_definition();
        assert_eq!(def.root_types(), vec!["plant"]);
    }

    #[test]
    fn test_attribute_rules() {
        let workstation = EntityTypeSpec::new("workstation")
            .with_attribute("stationCode", AttributeKind::String)
            .with_attribute("efficiency", AttributeKind::Number)
            .require("stationCode")
            .allow_values("status", ["active", "inactive", "maintenance"])
            .with_pattern("stationCode", r"^WS\d{3}$");

        let mut attrs = HashMap::new();
        assert!(matches!(
            workstation.validate_attributes(&attrs),
            Err(SchemaError::MissingAttribute { .. })
        ));

        attrs.insert("stationCode".to_string(), json!("WS001"));
        attrs.insert("status".to_string(), json!("active"));
        assert!(workstation.validate_attributes(&attrs).is_ok());

        attrs.insert("status".to_string(), json!("broken"));
        assert!(matches!(
            workstation.validate_attributes(&attrs),
            Err(SchemaError::DisallowedValue { .. })
        ));

        attrs.insert("status".to_string(), json!("active"));
        attrs.insert("efficiency".to_string(), json!("high"));
        assert!(matches!(
            workstation.validate_attributes(&attrs),
            Err(SchemaError::KindMismatch { .. })
        ));

        attrs.insert("efficiency".to_string(), json!(0.93));
        attrs.insert("stationCode".to_string(), json!("X-1"));
        assert!(matches!(
            workstation.validate_attributes(&attrs),
            Err(SchemaError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let def = EntityDefinition::new(None, "Broken")
            .with_type(EntityTypeSpec::new("plant").with_pattern("plantCode", "(unclosed"));
        assert!(matches!(def.validate(), Err(SchemaError::InvalidPattern { .. })));
    }

    #[test]
    fn test_apply_patch() {
        let mut def = plant_definition();
        def.apply(DefinitionPatch {
            description: Some("Updated".to_string()),
            status: Some(DefinitionStatus::Inactive),
            ..DefinitionPatch::default()
        });
        assert_eq!(def.description, "Updated");
        assert!(!def.is_active());
        assert_eq!(def.name, "Plants");
    }

    #[test]
    fn test_cardinality_label() {
        assert_eq!(Relationship::new("a", "b").cardinality_label(), "0..∞");
        assert_eq!(
            Relationship::new("a", "b").with_min_children(1).with_max_children(5).cardinality_label(),
            "1..5"
        );
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let def: EntityDefinition = serde_json::from_value(json!({
            "id": Uuid::now_v7(),
            "company_id": null,
            "name": "Imported",
            "entity_types": [{"name": "zone", "attributes": [{"name": "area", "type": "number"}]}],
            "created_at": Utc::now(),
            "updated_at": Utc::now()
        }))
        .unwrap();
        assert_eq!(def.version, "1.0");
        assert_eq!(def.status, DefinitionStatus::Active);
        assert_eq!(def.entity_types[0].attributes[0].kind, AttributeKind::Number);
    }
}
