//! # Hierarchy Models
//!
//! This crate provides the domain models for company organization
//! hierarchies: typed trees of plants, departments, lines, workstations,
//! teams, and whatever else a company's schema declares.
//!
//! ## Overview
//!
//! The hierarchy-model crate handles:
//! - **Definitions**: Per-company schemas of entity types, attribute rules, and relationships
//! - **Entities**: Tree nodes with materialized ancestor paths
//! - **Assets**: Typed records bound to nodes, most commonly employee assignments
//! - **Structures**: Declared node trees that templates are seeded from
//! - **Catalog**: Built-in templates (manufacturing, office)
//! - **Limits**: Depth, fan-out, name, and metadata bounds
//!
//! ## Architecture
//!
//! ```text
//! EntityDefinition (company or global template)
//!   ├─ EntityTypeSpec (attributes, required, allowed values, patterns)
//!   ├─ Relationship (parentType → childType, maxChildren)
//!   └─ StructureNode tree (seed plan)
//!
//! Entity (company-scoped node, path = ancestors)
//!   └─ Asset (employee snapshot or generic payload)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hierarchy_model::{Entity, EntityDefinition, EntityTypeSpec, Relationship};
//! use uuid::Uuid;
//!
//! let company_id = Uuid::now_v7();
//!
//! // Declare a schema
//! let definition = EntityDefinition::new(Some(company_id), "Plants")
//!     .with_type(EntityTypeSpec::new("plant"))
//!     .with_type(EntityTypeSpec::new("department"))
//!     .with_relationship(Relationship::new("plant", "department").with_max_children(2));
//! definition.validate().unwrap();
//!
//! // Build nodes
//! let plant = Entity::new(company_id, "Mumbai", "plant");
//! let production = Entity::new(company_id, "Production", "department").under(&plant);
//! ```

pub mod asset;
pub mod catalog;
pub mod definition;
pub mod entity;
pub mod limits;
pub mod structure;

// Re-export main types for convenience
pub use asset::{Asset, AssetMetadata, EmployeeSnapshot, EMPLOYEE_ASSET_TYPE};
pub use catalog::BuiltinTemplate;
pub use definition::{
    AttributeKind, AttributeSpec, DefinitionPatch, DefinitionStatus, EntityDefinition,
    EntityTypeSpec, Relationship, RelationshipConstraints, SchemaError,
    DEFAULT_DEFINITION_VERSION,
};
pub use entity::{Entity, EntityPatch, ManagerSlot, ManagerStatus, NewEntity};
pub use limits::{TreeLimits, MAX_CHILDREN, MAX_DEPTH, MAX_METADATA_BYTES, MAX_NAME_LEN};
pub use structure::{effective_structure, StructureNode};
