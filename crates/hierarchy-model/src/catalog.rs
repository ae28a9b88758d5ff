//! Built-in structural templates
//!
//! This module defines the fixed catalog of templates installed at startup.
//! Each template is a global definition (no owning company) carrying its
//! entity types, relationships, and a declared structure to seed from.

use serde::{Deserialize, Serialize};

use crate::definition::{AttributeKind, EntityDefinition, EntityTypeSpec, Relationship};
use crate::structure::StructureNode;

/// Built-in template.
///
/// # Examples
///
/// ```
/// use hierarchy_model::BuiltinTemplate;
///
/// let template = BuiltinTemplate::from_key("manufacturing").unwrap();
/// let definition = template.definition();
/// assert_eq!(definition.template_key.as_deref(), Some("manufacturing"));
/// assert!(definition.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinTemplate {
    /// Business units, plants, departments, lines, workstations
    Manufacturing,

    /// Buildings, floors, zones, workspaces
    Office,
}

impl BuiltinTemplate {
    /// Every built-in template.
    pub const ALL: [BuiltinTemplate; 2] = [BuiltinTemplate::Manufacturing, BuiltinTemplate::Office];

    /// Catalog key.
    pub fn key(&self) -> &'static str {
        match self {
            BuiltinTemplate::Manufacturing => "manufacturing",
            BuiltinTemplate::Office => "office",
        }
    }

    /// Look up a built-in template by catalog key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.key() == key)
    }

    /// Catalog version; bumping it replaces installed copies.
    pub fn version(&self) -> &'static str {
        "1.0"
    }

    /// Build the template's definition document.
    pub fn definition(&self) -> EntityDefinition {
        match self {
            BuiltinTemplate::Manufacturing => manufacturing(),
            BuiltinTemplate::Office => office(),
        }
        .with_template_key(self.key())
        .with_version(self.version())
    }
}

fn manufacturing() -> EntityDefinition {
    EntityDefinition::new(None, "Manufacturing Plant")
        .with_description(
            "Standard template for manufacturing facilities with plants, lines, and workstations",
        )
        .with_type(
            EntityTypeSpec::new("business_unit")
                .with_description("Business Unit")
                .with_designation("BU_HEAD")
                .with_attribute("buCode", AttributeKind::String)
                .with_attribute("type", AttributeKind::String)
                .with_attribute("region", AttributeKind::String)
                .with_attribute("revenue_target", AttributeKind::Number)
                .require("buCode")
                .allow_values("type", ["production", "sales", "rd"])
                .with_pattern("buCode", r"^BU\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("plant")
                .with_description("Manufacturing plant facility")
                .with_designation("PLANT_HEAD")
                .with_attribute("location", AttributeKind::String)
                .with_attribute("plantCode", AttributeKind::String)
                .with_attribute("type", AttributeKind::String)
                .with_attribute("capacity", AttributeKind::Number)
                .with_attribute("operatingHours", AttributeKind::String)
                .require("location")
                .require("plantCode")
                .allow_values("type", ["production", "assembly", "warehouse"])
                .with_pattern("plantCode", r"^PLT\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("department")
                .with_description("Department within plant")
                .with_designation("DEPT_HEAD")
                .with_attribute("departmentCode", AttributeKind::String)
                .with_attribute("category", AttributeKind::String)
                .with_attribute("shift", AttributeKind::String)
                .require("departmentCode")
                .allow_values("category", ["production", "quality", "maintenance", "logistics"])
                .with_pattern("departmentCode", r"^DEP\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("line")
                .with_description("Production or assembly line")
                .with_designation("LINE_SUPERVISOR")
                .with_attribute("lineCode", AttributeKind::String)
                .with_attribute("capacity", AttributeKind::Number)
                .with_attribute("product", AttributeKind::String)
                .with_attribute("cycleTime", AttributeKind::Number)
                .require("lineCode")
                .require("capacity")
                .with_pattern("lineCode", r"^LN\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("workstation")
                .with_description("Individual workstation or machine")
                .with_designation("STATION_OPERATOR")
                .with_attribute("stationCode", AttributeKind::String)
                .with_attribute("status", AttributeKind::String)
                .with_attribute("efficiency", AttributeKind::Number)
                .require("stationCode")
                .require("status")
                .allow_values("status", ["active", "inactive", "maintenance"])
                .with_pattern("stationCode", r"^WS\d{3}$"),
        )
        .with_relationship(Relationship::new("business_unit", "plant"))
        .with_relationship(Relationship::new("plant", "department"))
        .with_relationship(Relationship::new("department", "line"))
        .with_relationship(Relationship::new("line", "workstation"))
        .with_structure(
            StructureNode::new("Operations", "business_unit")
                .with_attribute("buCode", "BU001")
                .with_attribute("type", "production")
                .with_child(
                    StructureNode::new("Main Plant", "plant")
                        .with_attribute("location", "Headquarters")
                        .with_attribute("plantCode", "PLT001")
                        .with_attribute("type", "production")
                        .with_child(
                            StructureNode::new("Production", "department")
                                .with_attribute("departmentCode", "DEP001")
                                .with_attribute("category", "production")
                                .with_child(
                                    StructureNode::new("Assembly Line 1", "line")
                                        .with_attribute("lineCode", "LN001")
                                        .with_attribute("capacity", 100)
                                        .with_child(
                                            StructureNode::new("Workstation 1", "workstation")
                                                .with_attribute("stationCode", "WS001")
                                                .with_attribute("status", "active"),
                                        ),
                                ),
                        )
                        .with_child(
                            StructureNode::new("Quality", "department")
                                .with_attribute("departmentCode", "DEP002")
                                .with_attribute("category", "quality"),
                        )
                        .with_child(
                            StructureNode::new("Maintenance", "department")
                                .with_attribute("departmentCode", "DEP003")
                                .with_attribute("category", "maintenance"),
                        )
                        .with_child(
                            StructureNode::new("Logistics", "department")
                                .with_attribute("departmentCode", "DEP004")
                                .with_attribute("category", "logistics"),
                        ),
                ),
        )
}

fn office() -> EntityDefinition {
    EntityDefinition::new(None, "Office Building")
        .with_description("Template for office buildings with floors, zones, and workspaces")
        .with_type(
            EntityTypeSpec::new("building")
                .with_description("Office building")
                .with_designation("FACILITY_MANAGER")
                .with_attribute("buildingCode", AttributeKind::String)
                .with_attribute("address", AttributeKind::String)
                .with_attribute("type", AttributeKind::String)
                .with_attribute("totalFloors", AttributeKind::Integer)
                .with_attribute("capacity", AttributeKind::Integer)
                .require("buildingCode")
                .require("address")
                .allow_values("type", ["corporate", "regional", "branch"])
                .with_pattern("buildingCode", r"^BLD\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("floor")
                .with_description("Building floor")
                .with_designation("FLOOR_WARDEN")
                .with_attribute("floorNumber", AttributeKind::String)
                .with_attribute("capacity", AttributeKind::Integer)
                .require("floorNumber")
                .with_pattern("floorNumber", r"^\d{1,2}$"),
        )
        .with_type(
            EntityTypeSpec::new("zone")
                .with_description("Floor zone or area")
                .with_designation("ZONE_LEAD")
                .with_attribute("zoneCode", AttributeKind::String)
                .with_attribute("purpose", AttributeKind::String)
                .with_attribute("area", AttributeKind::Number)
                .require("zoneCode")
                .require("purpose")
                .allow_values("purpose", ["workspace", "meeting", "utility", "recreation"])
                .with_pattern("zoneCode", r"^Z\d{3}$"),
        )
        .with_type(
            EntityTypeSpec::new("workspace")
                .with_description("Individual workspace or room")
                .with_attribute("workspaceId", AttributeKind::String)
                .with_attribute("type", AttributeKind::String)
                .with_attribute("capacity", AttributeKind::Integer)
                .require("workspaceId")
                .require("type")
                .allow_values("type", ["desk", "office", "meeting_room", "utility_room"])
                .with_pattern("workspaceId", r"^WS\d{4}$"),
        )
        .with_relationship(Relationship::new("building", "floor").with_max_children(50))
        .with_relationship(Relationship::new("floor", "zone").with_max_children(10))
        .with_relationship(Relationship::new("zone", "workspace").with_max_children(50))
        .with_structure(
            StructureNode::new("Head Office", "building")
                .with_attribute("buildingCode", "BLD001")
                .with_attribute("address", "Main Street")
                .with_attribute("type", "corporate")
                .with_child(
                    StructureNode::new("Ground Floor", "floor")
                        .with_attribute("floorNumber", "0")
                        .with_child(
                            StructureNode::new("Open Workspace", "zone")
                                .with_attribute("zoneCode", "Z001")
                                .with_attribute("purpose", "workspace")
                                .with_child(
                                    StructureNode::new("Desk Pool", "workspace")
                                        .with_attribute("workspaceId", "WS0001")
                                        .with_attribute("type", "desk"),
                                ),
                        )
                        .with_child(
                            StructureNode::new("Meeting Area", "zone")
                                .with_attribute("zoneCode", "Z002")
                                .with_attribute("purpose", "meeting")
                                .with_child(
                                    StructureNode::new("Conference Room", "workspace")
                                        .with_attribute("workspaceId", "WS0002")
                                        .with_attribute("type", "meeting_room"),
                                ),
                        ),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_validate() {
        for template in BuiltinTemplate::ALL {
            let definition = template.definition();
            assert!(
                definition.validate().is_ok(),
                "{} failed validation: {:?}",
                template.key(),
                definition.validate()
            );
            assert!(definition.company_id.is_none());
            assert_eq!(definition.version, template.version());
        }
    }

    #[test]
    fn test_from_key() {
        assert_eq!(BuiltinTemplate::from_key("office"), Some(BuiltinTemplate::Office));
        assert_eq!(BuiltinTemplate::from_key("warehouse"), None);
    }

    #[test]
    fn test_manufacturing_structure_names() {
        let definition = BuiltinTemplate::Manufacturing.definition();
        let names = definition.structure[0].names();
        assert!(names.contains(&"Production"));
        assert!(names.contains(&"Workstation 1"));
        assert_eq!(definition.structure[0].height(), 4);
    }

    #[test]
    fn test_office_constraints() {
        let definition = BuiltinTemplate::Office.definition();
        let rel = definition.relationship("floor", "zone").unwrap();
        assert_eq!(rel.constraints.max_children, Some(10));
        assert_eq!(
            definition.entity_type("floor").and_then(|t| t.designation.as_deref()),
            Some("FLOOR_WARDEN")
        );
    }
}
