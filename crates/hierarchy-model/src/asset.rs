//! Asset models
//!
//! Assets are typed records bound to an entity node. The recurring case is an
//! `employee` asset, a staffing assignment that carries a point-in-time
//! snapshot of the employee's display fields. The snapshot is never refreshed
//! from the employee record; callers that need current data join on
//! `employee_ref` themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Asset type string of employee assets.
pub const EMPLOYEE_ASSET_TYPE: &str = "employee";

/// Denormalized employee fields captured when the employee is linked.
///
/// # Examples
///
/// ```
/// use hierarchy_model::EmployeeSnapshot;
///
/// let snapshot = EmployeeSnapshot::new("EMP-001", "6650f0c2a1")
///     .with_designation("LINE_SUPERVISOR")
///     .with_email("asha@example.com");
/// assert_eq!(snapshot.employee_id, "EMP-001");
/// assert_eq!(snapshot.mobile, "");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmployeeSnapshot {
    /// Business employee id, unique within a company
    pub employee_id: String,

    /// Reference to the employee record held by the employee service
    pub employee_ref: String,

    /// Designation at link time
    #[serde(default)]
    pub designation: String,

    /// Email at link time
    #[serde(default)]
    pub email: String,

    /// Mobile number at link time
    #[serde(default)]
    pub mobile: String,
}

impl EmployeeSnapshot {
    /// Creates a snapshot with empty display fields.
    pub fn new(employee_id: impl Into<String>, employee_ref: impl Into<String>) -> Self {
        Self {
            employee_id: employee_id.into(),
            employee_ref: employee_ref.into(),
            designation: String::new(),
            email: String::new(),
            mobile: String::new(),
        }
    }

    /// Set the designation.
    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = designation.into();
        self
    }

    /// Set the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set the mobile number.
    pub fn with_mobile(mut self, mobile: impl Into<String>) -> Self {
        self.mobile = mobile.into();
        self
    }
}

/// Payload of an asset.
///
/// Serialized without a tag. When an [`Asset`] is read back, the variant is
/// chosen by its `type`, never by the shape of the payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum AssetMetadata {
    /// Staffing snapshot of an `employee` asset
    Employee(EmployeeSnapshot),

    /// Free-form payload of any other asset type
    Generic(HashMap<String, Value>),
}

/// A typed record bound to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "AssetRecord")]
pub struct Asset {
    /// Unique identifier
    pub id: Uuid,

    /// Entity the asset is bound to
    pub entity_id: Uuid,

    /// Owning company, equal to the entity's company
    pub company_id: Uuid,

    /// Display name
    pub name: String,

    /// Asset type, `employee` or any other string
    #[serde(rename = "type")]
    pub asset_type: String,

    /// Typed payload
    pub metadata: AssetMetadata,

    /// When the asset was created
    pub created_at: DateTime<Utc>,

    /// When the asset was last updated
    pub updated_at: DateTime<Utc>,
}

/// Wire shape of an [`Asset`] before its metadata is interpreted.
#[derive(Deserialize)]
struct AssetRecord {
    id: Uuid,
    entity_id: Uuid,
    company_id: Uuid,
    name: String,
    #[serde(rename = "type")]
    asset_type: String,
    #[serde(default)]
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssetRecord> for Asset {
    type Error = serde_json::Error;

    fn try_from(record: AssetRecord) -> Result<Self, Self::Error> {
        let metadata = if record.asset_type == EMPLOYEE_ASSET_TYPE {
            AssetMetadata::Employee(serde_json::from_value(record.metadata)?)
        } else if record.metadata.is_null() {
            AssetMetadata::Generic(HashMap::new())
        } else {
            AssetMetadata::Generic(serde_json::from_value(record.metadata)?)
        };

        Ok(Self {
            id: record.id,
            entity_id: record.entity_id,
            company_id: record.company_id,
            name: record.name,
            asset_type: record.asset_type,
            metadata,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

impl Asset {
    /// Creates an employee asset bound to `entity_id`.
    pub fn employee(company_id: Uuid, entity_id: Uuid, snapshot: EmployeeSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            entity_id,
            company_id,
            name: snapshot.employee_id.clone(),
            asset_type: EMPLOYEE_ASSET_TYPE.to_string(),
            metadata: AssetMetadata::Employee(snapshot),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a non-employee asset bound to `entity_id`.
    pub fn generic(
        company_id: Uuid,
        entity_id: Uuid,
        name: impl Into<String>,
        asset_type: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            entity_id,
            company_id,
            name: name.into(),
            asset_type: asset_type.into(),
            metadata: AssetMetadata::Generic(metadata),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this is an employee asset.
    pub fn is_employee(&self) -> bool {
        self.asset_type == EMPLOYEE_ASSET_TYPE
    }

    /// The employee snapshot, for employee assets.
    pub fn employee_snapshot(&self) -> Option<&EmployeeSnapshot> {
        match &self.metadata {
            AssetMetadata::Employee(snapshot) if self.is_employee() => Some(snapshot),
            _ => None,
        }
    }

    /// The business employee id, for employee assets.
    pub fn employee_id(&self) -> Option<&str> {
        self.employee_snapshot().map(|s| s.employee_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_employee_asset() {
        let company_id = Uuid::now_v7();
        let entity_id = Uuid::now_v7();
        let asset = Asset::employee(company_id, entity_id, EmployeeSnapshot::new("EMP-9", "ref-9"));

        assert!(asset.is_employee());
        assert_eq!(asset.employee_id(), Some("EMP-9"));
        assert_eq!(asset.entity_id, entity_id);
    }

    #[test]
    fn test_generic_asset_has_no_employee_id() {
        let mut metadata = HashMap::new();
        metadata.insert("serial".to_string(), json!("CNC-44"));
        let asset = Asset::generic(Uuid::now_v7(), Uuid::now_v7(), "Lathe", "machine", metadata);

        assert!(!asset.is_employee());
        assert_eq!(asset.employee_id(), None);
    }

    #[test]
    fn test_employee_asset_round_trips_through_json() {
        let asset = Asset::employee(
            Uuid::now_v7(),
            Uuid::now_v7(),
            EmployeeSnapshot::new("EMP-1", "ref-1").with_mobile("9999"),
        );
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["type"], "employee");
        assert_eq!(json["metadata"]["employee_id"], "EMP-1");

        let back: Asset = serde_json::from_value(json).unwrap();
        assert_eq!(back.employee_snapshot().map(|s| s.mobile.as_str()), Some("9999"));
    }

    #[test]
    fn test_generic_asset_with_employee_keys_stays_generic() {
        let mut metadata = HashMap::new();
        metadata.insert("employee_id".to_string(), json!("E1"));
        metadata.insert("employee_ref".to_string(), json!("R1"));
        metadata.insert("serial".to_string(), json!("SN-7"));
        let asset = Asset::generic(Uuid::now_v7(), Uuid::now_v7(), "Badge Reader", "device", metadata);

        let back: Asset = serde_json::from_str(&serde_json::to_string(&asset).unwrap()).unwrap();
        assert_eq!(back, asset);
        assert_eq!(back.employee_id(), None);
        match back.metadata {
            AssetMetadata::Generic(fields) => assert_eq!(fields["serial"], json!("SN-7")),
            other => panic!("expected generic metadata, got {:?}", other),
        }
    }

    #[test]
    fn test_employee_asset_without_snapshot_fields_is_rejected() {
        let mut json = serde_json::to_value(Asset::employee(
            Uuid::now_v7(),
            Uuid::now_v7(),
            EmployeeSnapshot::new("EMP-1", "ref-1"),
        ))
        .unwrap();
        json["metadata"] = json!({ "serial": "SN-7" });

        assert!(serde_json::from_value::<Asset>(json).is_err());
    }
}
