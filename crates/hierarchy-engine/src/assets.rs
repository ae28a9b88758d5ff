//! Asset Binding Engine
//!
//! Binds assets to entity nodes. Employee assets follow one rule: a
//! `(company_id, employee_id)` pair has at most one asset at any instant.
//! Linking an employee somewhere new retires the previous link in the same
//! transaction, and the store's unique index on the pair turns a lost race
//! into a `Conflict` that [`retry_on_conflict`] absorbs.

use hierarchy_model::{Asset, EmployeeSnapshot, SchemaError, EMPLOYEE_ASSET_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{HierarchyError, HierarchyResult};
use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::store::{HierarchyStore, StoreTransaction};
use crate::tree::load_in_company;

/// Result of linking an employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkOutcome {
    /// The new employee asset
    pub asset: Asset,

    /// Entity the employee was linked to before, when this was a move
    pub previous_entity_id: Option<Uuid>,
}

impl LinkOutcome {
    /// Whether the link replaced an earlier one.
    pub fn moved(&self) -> bool {
        self.previous_entity_id.is_some()
    }
}

/// An asset as returned by [`AssetBindingEngine::get_assets`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetView {
    /// The stored asset
    #[serde(flatten)]
    pub asset: Asset,

    /// Reference to the employee record, when details were requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_ref: Option<String>,
}

/// Asset operations over a hierarchy store.
#[derive(Clone)]
pub struct AssetBindingEngine {
    store: Arc<dyn HierarchyStore>,
    retry: RetryPolicy,
}

impl AssetBindingEngine {
    /// Create an asset engine retrying conflicts with `retry`.
    pub fn new(store: Arc<dyn HierarchyStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Bind an employee to `entity_id`, moving any existing link.
    ///
    /// The snapshot's display fields are stored as given; they are never
    /// refreshed afterwards.
    pub async fn link_employee(
        &self,
        company_id: Uuid,
        entity_id: Uuid,
        snapshot: EmployeeSnapshot,
    ) -> HierarchyResult<LinkOutcome> {
        if snapshot.employee_id.trim().is_empty() {
            return Err(SchemaError::EmptyField("employee_id").into());
        }

        let outcome = retry_on_conflict(&self.retry, "link_employee", || {
            self.try_link(company_id, entity_id, snapshot.clone())
        })
        .await?;

        tracing::info!(
            company_id = %company_id,
            entity_id = %entity_id,
            employee_id = %outcome.asset.name,
            previous_entity_id = ?outcome.previous_entity_id,
            "Employee linked"
        );
        Ok(outcome)
    }

    async fn try_link(
        &self,
        company_id: Uuid,
        entity_id: Uuid,
        snapshot: EmployeeSnapshot,
    ) -> HierarchyResult<LinkOutcome> {
        let mut tx = self.store.begin().await?;
        load_in_company(&*tx, company_id, entity_id).await?;

        let previous = tx.find_employee_asset(company_id, &snapshot.employee_id).await?;
        if let Some(previous) = &previous {
            tx.delete_asset(previous.id).await?;
        }

        let asset = Asset::employee(company_id, entity_id, snapshot);
        tx.insert_asset(asset.clone()).await?;
        tx.commit().await?;

        Ok(LinkOutcome {
            asset,
            previous_entity_id: previous.map(|p| p.entity_id),
        })
    }

    /// Remove the link of an employee. Returns the removed asset, if any.
    pub async fn unlink_employee(&self, company_id: Uuid, employee_id: &str) -> HierarchyResult<Option<Asset>> {
        let mut tx = self.store.begin().await?;
        let Some(asset) = tx.find_employee_asset(company_id, employee_id).await? else {
            return Ok(None);
        };
        tx.delete_asset(asset.id).await?;
        tx.commit().await?;

        tracing::info!(company_id = %company_id, employee_id, entity_id = %asset.entity_id, "Employee unlinked");
        Ok(Some(asset))
    }

    /// The current link of an employee.
    pub async fn employee_assignment(&self, company_id: Uuid, employee_id: &str) -> HierarchyResult<Option<Asset>> {
        let tx = self.store.begin().await?;
        Ok(tx.find_employee_asset(company_id, employee_id).await?)
    }

    /// Bind a non-employee asset to `entity_id`.
    pub async fn attach_asset(
        &self,
        entity_id: Uuid,
        name: &str,
        asset_type: &str,
        metadata: HashMap<String, Value>,
    ) -> HierarchyResult<Asset> {
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyField("name").into());
        }
        if asset_type.trim().is_empty() {
            return Err(SchemaError::EmptyField("type").into());
        }
        if asset_type == EMPLOYEE_ASSET_TYPE {
            return Err(HierarchyError::Validation(
                "employee assets are created by linking an employee".to_string(),
            ));
        }

        let mut tx = self.store.begin().await?;
        let entity = tx
            .get_entity(entity_id)
            .await?
            .ok_or_else(|| HierarchyError::entity_not_found(entity_id))?;

        let asset = Asset::generic(entity.company_id, entity_id, name.trim(), asset_type, metadata);
        tx.insert_asset(asset.clone()).await?;
        tx.commit().await?;

        tracing::info!(asset_id = %asset.id, entity_id = %entity_id, asset_type, "Asset attached");
        Ok(asset)
    }

    /// Delete an asset. Deleting a missing id succeeds with `None`.
    pub async fn delete_asset(&self, asset_id: Uuid) -> HierarchyResult<Option<Asset>> {
        let mut tx = self.store.begin().await?;
        let removed = tx.delete_asset(asset_id).await?;
        tx.commit().await?;

        if removed.is_some() {
            tracing::info!(asset_id = %asset_id, "Asset deleted");
        }
        Ok(removed)
    }

    /// Assets bound to `entity_id` and every node under it.
    ///
    /// With `include_details`, employee assets expose their `employee_ref`
    /// so callers can join the employee records themselves.
    pub async fn get_assets(
        &self,
        entity_id: Uuid,
        asset_type: Option<&str>,
        include_details: bool,
    ) -> HierarchyResult<Vec<AssetView>> {
        let tx = self.store.begin().await?;
        if tx.get_entity(entity_id).await?.is_none() {
            return Err(HierarchyError::entity_not_found(entity_id));
        }

        let mut ids = vec![entity_id];
        ids.extend(tx.descendants(entity_id).await?.into_iter().map(|e| e.id));

        Ok(tx
            .assets_for_entities(&ids, asset_type)
            .await?
            .into_iter()
            .map(|asset| {
                let employee_ref = include_details
                    .then(|| asset.employee_snapshot().map(|s| s.employee_ref.clone()))
                    .flatten();
                AssetView { asset, employee_ref }
            })
            .collect())
    }
}

/// Delete every asset bound to any of `entity_ids` inside `tx`.
///
/// Returns the number of assets removed.
pub(crate) async fn remove_assets_for_entities(
    tx: &mut dyn StoreTransaction,
    entity_ids: &[Uuid],
) -> HierarchyResult<usize> {
    let assets = tx.assets_for_entities(entity_ids, None).await?;
    for asset in &assets {
        tx.delete_asset(asset.id).await?;
    }
    Ok(assets.len())
}
