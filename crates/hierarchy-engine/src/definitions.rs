//! Definition Store
//!
//! Owns `EntityDefinition` documents. Every write validates the complete
//! resulting document before it is persisted. Edits never touch existing
//! entities: validation against a definition happens only when an entity is
//! mutated, using the definition as read at that moment.

use chrono::Utc;
use hierarchy_model::{DefinitionPatch, DefinitionStatus, EntityDefinition, DEFAULT_DEFINITION_VERSION};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{HierarchyError, HierarchyResult};
use crate::store::{HierarchyStore, StoreTransaction};

/// CRUD over entity definitions.
#[derive(Clone)]
pub struct DefinitionStore {
    store: Arc<dyn HierarchyStore>,
}

impl DefinitionStore {
    /// Create a definition store over `store`.
    pub fn new(store: Arc<dyn HierarchyStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new definition.
    ///
    /// An empty version becomes `1.0`; the status is always `active`. A
    /// template key already held by another definition is a `Validation`
    /// error.
    pub async fn create_definition(&self, mut definition: EntityDefinition) -> HierarchyResult<EntityDefinition> {
        if definition.version.trim().is_empty() {
            definition.version = DEFAULT_DEFINITION_VERSION.to_string();
        }
        definition.status = DefinitionStatus::Active;
        definition.validate()?;

        let mut tx = self.store.begin().await?;
        if tx.get_definition(definition.id).await?.is_some() {
            return Err(HierarchyError::Conflict(format!(
                "entity definition {} already exists",
                definition.id
            )));
        }
        if let Some(key) = &definition.template_key {
            if let Some(holder) = tx.find_template(key).await? {
                return Err(HierarchyError::Validation(format!(
                    "template key '{}' is already used by definition {}",
                    key, holder.id
                )));
            }
        }
        tx.put_definition(definition.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            definition_id = %definition.id,
            company_id = ?definition.company_id,
            types = definition.entity_types.len(),
            "Entity definition created"
        );
        Ok(definition)
    }

    /// Merge `patch` into a definition and persist the result.
    ///
    /// The merged document is validated as a whole; an invalid merge leaves
    /// the stored definition untouched.
    pub async fn update_definition(&self, id: Uuid, patch: DefinitionPatch) -> HierarchyResult<EntityDefinition> {
        let mut tx = self.store.begin().await?;
        let mut definition = tx
            .get_definition(id)
            .await?
            .ok_or_else(|| HierarchyError::definition_not_found(id))?;

        definition.apply(patch);
        if definition.version.trim().is_empty() {
            definition.version = DEFAULT_DEFINITION_VERSION.to_string();
        }
        definition.validate()?;

        tx.put_definition(definition.clone()).await?;
        tx.commit().await?;

        tracing::info!(definition_id = %id, version = %definition.version, "Entity definition updated");
        Ok(definition)
    }

    /// Get a definition by id.
    pub async fn get_definition(&self, id: Uuid) -> HierarchyResult<EntityDefinition> {
        let tx = self.store.begin().await?;
        tx.get_definition(id)
            .await?
            .ok_or_else(|| HierarchyError::definition_not_found(id))
    }

    /// Active definitions listed as templates.
    pub async fn list_active_templates(&self) -> HierarchyResult<Vec<EntityDefinition>> {
        let tx = self.store.begin().await?;
        Ok(tx
            .list_definitions()
            .await?
            .into_iter()
            .filter(|d| d.is_active() && d.is_template())
            .collect())
    }

    /// Active definitions owned by `company_id`, oldest first.
    pub async fn list_for_company(&self, company_id: Uuid) -> HierarchyResult<Vec<EntityDefinition>> {
        let tx = self.store.begin().await?;
        Ok(tx
            .list_definitions()
            .await?
            .into_iter()
            .filter(|d| d.is_active() && d.company_id == Some(company_id))
            .collect())
    }

    /// Copy a template into a new definition owned by `company_id`.
    ///
    /// Types, relationships, and structure are copied; the copy records the
    /// template it came from and is not itself a template.
    pub async fn create_definition_from_template(
        &self,
        template_key: &str,
        company_id: Uuid,
        name: impl Into<String>,
    ) -> HierarchyResult<EntityDefinition> {
        let mut tx = self.store.begin().await?;
        let template = tx
            .find_template(template_key)
            .await?
            .filter(|t| t.is_active())
            .ok_or_else(|| HierarchyError::NotFound(format!("template {}", template_key)))?;

        let now = Utc::now();
        let definition = EntityDefinition {
            id: Uuid::now_v7(),
            company_id: Some(company_id),
            name: name.into(),
            previous_version: None,
            status: DefinitionStatus::Active,
            template_key: None,
            template_ref: Some(template.id),
            created_at: now,
            updated_at: now,
            ..template
        };
        definition.validate()?;

        tx.put_definition(definition.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            definition_id = %definition.id,
            company_id = %company_id,
            template_key,
            "Entity definition created from template"
        );
        Ok(definition)
    }
}

/// Resolve the definition governing a new entity of `company_id`.
///
/// An explicitly requested definition must exist, be active, and be global,
/// a template, or owned by the company. Without one, the company's most
/// recently created active definition applies, if any.
pub(crate) async fn resolve_definition(
    tx: &dyn StoreTransaction,
    company_id: Uuid,
    requested: Option<Uuid>,
) -> HierarchyResult<Option<EntityDefinition>> {
    if let Some(id) = requested {
        return tx
            .get_definition(id)
            .await?
            .filter(|d| {
                d.is_active()
                    && (d.company_id.is_none() || d.is_template() || d.company_id == Some(company_id))
            })
            .map(Some)
            .ok_or_else(|| HierarchyError::definition_not_found(id));
    }

    Ok(tx
        .list_definitions()
        .await?
        .into_iter()
        .filter(|d| d.is_active() && d.company_id == Some(company_id))
        .last())
}

/// The definition governing an existing entity.
///
/// The entity's own definition when it still exists, otherwise none. An
/// entity without a definition follows the company's active definition.
pub(crate) async fn governing_definition(
    tx: &dyn StoreTransaction,
    company_id: Uuid,
    definition_id: Option<Uuid>,
) -> HierarchyResult<Option<EntityDefinition>> {
    match definition_id {
        Some(id) => Ok(tx.get_definition(id).await?),
        None => resolve_definition(tx, company_id, None).await,
    }
}
