//! Template Registry
//!
//! Templates are definitions listed under a unique template key: the
//! built-in catalog installed at startup plus company definitions promoted
//! into the catalog. Cloning a template instantiates its structure as a
//! fresh subtree of a company's hierarchy.

use chrono::Utc;
use hierarchy_model::{effective_structure, BuiltinTemplate, EntityDefinition, NewEntity, StructureNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{HierarchyError, HierarchyResult};
use crate::store::HierarchyStore;
use crate::tree::TreeEngine;

/// A template as listed by [`TemplateRegistry::list_templates`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    /// The template definition
    #[serde(flatten)]
    pub definition: EntityDefinition,

    /// Nodes a clone would create, declared or derived from relationships
    pub preview: Vec<StructureNode>,
}

/// What [`TemplateRegistry::install_builtins`] did for one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallAction {
    /// Not present before
    Installed,
    /// Present at another version and replaced
    Upgraded {
        /// Version that was replaced
        from: String,
    },
    /// Present at the same version
    Unchanged,
}

/// Template catalog and cloning.
#[derive(Clone)]
pub struct TemplateRegistry {
    store: Arc<dyn HierarchyStore>,
    tree: TreeEngine,
}

impl TemplateRegistry {
    /// Create a registry cloning through `tree`.
    pub fn new(store: Arc<dyn HierarchyStore>, tree: TreeEngine) -> Self {
        Self { store, tree }
    }

    /// Install or upgrade the built-in templates.
    ///
    /// A template already present at the catalog version is left alone. One
    /// at another version is replaced in place, keeping its id so entities
    /// bound to it stay bound, and records the replaced version.
    pub async fn install_builtins(&self) -> HierarchyResult<Vec<(BuiltinTemplate, InstallAction)>> {
        let mut tx = self.store.begin().await?;
        let mut actions = Vec::with_capacity(BuiltinTemplate::ALL.len());

        for template in BuiltinTemplate::ALL {
            let mut definition = template.definition();
            definition.validate()?;

            let action = match tx.find_template(template.key()).await? {
                None => {
                    tx.put_definition(definition).await?;
                    InstallAction::Installed
                }
                Some(existing) if existing.version != definition.version => {
                    definition.id = existing.id;
                    definition.created_at = existing.created_at;
                    definition.updated_at = Utc::now();
                    definition.previous_version = Some(existing.version.clone());
                    tx.put_definition(definition).await?;
                    InstallAction::Upgraded { from: existing.version }
                }
                Some(_) => InstallAction::Unchanged,
            };

            tracing::info!(template_key = template.key(), action = ?action, "Built-in template checked");
            actions.push((template, action));
        }

        tx.commit().await?;
        Ok(actions)
    }

    /// Active templates with a preview of the structure each would seed.
    pub async fn list_templates(&self) -> HierarchyResult<Vec<TemplateSummary>> {
        let tx = self.store.begin().await?;
        Ok(tx
            .list_definitions()
            .await?
            .into_iter()
            .filter(|d| d.is_active() && d.is_template())
            .map(|definition| TemplateSummary {
                preview: effective_structure(&definition),
                definition,
            })
            .collect())
    }

    /// Get an active template by key.
    pub async fn get_template(&self, key: &str) -> HierarchyResult<EntityDefinition> {
        let tx = self.store.begin().await?;
        tx.find_template(key)
            .await?
            .filter(|t| t.is_active())
            .ok_or_else(|| HierarchyError::NotFound(format!("template {}", key)))
    }

    /// List a definition in the catalog under `key`.
    pub async fn promote(&self, definition_id: Uuid, key: &str) -> HierarchyResult<EntityDefinition> {
        let key = key.trim();
        if key.is_empty() {
            return Err(HierarchyError::Validation("template key must not be empty".to_string()));
        }

        let mut tx = self.store.begin().await?;
        let mut definition = tx
            .get_definition(definition_id)
            .await?
            .ok_or_else(|| HierarchyError::definition_not_found(definition_id))?;
        if let Some(holder) = tx.find_template(key).await? {
            if holder.id != definition_id {
                return Err(HierarchyError::Validation(format!(
                    "template key '{}' is already used by definition {}",
                    key, holder.id
                )));
            }
        }

        definition.template_key = Some(key.to_string());
        definition.updated_at = Utc::now();
        tx.put_definition(definition.clone()).await?;
        tx.commit().await?;

        tracing::info!(definition_id = %definition_id, template_key = key, "Definition promoted to template");
        Ok(definition)
    }

    /// Instantiate a template's structure for `company_id`.
    ///
    /// Nodes are created breadth-first, each named `name_prefix` followed by
    /// its declared name and bound to the template definition. Returns the
    /// created ids keyed by declared name. Every call creates a new subtree.
    pub async fn clone_template(
        &self,
        key: &str,
        company_id: Uuid,
        name_prefix: Option<&str>,
    ) -> HierarchyResult<HashMap<String, Uuid>> {
        let template = self.get_template(key).await?;
        let mut created = HashMap::new();
        let mut roots = Vec::new();

        instantiate(&self.tree, &template, company_id, name_prefix.unwrap_or(""), &mut created, &mut roots).await?;

        tracing::info!(
            template_key = key,
            company_id = %company_id,
            entities = created.len(),
            "Template cloned"
        );
        Ok(created)
    }
}

/// Create the effective structure of `definition` under `company_id`.
///
/// Progress is recorded in `created` and `roots` as it happens, so a caller
/// can clean up after a failure partway through.
pub(crate) async fn instantiate(
    tree: &TreeEngine,
    definition: &EntityDefinition,
    company_id: Uuid,
    name_prefix: &str,
    created: &mut HashMap<String, Uuid>,
    roots: &mut Vec<Uuid>,
) -> HierarchyResult<()> {
    let structure = effective_structure(definition);
    let mut queue: VecDeque<(&StructureNode, Option<Uuid>)> =
        structure.iter().map(|node| (node, None)).collect();

    while let Some((node, parent_id)) = queue.pop_front() {
        let mut request = NewEntity::new(company_id, format!("{}{}", name_prefix, node.name), &node.entity_type)
            .with_definition(definition.id)
            .with_attributes(node.attributes.clone());
        if let Some(parent_id) = parent_id {
            request = request.with_parent(parent_id);
        }

        let entity = tree.create_entity(request).await?;
        if parent_id.is_none() {
            roots.push(entity.id);
        }
        created.insert(node.name.clone(), entity.id);
        queue.extend(node.children.iter().map(|child| (child, Some(entity.id))));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHierarchyStore;
    use hierarchy_model::{EntityTypeSpec, Relationship, TreeLimits};

    fn registry() -> (TemplateRegistry, TreeEngine, Arc<MemoryHierarchyStore>) {
        let store = Arc::new(MemoryHierarchyStore::new());
        let tree = TreeEngine::new(store.clone(), TreeLimits::default());
        (TemplateRegistry::new(store.clone(), tree.clone()), tree, store)
    }

    #[tokio::test]
    async fn test_install_builtins_is_idempotent() {
        let (registry, _, _) = registry();

        let first = registry.install_builtins().await.unwrap();
        assert!(first.iter().all(|(_, action)| *action == InstallAction::Installed));

        let second = registry.install_builtins().await.unwrap();
        assert!(second.iter().all(|(_, action)| *action == InstallAction::Unchanged));
        assert_eq!(registry.list_templates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_install_upgrades_outdated_version() {
        let (registry, _, store) = registry();
        let outdated = BuiltinTemplate::Office.definition().with_version("0.9");
        let mut tx = store.begin().await.unwrap();
        tx.put_definition(outdated.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let actions = registry.install_builtins().await.unwrap();
        assert!(actions.contains(&(
            BuiltinTemplate::Office,
            InstallAction::Upgraded { from: "0.9".to_string() }
        )));

        let office = registry.get_template("office").await.unwrap();
        assert_eq!(office.id, outdated.id);
        assert_eq!(office.version, "1.0");
        assert_eq!(office.previous_version.as_deref(), Some("0.9"));
    }

    #[tokio::test]
    async fn test_clone_manufacturing_with_prefix() {
        let (registry, tree, _) = registry();
        registry.install_builtins().await.unwrap();
        let company_id = Uuid::now_v7();

        let created = registry
            .clone_template("manufacturing", company_id, Some("Mumbai-"))
            .await
            .unwrap();
        assert_eq!(created.len(), 8);

        let production = tree.get_entity(created["Production"]).await.unwrap();
        assert_eq!(production.name, "Mumbai-Production");
        assert_eq!(production.company_id, company_id);
        assert_eq!(production.path, vec![created["Operations"], created["Main Plant"]]);

        // A second clone is a fresh, unrelated subtree
        let again = registry
            .clone_template("manufacturing", company_id, Some("Pune-"))
            .await
            .unwrap();
        assert_ne!(again["Production"], created["Production"]);
    }

    #[tokio::test]
    async fn test_promote_and_clone_derived_structure() {
        let (registry, tree, store) = registry();
        let company_id = Uuid::now_v7();
        let definition = EntityDefinition::new(Some(company_id), "Teams")
            .with_type(EntityTypeSpec::new("division"))
            .with_type(EntityTypeSpec::new("team"))
            .with_relationship(Relationship::new("division", "team"));
        let mut tx = store.begin().await.unwrap();
        tx.put_definition(definition.clone()).await.unwrap();
        tx.commit().await.unwrap();

        registry.promote(definition.id, "teams").await.unwrap();
        let listed = registry.list_templates().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].preview[0].entity_type, "division");

        let other_company = Uuid::now_v7();
        let created = registry.clone_template("teams", other_company, None).await.unwrap();
        assert_eq!(created.len(), 2);
        let descendants = tree.get_descendants(created["division"], Some("team")).await.unwrap();
        assert_eq!(descendants.len(), 1);
    }

    #[tokio::test]
    async fn test_promote_rejects_taken_key() {
        let (registry, _, store) = registry();
        registry.install_builtins().await.unwrap();
        let definition = EntityDefinition::new(Some(Uuid::now_v7()), "Mine");
        let mut tx = store.begin().await.unwrap();
        tx.put_definition(definition.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let err = registry.promote(definition.id, "office").await.unwrap_err();
        assert!(matches!(err, HierarchyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_clone_unknown_template() {
        let (registry, _, _) = registry();
        let err = registry.clone_template("warehouse", Uuid::now_v7(), None).await.unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound(_)));
    }
}
