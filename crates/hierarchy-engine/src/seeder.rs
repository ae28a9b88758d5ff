//! Hierarchy Seeder
//!
//! The onboarding path: instantiate a template (or one of the company's own
//! definitions) as a new subtree, then staff it by linking employees to
//! nodes named in the structure.
//!
//! Each node is created in its own transaction. When any step fails, the
//! seeder deletes every root it created, which cascades to the nodes and
//! assets beneath, and returns the original error.

use hierarchy_model::{effective_structure, EmployeeSnapshot, EntityDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::assets::{AssetBindingEngine, LinkOutcome};
use crate::error::{HierarchyError, HierarchyResult};
use crate::store::HierarchyStore;
use crate::templates::{instantiate, TemplateRegistry};
use crate::tree::TreeEngine;

/// Where a seed's structure comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SeedSource {
    /// A template by catalog key
    Template(String),
    /// A definition by id; global or owned by the seeded company
    Definition(Uuid),
}

/// An employee to link to a structural node once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffingAssignment {
    /// Declared structure name of the target node
    pub node: String,
    /// Employee to link
    pub employee: EmployeeSnapshot,
}

/// A seeding request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRequest {
    /// Structure source
    pub source: SeedSource,
    /// Company receiving the subtree
    pub company_id: Uuid,
    /// Prefix for every created node name
    #[serde(default)]
    pub name_prefix: Option<String>,
    /// Employees to link after the tree exists
    #[serde(default)]
    pub staffing: Vec<StaffingAssignment>,
}

impl SeedRequest {
    /// Seed from a template.
    pub fn template(key: impl Into<String>, company_id: Uuid) -> Self {
        Self {
            source: SeedSource::Template(key.into()),
            company_id,
            name_prefix: None,
            staffing: Vec::new(),
        }
    }

    /// Seed from a definition.
    pub fn definition(definition_id: Uuid, company_id: Uuid) -> Self {
        Self {
            source: SeedSource::Definition(definition_id),
            company_id,
            name_prefix: None,
            staffing: Vec::new(),
        }
    }

    /// Prefix every created node name.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    /// Link `employee` to the node declared as `node`.
    pub fn with_staff(mut self, node: impl Into<String>, employee: EmployeeSnapshot) -> Self {
        self.staffing.push(StaffingAssignment {
            node: node.into(),
            employee,
        });
        self
    }
}

/// What a seed created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedReport {
    /// Definition the created nodes are bound to
    pub definition_id: Uuid,
    /// Root nodes of the new subtree
    pub root_ids: Vec<Uuid>,
    /// Created ids keyed by declared structure name
    pub created: HashMap<String, Uuid>,
    /// Employee links made
    pub links: Vec<LinkOutcome>,
}

/// Seeds company hierarchies.
#[derive(Clone)]
pub struct HierarchySeeder {
    store: Arc<dyn HierarchyStore>,
    templates: TemplateRegistry,
    tree: TreeEngine,
    assets: AssetBindingEngine,
}

impl HierarchySeeder {
    /// Create a seeder over the given services.
    pub fn new(
        store: Arc<dyn HierarchyStore>,
        templates: TemplateRegistry,
        tree: TreeEngine,
        assets: AssetBindingEngine,
    ) -> Self {
        Self {
            store,
            templates,
            tree,
            assets,
        }
    }

    /// Create the subtree described by `request` and staff it.
    ///
    /// Staffing names are checked against the structure before anything is
    /// created. Fails with `NotFound` for a missing source, `Validation` for
    /// an unknown staffing name, and otherwise with whatever error stopped
    /// the seed, after cleanup.
    pub async fn seed(&self, request: SeedRequest) -> HierarchyResult<SeedReport> {
        let definition = self.resolve_source(&request).await?;

        let declared: HashSet<String> = effective_structure(&definition)
            .iter()
            .flat_map(|root| root.names().into_iter().map(str::to_string).collect::<Vec<_>>())
            .collect();
        if let Some(unknown) = request.staffing.iter().find(|s| !declared.contains(&s.node)) {
            return Err(HierarchyError::Validation(format!(
                "staffing names node '{}', which the structure does not declare",
                unknown.node
            )));
        }

        let mut created = HashMap::new();
        let mut root_ids = Vec::new();
        let result = self
            .build(&definition, &request, &mut created, &mut root_ids)
            .await;

        match result {
            Ok(links) => {
                tracing::info!(
                    company_id = %request.company_id,
                    definition_id = %definition.id,
                    entities = created.len(),
                    links = links.len(),
                    "Hierarchy seeded"
                );
                Ok(SeedReport {
                    definition_id: definition.id,
                    root_ids,
                    created,
                    links,
                })
            }
            Err(err) => {
                self.clean_up(request.company_id, &root_ids).await;
                Err(err)
            }
        }
    }

    async fn build(
        &self,
        definition: &EntityDefinition,
        request: &SeedRequest,
        created: &mut HashMap<String, Uuid>,
        root_ids: &mut Vec<Uuid>,
    ) -> HierarchyResult<Vec<LinkOutcome>> {
        let prefix = request.name_prefix.as_deref().unwrap_or("");
        instantiate(&self.tree, definition, request.company_id, prefix, created, root_ids).await?;

        let mut links = Vec::with_capacity(request.staffing.len());
        for assignment in &request.staffing {
            let entity_id = created.get(&assignment.node).copied().ok_or_else(|| {
                HierarchyError::Internal(format!("seeded node '{}' is missing", assignment.node))
            })?;
            links.push(
                self.assets
                    .link_employee(request.company_id, entity_id, assignment.employee.clone())
                    .await?,
            );
        }
        Ok(links)
    }

    async fn resolve_source(&self, request: &SeedRequest) -> HierarchyResult<EntityDefinition> {
        match &request.source {
            SeedSource::Template(key) => self.templates.get_template(key).await,
            SeedSource::Definition(id) => {
                let tx = self.store.begin().await?;
                tx.get_definition(*id)
                    .await?
                    .filter(|d| {
                        d.is_active()
                            && (d.company_id.is_none() || d.company_id == Some(request.company_id))
                    })
                    .ok_or_else(|| HierarchyError::definition_not_found(id))
            }
        }
    }

    /// Delete every created root. Failures are logged, not returned.
    async fn clean_up(&self, company_id: Uuid, root_ids: &[Uuid]) {
        for root_id in root_ids {
            match self.tree.delete_entity(*root_id).await {
                Ok(summary) => tracing::warn!(
                    company_id = %company_id,
                    root_id = %root_id,
                    entities_deleted = summary.entities_deleted,
                    "Removed partially seeded subtree"
                ),
                Err(e) => tracing::warn!(
                    company_id = %company_id,
                    root_id = %root_id,
                    error = %e,
                    "Failed to remove partially seeded subtree"
                ),
            }
        }
    }
}
