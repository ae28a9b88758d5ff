//! # Hierarchy Engine
//!
//! This crate provides the services that maintain company organization
//! hierarchies: typed trees whose shape is governed by per-company
//! definitions, with employees and other assets bound to the nodes.
//!
//! ## Overview
//!
//! The hierarchy-engine crate handles:
//! - **Definition Store**: Validated CRUD over entity definitions
//! - **Template Registry**: Built-in and promoted templates, cloned into companies
//! - **Tree Engine**: Node CRUD, moves, cascading deletes, path maintenance
//! - **Asset Binding**: Employee links (one per employee) and generic assets
//! - **Seeder**: Template instantiation plus staffing, with cleanup on failure
//!
//! ## Features
//!
//! - `memory` (default): In-memory transactional store
//!
//! ## Invariants
//!
//! - A node's `path` is its parent's path followed by the parent's id
//! - A node and its parent belong to the same company
//! - Paths stay shorter than the maximum depth (50) and no node has more
//!   than 1000 direct children
//! - When the governing definition declares relationships, every
//!   parent/child type pair is declared and within its `maxChildren`
//! - An employee is linked to at most one node per company
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hierarchy_engine::{Hierarchy, HierarchyConfig};
//! use hierarchy_model::EmployeeSnapshot;
//! use uuid::Uuid;
//!
//! async fn onboard() -> hierarchy_engine::HierarchyResult<()> {
//!     let hierarchy = Hierarchy::in_memory(HierarchyConfig::from_env())?;
//!     hierarchy.templates().install_builtins().await?;
//!
//!     let company_id = Uuid::now_v7();
//!     let created = hierarchy
//!         .templates()
//!         .clone_template("manufacturing", company_id, Some("Mumbai-"))
//!         .await?;
//!
//!     hierarchy
//!         .assets()
//!         .link_employee(
//!             company_id,
//!             created["Production"],
//!             EmployeeSnapshot::new("EMP-001", "6650f0c2a1").with_designation("DEPT_HEAD"),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod config;
pub mod definitions;
pub mod error;
pub mod retry;
pub mod seeder;
pub mod store;
pub mod templates;
pub mod tree;

use std::sync::Arc;

pub use assets::{AssetBindingEngine, AssetView, LinkOutcome};
pub use config::{ConfigError, HierarchyConfig};
pub use definitions::DefinitionStore;
pub use error::{HierarchyError, HierarchyResult};
pub use retry::{retry_on_conflict, RetryPolicy};
pub use seeder::{HierarchySeeder, SeedReport, SeedRequest, SeedSource, StaffingAssignment};
pub use store::{HierarchyStore, StoreError, StoreResult, StoreTransaction};
pub use templates::{InstallAction, TemplateRegistry, TemplateSummary};
pub use tree::{DeleteSummary, InvariantViolation, ManagerAssignment, TreeEngine, ViolationKind};

#[cfg(feature = "memory")]
pub use store::MemoryHierarchyStore;

/// All hierarchy services wired over one store.
#[derive(Clone)]
pub struct Hierarchy {
    config: HierarchyConfig,
    definitions: DefinitionStore,
    templates: TemplateRegistry,
    tree: TreeEngine,
    assets: AssetBindingEngine,
    seeder: HierarchySeeder,
}

impl Hierarchy {
    /// Wire every service over `store`.
    ///
    /// Fails when `config` does not validate, for example when a limit is
    /// loosened past its hard cap.
    pub fn new(store: Arc<dyn HierarchyStore>, config: HierarchyConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let tree = TreeEngine::new(store.clone(), config.limits);
        let assets = AssetBindingEngine::new(store.clone(), config.conflict_retry());
        let templates = TemplateRegistry::new(store.clone(), tree.clone());
        let seeder = HierarchySeeder::new(store.clone(), templates.clone(), tree.clone(), assets.clone());

        tracing::debug!(limits = ?config.limits, "Hierarchy services initialized");

        Ok(Self {
            definitions: DefinitionStore::new(store),
            templates,
            tree,
            assets,
            seeder,
            config,
        })
    }

    /// Wire every service over a fresh in-memory store.
    #[cfg(feature = "memory")]
    pub fn in_memory(config: HierarchyConfig) -> Result<Self, ConfigError> {
        let store = MemoryHierarchyStore::new().with_lock_timeout(config.lock_timeout());
        Self::new(Arc::new(store), config)
    }

    /// Configuration in effect.
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Definition Store.
    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    /// Template Registry.
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Tree Engine.
    pub fn tree(&self) -> &TreeEngine {
        &self.tree
    }

    /// Asset Binding Engine.
    pub fn assets(&self) -> &AssetBindingEngine {
        &self.assets
    }

    /// Hierarchy Seeder.
    pub fn seeder(&self) -> &HierarchySeeder {
        &self.seeder
    }
}
