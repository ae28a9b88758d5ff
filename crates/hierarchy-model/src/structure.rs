//! Declared structure of a template
//!
//! A structure is a tree of named nodes that seeding turns into real
//! entities. Node names double as the keys of the name→id map returned when
//! a template is cloned, so they are unique across the whole structure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::definition::{EntityDefinition, SchemaError};
use crate::limits::MAX_DEPTH;

/// One declared node of a structure.
///
/// # Examples
///
/// ```
/// use hierarchy_model::StructureNode;
///
/// let plant = StructureNode::new("Main Plant", "plant")
///     .with_child(StructureNode::new("Production", "department"))
///     .with_child(StructureNode::new("Quality", "department"));
///
/// assert_eq!(plant.node_count(), 3);
/// assert_eq!(plant.names(), vec!["Main Plant", "Production", "Quality"]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StructureNode {
    /// Declared name, unique within the structure
    pub name: String,

    /// Entity type of the node
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Attributes given to the created entity
    #[serde(default)]
    pub attributes: HashMap<String, Value>,

    /// Child nodes
    #[serde(default)]
    pub children: Vec<StructureNode>,
}

impl StructureNode {
    /// Creates a leaf node.
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Append a child node.
    pub fn with_child(mut self, child: StructureNode) -> Self {
        self.children.push(child);
        self
    }

    /// Number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Declared names in breadth-first order.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut queue = std::collections::VecDeque::from([self]);
        while let Some(node) = queue.pop_front() {
            names.push(node.name.as_str());
            queue.extend(node.children.iter());
        }
        names
    }

    /// Height of this subtree; a leaf has height 0.
    pub fn height(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            max = max.max(depth);
            stack.extend(node.children.iter().map(|c| (c, depth + 1)));
        }
        max
    }
}

/// Check a definition's declared structure against its types and relationships.
pub(crate) fn validate_structure(def: &EntityDefinition) -> Result<(), SchemaError> {
    let mut names = HashSet::new();
    let mut stack: Vec<(&StructureNode, Option<&StructureNode>, usize)> =
        def.structure.iter().map(|n| (n, None, 0)).collect();

    while let Some((node, parent, depth)) = stack.pop() {
        if node.name.trim().is_empty() {
            return Err(SchemaError::EmptyField("structure.name"));
        }
        if !names.insert(node.name.as_str()) {
            return Err(SchemaError::Structure(format!(
                "node name '{}' is declared more than once",
                node.name
            )));
        }
        if depth >= MAX_DEPTH {
            return Err(SchemaError::Structure(format!(
                "node '{}' is nested deeper than {} levels",
                node.name, MAX_DEPTH
            )));
        }

        let entity_type = def
            .entity_type(&node.entity_type)
            .ok_or_else(|| SchemaError::UndeclaredType {
                context: format!("Structure node '{}'", node.name),
                type_name: node.entity_type.clone(),
            })?;
        entity_type.validate_attributes(&node.attributes)?;

        if let Some(parent) = parent {
            if !def.allows(&parent.entity_type, &node.entity_type) {
                return Err(SchemaError::Structure(format!(
                    "'{}' ({}) may not be placed under '{}' ({})",
                    node.name, node.entity_type, parent.name, parent.entity_type
                )));
            }
        }

        let mut per_type: HashMap<&str, u32> = HashMap::new();
        for child in &node.children {
            *per_type.entry(child.entity_type.as_str()).or_default() += 1;
        }
        for (child_type, count) in per_type {
            let max = def
                .relationship(&node.entity_type, child_type)
                .and_then(|r| r.constraints.max_children);
            if let Some(max) = max {
                if count > max {
                    return Err(SchemaError::Structure(format!(
                        "'{}' declares {} children of type '{}', at most {} allowed",
                        node.name, count, child_type, max
                    )));
                }
            }
        }

        stack.extend(node.children.iter().map(|c| (c, Some(node), depth + 1)));
    }

    Ok(())
}

/// The structure seeding should instantiate for a definition.
///
/// Returns the declared structure when there is one. Otherwise a structure is
/// derived from the relationships: every root type yields a node, and every
/// declared child type of a node's type yields one child node, named after the
/// type. A type already present on the current branch is not expanded again,
/// which cuts relationship cycles.
pub fn effective_structure(def: &EntityDefinition) -> Vec<StructureNode> {
    if !def.structure.is_empty() {
        return def.structure.clone();
    }

    let mut roots: Vec<&str> = def.root_types();
    if roots.is_empty() {
        if let Some(first) = def.entity_types.first() {
            roots.push(first.name.as_str());
        }
    }

    let mut used = HashSet::new();
    roots
        .into_iter()
        .map(|root| derive_branch(def, root, &mut used))
        .collect()
}

fn unique_name(base: &str, parent: Option<&str>, used: &mut HashSet<String>) -> String {
    let mut name = base.to_string();
    if used.contains(&name) {
        if let Some(parent) = parent {
            name = format!("{}/{}", parent, base);
        }
    }
    let mut suffix = 2;
    let stem = name.clone();
    while used.contains(&name) {
        name = format!("{}-{}", stem, suffix);
        suffix += 1;
    }
    used.insert(name.clone());
    name
}

/// Build one derived branch with an explicit worklist.
///
/// Nodes live in an arena (`Vec`) while the branch grows and are assembled
/// into a tree once every node has been created.
fn derive_branch(def: &EntityDefinition, root_type: &str, used: &mut HashSet<String>) -> StructureNode {
    struct Slot {
        node: StructureNode,
        parent: Option<usize>,
        lineage: Vec<String>,
    }

    let root_name = unique_name(root_type, None, used);
    let mut arena = vec![Slot {
        node: StructureNode::new(root_name, root_type),
        parent: None,
        lineage: vec![root_type.to_string()],
    }];
    let mut work = vec![0usize];

    while let Some(index) = work.pop() {
        if arena[index].lineage.len() >= MAX_DEPTH {
            continue;
        }
        let parent_type = arena[index].node.entity_type.clone();
        let parent_name = arena[index].node.name.clone();
        for rel in def.relationships.iter().filter(|r| r.parent_type == parent_type) {
            if arena[index].lineage.contains(&rel.child_type) {
                continue;
            }
            let name = unique_name(&rel.child_type, Some(&parent_name), used);
            let mut lineage = arena[index].lineage.clone();
            lineage.push(rel.child_type.clone());
            arena.push(Slot {
                node: StructureNode::new(name, rel.child_type.clone()),
                parent: Some(index),
                lineage,
            });
            work.push(arena.len() - 1);
        }
    }

    // Children always sit after their parent, so folding from the back
    // attaches every finished subtree before its parent is consumed.
    let mut nodes: Vec<Option<StructureNode>> = Vec::with_capacity(arena.len());
    let mut parents = Vec::with_capacity(arena.len());
    for slot in arena {
        nodes.push(Some(slot.node));
        parents.push(slot.parent);
    }
    for index in (1..nodes.len()).rev() {
        if let (Some(node), Some(parent)) = (nodes[index].take(), parents[index]) {
            if let Some(parent_node) = nodes[parent].as_mut() {
                parent_node.children.insert(0, node);
            }
        }
    }
    nodes[0].take().unwrap_or_default()
}
