//! Schema dependency graph for reference-aware sampling.
//!
//! Provides:
//! - Reverse mapping construction (target → entities referencing it)
//! - Forward mapping by inversion (source → entities it references)
//! - Reverse closure for seed bucket initialization
//! - Topological load order for restoring snapshots

use super::{EntityId, FieldKind, Schema, Through};
use std::collections::{BTreeSet, VecDeque};

/// One side of a reference relationship.
///
/// In the reverse mapping of `T`, `entity` is the dependent whose `field`
/// references `T`. In the forward mapping of `S`, `entity` is the target that
/// `S.field` references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub entity: EntityId,
    pub field: String,
}

impl Edge {
    pub fn new(entity: EntityId, field: impl Into<String>) -> Self {
        Self {
            entity,
            field: field.into(),
        }
    }
}

/// Bidirectional reference graph built once per run from the working set.
#[derive(Debug)]
pub struct SchemaGraph {
    /// For each entity, the (dependent, field) pairs that reference it
    reverse: Vec<BTreeSet<Edge>>,
    /// For each entity, the (target, field) pairs it references
    forward: Vec<BTreeSet<Edge>>,
}

/// Result of topological sort
#[derive(Debug)]
pub struct TopoSortResult {
    /// Entities in load order (referenced entities before referencing ones)
    pub order: Vec<EntityId>,
    /// Entities that are part of cycles (could not be ordered)
    pub cyclic: Vec<EntityId>,
}

impl SchemaGraph {
    /// Build the graph starting from `roots`, following references depth-first.
    ///
    /// Entities reachable from the roots are inspected too, each exactly once.
    /// User-defined through entities contribute edges only through their own
    /// reference fields.
    pub fn build(schema: &Schema, roots: &[EntityId]) -> Self {
        let n = schema.len();
        let mut reverse: Vec<BTreeSet<Edge>> = vec![BTreeSet::new(); n];
        let mut visited = vec![false; n];

        for &root in roots {
            if (root.0 as usize) < n && !visited[root.0 as usize] {
                visit(schema, root, &mut reverse, &mut visited);
            }
        }

        let mut forward: Vec<BTreeSet<Edge>> = vec![BTreeSet::new(); n];
        for (target, dependents) in reverse.iter().enumerate() {
            for edge in dependents {
                forward[edge.entity.0 as usize]
                    .insert(Edge::new(EntityId(target as u32), edge.field.clone()));
            }
        }

        Self { reverse, forward }
    }

    /// Build the graph over every entity of the schema
    pub fn from_schema(schema: &Schema) -> Self {
        let all: Vec<EntityId> = schema.iter().map(|e| e.id).collect();
        Self::build(schema, &all)
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Entities (and fields) that reference `id`
    pub fn reverse(&self, id: EntityId) -> impl Iterator<Item = &Edge> {
        self.reverse.get(id.0 as usize).into_iter().flatten()
    }

    /// Entities (and fields) that `id` references
    pub fn forward(&self, id: EntityId) -> impl Iterator<Item = &Edge> {
        self.forward.get(id.0 as usize).into_iter().flatten()
    }

    pub fn has_reverse(&self, id: EntityId) -> bool {
        self.reverse
            .get(id.0 as usize)
            .is_some_and(|edges| !edges.is_empty())
    }

    pub fn has_forward(&self, id: EntityId) -> bool {
        self.forward
            .get(id.0 as usize)
            .is_some_and(|edges| !edges.is_empty())
    }

    /// Check if an entity references itself
    pub fn has_self_reference(&self, id: EntityId) -> bool {
        self.forward(id).any(|edge| edge.entity == id)
    }

    /// Every entity transitively reachable from `id` through the reverse
    /// mapping, in breadth-first discovery order. `id` itself is excluded
    /// unless it sits on a reverse cycle.
    pub fn reverse_closure(&self, id: EntityId) -> Vec<EntityId> {
        let mut reached = Vec::new();
        let mut visited = vec![false; self.len()];
        let mut queue = VecDeque::new();
        queue.push_back(id);

        while let Some(current) = queue.pop_front() {
            for edge in self.reverse(current) {
                let idx = edge.entity.0 as usize;
                if !visited[idx] {
                    visited[idx] = true;
                    reached.push(edge.entity);
                    queue.push_back(edge.entity);
                }
            }
        }

        reached
    }

    /// Perform topological sort over forward edges using Kahn's algorithm.
    ///
    /// Self-references are ignored; entities on longer cycles are returned
    /// separately.
    pub fn topo_sort(&self) -> TopoSortResult {
        let n = self.len();

        let mut in_degree: Vec<usize> = vec![0; n];
        for (i, targets) in self.forward.iter().enumerate() {
            let parents: BTreeSet<EntityId> = targets
                .iter()
                .map(|edge| edge.entity)
                .filter(|&target| target.0 as usize != i)
                .collect();
            in_degree[i] = parents.len();
        }

        let mut queue: VecDeque<EntityId> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg == 0)
            .map(|(i, _)| EntityId(i as u32))
            .collect();

        let mut order = Vec::with_capacity(n);

        while let Some(id) = queue.pop_front() {
            order.push(id);

            let children: BTreeSet<EntityId> = self
                .reverse(id)
                .map(|edge| edge.entity)
                .filter(|&child| child != id)
                .collect();
            for child in children {
                in_degree[child.0 as usize] -= 1;
                if in_degree[child.0 as usize] == 0 {
                    queue.push_back(child);
                }
            }
        }

        let cyclic = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &deg)| deg > 0)
            .map(|(i, _)| EntityId(i as u32))
            .collect();

        TopoSortResult { order, cyclic }
    }

    /// Load order: acyclic entities in dependency order, then cyclic ones.
    pub fn load_order(&self) -> Vec<EntityId> {
        let result = self.topo_sort();
        result.order.into_iter().chain(result.cyclic).collect()
    }
}

fn visit(
    schema: &Schema,
    id: EntityId,
    reverse: &mut [BTreeSet<Edge>],
    visited: &mut [bool],
) {
    visited[id.0 as usize] = true;

    let Some(entity) = schema.entity(id) else {
        return;
    };

    for field in entity.reference_fields() {
        if let FieldKind::MultiReference {
            through: Through::Entity(through),
            ..
        } = &field.kind
        {
            if let Some(through_id) = schema.entity_id(through) {
                if !visited[through_id.0 as usize] {
                    visit(schema, through_id, reverse, visited);
                }
            }
            continue;
        }

        let Some(target) = field.target().and_then(|t| schema.entity_id(t)) else {
            continue;
        };

        reverse[target.0 as usize].insert(Edge::new(id, field.name.clone()));

        if !visited[target.0 as usize] {
            visit(schema, target, reverse, visited);
        }
    }
}
