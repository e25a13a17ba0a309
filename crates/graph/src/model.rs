use extract::EntityType;
use indexmap::IndexMap;
use serde::Serialize;

use crate::analytics::GraphAnalytics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Normalized name. Unique within a graph.
    pub id: String,
    /// Display name as first extracted.
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Appearances in the entities list plus relationships that reference it.
    pub mention_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub label: String,
    pub weight: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Relationship {
    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }
}

/// Two extractions disagreed on a non-Unknown type. The first one is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeConflict {
    pub entity_id: String,
    pub kept: EntityType,
    pub rejected: EntityType,
}

/// Entities, relationships and the analytics derived from them.
///
/// Only [`GraphAssembler`](crate::GraphAssembler) mutates a graph; everything
/// else gets read-only accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphModel {
    pub(crate) entities: IndexMap<String, Entity>,
    pub(crate) relationships: Vec<Relationship>,
    pub(crate) analytics: GraphAnalytics,
    pub(crate) type_conflicts: Vec<TypeConflict>,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities in first-seen order.
    pub fn entities(&self) -> impl ExactSizeIterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Position of an entity in first-seen order.
    pub fn entity_index(&self, id: &str) -> Option<usize> {
        self.entities.get_index_of(id)
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn analytics(&self) -> &GraphAnalytics {
        &self.analytics
    }

    pub fn type_conflicts(&self) -> &[TypeConflict] {
        &self.type_conflicts
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
