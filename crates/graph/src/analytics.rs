use extract::EntityType;
use indexmap::IndexMap;
use petgraph::unionfind::UnionFind;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{Entity, Relationship};

/// Statistics recomputed from scratch after every assembly.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphAnalytics {
    /// Only types that occur are present.
    pub type_histogram: BTreeMap<EntityType, usize>,
    /// In + out degree per entity id. A self-loop adds 2.
    pub degree: IndexMap<String, usize>,
    /// Undirected connected components, each listed in entity order.
    pub components: Vec<Vec<String>>,
    pub self_loops: usize,
    pub isolated: Vec<String>,
    /// Share of possible undirected entity pairs that are connected.
    pub density: f64,
    pub average_degree: f64,
}

impl GraphAnalytics {
    pub fn compute(entities: &IndexMap<String, Entity>, relationships: &[Relationship]) -> Self {
        let n = entities.len();

        let mut type_histogram = BTreeMap::new();
        for entity in entities.values() {
            *type_histogram.entry(entity.entity_type).or_insert(0) += 1;
        }

        let mut degree: IndexMap<String, usize> =
            entities.keys().map(|id| (id.clone(), 0)).collect();
        let mut components = UnionFind::new(n);
        let mut pairs = HashSet::new();
        let mut self_loops = 0;

        for rel in relationships {
            let (Some(source), Some(target)) = (
                entities.get_index_of(&rel.source_id),
                entities.get_index_of(&rel.target_id),
            ) else {
                continue;
            };

            degree[source] += 1;
            degree[target] += 1;
            components.union(source, target);

            if source == target {
                self_loops += 1;
            } else {
                pairs.insert((source.min(target), source.max(target)));
            }
        }

        let isolated = degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(id, _)| id.clone())
            .collect();

        let density = if n > 1 {
            2.0 * pairs.len() as f64 / (n * (n - 1)) as f64
        } else {
            0.0
        };
        let average_degree = if n > 0 {
            degree.values().sum::<usize>() as f64 / n as f64
        } else {
            0.0
        };

        Self {
            type_histogram,
            degree,
            components: group_components(entities, &components),
            self_loops,
            isolated,
            density,
            average_degree,
        }
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Index into `components` for an entity id.
    pub fn component_of(&self, id: &str) -> Option<usize> {
        self.components
            .iter()
            .position(|members| members.iter().any(|m| m == id))
    }

    /// Entity ids sorted by degree, highest first. Ties keep entity order.
    pub fn ranked_by_degree(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> =
            self.degree.iter().map(|(id, &d)| (id.as_str(), d)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked
    }
}

/// Components numbered by the first entity that belongs to them.
fn group_components(
    entities: &IndexMap<String, Entity>,
    union_find: &UnionFind<usize>,
) -> Vec<Vec<String>> {
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut components: Vec<Vec<String>> = Vec::new();

    for (idx, id) in entities.keys().enumerate() {
        let root = union_find.find(idx);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(id.clone());
    }

    components
}
