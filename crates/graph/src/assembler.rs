use extract::normalizer::{collapse_whitespace, normalize_relation_label};
use extract::{EntityDraft, EntityType, ExtractionResult, FoldingNormalizer, NameNormalizer};
use indexmap::map::Entry;
use std::collections::HashMap;
use std::collections::hash_map::Entry as EdgeEntry;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analytics::GraphAnalytics;
use crate::model::{Entity, GraphModel, Relationship, TypeConflict};

/// Merges validated extraction drafts into a [`GraphModel`].
pub struct GraphAssembler {
    normalizer: Arc<dyn NameNormalizer>,
}

impl Default for GraphAssembler {
    fn default() -> Self {
        Self::new(Arc::new(FoldingNormalizer))
    }
}

impl GraphAssembler {
    pub fn new(normalizer: Arc<dyn NameNormalizer>) -> Self {
        Self { normalizer }
    }

    /// Merge `extraction` into `existing` (or an empty graph) and recompute analytics.
    pub fn assemble(&self, existing: Option<GraphModel>, extraction: &ExtractionResult) -> GraphModel {
        let mut graph = existing.unwrap_or_default();

        let mut edge_index: HashMap<(String, String, String), usize> = graph
            .relationships
            .iter()
            .enumerate()
            .map(|(idx, rel)| {
                (
                    (rel.source_id.clone(), rel.target_id.clone(), rel.label.clone()),
                    idx,
                )
            })
            .collect();

        for draft in &extraction.entities {
            self.merge_entity(&mut graph, draft);
        }

        for draft in &extraction.relationships {
            let source_id = self.normalizer.normalize(&draft.source);
            let target_id = self.normalizer.normalize(&draft.target);
            let label = normalize_relation_label(&draft.relation);
            if source_id.is_empty() || target_id.is_empty() || label.is_empty() {
                warn!(relation = %draft.relation, "Skipping relationship with an empty endpoint or label");
                continue;
            }

            ensure_endpoint(&mut graph, &source_id, &draft.source);
            ensure_endpoint(&mut graph, &target_id, &draft.target);
            // A self-loop mentions its entity once
            add_mention(&mut graph, &source_id);
            if target_id != source_id {
                add_mention(&mut graph, &target_id);
            }

            match edge_index.entry((source_id.clone(), target_id.clone(), label.clone())) {
                EdgeEntry::Occupied(slot) => {
                    let rel = &mut graph.relationships[*slot.get()];
                    rel.weight += 1;
                    if rel.description.is_none() {
                        rel.description = draft.description.clone();
                    }
                }
                EdgeEntry::Vacant(slot) => {
                    slot.insert(graph.relationships.len());
                    graph.relationships.push(Relationship {
                        source_id,
                        target_id,
                        label,
                        weight: 1,
                        description: draft.description.clone(),
                    });
                }
            }
        }

        graph.analytics = GraphAnalytics::compute(&graph.entities, &graph.relationships);

        info!(
            entities = graph.entities.len(),
            relationships = graph.relationships.len(),
            components = graph.analytics.component_count(),
            "Graph assembled"
        );
        graph
    }

    fn merge_entity(&self, graph: &mut GraphModel, draft: &EntityDraft) {
        let id = self.normalizer.normalize(&draft.name);
        if id.is_empty() {
            warn!(name = %draft.name, "Skipping entity whose name normalizes to nothing");
            return;
        }

        match graph.entities.entry(id) {
            Entry::Occupied(mut slot) => {
                let entity = slot.get_mut();
                entity.mention_count += declared_mentions(draft);

                if entity.entity_type.is_unknown() {
                    if !draft.entity_type.is_unknown() {
                        debug!(id = %entity.id, to = %draft.entity_type, "Upgrading Unknown entity type");
                        entity.entity_type = draft.entity_type;
                    }
                } else if !draft.entity_type.is_unknown() && draft.entity_type != entity.entity_type {
                    warn!(
                        id = %entity.id,
                        kept = %entity.entity_type,
                        rejected = %draft.entity_type,
                        "Conflicting entity types, keeping the first"
                    );
                    graph.type_conflicts.push(TypeConflict {
                        entity_id: entity.id.clone(),
                        kept: entity.entity_type,
                        rejected: draft.entity_type,
                    });
                }

                if entity.description.is_none() {
                    entity.description = draft.description.clone();
                }
            }
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                slot.insert(Entity {
                    id,
                    label: collapse_whitespace(&draft.name),
                    entity_type: draft.entity_type,
                    mention_count: declared_mentions(draft),
                    description: draft.description.clone(),
                });
            }
        }
    }
}

fn add_mention(graph: &mut GraphModel, id: &str) {
    if let Some(entity) = graph.entities.get_mut(id) {
        entity.mention_count += 1;
    }
}

/// A healed draft stands in for its first relationship, which is counted with the relationships.
fn declared_mentions(draft: &EntityDraft) -> usize {
    if draft.healed { 0 } else { 1 }
}

/// Create an Unknown entity for an endpoint that was never declared.
/// Its mentions come from the relationships that reference it.
fn ensure_endpoint(graph: &mut GraphModel, id: &str, name: &str) {
    if graph.entities.contains_key(id) {
        return;
    }

    warn!(name = %name, "Relationship endpoint was never declared, adding as Unknown");
    graph.entities.insert(
        id.to_string(),
        Entity {
            id: id.to_string(),
            label: collapse_whitespace(name),
            entity_type: EntityType::Unknown,
            mention_count: 0,
            description: None,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{RelationshipDraft, ResponseParser};
    use std::collections::BTreeMap;

    fn entity(name: &str, entity_type: EntityType) -> EntityDraft {
        EntityDraft::new(name, entity_type)
    }

    fn rel(source: &str, target: &str, relation: &str) -> RelationshipDraft {
        RelationshipDraft::new(source, target, relation)
    }

    fn extraction(entities: Vec<EntityDraft>, relationships: Vec<RelationshipDraft>) -> ExtractionResult {
        ExtractionResult {
            entities,
            relationships,
            ..Default::default()
        }
    }

    fn steve_jobs() -> ExtractionResult {
        extraction(
            vec![
                entity("Steve Jobs", EntityType::Person),
                entity("Apple Inc.", EntityType::Organization),
                entity("Cupertino", EntityType::Location),
            ],
            vec![
                rel("Steve Jobs", "Apple Inc.", "founded"),
                rel("Apple Inc.", "Cupertino", "located_in"),
            ],
        )
    }

    fn assert_referential_integrity(graph: &GraphModel) {
        for r in graph.relationships() {
            assert!(graph.entity(&r.source_id).is_some(), "dangling source {}", r.source_id);
            assert!(graph.entity(&r.target_id).is_some(), "dangling target {}", r.target_id);
        }
    }

    #[test]
    fn test_steve_jobs_scenario() {
        let graph = GraphAssembler::default().assemble(None, &steve_jobs());
        let analytics = graph.analytics();

        assert_eq!(graph.entity_count(), 3);
        assert_eq!(graph.relationship_count(), 2);
        assert_eq!(
            analytics.type_histogram,
            BTreeMap::from([
                (EntityType::Person, 1),
                (EntityType::Organization, 1),
                (EntityType::Location, 1),
            ])
        );
        assert_eq!(analytics.component_count(), 1);
        assert_eq!(analytics.degree["apple inc."], 2);
        assert!(analytics.isolated.is_empty());
        assert_referential_integrity(&graph);

        let apple = graph.entity("apple inc.").unwrap();
        assert_eq!(apple.label, "Apple Inc.");
        assert_eq!(apple.mention_count, 3);
        assert_eq!(graph.entity("steve jobs").unwrap().mention_count, 2);
    }

    #[test]
    fn test_same_relationship_twice_merges_weight() {
        let result = extraction(
            vec![
                entity("Apple Inc.", EntityType::Organization),
                entity("Steve Jobs", EntityType::Person),
            ],
            vec![
                rel("Apple Inc.", "Steve Jobs", "founded_by"),
                rel("apple inc.", "STEVE JOBS", "founded by"),
            ],
        );
        let graph = GraphAssembler::default().assemble(None, &result);

        assert_eq!(graph.relationship_count(), 1);
        assert_eq!(graph.relationships()[0].weight, 2);
        assert_eq!(graph.relationships()[0].label, "founded_by");
    }

    #[test]
    fn test_idempotent_merge() {
        let assembler = GraphAssembler::default();
        let once = assembler.assemble(None, &steve_jobs());
        let twice = assembler.assemble(Some(once.clone()), &steve_jobs());

        assert_eq!(once.entity_count(), twice.entity_count());
        assert_eq!(once.relationship_count(), twice.relationship_count());

        for (a, b) in once.entities().zip(twice.entities()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.label, b.label);
            assert_eq!(a.entity_type, b.entity_type);
            assert_eq!(b.mention_count, 2 * a.mention_count);
        }
        for (a, b) in once.relationships().iter().zip(twice.relationships()) {
            assert_eq!((&a.source_id, &a.target_id, &a.label), (&b.source_id, &b.target_id, &b.label));
            assert_eq!(b.weight, a.weight + 1);
        }
        assert!(twice.type_conflicts().is_empty());
    }

    #[test]
    fn test_weight_update_keeps_order() {
        let assembler = GraphAssembler::default();
        let first = assembler.assemble(None, &steve_jobs());
        let second = assembler.assemble(
            Some(first),
            &extraction(vec![], vec![rel("Apple Inc.", "Cupertino", "located_in")]),
        );

        let labels: Vec<_> = second.relationships().iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["founded", "located_in"]);
        assert_eq!(second.relationships()[1].weight, 2);
    }

    #[test]
    fn test_type_upgrade_never_regresses() {
        let assembler = GraphAssembler::default();
        let graph = assembler.assemble(None, &extraction(vec![entity("Tim Cook", EntityType::Unknown)], vec![]));
        assert_eq!(graph.entity("tim cook").unwrap().entity_type, EntityType::Unknown);

        let graph = assembler.assemble(
            Some(graph),
            &extraction(vec![entity("tim cook", EntityType::Person)], vec![]),
        );
        assert_eq!(graph.entity("tim cook").unwrap().entity_type, EntityType::Person);

        let graph = assembler.assemble(
            Some(graph),
            &extraction(vec![entity("Tim Cook", EntityType::Unknown)], vec![]),
        );
        let tim = graph.entity("tim cook").unwrap();
        assert_eq!(tim.entity_type, EntityType::Person);
        assert_eq!(tim.mention_count, 3);
        assert_eq!(tim.label, "Tim Cook");
    }

    #[test]
    fn test_type_conflict_keeps_first() {
        let result = extraction(
            vec![
                entity("Jordan", EntityType::Person),
                entity("Jordan", EntityType::Location),
            ],
            vec![],
        );
        let graph = GraphAssembler::default().assemble(None, &result);

        assert_eq!(graph.entity("jordan").unwrap().entity_type, EntityType::Person);
        assert_eq!(
            graph.type_conflicts(),
            &[TypeConflict {
                entity_id: "jordan".to_string(),
                kept: EntityType::Person,
                rejected: EntityType::Location,
            }]
        );
    }

    #[test]
    fn test_undeclared_endpoint_from_parser() {
        let parser = ResponseParser::new(Arc::new(FoldingNormalizer));
        let result = parser
            .parse(r#"{"entities": [{"name": "Apple Inc.", "type": "Organization"}],
                      "relationships": [{"source": "Tim Cook", "target": "Apple Inc.", "relation": "leads"}]}"#)
            .unwrap();
        let graph = GraphAssembler::default().assemble(None, &result);

        let tim = graph.entity("tim cook").unwrap();
        assert_eq!(tim.entity_type, EntityType::Unknown);
        assert_eq!(tim.mention_count, 1);
        assert_referential_integrity(&graph);
    }

    #[test]
    fn test_mentions_count_every_relationship() {
        let parser = ResponseParser::new(Arc::new(FoldingNormalizer));
        let result = parser
            .parse(r#"{"entities": [{"name": "Apple Inc.", "type": "Organization"}],
                      "relationships": [
                          {"source": "Tim Cook", "target": "Apple Inc.", "relation": "leads"},
                          {"source": "Tim Cook", "target": "Apple Inc.", "relation": "works_at"},
                          {"source": "tim cook", "target": "Apple Inc.", "relation": "speaks_for"}
                      ]}"#)
            .unwrap();
        let graph = GraphAssembler::default().assemble(None, &result);

        assert_eq!(graph.entity("tim cook").unwrap().mention_count, 3);
        assert_eq!(graph.entity("apple inc.").unwrap().mention_count, 4);
    }

    #[test]
    fn test_assembler_heals_hand_built_drafts() {
        let result = extraction(vec![], vec![rel("Rome", "Italy", "capital_of")]);
        let graph = GraphAssembler::default().assemble(None, &result);

        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.entity("italy").unwrap().mention_count, 1);
        assert_referential_integrity(&graph);
    }

    #[test]
    fn test_empty_endpoints_are_skipped() {
        let result = extraction(
            vec![entity("Rome", EntityType::Location)],
            vec![rel("Rome", "   ", "near"), rel("Rome", "Rome", "  ")],
        );
        let graph = GraphAssembler::default().assemble(None, &result);

        assert_eq!(graph.entity_count(), 1);
        assert_eq!(graph.relationship_count(), 0);
    }

    #[test]
    fn test_self_loops_and_isolated_nodes_in_analytics() {
        let result = extraction(
            vec![
                entity("Narcissus", EntityType::Person),
                entity("Echo", EntityType::Person),
                entity("Greece", EntityType::Location),
            ],
            vec![
                rel("Narcissus", "Narcissus", "loves"),
                rel("Echo", "Narcissus", "loves"),
            ],
        );
        let graph = GraphAssembler::default().assemble(None, &result);
        let analytics = graph.analytics();

        assert_eq!(graph.relationship_count(), 2);
        assert!(graph.relationships()[0].is_self_loop());
        assert_eq!(analytics.self_loops, 1);
        assert_eq!(analytics.degree["narcissus"], 3);
        assert_eq!(graph.entity("narcissus").unwrap().mention_count, 3);
        assert_eq!(analytics.isolated, vec!["greece".to_string()]);
        assert_eq!(
            analytics.components,
            vec![
                vec!["narcissus".to_string(), "echo".to_string()],
                vec!["greece".to_string()],
            ]
        );
        assert!((analytics.density - 1.0 / 3.0).abs() < 1e-9);
        assert!((analytics.average_degree - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_descriptions_fill_once() {
        let mut first = entity("Ada Lovelace", EntityType::Person);
        first.description = Some("mathematician".into());
        let mut second = entity("Ada Lovelace", EntityType::Person);
        second.description = Some("writer".into());

        let graph = GraphAssembler::default().assemble(None, &extraction(vec![first, second], vec![]));
        assert_eq!(graph.entity("ada lovelace").unwrap().description.as_deref(), Some("mathematician"));
    }

    #[test]
    fn test_graph_serializes_for_the_ui() {
        let graph = GraphAssembler::default().assemble(None, &steve_jobs());
        let json = serde_json::to_value(&graph).unwrap();

        assert_eq!(json["entities"]["steve jobs"]["type"], "Person");
        assert_eq!(json["analytics"]["type_histogram"]["Location"], 1);
        assert_eq!(json["relationships"][0]["label"], "founded");
    }
}
