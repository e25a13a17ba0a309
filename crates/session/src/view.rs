use extract::{EntityType, ExtractionResult, ValidationWarning, Validity};
use graph::GraphModel;
use layout::{legend, type_color, LayoutResult, LegendEntry};
use serde::Serialize;

/// Everything the presentation layer needs for one finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphView {
    pub graph: GraphModel,
    pub layout: LayoutResult,
    pub stats: StatsPanel,
    pub entity_rows: Vec<EntityRow>,
    pub relationship_rows: Vec<RelationshipRow>,
    pub legend: Vec<LegendEntry>,
    pub dropped_count: usize,
    pub warnings: Vec<ValidationWarning>,
    pub validity: Validity,
    /// Built from a response that was missing a section.
    pub partial: bool,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsPanel {
    pub node_count: usize,
    pub edge_count: usize,
    pub density: f64,
    pub average_degree: f64,
    pub component_count: usize,
    pub self_loops: usize,
    pub isolated_count: usize,
    pub type_histogram: Vec<TypeCount>,
    /// Highest degree first.
    pub degrees: Vec<DegreeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCount {
    pub entity_type: EntityType,
    pub count: usize,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegreeEntry {
    pub id: String,
    pub label: String,
    pub degree: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRow {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
    pub mentions: usize,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipRow {
    pub source: String,
    pub relationship: String,
    pub target: String,
    pub description: String,
    pub weight: usize,
    pub tooltip: String,
}

impl GraphView {
    pub fn build(
        graph: GraphModel,
        layout: LayoutResult,
        extraction: &ExtractionResult,
        partial: bool,
    ) -> Self {
        let stats = StatsPanel::from_graph(&graph);
        let entity_rows = entity_rows(&graph);
        let relationship_rows = relationship_rows(&graph);
        let summary = summary_line(&graph, extraction.dropped_count, partial);

        Self {
            graph,
            layout,
            stats,
            entity_rows,
            relationship_rows,
            legend: legend(),
            dropped_count: extraction.dropped_count,
            warnings: extraction.warnings.clone(),
            validity: extraction.validity(),
            partial,
            summary,
        }
    }
}

impl StatsPanel {
    pub fn from_graph(graph: &GraphModel) -> Self {
        let analytics = graph.analytics();

        let type_histogram = analytics
            .type_histogram
            .iter()
            .map(|(&entity_type, &count)| TypeCount {
                entity_type,
                count,
                color: type_color(entity_type),
            })
            .collect();

        let degrees = analytics
            .ranked_by_degree()
            .into_iter()
            .map(|(id, degree)| DegreeEntry {
                id: id.to_string(),
                label: graph
                    .entity(id)
                    .map(|e| e.label.clone())
                    .unwrap_or_else(|| id.to_string()),
                degree,
            })
            .collect();

        Self {
            node_count: graph.entity_count(),
            edge_count: graph.relationship_count(),
            density: analytics.density,
            average_degree: analytics.average_degree,
            component_count: analytics.component_count(),
            self_loops: analytics.self_loops,
            isolated_count: analytics.isolated.len(),
            type_histogram,
            degrees,
        }
    }
}

fn entity_rows(graph: &GraphModel) -> Vec<EntityRow> {
    graph
        .entities()
        .map(|entity| {
            let description = entity.description.clone().unwrap_or_default();
            EntityRow {
                tooltip: format!(
                    "{}\nType: {}\nDescription: {}",
                    entity.label, entity.entity_type, description
                ),
                name: entity.label.clone(),
                entity_type: entity.entity_type,
                description,
                mentions: entity.mention_count,
            }
        })
        .collect()
}

fn relationship_rows(graph: &GraphModel) -> Vec<RelationshipRow> {
    let label_of = |id: &str| {
        graph
            .entity(id)
            .map(|e| e.label.clone())
            .unwrap_or_else(|| id.to_string())
    };

    graph
        .relationships()
        .iter()
        .map(|rel| {
            let source = label_of(&rel.source_id);
            let target = label_of(&rel.target_id);
            let description = rel.description.clone().unwrap_or_default();
            RelationshipRow {
                tooltip: format!("{} → {} → {}\n{}", source, rel.label, target, description),
                source,
                relationship: rel.label.clone(),
                target,
                description,
                weight: rel.weight,
            }
        })
        .collect()
}

fn summary_line(graph: &GraphModel, dropped: usize, partial: bool) -> String {
    let mut line = format!(
        "Extracted {} {} and {} {}",
        graph.entity_count(),
        plural(graph.entity_count(), "entity", "entities"),
        graph.relationship_count(),
        plural(graph.relationship_count(), "relationship", "relationships"),
    );
    if dropped > 0 {
        line.push_str(&format!(
            ", skipped {} malformed {}",
            dropped,
            plural(dropped, "item", "items")
        ));
    }
    if partial {
        line.push_str(" (partial response)");
    }
    line
}

fn plural(n: usize, one: &'static str, many: &'static str) -> &'static str {
    if n == 1 { one } else { many }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{EntityDraft, RelationshipDraft};
    use graph::GraphAssembler;
    use layout::LayoutEngine;

    fn view_for(extraction: &ExtractionResult, partial: bool) -> GraphView {
        let graph = GraphAssembler::default().assemble(None, extraction);
        let layout = LayoutEngine::default().layout(&graph);
        GraphView::build(graph, layout, extraction, partial)
    }

    fn founders() -> ExtractionResult {
        let mut jobs = EntityDraft::new("Steve Jobs", EntityType::Person);
        jobs.description = Some("Co-founder of Apple".to_string());
        ExtractionResult {
            entities: vec![
                jobs,
                EntityDraft::new("Apple Inc.", EntityType::Organization),
                EntityDraft::new("Cupertino", EntityType::Location),
            ],
            relationships: vec![
                RelationshipDraft::new("Steve Jobs", "Apple Inc.", "founded"),
                RelationshipDraft::new("Apple Inc.", "Cupertino", "located_in"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_stats_panel() {
        let view = view_for(&founders(), false);

        assert_eq!(view.stats.node_count, 3);
        assert_eq!(view.stats.edge_count, 2);
        assert_eq!(view.stats.component_count, 1);
        assert_eq!(view.stats.type_histogram.len(), 3);
        assert_eq!(view.stats.degrees[0].label, "Apple Inc.");
        assert_eq!(view.stats.degrees[0].degree, 2);
        assert_eq!(view.legend.len(), EntityType::ALL.len());
    }

    #[test]
    fn test_table_rows_use_display_names() {
        let view = view_for(&founders(), false);

        assert_eq!(view.entity_rows[0].name, "Steve Jobs");
        assert_eq!(view.entity_rows[0].description, "Co-founder of Apple");
        assert!(view.entity_rows[0].tooltip.contains("Type: Person"));
        assert_eq!(view.relationship_rows[1].source, "Apple Inc.");
        assert_eq!(view.relationship_rows[1].target, "Cupertino");
        assert_eq!(view.relationship_rows[1].relationship, "located_in");
    }

    #[test]
    fn test_summary_line() {
        let view = view_for(&founders(), false);
        assert_eq!(view.summary, "Extracted 3 entities and 2 relationships");

        let mut degraded = founders();
        degraded.relationships.truncate(0);
        degraded.entities.truncate(1);
        degraded.dropped_count = 1;
        let view = view_for(&degraded, true);
        assert_eq!(
            view.summary,
            "Extracted 1 entity and 0 relationships, skipped 1 malformed item (partial response)"
        );
        assert_eq!(view.validity, Validity::Degraded);
    }

    #[test]
    fn test_view_serializes() {
        let json = serde_json::to_value(view_for(&founders(), false)).unwrap();
        assert_eq!(json["stats"]["node_count"], 3);
        assert_eq!(json["entity_rows"][1]["type"], "Organization");
    }
}
