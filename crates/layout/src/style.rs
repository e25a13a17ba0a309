use extract::EntityType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOptions {
    pub node_base_size: f64,
    pub node_size_per_degree: f64,
    pub node_max_size: f64,
    pub edge_base_width: f64,
    pub edge_max_width: f64,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            node_base_size: 20.0,
            node_size_per_degree: 4.0,
            node_max_size: 48.0,
            edge_base_width: 2.0,
            edge_max_width: 8.0,
        }
    }
}

impl StyleOptions {
    pub fn node_size(&self, degree: usize) -> f64 {
        (self.node_base_size + self.node_size_per_degree * degree as f64).min(self.node_max_size)
    }

    /// Width grows with the log of the weight so one heavy edge does not swamp the rest.
    pub fn edge_width(&self, weight: usize) -> f64 {
        let weight = weight.max(1) as f64;
        (self.edge_base_width * (1.0 + weight.ln())).min(self.edge_max_width)
    }
}

pub fn type_color(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Person => "#FF6B6B",
        EntityType::Organization => "#4ECDC4",
        EntityType::Location => "#45B7D1",
        EntityType::Concept => "#96CEB4",
        EntityType::Event => "#FFEAA7",
        EntityType::Unknown => "#DDA0DD",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub entity_type: EntityType,
    pub color: &'static str,
}

/// One entry per entity type, in the closed-set order.
pub fn legend() -> Vec<LegendEntry> {
    EntityType::ALL
        .iter()
        .map(|&entity_type| LegendEntry {
            entity_type,
            color: type_color(entity_type),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_type_has_a_distinct_color() {
        let colors: HashSet<_> = legend().iter().map(|entry| entry.color).collect();
        assert_eq!(colors.len(), EntityType::ALL.len());
    }

    #[test]
    fn test_sizes_are_capped() {
        let style = StyleOptions::default();
        assert_eq!(style.node_size(0), 20.0);
        assert_eq!(style.node_size(2), 28.0);
        assert_eq!(style.node_size(100), 48.0);

        assert_eq!(style.edge_width(1), 2.0);
        assert!(style.edge_width(3) > style.edge_width(2));
        assert_eq!(style.edge_width(10_000), 8.0);
    }
}
