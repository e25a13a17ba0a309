use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of entity types the model is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Concept,
    Event,
    Unknown,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Location,
        EntityType::Concept,
        EntityType::Event,
        EntityType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "Person",
            EntityType::Organization => "Organization",
            EntityType::Location => "Location",
            EntityType::Concept => "Concept",
            EntityType::Event => "Event",
            EntityType::Unknown => "Unknown",
        }
    }

    /// Case-insensitive match against the closed set. Anything else is Unknown.
    pub fn parse_lenient(raw: &str) -> EntityType {
        let raw = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or(EntityType::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, EntityType::Unknown)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated entity as it came out of one model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDraft {
    /// Display name, trimmed, original casing.
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// True when the entity was never declared and was created from a relationship endpoint.
    #[serde(default)]
    pub healed: bool,
}

impl EntityDraft {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            description: None,
            healed: false,
        }
    }
}

/// A validated relationship. `relation` is already in label form (`located_in`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDraft {
    pub source: String,
    pub target: String,
    pub relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RelationshipDraft {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            description: None,
        }
    }
}

/// Per-item problem found while validating a response. Never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    DroppedEntity { index: usize, reason: String },
    DroppedRelationship { index: usize, reason: String },
    MalformedSection { section: &'static str },
    UnrecognizedType { name: String, raw: String },
    HealedEntity { name: String },
}

impl ValidationWarning {
    /// Whether this warning stands for an item that was thrown away.
    pub fn is_drop(&self) -> bool {
        matches!(
            self,
            ValidationWarning::DroppedEntity { .. }
                | ValidationWarning::DroppedRelationship { .. }
                | ValidationWarning::MalformedSection { .. }
        )
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::DroppedEntity { index, reason } => {
                write!(f, "dropped entity #{}: {}", index, reason)
            }
            ValidationWarning::DroppedRelationship { index, reason } => {
                write!(f, "dropped relationship #{}: {}", index, reason)
            }
            ValidationWarning::MalformedSection { section } => {
                write!(f, "section '{}' is not a list and was ignored", section)
            }
            ValidationWarning::UnrecognizedType { name, raw } => {
                write!(f, "entity '{}' has unrecognized type '{}', using Unknown", name, raw)
            }
            ValidationWarning::HealedEntity { name } => {
                write!(f, "entity '{}' was referenced but not declared, added as Unknown", name)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Clean,
    Degraded,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub entities: Vec<EntityDraft>,
    pub relationships: Vec<RelationshipDraft>,
    pub dropped_count: usize,
    pub warnings: Vec<ValidationWarning>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }

    pub fn validity(&self) -> Validity {
        if self.dropped_count == 0 {
            Validity::Clean
        } else {
            Validity::Degraded
        }
    }

    pub(crate) fn drop_item(&mut self, warning: ValidationWarning) {
        self.dropped_count += 1;
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_matching_is_case_insensitive() {
        assert_eq!(EntityType::parse_lenient("person"), EntityType::Person);
        assert_eq!(EntityType::parse_lenient("ORGANIZATION"), EntityType::Organization);
        assert_eq!(EntityType::parse_lenient("  Location "), EntityType::Location);
        assert_eq!(EntityType::parse_lenient("TECHNOLOGY"), EntityType::Unknown);
        assert_eq!(EntityType::parse_lenient(""), EntityType::Unknown);
    }

    #[test]
    fn test_validity_follows_drops() {
        let mut result = ExtractionResult::default();
        assert_eq!(result.validity(), Validity::Clean);

        result.warnings.push(ValidationWarning::HealedEntity { name: "x".into() });
        assert_eq!(result.validity(), Validity::Clean);

        result.drop_item(ValidationWarning::MalformedSection { section: "relationships" });
        assert_eq!(result.validity(), Validity::Degraded);
        assert_eq!(result.dropped_count, 1);
    }
}
