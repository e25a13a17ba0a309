use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::normalizer::{collapse_whitespace, normalize_relation_label, NameNormalizer};
use crate::schema::{EntityDraft, EntityType, ExtractionResult, RelationshipDraft, ValidationWarning};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("valid regex"));

static SECTION_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(entities|relationships|relations)"\s*:\s*"#).expect("valid regex")
});

const RELATIONSHIP_KEYS: [&str; 2] = ["relationships", "relations"];
const RELATION_FIELDS: [&str; 4] = ["relation", "relationship", "label", "predicate"];

/// Where the envelope came from, if anywhere.
enum Located {
    /// A complete JSON object with at least one envelope key.
    Envelope(Map<String, Value>),
    /// No complete envelope, but individual sections could be cut out of broken JSON.
    Salvaged(Map<String, Value>),
    /// Valid JSON objects exist, none of them look like the envelope.
    ForeignObject,
    Nothing,
}

/// Turns raw model output into validated drafts.
///
/// The model is untrusted: anything short of "no JSON at all" or "JSON with the
/// wrong shape" is absorbed into `dropped_count` instead of failing the run.
pub struct ResponseParser {
    normalizer: Arc<dyn NameNormalizer>,
}

impl ResponseParser {
    pub fn new(normalizer: Arc<dyn NameNormalizer>) -> Self {
        Self { normalizer }
    }

    pub fn parse(&self, raw: &str) -> Result<ExtractionResult, ParseError> {
        let envelope = match locate_envelope(raw) {
            Located::Envelope(map) => map,
            Located::Salvaged(map) => {
                warn!(sections = map.len(), "Model output is not valid JSON, salvaged sections");
                map
            }
            Located::ForeignObject => {
                return Err(ParseError::SchemaMismatch {
                    missing: vec!["entities", "relationships"],
                    partial: Box::default(),
                });
            }
            Located::Nothing => return Err(ParseError::NoStructuredData),
        };

        let mut result = ExtractionResult::default();
        let mut declared = HashSet::new();
        let mut missing = Vec::new();

        match envelope.get("entities") {
            Some(section) => self.validate_entities(section, &mut declared, &mut result),
            None => missing.push("entities"),
        }

        match RELATIONSHIP_KEYS.iter().find_map(|key| envelope.get(*key)) {
            Some(section) => self.validate_relationships(section, &mut declared, &mut result),
            None => missing.push("relationships"),
        }

        if result.dropped_count > 0 {
            warn!(
                dropped = result.dropped_count,
                kept_entities = result.entities.len(),
                kept_relationships = result.relationships.len(),
                "Dropped invalid items from model response"
            );
        }

        if !missing.is_empty() {
            return Err(ParseError::SchemaMismatch {
                missing,
                partial: Box::new(result),
            });
        }

        debug!(
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            "Parsed model response"
        );
        Ok(result)
    }

    fn validate_entities(
        &self,
        section: &Value,
        declared: &mut HashSet<String>,
        result: &mut ExtractionResult,
    ) {
        let Some(items) = section.as_array() else {
            result.drop_item(ValidationWarning::MalformedSection { section: "entities" });
            return;
        };

        for (index, item) in items.iter().enumerate() {
            match validate_entity(item) {
                Ok((draft, unrecognized)) => {
                    if let Some(raw) = unrecognized {
                        result.warnings.push(ValidationWarning::UnrecognizedType {
                            name: draft.name.clone(),
                            raw,
                        });
                    }
                    declared.insert(self.normalizer.normalize(&draft.name));
                    result.entities.push(draft);
                }
                Err(reason) => {
                    result.drop_item(ValidationWarning::DroppedEntity { index, reason });
                }
            }
        }
    }

    fn validate_relationships(
        &self,
        section: &Value,
        declared: &mut HashSet<String>,
        result: &mut ExtractionResult,
    ) {
        let Some(items) = section.as_array() else {
            result.drop_item(ValidationWarning::MalformedSection { section: "relationships" });
            return;
        };

        for (index, item) in items.iter().enumerate() {
            let draft = match validate_relationship(item) {
                Ok(draft) => draft,
                Err(reason) => {
                    result.drop_item(ValidationWarning::DroppedRelationship { index, reason });
                    continue;
                }
            };

            for endpoint in [&draft.source, &draft.target] {
                if declared.insert(self.normalizer.normalize(endpoint)) {
                    result.warnings.push(ValidationWarning::HealedEntity {
                        name: endpoint.clone(),
                    });
                    result.entities.push(EntityDraft {
                        healed: true,
                        ..EntityDraft::new(endpoint.clone(), EntityType::Unknown)
                    });
                }
            }

            result.relationships.push(draft);
        }
    }
}

/// Returns the draft and, when the model supplied a type outside the closed set, that raw type.
fn validate_entity(item: &Value) -> Result<(EntityDraft, Option<String>), String> {
    match item {
        Value::String(name) => {
            let name = non_empty(name).ok_or("empty name")?;
            Ok((EntityDraft::new(name, EntityType::Unknown), None))
        }
        Value::Object(map) => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .ok_or("missing name")?;
            let name = non_empty(name).ok_or("empty name")?;

            let raw_type = ["type", "entity_type"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .and_then(non_empty);
            let entity_type = raw_type
                .as_deref()
                .map(EntityType::parse_lenient)
                .unwrap_or(EntityType::Unknown);
            let unrecognized = raw_type.filter(|raw| {
                entity_type.is_unknown() && !raw.eq_ignore_ascii_case(EntityType::Unknown.as_str())
            });

            let draft = EntityDraft {
                description: string_field(map, "description"),
                ..EntityDraft::new(name, entity_type)
            };
            Ok((draft, unrecognized))
        }
        _ => Err("entity is neither an object nor a name".to_string()),
    }
}

fn validate_relationship(item: &Value) -> Result<RelationshipDraft, String> {
    let map = item.as_object().ok_or("relationship is not an object")?;

    let source = string_field(map, "source").ok_or("missing or empty source")?;
    let target = string_field(map, "target").ok_or("missing or empty target")?;
    let relation = RELATION_FIELDS
        .iter()
        .find_map(|field| string_field(map, field))
        .ok_or("missing or empty relation")?;

    Ok(RelationshipDraft {
        description: string_field(map, "description"),
        ..RelationshipDraft::new(source, target, normalize_relation_label(&relation))
    })
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    let text = collapse_whitespace(text);
    (!text.is_empty()).then_some(text)
}

fn is_envelope(map: &Map<String, Value>) -> bool {
    map.contains_key("entities") || RELATIONSHIP_KEYS.iter().any(|key| map.contains_key(*key))
}

fn locate_envelope(raw: &str) -> Located {
    let fenced = CODE_FENCE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str());

    let mut saw_object = false;
    for source in fenced.chain(std::iter::once(raw)) {
        for object in json_objects(source) {
            if is_envelope(&object) {
                return Located::Envelope(object);
            }
            saw_object = true;
        }
    }

    if let Some(sections) = salvage_sections(raw) {
        return Located::Salvaged(sections);
    }

    if saw_object {
        Located::ForeignObject
    } else {
        Located::Nothing
    }
}

/// Every complete top-level JSON object in `text`, left to right.
fn json_objects(text: &str) -> impl Iterator<Item = Map<String, Value>> + '_ {
    let mut pos = 0;
    std::iter::from_fn(move || {
        while let Some(offset) = text[pos..].find('{') {
            let start = pos + offset;
            let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(Value::Object(map))) => {
                    pos = start + stream.byte_offset();
                    return Some(map);
                }
                _ => pos = start + 1,
            }
        }
        None
    })
}

/// Pull `"entities": [...]` style sections out of otherwise broken JSON.
/// A section key whose value does not parse is kept as `null` so it counts as malformed.
fn salvage_sections(raw: &str) -> Option<Map<String, Value>> {
    let mut sections = Map::new();

    for caps in SECTION_KEY.captures_iter(raw) {
        let (Some(key), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };
        let mut stream = serde_json::Deserializer::from_str(&raw[whole.end()..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                sections.insert(key.as_str().to_string(), value);
            }
            _ => {
                sections.entry(key.as_str()).or_insert(Value::Null);
            }
        }
    }

    (!sections.is_empty()).then_some(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::FoldingNormalizer;

    fn parser() -> ResponseParser {
        ResponseParser::new(Arc::new(FoldingNormalizer))
    }

    const STEVE_JOBS: &str = r#"{
        "entities": [
            {"name": "Steve Jobs", "type": "Person"},
            {"name": "Apple Inc.", "type": "Organization"},
            {"name": "Cupertino", "type": "Location"}
        ],
        "relationships": [
            {"source": "Steve Jobs", "target": "Apple Inc.", "relation": "founded"},
            {"source": "Apple Inc.", "target": "Cupertino", "relation": "located in"}
        ]
    }"#;

    #[test]
    fn test_clean_response() {
        let result = parser().parse(STEVE_JOBS).unwrap();

        assert_eq!(result.entities.len(), 3);
        assert_eq!(result.relationships.len(), 2);
        assert_eq!(result.dropped_count, 0);
        assert_eq!(result.entities[1].entity_type, EntityType::Organization);
        assert_eq!(result.relationships[1].relation, "located_in");
    }

    #[test]
    fn test_fenced_block_inside_prose() {
        let raw = format!(
            "Sure! Here is the graph you asked for:\n```json\n{}\n```\nLet me know if you need more.",
            STEVE_JOBS
        );
        let result = parser().parse(&raw).unwrap();
        assert_eq!(result.entities.len(), 3);
    }

    #[test]
    fn test_skips_objects_that_are_not_the_envelope() {
        let raw = format!(r#"Note: {{"model": "x"}} and then {}"#, STEVE_JOBS);
        let result = parser().parse(&raw).unwrap();
        assert_eq!(result.relationships.len(), 2);
    }

    #[test]
    fn test_no_structured_data() {
        let err = parser().parse("I could not find any entities, sorry.").unwrap_err();
        assert!(matches!(err, ParseError::NoStructuredData));

        let err = parser().parse("").unwrap_err();
        assert!(matches!(err, ParseError::NoStructuredData));
    }

    #[test]
    fn test_missing_relationships_is_schema_mismatch_with_partial() {
        let raw = r#"{"entities": [{"name": "Marie Curie", "type": "person"}]}"#;
        let err = parser().parse(raw).unwrap_err();

        match err {
            ParseError::SchemaMismatch { missing, partial } => {
                assert_eq!(missing, vec!["relationships"]);
                assert_eq!(partial.entities.len(), 1);
                assert_eq!(partial.entities[0].entity_type, EntityType::Person);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_foreign_object_is_schema_mismatch() {
        let err = parser().parse(r#"{"answer": 42}"#).unwrap_err();
        match err {
            ParseError::SchemaMismatch { missing, partial } => {
                assert_eq!(missing, vec!["entities", "relationships"]);
                assert!(partial.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_relationship_section_keeps_entities() {
        let raw = r#"{
            "entities": [{"name": "Ada Lovelace", "type": "Person"}],
            "relationships": "none found"
        }"#;
        let result = parser().parse(raw).unwrap();

        assert_eq!(result.entities.len(), 1);
        assert!(result.relationships.is_empty());
        assert!(result.dropped_count > 0);
    }

    #[test]
    fn test_broken_json_relationships_are_salvaged_around() {
        // Truncated mid-way through the relationships list.
        let raw = r#"{"entities": [{"name": "Ada Lovelace", "type": "Person"},
            {"name": "Charles Babbage", "type": "Person"}],
            "relationships": [{"source": "Ada Lovelace", "target": "Charles"#;
        let result = parser().parse(raw).unwrap();

        assert_eq!(result.entities.len(), 2);
        assert!(result.relationships.is_empty());
        assert!(result.dropped_count > 0);
    }

    #[test]
    fn test_invalid_items_are_dropped_and_counted() {
        let raw = r#"{
            "entities": [
                {"name": "  ", "type": "Person"},
                {"type": "Event"},
                42,
                {"name": "Paris", "type": "Location"}
            ],
            "relationships": [
                {"source": "Paris", "target": "", "relation": "in"},
                {"source": "Paris", "target": "France", "relation": "   "},
                "Paris -> France",
                {"source": "Paris", "target": "France", "relation": "capital of"}
            ]
        }"#;
        let result = parser().parse(raw).unwrap();

        assert_eq!(result.dropped_count, 6);
        assert_eq!(result.entities.len(), 2); // Paris + healed France
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].relation, "capital_of");
    }

    #[test]
    fn test_unrecognized_type_becomes_unknown() {
        let raw = r#"{"entities": [
            {"name": "Rust", "type": "TECHNOLOGY"},
            {"name": "Ferris"},
            {"name": "Mystery", "type": "unknown"}
        ], "relationships": []}"#;
        let result = parser().parse(raw).unwrap();

        assert!(result.entities.iter().all(|e| e.entity_type == EntityType::Unknown));
        assert_eq!(result.dropped_count, 0);
        let unrecognized: Vec<_> = result
            .warnings
            .iter()
            .filter(|w| matches!(w, ValidationWarning::UnrecognizedType { .. }))
            .collect();
        assert_eq!(unrecognized.len(), 1);
    }

    #[test]
    fn test_undeclared_endpoint_is_healed_once() {
        let raw = r#"{
            "entities": [{"name": "Apple Inc.", "type": "Organization"}],
            "relationships": [
                {"source": "Tim Cook", "target": "Apple Inc.", "relation": "leads"},
                {"source": "tim  cook", "target": "Apple Inc.", "relation": "works_for"}
            ]
        }"#;
        let result = parser().parse(raw).unwrap();

        assert_eq!(result.entities.len(), 2);
        let healed = &result.entities[1];
        assert_eq!(healed.name, "Tim Cook");
        assert_eq!(healed.entity_type, EntityType::Unknown);
        assert!(healed.healed);
        assert_eq!(result.dropped_count, 0);
    }

    #[test]
    fn test_accepts_common_aliases() {
        let raw = r#"{
            "entities": [
                "Rome",
                {"name": "Italy", "type": "location", "description": "a country"},
                {"name": "Tiber", "entity_type": "Location"}
            ],
            "relations": [{"source": "Rome", "target": "Italy", "relationship": "capital_of"}]
        }"#;
        let result = parser().parse(raw).unwrap();

        assert_eq!(result.entities[0].entity_type, EntityType::Unknown);
        assert_eq!(result.entities[1].description.as_deref(), Some("a country"));
        assert_eq!(result.entities[2].entity_type, EntityType::Location);
        assert_eq!(result.relationships[0].relation, "capital_of");
    }
}
