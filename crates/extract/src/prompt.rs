use serde::{Deserialize, Serialize};

use crate::schema::EntityType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    /// Soft cap hinted to the model. Not enforced when parsing.
    pub max_entities: usize,
    /// Language the text is written in. Hint only.
    pub language: String,
    pub include_descriptions: bool,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            max_entities: 25,
            language: "English".to_string(),
            include_descriptions: true,
        }
    }
}

/// Renders the extraction instruction block. Output depends only on `(text, options)`.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    options: PromptOptions,
}

impl PromptBuilder {
    pub fn new(options: PromptOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PromptOptions {
        &self.options
    }

    pub fn build(&self, text: &str) -> String {
        build_extraction_prompt(text, &self.options)
    }
}

pub fn build_extraction_prompt(text: &str, options: &PromptOptions) -> String {
    let types = EntityType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let (entity_shape, relation_shape) = if options.include_descriptions {
        (
            r#"{"name": "Entity Name", "type": "EntityType", "description": "brief description"}"#,
            r#"{"source": "Entity Name", "target": "Other Entity", "relation": "relation_type", "description": "brief description"}"#,
        )
    } else {
        (
            r#"{"name": "Entity Name", "type": "EntityType"}"#,
            r#"{"source": "Entity Name", "target": "Other Entity", "relation": "relation_type"}"#,
        )
    };

    format!(
        r#"Extract entities and relationships from the following text.

INSTRUCTIONS:
1. Identify the significant entities: people, organizations, locations, concepts and events
2. Identify meaningful relationships between those entities
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "entities": [
    {entity_shape}
  ],
  "relationships": [
    {relation_shape}
  ]
}}

RULES:
- "type" must be exactly one of: {types}
- Use Unknown when no other type fits
- Use clear, consistent entity names and reuse the same name for the same entity
- Every "source" and "target" must also appear as a "name" in "entities"
- Relation types are short verb phrases in snake_case: works_for, located_in, part_of, founded, causes
- Extract at most {max_entities} entities
- The text is written in {language}
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{text}

JSON OUTPUT:"#,
        max_entities = options.max_entities,
        language = options.language,
    )
}

pub fn build_repair_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following output was supposed to be a JSON object with "entities" and "relationships" lists, but it is not valid JSON:

{}

Fix it. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
