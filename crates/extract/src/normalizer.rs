use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Maps a raw entity name to the key used as its graph id.
///
/// Parser and assembler must share one implementation, otherwise the
/// parser's "declared entity" check and the assembler's ids disagree.
pub trait NameNormalizer: Send + Sync {
    fn normalize(&self, name: &str) -> String;
}

/// Trim, collapse internal whitespace, lowercase. No aliasing or fuzzy matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldingNormalizer;

impl NameNormalizer for FoldingNormalizer {
    fn normalize(&self, name: &str) -> String {
        collapse_whitespace(name).to_lowercase()
    }
}

/// Trim and collapse internal whitespace, keeping the original casing.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Relation phrase to edge label: `"Located In"` -> `"located_in"`.
pub fn normalize_relation_label(relation: &str) -> String {
    WHITESPACE
        .replace_all(relation.trim(), "_")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        let normalizer = FoldingNormalizer;

        assert_eq!(normalizer.normalize("Apple Inc."), "apple inc.");
        assert_eq!(normalizer.normalize("  Apple   Inc. "), "apple inc.");
        assert_eq!(normalizer.normalize("APPLE\tINC."), "apple inc.");
    }

    #[test]
    fn test_display_name_keeps_casing() {
        assert_eq!(collapse_whitespace("  Steve \n Jobs "), "Steve Jobs");
    }

    #[test]
    fn test_relation_label() {
        assert_eq!(normalize_relation_label("Located In"), "located_in");
        assert_eq!(normalize_relation_label(" founded  by "), "founded_by");
        assert_eq!(normalize_relation_label("works_for"), "works_for");
    }
}
