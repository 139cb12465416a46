use serde_json::Value;

use crate::config::TaxonomyConfig;

/// Closed set of hazard categories a risk may be filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HazardTaxonomy {
    categories: Vec<String>,
}

impl HazardTaxonomy {
    /// Build from a category list. Blank entries are skipped and
    /// duplicates collapse onto their first occurrence.
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for category in categories {
            let trimmed = category.as_ref().trim();
            if !trimmed.is_empty() && !unique.iter().any(|c| c == trimmed) {
                unique.push(trimmed.to_string());
            }
        }
        Self { categories: unique }
    }

    pub fn from_config(config: &TaxonomyConfig) -> Self {
        Self::new(&config.categories)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category.trim())
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// JSON array suitable for a schema `enum` constraint.
    pub fn as_schema_enum(&self) -> Value {
        Value::Array(
            self.categories
                .iter()
                .map(|c| Value::String(c.clone()))
                .collect(),
        )
    }

    /// Backtick-quoted, comma-separated list for prompt text.
    pub fn as_prompt_list(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("`{c}`"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for HazardTaxonomy {
    fn default() -> Self {
        Self::from_config(&TaxonomyConfig::default())
    }
}
