use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::taxonomy::HazardTaxonomy;
use crate::models::*;

/// Control characters other than newline and tab.
static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{Cc}&&[^\n\t]]").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed risk entry: {0}")]
    Shape(String),

    #[error("Category '{0}' is not in the hazard taxonomy")]
    UnknownCategory(String),

    #[error("Required field '{0}' is empty")]
    EmptyField(&'static str),

    #[error("Field '{0}' must be a single object, not a list")]
    ExpectedObject(&'static str),
}

fn clean(text: &str) -> String {
    CONTROL_CHARS.replace_all(text, "").trim().to_string()
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(ValidationError::EmptyField(field))
    } else {
        Ok(())
    }
}

fn parse<T: DeserializeOwned>(value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::Shape(e.to_string()))
}

fn clean_content(
    content: RiskContent,
    taxonomy: &HazardTaxonomy,
) -> Result<RiskContent, ValidationError> {
    let content = RiskContent {
        potential_risk: clean(&content.potential_risk),
        mitigation_plan: clean(&content.mitigation_plan),
        simulation: clean(&content.simulation),
    };
    require(&content.potential_risk, "content.potentialRisk")?;
    require(&content.simulation, "content.simulation")?;
    if !taxonomy.contains(&content.potential_risk) {
        return Err(ValidationError::UnknownCategory(content.potential_risk));
    }
    Ok(content)
}

fn clean_keywords(
    keywords: [String; KEYWORD_COUNT],
) -> Result<[String; KEYWORD_COUNT], ValidationError> {
    let keywords = keywords.map(|k| clean(&k));
    if keywords.iter().any(|k| k.is_empty()) {
        return Err(ValidationError::EmptyField("keywords"));
    }
    Ok(keywords)
}

/// Validate one item of the JSON-formatting stage. The level range and the
/// keyword count are enforced while deserializing.
pub fn validate_draft(value: Value, taxonomy: &HazardTaxonomy) -> Result<DraftRisk, ValidationError> {
    let draft: DraftRisk = parse(value)?;
    Ok(DraftRisk {
        index: draft.index,
        risk_level: draft.risk_level,
        content: clean_content(draft.content, taxonomy)?,
        keywords: clean_keywords(draft.keywords)?,
    })
}

/// Validate one item of the enrichment stage.
pub fn validate_enriched(
    value: Value,
    taxonomy: &HazardTaxonomy,
) -> Result<EnrichedRisk, ValidationError> {
    // serde would accept a positional array for a struct; a list of managers
    // or documents must be rejected rather than misread.
    for field in ["manager", "documents"] {
        if value.get(field).is_some_and(Value::is_array) {
            return Err(ValidationError::ExpectedObject(field));
        }
    }

    let risk: EnrichedRisk = parse(value)?;
    let manager = Manager {
        name: clean(&risk.manager.name),
        department: clean(&risk.manager.department),
        phone: clean(&risk.manager.phone),
        email: clean(&risk.manager.email),
    };
    require(&manager.name, "manager.name")?;
    let documents = DocumentReference {
        title: clean(&risk.documents.title),
        summary: clean(&risk.documents.summary),
    };
    require(&documents.title, "documents.title")?;

    Ok(EnrichedRisk {
        index: risk.index,
        risk_level: risk.risk_level,
        content: clean_content(risk.content, taxonomy)?,
        keywords: clean_keywords(risk.keywords)?,
        manager,
        documents,
    })
}

/// Hands out indices not yet used in a run: first counting up past the
/// largest taken index, then, once that would overflow, the lowest free
/// positive index.
struct IndexAllocator {
    used: HashSet<i64>,
    next: Option<i64>,
}

impl IndexAllocator {
    fn new(taken: impl IntoIterator<Item = i64>) -> Self {
        let used: HashSet<i64> = taken.into_iter().collect();
        let max = used.iter().copied().max().unwrap_or(0);
        Self {
            used,
            next: max.checked_add(1),
        }
    }

    fn fresh(&mut self) -> i64 {
        while let Some(candidate) = self.next {
            self.next = candidate.checked_add(1);
            if self.used.insert(candidate) {
                return candidate;
            }
        }
        // `used` is finite, so a free positive index always exists.
        let free = (1..=i64::MAX)
            .find(|i| !self.used.contains(i))
            .unwrap_or_default();
        self.used.insert(free);
        free
    }
}

/// Make a run's indices distinct. The first holder of an index keeps it;
/// later duplicates get an unused index. Returns how many moved.
pub fn renumber_duplicate_indices<'a, I>(indices: I) -> usize
where
    I: IntoIterator<Item = &'a mut i64>,
{
    let mut indices: Vec<&mut i64> = indices.into_iter().collect();
    let mut allocator = IndexAllocator::new(indices.iter().map(|i| **i));
    let mut kept = HashSet::new();
    let mut moved = 0;
    for index in indices.iter_mut() {
        if !kept.insert(**index) {
            let to = allocator.fresh();
            tracing::debug!(from = **index, to, "Renumbered duplicate risk index");
            **index = to;
            moved += 1;
        }
    }
    moved
}

/// Give every index in `extra` a fresh value that collides with neither
/// `reserved` nor another extra. Reserved holders are never moved.
pub fn assign_extra_indices<'a, R, I>(reserved: R, extra: I) -> usize
where
    R: IntoIterator<Item = i64>,
    I: IntoIterator<Item = &'a mut i64>,
{
    let mut allocator = IndexAllocator::new(reserved);
    let mut assigned = 0;
    for index in extra {
        let to = allocator.fresh();
        tracing::debug!(from = *index, to, "Numbered extra enriched risk");
        *index = to;
        assigned += 1;
    }
    assigned
}
