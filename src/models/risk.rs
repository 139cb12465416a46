use serde::{Deserialize, Serialize};

/// Number of keywords every risk entry carries.
pub const KEYWORD_COUNT: usize = 3;

/// Characters of the image payload kept in a display copy.
const DISPLAY_IMAGE_PREFIX: usize = 20;

/// Severity on a 1 (lowest) to 5 (highest) scale.
///
/// Models sometimes emit the level as a numeric string ("4"), so both
/// integer and string forms are accepted on input. Output is always an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRiskLevel", into = "i64")]
pub struct RiskLevel(u8);

impl RiskLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRiskLevel {
    Int(i64),
    Text(String),
}

impl TryFrom<RawRiskLevel> for RiskLevel {
    type Error = String;

    fn try_from(raw: RawRiskLevel) -> Result<Self, Self::Error> {
        let value = match raw {
            RawRiskLevel::Int(v) => v,
            RawRiskLevel::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("risk level '{s}' is not a number"))?,
        };
        RiskLevel::new(value).ok_or_else(|| {
            format!(
                "risk level {value} outside {}..={}",
                RiskLevel::MIN,
                RiskLevel::MAX
            )
        })
    }
}

impl From<RiskLevel> for i64 {
    fn from(level: RiskLevel) -> Self {
        level.0 as i64
    }
}

/// What can go wrong, how it could play out, and what to do about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskContent {
    /// Hazard category; must belong to the configured taxonomy.
    pub potential_risk: String,
    #[serde(default)]
    pub mitigation_plan: String,
    pub simulation: String,
}

/// A risk as produced by the JSON-formatting stage, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRisk {
    pub index: i64,
    pub risk_level: RiskLevel,
    pub content: RiskContent,
    pub keywords: [String; KEYWORD_COUNT],
}

/// Person responsible for the area the hazard was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub name: String,
    pub department: String,
    pub phone: String,
    pub email: String,
}

/// Reference case document attached to a risk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReference {
    pub title: String,
    pub summary: String,
}

/// A risk after the enrichment stage: draft fields plus manager and document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRisk {
    pub index: i64,
    pub risk_level: RiskLevel,
    pub content: RiskContent,
    pub keywords: [String; KEYWORD_COUNT],
    pub manager: Manager,
    pub documents: DocumentReference,
}

/// Final record: an enriched risk stamped with the source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEntry {
    #[serde(flatten)]
    pub risk: EnrichedRisk,
    pub image_base64: String,
}

impl RiskEntry {
    pub fn new(risk: EnrichedRisk, image_base64: impl Into<String>) -> Self {
        Self {
            risk,
            image_base64: image_base64.into(),
        }
    }

    /// Copy for logs and console output with the image cut to a short prefix.
    /// The original entry keeps the full payload.
    pub fn display_copy(&self) -> RiskEntry {
        let mut copy = self.clone();
        if copy.image_base64.chars().count() > DISPLAY_IMAGE_PREFIX {
            let prefix: String = self.image_base64.chars().take(DISPLAY_IMAGE_PREFIX).collect();
            copy.image_base64 = format!("{prefix}...");
        }
        copy
    }

    /// JSON view of the entry with the `image_base64` field removed.
    pub fn to_json_without_image(&self) -> serde_json::Value {
        // EnrichedRisk holds only strings, integers and arrays, so this cannot fail.
        serde_json::to_value(&self.risk).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn draft(index: i64, category: &str) -> DraftRisk {
        DraftRisk {
            index,
            risk_level: RiskLevel::new(4).unwrap(),
            content: RiskContent {
                potential_risk: category.to_string(),
                mitigation_plan: "안전난간 설치".to_string(),
                simulation: "작업자가 개구부로 추락할 수 있음".to_string(),
            },
            keywords: ["추락".into(), "개구부".into(), "안전난간".into()],
        }
    }

    pub fn enriched(index: i64, category: &str) -> EnrichedRisk {
        let d = draft(index, category);
        EnrichedRisk {
            index: d.index,
            risk_level: d.risk_level,
            content: d.content,
            keywords: d.keywords,
            manager: Manager {
                name: "김안전".to_string(),
                department: "안전보건팀".to_string(),
                phone: "010-1234-5678".to_string(),
                email: "safety@example.com".to_string(),
            },
            documents: DocumentReference {
                title: "개구부 추락 사례".to_string(),
                summary: "덮개 미설치 개구부에서 추락".to_string(),
            },
        }
    }
}
