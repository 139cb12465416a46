use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

// One inference call each, executed in this order.
str_enum!(Stage {
    AnalyzeImageRisks => "analyze_image_risks",
    FormatRiskAsJson => "format_risk_as_json",
    RetrieveInformation => "retrieve_information",
});

str_enum!(PipelineState {
    Idle => "idle",
    ImageLoaded => "image_loaded",
    Analyzed => "analyzed",
    Jsonified => "jsonified",
    Enriched => "enriched",
    ImageAttached => "image_attached",
    Persisted => "persisted",
});

str_enum!(NotificationStatus {
    Pending => "pending",
    Sent => "sent",
});

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 3] = [
        Stage::AnalyzeImageRisks,
        Stage::FormatRiskAsJson,
        Stage::RetrieveInformation,
    ];
}
