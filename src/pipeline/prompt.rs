use serde_json::{json, Value};

use super::taxonomy::HazardTaxonomy;
use crate::models::enums::Stage;

const INPUT_PLACEHOLDER: &str = "{input}";
const REFERENCE_PLACEHOLDER: &str = "{reference}";
const CATEGORIES_PLACEHOLDER: &str = "{categories}";

pub const ANALYZE_SYSTEM_PROMPT: &str = r#"
You are an expert in industrial safety and risk assessment.

Analyze the provided workplace image and produce a safety risk report:
1. Risk elements: every potential hazard visible in the image, each described in detail.
2. Risk level: rate each hazard from 1 (unlikely, rare circumstances) to 5 (accident imminent)
   and give a short reason for the rating.
3. Scenario simulation: the accident or incident each hazard could lead to.
4. Mitigation: specific, actionable measures that address each hazard.
"#;

pub const ANALYZE_USER_PROMPT: &str = r#"
## Instruction
The attached image was taken at an industrial site. Identify the most significant safety
hazards (at least one, typically three). For each hazard give the hazard, its risk level,
a simulated accident scenario and actionable recommendations.
Write the whole analysis in Korean using this Markdown layout:

### 위험성 분석 레포트
1. **위험 요소**
- 위험 요소 1: [설명]
2. **위험 수준 평가** (숫자가 높을수록 위험)
- 위험 요소 1: [1/2/3/4/5] - [평가 이유]
3. **위험 상황 시뮬레이션**
- 위험 요소 1: [발생 가능한 사고]
4. **조치 방법**
- 위험 요소 1: [조치 방법]
"#;

pub const FORMAT_SYSTEM_PROMPT: &str = r#"
You convert plain-text risk analyses into structured JSON.
Extract each risk with its safety recommendation, assign exactly one category from the
allowed list, and ignore anything irrelevant. Follow the output schema exactly.
"#;

pub const FORMAT_USER_TEMPLATE: &str = r#"
## Instruction
Organize the analysis below into the `data` array of the output function. Each entry has:
- `index`: integer, unique within this analysis.
- `riskLevel`: integer from 1 (lowest) to 5 (highest).
- `content.potentialRisk`: one of {categories}
- `content.mitigationPlan`: the proposed plan to mitigate the risk.
- `content.simulation`: how the accident could unfold, with conditions and expected outcome.
- `keywords`: exactly three key terms drawn from the risk, the plan and the simulation.

[input_text]:
{input}
"#;

pub const ENRICH_SYSTEM_PROMPT: &str = r#"
You complete structured risk records with responsible personnel and reference documents.
Keep every field of the given risk unchanged, add the single most relevant manager and
the single most relevant reference document. Write all text in Korean.
"#;

pub const ENRICH_USER_TEMPLATE: &str = r#"
## Instruction
The following JSON array holds one analyzed risk. Return it through the `risks` array of
the output function with `manager` and `documents` filled in from the reference material.

## Risk
{input}

## Reference material (personnel and related case documents)
{reference}
"#;

/// A function the model is forced to call, and the argument key holding its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub payload_key: &'static str,
    /// Full `{"type": "function", "function": {...}}` object as sent on the wire.
    pub definition: Value,
}

impl ToolDefinition {
    /// `tool_choice` value that forces this function.
    pub fn choice(&self) -> Value {
        json!({"type": "function", "function": {"name": self.name}})
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagePrompt {
    pub system_prompt: String,
    pub user_prompt_template: String,
    pub tool: Option<ToolDefinition>,
}

/// Values interpolated into a user prompt template.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptContext<'a> {
    pub input: Option<&'a str>,
    pub reference: Option<&'a str>,
}

impl StagePrompt {
    /// Fill the placeholders in one pass over the template, so braces
    /// inside the substituted text are never expanded.
    pub fn render_user_prompt(&self, context: &PromptContext<'_>) -> String {
        let mut out = String::with_capacity(self.user_prompt_template.len());
        let mut rest = self.user_prompt_template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(INPUT_PLACEHOLDER) {
                out.push_str(context.input.unwrap_or_default());
                rest = after;
            } else if let Some(after) = tail.strip_prefix(REFERENCE_PLACEHOLDER) {
                out.push_str(context.reference.unwrap_or_default());
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

/// Prompts and tool schemas for every stage. Built once at start-up.
#[derive(Debug, Clone)]
pub struct PromptRegistry {
    analyze: StagePrompt,
    format: StagePrompt,
    enrich: StagePrompt,
}

impl PromptRegistry {
    pub fn new(taxonomy: &HazardTaxonomy) -> Self {
        Self {
            analyze: StagePrompt {
                system_prompt: ANALYZE_SYSTEM_PROMPT.trim().to_string(),
                user_prompt_template: ANALYZE_USER_PROMPT.trim().to_string(),
                tool: None,
            },
            format: StagePrompt {
                system_prompt: FORMAT_SYSTEM_PROMPT.trim().to_string(),
                user_prompt_template: FORMAT_USER_TEMPLATE
                    .trim()
                    .replace(CATEGORIES_PLACEHOLDER, &taxonomy.as_prompt_list()),
                tool: Some(format_tool(taxonomy)),
            },
            enrich: StagePrompt {
                system_prompt: ENRICH_SYSTEM_PROMPT.trim().to_string(),
                user_prompt_template: ENRICH_USER_TEMPLATE.trim().to_string(),
                tool: Some(enrich_tool(taxonomy)),
            },
        }
    }

    pub fn get(&self, stage: Stage) -> &StagePrompt {
        match stage {
            Stage::AnalyzeImageRisks => &self.analyze,
            Stage::FormatRiskAsJson => &self.format,
            Stage::RetrieveInformation => &self.enrich,
        }
    }
}

fn risk_item_properties(taxonomy: &HazardTaxonomy) -> Value {
    json!({
        "index": {
            "type": "integer",
            "description": "Identifier of the risk, unique within one analysis."
        },
        "riskLevel": {
            "type": "integer",
            "enum": [1, 2, 3, 4, 5],
            "description": "Risk level, 1 is the lowest and 5 the highest."
        },
        "content": {
            "type": "object",
            "properties": {
                "potentialRisk": {
                    "type": "string",
                    "enum": taxonomy.as_schema_enum(),
                    "description": "Hazard category. Choose one of the predefined categories."
                },
                "mitigationPlan": {
                    "type": "string",
                    "description": "Proposed plan to mitigate or remove the risk."
                },
                "simulation": {
                    "type": "string",
                    "description": "Accident scenario: conditions, course of events and expected outcome."
                }
            },
            "required": ["potentialRisk", "mitigationPlan", "simulation"]
        },
        "keywords": {
            "type": "array",
            "items": {"type": "string"},
            "minItems": 3,
            "maxItems": 3,
            "description": "Exactly three search keywords taken from the risk, plan and simulation."
        }
    })
}

fn format_tool(taxonomy: &HazardTaxonomy) -> ToolDefinition {
    let name = "output_risks_json";
    ToolDefinition {
        name,
        payload_key: "data",
        definition: json!({
            "type": "function",
            "function": {
                "name": name,
                "description": "Outputs the analyzed risks as structured entries with index, riskLevel, content and keywords.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "data": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": risk_item_properties(taxonomy),
                                "required": ["index", "riskLevel", "content", "keywords"]
                            }
                        }
                    },
                    "required": ["data"]
                }
            }
        }),
    }
}

fn enrich_tool(taxonomy: &HazardTaxonomy) -> ToolDefinition {
    let name = "nearmiss_details";
    let mut properties = risk_item_properties(taxonomy);
    if let Some(map) = properties.as_object_mut() {
        map.insert(
            "manager".into(),
            json!({
                "type": "object",
                "description": "The person responsible for this risk.",
                "properties": {
                    "name": {"type": "string"},
                    "department": {"type": "string"},
                    "phone": {"type": "string"},
                    "email": {"type": "string"}
                },
                "required": ["name", "department", "phone", "email"]
            }),
        );
        map.insert(
            "documents".into(),
            json!({
                "type": "object",
                "description": "The reference document most relevant to this risk.",
                "properties": {
                    "title": {"type": "string"},
                    "summary": {"type": "string"}
                },
                "required": ["title", "summary"]
            }),
        );
    }

    ToolDefinition {
        name,
        payload_key: "risks",
        definition: json!({
            "type": "function",
            "function": {
                "name": name,
                "description": "Provides the risk with its mitigation plan, responsible manager and reference document.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "risks": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": properties,
                                "required": ["index", "riskLevel", "content", "keywords", "manager", "documents"]
                            }
                        }
                    },
                    "required": ["risks"]
                }
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PromptRegistry {
        PromptRegistry::new(&HazardTaxonomy::default())
    }

    #[test]
    fn analyze_stage_has_no_tool() {
        assert!(registry().get(Stage::AnalyzeImageRisks).tool.is_none());
    }

    #[test]
    fn tool_stages_register_expected_functions() {
        let registry = registry();
        let format = registry.get(Stage::FormatRiskAsJson).tool.as_ref().unwrap();
        assert_eq!(format.name, "output_risks_json");
        assert_eq!(format.payload_key, "data");

        let enrich = registry.get(Stage::RetrieveInformation).tool.as_ref().unwrap();
        assert_eq!(enrich.name, "nearmiss_details");
        assert_eq!(enrich.payload_key, "risks");
    }

    #[test]
    fn schemas_embed_taxonomy_enum() {
        let taxonomy = HazardTaxonomy::new(["감전", "화재"]);
        let registry = PromptRegistry::new(&taxonomy);
        for stage in [Stage::FormatRiskAsJson, Stage::RetrieveInformation] {
            let tool = registry.get(stage).tool.as_ref().unwrap();
            let key = tool.payload_key;
            let category = &tool.definition["function"]["parameters"]["properties"][key]["items"]
                ["properties"]["content"]["properties"]["potentialRisk"];
            assert_eq!(category["enum"], json!(["감전", "화재"]));
        }
    }

    #[test]
    fn enrich_schema_uses_single_objects() {
        let registry = registry();
        let tool = registry.get(Stage::RetrieveInformation).tool.as_ref().unwrap();
        let props = &tool.definition["function"]["parameters"]["properties"]["risks"]["items"]
            ["properties"];
        assert_eq!(props["manager"]["type"], "object");
        assert_eq!(props["documents"]["type"], "object");
        assert_eq!(props["keywords"]["minItems"], 3);
    }

    #[test]
    fn format_prompt_lists_categories() {
        let registry = PromptRegistry::new(&HazardTaxonomy::new(["감전"]));
        let template = &registry.get(Stage::FormatRiskAsJson).user_prompt_template;
        assert!(template.contains("`감전`"));
        assert!(!template.contains(CATEGORIES_PLACEHOLDER));
    }

    #[test]
    fn render_interpolates_input_and_reference() {
        let registry = registry();
        let prompt = registry.get(Stage::RetrieveInformation).render_user_prompt(&PromptContext {
            input: Some("[{\"index\":1}]"),
            reference: Some("개구부 추락 사례"),
        });
        assert!(prompt.contains("[{\"index\":1}]"));
        assert!(prompt.contains("개구부 추락 사례"));
        assert!(!prompt.contains(INPUT_PLACEHOLDER));
        assert!(!prompt.contains(REFERENCE_PLACEHOLDER));
    }

    #[test]
    fn placeholders_inside_substituted_text_stay_literal() {
        let registry = registry();
        let analysis = "벽면 표지 \"{reference}\" 와 {input} 문구, 괄호 { 하나";
        let prompt = registry.get(Stage::FormatRiskAsJson).render_user_prompt(&PromptContext {
            input: Some(analysis),
            reference: None,
        });
        assert!(prompt.contains(analysis));

        let prompt = registry.get(Stage::RetrieveInformation).render_user_prompt(&PromptContext {
            input: Some("{reference}"),
            reference: Some("사례 {input}"),
        });
        assert!(prompt.contains("{reference}"));
        assert!(prompt.contains("사례 {input}"));
    }

    #[test]
    fn tool_choice_forces_function_by_name() {
        let registry = registry();
        let tool = registry.get(Stage::FormatRiskAsJson).tool.as_ref().unwrap();
        assert_eq!(
            tool.choice(),
            json!({"type": "function", "function": {"name": "output_risks_json"}})
        );
    }
}
