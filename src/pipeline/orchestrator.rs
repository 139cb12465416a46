use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::documents::DocumentStore;
use super::extract::{extract_content, extract_items};
use super::image::ImagePayload;
use super::inference::ModelInvoker;
use super::prompt::PromptContext;
use super::taxonomy::HazardTaxonomy;
use super::validation::{
    assign_extra_indices, renumber_duplicate_indices, validate_draft, validate_enriched,
};
use super::PipelineError;
use crate::models::*;

/// Raw upload as received from the client.
#[derive(Debug, Clone, Default)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    MissingDocument,
    DocumentRead,
    Inference,
    Extraction,
}

/// A risk dropped from the run, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub index: Option<i64>,
    pub category: Option<String>,
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    fn for_draft(draft: &DraftRisk, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage: Stage::RetrieveInformation,
            index: Some(draft.index),
            category: Some(draft.content.potential_risk.clone()),
            kind,
            message: message.into(),
        }
    }

    /// Failure for an item that may not even have parsed.
    fn for_raw(stage: Stage, raw: &Value, message: impl Into<String>) -> Self {
        Self {
            stage,
            index: raw.get("index").and_then(Value::as_i64),
            category: raw
                .pointer("/content/potentialRisk")
                .and_then(Value::as_str)
                .map(str::to_string),
            kind: FailureKind::Validation,
            message: message.into(),
        }
    }
}

/// Current position of one run in the state machine. Every move is logged.
#[derive(Debug)]
pub struct RunTracker {
    run_id: Uuid,
    state: PipelineState,
}

impl RunTracker {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: PipelineState::Idle,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn advance(&mut self, next: PipelineState) {
        tracing::info!(
            run_id = %self.run_id,
            from = %self.state,
            to = %next,
            "Pipeline state transition"
        );
        self.state = next;
    }
}

/// Everything a successful run produced. `entries` is never empty.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub tracker: RunTracker,
    pub image: ImagePayload,
    pub entries: Vec<RiskEntry>,
    pub failures: Vec<ItemFailure>,
}

/// analyze → jsonify → enrich (per item) → attach image.
pub struct RiskPipeline {
    invoker: ModelInvoker,
    taxonomy: Arc<HazardTaxonomy>,
    documents: Box<dyn DocumentStore + Send + Sync>,
    max_upload_bytes: usize,
}

impl RiskPipeline {
    pub fn new(
        invoker: ModelInvoker,
        taxonomy: Arc<HazardTaxonomy>,
        documents: Box<dyn DocumentStore + Send + Sync>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            invoker,
            taxonomy,
            documents,
            max_upload_bytes,
        }
    }

    pub fn run(&self, run_id: Uuid, upload: &ImageUpload) -> Result<PipelineOutcome, PipelineError> {
        let span = tracing::info_span!("pipeline_run", run_id = %run_id);
        let _guard = span.enter();
        let mut tracker = RunTracker::new(run_id);

        let image = ImagePayload::from_upload(
            &upload.bytes,
            upload.content_type.as_deref(),
            upload.file_name.as_deref(),
            self.max_upload_bytes,
        )?;
        tracing::info!(
            mime = %image.mime,
            size = image.size_bytes,
            width = image.width,
            height = image.height,
            sha256 = %image.sha256,
            "Image loaded"
        );
        tracker.advance(PipelineState::ImageLoaded);

        let analysis = self.analyze(&image)?;
        tracker.advance(PipelineState::Analyzed);

        let mut failures = Vec::new();
        let drafts = self.jsonify(&analysis, &mut failures)?;
        tracker.advance(PipelineState::Jsonified);

        let enriched = self.enrich_all(&drafts, &mut failures)?;
        tracker.advance(PipelineState::Enriched);

        let entries = attach_image(enriched, &image.base64);
        for entry in &entries {
            tracing::debug!(
                entry = %serde_json::to_string(&entry.display_copy()).unwrap_or_default(),
                "Risk entry ready"
            );
        }
        tracker.advance(PipelineState::ImageAttached);

        tracing::info!(
            entries = entries.len(),
            skipped = failures.len(),
            "Pipeline run finished"
        );
        Ok(PipelineOutcome {
            tracker,
            image,
            entries,
            failures,
        })
    }

    fn analyze(&self, image: &ImagePayload) -> Result<String, PipelineError> {
        let stage = Stage::AnalyzeImageRisks;
        let response = self
            .invoker
            .invoke(stage, Some(&image.data_url()), &PromptContext::default())
            .map_err(|source| PipelineError::Inference { stage, source })?;
        extract_content(&response).map_err(|source| PipelineError::Extraction { stage, source })
    }

    fn jsonify(
        &self,
        analysis: &str,
        failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<DraftRisk>, PipelineError> {
        let stage = Stage::FormatRiskAsJson;
        let response = self
            .invoker
            .invoke(
                stage,
                None,
                &PromptContext {
                    input: Some(analysis),
                    reference: None,
                },
            )
            .map_err(|source| PipelineError::Inference { stage, source })?;

        let key = self.payload_key(stage);
        let items = extract_items(&response, key)
            .map_err(|source| PipelineError::Extraction { stage, source })?;

        let mut drafts = Vec::with_capacity(items.len());
        let mut rejected = 0;
        for raw in items {
            match validate_draft(raw.clone(), &self.taxonomy) {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    tracing::warn!(stage = %stage, error = %e, "Dropping invalid risk entry");
                    failures.push(ItemFailure::for_raw(stage, &raw, e.to_string()));
                    rejected += 1;
                }
            }
        }

        if drafts.is_empty() {
            return Err(PipelineError::NoValidRisks { rejected });
        }
        renumber_duplicate_indices(drafts.iter_mut().map(|d| &mut d.index));
        Ok(drafts)
    }

    fn enrich_all(
        &self,
        drafts: &[DraftRisk],
        failures: &mut Vec<ItemFailure>,
    ) -> Result<Vec<EnrichedRisk>, PipelineError> {
        let mut enriched = Vec::with_capacity(drafts.len());
        // Positions in `enriched` of items beyond the first per draft.
        let mut extra = vec![];
        let mut failed = 0;

        for draft in drafts {
            let before = failures.len();
            let risks = self.enrich_one(draft, failures);
            extra.extend(enriched.len() + 1..enriched.len() + risks.len());
            if risks.is_empty() {
                failed += 1;
                // Every dropped item leaves at least one recorded reason.
                if failures.len() == before {
                    failures.push(ItemFailure::for_draft(
                        draft,
                        FailureKind::Extraction,
                        "enrichment returned no risks",
                    ));
                }
            }
            enriched.extend(risks);
        }

        if enriched.is_empty() {
            return Err(PipelineError::NoEnrichedRisks { failed });
        }
        // Draft indices are already unique and stay with their first item.
        assign_extra_indices(
            drafts.iter().map(|d| d.index),
            enriched
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| extra.contains(i))
                .map(|(_, r)| &mut r.index),
        );
        Ok(enriched)
    }

    /// Enrich one draft. Failures are recorded, never returned.
    fn enrich_one(&self, draft: &DraftRisk, failures: &mut Vec<ItemFailure>) -> Vec<EnrichedRisk> {
        let stage = Stage::RetrieveInformation;
        let category = draft.content.potential_risk.as_str();
        let span = tracing::info_span!("enrich", index = draft.index, category = %category);
        let _guard = span.enter();

        let reference = match self.documents.lookup(category) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::warn!("No reference document for category");
                failures.push(ItemFailure::for_draft(
                    draft,
                    FailureKind::MissingDocument,
                    format!("no reference document for '{category}'"),
                ));
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reference document unreadable");
                failures.push(ItemFailure::for_draft(
                    draft,
                    FailureKind::DocumentRead,
                    e.to_string(),
                ));
                return Vec::new();
            }
        };

        let input = match serde_json::to_string(std::slice::from_ref(draft)) {
            Ok(json) => json,
            Err(e) => {
                failures.push(ItemFailure::for_draft(draft, FailureKind::Validation, e.to_string()));
                return Vec::new();
            }
        };

        let response = match self.invoker.invoke(
            stage,
            None,
            &PromptContext {
                input: Some(&input),
                reference: Some(&reference),
            },
        ) {
            Ok(response) => response,
            Err(e) => {
                failures.push(ItemFailure::for_draft(draft, FailureKind::Inference, e.to_string()));
                return Vec::new();
            }
        };

        let items = match extract_items(&response, self.payload_key(stage)) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Enrichment response unusable");
                failures.push(ItemFailure::for_draft(draft, FailureKind::Extraction, e.to_string()));
                return Vec::new();
            }
        };

        let mut risks = Vec::with_capacity(items.len());
        for raw in items {
            match validate_enriched(raw.clone(), &self.taxonomy) {
                Ok(mut risk) => {
                    // The run's numbering comes from the formatting stage.
                    if risks.is_empty() {
                        risk.index = draft.index;
                    }
                    risks.push(risk);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping invalid enriched entry");
                    failures.push(ItemFailure::for_raw(stage, &raw, e.to_string()));
                }
            }
        }
        risks
    }

    fn payload_key(&self, stage: Stage) -> &'static str {
        self.invoker
            .registry()
            .get(stage)
            .tool
            .as_ref()
            .map(|t| t.payload_key)
            .unwrap_or_default()
    }
}

/// Stamp each enriched risk with the run's image. Produces new values.
pub fn attach_image(risks: Vec<EnrichedRisk>, image_base64: &str) -> Vec<RiskEntry> {
    risks
        .into_iter()
        .map(|risk| RiskEntry::new(risk, image_base64))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::pipeline::documents::InMemoryDocumentStore;
    use crate::pipeline::extract::ExtractionError;
    use crate::pipeline::image::InputError;
    use crate::pipeline::inference::{
        ChatResponse, InferenceError, MessageContent, MockInferenceClient,
    };
    use serde_json::json;

    fn two_risks() -> String {
        json!({"data": [draft_value(1, "추락"), draft_value(2, "감전")]}).to_string()
    }

    #[test]
    fn successful_run_produces_enriched_entries() {
        let pipeline = pipeline_with(staged_client(two_risks(), &[]), all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        assert_eq!(outcome.entries.len(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.tracker.state(), PipelineState::ImageAttached);
        let taxonomy = HazardTaxonomy::default();
        for entry in &outcome.entries {
            assert_eq!(entry.image_base64, outcome.image.base64);
            assert_eq!(entry.risk.keywords.len(), 3);
            assert!(taxonomy.contains(&entry.risk.content.potential_risk));
            assert_eq!(entry.risk.manager.name, "김안전");
        }
        // Indices come from the formatting stage, not the enrichment echo.
        let indices: Vec<i64> = outcome.entries.iter().map(|e| e.risk.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn stage_calls_run_in_order_with_image_on_first() {
        let client = Arc::new(staged_client(two_risks(), &[]));
        let pipeline = pipeline_with(client.clone(), all_documents());
        pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[0].tools.is_none());
        assert!(matches!(
            &requests[0].messages[1].content,
            MessageContent::Parts(parts) if parts.len() == 2
        ));
        assert_eq!(
            requests[1].tool_choice.as_ref().unwrap()["function"]["name"],
            "output_risks_json"
        );
        for enrich in &requests[2..] {
            assert_eq!(
                enrich.tool_choice.as_ref().unwrap()["function"]["name"],
                "nearmiss_details"
            );
            match &enrich.messages[1].content {
                MessageContent::Text(text) => assert!(text.contains("관련 사례와 담당자")),
                other => panic!("expected text prompt, got {other:?}"),
            }
        }
    }

    #[test]
    fn fan_out_failure_drops_only_that_item() {
        let pipeline = pipeline_with(staged_client(two_risks(), &["추락"]), all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].risk.content.potential_risk, "감전");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::Inference);
        assert_eq!(outcome.failures[0].category.as_deref(), Some("추락"));
    }

    #[test]
    fn missing_document_drops_item() {
        let documents = InMemoryDocumentStore::new().with("감전", "누전 사례");
        let pipeline = pipeline_with(staged_client(two_risks(), &[]), documents);
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.failures[0].kind, FailureKind::MissingDocument);
    }

    #[test]
    fn all_enrichment_failures_abort_the_run() {
        let pipeline = pipeline_with(staged_client(two_risks(), &["추락", "감전"]), all_documents());
        let err = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap_err();
        assert!(matches!(err, PipelineError::NoEnrichedRisks { failed: 2 }));
    }

    #[test]
    fn invalid_format_items_are_dropped_and_recorded() {
        let args = json!({"data": [draft_value(1, "지진"), draft_value(2, "화재")]}).to_string();
        let pipeline = pipeline_with(staged_client(args, &[]), all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.failures[0].stage, Stage::FormatRiskAsJson);
        assert_eq!(outcome.failures[0].kind, FailureKind::Validation);
        assert_eq!(outcome.failures[0].category.as_deref(), Some("지진"));
    }

    #[test]
    fn no_valid_format_items_aborts() {
        let args = json!({"data": [draft_value(1, "지진")]}).to_string();
        let pipeline = pipeline_with(staged_client(args, &[]), all_documents());
        let err = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap_err();
        assert!(matches!(err, PipelineError::NoValidRisks { rejected: 1 }));
    }

    #[test]
    fn single_object_payload_is_accepted() {
        let args = json!({"data": draft_value(5, "화재")}).to_string();
        let pipeline = pipeline_with(staged_client(args, &[]), all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].risk.index, 5);
    }

    #[test]
    fn duplicate_indices_are_made_unique() {
        let args = json!({"data": [draft_value(1, "추락"), draft_value(1, "감전")]}).to_string();
        let pipeline = pipeline_with(staged_client(args, &[]), all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();
        let indices: Vec<i64> = outcome.entries.iter().map(|e| e.risk.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn extra_enriched_items_do_not_take_other_drafts_indices() {
        let client = MockInferenceClient::from_fn(|request| {
            let tool = request
                .tool_choice
                .as_ref()
                .and_then(|c| c["function"]["name"].as_str())
                .map(str::to_string);
            match tool.as_deref() {
                None => Ok(ChatResponse::with_content(ANALYSIS)),
                Some("output_risks_json") => {
                    Ok(ChatResponse::with_tool_call("output_risks_json", two_risks()))
                }
                Some(name) => {
                    let text = match &request.messages[1].content {
                        MessageContent::Text(text) => text.clone(),
                        MessageContent::Parts(_) => String::new(),
                    };
                    let risks = if text.contains("\"potentialRisk\":\"추락\"") {
                        json!([enriched_value(1, "추락"), enriched_value(2, "추락")])
                    } else {
                        json!([enriched_value(7, "감전")])
                    };
                    Ok(ChatResponse::with_tool_call(name, json!({"risks": risks}).to_string()))
                }
            }
        });
        let pipeline = pipeline_with(client, all_documents());
        let outcome = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap();

        let numbered: Vec<(&str, i64)> = outcome
            .entries
            .iter()
            .map(|e| (e.risk.content.potential_risk.as_str(), e.risk.index))
            .collect();
        assert_eq!(numbered, vec![("추락", 1), ("추락", 3), ("감전", 2)]);
    }

    #[test]
    fn invalid_json_at_format_stage_is_fatal() {
        let pipeline = pipeline_with(staged_client("{\"data\": [".into(), &[]), all_documents());
        let err = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction {
                stage: Stage::FormatRiskAsJson,
                source: ExtractionError::InvalidJson(_)
            }
        ));
    }

    #[test]
    fn empty_analysis_is_extraction_failure() {
        let client = MockInferenceClient::scripted(vec![Ok(ChatResponse::with_content(""))]);
        let pipeline = pipeline_with(client, all_documents());
        let err = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction {
                stage: Stage::AnalyzeImageRisks,
                source: ExtractionError::MissingContent
            }
        ));
    }

    #[test]
    fn analysis_timeout_is_fatal_and_stops_the_run() {
        let client = MockInferenceClient::scripted(vec![Err(InferenceError::Timeout(120))]);
        let pipeline = pipeline_with(client, all_documents());
        let err = pipeline.run(Uuid::new_v4(), &png_upload()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Inference {
                stage: Stage::AnalyzeImageRisks,
                source: InferenceError::Timeout(120)
            }
        ));
    }

    #[test]
    fn non_image_upload_fails_before_any_call() {
        let upload = ImageUpload {
            bytes: b"plain text".to_vec(),
            content_type: Some("text/plain".into()),
            file_name: Some("notes.txt".into()),
        };
        let pipeline = pipeline_with(MockInferenceClient::scripted(vec![]), all_documents());
        let err = pipeline.run(Uuid::new_v4(), &upload).unwrap_err();
        assert!(matches!(err, PipelineError::Input(InputError::NotAnImage(_))));
        assert!(err.is_input_error());
    }

    #[test]
    fn attach_image_keeps_full_payload() {
        let image = "B".repeat(64);
        let entries = attach_image(vec![crate::models::risk::fixtures::enriched(1, "추락")], &image);
        assert_eq!(entries[0].image_base64, image);
        assert!(entries[0].display_copy().image_base64.ends_with("..."));
        assert_eq!(entries[0].image_base64.len(), 64);
    }
}
