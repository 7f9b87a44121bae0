//! generate_product_details - one bilingual draft per image group
//!
//! The draft is written before the tool returns. Copy that fails to generate
//! or parse is replaced by a low-confidence draft built from the group itself,
//! so a group never ends up without a draft.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{require_scope, storage_error};
use crate::agent::subagent::types::call_labels;
use crate::ai::backend::{GenerateRequest, ModelBackend, ModelTier};
use crate::ai::json::parse_json_object;
use crate::ai::types::{Content, ImageContent, ModelMessage, Role};
use crate::services::pricing::PricingOracle;
use crate::storage::DraftStore;
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};
use crate::types::{Confidence, ImageGroup, Locale, NewDraft, StoreType};

/// Images attached to the copy request; the rest are only listed by URL.
const MAX_PROMPT_IMAGES: usize = 4;

const COPY_SYSTEM_PROMPT: &str = "You write e-commerce product listings in English and Arabic. \
Reply with a single JSON object and nothing else, with keys: name_en, name_ar, description_en, \
description_ar, category_en, category_ar, tags (array of short strings), confidence \
(high, medium or low: how sure you are the images show one identifiable product). \
Arabic fields must be natural Arabic, not transliteration. Never include prices.";

pub struct GenerateProductDetailsTool {
    model: Arc<dyn ModelBackend>,
    drafts: DraftStore,
    pricing: Arc<dyn PricingOracle>,
    /// The group this instance writes for. When set, the group in the call
    /// arguments is ignored.
    assigned: Option<ImageGroup>,
    /// Results by group id. A repeated call for the same group returns the
    /// draft already written instead of creating a second one.
    created: Mutex<HashMap<String, Value>>,
}

impl GenerateProductDetailsTool {
    pub fn new(
        model: Arc<dyn ModelBackend>,
        drafts: DraftStore,
        pricing: Arc<dyn PricingOracle>,
    ) -> Self {
        Self {
            model,
            drafts,
            pricing,
            assigned: None,
            created: Mutex::new(HashMap::new()),
        }
    }

    /// Bind the tool to one group, so every call writes that group's draft.
    pub fn for_group(mut self, group: ImageGroup) -> Self {
        self.assigned = Some(group);
        self
    }
}

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    group: Option<ImageGroup>,
    #[serde(default)]
    locale: Option<Locale>,
    #[serde(default)]
    store_type: Option<StoreType>,
    #[serde(default)]
    store_id: Option<String>,
    #[serde(default)]
    merchant_id: Option<String>,
    #[serde(default)]
    batch_id: Option<String>,
    #[serde(default)]
    group_index: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GeneratedCopy {
    name_en: String,
    name_ar: String,
    #[serde(default)]
    description_en: String,
    #[serde(default)]
    description_ar: String,
    #[serde(default)]
    category_en: String,
    #[serde(default)]
    category_ar: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
}

impl GeneratedCopy {
    fn is_usable(&self) -> bool {
        !self.name_en.trim().is_empty() && !self.name_ar.trim().is_empty()
    }
}

#[async_trait]
impl Tool for GenerateProductDetailsTool {
    fn name(&self) -> &str {
        "generate_product_details"
    }

    fn description(&self) -> &str {
        "Generate bilingual (English and Arabic) listing details for one image group and save \
         them as a draft. Always produces exactly one draft for the group."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "group": {
                    "type": "object",
                    "description": "The image group, exactly as returned by grouping",
                    "properties": {
                        "id": {"type": "string"},
                        "suggested_name": {"type": "string"},
                        "suggested_name_translated": {"type": "string"},
                        "image_urls": {"type": "array", "items": {"type": "string"}},
                        "primary_image_url": {"type": "string"},
                        "category_hint": {"type": "string"}
                    },
                    "required": ["id", "suggested_name", "image_urls", "primary_image_url"]
                },
                "locale": {"type": "string", "enum": ["en", "ar"]},
                "store_type": {"type": "string"},
                "store_id": {"type": "string"},
                "merchant_id": {"type": "string"},
                "batch_id": {"type": "string"},
                "group_index": {"type": "integer"}
            },
            "required": ["group"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: Params = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let scope = match require_scope(ctx, params.merchant_id.as_deref(), params.store_id.as_deref()) {
            Ok(scope) => scope,
            Err(e) => return e,
        };
        let group = match (&self.assigned, params.group) {
            (Some(assigned), passed) => {
                if passed.as_ref().is_some_and(|g| g.id != assigned.id) {
                    tracing::warn!(group_id = %assigned.id, "Ignoring a different group in the call");
                }
                assigned.clone()
            }
            (None, Some(passed)) => passed,
            (None, None) => return ToolResult::invalid_parameters("group is required"),
        };
        if group.image_urls.is_empty() {
            return ToolResult::invalid_parameters("group.image_urls must not be empty");
        }
        if let Some(existing) = self.created.lock().get(&group.id) {
            tracing::debug!(group_id = %group.id, "Draft already generated for group");
            return ToolResult::success_data(existing.clone());
        }
        let store_type = params.store_type.unwrap_or(ctx.agent.store_type);
        let locale = params.locale.unwrap_or(ctx.agent.locale);

        let mut metadata = serde_json::Map::new();
        metadata.insert("group_id".into(), json!(group.id));
        metadata.insert("store_type".into(), json!(store_type));
        metadata.insert("locale".into(), json!(locale));

        let copy = match self.generate_copy(&group, store_type, locale).await {
            Ok(copy) => Some(copy),
            Err(reason) => {
                tracing::warn!(group_id = %group.id, reason = %reason, "Using fallback draft");
                metadata.insert("fallback_reason".into(), json!(reason));
                None
            }
        };
        let fallback = copy.is_none();

        let mut draft = match copy {
            Some(copy) => NewDraft {
                batch_id: None,
                group_index: None,
                name_en: copy.name_en.trim().to_string(),
                name_ar: copy.name_ar.trim().to_string(),
                description_en: copy.description_en.trim().to_string(),
                description_ar: copy.description_ar.trim().to_string(),
                category_en: non_empty_or(copy.category_en, group.category_hint.as_deref(), "Other"),
                category_ar: non_empty_or(copy.category_ar, None, "أخرى"),
                tags: copy
                    .tags
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
                suggested_price: None,
                image_urls: group.image_urls.clone(),
                primary_image_url: group.primary_image_url.clone(),
                confidence: copy
                    .confidence
                    .as_deref()
                    .map(Confidence::parse_lenient)
                    .unwrap_or_default(),
                metadata: Value::Null,
            },
            None => fallback_draft(&group),
        };
        draft.batch_id = params.batch_id.or_else(|| ctx.agent.batch_id.clone());
        draft.group_index = params.group_index;

        match self
            .pricing
            .suggest_price(&draft.category_en, &scope.merchant_id)
            .await
        {
            Ok(Some(price)) if price.is_finite() && price >= 0.0 => {
                draft.suggested_price = Some(price);
                metadata.insert("price_source".into(), json!("catalog_average"));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, category = %draft.category_en, "Pricing lookup failed");
            }
        }
        draft.metadata = Value::Object(metadata);

        let draft = match self.drafts.create(&scope, draft) {
            Ok(d) => d,
            Err(e) => return storage_error(e),
        };

        let data = json!({
            "draft_id": draft.id,
            "fallback": fallback,
            "draft": draft,
        });
        self.created.lock().insert(group.id.clone(), data.clone());
        ToolResult::success_data(data)
    }
}

impl GenerateProductDetailsTool {
    async fn generate_copy(
        &self,
        group: &ImageGroup,
        store_type: StoreType,
        locale: Locale,
    ) -> Result<GeneratedCopy, String> {
        let brief = json!({
            "suggested_name": group.suggested_name,
            "suggested_name_translated": group.suggested_name_translated,
            "category_hint": group.category_hint,
            "image_urls": group.image_urls,
            "store_type": store_type,
            "merchant_locale": locale,
        });
        let mut content = vec![Content::Text {
            text: format!("Write the listing for this product.\n{}", brief),
        }];
        for url in group.image_urls.iter().take(MAX_PROMPT_IMAGES) {
            content.push(Content::Image {
                image: ImageContent {
                    url: Some(url.clone()),
                    base64: None,
                    media_type: None,
                },
            });
        }

        let request = GenerateRequest::new(call_labels::PRODUCT_COPY, ModelTier::Quality, COPY_SYSTEM_PROMPT)
            .with_messages(vec![ModelMessage {
                role: Role::User,
                content,
            }])
            .with_max_tokens(2048);

        let turn = self
            .model
            .generate(request)
            .await
            .map_err(|e| format!("generation_failed: {}", e))?;
        let copy: GeneratedCopy =
            parse_json_object(&turn.text).ok_or_else(|| "unparsable_output".to_string())?;
        if !copy.is_usable() {
            return Err("missing_required_fields".to_string());
        }
        Ok(copy)
    }
}

/// Deterministic low-confidence draft from the group's own name and hint.
fn fallback_draft(group: &ImageGroup) -> NewDraft {
    let name_en = if group.suggested_name.trim().is_empty() {
        "Untitled product".to_string()
    } else {
        group.suggested_name.trim().to_string()
    };
    let name_ar = group
        .suggested_name_translated
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| name_en.clone());
    let hint = group
        .category_hint
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    NewDraft {
        batch_id: None,
        group_index: None,
        description_en: format!("{}. Details pending review.", name_en),
        description_ar: format!("{}. التفاصيل قيد المراجعة.", name_ar),
        category_en: hint.unwrap_or("Other").to_string(),
        category_ar: hint.unwrap_or("أخرى").to_string(),
        name_en,
        name_ar,
        tags: Vec::new(),
        suggested_price: None,
        image_urls: group.image_urls.clone(),
        primary_image_url: group.primary_image_url.clone(),
        confidence: Confidence::Low,
        metadata: Value::Null,
    }
}

fn non_empty_or(value: String, hint: Option<&str>, default: &str) -> String {
    let value = value.trim();
    if !value.is_empty() {
        return value.to_string();
    }
    hint.map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(default)
        .to_string()
}
