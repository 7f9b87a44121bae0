//! suggest_categories - pick a label from the store type's taxonomy

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::subagent::types::call_labels;
use crate::ai::backend::{complete_text, ModelBackend, ModelTier};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolResult};
use crate::types::StoreType;

/// Catch-all label, present in every taxonomy.
pub const OTHER_CATEGORY: (&str, &str) = ("Other", "أخرى");

/// Fixed (English, Arabic) category labels for a store type.
pub fn taxonomy(store_type: StoreType) -> &'static [(&'static str, &'static str)] {
    match store_type {
        StoreType::Fashion => &[
            ("Tops", "بلوزات وقمصان"),
            ("Dresses", "فساتين"),
            ("Pants", "بناطيل"),
            ("Outerwear", "ملابس خارجية"),
            ("Shoes", "أحذية"),
            ("Bags", "حقائب"),
            ("Accessories", "إكسسوارات"),
            OTHER_CATEGORY,
        ],
        StoreType::Electronics => &[
            ("Phones", "هواتف"),
            ("Laptops", "حواسيب محمولة"),
            ("Audio", "صوتيات"),
            ("Cameras", "كاميرات"),
            ("Wearables", "أجهزة قابلة للارتداء"),
            ("Accessories", "ملحقات"),
            OTHER_CATEGORY,
        ],
        StoreType::Grocery => &[
            ("Fresh Produce", "خضار وفواكه"),
            ("Dairy", "ألبان"),
            ("Bakery", "مخبوزات"),
            ("Beverages", "مشروبات"),
            ("Snacks", "وجبات خفيفة"),
            ("Pantry", "مواد تموينية"),
            OTHER_CATEGORY,
        ],
        StoreType::Beauty => &[
            ("Skincare", "العناية بالبشرة"),
            ("Makeup", "مكياج"),
            ("Haircare", "العناية بالشعر"),
            ("Fragrance", "عطور"),
            ("Tools", "أدوات التجميل"),
            OTHER_CATEGORY,
        ],
        StoreType::HomeGoods => &[
            ("Kitchen", "مطبخ"),
            ("Decor", "ديكور"),
            ("Furniture", "أثاث"),
            ("Bedding", "مفروشات"),
            ("Lighting", "إضاءة"),
            ("Storage", "تخزين"),
            OTHER_CATEGORY,
        ],
        StoreType::General => &[
            ("Clothing", "ملابس"),
            ("Electronics", "إلكترونيات"),
            ("Home", "المنزل"),
            ("Beauty", "تجميل"),
            ("Food", "أطعمة"),
            ("Toys", "ألعاب"),
            OTHER_CATEGORY,
        ],
    }
}

/// Match free model text against the taxonomy: an exact label first, then the
/// first label the reply mentions.
pub fn match_category(
    store_type: StoreType,
    reply: &str,
) -> (&'static str, &'static str) {
    let labels = taxonomy(store_type);
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '`')
        .to_lowercase();
    if let Some(hit) = labels
        .iter()
        .find(|(en, ar)| en.to_lowercase() == cleaned || *ar == cleaned)
    {
        return *hit;
    }
    labels
        .iter()
        .filter(|(en, _)| *en != OTHER_CATEGORY.0)
        .find(|(en, ar)| cleaned.contains(&en.to_lowercase()) || cleaned.contains(*ar))
        .copied()
        .unwrap_or(OTHER_CATEGORY)
}

pub struct SuggestCategoriesTool {
    model: Arc<dyn ModelBackend>,
}

impl SuggestCategoriesTool {
    pub fn new(model: Arc<dyn ModelBackend>) -> Self {
        Self { model }
    }
}

#[derive(Deserialize)]
struct Params {
    name: String,
    #[serde(default)]
    store_type: Option<StoreType>,
}

#[async_trait]
impl Tool for SuggestCategoriesTool {
    fn name(&self) -> &str {
        "suggest_categories"
    }

    fn description(&self) -> &str {
        "Pick the best-fitting category for a product from the store's fixed taxonomy."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Product name"},
                "store_type": {"type": "string"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params: Params = match parse_params(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if params.name.trim().is_empty() {
            return ToolResult::invalid_parameters("name must not be empty");
        }
        let store_type = params.store_type.unwrap_or(ctx.agent.store_type);
        let labels: Vec<&str> = taxonomy(store_type).iter().map(|(en, _)| *en).collect();

        let system = format!(
            "Classify products for a {} store. Answer with exactly one of these labels and \
             nothing else: {}.",
            store_type,
            labels.join(", ")
        );
        let (category_en, category_ar, matched) = match complete_text(
            self.model.as_ref(),
            call_labels::CATEGORY,
            ModelTier::Fast,
            &system,
            params.name.trim(),
        )
        .await
        {
            Ok(reply) => {
                let (en, ar) = match_category(store_type, &reply);
                (en, ar, true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Category suggestion failed, using Other");
                (OTHER_CATEGORY.0, OTHER_CATEGORY.1, false)
            }
        };

        ToolResult::success_data(json!({
            "category_en": category_en,
            "category_ar": category_ar,
            "store_type": store_type,
            "model_answered": matched,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::backend::ModelTurn;
    use crate::ai::scripted::ScriptedBackend;
    use crate::tools::implementations::test_support::ctx_for;

    #[test]
    fn test_match_category() {
        assert_eq!(match_category(StoreType::HomeGoods, "kitchen").0, "Kitchen");
        assert_eq!(match_category(StoreType::HomeGoods, "\"Lighting.\"").1, "إضاءة");
        assert_eq!(
            match_category(StoreType::HomeGoods, "I would say Decor fits best").0,
            "Decor"
        );
        assert_eq!(match_category(StoreType::Grocery, "Spaceships"), OTHER_CATEGORY);
    }

    #[test]
    fn test_every_taxonomy_has_other() {
        for store_type in [
            StoreType::Fashion,
            StoreType::Electronics,
            StoreType::Grocery,
            StoreType::Beauty,
            StoreType::HomeGoods,
            StoreType::General,
        ] {
            assert!(taxonomy(store_type).contains(&OTHER_CATEGORY));
        }
    }

    #[tokio::test]
    async fn test_suggests_from_taxonomy() {
        let backend = ScriptedBackend::new()
            .script(call_labels::CATEGORY, vec![ModelTurn::text("Audio")]);
        let tool = SuggestCategoriesTool::new(Arc::new(backend));
        let result = tool
            .execute(
                json!({"name": "Wireless earbuds", "store_type": "electronics"}),
                &ctx_for("m1", "s1"),
            )
            .await;
        let data = result.data().unwrap();
        assert_eq!(data["category_en"], "Audio");
        assert_eq!(data["category_ar"], "صوتيات");
    }

    #[tokio::test]
    async fn test_model_failure_yields_other() {
        let tool = SuggestCategoriesTool::new(Arc::new(ScriptedBackend::new()));
        let result = tool
            .execute(json!({"name": "Thing"}), &ctx_for("m1", "s1"))
            .await;
        let data = result.data().unwrap();
        assert_eq!(data["category_en"], "Other");
        assert_eq!(data["model_answered"], false);
    }
}
