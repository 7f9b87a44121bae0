//! Draft lifecycle guarantees exercised through the public API.

use std::sync::Arc;

use listwise_core::agent::delegation::AnalyzeProductImagesTool;
use listwise_core::agent::ManagerServices;
use listwise_core::ai::{ModelTurn, ScriptedBackend};
use listwise_core::services::{
    normalize_groups, CatalogPricing, FilenameGrouper, NoPricing, PricingOracle,
};
use listwise_core::storage::{Database, DraftFilter, DraftValue, Stores};
use listwise_core::tools::implementations::{GenerateProductDetailsTool, ImageOpTool, ImageOperation};
use listwise_core::tools::registry::{Tool, ToolContext};
use listwise_core::types::{
    AgentContext, Confidence, DraftField, DraftStatus, ImageGroup, NewDraft, OwnershipScope,
};
use serde_json::{json, Value};

fn stores() -> Stores {
    Stores::new(Database::in_memory().unwrap())
}

fn scope(merchant: &str, store: &str) -> OwnershipScope {
    AgentContext::new(merchant, store).scope()
}

fn new_draft(name: &str, category: &str, price: Option<f64>, images: &[&str]) -> NewDraft {
    NewDraft {
        batch_id: None,
        group_index: None,
        name_en: name.to_string(),
        name_ar: name.to_string(),
        description_en: String::new(),
        description_ar: String::new(),
        category_en: category.to_string(),
        category_ar: category.to_string(),
        tags: Vec::new(),
        suggested_price: price,
        image_urls: images.iter().map(|s| s.to_string()).collect(),
        primary_image_url: images.first().map(|s| s.to_string()).unwrap_or_default(),
        confidence: Confidence::Medium,
        metadata: Value::Null,
    }
}

fn group(id: &str, name: &str, images: &[&str]) -> ImageGroup {
    ImageGroup {
        id: id.to_string(),
        suggested_name: name.to_string(),
        suggested_name_translated: None,
        image_urls: images.iter().map(|s| s.to_string()).collect(),
        primary_image_url: images[0].to_string(),
        category_hint: None,
    }
}

#[test]
fn every_upload_lands_in_exactly_one_group() {
    let inputs: Vec<String> = ["a.jpg", "b.jpg", "c.jpg", "d.jpg", "a.jpg"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let raw = vec![
        group("g1", "First", &["a.jpg", "b.jpg", "zzz.jpg"]),
        group("g1", "Again", &["b.jpg", "c.jpg"]),
        group("g3", "Empty", &["nope.jpg"]),
    ];

    let groups = normalize_groups(&inputs, raw);
    let mut covered: Vec<&str> = groups
        .iter()
        .flat_map(|g| g.image_urls.iter().map(String::as_str))
        .collect();
    covered.sort();
    assert_eq!(covered, vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]);

    let mut ids: Vec<&str> = groups.iter().map(|g| g.id.as_str()).collect();
    ids.dedup();
    assert_eq!(ids.len(), groups.len());
    assert!(groups.iter().all(|g| g.image_urls.contains(&g.primary_image_url)));
}

#[tokio::test]
async fn image_analysis_covers_uploads_whatever_the_vision_model_passes() {
    let uploads: Vec<String> = [
        "sneaker_1.jpg",
        "sneaker_2.jpg",
        "sneaker_3.jpg",
        "tote-1.jpg",
        "tote-2.jpg",
        "lamp.jpg",
    ]
    .iter()
    .map(|f| format!("https://cdn.test/{}", f))
    .collect();
    // The vision model drops four uploads and invents one
    let backend = ScriptedBackend::new().script(
        "vision",
        vec![
            ModelTurn::tool_call(
                "v1",
                "group_images",
                json!({"image_urls": [
                    "https://cdn.test/sneaker_1.jpg",
                    "https://cdn.test/tote-1.jpg",
                    "https://cdn.test/ghost.jpg",
                ]}),
            ),
            ModelTurn::text("Grouped."),
        ],
    );
    let services = ManagerServices::with_model(
        Arc::new(backend),
        Database::in_memory().unwrap(),
        Arc::new(FilenameGrouper),
    );
    let tool = AnalyzeProductImagesTool::new(services, uploads.clone());
    let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));

    let data = tool.execute(json!({}), &ctx).await.data().unwrap();
    let groups: Vec<ImageGroup> = serde_json::from_value(data["groups"].clone()).unwrap();

    let mut covered: Vec<String> = groups.iter().flat_map(|g| g.image_urls.clone()).collect();
    covered.sort();
    let mut expected = uploads.clone();
    expected.sort();
    assert_eq!(covered, expected);
    assert_eq!(data["image_count"], 6);
    assert!(groups.iter().all(|g| g.image_urls.contains(&g.primary_image_url)));
}

#[tokio::test]
async fn unparsable_copy_still_produces_a_reviewable_draft() {
    let stores = stores();
    let backend = ScriptedBackend::new().script(
        "product_copy",
        vec![ModelTurn::text("Sorry, these photos are too blurry to describe.")],
    );
    let tool = GenerateProductDetailsTool::new(Arc::new(backend), stores.drafts.clone(), Arc::new(NoPricing));
    let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));

    let mut g = group("g1", "Linen Shirt", &["shirt_1.jpg", "shirt_2.jpg"]);
    g.suggested_name_translated = Some("قميص كتان".into());
    let data = tool
        .execute(json!({"group": g, "group_index": 0}), &ctx)
        .await
        .data()
        .unwrap();

    assert_eq!(data["fallback"], true);
    let draft = stores
        .drafts
        .get(data["draft_id"].as_str().unwrap(), &ctx.agent.scope())
        .unwrap()
        .unwrap();
    assert_eq!(draft.name_en, "Linen Shirt");
    assert_eq!(draft.name_ar, "قميص كتان");
    assert_eq!(draft.confidence, Confidence::Low);
    assert_eq!(draft.suggested_price, None);
    assert_eq!(draft.image_urls.len(), 2);
    assert_eq!(draft.metadata["fallback_reason"], "unparsable_output");
}

#[test]
fn persisted_and_discarded_drafts_never_change_again() {
    let stores = stores();
    let owner = scope("m1", "s1");
    let kept = stores
        .drafts
        .create(&owner, new_draft("Mug", "Kitchen", Some(12.0), &["mug.jpg"]))
        .unwrap();
    let dropped = stores
        .drafts
        .create(&owner, new_draft("Bowl", "Kitchen", None, &["bowl.jpg"]))
        .unwrap();

    let report = stores
        .catalog
        .persist_drafts(&[kept.id.clone()], &owner)
        .unwrap();
    assert_eq!(report.created_count, 1);
    assert_eq!(stores.drafts.discard(&[dropped.id.clone()], &owner).unwrap().len(), 1);

    let rename = DraftValue::parse(DraftField::NameEn, &json!("Renamed")).unwrap();
    for id in [&kept.id, &dropped.id] {
        assert!(!stores.drafts.update_field(id, &owner, DraftField::NameEn, &rename).unwrap());
        assert!(!stores.drafts.set_price_if_missing(id, &owner, 5.0).unwrap());
    }
    // Discarding a persisted draft or persisting a discarded one is a no-op
    assert!(stores.drafts.discard(&[kept.id.clone()], &owner).unwrap().is_empty());
    let again = stores
        .catalog
        .persist_drafts(&[kept.id.clone(), dropped.id.clone()], &owner)
        .unwrap();
    assert_eq!(again.created_count, 0);
    assert_eq!(again.skipped_draft_ids.len(), 2);

    let kept = stores.drafts.get(&kept.id, &owner).unwrap().unwrap();
    let dropped = stores.drafts.get(&dropped.id, &owner).unwrap().unwrap();
    assert_eq!(kept.status, DraftStatus::Persisted);
    assert_eq!(kept.name_en, "Mug");
    assert_eq!(dropped.status, DraftStatus::Discarded);
    assert_eq!(stores.catalog.list(&owner).unwrap().len(), 1);
}

#[test]
fn other_merchants_cannot_see_or_touch_drafts() {
    let stores = stores();
    let owner = scope("m1", "s1");
    let other_merchant = scope("m2", "s1");
    let other_store = scope("m1", "s2");
    let draft = stores
        .drafts
        .create(&owner, new_draft("Lamp", "Lighting", None, &["lamp.jpg"]))
        .unwrap();

    for intruder in [&other_merchant, &other_store] {
        assert!(stores.drafts.get(&draft.id, intruder).unwrap().is_none());
        assert!(stores
            .drafts
            .list(intruder, &DraftFilter::default())
            .unwrap()
            .is_empty());
        assert!(stores.drafts.discard(&[draft.id.clone()], intruder).unwrap().is_empty());
        let report = stores.catalog.persist_drafts(&[draft.id.clone()], intruder).unwrap();
        assert_eq!(report.created_count, 0);
        assert_eq!(report.skipped_draft_ids, vec![draft.id.clone()]);
    }

    let stored = stores.drafts.get(&draft.id, &owner).unwrap().unwrap();
    assert_eq!(stored.status, DraftStatus::Draft);
    assert!(stores.catalog.list(&owner).unwrap().is_empty());
}

#[tokio::test]
async fn primary_image_must_come_from_the_draft() {
    let stores = stores();
    let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));
    let draft = stores
        .drafts
        .create(&ctx.agent.scope(), new_draft("Vase", "Home", None, &["vase_1.jpg", "vase_2.jpg"]))
        .unwrap();
    let tool = ImageOpTool::new(ImageOperation::Replace, stores.drafts.clone(), stores.assets.clone());

    let rejected = tool
        .execute(
            json!({"draft_id": draft.id, "new_primary_url": "https://elsewhere.test/cat.jpg"}),
            &ctx,
        )
        .await;
    assert_eq!(rejected.error_code().as_deref(), Some("invalid_parameters"));
    let unchanged = stores.drafts.get(&draft.id, &ctx.agent.scope()).unwrap().unwrap();
    assert_eq!(unchanged.primary_image_url, "vase_1.jpg");

    let accepted = tool
        .execute(json!({"draft_id": draft.id, "new_primary_url": "vase_2.jpg"}), &ctx)
        .await;
    assert!(!accepted.is_error);
    let changed = stores.drafts.get(&draft.id, &ctx.agent.scope()).unwrap().unwrap();
    assert_eq!(changed.primary_image_url, "vase_2.jpg");
    assert!(changed.image_urls.contains(&changed.primary_image_url));
}

#[tokio::test]
async fn prices_only_come_from_the_catalog() {
    let stores = stores();
    let owner = scope("m1", "s1");
    for price in [30.0, 50.0] {
        let priced = stores
            .drafts
            .create(&owner, new_draft("Runner", "Shoes", Some(price), &["runner.jpg"]))
            .unwrap();
        stores.catalog.persist_drafts(&[priced.id], &owner).unwrap();
    }

    let pricing: Arc<dyn PricingOracle> = Arc::new(CatalogPricing::new(stores.catalog.clone()));
    assert_eq!(pricing.suggest_price("Shoes", "m1").await.unwrap(), Some(40.0));
    assert_eq!(pricing.suggest_price("Bags", "m1").await.unwrap(), None);
    assert_eq!(pricing.suggest_price("Shoes", "m2").await.unwrap(), None);

    let backend = ScriptedBackend::new().respond("product_copy", |req| {
        let text = req.last_user_text();
        let (en, ar, cat_en, cat_ar) = if text.contains("Trainer") {
            ("Trail Trainer", "حذاء رياضي", "Shoes", "أحذية")
        } else {
            ("Tote Bag", "حقيبة", "Bags", "حقائب")
        };
        Ok(ModelTurn::text(
            json!({
                "name_en": en, "name_ar": ar,
                "category_en": cat_en, "category_ar": cat_ar,
                "suggested_price": 999.0,
                "confidence": "high"
            })
            .to_string(),
        ))
    });
    let tool = GenerateProductDetailsTool::new(Arc::new(backend), stores.drafts.clone(), pricing);
    let ctx = ToolContext::new(Arc::new(AgentContext::new("m1", "s1")));

    let shoe = tool
        .execute(json!({"group": group("g1", "Trainer", &["t.jpg"])}), &ctx)
        .await
        .data()
        .unwrap();
    let bag = tool
        .execute(json!({"group": group("g2", "Tote", &["b.jpg"])}), &ctx)
        .await
        .data()
        .unwrap();

    assert_eq!(shoe["draft"]["suggested_price"], 40.0);
    assert_eq!(shoe["draft"]["metadata"]["price_source"], "catalog_average");
    assert!(bag["draft"]["suggested_price"].is_null());
    assert!(bag["draft"]["metadata"].get("price_source").is_none());
}
