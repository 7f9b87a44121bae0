//! Scripted model for `listwise chat --offline`
//!
//! Plays the manager with fixed rules so the whole upload, confirm, and save
//! workflow runs without a provider key. Sub-agents have no script, so they
//! fall back to their direct tool calls and drafts use placeholder copy.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};

use listwise_core::ai::{GenerateRequest, ModelTurn, ScriptedBackend};
use listwise_core::ModelError;

pub fn backend() -> ScriptedBackend {
    ScriptedBackend::new().respond("manager", manager_turn)
}

/// Parsed tool envelopes, oldest first.
fn envelopes<'a>(messages: impl Iterator<Item = &'a listwise_core::ai::types::ModelMessage>) -> Vec<Value> {
    messages
        .flat_map(|m| {
            m.tool_results()
                .filter_map(|(_, output, _)| output.as_str())
                .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

fn listed_draft_ids(req: &GenerateRequest) -> Vec<String> {
    envelopes(req.messages.iter())
        .iter()
        .filter_map(|e| e["data"]["drafts"].as_array())
        .flatten()
        .filter_map(|d| d["draft_id"].as_str().map(str::to_string))
        .collect()
}

fn manager_turn(req: &GenerateRequest) -> Result<ModelTurn, ModelError> {
    if req.ends_with_tool_results() {
        let latest = envelopes(req.messages.last().into_iter()).pop().unwrap_or_default();
        return Ok(after_tool(&latest));
    }

    let text = req.last_user_text();
    let lower = text.to_lowercase();
    if text.contains("[uploaded images") {
        return Ok(ModelTurn::tool_call(call_id(), "analyze_product_images", json!({})));
    }
    if text.contains("[confirmation") {
        if text.contains(": declined]") {
            return Ok(ModelTurn::text("Okay, nothing was saved. The drafts are still here."));
        }
        return Ok(ModelTurn::tool_call(
            call_id(),
            "confirm_and_persist",
            json!({"draft_ids": listed_draft_ids(req)}),
        ));
    }
    if lower.contains("save") || text.contains("حفظ") {
        let ids = listed_draft_ids(req);
        if ids.is_empty() {
            return Ok(ModelTurn::text("There are no drafts to save yet. Attach photos with /image."));
        }
        return Ok(ModelTurn::tool_call(
            call_id(),
            "request_confirmation",
            json!({
                "summary": format!("Save {} draft(s) to your catalog?", ids.len()),
                "draft_ids": ids,
            }),
        ));
    }
    Ok(ModelTurn::text(
        "Offline mode: attach photos with /image <url>, then say \"save\" to add the drafts to your catalog.",
    ))
}

fn after_tool(envelope: &Value) -> ModelTurn {
    if envelope["ok"] == false {
        return ModelTurn::text(format!(
            "That didn't work: {}",
            envelope["error"]["message"].as_str().unwrap_or("unknown error")
        ));
    }
    let data = &envelope["data"];
    if data.get("groups").is_some() {
        return ModelTurn::tool_call(
            call_id(),
            "generate_product_listings",
            json!({"groups": data["groups"]}),
        );
    }
    if data.get("created_product_ids").is_some() {
        return ModelTurn::text(format!("Saved {} product(s) to your catalog.", data["created_count"]));
    }
    if let Some(drafts) = data["drafts"].as_array() {
        let names: Vec<&str> = drafts.iter().filter_map(|d| d["name_en"].as_str()).collect();
        return ModelTurn::text(format!(
            "I drafted {} listing(s): {}. Say \"save\" when they look right.",
            drafts.len(),
            names.join(", ")
        ));
    }
    ModelTurn::text("Done.")
}

fn call_id() -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    format!("offline-{}", NEXT.fetch_add(1, Ordering::Relaxed))
}
