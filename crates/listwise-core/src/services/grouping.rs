//! Image grouping service
//!
//! The similarity algorithm lives outside this crate. Whatever a grouper
//! returns is passed through [`normalize_groups`] so every input URL lands in
//! exactly one group.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::types::{ImageGroup, Locale};

#[async_trait]
pub trait ImageGrouper: Send + Sync {
    /// Cluster images that show the same product. Callers normalize the result.
    async fn group(&self, image_urls: &[String], locale: Locale) -> Result<Vec<ImageGroup>>;
}

/// Client for a remote grouping service.
pub struct HttpImageGrouper {
    http: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct GroupingResponse {
    groups: Vec<WireGroup>,
}

#[derive(Deserialize)]
struct WireGroup {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "suggestedName")]
    suggested_name: Option<String>,
    #[serde(default, alias = "suggestedNameTranslated")]
    suggested_name_translated: Option<String>,
    #[serde(default, alias = "imageUrls")]
    image_urls: Vec<String>,
    #[serde(default, alias = "primaryImageUrl")]
    primary_image_url: Option<String>,
    #[serde(default, alias = "categoryHint")]
    category_hint: Option<String>,
}

impl HttpImageGrouper {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ImageGrouper for HttpImageGrouper {
    async fn group(&self, image_urls: &[String], locale: Locale) -> Result<Vec<ImageGroup>> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "image_urls": image_urls, "locale": locale.code() }))
            .send()
            .await
            .context("Grouping service unreachable")?
            .error_for_status()
            .context("Grouping service returned an error")?;
        let body: GroupingResponse = response
            .json()
            .await
            .context("Grouping service returned malformed JSON")?;

        Ok(body
            .groups
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                let primary = g
                    .primary_image_url
                    .or_else(|| g.image_urls.first().cloned())
                    .unwrap_or_default();
                ImageGroup {
                    id: g.id.unwrap_or_else(|| format!("group-{}", i + 1)),
                    suggested_name: g
                        .suggested_name
                        .unwrap_or_else(|| format!("Product {}", i + 1)),
                    suggested_name_translated: g.suggested_name_translated,
                    image_urls: g.image_urls,
                    primary_image_url: primary,
                    category_hint: g.category_hint,
                }
            })
            .collect())
    }
}

/// Offline grouper: images whose filenames share a stem, after stripping a
/// trailing `_N` / `-N` index, form one group.
#[derive(Debug, Default, Clone)]
pub struct FilenameGrouper;

#[async_trait]
impl ImageGrouper for FilenameGrouper {
    async fn group(&self, image_urls: &[String], _locale: Locale) -> Result<Vec<ImageGroup>> {
        let mut order: Vec<String> = Vec::new();
        let mut by_stem: HashMap<String, Vec<String>> = HashMap::new();
        for url in image_urls {
            let stem = product_stem(url);
            by_stem
                .entry(stem.clone())
                .or_insert_with(|| {
                    order.push(stem.clone());
                    Vec::new()
                })
                .push(url.clone());
        }

        Ok(order
            .into_iter()
            .enumerate()
            .filter_map(|(i, stem)| {
                let urls = by_stem.remove(&stem)?;
                Some(ImageGroup {
                    id: format!("group-{}", i + 1),
                    suggested_name: display_name(&stem),
                    suggested_name_translated: None,
                    primary_image_url: urls.first().cloned().unwrap_or_default(),
                    image_urls: urls,
                    category_hint: None,
                })
            })
            .collect())
    }
}

/// `https://cdn/x/blue-mug_2.jpg?v=1` → `blue-mug`
pub fn product_stem(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = match file.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => file,
    };
    static INDEX_SUFFIX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(.+?)(?:[_-]\d+| \(\d+\))$").expect("valid index suffix regex")
    });
    let trimmed = INDEX_SUFFIX
        .captures(stem)
        .and_then(|caps| caps.get(1))
        .map_or(stem, |m| m.as_str());
    trimmed.to_ascii_lowercase()
}

fn display_name(stem: &str) -> String {
    stem.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Enforce exact coverage of `inputs` (after collapsing duplicate inputs).
///
/// Duplicates keep their first occurrence, unknown URLs are dropped, missing
/// inputs become singleton groups, empty groups disappear, and a primary URL
/// outside its group is replaced by the group's first URL.
pub fn normalize_groups(inputs: &[String], groups: Vec<ImageGroup>) -> Vec<ImageGroup> {
    let mut unique_inputs: Vec<&String> = Vec::new();
    let mut input_set: HashSet<&str> = HashSet::new();
    for url in inputs {
        if input_set.insert(url.as_str()) {
            unique_inputs.push(url);
        }
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut result: Vec<ImageGroup> = Vec::new();
    for mut group in groups {
        group
            .image_urls
            .retain(|url| input_set.contains(url.as_str()) && seen.insert(url.clone()));
        if group.image_urls.is_empty() {
            continue;
        }
        if !group.image_urls.contains(&group.primary_image_url) {
            group.primary_image_url = group.image_urls[0].clone();
        }
        result.push(group);
    }

    let mut next_index = result.len();
    for url in unique_inputs {
        if seen.contains(url.as_str()) {
            continue;
        }
        next_index += 1;
        tracing::debug!(url = %url, "Image missing from grouping result, adding singleton");
        result.push(ImageGroup {
            id: format!("group-{}", next_index),
            suggested_name: display_name(&product_stem(url)),
            suggested_name_translated: None,
            image_urls: vec![url.clone()],
            primary_image_url: url.clone(),
            category_hint: None,
        });
    }

    // Group ids must stay unique after the service's ids were kept
    let mut ids: HashSet<String> = HashSet::new();
    for (i, group) in result.iter_mut().enumerate() {
        if !ids.insert(group.id.clone()) {
            group.id = format!("{}-{}", group.id, i + 1);
            ids.insert(group.id.clone());
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("https://cdn.test/{}", n)).collect()
    }

    fn group(id: &str, members: &[String], primary: &str) -> ImageGroup {
        ImageGroup {
            id: id.into(),
            suggested_name: id.into(),
            suggested_name_translated: None,
            image_urls: members.to_vec(),
            primary_image_url: primary.into(),
            category_hint: None,
        }
    }

    fn assert_exact_coverage(inputs: &[String], groups: &[ImageGroup]) {
        let mut covered: Vec<&String> = groups.iter().flat_map(|g| g.image_urls.iter()).collect();
        covered.sort();
        let mut expected: Vec<&String> = inputs.iter().collect();
        expected.sort();
        expected.dedup();
        assert_eq!(covered, expected);
        for g in groups {
            assert!(g.image_urls.contains(&g.primary_image_url));
        }
    }

    #[test]
    fn test_product_stem() {
        assert_eq!(product_stem("https://cdn/x/Blue-Mug_2.jpg?v=1"), "blue-mug");
        assert_eq!(product_stem("lamp-10.png"), "lamp");
        assert_eq!(product_stem("sofa.jpeg"), "sofa");
        assert_eq!(product_stem("2024-01.jpg"), "2024");
        assert_eq!(product_stem("Tote (2).webp"), "tote");
    }

    #[tokio::test]
    async fn test_filename_grouper_splits_by_stem() {
        let inputs = urls(&["mug_1.jpg", "lamp_1.jpg", "mug_2.jpg", "mug-3.jpg"]);
        let groups = FilenameGrouper.group(&inputs, Locale::En).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].image_urls.len(), 3);
        assert_eq!(groups[0].suggested_name, "Mug");
        assert_eq!(groups[1].suggested_name, "Lamp");
        assert_exact_coverage(&inputs, &groups);
    }

    #[test]
    fn test_normalize_repairs_bad_service_output() {
        let inputs = urls(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "a.jpg"]);
        let raw = vec![
            group("g1", &urls(&["a.jpg", "b.jpg", "zzz.jpg"]), "https://cdn.test/zzz.jpg"),
            group("g1", &urls(&["b.jpg", "c.jpg"]), "https://cdn.test/b.jpg"),
            group("g3", &[], ""),
        ];
        let groups = normalize_groups(&inputs, raw);

        assert_exact_coverage(&inputs, &groups);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].primary_image_url, "https://cdn.test/a.jpg");
        assert_eq!(groups[1].image_urls, urls(&["c.jpg"]));
        assert_eq!(groups[1].primary_image_url, "https://cdn.test/c.jpg");
        assert_eq!(groups[2].image_urls, urls(&["d.jpg"]));
        let ids: HashSet<_> = groups.iter().map(|g| g.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_normalize_empty_service_result() {
        let inputs = urls(&["a.jpg", "b.jpg"]);
        let groups = normalize_groups(&inputs, Vec::new());
        assert_eq!(groups.len(), 2);
        assert_exact_coverage(&inputs, &groups);
    }
}
