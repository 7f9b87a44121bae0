//! Domain types shared by agents, tools, and storage

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content language. Stored content is always written in both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ar,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Ar => "ar",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::Ar => "Arabic",
        }
    }

    /// Guess the language a message is written in.
    ///
    /// Any Arabic-script character wins; otherwise Latin letters mean English.
    /// Returns `None` for messages with no letters (numbers, emoji, URLs only).
    pub fn detect(text: &str) -> Option<Locale> {
        if text.chars().any(is_arabic_char) {
            return Some(Locale::Ar);
        }
        let stripped = strip_urls(text);
        if stripped.chars().any(|c| c.is_ascii_alphabetic()) {
            return Some(Locale::En);
        }
        None
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Locale::En),
            "ar" | "arabic" => Ok(Locale::Ar),
            other => Err(format!("Unsupported locale: {}", other)),
        }
    }
}

fn is_arabic_char(c: char) -> bool {
    matches!(c as u32, 0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF)
}

fn strip_urls(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| !word.starts_with("http://") && !word.starts_with("https://"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Kind of store. Drives the category taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    Fashion,
    Electronics,
    Grocery,
    Beauty,
    HomeGoods,
    #[default]
    #[serde(other)]
    General,
}

impl StoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreType::Fashion => "fashion",
            StoreType::Electronics => "electronics",
            StoreType::Grocery => "grocery",
            StoreType::Beauty => "beauty",
            StoreType::HomeGoods => "home_goods",
            StoreType::General => "general",
        }
    }
}

impl std::fmt::Display for StoreType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoreType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fashion" => StoreType::Fashion,
            "electronics" => StoreType::Electronics,
            "grocery" => StoreType::Grocery,
            "beauty" => StoreType::Beauty,
            "home_goods" | "home" => StoreType::HomeGoods,
            _ => StoreType::General,
        })
    }
}

/// Workflow flavour the client is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowVariant {
    #[default]
    Standard,
    /// First-time setup of a new store.
    Onboarding,
}

/// Per-request context. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub merchant_id: String,
    pub store_id: String,
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub store_type: StoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowVariant>,
}

impl AgentContext {
    pub fn new(merchant_id: impl Into<String>, store_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            store_id: store_id.into(),
            locale: Locale::default(),
            store_type: StoreType::default(),
            batch_id: None,
            workflow: None,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_store_type(mut self, store_type: StoreType) -> Self {
        self.store_type = store_type;
        self
    }

    pub fn with_batch_id(mut self, batch_id: impl Into<String>) -> Self {
        self.batch_id = Some(batch_id.into());
        self
    }

    pub fn with_workflow(mut self, workflow: WorkflowVariant) -> Self {
        self.workflow = Some(workflow);
        self
    }

    pub fn scope(&self) -> OwnershipScope {
        OwnershipScope {
            merchant_id: self.merchant_id.clone(),
            store_id: self.store_id.clone(),
        }
    }
}

/// The (merchant, store) pair every write is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipScope {
    pub merchant_id: String,
    pub store_id: String,
}

/// A cluster of images that show the same product. Only ever exists as a tool
/// result; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGroup {
    pub id: String,
    pub suggested_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_name_translated: Option<String>,
    pub image_urls: Vec<String>,
    pub primary_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    /// Lenient parse: anything unrecognised is `Low`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Confidence::High,
            "medium" | "med" => Confidence::Medium,
            _ => Confidence::Low,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Draft lifecycle. `Persisted` and `Discarded` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Draft,
    Persisted,
    Discarded,
}

impl DraftStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Persisted => "persisted",
            DraftStatus::Discarded => "discarded",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, DraftStatus::Draft)
    }
}

impl std::fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "persisted" => Ok(DraftStatus::Persisted),
            "discarded" => Ok(DraftStatus::Discarded),
            other => Err(format!("Unknown draft status: {}", other)),
        }
    }
}

/// Staging record for a candidate product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub id: String,
    pub batch_id: Option<String>,
    pub store_id: String,
    pub merchant_id: String,
    pub group_index: Option<i64>,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: String,
    pub description_ar: String,
    pub category_en: String,
    pub category_ar: String,
    pub tags: Vec<String>,
    pub suggested_price: Option<f64>,
    pub image_urls: Vec<String>,
    pub primary_image_url: String,
    pub confidence: Confidence,
    pub status: DraftStatus,
    pub metadata: Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields of a draft that can be created; ids, status, and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDraft {
    pub batch_id: Option<String>,
    pub group_index: Option<i64>,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: String,
    pub description_ar: String,
    pub category_en: String,
    pub category_ar: String,
    pub tags: Vec<String>,
    pub suggested_price: Option<f64>,
    pub image_urls: Vec<String>,
    pub primary_image_url: String,
    pub confidence: Confidence,
    pub metadata: Value,
}

impl NewDraft {
    /// Enforce `primary_image_url ∈ image_urls`.
    pub fn normalize_primary(&mut self) {
        if !self.image_urls.contains(&self.primary_image_url) {
            if let Some(first) = self.image_urls.first() {
                self.primary_image_url = first.clone();
            } else if !self.primary_image_url.is_empty() {
                self.image_urls.push(self.primary_image_url.clone());
            }
        }
    }
}

/// A draft field addressable by the editing tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftField {
    NameEn,
    NameAr,
    DescriptionEn,
    DescriptionAr,
    CategoryEn,
    CategoryAr,
    Tags,
    SuggestedPrice,
}

impl DraftField {
    pub fn column(self) -> &'static str {
        match self {
            DraftField::NameEn => "name_en",
            DraftField::NameAr => "name_ar",
            DraftField::DescriptionEn => "description_en",
            DraftField::DescriptionAr => "description_ar",
            DraftField::CategoryEn => "category_en",
            DraftField::CategoryAr => "category_ar",
            DraftField::Tags => "tags",
            DraftField::SuggestedPrice => "suggested_price",
        }
    }

    /// Current text of a text field on the draft.
    pub fn read_text(self, draft: &ProductDraft) -> Option<String> {
        match self {
            DraftField::NameEn => Some(draft.name_en.clone()),
            DraftField::NameAr => Some(draft.name_ar.clone()),
            DraftField::DescriptionEn => Some(draft.description_en.clone()),
            DraftField::DescriptionAr => Some(draft.description_ar.clone()),
            DraftField::CategoryEn => Some(draft.category_en.clone()),
            DraftField::CategoryAr => Some(draft.category_ar.clone()),
            DraftField::Tags => Some(draft.tags.join(", ")),
            DraftField::SuggestedPrice => None,
        }
    }

    /// Language a text field is written in.
    pub fn locale(self) -> Option<Locale> {
        match self {
            DraftField::NameEn | DraftField::DescriptionEn | DraftField::CategoryEn => {
                Some(Locale::En)
            }
            DraftField::NameAr | DraftField::DescriptionAr | DraftField::CategoryAr => {
                Some(Locale::Ar)
            }
            DraftField::Tags | DraftField::SuggestedPrice => None,
        }
    }
}

/// Production catalog row. Only the persistence gate creates these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProduct {
    pub id: String,
    pub store_id: String,
    pub merchant_id: String,
    pub draft_id: String,
    pub slug: String,
    pub name_en: String,
    pub name_ar: String,
    pub description_en: String,
    pub description_ar: String,
    pub category_en: String,
    pub category_ar: String,
    pub tags: Vec<String>,
    pub price: Option<f64>,
    pub image_urls: Vec<String>,
    pub primary_image_url: String,
    pub confidence: Confidence,
    pub ai_generated: bool,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locale_detection() {
        assert_eq!(Locale::detect("هل يمكنك تعديل الوصف؟"), Some(Locale::Ar));
        assert_eq!(Locale::detect("Please shorten it"), Some(Locale::En));
        assert_eq!(Locale::detect("https://cdn.example.com/a.jpg 42"), None);
    }

    #[test]
    fn test_unknown_store_type_is_general() {
        let parsed: StoreType = serde_json::from_str("\"pet_supplies\"").unwrap();
        assert_eq!(parsed, StoreType::General);
        assert_eq!("home-goods".parse::<StoreType>().unwrap(), StoreType::HomeGoods);
    }

    #[test]
    fn test_confidence_is_lenient() {
        assert_eq!(Confidence::parse_lenient("HIGH"), Confidence::High);
        assert_eq!(Confidence::parse_lenient("very sure"), Confidence::Low);
    }

    #[test]
    fn test_normalize_primary_keeps_invariant() {
        let mut draft = NewDraft {
            batch_id: None,
            group_index: None,
            name_en: "Mug".into(),
            name_ar: "كوب".into(),
            description_en: String::new(),
            description_ar: String::new(),
            category_en: "Kitchen".into(),
            category_ar: "مطبخ".into(),
            tags: vec![],
            suggested_price: None,
            image_urls: vec!["a.jpg".into(), "b.jpg".into()],
            primary_image_url: "elsewhere.jpg".into(),
            confidence: Confidence::Medium,
            metadata: Value::Null,
        };
        draft.normalize_primary();
        assert_eq!(draft.primary_image_url, "a.jpg");
    }
}
