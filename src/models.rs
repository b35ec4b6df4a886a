//! Recipe model and its wire representation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{RecipeError, Result};

/// Prefix of ids assigned to optimistic inserts that the server has not confirmed yet
pub const TEMP_ID_PREFIX: &str = "local-";

/// Allocate a fresh temporary id for an optimistic insert
pub fn new_temp_id() -> String {
    format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Trim tags, drop empty ones and remove duplicates keeping the first occurrence
pub fn normalize_collections<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Recipe difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = RecipeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(RecipeError::validation(format!("unknown difficulty: {}", other))),
        }
    }
}

/// One ingredient line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Ingredient {
    pub quantity: String,
    pub unit: String,
    pub item: String,
}

impl Ingredient {
    pub fn new(quantity: &str, unit: &str, item: &str) -> Self {
        Self {
            quantity: quantity.to_string(),
            unit: unit.to_string(),
            item: item.to_string(),
        }
    }
}

// Older rows store ingredients as plain strings.
impl<'de> Deserialize<'de> for Ingredient {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Parts {
                #[serde(default, deserialize_with = "lenient::string")]
                quantity: String,
                #[serde(default, deserialize_with = "lenient::string")]
                unit: String,
                #[serde(default, deserialize_with = "lenient::string")]
                item: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(item) => Ingredient {
                item,
                ..Default::default()
            },
            Repr::Parts {
                quantity,
                unit,
                item,
            } => Ingredient {
                quantity,
                unit,
                item,
            },
        })
    }
}

/// One instruction step; `step` is the ordinal label shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Step {
    pub step: String,
    pub instruction: String,
}

impl Step {
    pub fn new(step: &str, instruction: &str) -> Self {
        Self {
            step: step.to_string(),
            instruction: instruction.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Step {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Parts {
                #[serde(default, deserialize_with = "lenient::string")]
                step: String,
                #[serde(default, deserialize_with = "lenient::string")]
                instruction: String,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(instruction) => Step {
                step: String::new(),
                instruction,
            },
            Repr::Parts { step, instruction } => Step { step, instruction },
        })
    }
}

/// The recipe as the app sees it.
///
/// `id` is `None` for a draft that has never been saved. Field names on the
/// serde side follow the app's payloads (`imageUrl`, `sourceUrl`,
/// `createdAt`), so a generated recipe can be deserialized directly into a
/// draft.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    pub tips: Option<String>,
    pub time_minutes: u32,
    pub calories_per_serving: u32,
    pub servings: u32,
    pub difficulty: Difficulty,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "sourceUrl")]
    pub source_url: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    pub collections: Vec<String>,
}

impl Recipe {
    /// A new unsaved recipe
    pub fn draft(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_collections<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.collections = normalize_collections(tags);
        self
    }

    /// Saved on the server (has an id that is not a temporary one)
    pub fn is_persisted(&self) -> bool {
        self.id.as_deref().map(|id| !is_temp_id(id)).unwrap_or(false)
    }

    /// Optimistic copy still waiting for the server to assign its id
    pub fn is_pending(&self) -> bool {
        self.id.as_deref().map(is_temp_id).unwrap_or(false)
    }

    pub fn in_collection(&self, name: &str) -> bool {
        self.collections.iter().any(|c| c == name)
    }

    /// Check the fields a recipe needs before it can be written
    pub fn validate_for_save(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(RecipeError::validation("title must not be empty"));
        }
        Ok(())
    }
}

/// A `user_recipes` row as PostgREST returns it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecipeRow {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_string"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredients: Option<Vec<Ingredient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<Step>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u32"
    )]
    pub time_minutes: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u32"
    )]
    pub calories_per_serving: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::opt_u32"
    )]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,
}

/// Body of a PATCH; nullable fields are sent as `null` so they can be cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipePatch {
    pub title: String,
    pub description: String,
    pub ingredients: Vec<Ingredient>,
    pub steps: Vec<Step>,
    pub tips: Option<String>,
    pub image_url: Option<String>,
    pub collections: Vec<String>,
}

/// Decoders that accept the loosely typed JSON found in generated recipes
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn value_to_string(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(Option::<Value>::deserialize(d)?
            .and_then(value_to_string)
            .unwrap_or_default())
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.and_then(value_to_string))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        let value = Option::<Value>::deserialize(d)?;
        Ok(match value {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
                .and_then(|v| u32::try_from(v).ok()),
            Some(Value::String(s)) => {
                // "30 mins" and similar
                let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<u32>().ok()
            }
            _ => None,
        })
    }
}
