//! Mapping between `user_recipes` rows and the `Recipe` model
//!
//! Pure functions. Decoding never fails on missing optional data; only a
//! row without an `id` is rejected, because every row coming back from the
//! server is supposed to be persisted.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::error::{RecipeError, Result};
use crate::models::{normalize_collections, Difficulty, Recipe, RecipePatch, RecipeRow, Step};

/// Decode a persisted row
pub fn to_domain(row: RecipeRow) -> Result<Recipe> {
    let id = row
        .id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| RecipeError::validation("recipe row is missing its id"))?;

    let difficulty = match row.difficulty.as_deref() {
        Some(raw) => raw.parse::<Difficulty>().unwrap_or_else(|_| {
            debug!(recipe_id = %id, difficulty = raw, "unknown difficulty, using default");
            Difficulty::default()
        }),
        None => Difficulty::default(),
    };

    let created_at = row.created_at.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            debug!(recipe_id = %id, created_at = raw, "unparsable created_at");
        }
        parsed
    });

    Ok(Recipe {
        id: Some(id),
        title: row.title.unwrap_or_default(),
        description: row.description.unwrap_or_default(),
        ingredients: row.ingredients.unwrap_or_default(),
        steps: label_steps(row.steps.unwrap_or_default()),
        tips: row.tips.filter(|t| !t.is_empty()),
        time_minutes: row.time_minutes.unwrap_or_default(),
        calories_per_serving: row.calories_per_serving.unwrap_or_default(),
        servings: row.servings.unwrap_or_default(),
        difficulty,
        image_url: row.image_url.filter(|u| !u.is_empty()),
        source_url: row.source_url.filter(|u| !u.is_empty()),
        created_at,
        collections: normalize_collections(row.collections.unwrap_or_default()),
    })
}

/// Full wire form of a recipe, including identity when present
pub fn to_wire(recipe: &Recipe) -> RecipeRow {
    RecipeRow {
        id: recipe.id.clone(),
        user_id: None,
        title: Some(recipe.title.clone()),
        description: Some(recipe.description.clone()),
        ingredients: Some(recipe.ingredients.clone()),
        steps: Some(recipe.steps.clone()),
        tips: recipe.tips.clone(),
        time_minutes: Some(recipe.time_minutes),
        calories_per_serving: Some(recipe.calories_per_serving),
        servings: Some(recipe.servings),
        difficulty: Some(recipe.difficulty.as_str().to_string()),
        image_url: recipe.image_url.clone(),
        source_url: recipe.source_url.clone(),
        created_at: recipe
            .created_at
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        collections: Some(normalize_collections(&recipe.collections)),
    }
}

/// Body of an insert; `id` and `created_at` are assigned by the server
pub fn to_insert_payload(recipe: &Recipe, owner_id: &str) -> RecipeRow {
    RecipeRow {
        id: None,
        created_at: None,
        user_id: Some(owner_id.to_string()),
        steps: Some(label_steps(recipe.steps.clone())),
        ..to_wire(recipe)
    }
}

/// Body of an update; the id travels in the request filter
pub fn to_update_payload(recipe: &Recipe) -> RecipePatch {
    RecipePatch {
        title: recipe.title.clone(),
        description: recipe.description.clone(),
        ingredients: recipe.ingredients.clone(),
        steps: label_steps(recipe.steps.clone()),
        tips: recipe.tips.clone(),
        image_url: recipe.image_url.clone(),
        collections: normalize_collections(&recipe.collections),
    }
}

/// Write the editable fields of a patch onto a recipe; everything else
/// keeps the value the server already has
pub fn apply_patch(recipe: &mut Recipe, patch: RecipePatch) {
    recipe.title = patch.title;
    recipe.description = patch.description;
    recipe.ingredients = patch.ingredients;
    recipe.steps = patch.steps;
    recipe.tips = patch.tips.filter(|t| !t.is_empty());
    recipe.image_url = patch.image_url.filter(|u| !u.is_empty());
    recipe.collections = patch.collections;
}

fn label_steps(steps: Vec<Step>) -> Vec<Step> {
    steps
        .into_iter()
        .enumerate()
        .map(|(i, mut step)| {
            if step.step.trim().is_empty() {
                step.step = (i + 1).to_string();
            }
            step
        })
        .collect()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ingredient;
    use chrono::TimeZone;
    use serde_json::json;

    fn full_row() -> RecipeRow {
        RecipeRow {
            id: Some("r-1".to_string()),
            user_id: Some("owner-1".to_string()),
            title: Some("Pasta".to_string()),
            description: Some("Weeknight pasta".to_string()),
            ingredients: Some(vec![Ingredient::new("200", "g", "spaghetti")]),
            steps: Some(vec![Step::new("1", "Boil"), Step::new("2", "Toss")]),
            tips: Some("Salt the water".to_string()),
            time_minutes: Some(20),
            calories_per_serving: Some(540),
            servings: Some(2),
            difficulty: Some("Easy".to_string()),
            image_url: Some("https://img/pasta.png".to_string()),
            source_url: Some("https://video/pasta".to_string()),
            created_at: Some("2024-03-01T12:30:00.123456+00:00".to_string()),
            collections: Some(vec!["Dinner".to_string(), "Quick".to_string()]),
        }
    }

    #[test]
    fn test_to_domain_maps_wire_names() {
        let recipe = to_domain(full_row()).unwrap();

        assert_eq!(recipe.id.as_deref(), Some("r-1"));
        assert_eq!(recipe.image_url.as_deref(), Some("https://img/pasta.png"));
        assert_eq!(recipe.source_url.as_deref(), Some("https://video/pasta"));
        assert_eq!(recipe.difficulty, Difficulty::Easy);
        assert_eq!(recipe.calories_per_serving, 540);
        assert_eq!(
            recipe.created_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
                + chrono::Duration::microseconds(123456))
        );
        assert_eq!(recipe.collections, vec!["Dinner", "Quick"]);
    }

    #[test]
    fn test_to_domain_defaults_missing_fields() {
        let cases = vec![
            json!({ "id": "a" }),
            json!({ "id": "b", "ingredients": null, "steps": null, "collections": null }),
            json!({ "id": "c", "difficulty": "Legendary", "created_at": "yesterday" }),
        ];

        for case in cases {
            let row: RecipeRow = serde_json::from_value(case.clone()).unwrap();
            let recipe = to_domain(row).unwrap_or_else(|e| panic!("{}: {}", case, e));
            assert!(recipe.ingredients.is_empty(), "{}", case);
            assert!(recipe.steps.is_empty(), "{}", case);
            assert!(recipe.collections.is_empty(), "{}", case);
            assert_eq!(recipe.difficulty, Difficulty::Medium, "{}", case);
            assert_eq!(recipe.created_at, None, "{}", case);
        }
    }

    #[test]
    fn test_to_domain_requires_id() {
        let mut row = full_row();
        row.id = None;
        assert!(matches!(to_domain(row), Err(RecipeError::Validation(_))));

        let mut row = full_row();
        row.id = Some("  ".to_string());
        assert!(matches!(to_domain(row), Err(RecipeError::Validation(_))));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let mut space_separated = full_row();
        space_separated.created_at = Some("2024-03-01 12:30:00.5+00".to_string());
        let mut unlabeled = full_row();
        unlabeled.steps = Some(vec![Step::new("", "Boil"), Step::new("", "Toss")]);
        unlabeled.collections = Some(vec!["Quick".into(), " Quick ".into(), "".into()]);

        for row in [full_row(), space_separated, unlabeled] {
            let once = to_domain(row).unwrap();
            let twice = to_domain(to_wire(&once)).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_insert_payload_omits_server_fields() {
        let recipe = to_domain(full_row()).unwrap();
        let payload = serde_json::to_value(to_insert_payload(&recipe, "owner-9")).unwrap();

        assert!(payload.get("id").is_none());
        assert!(payload.get("created_at").is_none());
        assert_eq!(payload["user_id"], "owner-9");
        assert_eq!(payload["image_url"], "https://img/pasta.png");
        assert_eq!(payload["time_minutes"], 20);
    }

    #[test]
    fn test_update_payload_sends_clearable_fields() {
        let mut recipe = to_domain(full_row()).unwrap();
        recipe.tips = None;
        recipe.image_url = None;

        let payload = serde_json::to_value(to_update_payload(&recipe)).unwrap();
        assert!(payload.get("id").is_none());
        assert_eq!(payload["tips"], serde_json::Value::Null);
        assert_eq!(payload["image_url"], serde_json::Value::Null);
        assert_eq!(payload["collections"], json!(["Dinner", "Quick"]));
    }

    #[test]
    fn test_apply_patch_leaves_other_fields_alone() {
        let mut stored = to_domain(full_row()).unwrap();
        let mut edited = stored.clone();
        edited.title = "Carbonara".to_string();
        edited.servings = 8;
        edited.time_minutes = 99;
        edited.source_url = Some("https://elsewhere".to_string());

        apply_patch(&mut stored, to_update_payload(&edited));

        assert_eq!(stored.title, "Carbonara");
        assert_eq!(stored.servings, 2);
        assert_eq!(stored.time_minutes, 20);
        assert_eq!(stored.source_url, to_domain(full_row()).unwrap().source_url);
    }
}
