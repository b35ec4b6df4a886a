//! Collection grouping over the loaded window
//!
//! Collections are plain tags on each recipe; the index is rebuilt from the
//! window whenever it is asked for, so it can never drift from it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::Recipe;

/// Name of the synthetic group holding every recipe in the window
pub const ALL_RECIPES: &str = "All Recipes";

/// Number of image URLs kept per group for the cover collage
pub const MAX_THUMBNAILS: usize = 4;

/// A named group of recipes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionGroup {
    pub name: String,
    pub count: usize,
    pub recipe_ids: Vec<String>,
    pub thumbnails: Vec<String>,
}

impl CollectionGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            recipe_ids: Vec::new(),
            thumbnails: Vec::new(),
        }
    }

    fn push(&mut self, recipe: &Recipe) {
        self.count += 1;
        if let Some(id) = &recipe.id {
            self.recipe_ids.push(id.clone());
        }
        if let Some(url) = &recipe.image_url {
            if self.thumbnails.len() < MAX_THUMBNAILS {
                self.thumbnails.push(url.clone());
            }
        }
    }
}

/// Groups of the current window, "All Recipes" first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIndex {
    groups: Vec<CollectionGroup>,
}

impl CollectionIndex {
    pub fn build(recipes: &[Recipe]) -> Self {
        let mut all = CollectionGroup::new(ALL_RECIPES);
        // keyed by lowercase name, then by name, so "dinner" and "Dinner"
        // stay separate groups but sort next to each other
        let mut named: BTreeMap<(String, String), CollectionGroup> = BTreeMap::new();

        for recipe in recipes {
            all.push(recipe);
            for name in &recipe.collections {
                if name == ALL_RECIPES {
                    continue;
                }
                named
                    .entry((name.to_lowercase(), name.clone()))
                    .or_insert_with(|| CollectionGroup::new(name))
                    .push(recipe);
            }
        }

        let mut groups = Vec::with_capacity(named.len() + 1);
        groups.push(all);
        groups.extend(named.into_values());
        Self { groups }
    }

    pub fn groups(&self) -> &[CollectionGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Option<&CollectionGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Names of the user's own collections, without "All Recipes"
    pub fn names(&self) -> Vec<String> {
        self.groups
            .iter()
            .skip(1)
            .map(|g| g.name.clone())
            .collect()
    }

    /// Recipes of a group in window order
    pub fn members<'a>(&self, name: &str, recipes: &'a [Recipe]) -> Vec<&'a Recipe> {
        if name == ALL_RECIPES {
            return recipes.iter().collect();
        }
        recipes.iter().filter(|r| r.in_collection(name)).collect()
    }
}

/// Display orderings for the recipe list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Newest,
    Name,
    Time,
    Calories,
}

/// A sorted copy of `recipes`; ties keep window order
pub fn sorted(recipes: &[Recipe], key: SortKey) -> Vec<Recipe> {
    let mut out = recipes.to_vec();
    match key {
        SortKey::Newest => out.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortKey::Name => out.sort_by_key(|r| r.title.to_lowercase()),
        SortKey::Time => out.sort_by_key(|r| r.time_minutes),
        SortKey::Calories => out.sort_by_key(|r| r.calories_per_serving),
    }
    out
}

/// Case-insensitive match on title, description and ingredient names
pub fn search<'a>(recipes: &'a [Recipe], query: &str) -> Vec<&'a Recipe> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return recipes.iter().collect();
    }

    recipes
        .iter()
        .filter(|r| {
            r.title.to_lowercase().contains(&query)
                || r.description.to_lowercase().contains(&query)
                || r
                    .ingredients
                    .iter()
                    .any(|i| i.item.to_lowercase().contains(&query))
        })
        .collect()
}
