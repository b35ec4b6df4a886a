//! Consumer-facing state holder for the recipe screens

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cache::{RecipeCache, WindowSnapshot};
use crate::collections::CollectionIndex;
use crate::error::{RecipeError, Result};
use crate::models::Recipe;

/// Loading flags and the last user-facing error
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStatus {
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub error: Option<String>,
}

/// Everything a recipe list needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageState {
    pub recipes: Vec<Recipe>,
    pub is_loading: bool,
    pub is_loading_more: bool,
    pub has_more: bool,
    pub error: Option<String>,
}

impl StorageState {
    fn compose(window: &WindowSnapshot, status: &StorageStatus) -> Self {
        Self {
            recipes: window.recipes.clone(),
            is_loading: status.is_loading,
            is_loading_more: status.is_loading_more,
            has_more: window.has_more,
            error: status.error.clone(),
        }
    }
}

/// Change feed for `StorageState`; dropping it unsubscribes
pub struct StorageSubscription {
    status: watch::Receiver<StorageStatus>,
    window: watch::Receiver<Arc<WindowSnapshot>>,
}

impl StorageSubscription {
    /// Wait for the next change. Returns `false` once the controller is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.status.changed() => res.is_ok(),
            res = self.window.changed() => res.is_ok(),
        }
    }

    /// The current state, marking it as seen
    pub fn current(&mut self) -> StorageState {
        let window = self.window.borrow_and_update().clone();
        let status = self.status.borrow_and_update().clone();
        StorageState::compose(&window, &status)
    }
}

/// Facade over `RecipeCache` that tracks loading flags and error messages
#[derive(Clone)]
pub struct RecipeStorageController {
    cache: RecipeCache,
    status: Arc<watch::Sender<StorageStatus>>,
    refresh_debounce: Duration,
    last_refresh: Arc<Mutex<Option<Instant>>>,
}

impl RecipeStorageController {
    pub fn new(cache: RecipeCache, refresh_debounce: Duration) -> Self {
        let (status, _) = watch::channel(StorageStatus::default());
        Self {
            cache,
            status: Arc::new(status),
            refresh_debounce,
            last_refresh: Arc::new(Mutex::new(None)),
        }
    }

    pub fn cache(&self) -> &RecipeCache {
        &self.cache
    }

    pub fn state(&self) -> StorageState {
        let window = self.cache.subscribe().borrow().clone();
        StorageState::compose(&window, &self.status.borrow())
    }

    pub fn subscribe(&self) -> StorageSubscription {
        StorageSubscription {
            status: self.status.subscribe(),
            window: self.cache.subscribe(),
        }
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let message = e.user_message();
            self.status.send_modify(|s| s.error = Some(message));
        }
        result
    }

    // Claims the refresh slot unless one started within the debounce window.
    fn claim_refresh(&self) -> bool {
        let mut last = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last {
            Some(started) if now.duration_since(started) < self.refresh_debounce => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Reload the first page.
    ///
    /// Calls arriving shortly after a refresh started do not issue another
    /// request: they wait for that refresh if it is still running and
    /// otherwise return the window as it is.
    pub async fn refresh_recipes(&self) -> Result<Vec<Recipe>> {
        if !self.claim_refresh() {
            if let Some(result) = self.cache.wait_for_refresh().await {
                debug!("refresh debounced, joined the running one");
                return self.record(result);
            }
            debug!("refresh debounced");
            return Ok(self.cache.snapshot());
        }

        self.status.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let result = self.cache.refresh().await;
        self.status.send_modify(|s| s.is_loading = false);
        self.record(result)
    }

    /// Fetch the next page; a no-op while loading or at the end of the list
    pub async fn load_more(&self) -> Result<usize> {
        {
            let status = self.status.borrow();
            if status.is_loading || status.is_loading_more {
                return Ok(0);
            }
        }
        if !self.cache.has_more() {
            return Ok(0);
        }

        self.status.send_modify(|s| {
            s.is_loading_more = true;
            s.error = None;
        });
        let result = self.cache.load_more().await;
        self.status.send_modify(|s| s.is_loading_more = false);
        self.record(result)
    }

    pub async fn save_recipe(&self, draft: Recipe) -> Result<Recipe> {
        let result = self.cache.save(draft).await;
        self.record(result)
    }

    pub async fn update_recipe(&self, recipe: Recipe) -> Result<Recipe> {
        let result = self.cache.update(recipe).await;
        self.record(result)
    }

    pub async fn delete_recipe(&self, id: &str) -> Result<()> {
        let result = self.cache.delete(id).await;
        self.record(result)
    }

    pub fn get_recipe(&self, id: &str) -> Option<Recipe> {
        self.cache.get_by_id(id)
    }

    /// Add the recipe to the named collection, or take it out if it is
    /// already there. Naming a collection that does not exist creates it.
    pub async fn toggle_collection(&self, id: &str, name: &str) -> Result<Recipe> {
        let name = name.trim();
        if name.is_empty() {
            return self.record(Err(RecipeError::validation("collection name must not be empty")));
        }
        let mut recipe = match self.cache.get_by_id(id) {
            Some(recipe) => recipe,
            None => return self.record(Err(RecipeError::not_found(id))),
        };

        if recipe.in_collection(name) {
            recipe.collections.retain(|c| c != name);
        } else {
            recipe.collections.push(name.to_string());
        }
        self.update_recipe(recipe).await
    }

    pub fn collections(&self) -> CollectionIndex {
        self.cache.collections()
    }

    /// Collection names for the "add to collection" picker
    pub fn available_collections(&self) -> Vec<String> {
        self.cache.collections().names()
    }

    pub fn clear_error(&self) {
        self.status.send_if_modified(|s| s.error.take().is_some());
    }

    /// Forget everything, e.g. after sign-out
    pub fn reset(&self) {
        info!("resetting recipe storage");
        self.cache.clear();
        *self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.status.send_replace(StorageStatus::default());
    }
}
