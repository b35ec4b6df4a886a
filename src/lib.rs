//! Recipe Sync
//!
//! A local cache of the signed-in user's recipes, kept in sync with a
//! Supabase `user_recipes` table. The cache pages through the remote
//! collection newest first, applies saves, updates and deletes optimistically
//! and rolls them back when the server disagrees.

pub mod cache;
pub mod codec;
pub mod collections;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod models;
pub mod session;

use reqwest::Client;
use std::sync::Arc;
use tracing::debug;

use crate::cache::RecipeCache;
use crate::config::{CacheOptions, SyncConfig};
use crate::controller::RecipeStorageController;
use crate::error::{RecipeError, Result};
use crate::gateway::SupabaseRecipeGateway;
use crate::session::SessionProvider;

/// Wire a controller to a Supabase project
///
/// # Example
///
/// ```no_run
/// use recipe_sync::{connect, config::SyncConfig, session::{Session, SessionStore}};
/// use std::sync::Arc;
///
/// # async fn run() -> recipe_sync::error::Result<()> {
/// let config = SyncConfig::from_env()?;
/// let session = SessionStore::with_session(Session::new("jwt", "refresh", "user-id", 3600));
/// let storage = connect(config, Arc::new(session))?;
///
/// let recipes = storage.refresh_recipes().await?;
/// println!("{} recipes", recipes.len());
/// # Ok(())
/// # }
/// ```
pub fn connect(
    config: SyncConfig,
    session: Arc<dyn SessionProvider>,
) -> Result<RecipeStorageController> {
    let http_client = Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| RecipeError::config(format!("failed to build HTTP client: {}", e)))?;

    debug!(url = config.base_url(), table = %config.table, "connecting recipe storage");

    let gateway = SupabaseRecipeGateway::new(&config, http_client, session.clone());
    let cache = RecipeCache::new(Arc::new(gateway), session, CacheOptions::from(&config));
    Ok(RecipeStorageController::new(cache, config.refresh_debounce))
}

/// Re-exports of the commonly used types
pub mod prelude {
    pub use crate::cache::RecipeCache;
    pub use crate::collections::{CollectionIndex, SortKey, ALL_RECIPES};
    pub use crate::config::SyncConfig;
    pub use crate::connect;
    pub use crate::controller::{RecipeStorageController, StorageState};
    pub use crate::error::{RecipeError, Result};
    pub use crate::models::{Difficulty, Ingredient, Recipe, Step};
    pub use crate::session::{Session, SessionProvider, SessionStore};
}
