//! Remote recipe store
//!
//! `RecipeGateway` is the seam between the cache and the network. The
//! Supabase implementation talks to PostgREST and keeps no state of its own.

use async_trait::async_trait;
use recipe_sync_postgrest::{PostgrestClient, SortOrder};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{RecipeError, Result};
use crate::models::{RecipePatch, RecipeRow};
use crate::session::SessionProvider;

/// One page of rows, newest first
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListPage {
    pub rows: Vec<RecipeRow>,
    /// Whether the server believes more rows follow, when it can tell
    pub has_more_hint: Option<bool>,
}

/// Network operations on the user's recipe collection
#[async_trait]
pub trait RecipeGateway: Send + Sync {
    /// Page through the owner's recipes, newest first
    async fn list(&self, owner_id: &str, offset: usize, limit: usize) -> Result<ListPage>;

    /// Create a recipe and return the stored row with its server-assigned id
    async fn insert(&self, owner_id: &str, row: RecipeRow) -> Result<RecipeRow>;

    /// Patch an existing recipe owned by the caller
    async fn update(&self, id: &str, patch: RecipePatch) -> Result<()>;

    /// Delete a recipe owned by the caller
    async fn delete(&self, id: &str) -> Result<()>;
}

/// `RecipeGateway` backed by a Supabase table
pub struct SupabaseRecipeGateway {
    base_url: String,
    anon_key: String,
    table: String,
    http_client: Client,
    session: Arc<dyn SessionProvider>,
}

impl SupabaseRecipeGateway {
    pub fn new(config: &SyncConfig, http_client: Client, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            table: config.table.clone(),
            http_client,
            session,
        }
    }

    fn client(&self) -> Result<PostgrestClient> {
        let token = self
            .session
            .access_token()
            .ok_or_else(|| RecipeError::auth("Not logged in"))?;

        Ok(PostgrestClient::new(
            &self.base_url,
            &self.anon_key,
            &self.table,
            self.http_client.clone(),
        )
        .with_auth(&token)?)
    }

    // PATCH/DELETE with return=representation echo the affected rows; none
    // means the filter matched nothing the caller can see.
    fn ensure_affected(id: &str, representation: &Value) -> Result<()> {
        match representation {
            Value::Array(rows) if rows.is_empty() => Err(RecipeError::not_found(id)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecipeGateway for SupabaseRecipeGateway {
    async fn list(&self, owner_id: &str, offset: usize, limit: usize) -> Result<ListPage> {
        let rows = self
            .client()?
            .select("*")
            .eq("user_id", owner_id)
            .order("created_at", SortOrder::Descending)
            .offset(offset)
            .limit(limit)
            .execute::<RecipeRow>()
            .await?;

        debug!(offset, limit, fetched = rows.len(), "listed recipes");
        let has_more_hint = Some(rows.len() == limit);
        Ok(ListPage {
            rows,
            has_more_hint,
        })
    }

    async fn insert(&self, owner_id: &str, mut row: RecipeRow) -> Result<RecipeRow> {
        if row.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
            return Err(RecipeError::validation("title must not be empty"));
        }
        row.user_id = Some(owner_id.to_string());

        let created = self.client()?.insert(&row).await?;
        let created = match created {
            Value::Array(rows) => rows.into_iter().next(),
            row @ Value::Object(_) => Some(row),
            _ => None,
        }
        .ok_or_else(|| RecipeError::validation("insert returned no row"))?;

        Ok(serde_json::from_value::<RecipeRow>(created)?)
    }

    async fn update(&self, id: &str, patch: RecipePatch) -> Result<()> {
        let representation = self.client()?.eq("id", id).update(&patch).await?;
        Self::ensure_affected(id, &representation)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let representation = self.client()?.eq("id", id).delete().await?;
        Self::ensure_affected(id, &representation)
    }
}
