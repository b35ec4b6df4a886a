//! Paginated, optimistic recipe cache
//!
//! `RecipeCache` owns the materialized page window over the remote
//! collection. List operations share one in-flight guard: concurrent
//! refreshes join a single request, a load-more waits for a running refresh,
//! and a refresh supersedes a running load-more through the generation
//! counter. Mutations are applied to the window before the network call and
//! reconciled (or rolled back) when it settles.
//!
//! Network reconciliation runs on spawned tasks, so dropping the future of a
//! mutation does not leave the window in an optimistic state.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec;
use crate::collections::CollectionIndex;
use crate::config::CacheOptions;
use crate::error::{RecipeError, Result};
use crate::gateway::RecipeGateway;
use crate::models::{is_temp_id, new_temp_id, normalize_collections, Recipe};
use crate::session::SessionProvider;

type RefreshFuture = Shared<BoxFuture<'static, Result<Vec<Recipe>>>>;
type WriteTurn = Shared<BoxFuture<'static, ()>>;

/// The materialized slice of the remote collection, newest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageWindow {
    pub recipes: Vec<Recipe>,
    /// Offset of the next page on the server
    pub cursor: usize,
    pub has_more: bool,
}

impl PageWindow {
    pub fn position(&self, id: &str) -> Option<usize> {
        self.recipes
            .iter()
            .position(|r| r.id.as_deref() == Some(id))
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.iter().find(|r| r.id.as_deref() == Some(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn remove(&mut self, id: &str) -> Option<(usize, Recipe)> {
        let pos = self.position(id)?;
        Some((pos, self.recipes.remove(pos)))
    }

    fn replace(&mut self, id: &str, recipe: Recipe) -> bool {
        match self.position(id) {
            Some(pos) => {
                self.recipes[pos] = recipe;
                true
            }
            None => false,
        }
    }
}

/// What subscribers observe after every change to the window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    pub recipes: Vec<Recipe>,
    pub has_more: bool,
    /// Increases on every published change
    pub revision: u64,
}

enum ListGuard {
    Refresh { token: u64, future: RefreshFuture },
    LoadMore { token: u64 },
}

impl ListGuard {
    fn token(&self) -> u64 {
        match self {
            ListGuard::Refresh { token, .. } | ListGuard::LoadMore { token } => *token,
        }
    }
}

/// Bookkeeping for a recipe with writes in flight
struct MutationSlot {
    /// Last value the server acknowledged; what a failed write restores
    confirmed: Option<Recipe>,
    /// Sequence number of the most recently queued update
    latest: u64,
    outstanding: usize,
    deletes: usize,
    /// Completes when the last queued write has settled
    tail: Option<WriteTurn>,
}

impl MutationSlot {
    fn new(confirmed: Option<Recipe>) -> Self {
        Self {
            confirmed,
            latest: 0,
            outstanding: 0,
            deletes: 0,
            tail: None,
        }
    }

    /// Queue a write behind whatever is already queued for this id
    fn enqueue(&mut self) -> (Option<WriteTurn>, oneshot::Sender<()>) {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let turn = async move {
            let _ = done_rx.await;
        }
        .boxed()
        .shared();
        self.outstanding += 1;
        (self.tail.replace(turn), done_tx)
    }
}

/// A write the server confirmed while a list request was out
#[derive(Debug, Clone)]
enum Settled {
    Saved(Recipe),
    Updated(Recipe),
    Deleted,
}

#[derive(Debug, Clone)]
struct SettledWrite {
    seq: u64,
    change: Settled,
}

enum PageClaim {
    Wait(RefreshFuture),
    Fetch {
        ticket: ListTicket,
        generation: u64,
        issued_at: u64,
        offset: usize,
    },
}

struct FetchedPage {
    recipes: Vec<Recipe>,
    fetched: usize,
    has_more: bool,
}

struct CacheState {
    window: PageWindow,
    generation: u64,
    /// Bumped by `clear`; writes from an older session leave the window alone
    session: u64,
    next_token: u64,
    revision: u64,
    list_guard: Option<ListGuard>,
    mutations: HashMap<String, MutationSlot>,
    settle_seq: u64,
    settled: HashMap<String, SettledWrite>,
}

impl CacheState {
    fn take_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn in_flight_refresh(&self) -> Option<RefreshFuture> {
        match &self.list_guard {
            Some(ListGuard::Refresh { future, .. }) => Some(future.clone()),
            _ => None,
        }
    }

    fn release_list_guard(&mut self, token: u64) {
        if self.list_guard.as_ref().map(ListGuard::token) == Some(token) {
            self.list_guard = None;
        }
    }

    fn is_deleting(&self, id: &str) -> bool {
        self.mutations.get(id).map(|s| s.deletes > 0).unwrap_or(false)
    }

    /// Remember a confirmed write so list responses requested before it
    /// do not undo it
    fn record_settled(&mut self, id: &str, change: Settled) {
        if self.list_guard.is_none() {
            return;
        }
        self.settle_seq += 1;
        let change = match (self.settled.get(id).map(|w| &w.change), change) {
            (Some(Settled::Saved(_)), Settled::Updated(recipe)) => Settled::Saved(recipe),
            (_, change) => change,
        };
        self.settled.insert(
            id.to_string(),
            SettledWrite {
                seq: self.settle_seq,
                change,
            },
        );
    }

    fn settled_since(&self, id: &str, issued_at: u64) -> Option<&Settled> {
        self.settled
            .get(id)
            .filter(|w| w.seq > issued_at)
            .map(|w| &w.change)
    }

    fn prune_settled(&mut self) {
        if self.list_guard.is_none() {
            self.settled.clear();
        }
    }

    fn settle(&mut self, id: &str) {
        if let Some(slot) = self.mutations.get_mut(id) {
            slot.outstanding = slot.outstanding.saturating_sub(1);
            if slot.outstanding == 0 {
                self.mutations.remove(id);
            }
        }
    }

    /// Swap in a fresh first page requested at `issued_at`.
    ///
    /// Unconfirmed inserts stay on top, recipes with an update in flight
    /// keep their optimistic value and recipes being deleted stay hidden.
    /// Writes confirmed after the request went out are laid over the page.
    fn replace_window(&mut self, page: FetchedPage, issued_at: u64) {
        let mut recipes: Vec<Recipe> = self
            .window
            .recipes
            .iter()
            .filter(|r| r.is_pending())
            .cloned()
            .collect();
        let mut seen: HashSet<String> = recipes.iter().filter_map(|r| r.id.clone()).collect();
        let in_page: HashSet<&str> = page.recipes.iter().filter_map(|r| r.id.as_deref()).collect();
        let mut cursor = page.fetched;

        let mut saved: Vec<&SettledWrite> = self
            .settled
            .values()
            .filter(|w| w.seq > issued_at && matches!(w.change, Settled::Saved(_)))
            .collect();
        saved.sort_by(|a, b| b.seq.cmp(&a.seq));
        for write in saved {
            let Settled::Saved(recipe) = &write.change else { continue };
            let Some(id) = recipe.id.as_deref() else { continue };
            if !in_page.contains(id) && seen.insert(id.to_string()) {
                recipes.push(recipe.clone());
                cursor += 1;
            }
        }

        for recipe in &page.recipes {
            let Some(id) = recipe.id.clone() else { continue };
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(slot) = self.mutations.get(&id) {
                if slot.deletes == 0 {
                    recipes.push(self.window.get(&id).unwrap_or(recipe).clone());
                }
                continue;
            }
            match self.settled_since(&id, issued_at) {
                Some(Settled::Deleted) => cursor = cursor.saturating_sub(1),
                Some(Settled::Saved(local)) | Some(Settled::Updated(local)) => {
                    recipes.push(local.clone())
                }
                None => recipes.push(recipe.clone()),
            }
        }

        self.window = PageWindow {
            recipes,
            cursor,
            has_more: page.has_more,
        };
    }

    /// Append a following page requested at `issued_at`, skipping ids the
    /// window already holds
    fn append_page(&mut self, page: FetchedPage, issued_at: u64) -> usize {
        let mut seen: HashSet<String> = self
            .window
            .recipes
            .iter()
            .filter_map(|r| r.id.clone())
            .collect();
        let mut appended = Vec::new();
        let mut removed_since = 0;

        for recipe in page.recipes {
            let Some(id) = recipe.id.clone() else { continue };
            if self.is_deleting(&id) || seen.contains(&id) {
                continue;
            }
            match self.settled_since(&id, issued_at) {
                Some(Settled::Deleted) => {
                    removed_since += 1;
                    continue;
                }
                Some(Settled::Saved(local)) | Some(Settled::Updated(local)) => {
                    appended.push(local.clone())
                }
                None => appended.push(recipe),
            }
            seen.insert(id);
        }

        let count = appended.len();
        self.window.recipes.extend(appended);
        self.window.cursor = (self.window.cursor + page.fetched).saturating_sub(removed_since);
        self.window.has_more = page.has_more;
        count
    }
}

struct Inner {
    gateway: Arc<dyn RecipeGateway>,
    session: Arc<dyn SessionProvider>,
    options: CacheOptions,
    state: Mutex<CacheState>,
    snapshots: watch::Sender<Arc<WindowSnapshot>>,
}

/// Releases the list guard if the list operation is abandoned
struct ListTicket {
    inner: Arc<Inner>,
    token: u64,
    armed: bool,
}

impl ListTicket {
    fn new(inner: Arc<Inner>, token: u64) -> Self {
        Self {
            inner,
            token,
            armed: true,
        }
    }

    fn release(mut self, state: &mut CacheState) {
        state.release_list_guard(self.token);
        self.armed = false;
    }
}

impl Drop for ListTicket {
    fn drop(&mut self) {
        if self.armed {
            self.inner.lock().release_list_guard(self.token);
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Called with the state lock held so subscribers see changes in order.
    fn publish(&self, state: &mut CacheState) {
        state.revision += 1;
        self.snapshots.send_replace(Arc::new(WindowSnapshot {
            recipes: state.window.recipes.clone(),
            has_more: state.window.has_more,
            revision: state.revision,
        }));
    }

    fn owner(&self) -> Result<String> {
        self.session
            .current_owner_id()
            .ok_or_else(|| RecipeError::auth("Not logged in"))
    }

    /// Run a gateway call under the request timeout
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.options.request_timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => Err(RecipeError::network(format!(
                "request timed out after {:?}",
                limit
            ))),
        }
    }

    async fn fetch_page(&self, offset: usize) -> Result<FetchedPage> {
        let owner = self.owner()?;
        let limit = self.options.page_size;
        let page = self.call(self.gateway.list(&owner, offset, limit)).await?;

        let fetched = page.rows.len();
        let has_more = page.has_more_hint.unwrap_or(fetched == limit);
        let mut recipes = Vec::with_capacity(fetched);
        for row in page.rows {
            match codec::to_domain(row) {
                Ok(recipe) => recipes.push(recipe),
                Err(e) => warn!(offset, error = %e, "skipping undecodable recipe row"),
            }
        }

        Ok(FetchedPage {
            recipes,
            fetched,
            has_more,
        })
    }

    async fn run_refresh(
        self: Arc<Self>,
        ticket: ListTicket,
        generation: u64,
        issued_at: u64,
    ) -> Result<Vec<Recipe>> {
        let fetched = self.fetch_page(0).await;

        let mut state = self.lock();
        ticket.release(&mut state);

        let page = match fetched {
            Ok(page) => page,
            Err(e) => {
                state.prune_settled();
                warn!(error = %e, "refresh failed, keeping current window");
                return Err(e);
            }
        };

        if state.generation != generation {
            debug!(generation, current = state.generation, "discarding stale refresh");
            return Ok(state.window.recipes.clone());
        }

        state.replace_window(page, issued_at);
        state.prune_settled();
        self.publish(&mut state);
        debug!(
            len = state.window.recipes.len(),
            has_more = state.window.has_more,
            "window refreshed"
        );
        Ok(state.window.recipes.clone())
    }

    async fn finish_insert(
        self: Arc<Self>,
        owner: String,
        draft: Recipe,
        temp_id: String,
        session: u64,
    ) -> Result<Recipe> {
        let payload = codec::to_insert_payload(&draft, &owner);
        let result = self
            .call(self.gateway.insert(&owner, payload))
            .await
            .and_then(codec::to_domain);

        let mut state = self.lock();
        let placeholder = state
            .window
            .position(&temp_id)
            .filter(|_| state.session == session);

        let outcome = match result {
            Ok(saved) => {
                let saved_id = saved.id.clone().unwrap_or_default();
                match placeholder {
                    // a refresh already brought the stored row in
                    Some(pos) if state.window.contains(&saved_id) => {
                        state.window.recipes.remove(pos);
                    }
                    Some(pos) => {
                        state.window.recipes[pos] = saved.clone();
                        state.window.cursor += 1;
                        state.record_settled(&saved_id, Settled::Saved(saved.clone()));
                    }
                    None => debug!(temp_id = %temp_id, "placeholder gone before insert settled"),
                }
                info!(recipe_id = %saved_id, "recipe saved");
                Ok(saved)
            }
            Err(e) => {
                if let Some(pos) = placeholder {
                    state.window.recipes.remove(pos);
                }
                warn!(temp_id = %temp_id, error = %e, "insert failed, placeholder removed");
                Err(e)
            }
        };

        self.publish(&mut state);
        outcome
    }

    async fn finish_update(
        self: Arc<Self>,
        id: String,
        recipe: Recipe,
        seq: u64,
        session: u64,
        previous: Option<WriteTurn>,
        done: oneshot::Sender<()>,
    ) -> Result<Recipe> {
        if let Some(previous) = previous {
            previous.await;
        }

        let result = self
            .call(self.gateway.update(&id, codec::to_update_payload(&recipe)))
            .await;

        let mut state = self.lock();
        if state.session != session {
            drop(state);
            let _ = done.send(());
            return result.map(|()| recipe);
        }

        let outcome = match result {
            Ok(()) => {
                if let Some(slot) = state.mutations.get_mut(&id) {
                    slot.confirmed = Some(recipe.clone());
                }
                state.record_settled(&id, Settled::Updated(recipe.clone()));
                Ok(recipe)
            }
            Err(RecipeError::NotFound(msg)) => {
                warn!(recipe_id = %id, "recipe vanished on the server, dropping it");
                if state.window.remove(&id).is_some() {
                    state.window.cursor = state.window.cursor.saturating_sub(1);
                }
                state.record_settled(&id, Settled::Deleted);
                Err(RecipeError::NotFound(msg))
            }
            Err(e) => {
                let restore = state
                    .mutations
                    .get(&id)
                    .filter(|slot| slot.latest == seq)
                    .and_then(|slot| slot.confirmed.clone());
                if let Some(confirmed) = restore {
                    state.window.replace(&id, confirmed);
                }
                warn!(recipe_id = %id, error = %e, "update failed");
                Err(e)
            }
        };

        state.settle(&id);
        self.publish(&mut state);
        drop(state);
        let _ = done.send(());
        outcome
    }

    async fn finish_delete(
        self: Arc<Self>,
        id: String,
        removed_at: Option<usize>,
        session: u64,
        previous: Option<WriteTurn>,
        done: oneshot::Sender<()>,
    ) -> Result<()> {
        if let Some(previous) = previous {
            previous.await;
        }

        let result = match self.call(self.gateway.delete(&id)).await {
            Err(RecipeError::NotFound(_)) => {
                debug!(recipe_id = %id, "already deleted on the server");
                Ok(())
            }
            other => other,
        };

        let mut state = self.lock();
        if state.session != session {
            drop(state);
            let _ = done.send(());
            return result;
        }

        let restore = state.mutations.get_mut(&id).and_then(|slot| {
            slot.deletes = slot.deletes.saturating_sub(1);
            slot.confirmed.clone()
        });

        match &result {
            Ok(()) => {
                if removed_at.is_some() {
                    state.window.cursor = state.window.cursor.saturating_sub(1);
                }
                state.record_settled(&id, Settled::Deleted);
                info!(recipe_id = %id, "recipe deleted");
            }
            Err(e) => {
                if let (Some(index), Some(recipe)) = (removed_at, restore) {
                    if !state.window.contains(&id) {
                        let at = index.min(state.window.recipes.len());
                        state.window.recipes.insert(at, recipe);
                    }
                }
                warn!(recipe_id = %id, error = %e, "delete failed, recipe restored");
            }
        }

        state.settle(&id);
        self.publish(&mut state);
        drop(state);
        let _ = done.send(());
        result
    }
}

async fn join<T>(handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .map_err(|e| RecipeError::network(format!("background task failed: {}", e)))?
}

/// In-memory paginated window over the user's recipes
#[derive(Clone)]
pub struct RecipeCache {
    inner: Arc<Inner>,
}

impl RecipeCache {
    pub fn new(
        gateway: Arc<dyn RecipeGateway>,
        session: Arc<dyn SessionProvider>,
        options: CacheOptions,
    ) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(WindowSnapshot::default()));
        let state = CacheState {
            window: PageWindow::default(),
            generation: 0,
            session: 0,
            next_token: 0,
            revision: 0,
            list_guard: None,
            mutations: HashMap::new(),
            settle_seq: 0,
            settled: HashMap::new(),
        };

        Self {
            inner: Arc::new(Inner {
                gateway,
                session,
                options,
                state: Mutex::new(state),
                snapshots,
            }),
        }
    }

    pub fn options(&self) -> CacheOptions {
        self.inner.options
    }

    /// Replace the window with the first page.
    ///
    /// A refresh that is already running is joined instead of issuing a
    /// second request; every caller receives the same window. On failure the
    /// current window is left as it was.
    pub async fn refresh(&self) -> Result<Vec<Recipe>> {
        let future = {
            let mut state = self.inner.lock();
            match state.in_flight_refresh() {
                Some(future) => {
                    debug!("joining in-flight refresh");
                    future
                }
                None => {
                    if state.list_guard.is_some() {
                        debug!("refresh supersedes in-flight load-more");
                    }
                    state.generation += 1;
                    let generation = state.generation;
                    let issued_at = state.settle_seq;
                    let token = state.take_token();
                    let ticket = ListTicket::new(self.inner.clone(), token);
                    let future = self
                        .inner
                        .clone()
                        .run_refresh(ticket, generation, issued_at)
                        .boxed()
                        .shared();
                    state.list_guard = Some(ListGuard::Refresh {
                        token,
                        future: future.clone(),
                    });
                    future
                }
            }
        };

        future.await
    }

    /// Wait for the refresh that is running, if there is one
    pub async fn wait_for_refresh(&self) -> Option<Result<Vec<Recipe>>> {
        let future = self.inner.lock().in_flight_refresh()?;
        Some(future.await)
    }

    /// Fetch the next page and append the recipes not already shown.
    ///
    /// Returns the number of recipes appended. Does nothing when there are no
    /// more pages or another load-more is running; waits for a running
    /// refresh first and then decides again.
    pub async fn load_more(&self) -> Result<usize> {
        loop {
            let next = {
                let mut state = self.inner.lock();
                match state.in_flight_refresh() {
                    Some(refresh) => PageClaim::Wait(refresh),
                    None if state.list_guard.is_some() || !state.window.has_more => {
                        return Ok(0);
                    }
                    None => {
                        let token = state.take_token();
                        state.list_guard = Some(ListGuard::LoadMore { token });
                        PageClaim::Fetch {
                            ticket: ListTicket::new(self.inner.clone(), token),
                            generation: state.generation,
                            issued_at: state.settle_seq,
                            offset: state.window.cursor,
                        }
                    }
                }
            };

            let (ticket, generation, issued_at, offset) = match next {
                PageClaim::Fetch {
                    ticket,
                    generation,
                    issued_at,
                    offset,
                } => (ticket, generation, issued_at, offset),
                PageClaim::Wait(refresh) => {
                    debug!("load-more waiting for in-flight refresh");
                    let _ = refresh.await;
                    continue;
                }
            };

            let fetched = self.inner.fetch_page(offset).await;

            let mut state = self.inner.lock();
            ticket.release(&mut state);
            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    state.prune_settled();
                    return Err(e);
                }
            };

            if state.generation != generation {
                debug!(offset, "discarding page from before the last refresh");
                return Ok(0);
            }

            let appended = state.append_page(page, issued_at);
            state.prune_settled();
            self.inner.publish(&mut state);
            debug!(offset, appended, cursor = state.window.cursor, "page appended");
            return Ok(appended);
        }
    }

    /// Persist a draft.
    ///
    /// The draft shows up at the top of the window immediately under a
    /// temporary id; once the server answers it is swapped for the stored
    /// row in place, or removed again if the insert failed.
    pub async fn save(&self, draft: Recipe) -> Result<Recipe> {
        if draft.id.is_some() {
            return Err(RecipeError::validation(
                "recipe already has an id, update it instead",
            ));
        }
        draft.validate_for_save()?;
        let owner = self.inner.owner()?;
        let temp_id = new_temp_id();

        let session = {
            let mut state = self.inner.lock();
            let mut placeholder = draft.clone();
            placeholder.id = Some(temp_id.clone());
            placeholder.collections = normalize_collections(&placeholder.collections);
            placeholder.created_at.get_or_insert_with(Utc::now);
            state.window.recipes.insert(0, placeholder);
            self.inner.publish(&mut state);
            state.session
        };

        let inner = self.inner.clone();
        join(tokio::spawn(
            inner.finish_insert(owner, draft, temp_id, session),
        ))
        .await
    }

    /// Apply new field values to a recipe in the window.
    ///
    /// Only the editable fields (those an update payload carries) change;
    /// the rest keep the value already in the window. The change is visible
    /// immediately. Writes for the same id go out one at a time in call
    /// order; if a write fails and no later update is queued, the recipe
    /// reverts to the last value the server accepted.
    pub async fn update(&self, recipe: Recipe) -> Result<Recipe> {
        let id = recipe
            .id
            .clone()
            .ok_or_else(|| RecipeError::validation("cannot update a recipe that was never saved"))?;
        if is_temp_id(&id) {
            return Err(RecipeError::validation("recipe is still being saved"));
        }
        recipe.validate_for_save()?;
        self.inner.owner()?;

        let (updated, seq, session, previous, done) = {
            let mut state = self.inner.lock();
            let pos = state
                .window
                .position(&id)
                .ok_or_else(|| RecipeError::not_found(&id))?;

            let mut updated = state.window.recipes[pos].clone();
            codec::apply_patch(&mut updated, codec::to_update_payload(&recipe));
            let before = std::mem::replace(&mut state.window.recipes[pos], updated.clone());

            let slot = state
                .mutations
                .entry(id.clone())
                .or_insert_with(|| MutationSlot::new(Some(before)));
            slot.latest += 1;
            let seq = slot.latest;
            let (previous, done) = slot.enqueue();

            self.inner.publish(&mut state);
            (updated, seq, state.session, previous, done)
        };

        let inner = self.inner.clone();
        join(tokio::spawn(
            inner.finish_update(id, updated, seq, session, previous, done),
        ))
        .await
    }

    /// Remove a recipe.
    ///
    /// It disappears from the window before the request is sent and comes
    /// back at its old position if the server rejects the delete. A recipe
    /// the server no longer has counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if is_temp_id(id) {
            return Err(RecipeError::validation("recipe is still being saved"));
        }
        self.inner.owner()?;

        let (removed_at, session, previous, done) = {
            let mut state = self.inner.lock();
            let removed = state.window.remove(id);
            let removed_at = removed.as_ref().map(|(pos, _)| *pos);

            let slot = state
                .mutations
                .entry(id.to_string())
                .or_insert_with(|| MutationSlot::new(removed.map(|(_, recipe)| recipe)));
            slot.deletes += 1;
            let (previous, done) = slot.enqueue();

            self.inner.publish(&mut state);
            (removed_at, state.session, previous, done)
        };

        let inner = self.inner.clone();
        join(tokio::spawn(inner.finish_delete(
            id.to_string(),
            removed_at,
            session,
            previous,
            done,
        )))
        .await
    }

    /// Look a recipe up in the window.
    ///
    /// Never touches the network: a recipe outside the loaded pages is not
    /// found until `refresh` or `load_more` brings it in.
    pub fn get_by_id(&self, id: &str) -> Option<Recipe> {
        self.inner.lock().window.get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Recipe> {
        self.inner.lock().window.recipes.clone()
    }

    pub fn window(&self) -> PageWindow {
        self.inner.lock().window.clone()
    }

    pub fn has_more(&self) -> bool {
        self.inner.lock().window.has_more
    }

    pub fn len(&self) -> usize {
        self.inner.lock().window.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Group the current window by collection
    pub fn collections(&self) -> CollectionIndex {
        CollectionIndex::build(&self.inner.lock().window.recipes)
    }

    /// Receive a snapshot after every change to the window
    pub fn subscribe(&self) -> watch::Receiver<Arc<WindowSnapshot>> {
        self.inner.snapshots.subscribe()
    }

    /// Drop the window, e.g. on sign-out.
    ///
    /// List responses and writes still in flight are ignored when they
    /// settle, and the next `refresh` issues a new request.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.session += 1;
        state.list_guard = None;
        state.mutations.clear();
        state.settled.clear();
        state.window = PageWindow::default();
        self.inner.publish(&mut state);
    }
}
