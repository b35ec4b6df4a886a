#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use recipe_sync::cache::RecipeCache;
use recipe_sync::config::CacheOptions;
use recipe_sync::error::{RecipeError, Result};
use recipe_sync::gateway::{ListPage, RecipeGateway};
use recipe_sync::models::{RecipePatch, RecipeRow};
use recipe_sync::session::{Session, SessionStore};

pub const OWNER: &str = "owner-1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Insert,
    Update,
    Delete,
}

/// In-memory `user_recipes` table with call counters, failure injection
/// and gates that hold requests until the test lets them through
#[derive(Default)]
pub struct FakeGateway {
    rows: Mutex<Vec<RecipeRow>>,
    calls: Mutex<HashMap<Op, usize>>,
    failures: Mutex<HashMap<Op, VecDeque<RecipeError>>>,
    gates: Mutex<HashMap<Op, Arc<Semaphore>>>,
    updates: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
    read_on_arrival: AtomicBool,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `count` rows owned by `OWNER`, ids `r-0`.. with `r-0` the newest
    pub fn seeded(count: usize) -> Arc<Self> {
        let gateway = Self::new();
        {
            let mut rows = gateway.rows.lock().unwrap();
            for i in 0..count {
                rows.push(row(&format!("r-{}", i), &format!("Recipe {}", i), i));
            }
        }
        gateway
    }

    pub fn push_front(&self, row: RecipeRow) {
        self.rows.lock().unwrap().insert(0, row);
    }

    /// Drop a row behind the cache's back
    pub fn remove(&self, id: &str) {
        self.rows.lock().unwrap().retain(|r| r.id.as_deref() != Some(id));
    }

    /// Make list calls read the table when they arrive rather than when
    /// they are let through, like a database answering a query that is
    /// slow to travel back
    pub fn read_lists_on_arrival(&self) {
        self.read_on_arrival.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<RecipeRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn find(&self, id: &str) -> Option<RecipeRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .cloned()
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().unwrap().get(&op).copied().unwrap_or(0)
    }

    /// Titles sent by update calls, in the order they reached the server
    pub fn update_log(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn fail_next(&self, op: Op, error: RecipeError) {
        self.failures
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Hold every following `op` call until `release` lets it through
    pub fn hold(&self, op: Op) {
        self.gates
            .lock()
            .unwrap()
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, op: Op, calls: usize) {
        if let Some(gate) = self.gates.lock().unwrap().get(&op) {
            gate.add_permits(calls);
        }
    }

    fn page(&self, owner_id: &str, offset: usize, limit: usize) -> Vec<RecipeRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id.as_deref() == Some(owner_id))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    async fn enter(&self, op: Op) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;

        let gate = self.gates.lock().unwrap().get(&op).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(&op)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RecipeGateway for FakeGateway {
    async fn list(&self, owner_id: &str, offset: usize, limit: usize) -> Result<ListPage> {
        let early = if self.read_on_arrival.load(Ordering::SeqCst) {
            Some(self.page(owner_id, offset, limit))
        } else {
            None
        };
        self.enter(Op::List).await?;
        let rows = match early {
            Some(rows) => rows,
            None => self.page(owner_id, offset, limit),
        };
        Ok(ListPage {
            rows,
            has_more_hint: None,
        })
    }

    async fn insert(&self, owner_id: &str, mut row: RecipeRow) -> Result<RecipeRow> {
        self.enter(Op::Insert).await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        row.id = Some(format!("srv-{}", n));
        row.user_id = Some(owner_id.to_string());
        row.created_at = Some(Utc::now().to_rfc3339());
        self.push_front(row.clone());
        Ok(row)
    }

    async fn update(&self, id: &str, patch: RecipePatch) -> Result<()> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), patch.title.clone()));
        self.enter(Op::Update).await?;

        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| RecipeError::not_found(id))?;
        row.title = Some(patch.title);
        row.description = Some(patch.description);
        row.ingredients = Some(patch.ingredients);
        row.steps = Some(patch.steps);
        row.tips = patch.tips;
        row.image_url = patch.image_url;
        row.collections = Some(patch.collections);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.enter(Op::Delete).await?;

        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.id.as_deref() != Some(id));
        if rows.len() == before {
            return Err(RecipeError::not_found(id));
        }
        Ok(())
    }
}

/// A stored row; larger `age` means older
pub fn row(id: &str, title: &str, age: usize) -> RecipeRow {
    let created = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        - ChronoDuration::minutes(age as i64);
    RecipeRow {
        id: Some(id.to_string()),
        user_id: Some(OWNER.to_string()),
        title: Some(title.to_string()),
        created_at: Some(created.to_rfc3339()),
        ..Default::default()
    }
}

pub fn signed_in() -> Arc<SessionStore> {
    Arc::new(SessionStore::with_session(Session::new(
        "token-1", "refresh-1", OWNER, 3600,
    )))
}

pub fn cache_with(gateway: &Arc<FakeGateway>, page_size: usize) -> RecipeCache {
    cache_with_session(gateway, page_size, signed_in())
}

pub fn cache_with_session(
    gateway: &Arc<FakeGateway>,
    page_size: usize,
    session: Arc<SessionStore>,
) -> RecipeCache {
    let options = CacheOptions {
        page_size,
        ..CacheOptions::default()
    };
    RecipeCache::new(gateway.clone(), session, options)
}

pub fn ids(cache: &RecipeCache) -> Vec<String> {
    cache
        .snapshot()
        .into_iter()
        .filter_map(|r| r.id)
        .collect()
}

/// Give spawned tasks a chance to reach their next await point
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
