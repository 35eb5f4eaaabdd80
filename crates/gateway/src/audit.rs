//! Audit Registry: key→record store correlating PROPOSE with OBSERVE/FAIL
//! (spec.md §4.5), plus the CONSISTENCY_MISMATCH counter that resolves
//! spec.md §9 Open Question #2 (SPEC_FULL.md §C.2).
//!
//! Two backends behind one trait, exactly as `_AuditRegistry` in
//! `virtual_segment_manager.py` picks Redis-or-dict at construction time:
//! a durable Redis-backed store (TTL-bounded, survives restart) and an
//! in-memory FIFO-bounded fallback used in development or when the durable
//! backend is unreachable. Backend-specific errors never reach the caller —
//! a durable-backend failure silently downgrades to in-memory, logged once
//! at WARN per failing call.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use vsm_domain::policy::Ring;

const MEMORY_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRecord {
    pub workflow_id: String,
    pub action: String,
    pub action_params: serde_json::Value,
    pub thought: String,
    pub ring_level: i64,
    pub loop_index: u64,
    pub proposed_at: i64,
}

#[async_trait]
pub trait AuditBackend: Send + Sync {
    /// Returns whether the write was actually persisted. `AuditRegistry`
    /// only falls through to its in-memory store on `false`.
    async fn set(&self, key: &str, record: ProposedRecord) -> bool;
    async fn get(&self, key: &str) -> Option<ProposedRecord>;
    async fn pop(&self, key: &str) -> Option<ProposedRecord>;
    fn name(&self) -> &'static str;
    fn memory_size(&self) -> usize;
}

/// Insertion-ordered, FIFO-bounded in-memory backend. No `indexmap`
/// dependency is carried for this, so FIFO order is tracked explicitly with
/// a `VecDeque` of keys alongside the `HashMap` — mirroring the original's
/// reliance on Python 3.7+ dict insertion order (`next(iter(dict))`
/// eviction).
pub struct MemoryBackend {
    inner: Mutex<MemoryInner>,
}

struct MemoryInner {
    map: HashMap<String, ProposedRecord>,
    order: VecDeque<String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self { inner: Mutex::new(MemoryInner { map: HashMap::new(), order: VecDeque::new() }) }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditBackend for MemoryBackend {
    async fn set(&self, key: &str, record: ProposedRecord) -> bool {
        let mut inner = self.inner.lock();
        if !inner.map.contains_key(key) {
            if inner.order.len() >= MEMORY_CAP {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.map.remove(&oldest);
                    tracing::debug!(key = %oldest, "audit registry evicted oldest entry");
                }
            }
            inner.order.push_back(key.to_string());
        }
        inner.map.insert(key.to_string(), record);
        true
    }

    async fn get(&self, key: &str) -> Option<ProposedRecord> {
        self.inner.lock().map.get(key).cloned()
    }

    async fn pop(&self, key: &str) -> Option<ProposedRecord> {
        let mut inner = self.inner.lock();
        let record = inner.map.remove(key);
        if record.is_some() {
            inner.order.retain(|k| k != key);
        }
        record
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn memory_size(&self) -> usize {
        self.inner.lock().map.len()
    }
}

/// Durable backend over an external TTL-capable KV store (Redis). Any
/// connection/command error is swallowed here and surfaced as a `false`/
/// `None` return — `AuditRegistry` is the layer that logs it and falls back
/// to `MemoryBackend`, not this type.
pub struct RedisBackend {
    client: redis::Client,
    ttl_seconds: u64,
}

impl RedisBackend {
    /// Opens the client and confirms the connection is actually live with a
    /// `PING` before accepting it as the durable backend — a syntactically
    /// valid but unreachable URL must not be reported as healthy.
    pub async fn connect(url: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client, ttl_seconds })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl AuditBackend for RedisBackend {
    async fn set(&self, key: &str, record: ProposedRecord) -> bool {
        let Ok(mut conn) = self.conn().await else { return false };
        let Ok(body) = serde_json::to_string(&record) else { return false };
        redis::cmd("SETEX")
            .arg(format!("audit:{key}"))
            .arg(self.ttl_seconds)
            .arg(body)
            .query_async::<_, ()>(&mut conn)
            .await
            .is_ok()
    }

    async fn get(&self, key: &str) -> Option<ProposedRecord> {
        let mut conn = self.conn().await.ok()?;
        let body: Option<String> =
            redis::cmd("GET").arg(format!("audit:{key}")).query_async(&mut conn).await.ok()?;
        body.and_then(|b| serde_json::from_str(&b).ok())
    }

    async fn pop(&self, key: &str) -> Option<ProposedRecord> {
        let record = self.get(key).await;
        if record.is_some() {
            if let Ok(mut conn) = self.conn().await {
                let _: Result<(), _> =
                    redis::cmd("DEL").arg(format!("audit:{key}")).query_async(&mut conn).await;
            }
        }
        record
    }

    fn name(&self) -> &'static str {
        "redis"
    }

    fn memory_size(&self) -> usize {
        0
    }
}

/// Wraps the selected backend, falls back to an in-memory store per-call on
/// durable-backend failure, and tracks CONSISTENCY_MISMATCH counts per
/// workflow (SPEC_FULL.md §C.2).
pub struct AuditRegistry {
    durable: Option<Box<dyn AuditBackend>>,
    fallback: MemoryBackend,
    mismatch_counts: Mutex<HashMap<String, u32>>,
    mismatch_threshold: u32,
    demoted_workflows: Mutex<HashMap<String, ()>>,
}

impl AuditRegistry {
    pub fn new(durable: Option<Box<dyn AuditBackend>>, mismatch_threshold: u32) -> Self {
        Self {
            durable,
            fallback: MemoryBackend::new(),
            mismatch_counts: Mutex::new(HashMap::new()),
            mismatch_threshold,
            demoted_workflows: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.durable.as_ref().map(|d| d.name()).unwrap_or("memory")
    }

    pub fn memory_size(&self) -> usize {
        self.fallback.memory_size()
    }

    pub async fn set(&self, key: &str, record: ProposedRecord) {
        if let Some(durable) = &self.durable {
            if durable.set(key, record.clone()).await {
                return;
            }
            tracing::warn!(key, "durable audit backend write failed, falling back to memory");
        }
        self.fallback.set(key, record).await;
    }

    pub async fn pop(&self, key: &str) -> Option<ProposedRecord> {
        if let Some(durable) = &self.durable {
            if let Some(record) = durable.pop(key).await {
                self.fallback.pop(key).await;
                return Some(record);
            }
        }
        self.fallback.pop(key).await
    }

    /// Record a CONSISTENCY_MISMATCH for `workflow_id`; returns whether the
    /// cumulative count has now crossed `mismatch_threshold` (ring demotion
    /// trigger).
    pub fn record_mismatch(&self, workflow_id: &str) -> (u32, bool) {
        let mut counts = self.mismatch_counts.lock();
        let count = counts.entry(workflow_id.to_string()).or_insert(0);
        *count += 1;
        let crossed = *count >= self.mismatch_threshold;
        if crossed {
            self.demoted_workflows.lock().insert(workflow_id.to_string(), ());
        }
        (*count, crossed)
    }

    /// Demote `ring` by one level (floor KERNEL) if `workflow_id` has
    /// crossed the mismatch threshold; otherwise return `ring` unchanged.
    pub fn effective_ring(&self, workflow_id: &str, ring: Ring) -> Ring {
        if self.demoted_workflows.lock().contains_key(workflow_id) {
            Ring::from_int((ring.as_u8() as i64 + 1).min(Ring::User.as_u8() as i64))
        } else {
            ring
        }
    }

    pub fn clear_workflow(&self, workflow_id: &str) {
        self.mismatch_counts.lock().remove(workflow_id);
        self.demoted_workflows.lock().remove(workflow_id);
    }
}
