//! Vector store contract and two implementations:
//!
//! - [`PgVectorStore`] — the real adapter, backed by `sqlx::PgPool` and the
//!   `pgvector` crate, talking to a Postgres table with a `vector(768)`
//!   column under the `<=>` cosine-distance operator.
//! - [`MemoryStore`] — an in-memory brute-force implementation used by the
//!   test suite: scores every eligible row directly instead of querying a
//!   real index.
//!
//! Both satisfy the same eligibility predicate (`embedding present AND
//! displayable`) and the same `id != focalId AND id NOT IN excludes` filter,
//! so candidate pool acquisition (`sampler.rs`/`coordinator.rs`) never needs
//! to know which implementation it's talking to.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::numeric::{cosine_similarity, Mulberry32};

/// Opaque, pass-through display fields: the core never inspects these, it
/// only carries them from store to response. Modeled as a closed struct
/// rather than an untyped map since the projected column set is fully known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Display {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub object_id: Option<String>,
    pub image_url_local: Option<String>,
    pub image_url_small: Option<String>,
    pub image_url_original: Option<String>,
}

impl Display {
    /// Priority selection: local -> small -> original, alongside the
    /// matching `imageSource` tag.
    pub fn image_url_and_source(&self) -> (Option<&str>, Option<&'static str>) {
        if let Some(u) = self.image_url_local.as_deref().filter(|s| !s.is_empty()) {
            return (Some(u), Some("s3"));
        }
        if let Some(u) = self.image_url_small.as_deref().filter(|s| !s.is_empty()) {
            return (Some(u), Some("met_small"));
        }
        if let Some(u) = self
            .image_url_original
            .as_deref()
            .filter(|s| !s.is_empty())
        {
            return (Some(u), Some("met_original"));
        }
        (None, None)
    }
}

/// The artwork record as the core projects it. The underlying row carries
/// more metadata; everything beyond `id`, `embedding`, `displayable`, and
/// the display fields is opaque here.
#[derive(Debug, Clone)]
pub struct ArtworkRecord {
    pub id: i32,
    pub embedding: Option<Vec<f32>>,
    /// Derived from the presence of a non-empty local image URL upstream;
    /// the core receives it as a plain bool, not a column to recompute.
    pub displayable: bool,
    pub display: Display,
}

impl ArtworkRecord {
    /// Invariant: eligible iff embedding present AND displayable.
    pub fn eligible(&self) -> bool {
        self.embedding.is_some() && self.displayable
    }
}

/// Which of the three candidate pools an item was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Sim,
    Drift,
    Rand,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Sim => "sim",
            Source::Drift => "drift",
            Source::Rand => "rand",
        }
    }
}

/// A single item retrieved from one of the three pools, before the mixture
/// sampler tags it with its source pool (the query site already knows which
/// pool it's populating, so the tag is attached by the caller).
#[derive(Debug, Clone)]
pub struct PoolItem {
    pub id: i32,
    /// `1 - cosine_distance`, present for tight/drift, `None` for random.
    pub similarity: Option<f32>,
    pub display: Display,
}

/// An acquired, already-tagged candidate pool, ready for the mixture sampler.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    pub items: Vec<PoolItem>,
}

impl CandidatePool {
    /// Returns a logically-rotated view starting at `offset`:
    /// `[offset, offset+1, ..., n-1, 0, 1, ..., offset-1]`. Uses index
    /// arithmetic rather than physically rotating the backing vec.
    pub fn rotated_order(&self, offset: usize) -> Vec<usize> {
        let n = self.items.len();
        if n == 0 {
            return Vec::new();
        }
        let offset = offset % n;
        (0..n).map(|i| (offset + i) % n).collect()
    }
}

/// The vector-store contract consumed by candidate pool acquisition.
/// `#[async_trait]` because the engine needs this behind an
/// `Arc<dyn VectorStore>` trait object shared across concurrent requests
/// (native `async fn` in traits is not yet object-safe that way).
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Looks up the focal artwork. Returns `Ok(None)` for a missing or
    /// ineligible row — the coordinator turns that into `TargetNotFound`.
    async fn fetch_focal(&self, focal_id: i32) -> EngineResult<Option<ArtworkRecord>>;

    /// Tight pool: nearest neighbors of `query` under cosine distance,
    /// ascending, excluding `exclude`, eligibility-filtered, size-capped at
    /// `limit`.
    async fn query_tight(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>>;

    /// Drift pool: same shape as `query_tight`, around the drifted query
    /// vector `v'`.
    async fn query_drift(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>>;

    /// Random pool: seeded pseudo-random ordering (folded chunk seed -> the
    /// store's native `[0,1)` seed space), tie-broken by `id` ascending,
    /// excluding `exclude`, eligibility-filtered, size-capped at `limit`.
    /// `similarity` is always `None` on the returned items.
    async fn query_random(
        &self,
        store_seed: f64,
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>>;
}

/// Fisher-Yates shuffle driven by the same `mulberry32` PRNG as the rest of
/// the engine (never `rand`), for stores whose native query layer lacks a
/// seeded randomization primitive. Rows are sorted by `id` ascending first
/// so the pre-shuffle order matches the documented `ORDER BY random(), id
/// ASC` tie-break baseline, then the shuffle is applied to that order.
pub fn shuffle_fallback(mut rows: Vec<(i32, Display)>, store_seed: f64) -> Vec<PoolItem> {
    rows.sort_by_key(|(id, _)| *id);
    let seed = (store_seed * 4_294_967_296.0) as u32;
    let mut rng = Mulberry32::new(seed);
    let n = rows.len();
    for i in (1..n).rev() {
        let j = (rng.next_f64() * (i as f64 + 1.0)) as usize;
        rows.swap(i, j.min(i));
    }
    rows.into_iter()
        .map(|(id, display)| PoolItem {
            id,
            similarity: None,
            display,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// In-memory implementation — test fixture, brute-force cosine search.
// ---------------------------------------------------------------------------

/// Brute-force, in-process `VectorStore`: scores every eligible record's
/// embedding by cosine similarity, sorts, and takes the top `limit`.
pub struct MemoryStore {
    records: Vec<ArtworkRecord>,
}

impl MemoryStore {
    pub fn new(records: Vec<ArtworkRecord>) -> Self {
        Self { records }
    }

    fn eligible_excluding<'a>(
        &'a self,
        exclude: &'a HashSet<i32>,
    ) -> impl Iterator<Item = &'a ArtworkRecord> {
        self.records
            .iter()
            .filter(move |r| r.eligible() && !exclude.contains(&r.id))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn fetch_focal(&self, focal_id: i32) -> EngineResult<Option<ArtworkRecord>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.id == focal_id && r.eligible())
            .cloned())
    }

    async fn query_tight(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        cosine_ranked(self.eligible_excluding(exclude), query, limit)
    }

    async fn query_drift(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        cosine_ranked(self.eligible_excluding(exclude), query, limit)
    }

    async fn query_random(
        &self,
        store_seed: f64,
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        let rows: Vec<(i32, Display)> = self
            .eligible_excluding(exclude)
            .map(|r| (r.id, r.display.clone()))
            .collect();
        let shuffled = shuffle_fallback(rows, store_seed);
        Ok(shuffled.into_iter().take(limit).collect())
    }
}

fn cosine_ranked<'a>(
    candidates: impl Iterator<Item = &'a ArtworkRecord>,
    query: &[f32],
    limit: usize,
) -> EngineResult<Vec<PoolItem>> {
    let mut scored: Vec<(f32, &ArtworkRecord)> = candidates
        .filter_map(|r| {
            let emb = r.embedding.as_deref()?;
            Some((cosine_similarity(query, emb), r))
        })
        .collect();
    // Descending similarity == ascending cosine distance.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored
        .into_iter()
        .take(limit)
        .map(|(sim, r)| PoolItem {
            id: r.id,
            similarity: Some(sim),
            display: r.display.clone(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Postgres + pgvector implementation.
// ---------------------------------------------------------------------------

/// Real adapter over a Postgres table with a `pgvector` `vector(768)`
/// column: `ORDER BY embedding <=> $1` for nearest-neighbor ranking,
/// `setseed($1)` followed by `ORDER BY random(), id ASC` for the seeded
/// random pool.
pub struct PgVectorStore {
    pool: sqlx::PgPool,
    table: String,
}

impl PgVectorStore {
    pub fn new(pool: sqlx::PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    fn exclude_clause(exclude: &HashSet<i32>, start_param: usize) -> (String, Vec<i32>) {
        if exclude.is_empty() {
            return (String::new(), Vec::new());
        }
        let ids: Vec<i32> = exclude.iter().copied().collect();
        let placeholders: Vec<String> = (0..ids.len())
            .map(|i| format!("${}", start_param + i))
            .collect();
        (
            format!("AND id NOT IN ({})", placeholders.join(", ")),
            ids,
        )
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn fetch_focal(&self, focal_id: i32) -> EngineResult<Option<ArtworkRecord>> {
        let sql = format!(
            "SELECT id, embedding, displayable, title, artist, object_id, \
             image_url_local, image_url_small, image_url_original \
             FROM {} WHERE id = $1 AND embedding IS NOT NULL AND displayable",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(focal_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EngineError::StoreFailure(format!("focal lookup failed: {e}")))?;
        Ok(row.map(row_to_record))
    }

    async fn query_tight(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        self.query_nearest(query, exclude, limit).await
    }

    async fn query_drift(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        self.query_nearest(query, exclude, limit).await
    }

    async fn query_random(
        &self,
        store_seed: f64,
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        // `setseed` must run in the same connection/transaction as the
        // subsequent `random()` call for the seed to take effect.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EngineError::StoreFailure(format!("begin tx failed: {e}")))?;

        sqlx::query("SELECT setseed($1)")
            .bind(store_seed)
            .execute(&mut *tx)
            .await
            .map_err(|e| EngineError::StoreFailure(format!("setseed failed: {e}")))?;

        let (exclude_sql, exclude_ids) = Self::exclude_clause(exclude, 1);
        let sql = format!(
            "SELECT id, embedding, displayable, title, artist, object_id, \
             image_url_local, image_url_small, image_url_original \
             FROM {} WHERE embedding IS NOT NULL AND displayable {} \
             ORDER BY random(), id ASC LIMIT ${}",
            self.table,
            exclude_sql,
            exclude_ids.len() + 1
        );
        let mut q = sqlx::query(&sql);
        for id in &exclude_ids {
            q = q.bind(id);
        }
        q = q.bind(limit as i64);

        let rows = q
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| EngineError::StoreFailure(format!("random pool query failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| EngineError::StoreFailure(format!("commit failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let record = row_to_record(row);
                PoolItem {
                    id: record.id,
                    similarity: None,
                    display: record.display,
                }
            })
            .collect())
    }
}

impl PgVectorStore {
    async fn query_nearest(
        &self,
        query: &[f32],
        exclude: &HashSet<i32>,
        limit: usize,
    ) -> EngineResult<Vec<PoolItem>> {
        let (exclude_sql, exclude_ids) = Self::exclude_clause(exclude, 2);
        let sql = format!(
            "SELECT id, embedding, displayable, title, artist, object_id, \
             image_url_local, image_url_small, image_url_original, \
             1 - (embedding <=> $1) AS similarity \
             FROM {} WHERE embedding IS NOT NULL AND displayable {} \
             ORDER BY embedding <=> $1 ASC LIMIT ${}",
            self.table,
            exclude_sql,
            exclude_ids.len() + 2
        );
        let mut q = sqlx::query(&sql).bind(pgvector::Vector::from(query.to_vec()));
        for id in &exclude_ids {
            q = q.bind(id);
        }
        q = q.bind(limit as i64);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EngineError::StoreFailure(format!("nearest-neighbor query failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                use sqlx::Row;
                let similarity: f32 = row.try_get("similarity").unwrap_or(0.0);
                let record = row_to_record(row);
                PoolItem {
                    id: record.id,
                    similarity: Some(similarity),
                    display: record.display,
                }
            })
            .collect())
    }
}

fn row_to_record(row: sqlx::postgres::PgRow) -> ArtworkRecord {
    use sqlx::Row;
    let embedding: Option<pgvector::Vector> = row.try_get("embedding").ok();
    ArtworkRecord {
        id: row.try_get("id").unwrap_or_default(),
        embedding: embedding.map(|v| v.to_vec()),
        displayable: row.try_get("displayable").unwrap_or(false),
        display: Display {
            title: row.try_get("title").ok(),
            artist: row.try_get("artist").ok(),
            object_id: row.try_get("object_id").ok(),
            image_url_local: row.try_get("image_url_local").ok(),
            image_url_small: row.try_get("image_url_small").ok(),
            image_url_original: row.try_get("image_url_original").ok(),
        },
    }
}
