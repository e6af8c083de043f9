//! Request coordinator — validates inputs, orchestrates single-chunk and
//! multi-chunk modes, enforces cross-chunk deduplication, and assembles the
//! response: validate -> orchestrate -> assemble JSON.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::{
    EngineConfig, COUNT_MAX, COUNT_MIN, MAX_CHUNKS_PER_REQUEST, MULTI_DRIFT_LIMIT,
    MULTI_RANDOM_CAP, MULTI_RANDOM_PER_CHUNK, MULTI_TIGHT_CAP, MULTI_TIGHT_PER_CHUNK,
    SINGLE_DRIFT_LIMIT, SINGLE_RANDOM_LIMIT, SINGLE_TIGHT_LIMIT, TEMPERATURE_EDGE_HIGH,
    TEMPERATURE_EDGE_LOW,
};
use crate::error::{EngineError, EngineResult};
use crate::field_transform::query_vector;
use crate::numeric::{fold_i32, hash32, smoothstep, vec_normalize, Mulberry32};
use crate::pca::PcaBasis;
use crate::sampler::{sample, OffsetMode, Weights};
use crate::store::{CandidatePool, VectorStore};

/// Derived, per-chunk state that is a pure function of the request and the
/// immutable process state.
#[derive(Debug, Clone, Copy)]
pub struct ChunkGeometry {
    pub r: f64,
    pub theta: f64,
    pub t: f64,
    pub seed: u32,
}

impl ChunkGeometry {
    pub fn compute(focal_id: i32, x: i32, y: i32, global_seed: u32) -> Self {
        let r = (x as f64).hypot(y as f64);
        let theta = (y as f64).atan2(x as f64);
        let t = smoothstep(TEMPERATURE_EDGE_LOW, TEMPERATURE_EDGE_HIGH, r);
        let seed = hash32(&[fold_i32(focal_id), fold_i32(x), fold_i32(y), global_seed]);
        Self { r, theta, t, seed }
    }

    /// Folds the chunk seed into the store's native `[0,1)` seed space:
    /// `storeSeed = (hash32(...) & 0xFFFFFFFF) / 2^32`.
    pub fn store_seed(&self) -> f64 {
        self.seed as f64 / 4_294_967_296.0
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub focal_id: i32,
    pub x: i32,
    pub y: i32,
    pub global_seed: u32,
    pub count: usize,
    pub exclude: HashSet<i32>,
}

impl ChunkRequest {
    /// Validates and clamps raw inputs: `focalId` positive, `count` clamped
    /// to `[1, 50]` (falling back to `default_count` when omitted),
    /// `globalSeed` defaults to 0, `exclude` parsed from a comma-separated
    /// integer list.
    pub fn new(
        focal_id: i32,
        x: i32,
        y: i32,
        global_seed: Option<u32>,
        count: Option<i64>,
        exclude_csv: Option<&str>,
        default_count: usize,
    ) -> EngineResult<Self> {
        if focal_id <= 0 {
            return Err(EngineError::BadRequest(format!(
                "focalId must be a positive integer, got {focal_id}"
            )));
        }
        let count = clamp_count(count.unwrap_or(default_count as i64));
        let exclude = parse_exclude_csv(exclude_csv)?;
        Ok(Self {
            focal_id,
            x,
            y,
            global_seed: global_seed.unwrap_or(0),
            count,
            exclude,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone)]
pub struct MultiChunkRequest {
    pub focal_id: i32,
    pub chunks: Vec<ChunkCoord>,
    pub global_seed: u32,
    pub count: usize,
    pub exclude_ids: HashSet<i32>,
}

impl MultiChunkRequest {
    pub fn new(
        focal_id: i32,
        chunks: Vec<ChunkCoord>,
        global_seed: Option<u32>,
        count: Option<i64>,
        exclude_ids: HashSet<i32>,
        default_count: usize,
    ) -> EngineResult<Self> {
        if focal_id <= 0 {
            return Err(EngineError::BadRequest(format!(
                "focalId must be a positive integer, got {focal_id}"
            )));
        }
        if chunks.is_empty() || chunks.len() > MAX_CHUNKS_PER_REQUEST {
            return Err(EngineError::BadRequest(format!(
                "chunks length must be in [1, {MAX_CHUNKS_PER_REQUEST}], got {}",
                chunks.len()
            )));
        }
        let count = clamp_count(count.unwrap_or(default_count as i64));
        Ok(Self {
            focal_id,
            chunks,
            global_seed: global_seed.unwrap_or(0),
            count,
            exclude_ids,
        })
    }
}

fn clamp_count(count: i64) -> usize {
    count.clamp(COUNT_MIN as i64, COUNT_MAX as i64) as usize
}

fn parse_exclude_csv(csv: Option<&str>) -> EngineResult<HashSet<i32>> {
    let Some(csv) = csv else {
        return Ok(HashSet::new());
    };
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i32>()
                .map_err(|_| EngineError::BadRequest(format!("invalid exclude id: {s:?}")))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultItem {
    pub id: i32,
    pub object_id: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub image_url: Option<String>,
    pub original_image_url: Option<String>,
    pub image_source: Option<&'static str>,
    pub similarity: Option<f32>,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub target_id: i32,
    pub x: i32,
    pub y: i32,
    pub r: f64,
    pub theta: f64,
    pub t: f64,
    pub weights: Weights,
    pub seed: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub meta: ChunkMeta,
    pub data: Vec<ResultItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiChunkResponse {
    pub target_id: i32,
    pub total_chunks: usize,
    pub seed: u32,
    /// The shared hard-exclusion set (`{focalId} ∪ excludeIds`), sorted, for
    /// callers that want to know exactly what was filtered out.
    pub excluded_ids: Vec<i32>,
    /// Keyed by `"x,y"`, preserving the input coordinates. Serializes as a
    /// JSON object via an inline map, not the default array-of-pairs
    /// `Vec<(String, _)>` shape.
    #[serde(serialize_with = "serialize_chunk_map")]
    pub chunks: Vec<(String, ChunkResponse)>,
}

fn serialize_chunk_map<S>(
    chunks: &[(String, ChunkResponse)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(chunks.len()))?;
    for (key, value) in chunks {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// `r`, `theta`, `t` rounded to 2 decimals; weights to 3.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn to_result_item(picked: &crate::sampler::PickedItem) -> ResultItem {
    let (url, source_tag) = picked.item.display.image_url_and_source();
    ResultItem {
        id: picked.item.id,
        object_id: picked.item.display.object_id.clone(),
        title: picked.item.display.title.clone(),
        artist: picked.item.display.artist.clone(),
        image_url: url.map(str::to_string),
        original_image_url: picked.item.display.image_url_original.clone(),
        image_source: source_tag,
        similarity: picked.item.similarity,
        source: picked.source.as_str(),
    }
}

// ---------------------------------------------------------------------------
// Single-chunk orchestration
// ---------------------------------------------------------------------------

#[instrument(skip(store, basis, req), fields(focal_id = req.focal_id, x = req.x, y = req.y))]
pub async fn run_single_chunk(
    store: &(dyn VectorStore),
    basis: &PcaBasis,
    req: &ChunkRequest,
) -> EngineResult<ChunkResponse> {
    let focal = store
        .fetch_focal(req.focal_id)
        .await?
        .ok_or(EngineError::TargetNotFound(req.focal_id as i64))?;
    let v = vec_normalize(focal.embedding.as_deref().ok_or_else(|| {
        EngineError::Internal("eligible focal record missing embedding".into())
    })?);

    let geo = ChunkGeometry::compute(req.focal_id, req.x, req.y, req.global_seed);
    let mut rng = Mulberry32::new(geo.seed);
    let v_prime = query_vector(basis, &v, geo.theta, geo.t, &mut rng);

    let mut hard_excludes = req.exclude.clone();
    hard_excludes.insert(req.focal_id);

    // Single-chunk mode applies `hardExcludes` only in the sampler's `used`
    // set below, not as a store-level filter — the store queries run
    // unfiltered (empty exclude set) and rely entirely on the sampler to
    // skip already-excluded ids during selection. This is deliberate, not a
    // missed optimization: both modes ultimately exclude the same ids, the
    // SQL-level filter in multi-chunk mode below just saves bandwidth.
    let no_store_excludes = HashSet::new();
    let (tight, drift, rand) = tokio::try_join!(
        fetch_tight(store, &v, &no_store_excludes, SINGLE_TIGHT_LIMIT),
        fetch_drift(store, &v_prime, &no_store_excludes, SINGLE_DRIFT_LIMIT),
        fetch_random(store, geo.store_seed(), &no_store_excludes, SINGLE_RANDOM_LIMIT),
    )?;
    debug!(tight = tight.items.len(), drift = drift.items.len(), rand = rand.items.len(), "pools acquired");

    let weights = Weights::for_temperature(geo.t);
    let mut used = hard_excludes;
    let picked = sample(
        &tight,
        &drift,
        &rand,
        req.count,
        weights,
        req.x,
        req.y,
        &OffsetMode::Single,
        &mut rng,
        &mut used,
    );
    info!(picked = picked.len(), t = geo.t, "single chunk sampled");

    Ok(ChunkResponse {
        meta: ChunkMeta {
            target_id: req.focal_id,
            x: req.x,
            y: req.y,
            r: round2(geo.r),
            theta: round2(geo.theta),
            t: round2(geo.t),
            weights: Weights {
                sim: round3(weights.sim),
                drift: round3(weights.drift),
                rand: round3(weights.rand),
            },
            seed: geo.seed,
        },
        data: picked.iter().map(to_result_item).collect(),
    })
}

// ---------------------------------------------------------------------------
// Multi-chunk orchestration
// ---------------------------------------------------------------------------

#[instrument(skip(store, basis, req), fields(focal_id = req.focal_id, n = req.chunks.len()))]
pub async fn run_multi_chunk(
    store: &(dyn VectorStore),
    basis: &PcaBasis,
    req: &MultiChunkRequest,
) -> EngineResult<MultiChunkResponse> {
    let focal = store
        .fetch_focal(req.focal_id)
        .await?
        .ok_or(EngineError::TargetNotFound(req.focal_id as i64))?;
    let v = vec_normalize(focal.embedding.as_deref().ok_or_else(|| {
        EngineError::Internal("eligible focal record missing embedding".into())
    })?);

    // Multi-chunk applies `excludeIds` at the SQL/store level, not just in
    // the sampler's `used` set (see single-chunk mode above for the contrast).
    let mut hard_excludes = req.exclude_ids.clone();
    hard_excludes.insert(req.focal_id);

    let n = req.chunks.len();
    let tight_limit = MULTI_TIGHT_CAP.min(MULTI_TIGHT_PER_CHUNK * n);
    let random_limit_per_chunk = MULTI_RANDOM_CAP.min(MULTI_RANDOM_PER_CHUNK * n);

    // Shared tight pool, acquired once around the plain focal embedding.
    let tight = fetch_tight(store, &v, &hard_excludes, tight_limit).await?;

    // Sort chunks by r ascending, preserving original index for the output
    // key and the multi-chunk spatial-offset computation.
    let mut ordered: Vec<(usize, ChunkCoord)> = req.chunks.iter().copied().enumerate().collect();
    ordered.sort_by(|(_, a), (_, b)| {
        let ra = (a.x as f64).hypot(a.y as f64);
        let rb = (b.x as f64).hypot(b.y as f64);
        ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut global_used = hard_excludes.clone();
    let mut results: Vec<(usize, String, ChunkResponse)> = Vec::with_capacity(n);

    for (chunk_index, coord) in ordered {
        let geo = ChunkGeometry::compute(req.focal_id, coord.x, coord.y, req.global_seed);
        let mut rng = Mulberry32::new(geo.seed);
        let v_prime = query_vector(basis, &v, geo.theta, geo.t, &mut rng);

        let (drift, rand) = tokio::try_join!(
            fetch_drift(store, &v_prime, &hard_excludes, MULTI_DRIFT_LIMIT),
            fetch_random(store, geo.store_seed(), &hard_excludes, random_limit_per_chunk),
        )?;

        let weights = Weights::for_temperature(geo.t);
        let mode = OffsetMode::Multi {
            chunk_index,
            global_seed: req.global_seed,
        };
        let picked = sample(
            &tight,
            &drift,
            &rand,
            req.count,
            weights,
            coord.x,
            coord.y,
            &mode,
            &mut rng,
            &mut global_used,
        );

        let key = format!("{},{}", coord.x, coord.y);
        results.push((
            chunk_index,
            key,
            ChunkResponse {
                meta: ChunkMeta {
                    target_id: req.focal_id,
                    x: coord.x,
                    y: coord.y,
                    r: round2(geo.r),
                    theta: round2(geo.theta),
                    t: round2(geo.t),
                    weights: Weights {
                        sim: round3(weights.sim),
                        drift: round3(weights.drift),
                        rand: round3(weights.rand),
                    },
                    seed: geo.seed,
                },
                data: picked.iter().map(to_result_item).collect(),
            },
        ));
    }

    // Restore the caller's original chunk order in the output.
    results.sort_by_key(|(idx, _, _)| *idx);
    info!(chunks = results.len(), "multi chunk sampled");

    let mut excluded_ids: Vec<i32> = hard_excludes.iter().copied().collect();
    excluded_ids.sort_unstable();

    Ok(MultiChunkResponse {
        target_id: req.focal_id,
        total_chunks: n,
        seed: req.global_seed,
        excluded_ids,
        chunks: results
            .into_iter()
            .map(|(_, key, resp)| (key, resp))
            .collect(),
    })
}

// ---------------------------------------------------------------------------
// Pool-acquisition helpers (thin wrappers tagging source labels)
// ---------------------------------------------------------------------------

async fn fetch_tight(
    store: &(dyn VectorStore),
    query: &[f32],
    exclude: &HashSet<i32>,
    limit: usize,
) -> EngineResult<CandidatePool> {
    let items = store.query_tight(query, exclude, limit).await?;
    Ok(CandidatePool { items })
}

async fn fetch_drift(
    store: &(dyn VectorStore),
    query: &[f32],
    exclude: &HashSet<i32>,
    limit: usize,
) -> EngineResult<CandidatePool> {
    let items = store.query_drift(query, exclude, limit).await?;
    Ok(CandidatePool { items })
}

async fn fetch_random(
    store: &(dyn VectorStore),
    store_seed: f64,
    exclude: &HashSet<i32>,
    limit: usize,
) -> EngineResult<CandidatePool> {
    let items = store.query_random(store_seed, exclude, limit).await?;
    Ok(CandidatePool { items })
}

/// Shared coordinator state, constructed once at startup and never rebuilt
/// per request. Holds the immutable PCA basis and a type-erased handle to
/// the vector store so the HTTP binary and the
/// test suite can swap in [`crate::store::PgVectorStore`] or
/// [`crate::store::MemoryStore`] interchangeably.
pub struct Engine {
    pub config: EngineConfig,
    pub basis: PcaBasis,
    pub store: Arc<dyn VectorStore>,
}

impl Engine {
    pub fn new(config: EngineConfig, basis: PcaBasis, store: Arc<dyn VectorStore>) -> Self {
        Self {
            config,
            basis,
            store,
        }
    }

    pub async fn single_chunk(&self, req: &ChunkRequest) -> EngineResult<ChunkResponse> {
        run_single_chunk(self.store.as_ref(), &self.basis, req).await
    }

    pub async fn multi_chunk(&self, req: &MultiChunkRequest) -> EngineResult<MultiChunkResponse> {
        run_multi_chunk(self.store.as_ref(), &self.basis, req).await
    }
}

// Re-exported so callers matching on `Source` don't need a separate import
// when they already depend on `coordinator::ResultItem`.
pub use crate::store::Source as PoolSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_request_rejects_non_positive_focal_id() {
        let err = ChunkRequest::new(0, 0, 0, None, None, None, 20).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn chunk_request_clamps_count_to_bounds() {
        let req = ChunkRequest::new(1, 0, 0, None, Some(1000), None, 20).unwrap();
        assert_eq!(req.count, 50);
        let req = ChunkRequest::new(1, 0, 0, None, Some(-5), None, 20).unwrap();
        assert_eq!(req.count, 1);
    }

    #[test]
    fn chunk_request_falls_back_to_default_count() {
        let req = ChunkRequest::new(1, 0, 0, None, None, None, 7).unwrap();
        assert_eq!(req.count, 7);
    }

    #[test]
    fn chunk_request_parses_exclude_csv() {
        let req = ChunkRequest::new(1, 0, 0, None, None, Some("2, 3,4"), 20).unwrap();
        assert_eq!(req.exclude, [2, 3, 4].into_iter().collect());
    }

    #[test]
    fn chunk_request_rejects_malformed_exclude_csv() {
        let err = ChunkRequest::new(1, 0, 0, None, None, Some("2,x,4"), 20).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn multi_chunk_request_rejects_out_of_range_chunk_count() {
        let err = MultiChunkRequest::new(1, vec![], None, None, HashSet::new(), 20).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));

        let too_many: Vec<ChunkCoord> = (0..20).map(|i| ChunkCoord { x: i, y: 0 }).collect();
        let err =
            MultiChunkRequest::new(1, too_many, None, None, HashSet::new(), 20).unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[test]
    fn multi_chunk_request_falls_back_to_default_count() {
        let req = MultiChunkRequest::new(
            1,
            vec![ChunkCoord { x: 0, y: 0 }],
            None,
            None,
            HashSet::new(),
            9,
        )
        .unwrap();
        assert_eq!(req.count, 9);
    }

    #[test]
    fn geometry_matches_origin_case() {
        let geo = ChunkGeometry::compute(42, 0, 0, 0);
        assert_eq!(geo.r, 0.0);
        assert_eq!(geo.theta, 0.0);
        assert_eq!(geo.t, 0.0);
    }

    #[test]
    fn geometry_matches_periphery_case() {
        let geo = ChunkGeometry::compute(42, 10, 10, 0);
        assert!((geo.r - 14.142).abs() < 0.01);
        assert_eq!(geo.t, 1.0);
    }

    #[test]
    fn geometry_is_deterministic_for_identical_inputs() {
        let a = ChunkGeometry::compute(42, 3, -2, 7);
        let b = ChunkGeometry::compute(42, 3, -2, 7);
        assert_eq!(a.seed, b.seed);
        assert_eq!(a.r, b.r);
        assert_eq!(a.theta, b.theta);
        assert_eq!(a.t, b.t);
    }
}
