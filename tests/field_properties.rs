//! Property-style checks for the seven invariants documented for the field
//! sampling engine (determinism, exclusion, dedup, weight monotonicity,
//! bounded output, pool independence, basis immutability).

mod support;

use std::collections::HashSet;

use field_sampling_engine::coordinator::{ChunkCoord, ChunkRequest, MultiChunkRequest};

#[tokio::test]
async fn same_inputs_produce_identical_output() {
    let engine = support::build_engine(200);
    let req = ChunkRequest::new(3, 5, -2, Some(99), Some(12), None, 20).unwrap();

    let a = engine.single_chunk(&req).await.unwrap();
    let b = engine.single_chunk(&req).await.unwrap();

    let ids_a: Vec<i32> = a.data.iter().map(|r| r.id).collect();
    let ids_b: Vec<i32> = b.data.iter().map(|r| r.id).collect();
    assert_eq!(ids_a, ids_b);
    assert_eq!(a.meta.seed, b.meta.seed);
}

#[tokio::test]
async fn different_global_seed_can_change_output() {
    let engine = support::build_engine(200);
    let req_a = ChunkRequest::new(3, 5, -2, Some(1), Some(12), None, 20).unwrap();
    let req_b = ChunkRequest::new(3, 5, -2, Some(2), Some(12), None, 20).unwrap();

    let a = engine.single_chunk(&req_a).await.unwrap();
    let b = engine.single_chunk(&req_b).await.unwrap();
    assert_ne!(a.meta.seed, b.meta.seed);
}

#[tokio::test]
async fn exclusions_are_never_returned() {
    let engine = support::build_engine(100);
    let exclude: HashSet<i32> = [2, 4, 6, 8, 10].into_iter().collect();
    let exclude_csv = "2,4,6,8,10";
    let req = ChunkRequest::new(1, 0, 0, Some(7), Some(50), Some(exclude_csv), 20).unwrap();
    let resp = engine.single_chunk(&req).await.unwrap();
    for item in &resp.data {
        assert!(!exclude.contains(&item.id));
        assert_ne!(item.id, 1, "focal id must never be returned");
    }
}

#[tokio::test]
async fn no_duplicate_ids_within_a_single_chunk() {
    let engine = support::build_engine(300);
    let req = ChunkRequest::new(1, 8, 8, Some(42), Some(50), None, 20).unwrap();
    let resp = engine.single_chunk(&req).await.unwrap();
    let mut seen = HashSet::new();
    for item in &resp.data {
        assert!(seen.insert(item.id), "duplicate id {} in single chunk", item.id);
    }
}

#[tokio::test]
async fn output_never_exceeds_requested_count() {
    let engine = support::build_engine(50);
    let req = ChunkRequest::new(1, 0, 0, Some(1), Some(50), None, 20).unwrap();
    let resp = engine.single_chunk(&req).await.unwrap();
    assert!(resp.data.len() <= 50);
}

#[tokio::test]
async fn weights_shift_toward_random_as_radius_grows() {
    let engine = support::build_engine(200);
    let near = ChunkRequest::new(1, 0, 0, Some(1), Some(10), None, 20).unwrap();
    let far = ChunkRequest::new(1, 40, 40, Some(1), Some(10), None, 20).unwrap();

    let near_resp = engine.single_chunk(&near).await.unwrap();
    let far_resp = engine.single_chunk(&far).await.unwrap();

    assert!(near_resp.meta.weights.sim >= far_resp.meta.weights.sim);
    assert!(far_resp.meta.weights.rand >= near_resp.meta.weights.rand);
}

#[tokio::test]
async fn multi_chunk_deduplicates_across_chunks() {
    let engine = support::build_engine(40); // deliberately small corpus to force overlap
    let req = MultiChunkRequest::new(
        1,
        vec![
            ChunkCoord { x: 0, y: 0 },
            ChunkCoord { x: 1, y: 0 },
            ChunkCoord { x: 0, y: 1 },
        ],
        Some(5),
        Some(10),
        HashSet::new(),
        20,
    )
    .unwrap();

    let resp = engine.multi_chunk(&req).await.unwrap();
    let mut seen = HashSet::new();
    for (_, chunk) in &resp.chunks {
        for item in &chunk.data {
            assert!(seen.insert(item.id), "id {} repeated across chunks", item.id);
        }
    }
}

#[tokio::test]
async fn multi_chunk_preserves_input_coordinate_keys() {
    let engine = support::build_engine(60);
    let req = MultiChunkRequest::new(
        1,
        vec![ChunkCoord { x: -3, y: 7 }, ChunkCoord { x: 2, y: -1 }],
        Some(1),
        Some(5),
        HashSet::new(),
        20,
    )
    .unwrap();
    let resp = engine.multi_chunk(&req).await.unwrap();
    let keys: HashSet<&str> = resp.chunks.iter().map(|(k, _)| k.as_str()).collect();
    assert!(keys.contains("-3,7"));
    assert!(keys.contains("2,-1"));
}

#[tokio::test]
async fn unknown_focal_id_is_target_not_found() {
    let engine = support::build_engine(10);
    let req = ChunkRequest::new(999_999, 0, 0, None, None, None, 20).unwrap();
    let err = engine.single_chunk(&req).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}
